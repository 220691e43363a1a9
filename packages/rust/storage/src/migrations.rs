//! SQL migration definitions for the document index.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a batch of SQL statements.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![
        Migration {
            version: 1,
            description: "Initial schema: documents keyed by _id",
            sql: r#"
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- One row per indexed document; body is the full flat JSON object
CREATE TABLE IF NOT EXISTS documents (
    id         TEXT PRIMARY KEY,
    format     TEXT,
    body       TEXT NOT NULL,
    indexed_at TEXT NOT NULL
);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
        },
        Migration {
            version: 2,
            description: "Index documents by format",
            sql: r#"
CREATE INDEX IF NOT EXISTS idx_documents_format ON documents(format);

INSERT INTO schema_migrations (version) VALUES (2);
"#,
        },
    ]
}
