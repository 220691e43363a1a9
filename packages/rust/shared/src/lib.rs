//! Shared types, error model, identity hashing, and configuration for jobdex.
//!
//! This crate is the foundation depended on by all other jobdex crates.
//! It provides:
//! - [`JobdexError`] — the unified error type
//! - Domain types ([`Document`], [`ParameterSet`], [`AccessAddress`])
//! - Content-addressable identities ([`calc_id`], [`calc_doc_id`])
//! - Job manifest verification ([`read_statepoint`])
//! - Configuration ([`AppConfig`], [`CrawlConfig`], config loading)

pub mod config;
pub mod error;
pub mod hashing;
pub mod manifest;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, CrawlConfig, DefaultsConfig, DefinitionConfig, config_dir, config_file_path,
    expand_home, init_config, load_config, load_config_from,
};
pub use error::{BoxError, JobdexError, Result};
pub use hashing::{IDENTITY_LEN, Identity, calc_doc_id, calc_id, canonical_json};
pub use manifest::{FN_JOB_DOCUMENT, FN_MANIFEST, read_statepoint};
pub use types::{
    AccessAddress, Document, KEY_CRAWLER_ID, KEY_CRAWLER_MODULE, KEY_CRAWLER_ROOT, KEY_FILENAME,
    KEY_FORMAT, KEY_ID, KEY_PROJECT, KEY_ROOT, ParameterSet, is_reserved_key,
};
