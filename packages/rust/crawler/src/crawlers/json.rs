//! JSON-file crawler.

use std::path::{Path, PathBuf};

use jobdex_shared::{Document, JobdexError, Result};
use regex::Regex;
use serde_json::Value;

use crate::crawler::{Crawler, DocStream};

/// Parses matching files as one JSON document, or one per element of a
/// top-level array.
///
/// Without a pattern, every `*.json` file is parsed.
#[derive(Debug, Clone)]
pub struct JsonCrawler {
    root: PathBuf,
    pattern: Option<Regex>,
}

impl JsonCrawler {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            pattern: None,
        }
    }

    /// Only parse files whose name matches `pattern`.
    pub fn with_pattern(mut self, pattern: &str) -> Result<Self> {
        let regex = Regex::new(pattern)
            .map_err(|e| JobdexError::parse(format!("invalid pattern '{pattern}': {e}")))?;
        self.pattern = Some(regex);
        Ok(self)
    }

    fn accepts(&self, filename: &str) -> bool {
        match &self.pattern {
            Some(pattern) => pattern.is_match(filename),
            None => filename.ends_with(".json"),
        }
    }
}

fn to_document(value: Value, path: &Path) -> Result<Document> {
    match value {
        Value::Object(map) => Ok(Document::from_map(map)),
        other => Err(JobdexError::parse(format!(
            "{}: expected a JSON object, found {}",
            path.display(),
            kind(&other)
        ))),
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

impl Crawler for JsonCrawler {
    fn root(&self) -> &Path {
        &self.root
    }

    fn docs_from_file(&self, dirpath: &Path, filename: &str) -> Result<DocStream> {
        if !self.accepts(filename) {
            return Ok(Box::new(std::iter::empty()));
        }
        let path = dirpath.join(filename);
        let content = std::fs::read(&path).map_err(|e| JobdexError::io(&path, e))?;
        let value: Value = serde_json::from_slice(&content)
            .map_err(|e| JobdexError::parse(format!("{}: {e}", path.display())))?;

        match value {
            Value::Array(items) => Ok(Box::new(
                items.into_iter().map(move |item| to_document(item, &path)),
            )),
            single => Ok(Box::new(std::iter::once(to_document(single, &path)))),
        }
    }

    fn name(&self) -> &str {
        "json"
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::crawler::{CrawlOutcome, CrawlerExt};

    #[test]
    fn objects_and_arrays() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("one.json"), r#"{"x": 1, "format": "Sample"}"#).unwrap();
        std::fs::write(tmp.path().join("many.json"), r#"[{"y": 2}, {"y": 3}]"#).unwrap();
        std::fs::write(tmp.path().join("skip.txt"), "{}").unwrap();

        let crawler = JsonCrawler::new(tmp.path());
        let docs: Vec<_> = crawler.crawl(0).map(|r| r.unwrap().1).collect();
        assert_eq!(docs.len(), 3);
        // many.json sorts before one.json
        assert_eq!(docs[0].get("y"), Some(&json!(2)));
        assert_eq!(docs[1].get("y"), Some(&json!(3)));
        assert_eq!(docs[2].get("x"), Some(&json!(1)));
        assert_eq!(docs[2].format.as_deref(), Some("Sample"));
    }

    #[test]
    fn malformed_files_are_skipped() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("bad.json"), "{oops").unwrap();
        std::fs::write(tmp.path().join("scalar.json"), "3").unwrap();
        std::fs::write(tmp.path().join("good.json"), r#"{"ok": true}"#).unwrap();

        let outcome = CrawlOutcome::collect(JsonCrawler::new(tmp.path()).crawl(0));
        assert_eq!(outcome.documents.len(), 1);
        assert!(outcome.errors.is_empty());
        assert!(outcome.corrupted.is_empty());
    }

    #[test]
    fn non_string_reserved_values_do_not_drop_objects() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(
            tmp.path().join("mixed.json"),
            r#"[{"_id": 5}, {"format": 3}, {"filename": null}, {"plain": true}]"#,
        )
        .unwrap();

        let outcome = CrawlOutcome::collect(JsonCrawler::new(tmp.path()).crawl(0));
        assert_eq!(outcome.documents.len(), 4);
        let (key, first) = &outcome.documents[0];
        assert_eq!(key, "5");
        assert_eq!(first.id.as_deref(), Some("5"));
        assert_eq!(outcome.documents[1].1.format.as_deref(), Some("3"));
        assert_eq!(outcome.documents[2].1.filename.as_deref(), Some("mixed.json"));
    }

    #[test]
    fn custom_pattern() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("meta.json"), r#"{"a": 1}"#).unwrap();
        std::fs::write(tmp.path().join("data.json"), r#"{"a": 2}"#).unwrap();

        let crawler = JsonCrawler::new(tmp.path()).with_pattern("^meta").unwrap();
        let docs: Vec<_> = crawler.crawl(0).map(|r| r.unwrap().1).collect();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].get("a"), Some(&json!(1)));
    }
}
