//! Pattern crawler: documents from regex captures on file paths.

use std::path::{Path, PathBuf};

use jobdex_convert::{Payload, RawFile};
use jobdex_shared::{DefinitionConfig, Document, JobdexError, Result, is_reserved_key};
use regex::Regex;
use serde_json::{Number, Value};

use crate::crawler::{Crawler, DocStream, FetchStream};
use crate::walk::{absolute, relative_to};

/// A path pattern and the format tag of the files it matches.
#[derive(Debug, Clone)]
pub struct Registration {
    pub pattern: Regex,
    pub format: String,
}

/// Matches every registration against each file path; each match yields a
/// document built from the pattern's named captures.
#[derive(Debug, Clone)]
pub struct RegexFileCrawler {
    root: PathBuf,
    registrations: Vec<Registration>,
}

impl RegexFileCrawler {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            registrations: Vec::new(),
        }
    }

    /// Register `pattern` for files of `format`.
    ///
    /// Capture groups may not be named after a reserved document key.
    pub fn define(&mut self, pattern: &str, format: impl Into<String>) -> Result<&mut Self> {
        let regex = Regex::new(pattern)
            .map_err(|e| JobdexError::parse(format!("invalid pattern '{pattern}': {e}")))?;
        if let Some(name) = regex.capture_names().flatten().find(|n| is_reserved_key(n)) {
            return Err(JobdexError::parse(format!(
                "pattern '{pattern}' captures reserved key '{name}'"
            )));
        }
        let pattern = regex;
        self.registrations.push(Registration {
            pattern,
            format: format.into(),
        });
        Ok(self)
    }

    /// Register every configured definition.
    pub fn with_definitions(mut self, definitions: &[DefinitionConfig]) -> Result<Self> {
        for def in definitions {
            self.define(&def.pattern, def.format.clone())?;
        }
        Ok(self)
    }

    pub fn registrations(&self) -> &[Registration] {
        &self.registrations
    }

    /// One document per registration matching `dirpath/filename`.
    pub fn match_file(&self, dirpath: &Path, filename: &str) -> Vec<Document> {
        let path = dirpath.join(filename);
        let path_str = path.to_string_lossy();
        let root = absolute(&self.root).to_string_lossy().into_owned();

        let mut docs = Vec::new();
        for reg in &self.registrations {
            let Some(caps) = reg.pattern.captures(&path_str) else {
                continue;
            };
            let mut doc = Document::default();
            for name in reg.pattern.capture_names().flatten() {
                let value = caps
                    .name(name)
                    .map(|m| coerce(m.as_str()))
                    .unwrap_or(Value::Null);
                doc.fields.insert(name.to_string(), value);
            }
            doc.filename = Some(relative_to(&path, &self.root));
            doc.root = Some(root.clone());
            doc.format = Some(reg.format.clone());
            docs.push(doc);
        }
        docs
    }
}

/// Try integer, then float, else keep the string.
///
/// The first type that parses wins, so `"3"` becomes an integer even when
/// the same field holds floats elsewhere.
pub fn coerce(raw: &str) -> Value {
    if let Ok(n) = raw.parse::<i64>() {
        return Value::Number(n.into());
    }
    if let Some(n) = raw.parse::<f64>().ok().and_then(Number::from_f64) {
        return Value::Number(n);
    }
    Value::String(raw.to_string())
}

impl Crawler for RegexFileCrawler {
    fn root(&self) -> &Path {
        &self.root
    }

    fn docs_from_file(&self, dirpath: &Path, filename: &str) -> Result<DocStream> {
        Ok(Box::new(self.match_file(dirpath, filename).into_iter().map(Ok)))
    }

    /// Raw file handles for every registration that matches the document's
    /// file and carries the document's format.
    fn fetch(&self, doc: &Document) -> Result<FetchStream> {
        let Some(filename) = &doc.filename else {
            return Ok(Box::new(std::iter::empty()));
        };
        let path = self.root.join(filename);
        let path_str = path.to_string_lossy().into_owned();

        let payloads: Vec<_> = self
            .registrations
            .iter()
            .filter(|reg| doc.format.as_deref() == Some(reg.format.as_str()))
            .filter(|reg| reg.pattern.is_match(&path_str))
            .map(|reg| Ok(Payload::new(reg.format.clone(), RawFile::new(path.clone()))))
            .collect();
        Ok(Box::new(payloads.into_iter()))
    }

    fn name(&self) -> &str {
        "regex"
    }
}
