//! Content-addressable identities for parameter sets and crawled documents.
//!
//! Both identities hash a canonical JSON rendering: compact, object keys
//! sorted at every level, numbers in their shortest round-trip form. This
//! keeps an identity independent of map insertion order and float spelling.

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::error::{JobdexError, Result};
use crate::types::Document;

/// Number of hex characters in an [`Identity`].
pub const IDENTITY_LEN: usize = 64;

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// Hex digest identifying a parameter set (and the job directory named after it).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    /// The identity as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn from_digest(hasher: Sha256) -> Self {
        Self(format!("{:x}", hasher.finalize()))
    }
}

impl std::fmt::Display for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Identity {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<Identity> for String {
    fn from(id: Identity) -> Self {
        id.0
    }
}

impl std::str::FromStr for Identity {
    type Err = JobdexError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let valid = s.len() == IDENTITY_LEN
            && s.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        if !valid {
            return Err(JobdexError::validation(format!(
                "'{s}' is not a {IDENTITY_LEN}-character lowercase hex identity"
            )));
        }
        Ok(Self(s.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Canonical serialization
// ---------------------------------------------------------------------------

/// Render a JSON value canonically (sorted keys, compact, normalized numbers).
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => {
            if n.is_f64() && n.as_f64() == Some(0.0) {
                // -0.0 and 0.0 are the same parameter value
                out.push_str("0.0");
            } else {
                out.push_str(&n.to_string());
            }
        }
        Value::String(s) => out.push_str(&Value::String(s.clone()).to_string()),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(&map[key], out);
            }
            out.push('}');
        }
    }
}

// ---------------------------------------------------------------------------
// Identities
// ---------------------------------------------------------------------------

/// Compute the identity of a parameter set.
///
/// Fails with [`JobdexError::InvalidParameterSet`] when the value cannot be
/// serialized to JSON or is not a mapping.
pub fn calc_id<T: Serialize + ?Sized>(parameters: &T) -> Result<Identity> {
    let value = serde_json::to_value(parameters)
        .map_err(|e| JobdexError::invalid_parameter_set(e.to_string()))?;
    if !value.is_object() {
        return Err(JobdexError::invalid_parameter_set(format!(
            "expected a mapping, got {}",
            json_kind(&value)
        )));
    }

    let mut hasher = Sha256::new();
    hasher.update(canonical_json(&value).as_bytes());
    Ok(Identity::from_digest(hasher))
}

/// Compute the default key of a crawled document.
///
/// Combines the source directory, the filename and the document content so
/// that re-crawling an unchanged file yields the same key.
pub fn calc_doc_id(doc: &Document, dirpath: &Path, filename: &str) -> Result<Identity> {
    let mut content = doc.clone();
    content.id = None;
    let value = serde_json::to_value(&content)
        .map_err(|e| JobdexError::invalid_parameter_set(e.to_string()))?;

    let mut hasher = Sha256::new();
    hasher.update(dirpath.to_string_lossy().as_bytes());
    hasher.update(b"\0");
    hasher.update(filename.as_bytes());
    hasher.update(b"\0");
    hasher.update(canonical_json(&value).as_bytes());
    Ok(Identity::from_digest(hasher))
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "a mapping",
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::collections::HashMap;

    use serde_json::json;

    use super::*;

    #[test]
    fn known_digest() {
        let id = calc_id(&json!({"a": 1, "b": 2})).unwrap();
        assert_eq!(
            id.as_str(),
            "43258cff783fe7036d8a43033f830adfc60ec037382473548ac742b888292777"
        );
    }

    #[test]
    fn nested_canonical_form() {
        let value = json!({"c": {"e": true, "d": null}, "b": [1, 2.5, "x"]});
        assert_eq!(
            canonical_json(&value),
            r#"{"b":[1,2.5,"x"],"c":{"d":null,"e":true}}"#
        );
        assert_eq!(
            calc_id(&value).unwrap().as_str(),
            "b598a9d35c1f95fffa61f8635a84488c75eea4c11c137f2c33c05bbf41ccc272"
        );
    }

    #[test]
    fn insertion_order_does_not_matter() {
        let mut forward = HashMap::new();
        let mut backward = BTreeMap::new();
        for (k, v) in [("alpha", 1.5), ("beta", -2.0), ("gamma", 1e-9)] {
            forward.insert(k.to_string(), v);
        }
        for (k, v) in [("gamma", 1e-9), ("beta", -2.0), ("alpha", 1.5)] {
            backward.insert(k.to_string(), v);
        }
        assert_eq!(calc_id(&forward).unwrap(), calc_id(&backward).unwrap());
    }

    #[test]
    fn hashing_is_deterministic() {
        let p = json!({"T": 1.0, "N": 1000, "name": "ising"});
        let first = calc_id(&p).unwrap();
        let reparsed: Value = serde_json::from_str(&p.to_string()).unwrap();
        assert_eq!(first, calc_id(&reparsed).unwrap());
        assert_eq!(first.as_str().len(), IDENTITY_LEN);
    }

    #[test]
    fn negative_zero_is_zero() {
        assert_eq!(
            calc_id(&json!({"x": -0.0})).unwrap(),
            calc_id(&json!({"x": 0.0})).unwrap()
        );
    }

    #[test]
    fn non_mapping_is_rejected() {
        let err = calc_id(&json!([1, 2, 3])).unwrap_err();
        assert!(matches!(err, JobdexError::InvalidParameterSet { .. }));

        let mut bad_keys = HashMap::new();
        bad_keys.insert(vec![1u8], 1);
        assert!(matches!(
            calc_id(&bad_keys),
            Err(JobdexError::InvalidParameterSet { .. })
        ));
    }

    #[test]
    fn identity_parsing() {
        let id = calc_id(&json!({"a": 1})).unwrap();
        let parsed: Identity = id.as_str().parse().unwrap();
        assert_eq!(parsed, id);
        assert!("not-hex".parse::<Identity>().is_err());
        assert!("ABC".repeat(22)[..64].parse::<Identity>().is_err());
    }

    #[test]
    fn doc_id_keeps_directory_and_filename_apart() {
        let doc = Document::default();
        assert_ne!(
            calc_doc_id(&doc, Path::new("/r/ab"), "c").unwrap(),
            calc_doc_id(&doc, Path::new("/r/a"), "bc").unwrap()
        );
    }

    #[test]
    fn doc_id_tracks_content_and_location() {
        let mut doc = Document::default();
        doc.insert("a", json!(1));
        let base = calc_doc_id(&doc, Path::new("/data/run"), "out.txt").unwrap();

        assert_eq!(base, calc_doc_id(&doc, Path::new("/data/run"), "out.txt").unwrap());
        assert_ne!(base, calc_doc_id(&doc, Path::new("/data/other"), "out.txt").unwrap());
        assert_ne!(base, calc_doc_id(&doc, Path::new("/data/run"), "log.txt").unwrap());

        let mut changed = doc.clone();
        changed.insert("a", json!(2));
        assert_ne!(base, calc_doc_id(&changed, Path::new("/data/run"), "out.txt").unwrap());

        let mut keyed = doc.clone();
        keyed.id = Some("explicit".into());
        assert_eq!(base, calc_doc_id(&keyed, Path::new("/data/run"), "out.txt").unwrap());
    }
}
