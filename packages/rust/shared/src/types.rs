//! Core domain types: crawled documents and their reserved keys.

use std::path::PathBuf;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

/// A job's parameters: a JSON mapping with string keys.
pub type ParameterSet = Map<String, Value>;

// ---------------------------------------------------------------------------
// Reserved keys
// ---------------------------------------------------------------------------

/// Primary key of a document within a sink.
pub const KEY_ID: &str = "_id";
/// Tag naming the encoding of the document's payload.
pub const KEY_FORMAT: &str = "format";
/// Source file, relative to the crawl root.
pub const KEY_FILENAME: &str = "filename";
/// Absolute crawl root the document was found under.
pub const KEY_ROOT: &str = "root";
/// Project path of a delegated document, relative to the parent crawl root.
pub const KEY_PROJECT: &str = "project";
/// Absolute directory holding the access descriptor.
pub const KEY_CRAWLER_ROOT: &str = "access_crawler_root";
/// Filename of the access descriptor.
pub const KEY_CRAWLER_MODULE: &str = "access_module";
/// Sub-crawler id that produced a delegated document.
pub const KEY_CRAWLER_ID: &str = "access_crawler_id";

const RESERVED_KEYS: [&str; 8] = [
    KEY_ID,
    KEY_FORMAT,
    KEY_FILENAME,
    KEY_ROOT,
    KEY_PROJECT,
    KEY_CRAWLER_ROOT,
    KEY_CRAWLER_MODULE,
    KEY_CRAWLER_ID,
];

// ---------------------------------------------------------------------------
// Document
// ---------------------------------------------------------------------------

/// A crawled document: reserved provenance keys plus free-form fields.
///
/// Serializes to a flat JSON object; anything that is not a reserved key
/// lands in [`Document::fields`]. Reserved values always win over a
/// free-form field of the same name, so the JSON form never repeats a key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    /// Primary key (`_id`).
    pub id: Option<String>,

    /// Payload format tag; always serialized, `null` when unknown.
    pub format: Option<String>,

    /// Source file relative to the crawl root.
    pub filename: Option<String>,

    /// Absolute crawl root.
    pub root: Option<String>,

    pub project: Option<String>,

    pub access_crawler_root: Option<String>,

    pub access_module: Option<String>,

    pub access_crawler_id: Option<String>,

    /// Crawler-specific fields.
    pub fields: Map<String, Value>,
}

/// A reserved value as text: strings as-is, `null` as absent, anything
/// else in its compact JSON form (`5` becomes `"5"`).
fn reserved_text(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}

impl Document {
    /// Build a document from a JSON object, splitting out reserved keys.
    ///
    /// Non-string reserved values are kept in their JSON text form.
    pub fn from_map(mut map: Map<String, Value>) -> Self {
        let mut take = |key: &str| map.remove(key).and_then(reserved_text);
        let id = take(KEY_ID);
        let format = take(KEY_FORMAT);
        let filename = take(KEY_FILENAME);
        let root = take(KEY_ROOT);
        let project = take(KEY_PROJECT);
        let access_crawler_root = take(KEY_CRAWLER_ROOT);
        let access_module = take(KEY_CRAWLER_MODULE);
        let access_crawler_id = take(KEY_CRAWLER_ID);
        Self {
            id,
            format,
            filename,
            root,
            project,
            access_crawler_root,
            access_module,
            access_crawler_id,
            fields: map,
        }
    }

    /// Render the document as a flat JSON object.
    pub fn to_value(&self) -> Value {
        let mut map = self.fields.clone();
        let reserved = [
            (KEY_ID, &self.id),
            (KEY_FORMAT, &self.format),
            (KEY_FILENAME, &self.filename),
            (KEY_ROOT, &self.root),
            (KEY_PROJECT, &self.project),
            (KEY_CRAWLER_ROOT, &self.access_crawler_root),
            (KEY_CRAWLER_MODULE, &self.access_module),
            (KEY_CRAWLER_ID, &self.access_crawler_id),
        ];
        for (key, value) in reserved {
            match value {
                Some(v) => {
                    map.insert(key.to_string(), Value::String(v.clone()));
                }
                None if key == KEY_FORMAT => {
                    map.insert(key.to_string(), Value::Null);
                }
                None => {
                    map.remove(key);
                }
            }
        }
        Value::Object(map)
    }

    /// Look up a free-form field.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Set a free-form field. Reserved keys must be set through their struct fields.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        let key = key.into();
        debug_assert!(
            !is_reserved_key(&key),
            "reserved key '{key}' set as a free-form field"
        );
        self.fields.insert(key, value);
    }

    /// The delegation address, if this document came from a sub-crawler.
    pub fn address(&self) -> Option<AccessAddress> {
        Some(AccessAddress {
            project: self.project.clone().unwrap_or_default(),
            crawler_root: PathBuf::from(self.access_crawler_root.as_ref()?),
            module: self.access_module.clone()?,
            crawler_id: self.access_crawler_id.clone()?,
        })
    }

    /// Stamp a delegation address onto this document.
    ///
    /// An already present `project` is kept, so nested delegation records
    /// the innermost project path.
    pub fn set_address(&mut self, address: AccessAddress) {
        if self.project.is_none() {
            self.project = Some(address.project);
        }
        self.access_crawler_root = Some(address.crawler_root.to_string_lossy().into_owned());
        self.access_module = Some(address.module);
        self.access_crawler_id = Some(address.crawler_id);
    }
}

impl Serialize for Document {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Document {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Map::deserialize(deserializer).map(Self::from_map)
    }
}

/// Whether `key` is one of the reserved document keys.
pub fn is_reserved_key(key: &str) -> bool {
    RESERVED_KEYS.contains(&key)
}

// ---------------------------------------------------------------------------
// AccessAddress
// ---------------------------------------------------------------------------

/// Where a delegated document came from: enough to reload its sub-crawler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessAddress {
    /// Project path relative to the parent crawl root.
    pub project: String,
    /// Absolute directory containing the access descriptor.
    pub crawler_root: PathBuf,
    /// Access descriptor filename.
    pub module: String,
    /// Id of the sub-crawler within the descriptor.
    pub crawler_id: String,
}

impl AccessAddress {
    /// Full path of the access descriptor.
    pub fn descriptor_path(&self) -> PathBuf {
        self.crawler_root.join(&self.module)
    }
}
