//! Collection sink contracts.

use jobdex_shared::{Document, JobdexError, KEY_ID, Result};
use serde_json::Value;

/// Minimal upsert-capable document store.
pub trait Collection {
    /// Store `doc`, assigning a fresh id when it has none. Returns the id.
    fn insert_one(&mut self, doc: Document) -> Result<String>;

    /// Store every document in order. Returns their ids.
    fn insert_many<I>(&mut self, docs: I) -> Result<Vec<String>>
    where
        I: IntoIterator<Item = Document>,
        Self: Sized,
    {
        docs.into_iter().map(|doc| self.insert_one(doc)).collect()
    }

    /// Insert or replace the document matched by `filter`.
    ///
    /// `filter` must be exactly `{"_id": <string>}`.
    fn replace_one(&mut self, filter: &Value, doc: Document) -> Result<()>;

    /// Up to `limit` documents in storage order; 0 returns all of them.
    fn find(&self, limit: usize) -> Vec<Document>;

    /// Any one document, if the collection is not empty.
    fn find_one(&self) -> Option<Document> {
        self.find(1).into_iter().next()
    }
}

/// An upsert of one document under a fixed id.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplaceOne {
    pub id: String,
    pub doc: Document,
}

impl ReplaceOne {
    pub fn new(id: impl Into<String>, doc: Document) -> Self {
        Self { id: id.into(), doc }
    }

    /// The `{"_id": ..}` filter this operation matches on.
    pub fn filter(&self) -> Value {
        id_filter(&self.id)
    }
}

/// A sink accepting batches of upserts.
#[allow(async_fn_in_trait)]
pub trait BulkCollection {
    /// Apply every upsert in `ops`, returning how many were written.
    async fn bulk_write(&mut self, ops: Vec<ReplaceOne>) -> Result<usize>;
}

/// `{"_id": id}`.
pub fn id_filter(id: &str) -> Value {
    let mut map = serde_json::Map::new();
    map.insert(KEY_ID.to_string(), Value::String(id.to_string()));
    Value::Object(map)
}

/// The id named by an `{"_id": <string>}` filter.
pub fn filter_id(filter: &Value) -> Result<&str> {
    let unsupported = || JobdexError::UnsupportedQuery(filter.to_string());
    let map = filter.as_object().ok_or_else(unsupported)?;
    if map.len() != 1 {
        return Err(unsupported());
    }
    map.get(KEY_ID)
        .and_then(Value::as_str)
        .ok_or_else(unsupported)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn only_id_filters_are_supported() {
        assert_eq!(filter_id(&json!({"_id": "abc"})).unwrap(), "abc");
        for filter in [
            json!({}),
            json!({"name": "x"}),
            json!({"_id": "abc", "format": "Text"}),
            json!({"_id": 3}),
            json!("abc"),
        ] {
            let err = filter_id(&filter).unwrap_err();
            assert!(matches!(err, JobdexError::UnsupportedQuery(_)), "{filter}");
        }
    }

    #[test]
    fn replace_one_filter() {
        let op = ReplaceOne::new("k", Document::default());
        assert_eq!(op.filter(), json!({"_id": "k"}));
    }
}
