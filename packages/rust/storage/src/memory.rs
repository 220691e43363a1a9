//! In-memory collection, the default sink.

use std::collections::HashMap;

use jobdex_shared::{Document, Result};
use serde_json::Value;
use uuid::Uuid;

use crate::collection::{BulkCollection, Collection, ReplaceOne, filter_id};

/// Documents keyed by `_id`, kept in first-insertion order.
#[derive(Debug, Clone, Default)]
pub struct MemoryCollection {
    docs: Vec<Document>,
    index: HashMap<String, usize>,
}

impl MemoryCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Document> {
        self.index.get(id).map(|&i| &self.docs[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = &Document> {
        self.docs.iter()
    }

    fn upsert(&mut self, id: String, doc: Document) {
        match self.index.get(&id) {
            Some(&i) => self.docs[i] = doc,
            None => {
                self.index.insert(id, self.docs.len());
                self.docs.push(doc);
            }
        }
    }
}

impl Collection for MemoryCollection {
    fn insert_one(&mut self, mut doc: Document) -> Result<String> {
        let id = doc
            .id
            .get_or_insert_with(|| Uuid::now_v7().to_string())
            .clone();
        self.upsert(id.clone(), doc);
        Ok(id)
    }

    fn replace_one(&mut self, filter: &Value, doc: Document) -> Result<()> {
        let id = filter_id(filter)?.to_string();
        self.upsert(id, doc);
        Ok(())
    }

    fn find(&self, limit: usize) -> Vec<Document> {
        let take = if limit == 0 { self.docs.len() } else { limit };
        self.docs.iter().take(take).cloned().collect()
    }
}

impl BulkCollection for MemoryCollection {
    async fn bulk_write(&mut self, ops: Vec<ReplaceOne>) -> Result<usize> {
        let written = ops.len();
        for op in ops {
            self.upsert(op.id, op.doc);
        }
        Ok(written)
    }
}
