//! Collection sinks for crawl output.
//!
//! - [`Collection`] — single-document upserts; [`MemoryCollection`] is the default sink
//! - [`BulkCollection`] — batched upserts, implemented in memory and by
//!   [`SqliteCollection`], a Turso Embedded / libSQL index in a local file
//!
//! Sinks are mutated through `&mut self`; several export drivers feeding one
//! sink must share it behind their own lock.

mod collection;
mod memory;
mod migrations;
mod sqlite;

pub use collection::{BulkCollection, Collection, ReplaceOne, filter_id, id_filter};
pub use memory::MemoryCollection;
pub use sqlite::SqliteCollection;
