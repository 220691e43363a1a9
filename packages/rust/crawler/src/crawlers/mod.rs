//! Built-in crawlers.
//!
//! - [`RegexFileCrawler`]: documents from named captures of path patterns
//! - [`JsonCrawler`]: documents parsed from JSON files
//! - [`ProjectCrawler`]: job documents from a workspace of job directories
//! - [`MasterCrawler`]: delegation to sub-crawlers named by access descriptors

mod delegating;
mod json;
mod pattern;
mod project;

pub use delegating::MasterCrawler;
pub use json::JsonCrawler;
pub use pattern::{RegexFileCrawler, Registration, coerce};
pub use project::{FIELD_JOB_ID, FIELD_STATEPOINT, FORMAT_JOB_DOCUMENT, ProjectCrawler};
