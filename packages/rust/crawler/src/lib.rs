//! Recursive, pluggable crawling of job directory trees.
//!
//! This crate provides:
//! - [`Crawler`] — the extraction contract, with [`CrawlerExt::crawl`] driving a lazy [`Crawl`]
//! - [`crawlers`] — pattern, JSON, project-manifest and delegating crawlers
//! - [`PluginRegistry`] — named plugins that access descriptors resolve to
//! - [`fetch`] / [`fetched`] — re-open the raw data behind delegated documents

pub mod crawler;
pub mod crawlers;
pub mod plugin;
pub mod walk;

pub use crawler::{Crawl, CrawlOutcome, Crawler, CrawlerExt, DocStream, FetchStream, is_surfaced};
pub use crawlers::{
    FIELD_JOB_ID, FIELD_STATEPOINT, FORMAT_JOB_DOCUMENT, JsonCrawler, MasterCrawler,
    ProjectCrawler, RegexFileCrawler, Registration,
};
pub use plugin::{
    AccessDescriptor, CrawlerMap, CrawlerPlugin, FN_ACCESS, Fetched, PluginRegistry, fetch,
    fetched,
};
pub use walk::WalkDepth;
