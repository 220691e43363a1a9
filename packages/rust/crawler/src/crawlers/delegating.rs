//! Delegating crawler: composes sub-indexes found through access descriptors.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use jobdex_shared::{AccessAddress, Document, Result};

use crate::crawler::{Crawl, Crawler, DocStream, FetchStream};
use crate::plugin::{self, FN_ACCESS, PluginRegistry};
use crate::walk::{absolute, relative_to};

/// Reacts only to access descriptors. Each descriptor's sub-crawlers are
/// crawled in full and their documents stamped with the address needed to
/// fetch them again later.
#[derive(Clone)]
pub struct MasterCrawler {
    root: PathBuf,
    plugins: Arc<PluginRegistry>,
}

impl MasterCrawler {
    pub fn new(root: impl Into<PathBuf>, plugins: Arc<PluginRegistry>) -> Self {
        Self {
            root: root.into(),
            plugins,
        }
    }

    pub fn plugins(&self) -> &PluginRegistry {
        &self.plugins
    }
}

impl Crawler for MasterCrawler {
    fn root(&self) -> &Path {
        &self.root
    }

    fn docs_from_file(&self, dirpath: &Path, filename: &str) -> Result<DocStream> {
        if filename != FN_ACCESS {
            return Ok(Box::new(std::iter::empty()));
        }
        let crawlers = self.plugins.load(&dirpath.join(filename))?;
        let project = relative_to(dirpath, &self.root);
        let crawler_root = absolute(dirpath);
        let module = filename.to_string();

        let docs = crawlers.into_iter().flat_map(move |(crawler_id, crawler)| {
            let address = AccessAddress {
                project: project.clone(),
                crawler_root: crawler_root.clone(),
                module: module.clone(),
                crawler_id,
            };
            Crawl::new(crawler, 0).map(move |item| {
                item.map(|(_, mut doc): (String, Document)| {
                    doc.set_address(address.clone());
                    doc
                })
            })
        });
        Ok(Box::new(docs))
    }

    fn fetch(&self, doc: &Document) -> Result<FetchStream> {
        plugin::fetch(doc, &self.plugins)
    }

    fn name(&self) -> &str {
        "master"
    }
}
