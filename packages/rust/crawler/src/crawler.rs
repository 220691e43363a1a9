//! The crawler contract and the lazy crawl it drives.

use std::collections::BTreeSet;
use std::ops::Deref;
use std::path::{Path, PathBuf};

use jobdex_convert::Payload;
use jobdex_shared::{Document, JobdexError, Result, calc_doc_id};
use tracing::{debug, info, warn};

use crate::walk::{WalkDepth, absolute, relative_to};

/// Documents extracted from one file.
pub type DocStream = Box<dyn Iterator<Item = Result<Document>>>;

/// Raw payloads re-opened for one document.
pub type FetchStream = Box<dyn Iterator<Item = Result<Payload>>>;

/// Discovers documents in files below a root directory.
///
/// Streams returned by a crawler own their data, so a crawler can be dropped
/// while its streams are still being consumed.
pub trait Crawler {
    /// Directory the crawl starts from.
    fn root(&self) -> &Path;

    /// Inspect a directory as the walk enters it, before any of its files.
    fn check_dir(&self, _dirpath: &Path) -> Result<()> {
        Ok(())
    }

    /// Extract zero or more documents from `dirpath/filename`.
    fn docs_from_file(&self, dirpath: &Path, filename: &str) -> Result<DocStream>;

    /// Re-open the raw data behind a document this crawler produced.
    fn fetch(&self, _doc: &Document) -> Result<FetchStream> {
        Ok(Box::new(std::iter::empty()))
    }

    /// Human-readable crawler name for tracing.
    fn name(&self) -> &str;
}

/// Starts crawls on any [`Crawler`], including trait objects.
pub trait CrawlerExt: Crawler {
    /// Lazily crawl `root()` up to `max_depth` directory levels (0 = unbounded).
    fn crawl(&self, max_depth: usize) -> Crawl<&Self> {
        Crawl::new(self, max_depth)
    }
}

impl<C: Crawler + ?Sized> CrawlerExt for C {}

/// Errors a crawl hands to its consumer instead of logging and skipping.
pub fn is_surfaced(error: &JobdexError) -> bool {
    error.is_corruption()
        || matches!(
            error,
            JobdexError::Plugin { .. } | JobdexError::CrawlerNotFound { .. }
        )
}

// ---------------------------------------------------------------------------
// Crawl
// ---------------------------------------------------------------------------

/// Lazy sequence of `(key, document)` pairs produced by walking a crawler's root.
///
/// File-level I/O and parse failures are logged and skipped. Corrupted jobs
/// and access descriptor failures are yielded as errors, and the walk
/// continues after them.
pub struct Crawl<R> {
    crawler: R,
    walker: WalkDepth,
    dirpath: PathBuf,
    files: std::vec::IntoIter<String>,
    current: Option<(DocStream, String)>,
    finished: bool,
}

impl<R> Crawl<R>
where
    R: Deref,
    R::Target: Crawler,
{
    /// Start a crawl over any handle to a crawler (a reference or an owned box).
    pub fn new(crawler: R, max_depth: usize) -> Self {
        let root = crawler.root().to_path_buf();
        info!(crawler = crawler.name(), root = %root.display(), depth = max_depth, "crawling");
        Self {
            walker: WalkDepth::new(root.clone(), max_depth),
            crawler,
            dirpath: root,
            files: Vec::new().into_iter(),
            current: None,
            finished: false,
        }
    }
}

/// Fill in missing provenance and the content-derived key.
fn keyed(
    mut doc: Document,
    root: &Path,
    dirpath: &Path,
    filename: &str,
) -> Result<(String, Document)> {
    if doc.filename.is_none() {
        doc.filename = Some(relative_to(&dirpath.join(filename), root));
    }
    if doc.root.is_none() {
        doc.root = Some(absolute(root).to_string_lossy().into_owned());
    }
    let key = match &doc.id {
        Some(id) => id.clone(),
        None => {
            let id = calc_doc_id(&doc, dirpath, filename)?.to_string();
            doc.id = Some(id.clone());
            id
        }
    };
    Ok((key, doc))
}

impl<R> Iterator for Crawl<R>
where
    R: Deref,
    R::Target: Crawler,
{
    type Item = Result<(String, Document)>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some((stream, filename)) = &mut self.current {
                match stream.next() {
                    Some(Ok(doc)) => {
                        debug!(file = %self.dirpath.join(&*filename).display(), "doc from file");
                        let root = self.crawler.root();
                        return Some(keyed(doc, root, &self.dirpath, filename));
                    }
                    Some(Err(e)) if is_surfaced(&e) => return Some(Err(e)),
                    Some(Err(e)) => {
                        warn!(file = %self.dirpath.join(&*filename).display(), error = %e, "skipping document");
                    }
                    None => self.current = None,
                }
                continue;
            }

            if let Some(filename) = self.files.next() {
                match self.crawler.docs_from_file(&self.dirpath, &filename) {
                    Ok(stream) => self.current = Some((stream, filename)),
                    Err(e) if is_surfaced(&e) => return Some(Err(e)),
                    Err(e) => {
                        warn!(file = %self.dirpath.join(&filename).display(), error = %e, "skipping file");
                    }
                }
                continue;
            }

            match self.walker.next() {
                Some((dirpath, files)) => {
                    self.dirpath = dirpath;
                    self.files = files.into_iter();
                    match self.crawler.check_dir(&self.dirpath) {
                        Ok(()) => {}
                        Err(e) if is_surfaced(&e) => return Some(Err(e)),
                        Err(e) => {
                            warn!(dir = %self.dirpath.display(), error = %e, "directory check failed");
                        }
                    }
                }
                None => {
                    if !self.finished {
                        self.finished = true;
                        info!(crawler = self.crawler.name(), "crawl done");
                    }
                    return None;
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// CrawlOutcome
// ---------------------------------------------------------------------------

/// A fully drained crawl: documents plus everything that went wrong.
#[derive(Debug, Default)]
pub struct CrawlOutcome {
    /// Indexed `(key, document)` pairs, in crawl order.
    pub documents: Vec<(String, Document)>,
    /// Ids of corrupted jobs, one entry per job.
    pub corrupted: BTreeSet<String>,
    /// Other surfaced errors (access descriptor failures and the like).
    pub errors: Vec<JobdexError>,
}

impl CrawlOutcome {
    /// Drain a crawl, batching its errors.
    pub fn collect<I>(items: I) -> Self
    where
        I: IntoIterator<Item = Result<(String, Document)>>,
    {
        let mut outcome = Self::default();
        for item in items {
            match item {
                Ok(pair) => outcome.documents.push(pair),
                Err(e) => outcome.record_error(e),
            }
        }
        outcome
    }

    /// Classify a surfaced error.
    pub fn record_error(&mut self, error: JobdexError) {
        match error {
            JobdexError::ManifestCorruption { job_id, reason } => {
                warn!(job_id = %job_id, reason = %reason, "corrupted job");
                self.corrupted.insert(job_id);
            }
            JobdexError::JobsCorrupted { job_ids } => self.corrupted.extend(job_ids),
            other => {
                warn!(error = %other, "crawl error");
                self.errors.push(other);
            }
        }
    }

    /// The documents, or [`JobdexError::JobsCorrupted`] listing every corrupted job.
    pub fn into_result(self) -> Result<Vec<(String, Document)>> {
        if self.corrupted.is_empty() {
            Ok(self.documents)
        } else {
            Err(JobdexError::JobsCorrupted {
                job_ids: self.corrupted.into_iter().collect(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    /// Emits one document per file, naming the file; fails on `bad*` files.
    struct EchoCrawler {
        root: PathBuf,
    }

    impl Crawler for EchoCrawler {
        fn root(&self) -> &Path {
            &self.root
        }

        fn docs_from_file(&self, _dirpath: &Path, filename: &str) -> Result<DocStream> {
            if filename.starts_with("bad") {
                return Err(JobdexError::parse("unreadable"));
            }
            if filename.starts_with("corrupt") {
                return Err(JobdexError::corrupted(filename, "test"));
            }
            let mut doc = Document::default();
            doc.insert("name", json!(filename));
            Ok(Box::new(std::iter::once(Ok(doc))))
        }

        fn name(&self) -> &str {
            "echo"
        }
    }

    fn setup(files: &[&str]) -> tempfile::TempDir {
        let tmp = tempfile::tempdir().unwrap();
        for f in files {
            let path = tmp.path().join(f);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, "x").unwrap();
        }
        tmp
    }

    #[test]
    fn crawl_assigns_content_keys() {
        let tmp = setup(&["a.txt", "sub/b.txt"]);
        let crawler = EchoCrawler {
            root: tmp.path().to_path_buf(),
        };
        let docs: Vec<_> = crawler.crawl(0).map(|r| r.unwrap()).collect();
        assert_eq!(docs.len(), 2);
        for (key, doc) in &docs {
            assert_eq!(doc.id.as_deref(), Some(key.as_str()));
            assert_eq!(doc.format, None);
            assert!(doc.root.is_some());
        }
        assert_eq!(docs[0].1.filename.as_deref(), Some("a.txt"));
        assert_eq!(docs[1].1.filename.as_deref(), Some("sub/b.txt"));
        assert_ne!(docs[0].0, docs[1].0);
    }

    #[test]
    fn recrawl_is_idempotent() {
        let tmp = setup(&["a.txt", "b.txt", "sub/c.txt"]);
        let crawler = EchoCrawler {
            root: tmp.path().to_path_buf(),
        };
        let first: Vec<_> = crawler.crawl(0).map(|r| r.unwrap()).collect();
        let second: Vec<_> = crawler.crawl(0).map(|r| r.unwrap()).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn plain_errors_are_skipped_corruption_is_surfaced() {
        let tmp = setup(&["a.txt", "bad.txt", "corrupt1", "corrupt2", "z.txt"]);
        let crawler = EchoCrawler {
            root: tmp.path().to_path_buf(),
        };
        let outcome = CrawlOutcome::collect(crawler.crawl(0));
        assert_eq!(outcome.documents.len(), 2);
        assert_eq!(outcome.corrupted.len(), 2);
        assert!(outcome.errors.is_empty());

        match outcome.into_result() {
            Err(JobdexError::JobsCorrupted { job_ids }) => {
                assert_eq!(job_ids, vec!["corrupt1", "corrupt2"]);
            }
            other => panic!("expected JobsCorrupted, got {other:?}"),
        }
    }

    #[test]
    fn crawl_works_through_trait_objects() {
        let tmp = setup(&["a.txt"]);
        let crawler: Box<dyn Crawler> = Box::new(EchoCrawler {
            root: tmp.path().to_path_buf(),
        });
        assert_eq!(crawler.crawl(0).count(), 1);
        assert_eq!(Crawl::new(crawler, 0).count(), 1);
    }
}
