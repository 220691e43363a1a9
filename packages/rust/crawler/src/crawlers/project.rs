//! Project-manifest crawler over a workspace of job directories.

use std::path::{Component, Path, PathBuf};

use jobdex_shared::{
    Document, FN_JOB_DOCUMENT, FN_MANIFEST, Identity, JobdexError, ParameterSet, Result,
    is_reserved_key, read_statepoint,
};
use serde_json::{Map, Value};
use tracing::warn;

use crate::crawler::{Crawler, DocStream, FetchStream};
use crate::crawlers::pattern::RegexFileCrawler;

/// Format tag of the per-job metadata document.
pub const FORMAT_JOB_DOCUMENT: &str = "job_document";

/// Field holding the job's identity on every document of a job.
pub const FIELD_JOB_ID: &str = "job_id";

/// Field holding the job's parameter set on every document of a job.
pub const FIELD_STATEPOINT: &str = "statepoint";

/// Crawls a workspace whose first-level directories are jobs.
///
/// Each job's manifest yields one job-level document keyed by the job's
/// identity. Files matched by the pattern registrations yield documents
/// enriched with the job's identity and parameter set. A job whose manifest
/// is missing or does not hash to the directory name is reported as
/// corrupted.
#[derive(Debug, Clone)]
pub struct ProjectCrawler {
    inner: RegexFileCrawler,
}

impl ProjectCrawler {
    pub fn new(workspace: impl Into<PathBuf>) -> Self {
        Self {
            inner: RegexFileCrawler::new(workspace),
        }
    }

    /// Wrap a pattern crawler whose root is the workspace.
    pub fn from_pattern_crawler(inner: RegexFileCrawler) -> Self {
        Self { inner }
    }

    /// Register `pattern` for files of `format` inside job directories.
    pub fn define(&mut self, pattern: &str, format: impl Into<String>) -> Result<&mut Self> {
        self.inner.define(pattern, format)?;
        Ok(self)
    }

    /// The job directory containing `dirpath`, if `dirpath` lies inside one.
    fn job_dir(&self, dirpath: &Path) -> Option<PathBuf> {
        let rel = dirpath.strip_prefix(self.inner.root()).ok()?;
        match rel.components().next()? {
            Component::Normal(name) => Some(self.inner.root().join(name)),
            _ => None,
        }
    }

    fn job_document(&self, job_dir: &Path) -> Result<Document> {
        let (id, statepoint) = read_statepoint(job_dir)?;
        let mut doc = Document {
            id: Some(id.to_string()),
            format: Some(FORMAT_JOB_DOCUMENT.to_string()),
            ..Document::default()
        };
        for (key, value) in read_job_document(job_dir) {
            if !is_reserved_key(&key) {
                doc.fields.insert(key, value);
            }
        }
        enrich(&mut doc, &id, statepoint);
        Ok(doc)
    }
}

fn enrich(doc: &mut Document, id: &Identity, statepoint: ParameterSet) {
    doc.insert(FIELD_JOB_ID, Value::String(id.to_string()));
    doc.insert(FIELD_STATEPOINT, Value::Object(statepoint));
}

/// The job's companion document, or an empty mapping when absent or unreadable.
fn read_job_document(job_dir: &Path) -> Map<String, Value> {
    let path = job_dir.join(FN_JOB_DOCUMENT);
    let content = match std::fs::read(&path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Map::new(),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "cannot read job document");
            return Map::new();
        }
    };
    match serde_json::from_slice(&content) {
        Ok(Value::Object(map)) => map,
        Ok(_) => {
            warn!(path = %path.display(), "job document is not a mapping");
            Map::new()
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "malformed job document");
            Map::new()
        }
    }
}

impl Crawler for ProjectCrawler {
    fn root(&self) -> &Path {
        self.inner.root()
    }

    /// A job directory without a manifest is reported once, even when empty.
    fn check_dir(&self, dirpath: &Path) -> Result<()> {
        if self.job_dir(dirpath).as_deref() != Some(dirpath) {
            return Ok(());
        }
        if dirpath.join(FN_MANIFEST).is_file() {
            return Ok(());
        }
        let job_id = dirpath
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Err(JobdexError::corrupted(job_id, "missing manifest"))
    }

    fn docs_from_file(&self, dirpath: &Path, filename: &str) -> Result<DocStream> {
        let Some(job_dir) = self.job_dir(dirpath) else {
            // Files directly in the workspace belong to no job.
            return Ok(Box::new(std::iter::empty()));
        };

        if filename == FN_MANIFEST && dirpath == job_dir {
            let doc = self.job_document(&job_dir)?;
            return Ok(Box::new(std::iter::once(Ok(doc))));
        }

        let mut docs = self.inner.match_file(dirpath, filename);
        if docs.is_empty() {
            return Ok(Box::new(std::iter::empty()));
        }

        let (id, statepoint) = read_statepoint(&job_dir)?;
        for doc in &mut docs {
            enrich(doc, &id, statepoint.clone());
        }
        Ok(Box::new(docs.into_iter().map(Ok)))
    }

    fn fetch(&self, doc: &Document) -> Result<FetchStream> {
        self.inner.fetch(doc)
    }

    fn name(&self) -> &str {
        "project"
    }
}

#[cfg(test)]
mod tests {
    use jobdex_shared::calc_id;
    use serde_json::json;

    use super::*;
    use crate::crawler::{CrawlOutcome, CrawlerExt};

    fn write_job(workspace: &Path, statepoint: &Value) -> PathBuf {
        let id = calc_id(statepoint).unwrap();
        let dir = workspace.join(id.as_str());
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(FN_MANIFEST), statepoint.to_string()).unwrap();
        dir
    }

    #[test]
    fn manifest_yields_job_document() {
        let tmp = tempfile::tempdir().unwrap();
        let sp = json!({"a": 1, "b": 2});
        write_job(tmp.path(), &sp);

        let crawler = ProjectCrawler::new(tmp.path());
        let docs: Vec<_> = crawler.crawl(0).map(|r| r.unwrap()).collect();
        assert_eq!(docs.len(), 1);

        let (key, doc) = &docs[0];
        let id = calc_id(&sp).unwrap();
        assert_eq!(key, id.as_str());
        assert_eq!(doc.id.as_deref(), Some(id.as_str()));
        assert_eq!(doc.get(FIELD_STATEPOINT), Some(&sp));
        assert_eq!(doc.format.as_deref(), Some(FORMAT_JOB_DOCUMENT));
    }

    #[test]
    fn job_document_fields_are_merged() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = write_job(tmp.path(), &json!({"T": 300}));
        std::fs::write(
            dir.join(FN_JOB_DOCUMENT),
            r#"{"status": "done", "_id": "ignored"}"#,
        )
        .unwrap();

        let crawler = ProjectCrawler::new(tmp.path());
        let docs: Vec<_> = crawler.crawl(0).map(|r| r.unwrap().1).collect();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].get("status"), Some(&json!("done")));
        assert_ne!(docs[0].id.as_deref(), Some("ignored"));
    }

    #[test]
    fn matched_files_are_enriched() {
        let tmp = tempfile::tempdir().unwrap();
        let sp = json!({"n": 4});
        let dir = write_job(tmp.path(), &sp);
        std::fs::create_dir_all(dir.join("out")).unwrap();
        std::fs::write(dir.join("out/traj_7.txt"), "data").unwrap();

        let mut crawler = ProjectCrawler::new(tmp.path());
        crawler.define(r"traj_(?P<frame>\d+)\.txt$", "Trajectory").unwrap();

        let outcome = CrawlOutcome::collect(crawler.crawl(0));
        assert!(outcome.corrupted.is_empty());
        let docs: Vec<_> = outcome.documents.into_iter().map(|(_, d)| d).collect();
        assert_eq!(docs.len(), 2);

        let traj = docs
            .iter()
            .find(|d| d.format.as_deref() == Some("Trajectory"))
            .unwrap();
        assert_eq!(traj.get("frame"), Some(&json!(7)));
        assert_eq!(traj.get(FIELD_STATEPOINT), Some(&sp));
        assert_eq!(
            traj.get(FIELD_JOB_ID),
            Some(&json!(calc_id(&sp).unwrap().as_str()))
        );
    }

    #[test]
    fn every_corrupted_job_is_reported() {
        let tmp = tempfile::tempdir().unwrap();
        write_job(tmp.path(), &json!({"ok": 1}));
        write_job(tmp.path(), &json!({"ok": 2}));

        // Manifest that hashes elsewhere.
        let wrong = tmp.path().join("0".repeat(64));
        std::fs::create_dir_all(&wrong).unwrap();
        std::fs::write(wrong.join(FN_MANIFEST), r#"{"x": 1}"#).unwrap();

        // No manifest at all, several files.
        let bare = tmp.path().join("f".repeat(64));
        std::fs::create_dir_all(&bare).unwrap();
        std::fs::write(bare.join("a.dat"), "").unwrap();
        std::fs::write(bare.join("b.dat"), "").unwrap();

        let outcome = CrawlOutcome::collect(ProjectCrawler::new(tmp.path()).crawl(0));
        assert_eq!(outcome.documents.len(), 2);
        assert_eq!(outcome.corrupted.len(), 2);
        assert!(outcome.corrupted.contains(&"0".repeat(64)));
        assert!(outcome.corrupted.contains(&"f".repeat(64)));
    }

    #[test]
    fn empty_job_directory_is_corrupted() {
        let tmp = tempfile::tempdir().unwrap();
        write_job(tmp.path(), &json!({"ok": 1}));
        std::fs::create_dir_all(tmp.path().join("deadbeef")).unwrap();

        let items: Vec<_> = ProjectCrawler::new(tmp.path()).crawl(0).collect();
        let errors = items.iter().filter(|r| r.is_err()).count();
        assert_eq!(errors, 1);

        let outcome = CrawlOutcome::collect(items);
        assert_eq!(outcome.documents.len(), 1);
        assert_eq!(
            outcome.corrupted.into_iter().collect::<Vec<_>>(),
            vec!["deadbeef".to_string()]
        );
    }

    #[test]
    fn workspace_level_files_are_ignored() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("README.txt"), "").unwrap();
        let mut crawler = ProjectCrawler::new(tmp.path());
        crawler.define(r".*\.txt", "Text").unwrap();
        assert_eq!(crawler.crawl(0).count(), 0);
    }
}
