//! Jobs and the workspace holding them.
//!
//! A job is a directory named after the identity of its parameter set. The
//! directory holds the manifest (the parameter set itself, pretty-printed)
//! and an optional job document with free-form metadata.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use jobdex_shared::{
    FN_JOB_DOCUMENT, FN_MANIFEST, Identity, JobdexError, ParameterSet, Result, calc_id,
    read_statepoint,
};
use serde::Serialize;
use serde_json::{Map, Value};
use tempfile::NamedTempFile;
use tracing::{debug, info, instrument, warn};

// ---------------------------------------------------------------------------
// Workspace
// ---------------------------------------------------------------------------

/// Directory whose children are job directories.
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Handle to the job for `statepoint`. Nothing is written until [`Job::init`].
    pub fn open_job<T: Serialize + ?Sized>(&self, statepoint: &T) -> Result<Job> {
        let id = calc_id(statepoint)?;
        let statepoint = match serde_json::to_value(statepoint) {
            Ok(Value::Object(map)) => map,
            _ => return Err(JobdexError::invalid_parameter_set("not a mapping")),
        };
        Ok(Job {
            dir: self.root.join(id.as_str()),
            id,
            statepoint,
        })
    }

    /// Handle to an existing job, verified against its manifest.
    pub fn open_job_by_id(&self, id: &str) -> Result<Job> {
        let (id, statepoint) = read_statepoint(&self.root.join(id))?;
        Ok(Job {
            dir: self.root.join(id.as_str()),
            id,
            statepoint,
        })
    }

    /// Names of all job directories, sorted. A missing workspace has no jobs.
    pub fn job_ids(&self) -> Result<Vec<String>> {
        let entries = match std::fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(JobdexError::io(&self.root, e)),
        };
        let mut ids = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| JobdexError::io(&self.root, e))?;
            if entry.path().is_dir() {
                ids.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        ids.sort();
        Ok(ids)
    }

    /// The verified parameter set of job `id`.
    pub fn read_statepoint(&self, id: &str) -> Result<ParameterSet> {
        read_statepoint(&self.root.join(id)).map(|(_, statepoint)| statepoint)
    }

    /// Verify every job's manifest, reporting all corrupted jobs at once.
    #[instrument(skip_all, fields(root = %self.root.display()))]
    pub fn check(&self) -> Result<()> {
        let ids = self.job_ids()?;
        let mut corrupted = Vec::new();
        for id in &ids {
            if let Err(e) = read_statepoint(&self.root.join(id)) {
                warn!(job_id = %id, error = %e, "corrupted job");
                corrupted.push(id.clone());
            }
        }
        info!(jobs = ids.len(), corrupted = corrupted.len(), "workspace checked");
        if corrupted.is_empty() {
            Ok(())
        } else {
            Err(JobdexError::JobsCorrupted { job_ids: corrupted })
        }
    }
}

// ---------------------------------------------------------------------------
// Job
// ---------------------------------------------------------------------------

/// Handle to the data of one parameter set.
#[derive(Debug, Clone)]
pub struct Job {
    id: Identity,
    statepoint: ParameterSet,
    dir: PathBuf,
}

impl Job {
    pub fn id(&self) -> &Identity {
        &self.id
    }

    pub fn statepoint(&self) -> &ParameterSet {
        &self.statepoint
    }

    /// The job's directory.
    pub fn workspace(&self) -> &Path {
        &self.dir
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.dir.join(FN_MANIFEST)
    }

    /// Create the job directory and write the manifest.
    ///
    /// An existing manifest is left untouched.
    pub fn init(&self) -> Result<()> {
        self.create_directory(false)
    }

    /// Create the job directory and replace the manifest.
    pub fn init_overwrite(&self) -> Result<()> {
        self.create_directory(true)
    }

    /// Load the job document, initializing the job first.
    pub fn document(&self) -> Result<JobDocument> {
        self.init()?;
        JobDocument::load(self.dir.join(FN_JOB_DOCUMENT))
    }

    fn create_directory(&self, overwrite: bool) -> Result<()> {
        std::fs::create_dir_all(&self.dir).map_err(|e| JobdexError::io(&self.dir, e))?;
        let blob = serde_json::to_string_pretty(&self.statepoint)
            .map_err(|e| JobdexError::invalid_parameter_set(e.to_string()))?;
        let path = self.manifest_path();

        if overwrite {
            write_atomic(&path, blob.as_bytes())?;
            debug!(job_id = %self.id, "manifest replaced");
            return Ok(());
        }

        let written = write_new(&path, |file| {
            file.write_all(blob.as_bytes())?;
            file.sync_all()
        })?;
        if written {
            debug!(job_id = %self.id, "manifest written");
        }
        Ok(())
    }
}

/// Create `path` exclusively and fill it with `write`.
///
/// Returns `false` without touching anything if `path` already exists. A
/// partially written file is removed when `write` fails.
fn write_new<F>(path: &Path, write: F) -> Result<bool>
where
    F: FnOnce(&mut File) -> std::io::Result<()>,
{
    let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => return Ok(false),
        Err(e) => return Err(JobdexError::io(path, e)),
    };
    if let Err(e) = write(&mut file) {
        drop(file);
        // Best effort; the write error is what gets reported.
        let _ = std::fs::remove_file(path);
        return Err(JobdexError::io(path, e));
    }
    Ok(true)
}

impl std::fmt::Display for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.id)
    }
}

/// Write `content` to a temp file next to `path`, then rename it into place.
fn write_atomic(path: &Path, content: &[u8]) -> Result<()> {
    let dir = path.parent().unwrap_or(Path::new("."));
    let io_err = |e| JobdexError::io(path, e);
    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| JobdexError::io(dir, e))?;
    tmp.write_all(content).map_err(io_err)?;
    tmp.flush().map_err(io_err)?;
    tmp.as_file_mut().sync_all().map_err(io_err)?;
    tmp.persist(path).map_err(|e| io_err(e.error))?;
    Ok(())
}

// ---------------------------------------------------------------------------
// JobDocument
// ---------------------------------------------------------------------------

/// JSON object store for job-scoped metadata, saved explicitly.
#[derive(Debug, Clone)]
pub struct JobDocument {
    path: PathBuf,
    data: Map<String, Value>,
}

impl JobDocument {
    /// Load the document at `path`; a missing file is an empty document.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let data = match std::fs::read(&path) {
            Ok(content) => match serde_json::from_slice(&content) {
                Ok(Value::Object(map)) => map,
                Ok(_) => {
                    return Err(JobdexError::parse(format!(
                        "{}: job document is not a mapping",
                        path.display()
                    )));
                }
                Err(e) => return Err(JobdexError::parse(format!("{}: {e}", path.display()))),
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Map::new(),
            Err(e) => return Err(JobdexError::io(&path, e)),
        };
        Ok(Self { path, data })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    /// Set `key`, returning the previous value.
    pub fn set(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.data.insert(key.into(), value)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.data.remove(key)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.data
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Persist the document, replacing the file atomically.
    pub fn save(&self) -> Result<()> {
        let blob = serde_json::to_vec_pretty(&self.data)
            .map_err(|e| JobdexError::parse(e.to_string()))?;
        write_atomic(&self.path, &blob)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn failed_exclusive_write_leaves_no_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join(FN_MANIFEST);

        let err = write_new(&path, |file| {
            file.write_all(b"{\"a\":")?;
            Err(std::io::Error::other("disk full"))
        })
        .unwrap_err();
        assert!(matches!(err, JobdexError::Io { .. }));
        assert!(!path.exists());

        assert!(write_new(&path, |file| file.write_all(b"{}")).unwrap());
        assert!(!write_new(&path, |file| file.write_all(b"[]")).unwrap());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{}");
    }

    #[test]
    fn init_writes_pretty_manifest() {
        let tmp = tempfile::tempdir().unwrap();
        let ws = Workspace::new(tmp.path());
        let job = ws.open_job(&json!({"b": 2, "a": 1})).unwrap();
        job.init().unwrap();

        let content = std::fs::read_to_string(job.manifest_path()).unwrap();
        assert!(content.contains("\n  \"a\": 1"));
        assert_eq!(serde_json::from_str::<Value>(&content).unwrap(), json!({"a": 1, "b": 2}));
        assert_eq!(job.workspace().file_name().unwrap(), job.id().as_str());
        assert_eq!(ws.read_statepoint(job.id().as_str()).unwrap(), *job.statepoint());
    }

    #[test]
    fn init_leaves_existing_manifest_untouched() {
        let tmp = tempfile::tempdir().unwrap();
        let job = Workspace::new(tmp.path()).open_job(&json!({"a": 1})).unwrap();
        job.init().unwrap();
        std::fs::write(job.manifest_path(), "edited").unwrap();

        job.init().unwrap();
        assert_eq!(std::fs::read_to_string(job.manifest_path()).unwrap(), "edited");

        job.init_overwrite().unwrap();
        assert_eq!(
            serde_json::from_str::<Value>(&std::fs::read_to_string(job.manifest_path()).unwrap())
                .unwrap(),
            json!({"a": 1})
        );
    }

    #[test]
    fn non_mapping_statepoint_is_rejected() {
        let ws = Workspace::new("unused");
        let err = ws.open_job(&json!([1, 2])).unwrap_err();
        assert!(matches!(err, JobdexError::InvalidParameterSet { .. }));
    }

    #[test]
    fn job_document_round_trip() {
        let tmp = tempfile::tempdir().unwrap();
        let job = Workspace::new(tmp.path()).open_job(&json!({"T": 1.5})).unwrap();

        let mut doc = job.document().unwrap();
        assert!(doc.is_empty());
        assert!(job.manifest_path().is_file());
        doc.set("status", json!("running"));
        doc.set("steps", json!(10));
        assert_eq!(doc.set("status", json!("done")), Some(json!("running")));
        doc.remove("steps");
        doc.save().unwrap();

        let reloaded = job.document().unwrap();
        assert_eq!(reloaded.get("status"), Some(&json!("done")));
        assert!(reloaded.get("steps").is_none());
    }

    #[test]
    fn check_reports_every_corrupted_job() {
        let tmp = tempfile::tempdir().unwrap();
        let ws = Workspace::new(tmp.path());
        for n in 0..3 {
            ws.open_job(&json!({"n": n})).unwrap().init().unwrap();
        }
        assert!(ws.check().is_ok());

        std::fs::create_dir_all(tmp.path().join("not-a-job")).unwrap();
        let victim = ws.open_job(&json!({"n": 0})).unwrap();
        std::fs::write(victim.manifest_path(), r#"{"n": 99}"#).unwrap();

        match ws.check() {
            Err(JobdexError::JobsCorrupted { job_ids }) => {
                let mut expected = vec!["not-a-job".to_string(), victim.id().to_string()];
                expected.sort();
                assert_eq!(job_ids, expected);
            }
            other => panic!("expected JobsCorrupted, got {other:?}"),
        }
    }

    #[test]
    fn open_by_id_verifies_manifest() {
        let tmp = tempfile::tempdir().unwrap();
        let ws = Workspace::new(tmp.path());
        let job = ws.open_job(&json!({"x": "y"})).unwrap();
        job.init().unwrap();

        let reopened = ws.open_job_by_id(job.id().as_str()).unwrap();
        assert_eq!(reopened.statepoint(), job.statepoint());
        assert!(ws.open_job_by_id("nope").unwrap_err().is_corruption());
        assert_eq!(ws.job_ids().unwrap(), vec![job.id().to_string()]);
    }
}
