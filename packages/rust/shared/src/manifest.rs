//! Job manifest files and their integrity check.
//!
//! A job directory is named after the identity of its parameter set, and the
//! manifest inside it holds that parameter set. A directory whose manifest is
//! missing, unreadable or hashes to a different identity is corrupted.

use std::path::Path;

use serde_json::Value;

use crate::error::{JobdexError, Result};
use crate::hashing::{Identity, calc_id};
use crate::types::ParameterSet;

/// Manifest filename inside each job directory.
pub const FN_MANIFEST: &str = "signac_statepoint.json";

/// Companion job document filename inside each job directory.
pub const FN_JOB_DOCUMENT: &str = "signac_job_document.json";

/// Read and verify the manifest of the job directory `job_dir`.
///
/// Every failure is reported as [`JobdexError::ManifestCorruption`] keyed by
/// the directory name.
pub fn read_statepoint(job_dir: &Path) -> Result<(Identity, ParameterSet)> {
    let job_id = job_dir
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let path = job_dir.join(FN_MANIFEST);

    let content = std::fs::read(&path)
        .map_err(|e| JobdexError::corrupted(&job_id, format!("cannot read manifest: {e}")))?;
    let value: Value = serde_json::from_slice(&content)
        .map_err(|e| JobdexError::corrupted(&job_id, format!("malformed manifest: {e}")))?;
    let Value::Object(statepoint) = value else {
        return Err(JobdexError::corrupted(&job_id, "manifest is not a mapping"));
    };

    let id = calc_id(&statepoint)?;
    if id.as_str() != job_id {
        return Err(JobdexError::corrupted(
            &job_id,
            format!("manifest hashes to {id}"),
        ));
    }
    Ok((id, statepoint))
}
