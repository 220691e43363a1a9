//! Export drivers: crawl output into collection sinks.

use std::collections::BTreeSet;

use jobdex_shared::{Document, JobdexError, Result};
use jobdex_storage::{BulkCollection, Collection, ReplaceOne, id_filter};
use tracing::{debug, info, instrument, warn};

/// Progress callback for export drivers.
pub trait ExportProgress {
    /// Called after each batch is written.
    fn batch_flushed(&self, batch_len: usize, total: usize);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ExportProgress for SilentProgress {
    fn batch_flushed(&self, _batch_len: usize, _total: usize) {}
}

/// What an export wrote and what it had to leave out.
#[derive(Debug, Default)]
pub struct ExportSummary {
    /// Documents written to the sink.
    pub documents: usize,
    /// Bulk writes issued.
    pub batches: usize,
    /// Corrupted jobs met during the crawl.
    pub corrupted: BTreeSet<String>,
    /// Other errors the crawl surfaced.
    pub errors: Vec<JobdexError>,
}

impl ExportSummary {
    fn record_error(&mut self, error: JobdexError) {
        match error {
            JobdexError::ManifestCorruption { job_id, .. } => {
                self.corrupted.insert(job_id);
            }
            JobdexError::JobsCorrupted { job_ids } => self.corrupted.extend(job_ids),
            other => {
                warn!(error = %other, "export skipped an item");
                self.errors.push(other);
            }
        }
    }

    /// The summary, or [`JobdexError::JobsCorrupted`] if any job was corrupted.
    pub fn into_result(self) -> Result<Self> {
        if self.corrupted.is_empty() {
            Ok(self)
        } else {
            Err(JobdexError::JobsCorrupted {
                job_ids: self.corrupted.into_iter().collect(),
            })
        }
    }
}

/// `doc` keyed by `key`: a missing id takes the key, a different one is rejected.
fn check_key(key: &str, mut doc: Document) -> Result<Document> {
    match doc.id.as_deref() {
        Some(id) if id != key => Err(JobdexError::validation(format!(
            "document id '{id}' does not match crawl key '{key}'"
        ))),
        Some(_) => Ok(doc),
        None => {
            doc.id = Some(key.to_string());
            Ok(doc)
        }
    }
}

/// Upsert every crawled document into `collection`, one at a time.
#[instrument(skip_all)]
pub fn export<I, C>(docs: I, collection: &mut C) -> Result<ExportSummary>
where
    I: IntoIterator<Item = Result<(String, Document)>>,
    C: Collection,
{
    info!("exporting index");
    let mut summary = ExportSummary::default();
    for item in docs {
        match item {
            Ok((key, doc)) => {
                let doc = check_key(&key, doc)?;
                collection.replace_one(&id_filter(&key), doc)?;
                summary.documents += 1;
            }
            Err(e) => summary.record_error(e),
        }
    }
    info!(documents = summary.documents, "export done");
    Ok(summary)
}

/// Upsert crawled documents into `collection` in batches of `chunk_size`.
///
/// The pending batch is written both when the input is exhausted and when
/// the export stops early on a key mismatch, so no accepted document is lost.
#[instrument(skip_all, fields(chunk_size = chunk_size))]
pub async fn export_bulk<I, C>(
    docs: I,
    collection: &mut C,
    chunk_size: usize,
    progress: &dyn ExportProgress,
) -> Result<ExportSummary>
where
    I: IntoIterator<Item = Result<(String, Document)>>,
    C: BulkCollection,
{
    let chunk_size = chunk_size.max(1);
    info!("exporting index in bulk");

    let mut summary = ExportSummary::default();
    let mut pending = Vec::with_capacity(chunk_size);
    let mut failure = None;

    for item in docs {
        match item {
            Ok((key, doc)) => {
                let doc = match check_key(&key, doc) {
                    Ok(doc) => doc,
                    Err(e) => {
                        failure = Some(e);
                        break;
                    }
                };
                pending.push(ReplaceOne::new(key, doc));
                if pending.len() >= chunk_size {
                    debug!("pushing chunk");
                    flush(collection, &mut pending, &mut summary, progress).await?;
                }
            }
            Err(e) => summary.record_error(e),
        }
    }

    if !pending.is_empty() {
        debug!("pushing final chunk");
        flush(collection, &mut pending, &mut summary, progress).await?;
    }
    if let Some(e) = failure {
        return Err(e);
    }

    info!(
        documents = summary.documents,
        batches = summary.batches,
        corrupted = summary.corrupted.len(),
        "export done"
    );
    Ok(summary)
}

async fn flush<C: BulkCollection>(
    collection: &mut C,
    pending: &mut Vec<ReplaceOne>,
    summary: &mut ExportSummary,
    progress: &dyn ExportProgress,
) -> Result<()> {
    let batch = std::mem::take(pending);
    let written = collection.bulk_write(batch).await?;
    summary.documents += written;
    summary.batches += 1;
    progress.batch_flushed(written, summary.documents);
    Ok(())
}
