//! Jobs, workspaces and the export drivers for jobdex.
//!
//! This crate ties the pieces together: jobs are written to a [`Workspace`],
//! crawled by the crawler crate, and exported into a sink with [`export`] or
//! [`export_bulk`].

pub mod export;
pub mod job;

pub use export::{ExportProgress, ExportSummary, SilentProgress, export, export_bulk};
pub use job::{Job, JobDocument, Workspace};
