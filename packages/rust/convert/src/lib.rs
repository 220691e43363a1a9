//! Format registry and conversion network.
//!
//! This crate provides:
//! - [`Payload`] — a value tagged with the name of its format
//! - [`Adapter`] — a directed, weighted conversion between two formats
//! - [`FormatRegistry`] — explicit registration of formats and adapters
//! - [`ConversionNetwork`] — shortest-path conversion over the registered graph

pub mod adapter;
pub mod network;
pub mod payload;
pub mod registry;

pub use adapter::{Adapter, DEFAULT_WEIGHT, FnAdapter};
pub use network::{ConversionNetwork, Converted, convert, converted};
pub use payload::{FORMAT_BYTES, FORMAT_JSON, FORMAT_RAW_FILE, FORMAT_TEXT, Payload, RawFile};
pub use registry::{FormatInfo, FormatKind, FormatRegistry};
