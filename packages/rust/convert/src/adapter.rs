//! Adapters: directed, weighted conversions between two formats.

use std::any::Any;

use jobdex_shared::BoxError;

use crate::payload::{FORMAT_BYTES, FORMAT_JSON, FORMAT_TEXT, Payload, RawFile};

/// Default cost of an adapter edge.
pub const DEFAULT_WEIGHT: u32 = 1;

/// A conversion from one format to another.
///
/// The network feeds each adapter the previous adapter's output, so
/// `convert` must return a payload tagged with [`Adapter::target`].
pub trait Adapter: Send + Sync {
    /// Format this adapter consumes.
    fn source(&self) -> &str;

    /// Format this adapter produces.
    fn target(&self) -> &str;

    /// Non-negative edge cost used by path search.
    fn weight(&self) -> u32 {
        DEFAULT_WEIGHT
    }

    /// Convert `input` (tagged with [`Adapter::source`]).
    fn convert(&self, input: Payload) -> Result<Payload, BoxError>;

    /// Human-readable name for tracing and error messages.
    fn name(&self) -> String {
        format!("{}->{}", self.source(), self.target())
    }
}

type ConvertFn = Box<dyn Fn(Payload) -> Result<Payload, BoxError> + Send + Sync>;

/// An adapter backed by a closure.
pub struct FnAdapter {
    source: String,
    target: String,
    weight: u32,
    f: ConvertFn,
}

impl FnAdapter {
    /// Adapter over whole payloads.
    pub fn new<F>(source: impl Into<String>, target: impl Into<String>, f: F) -> Self
    where
        F: Fn(Payload) -> Result<Payload, BoxError> + Send + Sync + 'static,
    {
        Self {
            source: source.into(),
            target: target.into(),
            weight: DEFAULT_WEIGHT,
            f: Box::new(f),
        }
    }

    /// Adapter over typed values: the input is downcast to `I` and the
    /// output is tagged with `target`.
    pub fn typed<I, O, F>(source: impl Into<String>, target: impl Into<String>, f: F) -> Self
    where
        I: Any,
        O: Any + Send,
        F: Fn(I) -> Result<O, BoxError> + Send + Sync + 'static,
    {
        let target = target.into();
        let tag = target.clone();
        Self::new(source, target, move |input: Payload| {
            let format = input.format().to_string();
            let value = input.into_value::<I>().map_err(|_| {
                format!(
                    "payload tagged '{format}' does not hold a {}",
                    std::any::type_name::<I>()
                )
            })?;
            Ok(Payload::new(tag.clone(), f(value)?))
        })
    }

    /// Override the edge cost.
    pub fn with_weight(mut self, weight: u32) -> Self {
        self.weight = weight;
        self
    }
}

impl Adapter for FnAdapter {
    fn source(&self) -> &str {
        &self.source
    }

    fn target(&self) -> &str {
        &self.target
    }

    fn weight(&self) -> u32 {
        self.weight
    }

    fn convert(&self, input: Payload) -> Result<Payload, BoxError> {
        (self.f)(input)
    }
}

// ---------------------------------------------------------------------------
// Built-in adapters between the basic formats
// ---------------------------------------------------------------------------

/// `bytes -> text` (UTF-8 decode).
pub fn bytes_to_text() -> FnAdapter {
    FnAdapter::typed(FORMAT_BYTES, FORMAT_TEXT, |bytes: Vec<u8>| {
        Ok(String::from_utf8(bytes)?)
    })
}

/// `text -> json` (parse).
pub fn text_to_json() -> FnAdapter {
    FnAdapter::typed(FORMAT_TEXT, FORMAT_JSON, |text: String| {
        Ok(serde_json::from_str::<serde_json::Value>(&text)?)
    })
}

/// `json -> text` (serialize).
pub fn json_to_text() -> FnAdapter {
    FnAdapter::typed(FORMAT_JSON, FORMAT_TEXT, |value: serde_json::Value| {
        Ok(serde_json::to_string(&value)?)
    })
}

/// `<file format> -> bytes`: read a fetched [`RawFile`].
pub fn read_file(file_format: impl Into<String>) -> FnAdapter {
    FnAdapter::typed(file_format, FORMAT_BYTES, |file: RawFile| Ok(file.read()?))
}
