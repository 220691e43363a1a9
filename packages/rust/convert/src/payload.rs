//! Format-tagged payloads flowing through the conversion network.

use std::any::Any;
use std::fs::File;
use std::path::{Path, PathBuf};

/// Format tag of raw byte buffers (`Vec<u8>`).
pub const FORMAT_BYTES: &str = "bytes";
/// Format tag of UTF-8 text (`String`).
pub const FORMAT_TEXT: &str = "text";
/// Format tag of parsed JSON (`serde_json::Value`).
pub const FORMAT_JSON: &str = "json";
/// Format tag of an unopened file handle ([`RawFile`]).
pub const FORMAT_RAW_FILE: &str = "raw_file";

/// A value together with the name of the format it is encoded in.
pub struct Payload {
    format: String,
    value: Box<dyn Any + Send>,
}

impl Payload {
    /// Wrap `value` as a payload of `format`.
    pub fn new<T: Any + Send>(format: impl Into<String>, value: T) -> Self {
        Self {
            format: format.into(),
            value: Box::new(value),
        }
    }

    pub fn bytes(value: Vec<u8>) -> Self {
        Self::new(FORMAT_BYTES, value)
    }

    pub fn text(value: impl Into<String>) -> Self {
        Self::new(FORMAT_TEXT, value.into())
    }

    pub fn json(value: serde_json::Value) -> Self {
        Self::new(FORMAT_JSON, value)
    }

    /// The payload's format tag.
    pub fn format(&self) -> &str {
        &self.format
    }

    /// Borrow the value if it has type `T`.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }

    /// Take the value out if it has type `T`; otherwise hand the payload back.
    pub fn into_value<T: Any>(self) -> Result<T, Self> {
        let Self { format, value } = self;
        match value.downcast::<T>() {
            Ok(v) => Ok(*v),
            Err(value) => Err(Self { format, value }),
        }
    }

    /// Re-tag the payload without touching its value.
    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = format.into();
        self
    }
}

impl std::fmt::Debug for Payload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Payload")
            .field("format", &self.format)
            .finish_non_exhaustive()
    }
}

/// Lazy handle to a file on disk; nothing is read until asked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFile {
    path: PathBuf,
}

impl RawFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Open the file for streaming reads.
    pub fn open(&self) -> std::io::Result<File> {
        File::open(&self.path)
    }

    /// Read the whole file.
    pub fn read(&self) -> std::io::Result<Vec<u8>> {
        std::fs::read(&self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn downcast_checks_type() {
        let payload = Payload::text("hello");
        assert_eq!(payload.format(), FORMAT_TEXT);
        assert_eq!(payload.downcast_ref::<String>().map(String::as_str), Some("hello"));
        assert!(payload.downcast_ref::<Vec<u8>>().is_none());

        let payload = payload.into_value::<Vec<u8>>().unwrap_err();
        assert_eq!(payload.into_value::<String>().unwrap(), "hello");
    }

    #[test]
    fn raw_file_is_lazy() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.txt");
        let handle = RawFile::new(&path);
        assert!(handle.read().is_err());

        std::fs::write(&path, b"abc").unwrap();
        assert_eq!(handle.read().unwrap(), b"abc");
        assert_eq!(handle.path(), path.as_path());
    }
}
