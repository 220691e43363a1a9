//! Explicit registry of formats and adapters.
//!
//! Extensions register their formats and adapters once at startup; the
//! conversion network is then built from whatever the registry holds.

use std::sync::Arc;

use tracing::debug;

use crate::adapter::{self, Adapter};
use crate::network::ConversionNetwork;
use crate::payload::{FORMAT_BYTES, FORMAT_JSON, FORMAT_RAW_FILE, FORMAT_TEXT};

/// Whether a format holds data directly or is derived from other formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatKind {
    Basic,
    Derived,
}

/// A registered format node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatInfo {
    pub name: String,
    pub kind: FormatKind,
}

/// Holds registered formats and adapters in registration order.
#[derive(Default, Clone)]
pub struct FormatRegistry {
    formats: Vec<FormatInfo>,
    adapters: Vec<Arc<dyn Adapter>>,
}

impl FormatRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry pre-populated with the basic formats and their adapters.
    pub fn with_basics() -> Self {
        let mut registry = Self::new();
        for name in [FORMAT_BYTES, FORMAT_TEXT, FORMAT_JSON] {
            registry.register_format(name, FormatKind::Basic);
        }
        registry.register_file_format(FORMAT_RAW_FILE);
        registry.register_adapter(adapter::bytes_to_text());
        registry.register_adapter(adapter::text_to_json());
        registry.register_adapter(adapter::json_to_text());
        registry
    }

    /// Register a format node. Registering a known name again updates its kind.
    pub fn register_format(&mut self, name: impl Into<String>, kind: FormatKind) -> &mut Self {
        let name = name.into();
        match self.formats.iter_mut().find(|f| f.name == name) {
            Some(existing) => existing.kind = kind,
            None => self.formats.push(FormatInfo { name, kind }),
        }
        self
    }

    /// Register an adapter edge. Unknown endpoint formats are added as derived.
    pub fn register_adapter(&mut self, adapter: impl Adapter + 'static) -> &mut Self {
        self.register_shared_adapter(Arc::new(adapter))
    }

    /// Register an adapter that is shared with other registries.
    pub fn register_shared_adapter(&mut self, adapter: Arc<dyn Adapter>) -> &mut Self {
        for endpoint in [adapter.source(), adapter.target()] {
            if !self.formats.iter().any(|f| f.name == endpoint) {
                self.formats.push(FormatInfo {
                    name: endpoint.to_string(),
                    kind: FormatKind::Derived,
                });
            }
        }
        debug!(adapter = %adapter.name(), weight = adapter.weight(), "registered adapter");
        self.adapters.push(adapter);
        self
    }

    /// Register a format whose payloads are fetched [`RawFile`](crate::RawFile)
    /// handles, together with an adapter reading them into `bytes`.
    pub fn register_file_format(&mut self, name: impl Into<String>) -> &mut Self {
        let name = name.into();
        self.register_format(name.clone(), FormatKind::Basic);
        self.register_adapter(adapter::read_file(name))
    }

    pub fn formats(&self) -> &[FormatInfo] {
        &self.formats
    }

    pub fn adapters(&self) -> &[Arc<dyn Adapter>] {
        &self.adapters
    }

    /// Build a fresh conversion network from the current registrations.
    pub fn build_network(&self) -> ConversionNetwork {
        ConversionNetwork::new(
            self.formats.iter().map(|f| f.name.clone()),
            self.adapters.iter().cloned(),
        )
    }
}
