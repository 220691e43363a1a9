//! Access descriptors and the crawler plugins they name.
//!
//! A directory opts into delegation by holding a `jobdex_access.toml`:
//!
//! ```toml
//! plugin = "regex"
//!
//! [options]
//! id = "main"
//! definitions = [{ pattern = '.*\.txt$', format = "Text" }]
//! ```
//!
//! The named plugin must be registered in the [`PluginRegistry`] at startup.
//! Given the descriptor's directory and its `[options]`, it returns the
//! sub-crawlers scoped to that directory, keyed by id.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use jobdex_convert::Payload;
use jobdex_shared::{DefinitionConfig, Document, JobdexError, Result};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::crawler::{Crawler, FetchStream};
use crate::crawlers::{JsonCrawler, ProjectCrawler, RegexFileCrawler};

/// Filename of an access descriptor.
pub const FN_ACCESS: &str = "jobdex_access.toml";

/// Sub-crawlers provided by one access descriptor, keyed by id.
pub type CrawlerMap = BTreeMap<String, Box<dyn Crawler>>;

// ---------------------------------------------------------------------------
// Descriptor
// ---------------------------------------------------------------------------

/// Parsed contents of an access descriptor file.
#[derive(Debug, Clone, Deserialize)]
pub struct AccessDescriptor {
    /// Name of a registered plugin.
    pub plugin: String,
    /// Plugin-specific options.
    #[serde(default)]
    pub options: toml::Table,
}

impl AccessDescriptor {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| JobdexError::plugin(path, format!("cannot read descriptor: {e}")))?;
        toml::from_str(&content)
            .map_err(|e| JobdexError::plugin(path, format!("malformed descriptor: {e}")))
    }
}

// ---------------------------------------------------------------------------
// Plugins
// ---------------------------------------------------------------------------

/// Builds the sub-crawlers for a directory holding an access descriptor.
pub trait CrawlerPlugin: Send + Sync {
    fn get_crawlers(&self, dirpath: &Path, options: &toml::Table) -> Result<CrawlerMap>;
}

impl<F> CrawlerPlugin for F
where
    F: Fn(&Path, &toml::Table) -> Result<CrawlerMap> + Send + Sync,
{
    fn get_crawlers(&self, dirpath: &Path, options: &toml::Table) -> Result<CrawlerMap> {
        self(dirpath, options)
    }
}

/// Explicitly populated set of named crawler plugins.
#[derive(Clone, Default)]
pub struct PluginRegistry {
    plugins: HashMap<String, Arc<dyn CrawlerPlugin>>,
}

impl PluginRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the `regex`, `json` and `project` plugins.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("regex", regex_plugin);
        registry.register("json", json_plugin);
        registry.register("project", project_plugin);
        registry
    }

    /// Register `plugin` under `name`, replacing any previous plugin of that name.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        plugin: impl CrawlerPlugin + 'static,
    ) -> &mut Self {
        let name = name.into();
        debug!(plugin = %name, "registered crawler plugin");
        self.plugins.insert(name, Arc::new(plugin));
        self
    }

    /// Registered plugin names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.plugins.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Load the descriptor at `path` and instantiate its sub-crawlers.
    pub fn load(&self, path: &Path) -> Result<CrawlerMap> {
        let descriptor = AccessDescriptor::load(path)?;
        let plugin = self.plugins.get(&descriptor.plugin).ok_or_else(|| {
            JobdexError::plugin(path, format!("unknown plugin '{}'", descriptor.plugin))
        })?;
        let dirpath = path.parent().unwrap_or(Path::new("."));
        let crawlers = plugin
            .get_crawlers(dirpath, &descriptor.options)
            .map_err(|e| match e {
                JobdexError::Plugin { .. } => e,
                other => JobdexError::plugin(path, other.to_string()),
            })?;
        debug!(descriptor = %path.display(), plugin = %descriptor.plugin, crawlers = crawlers.len(), "loaded access descriptor");
        Ok(crawlers)
    }
}

// ---------------------------------------------------------------------------
// Built-in plugins
// ---------------------------------------------------------------------------

fn default_id() -> String {
    "main".into()
}

fn default_workspace() -> PathBuf {
    PathBuf::from("workspace")
}

#[derive(Debug, Deserialize)]
struct PatternOptions {
    #[serde(default = "default_id")]
    id: String,
    #[serde(default)]
    root: Option<PathBuf>,
    #[serde(default)]
    definitions: Vec<DefinitionConfig>,
}

#[derive(Debug, Deserialize)]
struct JsonOptions {
    #[serde(default = "default_id")]
    id: String,
    #[serde(default)]
    root: Option<PathBuf>,
    #[serde(default)]
    pattern: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProjectOptions {
    #[serde(default = "default_id")]
    id: String,
    #[serde(default = "default_workspace")]
    workspace: PathBuf,
    #[serde(default)]
    definitions: Vec<DefinitionConfig>,
}

fn parse_options<T: DeserializeOwned>(dirpath: &Path, options: &toml::Table) -> Result<T> {
    toml::Value::Table(options.clone())
        .try_into()
        .map_err(|e| JobdexError::plugin(dirpath.join(FN_ACCESS), format!("invalid options: {e}")))
}

fn scoped(dirpath: &Path, root: Option<PathBuf>) -> PathBuf {
    match root {
        Some(root) => dirpath.join(root),
        None => dirpath.to_path_buf(),
    }
}

fn single(id: String, crawler: impl Crawler + 'static) -> CrawlerMap {
    let mut map = CrawlerMap::new();
    map.insert(id, Box::new(crawler));
    map
}

fn regex_plugin(dirpath: &Path, options: &toml::Table) -> Result<CrawlerMap> {
    let opts: PatternOptions = parse_options(dirpath, options)?;
    let crawler =
        RegexFileCrawler::new(scoped(dirpath, opts.root)).with_definitions(&opts.definitions)?;
    Ok(single(opts.id, crawler))
}

fn json_plugin(dirpath: &Path, options: &toml::Table) -> Result<CrawlerMap> {
    let opts: JsonOptions = parse_options(dirpath, options)?;
    let mut crawler = JsonCrawler::new(scoped(dirpath, opts.root));
    if let Some(pattern) = &opts.pattern {
        crawler = crawler.with_pattern(pattern)?;
    }
    Ok(single(opts.id, crawler))
}

fn project_plugin(dirpath: &Path, options: &toml::Table) -> Result<CrawlerMap> {
    let opts: ProjectOptions = parse_options(dirpath, options)?;
    let inner = RegexFileCrawler::new(dirpath.join(&opts.workspace))
        .with_definitions(&opts.definitions)?;
    Ok(single(opts.id, ProjectCrawler::from_pattern_crawler(inner)))
}

// ---------------------------------------------------------------------------
// Fetch
// ---------------------------------------------------------------------------

/// Re-open the raw data behind a delegated document.
///
/// Reloads the document's access descriptor and asks the recorded
/// sub-crawler to fetch it.
pub fn fetch(doc: &Document, plugins: &PluginRegistry) -> Result<FetchStream> {
    let address = doc.address().ok_or_else(|| {
        JobdexError::validation(format!(
            "document {} carries no access address",
            doc.id.as_deref().unwrap_or("<unkeyed>")
        ))
    })?;
    let descriptor = address.descriptor_path();
    let mut crawlers = plugins.load(&descriptor)?;
    let crawler = crawlers
        .remove(&address.crawler_id)
        .ok_or_else(|| JobdexError::CrawlerNotFound {
            crawler_id: address.crawler_id.clone(),
            descriptor,
        })?;
    crawler.fetch(doc)
}

/// Pair every document with each payload fetched for it.
pub fn fetched<I>(docs: I, plugins: &PluginRegistry) -> Fetched<'_, I::IntoIter>
where
    I: IntoIterator<Item = Document>,
{
    Fetched {
        docs: docs.into_iter(),
        plugins,
        current: None,
    }
}

/// Iterator returned by [`fetched`].
pub struct Fetched<'a, I> {
    docs: I,
    plugins: &'a PluginRegistry,
    current: Option<(Document, FetchStream)>,
}

impl<I> Iterator for Fetched<'_, I>
where
    I: Iterator<Item = Document>,
{
    type Item = Result<(Document, Payload)>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some((doc, stream)) = &mut self.current {
                match stream.next() {
                    Some(Ok(payload)) => return Some(Ok((doc.clone(), payload))),
                    Some(Err(e)) => return Some(Err(e)),
                    None => self.current = None,
                }
                continue;
            }
            let doc = self.docs.next()?;
            match fetch(&doc, self.plugins) {
                Ok(stream) => self.current = Some((doc, stream)),
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use jobdex_shared::AccessAddress;

    use super::*;

    fn descriptor(dir: &Path, content: &str) -> PathBuf {
        let path = dir.join(FN_ACCESS);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn builtins_are_registered() {
        assert_eq!(PluginRegistry::with_builtins().names(), vec!["json", "project", "regex"]);
    }

    #[test]
    fn regex_descriptor_loads() {
        let tmp = tempfile::tempdir().unwrap();
        let path = descriptor(
            tmp.path(),
            r#"
plugin = "regex"

[options]
id = "txt"
definitions = [{ pattern = '.*\.txt$', format = "Text" }]
"#,
        );
        let crawlers = PluginRegistry::with_builtins().load(&path).unwrap();
        assert_eq!(crawlers.keys().collect::<Vec<_>>(), vec!["txt"]);
        assert_eq!(crawlers["txt"].root(), tmp.path());
    }

    #[test]
    fn descriptor_failures_are_plugin_errors() {
        let tmp = tempfile::tempdir().unwrap();
        let registry = PluginRegistry::with_builtins();
        let cases = [
            "plugin = ",
            r#"plugin = "nope""#,
            "plugin = \"regex\"\n[options]\ndefinitions = 3",
            "plugin = \"regex\"\n[options]\ndefinitions = [{ pattern = '(', format = 'X' }]",
        ];
        for content in cases {
            let path = descriptor(tmp.path(), content);
            let err = registry.load(&path).err().expect("load should fail");
            assert!(matches!(err, JobdexError::Plugin { .. }), "{content}: {err}");
        }
        let missing = registry.load(&tmp.path().join("absent.toml")).err().unwrap();
        assert!(matches!(missing, JobdexError::Plugin { .. }));
    }

    #[test]
    fn custom_plugins_can_be_registered() {
        let tmp = tempfile::tempdir().unwrap();
        let path = descriptor(tmp.path(), r#"plugin = "mine""#);
        let mut registry = PluginRegistry::new();
        registry.register("mine", |dir: &Path, _: &toml::Table| -> Result<CrawlerMap> {
            let mut map = CrawlerMap::new();
            map.insert("a".into(), Box::new(JsonCrawler::new(dir)) as Box<dyn Crawler>);
            map.insert("b".into(), Box::new(JsonCrawler::new(dir)) as Box<dyn Crawler>);
            Ok(map)
        });
        assert_eq!(registry.load(&path).unwrap().len(), 2);
    }

    #[test]
    fn fetch_requires_an_address() {
        let err = fetch(&Document::default(), &PluginRegistry::new()).err().unwrap();
        assert!(matches!(err, JobdexError::Validation { .. }));
    }

    #[test]
    fn fetch_reports_missing_crawler() {
        let tmp = tempfile::tempdir().unwrap();
        descriptor(tmp.path(), "plugin = \"json\"\n[options]\nid = \"current\"");
        let mut doc = Document::default();
        doc.set_address(AccessAddress {
            project: ".".into(),
            crawler_root: tmp.path().to_path_buf(),
            module: FN_ACCESS.into(),
            crawler_id: "renamed".into(),
        });

        let err = fetch(&doc, &PluginRegistry::with_builtins()).err().unwrap();
        match err {
            JobdexError::CrawlerNotFound { crawler_id, .. } => assert_eq!(crawler_id, "renamed"),
            other => panic!("expected CrawlerNotFound, got {other}"),
        }
    }
}
