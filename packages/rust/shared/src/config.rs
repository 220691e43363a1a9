//! Application configuration for jobdex.
//!
//! User config lives at `~/.jobdex/jobdex.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{JobdexError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "jobdex.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".jobdex";

// ---------------------------------------------------------------------------
// Config structs (matching jobdex.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Filename pattern registrations for the pattern and project crawlers.
    #[serde(default)]
    pub definitions: Vec<DefinitionConfig>,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Maximum crawl depth; 0 walks the whole tree.
    #[serde(default)]
    pub crawl_depth: usize,

    /// Number of upserts per bulk export batch.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Path of the libSQL index database.
    #[serde(default = "default_database")]
    pub database: String,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            crawl_depth: 0,
            chunk_size: default_chunk_size(),
            database: default_database(),
        }
    }
}

fn default_chunk_size() -> usize {
    1000
}
fn default_database() -> String {
    "~/.jobdex/index.db".into()
}

/// `[[definitions]]` entry: files matching `pattern` carry payloads of `format`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefinitionConfig {
    /// Regular expression searched in the file's full path.
    pub pattern: String,
    /// Format tag stamped on matching documents.
    pub format: String,
}

// ---------------------------------------------------------------------------
// Crawl config (runtime, merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime crawl configuration, merged from config file + CLI flags.
#[derive(Debug, Clone)]
pub struct CrawlConfig {
    /// Maximum crawl depth (0 = unbounded).
    pub depth: usize,
    /// Bulk export batch size.
    pub chunk_size: usize,
    /// Pattern registrations.
    pub definitions: Vec<DefinitionConfig>,
}

impl From<&AppConfig> for CrawlConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            depth: config.defaults.crawl_depth,
            chunk_size: config.defaults.chunk_size,
            definitions: config.definitions.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.jobdex/`).
pub fn config_dir() -> Result<PathBuf> {
    let home =
        dirs::home_dir().ok_or_else(|| JobdexError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.jobdex/jobdex.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| JobdexError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| JobdexError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| JobdexError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content = toml::to_string_pretty(&config).map_err(|e| JobdexError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| JobdexError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Expand a leading `~/` to the user's home directory.
pub fn expand_home(path: &str) -> Result<PathBuf> {
    match path.strip_prefix("~/") {
        Some(rest) => {
            let home = dirs::home_dir()
                .ok_or_else(|| JobdexError::config("could not determine home directory"))?;
            Ok(home.join(rest))
        }
        None => Ok(PathBuf::from(path)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("chunk_size"));
        assert!(toml_str.contains("index.db"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.defaults.crawl_depth, 0);
        assert_eq!(parsed.defaults.chunk_size, 1000);
    }

    #[test]
    fn config_with_definitions() {
        let toml_str = r#"
[defaults]
crawl_depth = 2

[[definitions]]
pattern = '.*\.txt'
format = "Text"

[[definitions]]
pattern = '(?P<step>\d+)\.dat$'
format = "Raw"
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.definitions.len(), 2);
        assert_eq!(config.definitions[1].format, "Raw");

        let crawl = CrawlConfig::from(&config);
        assert_eq!(crawl.depth, 2);
        assert_eq!(crawl.chunk_size, 1000);
        assert_eq!(crawl.definitions, config.definitions);
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("jobdex.toml");
        std::fs::write(&path, "[defaults]\nchunk_size = 10\n").unwrap();
        let config = load_config_from(&path).expect("load");
        assert_eq!(config.defaults.chunk_size, 10);

        std::fs::write(&path, "[defaults\n").unwrap();
        let err = load_config_from(&path).unwrap_err();
        assert!(err.to_string().contains("failed to parse"));
    }

    #[test]
    fn home_expansion() {
        assert_eq!(expand_home("/abs/db").unwrap(), PathBuf::from("/abs/db"));
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_home("~/x.db").unwrap(), home.join("x.db"));
        }
    }
}
