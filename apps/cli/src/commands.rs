//! CLI command definitions, routing, and tracing setup.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use jobdex_convert::{FormatRegistry, Payload, RawFile};
use jobdex_core::{ExportProgress, Workspace, export_bulk};
use jobdex_crawler::{
    CrawlOutcome, Crawler, CrawlerExt, JsonCrawler, MasterCrawler, PluginRegistry, ProjectCrawler,
    RegexFileCrawler, fetch,
};
use jobdex_shared::{AppConfig, CrawlConfig, calc_id, expand_home, init_config, load_config};
use jobdex_storage::SqliteCollection;
use serde_json::Value;
use tracing::info;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// jobdex: index the data of parameter-addressed job workspaces.
#[derive(Parser)]
#[command(
    name = "jobdex",
    version,
    about = "Index, export and fetch data from parameter-addressed job workspaces.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Which crawler walks the root.
#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub(crate) enum CrawlerKind {
    /// Job workspace: one directory per job with a manifest.
    Project,
    /// Plain tree matched against the configured definitions.
    Regex,
    /// JSON files, one document per object.
    Json,
    /// Tree of projects published through access descriptors.
    Master,
}

/// Options shared by `crawl` and `export`.
#[derive(clap::Args)]
pub(crate) struct CrawlArgs {
    /// Directory to crawl.
    pub root: PathBuf,

    /// Crawler to use.
    #[arg(short, long, default_value = "project")]
    pub kind: CrawlerKind,

    /// Maximum directory depth (0 = unbounded). Defaults to the config value.
    #[arg(short, long)]
    pub depth: Option<usize>,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Print the identity of a JSON parameter set.
    Id {
        /// Parameter set as a JSON object.
        statepoint: String,
    },

    /// Job operations.
    Job {
        #[command(subcommand)]
        action: JobAction,
    },

    /// Verify every job manifest in a workspace.
    Check {
        /// Workspace directory.
        #[arg(short, long, default_value = "workspace")]
        workspace: PathBuf,
    },

    /// Crawl a tree and print its index as JSON lines.
    Crawl {
        #[command(flatten)]
        crawl: CrawlArgs,
    },

    /// Crawl a tree and upsert its index into the database.
    Export {
        #[command(flatten)]
        crawl: CrawlArgs,

        /// Upserts per batch. Defaults to the config value.
        #[arg(long)]
        chunk_size: Option<usize>,

        /// Index database path. Defaults to the config value.
        #[arg(long)]
        database: Option<PathBuf>,
    },

    /// Fetch the data behind an indexed document.
    Fetch {
        /// Document id in the index.
        id: String,

        /// Convert each payload to this format and print it.
        #[arg(long)]
        to: Option<String>,

        /// Index database path. Defaults to the config value.
        #[arg(long)]
        database: Option<PathBuf>,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Job subcommands.
#[derive(Subcommand)]
pub(crate) enum JobAction {
    /// Create a job directory and write its manifest.
    Init {
        /// Parameter set as a JSON object.
        statepoint: String,

        /// Workspace directory.
        #[arg(short, long, default_value = "workspace")]
        workspace: PathBuf,

        /// Replace an existing manifest.
        #[arg(long)]
        overwrite: bool,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Create a default config file.
    Init,
    /// Show the resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize the tracing subscriber based on CLI flags.
///
/// Logs go to stderr so `crawl` output stays pipeable.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "jobdex=info",
        1 => "jobdex=debug",
        _ => "jobdex=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Route the parsed CLI command to its handler.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Id { statepoint } => cmd_id(&statepoint),
        Command::Job {
            action:
                JobAction::Init {
                    statepoint,
                    workspace,
                    overwrite,
                },
        } => cmd_job_init(&statepoint, &workspace, overwrite),
        Command::Check { workspace } => cmd_check(&workspace),
        Command::Crawl { crawl } => cmd_crawl(&crawl),
        Command::Export {
            crawl,
            chunk_size,
            database,
        } => cmd_export(&crawl, chunk_size, database).await,
        Command::Fetch { id, to, database } => cmd_fetch(&id, to.as_deref(), database).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(),
        },
    }
}

// ---------------------------------------------------------------------------
// Command implementations
// ---------------------------------------------------------------------------

fn parse_statepoint(raw: &str) -> Result<Value> {
    serde_json::from_str(raw).wrap_err("statepoint is not valid JSON")
}

fn cmd_id(statepoint: &str) -> Result<()> {
    let id = calc_id(&parse_statepoint(statepoint)?)?;
    println!("{id}");
    Ok(())
}

fn cmd_job_init(statepoint: &str, workspace: &Path, overwrite: bool) -> Result<()> {
    let ws = Workspace::new(workspace);
    let job = ws.open_job(&parse_statepoint(statepoint)?)?;
    if overwrite {
        job.init_overwrite()?;
    } else {
        job.init()?;
    }
    info!(job = %job, "job initialized");
    println!("{}", job.workspace().display());
    Ok(())
}

fn cmd_check(workspace: &Path) -> Result<()> {
    let ws = Workspace::new(workspace);
    let count = ws.job_ids()?.len();
    ws.check()?;
    println!("  {count} jobs verified in {}", workspace.display());
    Ok(())
}

/// Build the crawler selected on the command line.
fn build_crawler(args: &CrawlArgs, config: &CrawlConfig) -> Result<Box<dyn Crawler>> {
    let root = args.root.clone();
    let crawler: Box<dyn Crawler> = match args.kind {
        CrawlerKind::Project => {
            let inner = RegexFileCrawler::new(&root).with_definitions(&config.definitions)?;
            Box::new(ProjectCrawler::from_pattern_crawler(inner))
        }
        CrawlerKind::Regex => {
            if config.definitions.is_empty() {
                return Err(eyre!(
                    "the regex crawler needs [[definitions]] in the config file"
                ));
            }
            Box::new(RegexFileCrawler::new(&root).with_definitions(&config.definitions)?)
        }
        CrawlerKind::Json => Box::new(JsonCrawler::new(&root)),
        CrawlerKind::Master => {
            Box::new(MasterCrawler::new(&root, Arc::new(PluginRegistry::with_builtins())))
        }
    };
    Ok(crawler)
}

fn crawl_config(args: &CrawlArgs) -> Result<CrawlConfig> {
    let config = load_config()?;
    let mut crawl = CrawlConfig::from(&config);
    if let Some(depth) = args.depth {
        crawl.depth = depth;
    }
    Ok(crawl)
}

fn cmd_crawl(args: &CrawlArgs) -> Result<()> {
    let config = crawl_config(args)?;
    let crawler = build_crawler(args, &config)?;

    let outcome = CrawlOutcome::collect(crawler.crawl(config.depth));
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    for (_, doc) in &outcome.documents {
        serde_json::to_writer(&mut out, doc)?;
        writeln!(out)?;
    }
    for error in &outcome.errors {
        eprintln!("  error: {error}");
    }
    outcome.into_result()?;
    Ok(())
}

/// Resolve the index database from a flag or the config file.
fn database_path(flag: Option<PathBuf>, config: &AppConfig) -> Result<PathBuf> {
    match flag {
        Some(path) => Ok(path),
        None => Ok(expand_home(&config.defaults.database)?),
    }
}

async fn cmd_export(
    args: &CrawlArgs,
    chunk_size: Option<usize>,
    database: Option<PathBuf>,
) -> Result<()> {
    let app_config = load_config()?;
    let config = crawl_config(args)?;
    let crawler = build_crawler(args, &config)?;
    let db_path = database_path(database, &app_config)?;

    let mut index = SqliteCollection::open(&db_path).await?;
    let progress = CliProgress::new();
    let summary = export_bulk(
        crawler.crawl(config.depth),
        &mut index,
        chunk_size.unwrap_or(config.chunk_size),
        &progress,
    )
    .await;
    progress.done();
    let summary = summary?;

    println!();
    println!("  Index exported!");
    println!("  Documents: {}", summary.documents);
    println!("  Batches:   {}", summary.batches);
    println!("  Errors:    {}", summary.errors.len());
    println!("  Database:  {}", db_path.display());
    println!();

    summary.into_result()?;
    Ok(())
}

async fn cmd_fetch(id: &str, to: Option<&str>, database: Option<PathBuf>) -> Result<()> {
    let app_config = load_config()?;
    let db_path = database_path(database, &app_config)?;
    let index = SqliteCollection::open(&db_path).await?;
    let doc = index
        .get(id)
        .await?
        .ok_or_else(|| eyre!("no document '{id}' in {}", db_path.display()))?;

    let plugins = PluginRegistry::with_builtins();
    let mut formats = FormatRegistry::with_basics();
    if let Some(format) = &doc.format {
        formats.register_file_format(format.as_str());
    }
    let network = formats.build_network();

    for payload in fetch(&doc, &plugins)? {
        let payload = payload?;
        match to {
            Some(target) => print_payload(network.convert(payload, target)?)?,
            None => match payload.downcast_ref::<RawFile>() {
                Some(file) => println!("{}\t{}", payload.format(), file.path().display()),
                None => println!("{}", payload.format()),
            },
        }
    }
    Ok(())
}

fn print_payload(payload: Payload) -> Result<()> {
    let format = payload.format().to_string();
    let payload = match payload.into_value::<Value>() {
        Ok(value) => {
            println!("{}", serde_json::to_string_pretty(&value)?);
            return Ok(());
        }
        Err(p) => p,
    };
    let payload = match payload.into_value::<String>() {
        Ok(text) => {
            println!("{text}");
            return Ok(());
        }
        Err(p) => p,
    };
    match payload.into_value::<Vec<u8>>() {
        Ok(bytes) => {
            std::io::stdout().write_all(&bytes)?;
            Ok(())
        }
        Err(_) => Err(eyre!("cannot print a payload of format '{format}'")),
    }
}

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// Progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        spinner.set_message("Crawling");
        Self { spinner }
    }

    fn done(&self) {
        self.spinner.finish_and_clear();
    }
}

impl ExportProgress for CliProgress {
    fn batch_flushed(&self, batch_len: usize, total: usize) {
        self.spinner
            .set_message(format!("Exported {total} documents (last batch {batch_len})"));
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_export_flags() {
        let cli = Cli::try_parse_from([
            "jobdex", "export", "data", "--kind", "master", "--depth", "2", "--chunk-size", "50",
        ])
        .unwrap();
        match cli.command {
            Command::Export {
                crawl, chunk_size, ..
            } => {
                assert!(matches!(crawl.kind, CrawlerKind::Master));
                assert_eq!(crawl.depth, Some(2));
                assert_eq!(chunk_size, Some(50));
            }
            _ => panic!("expected export"),
        }
    }

    #[test]
    fn statepoint_must_be_json() {
        assert!(parse_statepoint("{\"a\": 1}").is_ok());
        assert!(parse_statepoint("a=1").is_err());
    }

    #[test]
    fn regex_crawler_requires_definitions() {
        let args = CrawlArgs {
            root: PathBuf::from("."),
            kind: CrawlerKind::Regex,
            depth: None,
        };
        let config = CrawlConfig::from(&AppConfig::default());
        assert!(build_crawler(&args, &config).is_err());
    }

    #[test]
    fn prints_json_payloads() {
        print_payload(Payload::json(serde_json::json!({"a": 1}))).unwrap();
        assert!(print_payload(Payload::new("opaque", 3_u8)).is_err());
    }
}
