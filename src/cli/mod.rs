//! Command-line interface for docarrow
//!
//! This module handles:
//! - Command-line argument parsing using clap
//! - Configuration loading and flag overrides
//! - Dispatch of the `export`, `compare`, `config`, `completion` and `worker`
//!   subcommands

pub mod completion;

use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use mongodb::bson::Document;
use tracing::info;

use crate::config::{Config, LogLevel};
use crate::error::{ConfigError, Result};
use crate::executor::{Strategy, run_worker};
use crate::export::{ExportCoordinator, ExportResult};
use crate::schema::SchemaDescriptor;
use crate::source::SourceSpec;

/// docarrow - MongoDB documents to Arrow tables
#[derive(Parser, Debug)]
#[command(
    name = "docarrow",
    version,
    about = "Export MongoDB documents into Arrow tables",
    long_about = "Converts the documents matching a filter into a typed columnar table,
reading partitions sequentially, on worker threads or in worker processes."
)]
pub struct CliArgs {
    /// Configuration file path
    #[arg(short = 'c', long = "config", value_name = "FILE", global = true)]
    pub config_file: Option<PathBuf>,

    /// Verbose mode (debug logging)
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,

    /// Very verbose mode (trace logging)
    #[arg(long = "vv", global = true)]
    pub very_verbose: bool,

    /// Subcommands
    #[command(subcommand)]
    pub command: Commands,
}

/// Subcommands for docarrow
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Export matching documents to a table
    Export(ExportArgs),

    /// Export with two strategies and check the tables are equivalent
    Compare(CompareArgs),

    /// Show configuration
    Config {
        /// Show effective configuration
        #[arg(long)]
        show: bool,

        /// Validate configuration file
        #[arg(long)]
        validate: bool,
    },

    /// Generate shell completion script
    Completion {
        /// Shell type
        #[arg(value_name = "SHELL")]
        shell: Shell,
    },

    /// Show version information
    Version,

    /// Convert one partition read from stdin (used by the multiprocess strategy)
    #[command(hide = true)]
    Worker,
}

/// Where to read documents from
#[derive(Args, Debug, Clone, Default)]
pub struct SourceArgs {
    /// MongoDB connection URI (defaults to `connection.default_uri`)
    #[arg(long, value_name = "URI")]
    pub uri: Option<String>,

    /// Database name
    #[arg(long = "db", value_name = "NAME")]
    pub database: Option<String>,

    /// Collection name
    #[arg(long, value_name = "NAME")]
    pub collection: Option<String>,

    /// Read documents from a mongodump-style BSON file instead
    #[arg(long, value_name = "FILE", conflicts_with_all = ["uri", "database", "collection", "inline"])]
    pub dump_file: Option<PathBuf>,

    /// Read documents from a JSON array instead
    #[arg(long, value_name = "JSON", conflicts_with_all = ["uri", "database", "collection"])]
    pub inline: Option<String>,
}

/// Arguments shared by `export` and `compare`
#[derive(Args, Debug, Clone)]
pub struct QueryArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    /// Filter document as JSON
    #[arg(long, value_name = "JSON", default_value = "{}")]
    pub filter: String,

    /// Column list, e.g. "id:int64, vec:list<int64>"
    #[arg(long, value_name = "COLUMNS")]
    pub schema: String,

    /// Number of workers
    #[arg(short = 'w', long, value_name = "N")]
    pub workers: Option<usize>,

    /// Rows to print from the start of the table
    #[arg(long, value_name = "N", default_value_t = 5)]
    pub show: usize,
}

#[derive(Args, Debug, Clone)]
pub struct ExportArgs {
    #[command(flatten)]
    pub query: QueryArgs,

    /// sequential, multiprocess or multithreaded
    #[arg(short = 's', long, value_name = "STRATEGY")]
    pub strategy: Option<Strategy>,

    /// Write the table to an Arrow IPC file
    #[arg(short = 'o', long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Draw a progress bar on stderr
    #[arg(long)]
    pub progress: bool,
}

#[derive(Args, Debug, Clone)]
pub struct CompareArgs {
    #[command(flatten)]
    pub query: QueryArgs,

    /// Strategy producing the reference table
    #[arg(long, value_name = "STRATEGY", default_value = "sequential")]
    pub baseline: Strategy,

    /// Strategy checked against the reference
    #[arg(long, value_name = "STRATEGY", default_value = "multiprocess")]
    pub candidate: Strategy,
}

/// CLI interface handler
pub struct CliInterface {
    /// Parsed command-line arguments
    args: CliArgs,

    /// Loaded configuration
    config: Config,
}

impl CliInterface {
    /// Create a new CLI interface from the process arguments
    pub fn new() -> Result<Self> {
        Self::from_args(CliArgs::parse())
    }

    /// Create a CLI interface from already parsed arguments
    pub fn from_args(args: CliArgs) -> Result<Self> {
        let config = Self::load_config(&args)?;
        Ok(Self { args, config })
    }

    /// Load configuration from file and environment, then apply flags
    fn load_config(args: &CliArgs) -> Result<Config> {
        let mut config = Config::load(args.config_file.as_deref())?;

        if args.very_verbose {
            config.logging.level = LogLevel::Trace;
        } else if args.verbose {
            config.logging.level = LogLevel::Debug;
        }

        Ok(config)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn args(&self) -> &CliArgs {
        &self.args
    }

    /// Run the selected subcommand
    ///
    /// # Returns
    /// * `Result<bool>` - `false` when the command finished but reported a
    ///   failure through its output (worker replies)
    pub async fn run(&self) -> Result<bool> {
        match &self.args.command {
            Commands::Export(args) => {
                self.export(args).await?;
                Ok(true)
            }
            Commands::Compare(args) => {
                self.compare(args).await?;
                Ok(true)
            }
            Commands::Config { show, validate } => {
                self.handle_config_command(*show, *validate)?;
                Ok(true)
            }
            Commands::Completion { shell } => {
                completion::generate_completion(*shell, &mut std::io::stdout());
                Ok(true)
            }
            Commands::Version => {
                self.show_version();
                Ok(true)
            }
            Commands::Worker => run_worker(tokio::io::stdin(), tokio::io::stdout()).await,
        }
    }

    async fn export(&self, args: &ExportArgs) -> Result<()> {
        let strategy = args.strategy.unwrap_or(self.config.export.strategy);
        let result = self
            .run_export(&args.query, strategy, args.progress)
            .await?;

        println!("{}", result.table.render(0, args.query.show));
        print_summary(&result);

        if let Some(path) = &args.output {
            result.table.write_ipc_file(path)?;
            println!("Wrote {} rows to {}", result.table.num_rows(), path.display());
        }
        Ok(())
    }

    async fn compare(&self, args: &CompareArgs) -> Result<()> {
        let baseline = self.run_export(&args.query, args.baseline, false).await?;
        let candidate = self.run_export(&args.query, args.candidate, false).await?;

        for result in [&baseline, &candidate] {
            println!("=== {} ===", result.strategy);
            println!("{}", result.table.render(0, args.query.show));
            print_summary(result);
            println!();
        }

        baseline.table.verify_equivalent(&candidate.table)?;
        println!(
            "{} and {} tables are equivalent: {} rows, {} columns",
            baseline.strategy,
            candidate.strategy,
            baseline.table.num_rows(),
            baseline.table.num_columns()
        );
        Ok(())
    }

    async fn run_export(
        &self,
        query: &QueryArgs,
        strategy: Strategy,
        progress: bool,
    ) -> Result<ExportResult> {
        let source = resolve_source(&query.source, &self.config)?;
        let predicate = parse_document("filter", &query.filter)?;
        let schema = Arc::new(SchemaDescriptor::parse(&query.schema)?);
        let workers = match query.workers {
            Some(n) => NonZeroUsize::new(n).ok_or_else(|| ConfigError::InvalidValue {
                field: "workers".to_string(),
                value: n.to_string(),
            })?,
            None => self.config.export.worker_count()?,
        };

        info!("Exporting {} with schema {}", source.describe(), query.schema);
        ExportCoordinator::new(source, &self.config)
            .with_progress(progress)
            .execute(predicate, schema, strategy, workers)
            .await
    }

    fn show_version(&self) {
        println!("docarrow version {}", env!("CARGO_PKG_VERSION"));
        println!("Rust version: {}", env!("CARGO_PKG_RUST_VERSION"));
    }

    fn handle_config_command(&self, show: bool, validate: bool) -> Result<()> {
        if validate {
            self.config.validate()?;
            println!("Configuration is valid");
        }
        if show || !validate {
            self.show_config()?;
        }
        Ok(())
    }

    fn show_config(&self) -> Result<()> {
        println!("Configuration file: {}", self.config_path().display());
        println!();
        println!("=== Effective Configuration ===");
        println!();

        let mut shown = self.config.clone();
        shown.connection.default_uri = sanitize_uri(&shown.connection.default_uri);
        println!("{}", shown.to_toml()?);
        Ok(())
    }

    fn config_path(&self) -> PathBuf {
        self.args
            .config_file
            .clone()
            .unwrap_or_else(Config::default_path)
    }
}

fn print_summary(result: &ExportResult) {
    println!(
        "{} rows from {} matched records, {} partitions, {} strategy, {} ms",
        result.table.num_rows(),
        result.matched,
        result.partitions,
        result.strategy,
        result.elapsed_ms
    );
}

/// Build the source from the flags, falling back to the configured URI
pub fn resolve_source(args: &SourceArgs, config: &Config) -> Result<SourceSpec> {
    if let Some(path) = &args.dump_file {
        return Ok(SourceSpec::DumpFile { path: path.clone() });
    }
    if let Some(json) = &args.inline {
        return Ok(SourceSpec::inline(parse_documents(json)?));
    }

    let required = |value: &Option<String>, field: &str| {
        value.clone().ok_or_else(|| ConfigError::InvalidValue {
            field: field.to_string(),
            value: "missing (pass --db and --collection, --dump-file or --inline)".to_string(),
        })
    };

    Ok(SourceSpec::Mongo {
        uri: args
            .uri
            .clone()
            .unwrap_or_else(|| config.connection.default_uri.clone()),
        database: required(&args.database, "db")?,
        collection: required(&args.collection, "collection")?,
    })
}

/// Parse one JSON object into a document
pub fn parse_document(field: &str, json: &str) -> Result<Document> {
    serde_json::from_str(json).map_err(|e| invalid_json(field, e))
}

/// Parse a JSON array of objects into documents
pub fn parse_documents(json: &str) -> Result<Vec<Document>> {
    serde_json::from_str(json).map_err(|e| invalid_json("inline", e))
}

fn invalid_json(field: &str, error: serde_json::Error) -> crate::error::ExportError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        value: format!("invalid JSON: {error}"),
    }
    .into()
}

/// Hide credentials between `://` and `@`
fn sanitize_uri(uri: &str) -> String {
    if let (Some(proto_end), Some(host_start)) = (uri.find("://"), uri.rfind('@')) {
        if host_start > proto_end {
            return format!("{}***{}", &uri[..proto_end + 3], &uri[host_start..]);
        }
    }
    uri.to_string()
}
