//! Tessera CLI - Load layered game-rule tables and inspect them
//!
//! Usage:
//!   tessera load [--config <file>] [--module <name>]
//!   tessera show <table> [--row <n>]
//!   tessera report [--json]
//!   tessera graph
//!   tessera sanitize <name>...
//!   tessera clear-cache
//!
//! Examples:
//!   tessera --config tessera.toml load
//!   tessera --module my_module show classes --row 0
//!   tessera report --json > report.json
//!   tessera graph | dot -Tsvg > tables.svg

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Once;
use tessera::config::Settings;
use tessera::sanitize::sanitize;
use tessera::schema::Record;
use tessera::source::ModuleContext;
use tessera::store::{DataLayer, LoadError};
use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter.
const LOG_ENV: &str = "TESSERA_LOG";

static INIT_LOGGING: Once = Once::new();

#[derive(Parser)]
#[command(name = "tessera")]
#[command(about = "Tessera - A schema-on-read engine for layered game-rule tables")]
#[command(version)]
struct Cli {
    /// Path to the config file (defaults to the usual search locations)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Active module
    #[arg(short, long, global = true)]
    module: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load every table and print the load summary
    Load,

    /// Print the records of a table
    Show {
        /// Table name
        table: String,

        /// Print only this row
        #[arg(short, long)]
        row: Option<usize>,
    },

    /// Print the relationship validation report
    Report {
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Print the relationship graph in Graphviz DOT
    Graph,

    /// Print the sanitized form of each name
    Sanitize {
        /// Names to sanitize
        #[arg(required = true)]
        names: Vec<String>,
    },

    /// Delete every persisted cache
    ClearCache,
}

fn init_logging() {
    INIT_LOGGING.call_once(|| {
        let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init();
    });
}

#[tokio::main]
async fn main() -> ExitCode {
    init_logging();
    let cli = Cli::parse();

    if let Commands::Sanitize { names } = &cli.command {
        return cmd_sanitize(names);
    }

    let layer = match open(cli.config.as_ref(), cli.module.as_deref()) {
        Ok(layer) => layer,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let result = match cli.command {
        Commands::Load => cmd_load(&layer).await,
        Commands::Show { table, row } => cmd_show(&layer, &table, row).await,
        Commands::Report { json } => cmd_report(&layer, json).await,
        Commands::Graph => cmd_graph(&layer).await,
        Commands::ClearCache => cmd_clear_cache(&layer).await,
        Commands::Sanitize { .. } => Ok(()),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn open(config: Option<&PathBuf>, module: Option<&str>) -> Result<DataLayer, LoadError> {
    let settings = match config {
        Some(path) => Settings::from_file(path)?,
        None => Settings::load()?,
    };
    if let Some(name) = module {
        settings.get_module(name)?;
    }

    let layer = DataLayer::from_settings(settings)?;
    if let Some(name) = module {
        layer.set_module_context(Some(ModuleContext::new(name)));
    }
    Ok(layer)
}

async fn cmd_load(layer: &DataLayer) -> Result<(), LoadError> {
    let preload = layer.preload().await;
    if preload.timed_out {
        println!(
            "Preload timed out; {} tables left for the main load",
            preload.remaining.len()
        );
    }

    let summary = layer.load_all().await?;
    println!("Loaded {}", summary);
    for table in &summary.tables_not_found {
        println!("  not found: {}", table);
    }
    for diagnostic in &summary.diagnostics {
        println!("  {}", diagnostic);
    }
    Ok(())
}

async fn cmd_show(layer: &DataLayer, table: &str, row: Option<usize>) -> Result<(), LoadError> {
    layer.load(&[table]).await?;

    let Some(loaded) = layer.table(table) else {
        println!("Table '{}' not found", table);
        return Ok(());
    };

    let print = |idx: usize, record: &Record| println!("{:>5}  {}", idx, record);
    match row {
        Some(idx) => match loaded.get(idx) {
            Some(record) => print(idx, record),
            None => println!("Row {} not found in '{}'", idx, table),
        },
        None => {
            println!(
                "{} ({} fields, {} rows)",
                loaded.schema().type_name(),
                loaded.schema().field_count(),
                loaded.records().len()
            );
            for (idx, record) in loaded.records().iter().enumerate() {
                print(idx, record);
            }
        }
    }
    Ok(())
}

async fn cmd_report(layer: &DataLayer, json: bool) -> Result<(), LoadError> {
    layer.load_all().await?;
    let Some(report) = layer.report() else {
        println!("Relationship validation is disabled");
        return Ok(());
    };

    if json {
        match serde_json::to_string_pretty(&report) {
            Ok(text) => println!("{}", text),
            Err(e) => eprintln!("Error serializing report: {}", e),
        }
        return Ok(());
    }

    println!(
        "{} relationships, {} valid, {} broken references",
        report.total_relationships, report.valid_relationships, report.broken_count
    );
    if !report.missing_tables.is_empty() {
        println!("Missing tables:");
        for table in &report.missing_tables {
            println!("  {}", table);
        }
    }
    if !report.broken_references.is_empty() {
        println!("Broken references:");
        for broken in &report.broken_references {
            println!(
                "  {}.{} row {}: {}",
                broken.table, broken.column, broken.row, broken.value
            );
        }
        if report.broken_count > report.broken_references.len() {
            println!(
                "  ... and {} more",
                report.broken_count - report.broken_references.len()
            );
        }
    }
    println!("Load order: {}", report.load_order.join(", "));
    Ok(())
}

async fn cmd_graph(layer: &DataLayer) -> Result<(), LoadError> {
    layer.load_all().await?;
    println!("{}", layer.graph().to_dot());
    Ok(())
}

fn cmd_sanitize(names: &[String]) -> ExitCode {
    for name in names {
        println!("{}\t{}", name, sanitize(name));
    }
    ExitCode::SUCCESS
}

async fn cmd_clear_cache(layer: &DataLayer) -> Result<(), LoadError> {
    layer.clear_cache().await?;
    let dir = layer
        .settings()
        .cache
        .cache_dir()
        .map(|d| d.display().to_string())
        .unwrap_or_default();
    println!("Cleared caches in {}", dir);
    Ok(())
}
