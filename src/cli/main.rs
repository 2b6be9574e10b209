//! CLI binary entry point for dump-catalog

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use dump_catalog::config::CONFIG_FILENAME;
use dump_catalog::{Catalog, DumpLoader, FileSystemStorageBackend, LoaderConfig, LoaderError};

#[derive(Parser)]
#[command(name = "dump-catalog")]
#[command(about = "Scan a SQL dump directory and print its catalog as JSON")]
#[command(version)]
struct Cli {
    /// Configuration file (defaults to ./dump-catalog.toml when present)
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Dump directory, overrides `mydumper.source-dir`
    #[arg(short, long)]
    source_dir: Option<String>,
    /// Maximum number of classified files (0 = unbounded)
    #[arg(long)]
    max_scan_files: Option<usize>,
    /// Include database and table DDL in the output
    #[arg(long)]
    with_schema: bool,
    /// Pretty-print the JSON output
    #[arg(short, long)]
    pretty: bool,
}

impl Cli {
    fn loader_config(&self) -> Result<LoaderConfig> {
        let mut config = match &self.config {
            Some(path) => LoaderConfig::load(path)?,
            None if PathBuf::from(CONFIG_FILENAME).exists() => {
                LoaderConfig::load(&PathBuf::from(CONFIG_FILENAME))?
            }
            None => {
                let mut config = LoaderConfig::new();
                config.apply_env_overrides()?;
                config
            }
        };
        if let Some(dir) = &self.source_dir {
            config.mydumper.source_dir = dir.clone();
        }
        if let Some(max) = self.max_scan_files {
            config.mydumper.max_scan_files = max;
        }
        if config.mydumper.source_dir.is_empty() {
            anyhow::bail!("no source directory, use --source-dir or set mydumper.source-dir");
        }
        Ok(config)
    }
}

/// Catalog as JSON, with DDL text attached when requested
async fn render(
    catalog: &Catalog<FileSystemStorageBackend>,
    with_schema: bool,
    cancel: &CancellationToken,
) -> Result<Value> {
    let mut value = serde_json::to_value(catalog).context("serialize catalog")?;
    if !with_schema {
        return Ok(value);
    }

    let storage = catalog.storage().as_ref();
    let Some(db_values) = value.get_mut("databases").and_then(Value::as_array_mut) else {
        return Ok(value);
    };
    for (db_value, db) in db_values.iter_mut().zip(catalog.databases()) {
        db_value["create_statement"] = json!(db.get_schema(storage, cancel).await?);
        for (key, tables) in [("tables", &db.tables), ("views", &db.views)] {
            let Some(table_values) = db_value.get_mut(key).and_then(Value::as_array_mut) else {
                continue;
            };
            for (table_value, table) in table_values.iter_mut().zip(tables) {
                table_value["create_statement"] = match table.get_schema(storage, cancel).await {
                    Ok(stmt) => json!(stmt),
                    Err(LoaderError::Cancelled) => return Err(LoaderError::Cancelled.into()),
                    Err(e) => json!({ "error": e.to_string() }),
                };
            }
        }
    }
    Ok(value)
}

fn print(value: &Value, pretty: bool) -> Result<()> {
    let out = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{}", out);
    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    let config = cli.loader_config()?;
    let storage = FileSystemStorageBackend::new(&config.mydumper.source_dir);
    let loader = DumpLoader::new(storage, &config)?;
    let cancel = CancellationToken::new();

    match loader.load(&cancel).await {
        Ok(catalog) => print(&render(&catalog, cli.with_schema, &cancel).await?, cli.pretty),
        Err(failure) => {
            if let Some(partial) = &failure.partial {
                print(&render(partial, cli.with_schema, &cancel).await?, cli.pretty)?;
            }
            Err(failure.error.into())
        }
    }
}

fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let result = tokio::runtime::Runtime::new()
        .context("start tokio runtime")
        .and_then(|runtime| runtime.block_on(run(cli)));

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
