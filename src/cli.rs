//! Command-line interface for tracegate.
//!
//! Provides commands for running the forwarding pipeline against a
//! document, validating a configuration file, and previewing the
//! delivery tasks a document would create.

use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use crate::config::ForwardingConfig;
use crate::core::RunSettings;
use crate::domain::Document;
use crate::transport::{DispatchRouter, RouterConfig};

/// tracegate - Traceability event filtering and forwarding
#[derive(Parser, Debug)]
#[command(name = "tracegate")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the forwarding pipeline for one inbound document
    Run {
        /// Criteria name to evaluate the document against
        criteria: String,

        /// Configuration file
        #[arg(short, long, env = "TRACEGATE_CONFIG", default_value = "tracegate.yaml")]
        config: PathBuf,

        /// Input document (reads from stdin if not provided)
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Queue the delivery task instead of delivering inline
        #[arg(long)]
        queue: bool,

        /// Match only, without recording inbound events
        #[arg(long)]
        skip_ingest: bool,

        /// Transport timeout in seconds
        #[arg(long, default_value = "60")]
        timeout: u64,
    },

    /// Validate a configuration file
    Validate {
        /// Configuration file
        #[arg(short, long, env = "TRACEGATE_CONFIG", default_value = "tracegate.yaml")]
        config: PathBuf,
    },

    /// Preview the delivery tasks a document would create, without
    /// delivering anything
    Tasks {
        /// Criteria name to evaluate the document against
        criteria: String,

        /// Configuration file
        #[arg(short, long, env = "TRACEGATE_CONFIG", default_value = "tracegate.yaml")]
        config: PathBuf,

        /// Input document (reads from stdin if not provided)
        #[arg(short, long)]
        input: Option<PathBuf>,
    },
}

impl Cli {
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Run {
                criteria,
                config,
                input,
                queue,
                skip_ingest,
                timeout,
            } => run_pipeline(&criteria, &config, input, queue, skip_ingest, timeout).await,
            Commands::Validate { config } => validate_config(&config),
            Commands::Tasks {
                criteria,
                config,
                input,
            } => preview_tasks(&criteria, &config, input).await,
        }
    }
}

fn read_document(input: Option<PathBuf>) -> Result<Document> {
    let raw = match input {
        Some(path) => std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read input file {}", path.display()))?,
        None => {
            let mut buffer = String::new();
            io::stdin()
                .read_to_string(&mut buffer)
                .context("failed to read input from stdin")?;
            buffer
        }
    };
    Document::from_json(&raw).context("input is not a valid event document")
}

async fn run_pipeline(
    criteria: &str,
    config_path: &Path,
    input: Option<PathBuf>,
    queue: bool,
    skip_ingest: bool,
    timeout: u64,
) -> Result<()> {
    let config = Arc::new(ForwardingConfig::from_file(config_path)?);
    let document = read_document(input)?;

    let mut settings = RunSettings::new(config, criteria);
    settings.run_immediately = !queue;
    settings.skip_ingest = skip_ingest;
    settings.router = Arc::new(DispatchRouter::new(RouterConfig {
        timeout: Duration::from_secs(timeout),
        ..RouterConfig::default()
    }));
    let store = settings.store.clone();

    let ctx = settings
        .standard()
        .run(document)
        .await
        .context("pipeline run failed")?;

    println!("matched events: {}", ctx.filtered_events.len());
    match ctx.created_task {
        Some(name) => {
            if let Some(task) = store.get(&name).await {
                println!("task {}: {:?}", task.name, task.status);
            }
        }
        None => println!("no delivery task created"),
    }
    Ok(())
}

fn validate_config(config_path: &Path) -> Result<()> {
    let config = ForwardingConfig::from_file(config_path)?;
    println!(
        "ok: {} criteria, {} endpoints, {} credentials",
        config.criteria.len(),
        config.endpoints.len(),
        config.credentials.len()
    );
    Ok(())
}

async fn preview_tasks(criteria: &str, config_path: &Path, input: Option<PathBuf>) -> Result<()> {
    let config = Arc::new(ForwardingConfig::from_file(config_path)?);
    let document = read_document(input)?;

    let mut settings = RunSettings::new(config, criteria);
    settings.run_immediately = false;
    let store = settings.store.clone();

    settings
        .standard()
        .run(document)
        .await
        .context("pipeline run failed")?;

    let tasks = store.list().await;
    if tasks.is_empty() {
        println!("no delivery tasks would be created");
    }
    for task in tasks {
        println!(
            "{}  criteria={}  {} bytes",
            task.name,
            task.criteria,
            task.payload.len()
        );
    }
    Ok(())
}
