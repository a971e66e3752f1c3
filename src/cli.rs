use clap::{Parser, Subcommand};
use std::path::PathBuf;
use anyhow::Result;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::core::Engine;

#[derive(Parser)]
#[command(name = "routetrace")]
#[command(about = "Sequence diagrams for the HTTP endpoints of a Spring codebase")]
#[command(version)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a default Routetrace.toml
    Init {
        /// Target directory (defaults to current directory)
        #[arg(short, long)]
        path: Option<PathBuf>,

        /// Overwrite an existing configuration
        #[arg(long)]
        force: bool,
    },

    /// List discovered endpoints
    Endpoints {
        /// Source directory to scan (overrides project.source_dir)
        #[arg(short, long)]
        source: Option<PathBuf>,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Print the sequence diagram of the endpoint matching QUERY
    Diagram {
        /// "GET /api/users/{id}", a path fragment, a handler name or a description
        #[arg(required = true, num_args = 1..)]
        query: Vec<String>,

        /// Source directory to scan (overrides project.source_dir)
        #[arg(short, long)]
        source: Option<PathBuf>,
    },
}

impl Cli {
    pub async fn execute(self, engine: Engine) -> Result<()> {
        let cancel = CancellationToken::new();
        let on_interrupt = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, stopping");
                on_interrupt.cancel();
            }
        });

        match self.command {
            Commands::Init { path, force } => {
                let written = engine.init(path, force).await?;
                println!("Created {}", written.display());
                Ok(())
            }
            Commands::Endpoints { source, json } => {
                let endpoints = engine.list_endpoints(source, &cancel).await?;
                if json {
                    println!("{}", serde_json::to_string_pretty(&endpoints)?);
                } else {
                    for endpoint in &endpoints {
                        println!("{:<7} {:<40} {} ({})", endpoint.method.as_str(), endpoint.path, endpoint.handler_name, endpoint.location);
                    }
                }
                Ok(())
            }
            Commands::Diagram { query, source } => {
                if let Some(diagram) = engine.diagram(&query.join(" "), source, &cancel).await? {
                    println!("{}", diagram);
                }
                Ok(())
            }
        }
    }
}
