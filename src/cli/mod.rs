//! Command-line interface.

pub mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "sentryfs",
    version,
    about = "Content-scanning DLP engine for removable storage",
    long_about = None
)]
pub struct Cli {
    /// Path to a TOML configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Scan a file or directory and print verdicts
    Scan {
        /// File or directory to scan
        path: PathBuf,
        /// Print allowed files too, not just findings
        #[arg(short, long)]
        verbose: bool,
    },
    /// List the compiled detection rule catalog
    Patterns,
}

impl Cli {
    pub fn run(self) -> Result<()> {
        let config = match &self.config {
            Some(path) => crate::config::ContentScanningConfig::load(path)?,
            None => crate::config::ContentScanningConfig::default(),
        };

        match self.command {
            Commands::Scan { path, verbose } => {
                let any_blocked = commands::scan::execute(&path, config, verbose)?;
                if any_blocked {
                    std::process::exit(2);
                }
                Ok(())
            }
            Commands::Patterns => commands::patterns::execute(config),
        }
    }
}
