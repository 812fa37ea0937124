//! Command-line argument parsing.

use std::path::PathBuf;

use chartcache_core::DemandDataset;
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("Invalid date range: --from {from} is after --to {to}")]
    InvertedRange { from: NaiveDate, to: NaiveDate },
}

/// Load dashboard charts through a persistent result cache
#[derive(Parser, Debug)]
#[command(name = "chartcache")]
#[command(about = "Load dashboard charts through a persistent result cache")]
#[command(version)]
pub struct Cli {
    /// Drop cached results for the requested charts before loading
    #[arg(long, global = true)]
    pub refresh: bool,

    /// Also write logs to this file
    #[arg(long, global = true, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Daily commercial demand against firm energy
    Demand {
        #[command(flatten)]
        range: DateRange,
    },
    /// Installed capacity against project progress (S-curve)
    CapacityCurve,
    /// Both charts, loaded concurrently
    Dashboard {
        #[command(flatten)]
        range: DateRange,
    },
    /// Remove every cached chart
    Clear,
    /// Show the effective configuration
    Config {
        /// Write it to the config file
        #[arg(long)]
        save: bool,
    },
}

#[derive(Args, Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    /// First day of the range
    #[arg(long, value_name = "YYYY-MM-DD", default_value = "2025-05-01")]
    pub from: NaiveDate,

    /// Last day of the range
    #[arg(long, value_name = "YYYY-MM-DD", default_value = "2025-05-03")]
    pub to: NaiveDate,
}

impl DateRange {
    pub fn demand(&self) -> Result<DemandDataset, CliError> {
        if self.from > self.to {
            return Err(CliError::InvertedRange {
                from: self.from,
                to: self.to,
            });
        }
        Ok(DemandDataset::new(self.from, self.to))
    }
}
