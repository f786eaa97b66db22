// src/cli.rs
use clap::Parser;
use std::path::PathBuf;

use crate::export::{DownloadMethod, SaveFormat};

/// ct-ingest: Certificate Transparency log crawler
///
/// Crawl one CT log from the last stored position to its current tree size,
/// keeping certificates that match the tracked organizations or DNS zones.
#[derive(Parser, Debug, Clone)]
#[command(name = "ct-ingest")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    // ===== Source =====
    /// Key of the CT log to crawl (see [[log_sources]] in the config)
    #[arg(long = "log-source")]
    pub log_source: String,

    /// Index to start from instead of the stored high-water mark (negative = resume)
    #[arg(long = "starting-index", default_value_t = -1, allow_negative_numbers = true)]
    pub starting_index: i64,

    /// Also decode precertificate entries
    #[arg(long = "include-precerts")]
    pub include_precerts: bool,

    // ===== Export =====
    /// Store only, or store and also write certificates to disk
    #[arg(long = "download-method", value_enum)]
    pub download_method: Option<DownloadMethod>,

    /// Directory for saved certificates
    #[arg(long = "cert-save-location")]
    pub cert_save_location: Option<PathBuf>,

    /// Encoding of saved certificates
    #[arg(long = "save-type", value_enum)]
    pub save_type: Option<SaveFormat>,

    // ===== Configuration =====
    /// Path to TOML config file
    #[arg(short = 'c', long = "config", default_value = "config.toml")]
    pub config: String,

    // ===== Display =====
    /// Disable progress indicator
    #[arg(long = "no-progress")]
    pub no_progress: bool,

    // ===== Logging =====
    /// Verbose logging (set log level to debug)
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,

    /// Quiet logging (set log level to warn)
    #[arg(short = 'q', long = "quiet")]
    pub quiet: bool,
}

impl Cli {
    /// Validate flag combinations and return errors for invalid usage
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.verbose && self.quiet {
            anyhow::bail!("Cannot specify both --verbose and --quiet");
        }

        if self.log_source.trim().is_empty() {
            anyhow::bail!("--log-source must not be empty");
        }

        Ok(())
    }

    /// Explicit starting index, if one was given
    pub fn start_override(&self) -> Option<i64> {
        (self.starting_index >= 0).then_some(self.starting_index)
    }

    /// Log level from verbose/quiet flags, falling back to the config value
    pub fn log_level<'a>(&self, configured: &'a str) -> &'a str {
        if self.verbose {
            "debug"
        } else if self.quiet {
            "warn"
        } else {
            configured
        }
    }
}
