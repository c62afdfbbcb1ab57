//! Command-line interface for `reportctl`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand};
use report_core::Page;

use crate::config::SyncConfig;
use crate::sync::SyncError;

/// Command-line arguments for reportctl.
#[derive(Debug, Clone, Parser)]
#[command(name = "reportctl")]
#[command(about = "Inspect and edit medical reports on a report backend")]
#[command(version)]
pub struct CliArgs {
    /// Report API base URL (e.g., <http://localhost:8080/api/v1>)
    #[arg(long, env = "REPORT_API_URL")]
    pub api_url: String,

    /// Bearer token for the report API
    #[arg(long, env = "REPORT_API_TOKEN")]
    pub token: Option<String>,

    /// Directory for the local documents index
    #[arg(long, env = "REPORT_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Background save period in seconds (overrides REPORT_SYNC_INTERVAL_SECS)
    #[arg(long)]
    pub interval_secs: Option<u64>,

    /// What to do
    #[command(subcommand)]
    pub command: Command,
}

/// reportctl subcommands.
#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// List reports, most recently updated first
    List,
    /// Print a report's pages and tables
    Show {
        /// Report id
        report_id: String,
    },
    /// Open a report from launch parameters (e.g. "templateId=t-1&patientId=p-7")
    Open {
        /// URL query string
        query: String,
    },
    /// Replace a report's pages with the contents of a JSON file and save
    Push {
        /// Report id
        report_id: String,
        /// JSON array of pages
        pages_file: PathBuf,
    },
    /// Keep a report open and save it in the background until interrupted
    Watch {
        /// Report id
        report_id: String,
    },
    /// Delete a report and drop it from the local index
    Delete {
        /// Report id
        report_id: String,
    },
}

/// Resolved client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Report API base URL.
    pub api_url: String,
    /// Bearer token.
    pub token: Option<String>,
    /// Directory for the documents index.
    pub data_dir: Option<PathBuf>,
    /// Sync settings.
    pub sync: SyncConfig,
    /// Subcommand to run.
    pub command: Command,
}

impl From<CliArgs> for ClientConfig {
    fn from(args: CliArgs) -> Self {
        let mut sync = SyncConfig::from_env();
        if let Some(secs) = args.interval_secs.filter(|s| *s > 0) {
            sync = sync.with_interval(Duration::from_secs(secs));
        }
        Self {
            api_url: args.api_url,
            token: args.token,
            data_dir: args.data_dir,
            sync,
            command: args.command,
        }
    }
}

/// Read a JSON array of pages from `path`.
///
/// # Errors
///
/// Returns [`SyncError::Io`] if the file cannot be read and
/// [`SyncError::Json`] if it is not a page array.
pub fn read_pages(path: &Path) -> Result<Vec<Page>, SyncError> {
    let raw = std::fs::read_to_string(path)?;
    let pages: Vec<Page> = serde_json::from_str(&raw)?;
    Ok(pages)
}
