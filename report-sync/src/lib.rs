//! # Report Sync
//!
//! Persistence for the report editor. Keeps the active report's canvas in
//! step with a REST backend by saving on a timer and on request.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   actions    ┌────────────────────┐
//! │  UI / CLI    │ ───────────► │  Reconciler        │
//! └──────────────┘              │  (report-core)     │
//!        │                      └─────────┬──────────┘
//!        │ save / close                   │ pending pages + tombstones
//!        ▼                                ▼
//! ┌──────────────────────────────────────────────────┐
//! │  PersistenceSync                                 │
//! │  - interval task (skips while a save is running) │
//! │  - explicit saves (queue behind the running one) │
//! └──────────────────────┬───────────────────────────┘
//!                        │ ReportBackend
//!            ┌───────────┴───────────┐
//!            ▼                       ▼
//!      HttpBackend             MemoryBackend
//!      (reqwest, retries)      (tests, fault injection)
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod backend;
pub mod cli;
pub mod config;
pub mod http;
pub mod launch;
pub mod sync;

pub use backend::{BackendError, BackendResult, MemoryBackend, ReportBackend};
pub use cli::{read_pages, CliArgs, ClientConfig, Command};
pub use config::{RetryConfig, SyncConfig, DEFAULT_SYNC_INTERVAL};
pub use http::HttpBackend;
pub use launch::{LaunchParams, OpenRequest};
pub use sync::{
    CloseDecision, PersistenceSync, SaveSummary, SaveTrigger, SkipReason, SyncError, SyncEvent,
    SyncHandle, SyncOutcome,
};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
