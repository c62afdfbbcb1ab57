//! # reportctl
//!
//! Command-line client for the report backend.

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use report_core::{current_timestamp_ms, Documents, Report, ReportId};
use report_sync::{
    read_pages, CliArgs, ClientConfig, CloseDecision, Command, HttpBackend, LaunchParams,
    PersistenceSync, SyncEvent,
};
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize structured tracing with optional JSON format.
///
/// Set `RUST_LOG` to control log levels (default: info,report_sync=debug).
/// Set `RUST_LOG_FORMAT=json` for JSON output.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,report_sync=debug,report_core=info"));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_writer(std::io::stderr);

    if std::env::var("RUST_LOG_FORMAT").as_deref() == Ok("json") {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer.json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer)
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = ClientConfig::from(CliArgs::parse());
    tracing::debug!(api = %config.api_url, "Starting reportctl");

    let backend = HttpBackend::with_retry_config(
        &config.api_url,
        config.token.clone(),
        config.sync.retry.clone(),
    )
    .context("invalid report API URL")?;

    let documents = match &config.data_dir {
        Some(dir) => Documents::with_data_dir(dir)
            .with_context(|| format!("cannot use data dir {}", dir.display()))?,
        None => Documents::new(),
    };
    let sync = PersistenceSync::new(Arc::new(backend), config.sync.clone()).with_documents(documents);

    match config.command {
        Command::List => list(&sync).await,
        Command::Show { report_id } => show(&sync, &ReportId::new(report_id)).await,
        Command::Open { query } => open(&sync, &query).await,
        Command::Push {
            report_id,
            pages_file,
        } => {
            let pages = read_pages(&pages_file)
                .with_context(|| format!("cannot read {}", pages_file.display()))?;
            sync.open_report(&ReportId::new(report_id)).await?;
            sync.with_editor(|editor| {
                editor
                    .canvas_mut()
                    .replace_pages(pages, current_timestamp_ms());
            });
            let outcome = sync.save().await?;
            println!("{outcome:?}");
            Ok(())
        }
        Command::Watch { report_id } => watch(&sync, &ReportId::new(report_id)).await,
        Command::Delete { report_id } => {
            let id = ReportId::new(report_id);
            sync.delete_report(&id).await?;
            println!("Deleted {id}");
            Ok(())
        }
    }
}

async fn list(sync: &PersistenceSync) -> anyhow::Result<()> {
    sync.refresh_documents().await?;
    for summary in sync.documents().list() {
        println!(
            "{}\t{}\t{}",
            summary.id,
            summary.name,
            summary.patient_name.as_deref().unwrap_or("-")
        );
    }
    Ok(())
}

async fn show(sync: &PersistenceSync, id: &ReportId) -> anyhow::Result<()> {
    sync.open_report(id).await?;
    let report = sync
        .read_editor(|editor| editor.active_report().cloned())
        .context("report did not load")?;
    print_report(&report);
    Ok(())
}

async fn open(sync: &PersistenceSync, query: &str) -> anyhow::Result<()> {
    let request = LaunchParams::from_query(query).resolve();
    match sync.open(&request).await? {
        Some(id) => {
            if let Some(report) = sync.read_editor(|editor| editor.active_report().cloned()) {
                print_report(&report);
            } else {
                println!("{id}");
            }
        }
        None => println!("Nothing to open"),
    }
    Ok(())
}

fn print_report(report: &Report) {
    println!("{} ({})", report.name, report.id);
    for (index, page) in report.pages.iter().enumerate() {
        println!(
            "  [{index}] {} - {} element(s), {}x{}",
            page.name,
            page.element_count(),
            page.width,
            page.height
        );
        for table in page.tables() {
            println!("      {}", table.headers.join(" | "));
            for row in &table.rows {
                println!("      {}", row.join(" | "));
            }
        }
    }
}

async fn watch(sync: &PersistenceSync, id: &ReportId) -> anyhow::Result<()> {
    sync.open_report(id).await?;
    let mut events = sync.subscribe();
    let handle = sync.spawn();
    tracing::info!(report = %id, interval = ?sync.config().interval, "Watching report");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted");
                break;
            }
            event = events.recv() => match event {
                Ok(SyncEvent::Skipped { .. }) => {}
                Ok(event) => println!("{}", serde_json::to_string(&event)?),
                Err(RecvError::Lagged(missed)) => tracing::warn!(missed, "Dropped sync events"),
                Err(RecvError::Closed) => break,
            },
        }
    }

    handle.shutdown().await;
    sync.close(CloseDecision::Flush).await?;
    Ok(())
}
