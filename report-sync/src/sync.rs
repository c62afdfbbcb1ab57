//! Persistence sync: pushes the canvas buffer to the backend.
//!
//! Saves run on a timer and on explicit request. Both paths share one save
//! lock per editor: an interval tick that finds a save in flight is skipped,
//! an explicit save waits its turn. The editor lock is never held across a
//! network call.
//!
//! ## Save sequence
//!
//! ```text
//! 1. Snapshot pending pages and tombstones under the editor lock; rows
//!    of the last saved copy missing from the canvas count as tombstones
//! 2. Delete tombstoned rows (already-gone rows count as deleted)
//! 3. Create or update each page, then each element on it; an update the
//!    backend no longer knows becomes a create
//! 4. Write returned backend ids into the canvas, even if a later call failed
//! 5. On full success: drop tombstones, stamp updatedAt, commit the snapshot
//! ```

use std::sync::{Arc, RwLock};

use futures::future::join_all;
use report_core::pending::apply_assignments;
use report_core::{
    current_timestamp_ms, Action, Assignment, CanvasError, CanvasResult, Documents, History,
    LoadOutcome, Patient, Reconciler, Report, ReportId, SavePlan, Template, Tombstone, WireCodec,
    WireError, WirePage, WireReport,
};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{broadcast, oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::backend::{BackendError, ReportBackend};
use crate::config::SyncConfig;
use crate::launch::OpenRequest;

/// Capacity of the event channel.
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Errors from sync operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// A backend call failed.
    #[error(transparent)]
    Backend(#[from] BackendError),
    /// Wire mapping failed.
    #[error(transparent)]
    Wire(#[from] WireError),
    /// The document was rejected.
    #[error(transparent)]
    Canvas(#[from] CanvasError),
    /// An operation needed an active report.
    #[error("no active report")]
    NoActiveReport,
    /// Reading local input failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Parsing local input failed.
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// What started a save.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SaveTrigger {
    /// The background timer.
    Interval,
    /// The user (save button, close, CLI).
    Explicit,
}

/// Why a save did nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SkipReason {
    /// No report is loaded.
    NoActiveReport,
    /// The buffer matches the last persisted copy.
    Unchanged,
    /// Another save is running.
    SaveInFlight,
}

/// Counts from a completed save.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveSummary {
    /// The saved report.
    pub report: ReportId,
    /// Save time, ms since epoch.
    pub at: u64,
    /// Rows created.
    pub created: usize,
    /// Rows updated.
    pub updated: usize,
    /// Rows deleted.
    pub deleted: usize,
}

/// Result of [`PersistenceSync::sync_now`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Changes were pushed.
    Saved(SaveSummary),
    /// Nothing was sent.
    Skipped(SkipReason),
}

/// Notification published after every save attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum SyncEvent {
    /// Changes were pushed.
    Saved {
        /// What started the save.
        trigger: SaveTrigger,
        /// Counts.
        summary: SaveSummary,
    },
    /// A save failed; local state is kept for the next attempt.
    SaveFailed {
        /// What started the save.
        trigger: SaveTrigger,
        /// The report being saved, if known.
        report: Option<ReportId>,
        /// Error message.
        error: String,
    },
    /// Nothing was sent.
    Skipped {
        /// What started the save.
        trigger: SaveTrigger,
        /// Why.
        reason: SkipReason,
    },
}

/// How to treat unsaved edits when closing a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseDecision {
    /// Save first; the report stays open if the save fails.
    Flush,
    /// Drop unsaved edits.
    Discard,
}

#[derive(Default)]
struct Progress {
    assignments: Vec<Assignment>,
    created: usize,
    updated: usize,
    deleted: usize,
}

/// Pushes an editor's changes to a [`ReportBackend`].
///
/// Clones share the editor, backend, documents store, save lock and event
/// channel.
#[derive(Clone)]
pub struct PersistenceSync {
    editor: Arc<RwLock<Reconciler>>,
    backend: Arc<dyn ReportBackend>,
    documents: Documents,
    save_lock: Arc<Mutex<()>>,
    events: broadcast::Sender<SyncEvent>,
    codec: WireCodec,
    config: SyncConfig,
}

impl std::fmt::Debug for PersistenceSync {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistenceSync")
            .field("documents", &self.documents.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl PersistenceSync {
    /// Create a sync engine with a fresh editor.
    #[must_use]
    pub fn new(backend: Arc<dyn ReportBackend>, config: SyncConfig) -> Self {
        let history = History::with_config(config.quiescence_window_ms, config.history_limit);
        let codec = WireCodec::new(config.unknown_types);
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            editor: Arc::new(RwLock::new(Reconciler::with_history(history).with_codec(codec))),
            backend,
            documents: Documents::new(),
            save_lock: Arc::new(Mutex::new(())),
            events,
            codec,
            config,
        }
    }

    /// Use an existing documents store (e.g. one persisted on disk).
    #[must_use]
    pub fn with_documents(mut self, documents: Documents) -> Self {
        self.documents = documents;
        self
    }

    /// The shared documents store.
    #[must_use]
    pub fn documents(&self) -> &Documents {
        &self.documents
    }

    /// The active configuration.
    #[must_use]
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Subscribe to save notifications.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    /// Run `f` with shared access to the editor.
    pub fn read_editor<R>(&self, f: impl FnOnce(&Reconciler) -> R) -> R {
        let editor = self
            .editor
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        f(&editor)
    }

    /// Run `f` with exclusive access to the editor.
    pub fn with_editor<R>(&self, f: impl FnOnce(&mut Reconciler) -> R) -> R {
        let mut editor = self
            .editor
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        f(&mut editor)
    }

    /// Dispatch an action into the editor at the current time.
    ///
    /// # Errors
    ///
    /// Propagates canvas validation errors.
    pub fn dispatch(&self, action: Action) -> CanvasResult<()> {
        let now = current_timestamp_ms();
        self.with_editor(|editor| editor.dispatch(action, now))
    }

    fn emit(&self, event: SyncEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    /// Refresh the documents store from the backend listing.
    ///
    /// # Errors
    ///
    /// Returns the backend error; the store is left as it was.
    #[tracing::instrument(skip(self))]
    pub async fn refresh_documents(&self) -> Result<usize, SyncError> {
        let summaries = self.backend.list_reports().await?;
        let count = summaries.len();
        self.documents.replace_all(summaries);
        debug!(count, "Documents refreshed");
        Ok(count)
    }

    /// Fetch a report and make it active.
    ///
    /// # Errors
    ///
    /// Returns an error if the fetch or decode fails or the report is
    /// structurally invalid; the editor is left untouched.
    #[tracing::instrument(skip(self))]
    pub async fn open_report(&self, id: &ReportId) -> Result<LoadOutcome, SyncError> {
        let wire = self.backend.fetch_report(id).await?;
        let report = Report::from_wire(&self.codec, wire)?;
        report.validate()?;
        let summary = report.summary();
        let outcome = self.with_editor(|editor| editor.load_report(Some(report)));
        self.documents.upsert(summary);
        Ok(outcome)
    }

    /// Create a report for `patient` from a template, make it active and save it.
    ///
    /// # Errors
    ///
    /// Returns an error if the template cannot be fetched or the report row
    /// cannot be created. If only the first page save fails, the draft stays
    /// active and the error is returned; the next save retries it.
    #[tracing::instrument(skip(self, patient), fields(patient = %patient.id))]
    pub async fn open_template(&self, template_id: &str, patient: &Patient) -> Result<ReportId, SyncError> {
        let wire = self.backend.fetch_template(template_id).await?;
        let template = Template::from_wire(&self.codec, wire)?;

        let now = current_timestamp_ms();
        let header = template.report_header(patient, now);
        let summary = self.backend.create_report(&header).await?;
        info!(report = %summary.id, template = %template.id, "Created report from template");

        let report = Report {
            id: summary.id.clone(),
            name: summary.name.clone(),
            template_id: summary.template_id.clone(),
            patient_id: summary.patient_id.clone(),
            patient_name: summary.patient_name.clone(),
            pages: template.fresh_pages(),
            created_at: summary.created_at,
            updated_at: summary.updated_at,
        };
        self.with_editor(|editor| editor.load_draft(report));
        self.documents.upsert(summary.clone());

        self.sync_now(SaveTrigger::Explicit).await?;
        Ok(summary.id)
    }

    /// Act on launch parameters.
    ///
    /// # Errors
    ///
    /// Propagates errors from [`open_report`](Self::open_report) and
    /// [`open_template`](Self::open_template).
    pub async fn open(&self, request: &OpenRequest) -> Result<Option<ReportId>, SyncError> {
        match request {
            OpenRequest::Existing(id) => {
                self.open_report(id).await?;
                Ok(Some(id.clone()))
            }
            OpenRequest::FromTemplate {
                template_id,
                patient,
            } => self.open_template(template_id, patient).await.map(Some),
            OpenRequest::Blank => {
                self.with_editor(|editor| editor.load_report(None));
                Ok(None)
            }
        }
    }

    /// Unload the active report.
    ///
    /// # Errors
    ///
    /// With [`CloseDecision::Flush`], returns the save error and keeps the
    /// report open.
    #[tracing::instrument(skip(self))]
    pub async fn close(&self, decision: CloseDecision) -> Result<(), SyncError> {
        match decision {
            CloseDecision::Flush => {
                self.sync_now(SaveTrigger::Explicit).await?;
            }
            CloseDecision::Discard => self.with_editor(Reconciler::discard_changes),
        }
        self.with_editor(|editor| editor.load_report(None));
        Ok(())
    }

    /// Delete a report remotely and forget it locally.
    ///
    /// Waits for any in-flight save. If the report is active it is unloaded
    /// and its unsaved changes are dropped. A report the backend no longer
    /// has still gets removed from the documents store.
    ///
    /// # Errors
    ///
    /// Returns the backend error; nothing local changes in that case.
    #[tracing::instrument(skip(self))]
    pub async fn delete_report(&self, id: &ReportId) -> Result<(), SyncError> {
        let _guard = self.save_lock.lock().await;
        match self.backend.delete_report(id).await {
            Err(e) if e.is_not_found() => debug!("Report already gone remotely"),
            other => other?,
        }
        self.with_editor(|editor| {
            if editor.active_report_id() == Some(id) {
                editor.load_report(None);
            }
        });
        self.documents.remove(id);
        info!(report = %id, "Report deleted");
        Ok(())
    }

    /// Explicit save: waits for any in-flight save, then pushes.
    ///
    /// # Errors
    ///
    /// See [`sync_now`](Self::sync_now).
    pub async fn save(&self) -> Result<SyncOutcome, SyncError> {
        self.sync_now(SaveTrigger::Explicit).await
    }

    /// Push pending changes of the active report.
    ///
    /// Interval saves are skipped while another save runs; explicit saves
    /// queue behind it. Every attempt publishes a [`SyncEvent`].
    ///
    /// # Errors
    ///
    /// Returns the first backend or mapping error. Backend ids handed out
    /// before the failure are kept; tombstones survive for the retry.
    #[tracing::instrument(skip(self))]
    pub async fn sync_now(&self, trigger: SaveTrigger) -> Result<SyncOutcome, SyncError> {
        let _guard = match trigger {
            SaveTrigger::Interval => {
                if let Ok(guard) = self.save_lock.try_lock() {
                    guard
                } else {
                    debug!("Save in flight, skipping interval save");
                    let reason = SkipReason::SaveInFlight;
                    self.emit(SyncEvent::Skipped { trigger, reason });
                    return Ok(SyncOutcome::Skipped(reason));
                }
            }
            SaveTrigger::Explicit => self.save_lock.lock().await,
        };

        let report = self.read_editor(|editor| editor.active_report_id().cloned());
        let result = self.save_locked(trigger).await;
        match &result {
            Ok(SyncOutcome::Saved(summary)) => {
                info!(
                    report = %summary.report,
                    created = summary.created,
                    updated = summary.updated,
                    deleted = summary.deleted,
                    "Report saved"
                );
                self.emit(SyncEvent::Saved {
                    trigger,
                    summary: summary.clone(),
                });
            }
            Ok(SyncOutcome::Skipped(reason)) => {
                debug!(?reason, "Nothing to save");
                self.emit(SyncEvent::Skipped {
                    trigger,
                    reason: *reason,
                });
            }
            Err(e) => {
                warn!(?trigger, "Save failed: {e}");
                self.emit(SyncEvent::SaveFailed {
                    trigger,
                    report,
                    error: e.to_string(),
                });
            }
        }
        result
    }

    async fn save_locked(&self, trigger: SaveTrigger) -> Result<SyncOutcome, SyncError> {
        let snapshot = self.read_editor(|editor| {
            let id = editor.active_report_id()?.clone();
            let header = editor.active_report().map(Report::summary);
            Some((
                id,
                header,
                editor.pending_pages(),
                editor.pending_deletions(),
            ))
        });
        let Some((report_id, header, pending_pages, pending)) = snapshot else {
            return Ok(SyncOutcome::Skipped(SkipReason::NoActiveReport));
        };
        let Some(pages) = pending_pages else {
            return Ok(SyncOutcome::Skipped(SkipReason::Unchanged));
        };

        let plan = SavePlan::build(&self.codec, &pages, &pending)?;
        let mut progress = Progress::default();
        let pushed = self.execute(&report_id, &plan, &mut progress).await;

        if !progress.assignments.is_empty() {
            self.with_editor(|editor| {
                if editor.active_report_id() == Some(&report_id) {
                    editor.canvas_mut().apply_backend_ids(&progress.assignments);
                }
            });
        }
        pushed?;

        let at = current_timestamp_ms();
        if let Some(header) = header {
            let stamp = WireReport {
                id: None,
                name: header.name,
                template_id: header.template_id,
                patient_id: header.patient_id,
                patient_name: header.patient_name,
                pages: Vec::new(),
                created_at: Some(header.created_at),
                updated_at: Some(at),
            };
            self.backend.update_report(&report_id, &stamp).await?;
        }

        let mut saved = pages;
        apply_assignments(&mut saved, &progress.assignments);
        let committed = self.with_editor(|editor| {
            if editor.active_report_id() != Some(&report_id) {
                return None;
            }
            editor.canvas_mut().acknowledge_deletions(pending.tombstones());
            editor.commit(saved, at)
        });
        if trigger == SaveTrigger::Explicit {
            if let Some(report) = &committed {
                self.documents.record_saved(report);
            }
        }

        Ok(SyncOutcome::Saved(SaveSummary {
            report: report_id,
            at,
            created: progress.created,
            updated: progress.updated,
            deleted: progress.deleted,
        }))
    }

    async fn execute(
        &self,
        report: &ReportId,
        plan: &SavePlan,
        progress: &mut Progress,
    ) -> Result<(), SyncError> {
        let deletions = plan.deletions.iter().map(|tombstone| async move {
            let result = match tombstone {
                Tombstone::Element { element, .. } => {
                    self.backend.delete_element(report, element).await
                }
                Tombstone::Page { page } => self.backend.delete_page(report, page).await,
            };
            match result {
                Err(e) if e.is_not_found() => {
                    debug!(target_id = %tombstone.target(), "Row already deleted");
                    Ok(())
                }
                other => other,
            }
        });
        for result in join_all(deletions).await {
            result?;
            progress.deleted += 1;
        }

        for page in &plan.pages {
            let updated = match &page.wire.id {
                Some(id) => match self.backend.update_page(report, &page.wire).await {
                    Ok(()) => {
                        progress.updated += 1;
                        Some(id.clone())
                    }
                    Err(e) if e.is_not_found() => {
                        warn!(page = %page.page_id, "Page missing remotely, recreating");
                        None
                    }
                    Err(e) => return Err(e.into()),
                },
                None => None,
            };
            let recreated = updated.is_none() && page.wire.id.is_some();
            let page_id = if let Some(id) = updated {
                id
            } else {
                let id = self.backend.create_page(report, &without_id(&page.wire)).await?;
                progress.created += 1;
                progress.assignments.push(Assignment {
                    page: page.page_id.clone(),
                    element: None,
                    backend_id: id.clone(),
                });
                id
            };

            for element in &page.elements {
                let mut create = element.is_create() || recreated;
                if !create {
                    match self.backend.update_element(report, &element.wire).await {
                        Ok(()) => progress.updated += 1,
                        Err(e) if e.is_not_found() => {
                            warn!(element = %element.element_id, "Element missing remotely, recreating");
                            create = true;
                        }
                        Err(e) => return Err(e.into()),
                    }
                }
                if create {
                    let mut wire = element.wire.clone();
                    wire.id = None;
                    let id = self.backend.create_element(report, &page_id, &wire).await?;
                    progress.created += 1;
                    progress.assignments.push(Assignment {
                        page: page.page_id.clone(),
                        element: Some(element.element_id.clone()),
                        backend_id: id,
                    });
                }
            }
        }
        Ok(())
    }

    /// Start the background save task.
    #[must_use]
    pub fn spawn(&self) -> SyncHandle {
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();
        let sync = self.clone();
        let interval = self.config.interval;

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // Don't fire immediately on start
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => {
                        info!("Persistence sync received shutdown signal");
                        break;
                    }

                    _ = ticker.tick() => {
                        // Failures are logged and published by sync_now.
                        let _ = sync.sync_now(SaveTrigger::Interval).await;
                    }
                }
            }
        });

        SyncHandle {
            handle,
            shutdown_tx: Some(shutdown_tx),
        }
    }
}

/// Handle to the background save task.
#[derive(Debug)]
pub struct SyncHandle {
    handle: JoinHandle<()>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl SyncHandle {
    /// Whether the task has stopped.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Signal the task to stop and wait for it.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Err(e) = self.handle.await {
            warn!("Persistence sync task ended abnormally: {e}");
        }
    }
}

fn without_id(page: &WirePage) -> WirePage {
    WirePage {
        id: None,
        ..page.clone()
    }
}
