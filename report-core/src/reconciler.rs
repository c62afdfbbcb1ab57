//! Binds the canvas buffer to one active report.
//!
//! The [`Reconciler`] keeps a cache of each report's last persisted pages.
//! Loading a report only resets the canvas when the incoming report is
//! actually different, so re-delivery of the same data (a refetch after a
//! save, a re-render upstream) never wipes the user's undo history.
//!
//! "Different" is judged on the persisted form: a refetched report carries
//! backend ids where the canvas still has the local ids minted before the
//! first save, so the comparison goes through the [`WireCodec`].

use std::collections::HashMap;

use crate::action::Action;
use crate::history::History;
use crate::page::{without_selection, Page};
use crate::pending::{removed_rows, PendingDeletions};
use crate::report::{Report, ReportId};
use crate::state::CanvasState;
use crate::wire::WireCodec;
use crate::CanvasResult;

/// What [`Reconciler::load_report`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// The canvas was reset to the incoming pages.
    Replaced,
    /// Same report and pages as already active; canvas untouched.
    Unchanged,
    /// No report; the canvas was reset to one blank page.
    Cleared,
}

/// Canvas plus the persisted copy of the active report.
#[derive(Debug, Clone, Default)]
pub struct Reconciler {
    canvas: CanvasState,
    active: Option<ReportId>,
    cache: HashMap<ReportId, Report>,
    codec: WireCodec,
}

impl Reconciler {
    /// Create a reconciler with an empty canvas and default history.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a reconciler whose canvas uses the given history settings.
    #[must_use]
    pub fn with_history(history: History) -> Self {
        Self {
            canvas: CanvasState::with_history(history),
            active: None,
            cache: HashMap::new(),
            codec: WireCodec::default(),
        }
    }

    /// Use `codec` when comparing incoming reports with the cached copy.
    #[must_use]
    pub fn with_codec(mut self, codec: WireCodec) -> Self {
        self.codec = codec;
        self
    }

    /// Load `report` into the canvas, or clear it with `None`.
    pub fn load_report(&mut self, report: Option<Report>) -> LoadOutcome {
        let Some(mut report) = report else {
            self.active = None;
            self.canvas.reset(Vec::new());
            tracing::debug!("Active report cleared");
            return LoadOutcome::Cleared;
        };
        report.pages = normalize(&report.pages);

        if self.active.as_ref() == Some(&report.id) {
            if let Some(cached) = self.cache.get_mut(&report.id) {
                if same_persisted(&self.codec, &cached.pages, &report.pages) {
                    cached.name = report.name;
                    cached.template_id = report.template_id;
                    cached.patient_id = report.patient_id;
                    cached.patient_name = report.patient_name;
                    cached.created_at = report.created_at;
                    cached.updated_at = cached.updated_at.max(report.updated_at);
                    tracing::debug!(report = %cached.id, "Report unchanged, canvas kept");
                    return LoadOutcome::Unchanged;
                }
            }
        }

        if self.has_pending_changes() {
            if let Some(id) = &self.active {
                tracing::warn!(report = %id, "Discarding unsaved changes on report switch");
            }
        }

        tracing::info!(report = %report.id, pages = report.pages.len(), "Loading report");
        self.canvas.reset(report.pages.clone());
        self.active = Some(report.id.clone());
        self.cache.insert(report.id.clone(), report);
        LoadOutcome::Replaced
    }

    /// Load a report that has not been persisted yet.
    ///
    /// The canvas shows `report.pages` while the cache holds no pages, so
    /// the whole document is pending until the first save.
    pub fn load_draft(&mut self, mut report: Report) {
        let pages = normalize(&report.pages);
        report.pages = Vec::new();
        tracing::info!(report = %report.id, pages = pages.len(), "Loading draft report");
        self.canvas.reset(pages);
        self.active = Some(report.id.clone());
        self.cache.insert(report.id.clone(), report);
    }

    /// The cached copy of the active report.
    #[must_use]
    pub fn active_report(&self) -> Option<&Report> {
        self.active.as_ref().and_then(|id| self.cache.get(id))
    }

    /// Id of the active report.
    #[must_use]
    pub fn active_report_id(&self) -> Option<&ReportId> {
        self.active.as_ref()
    }

    /// Whether the canvas differs from the last persisted copy.
    #[must_use]
    pub fn has_pending_changes(&self) -> bool {
        self.pending_pages().is_some()
    }

    /// The pages to save, if anything is pending for the active report.
    #[must_use]
    pub fn pending_pages(&self) -> Option<Vec<Page>> {
        let cached = self.active_report()?;
        let pages = self.canvas.pages_for_save();
        if pages != cached.pages || !self.canvas.pending_deletions().is_empty() {
            Some(pages)
        } else {
            None
        }
    }

    /// Tombstones to send with the next save.
    ///
    /// The canvas's own tombstones plus every persisted row of the cached
    /// copy that the canvas no longer holds. The second set covers rows
    /// taken away by undo, redo or a delete that raced the row's create.
    #[must_use]
    pub fn pending_deletions(&self) -> PendingDeletions {
        let mut pending = self.canvas.pending_deletions().clone();
        if let Some(cached) = self.active_report() {
            for tombstone in removed_rows(&cached.pages, self.canvas.pages()) {
                pending.push(tombstone);
            }
        }
        pending
    }

    /// Record a successful save of `pages` at time `at`.
    ///
    /// Returns the updated cached report. `pages` should be the saved
    /// snapshot, not the live buffer, so edits made while the save was in
    /// flight stay pending.
    pub fn commit(&mut self, pages: Vec<Page>, at: u64) -> Option<Report> {
        let id = self.active.as_ref()?;
        let cached = self.cache.get_mut(id)?;
        cached.pages = pages;
        cached.updated_at = at;
        Some(cached.clone())
    }

    /// Revert the canvas to the last persisted pages of the active report.
    pub fn discard_changes(&mut self) {
        let pages = self
            .active_report()
            .map(|report| report.pages.clone())
            .unwrap_or_default();
        tracing::debug!("Discarding unsaved changes");
        self.canvas.reset(pages);
    }

    /// Dispatch an action into the canvas.
    ///
    /// # Errors
    ///
    /// Propagates validation errors from the canvas.
    pub fn dispatch(&mut self, action: Action, now: u64) -> CanvasResult<()> {
        self.canvas.dispatch(action, now)
    }

    /// The canvas.
    #[must_use]
    pub fn canvas(&self) -> &CanvasState {
        &self.canvas
    }

    /// Mutable access to the canvas.
    pub fn canvas_mut(&mut self) -> &mut CanvasState {
        &mut self.canvas
    }
}

fn same_persisted(codec: &WireCodec, cached: &[Page], incoming: &[Page]) -> bool {
    if cached == incoming {
        return true;
    }
    match (codec.pages_to_wire(cached), codec.pages_to_wire(incoming)) {
        (Ok(cached), Ok(incoming)) => cached == incoming,
        _ => false,
    }
}

fn normalize(pages: &[Page]) -> Vec<Page> {
    let mut pages = without_selection(pages);
    for page in &mut pages {
        page.fill_default_size();
    }
    pages
}
