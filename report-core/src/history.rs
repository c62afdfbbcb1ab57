//! Snapshot-based undo/redo over the page collection.
//!
//! Each entry is a full copy of every page. Incremental edits (drag, resize,
//! typing) arriving within the quiescence window share the entry opened by
//! the first of them, so one drag is one undo step rather than one per
//! pointer move.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::page::{without_selection, Page};
use crate::{CanvasError, CanvasResult};

/// Incremental edits closer together than this share one history entry.
pub const QUIESCENCE_WINDOW_MS: u64 = 2000;

/// Default maximum number of undo entries kept.
pub const DEFAULT_HISTORY_LIMIT: usize = 100;

/// How an action participates in history batching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Checkpoint {
    /// Always opens a new entry (deletes, page structure changes).
    Atomic,
    /// Opens a new entry only after the quiescence window has elapsed.
    Incremental,
}

/// Undo/redo stacks plus the batching clock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct History {
    past: Vec<Vec<Page>>,
    future: VecDeque<Vec<Page>>,
    last_update_at: Option<u64>,
    window_ms: u64,
    limit: usize,
}

impl Default for History {
    fn default() -> Self {
        Self::new()
    }
}

impl History {
    /// Create empty history with the default window and depth.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(QUIESCENCE_WINDOW_MS, DEFAULT_HISTORY_LIMIT)
    }

    /// Create empty history with a custom quiescence window and depth.
    #[must_use]
    pub fn with_config(window_ms: u64, limit: usize) -> Self {
        Self {
            past: Vec::new(),
            future: VecDeque::new(),
            last_update_at: None,
            window_ms,
            limit: limit.max(1),
        }
    }

    /// Snapshots available to undo, oldest first.
    #[must_use]
    pub fn past(&self) -> &[Vec<Page>] {
        &self.past
    }

    /// Snapshots available to redo, next first.
    #[must_use]
    pub fn future(&self) -> &VecDeque<Vec<Page>> {
        &self.future
    }

    /// Timestamp (ms) of the last entry push, if any since the last reset.
    #[must_use]
    pub const fn last_update_at(&self) -> Option<u64> {
        self.last_update_at
    }

    /// Whether there is anything to undo.
    #[must_use]
    pub fn can_undo(&self) -> bool {
        !self.past.is_empty()
    }

    /// Whether there is anything to redo.
    #[must_use]
    pub fn can_redo(&self) -> bool {
        !self.future.is_empty()
    }

    /// Record that `current` is about to be mutated at `now` (ms).
    ///
    /// Pushes a snapshot of `current` when the checkpoint is atomic or the
    /// window has elapsed. Redo is invalidated either way. Returns whether a
    /// snapshot was pushed.
    pub fn record(&mut self, current: &[Page], checkpoint: Checkpoint, now: u64) -> bool {
        self.future.clear();

        let window_elapsed = self
            .last_update_at
            .map_or(true, |last| now.saturating_sub(last) > self.window_ms);
        if checkpoint == Checkpoint::Incremental && !window_elapsed {
            return false;
        }

        self.push_past(without_selection(current));
        self.last_update_at = Some(now);
        true
    }

    fn push_past(&mut self, snapshot: Vec<Page>) {
        self.past.push(snapshot);
        if self.past.len() > self.limit {
            self.past.remove(0);
        }
    }

    /// Step back. Returns the pages to restore, or `None` if there is nothing to undo.
    ///
    /// # Errors
    ///
    /// Returns [`CanvasError::CorruptHistory`] if the popped snapshot holds
    /// no pages; the entry is discarded and `current` must be kept.
    pub fn undo(&mut self, current: &[Page]) -> CanvasResult<Option<Vec<Page>>> {
        let Some(snapshot) = self.past.pop() else {
            return Ok(None);
        };
        self.last_update_at = None;
        validate_snapshot(&snapshot)?;
        self.future.push_front(without_selection(current));
        Ok(Some(snapshot))
    }

    /// Step forward. Returns the pages to restore, or `None` if there is nothing to redo.
    ///
    /// # Errors
    ///
    /// Returns [`CanvasError::CorruptHistory`] if the snapshot holds no
    /// pages; the entry is discarded and `current` must be kept.
    pub fn redo(&mut self, current: &[Page]) -> CanvasResult<Option<Vec<Page>>> {
        let Some(snapshot) = self.future.pop_front() else {
            return Ok(None);
        };
        self.last_update_at = None;
        validate_snapshot(&snapshot)?;
        self.push_past(without_selection(current));
        Ok(Some(snapshot))
    }

    /// Rewrite every stored snapshot in place. Does not touch the clock.
    pub(crate) fn for_each_snapshot_mut(&mut self, mut f: impl FnMut(&mut [Page])) {
        for snapshot in self.past.iter_mut().chain(self.future.iter_mut()) {
            f(snapshot);
        }
    }

    /// Drop every entry and reset the batching clock.
    pub fn clear(&mut self) {
        self.past.clear();
        self.future.clear();
        self.last_update_at = None;
    }
}

fn validate_snapshot(snapshot: &[Page]) -> CanvasResult<()> {
    if snapshot.is_empty() {
        tracing::warn!("Discarding history snapshot with no pages");
        return Err(CanvasError::CorruptHistory(
            "snapshot contains no pages".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pages(names: &[&str]) -> Vec<Page> {
        names.iter().map(|n| Page::new(*n)).collect()
    }

    #[test]
    fn test_incremental_edits_batch_within_window() {
        let mut history = History::new();
        let current = pages(&["Page 1"]);

        assert!(history.record(&current, Checkpoint::Incremental, 0));
        assert!(!history.record(&current, Checkpoint::Incremental, 500));
        assert!(!history.record(&current, Checkpoint::Incremental, 2000));
        assert!(history.record(&current, Checkpoint::Incremental, 2001));
        assert_eq!(history.past().len(), 2);
    }

    #[test]
    fn test_atomic_always_pushes() {
        let mut history = History::new();
        let current = pages(&["Page 1"]);
        assert!(history.record(&current, Checkpoint::Atomic, 0));
        assert!(history.record(&current, Checkpoint::Atomic, 1));
        assert_eq!(history.past().len(), 2);
        assert_eq!(history.last_update_at(), Some(1));
    }

    #[test]
    fn test_undo_redo_move_snapshots() {
        let mut history = History::new();
        let before = pages(&["Page 1"]);
        let after = pages(&["Page 1", "Page 2"]);
        history.record(&before, Checkpoint::Atomic, 0);

        let restored = history.undo(&after).expect("ok").expect("entry");
        assert_eq!(restored, before);
        assert_eq!(history.future().front(), Some(&after));

        let redone = history.redo(&restored).expect("ok").expect("entry");
        assert_eq!(redone, after);
        assert_eq!(history.past().last(), Some(&before));
        assert!(!history.can_redo());
    }

    #[test]
    fn test_empty_stacks_are_noops() {
        let mut history = History::new();
        let current = pages(&["Page 1"]);
        assert!(history.undo(&current).expect("ok").is_none());
        assert!(history.redo(&current).expect("ok").is_none());
    }

    #[test]
    fn test_record_clears_future() {
        let mut history = History::new();
        let current = pages(&["Page 1"]);
        history.record(&current, Checkpoint::Atomic, 0);
        let _ = history.undo(&current).expect("ok");
        assert!(history.can_redo());

        history.record(&current, Checkpoint::Incremental, 10);
        assert!(!history.can_redo());
    }

    #[test]
    fn test_undo_resets_batching_clock() {
        let mut history = History::new();
        let current = pages(&["Page 1"]);
        history.record(&current, Checkpoint::Atomic, 0);
        history.record(&current, Checkpoint::Atomic, 10);
        let _ = history.undo(&current).expect("ok");
        assert!(history.last_update_at().is_none());
        assert!(history.record(&current, Checkpoint::Incremental, 20));
    }

    #[test]
    fn test_corrupt_snapshot_discarded() {
        let mut history = History::new();
        let current = pages(&["Page 1"]);
        history.past.push(Vec::new());

        let result = history.undo(&current);
        assert!(matches!(result, Err(CanvasError::CorruptHistory(_))));
        assert!(!history.can_undo());
        assert!(!history.can_redo());
    }

    #[test]
    fn test_limit_drops_oldest() {
        let mut history = History::with_config(QUIESCENCE_WINDOW_MS, 3);
        for i in 0..5 {
            let name = format!("v{i}");
            let current = pages(&[name.as_str()]);
            history.record(&current, Checkpoint::Atomic, i);
        }
        assert_eq!(history.past().len(), 3);
        assert_eq!(history.past()[0][0].name, "v2");
    }

    #[test]
    fn test_redo_respects_limit() {
        let mut history = History::with_config(QUIESCENCE_WINDOW_MS, 2);
        let current = pages(&["Page 1"]);
        history.record(&current, Checkpoint::Atomic, 0);
        history.record(&current, Checkpoint::Atomic, 1);
        // future longer than the room left in past
        for name in ["r1", "r2", "r3"] {
            history.future.push_back(pages(&[name]));
        }

        for _ in 0..3 {
            history.redo(&current).expect("ok").expect("entry");
            assert!(history.past().len() <= 2);
        }
        assert!(!history.can_redo());
    }
}
