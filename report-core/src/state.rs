//! Canvas state management.
//!
//! [`CanvasState`] is the single editing buffer: pages, the current page
//! pointer, the (page-scoped) selection, undo history and the tombstones of
//! persisted rows removed since the last save. All mutation goes through
//! [`CanvasState::dispatch`] or the equivalent named methods, each taking
//! the action time in milliseconds so history batching stays deterministic.

use serde::Serialize;

use crate::action::Action;
use crate::element::{Element, ElementId, ElementPatch};
use crate::history::{Checkpoint, History};
use crate::page::{without_selection, Page};
use crate::pending::{apply_assignments, removed_rows, Assignment, PendingDeletions, Tombstone};
use crate::{CanvasError, CanvasResult};

/// Name given to the blank page of a fresh document.
pub const FIRST_PAGE_NAME: &str = "Page 1";

/// The complete editing buffer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CanvasState {
    pages: Vec<Page>,
    current_page_index: usize,
    selected_element_ids: Vec<ElementId>,
    history: History,
    pending_deletions: PendingDeletions,
}

impl Default for CanvasState {
    fn default() -> Self {
        Self::new()
    }
}

impl CanvasState {
    /// Create a document with one blank page.
    #[must_use]
    pub fn new() -> Self {
        Self::with_history(History::new())
    }

    /// Create a document with one blank page and the given (empty) history.
    #[must_use]
    pub fn with_history(mut history: History) -> Self {
        history.clear();
        Self {
            pages: vec![Page::new(FIRST_PAGE_NAME)],
            current_page_index: 0,
            selected_element_ids: Vec::new(),
            history,
            pending_deletions: PendingDeletions::new(),
        }
    }

    /// Replace the whole buffer with `pages`.
    ///
    /// Dimensions are defaulted, selection flags cleared, and history and
    /// tombstones reset. An empty list becomes one blank page.
    pub fn reset(&mut self, pages: Vec<Page>) {
        let mut pages = without_selection(&pages);
        for page in &mut pages {
            page.fill_default_size();
        }
        if pages.is_empty() {
            pages.push(Page::new(FIRST_PAGE_NAME));
        }
        self.pages = pages;
        self.current_page_index = 0;
        self.selected_element_ids.clear();
        self.history.clear();
        self.pending_deletions.clear();
    }

    /// All pages in document order.
    #[must_use]
    pub fn pages(&self) -> &[Page] {
        &self.pages
    }

    /// Pages with selection flags stripped, as they are saved and compared.
    #[must_use]
    pub fn pages_for_save(&self) -> Vec<Page> {
        without_selection(&self.pages)
    }

    /// Index of the page being edited.
    #[must_use]
    pub const fn current_page_index(&self) -> usize {
        self.current_page_index
    }

    /// The page being edited.
    #[must_use]
    pub fn current_page(&self) -> &Page {
        &self.pages[self.current_page_index]
    }

    /// Selected element ids (zero or one).
    #[must_use]
    pub fn selected_element_ids(&self) -> &[ElementId] {
        &self.selected_element_ids
    }

    /// The selected element on the current page, if any.
    #[must_use]
    pub fn selected_element(&self) -> Option<&Element> {
        self.selected_element_ids
            .first()
            .and_then(|id| self.current_page().element(id))
    }

    /// Undo/redo history.
    #[must_use]
    pub fn history(&self) -> &History {
        &self.history
    }

    /// Persisted rows removed since the last successful save.
    #[must_use]
    pub fn pending_deletions(&self) -> &PendingDeletions {
        &self.pending_deletions
    }

    /// Apply an action at time `now` (ms).
    ///
    /// # Errors
    ///
    /// Returns a validation error when the action is rejected; the state is
    /// left unchanged in that case.
    pub fn dispatch(&mut self, action: Action, now: u64) -> CanvasResult<()> {
        tracing::trace!(action = action.name(), now, "dispatch");
        match action {
            Action::AddElement { element, page } => self.add_element(element, page, now).map(|_| ()),
            Action::UpdateElement { id, patch, page } => self.update_element(&id, &patch, page, now),
            Action::DeleteElement { id, page } => self.delete_element(&id, page, now),
            Action::SelectElement { id } => {
                self.select_element(&id);
                Ok(())
            }
            Action::ClearSelection => {
                self.clear_selection();
                Ok(())
            }
            Action::AddPage { name } => {
                self.add_page(name, now);
                Ok(())
            }
            Action::RemovePage { index } => self.remove_page(index, now),
            Action::RenamePage { index, name } => {
                self.rename_page(index, name, now);
                Ok(())
            }
            Action::SetCurrentPage { index } => self.set_current_page(index),
            Action::Undo => self.undo().map(|_| ()),
            Action::Redo => self.redo().map(|_| ()),
        }
    }

    fn target_index(&self, page: Option<usize>) -> CanvasResult<usize> {
        let index = page.unwrap_or(self.current_page_index);
        if index < self.pages.len() {
            Ok(index)
        } else {
            Err(CanvasError::PageOutOfRange {
                index,
                len: self.pages.len(),
            })
        }
    }

    fn checkpoint(&mut self, checkpoint: Checkpoint, now: u64) {
        if self.history.record(&self.pages, checkpoint, now) {
            tracing::trace!(depth = self.history.past().len(), "history entry pushed");
        }
    }

    /// Append `element` to a page (default: current) under a fresh id.
    ///
    /// # Errors
    ///
    /// Returns [`CanvasError::PageOutOfRange`] for a bad page index.
    pub fn add_element(
        &mut self,
        mut element: Element,
        page: Option<usize>,
        now: u64,
    ) -> CanvasResult<ElementId> {
        let index = self.target_index(page)?;
        element.id = ElementId::new();
        element.is_selected = false;
        element.backend_id = None;
        let id = element.id.clone();

        self.checkpoint(Checkpoint::Incremental, now);
        self.pages[index].elements.push(element);
        Ok(id)
    }

    /// Shallow-merge `patch` into an element. Missing ids are a silent no-op.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the page index is bad or the patch's
    /// content does not fit the element type.
    pub fn update_element(
        &mut self,
        id: &ElementId,
        patch: &ElementPatch,
        page: Option<usize>,
        now: u64,
    ) -> CanvasResult<()> {
        let index = self.target_index(page)?;
        let Some(current) = self.pages[index].element(id) else {
            tracing::debug!("update_element: {id} not found on page {index}");
            return Ok(());
        };
        if patch.is_empty() {
            return Ok(());
        }

        let mut updated = current.clone();
        updated.apply_patch(patch)?;

        self.checkpoint(Checkpoint::Incremental, now);
        if let Some(slot) = self.pages[index].element_mut(id) {
            *slot = updated;
        }
        Ok(())
    }

    /// Remove an element. Missing ids are a silent no-op.
    ///
    /// # Errors
    ///
    /// Returns [`CanvasError::EmptyId`] for an empty id and
    /// [`CanvasError::PageOutOfRange`] for a bad page index.
    pub fn delete_element(&mut self, id: &ElementId, page: Option<usize>, now: u64) -> CanvasResult<()> {
        if id.is_empty() {
            return Err(CanvasError::EmptyId);
        }
        let index = self.target_index(page)?;
        if self.pages[index].element(id).is_none() {
            tracing::debug!("delete_element: {id} not found on page {index}");
            return Ok(());
        }

        self.checkpoint(Checkpoint::Atomic, now);
        let page = &mut self.pages[index];
        if let Some(removed) = page.remove_element(id) {
            if let Some(element) = removed.backend_id {
                self.pending_deletions.push(Tombstone::Element {
                    page: page.backend_id.clone(),
                    element,
                });
            }
        }
        self.selected_element_ids.retain(|selected| selected != id);
        Ok(())
    }

    /// Select one element on the current page. Unknown ids are ignored.
    pub fn select_element(&mut self, id: &ElementId) {
        let index = self.current_page_index;
        if self.pages[index].select_only(id) {
            self.selected_element_ids = vec![id.clone()];
        } else {
            tracing::debug!("select_element: {id} not on current page");
        }
    }

    /// Deselect everything on the current page.
    pub fn clear_selection(&mut self) {
        let index = self.current_page_index;
        self.pages[index].deselect_all();
        self.selected_element_ids.clear();
    }

    /// Append a page with the current page's dimensions. Returns its index.
    pub fn add_page(&mut self, name: impl Into<String>, now: u64) -> usize {
        let mut name = name.into();
        if name.trim().is_empty() {
            name = format!("Page {}", self.pages.len() + 1);
        }
        let size = self.current_page().size();

        self.checkpoint(Checkpoint::Atomic, now);
        self.pages.push(Page::with_size(name, size));
        self.pages.len() - 1
    }

    /// Remove the page at `index`. Out-of-range indexes are a silent no-op.
    ///
    /// # Errors
    ///
    /// Returns [`CanvasError::LastPage`] if only one page remains.
    pub fn remove_page(&mut self, index: usize, now: u64) -> CanvasResult<()> {
        if self.pages.len() <= 1 {
            tracing::warn!("Refusing to remove the last page");
            return Err(CanvasError::LastPage);
        }
        if index >= self.pages.len() {
            tracing::debug!("remove_page: index {index} out of range");
            return Ok(());
        }

        if index <= self.current_page_index {
            self.clear_selection();
        }
        self.checkpoint(Checkpoint::Atomic, now);
        let removed = self.pages.remove(index);
        if let Some(page) = removed.backend_id {
            self.pending_deletions.push(Tombstone::Page { page });
        }
        self.current_page_index = self.current_page_index.min(self.pages.len() - 1);
        Ok(())
    }

    /// Rename the page at `index`. Out-of-range indexes are a silent no-op.
    pub fn rename_page(&mut self, index: usize, name: impl Into<String>, now: u64) {
        if index >= self.pages.len() {
            tracing::debug!("rename_page: index {index} out of range");
            return;
        }
        self.checkpoint(Checkpoint::Atomic, now);
        self.pages[index].name = name.into();
    }

    /// Switch to the page at `index`, clearing the selection.
    ///
    /// # Errors
    ///
    /// Returns [`CanvasError::PageOutOfRange`] for a bad index.
    pub fn set_current_page(&mut self, index: usize) -> CanvasResult<()> {
        if index >= self.pages.len() {
            return Err(CanvasError::PageOutOfRange {
                index,
                len: self.pages.len(),
            });
        }
        self.clear_selection();
        self.current_page_index = index;
        Ok(())
    }

    /// Step back in history. Returns whether anything changed.
    ///
    /// # Errors
    ///
    /// Returns [`CanvasError::CorruptHistory`] if the snapshot was malformed;
    /// the pages are left unchanged.
    pub fn undo(&mut self) -> CanvasResult<bool> {
        let restored = self.history.undo(&self.pages)?;
        Ok(self.restore(restored))
    }

    /// Step forward in history. Returns whether anything changed.
    ///
    /// # Errors
    ///
    /// Returns [`CanvasError::CorruptHistory`] if the snapshot was malformed;
    /// the pages are left unchanged.
    pub fn redo(&mut self) -> CanvasResult<bool> {
        let restored = self.history.redo(&self.pages)?;
        Ok(self.restore(restored))
    }

    fn restore(&mut self, snapshot: Option<Vec<Page>>) -> bool {
        let Some(pages) = snapshot else {
            return false;
        };
        self.pages = pages;
        self.selected_element_ids.clear();
        self.current_page_index = self.current_page_index.min(self.pages.len() - 1);
        true
    }

    /// Swap in a whole new set of pages as one undoable edit.
    ///
    /// Persisted pages and elements that no longer appear are tombstoned.
    /// An empty list becomes one blank page.
    pub fn replace_pages(&mut self, pages: Vec<Page>, now: u64) {
        let mut pages = without_selection(&pages);
        for page in &mut pages {
            page.fill_default_size();
        }
        if pages.is_empty() {
            pages.push(Page::new(FIRST_PAGE_NAME));
        }

        let dropped = removed_rows(&self.pages, &pages);

        self.clear_selection();
        self.checkpoint(Checkpoint::Atomic, now);
        for tombstone in dropped {
            self.pending_deletions.push(tombstone);
        }
        self.pages = pages;
        self.current_page_index = self.current_page_index.min(self.pages.len() - 1);
    }

    /// Record backend ids handed out by a save.
    ///
    /// Applied to the live pages and to every history snapshot so that an
    /// undo after a save does not resurrect rows without their identity.
    /// Does not create a history entry.
    pub fn apply_backend_ids(&mut self, assignments: &[Assignment]) {
        if assignments.is_empty() {
            return;
        }
        apply_assignments(&mut self.pages, assignments);
        self.history
            .for_each_snapshot_mut(|pages| apply_assignments(pages, assignments));
    }

    /// Forget tombstones the backend has deleted.
    pub fn acknowledge_deletions(&mut self, done: &[Tombstone]) {
        self.pending_deletions.acknowledge(done);
    }
}
