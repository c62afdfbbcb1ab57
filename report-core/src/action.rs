//! The action protocol that mutates a [`CanvasState`](crate::CanvasState).

use serde::{Deserialize, Serialize};

use crate::element::{Element, ElementId, ElementPatch};

/// A UI intent dispatched into the canvas state machine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum Action {
    /// Append an element (a fresh id is assigned) to a page, default the current one.
    AddElement {
        /// The element to add.
        element: Element,
        /// Target page index.
        #[serde(default)]
        page: Option<usize>,
    },
    /// Shallow-merge changes into an element.
    UpdateElement {
        /// The element to update.
        id: ElementId,
        /// Changes to apply.
        patch: ElementPatch,
        /// Target page index.
        #[serde(default)]
        page: Option<usize>,
    },
    /// Remove an element.
    DeleteElement {
        /// The element to remove.
        id: ElementId,
        /// Target page index.
        #[serde(default)]
        page: Option<usize>,
    },
    /// Make one element on the current page the selection.
    SelectElement {
        /// The element to select.
        id: ElementId,
    },
    /// Deselect everything on the current page.
    ClearSelection,
    /// Append a page with the current page's dimensions.
    AddPage {
        /// Display name.
        name: String,
    },
    /// Remove a page by position.
    RemovePage {
        /// Page index.
        index: usize,
    },
    /// Rename a page in place.
    RenamePage {
        /// Page index.
        index: usize,
        /// New display name.
        name: String,
    },
    /// Switch the page being edited.
    SetCurrentPage {
        /// Page index.
        index: usize,
    },
    /// Step back in history.
    Undo,
    /// Step forward in history.
    Redo,
}

impl Action {
    /// Short name for logging.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::AddElement { .. } => "add_element",
            Self::UpdateElement { .. } => "update_element",
            Self::DeleteElement { .. } => "delete_element",
            Self::SelectElement { .. } => "select_element",
            Self::ClearSelection => "clear_selection",
            Self::AddPage { .. } => "add_page",
            Self::RemovePage { .. } => "remove_page",
            Self::RenamePage { .. } => "rename_page",
            Self::SetCurrentPage { .. } => "set_current_page",
            Self::Undo => "undo",
            Self::Redo => "redo",
        }
    }
}
