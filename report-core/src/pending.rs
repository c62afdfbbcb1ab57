//! # Pending Deletions and Save Plans
//!
//! Tracks backend rows removed locally since the last successful save and
//! turns the current pages into an ordered list of backend writes.
//!
//! ## Usage
//!
//! ```text
//! 1. Deleting a persisted element or page records a tombstone
//! 2. Rows in the last saved copy that are gone locally (undo, replace)
//!    are added by `removed_rows`
//! 3. A save builds a SavePlan: deletions first, then per-page create/update
//! 4. Backend ids returned by creates are applied back onto the pages
//! 5. Tombstones are acknowledged only after the backend confirmed them
//! ```

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::element::{BackendId, ElementId};
use crate::page::{Page, PageId};
use crate::wire::{WireCodec, WireElement, WireError, WirePage};

/// A backend row removed locally that still has to be deleted remotely.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Tombstone {
    /// A whole page.
    Page {
        /// Backend id of the page.
        page: BackendId,
    },
    /// A single element.
    Element {
        /// Backend id of the owning page, if it had been saved.
        page: Option<BackendId>,
        /// Backend id of the element.
        element: BackendId,
    },
}

impl Tombstone {
    /// The backend id this tombstone deletes.
    #[must_use]
    pub fn target(&self) -> &BackendId {
        match self {
            Self::Page { page } => page,
            Self::Element { element, .. } => element,
        }
    }
}

/// Tombstones accumulated between saves.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PendingDeletions {
    tombstones: Vec<Tombstone>,
}

impl PendingDeletions {
    /// Create an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a tombstone, ignoring duplicates.
    pub fn push(&mut self, tombstone: Tombstone) {
        if !self.tombstones.contains(&tombstone) {
            self.tombstones.push(tombstone);
        }
    }

    /// Get the number of pending deletions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tombstones.len()
    }

    /// Check if nothing is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tombstones.is_empty()
    }

    /// Peek at pending tombstones without removing them.
    #[must_use]
    pub fn tombstones(&self) -> &[Tombstone] {
        &self.tombstones
    }

    /// Drop tombstones the backend has confirmed.
    pub fn acknowledge(&mut self, done: &[Tombstone]) {
        self.tombstones.retain(|t| !done.contains(t));
    }

    /// Clear all pending deletions.
    pub fn clear(&mut self) {
        self.tombstones.clear();
    }
}

/// Backend write for one element.
#[derive(Debug, Clone, PartialEq)]
pub struct ElementSave {
    /// Local element id, used to apply the returned backend id.
    pub element_id: ElementId,
    /// Encoded element; `wire.id` is set for updates.
    pub wire: WireElement,
}

impl ElementSave {
    /// Whether this write creates a new backend row.
    #[must_use]
    pub fn is_create(&self) -> bool {
        self.wire.id.is_none()
    }
}

/// Backend writes for one page.
#[derive(Debug, Clone, PartialEq)]
pub struct PageSave {
    /// Local page id, used to apply the returned backend id.
    pub page_id: PageId,
    /// Encoded page header; `wire.id` is set for updates, `wire.elements` is empty.
    pub wire: WirePage,
    /// Element writes in z-order.
    pub elements: Vec<ElementSave>,
}

impl PageSave {
    /// Whether this write creates a new backend row.
    #[must_use]
    pub fn is_create(&self) -> bool {
        self.wire.id.is_none()
    }
}

/// Everything a save has to send, in execution order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SavePlan {
    /// Remote rows to delete, elements before pages.
    pub deletions: Vec<Tombstone>,
    /// Pages to create or update.
    pub pages: Vec<PageSave>,
}

impl SavePlan {
    /// Build a plan for `pages` given the pending tombstones.
    ///
    /// Tombstones whose target is present again (restored by undo) are left
    /// out, so the row is updated instead of deleted.
    ///
    /// # Errors
    ///
    /// Propagates wire encoding errors.
    pub fn build(
        codec: &WireCodec,
        pages: &[Page],
        pending: &PendingDeletions,
    ) -> Result<Self, WireError> {
        let live = live_ids(pages);
        let mut deletions: Vec<Tombstone> = pending
            .tombstones()
            .iter()
            .filter(|t| !live.contains(t.target()))
            .cloned()
            .collect();
        deletions.sort_by_key(|t| matches!(t, Tombstone::Page { .. }));

        let mut saves = Vec::with_capacity(pages.len());
        for (order, page) in pages.iter().enumerate() {
            let mut elements = Vec::with_capacity(page.elements.len());
            for element in &page.elements {
                if let Some(wire) = codec.element_to_wire(element)? {
                    elements.push(ElementSave {
                        element_id: element.id.clone(),
                        wire,
                    });
                }
            }
            saves.push(PageSave {
                page_id: page.id.clone(),
                wire: WireCodec::page_header(page, order),
                elements,
            });
        }

        Ok(Self {
            deletions,
            pages: saves,
        })
    }

    /// Whether the plan only updates existing rows.
    #[must_use]
    pub fn is_update_only(&self) -> bool {
        self.deletions.is_empty()
            && self
                .pages
                .iter()
                .all(|p| !p.is_create() && p.elements.iter().all(|e| !e.is_create()))
    }

    /// Number of create writes in the plan.
    #[must_use]
    pub fn create_count(&self) -> usize {
        self.pages
            .iter()
            .map(|p| usize::from(p.is_create()) + p.elements.iter().filter(|e| e.is_create()).count())
            .sum()
    }
}

fn live_ids(pages: &[Page]) -> HashSet<&BackendId> {
    pages
        .iter()
        .flat_map(|page| {
            page.backend_id
                .iter()
                .chain(page.elements.iter().filter_map(|e| e.backend_id.as_ref()))
        })
        .collect()
}

/// Tombstones for rows persisted in `committed` that are missing from `pages`.
///
/// A missing page yields one page tombstone; its elements go with it.
#[must_use]
pub fn removed_rows(committed: &[Page], pages: &[Page]) -> Vec<Tombstone> {
    let live = live_ids(pages);
    let mut removed = Vec::new();
    for page in committed {
        match &page.backend_id {
            Some(id) if !live.contains(id) => {
                removed.push(Tombstone::Page { page: id.clone() });
            }
            _ => {
                for element in &page.elements {
                    if let Some(id) = element.backend_id.as_ref().filter(|id| !live.contains(id)) {
                        removed.push(Tombstone::Element {
                            page: page.backend_id.clone(),
                            element: id.clone(),
                        });
                    }
                }
            }
        }
    }
    removed
}

/// A backend id handed out by a create call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    /// Page the id belongs to (or that owns the element).
    pub page: PageId,
    /// Element the id belongs to; `None` for the page itself.
    pub element: Option<ElementId>,
    /// The new backend id.
    pub backend_id: BackendId,
}

/// Write assigned backend ids into `pages`. Unknown targets are ignored.
pub fn apply_assignments(pages: &mut [Page], assignments: &[Assignment]) {
    for assignment in assignments {
        let Some(page) = pages.iter_mut().find(|p| p.id == assignment.page) else {
            continue;
        };
        match &assignment.element {
            None => page.backend_id = Some(assignment.backend_id.clone()),
            Some(element_id) => {
                if let Some(element) = page.element_mut(element_id) {
                    element.backend_id = Some(assignment.backend_id.clone());
                }
            }
        }
    }
}
