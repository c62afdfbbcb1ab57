//! Pages - ordered, named canvases holding elements.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::element::{BackendId, Element, ElementId, TableContent};

/// Page dimensions in canvas units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageSize {
    /// Width in canvas units.
    pub width: f64,
    /// Height in canvas units.
    pub height: f64,
}

impl PageSize {
    /// A4 at 72 dpi.
    pub const A4: Self = Self {
        width: 595.0,
        height: 842.0,
    };

    /// Screen-sized page used by older report templates.
    pub const LEGACY: Self = Self {
        width: 800.0,
        height: 1100.0,
    };
}

impl Default for PageSize {
    fn default() -> Self {
        Self::A4
    }
}

/// Unique identifier for a page.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PageId(String);

impl PageId {
    /// Create a new unique page ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Borrow the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for PageId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for PageId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for PageId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn default_width() -> f64 {
    PageSize::default().width
}

fn default_height() -> f64 {
    PageSize::default().height
}

/// One sheet of the document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    /// Page identifier.
    #[serde(default)]
    pub id: PageId,
    /// Display name.
    pub name: String,
    /// Elements in z-order (first is drawn at the bottom).
    #[serde(default)]
    pub elements: Vec<Element>,
    /// Width in canvas units.
    #[serde(default = "default_width")]
    pub width: f64,
    /// Height in canvas units.
    #[serde(default = "default_height")]
    pub height: f64,
    /// Identity in the persisted store, once saved.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend_id: Option<BackendId>,
}

impl Page {
    /// Create an empty page of the default size.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_size(name, PageSize::default())
    }

    /// Create an empty page of the given size.
    #[must_use]
    pub fn with_size(name: impl Into<String>, size: PageSize) -> Self {
        Self {
            id: PageId::new(),
            name: name.into(),
            elements: Vec::new(),
            width: size.width,
            height: size.height,
            backend_id: None,
        }
    }

    /// Page dimensions.
    #[must_use]
    pub fn size(&self) -> PageSize {
        PageSize {
            width: self.width,
            height: self.height,
        }
    }

    /// Replace missing or non-positive dimensions with the default size.
    pub fn fill_default_size(&mut self) {
        let fallback = PageSize::default();
        if !(self.width > 0.0) {
            self.width = fallback.width;
        }
        if !(self.height > 0.0) {
            self.height = fallback.height;
        }
    }

    /// Get an element by ID.
    #[must_use]
    pub fn element(&self, id: &ElementId) -> Option<&Element> {
        self.elements.iter().find(|e| &e.id == id)
    }

    /// Get a mutable reference to an element by ID.
    pub fn element_mut(&mut self, id: &ElementId) -> Option<&mut Element> {
        self.elements.iter_mut().find(|e| &e.id == id)
    }

    /// Remove an element by ID, returning it if it was present.
    pub fn remove_element(&mut self, id: &ElementId) -> Option<Element> {
        let index = self.elements.iter().position(|e| &e.id == id)?;
        Some(self.elements.remove(index))
    }

    /// Find the topmost element at the given canvas coordinates.
    #[must_use]
    pub fn element_at(&self, x: f64, y: f64) -> Option<&Element> {
        self.elements.iter().rev().find(|e| e.contains_point(x, y))
    }

    /// Mark exactly one element as selected. Returns false if it is not on this page.
    pub fn select_only(&mut self, id: &ElementId) -> bool {
        if self.element(id).is_none() {
            return false;
        }
        for element in &mut self.elements {
            element.is_selected = &element.id == id;
        }
        true
    }

    /// Clear every selection flag on this page.
    pub fn deselect_all(&mut self) {
        for element in &mut self.elements {
            element.is_selected = false;
        }
    }

    /// Table payloads on this page, in z-order, for export consumers.
    pub fn tables(&self) -> impl Iterator<Item = &TableContent> {
        self.elements.iter().filter_map(|e| e.content.as_table())
    }

    /// Number of elements on the page.
    #[must_use]
    pub fn element_count(&self) -> usize {
        self.elements.len()
    }

    /// Check if the page has no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }
}

/// Copy of `pages` with every selection flag cleared.
///
/// Selection is UI state and never takes part in change detection or saves.
#[must_use]
pub fn without_selection(pages: &[Page]) -> Vec<Page> {
    let mut pages = pages.to_vec();
    for page in &mut pages {
        page.deselect_all();
    }
    pages
}
