//! Error types for document operations.

use thiserror::Error;

/// Result type for canvas operations.
pub type CanvasResult<T> = Result<T, CanvasError>;

/// Errors that can occur while editing a document.
///
/// Every variant except [`CanvasError::Serialization`] is a validation
/// failure: the operation is aborted before the state is touched.
#[derive(Debug, Error)]
pub enum CanvasError {
    /// Element type name outside the closed set.
    #[error("Unknown element type: {0}")]
    UnknownElementType(String),

    /// Content payload does not match the element type's schema.
    #[error("Invalid content for {kind} element: {reason}")]
    InvalidContent {
        /// Element type the payload was validated against.
        kind: String,
        /// Why the payload was rejected.
        reason: String,
    },

    /// The only remaining page cannot be removed.
    #[error("Cannot remove the last remaining page")]
    LastPage,

    /// Page index does not address an existing page.
    #[error("Page index {index} out of range ({len} pages)")]
    PageOutOfRange {
        /// Requested index.
        index: usize,
        /// Number of pages in the document.
        len: usize,
    },

    /// An element id was required but empty.
    #[error("Element id must not be empty")]
    EmptyId,

    /// A history snapshot was malformed and has been discarded.
    #[error("Corrupt history entry: {0}")]
    CorruptHistory(String),

    /// A report failed structural validation.
    #[error("Invalid report: {0}")]
    InvalidReport(String),

    /// JSON (de)serialization failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CanvasError {
    /// Whether the error should be shown to the user as a notification.
    #[must_use]
    pub fn is_user_facing(&self) -> bool {
        !matches!(self, Self::Serialization(_) | Self::CorruptHistory(_))
    }
}
