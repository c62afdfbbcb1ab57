//! # Report Core
//!
//! Document engine for the medical report editor: a multi-page canvas of
//! typed elements, snapshot undo/redo, an active-report reconciler and the
//! mapping to the backend's numeric-coded wire format.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │                 report-core                 │
//! ├─────────────────────────────────────────────┤
//! │  Document Model  │  Canvas State Machine    │
//! │  - Elements      │  - Action dispatch       │
//! │  - Pages         │  - Selection             │
//! │  - Reports       │  - Gestures              │
//! ├─────────────────────────────────────────────┤
//! │  History         │  Reconciler              │
//! │  - Snapshots     │  - Active report cache   │
//! │  - Quiescence    │  - Pending detection     │
//! ├─────────────────────────────────────────────┤
//! │  Wire Mapper     │  Save Planning           │
//! │  - Type codes    │  - Tombstones            │
//! │  - Drop/Strict   │  - Create vs update      │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! Everything here is synchronous. Network persistence lives in
//! `report-sync`.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod action;
pub mod documents;
pub mod element;
pub mod error;
pub mod gesture;
pub mod history;
pub mod page;
pub mod pending;
pub mod reconciler;
pub mod report;
pub mod state;
pub mod wire;

pub use action::Action;
pub use documents::Documents;
pub use element::{
    BackendId, CellStatus, ChartContent, ChartType, CommentContent, ContentUpdate, Element,
    ElementContent, ElementId, ElementPatch, ElementType, ShapeContent, SignatureContent,
    TableContent, TextContent, MIN_ELEMENT_SIZE,
};
pub use error::{CanvasError, CanvasResult};
pub use gesture::{GestureTracker, PointerEvent, PointerPhase};
pub use history::{Checkpoint, History, DEFAULT_HISTORY_LIMIT, QUIESCENCE_WINDOW_MS};
pub use page::{Page, PageId, PageSize};
pub use pending::{removed_rows, Assignment, PendingDeletions, SavePlan, Tombstone};
pub use reconciler::{LoadOutcome, Reconciler};
pub use report::{
    current_timestamp_ms, Patient, Report, ReportId, ReportSummary, Template, WireReport,
    WireTemplate,
};
pub use state::CanvasState;
pub use wire::{
    from_wire, to_wire, UnknownTypePolicy, WireCodec, WireElement, WireError, WirePage, WireType,
};

/// Report core version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
