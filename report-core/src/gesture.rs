//! Pointer input for dragging and resizing elements.
//!
//! A [`GestureTracker`] turns a down/move/up pointer stream into
//! `UpdateElement` actions. Every move is dispatched, and the history
//! quiescence window folds the whole gesture into one undo step.

use serde::{Deserialize, Serialize};

use crate::action::Action;
use crate::element::{ElementId, ElementPatch, MIN_ELEMENT_SIZE};
use crate::state::CanvasState;
use crate::CanvasResult;

/// Phase of a pointer event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PointerPhase {
    /// Button pressed.
    Down,
    /// Pointer moved.
    Move,
    /// Button released.
    Up,
}

/// A pointer event in canvas coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PointerEvent {
    /// Phase of this event.
    pub phase: PointerPhase,
    /// X position in canvas coordinates.
    pub x: f64,
    /// Y position in canvas coordinates.
    pub y: f64,
    /// Timestamp in milliseconds.
    pub timestamp_ms: u64,
}

impl PointerEvent {
    /// Create a new pointer event.
    #[must_use]
    pub const fn new(phase: PointerPhase, x: f64, y: f64, timestamp_ms: u64) -> Self {
        Self {
            phase,
            x,
            y,
            timestamp_ms,
        }
    }
}

/// What an active gesture does to its element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GestureKind {
    /// Move the element with the pointer.
    Drag,
    /// Resize from the bottom-right handle.
    Resize,
}

/// An in-progress gesture bound to one element.
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveGesture {
    /// Drag or resize.
    pub kind: GestureKind,
    /// Element being manipulated.
    pub element_id: ElementId,
    /// Page the element lives on.
    pub page_index: usize,
    start: (f64, f64),
    origin: (f64, f64),
}

/// Tracks at most one drag or resize at a time.
#[derive(Debug, Clone, Default)]
pub struct GestureTracker {
    active: Option<ActiveGesture>,
}

impl GestureTracker {
    /// Create an idle tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The gesture in progress, if any.
    #[must_use]
    pub fn active(&self) -> Option<&ActiveGesture> {
        self.active.as_ref()
    }

    /// Whether a gesture is in progress.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    /// Start dragging `id` on the current page from pointer position `(x, y)`.
    ///
    /// Returns `false` (and stays idle) if the element is not on the current page.
    pub fn begin_drag(&mut self, state: &CanvasState, id: &ElementId, x: f64, y: f64) -> bool {
        self.begin(state, GestureKind::Drag, id, x, y)
    }

    /// Start resizing `id` on the current page from pointer position `(x, y)`.
    ///
    /// Returns `false` (and stays idle) if the element is not on the current page.
    pub fn begin_resize(&mut self, state: &CanvasState, id: &ElementId, x: f64, y: f64) -> bool {
        self.begin(state, GestureKind::Resize, id, x, y)
    }

    fn begin(
        &mut self,
        state: &CanvasState,
        kind: GestureKind,
        id: &ElementId,
        x: f64,
        y: f64,
    ) -> bool {
        let page_index = state.current_page_index();
        let Some(element) = state.current_page().element(id) else {
            self.active = None;
            return false;
        };
        let origin = match kind {
            GestureKind::Drag => (element.x, element.y),
            GestureKind::Resize => (element.width, element.height),
        };
        self.active = Some(ActiveGesture {
            kind,
            element_id: id.clone(),
            page_index,
            start: (x, y),
            origin,
        });
        true
    }

    /// Translate a pointer position into an update for the active element.
    #[must_use]
    pub fn pointer_move(&self, x: f64, y: f64) -> Option<Action> {
        let gesture = self.active.as_ref()?;
        let dx = x - gesture.start.0;
        let dy = y - gesture.start.1;
        let patch = match gesture.kind {
            GestureKind::Drag => ElementPatch::moved_to(gesture.origin.0 + dx, gesture.origin.1 + dy),
            GestureKind::Resize => ElementPatch::resized_to(
                (gesture.origin.0 + dx).max(MIN_ELEMENT_SIZE),
                (gesture.origin.1 + dy).max(MIN_ELEMENT_SIZE),
            ),
        };
        Some(Action::UpdateElement {
            id: gesture.element_id.clone(),
            patch,
            page: Some(gesture.page_index),
        })
    }

    /// Finish the gesture.
    pub fn end(&mut self) {
        self.active = None;
    }

    /// Feed a pointer event through the tracker into `state`.
    ///
    /// A `Down` over an element selects it and starts a drag; `Down` over
    /// empty canvas clears the selection.
    ///
    /// # Errors
    ///
    /// Propagates errors from dispatching the resulting update.
    pub fn handle(&mut self, state: &mut CanvasState, event: &PointerEvent) -> CanvasResult<()> {
        match event.phase {
            PointerPhase::Down => {
                let hit = state
                    .current_page()
                    .element_at(event.x, event.y)
                    .map(|element| element.id.clone());
                match hit {
                    Some(id) => {
                        state.select_element(&id);
                        self.begin_drag(state, &id, event.x, event.y);
                    }
                    None => {
                        state.clear_selection();
                        self.end();
                    }
                }
                Ok(())
            }
            PointerPhase::Move => match self.pointer_move(event.x, event.y) {
                Some(action) => state.dispatch(action, event.timestamp_ms),
                None => Ok(()),
            },
            PointerPhase::Up => {
                self.end();
                Ok(())
            }
        }
    }
}
