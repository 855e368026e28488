//! Pointer gestures over placed elements.
//!
//! Mouse and touch input are reduced to a single client point before any
//! gesture logic runs. At most one gesture is active at a time; all geometry
//! here is display space and the session converts results to image space.

use serde::Serialize;

use crate::element::ElementId;
use crate::viewport::{Point, Rect};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PointerPhase {
    Down,
    Move,
    Up,
    Cancel,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PointerSource {
    Mouse(Point),
    /// Active touches in client coordinates; only the first one steers.
    Touch(Vec<Point>),
}

impl PointerSource {
    pub fn client_point(&self) -> Option<Point> {
        match self {
            Self::Mouse(point) => Some(*point),
            Self::Touch(touches) => touches.first().copied(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PointerEvent {
    pub phase: PointerPhase,
    pub source: PointerSource,
}

impl PointerEvent {
    pub fn mouse(phase: PointerPhase, client_x: f32, client_y: f32) -> Self {
        Self {
            phase,
            source: PointerSource::Mouse(Point::new(client_x, client_y)),
        }
    }

    pub fn touch(phase: PointerPhase, touches: Vec<Point>) -> Self {
        Self {
            phase,
            source: PointerSource::Touch(touches),
        }
    }

    pub fn client_point(&self) -> Option<Point> {
        self.source.client_point()
    }
}

/// Region of an element's on-screen box a pointer can land on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementPart {
    Body,
    ResizeHandle,
    RemoveButton,
    RotateButton,
}

/// Which part of `display_rect` contains `point`, if any. Controls sit in the
/// corners as squares of side `handle`, shrunk to a third of the box on small
/// elements so the middle always stays draggable: remove top-right, rotate
/// top-left and resize bottom-right. Controls win over the body.
pub fn locate_part(display_rect: Rect, point: Point, handle: f32) -> Option<ElementPart> {
    if !display_rect.contains(point) {
        return None;
    }
    let handle = handle
        .min(display_rect.width / 3.0)
        .min(display_rect.height / 3.0);
    let near_left = point.x < display_rect.x + handle;
    let near_right = point.x >= display_rect.right() - handle;
    let near_top = point.y < display_rect.y + handle;
    let near_bottom = point.y >= display_rect.bottom() - handle;

    let part = if near_top && near_right {
        ElementPart::RemoveButton
    } else if near_top && near_left {
        ElementPart::RotateButton
    } else if near_bottom && near_right {
        ElementPart::ResizeHandle
    } else {
        ElementPart::Body
    };
    Some(part)
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Gesture {
    #[default]
    Idle,
    Dragging {
        id: ElementId,
        /// Pointer position inside the element when the drag started.
        offset: Point,
    },
    Resizing {
        id: ElementId,
        start: Point,
        start_width: f32,
        start_height: f32,
        aspect: f32,
    },
}

impl Gesture {
    pub fn begin_drag(id: ElementId, pointer: Point, display_rect: Rect) -> Self {
        Self::Dragging {
            id,
            offset: Point::new(pointer.x - display_rect.x, pointer.y - display_rect.y),
        }
    }

    pub fn begin_resize(id: ElementId, pointer: Point, display_size: (f32, f32)) -> Self {
        let (width, height) = display_size;
        Self::Resizing {
            id,
            start: pointer,
            start_width: width,
            start_height: height,
            aspect: aspect_ratio(width, height),
        }
    }

    pub fn target(&self) -> Option<ElementId> {
        match self {
            Self::Idle => None,
            Self::Dragging { id, .. } | Self::Resizing { id, .. } => Some(*id),
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Dragging { .. } => "dragging",
            Self::Resizing { .. } => "resizing",
        }
    }
}

fn aspect_ratio(width: f32, height: f32) -> f32 {
    if width > 0.0 && height > 0.0 {
        width / height
    } else {
        1.0
    }
}

/// Display position for a dragged element, kept inside the overlay.
pub fn drag_target(
    pointer: Point,
    offset: Point,
    display_size: (f32, f32),
    overlay_size: (f32, f32),
) -> Point {
    let max_x = (overlay_size.0 - display_size.0).max(0.0);
    let max_y = (overlay_size.1 - display_size.1).max(0.0);
    Point::new(
        (pointer.x - offset.x).clamp(0.0, max_x),
        (pointer.y - offset.y).clamp(0.0, max_y),
    )
}

pub struct ResizeBounds {
    /// Space between the element's display position and the overlay edges.
    pub available_width: f32,
    pub available_height: f32,
    pub min_size: f32,
}

/// Display size for a resize gesture moved by `delta` from its start.
///
/// The axis with the larger movement drives and the other follows the
/// starting aspect ratio. Both dimensions are clamped to
/// `[min_size, available]`, then the aspect ratio is restored from whichever
/// dimension the clamp left more constrained.
pub fn resize_target(
    start_size: (f32, f32),
    aspect: f32,
    delta: Point,
    bounds: &ResizeBounds,
) -> (f32, f32) {
    let (start_width, start_height) = start_size;
    let (width, height) = if delta.x.abs() > delta.y.abs() {
        let width = start_width + delta.x;
        (width, width / aspect)
    } else {
        let height = start_height + delta.y;
        (height * aspect, height)
    };

    let max_width = bounds.available_width.max(bounds.min_size);
    let max_height = bounds.available_height.max(bounds.min_size);
    let mut width = width.clamp(bounds.min_size, max_width);
    let mut height = height.clamp(bounds.min_size, max_height);

    if width / height > aspect {
        width = height * aspect;
    } else {
        height = width / aspect;
    }
    (width, height)
}
