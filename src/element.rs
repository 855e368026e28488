use std::fmt;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tiny_skia::Pixmap;
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::decoding::DecodeJob;
use crate::viewport::Rect;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct ElementId(Uuid);

impl ElementId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementKind {
    /// Photographed "cancelled" stamp or similar mark.
    Mark,
    Signature,
    /// Rasterized text stamp.
    Text,
}

impl ElementKind {
    pub fn keyword(self) -> &'static str {
        match self {
            Self::Mark => "mark",
            Self::Signature => "signature",
            Self::Text => "text",
        }
    }

    /// Label shown next to the element in the host's element list.
    pub fn label(self) -> &'static str {
        match self {
            Self::Mark => "Cancelled Text",
            Self::Signature => "Signature",
            Self::Text => "Text Stamp",
        }
    }

    /// Photographed marks go through ink extraction unless the caller says
    /// otherwise. Signatures are used as uploaded and text is already
    /// transparent.
    pub fn strips_background_by_default(self) -> bool {
        matches!(self, Self::Mark)
    }
}

/// Initial image-space rectangle for a freshly added bitmap.
///
/// The bitmap is shrunk (never grown) to fit the configured share of the base
/// image, centered horizontally. Signatures sit near the bottom edge; other
/// kinds are centered vertically.
pub fn default_placement(
    kind: ElementKind,
    source_size: (u32, u32),
    base_size: (u32, u32),
    config: &EngineConfig,
) -> Rect {
    let (base_width, base_height) = (base_size.0 as f32, base_size.1 as f32);
    let max_width = base_width * config.upload_max_width_fraction;
    let max_height = base_height * config.upload_max_height_fraction;

    let mut width = source_size.0.max(1) as f32;
    let mut height = source_size.1.max(1) as f32;
    if width > max_width {
        height *= max_width / width;
        width = max_width;
    }
    if height > max_height {
        width *= max_height / height;
        height = max_height;
    }

    let x = (base_width - width) / 2.0;
    let y = match kind {
        ElementKind::Signature => base_height - height - config.signature_bottom_margin,
        ElementKind::Mark | ElementKind::Text => (base_height - height) / 2.0,
    };

    Rect::new(x.max(0.0), y.max(0.0), width, height)
}

pub fn normalize_rotation(degrees: i32) -> u16 {
    degrees.rem_euclid(360) as u16
}

pub(crate) enum BitmapSlot {
    Decoding(DecodeJob),
    Ready(Pixmap),
}

/// Outcome of polling an element's pending decode.
pub(crate) enum DecodePoll {
    Unchanged,
    Completed,
    Failed(anyhow::Error),
}

/// A placed overlay. Geometry is in image space; the display size is derived
/// from it and the session scale and is refreshed by the session whenever
/// either changes.
pub struct Element {
    id: ElementId,
    kind: ElementKind,
    bitmap: BitmapSlot,
    rect: Rect,
    rotation_degrees: u16,
    display_width: f32,
    display_height: f32,
}

impl Element {
    pub(crate) fn new(kind: ElementKind, bitmap: BitmapSlot, rect: Rect, scale: f32) -> Self {
        let mut element = Self {
            id: ElementId::new(),
            kind,
            bitmap,
            rect,
            rotation_degrees: 0,
            display_width: 0.0,
            display_height: 0.0,
        };
        element.sync_display(scale);
        element
    }

    pub fn id(&self) -> ElementId {
        self.id
    }

    pub fn kind(&self) -> ElementKind {
        self.kind
    }

    /// Image-space rectangle.
    pub fn rect(&self) -> Rect {
        self.rect
    }

    pub fn rotation_degrees(&self) -> u16 {
        self.rotation_degrees
    }

    pub fn display_size(&self) -> (f32, f32) {
        (self.display_width, self.display_height)
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.bitmap, BitmapSlot::Ready(_))
    }

    /// `None` while the bitmap is still decoding.
    pub fn bitmap(&self) -> Option<&Pixmap> {
        match &self.bitmap {
            BitmapSlot::Ready(pixmap) => Some(pixmap),
            BitmapSlot::Decoding(_) => None,
        }
    }

    pub(crate) fn set_position(&mut self, x: f32, y: f32) {
        self.rect.x = x.max(0.0);
        self.rect.y = y.max(0.0);
    }

    pub(crate) fn set_size(&mut self, width: f32, height: f32, scale: f32) {
        self.rect.width = width.max(0.0);
        self.rect.height = height.max(0.0);
        self.sync_display(scale);
    }

    pub(crate) fn set_rotation(&mut self, degrees: i32) {
        self.rotation_degrees = normalize_rotation(degrees);
    }

    pub(crate) fn rotate_quarter_turn(&mut self) -> u16 {
        self.set_rotation(i32::from(self.rotation_degrees) + 90);
        self.rotation_degrees
    }

    pub(crate) fn sync_display(&mut self, scale: f32) {
        self.display_width = self.rect.width * scale;
        self.display_height = self.rect.height * scale;
    }

    pub(crate) fn poll_bitmap(&mut self) -> DecodePoll {
        let BitmapSlot::Decoding(job) = &mut self.bitmap else {
            return DecodePoll::Unchanged;
        };
        match job.try_finish() {
            None => DecodePoll::Unchanged,
            Some(Ok(pixmap)) => {
                self.bitmap = BitmapSlot::Ready(pixmap);
                DecodePoll::Completed
            }
            Some(Err(error)) => DecodePoll::Failed(error),
        }
    }

    /// Blocks until a pending decode finishes. Returns whether there was one.
    pub(crate) fn finish_bitmap(&mut self) -> Result<bool> {
        let BitmapSlot::Decoding(job) = &mut self.bitmap else {
            return Ok(false);
        };
        let pixmap = job.wait()?;
        self.bitmap = BitmapSlot::Ready(pixmap);
        Ok(true)
    }
}

impl fmt::Debug for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Element")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("rect", &self.rect)
            .field("rotation_degrees", &self.rotation_degrees)
            .field("ready", &self.is_ready())
            .finish()
    }
}
