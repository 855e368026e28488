//! The editing session: one base image, its ordered elements, the display
//! scale, the active gesture and the flattened output surface.
//!
//! Every mutating call leaves elements fully updated and then re-renders, so
//! the output always reflects the last completed call. Bitmap decodes run on
//! worker threads and are only applied by [`Session::pump_decodes`] or
//! [`Session::wait_for_decodes`].

use anyhow::{anyhow, Result};
use image::RgbaImage;
use serde::Serialize;
use tiny_skia::Pixmap;

use crate::background::remove_background;
use crate::compositor::{encode_png, pixmap_from_rgba, Compositor, RenderStats};
use crate::config::EngineConfig;
use crate::decoding::{decode_rgba, read_dimensions, DecodeJob};
use crate::element::{default_placement, BitmapSlot, DecodePoll, Element, ElementId, ElementKind};
use crate::error_codes::{CodedError, NO_BASE_IMAGE};
use crate::interaction::{
    drag_target, locate_part, resize_target, ElementPart, Gesture, PointerEvent, PointerPhase,
    ResizeBounds,
};
use crate::text_stamp::{render_stamp, StampRequest, TextFace};
use crate::viewport::{Point, Rect, Viewport};

/// Receives element and overlay changes so on-screen representations can be
/// kept in step with the session. Every method defaults to doing nothing.
pub trait OverlayHost {
    fn element_added(&mut self, _element: &ElementView) {}
    fn element_updated(&mut self, _element: &ElementView) {}
    fn element_removed(&mut self, _id: ElementId) {}
    fn overlay_resized(&mut self, _width: f32, _height: f32) {}
}

/// Snapshot of an element in both coordinate spaces.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ElementView {
    pub id: ElementId,
    pub kind: ElementKind,
    pub label: &'static str,
    /// Image space.
    pub rect: Rect,
    /// Display space, relative to the overlay origin.
    pub display: Rect,
    pub rotation_degrees: u16,
    pub ready: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PointerOutcome {
    Ignored,
    DragStarted(ElementId),
    ResizeStarted(ElementId),
    Updated(ElementId),
    Ended,
    Rotated(ElementId, u16),
    Removed(ElementId),
}

struct BaseImage {
    pixmap: Pixmap,
    viewport: Viewport,
    compositor: Compositor,
}

pub struct Session {
    config: EngineConfig,
    viewport_width: f32,
    overlay_origin: Point,
    base: Option<BaseImage>,
    elements: Vec<Element>,
    gesture: Gesture,
    text_face: TextFace,
    host: Option<Box<dyn OverlayHost>>,
    last_render: RenderStats,
}

impl Session {
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let viewport_width = config.max_display_width + config.viewport_margin;
        Ok(Self {
            config,
            viewport_width,
            overlay_origin: Point::default(),
            base: None,
            elements: Vec::new(),
            gesture: Gesture::Idle,
            text_face: TextFace::Pixel,
            host: None,
            last_render: RenderStats::default(),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn set_host(&mut self, host: Box<dyn OverlayHost>) {
        self.host = Some(host);
    }

    pub fn set_text_face(&mut self, face: TextFace) {
        self.text_face = face;
    }

    /// Client coordinates of the overlay's top-left corner.
    pub fn set_overlay_origin(&mut self, origin: Point) {
        self.overlay_origin = origin;
    }

    pub fn load_base_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        let image = decode_rgba(bytes)?;
        self.load_base(&image)
    }

    /// Starts a fresh composition on `image`. Existing elements are removed.
    pub fn load_base(&mut self, image: &RgbaImage) -> Result<()> {
        let (width, height) = image.dimensions();
        let pixmap = pixmap_from_rgba(image)?;
        let compositor = Compositor::new(width, height)?;
        self.clear_elements();

        let viewport = Viewport::new(width, height, self.viewport_width, &self.config);
        let (overlay_width, overlay_height) = viewport.overlay_size();
        tracing::info!(
            width,
            height,
            scale = viewport.scale(),
            "base image loaded"
        );
        self.base = Some(BaseImage {
            pixmap,
            viewport,
            compositor,
        });
        self.render();
        self.notify(|host| host.overlay_resized(overlay_width, overlay_height));
        Ok(())
    }

    pub fn has_base(&self) -> bool {
        self.base.is_some()
    }

    /// Recomputes the scale for a new host viewport width and refreshes every
    /// element's display size.
    pub fn set_viewport_width(&mut self, viewport_width: f32) {
        self.viewport_width = viewport_width;
        let Some(base) = self.base.as_mut() else {
            return;
        };
        if !base.viewport.resize(viewport_width, &self.config) {
            return;
        }

        let scale = base.viewport.scale();
        let (overlay_width, overlay_height) = base.viewport.overlay_size();
        for element in &mut self.elements {
            element.sync_display(scale);
        }
        tracing::debug!(viewport_width, scale, "display scale recomputed");

        self.notify(|host| host.overlay_resized(overlay_width, overlay_height));
        let views = self.views();
        for view in &views {
            self.notify(|host| host.element_updated(view));
        }
    }

    /// Places an encoded upload right away from its header and decodes the
    /// pixels in the background. The element is skipped by renders until
    /// [`Session::pump_decodes`] sees the decode finish.
    ///
    /// Empty bytes or a missing base image are a silent no-op.
    pub fn add_upload(
        &mut self,
        kind: ElementKind,
        bytes: Vec<u8>,
        strip_background: Option<bool>,
    ) -> Result<Option<ElementId>> {
        if bytes.is_empty() {
            tracing::debug!(kind = kind.keyword(), "ignoring empty upload");
            return Ok(None);
        }
        let Some(base_size) = self.base_size() else {
            tracing::debug!(kind = kind.keyword(), "ignoring upload without a base image");
            return Ok(None);
        };

        let source_size = read_dimensions(&bytes)?;
        let strip = strip_background.unwrap_or_else(|| kind.strips_background_by_default());
        let rect = default_placement(kind, source_size, base_size, &self.config);
        let job = DecodeJob::spawn(bytes, strip)?;
        Ok(Some(self.push_element(kind, BitmapSlot::Decoding(job), rect)))
    }

    /// Adds an already decoded bitmap.
    pub fn add_bitmap(
        &mut self,
        kind: ElementKind,
        image: &RgbaImage,
        strip_background: Option<bool>,
    ) -> Result<Option<ElementId>> {
        let Some(base_size) = self.base_size() else {
            tracing::debug!(kind = kind.keyword(), "ignoring bitmap without a base image");
            return Ok(None);
        };
        if image.width() == 0 || image.height() == 0 {
            tracing::debug!(kind = kind.keyword(), "ignoring empty bitmap");
            return Ok(None);
        }

        let strip = strip_background.unwrap_or_else(|| kind.strips_background_by_default());
        let pixmap = if strip {
            pixmap_from_rgba(&remove_background(image))?
        } else {
            pixmap_from_rgba(image)?
        };
        let rect = default_placement(kind, image.dimensions(), base_size, &self.config);
        Ok(Some(self.push_element(kind, BitmapSlot::Ready(pixmap), rect)))
    }

    pub fn add_text_stamp(&mut self, request: &StampRequest) -> Result<Option<ElementId>> {
        let stamp = request.validate()?;
        if self.base.is_none() {
            tracing::debug!("ignoring text stamp without a base image");
            return Ok(None);
        }
        let image = render_stamp(&stamp, &self.text_face)?;
        self.add_bitmap(ElementKind::Text, &image, Some(false))
    }

    /// Applies finished decodes without blocking. Failed decodes drop their
    /// element. Returns how many elements became ready.
    pub fn pump_decodes(&mut self) -> usize {
        let mut completed = Vec::new();
        let mut failed = Vec::new();
        for element in &mut self.elements {
            match element.poll_bitmap() {
                DecodePoll::Unchanged => {}
                DecodePoll::Completed => completed.push(element.id()),
                DecodePoll::Failed(error) => failed.push((element.id(), error)),
            }
        }

        for (id, error) in failed {
            tracing::warn!(%id, "dropping element whose bitmap failed to decode: {error:#}");
            self.remove_element(id);
        }
        if !completed.is_empty() {
            self.render();
            for id in &completed {
                self.notify_updated(*id);
            }
        }
        completed.len()
    }

    /// Blocks until every pending decode has finished.
    pub fn wait_for_decodes(&mut self) -> usize {
        let mut completed = Vec::new();
        let mut failed = Vec::new();
        for element in &mut self.elements {
            match element.finish_bitmap() {
                Ok(true) => completed.push(element.id()),
                Ok(false) => {}
                Err(error) => failed.push((element.id(), error)),
            }
        }

        for (id, error) in failed {
            tracing::warn!(%id, "dropping element whose bitmap failed to decode: {error:#}");
            self.remove_element(id);
        }
        if !completed.is_empty() {
            self.render();
            for id in &completed {
                self.notify_updated(*id);
            }
        }
        completed.len()
    }

    pub fn pending_decodes(&self) -> usize {
        self.elements.iter().filter(|element| !element.is_ready()).count()
    }

    /// Returns whether an element was removed. Unknown ids are a no-op.
    pub fn remove_element(&mut self, id: ElementId) -> bool {
        let Some(index) = self.index_of(id) else {
            tracing::debug!(%id, "remove of unknown element ignored");
            return false;
        };
        self.elements.remove(index);
        if self.gesture.target() == Some(id) {
            self.gesture = Gesture::Idle;
        }
        self.render();
        self.notify(|host| host.element_removed(id));
        true
    }

    pub fn clear_elements(&mut self) {
        let removed = self.elements.drain(..).map(|element| element.id()).collect::<Vec<_>>();
        self.gesture = Gesture::Idle;
        if removed.is_empty() {
            return;
        }
        self.render();
        for id in removed {
            self.notify(|host| host.element_removed(id));
        }
    }

    /// Drops the base image and every element.
    pub fn reset(&mut self) {
        self.clear_elements();
        self.base = None;
        self.last_render = RenderStats::default();
    }

    /// Turns an element a quarter turn clockwise.
    pub fn rotate(&mut self, id: ElementId) -> Option<u16> {
        let index = self.index_of(id)?;
        let degrees = self.elements[index].rotate_quarter_turn();
        self.render();
        self.notify_updated(id);
        Some(degrees)
    }

    pub fn set_rotation(&mut self, id: ElementId, degrees: i32) -> bool {
        let Some(index) = self.index_of(id) else {
            return false;
        };
        self.elements[index].set_rotation(degrees);
        self.render();
        self.notify_updated(id);
        true
    }

    /// Moves and sizes an element directly in image space. The rectangle is
    /// shrunk and slid as needed so the element stays on the base image.
    pub fn set_geometry(&mut self, id: ElementId, rect: Rect) -> bool {
        let (Some(index), Some(scale), Some((base_width, base_height))) =
            (self.index_of(id), self.scale(), self.base_size())
        else {
            return false;
        };
        let rect = rect.fit_within(base_width as f32, base_height as f32);
        let element = &mut self.elements[index];
        element.set_position(rect.x, rect.y);
        element.set_size(rect.width, rect.height, scale);
        self.render();
        self.notify_updated(id);
        true
    }

    /// Topmost element part under a client point. Rotated elements are hit
    /// on their drawn footprint, with the controls turning along with them.
    pub fn hit_test(&self, client: Point) -> Option<(ElementId, ElementPart)> {
        let base = self.base.as_ref()?;
        let local = self.to_overlay(client);
        self.elements.iter().rev().find_map(|element| {
            let display = base.viewport.rect_to_display(element.rect());
            let unrotated =
                local.rotated_about(display.center(), -f32::from(element.rotation_degrees()));
            locate_part(display, unrotated, self.config.handle_size)
                .map(|part| (element.id(), part))
        })
    }

    pub fn handle_pointer(&mut self, event: &PointerEvent) -> PointerOutcome {
        match event.phase {
            PointerPhase::Down => match event.client_point() {
                Some(client) => self.pointer_down(client),
                None => PointerOutcome::Ignored,
            },
            PointerPhase::Move => match event.client_point() {
                Some(client) => self.pointer_move(client),
                None => PointerOutcome::Ignored,
            },
            PointerPhase::Up | PointerPhase::Cancel => {
                if self.gesture.is_idle() {
                    return PointerOutcome::Ignored;
                }
                tracing::debug!(gesture = self.gesture.name(), "gesture ended");
                self.gesture = Gesture::Idle;
                PointerOutcome::Ended
            }
        }
    }

    fn pointer_down(&mut self, client: Point) -> PointerOutcome {
        if !self.gesture.is_idle() {
            return PointerOutcome::Ignored;
        }
        let Some((id, part)) = self.hit_test(client) else {
            return PointerOutcome::Ignored;
        };
        let (Some(base), Some(element)) = (self.base.as_ref(), self.element(id)) else {
            return PointerOutcome::Ignored;
        };
        let local = self.to_overlay(client);
        let display = base.viewport.rect_to_display(element.rect());

        match part {
            ElementPart::Body => {
                self.gesture = Gesture::begin_drag(id, local, display);
                PointerOutcome::DragStarted(id)
            }
            ElementPart::ResizeHandle => {
                self.gesture = Gesture::begin_resize(id, local, element.display_size());
                PointerOutcome::ResizeStarted(id)
            }
            ElementPart::RotateButton => match self.rotate(id) {
                Some(degrees) => PointerOutcome::Rotated(id, degrees),
                None => PointerOutcome::Ignored,
            },
            ElementPart::RemoveButton => {
                self.remove_element(id);
                PointerOutcome::Removed(id)
            }
        }
    }

    fn pointer_move(&mut self, client: Point) -> PointerOutcome {
        let Some(id) = self.gesture.target() else {
            return PointerOutcome::Ignored;
        };
        let (Some(index), Some(base)) = (self.index_of(id), self.base.as_ref()) else {
            tracing::debug!(%id, "gesture target is gone; returning to idle");
            self.gesture = Gesture::Idle;
            return PointerOutcome::Ignored;
        };
        let local = self.to_overlay(client);
        let viewport = &base.viewport;
        let element = &mut self.elements[index];

        match self.gesture {
            Gesture::Idle => return PointerOutcome::Ignored,
            Gesture::Dragging { offset, .. } => {
                let target = drag_target(
                    local,
                    offset,
                    element.display_size(),
                    viewport.overlay_size(),
                );
                element.set_position(viewport.to_image(target.x), viewport.to_image(target.y));
            }
            Gesture::Resizing {
                start,
                start_width,
                start_height,
                aspect,
                ..
            } => {
                let display = viewport.rect_to_display(element.rect());
                let (overlay_width, overlay_height) = viewport.overlay_size();
                let bounds = ResizeBounds {
                    available_width: overlay_width - display.x,
                    available_height: overlay_height - display.y,
                    min_size: self.config.min_element_size,
                };
                let delta = Point::new(local.x - start.x, local.y - start.y);
                let (width, height) =
                    resize_target((start_width, start_height), aspect, delta, &bounds);
                element.set_size(
                    viewport.to_image(width),
                    viewport.to_image(height),
                    viewport.scale(),
                );
            }
        }

        self.render();
        self.notify_updated(id);
        PointerOutcome::Updated(id)
    }

    pub fn gesture(&self) -> &Gesture {
        &self.gesture
    }

    pub fn element(&self, id: ElementId) -> Option<&Element> {
        self.elements.iter().find(|element| element.id() == id)
    }

    /// In paint order.
    pub fn elements(&self) -> &[Element] {
        &self.elements
    }

    pub fn view(&self, id: ElementId) -> Option<ElementView> {
        let element = self.element(id)?;
        let base = self.base.as_ref()?;
        Some(view_of(element, &base.viewport))
    }

    pub fn views(&self) -> Vec<ElementView> {
        let Some(base) = self.base.as_ref() else {
            return Vec::new();
        };
        self.elements
            .iter()
            .map(|element| view_of(element, &base.viewport))
            .collect()
    }

    pub fn scale(&self) -> Option<f32> {
        self.base.as_ref().map(|base| base.viewport.scale())
    }

    pub fn overlay_size(&self) -> Option<(f32, f32)> {
        self.base.as_ref().map(|base| base.viewport.overlay_size())
    }

    pub fn base_size(&self) -> Option<(u32, u32)> {
        self.base.as_ref().map(|base| base.viewport.image_size())
    }

    pub fn last_render(&self) -> RenderStats {
        self.last_render
    }

    /// The flattened raster as of the last mutation.
    pub fn output(&self) -> Option<&Pixmap> {
        self.base.as_ref().map(|base| base.compositor.surface())
    }

    pub fn export_png(&self) -> Result<Vec<u8>> {
        let surface = self.output().ok_or_else(|| {
            anyhow!(CodedError::usage(
                NO_BASE_IMAGE,
                "load a base image before exporting",
            ))
        })?;
        encode_png(surface)
    }

    fn push_element(&mut self, kind: ElementKind, bitmap: BitmapSlot, rect: Rect) -> ElementId {
        let scale = self.scale().unwrap_or(1.0);
        let element = Element::new(kind, bitmap, rect, scale);
        let id = element.id();
        tracing::info!(
            %id,
            kind = kind.keyword(),
            x = rect.x,
            y = rect.y,
            width = rect.width,
            height = rect.height,
            ready = element.is_ready(),
            "element added"
        );
        self.elements.push(element);
        self.render();
        if let Some(view) = self.view(id) {
            self.notify(|host| host.element_added(&view));
        }
        id
    }

    fn render(&mut self) {
        let Some(base) = self.base.as_mut() else {
            return;
        };
        self.last_render = base.compositor.render(&base.pixmap, &self.elements);
    }

    fn index_of(&self, id: ElementId) -> Option<usize> {
        self.elements.iter().position(|element| element.id() == id)
    }

    fn to_overlay(&self, client: Point) -> Point {
        Point::new(
            client.x - self.overlay_origin.x,
            client.y - self.overlay_origin.y,
        )
    }

    fn notify_updated(&mut self, id: ElementId) {
        if let Some(view) = self.view(id) {
            self.notify(|host| host.element_updated(&view));
        }
    }

    fn notify(&mut self, event: impl FnOnce(&mut dyn OverlayHost)) {
        if let Some(host) = self.host.as_deref_mut() {
            event(host);
        }
    }
}

fn view_of(element: &Element, viewport: &Viewport) -> ElementView {
    ElementView {
        id: element.id(),
        kind: element.kind(),
        label: element.kind().label(),
        rect: element.rect(),
        display: viewport.rect_to_display(element.rect()),
        rotation_degrees: element.rotation_degrees(),
        ready: element.is_ready(),
    }
}
