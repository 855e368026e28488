//! Flattening of the base image and its elements into one raster.
//!
//! The output surface has the base image's pixel size. Each render clears it,
//! draws the base unscaled at the origin, then draws every ready element in
//! insertion order, rotated about its own center. The transform is built per
//! element, so rotations never compound.

use std::io::Cursor;

use anyhow::{anyhow, Context, Result};
use image::{ImageFormat, Rgba, RgbaImage};
use sha2::{Digest, Sha256};
use tiny_skia::{Color, ColorU8, FilterQuality, Pixmap, PixmapPaint, Transform};

use crate::element::Element;
use crate::viewport::Rect;

/// Converts straight-alpha RGBA into a premultiplied surface.
pub fn pixmap_from_rgba(image: &RgbaImage) -> Result<Pixmap> {
    let (width, height) = image.dimensions();
    let mut pixmap = Pixmap::new(width, height)
        .ok_or_else(|| anyhow!("cannot allocate {width}x{height} raster"))?;
    for (dst, src) in pixmap.pixels_mut().iter_mut().zip(image.pixels()) {
        let [r, g, b, a] = src.0;
        *dst = ColorU8::from_rgba(r, g, b, a).premultiply();
    }
    Ok(pixmap)
}

pub fn rgba_from_pixmap(pixmap: &Pixmap) -> RgbaImage {
    let mut image = RgbaImage::new(pixmap.width(), pixmap.height());
    for (dst, src) in image.pixels_mut().zip(pixmap.pixels()) {
        let color = src.demultiply();
        *dst = Rgba([color.red(), color.green(), color.blue(), color.alpha()]);
    }
    image
}

pub fn encode_png(pixmap: &Pixmap) -> Result<Vec<u8>> {
    let mut out = Cursor::new(Vec::new());
    rgba_from_pixmap(pixmap)
        .write_to(&mut out, ImageFormat::Png)
        .context("failed to encode png")?;
    Ok(out.into_inner())
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

/// Maps bitmap pixels into `rect`, rotated by `rotation_degrees` about the
/// rect center.
pub fn element_transform(
    rect: Rect,
    rotation_degrees: u16,
    bitmap_width: u32,
    bitmap_height: u32,
) -> Transform {
    let center_x = rect.x + rect.width / 2.0;
    let center_y = rect.y + rect.height / 2.0;
    Transform::from_rotate_at(f32::from(rotation_degrees), center_x, center_y)
        .pre_translate(rect.x, rect.y)
        .pre_scale(
            rect.width / bitmap_width.max(1) as f32,
            rect.height / bitmap_height.max(1) as f32,
        )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RenderStats {
    pub drawn: usize,
    /// Elements whose bitmap was still decoding.
    pub pending: usize,
}

pub struct Compositor {
    surface: Pixmap,
}

impl Compositor {
    pub fn new(width: u32, height: u32) -> Result<Self> {
        let surface = Pixmap::new(width, height)
            .ok_or_else(|| anyhow!("cannot allocate {width}x{height} output surface"))?;
        Ok(Self { surface })
    }

    pub fn surface(&self) -> &Pixmap {
        &self.surface
    }

    pub fn clear(&mut self) {
        self.surface.fill(Color::TRANSPARENT);
    }

    pub fn render<'a>(
        &mut self,
        base: &Pixmap,
        elements: impl IntoIterator<Item = &'a Element>,
    ) -> RenderStats {
        self.clear();
        self.surface.draw_pixmap(
            0,
            0,
            base.as_ref(),
            &PixmapPaint::default(),
            Transform::identity(),
            None,
        );

        let paint = PixmapPaint {
            quality: FilterQuality::Bilinear,
            ..PixmapPaint::default()
        };

        let mut stats = RenderStats::default();
        for element in elements {
            let Some(bitmap) = element.bitmap() else {
                stats.pending += 1;
                continue;
            };
            let rect = element.rect();
            if rect.width <= 0.0 || rect.height <= 0.0 {
                continue;
            }

            let transform = element_transform(
                rect,
                element.rotation_degrees(),
                bitmap.width(),
                bitmap.height(),
            );
            self.surface
                .draw_pixmap(0, 0, bitmap.as_ref(), &paint, transform, None);
            stats.drawn += 1;
        }
        stats
    }
}
