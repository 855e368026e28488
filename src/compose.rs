//! Builds a session from a validated scene and flattens it.

use std::fs;

use anyhow::{bail, Context, Result};
use serde::Serialize;

use crate::compositor::sha256_hex;
use crate::schema::{Scene, SceneElement};
use crate::session::{ElementView, Session};
use crate::text_stamp::TextFace;

#[derive(Debug, Clone, Serialize)]
pub struct ComposeReport {
    pub width: u32,
    pub height: u32,
    pub scale: f32,
    pub elements: Vec<ElementView>,
    /// Elements dropped because their bitmap failed to decode.
    pub dropped: usize,
    pub png_sha256: String,
}

pub struct Composition {
    pub session: Session,
    pub png: Vec<u8>,
    pub report: ComposeReport,
}

/// Paths in `scene` must already be resolved.
pub fn compose_scene(scene: &Scene) -> Result<Composition> {
    let mut session = Session::new(scene.engine.clone())?;
    if let Some(font) = &scene.font {
        session.set_text_face(TextFace::from_font_file(&font.path, font.sha256.as_deref())?);
    }
    session.set_viewport_width(scene.viewport_width);

    let base = fs::read(&scene.base)
        .with_context(|| format!("failed to read base image {}", scene.base.display()))?;
    session
        .load_base_bytes(&base)
        .with_context(|| format!("failed to load base image {}", scene.base.display()))?;

    for (index, element) in scene.elements.iter().enumerate() {
        let added = match element {
            SceneElement::Mark(image) | SceneElement::Signature(image) => {
                let bytes = fs::read(&image.source)
                    .with_context(|| format!("failed to read {}", image.source.display()))?;
                session
                    .add_upload(element.kind(), bytes, image.remove_background)
                    .with_context(|| format!("elements[{index}]: {}", image.source.display()))?
            }
            SceneElement::Text(text) => session
                .add_text_stamp(&text.stamp_request())
                .with_context(|| format!("elements[{index}]: text stamp"))?,
        };
        let Some(id) = added else {
            bail!("elements[{index}] produced no element (empty source?)");
        };

        let placement = element.placement();
        if !placement.is_default() {
            if let Some(view) = session.view(id) {
                session.set_geometry(id, placement.apply(view.rect));
            }
        }
        if let Some(degrees) = placement.rotation_degrees {
            session.set_rotation(id, degrees);
        }
    }

    let requested = scene.elements.len();
    session.wait_for_decodes();
    let dropped = requested.saturating_sub(session.elements().len());

    let png = session.export_png()?;
    let (width, height) = session.base_size().unwrap_or_default();
    let report = ComposeReport {
        width,
        height,
        scale: session.scale().unwrap_or(1.0),
        elements: session.views(),
        dropped,
        png_sha256: sha256_hex(&png),
    };
    tracing::info!(
        width,
        height,
        elements = report.elements.len(),
        dropped,
        "scene composed"
    );

    Ok(Composition {
        session,
        png,
        report,
    })
}
