use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use crate::config::EngineConfig;
use crate::element::ElementKind;
use crate::text_stamp::{
    StampRequest, DEFAULT_FONT_SIZE_PX, DEFAULT_STAMP_COLOR, DEFAULT_STAMP_TEXT,
};
use crate::viewport::Rect;

pub const DEFAULT_VIEWPORT_WIDTH: f32 = 880.0;

/// A composition described in YAML: one base photo plus the elements placed
/// on it, in paint order.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Scene {
    pub base: PathBuf,
    #[serde(default = "default_viewport_width")]
    pub viewport_width: f32,
    #[serde(default)]
    pub font: Option<FontSpec>,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub elements: Vec<SceneElement>,
}

fn default_viewport_width() -> f32 {
    DEFAULT_VIEWPORT_WIDTH
}

impl Scene {
    pub fn validate(&self) -> Result<()> {
        if !self.viewport_width.is_finite() || self.viewport_width <= 0.0 {
            bail!("viewport_width must be > 0, got {}", self.viewport_width);
        }
        self.engine.validate()?;

        for (index, element) in self.elements.iter().enumerate() {
            element
                .validate()
                .with_context(|| format!("elements[{index}] ({})", element.kind().keyword()))?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FontSpec {
    pub path: PathBuf,
    #[serde(default)]
    pub sha256: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SceneElement {
    Mark(ImageElement),
    Signature(ImageElement),
    Text(TextElement),
}

impl SceneElement {
    pub fn kind(&self) -> ElementKind {
        match self {
            Self::Mark(_) => ElementKind::Mark,
            Self::Signature(_) => ElementKind::Signature,
            Self::Text(_) => ElementKind::Text,
        }
    }

    pub fn placement(&self) -> Placement {
        match self {
            Self::Mark(image) | Self::Signature(image) => Placement {
                position: image.position,
                size: image.size,
                rotation_degrees: image.rotation_degrees,
            },
            Self::Text(text) => Placement {
                position: text.position,
                size: text.size,
                rotation_degrees: text.rotation_degrees,
            },
        }
    }

    fn validate(&self) -> Result<()> {
        self.placement().validate()?;
        match self {
            Self::Mark(image) | Self::Signature(image) => {
                if image.source.as_os_str().is_empty() {
                    bail!("source cannot be empty");
                }
            }
            Self::Text(text) => {
                text.stamp_request().validate()?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ImageElement {
    pub source: PathBuf,
    /// Overrides the kind's default ink extraction.
    #[serde(default)]
    pub remove_background: Option<bool>,
    #[serde(default)]
    pub position: Option<Position>,
    #[serde(default)]
    pub size: Option<Size>,
    #[serde(default)]
    pub rotation_degrees: Option<i32>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TextElement {
    #[serde(default = "default_stamp_text")]
    pub text: String,
    #[serde(default = "default_font_size_px")]
    pub font_size_px: u32,
    #[serde(default = "default_stamp_color")]
    pub color: String,
    #[serde(default)]
    pub position: Option<Position>,
    #[serde(default)]
    pub size: Option<Size>,
    #[serde(default)]
    pub rotation_degrees: Option<i32>,
}

impl TextElement {
    pub fn stamp_request(&self) -> StampRequest {
        StampRequest {
            text: self.text.clone(),
            font_size_px: self.font_size_px,
            color: self.color.clone(),
        }
    }
}

fn default_stamp_text() -> String {
    DEFAULT_STAMP_TEXT.to_owned()
}

fn default_font_size_px() -> u32 {
    DEFAULT_FONT_SIZE_PX
}

fn default_stamp_color() -> String {
    DEFAULT_STAMP_COLOR.to_owned()
}

/// Optional image-space overrides of an element's default placement.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Placement {
    pub position: Option<Position>,
    pub size: Option<Size>,
    pub rotation_degrees: Option<i32>,
}

impl Placement {
    fn validate(&self) -> Result<()> {
        if let Some(position) = &self.position {
            if !position.x.is_finite() || !position.y.is_finite() {
                bail!("position must be finite");
            }
            if position.x < 0.0 || position.y < 0.0 {
                bail!("position must be >= 0, got ({}, {})", position.x, position.y);
            }
        }
        if let Some(size) = &self.size {
            if !(size.width.is_finite() && size.height.is_finite())
                || size.width <= 0.0
                || size.height <= 0.0
            {
                bail!(
                    "size must be positive, got {}x{}",
                    size.width,
                    size.height
                );
            }
        }
        Ok(())
    }

    pub fn is_default(&self) -> bool {
        self.position.is_none() && self.size.is_none()
    }

    /// `current` with the overridden fields replaced.
    pub fn apply(&self, current: Rect) -> Rect {
        let mut rect = current;
        if let Some(position) = &self.position {
            rect.x = position.x;
            rect.y = position.y;
        }
        if let Some(size) = &self.size {
            rect.width = size.width;
            rect.height = size.height;
        }
        rect
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Size {
    pub width: f32,
    pub height: f32,
}

#[cfg(test)]
mod tests {
    use super::{Scene, SceneElement};
    use crate::element::ElementKind;
    use crate::viewport::Rect;

    #[test]
    fn minimal_scene_uses_defaults() {
        let scene: Scene = serde_yaml::from_str("base: cheque.jpg\n").unwrap();
        assert_eq!(scene.viewport_width, 880.0);
        assert!(scene.elements.is_empty());
        assert!(scene.font.is_none());
        scene.validate().unwrap();
    }

    #[test]
    fn elements_are_tagged_by_kind() {
        let scene: Scene = serde_yaml::from_str(
            r##"
base: cheque.jpg
elements:
  - kind: signature
    source: sig.png
    position: { x: 10, y: 20 }
  - kind: text
    color: "#c00"
    rotation_degrees: 90
"##,
        )
        .unwrap();
        scene.validate().unwrap();

        assert_eq!(scene.elements[0].kind(), ElementKind::Signature);
        let SceneElement::Text(text) = &scene.elements[1] else {
            panic!("expected a text element");
        };
        assert_eq!(text.text, "CANCELLED");
        assert_eq!(text.font_size_px, 60);
        assert_eq!(text.rotation_degrees, Some(90));
    }

    #[test]
    fn unknown_top_level_fields_are_rejected() {
        let result = serde_yaml::from_str::<Scene>("base: a.png\nopacity: 0.5\n");
        assert!(result.is_err());
    }

    #[test]
    fn invalid_text_stamp_fails_validation() {
        let scene: Scene = serde_yaml::from_str(
            "base: a.png\nelements:\n  - kind: text\n    font_size_px: 4\n",
        )
        .unwrap();
        let error = format!("{:#}", scene.validate().unwrap_err());
        assert!(error.contains("elements[0]"), "{error}");
    }

    #[test]
    fn placement_overrides_only_given_fields() {
        let scene: Scene = serde_yaml::from_str(
            "base: a.png\n\
             elements:\n  - kind: mark\n    source: m.png\n    size: { width: 40, height: 20 }\n",
        )
        .unwrap();
        let rect = scene.elements[0]
            .placement()
            .apply(Rect::new(5.0, 6.0, 100.0, 50.0));
        assert_eq!(rect, Rect::new(5.0, 6.0, 40.0, 20.0));
    }
}
