use anyhow::{bail, Result};
use serde::Deserialize;

/// Tunables for placement, display scaling and gestures.
///
/// Every field has a default, so scene files only name what they override.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct EngineConfig {
    /// Upper bound of the displayed base image width.
    pub max_display_width: f32,
    /// Horizontal space the host keeps free around the display.
    pub viewport_margin: f32,
    /// Smallest display width/height a resize gesture may produce.
    pub min_element_size: f32,
    /// Uploads are fitted into this fraction of the base width...
    pub upload_max_width_fraction: f32,
    /// ...and this fraction of the base height.
    pub upload_max_height_fraction: f32,
    /// Gap between a signature and the bottom edge, in image pixels.
    pub signature_bottom_margin: f32,
    /// Side of the square control regions (remove, rotate, resize) in an
    /// element's corners, in display pixels.
    pub handle_size: f32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_display_width: 800.0,
            viewport_margin: 80.0,
            min_element_size: 50.0,
            upload_max_width_fraction: 0.4,
            upload_max_height_fraction: 0.3,
            signature_bottom_margin: 50.0,
            handle_size: 20.0,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("max_display_width", self.max_display_width),
            ("min_element_size", self.min_element_size),
            ("upload_max_width_fraction", self.upload_max_width_fraction),
            ("upload_max_height_fraction", self.upload_max_height_fraction),
            ("handle_size", self.handle_size),
        ];
        for (name, value) in positive {
            if !value.is_finite() || value <= 0.0 {
                bail!("engine.{name} must be > 0, got {value}");
            }
        }

        let non_negative = [
            ("viewport_margin", self.viewport_margin),
            ("signature_bottom_margin", self.signature_bottom_margin),
        ];
        for (name, value) in non_negative {
            if !value.is_finite() || value < 0.0 {
                bail!("engine.{name} must be >= 0, got {value}");
            }
        }

        if self.upload_max_width_fraction > 1.0 || self.upload_max_height_fraction > 1.0 {
            bail!("engine upload fractions must be <= 1.0");
        }
        Ok(())
    }
}
