//! Text stamps: a validated request rendered to a standalone transparent
//! bitmap, bold and centered, sized to the text plus fixed padding.

use std::path::Path;

use anyhow::{anyhow, Result};
use fontdue::layout::{CoordinateSystem, Layout, LayoutSettings, TextStyle};
use fontdue::Font;
use image::{Rgba, RgbaImage};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error_codes::{CodedError, EMPTY_STAMP_TEXT, INVALID_FONT_SIZE, INVALID_STAMP_COLOR};
use crate::font_assets::{ensure_supported_codepoints, load_font, unsupported_glyph};
use crate::pixel_font::{self, GlyphRows, GLYPH_COLUMNS, GLYPH_ROWS};

pub const DEFAULT_STAMP_TEXT: &str = "CANCELLED";
pub const DEFAULT_FONT_SIZE_PX: u32 = 60;
pub const DEFAULT_STAMP_COLOR: &str = "#000000";
pub const STAMP_PADDING_PX: u32 = 20;
pub const MIN_FONT_SIZE_PX: u32 = 8;
pub const MAX_FONT_SIZE_PX: u32 = 512;

// Pixel face proportions in units of font_size / 10: 5 columns plus one
// column of spacing per glyph, 7 rows of cap height.
const PIXEL_UNITS_PER_EM: f32 = 10.0;
const PIXEL_ADVANCE_COLUMNS: u32 = GLYPH_COLUMNS + 1;
const PIXEL_BOLD_UNITS: f32 = 0.4;
const OUTLINE_BOLD_DIVISOR: f32 = 24.0;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct StampRequest {
    pub text: String,
    pub font_size_px: u32,
    /// `#RGB` or `#RRGGBB`.
    pub color: String,
}

impl Default for StampRequest {
    fn default() -> Self {
        Self {
            text: DEFAULT_STAMP_TEXT.to_owned(),
            font_size_px: DEFAULT_FONT_SIZE_PX,
            color: DEFAULT_STAMP_COLOR.to_owned(),
        }
    }
}

impl StampRequest {
    pub fn validate(&self) -> Result<Stamp> {
        let text = self.text.trim();
        if text.is_empty() {
            return Err(anyhow!(CodedError::usage(
                EMPTY_STAMP_TEXT,
                "stamp text must contain at least one visible character",
            )));
        }

        if !(MIN_FONT_SIZE_PX..=MAX_FONT_SIZE_PX).contains(&self.font_size_px) {
            return Err(anyhow!(CodedError::usage(
                INVALID_FONT_SIZE,
                format!(
                    "font size {}px is outside {}..={}",
                    self.font_size_px, MIN_FONT_SIZE_PX, MAX_FONT_SIZE_PX
                ),
            )
            .with_details(json!({
                "provided": self.font_size_px,
                "min": MIN_FONT_SIZE_PX,
                "max": MAX_FONT_SIZE_PX,
            }))));
        }

        Ok(Stamp {
            text: text.to_owned(),
            font_size_px: self.font_size_px,
            color: parse_hex_color(&self.color)?,
        })
    }
}

/// A stamp request that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stamp {
    text: String,
    font_size_px: u32,
    color: [u8; 3],
}

impl Stamp {
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn font_size_px(&self) -> u32 {
        self.font_size_px
    }

    pub fn color(&self) -> [u8; 3] {
        self.color
    }
}

pub fn parse_hex_color(raw: &str) -> Result<[u8; 3]> {
    let invalid = || {
        anyhow!(CodedError::usage(
            INVALID_STAMP_COLOR,
            format!("invalid stamp color '{raw}'"),
        )
        .with_details(json!({
            "provided": raw,
            "expected": "#RGB or #RRGGBB",
        })))
    };

    let digits = raw.trim().strip_prefix('#').ok_or_else(invalid)?;
    if !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(invalid());
    }
    let channel = |hex: &str| u8::from_str_radix(hex, 16).map_err(|_| invalid());

    match digits.len() {
        3 => {
            let mut rgb = [0u8; 3];
            for (slot, idx) in rgb.iter_mut().zip(0..3) {
                let nibble = channel(&digits[idx..idx + 1])?;
                *slot = nibble * 17;
            }
            Ok(rgb)
        }
        6 => Ok([
            channel(&digits[0..2])?,
            channel(&digits[2..4])?,
            channel(&digits[4..6])?,
        ]),
        _ => Err(invalid()),
    }
}

pub enum TextFace {
    /// The built-in 5x7 face.
    Pixel,
    Outline(Box<Font>),
}

impl TextFace {
    pub fn from_font_file(path: &Path, expected_sha256: Option<&str>) -> Result<Self> {
        Ok(Self::Outline(Box::new(load_font(path, expected_sha256)?)))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Pixel => "pixel",
            Self::Outline(_) => "outline",
        }
    }
}

/// Glyph coverage of the text ink, before padding.
struct Coverage {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl Coverage {
    fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0; width as usize * height as usize],
        }
    }

    fn raise(&mut self, x: i64, y: i64, value: u8) {
        if x < 0 || y < 0 || x >= i64::from(self.width) || y >= i64::from(self.height) {
            return;
        }
        let idx = y as usize * self.width as usize + x as usize;
        self.data[idx] = self.data[idx].max(value);
    }

    /// Faux bold: smear coverage `extra` pixels to the right. The buffer must
    /// already have `extra` columns of room on the right edge.
    fn embolden(&mut self, extra: u32) {
        let width = self.width as usize;
        for row in self.data.chunks_mut(width) {
            for x in (0..width).rev() {
                let from = x.saturating_sub(extra as usize);
                let strongest = row[from..=x].iter().copied().max().unwrap_or(0);
                row[x] = strongest;
            }
        }
    }
}

pub fn render_stamp(stamp: &Stamp, face: &TextFace) -> Result<RgbaImage> {
    let coverage = match face {
        TextFace::Pixel => pixel_coverage(&stamp.text, stamp.font_size_px as f32)?,
        TextFace::Outline(font) => outline_coverage(font, &stamp.text, stamp.font_size_px as f32)?,
    };

    let [r, g, b] = stamp.color;
    let padding = STAMP_PADDING_PX;
    let mut image = RgbaImage::from_pixel(
        coverage.width + padding * 2,
        coverage.height + padding * 2,
        Rgba([r, g, b, 0]),
    );
    for (idx, &alpha) in coverage.data.iter().enumerate() {
        if alpha == 0 {
            continue;
        }
        let x = (idx % coverage.width as usize) as u32 + padding;
        let y = (idx / coverage.width as usize) as u32 + padding;
        image.put_pixel(x, y, Rgba([r, g, b, alpha]));
    }

    tracing::debug!(
        text = stamp.text.as_str(),
        font_size_px = stamp.font_size_px,
        face = face.name(),
        width = image.width(),
        height = image.height(),
        "text stamp rasterized"
    );
    Ok(image)
}

fn pixel_coverage(text: &str, font_size: f32) -> Result<Coverage> {
    let glyphs = text
        .chars()
        .map(|ch| pixel_font::glyph_rows(ch).ok_or_else(|| unsupported_glyph(ch)))
        .collect::<Result<Vec<GlyphRows>>>()?;

    let unit = font_size / PIXEL_UNITS_PER_EM;
    let bold = (unit * PIXEL_BOLD_UNITS).ceil() as u32;
    let columns = glyphs.len() as u32 * PIXEL_ADVANCE_COLUMNS - 1;
    let to_px = |cells: u32| (cells as f32 * unit).round() as i64;

    let mut coverage = Coverage::new(
        to_px(columns) as u32 + bold,
        to_px(GLYPH_ROWS) as u32,
    );
    for (index, rows) in glyphs.iter().enumerate() {
        let origin = index as u32 * PIXEL_ADVANCE_COLUMNS;
        for row in 0..GLYPH_ROWS {
            for column in 0..GLYPH_COLUMNS {
                if !pixel_font::sample(rows, column, row) {
                    continue;
                }
                for y in to_px(row)..to_px(row + 1) {
                    for x in to_px(origin + column)..to_px(origin + column + 1) {
                        coverage.raise(x, y, u8::MAX);
                    }
                }
            }
        }
    }
    coverage.embolden(bold);
    Ok(coverage)
}

fn outline_coverage(font: &Font, text: &str, font_size: f32) -> Result<Coverage> {
    ensure_supported_codepoints(font, text)?;

    let mut layout = Layout::new(CoordinateSystem::PositiveYDown);
    layout.reset(&LayoutSettings::default());
    layout.append(&[font], &TextStyle::new(text, font_size, 0));

    let inked = layout
        .glyphs()
        .iter()
        .filter(|glyph| glyph.width > 0 && glyph.height > 0)
        .collect::<Vec<_>>();
    let (mut min_x, mut min_y) = (f32::MAX, f32::MAX);
    let (mut max_x, mut max_y) = (f32::MIN, f32::MIN);
    for glyph in &inked {
        min_x = min_x.min(glyph.x.floor());
        min_y = min_y.min(glyph.y.floor());
        max_x = max_x.max((glyph.x + glyph.width as f32).ceil());
        max_y = max_y.max((glyph.y + glyph.height as f32).ceil());
    }
    if inked.is_empty() {
        return Err(anyhow!(CodedError::usage(
            EMPTY_STAMP_TEXT,
            format!("stamp text '{text}' produced no visible glyphs"),
        )));
    }

    let bold = (font_size / OUTLINE_BOLD_DIVISOR).round().max(1.0) as u32;
    let mut coverage = Coverage::new(
        (max_x - min_x) as u32 + bold,
        (max_y - min_y) as u32,
    );
    for glyph in inked {
        let (_, bitmap) = font.rasterize_config(glyph.key);
        let origin_x = (glyph.x.floor() - min_x) as i64;
        let origin_y = (glyph.y.floor() - min_y) as i64;
        for (idx, &value) in bitmap.iter().enumerate() {
            let x = origin_x + (idx % glyph.width) as i64;
            let y = origin_y + (idx / glyph.width) as i64;
            coverage.raise(x, y, value);
        }
    }
    coverage.embolden(bold);
    Ok(coverage)
}

#[cfg(test)]
mod tests {
    use super::{
        parse_hex_color, render_stamp, StampRequest, TextFace, DEFAULT_FONT_SIZE_PX,
        STAMP_PADDING_PX,
    };
    use crate::error_codes::{
        find_coded_error, EMPTY_STAMP_TEXT, INVALID_FONT_SIZE, INVALID_STAMP_COLOR,
        UNSUPPORTED_GLYPH,
    };

    fn code_of(error: anyhow::Error) -> &'static str {
        find_coded_error(&error).expect("expected a coded error").code
    }

    #[test]
    fn defaults_are_cancelled_sixty_black() {
        let stamp = StampRequest::default().validate().unwrap();
        assert_eq!(stamp.text(), "CANCELLED");
        assert_eq!(stamp.font_size_px(), DEFAULT_FONT_SIZE_PX);
        assert_eq!(stamp.color(), [0, 0, 0]);
    }

    #[test]
    fn hex_colors_accept_short_and_long_forms() {
        assert_eq!(parse_hex_color("#c00").unwrap(), [0xcc, 0, 0]);
        assert_eq!(parse_hex_color("#1A2b3C").unwrap(), [0x1a, 0x2b, 0x3c]);
        for bad in ["c00000", "#12345", "#gg0000", "", "#"] {
            assert_eq!(code_of(parse_hex_color(bad).unwrap_err()), INVALID_STAMP_COLOR);
        }
    }

    #[test]
    fn invalid_requests_are_rejected_with_codes() {
        let blank = StampRequest {
            text: "   ".to_owned(),
            ..StampRequest::default()
        };
        assert_eq!(code_of(blank.validate().unwrap_err()), EMPTY_STAMP_TEXT);

        let tiny = StampRequest {
            font_size_px: 2,
            ..StampRequest::default()
        };
        assert_eq!(code_of(tiny.validate().unwrap_err()), INVALID_FONT_SIZE);
    }

    #[test]
    fn pixel_stamp_has_ink_and_transparent_padding() {
        let stamp = StampRequest::default().validate().unwrap();
        let image = render_stamp(&stamp, &TextFace::Pixel).unwrap();

        let ink = image.pixels().filter(|pixel| pixel[3] > 0).count();
        assert!(ink > 0);
        for x in 0..image.width() {
            for y in 0..STAMP_PADDING_PX {
                assert_eq!(image.get_pixel(x, y)[3], 0);
                assert_eq!(image.get_pixel(x, image.height() - 1 - y)[3], 0);
            }
        }
        // 9 glyphs * 6 columns - 1 spacing column, 6px per column, 3px faux bold.
        assert_eq!(image.width(), 53 * 6 + 3 + 2 * STAMP_PADDING_PX);
        assert_eq!(image.height(), 7 * 6 + 2 * STAMP_PADDING_PX);
    }

    #[test]
    fn pixel_stamp_uses_requested_color() {
        let stamp = StampRequest {
            color: "#cc0000".to_owned(),
            ..StampRequest::default()
        }
        .validate()
        .unwrap();
        let image = render_stamp(&stamp, &TextFace::Pixel).unwrap();
        let inked = image.pixels().find(|pixel| pixel[3] == 255).unwrap();
        assert_eq!(inked.0, [0xcc, 0, 0, 255]);
    }

    #[test]
    fn pixel_face_rejects_unknown_characters() {
        let stamp = StampRequest {
            text: "PAID €5".to_owned(),
            ..StampRequest::default()
        }
        .validate()
        .unwrap();
        let error = render_stamp(&stamp, &TextFace::Pixel).unwrap_err();
        assert_eq!(code_of(error), UNSUPPORTED_GLYPH);
    }
}
