use std::fs;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use fontdue::{Font, FontSettings};
use serde_json::json;

use crate::compositor::sha256_hex;
use crate::error_codes::{CodedError, FONT_HASH_MISMATCH, UNSUPPORTED_GLYPH};

/// Reads a font file, checking it against a pinned SHA-256 when one is given.
pub fn read_font_bytes(path: &Path, expected_sha256: Option<&str>) -> Result<Vec<u8>> {
    let bytes =
        fs::read(path).with_context(|| format!("failed to read font file '{}'", path.display()))?;

    if let Some(expected) = expected_sha256 {
        let actual = sha256_hex(&bytes);
        if !actual.eq_ignore_ascii_case(expected.trim()) {
            return Err(anyhow!(CodedError::input(
                FONT_HASH_MISMATCH,
                format!(
                    "{} expected sha256={} actual sha256={}",
                    path.display(),
                    expected,
                    actual
                ),
            )
            .with_details(json!({
                "path": path.display().to_string(),
                "expected": expected,
                "actual": actual,
            }))));
        }
    }

    Ok(bytes)
}

pub fn load_font(path: &Path, expected_sha256: Option<&str>) -> Result<Font> {
    let bytes = read_font_bytes(path, expected_sha256)?;
    Font::from_bytes(bytes, FontSettings::default())
        .map_err(|error| anyhow!("failed to parse font '{}': {error}", path.display()))
}

pub fn ensure_supported_codepoints(font: &Font, text: &str) -> Result<()> {
    for ch in text.chars() {
        if ch == ' ' {
            continue;
        }
        if font.lookup_glyph_index(ch) == 0 {
            return Err(unsupported_glyph(ch));
        }
    }
    Ok(())
}

pub(crate) fn unsupported_glyph(ch: char) -> anyhow::Error {
    anyhow!(CodedError::usage(
        UNSUPPORTED_GLYPH,
        format!(
            "unsupported stamp character U+{:04X} ({})",
            ch as u32,
            ch.escape_default()
        ),
    )
    .with_details(json!({ "codepoint": ch as u32 })))
}
