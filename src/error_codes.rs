use std::fmt;

use anyhow::Error;
use serde::Serialize;
use serde_json::Value;

pub const INVALID_STAMP_COLOR: &str = "INVALID_STAMP_COLOR";
pub const INVALID_FONT_SIZE: &str = "INVALID_FONT_SIZE";
pub const EMPTY_STAMP_TEXT: &str = "EMPTY_STAMP_TEXT";
pub const UNSUPPORTED_GLYPH: &str = "UNSUPPORTED_GLYPH";
pub const FONT_HASH_MISMATCH: &str = "FONT_HASH_MISMATCH";
pub const SCENE_INVALID: &str = "SCENE_INVALID";
pub const NO_BASE_IMAGE: &str = "NO_BASE_IMAGE";

/// Who has to change something for the call to succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CodedErrorKind {
    /// A flag, field value or call order was wrong.
    Usage,
    /// A file or bitmap handed over has bad content.
    Input,
}

#[derive(Debug, Clone)]
pub struct CodedError {
    pub code: &'static str,
    pub message: String,
    pub details: Option<Value>,
    pub kind: CodedErrorKind,
}

impl CodedError {
    fn new(kind: CodedErrorKind, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
            kind,
        }
    }

    pub fn usage(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(CodedErrorKind::Usage, code, message)
    }

    pub fn input(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(CodedErrorKind::Input, code, message)
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    /// `{"ok":false,"error":{...}}` as printed on stderr by the CLI.
    pub fn envelope(&self) -> ErrorEnvelope<'_> {
        ErrorEnvelope {
            ok: false,
            error: ErrorEnvelopeBody {
                code: self.code,
                kind: self.kind,
                message: &self.message,
                details: self.details.as_ref(),
            },
        }
    }
}

impl fmt::Display for CodedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for CodedError {}

#[derive(Debug, Serialize)]
pub struct ErrorEnvelope<'a> {
    pub ok: bool,
    pub error: ErrorEnvelopeBody<'a>,
}

#[derive(Debug, Serialize)]
pub struct ErrorEnvelopeBody<'a> {
    pub code: &'a str,
    pub kind: CodedErrorKind,
    pub message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<&'a Value>,
}

/// First coded error anywhere in the context chain.
pub fn find_coded_error(error: &Error) -> Option<&CodedError> {
    error
        .chain()
        .find_map(|cause| cause.downcast_ref::<CodedError>())
}

#[cfg(test)]
mod tests {
    use anyhow::{anyhow, Context};
    use serde_json::{json, Value};

    use super::{find_coded_error, CodedError, CodedErrorKind, INVALID_FONT_SIZE, SCENE_INVALID};

    #[test]
    fn coded_error_is_found_through_context_layers() {
        let error = Err::<(), _>(anyhow!(CodedError::usage(INVALID_FONT_SIZE, "too small")))
            .context("while building stamp")
            .unwrap_err();

        let coded = find_coded_error(&error).expect("coded error should be in chain");
        assert_eq!(coded.code, INVALID_FONT_SIZE);
        assert_eq!(coded.kind, CodedErrorKind::Usage);
    }

    #[test]
    fn envelope_omits_missing_details() {
        let plain_err = CodedError::usage(INVALID_FONT_SIZE, "too small");
        let plain = plain_err.envelope();
        let text = serde_json::to_string(&plain).unwrap();
        assert!(!text.contains("details"));

        let detailed_err = CodedError::usage(INVALID_FONT_SIZE, "too small")
            .with_details(json!({ "min": 8 }));
        let detailed = detailed_err.envelope();
        let text = serde_json::to_string(&detailed).unwrap();
        assert!(text.contains("\"min\":8"));
        assert!(text.contains("\"ok\":false"));
    }

    #[test]
    fn envelope_names_the_error_kind() {
        let usage = serde_json::to_value(CodedError::usage(INVALID_FONT_SIZE, "x").envelope())
            .unwrap();
        assert_eq!(usage["error"]["kind"], Value::from("usage"));

        let input = serde_json::to_value(CodedError::input(SCENE_INVALID, "x").envelope())
            .unwrap();
        assert_eq!(input["error"]["kind"], Value::from("input"));
        assert_eq!(input["error"]["code"], Value::from(SCENE_INVALID));
    }
}
