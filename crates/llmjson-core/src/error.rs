use thiserror::Error;

use crate::descriptor::ScalarKind;

const PREVIEW_CHARS: usize = 80;

/// Scalar text did not match the target kind's grammar, even after an
/// envelope unwrap attempt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot parse {} as {kind}: {cause}", preview(.raw))]
pub struct PrimitiveParseError {
    pub kind: ScalarKind,
    pub raw: String,
    pub cause: String,
}

impl PrimitiveParseError {
    pub fn new(kind: ScalarKind, raw: impl Into<String>, cause: impl Into<String>) -> Self {
        Self {
            kind,
            raw: raw.into(),
            cause: cause.into(),
        }
    }
}

/// Debug-quoted prefix of `text`, used to keep error messages bounded.
pub fn preview(text: &str) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(PREVIEW_CHARS).collect();
    if chars.next().is_some() {
        format!("{head:?}...")
    } else {
        format!("{head:?}")
    }
}
