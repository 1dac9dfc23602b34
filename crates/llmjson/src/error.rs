use llmjson_core::{preview, PrimitiveParseError};
use llmjson_repair::RepairError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error(transparent)]
    Primitive(#[from] PrimitiveParseError),

    #[error(transparent)]
    Failed(#[from] DecodeFailedError),

    #[error("decode cancelled")]
    Cancelled,
}

impl DecodeError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Primitive(_) => "primitive_parse",
            Self::Failed(_) => "decode_failed",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Every candidate and strategy was exhausted for a composite target.
#[derive(Debug, Error)]
#[error("{}", self.summary())]
pub struct DecodeFailedError {
    pub content: String,
    pub last_decode_error: Option<serde_json::Error>,
    pub last_repair_error: Option<RepairError>,
    pub candidates_tried: usize,
}

impl DecodeFailedError {
    fn summary(&self) -> String {
        let mut parts = vec![format!(
            "cannot decode {} after {} candidate(s)",
            preview(&self.content),
            self.candidates_tried
        )];
        if let Some(err) = &self.last_decode_error {
            parts.push(format!("last decode error: {err}"));
        }
        if let Some(err) = &self.last_repair_error {
            parts.push(format!("last repair error: {err}"));
        }
        parts.join("; ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_message_carries_both_causes() {
        let decode = serde_json::from_str::<u8>("x").expect_err("not a number");
        let err = DecodeFailedError {
            content: "x".to_string(),
            last_decode_error: Some(decode),
            last_repair_error: Some(RepairError::Empty),
            candidates_tried: 1,
        };
        let msg = err.to_string();
        assert!(msg.starts_with("cannot decode \"x\" after 1 candidate(s); last decode error: "));
        assert!(msg.ends_with("; last repair error: nothing to repair: input is empty"));
    }

    #[test]
    fn primitive_errors_pass_through() {
        let err = DecodeError::from(PrimitiveParseError::new(
            llmjson_core::ScalarKind::Int,
            "4x",
            "invalid digit",
        ));
        assert_eq!(err.kind(), "primitive_parse");
        assert_eq!(err.to_string(), "cannot parse \"4x\" as int: invalid digit");
    }
}
