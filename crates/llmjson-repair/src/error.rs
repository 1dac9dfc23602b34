use thiserror::Error;

#[derive(Debug, Error)]
pub enum RepairError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("nothing to repair: input is empty")]
    Empty,

    #[error("unexpected {found:?} at offset {offset}")]
    Unexpected { found: char, offset: usize },

    #[error("unexpected trailing content at offset {offset}")]
    TrailingContent { offset: usize },

    #[error("nesting deeper than {limit} levels")]
    DepthExceeded { limit: usize },

    #[error("invalid json: {0}")]
    Invalid(serde_json::Error),

    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}
