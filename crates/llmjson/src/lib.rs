pub mod config;
pub mod decoder;
pub mod error;

pub use config::*;
pub use decoder::*;
pub use error::*;

pub use llmjson_core::{
    candidate_texts, describe, extract_candidates, is_envelope, unwrap_envelopes, Candidate,
    Dispatch, PrimitiveParseError, ScalarKind, TargetDescriptor,
};
pub use llmjson_repair::{
    build_repairer, LenientConfig, LenientRepairer, RepairError, RepairerConfig, StrictRepairer,
    SyntaxRepairer,
};
pub use tokio_util::sync::CancellationToken;
