use std::fmt;
use std::sync::{Arc, OnceLock};

use llmjson_core::{
    candidate_texts, coerce, contains_envelope, describe, reconcile, unwrap_envelopes, Dispatch,
    ReconcileError, Reconciliation, ScalarKind, TargetDescriptor,
};
use llmjson_repair::{build_repairer, LenientRepairer, RepairError, SyntaxRepairer};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::config::DecoderConfig;
use crate::error::{DecodeError, DecodeFailedError};

/// The strategy that produced a decoded value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Strategy {
    Primitive,
    PrimitiveEnvelope,
    Direct,
    Repaired,
    Unwrapped,
    FirstElement,
    WrapSingleton,
}

impl Strategy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Primitive => "primitive",
            Self::PrimitiveEnvelope => "primitive_envelope",
            Self::Direct => "direct",
            Self::Repaired => "repaired",
            Self::Unwrapped => "unwrapped",
            Self::FirstElement => "first_element",
            Self::WrapSingleton => "wrap_singleton",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Reconciliation> for Strategy {
    fn from(value: Reconciliation) -> Self {
        match value {
            Reconciliation::FirstElement => Self::FirstElement,
            Reconciliation::WrapSingleton => Self::WrapSingleton,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Decoded<T> {
    pub value: T,
    pub strategy: Strategy,
    /// Index of the extracted candidate that succeeded; `None` when the whole
    /// input decoded without extraction.
    pub candidate: Option<usize>,
}

impl<T> Decoded<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Decoded<U> {
        Decoded {
            value: f(self.value),
            strategy: self.strategy,
            candidate: self.candidate,
        }
    }
}

/// Cascading recovery decoder.
///
/// Immutable after construction and safe to share across threads; every call
/// allocates only call-local state.
#[derive(Clone)]
pub struct Decoder {
    config: DecoderConfig,
    repairer: Arc<dyn SyntaxRepairer>,
}

impl Decoder {
    pub fn new(config: DecoderConfig) -> Result<Self, RepairError> {
        let repairer = build_repairer(config.repairer.clone())?;
        Ok(Self { config, repairer })
    }

    pub fn with_repairer(config: DecoderConfig, repairer: Arc<dyn SyntaxRepairer>) -> Self {
        Self { config, repairer }
    }

    pub fn from_env() -> Result<Self, RepairError> {
        Self::new(DecoderConfig::from_env())
    }

    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }

    pub fn repairer(&self) -> &dyn SyntaxRepairer {
        self.repairer.as_ref()
    }

    pub fn decode<T: DeserializeOwned>(&self, content: &str) -> Result<T, DecodeError> {
        self.run(content, None).map(|decoded| decoded.value)
    }

    pub fn decode_detailed<T: DeserializeOwned>(
        &self,
        content: &str,
    ) -> Result<Decoded<T>, DecodeError> {
        self.run(content, None)
    }

    /// Like [`Decoder::decode_detailed`], but checks `cancel` before the
    /// cascade starts and before every candidate.
    pub fn decode_with_cancel<T: DeserializeOwned>(
        &self,
        content: &str,
        cancel: &CancellationToken,
    ) -> Result<Decoded<T>, DecodeError> {
        self.run(content, Some(cancel))
    }

    fn run<T: DeserializeOwned>(
        &self,
        content: &str,
        cancel: Option<&CancellationToken>,
    ) -> Result<Decoded<T>, DecodeError> {
        let mut run = Run::new(self, content, describe::<T>());
        let mut state = State::ClassifyTarget;

        loop {
            if state.is_checkpoint() && cancel.is_some_and(CancellationToken::is_cancelled) {
                debug!(state = state.name(), "decode cancelled");
                return Err(DecodeError::Cancelled);
            }
            state = match run.step::<T>(state) {
                Step::Next(next) => next,
                Step::Done(decoded) => return Ok(decoded),
                Step::Fail(err) => return Err(err),
            };
        }
    }
}

impl Default for Decoder {
    fn default() -> Self {
        Self {
            config: DecoderConfig::default(),
            repairer: Arc::new(LenientRepairer::default()),
        }
    }
}

impl fmt::Debug for Decoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Decoder")
            .field("config", &self.config)
            .field("repairer", &self.repairer.name())
            .finish()
    }
}

static DEFAULT_DECODER: OnceLock<Decoder> = OnceLock::new();

pub fn default_decoder() -> &'static Decoder {
    DEFAULT_DECODER.get_or_init(Decoder::default)
}

/// Decodes `content` into `T` with the default cascade.
pub fn decode<T: DeserializeOwned>(content: &str) -> Result<T, DecodeError> {
    default_decoder().decode(content)
}

#[derive(Debug)]
enum State {
    ClassifyTarget,
    PrimitivePath(ScalarKind),
    DirectDecode,
    ExtractCandidates,
    Repair(usize),
    DecodeRepaired(usize, String),
    UnwrapEnvelope(usize, String),
    Reconcile(usize, String),
}

impl State {
    fn name(&self) -> &'static str {
        match self {
            Self::ClassifyTarget => "classify_target",
            Self::PrimitivePath(_) => "primitive_path",
            Self::DirectDecode => "direct_decode",
            Self::ExtractCandidates => "extract_candidates",
            Self::Repair(_) => "repair",
            Self::DecodeRepaired(..) => "decode_repaired",
            Self::UnwrapEnvelope(..) => "unwrap_envelope",
            Self::Reconcile(..) => "reconcile",
        }
    }

    /// Cancellation is honored before the cascade and before each candidate.
    fn is_checkpoint(&self) -> bool {
        matches!(self, Self::ClassifyTarget | Self::Repair(_))
    }
}

enum Step<T> {
    Next(State),
    Done(Decoded<T>),
    Fail(DecodeError),
}

struct Run<'a> {
    decoder: &'a Decoder,
    content: &'a str,
    descriptor: TargetDescriptor,
    candidates: Vec<&'a str>,
    last_decode_error: Option<serde_json::Error>,
    last_repair_error: Option<RepairError>,
    candidates_tried: usize,
}

impl<'a> Run<'a> {
    fn new(decoder: &'a Decoder, content: &'a str, descriptor: TargetDescriptor) -> Self {
        Self {
            decoder,
            content,
            descriptor,
            candidates: Vec::new(),
            last_decode_error: None,
            last_repair_error: None,
            candidates_tried: 0,
        }
    }

    fn step<T: DeserializeOwned>(&mut self, state: State) -> Step<T> {
        match state {
            State::ClassifyTarget => match self.descriptor.classify() {
                Dispatch::Scalar(kind) => Step::Next(State::PrimitivePath(kind)),
                Dispatch::Composite => Step::Next(State::DirectDecode),
            },

            State::PrimitivePath(kind) => match coerce::<T>(self.content, kind) {
                Ok(coerced) => {
                    let strategy = if coerced.unwrapped {
                        Strategy::PrimitiveEnvelope
                    } else {
                        Strategy::Primitive
                    };
                    debug!(%kind, strategy = strategy.as_str(), "primitive decode succeeded");
                    Step::Done(Decoded {
                        value: coerced.value,
                        strategy,
                        candidate: None,
                    })
                }
                Err(err) => {
                    debug!(%kind, error = %err, "primitive decode failed");
                    Step::Fail(err.into())
                }
            },

            State::DirectDecode => match serde_json::from_str::<T>(self.content) {
                Ok(value) => self.done(value, Strategy::Direct, None),
                Err(err) => {
                    debug!(target_shape = %self.descriptor, error = %err, "direct decode failed");
                    self.last_decode_error = Some(err);
                    Step::Next(State::ExtractCandidates)
                }
            },

            State::ExtractCandidates => {
                let mut candidates = candidate_texts(self.content);
                candidates.truncate(self.decoder.config.max_candidates.max(1));
                trace!(count = candidates.len(), "extracted candidates");
                self.candidates = candidates;
                Step::Next(State::Repair(0))
            }

            State::Repair(index) => {
                let Some(text) = self.candidates.get(index).copied() else {
                    return Step::Fail(self.failure());
                };
                self.candidates_tried += 1;
                trace!(candidate = index, len = text.len(), "repairing candidate");
                match self.decoder.repairer.repair(text) {
                    Ok(repaired) => Step::Next(State::DecodeRepaired(index, repaired)),
                    Err(err) => {
                        debug!(
                            candidate = index,
                            repairer = self.decoder.repairer.name(),
                            error = %err,
                            "repair failed"
                        );
                        self.last_repair_error = Some(err);
                        Step::Next(State::Repair(index + 1))
                    }
                }
            }

            State::DecodeRepaired(index, repaired) => match serde_json::from_str::<T>(&repaired) {
                Ok(value) => self.done(value, Strategy::Repaired, Some(index)),
                Err(err) => {
                    debug!(candidate = index, error = %err, "repaired decode failed");
                    self.last_decode_error = Some(err);
                    Step::Next(State::UnwrapEnvelope(index, repaired))
                }
            },

            State::UnwrapEnvelope(index, repaired) => {
                if !self.decoder.config.envelope_unwrap {
                    return Step::Next(State::Reconcile(index, repaired));
                }
                let tree = match serde_json::from_str::<Value>(&repaired) {
                    Ok(tree) if contains_envelope(&tree) => tree,
                    // unwrapping would not change the tree
                    Ok(_) => return Step::Next(State::Reconcile(index, repaired)),
                    Err(err) => {
                        self.last_decode_error = Some(err);
                        return Step::Next(State::Reconcile(index, repaired));
                    }
                };
                match serde_json::from_value::<T>(unwrap_envelopes(tree)) {
                    Ok(value) => self.done(value, Strategy::Unwrapped, Some(index)),
                    Err(err) => {
                        debug!(candidate = index, error = %err, "unwrapped decode failed");
                        self.last_decode_error = Some(err);
                        Step::Next(State::Reconcile(index, repaired))
                    }
                }
            }

            State::Reconcile(index, repaired) => {
                if !self.decoder.config.reconcile {
                    return Step::Next(State::Repair(index + 1));
                }
                match reconcile::<T>(&self.descriptor, &repaired) {
                    Ok((value, how)) => self.done(value, how.into(), Some(index)),
                    Err(ReconcileError::NotApplicable) => Step::Next(State::Repair(index + 1)),
                    Err(ReconcileError::Decode(err)) => {
                        debug!(candidate = index, error = %err, "reconciled decode failed");
                        self.last_decode_error = Some(err);
                        Step::Next(State::Repair(index + 1))
                    }
                }
            }
        }
    }

    fn done<T>(&self, value: T, strategy: Strategy, candidate: Option<usize>) -> Step<T> {
        debug!(strategy = strategy.as_str(), candidate, "decode succeeded");
        Step::Done(Decoded {
            value,
            strategy,
            candidate,
        })
    }

    fn failure(&mut self) -> DecodeError {
        debug!(
            candidates_tried = self.candidates_tried,
            target_shape = %self.descriptor,
            "all decode strategies exhausted"
        );
        DecodeError::Failed(DecodeFailedError {
            content: self.content.to_string(),
            last_decode_error: self.last_decode_error.take(),
            last_repair_error: self.last_repair_error.take(),
            candidates_tried: self.candidates_tried,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use serde::Deserialize;
    use serde_json::json;

    use super::*;
    use llmjson_repair::RepairerConfig;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Person {
        name: String,
        age: u32,
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct Item {
        value: i64,
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct TypedValue {
        #[serde(rename = "type")]
        kind: String,
        value: String,
    }

    fn john() -> Person {
        Person {
            name: "John".to_string(),
            age: 30,
        }
    }

    fn detailed<T: DeserializeOwned>(content: &str) -> Decoded<T> {
        Decoder::default()
            .decode_detailed::<T>(content)
            .unwrap_or_else(|e| panic!("decode {content:?}: {e}"))
    }

    fn failed(err: DecodeError) -> DecodeFailedError {
        match err {
            DecodeError::Failed(failed) => failed,
            other => panic!("expected aggregate failure, got {other:?}"),
        }
    }

    /// Rejects any candidate containing `bad`, accepts the rest verbatim.
    struct RejectBad;

    impl SyntaxRepairer for RejectBad {
        fn name(&self) -> &'static str {
            "reject-bad"
        }

        fn repair(&self, text: &str) -> Result<String, RepairError> {
            if text.contains("bad") {
                return Err(RepairError::Unexpected {
                    found: 'b',
                    offset: 0,
                });
            }
            Ok(text.to_string())
        }
    }

    #[test]
    fn primitive_targets_take_the_primitive_path() {
        let out = detailed::<i64>("42");
        assert_eq!(out.value, 42);
        assert_eq!(out.strategy, Strategy::Primitive);
        assert_eq!(out.candidate, None);

        assert!(decode::<bool>("true").expect("bool"));

        let err = decode::<i64>("42.5").expect_err("float text for int");
        assert!(matches!(err, DecodeError::Primitive(ref e) if e.kind == ScalarKind::Int));
    }

    #[test]
    fn primitive_envelope_is_reported() {
        let out = detailed::<String>(r#"{"type":"string","value":"John"}"#);
        assert_eq!(out.value, "John");
        assert_eq!(out.strategy, Strategy::PrimitiveEnvelope);
    }

    #[test]
    fn valid_json_decodes_directly() {
        let out = detailed::<Person>(r#"{"name":"John","age":30}"#);
        assert_eq!(out.value, john());
        assert_eq!(out.strategy, Strategy::Direct);
        assert_eq!(out.candidate, None);
    }

    #[test]
    fn narrative_text_yields_a_repaired_candidate() {
        let out = detailed::<Person>(
            "Here is the result:\n{\"name\":\"John\",\"age\":30}\nHope this helps!",
        );
        assert_eq!(out.value, john());
        assert_eq!(out.strategy, Strategy::Repaired);
        assert_eq!(out.candidate, Some(0));
    }

    #[test]
    fn repairs_near_json() {
        assert_eq!(
            decode::<Person>("{name: 'John', age: 30,}").expect("repair"),
            john()
        );
    }

    #[test]
    fn envelopes_collapse_after_repair() {
        let out = detailed::<Person>(
            r#"{"name":{"type":"string","value":"John"},"age":{"type":"integer","value":30}}"#,
        );
        assert_eq!(out.value, john());
        assert_eq!(out.strategy, Strategy::Unwrapped);
    }

    #[test]
    fn arrays_and_singletons_are_reconciled() {
        let first = detailed::<Person>(r#"[{"name":"John","age":30}]"#);
        assert_eq!(first.value, john());
        assert_eq!(first.strategy, Strategy::FirstElement);

        let wrapped = detailed::<Vec<Item>>(r#"{"value":1}"#);
        assert_eq!(wrapped.value, vec![Item { value: 1 }]);
        assert_eq!(wrapped.strategy, Strategy::WrapSingleton);

        let optional = detailed::<Option<Person>>(r#"[{"name":"John","age":30}]"#);
        assert_eq!(optional.value, Some(john()));
    }

    #[test]
    fn total_failure_is_aggregated() {
        let err = decode::<Person>("this is not json at all").expect_err("not json");
        let failure = failed(err);
        assert_eq!(failure.content, "this is not json at all");
        assert_eq!(failure.candidates_tried, 1);
        assert!(failure.last_decode_error.is_some());
        assert!(matches!(
            failure.last_repair_error,
            Some(RepairError::Unexpected { found: 't', .. })
        ));
    }

    #[test]
    fn truncated_document_is_tried_after_its_inner_spans() {
        #[derive(Debug, PartialEq, Deserialize)]
        struct City {
            city: String,
        }

        #[derive(Debug, PartialEq, Deserialize)]
        struct Customer {
            name: String,
            address: City,
            age: Option<u32>,
        }

        let out = detailed::<Customer>(r#"{"name":"John","address":{"city":"Oslo"},"age":3"#);
        assert_eq!(out.value.name, "John");
        assert_eq!(out.value.address.city, "Oslo");
        assert_eq!(out.value.age, Some(3));
        assert_eq!(out.strategy, Strategy::Repaired);
        assert_eq!(out.candidate, Some(1));
    }

    #[test]
    fn repair_failure_moves_to_the_next_candidate() {
        let decoder = Decoder::with_repairer(DecoderConfig::default(), Arc::new(RejectBad));
        let content = r#"first {"bad":true} then {"name":"John","age":30}"#;

        let out = decoder
            .decode_detailed::<Person>(content)
            .expect("second candidate");
        assert_eq!(out.value, john());
        assert_eq!(out.candidate, Some(1));

        let limited = Decoder::with_repairer(
            DecoderConfig::default().with_max_candidates(1),
            Arc::new(RejectBad),
        );
        let failure = failed(limited.decode::<Person>(content).expect_err("one candidate"));
        assert_eq!(failure.candidates_tried, 1);
        assert!(failure.last_repair_error.is_some());
    }

    #[test]
    fn strategies_can_be_switched_off() {
        let no_unwrap = Decoder::new(DecoderConfig::default().with_envelope_unwrap(false))
            .expect("decoder");
        assert!(no_unwrap
            .decode::<Person>(r#"{"name":{"type":"string","value":"John"},"age":30}"#)
            .is_err());

        let no_reconcile =
            Decoder::new(DecoderConfig::default().with_reconcile(false)).expect("decoder");
        assert!(no_reconcile
            .decode::<Person>(r#"[{"name":"John","age":30}]"#)
            .is_err());
    }

    #[test]
    fn strict_repair_only_accepts_valid_json() {
        let strict =
            Decoder::new(DecoderConfig::default().with_repairer(RepairerConfig::Strict))
                .expect("decoder");
        assert!(strict.decode::<Person>("{name: 'John', age: 30,}").is_err());
        assert_eq!(
            strict
                .decode::<Person>("Sure: {\"name\":\"John\",\"age\":30}")
                .expect("valid candidate"),
            john()
        );
    }

    #[test]
    fn cancelled_token_stops_the_cascade() {
        let token = CancellationToken::new();
        token.cancel();
        let err = Decoder::default()
            .decode_with_cancel::<Person>(r#"{"name":"John","age":30}"#, &token)
            .expect_err("cancelled");
        assert!(matches!(err, DecodeError::Cancelled));

        let live = CancellationToken::new();
        let out = Decoder::default()
            .decode_with_cancel::<Person>(r#"{"name":"John","age":30}"#, &live)
            .expect("not cancelled");
        assert_eq!(out.value, john());
    }

    #[test]
    fn type_value_structs_decode_as_themselves() {
        let out = detailed::<TypedValue>(r#"{"type":"a","value":"b"}"#);
        assert_eq!(
            out.value,
            TypedValue {
                kind: "a".to_string(),
                value: "b".to_string(),
            }
        );
        assert_eq!(out.strategy, Strategy::Direct);
    }

    #[test]
    fn dynamic_targets_keep_envelopes() {
        let text = r#"{"type":"string","value":"John"}"#;
        let value = decode::<Value>(text).expect("dynamic");
        assert_eq!(value, json!({"type": "string", "value": "John"}));

        let map = decode::<HashMap<String, Value>>("{a: 1}").expect("map");
        assert_eq!(map.get("a"), Some(&json!(1)));
    }

    #[test]
    fn truncated_tail_after_prose_is_attempted() {
        #[derive(Debug, Deserialize, PartialEq)]
        struct Partial {
            name: String,
            #[serde(default)]
            age: Option<u32>,
        }

        let out = detailed::<Partial>(r#"Result: {"name":"Jo"#);
        assert_eq!(
            out.value,
            Partial {
                name: "Jo".to_string(),
                age: None,
            }
        );
        assert_eq!(out.candidate, Some(1));
    }
}
