use serde::de::value::Error as ValueError;
use serde::de::{DeserializeOwned, IntoDeserializer};

use crate::descriptor::ScalarKind;
use crate::envelope::{scalar_text, unwrap_text};
use crate::error::PrimitiveParseError;

#[derive(Debug, Clone, PartialEq)]
pub struct Coerced<T> {
    pub value: T,
    /// The value came from an unwrapped `{type, value}` envelope.
    pub unwrapped: bool,
}

/// Converts raw text into a scalar of `kind`, materialized as `T`.
///
/// Non-string kinds parse the trimmed text with the kind's grammar and, on
/// failure, retry once on the scalar found by unwrapping the text as an
/// envelope. String targets try the envelope first when the text opens with
/// `{`, since any text is otherwise a valid string.
pub fn coerce<T: DeserializeOwned>(
    raw: &str,
    kind: ScalarKind,
) -> Result<Coerced<T>, PrimitiveParseError> {
    if kind == ScalarKind::String {
        return coerce_string(raw);
    }

    match materialize::<T>(raw, kind) {
        Ok(value) => Ok(Coerced {
            value,
            unwrapped: false,
        }),
        Err(cause) => {
            let Some(text) = envelope_scalar(raw) else {
                return Err(PrimitiveParseError::new(kind, raw, cause));
            };
            materialize::<T>(&text, kind)
                .map(|value| Coerced {
                    value,
                    unwrapped: true,
                })
                .map_err(|cause| PrimitiveParseError::new(kind, raw, cause))
        }
    }
}

fn coerce_string<T: DeserializeOwned>(raw: &str) -> Result<Coerced<T>, PrimitiveParseError> {
    if raw.trim_start().starts_with('{') {
        if let Some(value) = envelope_scalar(raw).and_then(|text| from_string::<T>(text).ok()) {
            return Ok(Coerced {
                value,
                unwrapped: true,
            });
        }
    }

    from_string::<T>(raw.to_string())
        .map(|value| Coerced {
            value,
            unwrapped: false,
        })
        .map_err(|err| PrimitiveParseError::new(ScalarKind::String, raw, err.to_string()))
}

fn envelope_scalar(raw: &str) -> Option<String> {
    unwrap_text(raw).as_ref().and_then(scalar_text)
}

fn from_string<T: DeserializeOwned>(text: String) -> Result<T, ValueError> {
    T::deserialize(IntoDeserializer::<ValueError>::into_deserializer(text))
}

fn materialize<T: DeserializeOwned>(raw: &str, kind: ScalarKind) -> Result<T, String> {
    let text = raw.trim();
    let result: Result<T, ValueError> = match kind {
        ScalarKind::String => from_string(raw.to_string()),
        ScalarKind::Bool => {
            let value = parse_bool(text).ok_or_else(|| format!("invalid bool syntax {text:?}"))?;
            T::deserialize(value.into_deserializer())
        }
        ScalarKind::Int => {
            let value = text.parse::<i64>().map_err(|err| err.to_string())?;
            T::deserialize(value.into_deserializer())
        }
        ScalarKind::Uint => {
            let value = text.parse::<u64>().map_err(|err| err.to_string())?;
            T::deserialize(value.into_deserializer())
        }
        ScalarKind::Float => {
            let value = text.parse::<f64>().map_err(|err| err.to_string())?;
            T::deserialize(value.into_deserializer())
        }
    };
    result.map_err(|err| err.to_string())
}

/// Boolean literal grammar: `1 t T TRUE true True` and `0 f F FALSE false False`.
pub fn parse_bool(text: &str) -> Option<bool> {
    match text {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Some(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => Some(false),
        _ => None,
    }
}
