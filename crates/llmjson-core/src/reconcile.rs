use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

use crate::descriptor::TargetDescriptor;
use crate::envelope::{contains_envelope, unwrap_envelopes};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciliation {
    /// An object-like target was given a non-empty array; its first element was used.
    FirstElement,
    /// A sequence target was given a single object; it was wrapped in an array.
    WrapSingleton,
}

impl Reconciliation {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::FirstElement => "first_element",
            Self::WrapSingleton => "wrap_singleton",
        }
    }
}

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("no shape reconciliation applies")]
    NotApplicable,
    #[error("reconciled value does not decode: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Resolves an array/object mismatch between valid JSON `text` and the target.
///
/// Object-like targets take the first element of a non-empty array; sequence
/// targets take a single object wrapped as a one-element array. Each attempt
/// is retried on the envelope-unwrapped element when that differs.
pub fn reconcile<T: DeserializeOwned>(
    descriptor: &TargetDescriptor,
    text: &str,
) -> Result<(T, Reconciliation), ReconcileError> {
    let tree: Value = serde_json::from_str(text)?;

    if descriptor.is_object_like() {
        let Value::Array(items) = tree else {
            return Err(ReconcileError::NotApplicable);
        };
        let first = items.into_iter().next().ok_or(ReconcileError::NotApplicable)?;
        return decode_tree::<T>(first).map(|value| (value, Reconciliation::FirstElement));
    }

    if descriptor.is_sequence() && tree.is_object() {
        let wrapped = format!("[{}]", text.trim());
        return match serde_json::from_str::<T>(&wrapped) {
            Ok(value) => Ok((value, Reconciliation::WrapSingleton)),
            Err(err) if contains_envelope(&tree) => {
                let single = Value::Array(vec![unwrap_envelopes(tree)]);
                T::deserialize(&single)
                    .map(|value| (value, Reconciliation::WrapSingleton))
                    .map_err(|_| ReconcileError::Decode(err))
            }
            Err(err) => Err(ReconcileError::Decode(err)),
        };
    }

    Err(ReconcileError::NotApplicable)
}

fn decode_tree<T: DeserializeOwned>(tree: Value) -> Result<T, ReconcileError> {
    match T::deserialize(&tree) {
        Ok(value) => Ok(value),
        Err(err) if contains_envelope(&tree) => {
            let unwrapped = unwrap_envelopes(tree);
            T::deserialize(&unwrapped).map_err(|_| ReconcileError::Decode(err))
        }
        Err(err) => Err(ReconcileError::Decode(err)),
    }
}
