//! Result types inferred from evaluated samples.

use serde::Serialize;
use sheetlogic_primitives::{EvaluatedValue, ValueType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum InferredType {
    Number,
    Text,
    Boolean,
    Date,
    Error,
    Empty,
    /// Samples disagree on their tag.
    Mixed,
}

impl From<ValueType> for InferredType {
    fn from(value: ValueType) -> Self {
        match value {
            ValueType::Number => Self::Number,
            ValueType::Text => Self::Text,
            ValueType::Boolean => Self::Boolean,
            ValueType::Date => Self::Date,
            ValueType::Error => Self::Error,
            ValueType::Empty => Self::Empty,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeInference {
    pub inferred_type: InferredType,
    pub needs_review: bool,
    /// Distinct sample tags in first-seen order.
    pub observed: Vec<ValueType>,
}

/// Join the tags of every sample. No samples infers `Empty`.
pub fn infer<'a>(samples: impl IntoIterator<Item = &'a EvaluatedValue>) -> TypeInference {
    let mut observed: Vec<ValueType> = Vec::new();
    for sample in samples {
        let tag = sample.value_type();
        if !observed.contains(&tag) {
            observed.push(tag);
        }
    }
    let inferred_type = match observed.as_slice() {
        [] => InferredType::Empty,
        [single] => InferredType::from(*single),
        _ => InferredType::Mixed,
    };
    TypeInference {
        inferred_type,
        needs_review: inferred_type == InferredType::Mixed,
        observed,
    }
}
