//! Validation utilities for data entering the store.
//!
//! This module provides validation for:
//! - Embedding dimensions and values
//! - Rule text and its tag prefix
//! - Bulk-import memory lines

use serde_json::{Map, Value};

use crate::error::MemoryError;
use crate::types::has_rule_tag;

// ─────────────────────────────────────────────────────────────────────────────
// Validation Error
// ─────────────────────────────────────────────────────────────────────────────

/// Specific validation error types for store data.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ValidationError {
    /// Text is empty after trimming.
    #[error("text is empty")]
    EmptyText,

    /// Embedding dimension mismatch.
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Expected dimension.
        expected: usize,
        /// Actual dimension.
        actual: usize,
    },

    /// Embedding contains invalid values (NaN or Inf).
    #[error("embedding contains {count} invalid values (NaN or Inf)")]
    InvalidEmbeddingValues {
        /// Number of invalid values found.
        count: usize,
    },

    /// Rule text lacks the `[TYPE|SCORE]` prefix.
    #[error("rule lacks a valid [TYPE|SCORE] tag: {0}")]
    MissingRuleTag(String),

    /// A required key is absent from an imported object.
    #[error("missing required key '{0}'")]
    MissingKey(&'static str),

    /// A key has the wrong JSON type.
    #[error("key '{key}' must be {expected}")]
    WrongType {
        /// Offending key.
        key: &'static str,
        /// Expected JSON type.
        expected: &'static str,
    },
}

impl From<ValidationError> for MemoryError {
    fn from(err: ValidationError) -> Self {
        match err {
            ValidationError::DimensionMismatch { expected, actual } => {
                MemoryError::DimensionMismatch { expected, actual }
            }
            ValidationError::InvalidEmbeddingValues { .. } => {
                MemoryError::InvalidData(err.to_string())
            }
            other => MemoryError::MalformedInput(other.to_string()),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Embedding Validation
// ─────────────────────────────────────────────────────────────────────────────

/// Validate an embedding vector.
///
/// Checks:
/// 1. Dimension matches expected size
/// 2. No NaN or Inf values
pub fn validate_embedding(
    embedding: &[f32],
    expected_dim: usize,
) -> std::result::Result<(), ValidationError> {
    if embedding.len() != expected_dim {
        return Err(ValidationError::DimensionMismatch {
            expected: expected_dim,
            actual: embedding.len(),
        });
    }

    let invalid_count = embedding.iter().filter(|v| !v.is_finite()).count();
    if invalid_count > 0 {
        return Err(ValidationError::InvalidEmbeddingValues {
            count: invalid_count,
        });
    }

    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Rule Validation
// ─────────────────────────────────────────────────────────────────────────────

/// Trim rule text and require a leading rule tag.
///
/// Returns the trimmed text on success.
pub fn validate_tagged_rule(text: &str) -> std::result::Result<&str, ValidationError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::EmptyText);
    }
    if !has_rule_tag(trimmed) {
        let preview: String = trimmed.chars().take(60).collect();
        return Err(ValidationError::MissingRuleTag(preview));
    }
    Ok(trimmed)
}

// ─────────────────────────────────────────────────────────────────────────────
// Memory Import Validation
// ─────────────────────────────────────────────────────────────────────────────

/// Fields pulled out of one imported memory object.
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryFields {
    pub user_input: String,
    pub bot_response: String,
    pub metrics: Map<String, Value>,
}

/// Check that an imported object carries `user_input`, `bot_response`, and
/// `metrics`, with string/string/object types.
pub fn validate_memory_object(
    object: &Map<String, Value>,
) -> std::result::Result<MemoryFields, ValidationError> {
    let user_input = string_field(object, "user_input")?;
    let bot_response = string_field(object, "bot_response")?;
    let metrics = match object.get("metrics") {
        None => return Err(ValidationError::MissingKey("metrics")),
        Some(Value::Object(map)) => map.clone(),
        Some(_) => {
            return Err(ValidationError::WrongType {
                key: "metrics",
                expected: "an object",
            });
        }
    };

    Ok(MemoryFields {
        user_input,
        bot_response,
        metrics,
    })
}

fn string_field(
    object: &Map<String, Value>,
    key: &'static str,
) -> std::result::Result<String, ValidationError> {
    match object.get(key) {
        None => Err(ValidationError::MissingKey(key)),
        Some(Value::String(s)) => Ok(s.clone()),
        Some(_) => Err(ValidationError::WrongType {
            key,
            expected: "a string",
        }),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_validate_embedding_ok() {
        assert!(validate_embedding(&[0.1, 0.2, 0.3], 3).is_ok());
    }

    #[test]
    fn test_validate_embedding_dimension_mismatch() {
        let err = validate_embedding(&[0.1, 0.2], 3).unwrap_err();
        assert!(matches!(
            err,
            ValidationError::DimensionMismatch {
                expected: 3,
                actual: 2
            }
        ));
        let mapped: MemoryError = err.into();
        assert!(matches!(mapped, MemoryError::DimensionMismatch { .. }));
    }

    #[test]
    fn test_validate_embedding_nan_and_inf() {
        let err = validate_embedding(&[f32::NAN, 0.0, f32::INFINITY], 3).unwrap_err();
        assert!(matches!(
            err,
            ValidationError::InvalidEmbeddingValues { count: 2 }
        ));
    }

    #[test]
    fn test_validate_tagged_rule() {
        assert_eq!(
            validate_tagged_rule("  [CORE_RULE|0.9] Be kind.\n").unwrap(),
            "[CORE_RULE|0.9] Be kind."
        );
        assert!(matches!(
            validate_tagged_rule("   "),
            Err(ValidationError::EmptyText)
        ));
        assert!(matches!(
            validate_tagged_rule("Be kind."),
            Err(ValidationError::MissingRuleTag(_))
        ));
    }

    #[test]
    fn test_validate_memory_object() {
        let obj = json!({"user_input": "hi", "bot_response": "hello", "metrics": {"takeaway": "t"}});
        let fields = validate_memory_object(obj.as_object().unwrap()).unwrap();
        assert_eq!(fields.user_input, "hi");
        assert_eq!(fields.metrics.get("takeaway"), Some(&json!("t")));
    }

    #[test]
    fn test_validate_memory_object_missing_and_wrong_types() {
        let missing = json!({"user_input": "hi", "bot_response": "hello"});
        assert!(matches!(
            validate_memory_object(missing.as_object().unwrap()),
            Err(ValidationError::MissingKey("metrics"))
        ));

        let wrong = json!({"user_input": 1, "bot_response": "hello", "metrics": {}});
        assert!(matches!(
            validate_memory_object(wrong.as_object().unwrap()),
            Err(ValidationError::WrongType {
                key: "user_input",
                ..
            })
        ));
    }
}
