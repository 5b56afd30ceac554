//! Record types stored in the two collections.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{MemoryError, Result};

/// Stable identifier assigned to a record when it enters a collection.
///
/// Ids are never reused within a collection's lifetime, so the vector index
/// can refer to records independently of list order.
pub type RecordId = u64;

// ─────────────────────────────────────────────────────────────────────────────
// Memory Record
// ─────────────────────────────────────────────────────────────────────────────

/// One interaction remembered by the agent.
///
/// The serialized JSON form is the unit of storage and of equality in the
/// row store. Field order matches rows written by earlier deployments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    /// What the user said.
    pub user_input: String,
    /// Free-form metrics; `takeaway` is expected.
    pub metrics: Map<String, Value>,
    /// What the agent answered.
    pub bot_response: String,
    /// Naive UTC ISO-8601 timestamp.
    pub timestamp: String,
}

impl MemoryRecord {
    /// Create a record stamped with the current UTC time.
    pub fn new(
        user_input: impl Into<String>,
        metrics: Map<String, Value>,
        bot_response: impl Into<String>,
    ) -> Self {
        Self {
            user_input: user_input.into(),
            metrics,
            bot_response: bot_response.into(),
            timestamp: now_timestamp(),
        }
    }

    /// The `takeaway` metric, if present. Non-string values are rendered as JSON.
    pub fn takeaway(&self) -> Option<String> {
        match self.metrics.get("takeaway")? {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Text that is embedded for this record.
    pub fn searchable_text(&self) -> String {
        format!(
            "User: {}\nAI: {}\nTakeaway: {}",
            self.user_input,
            self.bot_response,
            self.takeaway().as_deref().unwrap_or("N/A")
        )
    }

    /// Serialize to the stored JSON form.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse the stored JSON form.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

fn now_timestamp() -> String {
    chrono::Utc::now()
        .naive_utc()
        .format("%Y-%m-%dT%H:%M:%S%.6f")
        .to_string()
}

// ─────────────────────────────────────────────────────────────────────────────
// Rule Tags
// ─────────────────────────────────────────────────────────────────────────────

static RULE_TAG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^\[(CORE_RULE|RESPONSE_PRINCIPLE|BEHAVIORAL_ADJUSTMENT|GENERAL_LEARNING)\|([\d\.]+)\]",
    )
    .unwrap_or_else(|e| unreachable!("rule tag pattern is valid: {e}"))
});

/// Category carried in a rule tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RuleKind {
    CoreRule,
    ResponsePrinciple,
    BehavioralAdjustment,
    GeneralLearning,
}

impl RuleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleKind::CoreRule => "CORE_RULE",
            RuleKind::ResponsePrinciple => "RESPONSE_PRINCIPLE",
            RuleKind::BehavioralAdjustment => "BEHAVIORAL_ADJUSTMENT",
            RuleKind::GeneralLearning => "GENERAL_LEARNING",
        }
    }
}

impl fmt::Display for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RuleKind {
    type Err = MemoryError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "CORE_RULE" => Ok(RuleKind::CoreRule),
            "RESPONSE_PRINCIPLE" => Ok(RuleKind::ResponsePrinciple),
            "BEHAVIORAL_ADJUSTMENT" => Ok(RuleKind::BehavioralAdjustment),
            "GENERAL_LEARNING" => Ok(RuleKind::GeneralLearning),
            other => Err(MemoryError::MalformedInput(format!(
                "unknown rule kind '{other}'"
            ))),
        }
    }
}

/// The `[TYPE|SCORE]` prefix of a rule.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleTag {
    /// Rule category.
    pub kind: RuleKind,
    /// Score text exactly as written (digits and dots).
    pub score: String,
}

impl RuleTag {
    /// Parse the tag at the start of `text`. Returns `None` if absent.
    pub fn parse(text: &str) -> Option<Self> {
        let caps = RULE_TAG_RE.captures(text)?;
        let kind = caps.get(1)?.as_str().parse().ok()?;
        let score = caps.get(2)?.as_str().to_string();
        Some(Self { kind, score })
    }

    /// Score as a number, when it is one (`0.9.1` is a valid tag but not a number).
    pub fn confidence(&self) -> Option<f32> {
        self.score.parse().ok()
    }
}

/// Whether `text` begins with a valid rule tag.
pub fn has_rule_tag(text: &str) -> bool {
    RULE_TAG_RE.is_match(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn metrics(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_memory_serializes_in_stored_field_order() {
        let record = MemoryRecord {
            user_input: "hi".to_string(),
            metrics: metrics(json!({"takeaway": "greeting"})),
            bot_response: "hello!".to_string(),
            timestamp: "2024-01-01T00:00:00.000000".to_string(),
        };
        assert_eq!(
            record.to_json().unwrap(),
            r#"{"user_input":"hi","metrics":{"takeaway":"greeting"},"bot_response":"hello!","timestamp":"2024-01-01T00:00:00.000000"}"#
        );
    }

    #[test]
    fn test_searchable_text_uses_takeaway() {
        let record = MemoryRecord::new("hi", metrics(json!({"takeaway": "greeting"})), "hello!");
        assert_eq!(record.searchable_text(), "User: hi\nAI: hello!\nTakeaway: greeting");
    }

    #[test]
    fn test_searchable_text_without_takeaway() {
        let record = MemoryRecord::new("q", Map::new(), "a");
        assert_eq!(record.searchable_text(), "User: q\nAI: a\nTakeaway: N/A");

        let numeric = MemoryRecord::new("q", metrics(json!({"takeaway": 3})), "a");
        assert_eq!(numeric.takeaway().as_deref(), Some("3"));
    }

    #[test]
    fn test_timestamp_format() {
        let record = MemoryRecord::new("q", Map::new(), "a");
        assert!(chrono::NaiveDateTime::parse_from_str(&record.timestamp, "%Y-%m-%dT%H:%M:%S%.f").is_ok());
        assert!(!record.timestamp.ends_with('Z'));
    }

    #[test]
    fn test_from_json_rejects_incomplete_rows() {
        assert!(MemoryRecord::from_json(r#"{"user_input":"x"}"#).is_err());
    }

    #[test]
    fn test_rule_tag_parse() {
        let tag = RuleTag::parse("[core_rule|0.9] Always greet the user politely.").unwrap();
        assert_eq!(tag.kind, RuleKind::CoreRule);
        assert_eq!(tag.score, "0.9");
        assert_eq!(tag.confidence(), Some(0.9));

        let odd = RuleTag::parse("[GENERAL_LEARNING|1.0.2] x").unwrap();
        assert_eq!(odd.confidence(), None);
    }

    #[test]
    fn test_rule_tag_must_lead() {
        assert!(RuleTag::parse("Always greet [CORE_RULE|0.9]").is_none());
        assert!(RuleTag::parse("[OPINION|0.9] nope").is_none());
        assert!(RuleTag::parse("[CORE_RULE|high] nope").is_none());
        assert!(has_rule_tag("[Response_Principle|0.5] Be brief."));
    }
}
