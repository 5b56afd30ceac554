//! Rule operations proposed by a reflection step.
//!
//! A model asked to curate the rule set answers with a block like:
//!
//! ```text
//! <operations_list>
//!   <operation>
//!     <action>update</action>
//!     <insight>[CORE_RULE|0.9] Greet users by name.</insight>
//!     <old_insight_to_replace>[CORE_RULE|0.8] Greet users.</old_insight_to_replace>
//!   </operation>
//! </operations_list>
//! ```
//!
//! The text around the block is ignored. Producing it is up to the caller.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use tracing::{info, warn};

use crate::types::has_rule_tag;

fn pattern(re: &str) -> Regex {
    Regex::new(re).unwrap_or_else(|e| unreachable!("operation pattern is valid: {e}"))
}

static OPERATIONS_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| pattern(r"(?is)<operations_list>(.*)</operations_list>"));
static OPERATION: LazyLock<Regex> =
    LazyLock::new(|| pattern(r"(?is)<operation>(.*?)</operation>"));
static ACTION: LazyLock<Regex> = LazyLock::new(|| pattern(r"(?is)<action>(.*?)</action>"));
static INSIGHT: LazyLock<Regex> = LazyLock::new(|| pattern(r"(?is)<insight>(.*?)</insight>"));
static OLD_INSIGHT: LazyLock<Regex> = LazyLock::new(|| {
    pattern(r"(?is)<old_insight_to_replace>(.*?)</old_insight_to_replace>")
});

/// What to do with an insight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleAction {
    /// Add the insight as a new rule.
    Add,
    /// Replace `old_insight_to_replace` with the insight.
    Update,
}

impl fmt::Display for RuleAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleAction::Add => f.write_str("add"),
            RuleAction::Update => f.write_str("update"),
        }
    }
}

/// One parsed operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuleOperation {
    pub action: RuleAction,
    /// New rule text, tag included.
    pub insight: String,
    /// Rule to remove first (`update` only).
    pub old_insight_to_replace: Option<String>,
}

/// Counts from applying a list of operations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ApplyReport {
    /// New rules added by `add` operations.
    pub added: usize,
    /// `update` operations whose new rule was stored.
    pub updated: usize,
    /// Rules removed as the old side of an update.
    pub removed: usize,
    /// Operations whose insight already existed.
    pub duplicates: usize,
    /// Operations that stored nothing.
    pub skipped: usize,
}

/// Extract operations from free-form model output.
///
/// Operations with an unknown action, or whose insight lacks a valid
/// `[TYPE|SCORE]` tag, are skipped with a warning.
pub fn parse_rule_operations(text: &str) -> Vec<RuleOperation> {
    let Some(block) = OPERATIONS_BLOCK.captures(text).and_then(|c| c.get(1)) else {
        warn!("No <operations_list> block found in model output");
        return Vec::new();
    };

    let mut operations = Vec::new();
    for caps in OPERATION.captures_iter(block.as_str()) {
        let Some(body) = caps.get(1).map(|m| m.as_str()) else {
            continue;
        };
        let action = element(&ACTION, body).map(|a| a.to_lowercase());
        let insight = element(&INSIGHT, body);
        let old = element(&OLD_INSIGHT, body);

        let action = match action.as_deref() {
            Some("add") => RuleAction::Add,
            Some("update") => RuleAction::Update,
            _ => {
                warn!(?action, "Skipping operation with unknown action");
                continue;
            }
        };
        let Some(insight) = insight.filter(|i| has_rule_tag(i)) else {
            warn!(%action, "Skipping operation without a tagged insight");
            continue;
        };

        operations.push(RuleOperation {
            action,
            insight,
            old_insight_to_replace: old,
        });
    }

    info!(count = operations.len(), "Parsed rule operations");
    operations
}

/// Trimmed, unescaped text of the first `re` match in `body`; `None` if
/// absent or empty.
fn element(re: &Regex, body: &str) -> Option<String> {
    let raw = re.captures(body)?.get(1)?.as_str();
    let text = unescape(strip_cdata(raw.trim())).trim().to_string();
    (!text.is_empty()).then_some(text)
}

fn strip_cdata(text: &str) -> &str {
    text.strip_prefix("<![CDATA[")
        .and_then(|t| t.strip_suffix("]]>"))
        .unwrap_or(text)
}

fn unescape(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_add_and_update() {
        let text = r#"Sure, here are the changes:
<operations_list>
  <operation>
    <action>add</action>
    <insight>[CORE_RULE|0.9] Always greet the user politely.</insight>
  </operation>
  <operation>
    <action> UPDATE </action>
    <insight>[RESPONSE_PRINCIPLE|0.8] Keep answers short &amp; direct.</insight>
    <old_insight_to_replace>[RESPONSE_PRINCIPLE|0.6] Keep answers short.</old_insight_to_replace>
  </operation>
</operations_list>
Hope that helps."#;

        let ops = parse_rule_operations(text);
        assert_eq!(ops.len(), 2);
        assert_eq!(ops[0].action, RuleAction::Add);
        assert_eq!(ops[0].insight, "[CORE_RULE|0.9] Always greet the user politely.");
        assert_eq!(ops[0].old_insight_to_replace, None);
        assert_eq!(ops[1].action, RuleAction::Update);
        assert_eq!(
            ops[1].insight,
            "[RESPONSE_PRINCIPLE|0.8] Keep answers short & direct."
        );
        assert_eq!(
            ops[1].old_insight_to_replace.as_deref(),
            Some("[RESPONSE_PRINCIPLE|0.6] Keep answers short.")
        );
    }

    #[test]
    fn test_missing_block_yields_nothing() {
        assert!(parse_rule_operations("no xml here").is_empty());
        assert!(parse_rule_operations("<operations_list></operations_list>").is_empty());
    }

    #[test]
    fn test_invalid_operations_are_skipped() {
        let text = r#"<OPERATIONS_LIST>
<operation><action>delete</action><insight>[CORE_RULE|1] x</insight></operation>
<operation><action>add</action><insight>untagged insight</insight></operation>
<operation><action>add</action></operation>
<operation><action>add</action><insight><![CDATA[[GENERAL_LEARNING|0.3] kept]]></insight></operation>
</OPERATIONS_LIST>"#;
        let ops = parse_rule_operations(text);
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].insight, "[GENERAL_LEARNING|0.3] kept");
    }

    #[test]
    fn test_unescape_order() {
        assert_eq!(unescape("&amp;lt;"), "&lt;");
        assert_eq!(unescape("a &lt;b&gt; &quot;c&quot;"), "a <b> \"c\"");
    }
}
