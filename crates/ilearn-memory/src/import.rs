//! Flat-file import formats.
//!
//! - Rules: UTF-8 text, one rule per chunk, chunks separated by a line that
//!   holds only `---`.
//! - Memories: JSON lines, each an object with `user_input`, `bot_response`
//!   and `metrics`.
//!
//! Parsing never fails as a whole; bad chunks and lines are reported back
//! so the caller can count and skip them.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use serde_json::Value;

use crate::collection::AddOutcome;
use crate::error::{MemoryError, Result};
use crate::types::MemoryRecord;
use crate::validation::{validate_memory_object, validate_tagged_rule};

static RULE_SEPARATOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t]*---[ \t]*\r?$").unwrap_or_else(|e| unreachable!("separator pattern is valid: {e}"))
});

/// Counts from a bulk import.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    /// Entries that were stored.
    pub added: usize,
    /// Entries already present.
    pub duplicates: usize,
    /// Entries that were malformed, empty, or rejected.
    pub skipped: usize,
}

impl ImportReport {
    /// Count one add outcome.
    pub fn record(&mut self, outcome: AddOutcome) {
        match outcome {
            AddOutcome::Added => self.added += 1,
            AddOutcome::Duplicate => self.duplicates += 1,
            AddOutcome::Empty | AddOutcome::Rejected => self.skipped += 1,
        }
    }

    /// Total entries seen.
    pub fn total(&self) -> usize {
        self.added + self.duplicates + self.skipped
    }
}

/// Split a rules file into trimmed, non-empty chunks.
pub fn split_rule_chunks(contents: &str) -> Vec<&str> {
    RULE_SEPARATOR
        .split(contents)
        .map(str::trim)
        .filter(|chunk| !chunk.is_empty())
        .collect()
}

/// Chunks of a rules file, each either a tagged rule or why it was rejected.
pub fn parse_rules_file(contents: &str) -> Vec<Result<String>> {
    split_rule_chunks(contents)
        .into_iter()
        .map(|chunk| {
            validate_tagged_rule(chunk)
                .map(str::to_string)
                .map_err(MemoryError::from)
        })
        .collect()
}

/// Parse one memories-file line into a fresh record.
pub fn parse_memory_line(line: &str) -> Result<MemoryRecord> {
    let value: Value = serde_json::from_str(line)
        .map_err(|e| MemoryError::MalformedInput(format!("invalid JSON: {e}")))?;
    let Value::Object(object) = value else {
        return Err(MemoryError::MalformedInput(
            "line is not a JSON object".to_string(),
        ));
    };
    let fields = validate_memory_object(&object)?;
    Ok(MemoryRecord::new(
        fields.user_input,
        fields.metrics,
        fields.bot_response,
    ))
}

/// Non-blank lines of a memories file with their 1-based line numbers.
pub fn memory_lines(contents: &str) -> impl Iterator<Item = (usize, &str)> {
    contents
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(n, line)| (n + 1, line))
}
