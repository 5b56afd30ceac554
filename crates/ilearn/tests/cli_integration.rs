//! CLI integration tests for the ilearn command-line interface.
//!
//! Every test runs against a throwaway config directory and a SQLite file
//! under a temp dir, with the offline hashing embedder.

use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

struct Workspace {
    dir: TempDir,
    config: PathBuf,
}

impl Workspace {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let config = dir.path().join("ilearn.toml");
        let db = dir.path().join("ai_memory.db");
        std::fs::write(
            &config,
            format!(
                r#"
[storage]
backend = "sqlite"

[storage.sqlite]
path = "{}"

[embedding]
provider = "hashing"
dimensions = 256

[logging]
file = false
"#,
                db.display().to_string().replace('\\', "/")
            ),
        )
        .unwrap();
        Self { dir, config }
    }

    fn path(&self) -> &Path {
        self.dir.path()
    }

    fn ilearn(&self) -> Command {
        let mut cmd = Command::cargo_bin("ilearn").unwrap();
        cmd.env("ILEARN_CONFIG_DIR", self.path().join("config"))
            .env_remove("STORAGE_BACKEND")
            .env_remove("SQLITE_DB_PATH")
            .env_remove("HF_TOKEN")
            .env_remove("ILEARN_CONFIG")
            .arg("--config")
            .arg(&self.config);
        cmd
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Help and Parsing
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_help_lists_subcommands() {
    Command::cargo_bin("ilearn")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("memories"))
        .stdout(predicate::str::contains("rules"))
        .stdout(predicate::str::contains("reindex"))
        .stdout(predicate::str::contains("stats"))
        .stdout(predicate::str::contains("config"));
}

#[test]
fn test_version_displays() {
    Command::cargo_bin("ilearn")
        .unwrap()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("ilearn"));
}

#[test]
fn test_unknown_subcommand_fails() {
    Command::cargo_bin("ilearn")
        .unwrap()
        .arg("forget-everything")
        .assert()
        .failure();
}

#[test]
fn test_missing_explicit_config_fails() {
    Command::cargo_bin("ilearn")
        .unwrap()
        .args(["--config", "/nonexistent/ilearn.toml", "stats"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to load config"));
}

// ─────────────────────────────────────────────────────────────────────────────
// Rules
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_rule_round_trip_through_sqlite() {
    let ws = Workspace::new();
    ws.ilearn()
        .args(["rules", "add", "[CORE_RULE|0.9] Always greet the user politely."])
        .assert()
        .success()
        .stdout(predicate::str::contains("Rule stored"));
    ws.ilearn()
        .args(["rules", "add", "[RESPONSE_PRINCIPLE|0.7] Cite sources for factual claims."])
        .assert()
        .success();

    ws.ilearn()
        .args(["--json", "rules", "search", "greet politely", "--limit", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Always greet the user politely."))
        .stdout(predicate::str::contains("Cite sources").not());
}

#[test]
fn test_duplicate_rule_reported() {
    let ws = Workspace::new();
    for _ in 0..2 {
        ws.ilearn()
            .args(["rules", "add", "[CORE_RULE|0.5] X"])
            .assert()
            .success();
    }
    ws.ilearn()
        .args(["--json", "rules", "add", "[CORE_RULE|0.5] X"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"duplicate\""));
    ws.ilearn()
        .args(["--json", "rules", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[CORE_RULE|0.5] X").count(1));
}

#[test]
fn test_remove_rule() {
    let ws = Workspace::new();
    ws.ilearn().args(["rules", "add", "A"]).assert().success();
    ws.ilearn().args(["rules", "add", "B"]).assert().success();
    ws.ilearn()
        .args(["--json", "rules", "remove", "A"])
        .assert()
        .success()
        .stdout(predicate::str::contains("true"));
    ws.ilearn()
        .args(["--json", "rules", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"B\""))
        .stdout(predicate::str::contains("\"A\"").not());
}

#[test]
fn test_import_rules_file() {
    let ws = Workspace::new();
    let file = ws.path().join("rules.txt");
    std::fs::write(
        &file,
        "[CORE_RULE|0.9] Be kind.\n\n---\n\nuntagged\n\n---\n\n[GENERAL_LEARNING|0.2] Be brief.\n",
    )
    .unwrap();

    ws.ilearn()
        .args(["--json", "rules", "import"])
        .arg(&file)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"added\": 2"))
        .stdout(predicate::str::contains("\"skipped\": 1"));
}

#[test]
fn test_apply_operations_from_stdin() {
    let ws = Workspace::new();
    ws.ilearn()
        .args(["rules", "add", "[CORE_RULE|0.6] Greet users."])
        .assert()
        .success();

    let output = "<operations_list><operation><action>update</action>\
        <insight>[CORE_RULE|0.8] Greet users by name.</insight>\
        <old_insight_to_replace>[CORE_RULE|0.6] Greet users.</old_insight_to_replace>\
        </operation></operations_list>";
    ws.ilearn()
        .args(["--json", "rules", "apply", "-"])
        .write_stdin(output)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"updated\": 1"));

    ws.ilearn()
        .args(["--json", "rules", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Greet users by name."))
        .stdout(predicate::str::contains("[CORE_RULE|0.6]").not());
}

#[test]
fn test_clear_rules() {
    let ws = Workspace::new();
    ws.ilearn().args(["rules", "add", "x"]).assert().success();
    ws.ilearn()
        .args(["rules", "clear", "--yes"])
        .assert()
        .success();
    ws.ilearn()
        .args(["rules", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No rules stored"));
}

// ─────────────────────────────────────────────────────────────────────────────
// Memories
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_memory_add_and_list() {
    let ws = Workspace::new();
    ws.ilearn()
        .args([
            "memories", "add", "--user", "hi", "--response", "hello!", "--takeaway", "greeting",
        ])
        .assert()
        .success();
    ws.ilearn()
        .args(["--json", "memories", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"user_input\": \"hi\""))
        .stdout(predicate::str::contains("\"takeaway\": \"greeting\""));
}

#[test]
fn test_memory_search_empty_collection() {
    let ws = Workspace::new();
    ws.ilearn()
        .args(["memories", "search", "anything", "--limit", "5"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No results found"));
}

#[test]
fn test_import_memories_skips_bad_lines() {
    let ws = Workspace::new();
    let file = ws.path().join("memories.jsonl");
    std::fs::write(
        &file,
        "{\"user_input\":\"a\",\"bot_response\":\"b\",\"metrics\":{\"takeaway\":\"c\"}}\nnot json\n",
    )
    .unwrap();
    ws.ilearn()
        .args(["--json", "memories", "import"])
        .arg(&file)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"added\": 1"))
        .stdout(predicate::str::contains("\"skipped\": 1"));
}

// ─────────────────────────────────────────────────────────────────────────────
// Maintenance and Config
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_stats_and_reindex() {
    let ws = Workspace::new();
    ws.ilearn().args(["rules", "add", "r1"]).assert().success();
    ws.ilearn()
        .args(["--json", "stats"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"backend\": \"sqlite\""))
        .stdout(predicate::str::contains("\"embedder\": \"hashing\""));
    ws.ilearn()
        .args(["--json", "reindex"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"collection\": \"rules\""));
}

#[test]
fn test_config_show_lists_source() {
    let ws = Workspace::new();
    ws.ilearn()
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("ilearn.toml"))
        .stdout(predicate::str::contains("sqlite"))
        .stdout(predicate::str::contains("hashing"));
}

#[test]
fn test_unknown_storage_backend_env_is_a_warning() {
    let ws = Workspace::new();
    ws.ilearn().args(["rules", "add", "kept"]).assert().success();
    ws.ilearn()
        .env("STORAGE_BACKEND", "redis")
        .args(["--json", "rules", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"kept\""))
        .stderr(predicate::str::contains("STORAGE_BACKEND ignored"));
}
