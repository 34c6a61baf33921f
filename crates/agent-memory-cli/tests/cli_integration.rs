use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::Value;

fn unique_temp_dir(prefix: &str) -> PathBuf {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_else(|err| panic!("clock should be >= UNIX_EPOCH: {err}"))
        .as_nanos();
    let dir = std::env::temp_dir().join(format!("{prefix}-{}-{now}", std::process::id()));
    fs::create_dir_all(&dir)
        .unwrap_or_else(|err| panic!("failed to create temp dir {}: {err}", dir.display()));
    dir
}

fn run_amem<I, S>(root: &Path, args: I) -> Output
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    Command::new(env!("CARGO_BIN_EXE_amem"))
        .arg("--project-root")
        .arg(root)
        .args(args)
        .env_remove("AMEM_DOCS_FILE")
        .env_remove("AMEM_PROJECT_ROOT")
        .env_remove("RUST_LOG")
        .output()
        .unwrap_or_else(|err| panic!("failed to execute amem binary: {err}"))
}

fn run_json<I, S>(root: &Path, args: I) -> Value
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let output = run_amem(root, args);
    if !output.status.success() {
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        panic!(
            "amem command failed (status={}):\nstdout:\n{}\nstderr:\n{}",
            output.status, stdout, stderr
        );
    }

    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
    serde_json::from_str(&stdout)
        .unwrap_or_else(|err| panic!("stdout is not valid JSON: {err}\nstdout:\n{stdout}"))
}

fn as_str<'a>(value: &'a Value, key: &str) -> &'a str {
    value
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_else(|| panic!("missing string field `{key}` in payload: {value}"))
}

fn as_bool(value: &Value, key: &str) -> bool {
    value
        .get(key)
        .and_then(Value::as_bool)
        .unwrap_or_else(|| panic!("missing bool field `{key}` in payload: {value}"))
}

fn as_array<'a>(value: &'a Value, key: &str) -> &'a Vec<Value> {
    value
        .get(key)
        .and_then(Value::as_array)
        .unwrap_or_else(|| panic!("missing array field `{key}` in payload: {value}"))
}

fn docs_path(root: &Path) -> PathBuf {
    root.join("docs/agent-rules.md")
}

fn read_docs(root: &Path) -> String {
    let path = docs_path(root);
    fs::read_to_string(&path)
        .unwrap_or_else(|err| panic!("failed to read {}: {err}", path.display()))
}

#[test]
fn bootstrap_update_creates_document_with_rule_and_single_entry() {
    let root = unique_temp_dir("amem-bootstrap");
    let payload = run_json(
        &root,
        ["update", "--user-message", "You must always run tests before committing."],
    );

    assert_eq!(as_str(&payload, "contract_version"), "cli.v1");
    assert_eq!(as_str(&payload, "status"), "updated");
    assert_eq!(payload["decision"]["kind"], "bootstrap");
    assert!(as_bool(&payload, "entry_added"));
    assert_eq!(
        as_array(&payload, "new_rules"),
        &vec![Value::from("Always run tests before committing")]
    );
    assert_eq!(as_str(&payload, "fingerprint").len(), 12);

    let document = read_docs(&root);
    assert!(document.starts_with("# AI Agent Rules & Change Memory\n"));
    assert!(document.contains("- Always run tests before committing.\n"));
    assert!(document.contains("- Changed files: none\n"));
    assert_eq!(document.matches("\n### ").count(), 1);
    assert!(document.ends_with('\n'));
    let _ = fs::remove_dir_all(root);
}

#[test]
fn repeating_an_update_leaves_the_file_untouched() {
    let root = unique_temp_dir("amem-idempotent");
    let args = [
        "update",
        "--changed-files",
        "src/lib.rs, README.md",
        "--change-summary",
        "Added the parser",
        "--user-message",
        "Never commit secrets.",
    ];
    let first = run_json(&root, args);
    assert_eq!(as_str(&first, "status"), "updated");
    let before = read_docs(&root);

    let second = run_json(&root, args);
    assert_eq!(as_str(&second, "status"), "unchanged");
    assert_eq!(second["decision"]["kind"], "skip");
    assert_eq!(second["decision"]["reason"], "up_to_date");
    assert!(!as_bool(&second, "entry_added"));
    assert_eq!(as_str(&second, "fingerprint"), as_str(&first, "fingerprint"));
    assert_eq!(read_docs(&root), before);
    let _ = fs::remove_dir_all(root);
}

#[test]
fn update_without_files_or_rules_on_existing_document_is_gated() {
    let root = unique_temp_dir("amem-gated");
    run_json(&root, ["update"]);
    let before = read_docs(&root);

    let payload = run_json(&root, ["update", "--user-message", "thanks, looks good"]);
    assert_eq!(as_str(&payload, "status"), "unchanged");
    assert_eq!(payload["decision"]["reason"], "nothing_to_record");
    assert!(payload["fingerprint"].is_null());
    assert_eq!(read_docs(&root), before);
    let _ = fs::remove_dir_all(root);
}

#[test]
fn changed_files_are_recorded_in_order() {
    let root = unique_temp_dir("amem-files");
    run_json(&root, ["update"]);

    let payload = run_json(&root, ["update", "--changed-files", "src/a.rs, ,src/b.rs"]);
    assert_eq!(as_str(&payload, "status"), "updated");
    assert_eq!(payload["decision"]["entries_changed"], true);

    let document = read_docs(&root);
    assert!(document.contains("- Changed files: `src/a.rs`, `src/b.rs`\n"));
    assert!(document.contains("- Summary: Captured code changes from this assistant turn.\n"));
    assert_eq!(document.matches("\n### ").count(), 2);
    let _ = fs::remove_dir_all(root);
}

#[test]
fn dry_run_reports_document_without_writing() {
    let root = unique_temp_dir("amem-dry-run");
    let payload = run_json(&root, ["update", "--dry-run"]);

    assert_eq!(as_str(&payload, "status"), "would_update");
    assert!(as_str(&payload, "document").contains("## Behavior Rules\n"));
    assert!(!docs_path(&root).exists());
    let _ = fs::remove_dir_all(root);
}

#[test]
fn custom_docs_file_creates_parent_directories() {
    let root = unique_temp_dir("amem-custom-path");
    let payload = run_json(&root, ["update", "--docs-file", "nested/deeper/memory.md"]);

    assert_eq!(as_str(&payload, "status"), "updated");
    assert!(root.join("nested/deeper/memory.md").is_file());
    assert!(as_str(&payload, "docs_path").ends_with("memory.md"));
    let _ = fs::remove_dir_all(root);
}

#[test]
fn show_reports_absent_then_parsed_document() {
    let root = unique_temp_dir("amem-show");
    let absent = run_json(&root, ["show"]);
    assert!(!as_bool(&absent, "exists"));
    assert!(as_array(&absent["state"], "rules").is_empty());

    run_json(&root, ["update", "--user-message", "We need to document every flag."]);
    let present = run_json(&root, ["show"]);
    assert!(as_bool(&present, "exists"));
    assert_eq!(as_array(&present["state"], "rules").len(), 6);
    assert_eq!(as_array(&present["state"], "snapshot").len(), 6);
    assert_eq!(as_array(&present["state"], "entries").len(), 1);
    let _ = fs::remove_dir_all(root);
}

#[test]
fn extract_rules_prints_rules_and_keys() {
    let root = unique_temp_dir("amem-extract");
    let payload = run_json(
        &root,
        ["extract-rules", "--user-message", "Please be concise. You should never force-push!"],
    );

    assert_eq!(payload["count"], 1);
    let rules = as_array(&payload, "rules");
    assert_eq!(rules[0]["rule"], "Never force-push");
    assert_eq!(rules[0]["key"], "neverforcepush");
    assert!(!docs_path(&root).exists());
    let _ = fs::remove_dir_all(root);
}

#[test]
fn unreadable_document_fails_without_being_overwritten() {
    let root = unique_temp_dir("amem-unreadable");
    let path = docs_path(&root);
    let mut original = b"# AI Agent Rules & Change Memory\n\n## Behavior Rules\n- Keep my rule.\n\n\
## Recent Changes (Last 20)\n### 2026-10-01T09:00:00Z\n- Summary: Caf"
        .to_vec();
    original.extend_from_slice(b"\xff edit.\n");
    fs::create_dir_all(root.join("docs"))
        .unwrap_or_else(|err| panic!("failed to create docs dir: {err}"));
    fs::write(&path, &original)
        .unwrap_or_else(|err| panic!("failed to write {}: {err}", path.display()));

    let update = run_amem(
        &root,
        ["update", "--changed-files", "src/lib.rs", "--user-message", "Always run tests."],
    );
    assert!(!update.status.success());
    assert!(String::from_utf8_lossy(&update.stderr).contains("failed to read memory document"));

    let show = run_amem(&root, ["show"]);
    assert!(!show.status.success());

    let after = fs::read(&path).unwrap_or_else(|err| panic!("failed to read back: {err}"));
    assert_eq!(after, original);
    let _ = fs::remove_dir_all(root);
}

#[test]
fn missing_required_argument_fails() {
    let root = unique_temp_dir("amem-bad-args");
    let output = run_amem(&root, ["extract-rules"]);
    assert!(!output.status.success());
    let _ = fs::remove_dir_all(root);
}
