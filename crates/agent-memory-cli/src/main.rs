use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use agent_memory_core::{
    canonical_key, extract_rules, merge_document, parse_document, Decision, MergeRequest,
    SkipReason,
};
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use serde_json::Value;
use time::OffsetDateTime;
use tracing_subscriber::EnvFilter;

mod probe;

const CLI_CONTRACT_VERSION: &str = "cli.v1";
const DEFAULT_DOCS_FILE: &str = "docs/agent-rules.md";
const DEFAULT_LOG_FILTER: &str = "warn";

#[derive(Debug, Parser)]
#[command(name = "amem")]
#[command(about = "Keeps a project's AI agent rules and change memory document current")]
struct Cli {
    #[arg(long, global = true, env = "AMEM_PROJECT_ROOT", default_value = ".")]
    project_root: PathBuf,

    /// Relative paths resolve against the project root.
    #[arg(long, global = true, env = "AMEM_DOCS_FILE", default_value = DEFAULT_DOCS_FILE)]
    docs_file: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Merge this turn's changes and instructions into the document.
    Update(UpdateArgs),
    /// Print the parsed document state.
    Show,
    /// Print the rules a message would contribute, without touching any file.
    ExtractRules(ExtractRulesArgs),
}

#[derive(Debug, Args)]
struct UpdateArgs {
    /// Comma-separated paths; falls back to `git diff --name-only` when empty.
    #[arg(long)]
    changed_files: Option<String>,
    #[arg(long, default_value = "")]
    change_summary: String,
    #[arg(long, default_value = "")]
    user_message: String,
    #[arg(long, default_value_t = false)]
    dry_run: bool,
}

#[derive(Debug, Args)]
struct ExtractRulesArgs {
    #[arg(long)]
    user_message: String,
}

#[derive(Debug, Clone, Copy, Serialize, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
enum UpdateStatus {
    Updated,
    Unchanged,
    WouldUpdate,
}

impl UpdateStatus {
    fn message(self, decision: Decision) -> &'static str {
        match (self, decision) {
            (Self::Updated, Decision::Bootstrap) => "Created the agent memory document.",
            (Self::Updated, _) => "Updated the agent memory document.",
            (Self::WouldUpdate, _) => "Dry run: the agent memory document would be written.",
            (Self::Unchanged, Decision::Skip { reason: SkipReason::NothingToRecord }) => {
                "No changed files and no new behavior instructions; nothing to record."
            }
            (Self::Unchanged, _) => "The agent memory document is already up to date.",
        }
    }
}

fn with_contract_version(value: Value) -> Value {
    match value {
        Value::Object(mut object) => {
            object.insert(
                "contract_version".to_string(),
                Value::String(CLI_CONTRACT_VERSION.to_string()),
            );
            Value::Object(object)
        }
        other => serde_json::json!({
            "contract_version": CLI_CONTRACT_VERSION,
            "payload": other
        }),
    }
}

fn emit_json(value: Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&with_contract_version(value))?);
    Ok(())
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let docs_path = resolve_docs_path(&cli.project_root, &cli.docs_file);
    match cli.command {
        Command::Update(args) => run_update(&cli.project_root, &docs_path, &args),
        Command::Show => run_show(&docs_path),
        Command::ExtractRules(args) => run_extract_rules(&args),
    }
}

fn resolve_docs_path(project_root: &Path, docs_file: &Path) -> PathBuf {
    if docs_file.is_absolute() {
        docs_file.to_path_buf()
    } else {
        project_root.join(docs_file)
    }
}

/// Current document text, or `None` when no document exists yet.
///
/// Any other read failure is an error: a document we could not read is never
/// replaced by a bootstrapped one.
fn read_document(path: &Path) -> Result<Option<String>> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err)
            .with_context(|| format!("failed to read memory document {}", path.display())),
    }
}

fn write_document(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.display()))?;
    }
    fs::write(path, content)
        .with_context(|| format!("failed to write memory document {}", path.display()))
}

fn current_time() -> OffsetDateTime {
    OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc())
}

fn run_update(project_root: &Path, docs_path: &Path, args: &UpdateArgs) -> Result<()> {
    let existing = read_document(docs_path)?;
    let changed_files = probe::resolve_changed_files(project_root, args.changed_files.as_deref());
    let snapshot = probe::project_snapshot(project_root, docs_path);
    tracing::debug!(
        changed_files = changed_files.len(),
        snapshot = snapshot.len(),
        exists = existing.is_some(),
        "collected update inputs"
    );

    let report = merge_document(MergeRequest {
        existing: existing.as_deref(),
        snapshot,
        changed_files,
        summary: &args.change_summary,
        message: &args.user_message,
        now: current_time(),
    })?;

    let status = match report.rendered.as_deref() {
        None => UpdateStatus::Unchanged,
        Some(_) if args.dry_run => UpdateStatus::WouldUpdate,
        Some(text) => {
            write_document(docs_path, text)?;
            tracing::info!(path = %docs_path.display(), "memory document written");
            UpdateStatus::Updated
        }
    };

    let mut output = serde_json::json!({
        "status": status,
        "message": status.message(report.decision),
        "docs_path": docs_path.display().to_string(),
        "decision": report.decision,
        "entry_added": report.entry_added,
        "fingerprint": report.fingerprint,
        "new_rules": report.new_rules,
    });
    if args.dry_run {
        if let (Some(document), Value::Object(object)) = (report.rendered, &mut output) {
            object.insert("document".to_string(), Value::String(document));
        }
    }
    emit_json(output)
}

fn run_show(docs_path: &Path) -> Result<()> {
    let content = read_document(docs_path)?;
    let state = content.as_deref().map(parse_document).unwrap_or_default();
    emit_json(serde_json::json!({
        "exists": content.is_some(),
        "docs_path": docs_path.display().to_string(),
        "state": state,
    }))
}

fn run_extract_rules(args: &ExtractRulesArgs) -> Result<()> {
    let rules = extract_rules(&args.user_message)
        .into_iter()
        .map(|rule| {
            let key = canonical_key(&rule);
            serde_json::json!({ "rule": rule, "key": key })
        })
        .collect::<Vec<_>>();
    emit_json(serde_json::json!({
        "count": rules.len(),
        "rules": rules,
    }))
}
