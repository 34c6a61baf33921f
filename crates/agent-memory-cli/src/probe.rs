//! Cheap filesystem and git probes that feed the merge engine.
//!
//! Every failure here degrades to "absent": a probe never aborts an update.

use std::fs;
use std::path::Path;
use std::process::Command;

use agent_memory_core::normalize_ws;

pub const MIN_SNAPSHOT_BULLETS: usize = 6;
pub const MAX_SNAPSHOT_BULLETS: usize = 12;

const NAME_PREVIEW: usize = 4;
const ENTRY_POINTS: [&str; 2] = ["src/main.rs", "src/lib.rs"];
const TEST_DIRS: [&str; 2] = ["tests", "test"];
const PLATFORM_DIRS: [&str; 6] = ["android", "ios", "web", "macos", "linux", "windows"];

const FALLBACK_BULLETS: [&str; 6] = [
    "Keep updates focused on architecture, behavior rules, and high-impact changes only.",
    "Prefer short, implementation-focused bullets over narrative prose.",
    "Record only repo-tracked changes in the history section.",
    "Treat the behavior rules section as the source of truth for agent conduct.",
    "Log each assistant turn that edits repo-tracked files as one history entry.",
    "Drop stale snapshot facts when the project layout changes.",
];

/// Split a comma-separated `--changed-files` value. Order is kept, repeats dropped.
pub fn parse_changed_files(raw: Option<&str>) -> Vec<String> {
    let mut files: Vec<String> = Vec::new();
    for file in raw.unwrap_or_default().split(',').map(normalize_ws) {
        if !file.is_empty() && !files.contains(&file) {
            files.push(file);
        }
    }
    files
}

/// Paths reported by `git diff --name-only` under `root`; empty when git fails.
pub fn git_changed_files(root: &Path) -> Vec<String> {
    let output = Command::new("git").arg("-C").arg(root).args(["diff", "--name-only"]).output();
    match output {
        Ok(output) if output.status.success() => String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(ToString::to_string)
            .collect(),
        Ok(output) => {
            tracing::debug!(status = %output.status, "git diff failed; assuming no changed files");
            Vec::new()
        }
        Err(err) => {
            tracing::debug!(error = %err, "git unavailable; assuming no changed files");
            Vec::new()
        }
    }
}

/// Explicit files win; git is only consulted when none were given.
pub fn resolve_changed_files(root: &Path, raw: Option<&str>) -> Vec<String> {
    let explicit = parse_changed_files(raw);
    if explicit.is_empty() {
        git_changed_files(root)
    } else {
        explicit
    }
}

/// Project Snapshot bullets for `root`, padded with fallbacks and capped.
///
/// `docs_path` never shows up in a listing, so writing the document cannot
/// change the next snapshot.
pub fn project_snapshot(root: &Path, docs_path: &Path) -> Vec<String> {
    let cargo = read_toml(&root.join("Cargo.toml"));
    let package_json = read_json(&root.join("package.json"));
    let pubspec = read_yaml(&root.join("pubspec.yaml"));

    let mut bullets = [
        cargo.as_ref().and_then(cargo_manifest_bullet),
        cargo.as_ref().and_then(cargo_dependencies_bullet),
        entry_points_bullet(root),
        package_json.as_ref().and_then(node_package_bullet),
        pubspec.as_ref().and_then(pubspec_dependencies_bullet),
        root.join("lib/main.dart")
            .is_file()
            .then(|| "Dart entry point: `lib/main.dart`.".to_string()),
        tests_bullet(root, docs_path),
        platforms_bullet(root),
    ]
    .into_iter()
    .flatten()
    .collect::<Vec<_>>();

    for fallback in FALLBACK_BULLETS {
        if bullets.len() >= MIN_SNAPSHOT_BULLETS {
            break;
        }
        bullets.push(fallback.to_string());
    }
    bullets.truncate(MAX_SNAPSHOT_BULLETS);
    bullets
}

fn preview(names: &[String]) -> String {
    let mut text = names
        .iter()
        .take(NAME_PREVIEW)
        .map(|name| format!("`{name}`"))
        .collect::<Vec<_>>()
        .join(", ");
    if names.len() > NAME_PREVIEW {
        text.push_str(&format!(", +{} more", names.len() - NAME_PREVIEW));
    }
    text
}

fn read_toml(path: &Path) -> Option<toml::Table> {
    let text = fs::read_to_string(path).ok()?;
    text.parse::<toml::Table>()
        .map_err(|err| tracing::debug!(path = %path.display(), error = %err, "unparseable toml"))
        .ok()
}

fn read_json(path: &Path) -> Option<serde_json::Value> {
    let text = fs::read_to_string(path).ok()?;
    serde_json::from_str(&text)
        .map_err(|err| tracing::debug!(path = %path.display(), error = %err, "unparseable json"))
        .ok()
}

fn read_yaml(path: &Path) -> Option<serde_yaml::Value> {
    let text = fs::read_to_string(path).ok()?;
    serde_yaml::from_str(&text)
        .map_err(|err| tracing::debug!(path = %path.display(), error = %err, "unparseable yaml"))
        .ok()
}

fn cargo_manifest_bullet(manifest: &toml::Table) -> Option<String> {
    if let Some(package) = manifest.get("package").and_then(toml::Value::as_table) {
        let name = package.get("name").and_then(toml::Value::as_str)?;
        return Some(match package.get("edition").and_then(toml::Value::as_str) {
            Some(edition) => format!("Rust package `{name}` (edition {edition})."),
            None => format!("Rust package `{name}`."),
        });
    }

    let members = manifest
        .get("workspace")
        .and_then(|workspace| workspace.get("members"))
        .and_then(toml::Value::as_array)?
        .iter()
        .filter_map(toml::Value::as_str)
        .map(ToString::to_string)
        .collect::<Vec<_>>();
    if members.is_empty() {
        return Some("Cargo workspace.".to_string());
    }
    Some(format!("Cargo workspace with {} member(s): {}.", members.len(), preview(&members)))
}

fn cargo_dependencies_bullet(manifest: &toml::Table) -> Option<String> {
    let table = manifest.get("dependencies").and_then(toml::Value::as_table).or_else(|| {
        manifest
            .get("workspace")
            .and_then(|workspace| workspace.get("dependencies"))
            .and_then(toml::Value::as_table)
    })?;
    let names = table.keys().cloned().collect::<Vec<_>>();
    (!names.is_empty()).then(|| format!("Rust dependencies: {}.", preview(&names)))
}

fn entry_points_bullet(root: &Path) -> Option<String> {
    let found = ENTRY_POINTS
        .iter()
        .filter(|path| root.join(path).is_file())
        .map(ToString::to_string)
        .collect::<Vec<_>>();
    (!found.is_empty()).then(|| format!("Rust entry points: {}.", preview(&found)))
}

fn node_package_bullet(package: &serde_json::Value) -> Option<String> {
    let name = package.get("name").and_then(serde_json::Value::as_str);
    let dependencies = package
        .get("dependencies")
        .and_then(serde_json::Value::as_object)
        .map(|deps| deps.keys().cloned().collect::<Vec<_>>())
        .unwrap_or_default();

    match (name, dependencies.is_empty()) {
        (Some(name), true) => Some(format!("Node package `{name}`.")),
        (Some(name), false) => {
            Some(format!("Node package `{name}` with dependencies: {}.", preview(&dependencies)))
        }
        (None, false) => Some(format!("Node dependencies: {}.", preview(&dependencies))),
        (None, true) => None,
    }
}

fn pubspec_dependencies_bullet(pubspec: &serde_yaml::Value) -> Option<String> {
    let names = pubspec
        .get("dependencies")
        .and_then(serde_yaml::Value::as_mapping)?
        .iter()
        .filter(|(_, constraint)| is_version_constraint(constraint))
        .filter_map(|(name, _)| name.as_str())
        .filter(|name| *name != "flutter")
        .map(ToString::to_string)
        .collect::<Vec<_>>();
    (!names.is_empty()).then(|| format!("Dart dependencies: {}.", preview(&names)))
}

/// Hosted packages only: sdk, path and git sources are mappings, blanks are null.
fn is_version_constraint(value: &serde_yaml::Value) -> bool {
    matches!(
        value,
        serde_yaml::Value::String(_) | serde_yaml::Value::Number(_) | serde_yaml::Value::Bool(_)
    )
}

fn tests_bullet(root: &Path, docs_path: &Path) -> Option<String> {
    let dir = TEST_DIRS.iter().find(|dir| root.join(dir).is_dir())?;
    let excluded = fs::canonicalize(docs_path).ok();
    let mut files = fs::read_dir(root.join(dir))
        .ok()?
        .filter_map(Result::ok)
        .filter(|entry| entry.path().is_file())
        .filter(|entry| excluded.is_none() || fs::canonicalize(entry.path()).ok() != excluded)
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .collect::<Vec<_>>();
    files.sort();

    if files.is_empty() {
        return Some(format!("Tests live in `{dir}/`."));
    }
    Some(format!("Tests live in `{dir}/` ({} file(s): {}).", files.len(), preview(&files)))
}

fn platforms_bullet(root: &Path) -> Option<String> {
    let found = PLATFORM_DIRS
        .iter()
        .filter(|dir| root.join(dir).is_dir())
        .map(ToString::to_string)
        .collect::<Vec<_>>();
    (!found.is_empty()).then(|| format!("Platform directories: {}.", preview(&found)))
}
