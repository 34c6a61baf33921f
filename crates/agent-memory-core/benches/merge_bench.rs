use agent_memory_core::{
    extract_rules, merge_document, parse_document, render_document, ChangeEntry, DocumentState,
    MergeRequest, MAX_CHANGE_ENTRIES, MAX_RULES,
};
use criterion::{criterion_group, criterion_main, Criterion};
use time::OffsetDateTime;

fn full_document() -> String {
    let entries = (0..MAX_CHANGE_ENTRIES)
        .map(|index| ChangeEntry {
            timestamp: format!("2026-10-{:02}T09:00:00Z", index + 1),
            lines: vec![
                format!("- Changed files: `src/module_{index}.rs`"),
                format!("- Summary: Reworked module {index}."),
                "- Behavior impact: Recorded code-level deltas for future AI context.".to_string(),
                format!("<!-- fingerprint:{index:012x} -->"),
            ],
        })
        .collect();

    render_document(&DocumentState {
        snapshot: (0..12).map(|index| format!("Snapshot bullet {index}.")).collect(),
        rules: (0..MAX_RULES).map(|index| format!("Keep rule {index} in mind.")).collect(),
        entries,
        last_updated: "2026-10-20T09:00:00Z".to_string(),
    })
}

fn bench_parse_render(c: &mut Criterion) {
    let document = full_document();

    c.bench_function("parse_render_full_document", |b| {
        b.iter(|| render_document(&parse_document(&document)));
    });
}

fn bench_merge(c: &mut Criterion) {
    let document = full_document();
    let snapshot = parse_document(&document).snapshot;
    let message = "You must always run tests before committing. Never push to main; \
                   we need to document every flag. Please keep the changelog short.";

    c.bench_function("merge_full_document_with_rules_and_files", |b| {
        b.iter(|| {
            let report = merge_document(MergeRequest {
                existing: Some(&document),
                snapshot: snapshot.clone(),
                changed_files: vec!["src/lib.rs".to_string(), "README.md".to_string()],
                summary: "Added the merge entry point",
                message,
                now: OffsetDateTime::UNIX_EPOCH,
            });
            if let Err(err) = report {
                panic!("merge benchmark failed: {err}");
            }
        });
    });

    c.bench_function("extract_rules_multi_sentence_message", |b| {
        b.iter(|| extract_rules(message));
    });
}

criterion_group!(merge_benches, bench_parse_render, bench_merge);
criterion_main!(merge_benches);
