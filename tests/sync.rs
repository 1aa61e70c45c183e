use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use kindle_vault_sync::{SyncConfig, sync_highlights};

const DATE_A: &str = "Tuesday, July 14, 2020 11:33:02 PM";
const DATE_B: &str = "Tuesday, July 14, 2020 11:40:10 PM";

fn highlight_segment(title_author: &str, loc: &str, date: &str, body: &str) -> String {
    format!(
        "{title_author}\n- Your Highlight on page 12 | Location {loc} | Added on {date}\n\n{body}\n==========\n"
    )
}

fn note_segment(title_author: &str, loc: &str, date: &str, body: &str) -> String {
    format!("{title_author}\n- Your Note | Location {loc} | Added on {date}\n\n{body}\n==========\n")
}

fn bookmark_segment(title_author: &str, loc: &str, date: &str) -> String {
    format!("{title_author}\n- Your Bookmark | Location {loc} | Added on {date}\n\n\n==========\n")
}

fn run(
    clippings: &str,
    output_dir: &Path,
    config: &SyncConfig,
    dry_run: bool,
) -> (kindle_vault_sync::SyncSummary, Vec<String>) {
    let input_dir = tempfile::tempdir().unwrap();
    let input = input_dir.path().join("My Clippings.txt");
    fs::write(&input, clippings).unwrap();

    let mut lines = Vec::new();
    let summary = sync_highlights(&input, output_dir, config, dry_run, &mut |l| {
        lines.push(l.to_string())
    })
    .unwrap();
    (summary, lines)
}

/// Snapshot every file under `dir` (recursively) as path → bytes.
fn snapshot(dir: &Path) -> BTreeMap<String, Vec<u8>> {
    let mut map = BTreeMap::new();
    if !dir.exists() {
        return map;
    }
    let mut stack = vec![dir.to_path_buf()];
    while let Some(d) = stack.pop() {
        for entry in fs::read_dir(&d).unwrap().flatten() {
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
            } else {
                let rel = path.strip_prefix(dir).unwrap().to_string_lossy().to_string();
                map.insert(rel, fs::read(&path).unwrap());
            }
        }
    }
    map
}

#[test]
fn dune_scenario_ends_up_in_the_aggregate_file() {
    let out = tempfile::tempdir().unwrap();
    let clippings = format!(
        "{}{}",
        highlight_segment(
            "Dune (Frank Herbert)",
            "100",
            DATE_A,
            "I must not fear. Fear is the mind-killer.",
        ),
        note_segment("Dune (Frank Herbert)", "100", DATE_B, "key theme"),
    );

    let (summary, _) = run(&clippings, out.path(), &SyncConfig::default(), false);
    assert_eq!(summary.total_books, 1);
    assert_eq!(summary.own_file_books, 0);
    assert_eq!(summary.aggregate_books, 1);
    // One reconciled top-level item: the highlight, with the note nested.
    assert_eq!(summary.new_highlights, 1);

    let text = fs::read_to_string(out.path().join("Short Notes.md")).unwrap();
    assert!(text.contains("## Dune"));
    assert!(text.contains("*Frank Herbert*"));
    assert!(text.contains("I must not fear. Fear is the mind-killer."));
    assert!(text.contains("> key theme"));
    // No dedicated file was created for the book.
    assert!(!out.path().join("Dune.md").exists());
}

#[test]
fn second_run_adds_nothing_and_changes_no_bytes() {
    let out = tempfile::tempdir().unwrap();
    let clippings = format!(
        "{}{}{}{}",
        highlight_segment("Dune (Frank Herbert)", "100-110", DATE_A, "first passage"),
        highlight_segment("Dune (Frank Herbert)", "200-210", DATE_A, "second passage"),
        highlight_segment("Dune (Frank Herbert)", "300-310", DATE_A, "third passage"),
        note_segment("Dune (Frank Herbert)", "105", DATE_B, "a thought"),
    );

    let (first, _) = run(&clippings, out.path(), &SyncConfig::default(), false);
    assert_eq!(first.new_highlights, 3);
    assert!(out.path().join("Dune.md").exists());
    let before = snapshot(out.path());
    assert!(!before.is_empty());

    let (second, _) = run(&clippings, out.path(), &SyncConfig::default(), false);
    assert_eq!(second.new_highlights, 0);
    assert!(second.import_log.is_none());
    assert_eq!(snapshot(out.path()), before);
}

#[test]
fn growing_export_appends_only_the_new_clipping() {
    let out = tempfile::tempdir().unwrap();
    let base = format!(
        "{}{}{}",
        highlight_segment("Dune (Frank Herbert)", "100-110", DATE_A, "first passage"),
        highlight_segment("Dune (Frank Herbert)", "200-210", DATE_A, "second passage"),
        highlight_segment("Dune (Frank Herbert)", "300-310", DATE_A, "third passage"),
    );
    run(&base, out.path(), &SyncConfig::default(), false);
    let before = fs::read_to_string(out.path().join("Dune.md")).unwrap();

    let grown = format!(
        "{base}{}",
        highlight_segment("Dune (Frank Herbert)", "400-410", DATE_B, "fourth passage"),
    );
    let (summary, _) = run(&grown, out.path(), &SyncConfig::default(), false);
    assert_eq!(summary.new_highlights, 1);

    let after = fs::read_to_string(out.path().join("Dune.md")).unwrap();
    assert!(after.starts_with(&before));
    assert_eq!(after.matches("first passage").count(), 1);
    assert!(after.contains("fourth passage"));
}

#[test]
fn threshold_routes_three_to_own_file_and_two_to_aggregate() {
    let out = tempfile::tempdir().unwrap();
    let clippings = format!(
        "{}{}{}{}{}",
        highlight_segment("Three Highlights (A. Uthor)", "10", DATE_A, "one"),
        highlight_segment("Three Highlights (A. Uthor)", "20", DATE_A, "two"),
        highlight_segment("Three Highlights (A. Uthor)", "30", DATE_A, "three"),
        highlight_segment("Two Highlights (B. Uthor)", "10", DATE_A, "four"),
        highlight_segment("Two Highlights (B. Uthor)", "20", DATE_A, "five"),
    );

    let (summary, _) = run(&clippings, out.path(), &SyncConfig::default(), false);
    assert_eq!(summary.own_file_books, 1);
    assert_eq!(summary.aggregate_books, 1);
    assert!(out.path().join("Three Highlights.md").exists());
    assert!(!out.path().join("Two Highlights.md").exists());

    let aggregate = fs::read_to_string(out.path().join("Short Notes.md")).unwrap();
    assert!(aggregate.contains("## Two Highlights"));
    assert!(!aggregate.contains("## Three Highlights"));
}

#[test]
fn bookmarks_never_show_up_anywhere() {
    let out = tempfile::tempdir().unwrap();
    let clippings = format!(
        "{}{}",
        bookmark_segment("Dune (Frank Herbert)", "55", DATE_A),
        highlight_segment("Dune (Frank Herbert)", "100", DATE_A, "real content"),
    );

    let (summary, _) = run(&clippings, out.path(), &SyncConfig::default(), false);
    assert_eq!(summary.new_highlights, 1);
    let text = fs::read_to_string(out.path().join("Short Notes.md")).unwrap();
    assert!(text.contains("real content"));
    assert!(!text.to_lowercase().contains("bookmark"));
}

#[test]
fn partial_notes_collapse_to_the_final_version() {
    let out = tempfile::tempdir().unwrap();
    let clippings = format!(
        "{}{}{}",
        note_segment("Dune (Frank Herbert)", "100", DATE_A, "Hi"),
        note_segment("Dune (Frank Herbert)", "100", DATE_A, "Hi there"),
        note_segment("Dune (Frank Herbert)", "100", DATE_B, "Hi there!"),
    );

    let (summary, _) = run(&clippings, out.path(), &SyncConfig::default(), false);
    assert_eq!(summary.new_highlights, 1);
    let text = fs::read_to_string(out.path().join("Short Notes.md")).unwrap();
    assert!(text.contains("Hi there!"));
    assert_eq!(text.matches("Hi there").count(), 1);
}

#[test]
fn import_log_records_the_run() {
    let out = tempfile::tempdir().unwrap();
    let clippings = highlight_segment("Dune (Frank Herbert)", "100", DATE_A, "logged passage");

    let (summary, _) = run(&clippings, out.path(), &SyncConfig::default(), false);
    let log_path = summary.import_log.expect("an import log should be written");
    assert!(log_path.exists());
    let text = fs::read_to_string(&log_path).unwrap();
    assert!(text.contains("total_new: 1"));
    assert!(text.contains("## Dune"));
    assert!(text.contains("logged passage"));
    // The log holds no identity markers, so it never feeds the next scan.
    assert!(!text.contains("kindle:"));
}

#[test]
fn import_log_can_be_disabled() {
    let out = tempfile::tempdir().unwrap();
    let config = SyncConfig {
        create_import_log: false,
        ..SyncConfig::default()
    };
    let clippings = highlight_segment("Dune (Frank Herbert)", "100", DATE_A, "a passage");

    let (summary, _) = run(&clippings, out.path(), &config, false);
    assert_eq!(summary.new_highlights, 1);
    assert!(summary.import_log.is_none());
    assert!(!out.path().join("Import Logs").exists());
}

#[test]
fn dry_run_logs_like_a_live_run_but_writes_nothing() {
    // Import log disabled so the narrative carries no wall-clock timestamps.
    let config = SyncConfig {
        create_import_log: false,
        ..SyncConfig::default()
    };
    let clippings = format!(
        "{}{}",
        highlight_segment("Dune (Frank Herbert)", "100", DATE_A, "a passage"),
        note_segment("Dune (Frank Herbert)", "100", DATE_B, "a note"),
    );

    let dry_out = tempfile::tempdir().unwrap();
    let dry_dir = dry_out.path().join("vault");
    let (dry_summary, dry_lines) = run(&clippings, &dry_dir, &config, true);
    assert_eq!(dry_summary.new_highlights, 1);
    assert!(!dry_dir.exists(), "dry run must not create the output directory");

    let live_out = tempfile::tempdir().unwrap();
    let live_dir = live_out.path().join("vault");
    let (live_summary, live_lines) = run(&clippings, &live_dir, &config, false);
    assert_eq!(live_summary.new_highlights, dry_summary.new_highlights);
    assert_eq!(dry_lines, live_lines);
    assert!(live_dir.join("Short Notes.md").exists());
}

#[test]
fn unreadable_input_is_the_only_fatal_error() {
    let out = tempfile::tempdir().unwrap();
    let missing = out.path().join("nope.txt");
    let mut sink = |_: &str| {};
    let err = sync_highlights(&missing, out.path(), &SyncConfig::default(), false, &mut sink);
    assert!(err.is_err());
}

#[test]
fn notes_linked_across_runs_are_not_duplicated() {
    // A note arriving in a later export attaches to an already-exported
    // highlight; only the note is appended, and only once.
    let out = tempfile::tempdir().unwrap();
    let first = format!(
        "{}{}{}",
        highlight_segment("Dune (Frank Herbert)", "100-110", DATE_A, "alpha"),
        highlight_segment("Dune (Frank Herbert)", "200-210", DATE_A, "beta"),
        highlight_segment("Dune (Frank Herbert)", "300-310", DATE_A, "gamma"),
    );
    run(&first, out.path(), &SyncConfig::default(), false);

    let second = format!(
        "{first}{}",
        note_segment("Dune (Frank Herbert)", "400", DATE_B, "standalone thought"),
    );
    let (summary, _) = run(&second, out.path(), &SyncConfig::default(), false);
    assert_eq!(summary.new_highlights, 1);

    let (third, _) = run(&second, out.path(), &SyncConfig::default(), false);
    assert_eq!(third.new_highlights, 0);
    let text = fs::read_to_string(out.path().join("Dune.md")).unwrap();
    assert_eq!(text.matches("standalone thought").count(), 1);
}
