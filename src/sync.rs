use std::path::{Path, PathBuf};

use eyre::Result;

use crate::config::SyncConfig;
use crate::parser::{self, Book, ClippingKind};
use crate::scan::scan_existing_identities;
use crate::writer::{self, NewEntry};

/// Outcome of one sync run.
#[derive(Debug, Clone, Default)]
pub struct SyncSummary {
    /// Books seen in the clippings file.
    pub total_books: usize,
    /// Clippings newly written this run.
    pub new_highlights: usize,
    /// Books routed to their own file.
    pub own_file_books: usize,
    /// Books routed to the shared short-notes file.
    pub aggregate_books: usize,
    /// Import log written this run, if any.
    pub import_log: Option<PathBuf>,
}

/// Run one full sync: parse the export, reconcile each book, scan the vault
/// for already-exported identities, and append whatever is new.
///
/// Fails only when the clippings file cannot be read. Everything else is
/// absorbed: malformed segments are skipped during parsing, unreadable vault
/// files are warned about and treated as holding nothing.
///
/// With `dry_run` the computation and the log narrative are identical but no
/// filesystem writes of any kind happen.
///
/// The output directory is read once and then only appended to. Concurrent
/// invocations against the same directory are out of contract and may
/// interleave appends.
pub fn sync_highlights(
    input_path: &Path,
    output_dir: &Path,
    config: &SyncConfig,
    dry_run: bool,
    log: &mut dyn FnMut(&str),
) -> Result<SyncSummary> {
    log("Parsing clippings file...");
    let books = parser::parse_clippings(input_path)?;
    log(&format!("Found {} books", books.len()));

    log("Scanning existing files...");
    let existing = scan_existing_identities(output_dir, log);
    log(&format!("Found {} existing highlights", existing.len()));

    let min = config.min_highlights_for_own_file;
    let mut own_file_books: Vec<&Book> = Vec::new();
    let mut aggregate_books: Vec<&Book> = Vec::new();
    for book in &books {
        let highlights = book
            .clippings
            .iter()
            .filter(|c| c.kind == ClippingKind::Highlight)
            .count();
        if highlights >= min {
            own_file_books.push(book);
        } else {
            aggregate_books.push(book);
        }
    }
    log(&format!("Books with {min}+ highlights: {}", own_file_books.len()));
    log(&format!("Books with <{min} highlights: {}", aggregate_books.len()));
    log("");

    // Own-file books are processed alphabetically; aggregate books keep the
    // order they first appeared in the export.
    own_file_books.sort_by(|a, b| a.title.cmp(&b.title));

    let mut new_entries: Vec<NewEntry> = Vec::new();
    let mut total_new = 0;

    if !own_file_books.is_empty() {
        log("Processing book files:");
        for book in &own_file_books {
            let new_clippings =
                writer::write_book_file(book, output_dir, &existing, config, dry_run, log)?;
            total_new += new_clippings.len();
            if !new_clippings.is_empty() {
                new_entries.push(NewEntry {
                    title: book.title.clone(),
                    author: book.author.clone(),
                    clippings: new_clippings,
                });
            }
        }
        log("");
    }

    if !aggregate_books.is_empty() {
        log("Processing short notes:");
        let entries = writer::write_short_notes_file(
            &aggregate_books,
            output_dir,
            &existing,
            config,
            dry_run,
            log,
        )?;
        total_new += entries.iter().map(|e| e.clippings.len()).sum::<usize>();
        new_entries.extend(entries);
        log("");
    }

    let mut import_log = None;
    if !new_entries.is_empty() && config.create_import_log {
        log("Creating import log:");
        import_log =
            writer::write_import_log(&new_entries, output_dir, config, dry_run, log)?;
        log("");
    }

    log(&format!("Done! Added {total_new} new highlights."));

    Ok(SyncSummary {
        total_books: books.len(),
        new_highlights: total_new,
        own_file_books: own_file_books.len(),
        aggregate_books: aggregate_books.len(),
        import_log,
    })
}
