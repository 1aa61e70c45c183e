use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Local;
use eyre::{Context, Result};
use serde::Serialize;

use crate::config::SyncConfig;
use crate::parser::{Book, Clipping};
use crate::reconcile::link_notes_to_highlights;
use crate::scan::identity_marker;

/// A book's newly written clippings, collected for the import log.
#[derive(Debug)]
pub struct NewEntry {
    pub title: String,
    pub author: String,
    pub clippings: Vec<Clipping>,
}

#[derive(Serialize)]
struct BookFrontmatter {
    #[serde(skip_serializing_if = "Option::is_none")]
    author: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tags: Option<Vec<String>>,
}

#[derive(Serialize)]
struct ImportLogFrontmatter {
    imported: String,
    total_new: usize,
    books: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    tags: Option<Vec<String>>,
}

/// Build a filesystem-safe filename stem from a book title.
///
/// Keeps the title human-readable (spaces and case preserved, unlike a slug)
/// so the vault note carries the book's name. Strips the characters the
/// usual filesystems reject, trims edge whitespace and dots, and truncates
/// over-long titles at a word boundary.
pub fn sanitize_filename(title: &str) -> String {
    const MAX_LEN: usize = 128;

    let clean: String = title
        .chars()
        .filter(|c| !matches!(c, '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*'))
        .filter(|c| !c.is_control())
        .collect();
    let clean = clean.trim().trim_matches('.');

    if clean.chars().count() <= MAX_LEN {
        return clean.to_string();
    }
    let truncated: String = clean.chars().take(MAX_LEN).collect();
    match truncated.rfind(' ') {
        Some(pos) => truncated[..pos].to_string(),
        None => truncated,
    }
}

/// Serialize frontmatter between `---` fences, the same YAML shape Obsidian
/// reads. An all-empty frontmatter still gets its fences, just no body.
fn push_frontmatter<T: Serialize>(lines: &mut Vec<String>, frontmatter: &T) -> Result<()> {
    let yaml =
        serde_yaml::to_string(frontmatter).wrap_err("Failed to serialize frontmatter")?;
    lines.push("---".to_string());
    if yaml.trim() != "{}" {
        lines.extend(yaml.lines().map(str::to_string));
    }
    lines.push("---".to_string());
    lines.push(String::new());
    Ok(())
}

/// One clipping block: separator, identity marker, body, then each nested
/// note as a marker plus quoted text.
fn push_clipping_block(lines: &mut Vec<String>, clipping: &Clipping) {
    lines.push("---".to_string());
    lines.push(identity_marker(&clipping.identity));
    lines.push(clipping.content.clone());
    for note in &clipping.notes {
        lines.push(identity_marker(&note.identity));
        lines.push(format!("> {}", note.content));
    }
    lines.push(String::new());
}

/// Drop clippings whose identity was already exported; independently prune
/// already-exported nested notes from the survivors.
fn filter_new(
    clippings: Vec<Clipping>,
    existing: &HashMap<String, String>,
) -> Vec<Clipping> {
    let mut new = Vec::new();
    for mut clipping in clippings {
        clipping.notes.retain(|n| !existing.contains_key(&n.identity));
        if !existing.contains_key(&clipping.identity) {
            new.push(clipping);
        }
    }
    new
}

/// Append rendered lines to `path`, creating it (and the output directory)
/// on first contact. Existing bytes are never rewritten; an append is
/// separated from the previous content by a single newline.
fn append_or_create(
    path: &Path,
    output_dir: &Path,
    file_exists: bool,
    lines: &[String],
) -> Result<()> {
    fs::create_dir_all(output_dir).wrap_err_with(|| {
        format!("Failed to create output directory: {}", output_dir.display())
    })?;
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .wrap_err_with(|| format!("Failed to open {}", path.display()))?;
    if file_exists {
        file.write_all(b"\n")
            .wrap_err_with(|| format!("Failed to append to {}", path.display()))?;
    }
    file.write_all(lines.join("\n").as_bytes())
        .wrap_err_with(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

/// Write (or append) one book's own Markdown file.
///
/// Returns the clippings actually written, reconciled and filtered against
/// the existing-identity index. An empty return means the file was neither
/// created nor touched.
pub fn write_book_file(
    book: &Book,
    output_dir: &Path,
    existing: &HashMap<String, String>,
    config: &SyncConfig,
    dry_run: bool,
    log: &mut dyn FnMut(&str),
) -> Result<Vec<Clipping>> {
    let clippings = link_notes_to_highlights(book.clippings.clone());
    let new_clippings = filter_new(clippings, existing);
    if new_clippings.is_empty() {
        return Ok(new_clippings);
    }

    let filename = format!("{}.md", sanitize_filename(&book.title));
    let path = output_dir.join(&filename);
    let file_exists = path.is_file();

    let mut lines = Vec::new();
    if !file_exists {
        push_frontmatter(
            &mut lines,
            &BookFrontmatter {
                author: config.include_author.then(|| book.author.clone()),
                tags: config.include_tags.then(|| vec![config.default_tag.clone()]),
            },
        )?;
    }
    for clipping in &new_clippings {
        push_clipping_block(&mut lines, clipping);
    }
    lines.push("---".to_string());

    if !dry_run {
        append_or_create(&path, output_dir, file_exists, &lines)?;
    }
    log(&format!("  {}: {} new", book.title, new_clippings.len()));

    Ok(new_clippings)
}

/// Write (or append) the shared short-notes file for books below the
/// own-file threshold. Each contributing book gets a `##` heading, an italic
/// author byline, and the usual clipping blocks.
///
/// Returns one [`NewEntry`] per book that contributed something.
pub fn write_short_notes_file(
    books: &[&Book],
    output_dir: &Path,
    existing: &HashMap<String, String>,
    config: &SyncConfig,
    dry_run: bool,
    log: &mut dyn FnMut(&str),
) -> Result<Vec<NewEntry>> {
    let path = output_dir.join(&config.short_notes_filename);
    let file_exists = path.is_file();

    let mut lines = Vec::new();
    if !file_exists {
        push_frontmatter(
            &mut lines,
            &BookFrontmatter {
                author: None,
                tags: config.include_tags.then(|| {
                    vec![config.default_tag.clone(), config.short_notes_tag.clone()]
                }),
            },
        )?;
    }

    let mut entries: Vec<NewEntry> = Vec::new();
    let mut total_new = 0;
    for book in books {
        let clippings = link_notes_to_highlights(book.clippings.clone());
        let new_clippings = filter_new(clippings, existing);
        if new_clippings.is_empty() {
            continue;
        }
        total_new += new_clippings.len();

        lines.push(format!("## {}", book.title));
        lines.push(format!("*{}*", book.author));
        lines.push(String::new());
        for clipping in &new_clippings {
            push_clipping_block(&mut lines, clipping);
        }
        lines.push("---".to_string());
        lines.push(String::new());

        entries.push(NewEntry {
            title: book.title.clone(),
            author: book.author.clone(),
            clippings: new_clippings,
        });
    }

    // Nothing new anywhere: leave the file alone (and never create an
    // empty frontmatter-only file).
    if entries.is_empty() {
        return Ok(entries);
    }

    if !dry_run {
        append_or_create(&path, output_dir, file_exists, &lines)?;
    }
    log(&format!(
        "  {}: {} new from {} books",
        config.short_notes_filename,
        total_new,
        entries.len()
    ));

    Ok(entries)
}

/// Write a timestamped import log summarizing this run's new clippings.
///
/// The log is plain reading material: bodies and quoted notes only, no
/// identity markers, so the existing-state scan (which only looks at the
/// top-level directory anyway) can never mistake it for exported state.
/// Returns the log path, or `None` when there was nothing new.
pub fn write_import_log(
    entries: &[NewEntry],
    output_dir: &Path,
    config: &SyncConfig,
    dry_run: bool,
    log: &mut dyn FnMut(&str),
) -> Result<Option<PathBuf>> {
    let total_new: usize = entries.iter().map(|e| e.clippings.len()).sum();
    if total_new == 0 {
        return Ok(None);
    }

    let now = Local::now();
    let log_dir = output_dir.join(&config.import_log_folder);
    let filename = format!("Import {}.md", now.format("%Y-%m-%d %H-%M-%S"));
    let path = log_dir.join(&filename);

    let mut lines = Vec::new();
    push_frontmatter(
        &mut lines,
        &ImportLogFrontmatter {
            imported: now.format("%Y-%m-%d %H:%M:%S").to_string(),
            total_new,
            books: entries.len(),
            tags: config.include_tags.then(|| vec!["import-log".to_string()]),
        },
    )?;
    lines.push(format!("# Import Log - {}", now.format("%B %d, %Y at %H:%M")));
    lines.push(String::new());
    lines.push(format!(
        "**{} new highlights** from **{} books**",
        total_new,
        entries.len()
    ));
    lines.push(String::new());

    let mut sorted: Vec<&NewEntry> = entries.iter().collect();
    sorted.sort_by(|a, b| a.title.cmp(&b.title));
    for entry in sorted {
        lines.push(format!("## {}", entry.title));
        lines.push(format!("*{}*", entry.author));
        lines.push(String::new());
        for clipping in &entry.clippings {
            lines.push("---".to_string());
            lines.push(clipping.content.clone());
            for note in &clipping.notes {
                lines.push(format!("> {}", note.content));
            }
            lines.push(String::new());
        }
        lines.push("---".to_string());
        lines.push(String::new());
    }

    if !dry_run {
        fs::create_dir_all(&log_dir).wrap_err_with(|| {
            format!("Failed to create import log folder: {}", log_dir.display())
        })?;
        fs::write(&path, lines.join("\n"))
            .wrap_err_with(|| format!("Failed to write import log: {}", path.display()))?;
    }
    log(&format!("Import log: {filename}"));

    Ok(Some(path))
}
