use std::collections::HashMap;
use std::fs;
use std::path::Path;

use chrono::NaiveDateTime;
use eyre::{Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use sha2::{Digest, Sha256};

/// Boundary between records in `My Clippings.txt`: ten equals signs on a line
/// of their own. The split is a plain substring split, matching how every
/// Kindle firmware emits the file.
pub const BOUNDARY: &str = "==========";

/// Body the device substitutes once a book's DRM clipping quota is exhausted.
/// Records carrying it hold no usable text and are dropped.
const CLIPPING_LIMIT_MESSAGE: &str = "You have reached the clipping limit for this item";

static RE_TITLE_AUTHOR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(.+)\s*\(([^)]+)\)\s*$").unwrap());

// The metadata line varies by firmware and locale: the page group, the
// location group, and the separators between them are all optional. Only the
// leading "- Your <Type>" and the trailing "Added on <date>" are stable.
static RE_INFO: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^- Your (Highlight|Note|Bookmark).*?(?:on page (\d+))?\s*\|?\s*(?:Location (\d+(?:-\d+)?))?\s*\|\s*Added on (.+)$",
    )
    .unwrap()
});

static RE_LOCATION_RANGE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d+)-(\d+)").unwrap());
static RE_LOCATION_SINGLE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d+)").unwrap());

/// Date formats observed across Kindle firmwares. US devices write
/// "Tuesday, July 14, 2020 11:33:02 PM"; UK/EU devices write
/// "Friday, 14 August 2020 23:33:02"; some firmwares drop the weekday.
const DATE_FORMATS: &[&str] = &[
    "%A, %B %d, %Y %I:%M:%S %p",
    "%A, %d %B %Y %H:%M:%S",
    "%B %d, %Y %I:%M:%S %p",
    "%d %B %Y %H:%M:%S",
];

/// What kind of record a clipping is, taken verbatim from the metadata line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClippingKind {
    Highlight,
    Note,
    Bookmark,
}

/// One parsed record from the clippings export.
///
/// `notes` stays empty until reconciliation, which nests each annotating note
/// under the highlight whose location range contains it.
#[derive(Debug, Clone)]
pub struct Clipping {
    pub kind: ClippingKind,
    /// Body text with interior newlines preserved and surrounding blank
    /// lines stripped.
    pub content: String,
    /// 8-hex-char content digest; the unit of dedup across syncs.
    pub identity: String,
    pub page: Option<u32>,
    pub loc_start: Option<u32>,
    pub loc_end: Option<u32>,
    /// Device-local wall-clock time; absent when the date text is unparsable.
    pub date: Option<NaiveDateTime>,
    pub notes: Vec<Clipping>,
}

/// All clippings of one book, in parse order.
///
/// Books are keyed by the exact title string. Two segments sharing a title
/// but naming different authors collapse into one book and the last-seen
/// author wins; Kindle itself produces such pairs when a book is re-imported
/// with different metadata, so this stays as-is.
#[derive(Debug, Clone)]
pub struct Book {
    pub title: String,
    pub author: String,
    pub clippings: Vec<Clipping>,
}

/// Derive the stable 8-hex-char identity for a clipping body.
///
/// Computed over the trimmed text, so surrounding whitespace never changes
/// the identity. SHA-256 truncated to 8 hex chars is plenty for the few
/// thousand clippings a device accumulates.
pub fn content_identity(content: &str) -> String {
    let digest = Sha256::digest(content.trim().as_bytes());
    hex::encode(digest)[..8].to_string()
}

/// Parse a clippings export file into books, in first-seen order.
///
/// The only fatal failure is being unable to read the file. Individual
/// malformed segments are dropped silently: the export format drifts between
/// firmware versions and a single garbled record must never abort a sync.
pub fn parse_clippings(path: &Path) -> Result<Vec<Book>> {
    let raw = fs::read_to_string(path)
        .wrap_err_with(|| format!("Failed to read clippings file: {}", path.display()))?;
    Ok(parse_clippings_text(&raw))
}

/// Parse raw export text. Split out from [`parse_clippings`] so the segment
/// logic is testable without touching the filesystem.
pub fn parse_clippings_text(raw: &str) -> Vec<Book> {
    // Kindle writes a UTF-8 BOM and CRLF line endings; normalize both before
    // any line handling.
    let raw = raw.replace('\u{feff}', "").replace("\r\n", "\n");

    let mut books: Vec<Book> = Vec::new();
    let mut by_title: HashMap<String, usize> = HashMap::new();

    for segment in raw.split(BOUNDARY) {
        let Some((title, author, clipping)) = parse_segment(segment) else {
            continue;
        };
        match by_title.get(&title) {
            Some(&idx) => {
                let book = &mut books[idx];
                book.author = author;
                book.clippings.push(clipping);
            }
            None => {
                by_title.insert(title.clone(), books.len());
                books.push(Book {
                    title,
                    author,
                    clippings: vec![clipping],
                });
            }
        }
    }

    books
}

/// Parse one raw segment into `(title, author, clipping)`.
///
/// Returns `None` for anything that should be skipped: blank segments,
/// segments missing the title or metadata line, metadata that doesn't match
/// any known firmware layout, bookmarks, empty bodies, and DRM-limit stubs.
fn parse_segment(segment: &str) -> Option<(String, String, Clipping)> {
    let segment = segment.trim();
    if segment.is_empty() {
        return None;
    }

    let lines: Vec<&str> = segment.split('\n').collect();

    let title_idx = lines.iter().position(|l| !l.trim().is_empty())?;
    let info_idx = lines
        .iter()
        .enumerate()
        .skip(title_idx + 1)
        .find(|(_, l)| !l.trim().is_empty())
        .map(|(i, _)| i)?;

    let title_line = lines[title_idx].trim();
    let info_line = lines[info_idx].trim();

    let (title, author) = match RE_TITLE_AUTHOR.captures(title_line) {
        Some(caps) => (caps[1].trim().to_string(), caps[2].trim().to_string()),
        None => (title_line.to_string(), "Unknown".to_string()),
    };

    let info = RE_INFO.captures(info_line)?;

    let kind = match info[1].to_lowercase().as_str() {
        "highlight" => ClippingKind::Highlight,
        "note" => ClippingKind::Note,
        _ => ClippingKind::Bookmark,
    };
    // Bookmarks carry no body and are never written anywhere.
    if kind == ClippingKind::Bookmark {
        return None;
    }

    let page = info.get(2).and_then(|m| m.as_str().parse().ok());
    let (loc_start, loc_end) = parse_location(info.get(3).map(|m| m.as_str()));
    let date = parse_added_date(&info[4]);

    // Body: everything after the metadata line, outer blank lines stripped,
    // interior blank lines kept verbatim (multi-paragraph notes rely on it).
    let mut body = &lines[info_idx + 1..];
    while body.first().is_some_and(|l| l.trim().is_empty()) {
        body = &body[1..];
    }
    while body.last().is_some_and(|l| l.trim().is_empty()) {
        body = &body[..body.len() - 1];
    }
    let content = body.join("\n");

    if content.is_empty() || content.contains(CLIPPING_LIMIT_MESSAGE) {
        return None;
    }

    let identity = content_identity(&content);

    Some((
        title,
        author,
        Clipping {
            kind,
            content,
            identity,
            page,
            loc_start,
            loc_end,
            date,
            notes: Vec::new(),
        },
    ))
}

/// `N-M` → `(N, M)`; bare `N` → `(N, N)`; anything else → absent.
fn parse_location(location: Option<&str>) -> (Option<u32>, Option<u32>) {
    let Some(location) = location else {
        return (None, None);
    };
    if let Some(caps) = RE_LOCATION_RANGE.captures(location) {
        let start = caps[1].parse().ok();
        let end = caps[2].parse().ok();
        return (start, end);
    }
    if let Some(caps) = RE_LOCATION_SINGLE.captures(location) {
        let start: Option<u32> = caps[1].parse().ok();
        return (start, start);
    }
    (None, None)
}

/// Try the known firmware date layouts; an unparsable date degrades to
/// `None` rather than dropping the record.
fn parse_added_date(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
}
