//! # kindle-vault-sync
//!
//! A CLI tool that syncs Kindle highlights and notes into per-book Markdown
//! files for a personal knowledge-management vault (Obsidian or anything
//! else that reads plain Markdown with YAML frontmatter).
//!
//! ## What it does
//!
//! Every Kindle keeps a plain-text export of your highlights, notes and
//! bookmarks at `documents/My Clippings.txt`. This tool parses that file,
//! groups records by book, nests each note under the highlight it annotates,
//! and writes the result into your vault: books with enough highlights get
//! their own file, the rest share a `Short Notes.md`.
//!
//! The clippings file is only ever read; your device is never modified.
//!
//! ## Incremental sync
//!
//! Each exported clipping carries an invisible identity marker
//! (`<a href="kindle:…"></a>`, an 8-hex-char content hash). On every run the
//! output directory is re-scanned for these markers, and only clippings whose
//! identity has never been written are appended. The Markdown files
//! themselves are the complete sync state; there is no database, and files
//! are never rewritten, only appended to. Re-running against the same export
//! is a no-op.
//!
//! Because the device keeps intermediate snapshots of notes as you type,
//! partial versions of the same note are collapsed to the final one before
//! anything is written.
//!
//! ## Usage
//!
//! ```sh
//! # Sync into a vault directory
//! kindle-vault-sync ~/vault/Books --input "/media/me/Kindle/documents/My Clippings.txt"
//!
//! # Preview without touching the filesystem
//! kindle-vault-sync ~/vault/Books -i clippings.txt --dry-run
//! ```
//!
//! Preferences can be persisted in `~/.config/kindle-vault-sync/config.toml`.
//!
//! ## Limitations
//!
//! The tool is single-user and single-process: concurrent runs against the
//! same output directory may interleave their appends and are not supported.

pub mod config;
pub mod parser;
pub mod reconcile;
pub mod scan;
pub mod sync;
pub mod writer;

pub use config::SyncConfig;
pub use sync::{SyncSummary, sync_highlights};
