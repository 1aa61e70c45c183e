use std::collections::HashMap;
use std::fs;
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;

/// The marker embedded next to every exported clipping. These markers, read
/// back out of the vault's Markdown files, are the tool's entire persistent
/// state; there is no separate manifest or database.
pub static RE_IDENTITY_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"<a href="kindle:([a-f0-9]{8})"></a>"#).unwrap());

/// Format the marker for an identity, inverse of [`RE_IDENTITY_MARKER`].
pub fn identity_marker(identity: &str) -> String {
    format!("<a href=\"kindle:{identity}\"></a>")
}

/// Rebuild the identity → filename index from every Markdown file directly
/// inside the output directory (non-recursive).
///
/// A missing directory is a first run and yields an empty index. A file that
/// cannot be read is warned about through the log sink and skipped; its
/// identities are simply treated as not yet exported.
pub fn scan_existing_identities(
    output_dir: &Path,
    log: &mut dyn FnMut(&str),
) -> HashMap<String, String> {
    let mut index = HashMap::new();

    let Ok(entries) = fs::read_dir(output_dir) else {
        return index;
    };

    for entry in entries.flatten() {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if !name.ends_with(".md") {
            continue;
        }
        match fs::read_to_string(entry.path()) {
            Ok(text) => {
                for caps in RE_IDENTITY_MARKER.captures_iter(&text) {
                    index.insert(caps[1].to_string(), name.to_string());
                }
            }
            Err(err) => log(&format!("Warning: could not read {name}: {err}")),
        }
    }

    index
}
