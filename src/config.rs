use std::fs;
use std::path::{Path, PathBuf};

use eyre::{Context, Result, eyre};
use serde::{Deserialize, Serialize};

/// Settings consumed by the sync core.
///
/// This is a plain value: the core never reads the environment or the
/// filesystem for configuration. The binary builds one from the optional
/// config file plus CLI flags; library callers can construct it directly.
#[derive(Debug, Clone, Serialize)]
pub struct SyncConfig {
    /// Books with at least this many highlights get their own file.
    pub min_highlights_for_own_file: usize,
    /// Shared file for books below the threshold.
    pub short_notes_filename: String,
    /// Tag applied to every generated file.
    pub default_tag: String,
    /// Extra tag on the shared short-notes file.
    pub short_notes_tag: String,
    /// Subfolder (inside the output directory) for import logs.
    pub import_log_folder: String,
    /// Whether to write a per-run import log.
    pub create_import_log: bool,
    /// Whether book frontmatter carries an `author:` field.
    pub include_author: bool,
    /// Whether frontmatter carries a `tags:` list.
    pub include_tags: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            min_highlights_for_own_file: 3,
            short_notes_filename: "Short Notes.md".to_string(),
            default_tag: "books".to_string(),
            short_notes_tag: "short-notes".to_string(),
            import_log_folder: "Import Logs".to_string(),
            create_import_log: true,
            include_author: true,
            include_tags: true,
        }
    }
}

/// On-disk config file schema (TOML). Every key is optional; missing keys
/// fall back to the defaults above.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    pub paths: PathsSection,
    pub output: OutputSection,
    pub frontmatter: FrontmatterSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct PathsSection {
    /// Input file, usually the device's `documents/My Clippings.txt`.
    pub kindle_clippings: Option<PathBuf>,
    /// Vault directory the Markdown files go into.
    pub output_directory: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct OutputSection {
    pub min_highlights_for_own_file: Option<usize>,
    pub short_notes_filename: Option<String>,
    pub default_tag: Option<String>,
    pub short_notes_tag: Option<String>,
    pub import_log_folder: Option<String>,
    pub create_import_log: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct FrontmatterSection {
    pub include_author: Option<bool>,
    pub include_tags: Option<bool>,
}

impl ConfigFile {
    /// Collapse the optional file sections onto the built-in defaults.
    pub fn sync_config(&self) -> SyncConfig {
        let defaults = SyncConfig::default();
        SyncConfig {
            min_highlights_for_own_file: self
                .output
                .min_highlights_for_own_file
                .unwrap_or(defaults.min_highlights_for_own_file),
            short_notes_filename: self
                .output
                .short_notes_filename
                .clone()
                .unwrap_or(defaults.short_notes_filename),
            default_tag: self.output.default_tag.clone().unwrap_or(defaults.default_tag),
            short_notes_tag: self
                .output
                .short_notes_tag
                .clone()
                .unwrap_or(defaults.short_notes_tag),
            import_log_folder: self
                .output
                .import_log_folder
                .clone()
                .unwrap_or(defaults.import_log_folder),
            create_import_log: self
                .output
                .create_import_log
                .unwrap_or(defaults.create_import_log),
            include_author: self
                .frontmatter
                .include_author
                .unwrap_or(defaults.include_author),
            include_tags: self.frontmatter.include_tags.unwrap_or(defaults.include_tags),
        }
    }
}

/// Default config location: `<config dir>/kindle-vault-sync/config.toml`.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("kindle-vault-sync/config.toml"))
}

/// Load the config file, if any.
///
/// An explicit path must exist; the default path is used only when present.
/// No file at all is fine and yields an all-defaults [`ConfigFile`].
pub fn load_config_file(explicit_path: Option<&Path>) -> Result<ConfigFile> {
    let path = if let Some(p) = explicit_path {
        if !p.exists() {
            return Err(eyre!("Config file not found: {}", p.display()));
        }
        Some(p.to_path_buf())
    } else {
        default_config_path().filter(|p| p.exists())
    };

    match path {
        None => Ok(ConfigFile::default()),
        Some(p) => {
            let content = fs::read_to_string(&p)
                .wrap_err_with(|| format!("Failed to read config: {}", p.display()))?;
            toml::from_str(&content)
                .wrap_err_with(|| format!("Failed to parse config: {}", p.display()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_values() {
        let cfg = SyncConfig::default();
        assert_eq!(cfg.min_highlights_for_own_file, 3);
        assert_eq!(cfg.short_notes_filename, "Short Notes.md");
        assert_eq!(cfg.default_tag, "books");
        assert_eq!(cfg.short_notes_tag, "short-notes");
        assert_eq!(cfg.import_log_folder, "Import Logs");
        assert!(cfg.create_import_log);
        assert!(cfg.include_author);
        assert!(cfg.include_tags);
    }

    #[test]
    fn missing_keys_fall_back_to_defaults() {
        let file: ConfigFile = toml::from_str(
            r#"
            [output]
            min_highlights_for_own_file = 5

            [frontmatter]
            include_author = false
            "#,
        )
        .unwrap();
        let cfg = file.sync_config();
        assert_eq!(cfg.min_highlights_for_own_file, 5);
        assert!(!cfg.include_author);
        // Everything not named keeps its default.
        assert_eq!(cfg.short_notes_filename, "Short Notes.md");
        assert!(cfg.include_tags);
    }

    #[test]
    fn empty_file_parses_to_all_defaults() {
        let file: ConfigFile = toml::from_str("").unwrap();
        assert!(file.paths.kindle_clippings.is_none());
        assert_eq!(file.sync_config().default_tag, "books");
    }

    #[test]
    fn paths_section_is_read() {
        let file: ConfigFile = toml::from_str(
            r#"
            [paths]
            kindle_clippings = "/media/kindle/documents/My Clippings.txt"
            output_directory = "/home/me/vault/Books"
            "#,
        )
        .unwrap();
        assert!(file.paths.kindle_clippings.is_some());
        assert!(file.paths.output_directory.is_some());
    }
}
