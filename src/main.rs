use clap::Parser;
use eyre::{Result, eyre};
use std::path::PathBuf;

use kindle_vault_sync::config::{self, SyncConfig};
use kindle_vault_sync::sync::sync_highlights;

/// Sync Kindle highlights and notes from My Clippings.txt into a Markdown vault.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Vault directory to write book notes into.
    /// Defaults to ./kindle-vault if not set in config.
    #[arg(value_name = "OUTPUT_DIR")]
    output_dir: Option<PathBuf>,

    /// Path to the clippings export (My Clippings.txt).
    #[arg(short, long, value_name = "PATH")]
    input: Option<PathBuf>,

    /// Path to a specific configuration file.
    /// Defaults to $XDG_CONFIG_HOME/kindle-vault-sync/config.toml
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Compute and report everything without writing any files.
    #[arg(long)]
    dry_run: bool,

    /// Print the effective configuration and exit.
    #[arg(long)]
    show_config: bool,

    /// Only print the final summary.
    #[arg(short, long)]
    quiet: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // 1. Load config file (CLI path > default path)
    let file_cfg = config::load_config_file(cli.config.as_deref())?;
    let sync_cfg: SyncConfig = file_cfg.sync_config();

    // 2. Resolve output_dir (CLI > Config > Default)
    let output_dir = cli
        .output_dir
        .or_else(|| file_cfg.paths.output_directory.clone())
        .unwrap_or_else(|| PathBuf::from("kindle-vault"));

    // 3. Resolve input path (CLI > Config); no device auto-detection.
    let input_path = cli.input.or_else(|| file_cfg.paths.kindle_clippings.clone());

    if cli.show_config {
        let toml = toml::to_string_pretty(&sync_cfg)
            .map_err(|e| eyre!("Failed to render configuration: {e}"))?;
        println!("Current configuration:\n");
        print!("{toml}");
        match &input_path {
            Some(p) => println!("\nInput:  {}", p.display()),
            None => println!("\nInput:  (unset)"),
        }
        println!("Output: {}", output_dir.display());
        match cli.config.clone().or_else(config::default_config_path) {
            Some(p) => println!("Config file: {}", p.display()),
            None => println!("Config file: (no config directory on this platform)"),
        }
        return Ok(());
    }

    let input_path = input_path.ok_or_else(|| {
        eyre!(
            "No clippings file given.\nUse --input to point at My Clippings.txt, or set paths.kindle_clippings in config.toml."
        )
    })?;
    if !input_path.is_file() {
        return Err(eyre!(
            "Clippings file not found: {}\nConnect your Kindle or pass --input.",
            input_path.display()
        ));
    }

    if !cli.quiet {
        println!("Input:  {}", input_path.display());
        println!("Output: {}", output_dir.display());
        if cli.dry_run {
            println!("Mode:   DRY RUN (no files will be written)");
        }
        println!();
    }

    let quiet = cli.quiet;
    let mut log = |line: &str| {
        if !quiet {
            println!("{line}");
        }
    };

    let summary = sync_highlights(&input_path, &output_dir, &sync_cfg, cli.dry_run, &mut log)?;

    if cli.dry_run {
        println!("Would add {} new highlights", summary.new_highlights);
    } else {
        println!("Added {} new highlights", summary.new_highlights);
    }

    Ok(())
}
