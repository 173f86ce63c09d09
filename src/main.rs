//! costpatch - mass running-cost patcher for NML train set sources
//!
//! CLI entry point. A run has three stages, each skippable from the command
//! line:
//!
//! 1. **Copy**: rebuild the target tree from the pristine source checkout,
//!    deleting the stale tree with retry-on-lock semantics first.
//! 2. **Prepare**: insert the running cost parameter blocks, the coach
//!    loading-speed define, and the language string table.
//! 3. **Transform**: walk every markup file, apply the rewrite rule sequence,
//!    and append generated cost switches to the companion graphics files.
//!
//! The run-end summary is logged for whatever completed, even when a stage
//! aborts partway.

use anyhow::{Context, Result, bail};
use camino::Utf8PathBuf;
use clap::Parser;
use costpatch::config::ConfigManager;
use costpatch::models::RunReport;
use costpatch::services::{PrepareService, TransformEngine, fsops};
use costpatch::{APP_NAME, VERSION};
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "costpatch", version, about = "Mass running-cost patcher for NML train set sources")]
struct Cli {
    /// Path to the YAML configuration file
    #[arg(short, long, default_value = "costpatch.yaml")]
    config: Utf8PathBuf,

    /// Skip rebuilding the target tree from the source checkout
    #[arg(long)]
    skip_copy: bool,

    /// Skip the one-time parameter/define/language preparation stage
    #[arg(long)]
    skip_prepare: bool,

    /// Override how many of the largest cost factors to report
    #[arg(long)]
    top: Option<usize>,

    /// Log at debug level
    #[arg(long)]
    debug: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let _guard = costpatch::logging::setup_logging("logs", "costpatch", cli.debug, true)?;
    tracing::info!("Starting {} v{}", APP_NAME, VERSION);

    let config = ConfigManager::new(&cli.config).load()?;
    let settings = &config.settings;

    let timeout = Duration::from_millis(settings.retry_timeout_ms);
    let interval = Duration::from_millis(settings.retry_interval_ms);
    let target = Utf8PathBuf::from(&settings.target_dir);

    if !cli.skip_copy {
        if settings.source_dir.trim().is_empty() {
            bail!(
                "no source directory configured; set 'Source Dir' in {} or pass --skip-copy",
                cli.config
            );
        }
        let source = Utf8PathBuf::from(&settings.source_dir);
        tracing::info!("Copying sources from '{}' to '{}'", source, target);

        if !fsops::remove_directory_tree(&target, true, true, timeout, interval)? {
            bail!("timed out deleting the stale target tree '{target}'");
        }
        if !fsops::ensure_directory(&target, timeout, interval)? {
            bail!("timed out creating the target directory '{target}'");
        }
        for entry in &settings.copy_entries {
            let copied = fsops::copy_entry(&source.join(entry), &target.join(entry), timeout, interval)
                .with_context(|| format!("Failed to copy '{entry}'"))?;
            tracing::info!("Copied '{}' ({} files)", entry, copied);
        }
    }

    if !cli.skip_prepare {
        PrepareService::new(config.categories.clone()).run(&target, settings)?;
    }

    let engine = TransformEngine::new(&config.categories, &settings.markup_extension)?;
    let mut report = RunReport::new();
    let result = engine.run(&target, &mut report, |done, total| {
        tracing::debug!("Processed {}/{} files", done, total);
    });

    // Covers whatever completed, even when the pass aborted mid-file.
    report.log_summary(cli.top.unwrap_or(settings.report_top));

    result
}
