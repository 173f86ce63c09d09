use crate::models::{CategorySpec, RunReport};
use crate::services::rules::{FilePatch, RuleEngine, dynamic_cost_switch};
use anyhow::{Context, Result, anyhow};
use camino::{Utf8Path, Utf8PathBuf};
use ignore::WalkBuilder;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use thiserror::Error;

/// Filename suffix of the files carrying item declarations.
const ITEM_SUFFIX: &str = "item";

/// Filename suffix of the paired companion files the generated switch blocks
/// are appended to.
const COMPANION_SUFFIX: &str = "graphics";

/// Errors from the transform pass.
#[derive(Error, Debug)]
pub enum TransformError {
    #[error("No companion graphics file can be derived from '{0}'")]
    NoCompanionName(Utf8PathBuf),

    #[error("Companion graphics file missing: {0}")]
    CompanionMissing(Utf8PathBuf),
}

/// Walks the markup files under a root and applies the rewrite rule sequence
/// to each, one file at a time.
///
/// Per file: read the full text, run the rules, and when any rule fired write
/// the mutated text back and append one generated switch block per recorded
/// category to the companion graphics file. The companion must already exist;
/// a missing one aborts the run. Files where no rule fired are left untouched
/// on disk and excluded from the changed-file count.
pub struct TransformEngine {
    rules: RuleEngine,
    extension: String,
}

impl TransformEngine {
    pub fn new(categories: &[CategorySpec], extension: &str) -> Result<Self> {
        Ok(Self {
            rules: RuleEngine::new(categories)?,
            extension: extension.to_string(),
        })
    }

    /// Run the transform pass over every markup file under `root`.
    ///
    /// Statistics accumulate into `report` as files complete, so the caller
    /// can log a summary for whatever finished even when the pass aborts
    /// mid-run. `on_progress` is invoked with (done, total) after each file.
    pub fn run(
        &self,
        root: &Utf8Path,
        report: &mut RunReport,
        mut on_progress: impl FnMut(usize, usize),
    ) -> Result<()> {
        let files = self.collect_files(root)?;
        let total = files.len();
        tracing::info!("Scanning {} .{} files under '{}'", total, self.extension, root);

        for (i, file) in files.iter().enumerate() {
            report.record_scanned();
            if let Some(patch) = self.patch_file(file)? {
                report.record_outcome(
                    &patch.item_name,
                    patch.changed,
                    patch.replacements,
                    patch.largest_factor(),
                );
            }
            on_progress(i + 1, total);
        }

        Ok(())
    }

    /// Enumerate the markup files under `root`, sorted for a deterministic
    /// processing order.
    fn collect_files(&self, root: &Utf8Path) -> Result<Vec<Utf8PathBuf>> {
        let mut files = Vec::new();
        for entry in WalkBuilder::new(root).standard_filters(false).build() {
            let entry = entry.with_context(|| format!("Failed to walk '{}'", root))?;
            if !entry.file_type().is_some_and(|t| t.is_file()) {
                continue;
            }
            let path = Utf8PathBuf::from_path_buf(entry.into_path())
                .map_err(|p| anyhow!("Path is not valid UTF-8: {}", p.display()))?;
            if path.extension() == Some(self.extension.as_str()) {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    /// Apply the rule sequence to one file and persist the results.
    ///
    /// Returns `None` when the file has no item declaration. Otherwise the
    /// file is rewritten if anything matched, and the companion gets its
    /// generated blocks if any factors were recorded.
    pub fn patch_file(&self, path: &Utf8Path) -> Result<Option<FilePatch>> {
        let text =
            fs::read_to_string(path).with_context(|| format!("Failed to read '{}'", path))?;

        let Some(patch) = self.rules.apply(&text) else {
            return Ok(None);
        };

        if !patch.changed {
            return Ok(Some(patch));
        }

        fs::write(path, &patch.text).with_context(|| format!("Failed to write '{}'", path))?;

        if !patch.factors.is_empty() {
            let companion = self.companion_path(path)?;
            self.append_companion(&companion, &patch)?;
            tracing::debug!(
                item = %patch.item_name,
                companion = %companion,
                categories = patch.factors.len(),
                "appended generated cost switches"
            );
        }

        Ok(Some(patch))
    }

    /// Derive the companion path by swapping the item suffix for the graphics
    /// suffix in the filename. An item file the suffix cannot be derived from
    /// is a structural mismatch: silently skipping it would leave the tree
    /// inconsistent.
    fn companion_path(&self, path: &Utf8Path) -> Result<Utf8PathBuf, TransformError> {
        let item_suffix = format!("{ITEM_SUFFIX}.{}", self.extension);
        let name = path.file_name().unwrap_or_default();
        match name.strip_suffix(item_suffix.as_str()) {
            Some(stem) => Ok(path.with_file_name(format!(
                "{stem}{COMPANION_SUFFIX}.{}",
                self.extension
            ))),
            None => Err(TransformError::NoCompanionName(path.to_path_buf())),
        }
    }

    /// Append one generated switch block per recorded category to the
    /// companion file. The companion is opened append-only and must already
    /// exist.
    fn append_companion(&self, companion: &Utf8Path, patch: &FilePatch) -> Result<()> {
        let mut out = OpenOptions::new()
            .append(true)
            .open(companion)
            .map_err(|e| match e.kind() {
                io::ErrorKind::NotFound => {
                    anyhow::Error::from(TransformError::CompanionMissing(companion.to_path_buf()))
                }
                _ => anyhow::Error::from(e),
            })?;

        let mut block = String::new();
        for (category, factor) in &patch.factors {
            block.push_str(&dynamic_cost_switch(&patch.item_name, category, *factor));
        }

        out.write_all(block.as_bytes())
            .with_context(|| format!("Failed to append to '{}'", companion))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PatchConfig;

    fn engine() -> TransformEngine {
        TransformEngine::new(&PatchConfig::default().categories, "pnml").unwrap()
    }

    #[test]
    fn test_companion_path_derivation() {
        let e = engine();
        let companion = e
            .companion_path(Utf8Path::new("src/EMU/Settebello_item.pnml"))
            .unwrap();
        assert_eq!(companion, Utf8Path::new("src/EMU/Settebello_graphics.pnml"));
    }

    #[test]
    fn test_companion_path_requires_item_suffix() {
        let e = engine();
        let result = e.companion_path(Utf8Path::new("src/loadingspeeds.pnml"));
        assert!(matches!(result, Err(TransformError::NoCompanionName(_))));
    }
}
