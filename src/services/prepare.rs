use crate::models::{CategorySpec, PatchSettings};
use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use regex::Regex;
use std::fs::{self, OpenOptions};
use std::io::Write;
use thiserror::Error;

/// Anchor ahead of which the generated running cost parameter blocks are
/// inserted in the header file.
const PARAM_ANCHOR_PATTERN: &str = r"(?si)param \{\r?\n\s*ISCONCEPT \{.+?\}\r?\n\s*\}";

/// Anchor ahead of which the coach loading-speed define is inserted.
const LOADING_SPEED_ANCHOR_PATTERN: &str =
    r"(?m)^//\s*Intercity vehicles\r?\n#define LOADINGSPEEDDEF_INTERCITY";

const COACH_LOADING_SPEED_DEFINE: &str = "// Coaches\n\
    #define LOADINGSPEEDDEF_COACH loading_speed: isUltraSpeed ? 255 : LOADINGSPEED(12);\n\n";

const RELIABILITY_STRING_KEY: &str = "STR_PARAM_RELIABILITY_DECAY";

/// Errors from the source preparation stage.
///
/// A missing insertion anchor is fatal: silently skipping the insertion would
/// leave the source tree inconsistent with the generated references the
/// transform pass writes.
#[derive(Error, Debug)]
pub enum PrepareError {
    #[error("Could not locate the {what} anchor in '{path}'")]
    AnchorNotFound {
        what: &'static str,
        path: Utf8PathBuf,
    },
}

/// One-time source preparation before the transform pass: inserts the running
/// cost parameters into the header, the coach loading-speed define into the
/// loading-speeds file, and appends the parameter string table to every
/// language file.
pub struct PrepareService {
    categories: Vec<CategorySpec>,
    param_anchor: Regex,
    loading_speed_anchor: Regex,
}

impl PrepareService {
    pub fn new(categories: Vec<CategorySpec>) -> Self {
        Self {
            categories,
            param_anchor: Regex::new(PARAM_ANCHOR_PATTERN).expect("Invalid param anchor regex"),
            loading_speed_anchor: Regex::new(LOADING_SPEED_ANCHOR_PATTERN)
                .expect("Invalid loading speed anchor regex"),
        }
    }

    /// Run all preparation steps against the target tree.
    pub fn run(&self, target: &Utf8Path, settings: &PatchSettings) -> Result<()> {
        self.insert_cost_parameters(&target.join(&settings.header_file))?;
        self.insert_coach_loading_speed(&target.join(&settings.loading_speeds_file))?;
        let updated = self.append_language_strings(&target.join(&settings.lang_dir))?;
        tracing::info!("Updated {} language files with parameter strings", updated);
        Ok(())
    }

    /// Insert the per-category running cost parameter blocks, plus the
    /// reliability decay parameter, ahead of the anchor block in the header.
    pub fn insert_cost_parameters(&self, header: &Utf8Path) -> Result<()> {
        let text = fs::read_to_string(header)
            .with_context(|| format!("Failed to read header '{}'", header))?;

        let Some(anchor) = self.param_anchor.find(&text) else {
            return Err(PrepareError::AnchorNotFound {
                what: "parameter block",
                path: header.to_path_buf(),
            }
            .into());
        };

        let mut blocks = String::new();
        for category in &self.categories {
            blocks.push_str(&bool_param_block(
                &category.dynamic_param(),
                &format!("{}_DYNAMIC", category.string_key()),
            ));
            blocks.push_str(&int_param_block(
                &category.cost_param(),
                &category.string_key(),
                100,
                2550,
            ));
        }
        blocks.push_str(&int_param_block(
            "param_reliability_decay",
            RELIABILITY_STRING_KEY,
            20,
            255,
        ));

        let mut patched = String::with_capacity(text.len() + blocks.len());
        patched.push_str(&text[..anchor.start()]);
        patched.push_str(&blocks);
        patched.push_str(&text[anchor.start()..]);

        fs::write(header, patched)
            .with_context(|| format!("Failed to write header '{}'", header))?;

        tracing::info!(
            "Inserted {} running cost parameters into '{}'",
            self.categories.len() * 2 + 1,
            header
        );
        Ok(())
    }

    /// Insert the coach loading-speed define ahead of the intercity define.
    pub fn insert_coach_loading_speed(&self, loading_speeds: &Utf8Path) -> Result<()> {
        let text = fs::read_to_string(loading_speeds)
            .with_context(|| format!("Failed to read '{}'", loading_speeds))?;

        let Some(anchor) = self.loading_speed_anchor.find(&text) else {
            return Err(PrepareError::AnchorNotFound {
                what: "loading speed define",
                path: loading_speeds.to_path_buf(),
            }
            .into());
        };

        let mut patched = String::with_capacity(text.len() + COACH_LOADING_SPEED_DEFINE.len());
        patched.push_str(&text[..anchor.start()]);
        patched.push_str(COACH_LOADING_SPEED_DEFINE);
        patched.push_str(&text[anchor.start()..]);

        fs::write(loading_speeds, patched)
            .with_context(|| format!("Failed to write '{}'", loading_speeds))?;

        tracing::info!("Added the coach loading speed define to '{}'", loading_speeds);
        Ok(())
    }

    /// Append the generated parameter name/description table to every file in
    /// the language directory. Returns the number of files updated.
    pub fn append_language_strings(&self, lang_dir: &Utf8Path) -> Result<usize> {
        let table = self.language_table();
        let mut updated = 0;

        for entry in lang_dir
            .read_dir_utf8()
            .with_context(|| format!("Failed to read language dir '{}'", lang_dir))?
        {
            let entry = entry.with_context(|| format!("Failed to read entry in '{}'", lang_dir))?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let mut out = OpenOptions::new()
                .append(true)
                .open(entry.path())
                .with_context(|| format!("Failed to open language file '{}'", entry.path()))?;
            out.write_all(table.as_bytes())
                .with_context(|| format!("Failed to append to '{}'", entry.path()))?;
            updated += 1;
        }

        Ok(updated)
    }

    fn language_table(&self) -> String {
        let mut out = String::from("\n\n");
        for category in &self.categories {
            let label = category.display_label();
            let key = category.string_key();
            push_string_line(
                &mut out,
                &format!("{key}_DYNAMIC"),
                &format!("Use dynamic running costs for {label}"),
            );
            push_string_line(
                &mut out,
                &format!("{key}_DYNAMIC_DESC"),
                &format!(
                    "When this is checked, running costs for {label} will be based on the current speed of the train."
                ),
            );
            push_string_line(
                &mut out,
                &key,
                &format!("Running cost percentage for {label}"),
            );
            push_string_line(
                &mut out,
                &format!("{key}_DESC"),
                &format!(
                    "Sets the running costs of {label} as a percentage of their original value."
                ),
            );
        }
        push_string_line(&mut out, RELIABILITY_STRING_KEY, "Reliability decay");
        push_string_line(
            &mut out,
            &format!("{RELIABILITY_STRING_KEY}_DESC"),
            "Sets the reliability decay rate on the vehicles, lower values mean reliability drops slower.",
        );
        out
    }
}

fn push_string_line(out: &mut String, key: &str, value: &str) {
    out.push_str(&format!("{key:<54}:{value}\n"));
}

fn bool_param_block(param_name: &str, string_key: &str) -> String {
    format!(
        "param {{\n\
         \x20   {param_name} {{\n\
         \x20       type:       bool;\n\
         \x20       name:       string({string_key});\n\
         \x20       desc:       string({string_key}_DESC);\n\
         \x20       def_value:  0;\n\
         \x20   }}\n\
         }}\n"
    )
}

fn int_param_block(param_name: &str, string_key: &str, def_value: u32, max_value: u32) -> String {
    format!(
        "param {{\n\
         \x20   {param_name} {{\n\
         \x20       type:       int;\n\
         \x20       name:       string({string_key});\n\
         \x20       desc:       string({string_key}_DESC);\n\
         \x20       def_value:  {def_value};\n\
         \x20       min_value:  0;\n\
         \x20       max_value:  {max_value};\n\
         \x20   }}\n\
         }}\n"
    )
}
