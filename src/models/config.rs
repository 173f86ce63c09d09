use serde::{Deserialize, Serialize};

/// Top-level configuration from `costpatch.yaml`
///
/// Contains the patcher settings plus the train category definitions that
/// drive the cost-factor rewrite rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatchConfig {
    #[serde(rename = "CostPatch_Settings", default)]
    pub settings: PatchSettings,

    #[serde(rename = "Train_Categories", default = "default_categories")]
    pub categories: Vec<CategorySpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatchSettings {
    /// Pristine checkout of the train set sources. Left untouched by the run.
    #[serde(rename = "Source Dir", default)]
    pub source_dir: String,

    /// Working tree that gets rebuilt from the source dir and then patched.
    #[serde(rename = "Target Dir", default = "default_target_dir")]
    pub target_dir: String,

    #[serde(rename = "Copy Entries", default = "default_copy_entries")]
    pub copy_entries: Vec<String>,

    #[serde(rename = "Markup Extension", default = "default_markup_extension")]
    pub markup_extension: String,

    #[serde(rename = "Header File", default = "default_header_file")]
    pub header_file: String,

    #[serde(rename = "Loading Speeds File", default = "default_loading_speeds_file")]
    pub loading_speeds_file: String,

    #[serde(rename = "Lang Dir", default = "default_lang_dir")]
    pub lang_dir: String,

    /// Total time budget in milliseconds for contested create/delete retries.
    #[serde(rename = "Retry Timeout", default = "default_retry_timeout")]
    pub retry_timeout_ms: u64,

    /// Sleep in milliseconds between failed create/delete attempts.
    #[serde(rename = "Retry Interval", default = "default_retry_interval")]
    pub retry_interval_ms: u64,

    /// How many of the largest encountered cost factors to report.
    #[serde(rename = "Report Top", default = "default_report_top")]
    pub report_top: usize,
}

impl Default for PatchSettings {
    fn default() -> Self {
        Self {
            source_dir: String::new(),
            target_dir: default_target_dir(),
            copy_entries: default_copy_entries(),
            markup_extension: default_markup_extension(),
            header_file: default_header_file(),
            loading_speeds_file: default_loading_speeds_file(),
            lang_dir: default_lang_dir(),
            retry_timeout_ms: default_retry_timeout(),
            retry_interval_ms: default_retry_interval(),
            report_top: default_report_top(),
        }
    }
}

impl Default for PatchConfig {
    fn default() -> Self {
        Self {
            settings: PatchSettings::default(),
            categories: default_categories(),
        }
    }
}

fn default_target_dir() -> String {
    "sources".to_string()
}

fn default_copy_entries() -> Vec<String> {
    ["2ccts.pnml", "docs", "gfx", "lang", "src"]
        .into_iter()
        .map(str::to_string)
        .collect()
}

fn default_markup_extension() -> String {
    "pnml".to_string()
}

fn default_header_file() -> String {
    "src/header.pnml".to_string()
}

fn default_loading_speeds_file() -> String {
    "src/loadingspeeds.pnml".to_string()
}

fn default_lang_dir() -> String {
    "lang".to_string()
}

fn default_retry_timeout() -> u64 {
    10_000
}

fn default_retry_interval() -> u64 {
    50
}

fn default_report_top() -> usize {
    10
}

/// One train category the patcher knows how to rewrite.
///
/// The category set is configuration rather than a hardcoded exclusion list,
/// so new vehicle subtypes can be added without touching the rule code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategorySpec {
    pub name: String,

    /// Human-readable plural used in generated parameter descriptions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,

    #[serde(flatten)]
    pub matcher: CategoryMatcher,
}

/// How an item declaration or override block is recognized as belonging to a
/// category.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CategoryMatcher {
    /// Matches the `item(FEAT_TRAINS, item_<name>)` declaration when the item
    /// name starts with one of the prefixes. A `fallback` category claims any
    /// item no prefixed category claimed first.
    Declaration {
        #[serde(default)]
        prefixes: Vec<String>,

        #[serde(default)]
        fallback: bool,
    },

    /// Matches a `livery_override (...)` block whose text contains the marker
    /// token.
    LiveryOverride { marker: String },
}

impl CategorySpec {
    /// Plural label for generated descriptions, derived from the name when not
    /// configured.
    pub fn display_label(&self) -> String {
        self.label
            .clone()
            .unwrap_or_else(|| self.name.replace('_', " "))
    }

    /// NML parameter holding the running cost percentage for this category.
    pub fn cost_param(&self) -> String {
        format!("param_{}_running_cost", self.name)
    }

    /// NML parameter toggling dynamic (speed-scaled) running costs.
    pub fn dynamic_param(&self) -> String {
        format!("param_{}_running_cost_dynamic", self.name)
    }

    /// Base language-string key for this category's parameters.
    pub fn string_key(&self) -> String {
        format!("STR_PARAM_{}_RUNNING_COST", self.name.to_uppercase())
    }
}

fn declaration(name: &str, label: &str, prefixes: &[&str], fallback: bool) -> CategorySpec {
    CategorySpec {
        name: name.to_string(),
        label: Some(label.to_string()),
        matcher: CategoryMatcher::Declaration {
            prefixes: prefixes.iter().map(|p| (*p).to_string()).collect(),
            fallback,
        },
    }
}

fn livery(name: &str, label: &str, marker: &str) -> CategorySpec {
    CategorySpec {
        name: name.to_string(),
        label: Some(label.to_string()),
        matcher: CategoryMatcher::LiveryOverride {
            marker: marker.to_string(),
        },
    }
}

/// The 2cc train set category layout. Coach and wagon prefixes claim their
/// items first; everything else is a locomotive.
fn default_categories() -> Vec<CategorySpec> {
    vec![
        declaration("locomotive", "locomotives", &[], true),
        declaration("coach", "coaches", &["coach"], false),
        declaration("wagon", "wagons", &["mu", "wagon", "mtro_wagon"], false),
        livery("wagon_powered", "powered wagons", "wagon_powered"),
        livery("wagon_unpowered", "unpowered wagons", "wagon_unpowered"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_categories() {
        let categories = default_categories();
        assert_eq!(categories.len(), 5);
        assert_eq!(categories[0].name, "locomotive");
        assert!(matches!(
            categories[0].matcher,
            CategoryMatcher::Declaration { fallback: true, .. }
        ));
        assert!(matches!(
            categories[4].matcher,
            CategoryMatcher::LiveryOverride { .. }
        ));
    }

    #[test]
    fn test_parameter_names() {
        let categories = default_categories();
        let coach = &categories[1];
        assert_eq!(coach.cost_param(), "param_coach_running_cost");
        assert_eq!(coach.dynamic_param(), "param_coach_running_cost_dynamic");
        assert_eq!(coach.string_key(), "STR_PARAM_COACH_RUNNING_COST");
        assert_eq!(coach.display_label(), "coaches");
    }

    #[test]
    fn test_display_label_fallback() {
        let spec = CategorySpec {
            name: "wagon_powered".to_string(),
            label: None,
            matcher: CategoryMatcher::LiveryOverride {
                marker: "wagon_powered".to_string(),
            },
        };
        assert_eq!(spec.display_label(), "wagon powered");
    }

    #[test]
    fn test_settings_defaults() {
        let settings = PatchSettings::default();
        assert_eq!(settings.target_dir, "sources");
        assert_eq!(settings.markup_extension, "pnml");
        assert_eq!(settings.retry_timeout_ms, 10_000);
        assert_eq!(settings.retry_interval_ms, 50);
        assert_eq!(settings.report_top, 10);
        assert!(settings.copy_entries.contains(&"src".to_string()));
    }
}
