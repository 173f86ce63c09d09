use crate::models::{CategoryMatcher, CategorySpec};
use anyhow::{Context, Result};
use indexmap::IndexMap;
use regex::Regex;
use thiserror::Error;

/// Pattern locating the item declaration and capturing the item name.
const ITEM_PATTERN: &str = r"(?si)item\(FEAT_TRAINS, item_([A-Za-z0-9_]+?)\)";

/// Pattern locating a literal reliability decay value.
const RELIABILITY_PATTERN: &str = r"(?si)reliability_decay: (\d+);";

/// Pattern locating the running cost factor of an item declaration. The match
/// deliberately runs up to the opening of the graphics block so the generated
/// properties can be spliced in right after it. Category gating happens on the
/// extracted item name, not inside the pattern.
const DECLARATION_COST_PATTERN: &str =
    r"(?si)item\(FEAT_TRAINS, item_[A-Za-z0-9_]+?\).+?running_cost_factor: (\d+);.+?graphics \{";

const INTERCITY_LOADING_SPEED: &str = "LOADINGSPEEDDEF_INTERCITY";
const COACH_LOADING_SPEED: &str = "LOADINGSPEEDDEF_COACH";

/// The category whose items get the coach loading-speed define.
const LOADING_SPEED_CATEGORY: &str = "coach";

/// Default value of the per-category running cost percentage parameter; used
/// for the effective-value debug log when a factor is recorded.
const DEFAULT_RUNNING_COST_PERCENT: u32 = 100;

#[derive(Error, Debug)]
pub enum RuleError {
    #[error("Invalid pattern: {0}")]
    Pattern(#[from] regex::Error),
}

/// Result of applying one rewrite rule to a file's text snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleOutcome {
    /// Text unchanged.
    NoMatch,

    /// Text replaced, no factor involved.
    Replaced { text: String },

    /// Text replaced and a cost factor recorded for a category.
    Factor {
        text: String,
        category: String,
        factor: u32,
    },
}

/// One rewrite rule. The order of the rule list is fixed: item extraction
/// gates everything, then the loading-speed and reliability substitutions,
/// then one cost rule per configured category.
#[derive(Debug, Clone)]
enum Rule {
    LoadingSpeed,
    ReliabilityDecay,
    DeclarationCost { category: String },
    LiveryCost { category: String },
}

/// The accumulated result of running the full rule sequence over one file.
#[derive(Debug, Clone)]
pub struct FilePatch {
    /// Item name extracted from the declaration.
    pub item_name: String,

    /// Final text after all rules ran.
    pub text: String,

    /// True when at least one rule fired.
    pub changed: bool,

    /// Number of rules that fired.
    pub replacements: usize,

    /// At most one factor per category.
    pub factors: IndexMap<String, u32>,
}

impl FilePatch {
    fn new(item_name: String, text: String) -> Self {
        Self {
            item_name,
            text,
            changed: false,
            replacements: 0,
            factors: IndexMap::new(),
        }
    }

    /// Largest factor across this file's categories, if any were recorded.
    pub fn largest_factor(&self) -> Option<u32> {
        self.factors.values().copied().max()
    }
}

/// Classifies item names into declaration categories from configured prefix
/// lists. Prefixed categories claim items in configuration order; a fallback
/// category claims whatever is left.
#[derive(Debug, Clone)]
pub struct Classifier {
    categories: Vec<(String, Vec<String>, bool)>,
}

impl Classifier {
    fn new(categories: &[CategorySpec]) -> Self {
        let categories = categories
            .iter()
            .filter_map(|spec| match &spec.matcher {
                CategoryMatcher::Declaration { prefixes, fallback } => {
                    Some((spec.name.clone(), prefixes.clone(), *fallback))
                }
                CategoryMatcher::LiveryOverride { .. } => None,
            })
            .collect();
        Self { categories }
    }

    /// The declaration category this item name belongs to, if any.
    pub fn classify(&self, item_name: &str) -> Option<&str> {
        for (name, prefixes, _) in &self.categories {
            if prefixes.iter().any(|p| item_name.starts_with(p.as_str())) {
                return Some(name);
            }
        }
        self.categories
            .iter()
            .find(|(_, _, fallback)| *fallback)
            .map(|(name, _, _)| name.as_str())
    }
}

/// Applies the ordered rewrite rule sequence to file text.
///
/// Every rule takes an immutable snapshot of the text and produces a new text
/// plus a structured [`RuleOutcome`]; nothing is mutated in place. Item
/// extraction is a hard gate: a file without an item declaration is skipped
/// entirely.
pub struct RuleEngine {
    item_regex: Regex,
    reliability_regex: Regex,
    declaration_regex: Regex,
    livery_regexes: IndexMap<String, Regex>,
    classifier: Classifier,
    rules: Vec<Rule>,
}

impl RuleEngine {
    pub fn new(categories: &[CategorySpec]) -> Result<Self> {
        let mut livery_regexes = IndexMap::new();
        let mut rules = vec![Rule::LoadingSpeed, Rule::ReliabilityDecay];

        for spec in categories {
            match &spec.matcher {
                CategoryMatcher::Declaration { .. } => rules.push(Rule::DeclarationCost {
                    category: spec.name.clone(),
                }),
                CategoryMatcher::LiveryOverride { marker } => {
                    let pattern = format!(
                        r"(?si)(livery_override \(.+?{}.*?running_cost_factor: )(\d+);",
                        regex::escape(marker)
                    );
                    livery_regexes.insert(
                        spec.name.clone(),
                        Regex::new(&pattern)
                            .map_err(RuleError::Pattern)
                            .with_context(|| {
                                format!("Bad livery override marker for '{}'", spec.name)
                            })?,
                    );
                    rules.push(Rule::LiveryCost {
                        category: spec.name.clone(),
                    });
                }
            }
        }

        Ok(Self {
            item_regex: Regex::new(ITEM_PATTERN).map_err(RuleError::Pattern)?,
            reliability_regex: Regex::new(RELIABILITY_PATTERN).map_err(RuleError::Pattern)?,
            declaration_regex: Regex::new(DECLARATION_COST_PATTERN).map_err(RuleError::Pattern)?,
            livery_regexes,
            classifier: Classifier::new(categories),
            rules,
        })
    }

    /// Extract the item name from the declaration, if the file has one.
    pub fn extract_item_name(&self, text: &str) -> Option<String> {
        self.item_regex
            .captures(text)
            .map(|caps| caps[1].to_string())
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    /// Run the full rule sequence over one file's text.
    ///
    /// Returns `None` when no item declaration is present, leaving the file
    /// untouched. Otherwise returns the final text plus the per-file outcome,
    /// whether or not anything changed.
    pub fn apply(&self, text: &str) -> Option<FilePatch> {
        let item_name = self.extract_item_name(text)?;
        let mut patch = FilePatch::new(item_name, text.to_string());

        for rule in &self.rules {
            match self.apply_rule(rule, &patch.text, &patch.item_name) {
                RuleOutcome::NoMatch => {}
                RuleOutcome::Replaced { text } => {
                    patch.text = text;
                    patch.changed = true;
                    patch.replacements += 1;
                }
                RuleOutcome::Factor {
                    text,
                    category,
                    factor,
                } => {
                    tracing::debug!(
                        item = %patch.item_name,
                        %category,
                        factor,
                        purchase_at_default =
                            purchase_cost_factor(factor, DEFAULT_RUNNING_COST_PERCENT),
                        "recorded running cost factor"
                    );
                    patch.text = text;
                    patch.changed = true;
                    patch.replacements += 1;
                    patch.factors.insert(category, factor);
                }
            }
        }

        Some(patch)
    }

    fn apply_rule(&self, rule: &Rule, text: &str, item_name: &str) -> RuleOutcome {
        match rule {
            Rule::LoadingSpeed => self.substitute_loading_speed(text, item_name),
            Rule::ReliabilityDecay => self.substitute_reliability_decay(text),
            Rule::DeclarationCost { category } => {
                self.apply_declaration_cost(text, item_name, category)
            }
            Rule::LiveryCost { category } => self.apply_livery_cost(text, item_name, category),
        }
    }

    /// Swap the intercity loading-speed token for the coach one, but only on
    /// items classified as coaches.
    fn substitute_loading_speed(&self, text: &str, item_name: &str) -> RuleOutcome {
        if self.classifier.classify(item_name) != Some(LOADING_SPEED_CATEGORY) {
            return RuleOutcome::NoMatch;
        }
        if !text.contains(INTERCITY_LOADING_SPEED) {
            return RuleOutcome::NoMatch;
        }
        RuleOutcome::Replaced {
            text: text.replace(INTERCITY_LOADING_SPEED, COACH_LOADING_SPEED),
        }
    }

    /// Replace a literal reliability decay value with the user parameter.
    fn substitute_reliability_decay(&self, text: &str) -> RuleOutcome {
        if !self.reliability_regex.is_match(text) {
            return RuleOutcome::NoMatch;
        }
        RuleOutcome::Replaced {
            text: self
                .reliability_regex
                .replace(text, "reliability_decay: param_reliability_decay;")
                .into_owned(),
        }
    }

    /// Record the declared running cost factor and splice in the switch
    /// reference plus the purchase cost expression, right after the opening of
    /// the graphics block.
    fn apply_declaration_cost(&self, text: &str, item_name: &str, category: &str) -> RuleOutcome {
        if self.classifier.classify(item_name) != Some(category) {
            return RuleOutcome::NoMatch;
        }
        let Some(caps) = self.declaration_regex.captures(text) else {
            return RuleOutcome::NoMatch;
        };
        let Ok(factor) = caps[1].parse::<u32>() else {
            tracing::warn!(item = %item_name, raw = &caps[1], "unparseable cost factor, skipping");
            return RuleOutcome::NoMatch;
        };

        let splice_at = caps.get(0).map_or(0, |m| m.end());
        let addition = format!(
            "\n        running_cost_factor: switch_{item_name}_{category}_running_cost_factor;\
             \n        purchase_running_cost_factor: {};",
            purchase_cost_expression(factor, category)
        );

        let mut patched = String::with_capacity(text.len() + addition.len());
        patched.push_str(&text[..splice_at]);
        patched.push_str(&addition);
        patched.push_str(&text[splice_at..]);

        RuleOutcome::Factor {
            text: patched,
            category: category.to_string(),
            factor,
        }
    }

    /// Record a livery override running cost factor and replace the literal
    /// value with the switch reference plus the purchase cost expression.
    fn apply_livery_cost(&self, text: &str, item_name: &str, category: &str) -> RuleOutcome {
        let Some(regex) = self.livery_regexes.get(category) else {
            return RuleOutcome::NoMatch;
        };
        let Some(caps) = regex.captures(text) else {
            return RuleOutcome::NoMatch;
        };
        let Ok(factor) = caps[2].parse::<u32>() else {
            tracing::warn!(item = %item_name, raw = &caps[2], "unparseable cost factor, skipping");
            return RuleOutcome::NoMatch;
        };

        let whole = caps.get(0).expect("match always has group 0");
        let replacement = format!(
            "{}switch_{item_name}_{category}_running_cost_factor;\
             \n        purchase_running_cost_factor: {};",
            &caps[1],
            purchase_cost_expression(factor, category)
        );

        let mut patched = String::with_capacity(text.len() + replacement.len());
        patched.push_str(&text[..whole.start()]);
        patched.push_str(&replacement);
        patched.push_str(&text[whole.end()..]);

        RuleOutcome::Factor {
            text: patched,
            category: category.to_string(),
            factor,
        }
    }
}

/// The NML purchase cost expression for a factor and category parameter. The
/// division order is load-bearing: the target runtime truncates at every step.
fn purchase_cost_expression(factor: u32, category: &str) -> String {
    format!("({factor} * 10000) / (10000 / param_{category}_running_cost) / 100")
}

/// Evaluate the purchase cost expression the way the target runtime does:
/// integer division, truncating at each step. `percent` is the value of the
/// per-category running cost percentage parameter.
pub fn purchase_cost_factor(factor: u32, percent: u32) -> u32 {
    if percent == 0 {
        return 0;
    }
    let scale = 10_000u64 / u64::from(percent);
    if scale == 0 {
        return 0;
    }
    (u64::from(factor) * 10_000 / scale / 100) as u32
}

/// Generated switch block appended to the companion graphics file: stores the
/// precomputed purchase factor and, when dynamic costing is enabled for the
/// category, scales the running cost with the current speed.
pub fn dynamic_cost_switch(item_name: &str, category: &str, factor: u32) -> String {
    format!(
        "\n\n// Dynamic running cost for {category}.\n\
         switch(FEAT_TRAINS, PARENT, switch_{item_name}_{category}_running_cost_factor,\n\
         \x20   [STORE_TEMP(({factor} * 10000) / (10000 / param_{category}_running_cost) / 100, 0),\n\
         \x20   param_{category}_running_cost_dynamic]) {{\n\
         \x20   0: LOAD_TEMP(0);\n\
         \x20   1: return (current_speed * 100 / max_speed) * LOAD_TEMP(0) / 100;\n\
         }}"
    )
}
