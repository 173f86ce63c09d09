use indexmap::IndexMap;

/// Aggregate statistics for one patch run.
///
/// Built incrementally while the transform pass walks the tree and consumed
/// once at the end for reporting. The report is logged even when the pass
/// aborts partway, covering whatever completed before the abort point.
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    /// Total rule matches across all files.
    pub replacements: usize,

    /// Files whose text was rewritten.
    pub files_changed: usize,

    /// Files enumerated and read, whether or not any rule fired.
    pub files_scanned: usize,

    /// Per item name, the largest cost factor observed across its categories.
    /// Only items with at least one recorded factor appear here.
    pub largest_factors: IndexMap<String, u32>,
}

impl RunReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_scanned(&mut self) {
        self.files_scanned += 1;
    }

    /// Record the outcome of one processed file. Called at most once per file.
    pub fn record_outcome(
        &mut self,
        item_name: &str,
        changed: bool,
        replacements: usize,
        largest_factor: Option<u32>,
    ) {
        self.replacements += replacements;
        if changed {
            self.files_changed += 1;
        }
        if let Some(factor) = largest_factor {
            self.largest_factors.insert(item_name.to_string(), factor);
        }
    }

    /// The `n` largest per-item cost factors, descending.
    pub fn top(&self, n: usize) -> Vec<(String, u32)> {
        let mut entries: Vec<(String, u32)> = self
            .largest_factors
            .iter()
            .map(|(item, factor)| (item.clone(), *factor))
            .collect();
        entries.sort_by(|a, b| b.1.cmp(&a.1));
        entries.truncate(n);
        entries
    }

    /// Log the run-end summary.
    pub fn log_summary(&self, top_n: usize) {
        tracing::info!(
            "A total of {} replacements in {} files out of {} files scanned were made",
            self.replacements,
            self.files_changed,
            self.files_scanned
        );

        if self.largest_factors.is_empty() {
            return;
        }

        tracing::info!("The {} largest encountered running cost factors:", top_n);
        for (item, factor) in self.top(top_n) {
            tracing::info!("{:<6} in '{}'", factor, item);
        }
    }
}
