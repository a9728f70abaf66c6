//! Automated (rule-based) check results

use serde::{Deserialize, Serialize};

/// One rule outcome, aggregated over all crawled pages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckFinding {
    /// Stable rule id, e.g. `html-lang`, `duplicate-id`, `image-alt`
    pub rule_id: String,
    pub description: String,
    /// URLs of the pages the rule matched on
    #[serde(default)]
    pub pages: Vec<String>,
    /// Total number of matching elements across pages
    pub count: usize,
}

/// Output of the automated checker: cheap deterministic findings used as
/// context for every module and as a safety floor in the reducer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CheckReport {
    pub violations: Vec<CheckFinding>,
    pub warnings: Vec<CheckFinding>,
    pub passes: Vec<CheckFinding>,
}

impl CheckReport {
    /// Violations whose rule id matches any of the given fragments.
    ///
    /// Used to splice only axis-relevant findings into a prompt.
    pub fn violations_matching(&self, fragments: &[&str]) -> Vec<&CheckFinding> {
        self.violations
            .iter()
            .filter(|v| fragments.iter().any(|f| v.rule_id.contains(f)))
            .collect()
    }
}
