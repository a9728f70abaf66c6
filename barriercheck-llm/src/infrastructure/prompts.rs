//! Per-axis prompt templates and assembly
//!
//! Each of the twelve WCAG axes has a text template with a single
//! `{WEBSITE_ANALYSIS_DATA}` substitution point. Templates are authored
//! data, embedded at build time and overridable from a directory so the
//! rubric can be tuned without recompiling. The orchestrator never looks
//! inside a template; it only consumes the JSON the model produces.

use std::collections::HashMap;
use std::path::Path;

use barriercheck_core::domain::Axis;
use tracing::{debug, warn};

use crate::domain::LlmError;

/// Substitution point inside every axis template.
pub const DATA_PLACEHOLDER: &str = "{WEBSITE_ANALYSIS_DATA}";

/// Marker inserted where the data section was cut to fit the context.
const TRUNCATION_MARKER: &str = "\n... [analysis data truncated to fit the model context] ...\n";

/// A fully assembled prompt pair, ready for dispatch.
#[derive(Debug, Clone)]
pub struct AssembledPrompt {
    pub system: String,
    pub user: String,
}

/// Registry of axis templates.
pub struct PromptRegistry {
    templates: HashMap<Axis, String>,
}

impl PromptRegistry {
    /// Registry backed by the templates embedded at build time.
    pub fn embedded() -> Self {
        let mut templates = HashMap::new();
        for axis in Axis::ALL {
            templates.insert(axis, embedded_template(axis).to_string());
        }
        Self { templates }
    }

    /// Load `prompt_<axis_key>.md` files from a directory, falling back to
    /// the embedded template for any file that is missing or unreadable.
    pub fn from_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        let mut templates = HashMap::new();
        for axis in Axis::ALL {
            let path = dir.join(format!("prompt_{}.md", axis.key()));
            match std::fs::read_to_string(&path) {
                Ok(text) => {
                    debug!(axis = %axis, path = %path.display(), "Loaded prompt template");
                    templates.insert(axis, text);
                }
                Err(e) => {
                    warn!(
                        axis = %axis,
                        path = %path.display(),
                        error = %e,
                        "Prompt template not readable, using embedded default"
                    );
                    templates.insert(axis, embedded_template(axis).to_string());
                }
            }
        }
        Self { templates }
    }

    /// Assemble the prompt for one axis: splice the serialized analysis
    /// data into the template and pair it with the shared system preamble.
    ///
    /// The user prompt is held under `max_chars` by truncating the data
    /// section, never the instructions.
    pub fn assemble(
        &self,
        axis: Axis,
        analysis_data: &serde_json::Value,
        max_chars: usize,
    ) -> Result<AssembledPrompt, LlmError> {
        let template = self
            .templates
            .get(&axis)
            .ok_or_else(|| LlmError::Configuration(format!("no template for axis {}", axis)))?;

        let mut data = serde_json::to_string_pretty(analysis_data)
            .map_err(|e| LlmError::Configuration(format!("analysis data not serializable: {}", e)))?;

        let fixed_len = template.len().saturating_sub(DATA_PLACEHOLDER.len());
        if fixed_len + data.len() > max_chars {
            let budget = max_chars
                .saturating_sub(fixed_len)
                .saturating_sub(TRUNCATION_MARKER.len());
            let cut = floor_char_boundary(&data, budget);
            warn!(
                axis = %axis,
                original_chars = data.len(),
                kept_chars = cut,
                "Truncating analysis data to fit the prompt budget"
            );
            data.truncate(cut);
            data.push_str(TRUNCATION_MARKER);
        }

        let user = if template.contains(DATA_PLACEHOLDER) {
            template.replace(DATA_PLACEHOLDER, &data)
        } else {
            // A template without the placeholder still gets the data.
            format!("{}\n\n## Website analysis data\n```json\n{}\n```", template, data)
        };

        Ok(AssembledPrompt {
            system: system_preamble(axis),
            user,
        })
    }
}

fn floor_char_boundary(s: &str, mut index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    while index > 0 && !s.is_char_boundary(index) {
        index -= 1;
    }
    index
}

/// Shared system preamble: pins the model to one axis and mandates strict
/// JSON in the analysis_result schema.
fn system_preamble(axis: Axis) -> String {
    format!(
        r#"You are a WCAG 2.1 accessibility expert specialized in {name}.

FOCUS: evaluate ONLY the "{name}" success-criterion group. Ignore findings
that belong to any other WCAG group, even if you notice them.

SCORING: be strict and realistic. Genuine accessibility is hard; AAA is
practically unreachable and AA requires excellent implementation. Most
websites score between 20 and 60. Only exceptionally well-built sites
exceed 80.

OUTPUT: respond with a single JSON object, no markdown fences, no prose
before or after, in exactly this structure:

{{
  "analysis_result": {{
    "summary": {{
      "overall_assessment": "<balanced assessment naming positives and negatives>",
      "compliance_level": "<AAA|AA+|AA|A+|A|PARTIAL|NONE>",
      "score": <integer 0-100>
    }},
    "criteria_evaluation": [
      {{
        "criterion_id": "X.X.X",
        "name": "<criterion name>",
        "status": "<PASSED|PARTIAL|WARNING|FAILED>",
        "finding": "<what was found>",
        "impact": "<impact on users>",
        "examples": ["<example>"],
        "recommendation": "<specific recommendation>",
        "severity": "<CRITICAL|MAJOR|MODERATE|MINOR>"
      }}
    ],
    "priority_actions": {{
      "immediate": [
        {{
          "title": "<action title>",
          "description": "<detailed description>",
          "effort": "<HIGH|MEDIUM|LOW>",
          "affected_criteria": ["X.X.X"]
        }}
      ],
      "short_term": [],
      "long_term": []
    }}
  }}
}}"#,
        name = axis.display_name()
    )
}

fn embedded_template(axis: Axis) -> &'static str {
    match axis {
        Axis::TextAlternatives => {
            include_str!("../../resources/expert_prompts/prompt_1_1_text_alternatives.md")
        }
        Axis::TimeBasedMedia => {
            include_str!("../../resources/expert_prompts/prompt_1_2_time_based_media.md")
        }
        Axis::Adaptable => include_str!("../../resources/expert_prompts/prompt_1_3_adaptable.md"),
        Axis::Distinguishable => {
            include_str!("../../resources/expert_prompts/prompt_1_4_distinguishable.md")
        }
        Axis::Keyboard => include_str!("../../resources/expert_prompts/prompt_2_1_keyboard.md"),
        Axis::EnoughTime => include_str!("../../resources/expert_prompts/prompt_2_2_enough_time.md"),
        Axis::Seizures => include_str!("../../resources/expert_prompts/prompt_2_3_seizures.md"),
        Axis::Navigable => include_str!("../../resources/expert_prompts/prompt_2_4_navigable.md"),
        Axis::Readable => include_str!("../../resources/expert_prompts/prompt_3_1_readable.md"),
        Axis::Predictable => {
            include_str!("../../resources/expert_prompts/prompt_3_2_predictable.md")
        }
        Axis::InputAssistance => {
            include_str!("../../resources/expert_prompts/prompt_3_3_input_assistance.md")
        }
        Axis::Compatible => include_str!("../../resources/expert_prompts/prompt_4_1_compatible.md"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn every_embedded_template_has_the_placeholder() {
        for axis in Axis::ALL {
            assert!(
                embedded_template(axis).contains(DATA_PLACEHOLDER),
                "template for {} lacks the data placeholder",
                axis
            );
        }
    }

    #[test]
    fn assemble_substitutes_data() {
        let registry = PromptRegistry::embedded();
        let data = json!({"images": [{"src": "/logo.png", "alt": null}]});
        let prompt = registry
            .assemble(Axis::TextAlternatives, &data, 400_000)
            .unwrap();

        assert!(prompt.user.contains("/logo.png"));
        assert!(!prompt.user.contains(DATA_PLACEHOLDER));
        assert!(prompt.system.contains("1.1 Text Alternatives"));
        assert!(prompt.system.contains("analysis_result"));
    }

    #[test]
    fn assemble_truncates_oversized_data() {
        let registry = PromptRegistry::embedded();
        let big = json!({"blob": "x".repeat(50_000)});
        let prompt = registry.assemble(Axis::Keyboard, &big, 8_000).unwrap();

        assert!(prompt.user.len() <= 8_000 + TRUNCATION_MARKER.len());
        assert!(prompt.user.contains("truncated to fit"));
    }

    #[test]
    fn missing_dir_falls_back_to_embedded() {
        let registry = PromptRegistry::from_dir("/nonexistent/prompt/dir");
        let prompt = registry
            .assemble(Axis::Compatible, &json!({}), 400_000)
            .unwrap();
        assert!(prompt.user.contains("4.1"));
    }
}
