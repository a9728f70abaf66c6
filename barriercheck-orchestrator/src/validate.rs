//! Module-output validation and canonicalization
//!
//! Model output arrives as a JSON value that may use either the canonical
//! English schema or the legacy German key set; the two are treated as
//! equivalent. Validation unwraps the `analysis_result` envelope, maps
//! legacy keys, coerces the score into 0..=100, upcases enum-like fields
//! and then deserializes into the typed [`AnalysisResult`].

use serde_json::Value;

use barriercheck_core::domain::AnalysisResult;

/// Why a module output was rejected.
#[derive(Debug, thiserror::Error)]
pub enum ValidationFailure {
    #[error("missing required field `{0}`")]
    MissingField(&'static str),

    #[error("result is not a JSON object")]
    NotAnObject,

    #[error("schema mismatch: {0}")]
    Schema(String),
}

/// Legacy German keys and their canonical equivalents.
const LEGACY_KEYS: [(&str, &str); 4] = [
    ("gesamtbewertung", "summary"),
    ("detailbewertung", "criteria_evaluation"),
    ("priorisierte_massnahmen", "priority_actions"),
    ("zusammenfassung", "overall_assessment"),
];

/// Validate a parsed model response and produce the typed result.
pub fn validate_module_output(value: Value) -> Result<AnalysisResult, ValidationFailure> {
    let mut value = unwrap_envelope(value);
    canonicalize(&mut value);

    let obj = value.as_object_mut().ok_or(ValidationFailure::NotAnObject)?;

    let summary = obj
        .get_mut("summary")
        .and_then(Value::as_object_mut)
        .ok_or(ValidationFailure::MissingField("summary"))?;

    // Score: required, numeric (possibly float or numeric string), then
    // coerced into 0..=100.
    let score_value = summary
        .get("score")
        .ok_or(ValidationFailure::MissingField("summary.score"))?;
    let score = coerce_score(score_value)
        .ok_or(ValidationFailure::MissingField("summary.score"))?;
    summary.insert("score".to_string(), Value::from(score));

    if !summary.contains_key("overall_assessment") {
        return Err(ValidationFailure::MissingField("summary.overall_assessment"));
    }
    match summary.get_mut("compliance_level") {
        Some(Value::String(level)) => *level = level.trim().to_uppercase(),
        _ => return Err(ValidationFailure::MissingField("summary.compliance_level")),
    }

    let criteria = obj
        .get_mut("criteria_evaluation")
        .and_then(Value::as_array_mut)
        .ok_or(ValidationFailure::MissingField("criteria_evaluation"))?;
    for criterion in criteria.iter_mut() {
        if let Some(criterion) = criterion.as_object_mut() {
            for field in ["status", "severity"] {
                if let Some(Value::String(s)) = criterion.get_mut(field) {
                    *s = s.trim().to_uppercase();
                }
            }
        }
    }

    serde_json::from_value(value).map_err(|e| ValidationFailure::Schema(e.to_string()))
}

/// Models sometimes emit the result nested under `analysis_result`.
fn unwrap_envelope(value: Value) -> Value {
    match value {
        Value::Object(mut map) if map.contains_key("analysis_result") => {
            map.remove("analysis_result").unwrap_or(Value::Null)
        }
        other => other,
    }
}

/// Map the legacy German key set onto the canonical schema, recursively.
fn canonicalize(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for (legacy, canonical) in LEGACY_KEYS {
                if let Some(moved) = map.remove(legacy) {
                    // A canonical key already present wins over the legacy one.
                    map.entry(canonical.to_string()).or_insert(moved);
                }
            }
            for nested in map.values_mut() {
                canonicalize(nested);
            }
        }
        Value::Array(items) => {
            for item in items {
                canonicalize(item);
            }
        }
        _ => {}
    }
}

/// Coerce a score value into an integer 0..=100.
fn coerce_score(value: &Value) -> Option<u8> {
    let number = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    Some(number.round().clamp(0.0, 100.0) as u8)
}
