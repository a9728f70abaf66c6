//! Tolerant JSON repair for near-JSON model output
//!
//! Models asked for strict JSON still wrap it in markdown fences, leave
//! trailing commas or cut off mid-object. [`parse_lenient`] first tries a
//! strict parse, then applies a fixed sequence of textual fixes, stopping
//! at the first stage whose output parses:
//!
//! 1. strip a leading ```` ```json ```` fence and trailing ```` ``` ````
//! 2. remove trailing commas before `}` / `]`
//! 3. collapse repeated commas
//! 4. strip ASCII control characters except `\t`, `\n`, `\r`
//! 5. balance unmatched braces/brackets, truncating trailing garbage
//! 6. extract the substring between the first `{` and the last `}`
//!
//! Input that already parses is returned untouched, so the pipeline is
//! idempotent on valid JSON.

use serde_json::Value;

/// Parse model output, repairing it if a strict parse fails.
///
/// Returns the parsed value, or `Err` with the strict-parse error when no
/// repair stage produced valid JSON.
pub fn parse_lenient(raw: &str) -> Result<Value, serde_json::Error> {
    let trimmed = raw.trim();

    let strict = serde_json::from_str::<Value>(trimmed);
    let strict_err = match strict {
        Ok(value) => return Ok(value),
        Err(e) => e,
    };

    let stages: [fn(&str) -> String; 6] = [
        strip_code_fence,
        strip_trailing_commas,
        collapse_repeated_commas,
        strip_control_chars,
        balance_delimiters,
        extract_braced_region,
    ];

    // Stages apply cumulatively; each partial result gets a parse attempt.
    let mut current = trimmed.to_string();
    for stage in stages {
        current = stage(&current);
        if let Ok(value) = serde_json::from_str::<Value>(current.trim()) {
            return Ok(value);
        }
    }

    Err(strict_err)
}

/// Stage 1: strip a leading ```` ```json ```` (or bare ```` ``` ````) fence
/// and the matching trailing fence.
fn strip_code_fence(input: &str) -> String {
    let trimmed = input.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed.to_string();
    };

    // Drop the language tag line ("json", "JSON", or empty).
    let rest = match rest.split_once('\n') {
        Some((_tag, body)) => body,
        None => rest,
    };

    let body = match rest.rfind("```") {
        Some(pos) => &rest[..pos],
        None => rest,
    };

    body.trim().to_string()
}

/// Stage 2: remove commas directly preceding a closing brace/bracket.
fn strip_trailing_commas(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut in_string = false;
    let mut escaped = false;
    let chars: Vec<char> = input.chars().collect();

    for (i, &c) in chars.iter().enumerate() {
        if in_string {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }

        match c {
            '"' => {
                in_string = true;
                out.push(c);
            }
            ',' => {
                // Look past whitespace: drop the comma if a closer follows.
                let next = chars[i + 1..].iter().find(|ch| !ch.is_whitespace());
                if !matches!(next, Some('}') | Some(']')) {
                    out.push(c);
                }
            }
            _ => out.push(c),
        }
    }

    out
}

/// Stage 3: collapse `,,` runs into a single comma (outside strings).
fn collapse_repeated_commas(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut in_string = false;
    let mut escaped = false;
    let mut pending_comma = false;

    for c in input.chars() {
        if in_string {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }

        match c {
            '"' => {
                if pending_comma {
                    out.push(',');
                    pending_comma = false;
                }
                in_string = true;
                out.push(c);
            }
            ',' => pending_comma = true,
            _ if c.is_whitespace() => out.push(c),
            _ => {
                if pending_comma {
                    out.push(',');
                    pending_comma = false;
                }
                out.push(c);
            }
        }
    }
    if pending_comma {
        out.push(',');
    }

    out
}

/// Stage 4: drop ASCII control characters except tab, newline, CR.
fn strip_control_chars(input: &str) -> String {
    input
        .chars()
        .filter(|&c| !c.is_control() || matches!(c, '\t' | '\n' | '\r'))
        .collect()
}

/// Stage 5: balance braces/brackets.
///
/// String-aware scan from the first opening delimiter. Trailing text after
/// the value closes is truncated; a value that never closes gets the
/// missing closers appended in stack order.
fn balance_delimiters(input: &str) -> String {
    let start = match input.find(['{', '[']) {
        Some(pos) => pos,
        None => return input.to_string(),
    };
    let body = &input[start..];

    let mut stack: Vec<char> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in body.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }

        match c {
            '"' => in_string = true,
            '{' => stack.push('}'),
            '[' => stack.push(']'),
            '}' | ']' => {
                if stack.last() == Some(&c) {
                    stack.pop();
                    if stack.is_empty() {
                        // Value complete; drop whatever trails it.
                        return body[..=i].to_string();
                    }
                }
            }
            _ => {}
        }
    }

    let mut out = body.to_string();
    // An unterminated string would swallow the appended closers.
    if in_string {
        out.push('"');
    }
    while let Some(closer) = stack.pop() {
        out.push(closer);
    }
    out
}

/// Stage 6: largest substring between the first `{` and the last `}`.
fn extract_braced_region(input: &str) -> String {
    match (input.find('{'), input.rfind('}')) {
        (Some(start), Some(end)) if end > start => input[start..=end].to_string(),
        _ => input.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn valid_json_passes_untouched() {
        let raw = r#"{"summary": {"score": 80}}"#;
        assert_eq!(parse_lenient(raw).unwrap(), json!({"summary": {"score": 80}}));
    }

    #[test]
    fn repair_is_idempotent_on_valid_json() {
        let raw = r#"{"a": [1, 2, 3], "b": "x,y,{z}"}"#;
        let once = parse_lenient(raw).unwrap();
        let twice = parse_lenient(&serde_json::to_string(&once).unwrap()).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn strips_json_fence() {
        let raw = "```json\n{\"ok\": true}\n```";
        assert_eq!(parse_lenient(raw).unwrap(), json!({"ok": true}));
    }

    #[test]
    fn strips_bare_fence() {
        let raw = "```\n{\"ok\": true}\n```";
        assert_eq!(parse_lenient(raw).unwrap(), json!({"ok": true}));
    }

    #[test]
    fn removes_trailing_commas() {
        let raw = r#"{"items": [1, 2,], "done": true,}"#;
        assert_eq!(
            parse_lenient(raw).unwrap(),
            json!({"items": [1, 2], "done": true})
        );
    }

    #[test]
    fn trailing_comma_inside_string_survives() {
        let raw = r#"{"text": "a,}", "n": 1}"#;
        assert_eq!(parse_lenient(raw).unwrap(), json!({"text": "a,}", "n": 1}));
    }

    #[test]
    fn collapses_repeated_commas() {
        let raw = r#"{"items": [1,, 2,,, 3]}"#;
        assert_eq!(parse_lenient(raw).unwrap(), json!({"items": [1, 2, 3]}));
    }

    #[test]
    fn strips_control_characters() {
        let raw = "{\"a\": \u{0001}1}";
        assert_eq!(parse_lenient(raw).unwrap(), json!({"a": 1}));
    }

    #[test]
    fn balances_truncated_object() {
        let raw = r#"{"summary": {"score": 55"#;
        assert_eq!(
            parse_lenient(raw).unwrap(),
            json!({"summary": {"score": 55}})
        );
    }

    #[test]
    fn drops_trailing_narrative() {
        let raw = "Here is the result: {\"score\": 10} I hope this helps!";
        assert_eq!(parse_lenient(raw).unwrap(), json!({"score": 10}));
    }

    #[test]
    fn fenced_with_trailing_commas_combines_stages() {
        let raw = "```json\n{\"a\": [1, 2,],}\n```";
        assert_eq!(parse_lenient(raw).unwrap(), json!({"a": [1, 2]}));
    }

    #[test]
    fn hopeless_garbage_errors() {
        assert!(parse_lenient("no json anywhere").is_err());
        assert!(parse_lenient("").is_err());
    }
}
