//! Best-effort recovery of structured data from raw model output.
//!
//! Small local models wrap JSON in fences, append commentary, drop quotes
//! around keys, use single quotes, drop or add commas, or stop mid-object. [`recover`] tries,
//! in order: the fence-stripped text as-is, a tolerant repair of it, and the
//! span between the first `{` and the last `}`. Failure is a value, never a
//! panic; callers treat it as "no data for this response".

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecoveryError {
    #[error("response is empty")]
    Empty,

    #[error("no JSON object or array in response")]
    NoJson,

    #[error("unrecoverable JSON: {0}")]
    Invalid(String),
}

static RE_OPEN_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\s*```[a-z0-9_-]*[ \t]*\r?\n?").unwrap());
static RE_CLOSE_FENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\r?\n?[ \t]*```\s*$").unwrap());

pub fn recover(text: &str) -> Result<Value, RecoveryError> {
    let cleaned = strip_code_fences(text);
    if cleaned.is_empty() {
        return Err(RecoveryError::Empty);
    }
    if !cleaned.contains(['{', '[']) {
        return Err(RecoveryError::NoJson);
    }

    let strict_err = match serde_json::from_str::<Value>(cleaned) {
        Ok(value) if is_structured(&value) => return Ok(value),
        Ok(_) => "top-level value is not an object or array".to_string(),
        Err(e) => e.to_string(),
    };

    if let Some(value) = repair(cleaned).as_deref().and_then(parse_structured) {
        return Ok(value);
    }

    if let (Some(start), Some(end)) = (cleaned.find('{'), cleaned.rfind('}')) {
        if end > start {
            if let Some(value) = parse_structured(&cleaned[start..=end]) {
                return Ok(value);
            }
        }
    }

    Err(RecoveryError::Invalid(strict_err))
}

/// Remove a leading and trailing code fence, whatever the language tag.
pub fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let start = RE_OPEN_FENCE.find(trimmed).map(|m| m.end()).unwrap_or(0);
    let body = &trimmed[start..];
    let end = RE_CLOSE_FENCE
        .find(body)
        .map(|m| m.start())
        .unwrap_or(body.len());
    body[..end].trim()
}

fn is_structured(value: &Value) -> bool {
    value.is_object() || value.is_array()
}

fn parse_structured(text: &str) -> Option<Value> {
    serde_json::from_str::<Value>(text)
        .ok()
        .filter(is_structured)
}

/// Rewrite common syntax damage into parseable JSON.
///
/// Starts at the first `{` or `[` and stops after the first balanced value.
/// Quotes bare object keys, turns single-quoted strings into double-quoted
/// ones, restores dropped commas between values, drops trailing commas,
/// closes an unterminated string and closes any brackets still open at the
/// end.
fn repair(text: &str) -> Option<String> {
    let start = text.find(['{', '['])?;
    let chars: Vec<char> = text[start..].chars().collect();

    let mut out = String::with_capacity(chars.len() + 8);
    let mut closers: Vec<char> = Vec::new();
    // Delimiter of the string being copied, if any
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut i = 0;

    while i < chars.len() {
        let ch = chars[i];
        i += 1;

        if let Some(q) = quote {
            if escaped {
                escaped = false;
                // JSON has no \' escape
                if ch == '\'' {
                    out.pop();
                }
                out.push(ch);
            } else if ch == '\\' {
                escaped = true;
                out.push(ch);
            } else if ch == q {
                quote = None;
                out.push('"');
            } else if ch == '"' {
                out.push_str("\\\"");
            } else {
                out.push(ch);
            }
            continue;
        }

        if !closers.is_empty() {
            let opens_value = matches!(ch, '{' | '[' | '"' | '\'');
            let opens_key = (ch.is_alphabetic() || ch == '_') && closers.last() == Some(&'}');
            if (opens_value && ends_value(&out, true)) || (opens_key && ends_value(&out, false)) {
                out.push(',');
            }
        }

        match ch {
            '"' | '\'' => {
                quote = Some(ch);
                out.push('"');
            }
            '{' => {
                closers.push('}');
                out.push(ch);
            }
            '[' => {
                closers.push(']');
                out.push(ch);
            }
            '}' | ']' => {
                // Stray closer with nothing to match
                if !closers.contains(&ch) {
                    continue;
                }
                while let Some(closer) = closers.pop() {
                    close(&mut out, closer);
                    if closer == ch {
                        break;
                    }
                }
                if closers.is_empty() {
                    break;
                }
            }
            c if (c.is_alphabetic() || c == '_') && expects_key(&out, &closers) => {
                out.push('"');
                out.push(c);
                while i < chars.len() && (chars[i].is_alphanumeric() || matches!(chars[i], '_' | '-')) {
                    out.push(chars[i]);
                    i += 1;
                }
                out.push('"');
            }
            _ => out.push(ch),
        }
    }

    if quote.is_some() {
        if escaped {
            out.pop();
        }
        out.push('"');
    }
    while let Some(closer) = closers.pop() {
        close(&mut out, closer);
    }

    Some(out)
}

/// Whether the output so far ends with a complete value. A number only
/// counts when `digits` is set, so exponents like `1e5` stay intact.
fn ends_value(out: &str, digits: bool) -> bool {
    match out.trim_end().chars().last() {
        Some('}' | ']' | '"') => true,
        Some(c) => digits && c.is_ascii_digit(),
        None => false,
    }
}

fn expects_key(out: &str, closers: &[char]) -> bool {
    closers.last() == Some(&'}') && matches!(out.trim_end().chars().last(), Some('{' | ','))
}

fn close(out: &mut String, closer: char) {
    let len = out.trim_end().len();
    out.truncate(len);
    if out.ends_with(',') {
        out.pop();
    }
    if out.ends_with(':') {
        out.push_str("null");
    }
    out.push(closer);
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn plain_json_passes_through() {
        let value = recover(r#"{"equipment": []}"#).unwrap();
        assert_eq!(value, json!({"equipment": []}));
    }

    #[test]
    fn strips_fences_in_any_case() {
        let text = "```JSON\n{\"actions\": [{\"name\": \"Stop\"}]}\n```";
        assert_eq!(strip_code_fences(text), "{\"actions\": [{\"name\": \"Stop\"}]}");
        assert_eq!(recover(text).unwrap()["actions"][0]["name"], "Stop");

        let bare = "```\n[1, 2]\n```";
        assert_eq!(recover(bare).unwrap(), json!([1, 2]));
    }

    #[test]
    fn drops_trailing_commas() {
        let value = recover(r#"{"conditions": [{"name": "Low Flow", "description": "FT-01 < 5",},],}"#)
            .unwrap();
        assert_eq!(value["conditions"][0]["name"], "Low Flow");
    }

    #[test]
    fn quotes_bare_keys() {
        let value = recover(r#"{equipment: [{id: "SV01", name: "Surge Vessel", description: "a, b: c"}]}"#)
            .unwrap();
        assert_eq!(value["equipment"][0]["id"], "SV01");
        assert_eq!(value["equipment"][0]["description"], "a, b: c");
    }

    #[test]
    fn closes_truncated_output() {
        let value = recover(r#"{"equipment": [{"id": "P-101", "name": "Feed Pump", "description": "main fe"#)
            .unwrap();
        assert_eq!(value["equipment"][0]["description"], "main fe");

        let value = recover(r#"{"equipment": [{"id": "P-101", "name":"#).unwrap();
        assert!(value["equipment"][0]["name"].is_null());
    }

    #[test]
    fn ignores_commentary_around_json() {
        let text = "Sure! Here is the data:\n{\"actions\": []}\nLet me know if you need more.";
        assert_eq!(recover(text).unwrap(), json!({"actions": []}));
    }

    #[test]
    fn closes_mismatched_brackets() {
        let value = recover(r#"[{"name": "Pump"]"#).unwrap();
        assert_eq!(value, json!([{"name": "Pump"}]));
    }

    #[test]
    fn restores_comma_between_array_items() {
        let text = r#"{"equipment": [{"id":"P-101","name":"Pump","description":"feed"} {"id":"P-102","name":"Standby Pump","description":"spare"}]}"#;
        let value = recover(text).unwrap();
        assert_eq!(value["equipment"].as_array().unwrap().len(), 2);
        assert_eq!(value["equipment"][1]["id"], "P-102");
    }

    #[test]
    fn restores_comma_between_fields() {
        let text = "{\"conditions\": [{\"name\": \"Low Flow\"\n \"description\": \"FT-01 < 5\"}]}";
        let value = recover(text).unwrap();
        assert_eq!(value["conditions"][0]["description"], "FT-01 < 5");

        let value = recover(r#"{"parameters": [{"name": "Trip Delay", "value": 5 "description": "5 s"}]}"#)
            .unwrap();
        assert_eq!(value["parameters"][0]["value"], 5);
        assert_eq!(value["parameters"][0]["description"], "5 s");

        let value = recover(r#"{"limit": 1e3 "name": "High Limit"}"#).unwrap();
        assert_eq!(value["limit"], 1000.0);
        assert_eq!(value["name"], "High Limit");
    }

    #[test]
    fn restores_comma_before_bare_key() {
        let value = recover(r#"{name: "Pump" description: "feed pump"}"#).unwrap();
        assert_eq!(value, json!({"name": "Pump", "description": "feed pump"}));
    }

    #[test]
    fn accepts_single_quoted_strings() {
        let value = recover("{'equipment': [{'id': 'P-101', 'name': 'Pump', 'description': 'feed'}]}").unwrap();
        assert_eq!(value["equipment"][0]["id"], "P-101");

        let value = recover(r#"{'name': 'Valve "A"', 'description': 'don\'t open'}"#).unwrap();
        assert_eq!(value["name"], "Valve \"A\"");
        assert_eq!(value["description"], "don't open");
    }

    #[test]
    fn refusals_and_scalars_fail_cleanly() {
        assert_eq!(recover("I cannot comply."), Err(RecoveryError::NoJson));
        assert_eq!(recover("   "), Err(RecoveryError::Empty));
        assert_eq!(recover("```json\n```"), Err(RecoveryError::Empty));
        assert_eq!(recover("42"), Err(RecoveryError::NoJson));
    }

    #[test]
    fn hopeless_input_reports_invalid() {
        assert!(matches!(recover("{]:[}"), Err(RecoveryError::Invalid(_))));
    }
}
