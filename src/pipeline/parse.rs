//! Response parsing: turn a model reply into a field → value mapping.
//!
//! Models are told to answer with a bare JSON object but routinely wrap it in
//! prose, fence it, or fall back to `key: value` lines. Three strategies are
//! tried in order and the first that yields an object wins:
//!
//! 1. The whole reply as JSON.
//! 2. The substring from the first `{` to the last `}` as JSON.
//! 3. Line-by-line `key: value` splitting.
//!
//! Every value is then cleaned. Empty, null or "not found" values trigger a
//! scan of the source text for a line mentioning the field name; if none
//! exists the value becomes [`NOT_FOUND`].
//!
//! Parsing never fails. Garbage in yields an empty mapping.

use crate::output::{Metadata, NOT_FOUND};
use serde_json::Value;
use tracing::{debug, warn};

/// Parse a raw reply into cleaned metadata, recovering missing values from
/// `source_text`.
pub fn parse_response(raw: &str, source_text: &str) -> Metadata {
    let Some(parsed) = parse_object(raw) else {
        warn!(
            "Could not parse model reply as JSON or key/value lines ({} chars)",
            raw.len()
        );
        return Metadata::new();
    };
    clean_metadata(parsed, source_text)
}

// ── Stage 1-3: locate an object ──────────────────────────────────────────────

type Strategy = fn(&str) -> Option<Metadata>;

const STRATEGIES: [(&str, Strategy); 3] = [
    ("direct", parse_direct),
    ("braces", parse_braced_substring),
    ("lines", parse_key_value_lines),
];

fn parse_object(raw: &str) -> Option<Metadata> {
    STRATEGIES.iter().find_map(|(name, strategy)| {
        let parsed = strategy(raw)?;
        debug!("Parsed model reply with '{}' strategy", name);
        Some(parsed)
    })
}

fn parse_direct(raw: &str) -> Option<Metadata> {
    match serde_json::from_str::<Value>(raw.trim()) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

fn parse_braced_substring(raw: &str) -> Option<Metadata> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    if end <= start {
        return None;
    }
    parse_direct(&raw[start..=end])
}

fn parse_key_value_lines(raw: &str) -> Option<Metadata> {
    let mut map = Metadata::new();
    for line in raw.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = trim_quoted(key);
        if key.is_empty() {
            continue;
        }
        let value = trim_quoted(value.trim().trim_end_matches(','));
        if value.is_empty() {
            continue;
        }
        map.insert(key.to_string(), Value::String(value.to_string()));
    }
    (!map.is_empty()).then_some(map)
}

fn trim_quoted(s: &str) -> &str {
    s.trim().trim_matches(|c| c == '"' || c == '\'').trim()
}

// ── Value cleaning ───────────────────────────────────────────────────────────

fn clean_metadata(parsed: Metadata, source_text: &str) -> Metadata {
    parsed
        .into_iter()
        .map(|(key, value)| {
            let cleaned = clean_value(&key, value, source_text);
            (key, cleaned)
        })
        .collect()
}

fn clean_value(key: &str, value: Value, source_text: &str) -> Value {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() || trimmed.eq_ignore_ascii_case(NOT_FOUND) {
                recover(key, source_text)
            } else {
                Value::String(trimmed.to_string())
            }
        }
        Value::Null => recover(key, source_text),
        other => other,
    }
}

fn recover(key: &str, source_text: &str) -> Value {
    match find_partial_match(key, source_text) {
        Some(line) => {
            debug!("Recovered '{}' from source text", key);
            Value::String(line)
        }
        None => Value::String(NOT_FOUND.to_string()),
    }
}

// ── Partial-match recovery ───────────────────────────────────────────────────

/// Spellings of a field name worth searching for, lowercase and deduplicated.
///
/// `/` reads as " or ", `_` and `-` read as spaces, and " and " and " & "
/// are interchangeable.
pub fn field_variations(field: &str) -> Vec<String> {
    let base = field.trim().to_lowercase();
    if base.is_empty() {
        return Vec::new();
    }
    let candidates = [
        base.clone(),
        base.replace('/', " or "),
        base.replace(['_', '-'], " "),
        base.replace(" and ", " & "),
        base.replace(" & ", " and "),
    ];
    let mut out: Vec<String> = Vec::with_capacity(candidates.len());
    for c in candidates {
        if !c.trim().is_empty() && !out.contains(&c) {
            out.push(c);
        }
    }
    out
}

/// First source line (trimmed) that mentions any variation of `field`.
///
/// Variations are tried in order; within a variation lines are scanned top
/// to bottom.
pub fn find_partial_match(field: &str, source_text: &str) -> Option<String> {
    let lines: Vec<(&str, String)> = source_text
        .lines()
        .map(|l| (l, l.to_lowercase()))
        .collect();
    field_variations(field).iter().find_map(|variation| {
        lines
            .iter()
            .find(|(_, lower)| lower.contains(variation.as_str()))
            .map(|(line, _)| line.trim().to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn direct_json() {
        let m = parse_response(r#"{"Sponsor": "  Acme Corp  "}"#, "");
        assert_eq!(m["Sponsor"], json!("Acme Corp"));
    }

    #[test]
    fn json_embedded_in_prose() {
        let raw = "Here is the data:\n{\"Title\": \"Trial X\"}\nHope this helps!";
        let m = parse_response(raw, "");
        assert_eq!(m["Title"], json!("Trial X"));
    }

    #[test]
    fn key_value_lines() {
        let raw = "Title: \"Trial X\",\n'Phase': III\nno separator here";
        let m = parse_response(raw, "");
        assert_eq!(m["Title"], json!("Trial X"));
        assert_eq!(m["Phase"], json!("III"));
        assert_eq!(m.len(), 2);
    }

    #[test]
    fn key_value_lines_skip_empty_values() {
        let m = parse_response("Here is what I found:\nSponsor: Acme Corp\nPhase: \"\"", "");
        assert_eq!(m.len(), 1);
        assert_eq!(m["Sponsor"], json!("Acme Corp"));
        assert!(!m.contains_key("Here is what I found"));
    }

    #[test]
    fn key_value_not_found_recovers() {
        let m = parse_response("Sponsor: not found", "Sponsored by Acme");
        assert_eq!(m["Sponsor"], json!("Sponsored by Acme"));
    }

    #[test]
    fn key_value_value_may_contain_colons() {
        let m = parse_response("Start: 10:30", "");
        assert_eq!(m["Start"], json!("10:30"));
    }

    #[test]
    fn garbage_gives_empty_map() {
        assert!(parse_response("I could not find anything.", "").is_empty());
        assert!(parse_response("", "").is_empty());
    }

    #[test]
    fn not_found_recovered_from_source() {
        let source = "filename: a.pdf\n\n  Study Phase: III  \nOther";
        let m = parse_response(r#"{"Study Phase": "Not found"}"#, source);
        assert_eq!(m["Study Phase"], json!("Study Phase: III"));
    }

    #[test]
    fn snake_case_field_recovered_from_spaced_label() {
        let m = parse_response(r#"{"study_phase": "Not found"}"#, "Study Phase: II");
        assert_eq!(m.len(), 1);
        assert_eq!(m["study_phase"], json!("Study Phase: II"));
    }

    #[test]
    fn not_found_is_case_insensitive_and_null_and_empty_recover() {
        let source = "sponsor: Acme\ntitle - Big Trial";
        let m = parse_response(
            r#"{"Sponsor": "NOT FOUND", "Title": null, "Missing": "  "}"#,
            source,
        );
        assert_eq!(m["Sponsor"], json!("sponsor: Acme"));
        assert_eq!(m["Title"], json!("title - Big Trial"));
        assert_eq!(m["Missing"], json!(NOT_FOUND));
    }

    #[test]
    fn slash_variation_matches() {
        let source = "Exclusion: pregnancy or lactation is excluded";
        let m = parse_response(r#"{"Pregnancy/Lactation": "Not found"}"#, source);
        assert_eq!(
            m["Pregnancy/Lactation"],
            json!("Exclusion: pregnancy or lactation is excluded")
        );
    }

    #[test]
    fn underscore_and_ampersand_variations() {
        assert!(field_variations("study_phase").contains(&"study phase".to_string()));
        assert!(field_variations("terms and conditions")
            .contains(&"terms & conditions".to_string()));
        assert!(field_variations("R & D").contains(&"r and d".to_string()));
    }

    #[test]
    fn variations_deduplicated() {
        assert_eq!(field_variations("Sponsor"), vec!["sponsor".to_string()]);
        assert!(field_variations("   ").is_empty());
    }

    #[test]
    fn lists_and_objects_kept() {
        let raw = r#"{"Sites": ["Paris", "Berlin"], "Contact": {"name": "X"}, "Arms": 2}"#;
        let m = parse_response(raw, "");
        assert_eq!(m["Sites"], json!(["Paris", "Berlin"]));
        assert_eq!(m["Contact"], json!({"name": "X"}));
        assert_eq!(m["Arms"], json!(2));
    }

    #[test]
    fn key_order_preserved() {
        let m = parse_response(r#"{"b": "1", "a": "2"}"#, "");
        let keys: Vec<&String> = m.keys().collect();
        assert_eq!(keys, vec!["b", "a"]);
    }

    #[test]
    fn first_matching_line_wins() {
        let source = "Sponsor: first\nSponsor: second";
        assert_eq!(
            find_partial_match("sponsor", source).as_deref(),
            Some("Sponsor: first")
        );
        assert!(find_partial_match("", source).is_none());
    }
}
