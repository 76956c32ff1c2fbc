//! Canonical forms for answer encodings and submitted answers.
//!
//! An answer encoding is a `|`-separated token list in which correct tokens
//! carry a trailing `*`, e.g. `"Paris*|London|Rome"`. Grading compares the
//! canonical form of a submission with the canonical correct key: lower-cased,
//! trimmed, deduplicated, sorted and re-joined with `|`.

use std::collections::BTreeSet;

use serde_json::Value;

use crate::services::error::EngineError;

const TOKEN_SEPARATOR: char = '|';
const CORRECT_MARKER: char = '*';

/// Canonical key built from the marked tokens of an encoding.
pub(crate) fn correct_answer_key(encoding: &str) -> String {
    let tokens = encoding
        .split(TOKEN_SEPARATOR)
        .map(str::trim)
        .filter_map(|token| token.strip_suffix(CORRECT_MARKER))
        .map(|token| token.trim().to_lowercase())
        .filter(|token| !token.is_empty())
        .collect::<BTreeSet<_>>();

    join_tokens(tokens)
}

/// Every option of an encoding in authoring order, markers stripped.
pub(crate) fn display_options(encoding: &str) -> Vec<String> {
    encoding
        .split(TOKEN_SEPARATOR)
        .map(|token| {
            let token = token.trim();
            token.strip_suffix(CORRECT_MARKER).unwrap_or(token).trim().to_string()
        })
        .filter(|token| !token.is_empty())
        .collect()
}

/// Canonical form of a submitted answer. Idempotent.
pub(crate) fn normalize_answer(raw: &str) -> String {
    let tokens = raw
        .to_lowercase()
        .split(TOKEN_SEPARATOR)
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
        .collect::<BTreeSet<_>>();

    join_tokens(tokens)
}

/// Flattens a client answer payload into encoded text.
///
/// `null` means unanswered. Strings pass through, scalar arrays are joined
/// with `|`, numbers and booleans use their JSON text. Objects and nested
/// arrays cannot be graded and are rejected.
pub(crate) fn answer_text(value: &Value) -> Result<Option<String>, EngineError> {
    match value {
        Value::Null => Ok(None),
        Value::String(text) => Ok(Some(text.clone())),
        Value::Number(number) => Ok(Some(number.to_string())),
        Value::Bool(flag) => Ok(Some(flag.to_string())),
        Value::Array(items) => {
            let mut tokens = Vec::with_capacity(items.len());
            for item in items {
                match item {
                    Value::String(text) => tokens.push(text.clone()),
                    Value::Number(number) => tokens.push(number.to_string()),
                    Value::Bool(flag) => tokens.push(flag.to_string()),
                    Value::Null => {}
                    _ => {
                        return Err(EngineError::MalformedAnswer(
                            "answer lists may only contain scalar values".to_string(),
                        ))
                    }
                }
            }
            Ok(Some(tokens.join("|")))
        }
        Value::Object(_) => {
            Err(EngineError::MalformedAnswer("answer must be a string or a list".to_string()))
        }
    }
}

fn join_tokens(tokens: BTreeSet<String>) -> String {
    tokens.into_iter().collect::<Vec<_>>().join("|")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn key_keeps_only_marked_tokens() {
        assert_eq!(correct_answer_key("Paris|London*|Rome"), "london");
        assert_eq!(correct_answer_key(" B* | a* |c"), "a|b");
    }

    #[test]
    fn key_dedupes_case_insensitively_and_drops_empty_markers() {
        assert_eq!(correct_answer_key("Yes*|YES*| * |no"), "yes");
        assert_eq!(correct_answer_key("no markers|here"), "");
    }

    #[test]
    fn key_trims_whitespace_before_marker() {
        assert_eq!(correct_answer_key("New York *|Boston"), "new york");
    }

    #[test]
    fn display_options_keep_every_token_in_order() {
        assert_eq!(display_options("Paris|London*| Rome |"), vec!["Paris", "London", "Rome"]);
    }

    #[test]
    fn normalization_is_idempotent() {
        for raw in ["b|A|a", " x | y |", "", "Single", "c|b|a|b"] {
            let once = normalize_answer(raw);
            assert_eq!(normalize_answer(&once), once, "raw: {raw:?}");
        }
        let key = correct_answer_key("Gamma*|alpha*|beta");
        assert_eq!(normalize_answer(&key), key);
    }

    #[test]
    fn answer_text_flattens_scalars_and_lists() {
        assert_eq!(answer_text(&json!(null)).unwrap(), None);
        assert_eq!(answer_text(&json!("a|b")).unwrap(), Some("a|b".to_string()));
        assert_eq!(answer_text(&json!(["b", "a"])).unwrap(), Some("b|a".to_string()));
        assert_eq!(answer_text(&json!(42)).unwrap(), Some("42".to_string()));
        assert_eq!(answer_text(&json!(true)).unwrap(), Some("true".to_string()));
    }

    #[test]
    fn answer_text_rejects_objects() {
        let err = answer_text(&json!({"choice": "a"})).unwrap_err();
        assert!(matches!(err, EngineError::MalformedAnswer(_)));
        assert!(answer_text(&json!([["nested"]])).is_err());
    }
}
