//! Defensive parsing of model output
//!
//! The moderation model is asked for raw JSON but routinely wraps it in
//! markdown fences or leading prose. Parsing is two-stage:
//!
//! 1. strip code fences, strict `serde_json` parse
//! 2. regex salvage of the individual fields
//!
//! The outcome is tagged, never thrown: `Unparseable` is converted to a
//! fail-open verdict at the sub-check boundary.

use std::sync::OnceLock;

use regex::Regex;
use serde::Deserialize;

use sg_core::verdict::{Status, Verdict};

/// Result of parsing one model response.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseOutcome {
    Parsed(ModelVerdict),
    Unparseable,
}

/// The fields we accept from the model, before normalization.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ModelVerdict {
    pub status: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub confidence: Option<u8>,
    #[serde(default, alias = "detectedText")]
    pub detected_text: Option<String>,
}

impl ModelVerdict {
    /// Normalize into a complete verdict. Unknown status strings are
    /// treated as safe — the model must say UNSAFE explicitly to block.
    pub fn into_verdict(self) -> Verdict {
        let is_unsafe = self.status.eq_ignore_ascii_case("UNSAFE");
        Verdict {
            blocked: is_unsafe,
            status: if is_unsafe { Status::Unsafe } else { Status::Safe },
            reason: self.reason.filter(|r| !r.eq_ignore_ascii_case("null")),
            category: self.category.filter(|c| !c.eq_ignore_ascii_case("null")),
            confidence: self.confidence.unwrap_or(50).min(100),
            error: None,
            detected_text: self.detected_text,
        }
    }
}

fn strip_fences(raw: &str) -> &str {
    let s = raw.trim();
    let s = s
        .strip_prefix("```json")
        .or_else(|| s.strip_prefix("```JSON"))
        .or_else(|| s.strip_prefix("```"))
        .unwrap_or(s);
    let s = s.strip_suffix("```").unwrap_or(s);
    s.trim()
}

fn salvage_regexes() -> &'static (Regex, Regex, Regex, Regex) {
    static RES: OnceLock<(Regex, Regex, Regex, Regex)> = OnceLock::new();
    RES.get_or_init(|| {
        (
            Regex::new(r#"(?i)"status"\s*:\s*"(SAFE|UNSAFE)""#).unwrap(),
            Regex::new(r#"(?i)"category"\s*:\s*"([^"]+)""#).unwrap(),
            Regex::new(r#"(?i)"reason"\s*:\s*"([^"]+)""#).unwrap(),
            Regex::new(r#"(?i)"confidence"\s*:\s*(\d{1,3})"#).unwrap(),
        )
    })
}

/// Parse a raw model response. Strict first, salvage second.
pub fn parse_model_output(raw: &str) -> ParseOutcome {
    let cleaned = strip_fences(raw);

    if let Ok(parsed) = serde_json::from_str::<ModelVerdict>(cleaned) {
        return ParseOutcome::Parsed(parsed);
    }

    // Salvage: the status field is the one thing we cannot do without.
    let (status_re, category_re, reason_re, confidence_re) = salvage_regexes();

    let Some(status) = status_re
        .captures(raw)
        .map(|c| c[1].to_ascii_uppercase())
    else {
        return ParseOutcome::Unparseable;
    };

    ParseOutcome::Parsed(ModelVerdict {
        status,
        category: category_re.captures(raw).map(|c| c[1].to_string()),
        reason: reason_re.captures(raw).map(|c| c[1].to_string()),
        confidence: confidence_re
            .captures(raw)
            .and_then(|c| c[1].parse::<u8>().ok()),
        detected_text: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_json_parses() {
        let raw = r#"{"status": "UNSAFE", "category": "Violence", "confidence": 90}"#;
        let ParseOutcome::Parsed(mv) = parse_model_output(raw) else {
            panic!("expected parse");
        };
        let v = mv.into_verdict();
        assert!(v.blocked);
        assert_eq!(v.category.as_deref(), Some("Violence"));
        assert_eq!(v.confidence, 90);
    }

    #[test]
    fn test_fenced_json_parses() {
        let raw = "```json\n{\"status\": \"SAFE\", \"category\": null, \"confidence\": 95}\n```";
        let ParseOutcome::Parsed(mv) = parse_model_output(raw) else {
            panic!("expected parse");
        };
        let v = mv.into_verdict();
        assert!(!v.blocked);
        assert_eq!(v.confidence, 95);
    }

    #[test]
    fn test_salvage_from_prose() {
        let raw = "Sure! Here is the analysis you asked for:\n\
                   the page is problematic. \"status\": \"UNSAFE\", \"category\": \"Nudity\" \
                   and I'd put \"confidence\": 77 on that.";
        let ParseOutcome::Parsed(mv) = parse_model_output(raw) else {
            panic!("expected salvage");
        };
        let v = mv.into_verdict();
        assert!(v.blocked);
        assert_eq!(v.category.as_deref(), Some("Nudity"));
        assert_eq!(v.confidence, 77);
    }

    #[test]
    fn test_salvage_defaults_confidence() {
        let raw = "\"status\": \"unsafe\"";
        let ParseOutcome::Parsed(mv) = parse_model_output(raw) else {
            panic!("expected salvage");
        };
        assert_eq!(mv.into_verdict().confidence, 50);
    }

    #[test]
    fn test_unparseable_when_no_status() {
        assert_eq!(parse_model_output("I cannot help with that."), ParseOutcome::Unparseable);
        assert_eq!(parse_model_output(""), ParseOutcome::Unparseable);
    }

    #[test]
    fn test_string_null_category_is_none() {
        let raw = r#"{"status": "SAFE", "category": "null", "confidence": 99}"#;
        let ParseOutcome::Parsed(mv) = parse_model_output(raw) else {
            panic!("expected parse");
        };
        assert!(mv.into_verdict().category.is_none());
    }

    #[test]
    fn test_unknown_status_is_safe() {
        let raw = r#"{"status": "MAYBE", "confidence": 10}"#;
        let ParseOutcome::Parsed(mv) = parse_model_output(raw) else {
            panic!("expected parse");
        };
        assert!(!mv.into_verdict().blocked);
    }
}
