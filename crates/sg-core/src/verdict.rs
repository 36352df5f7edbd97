//! Verdict types
//!
//! A [`Verdict`] is the pipeline's output unit: the structured safe/unsafe
//! decision produced by a classifier, the policy gate, or the aggregate.
//! Verdicts are never partially constructed — a classifier failure maps to a
//! complete `SAFE, confidence=0` verdict carrying an error tag, so every
//! consumer downstream sees a well-formed value.

use serde::{Deserialize, Serialize};

/// Which kind of content a check examined. Part of the cache fingerprint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckType {
    Url,
    Text,
    Image,
    Page,
}

impl CheckType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Url => "url",
            Self::Text => "text",
            Self::Image => "image",
            Self::Page => "page",
        }
    }
}

/// Classification status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Status {
    Safe,
    Unsafe,
}

/// The structured decision for one check (or the aggregate).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub blocked: bool,
    pub status: Status,
    /// Short explanation for URL checks and static policy hits
    /// (`allowlisted`, `manual_blocklist`, `time_restriction`, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Content category for text/image checks ("Violence", "Nudity", ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Classifier confidence, 0-100.
    pub confidence: u8,
    /// Error tag when the check failed and defaulted open. Internal
    /// observability only; never a block signal.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Text the vision model read out of an image (memes), if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detected_text: Option<String>,
}

impl Verdict {
    /// A plain safe verdict with full confidence.
    pub fn safe() -> Self {
        Self {
            blocked: false,
            status: Status::Safe,
            reason: None,
            category: None,
            confidence: 100,
            error: None,
            detected_text: None,
        }
    }

    /// Safe verdict for content that was skipped (too short, no images).
    pub fn safe_skipped() -> Self {
        Self {
            confidence: 0,
            ..Self::safe()
        }
    }

    /// Static policy block (block-list hit, time window).
    pub fn policy_block(reason: &str) -> Self {
        Self {
            blocked: true,
            status: Status::Unsafe,
            reason: Some(reason.to_string()),
            category: None,
            confidence: 100,
            error: None,
            detected_text: None,
        }
    }

    /// Static policy allow (allow-list hit, filtering off).
    pub fn policy_allow(reason: &str) -> Self {
        Self {
            reason: Some(reason.to_string()),
            ..Self::safe()
        }
    }

    /// The fail-open default: a failed check is reported safe with zero
    /// confidence and an error tag for observability.
    pub fn fail_open(tag: impl Into<String>) -> Self {
        Self {
            blocked: false,
            status: Status::Safe,
            reason: None,
            category: None,
            confidence: 0,
            error: Some(tag.into()),
            detected_text: None,
        }
    }

    /// The primary block signal of this verdict, if blocked: the reason for
    /// URL/policy checks, the category for content checks.
    pub fn block_signal(&self) -> Option<&str> {
        if !self.blocked {
            return None;
        }
        self.reason.as_deref().or(self.category.as_deref())
    }
}
