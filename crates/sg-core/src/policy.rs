//! Child profiles and the static policy gate
//!
//! The policy gate answers the cheap questions before any external
//! classifier is consulted: is filtering off, is the domain explicitly
//! allowed or blocked by the parent, is the device outside its permitted
//! time windows. It is deterministic and does no I/O.
//!
//! Precedence is a correctness contract (first match wins):
//!
//! 1. `filtering_level == Off`        -> Allow
//! 2. domain in allow set             -> Allow  (parent override beats everything)
//! 3. domain in block set             -> Block
//! 4. outside all active time windows -> Block
//! 5. otherwise                       -> Defer  (classification required)

use std::collections::HashSet;

use chrono::{NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};

use crate::domain::normalize_listed_domain;
use crate::hash::hash_domain;

// =============================================================================
// Profile model
// =============================================================================

/// Classifier strictness selected by the parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FilteringLevel {
    Strict,
    #[default]
    Moderate,
    Custom,
    Off,
}

impl FilteringLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Strict => "strict",
            Self::Moderate => "moderate",
            Self::Custom => "custom",
            Self::Off => "off",
        }
    }
}

/// Per-category toggles, honored only when `filtering_level == Custom`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CustomSettings {
    pub block_adult: bool,
    pub block_violence: bool,
    pub block_gambling: bool,
    pub block_social_media: bool,
}

impl Default for CustomSettings {
    fn default() -> Self {
        Self {
            block_adult: true,
            block_violence: true,
            block_gambling: false,
            block_social_media: false,
        }
    }
}

/// One permitted window: day 0 = Sunday .. 6 = Saturday, times "HH:MM".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub day: u8,
    pub start: String,
    pub end: String,
}

impl TimeWindow {
    /// Minutes-since-midnight bounds, or `None` if the strings are malformed.
    /// Malformed windows are skipped at evaluation time (fail soft).
    fn minutes(&self) -> Option<(u32, u32)> {
        Some((parse_hhmm(&self.start)?, parse_hhmm(&self.end)?))
    }
}

fn parse_hhmm(s: &str) -> Option<u32> {
    let (h, m) = s.split_once(':')?;
    let h: u32 = h.parse().ok()?;
    let m: u32 = m.parse().ok()?;
    if h > 23 || m > 59 {
        return None;
    }
    Some(h * 60 + m)
}

/// Access schedule. When enabled, browsing outside every matching window of
/// the current weekday is blocked regardless of content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct TimeRestrictions {
    pub enabled: bool,
    pub schedule: Vec<TimeWindow>,
    /// Stored for the dashboard; not enforced by the decision pipeline.
    pub daily_limit_minutes: u32,
}

/// A monitored child profile. Owned by a parent account, referenced by the
/// device identifier the browser agent sends. Read-only at decision time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    pub parent_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    #[serde(default)]
    pub filtering_level: FilteringLevel,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub custom_settings: CustomSettings,
    #[serde(default)]
    pub allowed_domains: Vec<String>,
    #[serde(default)]
    pub blocked_domains: Vec<String>,
    #[serde(default)]
    pub time_restrictions: TimeRestrictions,
}

fn default_true() -> bool {
    true
}

// =============================================================================
// Domain sets
// =============================================================================

/// Compiled set of normalized domains, keyed by Murmur3 composite hash.
/// Built once per profile; membership checks do no string comparison.
#[derive(Debug, Clone, Default)]
pub struct DomainSet {
    keys: HashSet<u64>,
}

impl DomainSet {
    /// Build from raw profile entries. Entries that cannot be normalized
    /// into a domain key are dropped; duplicates collapse.
    pub fn from_entries<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut keys = HashSet::new();
        for entry in entries {
            if let Some(domain) = normalize_listed_domain(entry.as_ref()) {
                keys.insert(hash_domain(&domain).to_u64());
            }
        }
        Self { keys }
    }

    #[inline]
    pub fn contains(&self, domain: &str) -> bool {
        !self.keys.is_empty() && self.keys.contains(&hash_domain(domain).to_u64())
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

// =============================================================================
// Policy gate
// =============================================================================

/// Outcome of the static policy check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyDecision {
    Allow { reason: &'static str },
    Block { reason: &'static str },
    /// No static rule applies; external classification required.
    Defer,
}

/// The compiled, immutable decision view of one profile.
pub struct PolicyGate {
    level: FilteringLevel,
    allow: DomainSet,
    block: DomainSet,
    time: TimeRestrictions,
}

impl PolicyGate {
    pub fn new(profile: &Profile) -> Self {
        Self {
            level: profile.filtering_level,
            allow: DomainSet::from_entries(&profile.allowed_domains),
            block: DomainSet::from_entries(&profile.blocked_domains),
            time: profile.time_restrictions.clone(),
        }
    }

    pub fn level(&self) -> FilteringLevel {
        self.level
    }

    /// Evaluate the gate for a normalized domain at local time `now`.
    pub fn evaluate(&self, domain: &str, now: NaiveDateTime) -> PolicyDecision {
        if self.level == FilteringLevel::Off {
            return PolicyDecision::Allow {
                reason: "filtering_off",
            };
        }

        // Allow-list short-circuits even a blocked domain: the explicit
        // parent override wins.
        if self.allow.contains(domain) {
            return PolicyDecision::Allow {
                reason: "allowlisted",
            };
        }

        if self.block.contains(domain) {
            return PolicyDecision::Block {
                reason: "manual_blocklist",
            };
        }

        if self.time.enabled && !self.time.schedule.is_empty() && !self.in_allowed_window(now) {
            return PolicyDecision::Block {
                reason: "time_restriction",
            };
        }

        PolicyDecision::Defer
    }

    fn in_allowed_window(&self, now: NaiveDateTime) -> bool {
        use chrono::Datelike;
        let weekday = now.weekday().num_days_from_sunday() as u8;
        let minute_of_day = now.hour() * 60 + now.minute();

        self.time
            .schedule
            .iter()
            .filter(|w| w.day == weekday)
            .filter_map(|w| w.minutes())
            .any(|(start, end)| minute_of_day >= start && minute_of_day <= end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn profile() -> Profile {
        Profile {
            id: "child-1".into(),
            parent_id: "parent-1".into(),
            name: "Test Child".into(),
            device_id: Some("dev-123".into()),
            filtering_level: FilteringLevel::Moderate,
            is_active: true,
            custom_settings: CustomSettings::default(),
            allowed_domains: vec![],
            blocked_domains: vec![],
            time_restrictions: TimeRestrictions::default(),
        }
    }

    fn noon_monday() -> NaiveDateTime {
        // 2024-01-01 is a Monday
        NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_off_allows_everything() {
        let mut p = profile();
        p.filtering_level = FilteringLevel::Off;
        p.blocked_domains = vec!["bad.example".into()];
        let gate = PolicyGate::new(&p);
        assert_eq!(
            gate.evaluate("bad.example", noon_monday()),
            PolicyDecision::Allow { reason: "filtering_off" }
        );
    }

    #[test]
    fn test_allow_list_beats_block_list() {
        let mut p = profile();
        p.allowed_domains = vec!["example.com".into()];
        p.blocked_domains = vec!["example.com".into()];
        let gate = PolicyGate::new(&p);
        assert_eq!(
            gate.evaluate("example.com", noon_monday()),
            PolicyDecision::Allow { reason: "allowlisted" }
        );
    }

    #[test]
    fn test_block_list_hit() {
        let mut p = profile();
        p.blocked_domains = vec!["Example-Bad.test".into()];
        let gate = PolicyGate::new(&p);
        assert_eq!(
            gate.evaluate("example-bad.test", noon_monday()),
            PolicyDecision::Block { reason: "manual_blocklist" }
        );
    }

    #[test]
    fn test_unlisted_domain_defers() {
        let gate = PolicyGate::new(&profile());
        assert_eq!(gate.evaluate("neutral.example", noon_monday()), PolicyDecision::Defer);
    }

    #[test]
    fn test_time_window_blocks_outside() {
        let mut p = profile();
        p.time_restrictions = TimeRestrictions {
            enabled: true,
            schedule: vec![TimeWindow {
                day: 1, // Monday
                start: "08:00".into(),
                end: "10:00".into(),
            }],
            daily_limit_minutes: 0,
        };
        let gate = PolicyGate::new(&p);
        // Noon is outside the 08:00-10:00 window
        assert_eq!(
            gate.evaluate("neutral.example", noon_monday()),
            PolicyDecision::Block { reason: "time_restriction" }
        );

        let nine_am = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap();
        assert_eq!(gate.evaluate("neutral.example", nine_am), PolicyDecision::Defer);
    }

    #[test]
    fn test_no_window_for_weekday_blocks() {
        let mut p = profile();
        p.time_restrictions = TimeRestrictions {
            enabled: true,
            schedule: vec![TimeWindow {
                day: 0, // Sunday only
                start: "08:00".into(),
                end: "20:00".into(),
            }],
            daily_limit_minutes: 0,
        };
        let gate = PolicyGate::new(&p);
        assert_eq!(
            gate.evaluate("neutral.example", noon_monday()),
            PolicyDecision::Block { reason: "time_restriction" }
        );
    }

    #[test]
    fn test_allow_list_beats_time_restriction() {
        let mut p = profile();
        p.allowed_domains = vec!["school.example".into()];
        p.time_restrictions = TimeRestrictions {
            enabled: true,
            schedule: vec![TimeWindow {
                day: 0,
                start: "00:00".into(),
                end: "00:01".into(),
            }],
            daily_limit_minutes: 0,
        };
        let gate = PolicyGate::new(&p);
        assert_eq!(
            gate.evaluate("school.example", noon_monday()),
            PolicyDecision::Allow { reason: "allowlisted" }
        );
    }

    #[test]
    fn test_malformed_window_is_skipped() {
        let mut p = profile();
        p.time_restrictions = TimeRestrictions {
            enabled: true,
            schedule: vec![
                TimeWindow { day: 1, start: "nope".into(), end: "25:99".into() },
                TimeWindow { day: 1, start: "11:00".into(), end: "13:00".into() },
            ],
            daily_limit_minutes: 0,
        };
        let gate = PolicyGate::new(&p);
        assert_eq!(gate.evaluate("neutral.example", noon_monday()), PolicyDecision::Defer);
    }

    #[test]
    fn test_domain_set_normalizes_entries() {
        let set = DomainSet::from_entries(["https://WWW.Example.com/x", "dup.example", "dup.example", ""]);
        assert_eq!(set.len(), 2);
        assert!(set.contains("example.com"));
        assert!(set.contains("dup.example"));
        assert!(!set.contains("other.example"));
    }
}
