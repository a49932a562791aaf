//! Ordered first-match-wins rule tables for classifying free text.
//!
//! Provider event types and interview-stage titles are free-form strings.
//! Both are classified with a [`RuleTable`]: a list of `(pattern, class)`
//! pairs matched case-insensitively as substrings, in order. Tables are plain
//! data, so a host can load its own vocabulary instead of the defaults.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

/// What a CRM activity event counts toward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityKind {
    Outreach,
    Response,
}

/// Funnel bucket for an ATS interview stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageClass {
    Screen,
    Final,
    Offer,
    Hired,
    Ignore,
}

impl std::fmt::Display for StageClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StageClass::Screen => write!(f, "screen"),
            StageClass::Final => write!(f, "final"),
            StageClass::Offer => write!(f, "offer"),
            StageClass::Hired => write!(f, "hired"),
            StageClass::Ignore => write!(f, "ignore"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule<C> {
    pub pattern: String,
    pub class: C,
}

/// Serialized as a bare list of rules. Deserializing goes through
/// [`RuleTable::new`], so patterns loaded from data are lowercased too.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    from = "Vec<Rule<C>>",
    into = "Vec<Rule<C>>",
    bound(serialize = "C: Clone + Serialize", deserialize = "C: Copy + Deserialize<'de>")
)]
pub struct RuleTable<C> {
    rules: Vec<Rule<C>>,
}

impl<C: Copy> From<Vec<Rule<C>>> for RuleTable<C> {
    fn from(rules: Vec<Rule<C>>) -> Self {
        Self::new(rules.into_iter().map(|r| (r.pattern, r.class)))
    }
}

impl<C> From<RuleTable<C>> for Vec<Rule<C>> {
    fn from(table: RuleTable<C>) -> Self {
        table.rules
    }
}

impl<C: Copy> RuleTable<C> {
    /// Patterns are stored lowercased; order is preserved.
    pub fn new<P, I>(rules: I) -> Self
    where
        P: Into<String>,
        I: IntoIterator<Item = (P, C)>,
    {
        Self {
            rules: rules
                .into_iter()
                .map(|(pattern, class)| Rule {
                    pattern: pattern.into().to_lowercase(),
                    class,
                })
                .collect(),
        }
    }

    /// Class of the first rule whose pattern occurs in `text`.
    pub fn classify(&self, text: &str) -> Option<C> {
        let text = text.to_lowercase();
        self.rules
            .iter()
            .find(|r| !r.pattern.is_empty() && text.contains(&r.pattern))
            .map(|r| r.class)
    }

    pub fn rules(&self) -> &[Rule<C>] {
        &self.rules
    }
}

/// Outreach terms are listed before response terms, so an event type can
/// only be counted as a response when it failed outreach classification.
pub static DEFAULT_ACTIVITY_RULES: Lazy<RuleTable<ActivityKind>> = Lazy::new(|| {
    RuleTable::new([
        ("sent", ActivityKind::Outreach),
        ("outreach", ActivityKind::Outreach),
        ("contacted", ActivityKind::Outreach),
        ("sequence_step", ActivityKind::Outreach),
        ("replied", ActivityKind::Response),
        ("reply", ActivityKind::Response),
        ("responded", ActivityKind::Response),
        ("response", ActivityKind::Response),
    ])
});

pub static DEFAULT_STAGE_RULES: Lazy<RuleTable<StageClass>> = Lazy::new(|| {
    RuleTable::new([
        ("screen", StageClass::Screen),
        ("recruiter call", StageClass::Screen),
        ("phone", StageClass::Screen),
        ("onsite", StageClass::Final),
        ("on-site", StageClass::Final),
        ("panel", StageClass::Final),
        ("final", StageClass::Final),
        ("loop", StageClass::Final),
        ("offer", StageClass::Offer),
        ("hire", StageClass::Hired),
        ("start", StageClass::Hired),
        ("accept", StageClass::Hired),
        ("onboard", StageClass::Hired),
    ])
});

/// Heuristic bucket for a stage title; `Ignore` when nothing matches.
/// Used to pre-populate stage mappings, never at sync time.
pub fn classify_stage_name(name: &str) -> StageClass {
    DEFAULT_STAGE_RULES.classify(name).unwrap_or(StageClass::Ignore)
}
