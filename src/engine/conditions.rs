//! Heuristic reading of namespace status conditions
//!
//! The namespace controller explains what blocks termination only in free-form
//! condition messages. Matching that text is best-effort: wording is not a
//! stable contract and the patterns are not exhaustive.

use crate::k8s::NamespaceCondition;
use regex::Regex;
use std::sync::LazyLock;

static FINALIZERS_REMAINING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)finalizers?\s+remaining").expect("static regex")
});

static RESOURCES_REMAINING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)resources?\s+(?:are\s+)?remaining").expect("static regex")
});

/// What the namespace controller says is still blocking deletion
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConditionFlags {
    /// Message of the last condition mentioning remaining finalizers
    pub finalizers_message: Option<String>,
    /// Message of the last condition mentioning remaining resources
    pub resources_message: Option<String>,
}

impl ConditionFlags {
    pub fn has_finalizers_remaining(&self) -> bool {
        self.finalizers_message.is_some()
    }

    pub fn has_resources_remaining(&self) -> bool {
        self.resources_message.is_some()
    }

    /// Either signal present
    pub fn any(&self) -> bool {
        self.has_finalizers_remaining() || self.has_resources_remaining()
    }
}

pub fn classify(conditions: &[NamespaceCondition]) -> ConditionFlags {
    let mut flags = ConditionFlags::default();
    for condition in conditions {
        let Some(message) = condition.message.as_deref() else {
            continue;
        };
        if FINALIZERS_REMAINING.is_match(message) {
            flags.finalizers_message = Some(message.to_string());
        }
        if RESOURCES_REMAINING.is_match(message) {
            flags.resources_message = Some(message.to_string());
        }
    }
    flags
}
