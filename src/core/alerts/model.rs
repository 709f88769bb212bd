// Alert model types: rule records, timing policies and style overrides.
//
// NOTE: the dashboard plugin reads these records from catalog.json.
// Keep field names stable when modifying data structures.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Arbitration priority. The discriminant is the numeric arbitration key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Priority {
    Low = 10,
    #[default]
    Med = 50,
    High = 90,
}

impl Priority {
    pub fn value(self) -> u8 {
        self as u8
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Low => "Low",
            Self::Med => "Med",
            Self::High => "High",
        }
    }
}

/// How an active message ends on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum PersistencePolicy {
    /// Hidden after `persistence_delay_ms`, but never before the minimum on-time.
    #[default]
    ClearAfterDelay,
    /// Hidden as soon as the evaluator stops reporting the condition.
    ClearOnStateChange,
    ClearOnValueIncrease,
    ClearOnValueDecrease,
    /// Only a session reset (or a manual cancel) removes it.
    PersistUntilSessionEnd,
    PersistUntilManualCancel,
}

impl PersistencePolicy {
    /// State-based policies drop the instance the first tick the evaluator
    /// reports not-triggered.
    pub fn clears_on_state(self) -> bool {
        matches!(
            self,
            Self::ClearOnStateChange | Self::ClearOnValueIncrease | Self::ClearOnValueDecrease
        )
    }
}

/// What a manual cancel does to the rule after dismissing its message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum CancelPolicy {
    #[default]
    SilenceForDelay,
    SuppressUntilStateChange,
    SuppressUntilSessionEnd,
}

/// Which output slot of the dashboard a message is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Channel {
    Primary,
    Secondary,
}

impl Channel {
    pub fn all() -> &'static [Channel] {
        &[Self::Primary, Self::Secondary]
    }
}

/// Optional per-rule style overrides. `None` falls back to the priority tier.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StyleOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outline_color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_size: Option<f32>,
}

/// Declarative alert definition. Immutable once the catalog is loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleRecord {
    /// Unique, case-insensitive.
    pub id: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default = "default_true")]
    pub primary_enabled: bool,
    #[serde(default)]
    pub secondary_enabled: bool,
    #[serde(default)]
    pub persistence: PersistencePolicy,
    #[serde(default = "default_persistence_delay")]
    pub persistence_delay_ms: u64,
    #[serde(default)]
    pub cancel_policy: CancelPolicy,
    #[serde(default)]
    pub cancel_delay_ms: u64,
    #[serde(default)]
    pub min_on_time_ms: u64,
    #[serde(default)]
    pub cooldown_ms: u64,
    /// Identifier of the evaluator in the registry.
    pub evaluator: String,
    #[serde(default)]
    pub template: String,
    #[serde(default)]
    pub style: StyleOverrides,
}

fn default_true() -> bool {
    true
}

fn default_persistence_delay() -> u64 {
    5_000
}

impl RuleRecord {
    /// Minimal record with dashboard defaults. Mostly useful for seeding and tests.
    pub fn new(id: impl Into<String>, evaluator: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            category: String::new(),
            priority: Priority::default(),
            primary_enabled: true,
            secondary_enabled: false,
            persistence: PersistencePolicy::default(),
            persistence_delay_ms: default_persistence_delay(),
            cancel_policy: CancelPolicy::default(),
            cancel_delay_ms: 0,
            min_on_time_ms: 0,
            cooldown_ms: 0,
            evaluator: evaluator.into(),
            template: String::new(),
            style: StyleOverrides::default(),
        }
    }

    /// Case-folded identifier used as the key of every per-rule map.
    pub fn key(&self) -> String {
        rule_key(&self.id)
    }

    pub fn enabled_on(&self, channel: Channel) -> bool {
        match channel {
            Channel::Primary => self.primary_enabled,
            Channel::Secondary => self.secondary_enabled,
        }
    }

    pub fn persistence_delay(&self) -> Duration {
        Duration::from_millis(self.persistence_delay_ms)
    }

    pub fn cancel_delay(&self) -> Duration {
        Duration::from_millis(self.cancel_delay_ms)
    }

    pub fn min_on_time(&self) -> Duration {
        Duration::from_millis(self.min_on_time_ms)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }
}

pub fn rule_key(id: &str) -> String {
    id.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_values_are_numeric_keys() {
        assert_eq!(Priority::Low.value(), 10);
        assert_eq!(Priority::Med.value(), 50);
        assert_eq!(Priority::High.value(), 90);
        assert!(Priority::High.value() > Priority::Med.value());
        assert_eq!(Priority::High.label(), "High");
    }

    #[test]
    fn test_state_based_policies() {
        assert!(PersistencePolicy::ClearOnStateChange.clears_on_state());
        assert!(PersistencePolicy::ClearOnValueIncrease.clears_on_state());
        assert!(PersistencePolicy::ClearOnValueDecrease.clears_on_state());
        assert!(!PersistencePolicy::ClearAfterDelay.clears_on_state());
        assert!(!PersistencePolicy::PersistUntilSessionEnd.clears_on_state());
        assert!(!PersistencePolicy::PersistUntilManualCancel.clears_on_state());
    }

    #[test]
    fn test_key_is_case_folded() {
        let rule = RuleRecord::new("Flag.Yellow", "flag.yellow");
        assert_eq!(rule.key(), "flag.yellow");
        assert_eq!(rule_key("  FUEL.Low "), "fuel.low");
    }

    #[test]
    fn test_record_defaults_from_sparse_json() {
        let rule: RuleRecord =
            serde_json::from_str(r#"{"id": "pit.limiter", "evaluator": "pit.limiter_off"}"#).unwrap();
        assert_eq!(rule.priority, Priority::Med);
        assert!(rule.primary_enabled);
        assert!(!rule.secondary_enabled);
        assert_eq!(rule.persistence, PersistencePolicy::ClearAfterDelay);
        assert_eq!(rule.persistence_delay_ms, 5_000);
        assert_eq!(rule.cancel_policy, CancelPolicy::SilenceForDelay);
        assert_eq!(rule.style, StyleOverrides::default());
    }
}
