// Message instance store: active instances plus the cooldown and suppression
// maps, all keyed by the case-folded rule identifier.

use std::collections::HashMap;
use std::time::Duration;

use super::instance::MessageInstance;

/// Post-cancel dormancy for one rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Suppression {
    /// Blocked until the absolute timestamp.
    Until(Duration),
    /// Blocked while the evaluator keeps reporting the same token.
    WhileToken(String),
    /// Blocked until the next session reset.
    Session,
}

#[derive(Debug, Default)]
pub struct MessageStore {
    /// At most one live instance per rule
    active: HashMap<String, MessageInstance>,
    /// Rule may not re-activate before this time
    cooldown_until: HashMap<String, Duration>,
    /// Post-cancel blocks, dropped lazily once they stop applying
    suppressions: HashMap<String, Suppression>,
}

impl MessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&MessageInstance> {
        self.active.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut MessageInstance> {
        self.active.get_mut(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.active.contains_key(key)
    }

    pub fn insert(&mut self, key: String, instance: MessageInstance) {
        self.active.insert(key, instance);
    }

    pub fn active(&self) -> impl Iterator<Item = (&String, &MessageInstance)> {
        self.active.iter()
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn active_keys(&self) -> Vec<String> {
        self.active.keys().cloned().collect()
    }

    /// Drop an instance and start its rule's cooldown.
    pub fn remove(&mut self, key: &str, now: Duration) -> Option<MessageInstance> {
        let instance = self.active.remove(key)?;
        let cooldown = instance.rule.cooldown();
        if !cooldown.is_zero() {
            self.cooldown_until.insert(key.to_string(), now + cooldown);
        }
        Some(instance)
    }

    pub fn is_cooling_down(&self, key: &str, now: Duration) -> bool {
        self.cooldown_until.get(key).is_some_and(|until| now < *until)
    }

    pub fn cooldown_until(&self, key: &str) -> Option<Duration> {
        self.cooldown_until.get(key).copied()
    }

    pub fn suppress(&mut self, key: String, suppression: Suppression) {
        self.suppressions.insert(key, suppression);
    }

    pub fn suppression(&self, key: &str) -> Option<&Suppression> {
        self.suppressions.get(key)
    }

    /// Whether a trigger carrying `token` is still blocked. Entries that no
    /// longer apply are dropped on the spot.
    pub fn is_suppressed(&mut self, key: &str, token: &str, now: Duration) -> bool {
        let blocked = match self.suppressions.get(key) {
            None => return false,
            Some(Suppression::Until(until)) => now < *until,
            Some(Suppression::WhileToken(recorded)) => recorded == token,
            Some(Suppression::Session) => true,
        };
        if !blocked {
            self.suppressions.remove(key);
        }
        blocked
    }

    /// Forget everything: instances, cooldowns and suppressions.
    pub fn clear(&mut self) {
        self.active.clear();
        self.cooldown_until.clear();
        self.suppressions.clear();
    }

    pub fn has_timing_state(&self) -> bool {
        !self.cooldown_until.is_empty() || !self.suppressions.is_empty()
    }
}
