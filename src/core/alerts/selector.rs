// Channel selection: at most one message per dashboard slot, by priority.

use serde::{Deserialize, Serialize};

use super::instance::MessageInstance;
use super::model::Channel;
use super::store::MessageStore;
use super::style::{resolve_style, ResolvedStyle};

/// What one dashboard slot shows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelMessage {
    pub rule_id: String,
    pub text: String,
    /// Priority label ("High", "Med", "Low")
    pub priority: String,
    pub style: ResolvedStyle,
}

impl ChannelMessage {
    fn from_instance(instance: &MessageInstance) -> Self {
        Self {
            rule_id: instance.rule.id.clone(),
            text: instance.text.clone(),
            priority: instance.rule.priority.label().to_string(),
            style: resolve_style(&instance.rule),
        }
    }
}

/// Read-only view handed to the host after every tick or cancel.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutputSnapshot {
    pub primary: Option<ChannelMessage>,
    pub secondary: Option<ChannelMessage>,
    /// All active instances, shown or not
    pub active_count: usize,
    /// Identifier of the rule dismissed most recently
    pub last_cancelled: Option<String>,
    /// Raised for a short while after a clear-all
    pub clear_all_pulse: bool,
    /// Evaluator identifiers with no registered evaluator
    pub unresolved_bindings: Vec<String>,
}

impl OutputSnapshot {
    pub fn channel(&self, channel: Channel) -> Option<&ChannelMessage> {
        match channel {
            Channel::Primary => self.primary.as_ref(),
            Channel::Secondary => self.secondary.as_ref(),
        }
    }
}

/// Highest priority first; ties go to the most recently updated instance and
/// then to the lowest key so the result never depends on map order.
pub fn pick<'a>(store: &'a MessageStore, channel: Channel) -> Option<(&'a String, &'a MessageInstance)> {
    store
        .active()
        .filter(|(_, inst)| inst.rule.enabled_on(channel))
        .max_by(|(ka, a), (kb, b)| {
            a.rule
                .priority
                .value()
                .cmp(&b.rule.priority.value())
                .then(a.updated_at.cmp(&b.updated_at))
                .then(kb.cmp(ka))
        })
}

/// Rule keys ordered from most to least recently shown.
#[derive(Debug, Default)]
pub struct RecencyStack {
    keys: Vec<String>,
}

impl RecencyStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn touch(&mut self, key: &str) {
        self.keys.retain(|k| k != key);
        self.keys.insert(0, key.to_string());
    }

    pub fn forget(&mut self, key: &str) {
        self.keys.retain(|k| k != key);
    }

    pub fn clear(&mut self) {
        self.keys.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.keys.iter()
    }

    pub fn front(&self) -> Option<&String> {
        self.keys.first()
    }
}

/// Recompute both channels. The primary pick is touched last so it ends up
/// on top of the recency stack when both slots are showing something.
pub fn select_channels(store: &MessageStore, recency: &mut RecencyStack) -> (Option<ChannelMessage>, Option<ChannelMessage>) {
    let secondary = pick(store, Channel::Secondary);
    let primary = pick(store, Channel::Primary);

    if let Some((key, _)) = secondary {
        recency.touch(key);
    }
    if let Some((key, _)) = primary {
        recency.touch(key);
    }

    (
        primary.map(|(_, inst)| ChannelMessage::from_instance(inst)),
        secondary.map(|(_, inst)| ChannelMessage::from_instance(inst)),
    )
}
