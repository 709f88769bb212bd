use std::time::Duration;

use super::alerts::engine::AlertEngine;
use super::alerts::selector::OutputSnapshot;
use super::model::SignalSource;

pub struct CoordinatorOutput {
    pub snapshot: OutputSnapshot,
    /// Whether the snapshot differs from the one handed out last time.
    pub changed: bool,
}

/// Drives the engine on behalf of a host and tells it when the display
/// actually needs repainting.
pub struct Coordinator {
    engine: AlertEngine,
    last_published: Option<OutputSnapshot>,
}

impl Coordinator {
    pub fn new(engine: AlertEngine) -> Self {
        Self {
            engine,
            last_published: None,
        }
    }

    pub fn tick(&mut self, signals: &dyn SignalSource, now: Duration) -> CoordinatorOutput {
        self.engine.tick(signals, now);
        self.publish()
    }

    pub fn cancel_pressed(&mut self, now: Duration) -> CoordinatorOutput {
        self.engine.on_cancel_pressed(now);
        self.publish()
    }

    pub fn reset_session(&mut self) -> CoordinatorOutput {
        self.engine.reset_session();
        self.publish()
    }

    pub fn engine(&self) -> &AlertEngine {
        &self.engine
    }

    fn publish(&mut self) -> CoordinatorOutput {
        let snapshot = self.engine.snapshot().clone();
        let changed = self.last_published.as_ref() != Some(&snapshot);
        if changed {
            self.last_published = Some(snapshot.clone());
        }
        CoordinatorOutput { snapshot, changed }
    }
}
