// Cancel button protocol: single press dismisses, double press clears all.

use std::time::Duration;

pub const DEFAULT_DOUBLE_TAP_WINDOW: Duration = Duration::from_millis(350);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelAction {
    /// Dismiss the most recently shown message.
    DismissLatest,
    /// Dismiss every active message.
    ClearAll,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CancelState {
    Idle,
    Armed { pressed_at: Duration },
}

#[derive(Debug)]
pub struct CancelController {
    state: CancelState,
    window: Duration,
}

impl CancelController {
    pub fn new(window: Duration) -> Self {
        Self {
            state: CancelState::Idle,
            window,
        }
    }

    pub fn on_press(&mut self, now: Duration) -> CancelAction {
        match self.state {
            CancelState::Armed { pressed_at } if now.saturating_sub(pressed_at) < self.window => {
                self.state = CancelState::Idle;
                CancelAction::ClearAll
            }
            _ => {
                self.state = CancelState::Armed { pressed_at: now };
                CancelAction::DismissLatest
            }
        }
    }

    pub fn is_armed(&self) -> bool {
        matches!(self.state, CancelState::Armed { .. })
    }

    pub fn reset(&mut self) {
        self.state = CancelState::Idle;
    }
}

impl Default for CancelController {
    fn default() -> Self {
        Self::new(DEFAULT_DOUBLE_TAP_WINDOW)
    }
}
