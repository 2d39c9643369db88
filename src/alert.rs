use log::info;

/// Lifecycle of the tape change alert
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AlertPhase {
    #[default]
    Idle,
    Shown,
    /// Acknowledged by the user while the condition is still pending
    Dismissed,
}

/// Tracks the alert condition across polls
///
/// A dismissed alert only re-arms once a poll reports no pending tape change.
#[derive(Debug, Default)]
pub struct AlertManager {
    phase: AlertPhase,
}

impl AlertManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> AlertPhase {
        self.phase
    }

    pub fn is_shown(&self) -> bool {
        self.phase == AlertPhase::Shown
    }

    /// Feed the pending flag derived from the latest successful poll
    pub fn observe(&mut self, pending: bool) {
        let next = match (self.phase, pending) {
            (AlertPhase::Idle, true) => AlertPhase::Shown,
            (_, false) => AlertPhase::Idle,
            (phase, true) => phase,
        };

        if next != self.phase {
            info!("tape change alert: {:?} -> {:?}", self.phase, next);
            self.phase = next;
        }
    }

    /// Acknowledge a shown alert, returns whether anything changed
    pub fn dismiss(&mut self) -> bool {
        if self.phase != AlertPhase::Shown {
            return false;
        }
        info!("tape change alert dismissed");
        self.phase = AlertPhase::Dismissed;
        true
    }
}
