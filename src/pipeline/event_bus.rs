// src/pipeline/event_bus.rs
//
// Session notifications. The session publishes at the moment it mutates
// state; subscribers (UI, the gesture pipeline) each get their own queue
// and never reach into the session directly.

use crate::session::AlarmState;
use std::collections::VecDeque;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOperation {
    LocationUpdate,
    StatusUpdate,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionNotification {
    StateChanged {
        from: AlarmState,
        to: AlarmState,
    },

    /// Incident created; the user may still cancel it
    Submitted {
        alarm_id: String,
    },

    /// A trigger while active was turned into a location refresh
    LocationRefreshed {
        alarm_id: String,
    },

    Cancelled {
        alarm_id: Option<String>,
        /// False when the cancel came from teardown and should stay silent
        show_confirmation: bool,
    },

    /// Dispatch unreachable; ask the user to place an emergency call
    EmergencyCallRequested {
        reason: String,
    },

    LocationRejected {
        reason: String,
    },

    /// A best-effort request did not go through. State is unaffected.
    DeliveryFailed {
        operation: DeliveryOperation,
        alarm_id: String,
        reason: String,
    },
}

impl SessionNotification {
    /// Text for the user, if this notification is meant to be shown.
    pub fn user_message(&self) -> Option<String> {
        match self {
            SessionNotification::Submitted { .. } => {
                Some("Help is on the way. Tap to cancel the alarm.".to_string())
            }
            SessionNotification::LocationRefreshed { .. } => {
                Some("Updated. Hang in there!".to_string())
            }
            SessionNotification::Cancelled {
                show_confirmation: true,
                ..
            } => Some("Alarm cancelled.".to_string()),
            SessionNotification::EmergencyCallRequested { .. } => {
                Some("Could not reach dispatch. Call 911 now?".to_string())
            }
            SessionNotification::DeliveryFailed { operation, .. } => Some(match operation {
                DeliveryOperation::LocationUpdate => "Failed to update your location.".to_string(),
                DeliveryOperation::StatusUpdate => "Failed to cancel the alarm.".to_string(),
            }),
            SessionNotification::LocationRejected { reason } => {
                Some(format!("Location unavailable: {}", reason))
            }
            SessionNotification::StateChanged { .. }
            | SessionNotification::Cancelled {
                show_confirmation: false,
                ..
            } => None,
        }
    }
}

pub struct NotificationBus {
    subscribers: Vec<mpsc::UnboundedSender<SessionNotification>>,
    recent: VecDeque<SessionNotification>,
    max_recent: usize,
}

impl NotificationBus {
    pub fn new(max_recent: usize) -> Self {
        Self {
            subscribers: Vec::new(),
            recent: VecDeque::with_capacity(max_recent),
            max_recent,
        }
    }

    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<SessionNotification> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.push(tx);
        rx
    }

    pub fn publish(&mut self, notification: SessionNotification) {
        match &notification {
            SessionNotification::StateChanged { from, to } => {
                debug!("Session {} → {}", from.as_str(), to.as_str());
            }
            SessionNotification::EmergencyCallRequested { reason } => {
                warn!("📞 Emergency-call fallback requested: {}", reason);
            }
            other => {
                if let Some(message) = other.user_message() {
                    info!("📣 {}", message);
                }
            }
        }

        // Subscribers that hung up are dropped
        self.subscribers
            .retain(|tx| tx.send(notification.clone()).is_ok());

        if self.max_recent > 0 {
            if self.recent.len() >= self.max_recent {
                self.recent.pop_front();
            }
            self.recent.push_back(notification);
        }
    }

    pub fn recent(&self) -> impl Iterator<Item = &SessionNotification> {
        self.recent.iter()
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

impl Default for NotificationBus {
    fn default() -> Self {
        Self::new(32)
    }
}
