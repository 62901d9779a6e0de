// src/session/state_machine.rs
//
// ALARM SESSION: lifecycle of one emergency incident.
//
//   Idle ──trigger──▶ Pending ──create ok──▶ Active ──cancel──▶ Cancelled ─▶ Idle
//                        │                     │
//                        └──create failed──▶ Idle (+ emergency-call fallback)
//
// `transition` is pure: it never performs I/O, it only returns the new
// state plus the effects (requests, notifications, persistence) the
// runtime must carry out. Request results come back in as events.

use super::store::PersistedSession;
use crate::dispatch::{AlarmStatus, CreateAlarmRequest};
use crate::pipeline::SessionNotification;
use crate::types::{Location, ServiceSelection};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlarmState {
    /// No incident
    Idle,
    /// Create request in flight
    Pending,
    /// Server confirmed the incident; id held
    Active,
    /// Incident closed. Only passed through on the way back to Idle.
    Cancelled,
}

impl AlarmState {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlarmState::Idle => "IDLE",
            AlarmState::Pending => "PENDING",
            AlarmState::Active => "ACTIVE",
            AlarmState::Cancelled => "CANCELLED",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionState {
    pub alarm_state: AlarmState,
    /// Some ⟺ alarm_state == Active
    pub active_alarm_id: Option<String>,
    pub last_known_location: Option<Location>,
    /// Sequence number of the create request currently in flight
    pub pending_request: Option<u64>,
    /// Fallback prompt shown and not yet acknowledged
    pub prompting_fallback: bool,
    next_request: u64,
}

impl SessionState {
    pub fn idle() -> Self {
        Self {
            alarm_state: AlarmState::Idle,
            active_alarm_id: None,
            last_known_location: None,
            pending_request: None,
            prompting_fallback: false,
            next_request: 1,
        }
    }

    pub fn is_active(&self) -> bool {
        self.alarm_state == AlarmState::Active
    }

    pub fn persisted(&self) -> PersistedSession {
        PersistedSession::new(
            self.alarm_state,
            self.active_alarm_id.clone(),
            self.last_known_location.clone(),
        )
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::idle()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Trigger {
        services: ServiceSelection,
        location: Location,
    },
    UpdateLocation(Location),
    Cancel {
        notify: bool,
    },
    CreateSucceeded {
        request: u64,
        alarm_id: String,
    },
    CreateFailed {
        request: u64,
        reason: String,
    },
    AcknowledgeFallback,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEffect {
    CreateAlarm {
        request: u64,
        payload: CreateAlarmRequest,
    },
    /// Best effort; the result never changes state
    UpdateLocation {
        alarm_id: String,
        location: Location,
    },
    /// Best effort; the result never changes state
    SetStatus {
        alarm_id: String,
        status: AlarmStatus,
    },
    Notify(SessionNotification),
    Persist(PersistedSession),
}

pub fn transition(state: &SessionState, event: SessionEvent) -> (SessionState, Vec<SessionEffect>) {
    let mut next = state.clone();
    let mut effects = Vec::new();

    match event {
        SessionEvent::Trigger { services, location } => {
            if let Err(e) = location.validate() {
                warn!("Trigger rejected, bad location: {}", e);
                effects.push(SessionEffect::Notify(SessionNotification::LocationRejected {
                    reason: e.to_string(),
                }));
                return (next, effects);
            }
            next.last_known_location = Some(location.clone());

            match state.alarm_state {
                AlarmState::Pending => {
                    debug!("Trigger dropped: create already in flight");
                }
                AlarmState::Active => {
                    // A second trigger never opens a second incident
                    if let Some(alarm_id) = state.active_alarm_id.clone() {
                        info!("🔁 Trigger while active → location refresh for {}", alarm_id);
                        effects.push(SessionEffect::UpdateLocation {
                            alarm_id: alarm_id.clone(),
                            location,
                        });
                        effects.push(SessionEffect::Notify(
                            SessionNotification::LocationRefreshed { alarm_id },
                        ));
                        effects.push(SessionEffect::Persist(next.persisted()));
                    }
                }
                AlarmState::Idle | AlarmState::Cancelled => {
                    let request = state.next_request;
                    next.next_request += 1;
                    next.pending_request = Some(request);
                    next.alarm_state = AlarmState::Pending;

                    if services.is_empty() {
                        warn!("Trigger without any service selected; dispatch decides");
                    }
                    info!(
                        "🚨 Trigger accepted (request #{}): services={} at {}",
                        request,
                        services.summary(),
                        location.describe()
                    );

                    push_state_change(&mut effects, state.alarm_state, AlarmState::Pending);
                    effects.push(SessionEffect::CreateAlarm {
                        request,
                        payload: CreateAlarmRequest { services, location },
                    });
                    effects.push(SessionEffect::Persist(next.persisted()));
                }
            }
        }

        SessionEvent::UpdateLocation(location) => {
            if let Err(e) = location.validate() {
                warn!("Location update rejected: {}", e);
                effects.push(SessionEffect::Notify(SessionNotification::LocationRejected {
                    reason: e.to_string(),
                }));
                return (next, effects);
            }
            next.last_known_location = Some(location.clone());

            if let (AlarmState::Active, Some(alarm_id)) =
                (state.alarm_state, state.active_alarm_id.clone())
            {
                effects.push(SessionEffect::UpdateLocation { alarm_id, location });
                effects.push(SessionEffect::Persist(next.persisted()));
            }
        }

        SessionEvent::Cancel { notify } => match state.alarm_state {
            AlarmState::Active => {
                next.alarm_state = AlarmState::Idle;
                let alarm_id = next.active_alarm_id.take();
                if let Some(id) = &alarm_id {
                    info!("🛑 Cancelling alarm {}", id);
                    effects.push(SessionEffect::SetStatus {
                        alarm_id: id.clone(),
                        status: AlarmStatus::Canceled,
                    });
                }
                push_cancelled(&mut effects, AlarmState::Active, alarm_id, notify);
                effects.push(SessionEffect::Persist(next.persisted()));
            }
            AlarmState::Pending => {
                // Cancel wins: forget the in-flight create. If it still
                // succeeds, the orphaned incident is closed on arrival.
                info!(
                    "🛑 Cancelling pending request #{}",
                    state.pending_request.unwrap_or_default()
                );
                next.alarm_state = AlarmState::Idle;
                next.pending_request = None;
                push_cancelled(&mut effects, AlarmState::Pending, None, notify);
                effects.push(SessionEffect::Persist(next.persisted()));
            }
            AlarmState::Idle | AlarmState::Cancelled => {
                debug!("Cancel ignored: no incident");
            }
        },

        SessionEvent::CreateSucceeded { request, alarm_id } => {
            if state.alarm_state == AlarmState::Pending && state.pending_request == Some(request) {
                next.alarm_state = AlarmState::Active;
                next.active_alarm_id = Some(alarm_id.clone());
                next.pending_request = None;
                next.prompting_fallback = false;

                info!("✅ Alarm {} active (request #{})", alarm_id, request);
                push_state_change(&mut effects, AlarmState::Pending, AlarmState::Active);
                effects.push(SessionEffect::Notify(SessionNotification::Submitted {
                    alarm_id,
                }));
                effects.push(SessionEffect::Persist(next.persisted()));
            } else {
                warn!(
                    "Create #{} succeeded after it was abandoned; closing orphan {}",
                    request, alarm_id
                );
                effects.push(SessionEffect::SetStatus {
                    alarm_id,
                    status: AlarmStatus::Canceled,
                });
            }
        }

        SessionEvent::CreateFailed { request, reason } => {
            if state.alarm_state != AlarmState::Pending || state.pending_request != Some(request) {
                debug!("Ignoring failure of abandoned create #{}", request);
                return (next, effects);
            }

            next.alarm_state = AlarmState::Idle;
            next.pending_request = None;
            warn!("❌ Create #{} failed: {}", request, reason);
            push_state_change(&mut effects, AlarmState::Pending, AlarmState::Idle);

            if state.prompting_fallback {
                debug!("Emergency-call prompt already showing; not stacking another");
            } else {
                next.prompting_fallback = true;
                effects.push(SessionEffect::Notify(
                    SessionNotification::EmergencyCallRequested { reason },
                ));
            }
            effects.push(SessionEffect::Persist(next.persisted()));
        }

        SessionEvent::AcknowledgeFallback => {
            next.prompting_fallback = false;
        }
    }

    (next, effects)
}

fn push_state_change(effects: &mut Vec<SessionEffect>, from: AlarmState, to: AlarmState) {
    effects.push(SessionEffect::Notify(SessionNotification::StateChanged {
        from,
        to,
    }));
}

fn push_cancelled(
    effects: &mut Vec<SessionEffect>,
    from: AlarmState,
    alarm_id: Option<String>,
    notify: bool,
) {
    push_state_change(effects, from, AlarmState::Cancelled);
    push_state_change(effects, AlarmState::Cancelled, AlarmState::Idle);
    effects.push(SessionEffect::Notify(SessionNotification::Cancelled {
        alarm_id,
        show_confirmation: notify,
    }));
}

/// Owned, injectable alarm session. One per device in production; tests
/// create as many as they like.
pub struct AlarmSession {
    state: SessionState,
}

impl AlarmSession {
    pub fn new() -> Self {
        Self {
            state: SessionState::idle(),
        }
    }

    /// Rebuild from durable storage. A create that was in flight when the
    /// process died has no known outcome and restores as Idle.
    pub fn restore(saved: PersistedSession) -> Self {
        let mut state = SessionState::idle();
        state.last_known_location = saved.last_known_location;

        match (saved.state, saved.active_alarm_id) {
            (AlarmState::Active, Some(alarm_id)) => {
                info!("♻️ Restored active alarm {}", alarm_id);
                state.alarm_state = AlarmState::Active;
                state.active_alarm_id = Some(alarm_id);
            }
            (AlarmState::Pending, _) => {
                warn!("Previous run died with a create in flight; its outcome is unknown");
            }
            (AlarmState::Active, None) => {
                warn!("Stored session was active without an alarm id; starting idle");
            }
            _ => {}
        }

        Self { state }
    }

    pub fn handle(&mut self, event: SessionEvent) -> Vec<SessionEffect> {
        let (next, effects) = transition(&self.state, event);
        self.state = next;
        effects
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn alarm_state(&self) -> AlarmState {
        self.state.alarm_state
    }

    pub fn active_alarm_id(&self) -> Option<&str> {
        self.state.active_alarm_id.as_deref()
    }
}

impl Default for AlarmSession {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Coordinates, PostalAddress};

    fn grounds() -> Location {
        Location::Coordinates(Coordinates {
            lat: 38.03,
            lng: -78.48,
            accuracy: 5,
        })
    }

    fn police() -> ServiceSelection {
        ServiceSelection {
            police: true,
            fire: false,
            medical: false,
        }
    }

    fn trigger() -> SessionEvent {
        SessionEvent::Trigger {
            services: police(),
            location: grounds(),
        }
    }

    fn creates(effects: &[SessionEffect]) -> Vec<u64> {
        effects
            .iter()
            .filter_map(|e| match e {
                SessionEffect::CreateAlarm { request, .. } => Some(*request),
                _ => None,
            })
            .collect()
    }

    fn status_updates(effects: &[SessionEffect]) -> Vec<String> {
        effects
            .iter()
            .filter_map(|e| match e {
                SessionEffect::SetStatus { alarm_id, .. } => Some(alarm_id.clone()),
                _ => None,
            })
            .collect()
    }

    fn fallbacks(effects: &[SessionEffect]) -> usize {
        effects
            .iter()
            .filter(|e| {
                matches!(
                    e,
                    SessionEffect::Notify(SessionNotification::EmergencyCallRequested { .. })
                )
            })
            .count()
    }

    fn assert_id_matches_state(session: &AlarmSession) {
        assert_eq!(
            session.active_alarm_id().is_some(),
            session.alarm_state() == AlarmState::Active
        );
    }

    fn active_session(alarm_id: &str) -> AlarmSession {
        let mut session = AlarmSession::new();
        session.handle(trigger());
        session.handle(SessionEvent::CreateSucceeded {
            request: 1,
            alarm_id: alarm_id.to_string(),
        });
        session
    }

    #[test]
    fn test_trigger_sends_documented_create() {
        let mut session = AlarmSession::new();
        let effects = session.handle(trigger());

        assert_eq!(session.alarm_state(), AlarmState::Pending);
        let payload = effects
            .iter()
            .find_map(|e| match e {
                SessionEffect::CreateAlarm { payload, .. } => Some(payload.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(
            serde_json::to_value(&payload).unwrap(),
            serde_json::json!({
                "services": {"police": true, "fire": false, "medical": false},
                "location": {"coordinates": {"lat": 38.03, "lng": -78.48, "accuracy": 5}}
            })
        );

        let effects = session.handle(SessionEvent::CreateSucceeded {
            request: 1,
            alarm_id: "abc123".to_string(),
        });
        assert_eq!(session.alarm_state(), AlarmState::Active);
        assert_eq!(session.active_alarm_id(), Some("abc123"));
        assert!(effects.contains(&SessionEffect::Notify(SessionNotification::Submitted {
            alarm_id: "abc123".to_string()
        })));
        assert_id_matches_state(&session);
    }

    #[test]
    fn test_duplicate_trigger_while_pending_is_dropped() {
        let mut session = AlarmSession::new();
        let first = session.handle(trigger());
        let second = session.handle(trigger());

        assert_eq!(creates(&first), vec![1]);
        assert!(creates(&second).is_empty());
        assert_eq!(session.alarm_state(), AlarmState::Pending);
    }

    #[test]
    fn test_trigger_while_active_updates_instead() {
        let mut session = active_session("abc123");
        let moved = Location::Coordinates(Coordinates {
            lat: 38.04,
            lng: -78.49,
            accuracy: 7,
        });

        let effects = session.handle(SessionEvent::Trigger {
            services: ServiceSelection::all(),
            location: moved.clone(),
        });

        assert!(creates(&effects).is_empty());
        assert!(effects.contains(&SessionEffect::UpdateLocation {
            alarm_id: "abc123".to_string(),
            location: moved,
        }));
        assert_eq!(session.active_alarm_id(), Some("abc123"));
    }

    #[test]
    fn test_update_location_only_when_active() {
        let mut session = AlarmSession::new();
        let effects = session.handle(SessionEvent::UpdateLocation(grounds()));
        assert!(effects.is_empty());
        assert_eq!(session.state().last_known_location, Some(grounds()));

        let mut session = active_session("abc123");
        let effects = session.handle(SessionEvent::UpdateLocation(grounds()));
        assert!(matches!(
            effects.first(),
            Some(SessionEffect::UpdateLocation { alarm_id, .. }) if alarm_id == "abc123"
        ));
    }

    #[test]
    fn test_cancel_is_idempotent() {
        let mut session = active_session("abc123");

        let first = session.handle(SessionEvent::Cancel { notify: true });
        let second = session.handle(SessionEvent::Cancel { notify: true });

        assert_eq!(status_updates(&first), vec!["abc123".to_string()]);
        assert!(second.is_empty());
        assert_eq!(session.alarm_state(), AlarmState::Idle);
        assert_id_matches_state(&session);
    }

    #[test]
    fn test_cancel_passes_through_cancelled() {
        let mut session = active_session("abc123");
        let effects = session.handle(SessionEvent::Cancel { notify: false });

        let changes: Vec<_> = effects
            .iter()
            .filter_map(|e| match e {
                SessionEffect::Notify(SessionNotification::StateChanged { from, to }) => {
                    Some((*from, *to))
                }
                _ => None,
            })
            .collect();
        assert_eq!(
            changes,
            vec![
                (AlarmState::Active, AlarmState::Cancelled),
                (AlarmState::Cancelled, AlarmState::Idle)
            ]
        );
        assert!(effects.contains(&SessionEffect::Notify(SessionNotification::Cancelled {
            alarm_id: Some("abc123".to_string()),
            show_confirmation: false,
        })));
    }

    #[test]
    fn test_cancel_while_pending_wins_over_late_success() {
        let mut session = AlarmSession::new();
        session.handle(trigger());
        session.handle(SessionEvent::Cancel { notify: true });
        assert_eq!(session.alarm_state(), AlarmState::Idle);

        // The create lands after the user cancelled
        let effects = session.handle(SessionEvent::CreateSucceeded {
            request: 1,
            alarm_id: "late".to_string(),
        });

        assert_eq!(session.alarm_state(), AlarmState::Idle);
        assert_eq!(session.active_alarm_id(), None);
        assert_eq!(status_updates(&effects), vec!["late".to_string()]);
    }

    #[test]
    fn test_trigger_after_cancel_starts_fresh_cycle() {
        let mut session = AlarmSession::new();
        session.handle(trigger());
        session.handle(SessionEvent::Cancel { notify: true });

        let effects = session.handle(trigger());
        assert_eq!(creates(&effects), vec![2]);
        assert_eq!(session.alarm_state(), AlarmState::Pending);

        // The stale first request cannot complete the new cycle
        session.handle(SessionEvent::CreateSucceeded {
            request: 1,
            alarm_id: "stale".to_string(),
        });
        assert_eq!(session.alarm_state(), AlarmState::Pending);

        session.handle(SessionEvent::CreateSucceeded {
            request: 2,
            alarm_id: "fresh".to_string(),
        });
        assert_eq!(session.active_alarm_id(), Some("fresh"));
    }

    #[test]
    fn test_failure_falls_back_once_per_window() {
        let mut session = AlarmSession::new();

        session.handle(trigger());
        let effects = session.handle(SessionEvent::CreateFailed {
            request: 1,
            reason: "connection refused".to_string(),
        });
        assert_eq!(session.alarm_state(), AlarmState::Idle);
        assert_eq!(fallbacks(&effects), 1);

        // Gesture frames keep re-triggering while the network is down
        for request in 2..6 {
            session.handle(trigger());
            let effects = session.handle(SessionEvent::CreateFailed {
                request,
                reason: "connection refused".to_string(),
            });
            assert_eq!(fallbacks(&effects), 0);
            assert_eq!(session.alarm_state(), AlarmState::Idle);
        }

        session.handle(SessionEvent::AcknowledgeFallback);
        session.handle(trigger());
        let effects = session.handle(SessionEvent::CreateFailed {
            request: 6,
            reason: "timeout".to_string(),
        });
        assert_eq!(fallbacks(&effects), 1);
    }

    #[test]
    fn test_success_clears_fallback_latch() {
        let mut session = AlarmSession::new();
        session.handle(trigger());
        session.handle(SessionEvent::CreateFailed {
            request: 1,
            reason: "timeout".to_string(),
        });
        assert!(session.state().prompting_fallback);

        session.handle(trigger());
        session.handle(SessionEvent::CreateSucceeded {
            request: 2,
            alarm_id: "abc123".to_string(),
        });
        assert!(!session.state().prompting_fallback);
    }

    #[test]
    fn test_invalid_location_is_reported_not_fatal() {
        let mut session = AlarmSession::new();
        let empty = Location::Address(PostalAddress {
            line1: String::new(),
            line2: String::new(),
            city: String::new(),
            state: String::new(),
            zip: String::new(),
        });

        let effects = session.handle(SessionEvent::Trigger {
            services: police(),
            location: empty,
        });

        assert_eq!(session.alarm_state(), AlarmState::Idle);
        assert!(matches!(
            effects.as_slice(),
            [SessionEffect::Notify(SessionNotification::LocationRejected { .. })]
        ));
    }

    #[test]
    fn test_address_location_updates_active_alarm() {
        let mut session = active_session("abc123");
        let address = Location::Address(PostalAddress {
            line1: "85 Engineers Way".to_string(),
            line2: String::new(),
            city: "Charlottesville".to_string(),
            state: "VA".to_string(),
            zip: "22904".to_string(),
        });

        let effects = session.handle(SessionEvent::UpdateLocation(address.clone()));
        assert!(effects.contains(&SessionEffect::UpdateLocation {
            alarm_id: "abc123".to_string(),
            location: address,
        }));
    }

    #[test]
    fn test_empty_selection_still_triggers() {
        let mut session = AlarmSession::new();
        let effects = session.handle(SessionEvent::Trigger {
            services: ServiceSelection::default(),
            location: grounds(),
        });
        assert_eq!(creates(&effects), vec![1]);
    }

    #[test]
    fn test_restore_policies() {
        let active = PersistedSession::new(
            AlarmState::Active,
            Some("abc123".to_string()),
            Some(grounds()),
        );
        let session = AlarmSession::restore(active);
        assert_eq!(session.alarm_state(), AlarmState::Active);
        assert_eq!(session.active_alarm_id(), Some("abc123"));

        let pending = PersistedSession::new(AlarmState::Pending, None, Some(grounds()));
        let session = AlarmSession::restore(pending);
        assert_eq!(session.alarm_state(), AlarmState::Idle);
        assert_eq!(session.state().last_known_location, Some(grounds()));

        let broken = PersistedSession::new(AlarmState::Active, None, None);
        let session = AlarmSession::restore(broken);
        assert_eq!(session.alarm_state(), AlarmState::Idle);
        assert_id_matches_state(&session);
    }
}
