// src/session/runtime.rs
//
// Single task that owns the alarm session. Every transition (user
// commands, location fixes and dispatch results) passes through one
// command queue, so state is only ever mutated in one place and in
// arrival order. Network calls run as separate tasks and report back
// through the same queue.

use super::state_machine::{AlarmSession, AlarmState, SessionEffect, SessionEvent, SessionState};
use super::store::SessionStore;
use crate::dispatch::{AlarmApi, DispatchError};
use crate::location::LocationError;
use crate::pipeline::{DeliveryOperation, NotificationBus, PipelineMetrics, SessionNotification};
use crate::types::{Location, ServiceSelection};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, error, info, warn};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("invalid location")]
    InvalidLocation(#[from] LocationError),

    #[error("alarm session has stopped")]
    Closed,
}

enum SessionCommand {
    Event(SessionEvent),
    /// Result of a spawned create request
    CreateFinished(SessionEvent),
    DeliveryFailed {
        operation: DeliveryOperation,
        alarm_id: String,
        reason: String,
    },
    Snapshot(oneshot::Sender<SessionState>),
    Shutdown {
        cancel_active: bool,
        grace: Duration,
        done: oneshot::Sender<()>,
    },
}

/// Cheap, cloneable entry point used by the UI, gesture and voice paths alike.
#[derive(Clone)]
pub struct SessionHandle {
    tx: mpsc::UnboundedSender<SessionCommand>,
}

impl SessionHandle {
    pub fn trigger(
        &self,
        services: ServiceSelection,
        location: Location,
    ) -> Result<(), SessionError> {
        location.validate()?;
        self.send(SessionEvent::Trigger { services, location })
    }

    pub fn update_location(&self, location: Location) -> Result<(), SessionError> {
        location.validate()?;
        self.send(SessionEvent::UpdateLocation(location))
    }

    pub fn cancel(&self, notify: bool) -> Result<(), SessionError> {
        self.send(SessionEvent::Cancel { notify })
    }

    /// The user dealt with the emergency-call prompt; later failures may prompt again.
    pub fn acknowledge_fallback(&self) -> Result<(), SessionError> {
        self.send(SessionEvent::AcknowledgeFallback)
    }

    pub async fn snapshot(&self) -> Result<SessionState, SessionError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(SessionCommand::Snapshot(reply))
            .map_err(|_| SessionError::Closed)?;
        rx.await.map_err(|_| SessionError::Closed)
    }

    /// Stop the session task. With `cancel_active`, an active or pending
    /// incident is cancelled silently. Creates still in flight are waited on
    /// for up to `grace` so an incident opened by one of them is closed too.
    pub async fn shutdown(&self, cancel_active: bool, grace: Duration) -> Result<(), SessionError> {
        let (done, rx) = oneshot::channel();
        self.tx
            .send(SessionCommand::Shutdown {
                cancel_active,
                grace,
                done,
            })
            .map_err(|_| SessionError::Closed)?;
        rx.await.map_err(|_| SessionError::Closed)
    }

    fn send(&self, event: SessionEvent) -> Result<(), SessionError> {
        self.tx
            .send(SessionCommand::Event(event))
            .map_err(|_| SessionError::Closed)
    }
}

pub struct SessionRuntime<A: AlarmApi> {
    session: AlarmSession,
    api: Arc<A>,
    store: Box<dyn SessionStore>,
    bus: NotificationBus,
    metrics: PipelineMetrics,
    creates_in_flight: usize,
    // Weak so the task ends once every handle is gone
    tx: mpsc::WeakUnboundedSender<SessionCommand>,
    rx: mpsc::UnboundedReceiver<SessionCommand>,
}

impl<A: AlarmApi> SessionRuntime<A> {
    pub fn spawn(
        session: AlarmSession,
        api: Arc<A>,
        store: Box<dyn SessionStore>,
        bus: NotificationBus,
        metrics: PipelineMetrics,
    ) -> (SessionHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let runtime = Self {
            session,
            api,
            store,
            bus,
            metrics,
            creates_in_flight: 0,
            tx: tx.downgrade(),
            rx,
        };
        let task = tokio::spawn(runtime.run());
        (SessionHandle { tx }, task)
    }

    async fn run(mut self) {
        info!(
            "🛡 Alarm session running (state={}, alarm={:?})",
            self.session.alarm_state().as_str(),
            self.session.active_alarm_id()
        );

        while let Some(command) = self.rx.recv().await {
            match command {
                SessionCommand::Event(event) => {
                    let effects = self.session.handle(event);
                    self.apply(effects);
                }
                SessionCommand::CreateFinished(event) => {
                    self.creates_in_flight = self.creates_in_flight.saturating_sub(1);
                    let effects = self.session.handle(event);
                    self.apply(effects);
                }
                SessionCommand::DeliveryFailed {
                    operation,
                    alarm_id,
                    reason,
                } => self.publish_delivery_failure(operation, alarm_id, reason),
                SessionCommand::Snapshot(reply) => {
                    let _ = reply.send(self.session.state().clone());
                }
                SessionCommand::Shutdown {
                    cancel_active,
                    grace,
                    done,
                } => {
                    if cancel_active {
                        if matches!(
                            self.session.alarm_state(),
                            AlarmState::Active | AlarmState::Pending
                        ) {
                            let effects = self.session.handle(SessionEvent::Cancel { notify: false });
                            self.apply_before_exit(effects).await;
                        }
                        self.finish_creates(grace).await;
                    }
                    let _ = done.send(());
                    break;
                }
            }
        }

        info!("🛡 Alarm session stopped");
    }

    fn apply(&mut self, effects: Vec<SessionEffect>) {
        for effect in effects {
            match effect {
                SessionEffect::CreateAlarm { request, payload } => {
                    self.metrics.inc(&self.metrics.triggers);
                    let Some(tx) = self.tx.upgrade() else {
                        warn!("Session handles gone; dropping create #{}", request);
                        continue;
                    };
                    let api = Arc::clone(&self.api);
                    let metrics = self.metrics.clone();
                    self.creates_in_flight += 1;

                    tokio::spawn(async move {
                        let event = match api.create_alarm(payload).await {
                            Ok(alarm_id) => {
                                metrics.inc(&metrics.alarms_created);
                                SessionEvent::CreateSucceeded { request, alarm_id }
                            }
                            Err(e) => {
                                metrics.inc(&metrics.create_failures);
                                SessionEvent::CreateFailed {
                                    request,
                                    reason: e.to_string(),
                                }
                            }
                        };
                        if tx.send(SessionCommand::CreateFinished(event)).is_err() {
                            warn!("Session stopped before create #{} completed", request);
                        }
                    });
                }

                SessionEffect::UpdateLocation { alarm_id, location } => {
                    let api = Arc::clone(&self.api);
                    let tx = self.tx.upgrade();
                    tokio::spawn(async move {
                        // Best effort: the outcome is reported, never applied to state
                        if let Err(e) = api.update_alarm_location(&alarm_id, &location).await {
                            report_delivery_failure(
                                tx,
                                DeliveryOperation::LocationUpdate,
                                alarm_id,
                                e,
                            );
                        }
                    });
                }

                SessionEffect::SetStatus { alarm_id, status } => {
                    let api = Arc::clone(&self.api);
                    let tx = self.tx.upgrade();
                    tokio::spawn(async move {
                        if let Err(e) = api.set_alarm_status(&alarm_id, status).await {
                            report_delivery_failure(tx, DeliveryOperation::StatusUpdate, alarm_id, e);
                        }
                    });
                }

                SessionEffect::Notify(notification) => self.bus.publish(notification),

                SessionEffect::Persist(snapshot) => {
                    if let Err(e) = self.store.save(&snapshot) {
                        error!("Failed to persist alarm session: {:#}", e);
                    }
                }
            }
        }
    }

    fn publish_delivery_failure(
        &mut self,
        operation: DeliveryOperation,
        alarm_id: String,
        reason: String,
    ) {
        self.metrics.inc(&self.metrics.delivery_failures);
        self.bus.publish(SessionNotification::DeliveryFailed {
            operation,
            alarm_id,
            reason,
        });
    }

    /// Apply the results of creates still in flight, so an incident the
    /// server opens after the teardown cancel is closed before exit.
    async fn finish_creates(&mut self, grace: Duration) {
        let deadline = Instant::now() + grace;
        while self.creates_in_flight > 0 {
            match timeout_at(deadline, self.rx.recv()).await {
                Ok(Some(SessionCommand::CreateFinished(event))) => {
                    self.creates_in_flight -= 1;
                    let effects = self.session.handle(event);
                    self.apply_before_exit(effects).await;
                }
                Ok(Some(SessionCommand::DeliveryFailed {
                    operation,
                    alarm_id,
                    reason,
                })) => self.publish_delivery_failure(operation, alarm_id, reason),
                Ok(Some(SessionCommand::Snapshot(reply))) => {
                    let _ = reply.send(self.session.state().clone());
                }
                Ok(Some(SessionCommand::Shutdown { done, .. })) => {
                    let _ = done.send(());
                }
                Ok(Some(SessionCommand::Event(_))) => {
                    debug!("Session event ignored during shutdown");
                }
                Ok(None) => break,
                Err(_) => {
                    warn!(
                        "🛡 {} create request(s) unresolved at shutdown; the incident may stay open",
                        self.creates_in_flight
                    );
                    break;
                }
            }
        }
    }

    /// Like `apply`, but status updates are awaited here: spawned tasks
    /// would not outlive the process.
    async fn apply_before_exit(&mut self, effects: Vec<SessionEffect>) {
        for effect in effects {
            match effect {
                SessionEffect::SetStatus { alarm_id, status } => {
                    match self.api.set_alarm_status(&alarm_id, status).await {
                        Ok(()) => debug!("Alarm {} closed on shutdown", alarm_id),
                        // Nobody is left to tell; the failure is only logged
                        Err(e) => warn!("Failed to close alarm {} on shutdown: {}", alarm_id, e),
                    }
                }
                other => self.apply(vec![other]),
            }
        }
    }
}

fn report_delivery_failure(
    tx: Option<mpsc::UnboundedSender<SessionCommand>>,
    operation: DeliveryOperation,
    alarm_id: String,
    error: DispatchError,
) {
    warn!("{:?} for {} dropped: {}", operation, alarm_id, error);
    if let Some(tx) = tx {
        let _ = tx.send(SessionCommand::DeliveryFailed {
            operation,
            alarm_id,
            reason: error.to_string(),
        });
    }
}
