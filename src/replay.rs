// src/replay.rs
//
// JSONL replay: stands in for the camera, the location service and the
// user. Frames are paced at the configured fps; the countdown runs on a
// real interval on the same task, so a countdown tick and a scripted
// cancel are never processed at the same time.

use crate::detection::{FaceDetector, FaceFeatures};
use crate::intent::{IntentDirective, IntentRouter};
use crate::location::{LocationFix, Placemark};
use crate::pipeline::{GesturePipeline, PipelineAction, SessionNotification};
use crate::session::{AlarmState, SessionError, SessionHandle};
use crate::types::{Location, ServiceSelection};
use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval, interval_at, sleep, sleep_until, Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScriptEvent {
    /// One camera frame, optionally repeated
    Frame {
        #[serde(default)]
        faces: Vec<FaceFeatures>,
        #[serde(default)]
        detector_error: bool,
        #[serde(default = "one")]
        repeat: u32,
    },
    Fix(LocationFix),
    Placemark(Placemark),
    /// The big red button
    Tap {
        #[serde(default)]
        services: ServiceSelection,
    },
    Intent {
        directive: IntentDirective,
    },
    Cancel,
    CancelCountdown,
    AcknowledgeFallback,
    Wait {
        ms: u64,
    },
}

fn one() -> u32 {
    1
}

/// Blank lines and lines starting with `#` are skipped.
pub fn parse_script(text: &str) -> Result<Vec<ScriptEvent>> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| {
            let line = line.trim();
            !line.is_empty() && !line.starts_with('#')
        })
        .map(|(n, line)| {
            serde_json::from_str(line.trim())
                .with_context(|| format!("Bad script event on line {}", n + 1))
        })
        .collect()
}

pub fn load_script(path: impl AsRef<Path>) -> Result<Vec<ScriptEvent>> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read replay script {}", path.display()))?;
    parse_script(&text)
}

/// Detector whose frames already carry the classifier output.
/// `None` plays back a detector failure.
#[derive(Default)]
pub struct ScriptedFaces;

impl FaceDetector for ScriptedFaces {
    type Frame = Option<Vec<FaceFeatures>>;

    fn detect(&mut self, frame: &Self::Frame) -> Result<Vec<FaceFeatures>> {
        frame
            .clone()
            .ok_or_else(|| anyhow!("scripted detector failure"))
    }
}

pub struct ReplayDriver {
    pipeline: GesturePipeline,
    session: SessionHandle,
    intents: IntentRouter,
    notifications: mpsc::UnboundedReceiver<SessionNotification>,
    detector: ScriptedFaces,
    frame_interval: Duration,
    tick_interval: Duration,
}

impl ReplayDriver {
    pub fn new(
        pipeline: GesturePipeline,
        session: SessionHandle,
        intents: IntentRouter,
        notifications: mpsc::UnboundedReceiver<SessionNotification>,
        fps: u32,
        tick_ms: u64,
    ) -> Self {
        Self {
            pipeline,
            session,
            intents,
            notifications,
            detector: ScriptedFaces,
            frame_interval: Duration::from_secs_f64(1.0 / fps.max(1) as f64),
            tick_interval: Duration::from_millis(tick_ms.max(1)),
        }
    }

    pub async fn run(&mut self, script: Vec<ScriptEvent>) -> Result<()> {
        info!("▶️ Replaying {} script events", script.len());

        let mut frames = interval(self.frame_interval);
        frames.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut countdown = interval_at(Instant::now() + self.tick_interval, self.tick_interval);
        countdown.set_missed_tick_behavior(MissedTickBehavior::Delay);

        for event in script {
            match event {
                ScriptEvent::Frame {
                    faces,
                    detector_error,
                    repeat,
                } => {
                    let frame = if detector_error { None } else { Some(faces) };
                    for _ in 0..repeat.max(1) {
                        self.next_frame(&mut frames, &mut countdown).await?;
                        let actions = self.pipeline.process_frame(&mut self.detector, &frame);
                        for action in actions {
                            self.apply(action, &mut countdown).await?;
                        }
                        self.drain_notifications();
                    }
                }

                ScriptEvent::Fix(fix) => match fix.to_coordinates() {
                    Ok(coordinates) => {
                        debug!("📍 Fix ±{}m", coordinates.accuracy);
                        self.feed_location(Location::Coordinates(coordinates))?;
                    }
                    Err(e) => warn!("Discarding location fix: {}", e),
                },

                ScriptEvent::Placemark(placemark) => match placemark.to_address() {
                    Some(address) => self.feed_location(Location::Address(address))?,
                    None => debug!("Empty placemark ignored"),
                },

                ScriptEvent::Tap { services } => {
                    info!("👆 Tap: {}", services.summary());
                    self.submit(services).await?;
                }

                ScriptEvent::Intent { directive } => {
                    let outcome = self.intents.handle(directive).await?;
                    info!("🎙 Intent outcome: {:?}", outcome);
                }

                ScriptEvent::Cancel => {
                    self.pipeline.cancel_countdown();
                    self.session.cancel(true)?;
                }

                ScriptEvent::CancelCountdown => {
                    if self.pipeline.cancel_countdown().is_none() {
                        debug!("No countdown to cancel");
                    }
                }

                ScriptEvent::AcknowledgeFallback => self.session.acknowledge_fallback()?,

                ScriptEvent::Wait { ms } => {
                    let deadline = Instant::now() + Duration::from_millis(ms);
                    loop {
                        tokio::select! {
                            _ = sleep_until(deadline) => break,
                            _ = countdown.tick() => self.on_countdown_tick().await?,
                        }
                    }
                }
            }
            self.drain_notifications();
        }

        info!("⏹ Script finished");
        Ok(())
    }

    /// Wait for an in-flight create to resolve, up to `timeout`.
    pub async fn settle(&mut self, timeout: Duration) -> Result<AlarmState> {
        let deadline = Instant::now() + timeout;
        loop {
            let state = self.session.snapshot().await?.alarm_state;
            self.drain_notifications();
            if state != AlarmState::Pending || Instant::now() >= deadline {
                return Ok(state);
            }
            sleep(Duration::from_millis(50)).await;
        }
    }

    /// A rejected location is reported and the replay carries on.
    fn feed_location(&self, location: Location) -> Result<()> {
        match self.session.update_location(location) {
            Ok(()) => Ok(()),
            Err(SessionError::InvalidLocation(e)) => {
                warn!("Discarding location: {}", e);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn next_frame(&mut self, frames: &mut Interval, countdown: &mut Interval) -> Result<()> {
        loop {
            tokio::select! {
                _ = frames.tick() => return Ok(()),
                _ = countdown.tick() => self.on_countdown_tick().await?,
            }
        }
    }

    async fn apply(&mut self, action: PipelineAction, countdown: &mut Interval) -> Result<()> {
        match action {
            PipelineAction::ServiceSelected { event, selection } => {
                info!("👁 {} → {}", event.as_str(), selection.summary());
            }
            PipelineAction::CountdownArmed(seconds) => {
                // First decrement lands one full tick after arming
                countdown.reset();
                info!("🔊 {}", seconds);
            }
            PipelineAction::SpeakCountdown(seconds) => info!("🔊 {}", seconds),
            PipelineAction::CountdownCancelled => info!("✋ Countdown cancelled"),
            PipelineAction::Trigger(services) => self.submit(services).await?,
        }
        Ok(())
    }

    async fn on_countdown_tick(&mut self) -> Result<()> {
        if let Some(action) = self.pipeline.tick_countdown() {
            match action {
                PipelineAction::SpeakCountdown(seconds) => info!("🔊 {}", seconds),
                PipelineAction::Trigger(services) => self.submit(services).await?,
                other => debug!("Unexpected countdown action {:?}", other),
            }
        }
        self.drain_notifications();
        Ok(())
    }

    async fn submit(&mut self, services: ServiceSelection) -> Result<()> {
        let state = self.session.snapshot().await?;
        match state.last_known_location {
            Some(location) => self.session.trigger(services, location)?,
            None => warn!("No location fix yet; trigger for {} not sent", services.summary()),
        }
        Ok(())
    }

    fn drain_notifications(&mut self) {
        while let Ok(notification) = self.notifications.try_recv() {
            if let Some(message) = notification.user_message() {
                info!("📣 {}", message);
            }
            self.pipeline.on_notification(&notification);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::{AlarmApi, AlarmStatus, CreateAlarmRequest, DispatchError};
    use crate::pipeline::{NotificationBus, PipelineMetrics};
    use crate::session::{AlarmSession, MemorySessionStore, SessionRuntime};
    use crate::types::{Coordinates, CountdownConfig, GestureConfig};
    use std::sync::Arc;

    struct AcceptingApi;

    impl AlarmApi for AcceptingApi {
        async fn create_alarm(&self, _request: CreateAlarmRequest) -> Result<String, DispatchError> {
            Ok("replay-1".to_string())
        }

        async fn update_alarm_location(
            &self,
            _alarm_id: &str,
            _location: &Location,
        ) -> Result<(), DispatchError> {
            Ok(())
        }

        async fn set_alarm_status(
            &self,
            _alarm_id: &str,
            _status: AlarmStatus,
        ) -> Result<(), DispatchError> {
            Ok(())
        }
    }

    fn driver() -> (ReplayDriver, SessionHandle) {
        let metrics = PipelineMetrics::new();
        let mut bus = NotificationBus::default();
        let notifications = bus.subscribe();
        let (handle, _task) = SessionRuntime::spawn(
            AlarmSession::new(),
            Arc::new(AcceptingApi),
            Box::new(MemorySessionStore::new()),
            bus,
            metrics.clone(),
        );
        let pipeline =
            GesturePipeline::new(&GestureConfig::default(), &CountdownConfig::default(), metrics);
        let intents = IntentRouter::new(handle.clone(), true);
        let driver = ReplayDriver::new(pipeline, handle.clone(), intents, notifications, 1000, 1000);
        (driver, handle)
    }

    #[tokio::test]
    async fn test_bad_locations_do_not_stop_replay() {
        let script = parse_script(
            r#"
{"type":"placemark","thoroughfare":"","locality":"  "}
{"type":"fix","lat":200.0,"lng":0.0,"horizontal_accuracy":3.0}
{"type":"fix","lat":38.03,"lng":-78.48,"horizontal_accuracy":3.0,"vertical_accuracy":4.0}
{"type":"frame","faces":[],"repeat":2}
"#,
        )
        .unwrap();
        let (mut driver, handle) = driver();

        driver.run(script).await.unwrap();

        let state = handle.snapshot().await.unwrap();
        assert_eq!(
            state.last_known_location,
            Some(Location::Coordinates(Coordinates {
                lat: 38.03,
                lng: -78.48,
                accuracy: 5,
            }))
        );
    }

    #[test]
    fn test_parse_script_events() {
        let script = r#"
# warm-up
{"type":"fix","lat":38.03,"lng":-78.48,"horizontal_accuracy":3.0,"vertical_accuracy":4.0}
{"type":"frame","faces":[{"left_eye_closed":true,"bounds_area":900.0}],"repeat":25}
{"type":"frame","detector_error":true}
{"type":"tap","services":{"police":true}}
{"type":"intent","directive":{"action":"alert"}}
{"type":"cancel_countdown"}
{"type":"wait","ms":1500}
"#;
        let events = parse_script(script).unwrap();
        assert_eq!(events.len(), 7);

        assert!(matches!(&events[0], ScriptEvent::Fix(fix) if fix.vertical_accuracy == 4.0));
        match &events[1] {
            ScriptEvent::Frame { faces, repeat, .. } => {
                assert_eq!(*repeat, 25);
                assert!(faces[0].left_eye_closed);
                assert!(!faces[0].has_smile);
            }
            other => panic!("expected frame, got {:?}", other),
        }
        assert_eq!(
            events[2],
            ScriptEvent::Frame {
                faces: vec![],
                detector_error: true,
                repeat: 1
            }
        );
        assert_eq!(
            events[3],
            ScriptEvent::Tap {
                services: ServiceSelection {
                    police: true,
                    ..Default::default()
                }
            }
        );
        assert_eq!(
            events[4],
            ScriptEvent::Intent {
                directive: IntentDirective::Alert { services: None }
            }
        );
        assert_eq!(events[5], ScriptEvent::CancelCountdown);
        assert_eq!(events[6], ScriptEvent::Wait { ms: 1500 });
    }

    #[test]
    fn test_bad_line_reports_line_number() {
        let err = parse_script("{\"type\":\"cancel\"}\n{\"type\":\"teleport\"}\n").unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn test_shipped_demo_script_parses() {
        let events = parse_script(include_str!("../scripts/demo.jsonl")).unwrap();
        assert!(!events.is_empty());
    }

    #[test]
    fn test_scripted_detector() {
        let mut detector = ScriptedFaces;
        assert!(detector.detect(&None).is_err());
        assert_eq!(detector.detect(&Some(vec![])).unwrap(), vec![]);
    }
}
