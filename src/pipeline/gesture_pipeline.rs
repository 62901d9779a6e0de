// src/pipeline/gesture_pipeline.rs
//
// Frame path: classifier → debouncer → service selection / countdown.
// Runs synchronously per frame; the caller owns the countdown timer and
// forwards session notifications so a cancelled alarm clears gesture state.

use super::event_bus::SessionNotification;
use super::metrics::PipelineMetrics;
use crate::detection::{
    ClassifierAdapter, CountdownConfirmer, CountdownTick, DebounceConfig, FaceDetector,
    GestureDebouncer, GestureEvent,
};
use crate::types::{CountdownConfig, GestureConfig, ServiceSelection};
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineAction {
    /// A held eye gesture added a service to the selection
    ServiceSelected {
        event: GestureEvent,
        selection: ServiceSelection,
    },
    /// Smile confirmed; value is the first number to announce
    CountdownArmed(u32),
    SpeakCountdown(u32),
    CountdownCancelled,
    /// Countdown elapsed; submit with this selection
    Trigger(ServiceSelection),
}

pub struct GesturePipeline {
    adapter: ClassifierAdapter,
    debouncer: GestureDebouncer,
    countdown: CountdownConfirmer,
    selection: ServiceSelection,
    metrics: PipelineMetrics,
}

impl GesturePipeline {
    pub fn new(gesture: &GestureConfig, countdown: &CountdownConfig, metrics: PipelineMetrics) -> Self {
        Self {
            adapter: ClassifierAdapter::new(gesture.swap_eyes),
            debouncer: GestureDebouncer::new(DebounceConfig {
                eye_threshold_frames: gesture.eye_threshold_frames,
                smile_threshold_frames: gesture.smile_threshold_frames,
            }),
            countdown: CountdownConfirmer::new(countdown.start_seconds),
            selection: ServiceSelection::default(),
            metrics,
        }
    }

    pub fn process_frame<D: FaceDetector>(
        &mut self,
        detector: &mut D,
        frame: &D::Frame,
    ) -> Vec<PipelineAction> {
        self.metrics.inc(&self.metrics.total_frames);

        let unusable_before = self.adapter.empty_frames() + self.adapter.failed_frames();
        let signal = self.adapter.observe(detector, frame);
        if self.adapter.empty_frames() + self.adapter.failed_frames() > unusable_before {
            self.metrics.inc(&self.metrics.faceless_frames);
        }

        let mut actions = Vec::new();
        for event in self.debouncer.observe(signal) {
            match event {
                GestureEvent::SmileConfirm => {
                    self.metrics.inc(&self.metrics.smiles_confirmed);
                    if self.countdown.arm() {
                        actions.push(PipelineAction::CountdownArmed(self.countdown.start_seconds()));
                    }
                }
                service => {
                    self.metrics.inc(&self.metrics.gestures_confirmed);
                    if self.selection.select(service) {
                        info!("➕ {} selected ({})", service.as_str(), self.selection.summary());
                        actions.push(PipelineAction::ServiceSelected {
                            event: service,
                            selection: self.selection,
                        });
                    } else {
                        debug!("{} already selected", service.as_str());
                    }
                }
            }
        }

        actions
    }

    /// Advance the countdown by one second.
    pub fn tick_countdown(&mut self) -> Option<PipelineAction> {
        match self.countdown.tick() {
            CountdownTick::Idle => None,
            CountdownTick::Remaining(n) => Some(PipelineAction::SpeakCountdown(n)),
            CountdownTick::Fired => {
                self.metrics.inc(&self.metrics.countdowns_fired);
                Some(PipelineAction::Trigger(self.selection))
            }
        }
    }

    pub fn cancel_countdown(&mut self) -> Option<PipelineAction> {
        if self.countdown.cancel() {
            self.metrics.inc(&self.metrics.countdowns_cancelled);
            Some(PipelineAction::CountdownCancelled)
        } else {
            None
        }
    }

    pub fn on_notification(&mut self, notification: &SessionNotification) {
        if let SessionNotification::Cancelled { .. } = notification {
            debug!("Session cancelled; clearing gesture state");
            self.reset();
        }
    }

    pub fn reset(&mut self) {
        self.debouncer.reset();
        self.countdown.cancel();
        self.selection = ServiceSelection::default();
    }

    pub fn selection(&self) -> ServiceSelection {
        self.selection
    }

    pub fn countdown_armed(&self) -> bool {
        self.countdown.is_armed()
    }
}
