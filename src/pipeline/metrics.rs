// src/pipeline/metrics.rs
//
// Counters shared between the frame path and the session task.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Clone)]
pub struct PipelineMetrics {
    pub total_frames: Arc<AtomicU64>,
    pub faceless_frames: Arc<AtomicU64>,
    pub gestures_confirmed: Arc<AtomicU64>,
    pub smiles_confirmed: Arc<AtomicU64>,
    pub countdowns_fired: Arc<AtomicU64>,
    pub countdowns_cancelled: Arc<AtomicU64>,
    pub triggers: Arc<AtomicU64>,
    pub alarms_created: Arc<AtomicU64>,
    pub create_failures: Arc<AtomicU64>,
    pub delivery_failures: Arc<AtomicU64>,
    pub started_at: Instant,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self {
            total_frames: Arc::new(AtomicU64::new(0)),
            faceless_frames: Arc::new(AtomicU64::new(0)),
            gestures_confirmed: Arc::new(AtomicU64::new(0)),
            smiles_confirmed: Arc::new(AtomicU64::new(0)),
            countdowns_fired: Arc::new(AtomicU64::new(0)),
            countdowns_cancelled: Arc::new(AtomicU64::new(0)),
            triggers: Arc::new(AtomicU64::new(0)),
            alarms_created: Arc::new(AtomicU64::new(0)),
            create_failures: Arc::new(AtomicU64::new(0)),
            delivery_failures: Arc::new(AtomicU64::new(0)),
            started_at: Instant::now(),
        }
    }

    pub fn inc(&self, counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn fps(&self) -> f64 {
        let frames = self.total_frames.load(Ordering::Relaxed);
        let elapsed = self.started_at.elapsed().as_secs_f64();
        if elapsed > 0.01 {
            frames as f64 / elapsed
        } else {
            0.0
        }
    }

    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary {
            total_frames: self.total_frames.load(Ordering::Relaxed),
            faceless_frames: self.faceless_frames.load(Ordering::Relaxed),
            fps: self.fps(),
            gestures_confirmed: self.gestures_confirmed.load(Ordering::Relaxed),
            smiles_confirmed: self.smiles_confirmed.load(Ordering::Relaxed),
            countdowns_fired: self.countdowns_fired.load(Ordering::Relaxed),
            countdowns_cancelled: self.countdowns_cancelled.load(Ordering::Relaxed),
            triggers: self.triggers.load(Ordering::Relaxed),
            alarms_created: self.alarms_created.load(Ordering::Relaxed),
            create_failures: self.create_failures.load(Ordering::Relaxed),
            delivery_failures: self.delivery_failures.load(Ordering::Relaxed),
            elapsed_secs: self.started_at.elapsed().as_secs_f64(),
        }
    }
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct MetricsSummary {
    pub total_frames: u64,
    pub faceless_frames: u64,
    pub fps: f64,
    pub gestures_confirmed: u64,
    pub smiles_confirmed: u64,
    pub countdowns_fired: u64,
    pub countdowns_cancelled: u64,
    pub triggers: u64,
    pub alarms_created: u64,
    pub create_failures: u64,
    pub delivery_failures: u64,
    pub elapsed_secs: f64,
}
