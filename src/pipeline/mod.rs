// src/pipeline/mod.rs

pub mod event_bus;
pub mod gesture_pipeline;
pub mod metrics;

pub use event_bus::{DeliveryOperation, NotificationBus, SessionNotification};
pub use gesture_pipeline::{GesturePipeline, PipelineAction};
pub use metrics::PipelineMetrics;
