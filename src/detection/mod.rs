// src/detection/mod.rs

mod classifier;
mod countdown;
mod debouncer;
mod types;

pub use classifier::{ClassifierAdapter, FaceDetector, FaceFeatures};
pub use countdown::{CountdownConfirmer, CountdownState, CountdownTick};
pub use debouncer::{DebounceConfig, GestureDebouncer};
pub use types::*;
