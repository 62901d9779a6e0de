// src/detection/classifier.rs
//
// Adapter between an external face-feature detector and the debouncer.
// Detector failures and empty frames both degrade to a neutral signal;
// nothing here is allowed to interrupt the frame stream.

use super::types::GestureSignal;
use anyhow::Result;
use serde::Deserialize;
use tracing::{debug, warn};

/// What a detector reports for one face in a frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct FaceFeatures {
    pub left_eye_closed: bool,
    pub right_eye_closed: bool,
    pub has_smile: bool,
    /// Face bounding-box area in pixels; used to pick the closest face
    pub bounds_area: f32,
}

/// Black-box per-frame face classifier.
pub trait FaceDetector {
    type Frame;

    fn detect(&mut self, frame: &Self::Frame) -> Result<Vec<FaceFeatures>>;
}

pub struct ClassifierAdapter {
    swap_eyes: bool,
    empty_frames: u64,
    failed_frames: u64,
}

impl ClassifierAdapter {
    pub fn new(swap_eyes: bool) -> Self {
        Self {
            swap_eyes,
            empty_frames: 0,
            failed_frames: 0,
        }
    }

    pub fn observe<D: FaceDetector>(&mut self, detector: &mut D, frame: &D::Frame) -> GestureSignal {
        match detector.detect(frame) {
            Ok(faces) => self.signal_from_faces(&faces),
            Err(e) => {
                self.failed_frames += 1;
                warn!("Face detector failed, treating frame as neutral: {:#}", e);
                GestureSignal::neutral()
            }
        }
    }

    /// Uses the largest face; the first one wins ties.
    pub fn signal_from_faces(&mut self, faces: &[FaceFeatures]) -> GestureSignal {
        let closest = faces.iter().fold(None::<&FaceFeatures>, |best, face| match best {
            Some(b) if b.bounds_area >= face.bounds_area => Some(b),
            _ => Some(face),
        });

        let Some(face) = closest else {
            self.empty_frames += 1;
            debug!("No face in frame");
            return GestureSignal::neutral();
        };

        let (left, right) = if self.swap_eyes {
            (face.right_eye_closed, face.left_eye_closed)
        } else {
            (face.left_eye_closed, face.right_eye_closed)
        };

        GestureSignal {
            left_eye_closed: left,
            right_eye_closed: right,
            has_smile: face.has_smile,
        }
    }

    pub fn empty_frames(&self) -> u64 {
        self.empty_frames
    }

    pub fn failed_frames(&self) -> u64 {
        self.failed_frames
    }
}

impl Default for ClassifierAdapter {
    fn default() -> Self {
        Self::new(false)
    }
}
