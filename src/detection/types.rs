// src/detection/types.rs

use crate::types::ServiceSelection;
use serde::Serialize;

/// Per-frame reading from the face classifier. Carries no history.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GestureSignal {
    pub left_eye_closed: bool,
    pub right_eye_closed: bool,
    pub has_smile: bool,
}

impl GestureSignal {
    /// What a frame without a usable face reads as.
    pub fn neutral() -> Self {
        Self::default()
    }

    /// Both-closed wins over a single eye so a squint of both eyes is never
    /// read as a one-eye gesture.
    pub fn category(&self) -> GestureCategory {
        match (self.left_eye_closed, self.right_eye_closed) {
            (true, true) => GestureCategory::Both,
            (true, false) => GestureCategory::LeftOnly,
            (false, true) => GestureCategory::RightOnly,
            (false, false) => GestureCategory::Neither,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GestureCategory {
    Both,
    LeftOnly,
    RightOnly,
    Neither,
}

impl GestureCategory {
    pub fn event(self) -> Option<GestureEvent> {
        match self {
            GestureCategory::Both => Some(GestureEvent::Medical),
            GestureCategory::LeftOnly => Some(GestureEvent::Police),
            GestureCategory::RightOnly => Some(GestureEvent::Fire),
            GestureCategory::Neither => None,
        }
    }
}

/// A gesture held long enough to count as deliberate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum GestureEvent {
    Police,
    Fire,
    Medical,
    SmileConfirm,
}

impl GestureEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            GestureEvent::Police => "POLICE",
            GestureEvent::Fire => "FIRE",
            GestureEvent::Medical => "MEDICAL",
            GestureEvent::SmileConfirm => "SMILE_CONFIRM",
        }
    }
}

impl ServiceSelection {
    /// Adds the service a gesture asks for. Returns false when the event
    /// selects nothing or the service was already selected.
    pub fn select(&mut self, event: GestureEvent) -> bool {
        let slot = match event {
            GestureEvent::Police => &mut self.police,
            GestureEvent::Fire => &mut self.fire,
            GestureEvent::Medical => &mut self.medical,
            GestureEvent::SmileConfirm => return false,
        };
        let changed = !*slot;
        *slot = true;
        changed
    }
}
