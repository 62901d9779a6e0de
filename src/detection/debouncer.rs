// src/detection/debouncer.rs
//
// Frame-count debouncing for eye and smile gestures. The camera frame rate
// is the only clock: a gesture counts once it has been held for a fixed
// number of consecutive frames, and it fires once per hold.

use super::types::{GestureCategory, GestureEvent, GestureSignal};
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct DebounceConfig {
    pub eye_threshold_frames: u32,
    pub smile_threshold_frames: u32,
}

impl Default for DebounceConfig {
    fn default() -> Self {
        Self {
            eye_threshold_frames: 25, // ~0.8s @ 30fps, longer than any blink
            smile_threshold_frames: 25,
        }
    }
}

pub struct GestureDebouncer {
    config: DebounceConfig,

    // Eye gestures
    last_category: GestureCategory,
    run_length: u32,
    eye_fired: bool,

    // Smile
    smile_frames: u32,
    smiling: bool,
}

impl GestureDebouncer {
    pub fn new(config: DebounceConfig) -> Self {
        let config = DebounceConfig {
            eye_threshold_frames: config.eye_threshold_frames.max(1),
            smile_threshold_frames: config.smile_threshold_frames.max(1),
        };
        Self {
            config,
            last_category: GestureCategory::Neither,
            run_length: 0,
            eye_fired: false,
            smile_frames: 0,
            smiling: false,
        }
    }

    /// Feed one frame. Returns the gestures confirmed on this frame: at most
    /// one eye gesture and at most one smile confirmation.
    pub fn observe(&mut self, signal: GestureSignal) -> Vec<GestureEvent> {
        let mut events = Vec::new();

        if let Some(event) = self.observe_eyes(signal.category()) {
            events.push(event);
        }
        if self.observe_smile(signal.has_smile) {
            events.push(GestureEvent::SmileConfirm);
        }

        events
    }

    fn observe_eyes(&mut self, category: GestureCategory) -> Option<GestureEvent> {
        if category != self.last_category {
            if self.run_length > 1 {
                debug!(
                    "Eye run broken: {:?} x{} → {:?}",
                    self.last_category, self.run_length, category
                );
            }
            self.last_category = category;
            self.run_length = 1;
            self.eye_fired = false;
        } else {
            self.run_length = self.run_length.saturating_add(1);
        }

        if self.eye_fired || self.run_length < self.config.eye_threshold_frames {
            return None;
        }

        let event = category.event()?;
        // Latched until the category changes, so a held pose fires once
        self.eye_fired = true;
        self.run_length = 0;
        info!(
            "👁 Gesture confirmed: {} after {} frames",
            event.as_str(),
            self.config.eye_threshold_frames
        );
        Some(event)
    }

    fn observe_smile(&mut self, has_smile: bool) -> bool {
        if !has_smile {
            self.smile_frames = 0;
            self.smiling = false;
            return false;
        }
        if self.smiling {
            return false;
        }

        self.smile_frames += 1;
        if self.smile_frames < self.config.smile_threshold_frames {
            return false;
        }

        self.smiling = true;
        self.smile_frames = 0;
        info!("😊 Smile confirmed");
        true
    }

    /// Forget all partial runs, e.g. after the session was cancelled.
    pub fn reset(&mut self) {
        self.last_category = GestureCategory::Neither;
        self.run_length = 0;
        self.eye_fired = false;
        self.smile_frames = 0;
        self.smiling = false;
    }

    pub fn run_length(&self) -> u32 {
        self.run_length
    }
}

impl Default for GestureDebouncer {
    fn default() -> Self {
        Self::new(DebounceConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LEFT: GestureSignal = GestureSignal {
        left_eye_closed: true,
        right_eye_closed: false,
        has_smile: false,
    };
    const RIGHT: GestureSignal = GestureSignal {
        left_eye_closed: false,
        right_eye_closed: true,
        has_smile: false,
    };
    const BOTH: GestureSignal = GestureSignal {
        left_eye_closed: true,
        right_eye_closed: true,
        has_smile: false,
    };
    const SMILE: GestureSignal = GestureSignal {
        left_eye_closed: false,
        right_eye_closed: false,
        has_smile: true,
    };

    fn debouncer(threshold: u32) -> GestureDebouncer {
        GestureDebouncer::new(DebounceConfig {
            eye_threshold_frames: threshold,
            smile_threshold_frames: threshold,
        })
    }

    #[test]
    fn test_fires_exactly_at_threshold() {
        let mut d = debouncer(25);

        for frame in 1..=24 {
            assert!(d.observe(LEFT).is_empty(), "fired early at frame {}", frame);
        }
        assert_eq!(d.observe(LEFT), vec![GestureEvent::Police]);
    }

    #[test]
    fn test_held_pose_fires_once() {
        let mut d = debouncer(25);

        let fired: usize = (0..200).map(|_| d.observe(BOTH).len()).sum();
        assert_eq!(fired, 1);
    }

    #[test]
    fn test_category_change_resets_run() {
        let mut d = debouncer(25);

        for _ in 0..24 {
            assert!(d.observe(LEFT).is_empty());
        }
        // One differing frame breaks the run
        assert!(d.observe(RIGHT).is_empty());
        for _ in 0..23 {
            assert!(d.observe(LEFT).is_empty());
        }
        assert_eq!(d.run_length(), 23);
    }

    #[test]
    fn test_rearms_after_signal_change() {
        let mut d = debouncer(5);

        let first: Vec<_> = (0..5).flat_map(|_| d.observe(RIGHT)).collect();
        assert_eq!(first, vec![GestureEvent::Fire]);

        d.observe(GestureSignal::neutral());

        let second: Vec<_> = (0..5).flat_map(|_| d.observe(RIGHT)).collect();
        assert_eq!(second, vec![GestureEvent::Fire]);
    }

    #[test]
    fn test_blinks_never_fire() {
        let mut d = debouncer(25);

        // Natural blinking: both eyes closed for a few frames, then open
        for _ in 0..20 {
            for _ in 0..4 {
                assert!(d.observe(BOTH).is_empty());
            }
            for _ in 0..30 {
                assert!(d.observe(GestureSignal::neutral()).is_empty());
            }
        }
    }

    #[test]
    fn test_neutral_run_never_fires() {
        let mut d = debouncer(3);
        for _ in 0..100 {
            assert!(d.observe(GestureSignal::neutral()).is_empty());
        }
    }

    #[test]
    fn test_smile_fires_once_per_run() {
        let mut d = debouncer(25);

        let fired: Vec<_> = (0..100).flat_map(|_| d.observe(SMILE)).collect();
        assert_eq!(fired, vec![GestureEvent::SmileConfirm]);

        d.observe(GestureSignal::neutral());

        let fired: Vec<_> = (0..25).flat_map(|_| d.observe(SMILE)).collect();
        assert_eq!(fired, vec![GestureEvent::SmileConfirm]);
    }

    #[test]
    fn test_smile_interrupted_before_threshold() {
        let mut d = debouncer(25);

        for _ in 0..24 {
            assert!(d.observe(SMILE).is_empty());
        }
        assert!(d.observe(GestureSignal::neutral()).is_empty());
        for _ in 0..24 {
            assert!(d.observe(SMILE).is_empty());
        }
    }

    #[test]
    fn test_smile_independent_of_eyes() {
        let mut d = debouncer(3);
        let wink_and_smile = GestureSignal {
            left_eye_closed: true,
            right_eye_closed: false,
            has_smile: true,
        };

        assert!(d.observe(wink_and_smile).is_empty());
        assert!(d.observe(wink_and_smile).is_empty());
        assert_eq!(
            d.observe(wink_and_smile),
            vec![GestureEvent::Police, GestureEvent::SmileConfirm]
        );
    }

    #[test]
    fn test_reset_clears_partial_runs() {
        let mut d = debouncer(5);
        for _ in 0..4 {
            d.observe(LEFT);
        }
        d.reset();
        for _ in 0..4 {
            assert!(d.observe(LEFT).is_empty());
        }
        assert_eq!(d.observe(LEFT), vec![GestureEvent::Police]);
    }
}
