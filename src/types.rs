// src/types.rs

use serde::{Deserialize, Serialize};

// ============================================================================
// CONFIGURATION
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub gesture: GestureConfig,
    pub countdown: CountdownConfig,
    pub dispatch: DispatchConfig,
    pub session: SessionConfig,
    pub replay: ReplayConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GestureConfig {
    /// Consecutive identical eye frames before a service gesture counts
    pub eye_threshold_frames: u32,
    /// Consecutive smiling frames before the smile confirms
    pub smile_threshold_frames: u32,
    /// Front cameras deliver mirrored frames; swap left/right when they do
    pub swap_eyes: bool,
}

impl Default for GestureConfig {
    fn default() -> Self {
        Self {
            eye_threshold_frames: 25,
            smile_threshold_frames: 25,
            swap_eyes: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CountdownConfig {
    pub start_seconds: u32,
    pub tick_ms: u64,
}

impl Default for CountdownConfig {
    fn default() -> Self {
        Self {
            start_seconds: 3,
            tick_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    pub base_url: String,
    pub access_token: String,
    pub timeout_secs: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api-sandbox.safetrek.io/v1".to_string(),
            access_token: String::new(),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Empty path keeps the session in memory only
    pub store_path: String,
    pub cancel_stale_on_launch: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            store_path: "session.json".to_string(),
            cancel_stale_on_launch: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplayConfig {
    pub script_path: String,
    pub fps: u32,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            script_path: "scripts/demo.jsonl".to_string(),
            fps: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

// ============================================================================
// DOMAIN TYPES
// ============================================================================

/// Which emergency services an incident asks for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceSelection {
    pub police: bool,
    pub fire: bool,
    pub medical: bool,
}

impl ServiceSelection {
    pub fn all() -> Self {
        Self {
            police: true,
            fire: true,
            medical: true,
        }
    }

    pub fn is_empty(&self) -> bool {
        !(self.police || self.fire || self.medical)
    }

    pub fn summary(&self) -> String {
        let mut parts = Vec::with_capacity(3);
        if self.police {
            parts.push("police");
        }
        if self.fire {
            parts.push("fire");
        }
        if self.medical {
            parts.push("medical");
        }
        if parts.is_empty() {
            "unspecified".to_string()
        } else {
            parts.join("+")
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
    /// Meters
    pub accuracy: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostalAddress {
    pub line1: String,
    pub line2: String,
    pub city: String,
    pub state: String,
    pub zip: String,
}

/// Where the user is. Serializes as `{"coordinates":{..}}` or `{"address":{..}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Location {
    Coordinates(Coordinates),
    Address(PostalAddress),
}

impl Location {
    pub fn describe(&self) -> String {
        match self {
            Location::Coordinates(c) => {
                format!("({:.5}, {:.5}) ±{}m", c.lat, c.lng, c.accuracy)
            }
            Location::Address(a) => format!("{} {}, {} {}", a.line1, a.line2, a.city, a.state),
        }
    }
}
