// src/session/store.rs
//
// Durable copy of the alarm session so an incident that was active when
// the process died can be recovered (or closed) on the next launch.

use super::state_machine::AlarmState;
use crate::types::Location;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedSession {
    pub state: AlarmState,
    pub active_alarm_id: Option<String>,
    pub last_known_location: Option<Location>,
    pub saved_at: DateTime<Utc>,
}

impl PersistedSession {
    pub fn new(
        state: AlarmState,
        active_alarm_id: Option<String>,
        last_known_location: Option<Location>,
    ) -> Self {
        Self {
            state,
            active_alarm_id,
            last_known_location,
            saved_at: Utc::now(),
        }
    }
}

pub trait SessionStore: Send {
    fn load(&self) -> Result<Option<PersistedSession>>;
    fn save(&mut self, session: &PersistedSession) -> Result<()>;
}

/// JSON file, replaced atomically through a sibling temp file.
pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SessionStore for FileSessionStore {
    fn load(&self) -> Result<Option<PersistedSession>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read session store {}", self.path.display()))?;
        let session = serde_json::from_str(&contents)
            .with_context(|| format!("Corrupt session store {}", self.path.display()))?;
        Ok(Some(session))
    }

    fn save(&mut self, session: &PersistedSession) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let tmp = self.path.with_extension("json.tmp");
        let contents = serde_json::to_string_pretty(session)?;
        fs::write(&tmp, contents)
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;
        debug!(
            "💾 Session saved: {} {:?}",
            session.state.as_str(),
            session.active_alarm_id
        );
        Ok(())
    }
}

/// Non-durable store; clones share the same slot.
#[derive(Clone, Default)]
pub struct MemorySessionStore {
    slot: Arc<Mutex<Option<PersistedSession>>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemorySessionStore {
    fn load(&self) -> Result<Option<PersistedSession>> {
        let slot = self
            .slot
            .lock()
            .map_err(|_| anyhow::anyhow!("session store lock poisoned"))?;
        Ok(slot.clone())
    }

    fn save(&mut self, session: &PersistedSession) -> Result<()> {
        let mut slot = self
            .slot
            .lock()
            .map_err(|_| anyhow::anyhow!("session store lock poisoned"))?;
        *slot = Some(session.clone());
        Ok(())
    }
}
