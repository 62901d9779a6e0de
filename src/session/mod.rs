// src/session/mod.rs

pub mod runtime;
pub mod state_machine;
pub mod store;

pub use runtime::{SessionError, SessionHandle, SessionRuntime};
pub use state_machine::{AlarmSession, AlarmState, SessionEffect, SessionEvent, SessionState};
pub use store::{FileSessionStore, MemorySessionStore, PersistedSession, SessionStore};
