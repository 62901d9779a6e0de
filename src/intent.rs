// src/intent.rs
//
// Voice/shortcut entry point. Text parsing happens elsewhere; what arrives
// here is an already-resolved directive, routed into the same session
// entry points the tap and gesture paths use.

use crate::session::{SessionError, SessionHandle};
use crate::types::ServiceSelection;
use serde::Deserialize;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum IntentDirective {
    /// No services named means all of them
    Alert {
        #[serde(default)]
        services: Option<ServiceSelection>,
    },
    Cancel,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntentOutcome {
    /// Handed to the session with this selection
    Accepted(ServiceSelection),
    Cancelled,
    NotReady(String),
}

pub struct IntentRouter {
    session: SessionHandle,
    has_credentials: bool,
}

impl IntentRouter {
    pub fn new(session: SessionHandle, has_credentials: bool) -> Self {
        Self {
            session,
            has_credentials,
        }
    }

    pub async fn handle(&self, directive: IntentDirective) -> Result<IntentOutcome, SessionError> {
        match directive {
            IntentDirective::Cancel => {
                info!("🎙 Voice cancel");
                self.session.cancel(true)?;
                Ok(IntentOutcome::Cancelled)
            }
            IntentDirective::Alert { services } => {
                if !self.has_credentials {
                    warn!("🎙 Voice alert refused: not signed in to dispatch");
                    return Ok(IntentOutcome::NotReady(
                        "not signed in to the dispatch service".to_string(),
                    ));
                }

                let state = self.session.snapshot().await?;
                let Some(location) = state.last_known_location else {
                    warn!("🎙 Voice alert refused: no location fix yet");
                    return Ok(IntentOutcome::NotReady("location unknown".to_string()));
                };

                let services = services.unwrap_or_else(ServiceSelection::all);
                info!("🎙 Voice alert: {}", services.summary());
                self.session.trigger(services, location)?;
                Ok(IntentOutcome::Accepted(services))
            }
        }
    }
}
