// src/dispatch/codec.rs
//
// JSON payloads exchanged with the alarm dispatch service.
//
//   create  → {"services":{..},"location":{"coordinates":{..}}|{"address":{..}}}
//   create  ← {"id":"..."}           (other fields ignored)
//   update  → {"coordinates":{..}}  or {"address":{..}}
//   status  → {"status":"CANCELED"}

use super::client::DispatchError;
use crate::types::{Location, ServiceSelection};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateAlarmRequest {
    pub services: ServiceSelection,
    pub location: Location,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateAlarmResponse {
    pub id: String,
}

/// The update body is the bare location.
pub type LocationUpdate = Location;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlarmStatus {
    Canceled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub status: AlarmStatus,
}

/// Extract the incident id from a create response body.
pub fn decode_create_response(body: &[u8]) -> Result<String, DispatchError> {
    let response: CreateAlarmResponse = serde_json::from_slice(body)?;
    let id = response.id.trim();
    if id.is_empty() {
        return Err(DispatchError::MissingIncidentId);
    }
    Ok(id.to_string())
}
