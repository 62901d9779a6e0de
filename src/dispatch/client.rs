// src/dispatch/client.rs
//
// HTTP client for the alarm dispatch service. Every call is a single
// attempt: no retries, no internal state besides the credentials. Callers
// decide what a failure means.

use super::codec::{
    decode_create_response, AlarmStatus, CreateAlarmRequest, LocationUpdate, StatusUpdate,
};
use crate::types::{DispatchConfig, Location};
use anyhow::{bail, Context};
use reqwest::{Request, Url};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("dispatch service returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("response carried no incident id")]
    MissingIncidentId,

    #[error("cannot build endpoint from base url {0}")]
    InvalidEndpoint(String),
}

/// The three calls an alarm session makes against the dispatch service.
pub trait AlarmApi: Send + Sync + 'static {
    fn create_alarm(
        &self,
        request: CreateAlarmRequest,
    ) -> impl Future<Output = Result<String, DispatchError>> + Send;

    fn update_alarm_location(
        &self,
        alarm_id: &str,
        location: &Location,
    ) -> impl Future<Output = Result<(), DispatchError>> + Send;

    fn set_alarm_status(
        &self,
        alarm_id: &str,
        status: AlarmStatus,
    ) -> impl Future<Output = Result<(), DispatchError>> + Send;
}

pub struct DispatchClient {
    http_client: reqwest::Client,
    base_url: Url,
    access_token: String,
}

impl DispatchClient {
    pub fn new(config: &DispatchConfig) -> anyhow::Result<Self> {
        let base_url = Url::parse(&config.base_url)
            .with_context(|| format!("Invalid dispatch base url {}", config.base_url))?;
        if base_url.cannot_be_a_base() {
            bail!("Dispatch base url {} cannot carry a path", base_url);
        }

        // Timeouts surface as transport errors, same as any network failure
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;

        if config.access_token.trim().is_empty() {
            warn!("🔑 No dispatch access token configured; the service will reject alarms");
        }

        Ok(Self {
            http_client,
            base_url,
            access_token: config.access_token.trim().to_string(),
        })
    }

    pub fn has_credentials(&self) -> bool {
        !self.access_token.is_empty()
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, DispatchError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| DispatchError::InvalidEndpoint(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    pub fn build_create(&self, request: &CreateAlarmRequest) -> Result<Request, DispatchError> {
        let url = self.endpoint(&["alarms"])?;
        Ok(self
            .http_client
            .post(url)
            .bearer_auth(&self.access_token)
            .json(request)
            .build()?)
    }

    pub fn build_location_update(
        &self,
        alarm_id: &str,
        location: &LocationUpdate,
    ) -> Result<Request, DispatchError> {
        let url = self.endpoint(&["alarms", alarm_id, "locations"])?;
        Ok(self
            .http_client
            .post(url)
            .bearer_auth(&self.access_token)
            .json(location)
            .build()?)
    }

    pub fn build_status_update(
        &self,
        alarm_id: &str,
        status: AlarmStatus,
    ) -> Result<Request, DispatchError> {
        let url = self.endpoint(&["alarms", alarm_id, "status"])?;
        Ok(self
            .http_client
            .put(url)
            .bearer_auth(&self.access_token)
            .json(&StatusUpdate { status })
            .build()?)
    }

    async fn execute(&self, request: Request) -> Result<reqwest::Response, DispatchError> {
        debug!("🌐 {} {}", request.method(), request.url());

        let response = self.http_client.execute(request).await?;
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<no body>".to_string());
            return Err(DispatchError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }
}

impl AlarmApi for DispatchClient {
    async fn create_alarm(&self, request: CreateAlarmRequest) -> Result<String, DispatchError> {
        info!(
            "🌐 Creating alarm: services={} location={}",
            request.services.summary(),
            request.location.describe()
        );

        let http_request = self.build_create(&request)?;
        let response = self.execute(http_request).await?;
        let body = response.bytes().await?;
        let alarm_id = decode_create_response(&body)?;

        info!("🌐 Alarm created: {}", alarm_id);
        Ok(alarm_id)
    }

    async fn update_alarm_location(
        &self,
        alarm_id: &str,
        location: &Location,
    ) -> Result<(), DispatchError> {
        let http_request = self.build_location_update(alarm_id, location)?;
        self.execute(http_request).await?;
        debug!("🌐 Location delivered for {}: {}", alarm_id, location.describe());
        Ok(())
    }

    async fn set_alarm_status(
        &self,
        alarm_id: &str,
        status: AlarmStatus,
    ) -> Result<(), DispatchError> {
        let http_request = self.build_status_update(alarm_id, status)?;
        self.execute(http_request).await?;
        info!("🌐 Alarm {} set to {:?}", alarm_id, status);
        Ok(())
    }
}
