//! Outbound half of the computation cycle.
//!
//! A moderator's "complete" does not finish the request synchronously: the
//! request id is handed to the external accuracy-computation service,
//! which later posts per-star results back (see
//! [`super::CallbackReceiver`]). A failed dispatch is reported to the
//! caller and never retried here.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use crate::domain::RequestId;
use crate::error::ServiceError;

/// JSON body posted to the computation service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComputeJob<'a> {
    /// Request whose stars should be evaluated.
    pub observation_id: i64,
    /// Bearer token of the moderator that triggered completion.
    pub auth_token: &'a str,
    /// Pre-shared secret the service must echo back in its callback.
    pub async_token: &'a str,
}

/// Fire-once hand-off of a formed request to the computation service.
#[async_trait]
pub trait ComputeDispatcher: Send + Sync + fmt::Debug {
    /// Sends the job. Returns `false` on any transport error, timeout, or
    /// non-2xx reply. Never mutates request state.
    async fn dispatch(&self, request_id: RequestId, auth_token: &str) -> bool;
}

/// [`ComputeDispatcher`] speaking JSON over HTTP with a bounded timeout.
#[derive(Debug, Clone)]
pub struct HttpComputeDispatcher {
    client: reqwest::Client,
    url: String,
    shared_secret: String,
}

impl HttpComputeDispatcher {
    /// Builds a dispatcher posting to `url`, giving up after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Internal`] if the HTTP client cannot be
    /// constructed.
    pub fn new(
        url: impl Into<String>,
        timeout: Duration,
        shared_secret: impl Into<String>,
    ) -> Result<Self, ServiceError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ServiceError::Internal(format!("http client: {e}")))?;
        Ok(Self {
            client,
            url: url.into(),
            shared_secret: shared_secret.into(),
        })
    }
}

#[async_trait]
impl ComputeDispatcher for HttpComputeDispatcher {
    async fn dispatch(&self, request_id: RequestId, auth_token: &str) -> bool {
        let job = ComputeJob {
            observation_id: request_id.get(),
            auth_token,
            async_token: &self.shared_secret,
        };

        match self.client.post(&self.url).json(&job).send().await {
            Ok(resp) if resp.status().is_success() => {
                tracing::info!(%request_id, status = %resp.status(), "computation dispatched");
                true
            }
            Ok(resp) => {
                tracing::warn!(
                    %request_id,
                    status = %resp.status(),
                    "computation service rejected job"
                );
                false
            }
            Err(e) => {
                tracing::warn!(
                    %request_id,
                    timeout = e.is_timeout(),
                    error = %e,
                    "computation dispatch failed"
                );
                false
            }
        }
    }
}
