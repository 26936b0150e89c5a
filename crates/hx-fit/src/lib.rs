//! # hx-fit
//!
//! Client for the external fit service.
//!
//! Workflow:
//! 1. Submit a workspace via `POST /workspace` → receive a `result_id`.
//! 2. Poll `GET /workspace/{result_id}` on a fixed interval until the task
//!    reports `ready`.
//! 3. Read the fit results from the final response.
//!
//! The poll loop is bounded by a maximum poll count and an explicit
//! [`CancelToken`], so a deleted or replaced workspace can abandon an
//! in-flight fit. Transport and malformed-response errors end the loop
//! immediately; nothing retries forever.

#![warn(missing_docs)]
#![warn(clippy::all)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use hx_core::{Error, FitResults, Result};
use hx_model::Workspace;

/// Fixed delay between polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Default bound on the number of polls before the fit is declared lost.
pub const DEFAULT_MAX_POLLS: usize = 360;

/// Response of `POST /workspace`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitResponse {
    /// Identifier for polling the fit task.
    pub result_id: String,
}

/// Response of `GET /workspace/{result_id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResults {
    /// Whether the fit task has finished.
    pub ready: bool,
    /// Whether the finished task succeeded.
    #[serde(default)]
    pub successful: bool,
    /// Fit results, present once ready and successful.
    #[serde(default)]
    pub value: Option<FitResults>,
}

/// Cancellation token shared between the poll loop and its owner.
///
/// Cancelling is sticky: once set, every subsequent poll attempt stops.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Create a fresh, uncancelled token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Polling policy: fixed interval and a hard bound on attempts.
#[derive(Debug, Clone)]
pub struct PollOptions {
    /// Delay between polls.
    pub interval: Duration,
    /// Maximum number of polls before giving up.
    pub max_polls: usize,
}

impl Default for PollOptions {
    fn default() -> Self {
        Self { interval: DEFAULT_POLL_INTERVAL, max_polls: DEFAULT_MAX_POLLS }
    }
}

/// HTTP client for the fit service.
#[derive(Debug, Clone)]
pub struct FitClient {
    base_url: String,
    http: reqwest::Client,
}

impl FitClient {
    /// Create a client for a fit service at `base_url`.
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        Self { base_url: base_url.trim_end_matches('/').to_string(), http: reqwest::Client::new() }
    }

    /// Submit a workspace for fitting, returning the task id to poll.
    pub async fn submit(&self, workspace: &Workspace) -> Result<String> {
        let url = format!("{}/workspace", self.base_url);
        let response = self
            .http
            .post(&url)
            .json(workspace)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| Error::FitService(format!("submit failed: {e}")))?;
        let submitted: SubmitResponse = response
            .json()
            .await
            .map_err(|e| Error::FitService(format!("malformed submit response: {e}")))?;
        tracing::info!(result_id = %submitted.result_id, "workspace submitted for fitting");
        Ok(submitted.result_id)
    }

    /// Poll the fit task once.
    pub async fn poll(&self, result_id: &str) -> Result<TaskResults> {
        let url = format!("{}/workspace/{}", self.base_url, result_id);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| Error::FitService(format!("poll failed: {e}")))?;
        response
            .json()
            .await
            .map_err(|e| Error::FitService(format!("malformed poll response: {e}")))
    }

    /// Poll until the task is ready, then return its fit results.
    ///
    /// Stops immediately on cancellation, on any transport or decoding
    /// error, on an unsuccessful fit, and after `max_polls` attempts.
    pub async fn wait_for_results(
        &self,
        result_id: &str,
        options: &PollOptions,
        cancel: &CancelToken,
    ) -> Result<FitResults> {
        for attempt in 0..options.max_polls {
            if cancel.is_cancelled() {
                return Err(Error::FitService("fit polling cancelled".to_string()));
            }
            if attempt > 0 {
                tokio::time::sleep(options.interval).await;
                if cancel.is_cancelled() {
                    return Err(Error::FitService("fit polling cancelled".to_string()));
                }
            }

            let task = self.poll(result_id).await?;
            if !task.ready {
                tracing::debug!(result_id, attempt, "fit task not ready yet");
                continue;
            }
            if !task.successful {
                return Err(Error::FitService(format!("fit task {result_id} failed")));
            }
            let fit = task.value.ok_or_else(|| {
                Error::FitService(format!("fit task {result_id} is ready but has no results"))
            })?;
            fit.validate()?;
            return Ok(fit);
        }
        Err(Error::FitService(format!(
            "fit task {result_id} not ready after {} polls",
            options.max_polls
        )))
    }
}
