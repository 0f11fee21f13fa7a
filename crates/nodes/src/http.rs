//! `JobClient` for the common "POST to submit, GET to poll" HTTP shape.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde_json::Value;
use tracing::debug;

use crate::job::{JobClient, JobError, JobHandle, PollOutcome, DEFAULT_REQUEST_TIMEOUT};

impl From<reqwest::Error> for JobError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Protocol(err.to_string())
        } else {
            Self::Transport(err.to_string())
        }
    }
}

/// Where things live in the backend's requests and responses.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpJobConfig {
    pub submit_url: String,
    /// Status endpoint; `{id}` is replaced with the job id.
    pub status_url: String,
    /// JSON pointer to the job id in the submit response.
    pub id_pointer: String,
    /// JSON pointer to the status string in the poll response.
    pub status_pointer: String,
    pub ready_statuses: Vec<String>,
    pub failed_statuses: Vec<String>,
    /// JSON pointer to the result; the whole body when `None`.
    pub result_pointer: Option<String>,
    /// JSON pointer to a failure message.
    pub error_pointer: String,
    pub bearer_token: Option<String>,
}

impl HttpJobConfig {
    pub fn new(submit_url: impl Into<String>, status_url: impl Into<String>) -> Self {
        Self {
            submit_url: submit_url.into(),
            status_url: status_url.into(),
            id_pointer: "/id".into(),
            status_pointer: "/status".into(),
            ready_statuses: vec!["succeeded".into(), "completed".into(), "ready".into()],
            failed_statuses: vec!["failed".into(), "error".into(), "cancelled".into()],
            result_pointer: Some("/result".into()),
            error_pointer: "/error".into(),
            bearer_token: None,
        }
    }

    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    fn status_url_for(&self, id: &str) -> String {
        self.status_url.replace("{id}", id)
    }
}

pub struct HttpJobClient {
    client: Client,
    config: HttpJobConfig,
}

impl HttpJobClient {
    pub fn new(config: HttpJobConfig) -> Result<Self, JobError> {
        Self::with_timeout(config, DEFAULT_REQUEST_TIMEOUT)
    }

    /// A client of its own whose requests give up after `timeout`. Idle
    /// connections are not pooled, so nothing stays open once it is dropped.
    pub fn with_timeout(config: HttpJobConfig, timeout: Duration) -> Result<Self, JobError> {
        let client = Client::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(0)
            .build()?;
        Ok(Self::with_client(client, config))
    }

    /// Reuse an existing connection pool.
    pub fn with_client(client: Client, config: HttpJobConfig) -> Self {
        Self { client, config }
    }

    fn authorise(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.config.bearer_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    fn classify(&self, body: Value) -> Result<PollOutcome, JobError> {
        let status = body
            .pointer(&self.config.status_pointer)
            .and_then(Value::as_str)
            .map(str::to_owned)
            .ok_or_else(|| {
                JobError::Protocol(format!("no status at '{}'", self.config.status_pointer))
            })?;
        let matches = |set: &[String]| set.iter().any(|s| s.eq_ignore_ascii_case(&status));

        if matches(&self.config.ready_statuses) {
            let result = match &self.config.result_pointer {
                Some(pointer) => body.pointer(pointer).cloned().unwrap_or(Value::Null),
                None => body,
            };
            Ok(PollOutcome::Ready(result))
        } else if matches(&self.config.failed_statuses) {
            let reason = match body.pointer(&self.config.error_pointer) {
                Some(Value::String(message)) => message.clone(),
                Some(other) if !other.is_null() => other.to_string(),
                _ => status.clone(),
            };
            Ok(PollOutcome::Failed(reason))
        } else {
            Ok(PollOutcome::Pending)
        }
    }
}

#[async_trait]
impl JobClient for HttpJobClient {
    async fn submit(&self, request: &Value) -> Result<JobHandle, JobError> {
        let response = self
            .authorise(self.client.post(&self.config.submit_url))
            .json(request)
            .send()
            .await?
            .error_for_status()?;
        let body: Value = response.json().await?;

        let id = match body.pointer(&self.config.id_pointer) {
            Some(Value::String(id)) => id.clone(),
            Some(Value::Number(id)) => id.to_string(),
            _ => {
                return Err(JobError::Protocol(format!(
                    "no job id at '{}'",
                    self.config.id_pointer
                )))
            }
        };
        debug!(%id, "submitted job");
        Ok(JobHandle::new(id, body))
    }

    async fn poll(&self, handle: &JobHandle) -> Result<PollOutcome, JobError> {
        let url = self.config.status_url_for(handle.token());
        let body: Value = self
            .authorise(self.client.get(&url))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        self.classify(body)
    }
}
