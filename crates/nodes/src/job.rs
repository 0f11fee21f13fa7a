//! Submit → poll → terminal-state driver for external long-running jobs.
//!
//! ```text
//! Submitting ──ok──▶ Polling ──Ready──▶ Ready
//!     │                │ ▲
//!     │ err            │ └── Pending / transport noise
//!     ▼                ▼
//!  Failed(SubmissionError)   Failed(VendorFailed | Timeout)
//! ```
//!
//! Every submit and poll call is bounded by [`PollPolicy::request_timeout`]
//! and, under a deadline budget, by whatever is left of the deadline. A poll
//! that runs out of time counts as transport noise; a submit that does is a
//! submission error.
//!
//! Polls are strictly sequential for one [`JobHandle`]. There is no cancel
//! primitive: dropping the future returned by [`AsyncJobOrchestrator::run`]
//! abandons the job and owes the remote side nothing.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, info, instrument, warn};

// ---------------------------------------------------------------------------
// Client seam
// ---------------------------------------------------------------------------

/// Transport-level failure talking to the job backend.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum JobError {
    #[error("transport error: {0}")]
    Transport(String),

    /// The backend answered, but not in a shape we understand.
    #[error("protocol error: {0}")]
    Protocol(String),
}

/// Opaque reference to a submitted job. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobHandle {
    token: String,
    submission: Value,
}

impl JobHandle {
    pub fn new(token: impl Into<String>, submission: Value) -> Self {
        Self {
            token: token.into(),
            submission,
        }
    }

    /// Identifier or endpoint used for polling.
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Raw response of the submit call.
    pub fn submission(&self) -> &Value {
        &self.submission
    }
}

/// Result of one status check.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    Ready(Value),
    Failed(String),
    Pending,
}

impl PollOutcome {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// A backend that accepts jobs and reports their status.
#[async_trait]
pub trait JobClient: Send + Sync {
    /// One submission attempt. Never retried.
    async fn submit(&self, request: &Value) -> Result<JobHandle, JobError>;

    /// One status check. `Err` is treated as transient noise.
    async fn poll(&self, handle: &JobHandle) -> Result<PollOutcome, JobError>;
}

// ---------------------------------------------------------------------------
// Policy
// ---------------------------------------------------------------------------

/// How long polling may go on before the job is declared timed out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollBudget {
    MaxAttempts(u32),
    Deadline(Duration),
}

/// Upper bound on a single submit or poll call.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Fixed-interval polling policy.
///
/// Deserialises from `{"interval_ms": 3000, "max_attempts": 20}` or
/// `{"interval_ms": 5000, "deadline_ms": 60000}`, optionally with
/// `"request_timeout_ms"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "PollPolicyConfig", into = "PollPolicyConfig")]
pub struct PollPolicy {
    pub interval: Duration,
    pub budget: PollBudget,
    /// Longest a single submit or poll call may take.
    pub request_timeout: Duration,
}

impl PollPolicy {
    pub fn attempts(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            budget: PollBudget::MaxAttempts(max_attempts),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn deadline(interval: Duration, deadline: Duration) -> Self {
        Self {
            interval,
            budget: PollBudget::Deadline(deadline),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }

    /// Reject budgets that can never produce a single poll.
    pub fn validate(&self) -> Result<(), String> {
        if self.request_timeout.is_zero() {
            return Err("request_timeout must be positive".into());
        }
        match self.budget {
            PollBudget::MaxAttempts(0) => Err("max_attempts must be at least 1".into()),
            PollBudget::Deadline(deadline) if self.interval > deadline => Err(format!(
                "interval ({:?}) must not exceed the deadline ({deadline:?})",
                self.interval
            )),
            _ => Ok(()),
        }
    }

    fn exhausted(&self, attempts: u32, elapsed: Duration) -> bool {
        match self.budget {
            PollBudget::MaxAttempts(max) => attempts >= max,
            PollBudget::Deadline(deadline) => elapsed > deadline,
        }
    }

    /// Time a single call may take once `elapsed` of the budget is spent.
    fn call_limit(&self, elapsed: Duration) -> Duration {
        match self.budget {
            PollBudget::MaxAttempts(_) => self.request_timeout,
            PollBudget::Deadline(deadline) => {
                deadline.saturating_sub(elapsed).min(self.request_timeout)
            }
        }
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self::attempts(Duration::from_secs(3), 20)
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct PollPolicyConfig {
    interval_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    max_attempts: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    deadline_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    request_timeout_ms: Option<u64>,
}

impl TryFrom<PollPolicyConfig> for PollPolicy {
    type Error = String;

    fn try_from(config: PollPolicyConfig) -> Result<Self, Self::Error> {
        let interval = Duration::from_millis(config.interval_ms);
        let mut policy = match (config.max_attempts, config.deadline_ms) {
            (Some(max), None) => Self::attempts(interval, max),
            (None, Some(ms)) => Self::deadline(interval, Duration::from_millis(ms)),
            _ => return Err("exactly one of max_attempts or deadline_ms must be set".into()),
        };
        if let Some(ms) = config.request_timeout_ms {
            policy.request_timeout = Duration::from_millis(ms);
        }
        policy.validate()?;
        Ok(policy)
    }
}

impl From<PollPolicy> for PollPolicyConfig {
    fn from(policy: PollPolicy) -> Self {
        let (max_attempts, deadline_ms) = match policy.budget {
            PollBudget::MaxAttempts(max) => (Some(max), None),
            PollBudget::Deadline(d) => (None, Some(d.as_millis() as u64)),
        };
        Self {
            interval_ms: policy.interval.as_millis() as u64,
            max_attempts,
            deadline_ms,
            request_timeout_ms: Some(policy.request_timeout.as_millis() as u64),
        }
    }
}

// ---------------------------------------------------------------------------
// Outcome types
// ---------------------------------------------------------------------------

/// Why a job did not produce a result.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum JobFailure {
    #[error("submission failed: {0}")]
    SubmissionError(String),

    #[error("job failed: {0}")]
    VendorFailed(String),

    #[error("no terminal status after {attempts} poll(s) in {elapsed:?}")]
    Timeout { attempts: u32, elapsed: Duration },
}

/// Everything observed while driving one job.
#[derive(Debug, Clone, PartialEq)]
pub struct JobRun {
    /// Poll outcomes in order; the last entry is the only terminal one,
    /// a synthesised `Failed` when the budget ran out. Empty if the
    /// submission itself failed.
    pub history: Vec<PollOutcome>,
    pub result: Result<Value, JobFailure>,
}

impl JobRun {
    pub fn attempts(&self) -> usize {
        self.history.len()
    }
}

// ---------------------------------------------------------------------------
// AsyncJobOrchestrator
// ---------------------------------------------------------------------------

pub struct AsyncJobOrchestrator<C> {
    client: C,
    policy: PollPolicy,
}

impl<C: JobClient> AsyncJobOrchestrator<C> {
    pub fn new(client: C, policy: PollPolicy) -> Self {
        Self { client, policy }
    }

    pub fn policy(&self) -> &PollPolicy {
        &self.policy
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Submit `request` and poll until a terminal state.
    pub async fn run(&self, request: &Value) -> Result<Value, JobFailure> {
        self.drive(request).await.result
    }

    /// Like [`run`](Self::run) but keeps the full poll history.
    #[instrument(skip_all, fields(interval = ?self.policy.interval, budget = ?self.policy.budget))]
    pub async fn drive(&self, request: &Value) -> JobRun {
        let limit = self.policy.call_limit(Duration::ZERO);
        let submitted = match timeout(limit, self.client.submit(request)).await {
            Ok(submitted) => submitted.map_err(|e| e.to_string()),
            Err(_) => Err(format!("no response within {limit:?}")),
        };
        let handle = match submitted {
            Ok(handle) => handle,
            Err(reason) => {
                warn!(%reason, "job submission failed");
                return JobRun {
                    history: Vec::new(),
                    result: Err(JobFailure::SubmissionError(reason)),
                };
            }
        };

        info!(token = handle.token(), "job submitted");
        self.poll_until_terminal(&handle).await
    }

    /// Poll an already submitted job until it is ready, failed, or out of budget.
    pub async fn poll_until_terminal(&self, handle: &JobHandle) -> JobRun {
        let started = Instant::now();
        let mut history = Vec::new();
        let mut attempts = 0u32;

        loop {
            if self.policy.exhausted(attempts, started.elapsed()) {
                break;
            }
            sleep(self.policy.interval).await;
            if self.policy.exhausted(attempts, started.elapsed()) {
                break;
            }

            attempts += 1;
            let limit = self.policy.call_limit(started.elapsed());
            let outcome = match timeout(limit, self.client.poll(handle)).await {
                Ok(Ok(outcome)) => outcome,
                Ok(Err(e)) => {
                    warn!(attempt = attempts, error = %e, "poll failed, treating as pending");
                    PollOutcome::Pending
                }
                Err(_) => {
                    warn!(attempt = attempts, ?limit, "poll timed out, treating as pending");
                    PollOutcome::Pending
                }
            };
            debug!(attempt = attempts, ?outcome, "poll");
            history.push(outcome.clone());

            match outcome {
                PollOutcome::Ready(payload) => {
                    info!(attempts, "job ready");
                    return JobRun {
                        history,
                        result: Ok(payload),
                    };
                }
                PollOutcome::Failed(reason) => {
                    warn!(attempts, %reason, "job failed");
                    return JobRun {
                        history,
                        result: Err(JobFailure::VendorFailed(reason)),
                    };
                }
                PollOutcome::Pending => {}
            }
        }

        let failure = JobFailure::Timeout {
            attempts,
            elapsed: started.elapsed(),
        };
        warn!(%failure, "job timed out");
        history.push(PollOutcome::Failed(failure.to_string()));
        JobRun {
            history,
            result: Err(failure),
        }
    }
}
