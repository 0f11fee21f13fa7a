//! Node-level error types.

use thiserror::Error;

use crate::job::JobFailure;

/// Errors returned by a node's `execute` method.
///
/// None of these ever escape [`NodeRunner::invoke`](crate::NodeRunner::invoke)
/// or [`ToolCapability::invoke`](crate::ToolCapability::invoke); the runner
/// uses the variant to decide the meter and branch outcome:
/// - `MissingParameter` — degrade to tool-only, no charge.
/// - everything else    — terminal for this invocation, error branch signalled.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NodeError {
    /// A parameter required for direct execution has no usable value.
    #[error("missing required parameter(s): {0}")]
    MissingParameter(String),

    /// Delegated arguments did not match the tool's input schema.
    #[error("invalid tool arguments: {0}")]
    InvalidArguments(String),

    /// A secret the action needs is not present in the environment.
    #[error("missing secret '{0}'")]
    MissingSecret(String),

    /// The external service rejected or never received the submission.
    #[error("submission failed: {0}")]
    Submission(String),

    /// The external service reported that the job failed.
    #[error("external job failed: {0}")]
    VendorFailed(String),

    /// The polling budget ran out before the job reached a terminal state.
    #[error("timed out: {0}")]
    Timeout(String),

    /// Any other unrecoverable failure.
    #[error("fatal node error: {0}")]
    Fatal(String),
}

impl NodeError {
    /// Short machine-readable label, used as a tracing field.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MissingParameter(_) => "missing_parameter",
            Self::InvalidArguments(_) => "invalid_arguments",
            Self::MissingSecret(_) => "missing_secret",
            Self::Submission(_) => "submission_error",
            Self::VendorFailed(_) => "vendor_failed",
            Self::Timeout(_) => "timeout",
            Self::Fatal(_) => "fatal",
        }
    }
}

impl From<JobFailure> for NodeError {
    fn from(failure: JobFailure) -> Self {
        match failure {
            JobFailure::SubmissionError(msg) => Self::Submission(msg),
            JobFailure::VendorFailed(msg) => Self::VendorFailed(msg),
            timeout @ JobFailure::Timeout { .. } => Self::Timeout(timeout.to_string()),
        }
    }
}

impl From<anyhow::Error> for NodeError {
    fn from(err: anyhow::Error) -> Self {
        Self::Fatal(format!("{err:#}"))
    }
}

/// Errors detected while building a [`NodeDescriptor`](crate::NodeDescriptor).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ContractError {
    /// An output port or branch name uses a key the engine interprets itself.
    #[error("'{0}' collides with a reserved result key")]
    ReservedPort(String),

    /// Two parameters share a name.
    #[error("duplicate parameter '{0}'")]
    DuplicateParameter(String),

    /// Two output ports, or both sides of a branch pair, share a name.
    #[error("duplicate output port '{0}'")]
    DuplicatePort(String),
}
