//! `nodes` crate — the node execution contract and built-in generic nodes.
//!
//! Every node implements [`ExecutableNode`]. A [`NodeRunner`] wraps it and
//! turns one engine call into a [`ResultPayload`]: parameters are resolved,
//! the action runs directly or only a [`ToolCapability`] is handed back,
//! credits are metered, and routing intent is carried in reserved keys.

pub mod builtin;
pub mod credits;
pub mod descriptor;
pub mod error;
pub mod http;
pub mod job;
pub mod mock;
pub mod resolver;
pub mod runner;
pub mod signal;
pub mod tool;
pub mod traits;

pub use credits::{CreditMeter, CreditScope};
pub use descriptor::{BillingPolicy, NodeDescriptor};
pub use error::{ContractError, NodeError};
pub use job::{
    AsyncJobOrchestrator, JobClient, JobFailure, JobHandle, PollBudget, PollOutcome, PollPolicy,
};
pub use resolver::{NamedValue, ParamKind, ParameterSpec, ResolvedParameters};
pub use runner::NodeRunner;
pub use signal::{BranchPair, Disposition, NodeOutput, ResultPayload};
pub use tool::{ToolCapability, ToolReply, ToolSchema};
pub use traits::{Environment, ExecutableNode, ExecutionContext};
