//! Generic nodes that ship with the crate.

pub mod condition;
pub mod http_job;
pub mod intercept;

pub use condition::ConditionNode;
pub use http_job::HttpJobNode;
pub use intercept::InterceptNode;

use crate::job::PollPolicy;
use crate::{ContractError, NodeRunner};

/// Runners for every built-in node.
pub fn runners(policy: PollPolicy) -> Result<Vec<NodeRunner>, ContractError> {
    Ok(vec![
        NodeRunner::new(HttpJobNode::new(policy))?,
        NodeRunner::new(ConditionNode::new())?,
        NodeRunner::new(InterceptNode::new())?,
    ])
}
