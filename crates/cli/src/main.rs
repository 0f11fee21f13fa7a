//! `graphnode` CLI entry-point.
//!
//! Available sub-commands:
//! - `list`      — list registered node types.
//! - `describe`  — print a node's tool schema.
//! - `invoke`    — run one invocation request (JSON file) and print the payload.
//! - `call-tool` — run one delegated tool call (JSON file) and print the reply.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use host::{InvocationRequest, NodeHost, ToolCallRequest};
use nodes::{Environment, PollPolicy};
use tracing::info;
use tracing_subscriber::EnvFilter;

const SECRET_PREFIX: &str = "GRAPHNODE_SECRET_";

#[derive(Parser)]
#[command(
    name = "graphnode",
    about = "Run workflow nodes outside a graph engine",
    version
)]
struct Cli {
    #[command(flatten)]
    poll: PollArgs,

    /// Merge GRAPHNODE_SECRET_<NAME> variables into the request's secrets.
    #[arg(long, global = true)]
    secrets_from_env: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct PollArgs {
    /// Delay between status checks of external jobs.
    #[arg(long, global = true, env = "GRAPHNODE_POLL_INTERVAL_MS", default_value_t = 3000)]
    poll_interval_ms: u64,

    /// Give up after this many status checks.
    #[arg(
        long,
        global = true,
        env = "GRAPHNODE_POLL_MAX_ATTEMPTS",
        default_value_t = 20,
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    poll_max_attempts: u32,

    /// Give up after this much wall-clock time instead of counting checks.
    #[arg(long, global = true, env = "GRAPHNODE_POLL_DEADLINE_MS")]
    poll_deadline_ms: Option<u64>,

    /// Upper bound on a single submit or status request.
    #[arg(
        long,
        global = true,
        env = "GRAPHNODE_POLL_REQUEST_TIMEOUT_MS",
        default_value_t = 30_000,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    poll_request_timeout_ms: u64,
}

impl PollArgs {
    fn policy(&self) -> Result<PollPolicy> {
        let interval = Duration::from_millis(self.poll_interval_ms);
        let policy = match self.poll_deadline_ms {
            Some(ms) => PollPolicy::deadline(interval, Duration::from_millis(ms)),
            None => PollPolicy::attempts(interval, self.poll_max_attempts),
        }
        .with_request_timeout(Duration::from_millis(self.poll_request_timeout_ms));
        policy
            .validate()
            .map_err(|reason| anyhow!("invalid poll policy: {reason}"))?;
        Ok(policy)
    }
}

#[derive(Subcommand)]
enum Command {
    /// List registered node types.
    List,
    /// Print the tool schema of a node type.
    Describe { node_type: String },
    /// Run an invocation request file.
    Invoke {
        /// Path to the invocation request JSON file.
        path: PathBuf,
    },
    /// Run a tool call request file.
    CallTool {
        /// Path to the tool call request JSON file.
        path: PathBuf,
    },
}

fn read(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("cannot read file {}", path.display()))
}

fn merge_env_secrets(environment: &mut Environment) {
    for (key, value) in std::env::vars() {
        if let Some(name) = key.strip_prefix(SECRET_PREFIX) {
            environment
                .secrets
                .entry(name.to_lowercase())
                .or_insert(value);
        }
    }
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let host = NodeHost::with_builtins(cli.poll.policy()?).context("failed to register nodes")?;

    match cli.command {
        Command::List => {
            for node_type in host.node_types() {
                println!("{node_type}");
            }
        }
        Command::Describe { node_type } => {
            print_json(&host.describe(&node_type)?)?;
        }
        Command::Invoke { path } => {
            let mut request = InvocationRequest::from_json(&read(&path)?)
                .with_context(|| format!("invalid request in {}", path.display()))?;
            if cli.secrets_from_env {
                merge_env_secrets(&mut request.environment);
            }
            info!("Invoking node '{}'", request.node_type);
            print_json(&host.invoke(&request).await?)?;
        }
        Command::CallTool { path } => {
            let mut request = ToolCallRequest::from_json(&read(&path)?)
                .with_context(|| format!("invalid tool call in {}", path.display()))?;
            if cli.secrets_from_env {
                merge_env_secrets(&mut request.environment);
            }
            info!("Calling tool '{}'", request.node_type);
            print_json(&host.call_tool(&request).await?)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("graphnode").chain(args.iter().copied()))
    }

    #[test]
    fn zero_max_attempts_is_rejected() {
        assert!(parse(&["--poll-max-attempts", "0", "list"]).is_err());

        let cli = parse(&["--poll-max-attempts", "4", "list"]).unwrap();
        assert_eq!(cli.poll.policy().unwrap().budget, nodes::PollBudget::MaxAttempts(4));
    }

    #[test]
    fn interval_longer_than_deadline_is_rejected() {
        let cli = parse(&["--poll-interval-ms", "5000", "--poll-deadline-ms", "1000", "list"])
            .unwrap();
        assert!(cli.poll.policy().is_err());
    }
}
