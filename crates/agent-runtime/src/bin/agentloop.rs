//! agentloop CLI
//!
//! Runs one message through an agent defined in YAML and prints the final
//! answer on stdout. Logs go to stderr, filtered by `RUST_LOG`.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use serde_json::Value;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use agent_core::{CallArgs, CallbackManager, TracingCallback};
use agent_runtime::AgentLoader;

#[derive(Parser, Debug)]
#[command(name = "agentloop", version, about = "Run an agent defined in YAML")]
struct Cli {
    /// Agent configuration file
    #[arg(short, long, env = "AGENTLOOP_CONFIG")]
    config: PathBuf,

    /// Fail once the model has taken this many steps; applies to sub-agents too
    #[arg(long)]
    max_steps: Option<usize>,

    /// Run the tool calls of one turn concurrently, in every agent
    #[arg(long)]
    parallel: bool,

    /// Prompt variable, `key=value`; repeatable
    #[arg(long = "var", value_parser = parse_var)]
    vars: Vec<(String, String)>,

    /// Check that the model backend answers before running
    #[arg(long)]
    check: bool,

    /// Message sent to the agent
    message: String,
}

fn parse_var(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .filter(|(key, _)| !key.is_empty())
        .map(|(key, value)| (key.to_owned(), value.to_owned()))
        .ok_or_else(|| format!("expected key=value, got '{raw}'"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "warn,agent_core=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let callbacks = CallbackManager::new().with_handler(Arc::new(TracingCallback));
    let mut loader = AgentLoader::new().with_callbacks(callbacks);
    if let Some(max) = cli.max_steps {
        loader = loader.with_max_steps(max);
    }
    if cli.parallel {
        loader = loader.with_parallel_tool_calls(true);
    }

    let mut agent = loader
        .load_file(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;

    if cli.check {
        if agent.model().backend().health_check().await? {
            tracing::info!(backend = %agent.model().name(), "Backend reachable");
        } else {
            anyhow::bail!("backend {} is not reachable", agent.model().name());
        }
    }

    let args = cli
        .vars
        .into_iter()
        .fold(CallArgs::new(), |args, (key, value)| {
            args.kwarg(key, Value::String(value))
        });

    let answer = agent.run(cli.message, args).await.map_err(|e| {
        tracing::error!(error = %e, "Run failed");
        anyhow::anyhow!(e.user_message())
    })?;

    println!("{answer}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_vars() {
        assert_eq!(
            parse_var("topic=rust=fun").unwrap(),
            ("topic".to_owned(), "rust=fun".to_owned())
        );
        assert!(parse_var("novalue").is_err());
        assert!(parse_var("=x").is_err());
    }

    #[test]
    fn cli_shape() {
        let cli = Cli::parse_from([
            "agentloop", "-c", "a.yaml", "--max-steps", "4", "--parallel", "--var", "k=v", "hi",
        ]);
        assert_eq!(cli.max_steps, Some(4));
        assert!(cli.parallel);
        assert_eq!(cli.vars, vec![("k".to_owned(), "v".to_owned())]);
        assert_eq!(cli.message, "hi");
    }
}
