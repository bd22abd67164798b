use std::io::{self, Read};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use flowmill_catalog::builtin::builtin_catalog;
use flowmill_compiler::GraphCompiler;
use flowmill_config::FlowDefinition;
use flowmill_runtime::{ChannelNotifier, ExecutionRuntime, RunRequest};

/// Flowmill - compiles node-and-edge flow definitions and runs them
#[derive(Parser)]
#[command(name = "flowmill")]
#[command(version, about, long_about = None)]
struct Cli {
  #[command(subcommand)]
  command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
  /// Compile and execute a flow
  Run {
    /// Path to the flow definition (JSON)
    flow_file: PathBuf,

    /// Pipeline input; falls back to JSON on stdin
    #[arg(long)]
    input: Option<String>,

    /// Session id to run under (derived when omitted)
    #[arg(long)]
    session: Option<String>,

    /// Print lifecycle events as they happen
    #[arg(long)]
    stream: bool,
  },

  /// Compile only and print the metrics report
  Check {
    /// Path to the flow definition (JSON)
    flow_file: PathBuf,
  },
}

fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
    .with_writer(io::stderr)
    .init();

  let cli = Cli::parse();

  match cli.command {
    Some(Commands::Run {
      flow_file,
      input,
      session,
      stream,
    }) => {
      let rt = tokio::runtime::Runtime::new()?;
      rt.block_on(run_flow(flow_file, input, session, stream))
    }
    Some(Commands::Check { flow_file }) => check_flow(flow_file),
    None => {
      println!("flowmill - use --help to see available commands");
      Ok(())
    }
  }
}

async fn run_flow(
  flow_file: PathBuf,
  input: Option<String>,
  session: Option<String>,
  stream: bool,
) -> Result<()> {
  let flow = load_flow(&flow_file)?;

  let catalog = builtin_catalog();
  let graph = GraphCompiler::new(&catalog)
    .build(&flow)
    .context("flow compilation failed")?;

  eprintln!(
    "Compiled {} nodes, {} connections in {}ms",
    graph.metrics.node_count, graph.metrics.connection_count, graph.metrics.duration_ms
  );

  let input_value = match input {
    Some(text) => serde_json::from_str(&text).unwrap_or(serde_json::Value::String(text)),
    None => read_input_from_stdin()?,
  };
  let mut request = RunRequest::with_input(input_value);
  request.session_id = session;

  let cancel = CancellationToken::new();
  let outcome = if stream {
    let (notifier, mut events) = ChannelNotifier::new();
    let runtime = ExecutionRuntime::new().with_notifier(Arc::new(notifier));

    let printer = tokio::spawn(async move {
      while let Some(event) = events.recv().await {
        match serde_json::to_string(&event) {
          Ok(line) => println!("{}", line),
          Err(e) => eprintln!("event serialization failed: {}", e),
        }
      }
    });
    let outcome = runtime.execute(&graph, request, cancel).await;
    // Dropping the runtime closes the event channel and ends the printer.
    drop(runtime);
    let _ = printer.await;
    outcome
  } else {
    ExecutionRuntime::new().execute(&graph, request, cancel).await
  };

  if !stream {
    println!("{}", serde_json::to_string_pretty(&outcome)?);
  }
  if !outcome.success {
    anyhow::bail!(
      "execution failed: {}",
      outcome.error.unwrap_or_else(|| "unknown error".to_string())
    );
  }
  Ok(())
}

fn check_flow(flow_file: PathBuf) -> Result<()> {
  let flow = load_flow(&flow_file)?;

  let catalog = builtin_catalog();
  match GraphCompiler::new(&catalog).build(&flow) {
    Ok(graph) => {
      println!("{}", serde_json::to_string_pretty(&graph.metrics)?);
      Ok(())
    }
    Err(e) => {
      eprintln!("compile failed: {}", e);
      anyhow::bail!("flow definition is invalid")
    }
  }
}

fn load_flow(flow_file: &PathBuf) -> Result<FlowDefinition> {
  let content = std::fs::read_to_string(flow_file)
    .with_context(|| format!("failed to read flow file: {}", flow_file.display()))?;
  serde_json::from_str(&content)
    .with_context(|| format!("failed to parse flow file: {}", flow_file.display()))
}

fn read_input_from_stdin() -> Result<serde_json::Value> {
  use std::io::IsTerminal;

  if io::stdin().is_terminal() {
    Ok(serde_json::Value::Null)
  } else {
    let mut input = String::new();
    io::stdin()
      .read_to_string(&mut input)
      .context("failed to read input from stdin")?;

    if input.trim().is_empty() {
      Ok(serde_json::Value::Null)
    } else {
      serde_json::from_str(&input).context("failed to parse input JSON from stdin")
    }
  }
}
