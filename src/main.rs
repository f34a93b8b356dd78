use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{CommandFactory, Parser, Subcommand};
use futures::StreamExt;
use tracing::info;
use tracing_subscriber::EnvFilter;

use stepflow_core::config::AppConfig;
use stepflow_core::traits::Tool;
use stepflow_core::types::{RunStatus, StateMap};
use stepflow_engine::{Engine, Graph, GraphDefinition, GraphPayload, RunOptions};
use stepflow_gateway::GatewayServer;

#[derive(Parser)]
#[command(name = "stepflow", version, about = "Workflow graph execution engine")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "stepflow.toml", env = "STEPFLOW_CONFIG")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP/WebSocket gateway
    Serve {
        /// Override the configured bind address
        #[arg(long)]
        bind: Option<String>,
    },
    /// Run a graph definition to completion, printing events as JSON lines
    Run {
        /// Graph definition file (full or compact JSON)
        graph: PathBuf,
        /// JSON file with the initial state
        #[arg(long)]
        state: Option<PathBuf>,
        /// Set a state key (`key=value`, value parsed as JSON if possible)
        #[arg(long = "set", value_name = "KEY=VALUE")]
        set: Vec<String>,
        /// Visit cap per node for this run
        #[arg(long)]
        max_visits: Option<u32>,
    },
    /// Check a graph definition without running it
    Validate {
        /// Graph definition file (full or compact JSON)
        graph: PathBuf,
    },
    /// List registered tools
    Tools,
    /// Show current configuration
    Config,
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("stepflow=info,warn")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // Handle completions before config loading
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = Cli::command();
        clap_complete::generate(*shell, &mut cmd, "stepflow", &mut std::io::stdout());
        return Ok(());
    }

    let config = if cli.config.exists() {
        AppConfig::load(&cli.config)?
    } else {
        info!(path = %cli.config.display(), "No config file found, using defaults");
        AppConfig::default()
    };

    let engine = Arc::new(Engine::with_builtins(config.engine.clone()));

    match cli.command {
        Commands::Serve { bind } => {
            let mut gateway_config = config.gateway_or_default();
            if let Some(bind) = bind {
                gateway_config.bind = bind;
            }
            info!(bind = %gateway_config.bind, "Starting gateway");
            let server = GatewayServer::new(gateway_config, engine);
            let cancel = tokio_util::sync::CancellationToken::new();
            let cancel_clone = cancel.clone();

            // Graceful shutdown on Ctrl-C
            tokio::spawn(async move {
                tokio::signal::ctrl_c().await.ok();
                info!("Shutting down gateway...");
                cancel_clone.cancel();
            });

            server.run(cancel).await?;
        }
        Commands::Run {
            graph,
            state,
            set,
            max_visits,
        } => {
            let definition = load_definition(&graph)?;
            let mut initial = match state {
                Some(path) => load_state(&path)?,
                None => StateMap::new(),
            };
            for assignment in &set {
                let (key, value) = parse_assignment(assignment)?;
                initial.insert(key, value);
            }

            let graph_id = engine.create_graph(definition)?;
            let mut options = RunOptions::background();
            options.max_visits_per_node = max_visits;
            let run_id = engine.start_run(&graph_id, Some(initial), options).await?;

            let mut events = engine.subscribe_run_log(&run_id)?;
            let mut stdout = std::io::stdout().lock();
            while let Some(event) = events.next().await {
                writeln!(stdout, "{}", serde_json::to_string(&event)?)?;
            }
            stdout.flush()?;

            let status = engine.get_run_state(&run_id)?.status;
            if status != RunStatus::Completed {
                bail!("run {} finished with status {}", run_id, status);
            }
        }
        Commands::Validate { graph } => {
            let definition = load_definition(&graph)?;
            let validated = Graph::new(definition)?;
            println!(
                "ok: {} nodes, {} edges, entry '{}'",
                validated.node_count(),
                validated.edge_count(),
                validated.entry()
            );
        }
        Commands::Tools => {
            let tools = engine.tools();
            for name in tools.list() {
                let description = tools.get(name).map(|t| t.description().to_string());
                match description.as_deref() {
                    Some(d) if !d.is_empty() => println!("{:<24} {}", name, d),
                    _ => println!("{}", name),
                }
            }
        }
        Commands::Config => {
            println!("{}", toml::to_string_pretty(&config)?);
        }
        Commands::Completions { .. } => unreachable!("handled before config load"),
    }

    Ok(())
}

fn load_definition(path: &Path) -> anyhow::Result<GraphDefinition> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading graph file {}", path.display()))?;
    let payload: GraphPayload = serde_json::from_str(&text)
        .with_context(|| format!("parsing graph file {}", path.display()))?;
    Ok(payload.into())
}

fn load_state(path: &Path) -> anyhow::Result<StateMap> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading state file {}", path.display()))?;
    serde_json::from_str(&text)
        .with_context(|| format!("state file {} must hold a JSON object", path.display()))
}

/// Split `key=value`; the value is JSON when it parses, else a plain string.
fn parse_assignment(s: &str) -> anyhow::Result<(String, serde_json::Value)> {
    let Some((key, raw)) = s.split_once('=') else {
        bail!("expected KEY=VALUE, got '{}'", s);
    };
    let key = key.trim();
    if key.is_empty() {
        bail!("empty key in '{}'", s);
    }
    let value = serde_json::from_str(raw)
        .unwrap_or_else(|_| serde_json::Value::String(raw.to_string()));
    Ok((key.to_string(), value))
}
