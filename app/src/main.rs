use anyhow::Context;
use clap::{Parser, Subcommand};
use relay::commands;
use relay_core::telemetry;
use relay_core::{ConversationError, HttpTransport, ModelSelection, Orchestrator, ServerSettings};
use std::io::Write;
use std::sync::Arc;
use tokio::io::BufReader;
use tokio::runtime::Runtime;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "relay", version, about = "Talk to a local opencode server")]
struct Cli {
    #[command(subcommand)]
    command: Command,
    #[arg(long, global = true)]
    host: Option<String>,
    #[arg(long, global = true)]
    port: Option<u16>,
    #[arg(long, global = true, env = "OPENCODE_SERVER_PASSWORD", hide_env_values = true)]
    password: Option<String>,
    #[arg(long, short, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check that the server is up.
    Health,
    /// Start a new session with a single prompt.
    Ask {
        #[arg(required = true)]
        prompt: Vec<String>,
        #[arg(long, value_parser = parse_model)]
        model: Option<ModelSelection>,
    },
    /// Chat interactively; one prompt per line.
    Chat {
        #[arg(long)]
        session: Option<String>,
        #[arg(long, value_parser = parse_model)]
        model: Option<ModelSelection>,
    },
    /// List sessions, newest first.
    Sessions,
    /// Print a session's transcript.
    Show {
        id: String,
        /// Only the most recent N messages; 0 means all.
        #[arg(long)]
        limit: Option<u32>,
    },
    /// Delete a session on the server.
    Delete {
        id: String,
    },
    /// Stop the reply a session is currently generating.
    Abort {
        id: String,
    },
    /// List available provider/model pairs.
    Models,
}

fn parse_model(value: &str) -> Result<ModelSelection, String> {
    ModelSelection::parse(value)
        .ok_or_else(|| format!("expected provider/model, got `{value}`"))
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
    };
    telemetry::init_tracing(filter)?;

    let settings = resolve_settings(&cli).map_err(|err| anyhow::anyhow!(err.user_message()))?;
    let transport = HttpTransport::new(&settings).context("failed to build HTTP client")?;
    let orchestrator = Orchestrator::new(Arc::new(transport), settings.base_url());
    let runtime = Runtime::new()?;

    let output = runtime
        .block_on(run(&orchestrator, cli.command))
        .map_err(|err| match err.downcast_ref::<ConversationError>() {
            Some(conversation_err) => anyhow::anyhow!(conversation_err.user_message()),
            None => err,
        })?;
    let mut stdout = std::io::stdout();
    stdout.write_all(output.as_bytes())?;
    stdout.flush()?;
    Ok(())
}

fn resolve_settings(cli: &Cli) -> Result<ServerSettings, relay_core::ConfigError> {
    let mut settings = ServerSettings::load()?;
    if let Some(host) = &cli.host {
        settings.host = host.clone();
    }
    if let Some(port) = cli.port {
        settings.port = port;
    }
    if let Some(password) = &cli.password {
        settings = settings.with_password(password.clone());
    }
    Ok(settings)
}

async fn run(orchestrator: &Orchestrator, command: Command) -> anyhow::Result<String> {
    match command {
        Command::Health => commands::health(orchestrator).await,
        Command::Ask { prompt, model } => {
            commands::ask(orchestrator, &prompt.join(" "), model).await
        }
        Command::Chat { session, model } => {
            let input = BufReader::new(tokio::io::stdin());
            let mut stdout = std::io::stdout();
            commands::chat(orchestrator, input, &mut stdout, session.as_deref(), model).await?;
            Ok(String::new())
        }
        Command::Sessions => commands::sessions(orchestrator).await,
        Command::Show { id, limit } => commands::show(orchestrator, &id, limit).await,
        Command::Delete { id } => commands::delete(orchestrator, &id).await,
        Command::Abort { id } => commands::abort(orchestrator, &id).await,
        Command::Models => commands::models(orchestrator).await,
    }
}
