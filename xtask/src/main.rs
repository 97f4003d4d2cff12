use anyhow::{ensure, Result};
use clap::{Parser, Subcommand};
use relay_core::{telemetry, MemoryTransport, Orchestrator, ProviderDirectory};
use std::sync::Arc;
use tokio::runtime::Runtime;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "xtask", version, about = "Automation helpers for Relay")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run an offline start/continue/browse/open/delete flow over the in-memory server.
    Smoke,
}

fn main() -> Result<()> {
    telemetry::init_tracing(EnvFilter::new("info"))?;
    let cli = Cli::parse();

    match cli.command {
        Commands::Smoke => smoke_test(),
    }
}

fn smoke_test() -> Result<()> {
    let runtime = Runtime::new()?;
    let directory: ProviderDirectory = serde_json::from_str(
        r#"{"providers":[{"id":"smoke","name":"Smoke","models":{"echo":{"id":"echo","name":"Echo"}}}],"default":{}}"#,
    )?;
    let transport = MemoryTransport::new().with_providers(directory);
    let orchestrator = Orchestrator::new(Arc::new(transport.clone()), "memory://relay");

    runtime.block_on(async {
        let model = orchestrator.resolve_default_model().await?;
        let mut conversation = orchestrator
            .start_conversation("ping from xtask", model.as_ref())
            .await?;
        orchestrator
            .continue_conversation(&mut conversation, "and again", model.as_ref())
            .await?;

        let sessions = orchestrator.browse_sessions().await?;
        let reopened = orchestrator
            .open_session(conversation.session_id(), None)
            .await?;
        ensure!(
            reopened.transcript().len() == conversation.transcript().len(),
            "reopened transcript has {} entries, expected {}",
            reopened.transcript().len(),
            conversation.transcript().len()
        );

        orchestrator.delete_session(&mut conversation).await?;
        info!(
            "sessions" = sessions.len(),
            "messages" = reopened.transcript().len(),
            "requests" = transport.calls().len(),
            "smoke test conversation completed"
        );
        Ok(())
    })
}
