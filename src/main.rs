//! Council HTTP server

use std::sync::Arc;

use anyhow::Context;
use tracing::{debug, info};

use council::agent::build_agents;
use council::completion::{AzureOpenAiClient, ChatCompletion};
use council::server::{build_router, AppState};
use council::{default_roster, event_channel, Orchestrator, OrchestratorOptions, Settings};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("council=info,tower_http=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let settings = Settings::from_env().context("loading configuration")?;

    let http = settings.http_client().context("building HTTP client")?;
    let service: Arc<dyn ChatCompletion> =
        Arc::new(AzureOpenAiClient::with_client(http.clone(), &settings.completion));
    let agents = build_agents(
        &default_roster(),
        Arc::clone(&service),
        &http,
        settings.search.as_ref(),
        settings.top_k,
    );

    let (sink, mut events) = event_channel();
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            if let Ok(json) = serde_json::to_string(&event) {
                debug!(session_id = %event.session_id(), event = %json, "Chat event");
            }
        }
    });

    let orchestrator = Orchestrator::new(
        agents,
        service,
        OrchestratorOptions::from_settings(&settings),
    )
    .with_events(sink);

    let app = build_router(AppState {
        orchestrator: Arc::new(orchestrator),
    });

    info!(addr = %settings.bind, mode = ?settings.mode, "Starting server");
    let listener = tokio::net::TcpListener::bind(settings.bind)
        .await
        .with_context(|| format!("binding {}", settings.bind))?;
    axum::serve(listener, app).await?;

    Ok(())
}
