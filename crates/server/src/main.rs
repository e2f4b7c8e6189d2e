mod api;

use std::sync::Arc;

use anyhow::Context;
use submission_tracker::ws_api::{self, WsContext};
use submission_tracker::{HttpSubmissionApi, SubmissionTracker, TopicHub, TrackerConfig};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::api::AppState;

const CONFIG_PATH: &str = "buildwatch.toml";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing()?;

    info!("starting buildwatch server");
    info!("loading tracker config from {CONFIG_PATH}");
    let config = TrackerConfig::from_file(CONFIG_PATH)
        .with_context(|| format!("failed to load tracker config from {CONFIG_PATH}"))?;

    let client = HttpSubmissionApi::new(&config).context("failed to create platform client")?;
    let hub = Arc::new(TopicHub::new());
    let tracker = Arc::new(
        SubmissionTracker::new(&config, Arc::new(client), hub.clone())
            .context("failed to initialize submission tracker")?,
    );

    if config.watched_exercises.is_empty() {
        warn!("no exercises are watched, states load on first subscription");
    }
    for exercise_id in &config.watched_exercises {
        tracker.subscribe_exercise(*exercise_id);
        info!(exercise_id = %exercise_id, "watching exercise");
    }

    let state = Arc::new(AppState::new(tracker.clone(), hub.clone()));
    let app = api::router(state).merge(ws_api::router(WsContext::new(tracker.clone(), hub)));
    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.listen_addr))?;
    info!(addr = %config.listen_addr, "http server listening");
    let server = tokio::spawn(async move { axum::serve(listener, app).await });

    let mut event_stream = tracker.subscribe_events();
    info!("subscribed to tracker event stream");
    info!("server is ready, press Ctrl+C to shut down");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown signal received, stopping server");
                break;
            }
            event = event_stream.recv() => {
                match event {
                    Ok(event) => info!(?event, "tracker event"),
                    Err(err) => {
                        warn!(error = %err, "failed to receive tracker event");
                        break;
                    }
                }
            }
        }
    }

    tracker.shutdown();
    server.abort();
    info!("server shutdown complete");
    Ok(())
}

fn init_tracing() -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("info"))?;

    tracing_subscriber::fmt().with_env_filter(env_filter).init();
    Ok(())
}
