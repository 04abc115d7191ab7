// src/main.rs
// FOCUS PANEL - API SERVER
// Serves persona generation and focus group simulations via REST (Actix-Web)

use std::sync::Arc;
use std::time::Duration;

use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use anyhow::Context;
use dashmap::DashMap; // Thread-safe hashmap for storing jobs
use tracing::info;
use tracing_subscriber::EnvFilter;

use focus_panel::{build_brain, AppConfig, LogFormat, TextGenerator};

mod api;

// Shared State for the Server
pub struct AppState {
    pub brain: Arc<dyn TextGenerator>,
    pub jobs: api::JobStore,
    pub config: AppConfig,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/api/personas", web::post().to(api::generate_personas))
        .route("/api/simulate", web::post().to(api::start_simulation))
        .route("/api/status/{id}", web::get().to(api::get_job_status))
        .route("/api/transcript/{id}", web::get().to(api::get_transcript))
        .route("/api/stats/{id}", web::get().to(api::get_stats));
}

const JOB_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Periodically evicts finished jobs past their retention window.
fn spawn_job_sweeper(jobs: api::JobStore, retention_secs: u64) {
    if retention_secs == 0 {
        return;
    }
    let retention = i64::try_from(retention_secs)
        .ok()
        .and_then(chrono::Duration::try_seconds)
        .unwrap_or(chrono::Duration::MAX);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(JOB_SWEEP_INTERVAL);
        loop {
            ticker.tick().await;
            api::evict_finished(&jobs, retention, chrono::Utc::now());
        }
    });
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // 1. Configuration + logging
    let config = AppConfig::load().context("failed to load configuration")?;
    init_tracing(config.log_format);
    info!(provider = %config.provider, "Focus Panel API Server Starting...");

    // 2. Initialize the text generator (ONCE at startup)
    let brain = build_brain(&config).context("failed to initialize text generator")?;

    // 3. Create Shared State
    let (host, port) = config.bind_addr();
    let jobs: api::JobStore = Arc::new(DashMap::new());
    spawn_job_sweeper(jobs.clone(), config.job_retention_secs);
    let app_state = web::Data::new(AppState {
        brain,
        jobs,
        config,
    });

    info!("Server running at http://{}:{}", host, port);

    // 4. Start HTTP Server
    HttpServer::new(move || {
        let cors = Cors::permissive();

        App::new()
            .wrap(cors)
            .app_data(app_state.clone())
            .configure(configure)
    })
    .bind((host.as_str(), port))
    .with_context(|| format!("failed to bind {host}:{port}"))?
    .run()
    .await?;

    Ok(())
}
