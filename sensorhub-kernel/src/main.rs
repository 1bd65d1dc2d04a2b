/**
 * SENSORHUB KERNEL - Entry point of the dashboard backend
 *
 * ROLE : Wires every module together: config, device gateway, telemetry
 * relay, stores, alarm watcher, HTTP + WebSocket API.
 *
 * ARCHITECTURE : one poller -> broadcast channel -> N dashboard sockets,
 * plus a small REST surface for the buzzer, accounts and devices.
 */

mod account_routes;
mod alarm;
mod config;
mod connections;
mod device_routes;
mod fallback;
mod gateway;
mod health;
mod http;
mod models;
mod realtime;
mod relay;
mod sessions;
mod store;

use crate::config::{load_config, ServerConf};
use crate::connections::ConnectionRegistry;
use crate::gateway::DeviceGateway;
use crate::health::HealthTracker;
use crate::http::AppState;
use crate::relay::TelemetryRelay;
use crate::sessions::SessionStore;

use anyhow::{Context, Result};
use axum::http::HeaderValue;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn cors_layer(conf: &ServerConf) -> Result<CorsLayer> {
    let layer = match conf.cors_origin.as_deref() {
        Some(origin) => {
            let origin = HeaderValue::from_str(origin)
                .with_context(|| format!("invalid cors_origin {origin:?}"))?;
            CorsLayer::new()
                .allow_origin(AllowOrigin::exact(origin))
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any)
        }
        None => CorsLayer::permissive(),
    };
    Ok(layer)
}

#[tokio::main]
async fn main() -> Result<()> {
    // .env is optional
    dotenvy::dotenv().ok();

    let (cfg, notes) = load_config().await;

    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cfg.logging.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("[kernel] sensorhub starting");
    for note in notes {
        warn!("[config] {}", note);
    }
    cfg.log_summary();

    let health_tracker = HealthTracker::new();
    let connections = Arc::new(ConnectionRegistry::default());

    let gateway = DeviceGateway::new(&cfg.device).context("failed to build device HTTP client")?;
    let relay = Arc::new(TelemetryRelay::new(
        gateway.clone(),
        cfg.relay.broadcast_capacity,
        health_tracker.clone(),
    ));

    let (accounts, devices) = store::open_stores(&cfg.store)
        .with_context(|| format!("failed to open stores in {}", cfg.store.data_dir))?;
    if cfg.store.seed_admin {
        accounts
            .ensure_admin(&cfg.store.admin_username, &cfg.store.admin_email, &cfg.store.admin_password)
            .await
            .context("failed to seed admin account")?;
    }
    let accounts = Arc::new(accounts);
    let devices = Arc::new(devices);

    let mut tasks = Vec::new();
    tasks.extend(relay.spawn_poller(cfg.relay.poll_interval()));
    if cfg.alarm.enabled {
        tasks.push(alarm::spawn_alarm_watcher(
            relay.clone(),
            devices.clone(),
            gateway.clone(),
            Duration::from_secs(cfg.alarm.cooldown_secs),
        ));
    }

    let app_state = AppState {
        relay,
        gateway,
        connections,
        health_tracker,
        accounts,
        devices,
        sessions: SessionStore::new(),
        owner_lock: Arc::default(),
    };

    let app = http::build_router(app_state).layer(cors_layer(&cfg.server)?);

    let listener = TcpListener::bind(cfg.server.bind.as_str())
        .await
        .with_context(|| format!("failed to bind {}", cfg.server.bind))?;
    info!("[kernel] listening on http://{}", cfg.server.bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            info!("[kernel] shutdown requested");
        })
        .await
        .context("HTTP server failed")?;

    for task in tasks {
        task.abort();
    }
    info!("[kernel] stopped");
    Ok(())
}
