// escrow_app/src/main.rs

mod config;
mod db;
mod errors;
mod services;
mod state;
mod web;

use crate::config::AppConfig;
use crate::services::chat_log::LoggingTransport;
use crate::services::dispatcher::EventDispatcher;
use crate::services::token_sweeper;
use crate::state::AppState;

use actix_web::{web as actix_data, App, HttpServer};
use anyhow::Context;
use escrow::{Coordinator, EscrowServices, FlowSettings, Notifier, OrderService, ReferenceCache, TokenService};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::Level;
use tracing_subscriber::fmt::format::FmtSpan; // For span events in tracing

/// Connects the database, loads reference data and wires the coordinator.
async fn build_coordinator(config: &AppConfig) -> anyhow::Result<(sqlx::PgPool, Arc<Coordinator>)> {
  let db_pool = db::connect(config).await.context("connecting to the database")?;
  tracing::info!("Successfully connected to the database.");
  db::schema::initialize(&db_pool).await.context("initializing the schema")?;

  let catalog = ReferenceCache::load(&db::PgReferenceSource::new(db_pool.clone()))
    .await
    .context("loading reference data")?;
  tracing::info!(
    games = catalog.games().len(),
    experts = catalog.experts().len(),
    support = catalog.support().is_some(),
    "Reference data loaded."
  );
  let catalog = Arc::new(catalog);

  let services = EscrowServices {
    orders: OrderService::new(Arc::new(db::PgOrderStore::new(db_pool.clone())), catalog.clone()),
    tokens: TokenService::new(Arc::new(db::PgTokenStore::new(db_pool.clone()))),
    notifier: Notifier::new(Arc::new(LoggingTransport::new()), config.transport_retry),
    catalog,
    settings: FlowSettings {
      experts_chat_id: config.experts_chat_id,
    },
  };
  let coordinator = Coordinator::with_default_flows(services).context("registering transition flows")?;
  Ok((db_pool, Arc::new(coordinator)))
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
  tracing_subscriber::fmt()
    .with_max_level(Level::INFO) // Default level
    .with_env_filter(tracing_subscriber::EnvFilter::from_default_env()) // Allow RUST_LOG override
    .with_span_events(FmtSpan::CLOSE) // Log when spans close, showing duration
    .init();

  tracing::info!("Starting escrow bot server...");

  let app_config = match AppConfig::from_env() {
    Ok(cfg) => Arc::new(cfg),
    Err(e) => {
      tracing::error!(error = %e, "Failed to load application configuration.");
      return Err(std::io::Error::other(e.to_string()));
    }
  };

  let (db_pool, coordinator) = match build_coordinator(&app_config).await {
    Ok(built) => built,
    Err(e) => {
      tracing::error!(error = format!("{:#}", e), "Startup failed.");
      return Err(std::io::Error::other(format!("{:#}", e)));
    }
  };

  let (shutdown_tx, shutdown_rx) = watch::channel(false);
  let (dispatcher, dispatch_loop) = EventDispatcher::start(coordinator.clone(), shutdown_rx.clone());
  let sweeper = app_config.token_ttl.map(|ttl| {
    token_sweeper::spawn(
      coordinator.services().tokens.clone(),
      ttl,
      app_config.token_sweep_interval,
      shutdown_rx,
    )
  });

  let app_state = AppState {
    db_pool,
    coordinator,
    dispatcher,
    config: app_config.clone(),
  };

  let server_address = format!("{}:{}", app_config.server_host, app_config.server_port);
  tracing::info!("Attempting to bind server to {}...", server_address);

  // Ctrl-C / SIGTERM stop the server gracefully; `run` returns once workers are gone.
  let served = HttpServer::new(move || {
    App::new()
      .app_data(actix_data::Data::new(app_state.clone())) // Share AppState with handlers
      .wrap(tracing_actix_web::TracingLogger::default()) // Actix middleware for tracing requests
      .configure(web::configure_app_routes)
  })
  .bind(&server_address)?
  .run()
  .await;

  tracing::info!("HTTP server stopped; waiting for in-flight events.");
  let _ = shutdown_tx.send(true);
  if let Err(e) = dispatch_loop.await {
    tracing::error!(error = %e, "Dispatcher task panicked.");
  }
  if let Some(sweeper) = sweeper {
    if let Err(e) = sweeper.await {
      tracing::error!(error = %e, "Token sweeper task panicked.");
    }
  }
  served
}
