// escrow_app/src/services/dispatcher.rs

//! Runs every inbound event on its own task and drains in-flight events on shutdown.
//!
//! A guarded write that has started is allowed to finish: on shutdown intake closes,
//! events still queued are dropped unstarted (the platform redelivers unanswered
//! presses), and the loop waits for every spawned flow.

use escrow::{CallbackEvent, Coordinator};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tracing::{debug, error, info, instrument, warn};

use crate::errors::{AppError, Result};

const QUEUE_CAPACITY: usize = 1024;

#[derive(Debug, Clone)]
pub struct EventDispatcher {
  tx: mpsc::Sender<CallbackEvent>,
}

impl EventDispatcher {
  /// Starts the dispatch loop. After signalling `shutdown`, await the returned handle
  /// to wait for in-flight events.
  pub fn start(coordinator: Arc<Coordinator>, shutdown: watch::Receiver<bool>) -> (Self, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
    let handle = tokio::spawn(dispatch_loop(coordinator, rx, shutdown));
    (Self { tx }, handle)
  }

  /// Queues an event. Waits for room when the queue is full.
  pub async fn submit(&self, event: CallbackEvent) -> Result<()> {
    self
      .tx
      .send(event)
      .await
      .map_err(|_| AppError::Unavailable("event intake is shut down".to_string()))
  }
}

async fn dispatch_loop(
  coordinator: Arc<Coordinator>,
  mut rx: mpsc::Receiver<CallbackEvent>,
  mut shutdown: watch::Receiver<bool>,
) {
  let mut in_flight = JoinSet::new();
  let mut closing = false;
  let mut dropped = 0usize;
  loop {
    tokio::select! {
      biased;
      changed = shutdown.changed(), if !closing => {
        if changed.is_err() || *shutdown.borrow() {
          closing = true;
          rx.close();
        }
      }
      received = rx.recv() => match received {
        Some(event) if closing => {
          dropped += 1;
          warn!(event_id = %event.event_id, "Shutting down; queued event not started.");
        }
        Some(event) => {
          in_flight.spawn(run_event(coordinator.clone(), event));
        }
        None => break,
      },
      Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => reap(joined),
    }
  }

  if dropped > 0 {
    info!(dropped, "Queued events dropped at shutdown.");
  }
  info!(in_flight = in_flight.len(), "Event intake closed; draining in-flight events.");
  while let Some(joined) = in_flight.join_next().await {
    reap(joined);
  }
  info!("Event dispatcher stopped.");
}

#[instrument(name = "dispatcher::event", skip_all, fields(event_id = %event.event_id))]
async fn run_event(coordinator: Arc<Coordinator>, event: CallbackEvent) {
  match coordinator.dispatch(event).await {
    Ok(outcome) if outcome.is_completed() => debug!("Event handled."),
    Ok(outcome) => info!(?outcome, "Event ended without a state change."),
    Err(e) => error!(error = %e, "Event failed."),
  }
}

fn reap(joined: std::result::Result<(), JoinError>) {
  if let Err(e) = joined {
    warn!(error = %e, "Event task did not finish cleanly.");
  }
}
