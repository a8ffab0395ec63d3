// escrow_app/src/services/token_sweeper.rs

//! Periodically drops callback tokens of branches nobody resolved.

use escrow::TokenService;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

pub fn spawn(
  tokens: TokenService,
  ttl: chrono::Duration,
  every: Duration,
  mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
  tokio::spawn(async move {
    info!(ttl_hours = ttl.num_hours(), interval_secs = every.as_secs(), "Token sweeper started.");
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
      tokio::select! {
        _ = ticker.tick() => match tokens.purge_expired(ttl).await {
          Ok(removed) => debug!(removed, "Token sweep finished."),
          Err(e) => warn!(error = %e, "Token sweep failed; retrying next tick."),
        },
        changed = shutdown.changed() => {
          if changed.is_err() || *shutdown.borrow() {
            break;
          }
        }
      }
    }
    info!("Token sweeper stopped.");
  })
}
