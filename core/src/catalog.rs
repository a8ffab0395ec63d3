// escrow/src/catalog.rs

//! Read-mostly reference data: games on offer, the expert directory and the support contact.
//!
//! Populated explicitly with [`ReferenceCache::load`] at startup and read concurrently
//! afterwards. [`ReferenceCache::reload`] swaps in a fresh snapshot; nothing calls it on a
//! schedule.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{event, Level};

use crate::error::EscrowResult;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Game {
  pub id: i64,
  pub name: String,
  pub categories: Vec<String>,
}

impl Game {
  pub fn offers(&self, category: &str) -> bool {
    self.categories.iter().any(|c| c == category)
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Expert {
  pub id: i64,
  pub chat_id: i64,
  pub display_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupportContact {
  pub chat_id: i64,
  pub handle: String,
}

/// Where the cache gets its snapshot from.
#[async_trait]
pub trait ReferenceSource: Send + Sync {
  async fn load_games(&self) -> EscrowResult<Vec<Game>>;
  async fn load_experts(&self) -> EscrowResult<Vec<Expert>>;
  async fn load_support(&self) -> EscrowResult<Option<SupportContact>>;
}

#[derive(Debug, Default)]
struct Snapshot {
  games: BTreeMap<i64, Arc<Game>>,
  experts: BTreeMap<i64, Arc<Expert>>,
  support: Option<Arc<SupportContact>>,
}

#[derive(Debug, Default)]
pub struct ReferenceCache {
  inner: RwLock<Snapshot>,
}

impl ReferenceCache {
  pub fn new() -> Self {
    Self::default()
  }

  /// Builds a cache and fills it from `source`.
  pub async fn load(source: &dyn ReferenceSource) -> EscrowResult<Self> {
    let cache = Self::new();
    cache.reload(source).await?;
    Ok(cache)
  }

  /// Fetches everything first, then replaces the snapshot under one short write lock.
  pub async fn reload(&self, source: &dyn ReferenceSource) -> EscrowResult<()> {
    let games = source.load_games().await?;
    let experts = source.load_experts().await?;
    let support = source.load_support().await?;

    let snapshot = Snapshot {
      games: games.into_iter().map(|g| (g.id, Arc::new(g))).collect(),
      experts: experts.into_iter().map(|e| (e.id, Arc::new(e))).collect(),
      support: support.map(Arc::new),
    };
    event!(
      Level::INFO,
      games = snapshot.games.len(),
      experts = snapshot.experts.len(),
      support = snapshot.support.is_some(),
      "Reference cache loaded."
    );
    *self.inner.write() = snapshot;
    Ok(())
  }

  pub fn game(&self, id: i64) -> Option<Arc<Game>> {
    self.inner.read().games.get(&id).cloned()
  }

  pub fn games(&self) -> Vec<Arc<Game>> {
    self.inner.read().games.values().cloned().collect()
  }

  pub fn expert(&self, id: i64) -> Option<Arc<Expert>> {
    self.inner.read().experts.get(&id).cloned()
  }

  pub fn experts(&self) -> Vec<Arc<Expert>> {
    self.inner.read().experts.values().cloned().collect()
  }

  pub fn support(&self) -> Option<Arc<SupportContact>> {
    self.inner.read().support.clone()
  }
}

/// Fixed reference data, for tests and single-process setups.
#[derive(Debug, Clone, Default)]
pub struct StaticReferenceSource {
  pub games: Vec<Game>,
  pub experts: Vec<Expert>,
  pub support: Option<SupportContact>,
}

#[async_trait]
impl ReferenceSource for StaticReferenceSource {
  async fn load_games(&self) -> EscrowResult<Vec<Game>> {
    Ok(self.games.clone())
  }

  async fn load_experts(&self) -> EscrowResult<Vec<Expert>> {
    Ok(self.experts.clone())
  }

  async fn load_support(&self) -> EscrowResult<Option<SupportContact>> {
    Ok(self.support.clone())
  }
}
