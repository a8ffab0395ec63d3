// escrow/src/core/context.rs

//! The `Handler<TData>` type for flow stage handlers, operating on `ContextData<TData>`.

use crate::core::context_data::ContextData;
use crate::core::control::StageControl;
use crate::error::EscrowResult;
use std::future::Future;
use std::pin::Pin;

/// A boxed, shareable stage handler.
///
/// Handlers receive a clone of the run's `ContextData<TData>` and resolve to
/// `EscrowResult<StageControl>`. Lock guards must be dropped before any `.await`.
pub type Handler<TData> = Box<
  dyn Fn(ContextData<TData>) -> Pin<Box<dyn Future<Output = EscrowResult<StageControl>> + Send>> + Send + Sync,
>;
