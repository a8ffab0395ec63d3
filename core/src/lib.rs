// escrow/src/lib.rs

//! Escrow: exactly-once order transitions driven by chat button presses.
//!
//! An order moves through a fixed lifecycle (`new` -> `accepted` -> `expert_confirmed`
//! -> `completed`, with `canceled` and `declined` as terminal exits). Every button a
//! participant can press is backed by a single-use callback token. A press runs one
//! [`TransitionFlow`] through fixed stages:
//!  - acknowledge the event,
//!  - consume the token (delete-and-return, so only one caller gets the payload),
//!  - invalidate the sibling buttons of the same branch point,
//!  - apply the guarded transition (a conditional write on the expected status),
//!  - render the next branch point.
//!
//! Duplicate or late presses end in [`FlowOutcome::Benign`] and never in a second
//! state change.

pub mod catalog;
pub mod coordinator;
pub mod core;
pub mod error;
pub mod flow;
pub mod order;
pub mod store;
pub mod token;
pub mod transport;

// --- Re-exports for the Public API ---

pub use crate::core::{ContextData, FlowOutcome, Handler, Stage, StageControl, StageDef};
pub use crate::flow::TransitionFlow;

pub use crate::catalog::{Expert, Game, ReferenceCache, ReferenceSource, StaticReferenceSource, SupportContact};
pub use crate::coordinator::{CallbackEvent, Coordinator, EscrowServices, EventCtxData, FlowSettings, PlaceOrder};
pub use crate::order::{NewOrder, Order, OrderId, OrderService, OrderStatus, OrderUpdate, Transition};
pub use crate::store::{MemoryOrderStore, MemoryTokenStore, OrderStore, TokenStore};
pub use crate::token::{Action, CallbackData, CallbackToken, TokenPayload, TokenService};
pub use crate::transport::{Button, Destination, Keyboard, MessageRef, Notifier, RetryPolicy, Transport, TransportError};

pub use crate::error::{EscrowError, EscrowResult};
