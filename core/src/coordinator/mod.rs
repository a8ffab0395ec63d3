// escrow/src/coordinator/mod.rs

//! The workflow coordinator: an action-keyed registry of transition flows plus the
//! non-token entry point that places orders.
//!
//! One inbound event runs one flow over a fresh [`EventCtxData`]. Events share the
//! stores but nothing in-process; races on the same order are settled by the store's
//! conditional write and delete-and-return.

pub mod flows;
pub mod keyboards;
pub mod render;
pub mod steps;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{event, instrument, Level};

use crate::catalog::ReferenceCache;
use crate::core::context_data::ContextData;
use crate::core::control::FlowOutcome;
use crate::error::{EscrowError, EscrowResult};
use crate::flow::TransitionFlow;
use crate::order::{Order, OrderService};
use crate::token::{Action, CallbackData, TokenPayload, TokenService};
use crate::transport::Notifier;

/// A button press as delivered by the chat platform. May arrive late, twice, or never.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallbackEvent {
  pub event_id: String,
  pub user_id: i64,
  /// Chat and message holding the pressed button.
  pub chat_id: i64,
  pub message_id: i64,
  /// Raw callback data, `"<action>:<token>"`.
  pub data: String,
}

/// Buyer's request to open an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceOrder {
  pub client_id: i64,
  pub client_chat_id: i64,
  pub game_id: i64,
  pub category: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlowSettings {
  /// Parent chat under which one expert thread per accepted order is opened.
  pub experts_chat_id: i64,
}

/// Everything a flow handler may call. Cheap to clone.
#[derive(Clone)]
pub struct EscrowServices {
  pub orders: OrderService,
  pub tokens: TokenService,
  pub notifier: Notifier,
  pub catalog: Arc<ReferenceCache>,
  pub settings: FlowSettings,
}

/// Per-event data the stages of one flow run share.
pub struct EventCtxData {
  pub services: EscrowServices,
  pub event: CallbackEvent,
  pub callback: CallbackData,
  /// Set by the `Consume` stage.
  pub payload: Option<TokenPayload>,
}

impl EventCtxData {
  pub fn new(services: EscrowServices, event: CallbackEvent, callback: CallbackData) -> Self {
    Self {
      services,
      event,
      callback,
      payload: None,
    }
  }

  /// The consumed payload; an `Internal` error if read before the `Consume` stage ran.
  pub fn payload(&self) -> EscrowResult<TokenPayload> {
    self
      .payload
      .clone()
      .ok_or_else(|| EscrowError::Internal("payload read before the consume stage".to_string()))
  }
}

pub struct Coordinator {
  services: EscrowServices,
  flows: RwLock<HashMap<Action, Arc<TransitionFlow<EventCtxData>>>>,
}

impl Coordinator {
  /// An empty registry. See [`Coordinator::with_default_flows`] for the full set.
  pub fn new(services: EscrowServices) -> Self {
    Self {
      services,
      flows: RwLock::new(HashMap::new()),
    }
  }

  /// Registers the flow of every [`Action`] and checks the set is complete.
  pub fn with_default_flows(services: EscrowServices) -> EscrowResult<Self> {
    let coordinator = Self::new(services);
    for action in Action::ALL {
      coordinator.register(flows::build(action));
    }
    coordinator.ensure_complete()?;
    Ok(coordinator)
  }

  pub fn services(&self) -> &EscrowServices {
    &self.services
  }

  /// Registers (or replaces) the flow for its action.
  pub fn register(&self, flow: TransitionFlow<EventCtxData>) {
    event!(Level::DEBUG, action = %flow.action(), "Registering flow.");
    self.flows.write().insert(flow.action(), Arc::new(flow));
  }

  /// Fails if any action has no flow or a flow is missing required handlers.
  pub fn ensure_complete(&self) -> EscrowResult<()> {
    let flows = self.flows.read();
    for action in Action::ALL {
      match flows.get(&action) {
        Some(flow) => flow.validate()?,
        None => {
          return Err(EscrowError::Configuration {
            flow: action.to_string(),
            message: "no flow registered".to_string(),
          })
        }
      }
    }
    Ok(())
  }

  /// Runs the flow matching the event's callback data.
  #[instrument(name = "Coordinator::dispatch", skip_all, fields(event_id = %event.event_id, user_id = event.user_id))]
  pub async fn dispatch(&self, event: CallbackEvent) -> EscrowResult<FlowOutcome> {
    let callback = match CallbackData::parse(&event.data) {
      Ok(callback) => callback,
      Err(e) => {
        event!(Level::INFO, reason = %e, "Malformed callback data; acknowledging only.");
        if let Err(ack_err) = self.services.notifier.answer(&event.event_id, None).await {
          event!(Level::WARN, error = %ack_err, "Acknowledgement failed.");
        }
        return Ok(FlowOutcome::Rejected { reason: e.to_string() });
      }
    };

    let flow = self.flows.read().get(&callback.action).cloned().ok_or_else(|| {
      event!(Level::ERROR, action = %callback.action, "No flow registered for action.");
      EscrowError::Configuration {
        flow: callback.action.to_string(),
        message: "no flow registered".to_string(),
      }
    })?;

    let ctx = ContextData::new(EventCtxData::new(self.services.clone(), event, callback));
    flow.run(ctx).await
  }

  /// Creates the order and renders its first branch point: one accept button per
  /// expert and a cancel button for the buyer, each bound to its own token.
  #[instrument(name = "Coordinator::place_order", skip(self), err(Display))]
  pub async fn place_order(&self, request: PlaceOrder) -> EscrowResult<Order> {
    let order = self
      .services
      .orders
      .create(request.client_id, request.client_chat_id, request.game_id, &request.category)
      .await?;
    render::order_placed(&self.services, &order).await;
    Ok(order)
  }
}
