//! Actions emitted by schedulers and consumed by the executor.

use std::fmt;

use rekon_core::{MarketConfig, Order, OrderId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SchedulerError};

/// Identifier of the venue account an action is routed to.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DestinationId(String);

impl DestinationId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DestinationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for DestinationId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for DestinationId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Where scheduled orders go: a destination account and the rules of the
/// market traded there.
#[derive(Debug, Clone)]
pub struct Target {
    pub destination: DestinationId,
    pub market: MarketConfig,
}

impl Target {
    pub fn new(destination: impl Into<DestinationId>, market: MarketConfig) -> Self {
        Self {
            destination: destination.into(),
            market,
        }
    }
}

/// What an action does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionKind {
    /// Place a new order.
    OrderCreate { order: Order },
    /// Cancel a live order by venue id.
    OrderStop { id: OrderId, order: Order },
}

/// One instruction for a destination.
///
/// Actions are built by a scheduler, consumed once by the executor and never
/// modified in between.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Action {
    pub kind: ActionKind,
    pub destination: DestinationId,
    /// Higher runs earlier. `None` for schedulers without priority classes.
    pub priority: Option<Decimal>,
}

impl Action {
    pub fn create(destination: DestinationId, order: Order) -> Self {
        Self {
            kind: ActionKind::OrderCreate { order },
            destination,
            priority: None,
        }
    }

    /// Cancel a live order. The order must carry its venue id.
    pub fn stop(destination: DestinationId, order: &Order) -> Result<Self> {
        let id = order
            .id
            .clone()
            .ok_or_else(|| SchedulerError::MissingOrderId(order.to_string()))?;
        Ok(Self {
            kind: ActionKind::OrderStop {
                id,
                order: order.clone(),
            },
            destination,
            priority: None,
        })
    }

    #[must_use]
    pub fn with_priority(mut self, priority: Decimal) -> Self {
        self.priority = Some(priority);
        self
    }

    /// The order being created or cancelled.
    pub fn order(&self) -> &Order {
        match &self.kind {
            ActionKind::OrderCreate { order } | ActionKind::OrderStop { order, .. } => order,
        }
    }

    pub fn is_create(&self) -> bool {
        matches!(self.kind, ActionKind::OrderCreate { .. })
    }

    pub fn is_stop(&self) -> bool {
        matches!(self.kind, ActionKind::OrderStop { .. })
    }

    /// Metric/log label for the action kind.
    pub fn kind_label(&self) -> &'static str {
        match self.kind {
            ActionKind::OrderCreate { .. } => "order_create",
            ActionKind::OrderStop { .. } => "order_stop",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}: {}", self.kind_label(), self.destination, self.order())?;
        if let Some(priority) = self.priority {
            write!(f, " (priority {priority})")?;
        }
        Ok(())
    }
}

/// Stable-sort actions by descending priority.
pub fn sort_by_priority(actions: &mut [Action]) {
    actions.sort_by(|a, b| b.priority.cmp(&a.priority));
}
