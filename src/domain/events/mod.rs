//! Domain events
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DomainEvent {
    Order(OrderEvent),
    Stock(StockEvent),
}

impl DomainEvent {
    /// NATS subject the event is published under.
    pub fn subject(&self) -> &'static str {
        match self {
            Self::Order(OrderEvent::Placed { .. }) => "store.orders.placed",
            Self::Order(OrderEvent::PaidChanged { .. }) => "store.orders.paid",
            Self::Order(OrderEvent::DeliveredChanged { .. }) => "store.orders.delivered",
            Self::Order(OrderEvent::Cancelled { .. }) => "store.orders.cancelled",
            Self::Stock(StockEvent::Committed { .. }) => "store.stock.committed",
            Self::Stock(StockEvent::Released { .. }) => "store.stock.released",
            Self::Stock(StockEvent::Imported { .. }) => "store.stock.imported",
        }
    }
}

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrderEvent {
    Placed { order_id: Uuid, client_id: Uuid, total: Decimal },
    PaidChanged { order_id: Uuid, paid: bool },
    DeliveredChanged { order_id: Uuid, delivered: bool },
    Cancelled { order_id: Uuid },
}

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StockEvent {
    Committed { order_id: Uuid, units: u32 },
    Released { order_id: Uuid, units: u32 },
    Imported { flavor_id: Uuid, quantity: u32 },
}
