//! Order Aggregate
//!
//! An order holds its items' stock while it is *committed*: paid, delivered,
//! or both. Flipping either flag yields the [`StockDelta`]s that move the
//! affected flavors across that boundary, so toggling on and then off again
//! leaves stock where it started.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;
use crate::domain::aggregates::cart::Cart;
use crate::domain::events::{DomainEvent, OrderEvent, StockEvent};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub client_id: Uuid,
    pub items: Vec<OrderItem>,
    pub subtotal: Decimal,
    pub discount: Decimal,
    pub total: Decimal,
    pub status: OrderStatus,
    pub paid: bool,
    pub delivered: bool,
    pub coupon: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip)]
    events: Vec<DomainEvent>,
}

#[derive(Clone, Debug, Serialize, Deserialize, sqlx::FromRow)]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub flavor_id: Uuid,
    pub product_name: String,
    pub flavor_name: String,
    pub price: Decimal,
    pub quantity: i32,
}

impl OrderItem {
    pub fn line_total(&self) -> Decimal { self.price * Decimal::from(self.quantity) }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus { #[default] Pending, Completed, Cancelled }

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self { Self::Pending => "pending", Self::Completed => "completed", Self::Cancelled => "cancelled" }
    }
    pub fn parse(s: &str) -> Result<Self, OrderError> {
        match s {
            "pending" => Ok(Self::Pending),
            "completed" => Ok(Self::Completed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(OrderError::UnknownStatus(other.to_string())),
        }
    }
}

/// Signed change to a flavor's sold counter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct StockDelta { pub flavor_id: Uuid, pub sold_delta: i32 }

impl Order {
    /// Places an order from a priced cart.
    pub fn place(client_id: Uuid, cart: &Cart, notes: Option<String>) -> Result<Self, OrderError> {
        if cart.is_empty() { return Err(OrderError::NoItems); }
        let id = Uuid::now_v7();
        let items = cart.items().iter().map(|i| {
            Ok(OrderItem {
                id: Uuid::now_v7(), order_id: id, product_id: i.product_id, flavor_id: i.flavor_id,
                product_name: i.product_name.clone(), flavor_name: i.flavor_name.clone(),
                price: i.unit_price.amount(), quantity: i32::try_from(i.quantity).map_err(|_| OrderError::InvalidQuantity)?,
            })
        }).collect::<Result<Vec<_>, OrderError>>()?;
        let now = Utc::now();
        let mut order = Self {
            id, client_id, items, subtotal: cart.subtotal().amount(), discount: cart.discount().amount(), total: cart.total().amount(),
            status: OrderStatus::Pending, paid: false, delivered: false,
            coupon: cart.coupon().map(|c| c.to_string()), notes,
            created_at: now, updated_at: now, events: vec![],
        };
        order.raise_event(DomainEvent::Order(OrderEvent::Placed { order_id: id, client_id, total: order.total }));
        Ok(order)
    }

    /// Rebuilds an order loaded from storage.
    #[allow(clippy::too_many_arguments)]
    pub fn restore(id: Uuid, client_id: Uuid, items: Vec<OrderItem>, subtotal: Decimal, discount: Decimal, total: Decimal, status: OrderStatus, paid: bool, delivered: bool, coupon: Option<String>, notes: Option<String>, created_at: DateTime<Utc>, updated_at: DateTime<Utc>) -> Self {
        Self { id, client_id, items, subtotal, discount, total, status, paid, delivered, coupon, notes, created_at, updated_at, events: vec![] }
    }

    pub fn is_committed(&self) -> bool { self.paid || self.delivered }

    pub fn units(&self) -> u32 { self.items.iter().map(|i| i.quantity.max(0) as u32).sum() }

    pub fn toggle_paid(&mut self) -> Result<Vec<StockDelta>, OrderError> {
        self.ensure_open()?;
        let was = self.is_committed();
        self.paid = !self.paid;
        self.raise_event(DomainEvent::Order(OrderEvent::PaidChanged { order_id: self.id, paid: self.paid }));
        Ok(self.after_toggle(was))
    }

    pub fn toggle_delivered(&mut self) -> Result<Vec<StockDelta>, OrderError> {
        self.ensure_open()?;
        let was = self.is_committed();
        self.delivered = !self.delivered;
        self.raise_event(DomainEvent::Order(OrderEvent::DeliveredChanged { order_id: self.id, delivered: self.delivered }));
        Ok(self.after_toggle(was))
    }

    pub fn cancel(&mut self) -> Result<(), OrderError> {
        if self.status == OrderStatus::Cancelled { return Err(OrderError::AlreadyCancelled); }
        if self.is_committed() { return Err(OrderError::CannotCancel); }
        self.status = OrderStatus::Cancelled;
        self.touch();
        self.raise_event(DomainEvent::Order(OrderEvent::Cancelled { order_id: self.id }));
        Ok(())
    }

    /// Deltas that hand a committed order's units back, used before deleting it.
    pub fn release_deltas(&self) -> Vec<StockDelta> {
        if self.is_committed() { self.deltas(-1) } else { vec![] }
    }

    fn after_toggle(&mut self, was_committed: bool) -> Vec<StockDelta> {
        self.status = if self.paid && self.delivered { OrderStatus::Completed } else { OrderStatus::Pending };
        self.touch();
        let units = self.units();
        match (was_committed, self.is_committed()) {
            (false, true) => {
                self.raise_event(DomainEvent::Stock(StockEvent::Committed { order_id: self.id, units }));
                self.deltas(1)
            }
            (true, false) => {
                self.raise_event(DomainEvent::Stock(StockEvent::Released { order_id: self.id, units }));
                self.deltas(-1)
            }
            _ => vec![],
        }
    }

    // One delta per flavor, in a stable order so row locks are taken consistently.
    fn deltas(&self, sign: i32) -> Vec<StockDelta> {
        let mut per_flavor: BTreeMap<Uuid, i32> = BTreeMap::new();
        for item in &self.items { *per_flavor.entry(item.flavor_id).or_default() += item.quantity; }
        per_flavor.into_iter().map(|(flavor_id, qty)| StockDelta { flavor_id, sold_delta: sign * qty }).collect()
    }

    fn ensure_open(&self) -> Result<(), OrderError> {
        if self.status == OrderStatus::Cancelled { Err(OrderError::AlreadyCancelled) } else { Ok(()) }
    }

    pub fn take_events(&mut self) -> Vec<DomainEvent> { std::mem::take(&mut self.events) }
    fn raise_event(&mut self, e: DomainEvent) { self.events.push(e); }
    fn touch(&mut self) { self.updated_at = Utc::now(); }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OrderError {
    #[error("order has no items")]
    NoItems,
    #[error("invalid quantity")]
    InvalidQuantity,
    #[error("a paid or delivered order cannot be cancelled")]
    CannotCancel,
    #[error("order is cancelled")]
    AlreadyCancelled,
    #[error("unknown order status: {0}")]
    UnknownStatus(String),
}
