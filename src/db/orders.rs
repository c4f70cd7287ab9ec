//! Orders and their items

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool};
use std::collections::HashMap;
use uuid::Uuid;

use crate::db::{catalog, clients};
use crate::domain::aggregates::{Cart, Client, Order, OrderItem, OrderStatus};
use crate::domain::events::DomainEvent;
use crate::domain::value_objects::Phone;
use crate::{Result, StoreError};

#[derive(Debug, sqlx::FromRow)]
struct OrderRow {
    id: Uuid, client_id: Uuid, subtotal: Decimal, discount: Decimal, total: Decimal, status: String,
    paid: bool, delivered: bool, coupon: Option<String>, notes: Option<String>, created_at: DateTime<Utc>, updated_at: DateTime<Utc>,
}

impl OrderRow {
    fn into_order(self, items: Vec<OrderItem>) -> Result<Order> {
        let status = OrderStatus::parse(&self.status)?;
        Ok(Order::restore(self.id, self.client_id, items, self.subtotal, self.discount, self.total, status, self.paid, self.delivered, self.coupon, self.notes, self.created_at, self.updated_at))
    }
}

#[derive(Debug, Default, Clone)]
pub struct OrderFilter {
    pub paid: Option<bool>,
    pub delivered: Option<bool>,
    pub status: Option<OrderStatus>,
    pub client_id: Option<Uuid>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub limit: i64,
    pub offset: i64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OrderFlag { Paid, Delivered }

const FILTER_SQL: &str = "($1::bool IS NULL OR paid = $1) AND ($2::bool IS NULL OR delivered = $2) AND ($3::text IS NULL OR status = $3) AND ($4::uuid IS NULL OR client_id = $4) AND ($5::timestamptz IS NULL OR created_at >= $5) AND ($6::timestamptz IS NULL OR created_at < $6)";

pub async fn list(db: &PgPool, f: &OrderFilter) -> Result<(Vec<Order>, i64)> {
    let rows = sqlx::query_as::<_, OrderRow>(&format!("SELECT * FROM orders WHERE {FILTER_SQL} ORDER BY created_at DESC LIMIT $7 OFFSET $8"))
        .bind(f.paid).bind(f.delivered).bind(f.status.map(|s| s.as_str())).bind(f.client_id).bind(f.from).bind(f.to).bind(f.limit).bind(f.offset)
        .fetch_all(db).await?;
    let total: (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM orders WHERE {FILTER_SQL}"))
        .bind(f.paid).bind(f.delivered).bind(f.status.map(|s| s.as_str())).bind(f.client_id).bind(f.from).bind(f.to)
        .fetch_one(db).await?;
    Ok((with_items(db, rows).await?, total.0))
}

/// Every order created in `[from, to)`, items included.
pub async fn between(db: &PgPool, from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) -> Result<Vec<Order>> {
    let rows = sqlx::query_as::<_, OrderRow>("SELECT * FROM orders WHERE ($1::timestamptz IS NULL OR created_at >= $1) AND ($2::timestamptz IS NULL OR created_at < $2) ORDER BY created_at")
        .bind(from).bind(to).fetch_all(db).await?;
    with_items(db, rows).await
}

async fn with_items(db: &PgPool, rows: Vec<OrderRow>) -> Result<Vec<Order>> {
    let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
    let items = sqlx::query_as::<_, OrderItem>("SELECT * FROM order_items WHERE order_id = ANY($1)").bind(&ids).fetch_all(db).await?;
    let mut by_order: HashMap<Uuid, Vec<OrderItem>> = HashMap::new();
    for item in items { by_order.entry(item.order_id).or_default().push(item); }
    rows.into_iter().map(|r| { let items = by_order.remove(&r.id).unwrap_or_default(); r.into_order(items) }).collect()
}

pub async fn get(db: &PgPool, id: Uuid) -> Result<Order> {
    let mut conn = db.acquire().await?;
    load(&mut conn, id, false).await
}

async fn load(conn: &mut PgConnection, id: Uuid, for_update: bool) -> Result<Order> {
    let sql = if for_update { "SELECT * FROM orders WHERE id = $1 FOR UPDATE" } else { "SELECT * FROM orders WHERE id = $1" };
    let row = sqlx::query_as::<_, OrderRow>(sql).bind(id).fetch_optional(&mut *conn).await?.ok_or(StoreError::NotFound("order"))?;
    let items = sqlx::query_as::<_, OrderItem>("SELECT * FROM order_items WHERE order_id = $1").bind(id).fetch_all(&mut *conn).await?;
    row.into_order(items)
}

async fn insert(conn: &mut PgConnection, o: &Order) -> Result<()> {
    sqlx::query("INSERT INTO orders (id, client_id, subtotal, discount, total, status, paid, delivered, coupon, notes, created_at, updated_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)")
        .bind(o.id).bind(o.client_id).bind(o.subtotal).bind(o.discount).bind(o.total).bind(o.status.as_str()).bind(o.paid).bind(o.delivered).bind(&o.coupon).bind(&o.notes).bind(o.created_at).bind(o.updated_at)
        .execute(&mut *conn).await?;
    for i in &o.items {
        sqlx::query("INSERT INTO order_items (id, order_id, product_id, flavor_id, product_name, flavor_name, price, quantity) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)")
            .bind(i.id).bind(i.order_id).bind(i.product_id).bind(i.flavor_id).bind(&i.product_name).bind(&i.flavor_name).bind(i.price).bind(i.quantity)
            .execute(&mut *conn).await?;
    }
    Ok(())
}

async fn save_state(conn: &mut PgConnection, o: &Order) -> Result<()> {
    sqlx::query("UPDATE orders SET status = $2, paid = $3, delivered = $4, updated_at = $5 WHERE id = $1")
        .bind(o.id).bind(o.status.as_str()).bind(o.paid).bind(o.delivered).bind(o.updated_at)
        .execute(conn).await?;
    Ok(())
}

/// Stores a checkout: client upsert, order and items in one transaction.
pub async fn place(db: &PgPool, client_name: &str, phone: &Phone, cart: &Cart, notes: Option<String>) -> Result<(Order, Client, Vec<DomainEvent>)> {
    let mut tx = db.begin().await?;
    let client = clients::upsert_by_phone(&mut tx, client_name, phone).await?;
    let mut order = Order::place(client.id, cart, notes)?;
    insert(&mut tx, &order).await?;
    tx.commit().await?;
    tracing::info!(order_id = %order.id, client_id = %client.id, total = %order.total, "order placed");
    let events = order.take_events();
    Ok((order, client, events))
}

/// Flips `paid` or `delivered` and moves stock across the commit boundary.
/// The flag and every stock change land together or not at all.
pub async fn toggle(db: &PgPool, id: Uuid, flag: OrderFlag) -> Result<(Order, Vec<DomainEvent>)> {
    let mut tx = db.begin().await?;
    let mut order = load(&mut tx, id, true).await?;
    let deltas = match flag {
        OrderFlag::Paid => order.toggle_paid()?,
        OrderFlag::Delivered => order.toggle_delivered()?,
    };
    catalog::apply_stock_deltas(&mut tx, &deltas).await?;
    save_state(&mut tx, &order).await?;
    tx.commit().await?;
    tracing::info!(order_id = %id, ?flag, paid = order.paid, delivered = order.delivered, flavors = deltas.len(), "order flag toggled");
    let events = order.take_events();
    Ok((order, events))
}

pub async fn cancel(db: &PgPool, id: Uuid) -> Result<(Order, Vec<DomainEvent>)> {
    let mut tx = db.begin().await?;
    let mut order = load(&mut tx, id, true).await?;
    order.cancel()?;
    save_state(&mut tx, &order).await?;
    tx.commit().await?;
    tracing::info!(order_id = %id, "order cancelled");
    let events = order.take_events();
    Ok((order, events))
}

/// Deletes an order, handing back any stock it still holds.
pub async fn delete(db: &PgPool, id: Uuid) -> Result<()> {
    let mut tx = db.begin().await?;
    let order = load(&mut tx, id, true).await?;
    catalog::apply_stock_deltas(&mut tx, &order.release_deltas()).await?;
    sqlx::query("DELETE FROM orders WHERE id = $1").bind(id).execute(&mut *tx).await?;
    tx.commit().await?;
    tracing::info!(order_id = %id, released = order.is_committed(), "order deleted");
    Ok(())
}
