//! Stock ledger (imports table)
//!
//! Each write locks the owning flavor and moves its `purchased` counter by
//! the same amount the ledger line changed, in one transaction.

use chrono::{DateTime, NaiveDate, Utc};
use std::collections::BTreeMap;
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::db::catalog;
use crate::domain::aggregates::{Flavor, ImportLine, LedgerError, LedgerFigures, LedgerInputs, LedgerPatch};
use crate::{Result, StoreError};

#[derive(Debug, sqlx::FromRow)]
struct ImportRow {
    id: Uuid, product_id: Uuid, flavor_id: Uuid, provider_id: Option<Uuid>,
    unit_cost: Decimal, unit_sale_price: Decimal, discount: Decimal, purchased_quantity: i32, sold_quantity: i32,
    current_stock: i32, net_sale_price: Decimal, total_cost: Decimal, total_sales: Decimal, gain: Decimal, margin: Decimal,
    purchase_date: NaiveDate, notes: Option<String>, created_at: DateTime<Utc>, updated_at: DateTime<Utc>,
}

impl From<ImportRow> for ImportLine {
    fn from(r: ImportRow) -> Self {
        Self {
            id: r.id, product_id: r.product_id, flavor_id: r.flavor_id, provider_id: r.provider_id,
            inputs: LedgerInputs { unit_cost: r.unit_cost, unit_sale_price: r.unit_sale_price, discount: r.discount, purchased_quantity: r.purchased_quantity, sold_quantity: r.sold_quantity },
            figures: LedgerFigures { current_stock: r.current_stock, net_sale_price: r.net_sale_price, total_cost: r.total_cost, total_sales: r.total_sales, gain: r.gain, margin: r.margin },
            purchase_date: r.purchase_date, notes: r.notes, created_at: r.created_at, updated_at: r.updated_at,
        }
    }
}

/// Restock request for an existing flavor.
#[derive(Debug, Clone)]
pub struct Restock {
    pub flavor_id: Uuid,
    pub quantity: i32,
    pub unit_cost: Option<Decimal>,
    pub provider_id: Option<Uuid>,
    pub purchase_date: NaiveDate,
    pub notes: Option<String>,
}

pub async fn list(db: &PgPool, flavor_id: Option<Uuid>, provider_id: Option<Uuid>) -> Result<Vec<ImportLine>> {
    let rows = sqlx::query_as::<_, ImportRow>("SELECT * FROM imports WHERE ($1::uuid IS NULL OR flavor_id = $1) AND ($2::uuid IS NULL OR provider_id = $2) ORDER BY purchase_date DESC, created_at DESC")
        .bind(flavor_id).bind(provider_id).fetch_all(db).await?;
    Ok(rows.into_iter().map(ImportLine::from).collect())
}

async fn insert(conn: &mut PgConnection, l: &ImportLine) -> Result<()> {
    sqlx::query("INSERT INTO imports (id, product_id, flavor_id, provider_id, unit_cost, unit_sale_price, discount, purchased_quantity, sold_quantity, current_stock, net_sale_price, total_cost, total_sales, gain, margin, purchase_date, notes, created_at, updated_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19)")
        .bind(l.id).bind(l.product_id).bind(l.flavor_id).bind(l.provider_id)
        .bind(l.inputs.unit_cost).bind(l.inputs.unit_sale_price).bind(l.inputs.discount).bind(l.inputs.purchased_quantity).bind(l.inputs.sold_quantity)
        .bind(l.figures.current_stock).bind(l.figures.net_sale_price).bind(l.figures.total_cost).bind(l.figures.total_sales).bind(l.figures.gain).bind(l.figures.margin)
        .bind(l.purchase_date).bind(&l.notes).bind(l.created_at).bind(l.updated_at)
        .execute(conn).await?;
    Ok(())
}

async fn save(conn: &mut PgConnection, l: &ImportLine) -> Result<()> {
    sqlx::query("UPDATE imports SET provider_id = $2, unit_cost = $3, unit_sale_price = $4, discount = $5, purchased_quantity = $6, sold_quantity = $7, current_stock = $8, net_sale_price = $9, total_cost = $10, total_sales = $11, gain = $12, margin = $13, purchase_date = $14, notes = $15, updated_at = $16 WHERE id = $1")
        .bind(l.id).bind(l.provider_id)
        .bind(l.inputs.unit_cost).bind(l.inputs.unit_sale_price).bind(l.inputs.discount).bind(l.inputs.purchased_quantity).bind(l.inputs.sold_quantity)
        .bind(l.figures.current_stock).bind(l.figures.net_sale_price).bind(l.figures.total_cost).bind(l.figures.total_sales).bind(l.figures.gain).bind(l.figures.margin)
        .bind(l.purchase_date).bind(&l.notes).bind(l.updated_at)
        .execute(conn).await?;
    Ok(())
}

async fn record(conn: &mut PgConnection, line: &ImportLine) -> Result<Flavor> {
    let mut flavor = catalog::lock_flavor(&mut *conn, line.flavor_id).await?;
    if flavor.product_id != line.product_id {
        return Err(StoreError::Validation(format!("flavor {} does not belong to product {}", flavor.id, line.product_id)));
    }
    flavor.add_purchased(line.inputs.purchased_quantity)?;
    catalog::save_flavor(&mut *conn, &flavor).await?;
    insert(&mut *conn, line).await?;
    Ok(flavor)
}

/// Creates a ledger line and adds its purchased units to the flavor.
pub async fn create(db: &PgPool, line: &ImportLine) -> Result<Flavor> {
    let mut tx = db.begin().await?;
    let flavor = record(&mut tx, line).await?;
    tx.commit().await?;
    tracing::info!(import_id = %line.id, flavor_id = %flavor.id, purchased = line.inputs.purchased_quantity, stock = flavor.stock, "import recorded");
    Ok(flavor)
}

/// New batch for an existing flavor. Sale price and discount come from the
/// flavor; unit cost defaults to the latest batch's.
pub async fn restock(db: &PgPool, r: &Restock) -> Result<(ImportLine, Flavor)> {
    let mut tx = db.begin().await?;
    let flavor = catalog::lock_flavor(&mut tx, r.flavor_id).await?;
    let unit_cost = match r.unit_cost {
        Some(cost) => cost,
        None => sqlx::query_scalar::<_, Decimal>("SELECT unit_cost FROM imports WHERE flavor_id = $1 ORDER BY purchase_date DESC, created_at DESC LIMIT 1")
            .bind(r.flavor_id).fetch_optional(&mut *tx).await?
            .ok_or_else(|| StoreError::Validation("no previous batch to take the unit cost from".into()))?,
    };
    let inputs = LedgerInputs { unit_cost, unit_sale_price: flavor.price, discount: flavor.discount, purchased_quantity: r.quantity, sold_quantity: 0 };
    let line = ImportLine::create(flavor.product_id, flavor.id, r.provider_id, inputs, r.purchase_date, r.notes.clone())?;
    let flavor = record(&mut tx, &line).await?;
    tx.commit().await?;
    tracing::info!(import_id = %line.id, flavor_id = %flavor.id, quantity = r.quantity, stock = flavor.stock, "flavor restocked");
    Ok((line, flavor))
}

/// Applies one patch to many lines. Any failing line aborts the whole edit.
///
/// Lines are patched first; the per-flavor purchased deltas are then applied
/// with flavor rows locked in id order, the same order stock commits use.
pub async fn mass_edit(db: &PgPool, ids: &[Uuid], patch: &LedgerPatch) -> Result<Vec<ImportLine>> {
    if patch.is_empty() { return Err(LedgerError::EmptyPatch.into()); }
    let mut ids = ids.to_vec();
    ids.sort();
    ids.dedup();

    let mut tx = db.begin().await?;
    let rows = sqlx::query_as::<_, ImportRow>("SELECT * FROM imports WHERE id = ANY($1) ORDER BY id FOR UPDATE").bind(&ids)
        .fetch_all(&mut *tx).await?;
    if rows.len() != ids.len() { return Err(StoreError::NotFound("import")); }

    let mut edited = Vec::with_capacity(rows.len());
    let mut deltas: BTreeMap<Uuid, i32> = BTreeMap::new();
    for row in rows {
        let mut line = ImportLine::from(row);
        let purchased_delta = line.apply_patch(patch)?;
        if purchased_delta != 0 { *deltas.entry(line.flavor_id).or_default() += purchased_delta; }
        edited.push(line);
    }
    for (flavor_id, delta) in deltas.into_iter().filter(|(_, d)| *d != 0) {
        let mut flavor = catalog::lock_flavor(&mut tx, flavor_id).await?;
        flavor.add_purchased(delta)?;
        catalog::save_flavor(&mut tx, &flavor).await?;
    }
    for line in &edited { save(&mut tx, line).await?; }
    tx.commit().await?;
    tracing::info!(lines = edited.len(), "imports mass edited");
    Ok(edited)
}

pub async fn delete(db: &PgPool, id: Uuid) -> Result<Flavor> {
    let mut tx = db.begin().await?;
    let row = sqlx::query_as::<_, ImportRow>("SELECT * FROM imports WHERE id = $1 FOR UPDATE").bind(id)
        .fetch_optional(&mut *tx).await?.ok_or(StoreError::NotFound("import"))?;
    let mut flavor = catalog::lock_flavor(&mut tx, row.flavor_id).await?;
    flavor.add_purchased(-row.purchased_quantity)?;
    catalog::save_flavor(&mut tx, &flavor).await?;
    sqlx::query("DELETE FROM imports WHERE id = $1").bind(id).execute(&mut *tx).await?;
    tx.commit().await?;
    tracing::info!(import_id = %id, flavor_id = %flavor.id, stock = flavor.stock, "import deleted");
    Ok(flavor)
}
