//! Products, flavors and lookup tables

use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::domain::aggregates::{Category, Coupon, Flavor, Product, Provider, StockDelta};
use crate::{Result, StoreError};

pub async fn list_products(db: &PgPool, category: Option<&str>, include_inactive: bool) -> Result<Vec<Product>> {
    Ok(sqlx::query_as::<_, Product>("SELECT * FROM products WHERE ($1::text IS NULL OR category_key = $1) AND (active OR $2) ORDER BY brand, name")
        .bind(category).bind(include_inactive).fetch_all(db).await?)
}

pub async fn get_product(db: &PgPool, id: Uuid) -> Result<Product> {
    sqlx::query_as::<_, Product>("SELECT * FROM products WHERE id = $1").bind(id).fetch_optional(db).await?.ok_or(StoreError::NotFound("product"))
}

pub async fn insert_product(db: &PgPool, p: &Product) -> Result<Product> {
    Ok(sqlx::query_as::<_, Product>("INSERT INTO products (id, name, brand, category_key, images, price, active, created_at, updated_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) RETURNING *")
        .bind(p.id).bind(&p.name).bind(&p.brand).bind(&p.category_key).bind(&p.images).bind(p.price).bind(p.active).bind(p.created_at).bind(p.updated_at)
        .fetch_one(db).await?)
}

pub async fn update_product(db: &PgPool, p: &Product) -> Result<Product> {
    sqlx::query_as::<_, Product>("UPDATE products SET name = $2, brand = $3, category_key = $4, images = $5, price = $6, active = $7, updated_at = $8 WHERE id = $1 RETURNING *")
        .bind(p.id).bind(&p.name).bind(&p.brand).bind(&p.category_key).bind(&p.images).bind(p.price).bind(p.active).bind(p.updated_at)
        .fetch_optional(db).await?.ok_or(StoreError::NotFound("product"))
}

pub async fn get_products(db: &PgPool, ids: &[Uuid]) -> Result<Vec<Product>> {
    Ok(sqlx::query_as::<_, Product>("SELECT * FROM products WHERE id = ANY($1)").bind(ids).fetch_all(db).await?)
}

/// Hides a product and its flavors from the storefront. Rows stay for order history.
pub async fn deactivate_product(db: &PgPool, id: Uuid) -> Result<()> {
    let mut tx = db.begin().await?;
    let done = sqlx::query("UPDATE products SET active = FALSE, updated_at = NOW() WHERE id = $1").bind(id).execute(&mut *tx).await?;
    if done.rows_affected() == 0 { return Err(StoreError::NotFound("product")); }
    sqlx::query("UPDATE flavors SET active = FALSE, updated_at = NOW() WHERE product_id = $1").bind(id).execute(&mut *tx).await?;
    tx.commit().await?;
    Ok(())
}

pub async fn list_flavors(db: &PgPool, product_id: Option<Uuid>, include_inactive: bool) -> Result<Vec<Flavor>> {
    Ok(sqlx::query_as::<_, Flavor>("SELECT * FROM flavors WHERE ($1::uuid IS NULL OR product_id = $1) AND (active OR $2) ORDER BY name")
        .bind(product_id).bind(include_inactive).fetch_all(db).await?)
}

pub async fn get_flavors(db: &PgPool, ids: &[Uuid]) -> Result<Vec<Flavor>> {
    Ok(sqlx::query_as::<_, Flavor>("SELECT * FROM flavors WHERE id = ANY($1)").bind(ids).fetch_all(db).await?)
}

pub async fn get_flavor(db: &PgPool, id: Uuid) -> Result<Flavor> {
    sqlx::query_as::<_, Flavor>("SELECT * FROM flavors WHERE id = $1").bind(id).fetch_optional(db).await?.ok_or(StoreError::NotFound("flavor"))
}

pub async fn insert_flavor(db: &PgPool, f: &Flavor) -> Result<Flavor> {
    Ok(sqlx::query_as::<_, Flavor>("INSERT INTO flavors (id, product_id, name, purchased, sold, stock, discount, price, net_price, total_sales, active, created_at, updated_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13) RETURNING *")
        .bind(f.id).bind(f.product_id).bind(&f.name).bind(f.purchased).bind(f.sold).bind(f.stock).bind(f.discount).bind(f.price).bind(f.net_price).bind(f.total_sales).bind(f.active).bind(f.created_at).bind(f.updated_at)
        .fetch_one(db).await?)
}

/// Loads a flavor and holds its row lock until the transaction ends.
pub async fn lock_flavor(conn: &mut PgConnection, id: Uuid) -> Result<Flavor> {
    sqlx::query_as::<_, Flavor>("SELECT * FROM flavors WHERE id = $1 FOR UPDATE").bind(id).fetch_optional(conn).await?.ok_or(StoreError::NotFound("flavor"))
}

/// Writes a flavor back, including every derived column.
pub async fn save_flavor(conn: &mut PgConnection, f: &Flavor) -> Result<()> {
    sqlx::query("UPDATE flavors SET name = $2, purchased = $3, sold = $4, stock = $5, discount = $6, price = $7, net_price = $8, total_sales = $9, active = $10, updated_at = $11 WHERE id = $1")
        .bind(f.id).bind(&f.name).bind(f.purchased).bind(f.sold).bind(f.stock).bind(f.discount).bind(f.price).bind(f.net_price).bind(f.total_sales).bind(f.active).bind(f.updated_at)
        .execute(conn).await?;
    Ok(())
}

/// Renames or reprices a flavor under its row lock.
pub async fn revise_flavor(db: &PgPool, id: Uuid, name: Option<&str>, price: Option<Decimal>, discount: Option<Decimal>, active: Option<bool>) -> Result<Flavor> {
    let mut tx = db.begin().await?;
    let mut flavor = lock_flavor(&mut tx, id).await?;
    if let Some(name) = name.map(str::trim).filter(|n| !n.is_empty()) { flavor.name = name.to_string(); }
    if let Some(active) = active { flavor.active = active; }
    flavor.update_pricing(price.unwrap_or(flavor.price), discount.unwrap_or(flavor.discount))?;
    save_flavor(&mut tx, &flavor).await?;
    tx.commit().await?;
    Ok(flavor)
}

/// Applies sold-counter deltas inside the caller's transaction.
pub async fn apply_stock_deltas(conn: &mut PgConnection, deltas: &[StockDelta]) -> Result<()> {
    for d in deltas {
        let mut flavor = lock_flavor(&mut *conn, d.flavor_id).await?;
        flavor.apply_sold_delta(d.sold_delta)?;
        save_flavor(&mut *conn, &flavor).await?;
        tracing::debug!(flavor_id = %d.flavor_id, delta = d.sold_delta, stock = flavor.stock, "stock adjusted");
    }
    Ok(())
}

pub async fn list_categories(db: &PgPool) -> Result<Vec<Category>> {
    Ok(sqlx::query_as::<_, Category>("SELECT * FROM categories ORDER BY name").fetch_all(db).await?)
}

pub async fn insert_category(db: &PgPool, name: &str) -> Result<Category> {
    Ok(sqlx::query_as::<_, Category>("INSERT INTO categories (id, key, name, created_at) VALUES ($1, $2, $3, NOW()) RETURNING *")
        .bind(Uuid::now_v7()).bind(Category::key_for(name)).bind(name.trim()).fetch_one(db).await?)
}

pub async fn list_providers(db: &PgPool) -> Result<Vec<Provider>> {
    Ok(sqlx::query_as::<_, Provider>("SELECT * FROM providers ORDER BY name").fetch_all(db).await?)
}

pub async fn insert_provider(db: &PgPool, name: &str, phone: Option<&str>, notes: Option<&str>) -> Result<Provider> {
    Ok(sqlx::query_as::<_, Provider>("INSERT INTO providers (id, name, phone, notes, created_at) VALUES ($1, $2, $3, $4, NOW()) RETURNING *")
        .bind(Uuid::now_v7()).bind(name.trim()).bind(phone).bind(notes).fetch_one(db).await?)
}

pub async fn list_coupons(db: &PgPool) -> Result<Vec<Coupon>> {
    Ok(sqlx::query_as::<_, Coupon>("SELECT * FROM coupons ORDER BY created_at DESC").fetch_all(db).await?)
}

pub async fn find_coupon(db: &PgPool, code: &str) -> Result<Coupon> {
    sqlx::query_as::<_, Coupon>("SELECT * FROM coupons WHERE code = $1").bind(code).fetch_optional(db).await?.ok_or(StoreError::NotFound("coupon"))
}

pub async fn insert_coupon(db: &PgPool, code: &str, percent: Decimal) -> Result<Coupon> {
    Ok(sqlx::query_as::<_, Coupon>("INSERT INTO coupons (id, code, percent, active, created_at) VALUES ($1, $2, $3, TRUE, NOW()) RETURNING *")
        .bind(Uuid::now_v7()).bind(code).bind(percent).fetch_one(db).await?)
}

pub async fn set_coupon_active(db: &PgPool, id: Uuid, active: bool) -> Result<Coupon> {
    sqlx::query_as::<_, Coupon>("UPDATE coupons SET active = $2 WHERE id = $1 RETURNING *").bind(id).bind(active)
        .fetch_optional(db).await?.ok_or(StoreError::NotFound("coupon"))
}

/// Deletes a lookup row; `table` is one of the fixed lookup table names.
pub async fn delete_lookup(db: &PgPool, table: LookupTable, id: Uuid) -> Result<()> {
    let sql = format!("DELETE FROM {} WHERE id = $1", table.name());
    let done = sqlx::query(&sql).bind(id).execute(db).await?;
    if done.rows_affected() == 0 { return Err(StoreError::NotFound(table.entity())); }
    Ok(())
}

#[derive(Clone, Copy, Debug)]
pub enum LookupTable { Categories, Providers, Coupons }

impl LookupTable {
    fn name(&self) -> &'static str {
        match self { Self::Categories => "categories", Self::Providers => "providers", Self::Coupons => "coupons" }
    }
    fn entity(&self) -> &'static str {
        match self { Self::Categories => "category", Self::Providers => "provider", Self::Coupons => "coupon" }
    }
}
