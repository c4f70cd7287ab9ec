//! Client rows

use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::domain::aggregates::Client;
use crate::domain::value_objects::Phone;
use crate::{Result, StoreError};

pub async fn list(db: &PgPool, search: Option<&str>) -> Result<Vec<Client>> {
    let pattern = search.map(|s| format!("%{}%", s.trim()));
    Ok(sqlx::query_as::<_, Client>("SELECT * FROM clients WHERE ($1::text IS NULL OR name ILIKE $1 OR phone LIKE $1) ORDER BY name")
        .bind(pattern).fetch_all(db).await?)
}

pub async fn get(db: &PgPool, id: Uuid) -> Result<Client> {
    sqlx::query_as::<_, Client>("SELECT * FROM clients WHERE id = $1").bind(id).fetch_optional(db).await?.ok_or(StoreError::NotFound("client"))
}

/// Returns the client with this phone, creating it (or refreshing its name) as needed.
pub async fn upsert_by_phone(conn: &mut PgConnection, name: &str, phone: &Phone) -> Result<Client> {
    Ok(sqlx::query_as::<_, Client>("INSERT INTO clients (id, name, phone, notes, created_at) VALUES ($1, $2, $3, NULL, NOW()) ON CONFLICT (phone) DO UPDATE SET name = EXCLUDED.name RETURNING *")
        .bind(Uuid::now_v7()).bind(name.trim()).bind(phone.as_str()).fetch_one(conn).await?)
}

pub async fn insert(db: &PgPool, name: &str, phone: &Phone, notes: Option<&str>) -> Result<Client> {
    Ok(sqlx::query_as::<_, Client>("INSERT INTO clients (id, name, phone, notes, created_at) VALUES ($1, $2, $3, $4, NOW()) RETURNING *")
        .bind(Uuid::now_v7()).bind(name.trim()).bind(phone.as_str()).bind(notes).fetch_one(db).await?)
}

pub async fn update(db: &PgPool, id: Uuid, name: &str, phone: &Phone, notes: Option<&str>) -> Result<Client> {
    sqlx::query_as::<_, Client>("UPDATE clients SET name = $2, phone = $3, notes = $4 WHERE id = $1 RETURNING *")
        .bind(id).bind(name.trim()).bind(phone.as_str()).bind(notes).fetch_optional(db).await?.ok_or(StoreError::NotFound("client"))
}

pub async fn delete(db: &PgPool, id: Uuid) -> Result<()> {
    let done = sqlx::query("DELETE FROM clients WHERE id = $1 AND NOT EXISTS (SELECT 1 FROM orders WHERE client_id = $1)").bind(id).execute(db).await?;
    if done.rows_affected() == 0 {
        get(db, id).await?;
        return Err(StoreError::Validation("client has orders and cannot be deleted".into()));
    }
    Ok(())
}
