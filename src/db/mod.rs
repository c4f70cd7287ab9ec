//! Postgres access. Multi-row writes run in one transaction each.
pub mod catalog;
pub mod clients;
pub mod ledger;
pub mod orders;

use sqlx::postgres::{PgPool, PgPoolOptions};

pub async fn connect(url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
    let pool = PgPoolOptions::new().max_connections(max_connections).connect(url).await?;
    sqlx::migrate!("./migrations").run(&pool).await?;
    Ok(pool)
}
