//! Lookup rows: categories, providers and coupons

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Debug, Serialize, Deserialize, sqlx::FromRow)]
pub struct Category { pub id: Uuid, pub key: String, pub name: String, pub created_at: DateTime<Utc> }

impl Category {
    /// `"Pods Descartables"` -> `"pods-descartables"`
    pub fn key_for(name: &str) -> String {
        name.trim().to_lowercase().split_whitespace().collect::<Vec<_>>().join("-")
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, sqlx::FromRow)]
pub struct Provider { pub id: Uuid, pub name: String, pub phone: Option<String>, pub notes: Option<String>, pub created_at: DateTime<Utc> }

#[derive(Clone, Debug, Serialize, Deserialize, sqlx::FromRow)]
pub struct Coupon { pub id: Uuid, pub code: String, pub percent: Decimal, pub active: bool, pub created_at: DateTime<Utc> }

impl Coupon {
    pub fn is_usable(&self) -> bool { self.active && self.percent > Decimal::ZERO && self.percent <= Decimal::ONE_HUNDRED }
}

#[cfg(test)]
mod tests {
    use super::*;
    #[test]
    fn test_category_key() { assert_eq!(Category::key_for("  Pods   Descartables "), "pods-descartables"); }
    #[test]
    fn test_coupon_bounds() {
        let mut c = Coupon { id: Uuid::nil(), code: "X".into(), percent: Decimal::from(120), active: true, created_at: Utc::now() };
        assert!(!c.is_usable());
        c.percent = Decimal::from(15);
        assert!(c.is_usable());
    }
}
