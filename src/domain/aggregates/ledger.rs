//! Stock ledger (import) lines and their derived figures.
//!
//! Every surface that writes an import line (create, mass edit, restock)
//! goes through [`LedgerFigures::derive`], so stock, sales, gain and margin
//! always agree with the inputs they were computed from.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Fields an operator types in.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerInputs {
    pub unit_cost: Decimal,
    pub unit_sale_price: Decimal,
    pub discount: Decimal,
    pub purchased_quantity: i32,
    pub sold_quantity: i32,
}

impl LedgerInputs {
    pub fn check(&self) -> Result<(), LedgerError> {
        if self.unit_cost < Decimal::ZERO || self.unit_sale_price < Decimal::ZERO || self.discount < Decimal::ZERO {
            return Err(LedgerError::NegativeAmount);
        }
        if self.purchased_quantity < 0 || self.sold_quantity < 0 { return Err(LedgerError::NegativeQuantity); }
        if self.sold_quantity > self.purchased_quantity {
            return Err(LedgerError::OversoldBatch { purchased: self.purchased_quantity, sold: self.sold_quantity });
        }
        Ok(())
    }
}

/// Figures computed from [`LedgerInputs`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerFigures {
    pub current_stock: i32,
    pub net_sale_price: Decimal,
    pub total_cost: Decimal,
    pub total_sales: Decimal,
    pub gain: Decimal,
    pub margin: Decimal,
}

impl LedgerFigures {
    pub fn derive(inputs: &LedgerInputs) -> Self {
        let sold = Decimal::from(inputs.sold_quantity);
        let net_sale_price = (inputs.unit_sale_price - inputs.discount).max(Decimal::ZERO);
        let total_sales = net_sale_price * sold;
        Self {
            current_stock: inputs.purchased_quantity - inputs.sold_quantity,
            net_sale_price,
            total_cost: inputs.unit_cost * Decimal::from(inputs.purchased_quantity),
            total_sales,
            gain: total_sales - inputs.unit_cost * sold,
            margin: margin(inputs.unit_cost, inputs.unit_sale_price),
        }
    }
}

/// `(sale - cost) / sale`, or zero unless both are positive. Four decimals.
pub fn margin(unit_cost: Decimal, unit_sale_price: Decimal) -> Decimal {
    if unit_cost <= Decimal::ZERO || unit_sale_price <= Decimal::ZERO { return Decimal::ZERO; }
    ((unit_sale_price - unit_cost) / unit_sale_price).round_dp(4)
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ImportLine {
    pub id: Uuid,
    pub product_id: Uuid,
    pub flavor_id: Uuid,
    pub provider_id: Option<Uuid>,
    #[serde(flatten)]
    pub inputs: LedgerInputs,
    #[serde(flatten)]
    pub figures: LedgerFigures,
    pub purchase_date: NaiveDate,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ImportLine {
    pub fn create(product_id: Uuid, flavor_id: Uuid, provider_id: Option<Uuid>, inputs: LedgerInputs, purchase_date: NaiveDate, notes: Option<String>) -> Result<Self, LedgerError> {
        inputs.check()?;
        let now = Utc::now();
        let figures = LedgerFigures::derive(&inputs);
        Ok(Self { id: Uuid::now_v7(), product_id, flavor_id, provider_id, inputs, figures, purchase_date, notes, created_at: now, updated_at: now })
    }

    /// Applies a mass-edit patch and recomputes. Returns the change in
    /// purchased units so the owning flavor can follow it.
    pub fn apply_patch(&mut self, patch: &LedgerPatch) -> Result<i32, LedgerError> {
        let mut inputs = self.inputs.clone();
        if let Some(v) = patch.unit_cost { inputs.unit_cost = v; }
        if let Some(v) = patch.unit_sale_price { inputs.unit_sale_price = v; }
        if let Some(v) = patch.discount { inputs.discount = v; }
        if let Some(v) = patch.purchased_quantity { inputs.purchased_quantity = v; }
        if let Some(v) = patch.sold_quantity { inputs.sold_quantity = v; }
        inputs.check()?;
        let purchased_delta = inputs.purchased_quantity - self.inputs.purchased_quantity;
        self.inputs = inputs;
        if let Some(provider_id) = patch.provider_id { self.provider_id = Some(provider_id); }
        if let Some(date) = patch.purchase_date { self.purchase_date = date; }
        if let Some(notes) = &patch.notes { self.notes = Some(notes.clone()); }
        self.figures = LedgerFigures::derive(&self.inputs);
        self.updated_at = Utc::now();
        Ok(purchased_delta)
    }
}

/// Fields a mass edit may overwrite. `None` leaves the field untouched.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct LedgerPatch {
    pub unit_cost: Option<Decimal>,
    pub unit_sale_price: Option<Decimal>,
    pub discount: Option<Decimal>,
    pub purchased_quantity: Option<i32>,
    pub sold_quantity: Option<i32>,
    pub provider_id: Option<Uuid>,
    pub purchase_date: Option<NaiveDate>,
    pub notes: Option<String>,
}

impl LedgerPatch {
    pub fn is_empty(&self) -> bool {
        self.unit_cost.is_none() && self.unit_sale_price.is_none() && self.discount.is_none()
            && self.purchased_quantity.is_none() && self.sold_quantity.is_none()
            && self.provider_id.is_none() && self.purchase_date.is_none() && self.notes.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("costs, prices and discounts must not be negative")]
    NegativeAmount,
    #[error("quantities must not be negative")]
    NegativeQuantity,
    #[error("sold quantity {sold} exceeds purchased quantity {purchased}")]
    OversoldBatch { purchased: i32, sold: i32 },
    #[error("mass edit patch is empty")]
    EmptyPatch,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inputs(cost: i64, sale: i64, purchased: i32, sold: i32) -> LedgerInputs {
        LedgerInputs { unit_cost: Decimal::from(cost), unit_sale_price: Decimal::from(sale), discount: Decimal::ZERO, purchased_quantity: purchased, sold_quantity: sold }
    }

    #[test]
    fn test_derive_figures() {
        let mut i = inputs(6000, 10000, 20, 5);
        i.discount = Decimal::from(500);
        let f = LedgerFigures::derive(&i);
        assert_eq!(f.current_stock, 15);
        assert_eq!(f.net_sale_price, Decimal::from(9500));
        assert_eq!(f.total_cost, Decimal::from(120000));
        assert_eq!(f.total_sales, Decimal::from(47500));
        assert_eq!(f.gain, Decimal::from(17500));
        assert_eq!(f.margin, Decimal::new(4, 1));
    }

    #[test]
    fn test_margin_zero_without_prices() {
        assert_eq!(margin(Decimal::ZERO, Decimal::from(100)), Decimal::ZERO);
        assert_eq!(margin(Decimal::from(100), Decimal::ZERO), Decimal::ZERO);
    }

    #[test]
    fn test_check_rejects_oversold() {
        assert_eq!(inputs(1, 2, 3, 4).check(), Err(LedgerError::OversoldBatch { purchased: 3, sold: 4 }));
        assert_eq!(inputs(-1, 2, 3, 1).check(), Err(LedgerError::NegativeAmount));
    }

    #[test]
    fn test_patch_recomputes_and_reports_delta() {
        let d = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let mut line = ImportLine::create(Uuid::now_v7(), Uuid::now_v7(), None, inputs(50, 100, 10, 2), d, None).unwrap();
        let delta = line.apply_patch(&LedgerPatch { purchased_quantity: Some(14), unit_cost: Some(Decimal::from(75)), ..Default::default() }).unwrap();
        assert_eq!(delta, 4);
        assert_eq!(line.figures.current_stock, 12);
        assert_eq!(line.figures.margin, Decimal::new(25, 2));
        let before = line.clone();
        assert!(line.apply_patch(&LedgerPatch { sold_quantity: Some(99), ..Default::default() }).is_err());
        assert_eq!(line.inputs, before.inputs);
    }
}
