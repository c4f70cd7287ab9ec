//! Cart Aggregate and WhatsApp checkout message

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use uuid::Uuid;
use crate::domain::aggregates::lookup::Coupon;
use crate::domain::value_objects::{CouponCode, Money, Phone};

#[derive(Clone, Debug, Serialize)]
pub struct Cart {
    items: Vec<CartItem>,
    currency: String,
    coupon: Option<CouponCode>,
    coupon_percent: Decimal,
    subtotal: Money,
    discount: Money,
    total: Money,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CartItem {
    pub product_id: Uuid,
    pub flavor_id: Uuid,
    pub product_name: String,
    pub flavor_name: String,
    pub quantity: u32,
    pub unit_price: Money,
}

impl CartItem {
    pub fn line_total(&self) -> Money { self.unit_price.multiply(self.quantity) }
}

impl Cart {
    pub fn new(currency: &str) -> Self {
        Self {
            items: vec![], currency: currency.to_string(), coupon: None, coupon_percent: Decimal::ZERO,
            subtotal: Money::zero(currency), discount: Money::zero(currency), total: Money::zero(currency),
        }
    }

    pub fn items(&self) -> &[CartItem] { &self.items }
    pub fn subtotal(&self) -> &Money { &self.subtotal }
    pub fn discount(&self) -> &Money { &self.discount }
    pub fn total(&self) -> &Money { &self.total }
    pub fn coupon(&self) -> Option<&CouponCode> { self.coupon.as_ref() }
    pub fn item_count(&self) -> usize { self.items.len() }
    pub fn is_empty(&self) -> bool { self.items.is_empty() }

    pub fn add_item(&mut self, item: CartItem) {
        if item.quantity == 0 { return; }
        if let Some(existing) = self.items.iter_mut().find(|i| i.flavor_id == item.flavor_id) {
            existing.quantity = existing.quantity.saturating_add(item.quantity);
        } else {
            self.items.push(item);
        }
        self.recalculate();
    }

    pub fn update_quantity(&mut self, flavor_id: Uuid, quantity: u32) -> Result<(), CartError> {
        let item = self.items.iter_mut().find(|i| i.flavor_id == flavor_id).ok_or(CartError::ItemNotFound)?;
        if quantity == 0 { self.items.retain(|i| i.flavor_id != flavor_id); }
        else { item.quantity = quantity; }
        self.recalculate();
        Ok(())
    }

    pub fn remove_item(&mut self, flavor_id: Uuid) -> Result<(), CartError> {
        let before = self.items.len();
        self.items.retain(|i| i.flavor_id != flavor_id);
        if self.items.len() == before { return Err(CartError::ItemNotFound); }
        self.recalculate();
        Ok(())
    }

    pub fn clear(&mut self) { self.items.clear(); self.coupon = None; self.coupon_percent = Decimal::ZERO; self.recalculate(); }

    pub fn apply_coupon(&mut self, coupon: &Coupon) -> Result<(), CartError> {
        if !coupon.is_usable() { return Err(CartError::CouponInactive(coupon.code.clone())); }
        self.coupon = Some(CouponCode::new(&coupon.code).map_err(|_| CartError::CouponInactive(coupon.code.clone()))?);
        self.coupon_percent = coupon.percent;
        self.recalculate();
        Ok(())
    }

    /// Order summary sent to the shop's WhatsApp.
    pub fn whatsapp_message(&self, client_name: &str, notes: Option<&str>) -> String {
        let mut msg = format!("Hola! Soy {client_name} y quiero hacer este pedido:\n");
        for i in &self.items {
            let _ = writeln!(msg, "- {} x {} ({}): {}", i.quantity, i.product_name, i.flavor_name, i.line_total());
        }
        if let Some(code) = &self.coupon {
            let _ = writeln!(msg, "Cupón {code}: -{}", self.discount);
        }
        let _ = write!(msg, "Total: {}", self.total);
        if let Some(n) = notes.filter(|n| !n.trim().is_empty()) {
            let _ = write!(msg, "\nNotas: {}", n.trim());
        }
        msg
    }

    fn recalculate(&mut self) {
        self.subtotal = self.items.iter().fold(Money::zero(&self.currency), |acc, i| acc.add(&i.line_total()).unwrap_or(acc));
        self.discount = self.subtotal.percent(self.coupon_percent);
        self.total = self.subtotal.saturating_sub(&self.discount).unwrap_or_else(|_| self.subtotal.clone());
    }
}

/// `https://wa.me/<phone>?text=<message>` deep link.
pub fn whatsapp_link(phone: &Phone, message: &str) -> String {
    let text: String = url::form_urlencoded::byte_serialize(message.as_bytes()).collect();
    format!("https://wa.me/{}?text={}", phone.as_str(), text.replace('+', "%20"))
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CartError {
    #[error("item not found")]
    ItemNotFound,
    #[error("coupon {0} is not active")]
    CouponInactive(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn item(flavor_id: Uuid, qty: u32, price: i64) -> CartItem {
        CartItem { product_id: Uuid::nil(), flavor_id, product_name: "Elf Bar".into(), flavor_name: "Watermelon".into(), quantity: qty, unit_price: Money::ars(Decimal::from(price)) }
    }

    fn coupon(percent: i64, active: bool) -> Coupon {
        Coupon { id: Uuid::nil(), code: "VERANO10".into(), percent: Decimal::from(percent), active, created_at: Utc::now() }
    }

    #[test]
    fn test_cart_operations() {
        let f = Uuid::now_v7();
        let mut cart = Cart::new("ARS");
        cart.add_item(item(f, 2, 10));
        assert_eq!(cart.item_count(), 1);
        assert_eq!(cart.subtotal().amount(), Decimal::from(20));
        cart.add_item(item(f, 1, 10));
        assert_eq!(cart.items()[0].quantity, 3); // Merged
        cart.update_quantity(f, 0).unwrap();
        assert!(cart.is_empty());
        assert_eq!(cart.remove_item(f), Err(CartError::ItemNotFound));
    }

    #[test]
    fn test_coupon_discount() {
        let mut cart = Cart::new("ARS");
        cart.add_item(item(Uuid::now_v7(), 2, 5000));
        cart.apply_coupon(&coupon(10, true)).unwrap();
        assert_eq!(cart.discount().amount(), Decimal::from(1000));
        assert_eq!(cart.total().amount(), Decimal::from(9000));
        assert!(matches!(cart.apply_coupon(&coupon(10, false)), Err(CartError::CouponInactive(_))));
    }

    #[test]
    fn test_whatsapp_link() {
        let mut cart = Cart::new("ARS");
        cart.add_item(item(Uuid::now_v7(), 1, 7000));
        let msg = cart.whatsapp_message("Ana", Some("timbre 2B"));
        assert!(msg.contains("1 x Elf Bar (Watermelon)"));
        assert!(msg.ends_with("Notas: timbre 2B"));
        let link = whatsapp_link(&Phone::new("+54 9 11 5555 1234").unwrap(), &msg);
        assert!(link.starts_with("https://wa.me/5491155551234?text=Hola%21%20Soy%20Ana"));
        assert!(!link.contains(' '));
    }
}
