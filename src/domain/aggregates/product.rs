//! Product and Flavor aggregates

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const MAX_PRODUCT_IMAGES: usize = 3;

#[derive(Clone, Debug, Serialize, Deserialize, sqlx::FromRow)]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    pub brand: String,
    pub category_key: String,
    pub images: Vec<String>,
    pub price: Decimal,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    pub fn create(name: impl Into<String>, brand: impl Into<String>, category_key: impl Into<String>, images: Vec<String>, price: Decimal) -> Result<Self, ProductError> {
        let now = Utc::now();
        let mut product = Self {
            id: Uuid::now_v7(), name: String::new(), brand: String::new(), category_key: String::new(),
            images: vec![], price: Decimal::ZERO, active: true, created_at: now, updated_at: now,
        };
        product.revise(name, brand, category_key, images, price)?;
        Ok(product)
    }

    pub fn revise(&mut self, name: impl Into<String>, brand: impl Into<String>, category_key: impl Into<String>, images: Vec<String>, price: Decimal) -> Result<(), ProductError> {
        let name = name.into().trim().to_string();
        if name.is_empty() { return Err(ProductError::MissingName); }
        if price < Decimal::ZERO { return Err(ProductError::NegativePrice); }
        Self::check_images(&images)?;
        self.name = name;
        self.brand = brand.into().trim().to_string();
        self.category_key = category_key.into().trim().to_string();
        self.images = images;
        self.price = price;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Checks a set of image URLs before it is stored on a product.
    pub fn check_images(images: &[String]) -> Result<(), ProductError> {
        if images.len() > MAX_PRODUCT_IMAGES { return Err(ProductError::TooManyImages(images.len())); }
        if let Some(bad) = images.iter().find(|u| !(u.starts_with("https://") || u.starts_with("http://"))) {
            return Err(ProductError::InvalidImageUrl(bad.clone()));
        }
        Ok(())
    }
}

/// A sellable variant of a product carrying its own stock and price.
///
/// `stock`, `net_price` and `total_sales` are derived; [`Flavor::recompute`]
/// is the only place that writes them.
#[derive(Clone, Debug, Serialize, Deserialize, sqlx::FromRow)]
pub struct Flavor {
    pub id: Uuid,
    pub product_id: Uuid,
    pub name: String,
    pub purchased: i32,
    pub sold: i32,
    pub stock: i32,
    pub discount: Decimal,
    pub price: Decimal,
    pub net_price: Decimal,
    pub total_sales: Decimal,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Flavor {
    pub fn create(product_id: Uuid, name: impl Into<String>, price: Decimal, discount: Decimal, purchased: u32) -> Result<Self, ProductError> {
        if price < Decimal::ZERO || discount < Decimal::ZERO { return Err(ProductError::NegativePrice); }
        let now = Utc::now();
        let mut flavor = Self {
            id: Uuid::now_v7(), product_id, name: name.into(),
            purchased: to_i32(purchased)?, sold: 0, stock: 0,
            discount, price, net_price: Decimal::ZERO, total_sales: Decimal::ZERO,
            active: true, created_at: now, updated_at: now,
        };
        flavor.recompute();
        Ok(flavor)
    }

    pub fn recompute(&mut self) {
        self.stock = self.purchased - self.sold;
        self.net_price = (self.price - self.discount).max(Decimal::ZERO);
        self.total_sales = self.net_price * Decimal::from(self.sold);
        self.updated_at = Utc::now();
    }

    pub fn update_pricing(&mut self, price: Decimal, discount: Decimal) -> Result<(), ProductError> {
        if price < Decimal::ZERO || discount < Decimal::ZERO { return Err(ProductError::NegativePrice); }
        self.price = price;
        self.discount = discount;
        self.recompute();
        Ok(())
    }

    /// Records a purchase batch arriving (or a correction when negative).
    pub fn add_purchased(&mut self, delta: i32) -> Result<(), ProductError> {
        let purchased = self.purchased.checked_add(delta).ok_or(ProductError::QuantityOverflow)?;
        if purchased < self.sold { return Err(ProductError::InsufficientStock { flavor_id: self.id, available: self.stock }); }
        self.purchased = purchased;
        self.recompute();
        Ok(())
    }

    /// Applies a signed sale delta: positive commits units, negative releases them.
    pub fn apply_sold_delta(&mut self, delta: i32) -> Result<(), ProductError> {
        let sold = self.sold.checked_add(delta).ok_or(ProductError::QuantityOverflow)?;
        if sold < 0 { return Err(ProductError::NegativeSold(self.id)); }
        if sold > self.purchased { return Err(ProductError::InsufficientStock { flavor_id: self.id, available: self.stock }); }
        self.sold = sold;
        self.recompute();
        Ok(())
    }
}

fn to_i32(value: u32) -> Result<i32, ProductError> { i32::try_from(value).map_err(|_| ProductError::QuantityOverflow) }

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProductError {
    #[error("missing name")]
    MissingName,
    #[error("a product holds at most 3 images, got {0}")]
    TooManyImages(usize),
    #[error("invalid image url: {0}")]
    InvalidImageUrl(String),
    #[error("prices and discounts must not be negative")]
    NegativePrice,
    #[error("quantity out of range")]
    QuantityOverflow,
    #[error("insufficient stock for flavor {flavor_id} ({available} available)")]
    InsufficientStock { flavor_id: Uuid, available: i32 },
    #[error("sold counter for flavor {0} would go negative")]
    NegativeSold(Uuid),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flavor(purchased: u32) -> Flavor {
        Flavor::create(Uuid::now_v7(), "Mango Ice", Decimal::new(12000, 0), Decimal::new(1000, 0), purchased).unwrap()
    }

    #[test]
    fn test_images_limit() {
        let urls: Vec<String> = (0..4).map(|i| format!("https://cdn.example.com/{i}.webp")).collect();
        assert_eq!(Product::check_images(&urls[..3]), Ok(()));
        assert_eq!(Product::check_images(&urls), Err(ProductError::TooManyImages(4)));
        assert!(matches!(Product::check_images(&["ftp://x".into()]), Err(ProductError::InvalidImageUrl(_))));
    }

    #[test]
    fn test_product_create() {
        let p = Product::create(" Elf Bar 5000 ", "Elf", "pods", vec![], Decimal::new(12000, 0)).unwrap();
        assert_eq!(p.name, "Elf Bar 5000");
        assert_eq!(Product::create(" ", "", "", vec![], Decimal::ONE).unwrap_err(), ProductError::MissingName);
    }

    #[test]
    fn test_flavor_derived_fields() {
        let mut f = flavor(10);
        assert_eq!(f.stock, 10);
        assert_eq!(f.net_price, Decimal::new(11000, 0));
        f.apply_sold_delta(3).unwrap();
        assert_eq!(f.stock, 7);
        assert_eq!(f.total_sales, Decimal::new(33000, 0));
    }

    #[test]
    fn test_sold_delta_bounds() {
        let mut f = flavor(2);
        assert!(matches!(f.apply_sold_delta(3), Err(ProductError::InsufficientStock { available: 2, .. })));
        assert_eq!(f.apply_sold_delta(-1), Err(ProductError::NegativeSold(f.id)));
        f.apply_sold_delta(2).unwrap();
        f.apply_sold_delta(-2).unwrap();
        assert_eq!(f.stock, 2);
    }

    #[test]
    fn test_add_purchased() {
        let mut f = flavor(5);
        f.apply_sold_delta(4).unwrap();
        f.add_purchased(10).unwrap();
        assert_eq!(f.stock, 11);
        assert!(f.add_purchased(-12).is_err());
    }
}
