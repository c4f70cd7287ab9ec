//! Catalog feed built from the published spreadsheet CSV exports.
//!
//! Both CSVs are hashed as fetched (SHA-256 of the raw text). The parsed,
//! joined payload is only rebuilt when either hash moves, and clients that
//! already hold the current hashes get a `304`. Upstream is checked at most
//! once per TTL; failed checks also wait out the TTL while the last good
//! payload is served.
//!
//! Expected columns:
//! - products: `id,name,brand,category,image1,image2,image3,price`
//! - flavors: `id,product_id,name,stock,price` (empty price falls back to the product's)

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedPayload {
    pub products: Vec<FeedProduct>,
    pub product_hash: String,
    pub flavor_hash: String,
}

impl FeedPayload {
    pub fn matches(&self, product_hash: &str, flavor_hash: &str) -> bool {
        self.product_hash == product_hash && self.flavor_hash == flavor_hash
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FeedProduct {
    pub id: String,
    pub name: String,
    pub brand: String,
    pub category: String,
    pub images: Vec<String>,
    pub price: Decimal,
    pub flavors: Vec<FeedFlavor>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FeedFlavor { pub id: String, pub name: String, pub stock: i32, pub price: Decimal }

#[derive(Debug, Deserialize)]
struct ProductRecord {
    id: String,
    name: String,
    #[serde(default)]
    brand: String,
    #[serde(default)]
    category: String,
    #[serde(default)]
    image1: String,
    #[serde(default)]
    image2: String,
    #[serde(default)]
    image3: String,
    #[serde(default)]
    price: String,
}

#[derive(Debug, Deserialize)]
struct FlavorRecord {
    id: String,
    product_id: String,
    name: String,
    #[serde(default)]
    stock: String,
    #[serde(default)]
    price: String,
}

#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error("fetching {url}: {source}")]
    Fetch { url: String, source: reqwest::Error },
    #[error("malformed csv: {0}")]
    Csv(#[from] csv::Error),
    #[error("invalid {field} {value:?} for row {id}")]
    InvalidNumber { field: &'static str, id: String, value: String },
}

impl From<FeedError> for crate::StoreError {
    fn from(e: FeedError) -> Self { Self::Upstream(e.to_string()) }
}

/// Lowercase hex SHA-256 of the CSV text.
pub fn hash_csv(text: &str) -> String { hex::encode(Sha256::digest(text.as_bytes())) }

/// Parses both CSVs and nests each flavor under its product.
pub fn build_payload(products_csv: &str, flavors_csv: &str) -> Result<FeedPayload, FeedError> {
    let mut products = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    for record in reader(products_csv).deserialize::<ProductRecord>() {
        let r = record?;
        if r.id.is_empty() { continue; }
        let price = parse_price(&r.price).ok_or_else(|| FeedError::InvalidNumber { field: "price", id: r.id.clone(), value: r.price.clone() })?;
        let images = [r.image1, r.image2, r.image3].into_iter().filter(|u| !u.is_empty()).collect();
        index.insert(r.id.clone(), products.len());
        products.push(FeedProduct { id: r.id, name: r.name, brand: r.brand, category: r.category, images, price, flavors: vec![] });
    }

    let mut orphans = 0usize;
    for record in reader(flavors_csv).deserialize::<FlavorRecord>() {
        let r = record?;
        let Some(&at) = index.get(&r.product_id) else { orphans += 1; continue };
        let stock = if r.stock.is_empty() { 0 } else {
            r.stock.parse::<i32>().map_err(|_| FeedError::InvalidNumber { field: "stock", id: r.id.clone(), value: r.stock.clone() })?
        };
        let price = if r.price.is_empty() { products[at].price } else {
            parse_price(&r.price).ok_or_else(|| FeedError::InvalidNumber { field: "price", id: r.id.clone(), value: r.price.clone() })?
        };
        products[at].flavors.push(FeedFlavor { id: r.id, name: r.name, stock, price });
    }
    if orphans > 0 { tracing::warn!(orphans, "flavors without a matching product were skipped"); }

    Ok(FeedPayload { products, product_hash: hash_csv(products_csv), flavor_hash: hash_csv(flavors_csv) })
}

fn reader(text: &str) -> csv::Reader<&[u8]> {
    csv::ReaderBuilder::new().trim(csv::Trim::All).flexible(true).from_reader(text.as_bytes())
}

/// Accepts `12000`, `$12.000`, `12.000,50` and `12000.50`.
fn parse_price(raw: &str) -> Option<Decimal> {
    let cleaned: String = raw.chars().filter(|c| !c.is_whitespace() && *c != '$').collect();
    if cleaned.is_empty() { return Some(Decimal::ZERO); }
    let normalized = if cleaned.contains(',') {
        cleaned.replace('.', "").replace(',', ".")
    } else if cleaned.matches('.').count() > 1 || cleaned.rsplit('.').next().is_some_and(|tail| tail.len() == 3 && cleaned.contains('.')) {
        cleaned.replace('.', "")
    } else {
        cleaned
    };
    Decimal::from_str(&normalized).ok().filter(|d| *d >= Decimal::ZERO)
}

/// Last built payload plus the sources it came from.
pub struct FeedCache {
    http: reqwest::Client,
    products_url: String,
    flavors_url: String,
    ttl: Duration,
    current: RwLock<Option<Arc<FeedPayload>>>,
    checked_at: Mutex<Option<Instant>>,
}

impl FeedCache {
    pub fn new(http: reqwest::Client, products_url: &str, flavors_url: &str, ttl: Duration) -> Self {
        Self {
            http, products_url: products_url.to_string(), flavors_url: flavors_url.to_string(), ttl,
            current: RwLock::new(None), checked_at: Mutex::new(None),
        }
    }

    pub async fn current(&self) -> Option<Arc<FeedPayload>> { self.current.read().await.clone() }

    /// Cached payload while the last upstream check is younger than the TTL,
    /// otherwise a refresh. Concurrent callers wait on a single refresh.
    pub async fn load(&self) -> Result<(Arc<FeedPayload>, bool), FeedError> {
        let mut checked_at = self.checked_at.lock().await;
        if let (Some(at), Some(current)) = (*checked_at, self.current().await) {
            if at.elapsed() < self.ttl { return Ok((current, false)); }
        }
        let result = self.refresh().await;
        *checked_at = Some(Instant::now());
        result
    }

    /// Fetches both CSVs and returns the payload plus whether it changed.
    pub async fn refresh(&self) -> Result<(Arc<FeedPayload>, bool), FeedError> {
        let (products_csv, flavors_csv) = tokio::try_join!(self.fetch(&self.products_url), self.fetch(&self.flavors_url))?;
        self.install(&products_csv, &flavors_csv).await
    }

    /// Replaces the cached payload only when either hash differs.
    pub async fn install(&self, products_csv: &str, flavors_csv: &str) -> Result<(Arc<FeedPayload>, bool), FeedError> {
        let (product_hash, flavor_hash) = (hash_csv(products_csv), hash_csv(flavors_csv));
        if let Some(current) = self.current().await {
            if current.matches(&product_hash, &flavor_hash) { return Ok((current, false)); }
        }
        let payload = Arc::new(build_payload(products_csv, flavors_csv)?);
        *self.current.write().await = Some(payload.clone());
        tracing::info!(products = payload.products.len(), product_hash = %payload.product_hash, flavor_hash = %payload.flavor_hash, "catalog feed updated");
        Ok((payload, true))
    }

    async fn fetch(&self, url: &str) -> Result<String, FeedError> {
        let wrap = |source| FeedError::Fetch { url: url.to_string(), source };
        self.http.get(url).send().await.and_then(|r| r.error_for_status()).map_err(wrap)?.text().await.map_err(wrap)
    }
}
