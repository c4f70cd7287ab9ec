//! Vape storefront & back-office
//!
//! JSON service behind the shop's catalog and its admin panel.
//!
//! ## Features
//! - Catalog feed from the published spreadsheet, with change hashes
//! - Cart pricing and WhatsApp checkout
//! - Stock ledger (imports) with derived stock, sales and margin
//! - Order management with paid/delivered stock commitment
//! - Clients, coupons, categories, providers
//! - Sales analytics

pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod domain;
pub mod feed;
pub mod images;
pub mod publisher;
pub mod sheets;

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::auth::LoginGuard;
use crate::config::AppConfig;
use crate::domain::aggregates::{CartError, LedgerError, OrderError, ProductError};
use crate::domain::value_objects::{CouponCodeError, PhoneError};
use crate::feed::{FeedCache, FeedError, FeedPayload};
use crate::images::ImageCache;
use crate::publisher::EventPublisher;
use crate::sheets::SheetsClient;

// =============================================================================
// Shared State
// =============================================================================

#[derive(Clone)]
pub struct AppState {
    pub db: sqlx::PgPool,
    pub config: Arc<AppConfig>,
    pub feed: Arc<FeedCache>,
    pub images: Arc<ImageCache>,
    pub login: Arc<LoginGuard>,
    pub sheets: SheetsClient,
    pub events: EventPublisher,
}

const IMAGE_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

impl AppState {
    pub fn new(db: sqlx::PgPool, config: AppConfig, http: reqwest::Client, events: EventPublisher) -> Result<Self> {
        let feed = FeedCache::new(http.clone(), &config.products_csv_url, &config.flavors_csv_url, config.feed_ttl);
        let login = LoginGuard::new(config.auth.login_max_attempts, config.auth.login_lockout);
        let images = ImageCache::new(&config.images, IMAGE_FETCH_TIMEOUT)?;
        let sheets = SheetsClient::new(http, config.sheets.clone());
        Ok(Self {
            db,
            feed: Arc::new(feed),
            images: Arc::new(images),
            login: Arc::new(login),
            sheets,
            events,
            config: Arc::new(config),
        })
    }

    /// Current catalog feed; image hosts of a new payload become proxyable.
    pub async fn catalog_feed(&self) -> std::result::Result<Arc<FeedPayload>, FeedError> {
        let (payload, changed) = self.feed.load().await?;
        if changed {
            self.images.allow_urls(payload.products.iter().flat_map(|p| p.images.iter().map(String::as_str)));
        }
        Ok(payload)
    }
}

// =============================================================================
// Error Types
// =============================================================================

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error(transparent)]
    Product(#[from] ProductError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Order(#[from] OrderError),

    #[error(transparent)]
    Cart(#[from] CartError),

    #[error(transparent)]
    Coupon(#[from] CouponCodeError),

    #[error(transparent)]
    Phone(#[from] PhoneError),

    #[error("invalid username or password")]
    InvalidCredentials,

    #[error("too many failed attempts, try again in {remaining_secs} seconds")]
    LoginLocked { remaining_secs: u64 },

    #[error("upstream request failed: {0}")]
    Upstream(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl From<validator::ValidationErrors> for StoreError {
    fn from(e: validator::ValidationErrors) -> Self { Self::Validation(e.to_string()) }
}

impl From<reqwest::Error> for StoreError {
    fn from(e: reqwest::Error) -> Self { Self::Upstream(e.to_string()) }
}

pub type Result<T> = std::result::Result<T, StoreError>;
