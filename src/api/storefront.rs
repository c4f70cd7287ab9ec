//! Public storefront routes

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;
use validator::Validate;

use crate::db::{catalog, orders};
use crate::domain::aggregates::{whatsapp_link, Cart, CartError, CartItem, Category, Client, Flavor, Order, Product, ProductError};
use crate::domain::value_objects::{CouponCode, Money, Phone};
use crate::images::ImageError;
use crate::{AppState, Result, StoreError};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/products", get(feed))
        .route("/api/catalog", get(catalog_with_flavors))
        .route("/api/categories", get(categories))
        .route("/api/coupons/:code", get(check_coupon))
        .route("/api/cart/quote", post(quote))
        .route("/api/orders", post(checkout))
        .route("/images", get(image))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedQuery { pub product_hash: Option<String>, pub flavor_hash: Option<String> }

/// Catalog feed. A client already holding both current hashes gets `304`;
/// when the spreadsheet is unreachable the last good payload is served.
async fn feed(State(s): State<AppState>, Query(q): Query<FeedQuery>) -> Result<Response> {
    let payload = match s.catalog_feed().await {
        Ok(payload) => payload,
        Err(e) => match s.feed.current().await {
            Some(stale) => {
                tracing::warn!(error = %e, "catalog feed refresh failed, serving cached copy");
                stale
            }
            None => return Err(e.into()),
        },
    };
    if let (Some(p), Some(f)) = (&q.product_hash, &q.flavor_hash) {
        if payload.matches(p, f) { return Ok(StatusCode::NOT_MODIFIED.into_response()); }
    }
    Ok(Json(&*payload).into_response())
}

#[derive(Debug, Deserialize)] pub struct CatalogQuery { pub category: Option<String> }
#[derive(Debug, Serialize)] pub struct CatalogProduct { #[serde(flatten)] pub product: Product, pub flavors: Vec<Flavor> }

async fn catalog_with_flavors(State(s): State<AppState>, Query(q): Query<CatalogQuery>) -> Result<Json<Vec<CatalogProduct>>> {
    let products = catalog::list_products(&s.db, q.category.as_deref(), false).await?;
    let mut by_product: HashMap<Uuid, Vec<Flavor>> = HashMap::new();
    for f in catalog::list_flavors(&s.db, None, false).await? { by_product.entry(f.product_id).or_default().push(f); }
    Ok(Json(products.into_iter().map(|product| {
        let flavors = by_product.remove(&product.id).unwrap_or_default();
        CatalogProduct { product, flavors }
    }).collect()))
}

async fn categories(State(s): State<AppState>) -> Result<Json<Vec<Category>>> {
    Ok(Json(catalog::list_categories(&s.db).await?))
}

#[derive(Debug, Serialize)] pub struct CouponCheck { pub code: String, pub percent: rust_decimal::Decimal }

async fn check_coupon(State(s): State<AppState>, Path(code): Path<String>) -> Result<Json<CouponCheck>> {
    let code = CouponCode::new(code)?;
    let coupon = catalog::find_coupon(&s.db, code.as_str()).await?;
    if !coupon.is_usable() { return Err(CartError::CouponInactive(coupon.code).into()); }
    Ok(Json(CouponCheck { code: coupon.code, percent: coupon.percent }))
}

#[derive(Debug, Deserialize, Validate)]
pub struct CheckoutRequest {
    #[validate(length(min = 1, max = 120))]
    pub name: String,
    pub phone: String,
    #[validate(length(min = 1, max = 50))]
    pub items: Vec<CheckoutLine>,
    pub coupon: Option<String>,
    #[validate(length(max = 500))]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)] pub struct CheckoutLine { pub flavor_id: Uuid, pub quantity: u32 }

#[derive(Debug, Serialize)] pub struct CheckoutResponse { pub order: Order, pub client: Client, pub whatsapp_url: String }

/// Prices the cart from current flavor rows, stores the order and returns
/// the WhatsApp link that hands it to the shop.
async fn checkout(State(s): State<AppState>, Json(r): Json<CheckoutRequest>) -> Result<(StatusCode, Json<CheckoutResponse>)> {
    r.validate()?;
    let phone = Phone::new(&r.phone)?;
    let cart = price_cart(&s, &r.items, r.coupon.as_deref()).await?;
    let notes = r.notes.as_deref().map(str::trim).filter(|n| !n.is_empty()).map(str::to_string);

    let (order, client, events) = orders::place(&s.db, r.name.trim(), &phone, &cart, notes.clone()).await?;
    s.events.publish(events).await;

    let whatsapp_url = whatsapp_link(&s.config.whatsapp_phone, &cart.whatsapp_message(r.name.trim(), notes.as_deref()));
    Ok((StatusCode::CREATED, Json(CheckoutResponse { order, client, whatsapp_url })))
}

#[derive(Debug, Deserialize, Validate)]
pub struct QuoteRequest {
    #[validate(length(min = 1, max = 50))]
    pub items: Vec<CheckoutLine>,
    pub coupon: Option<String>,
}

/// Prices a cart without placing it.
async fn quote(State(s): State<AppState>, Json(r): Json<QuoteRequest>) -> Result<Json<Cart>> {
    r.validate()?;
    Ok(Json(price_cart(&s, &r.items, r.coupon.as_deref()).await?))
}

async fn price_cart(s: &AppState, lines: &[CheckoutLine], coupon: Option<&str>) -> Result<Cart> {
    let ids: Vec<Uuid> = lines.iter().map(|l| l.flavor_id).collect();
    let flavors: HashMap<Uuid, Flavor> = catalog::get_flavors(&s.db, &ids).await?.into_iter().map(|f| (f.id, f)).collect();
    let product_ids: Vec<Uuid> = flavors.values().map(|f| f.product_id).collect();
    let products: HashMap<Uuid, Product> = catalog::get_products(&s.db, &product_ids).await?.into_iter().map(|p| (p.id, p)).collect();

    let mut cart = build_cart(&s.config.currency, lines, &flavors, &products)?;
    if let Some(code) = coupon.filter(|c| !c.trim().is_empty()) {
        let code = CouponCode::new(code)?;
        cart.apply_coupon(&catalog::find_coupon(&s.db, code.as_str()).await?)?;
    }
    Ok(cart)
}

const MAX_LINE_QUANTITY: u32 = 1000;

/// Merges lines per flavor, then checks each merged quantity against stock.
fn build_cart(currency: &str, lines: &[CheckoutLine], flavors: &HashMap<Uuid, Flavor>, products: &HashMap<Uuid, Product>) -> Result<Cart> {
    let mut cart = Cart::new(currency);
    for line in lines {
        if line.quantity == 0 || line.quantity > MAX_LINE_QUANTITY {
            return Err(StoreError::Validation(format!("quantity for flavor {} must be between 1 and {MAX_LINE_QUANTITY}", line.flavor_id)));
        }
        let flavor = flavors.get(&line.flavor_id).filter(|f| f.active).ok_or(StoreError::NotFound("flavor"))?;
        let product = products.get(&flavor.product_id).filter(|p| p.active).ok_or(StoreError::NotFound("product"))?;
        cart.add_item(CartItem {
            product_id: product.id, flavor_id: flavor.id,
            product_name: product.name.clone(), flavor_name: flavor.name.clone(),
            quantity: line.quantity, unit_price: Money::new(flavor.net_price, currency),
        });
    }
    for item in cart.items() {
        let available = flavors.get(&item.flavor_id).map_or(0, |f| f.stock);
        if i64::from(item.quantity) > i64::from(available) {
            return Err(ProductError::InsufficientStock { flavor_id: item.flavor_id, available }.into());
        }
    }
    Ok(cart)
}

#[derive(Debug, Deserialize)] pub struct ImageQuery { pub url: String }

/// Proxies catalog images through the in-process cache.
async fn image(State(s): State<AppState>, Query(q): Query<ImageQuery>) -> Response {
    match s.images.fetch(&q.url).await {
        Ok(img) => ([(header::CONTENT_TYPE, img.content_type), (header::CACHE_CONTROL, "public, max-age=86400".to_string())], img.body).into_response(),
        Err(e @ (ImageError::UnsupportedUrl | ImageError::HostNotAllowed(_))) => StoreError::Validation(e.to_string()).into_response(),
        Err(e) => {
            tracing::warn!(url = %q.url, error = %e, "image proxy failed");
            (StatusCode::SERVICE_UNAVAILABLE, Json(serde_json::json!({ "error": "image_unavailable", "message": e.to_string() }))).into_response()
        }
    }
}
