//! Back-office API mounted under `/admin/api`

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
    Extension, Json, Router,
};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{Map, Value};
use uuid::Uuid;
use validator::Validate;

use crate::api::{ListParams, PaginatedResponse};
use crate::auth::AdminUser;
use crate::db::catalog::{self, LookupTable};
use crate::db::ledger::{self, Restock};
use crate::db::orders::{self, OrderFilter, OrderFlag};
use crate::db::clients;
use crate::domain::aggregates::{Category, Client, Coupon, Flavor, ImportLine, LedgerInputs, LedgerPatch, Order, OrderStatus, Product, Provider};
use crate::domain::analytics::{self, SalesSummary};
use crate::domain::events::{DomainEvent, StockEvent};
use crate::domain::value_objects::{CouponCode, Phone};
use crate::sheets::SheetKind;
use crate::{AppState, Result, StoreError};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/admin/api/me", get(me))
        .route("/admin/api/products", get(list_products).post(create_product))
        .route("/admin/api/products/:id", get(get_product).put(update_product).delete(delete_product))
        .route("/admin/api/flavors", get(list_flavors).post(create_flavor))
        .route("/admin/api/flavors/:id", get(get_flavor).put(update_flavor))
        .route("/admin/api/categories", get(list_categories).post(create_category))
        .route("/admin/api/categories/:id", axum::routing::delete(delete_category))
        .route("/admin/api/providers", get(list_providers).post(create_provider))
        .route("/admin/api/providers/:id", axum::routing::delete(delete_provider))
        .route("/admin/api/coupons", get(list_coupons).post(create_coupon))
        .route("/admin/api/coupons/:id", put(set_coupon_active).delete(delete_coupon))
        .route("/admin/api/clients", get(list_clients).post(create_client))
        .route("/admin/api/clients/:id", get(get_client).put(update_client).delete(delete_client))
        .route("/admin/api/imports", get(list_imports).post(create_import))
        .route("/admin/api/imports/mass-edit", post(mass_edit_imports))
        .route("/admin/api/imports/restock", post(restock))
        .route("/admin/api/imports/:id", axum::routing::delete(delete_import))
        .route("/admin/api/orders", get(list_orders))
        .route("/admin/api/orders/:id", get(get_order).delete(delete_order))
        .route("/admin/api/orders/:id/paid", post(toggle_paid))
        .route("/admin/api/orders/:id/delivered", post(toggle_delivered))
        .route("/admin/api/orders/:id/cancel", post(cancel_order))
        .route("/admin/api/analytics", get(sales_summary))
        .route("/admin/api/sheets/:sheet", get(read_sheet).post(append_sheet).put(update_sheet))
}

async fn me(Extension(user): Extension<AdminUser>) -> Json<Value> {
    Json(serde_json::json!({ "id": user.id, "email": user.email }))
}

// =============================================================================
// Products & flavors
// =============================================================================

#[derive(Debug, Deserialize)] pub struct ProductQuery { pub category: Option<String>, #[serde(default)] pub include_inactive: bool }

#[derive(Debug, Deserialize, Validate)]
pub struct ProductRequest {
    #[validate(length(min = 1, max = 120))]
    pub name: String,
    #[serde(default)]
    pub brand: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub images: Vec<String>,
    pub price: Decimal,
}

async fn list_products(State(s): State<AppState>, Query(q): Query<ProductQuery>) -> Result<Json<Vec<Product>>> {
    Ok(Json(catalog::list_products(&s.db, q.category.as_deref(), q.include_inactive).await?))
}

async fn get_product(State(s): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<Product>> {
    Ok(Json(catalog::get_product(&s.db, id).await?))
}

async fn create_product(State(s): State<AppState>, Json(r): Json<ProductRequest>) -> Result<(StatusCode, Json<Product>)> {
    r.validate()?;
    let product = Product::create(r.name, r.brand, r.category, r.images, r.price)?;
    let product = catalog::insert_product(&s.db, &product).await?;
    s.images.allow_urls(product.images.iter().map(String::as_str));
    tracing::info!(product_id = %product.id, name = %product.name, "product created");
    Ok((StatusCode::CREATED, Json(product)))
}

async fn update_product(State(s): State<AppState>, Path(id): Path<Uuid>, Json(r): Json<ProductRequest>) -> Result<Json<Product>> {
    r.validate()?;
    let mut product = catalog::get_product(&s.db, id).await?;
    product.revise(r.name, r.brand, r.category, r.images, r.price)?;
    let product = catalog::update_product(&s.db, &product).await?;
    s.images.allow_urls(product.images.iter().map(String::as_str));
    Ok(Json(product))
}

async fn delete_product(State(s): State<AppState>, Path(id): Path<Uuid>) -> Result<StatusCode> {
    catalog::deactivate_product(&s.db, id).await?;
    tracing::info!(product_id = %id, "product deactivated");
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)] pub struct FlavorQuery { pub product_id: Option<Uuid>, #[serde(default)] pub include_inactive: bool }

#[derive(Debug, Deserialize, Validate)]
pub struct CreateFlavorRequest {
    pub product_id: Uuid,
    #[validate(length(min = 1, max = 120))]
    pub name: String,
    pub price: Option<Decimal>,
    #[serde(default)]
    pub discount: Decimal,
}

#[derive(Debug, Deserialize)] pub struct UpdateFlavorRequest { pub name: Option<String>, pub price: Option<Decimal>, pub discount: Option<Decimal>, pub active: Option<bool> }

async fn list_flavors(State(s): State<AppState>, Query(q): Query<FlavorQuery>) -> Result<Json<Vec<Flavor>>> {
    Ok(Json(catalog::list_flavors(&s.db, q.product_id, q.include_inactive).await?))
}

async fn get_flavor(State(s): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<Flavor>> {
    Ok(Json(catalog::get_flavor(&s.db, id).await?))
}

/// New flavors start empty; stock arrives through imports.
async fn create_flavor(State(s): State<AppState>, Json(r): Json<CreateFlavorRequest>) -> Result<(StatusCode, Json<Flavor>)> {
    r.validate()?;
    let product = catalog::get_product(&s.db, r.product_id).await?;
    let flavor = Flavor::create(product.id, r.name.trim(), r.price.unwrap_or(product.price), r.discount, 0)?;
    Ok((StatusCode::CREATED, Json(catalog::insert_flavor(&s.db, &flavor).await?)))
}

async fn update_flavor(State(s): State<AppState>, Path(id): Path<Uuid>, Json(r): Json<UpdateFlavorRequest>) -> Result<Json<Flavor>> {
    Ok(Json(catalog::revise_flavor(&s.db, id, r.name.as_deref(), r.price, r.discount, r.active).await?))
}

// =============================================================================
// Lookups
// =============================================================================

#[derive(Debug, Deserialize, Validate)] pub struct NameRequest { #[validate(length(min = 1, max = 80))] pub name: String }

#[derive(Debug, Deserialize, Validate)]
pub struct ProviderRequest {
    #[validate(length(min = 1, max = 120))]
    pub name: String,
    pub phone: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CouponRequest {
    pub code: String,
    #[validate(custom = "percent_in_range")]
    pub percent: Decimal,
}

#[derive(Debug, Deserialize)] pub struct CouponToggle { pub active: bool }

fn percent_in_range(p: &Decimal) -> std::result::Result<(), validator::ValidationError> {
    if *p > Decimal::ZERO && *p <= Decimal::ONE_HUNDRED { Ok(()) } else { Err(validator::ValidationError::new("percent_out_of_range")) }
}

async fn list_categories(State(s): State<AppState>) -> Result<Json<Vec<Category>>> { Ok(Json(catalog::list_categories(&s.db).await?)) }

async fn create_category(State(s): State<AppState>, Json(r): Json<NameRequest>) -> Result<(StatusCode, Json<Category>)> {
    r.validate()?;
    Ok((StatusCode::CREATED, Json(catalog::insert_category(&s.db, &r.name).await?)))
}

async fn delete_category(State(s): State<AppState>, Path(id): Path<Uuid>) -> Result<StatusCode> {
    catalog::delete_lookup(&s.db, LookupTable::Categories, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_providers(State(s): State<AppState>) -> Result<Json<Vec<Provider>>> { Ok(Json(catalog::list_providers(&s.db).await?)) }

async fn create_provider(State(s): State<AppState>, Json(r): Json<ProviderRequest>) -> Result<(StatusCode, Json<Provider>)> {
    r.validate()?;
    Ok((StatusCode::CREATED, Json(catalog::insert_provider(&s.db, &r.name, r.phone.as_deref(), r.notes.as_deref()).await?)))
}

async fn delete_provider(State(s): State<AppState>, Path(id): Path<Uuid>) -> Result<StatusCode> {
    catalog::delete_lookup(&s.db, LookupTable::Providers, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_coupons(State(s): State<AppState>) -> Result<Json<Vec<Coupon>>> { Ok(Json(catalog::list_coupons(&s.db).await?)) }

async fn create_coupon(State(s): State<AppState>, Json(r): Json<CouponRequest>) -> Result<(StatusCode, Json<Coupon>)> {
    r.validate()?;
    let code = CouponCode::new(r.code)?;
    Ok((StatusCode::CREATED, Json(catalog::insert_coupon(&s.db, code.as_str(), r.percent).await?)))
}

async fn set_coupon_active(State(s): State<AppState>, Path(id): Path<Uuid>, Json(r): Json<CouponToggle>) -> Result<Json<Coupon>> {
    Ok(Json(catalog::set_coupon_active(&s.db, id, r.active).await?))
}

async fn delete_coupon(State(s): State<AppState>, Path(id): Path<Uuid>) -> Result<StatusCode> {
    catalog::delete_lookup(&s.db, LookupTable::Coupons, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// =============================================================================
// Clients
// =============================================================================

#[derive(Debug, Deserialize)] pub struct ClientQuery { pub search: Option<String> }

#[derive(Debug, Deserialize, Validate)]
pub struct ClientRequest {
    #[validate(length(min = 1, max = 120))]
    pub name: String,
    pub phone: String,
    pub notes: Option<String>,
}

async fn list_clients(State(s): State<AppState>, Query(q): Query<ClientQuery>) -> Result<Json<Vec<Client>>> {
    Ok(Json(clients::list(&s.db, q.search.as_deref().filter(|v| !v.trim().is_empty())).await?))
}

async fn get_client(State(s): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<Client>> { Ok(Json(clients::get(&s.db, id).await?)) }

async fn create_client(State(s): State<AppState>, Json(r): Json<ClientRequest>) -> Result<(StatusCode, Json<Client>)> {
    r.validate()?;
    let phone = Phone::new(&r.phone)?;
    Ok((StatusCode::CREATED, Json(clients::insert(&s.db, &r.name, &phone, r.notes.as_deref()).await?)))
}

async fn update_client(State(s): State<AppState>, Path(id): Path<Uuid>, Json(r): Json<ClientRequest>) -> Result<Json<Client>> {
    r.validate()?;
    let phone = Phone::new(&r.phone)?;
    Ok(Json(clients::update(&s.db, id, &r.name, &phone, r.notes.as_deref()).await?))
}

async fn delete_client(State(s): State<AppState>, Path(id): Path<Uuid>) -> Result<StatusCode> {
    clients::delete(&s.db, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// =============================================================================
// Imports (stock ledger)
// =============================================================================

#[derive(Debug, Deserialize)] pub struct ImportQuery { pub flavor_id: Option<Uuid>, pub provider_id: Option<Uuid> }

#[derive(Debug, Deserialize)]
pub struct CreateImportRequest {
    pub flavor_id: Uuid,
    pub provider_id: Option<Uuid>,
    #[serde(flatten)]
    pub inputs: LedgerInputs,
    pub purchase_date: Option<NaiveDate>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct MassEditRequest {
    #[validate(length(min = 1, max = 500))]
    pub ids: Vec<Uuid>,
    pub patch: LedgerPatch,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RestockRequest {
    pub flavor_id: Uuid,
    #[validate(range(min = 1, max = 100000))]
    pub quantity: i32,
    pub unit_cost: Option<Decimal>,
    pub provider_id: Option<Uuid>,
    pub purchase_date: Option<NaiveDate>,
    pub notes: Option<String>,
}

#[derive(Debug, serde::Serialize)] pub struct ImportResponse { pub import: ImportLine, pub flavor: Flavor }

async fn list_imports(State(s): State<AppState>, Query(q): Query<ImportQuery>) -> Result<Json<Vec<ImportLine>>> {
    Ok(Json(ledger::list(&s.db, q.flavor_id, q.provider_id).await?))
}

async fn create_import(State(s): State<AppState>, Json(r): Json<CreateImportRequest>) -> Result<(StatusCode, Json<ImportResponse>)> {
    let flavor = catalog::get_flavor(&s.db, r.flavor_id).await?;
    let date = r.purchase_date.unwrap_or_else(|| Utc::now().date_naive());
    let line = ImportLine::create(flavor.product_id, flavor.id, r.provider_id, r.inputs, date, r.notes)?;
    let flavor = ledger::create(&s.db, &line).await?;
    publish_import(&s, &line).await;
    Ok((StatusCode::CREATED, Json(ImportResponse { import: line, flavor })))
}

/// Add-import: a new batch for an existing flavor with prices prefilled.
async fn restock(State(s): State<AppState>, Json(r): Json<RestockRequest>) -> Result<(StatusCode, Json<ImportResponse>)> {
    r.validate()?;
    let req = Restock {
        flavor_id: r.flavor_id, quantity: r.quantity, unit_cost: r.unit_cost, provider_id: r.provider_id,
        purchase_date: r.purchase_date.unwrap_or_else(|| Utc::now().date_naive()), notes: r.notes,
    };
    let (line, flavor) = ledger::restock(&s.db, &req).await?;
    publish_import(&s, &line).await;
    Ok((StatusCode::CREATED, Json(ImportResponse { import: line, flavor })))
}

async fn mass_edit_imports(State(s): State<AppState>, Json(r): Json<MassEditRequest>) -> Result<Json<Vec<ImportLine>>> {
    r.validate()?;
    Ok(Json(ledger::mass_edit(&s.db, &r.ids, &r.patch).await?))
}

async fn delete_import(State(s): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<Flavor>> {
    Ok(Json(ledger::delete(&s.db, id).await?))
}

async fn publish_import(s: &AppState, line: &ImportLine) {
    let quantity = u32::try_from(line.inputs.purchased_quantity).unwrap_or(0);
    s.events.publish(vec![DomainEvent::Stock(StockEvent::Imported { flavor_id: line.flavor_id, quantity })]).await;
}

// =============================================================================
// Orders
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct OrderQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub paid: Option<bool>,
    pub delivered: Option<bool>,
    pub status: Option<String>,
    pub client_id: Option<Uuid>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

async fn list_orders(State(s): State<AppState>, Query(q): Query<OrderQuery>) -> Result<Json<PaginatedResponse<Order>>> {
    let (page, limit, offset) = ListParams { page: q.page, per_page: q.per_page }.window();
    let status = q.status.as_deref().map(OrderStatus::parse).transpose()?;
    let filter = OrderFilter { paid: q.paid, delivered: q.delivered, status, client_id: q.client_id, from: q.from, to: q.to, limit, offset };
    let (data, total) = orders::list(&s.db, &filter).await?;
    Ok(Json(PaginatedResponse { data, total, page }))
}

async fn get_order(State(s): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<Order>> { Ok(Json(orders::get(&s.db, id).await?)) }

async fn toggle_paid(State(s): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<Order>> { toggle(s, id, OrderFlag::Paid).await }

async fn toggle_delivered(State(s): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<Order>> { toggle(s, id, OrderFlag::Delivered).await }

async fn toggle(s: AppState, id: Uuid, flag: OrderFlag) -> Result<Json<Order>> {
    let (order, events) = orders::toggle(&s.db, id, flag).await?;
    s.events.publish(events).await;
    Ok(Json(order))
}

async fn cancel_order(State(s): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<Order>> {
    let (order, events) = orders::cancel(&s.db, id).await?;
    s.events.publish(events).await;
    Ok(Json(order))
}

async fn delete_order(State(s): State<AppState>, Path(id): Path<Uuid>) -> Result<StatusCode> {
    orders::delete(&s.db, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// =============================================================================
// Analytics & sheets
// =============================================================================

#[derive(Debug, Deserialize)] pub struct AnalyticsQuery { pub from: Option<DateTime<Utc>>, pub to: Option<DateTime<Utc>>, pub top: Option<usize> }

async fn sales_summary(State(s): State<AppState>, Query(q): Query<AnalyticsQuery>) -> Result<Json<SalesSummary>> {
    let orders = orders::between(&s.db, q.from, q.to).await?;
    Ok(Json(analytics::summarize(&orders, q.top.unwrap_or(10).min(100))))
}

#[derive(Debug, Deserialize)] pub struct SheetUpdate { pub row: u32, pub record: Map<String, Value> }

fn sheet_kind(name: &str) -> Result<SheetKind> {
    SheetKind::parse(name).ok_or(StoreError::NotFound("sheet"))
}

async fn read_sheet(State(s): State<AppState>, Path(sheet): Path<String>) -> Result<Json<Vec<Value>>> {
    Ok(Json(s.sheets.read(sheet_kind(&sheet)?).await?))
}

async fn append_sheet(State(s): State<AppState>, Path(sheet): Path<String>, Json(record): Json<Map<String, Value>>) -> Result<(StatusCode, Json<Value>)> {
    Ok((StatusCode::CREATED, Json(s.sheets.append(sheet_kind(&sheet)?, &record).await?)))
}

async fn update_sheet(State(s): State<AppState>, Path(sheet): Path<String>, Json(r): Json<SheetUpdate>) -> Result<Json<Value>> {
    Ok(Json(s.sheets.update(sheet_kind(&sheet)?, r.row, &r.record).await?))
}
