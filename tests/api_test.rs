mod common;

use axum::{body::Body, http::{header, Method, Request, StatusCode}};
use bytes::Bytes;
use common::{json_body, TestApp, ADMIN_PASS, ADMIN_USER, JWT_SECRET};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::json;
use vape_storefront::{auth::Claims, feed::hash_csv, images::CachedImage};

const PRODUCTS: &str = "id,name,brand,category,image1,image2,image3,price\np1,Elf Bar 5000,Elf,pods,,,,12000\n";
const FLAVORS: &str = "id,product_id,name,stock,price\nf1,p1,Watermelon,4,\n";

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder().method(Method::POST).uri(uri).header(header::CONTENT_TYPE, "application/json").body(Body::from(body.to_string())).unwrap()
}

fn with_cookie(uri: &str, token: &str) -> Request<Body> {
    Request::builder().uri(uri).header(header::COOKIE, format!("sb-access-token={token}")).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_health() {
    let app = TestApp::new().await;
    let resp = app.send(get("/health")).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(json_body(resp).await["status"], "healthy");
}

#[tokio::test]
async fn test_admin_redirects_without_session() {
    let app = TestApp::new().await;
    let resp = app.send(get("/admin/api/orders")).await;
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(resp.headers()[header::LOCATION], "/admin/login");
}

#[tokio::test]
async fn test_admin_redirects_non_admin_token() {
    let app = TestApp::new().await;
    let claims = Claims { sub: "shopper".into(), exp: (chrono::Utc::now().timestamp() + 600) as usize, email: None, role: Some("authenticated".into()), app_metadata: None };
    let token = encode(&Header::default(), &claims, &EncodingKey::from_secret(JWT_SECRET.as_bytes())).unwrap();
    let resp = app.send(with_cookie("/admin/api/me", &token)).await;
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);

    let forged = encode(&Header::default(), &Claims { role: Some("admin".into()), ..claims }, &EncodingKey::from_secret(b"wrong")).unwrap();
    let resp = app.send(with_cookie("/admin/api/me", &forged)).await;
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
}

#[tokio::test]
async fn test_admin_token_passes_guard() {
    let app = TestApp::new().await;
    let resp = app.send(with_cookie("/admin/api/me", &app.admin_token())).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(json_body(resp).await["id"], ADMIN_USER);

    let bearer = Request::builder().uri("/admin/api/me").header(header::AUTHORIZATION, format!("Bearer {}", app.admin_token())).body(Body::empty()).unwrap();
    assert_eq!(app.send(bearer).await.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_admin_login_page_is_public() {
    let app = TestApp::new().await;
    assert_eq!(app.send(get("/admin/login")).await.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_login_sets_session_cookies() {
    let app = TestApp::new().await;
    let resp = app.send(post_json("/api/auth/login", json!({ "username": ADMIN_USER, "password": ADMIN_PASS }))).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let cookies: Vec<_> = resp.headers().get_all(header::SET_COOKIE).iter().map(|v| v.to_str().unwrap().to_string()).collect();
    assert_eq!(cookies.len(), 2);
    assert!(cookies[0].starts_with("sb-access-token=") && cookies[0].contains("HttpOnly"));
    assert!(cookies[1].starts_with("sb-refresh-token=") && cookies[1].contains("Max-Age=2592000"));
}

#[tokio::test]
async fn test_login_locks_after_five_failures() {
    let app = TestApp::new().await;
    for _ in 0..5 {
        let resp = app.send(post_json("/api/auth/login", json!({ "username": ADMIN_USER, "password": "nope" }))).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }
    let resp = app.send(post_json("/api/auth/login", json!({ "username": ADMIN_USER, "password": ADMIN_PASS }))).await;
    assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(json_body(resp).await["error"], "login_locked");
}

#[tokio::test]
async fn test_session_cookie_set_and_clear() {
    let app = TestApp::new().await;
    let resp = app.send(post_json("/api/auth/session", json!({ "access_token": "aaa", "refresh_token": "rrr", "expires_in": 3600 }))).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let cookies: Vec<_> = resp.headers().get_all(header::SET_COOKIE).iter().map(|v| v.to_str().unwrap().to_string()).collect();
    assert_eq!(cookies, vec![
        "sb-access-token=aaa; Path=/; HttpOnly; SameSite=Lax; Max-Age=3600".to_string(),
        "sb-refresh-token=rrr; Path=/; HttpOnly; SameSite=Lax; Max-Age=2592000".to_string(),
    ]);

    let clear = Request::builder().method(Method::DELETE).uri("/api/auth/session").body(Body::empty()).unwrap();
    let resp = app.send(clear).await;
    assert!(resp.headers().get_all(header::SET_COOKIE).iter().all(|v| v.to_str().unwrap().contains("Max-Age=0")));
}

#[tokio::test]
async fn test_feed_serves_cache_and_not_modified() {
    let app = TestApp::new().await;
    let resp = app.send(get("/api/products")).await;
    assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);

    app.state.feed.install(PRODUCTS, FLAVORS).await.unwrap();
    let resp = app.send(get("/api/products")).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = json_body(resp).await;
    assert_eq!(body["productHash"], hash_csv(PRODUCTS));
    assert_eq!(body["products"][0]["flavors"][0]["name"], "Watermelon");

    let uri = format!("/api/products?productHash={}&flavorHash={}", hash_csv(PRODUCTS), hash_csv(FLAVORS));
    assert_eq!(app.send(get(&uri)).await.status(), StatusCode::NOT_MODIFIED);
    let uri = format!("/api/products?productHash={}&flavorHash=stale", hash_csv(PRODUCTS));
    assert_eq!(app.send(get(&uri)).await.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_image_proxy() {
    let app = TestApp::new().await;
    let url = "https://cdn.invalid/pod.webp";
    app.state.images.put(url, CachedImage { content_type: "image/webp".into(), body: Bytes::from_static(b"RIFF") });
    let resp = app.send(get(&format!("/images?url={url}"))).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()[header::CONTENT_TYPE], "image/webp");

    assert_eq!(app.send(get("/images?url=ftp://cdn.invalid/a.png")).await.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(app.send(get("/images?url=http://127.0.0.1:9/a.png")).await.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_image_proxy_only_reaches_catalog_hosts() {
    let app = TestApp::new().await;
    for url in ["http://10.0.0.1/a.png", "http://169.254.169.254/latest/meta-data", "https://img.example.com/pod.webp"] {
        let resp = app.send(get(&format!("/images?url={url}"))).await;
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY, "{url}");
    }

    app.state.images.allow_urls(["https://img.example.com/other.webp"]);
    let resp = app.send(get("/images?url=http://10.0.0.1/a.png")).await;
    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert!(app.state.images.is_allowed("img.example.com"));
}

#[tokio::test]
async fn test_checkout_rejects_empty_cart() {
    let app = TestApp::new().await;
    let resp = app.send(post_json("/api/orders", json!({ "name": "Ana", "phone": "1155550000", "items": [] }))).await;
    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json_body(resp).await["error"], "validation");

    let resp = app.send(post_json("/api/orders", json!({ "name": "Ana", "phone": "12", "items": [{ "flavor_id": uuid::Uuid::nil(), "quantity": 1 }] }))).await;
    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_admin_sheets_routes() {
    let app = TestApp::new().await;
    let token = app.admin_token();
    assert_eq!(app.send(with_cookie("/admin/api/sheets/invoices", &token)).await.status(), StatusCode::NOT_FOUND);
    // No spreadsheet configured.
    assert_eq!(app.send(with_cookie("/admin/api/sheets/clients", &token)).await.status(), StatusCode::BAD_GATEWAY);
}
