//! Repository tests against a real Postgres.
//!
//! Ignored by default because they need a scratch database; migrations run on connect.
//! Run with: DATABASE_URL=postgres://... cargo test --test db_test -- --ignored

use chrono::NaiveDate;
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;
use vape_storefront::db::{self, catalog, ledger, orders, orders::OrderFlag};
use vape_storefront::domain::aggregates::{Cart, CartItem, Flavor, ImportLine, LedgerInputs, LedgerPatch, Order, OrderStatus, Product, ProductError};
use vape_storefront::domain::value_objects::{Money, Phone};
use vape_storefront::StoreError;

async fn pool() -> PgPool {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must point at a scratch database");
    db::connect(&url, 5).await.expect("db connect")
}

fn day(d: u32) -> NaiveDate { NaiveDate::from_ymd_opt(2024, 3, d).expect("date") }

/// New product plus one flavor whose units arrive through a ledger line.
async fn seed_flavor(db: &PgPool, purchased: i32, unit_cost: i64) -> (Flavor, ImportLine) {
    let product = catalog::insert_product(db, &Product::create("Elf Bar 5000", "Elf", "pods", vec![], Decimal::new(12000, 0)).unwrap()).await.unwrap();
    let flavor = catalog::insert_flavor(db, &Flavor::create(product.id, "Watermelon", Decimal::new(12000, 0), Decimal::new(1000, 0), 0).unwrap()).await.unwrap();
    let line = add_batch(db, &flavor, purchased, unit_cost, day(1)).await;
    (catalog::get_flavor(db, flavor.id).await.unwrap(), line)
}

async fn add_batch(db: &PgPool, flavor: &Flavor, purchased: i32, unit_cost: i64, date: NaiveDate) -> ImportLine {
    let inputs = LedgerInputs { unit_cost: Decimal::new(unit_cost, 0), unit_sale_price: flavor.price, discount: flavor.discount, purchased_quantity: purchased, sold_quantity: 0 };
    let line = ImportLine::create(flavor.product_id, flavor.id, None, inputs, date, None).unwrap();
    ledger::create(db, &line).await.unwrap();
    line
}

fn shopper_phone() -> Phone {
    Phone::new(&format!("54911{:08}", Uuid::now_v7().as_u128() % 100_000_000)).unwrap()
}

async fn place(db: &PgPool, lines: &[(&Flavor, u32)]) -> Order {
    let mut cart = Cart::new("ARS");
    for (flavor, quantity) in lines {
        cart.add_item(CartItem {
            product_id: flavor.product_id, flavor_id: flavor.id, product_name: "Elf Bar 5000".into(), flavor_name: flavor.name.clone(),
            quantity: *quantity, unit_price: Money::ars(flavor.net_price),
        });
    }
    orders::place(db, "Ana", &shopper_phone(), &cart, None).await.unwrap().0
}

#[tokio::test]
#[ignore]
async fn test_checkout_stores_order_without_touching_stock() {
    let db = pool().await;
    let (flavor, _) = seed_flavor(&db, 5, 7000).await;
    let placed = place(&db, &[(&flavor, 2)]).await;

    let stored = orders::get(&db, placed.id).await.unwrap();
    assert_eq!(stored.items.len(), 1);
    assert_eq!(stored.items[0].quantity, 2);
    assert_eq!(stored.total, flavor.net_price * Decimal::from(2));
    assert_eq!(stored.status, OrderStatus::Pending);
    assert!(!stored.paid && !stored.delivered);
    assert_eq!(catalog::get_flavor(&db, flavor.id).await.unwrap().stock, 5);
}

#[tokio::test]
#[ignore]
async fn test_toggle_rolls_back_every_flavor_on_insufficient_stock() {
    let db = pool().await;
    let (plenty, _) = seed_flavor(&db, 10, 7000).await;
    let (short, _) = seed_flavor(&db, 3, 7000).await;

    let first = place(&db, &[(&short, 2)]).await;
    orders::toggle(&db, first.id, OrderFlag::Paid).await.unwrap();
    assert_eq!(catalog::get_flavor(&db, short.id).await.unwrap().stock, 1);

    let second = place(&db, &[(&plenty, 1), (&short, 2)]).await;
    let err = orders::toggle(&db, second.id, OrderFlag::Delivered).await.unwrap_err();
    assert!(matches!(err, StoreError::Product(ProductError::InsufficientStock { .. })), "{err:?}");

    assert!(!orders::get(&db, second.id).await.unwrap().delivered);
    assert_eq!(catalog::get_flavor(&db, plenty.id).await.unwrap().stock, 10);
    assert_eq!(catalog::get_flavor(&db, short.id).await.unwrap().stock, 1);
}

#[tokio::test]
#[ignore]
async fn test_delete_hands_back_committed_stock() {
    let db = pool().await;
    let (flavor, _) = seed_flavor(&db, 5, 7000).await;
    let order = place(&db, &[(&flavor, 3)]).await;
    orders::toggle(&db, order.id, OrderFlag::Delivered).await.unwrap();
    assert_eq!(catalog::get_flavor(&db, flavor.id).await.unwrap().stock, 2);

    orders::delete(&db, order.id).await.unwrap();
    let after = catalog::get_flavor(&db, flavor.id).await.unwrap();
    assert_eq!((after.sold, after.stock), (0, 5));
    assert!(matches!(orders::get(&db, order.id).await, Err(StoreError::NotFound(_))));
}

#[tokio::test]
#[ignore]
async fn test_mass_edit_is_all_or_nothing() {
    let db = pool().await;
    let (flavor, first) = seed_flavor(&db, 5, 7000).await;
    let second = add_batch(&db, &flavor, 5, 7000, day(2)).await;
    let order = place(&db, &[(&flavor, 8)]).await;
    orders::toggle(&db, order.id, OrderFlag::Paid).await.unwrap();

    // 2 + 2 purchased would sit below the 8 already sold.
    let shrink = LedgerPatch { purchased_quantity: Some(2), ..LedgerPatch::default() };
    let err = ledger::mass_edit(&db, &[first.id, second.id], &shrink).await.unwrap_err();
    assert!(matches!(err, StoreError::Product(ProductError::InsufficientStock { .. })), "{err:?}");

    let reprice = LedgerPatch { unit_cost: Some(Decimal::new(6500, 0)), ..LedgerPatch::default() };
    assert!(matches!(ledger::mass_edit(&db, &[first.id, Uuid::now_v7()], &reprice).await, Err(StoreError::NotFound("import"))));

    let lines = ledger::list(&db, Some(flavor.id), None).await.unwrap();
    assert!(lines.iter().all(|l| l.inputs.purchased_quantity == 5 && l.inputs.unit_cost == Decimal::new(7000, 0)));
    let unchanged = catalog::get_flavor(&db, flavor.id).await.unwrap();
    assert_eq!((unchanged.purchased, unchanged.stock), (10, 2));

    let grow = LedgerPatch { purchased_quantity: Some(6), ..LedgerPatch::default() };
    let edited = ledger::mass_edit(&db, &[second.id, first.id, first.id], &grow).await.unwrap();
    assert_eq!(edited.len(), 2);
    let grown = catalog::get_flavor(&db, flavor.id).await.unwrap();
    assert_eq!((grown.purchased, grown.stock), (12, 4));
}

#[tokio::test]
#[ignore]
async fn test_restock_defaults_cost_to_latest_batch() {
    let db = pool().await;
    let (flavor, _) = seed_flavor(&db, 5, 7000).await;
    add_batch(&db, &flavor, 4, 7500, day(9)).await;

    let restock = ledger::Restock { flavor_id: flavor.id, quantity: 6, unit_cost: None, provider_id: None, purchase_date: day(20), notes: None };
    let (line, after) = ledger::restock(&db, &restock).await.unwrap();
    assert_eq!(line.inputs.unit_cost, Decimal::new(7500, 0));
    assert_eq!(line.inputs.unit_sale_price, flavor.price);
    assert_eq!(line.inputs.discount, flavor.discount);
    assert_eq!((after.purchased, after.stock), (15, 15));

    let explicit = ledger::Restock { unit_cost: Some(Decimal::new(8000, 0)), ..restock };
    assert_eq!(ledger::restock(&db, &explicit).await.unwrap().0.inputs.unit_cost, Decimal::new(8000, 0));

    let product = catalog::insert_product(&db, &Product::create("Vaporesso XROS", "Vaporesso", "kits", vec![], Decimal::new(35000, 0)).unwrap()).await.unwrap();
    let fresh = catalog::insert_flavor(&db, &Flavor::create(product.id, "Black", Decimal::new(35000, 0), Decimal::ZERO, 0).unwrap()).await.unwrap();
    let no_history = ledger::Restock { flavor_id: fresh.id, quantity: 2, unit_cost: None, provider_id: None, purchase_date: day(20), notes: None };
    assert!(matches!(ledger::restock(&db, &no_history).await, Err(StoreError::Validation(_))));
}
