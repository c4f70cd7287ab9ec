//! Aggregates module
pub mod product;
pub mod order;
pub mod cart;
pub mod ledger;
pub mod client;
pub mod lookup;

pub use product::{Flavor, Product, ProductError, MAX_PRODUCT_IMAGES};
pub use order::{Order, OrderError, OrderItem, OrderStatus, StockDelta};
pub use cart::{whatsapp_link, Cart, CartError, CartItem};
pub use ledger::{ImportLine, LedgerError, LedgerFigures, LedgerInputs, LedgerPatch};
pub use client::Client;
pub use lookup::{Category, Coupon, Provider};
