//! OpenSASE POS
//!
//! Self-hosted point of sale and retail back office.
//!
//! ## Features
//! - Till cart with per-product or store-wide tax
//! - Amount and percentage discounts
//! - Order submission with stock ledger
//! - HTML and text receipts, mail/SMS/WhatsApp links
//! - Order administration and sales reports

pub mod checkout;
pub mod config;
pub mod domain;
pub mod notify;
pub mod receipt;
pub mod reports;
pub mod store;

use thiserror::Error;

pub use checkout::{CheckoutError, CheckoutOutcome, CheckoutSettings, NotifyOptions, OrderSubmitter, SaleSession, ValidationError};
pub use config::PosConfig;
pub use domain::aggregates::{Cart, CartError, CartLine, Contact, Customer, Order, OrderLine, Product};
pub use domain::totals::{Discount, DiscountError, DiscountInput, DiscountKind, Totals};
pub use store::{InMemoryStore, OrderFilter, PgStore, Store, StoreError};

// =============================================================================
// Error Types
// =============================================================================

#[derive(Error, Debug)]
pub enum PosError {
    #[error("Product not found")]
    ProductNotFound,

    #[error("Order not found")]
    OrderNotFound,

    #[error("Customer not found")]
    CustomerNotFound,

    #[error(transparent)]
    Cart(#[from] CartError),

    #[error(transparent)]
    Discount(#[from] DiscountError),

    #[error(transparent)]
    Checkout(#[from] CheckoutError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Invalid input: {0}")]
    Invalid(String),
}

pub type Result<T> = std::result::Result<T, PosError>;
