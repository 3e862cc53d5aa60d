//! Aggregates module
pub mod product;
pub mod customer;
pub mod order;
pub mod cart;

pub use product::{Product, ProductError, StockChange};
pub use customer::{Customer, CustomerType};
pub use order::{Contact, InventoryTransaction, Order, OrderLine, OrderSource, OrderStatus, PaymentMethod, PaymentStatus};
pub use cart::{Cart, CartError, CartLine};
