//! Domain types shared by every crate of the flower shop backend.
//!
//! Requests arrive as [`OrderRequest`] (every field optional, exactly as the
//! client sent it), are normalized into [`NewOrder`] by validation, and come
//! back from the store as [`Order`].

mod order;
mod product;
mod request;

pub use order::{
    ContactType, ItemSize, Order, OrderId, OrderItem, OrderItemSummary, OrderStatus,
    OrderSummary, ParseEnumError,
};
pub use product::{NewProduct, Product, ProductFilter, ProductId};
pub use request::{NewOrder, NewOrderItem, OrderItemRequest, OrderRequest};
