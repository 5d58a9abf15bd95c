//! `voltmart-catalog` — the product catalog domain.

pub mod product;

pub use product::{NewProduct, Product, ProductPatch, ProductSnapshot, Rating};
