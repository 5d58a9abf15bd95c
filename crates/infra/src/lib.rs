//! `voltmart-infra` — transactional storage and the checkout service.
//!
//! The [`store::StorefrontStore`] trait is the storage boundary: a Postgres
//! implementation for production and an in-memory implementation for
//! tests/dev. [`checkout::Checkout`] orchestrates the order placement
//! workflow on top of whichever store it is given.

pub mod checkout;
pub mod store;

pub use checkout::Checkout;
pub use store::{MemoryStore, PostgresStore, StoreError, StorefrontStore};
