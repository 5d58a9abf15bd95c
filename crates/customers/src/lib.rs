//! `voltmart-customers` — customer records and their identity links.

pub mod customer;

pub use customer::{Customer, CustomerIdentity, NewCustomer};
