//! Thin request functions, one module per backend resource.

pub mod auth;
pub mod companies;
