//! checkout-geo core
//!
//! Route geometry, route caching, delivery pricing and the location
//! confirmation flow used during checkout.

pub mod cache;
pub mod config;
pub mod error;
pub mod geo;
pub mod http;
pub mod overlay;
pub mod polyline;
pub mod pricing;
pub mod route;
pub mod traits;
pub mod workflow;
