//! Test fixtures for checkout-geo.
//!
//! Provides:
//! - Real Palmas (TO) locations
//! - In-memory fakes for every collaborator trait
//! - A workflow builder wired to those fakes

#![allow(dead_code)]

pub mod fakes;
pub mod palmas_locations;

pub use fakes::*;
pub use palmas_locations::*;
