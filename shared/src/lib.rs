//! Shared types and workflow rules for the Timber&Grain platform
//!
//! This crate contains the domain model and the pure decision logic used by
//! the backend, the in-browser helpers (via WASM), and the test-suite.

pub mod error;
pub mod models;
pub mod pricing;
pub mod stock;
pub mod types;
pub mod validation;
pub mod workflow;

pub use error::*;
pub use models::*;
pub use types::*;
pub use validation::*;
pub use workflow::*;
