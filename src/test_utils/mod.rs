//! Test utilities.
//!
//! - Test data factories for accounts, subscriptions, invoices and webhook payloads
//! - In-memory repository implementations and a fake payment provider
//! - A builder that wires an `AppState` over those mocks for route tests

mod app_state_builder;
mod billing_mocks;
mod factories;

pub use app_state_builder::*;
pub use billing_mocks::*;
pub use factories::*;
