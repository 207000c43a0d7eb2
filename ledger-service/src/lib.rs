//! ledger-service: the financial ledger core of the billing platform.
//!
//! Sequential document numbering, withholding/sales-tax arithmetic, and the
//! payment-to-invoice allocation ledger, scoped per company.

pub mod config;
pub mod domain;
pub mod dtos;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod startup;

pub use startup::Application;
