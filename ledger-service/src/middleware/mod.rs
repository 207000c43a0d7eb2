//! Middleware for ledger-service.

mod company;

pub use company::CompanyContext;
