//! Pure ledger logic: no I/O, no clocks, no persistence.
//!
//! The store (`services::database`) orchestrates these functions inside its
//! transactions; keeping them pure lets every invariant be tested without a
//! database.

pub mod allocation;
pub mod balance;
pub mod numbering;
pub mod tax;
