//! HTTP handlers for ledger-service.

mod allocations;
mod companies;
mod invoices;
mod payments;

pub use allocations::{allocate, remove_allocation};
pub use companies::{create_company, create_tax_rate, get_tax_rate, list_tax_rates};
pub use invoices::{
    create_invoice, get_invoice, get_outstanding, issue_invoice, list_unpaid_invoices,
    send_invoice,
};
pub use payments::{create_payment, get_payment, get_remaining};
