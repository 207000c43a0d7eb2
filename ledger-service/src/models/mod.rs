//! Domain models for ledger-service.

mod allocation;
mod company;
mod invoice;
mod payment;
mod tax_rate;

pub use allocation::Allocation;
pub use company::{Company, CreateCompany};
pub use invoice::{CreateInvoice, Invoice, InvoiceStatus, UnpaidInvoice};
pub use payment::{CreatePayment, Payment, PaymentStatus};
pub use tax_rate::{CreateTaxRate, TaxRate};
