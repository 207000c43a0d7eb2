//! Invoice model for ledger-service.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Invoice status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Draft,
    Final,
    Sent,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Draft => "draft",
            InvoiceStatus::Final => "final",
            InvoiceStatus::Sent => "sent",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "final" => InvoiceStatus::Final,
            "sent" => InvoiceStatus::Sent,
            _ => InvoiceStatus::Draft,
        }
    }

    /// Only finalized invoices may receive allocations.
    pub fn is_allocatable(&self) -> bool {
        matches!(self, InvoiceStatus::Final | InvoiceStatus::Sent)
    }
}

/// Invoice document. `total_amount` is immutable once the invoice is issued;
/// its outstanding balance is always derived from the allocation set, never
/// cached here.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Invoice {
    pub invoice_id: Uuid,
    pub company_id: Uuid,
    pub customer_id: Uuid,
    pub invoice_number: Option<String>,
    pub status: String,
    pub subtotal: Decimal,
    pub discount_amount: Decimal,
    pub tax_amount: Decimal,
    pub total_amount: Decimal,
    pub created_utc: DateTime<Utc>,
}

impl Invoice {
    pub fn status(&self) -> InvoiceStatus {
        InvoiceStatus::from_string(&self.status)
    }
}

/// Input for creating a draft invoice.
#[derive(Debug, Clone)]
pub struct CreateInvoice {
    pub company_id: Uuid,
    pub customer_id: Uuid,
    pub subtotal: Decimal,
    /// Discount value; interpretation depends on `discount_is_percent`.
    pub discount_value: Option<Decimal>,
    pub discount_is_percent: bool,
    pub tax_rate_id: Option<Uuid>,
}

/// Projection returned by the unpaid-invoice listing.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct UnpaidInvoice {
    pub invoice_id: Uuid,
    pub invoice_number: Option<String>,
    pub total_amount: Decimal,
    pub outstanding: Decimal,
}
