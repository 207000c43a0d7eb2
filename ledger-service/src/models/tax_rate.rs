//! Tax rate model for ledger-service.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Tax rate configuration. Read-only to the ledger core; referenced by id
/// from invoices (sales tax) and payments (withholding).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TaxRate {
    pub tax_rate_id: Uuid,
    pub company_id: Uuid,
    pub name: String,
    pub rate_percent: Decimal,
    pub active: bool,
    pub created_utc: DateTime<Utc>,
}

/// Input for creating a tax rate.
#[derive(Debug, Clone)]
pub struct CreateTaxRate {
    pub company_id: Uuid,
    pub name: String,
    pub rate_percent: Decimal,
}
