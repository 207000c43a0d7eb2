//! Company model for ledger-service.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Company (tenant). Owns the two document-number sequences.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Company {
    pub company_id: Uuid,
    pub name: String,
    pub invoice_prefix: String,
    /// NULL until seeded from a scan of existing invoice numbers.
    pub invoice_next_number: Option<i64>,
    pub payment_prefix: String,
    pub payment_next_number: i64,
    pub created_utc: DateTime<Utc>,
}

/// Input for creating a company.
#[derive(Debug, Clone)]
pub struct CreateCompany {
    pub name: String,
    pub invoice_prefix: String,
    pub payment_prefix: String,
}
