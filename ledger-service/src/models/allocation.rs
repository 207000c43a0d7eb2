//! Allocation model for ledger-service.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A record applying part of a payment's gross amount against an invoice.
/// Immutable once created; removed whole, never edited.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Allocation {
    pub allocation_id: Uuid,
    pub company_id: Uuid,
    pub payment_id: Uuid,
    pub invoice_id: Uuid,
    pub allocated_amount: Decimal,
    pub created_utc: DateTime<Utc>,
}
