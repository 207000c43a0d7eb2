//! Payment model for ledger-service.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Allocation status of a payment.
///
/// Stored on the payment row for fast list reads, but it is a materialized
/// view: the authoritative value is always `recompute` over the fresh
/// allocation sum, and the stored field is rewritten inside every allocation
/// transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Unallocated,
    PartiallyAllocated,
    Allocated,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Unallocated => "unallocated",
            PaymentStatus::PartiallyAllocated => "partially_allocated",
            PaymentStatus::Allocated => "allocated",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "partially_allocated" => PaymentStatus::PartiallyAllocated,
            "allocated" => PaymentStatus::Allocated,
            _ => PaymentStatus::Unallocated,
        }
    }

    /// Derive the status from the allocation aggregate.
    pub fn recompute(allocated_total: Decimal, gross_amount: Decimal) -> Self {
        if allocated_total <= Decimal::ZERO {
            PaymentStatus::Unallocated
        } else if allocated_total >= gross_amount {
            PaymentStatus::Allocated
        } else {
            PaymentStatus::PartiallyAllocated
        }
    }
}

/// Payment document. Invariant: `gross_amount = net_amount + withholding_amount`.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Payment {
    pub payment_id: Uuid,
    pub company_id: Uuid,
    pub customer_id: Uuid,
    pub payment_number: String,
    pub gross_amount: Decimal,
    pub net_amount: Decimal,
    pub withholding_amount: Decimal,
    pub status: String,
    pub created_utc: DateTime<Utc>,
}

impl Payment {
    pub fn status(&self) -> PaymentStatus {
        PaymentStatus::from_string(&self.status)
    }
}

/// Input for creating a payment.
#[derive(Debug, Clone)]
pub struct CreatePayment {
    pub company_id: Uuid,
    pub customer_id: Uuid,
    /// Cash actually received; the gross/withholding split is back-calculated
    /// from this and the withholding tax rate.
    pub net_amount: Decimal,
    pub withholding_tax_rate_id: Option<Uuid>,
}
