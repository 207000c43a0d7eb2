//! Request/response types for the HTTP surface.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Allocation, Payment, UnpaidInvoice};

#[derive(Debug, Deserialize)]
pub struct CreateCompanyRequest {
    pub name: String,
    pub invoice_prefix: String,
    pub payment_prefix: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateTaxRateRequest {
    pub name: String,
    pub rate_percent: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct CreateInvoiceRequest {
    pub customer_id: Uuid,
    pub subtotal: Decimal,
    pub discount_value: Option<Decimal>,
    #[serde(default)]
    pub discount_is_percent: bool,
    pub tax_rate_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct CreatePaymentRequest {
    pub customer_id: Uuid,
    pub net_amount: Decimal,
    pub withholding_tax_rate_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct PaymentResponse {
    pub payment_id: Uuid,
    pub payment_number: String,
    pub customer_id: Uuid,
    pub gross_amount: Decimal,
    pub net_amount: Decimal,
    pub withholding_amount: Decimal,
    pub status: String,
    pub created_utc: DateTime<Utc>,
}

impl From<Payment> for PaymentResponse {
    fn from(payment: Payment) -> Self {
        Self {
            payment_id: payment.payment_id,
            payment_number: payment.payment_number,
            customer_id: payment.customer_id,
            gross_amount: payment.gross_amount,
            net_amount: payment.net_amount,
            withholding_amount: payment.withholding_amount,
            status: payment.status,
            created_utc: payment.created_utc,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AllocateRequest {
    pub invoice_id: Uuid,
    pub amount: Decimal,
}

#[derive(Debug, Serialize)]
pub struct AllocationResponse {
    pub allocation_id: Uuid,
    pub payment_id: Uuid,
    pub invoice_id: Uuid,
    pub allocated_amount: Decimal,
}

impl From<Allocation> for AllocationResponse {
    fn from(alloc: Allocation) -> Self {
        Self {
            allocation_id: alloc.allocation_id,
            payment_id: alloc.payment_id,
            invoice_id: alloc.invoice_id,
            allocated_amount: alloc.allocated_amount,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    pub amount: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct UnpaidInvoicesQuery {
    pub customer_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct UnpaidInvoiceResponse {
    pub invoice_id: Uuid,
    pub invoice_number: Option<String>,
    pub total_amount: Decimal,
    pub outstanding: Decimal,
}

impl From<UnpaidInvoice> for UnpaidInvoiceResponse {
    fn from(row: UnpaidInvoice) -> Self {
        Self {
            invoice_id: row.invoice_id,
            invoice_number: row.invoice_number,
            total_amount: row.total_amount,
            outstanding: row.outstanding,
        }
    }
}
