//! Payment handlers.
//!
//! All operations are scoped to the company from the request context.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use service_core::error::AppError;
use uuid::Uuid;

use crate::{
    dtos::{BalanceResponse, CreatePaymentRequest, PaymentResponse},
    middleware::CompanyContext,
    models::CreatePayment,
    startup::AppState,
};

/// Create a payment: withholding split, next payment number, status
/// `unallocated`.
pub async fn create_payment(
    State(state): State<AppState>,
    company: CompanyContext,
    Json(payload): Json<CreatePaymentRequest>,
) -> Result<(StatusCode, Json<PaymentResponse>), AppError> {
    tracing::info!(
        company_id = %company.company_id,
        customer_id = %payload.customer_id,
        net_amount = %payload.net_amount,
        "Creating payment"
    );

    let payment = state
        .db
        .create_payment(&CreatePayment {
            company_id: company.company_id,
            customer_id: payload.customer_id,
            net_amount: payload.net_amount,
            withholding_tax_rate_id: payload.withholding_tax_rate_id,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(PaymentResponse::from(payment))))
}

/// Get a payment by ID.
pub async fn get_payment(
    State(state): State<AppState>,
    company: CompanyContext,
    Path(payment_id): Path<Uuid>,
) -> Result<Json<PaymentResponse>, AppError> {
    let payment = state
        .db
        .get_payment(company.company_id, payment_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Payment not found")))?;

    Ok(Json(PaymentResponse::from(payment)))
}

/// Unallocated remainder of a payment's gross amount.
pub async fn get_remaining(
    State(state): State<AppState>,
    company: CompanyContext,
    Path(payment_id): Path<Uuid>,
) -> Result<Json<BalanceResponse>, AppError> {
    let amount = state
        .db
        .payment_remaining(company.company_id, payment_id)
        .await?;

    Ok(Json(BalanceResponse { amount }))
}
