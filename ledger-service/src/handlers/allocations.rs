//! Allocation ledger handlers.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use service_core::error::AppError;
use uuid::Uuid;

use crate::{
    dtos::{AllocateRequest, AllocationResponse},
    middleware::CompanyContext,
    startup::AppState,
};

/// Apply part of a payment against an invoice.
pub async fn allocate(
    State(state): State<AppState>,
    company: CompanyContext,
    Path(payment_id): Path<Uuid>,
    Json(payload): Json<AllocateRequest>,
) -> Result<(StatusCode, Json<AllocationResponse>), AppError> {
    tracing::info!(
        company_id = %company.company_id,
        payment_id = %payment_id,
        invoice_id = %payload.invoice_id,
        amount = %payload.amount,
        "Allocating payment to invoice"
    );

    let allocation = state
        .db
        .allocate(
            company.company_id,
            payment_id,
            payload.invoice_id,
            payload.amount,
        )
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(AllocationResponse::from(allocation)),
    ))
}

/// Remove an allocation; the payment status is recomputed in the same unit
/// of work.
pub async fn remove_allocation(
    State(state): State<AppState>,
    company: CompanyContext,
    Path(allocation_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    tracing::info!(
        company_id = %company.company_id,
        allocation_id = %allocation_id,
        "Removing allocation"
    );

    state
        .db
        .remove_allocation(company.company_id, allocation_id)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}
