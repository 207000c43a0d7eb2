//! Invoice balance handlers.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use service_core::error::AppError;
use uuid::Uuid;

use crate::{
    dtos::{BalanceResponse, CreateInvoiceRequest, UnpaidInvoiceResponse, UnpaidInvoicesQuery},
    middleware::CompanyContext,
    models::{CreateInvoice, Invoice},
    startup::AppState,
};

/// Create a draft invoice; totals come from the tax calculator.
pub async fn create_invoice(
    State(state): State<AppState>,
    company: CompanyContext,
    Json(payload): Json<CreateInvoiceRequest>,
) -> Result<(StatusCode, Json<Invoice>), AppError> {
    tracing::info!(
        company_id = %company.company_id,
        customer_id = %payload.customer_id,
        subtotal = %payload.subtotal,
        "Creating draft invoice"
    );

    let invoice = state
        .db
        .create_invoice(&CreateInvoice {
            company_id: company.company_id,
            customer_id: payload.customer_id,
            subtotal: payload.subtotal,
            discount_value: payload.discount_value,
            discount_is_percent: payload.discount_is_percent,
            tax_rate_id: payload.tax_rate_id,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(invoice)))
}

/// Issue a draft invoice: assign its number and finalize it.
pub async fn issue_invoice(
    State(state): State<AppState>,
    company: CompanyContext,
    Path(invoice_id): Path<Uuid>,
) -> Result<Json<Invoice>, AppError> {
    let invoice = state
        .db
        .issue_invoice(company.company_id, invoice_id)
        .await?;

    Ok(Json(invoice))
}

/// Mark a finalized invoice as sent.
pub async fn send_invoice(
    State(state): State<AppState>,
    company: CompanyContext,
    Path(invoice_id): Path<Uuid>,
) -> Result<Json<Invoice>, AppError> {
    let invoice = state
        .db
        .mark_invoice_sent(company.company_id, invoice_id)
        .await?;

    Ok(Json(invoice))
}

/// Get an invoice by ID.
pub async fn get_invoice(
    State(state): State<AppState>,
    company: CompanyContext,
    Path(invoice_id): Path<Uuid>,
) -> Result<Json<Invoice>, AppError> {
    let invoice = state
        .db
        .get_invoice(company.company_id, invoice_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Invoice not found")))?;

    Ok(Json(invoice))
}

/// Outstanding balance of an invoice, derived from the allocation set.
pub async fn get_outstanding(
    State(state): State<AppState>,
    company: CompanyContext,
    Path(invoice_id): Path<Uuid>,
) -> Result<Json<BalanceResponse>, AppError> {
    let amount = state
        .db
        .invoice_outstanding(company.company_id, invoice_id)
        .await?;

    Ok(Json(BalanceResponse { amount }))
}

/// List a customer's invoices that still carry an outstanding balance.
pub async fn list_unpaid_invoices(
    State(state): State<AppState>,
    company: CompanyContext,
    Query(query): Query<UnpaidInvoicesQuery>,
) -> Result<Json<Vec<UnpaidInvoiceResponse>>, AppError> {
    let invoices = state
        .db
        .list_unpaid_invoices(company.company_id, query.customer_id)
        .await?;

    Ok(Json(
        invoices.into_iter().map(UnpaidInvoiceResponse::from).collect(),
    ))
}
