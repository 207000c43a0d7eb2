//! Company and tax-rate administration handlers.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use service_core::error::AppError;
use uuid::Uuid;

use crate::{
    dtos::{CreateCompanyRequest, CreateTaxRateRequest},
    middleware::CompanyContext,
    models::{Company, CreateCompany, CreateTaxRate, TaxRate},
    startup::AppState,
};

/// Register a company with fresh numbering sequences. Not company-scoped:
/// this is the bootstrap call that creates the scope itself.
pub async fn create_company(
    State(state): State<AppState>,
    Json(payload): Json<CreateCompanyRequest>,
) -> Result<(StatusCode, Json<Company>), AppError> {
    let company = state
        .db
        .create_company(&CreateCompany {
            name: payload.name,
            invoice_prefix: payload.invoice_prefix,
            payment_prefix: payload.payment_prefix,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(company)))
}

/// Create a tax rate under the caller's company.
pub async fn create_tax_rate(
    State(state): State<AppState>,
    company: CompanyContext,
    Json(payload): Json<CreateTaxRateRequest>,
) -> Result<(StatusCode, Json<TaxRate>), AppError> {
    let tax_rate = state
        .db
        .create_tax_rate(&CreateTaxRate {
            company_id: company.company_id,
            name: payload.name,
            rate_percent: payload.rate_percent,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(tax_rate)))
}

/// List the company's active tax rates.
pub async fn list_tax_rates(
    State(state): State<AppState>,
    company: CompanyContext,
) -> Result<Json<Vec<TaxRate>>, AppError> {
    let tax_rates = state.db.list_tax_rates(company.company_id).await?;
    Ok(Json(tax_rates))
}

/// Get a tax rate by ID.
pub async fn get_tax_rate(
    State(state): State<AppState>,
    company: CompanyContext,
    Path(tax_rate_id): Path<Uuid>,
) -> Result<Json<TaxRate>, AppError> {
    let tax_rate = state
        .db
        .get_tax_rate(company.company_id, tax_rate_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Tax rate not found")))?;

    Ok(Json(tax_rate))
}
