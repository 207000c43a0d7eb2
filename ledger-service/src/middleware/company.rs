//! Company (tenant) context for multi-tenant scoping.
//!
//! Every handler receives the caller's company through this extractor and
//! passes it down to the store; no query runs unscoped. The header is set by
//! the authenticating front layer after validating membership.

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use service_core::error::AppError;
use uuid::Uuid;

/// Company scope extracted from the `X-Company-ID` header.
#[derive(Debug, Clone, Copy)]
pub struct CompanyContext {
    pub company_id: Uuid,
}

#[async_trait]
impl<S> FromRequestParts<S> for CompanyContext
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get("X-Company-ID")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| {
                AppError::Unauthorized(anyhow::anyhow!("Missing X-Company-ID header"))
            })?;

        let company_id = Uuid::parse_str(raw).map_err(|_| {
            AppError::Unauthorized(anyhow::anyhow!("Malformed X-Company-ID header"))
        })?;

        Ok(CompanyContext { company_id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    async fn extract(request: Request<()>) -> Result<CompanyContext, AppError> {
        let (mut parts, _) = request.into_parts();
        CompanyContext::from_request_parts(&mut parts, &()).await
    }

    #[tokio::test]
    async fn parses_company_header() {
        let company_id = Uuid::new_v4();
        let request = Request::builder()
            .header("X-Company-ID", company_id.to_string())
            .body(())
            .unwrap();

        let ctx = extract(request).await.unwrap();
        assert_eq!(ctx.company_id, company_id);
    }

    #[tokio::test]
    async fn missing_header_is_unauthorized() {
        let request = Request::builder().body(()).unwrap();
        assert!(matches!(
            extract(request).await,
            Err(AppError::Unauthorized(_))
        ));
    }

    #[tokio::test]
    async fn malformed_header_is_unauthorized() {
        let request = Request::builder()
            .header("X-Company-ID", "not-a-uuid")
            .body(())
            .unwrap();
        assert!(matches!(
            extract(request).await,
            Err(AppError::Unauthorized(_))
        ));
    }
}
