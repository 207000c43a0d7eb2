//! Allocation precondition chain.
//!
//! The checks run in a fixed order and the first failure wins, so a caller
//! always sees the most specific reason their request was rejected.

use rust_decimal::Decimal;
use service_core::error::AppError;

use crate::models::InvoiceStatus;

/// Amount must be strictly positive. Checked before any lookup.
pub fn validate_amount(amount: Decimal) -> Result<(), AppError> {
    if amount <= Decimal::ZERO {
        return Err(AppError::Validation(anyhow::anyhow!(
            "Allocation amount must be positive, got {}",
            amount
        )));
    }
    Ok(())
}

/// Balances and invoice state gathered fresh inside the allocating
/// transaction, after the payment and invoice rows are locked.
#[derive(Debug, Clone, Copy)]
pub struct AllocationCheck {
    pub invoice_status: InvoiceStatus,
    pub invoice_outstanding: Decimal,
    pub payment_remaining: Decimal,
}

/// Validate an allocation against the conservation invariants.
///
/// Assumes `validate_amount` passed and both rows exist under the caller's
/// company; those failures surface earlier as `Validation` / `NotFound`.
pub fn validate_allocation(amount: Decimal, check: AllocationCheck) -> Result<(), AppError> {
    if !check.invoice_status.is_allocatable() {
        return Err(AppError::InvalidState(anyhow::anyhow!(
            "Invoice is not finalized; only final or sent invoices can receive payments"
        )));
    }
    if check.payment_remaining <= Decimal::ZERO {
        return Err(AppError::Exhausted(anyhow::anyhow!(
            "Payment is already fully allocated"
        )));
    }
    if amount > check.payment_remaining {
        return Err(AppError::Overallocation(anyhow::anyhow!(
            "Amount {} exceeds payment remaining {}",
            amount,
            check.payment_remaining
        )));
    }
    if amount > check.invoice_outstanding {
        return Err(AppError::Overallocation(anyhow::anyhow!(
            "Amount {} exceeds invoice outstanding {}",
            amount,
            check.invoice_outstanding
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn check(status: InvoiceStatus, outstanding: Decimal, remaining: Decimal) -> AllocationCheck {
        AllocationCheck {
            invoice_status: status,
            invoice_outstanding: outstanding,
            payment_remaining: remaining,
        }
    }

    #[test]
    fn rejects_non_positive_amounts() {
        assert!(matches!(
            validate_amount(dec!(0)),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            validate_amount(dec!(-5)),
            Err(AppError::Validation(_))
        ));
        assert!(validate_amount(dec!(0.01)).is_ok());
    }

    #[test]
    fn rejects_draft_invoice() {
        let err = validate_allocation(
            dec!(100),
            check(InvoiceStatus::Draft, dec!(500), dec!(500)),
        )
        .unwrap_err();
        assert!(matches!(err, AppError::InvalidState(_)));
    }

    #[test]
    fn rejects_exhausted_payment_before_overallocation() {
        // Remaining of zero surfaces Exhausted, not Overallocation.
        let err = validate_allocation(
            dec!(100),
            check(InvoiceStatus::Final, dec!(500), dec!(0)),
        )
        .unwrap_err();
        assert!(matches!(err, AppError::Exhausted(_)));
    }

    #[test]
    fn rejects_payment_overallocation_before_invoice() {
        // Both sides would overflow; the payment check runs first.
        let err = validate_allocation(
            dec!(600),
            check(InvoiceStatus::Final, dec!(500), dec!(550)),
        )
        .unwrap_err();
        assert!(err.to_string().contains("payment remaining"));
    }

    #[test]
    fn rejects_invoice_overallocation() {
        let err = validate_allocation(
            dec!(600),
            check(InvoiceStatus::Sent, dec!(500), dec!(1000)),
        )
        .unwrap_err();
        assert!(err.to_string().contains("invoice outstanding"));
    }

    #[test]
    fn accepts_exact_remainder() {
        assert!(validate_allocation(
            dec!(500),
            check(InvoiceStatus::Final, dec!(500), dec!(500)),
        )
        .is_ok());
    }
}
