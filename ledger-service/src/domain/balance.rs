//! Balance resolver arithmetic.
//!
//! The store feeds these with aggregates taken fresh inside the mutating
//! transaction; they are never computed from the cached payment status.

use rust_decimal::Decimal;

/// Unpaid portion of an invoice's total. Never negative.
pub fn invoice_outstanding(total_amount: Decimal, allocated_total: Decimal) -> Decimal {
    (total_amount - allocated_total).max(Decimal::ZERO)
}

/// Unallocated portion of a payment's gross amount. Never negative.
pub fn payment_remaining(gross_amount: Decimal, allocated_total: Decimal) -> Decimal {
    (gross_amount - allocated_total).max(Decimal::ZERO)
}
