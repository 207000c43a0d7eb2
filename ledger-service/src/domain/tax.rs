//! Tax calculator: withholding back-calculation, discounts, sales tax.

use rust_decimal::{Decimal, RoundingStrategy};
use service_core::error::AppError;

/// Round to 2 decimal places, half-up.
pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Largest amount the NUMERIC(18,2) money columns can hold.
fn max_amount() -> Decimal {
    Decimal::from_i128_with_scale(999_999_999_999_999_999, 2)
}

/// Amounts arrive unbounded from the wire; reject anything the schema could
/// not store before it reaches the arithmetic.
fn ensure_in_range(label: &str, amount: Decimal) -> Result<(), AppError> {
    if amount.abs() > max_amount() {
        return Err(AppError::Validation(anyhow::anyhow!(
            "{} exceeds the supported amount range, got {}",
            label,
            amount
        )));
    }
    Ok(())
}

/// Gross/withholding split of a payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WithholdingSplit {
    pub gross: Decimal,
    pub withholding: Decimal,
}

/// Back-calculate the gross amount from the net cash received.
///
/// For a rate in (0, 100): `gross = net / (1 - rate/100)`, withholding is the
/// difference. Rate 0 (or absent, handled by the caller) means no
/// withholding. A rate of 100 or more would imply an infinite or negative
/// gross and is rejected. Negative net is clamped to zero.
pub fn withholding_split(net: Decimal, rate_percent: Decimal) -> Result<WithholdingSplit, AppError> {
    if rate_percent >= Decimal::ONE_HUNDRED {
        return Err(AppError::Validation(anyhow::anyhow!(
            "Withholding rate must be below 100%, got {}",
            rate_percent
        )));
    }

    ensure_in_range("Net amount", net)?;

    let net = round_money(net.max(Decimal::ZERO));
    if rate_percent <= Decimal::ZERO {
        return Ok(WithholdingSplit {
            gross: net,
            withholding: Decimal::ZERO,
        });
    }

    // A rate close enough to 100 blows the gross past what the schema can
    // store even for an in-range net.
    let keep_fraction = Decimal::ONE - rate_percent / Decimal::ONE_HUNDRED;
    let gross = net
        .checked_div(keep_fraction)
        .map(round_money)
        .filter(|gross| gross.abs() <= max_amount())
        .ok_or_else(|| {
            AppError::Validation(anyhow::anyhow!(
                "Gross amount out of range for net {} at rate {}%",
                net,
                rate_percent
            ))
        })?;
    Ok(WithholdingSplit {
        gross,
        withholding: gross - net,
    })
}

/// Discount interpretation for [`apply_discount`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscountKind {
    Percentage,
    Amount,
}

/// Apply a discount to a subtotal. The result never goes below zero.
pub fn apply_discount(
    subtotal: Decimal,
    value: Decimal,
    kind: DiscountKind,
) -> Result<Decimal, AppError> {
    let discount = match kind {
        DiscountKind::Percentage => subtotal
            .checked_mul(value)
            .map(|product| product / Decimal::ONE_HUNDRED)
            .ok_or_else(|| {
                AppError::Validation(anyhow::anyhow!(
                    "Discount of {}% on {} is out of range",
                    value,
                    subtotal
                ))
            })?,
        DiscountKind::Amount => value,
    };
    Ok(round_money((subtotal - discount).max(Decimal::ZERO)))
}

/// Sales tax applied to a discounted subtotal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SalesTax {
    pub tax_amount: Decimal,
    pub total: Decimal,
}

pub fn apply_sales_tax(
    discounted_subtotal: Decimal,
    rate_percent: Decimal,
) -> Result<SalesTax, AppError> {
    let tax_amount = discounted_subtotal
        .checked_mul(rate_percent)
        .map(|product| round_money(product / Decimal::ONE_HUNDRED))
        .ok_or_else(|| {
            AppError::Validation(anyhow::anyhow!(
                "Sales tax of {}% on {} is out of range",
                rate_percent,
                discounted_subtotal
            ))
        })?;
    Ok(SalesTax {
        tax_amount,
        total: discounted_subtotal + tax_amount,
    })
}

/// Composed invoice totals: discount, then sales tax.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvoiceTotals {
    pub subtotal: Decimal,
    pub discount_amount: Decimal,
    pub tax_amount: Decimal,
    pub total_amount: Decimal,
}

pub fn invoice_totals(
    subtotal: Decimal,
    discount_value: Option<Decimal>,
    discount_is_percent: bool,
    sales_tax_percent: Option<Decimal>,
) -> Result<InvoiceTotals, AppError> {
    ensure_in_range("Subtotal", subtotal)?;

    let subtotal = round_money(subtotal.max(Decimal::ZERO));
    let discounted = match discount_value {
        Some(value) => {
            let kind = if discount_is_percent {
                DiscountKind::Percentage
            } else {
                DiscountKind::Amount
            };
            apply_discount(subtotal, value, kind)?
        }
        None => subtotal,
    };
    let sales = apply_sales_tax(discounted, sales_tax_percent.unwrap_or(Decimal::ZERO))?;
    Ok(InvoiceTotals {
        subtotal,
        discount_amount: subtotal - discounted,
        tax_amount: sales.tax_amount,
        total_amount: sales.total,
    })
}
