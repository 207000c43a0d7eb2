//! Sequential document-number formatting and parsing.
//!
//! Numbers look like `INV-000042`. The store issues them from the per-company
//! counter inside the document-insert transaction; the scan path exists to
//! seed a counter from pre-existing rows.

/// Zero-pad width for invoice numbers.
pub const INVOICE_NUMBER_WIDTH: usize = 6;
/// Zero-pad width for payment numbers.
pub const PAYMENT_NUMBER_WIDTH: usize = 5;

/// Format `{prefix}-{counter}` with the given zero-pad width.
pub fn format_number(prefix: &str, counter: i64, width: usize) -> String {
    format!("{}-{:0width$}", prefix, counter, width = width)
}

/// Parse a document number back to its counter value.
///
/// Accepts `{prefix}-{digits}` with a case-insensitive prefix match; anything
/// else (foreign prefixes, manual numbers) yields `None` and is ignored by
/// the scan.
pub fn parse_number(prefix: &str, number: &str) -> Option<i64> {
    let head = number.get(..prefix.len())?;
    if !head.eq_ignore_ascii_case(prefix) {
        return None;
    }
    let digits = number.get(prefix.len()..)?.strip_prefix('-')?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Scan-based strategy: next counter is one past the highest parsed number.
/// An empty (or entirely foreign) set starts the sequence at 1.
pub fn next_from_scan<'a, I>(prefix: &str, existing: I) -> i64
where
    I: IntoIterator<Item = &'a str>,
{
    existing
        .into_iter()
        .filter_map(|number| parse_number(prefix, number))
        .max()
        .map_or(1, |max| max + 1)
}
