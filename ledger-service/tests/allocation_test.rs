//! Allocation ledger integration tests over the in-memory model.

mod common;

use common::MemLedger;
use ledger_service::models::{InvoiceStatus, PaymentStatus};
use rust_decimal_macros::dec;
use service_core::error::AppError;
use uuid::Uuid;

#[test]
fn allocating_to_draft_invoice_is_rejected() {
    let mut ledger = MemLedger::new();
    let invoice = ledger.add_invoice(dec!(500), InvoiceStatus::Draft);
    let payment = ledger.add_payment_from_net(dec!(500), dec!(0)).unwrap();

    let err = ledger.allocate(payment, invoice, dec!(100)).unwrap_err();
    assert!(matches!(err, AppError::InvalidState(_)));
    ledger.assert_invariants();
}

#[test]
fn allocating_more_than_outstanding_is_rejected() {
    let mut ledger = MemLedger::new();
    let invoice = ledger.add_invoice(dec!(500), InvoiceStatus::Final);
    let payment = ledger.add_payment_from_net(dec!(1000), dec!(0)).unwrap();

    let err = ledger.allocate(payment, invoice, dec!(600)).unwrap_err();
    assert!(matches!(err, AppError::Overallocation(_)));
    assert!(err.to_string().contains("invoice outstanding"));
    ledger.assert_invariants();
}

#[test]
fn allocating_from_exhausted_payment_is_rejected() {
    let mut ledger = MemLedger::new();
    let first = ledger.add_invoice(dec!(500), InvoiceStatus::Final);
    let second = ledger.add_invoice(dec!(500), InvoiceStatus::Final);
    let payment = ledger.add_payment_from_net(dec!(500), dec!(0)).unwrap();

    ledger.allocate(payment, first, dec!(500)).unwrap();
    assert_eq!(ledger.payment_status(payment), PaymentStatus::Allocated);

    let err = ledger.allocate(payment, second, dec!(1)).unwrap_err();
    assert!(matches!(err, AppError::Exhausted(_)));
    ledger.assert_invariants();
}

#[test]
fn unknown_payment_and_invoice_surface_not_found() {
    let mut ledger = MemLedger::new();
    let invoice = ledger.add_invoice(dec!(500), InvoiceStatus::Final);
    let payment = ledger.add_payment_from_net(dec!(500), dec!(0)).unwrap();

    let err = ledger
        .allocate(Uuid::new_v4(), invoice, dec!(100))
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));

    let err = ledger
        .allocate(payment, Uuid::new_v4(), dec!(100))
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[test]
fn non_positive_amount_is_rejected_before_lookups() {
    let mut ledger = MemLedger::new();
    // Ids do not exist; the amount check still wins.
    let err = ledger
        .allocate(Uuid::new_v4(), Uuid::new_v4(), dec!(0))
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
}

#[test]
fn partial_allocation_walks_the_status_machine() {
    let mut ledger = MemLedger::new();
    let invoice = ledger.add_invoice(dec!(1000), InvoiceStatus::Sent);
    let payment = ledger.add_payment_from_net(dec!(600), dec!(0)).unwrap();

    assert_eq!(ledger.payment_status(payment), PaymentStatus::Unallocated);

    ledger.allocate(payment, invoice, dec!(200)).unwrap();
    assert_eq!(
        ledger.payment_status(payment),
        PaymentStatus::PartiallyAllocated
    );
    ledger.assert_invariants();

    ledger.allocate(payment, invoice, dec!(400)).unwrap();
    assert_eq!(ledger.payment_status(payment), PaymentStatus::Allocated);
    assert_eq!(ledger.remaining(payment), dec!(0));
    assert_eq!(ledger.outstanding(invoice), dec!(400));
    ledger.assert_invariants();
}

#[test]
fn removal_reverses_status_transitions() {
    let mut ledger = MemLedger::new();
    let invoice = ledger.add_invoice(dec!(1000), InvoiceStatus::Final);
    let payment = ledger.add_payment_from_net(dec!(500), dec!(0)).unwrap();

    let alloc = ledger.allocate(payment, invoice, dec!(500)).unwrap();
    assert_eq!(ledger.payment_status(payment), PaymentStatus::Allocated);

    ledger.remove_allocation(alloc).unwrap();
    assert_eq!(ledger.payment_status(payment), PaymentStatus::Unallocated);
    assert_eq!(ledger.outstanding(invoice), dec!(1000));
    ledger.assert_invariants();
}

#[test]
fn removing_twice_is_not_found_and_never_double_decrements() {
    let mut ledger = MemLedger::new();
    let invoice = ledger.add_invoice(dec!(1000), InvoiceStatus::Final);
    let payment = ledger.add_payment_from_net(dec!(800), dec!(0)).unwrap();

    let keep = ledger.allocate(payment, invoice, dec!(300)).unwrap();
    let drop = ledger.allocate(payment, invoice, dec!(200)).unwrap();

    ledger.remove_allocation(drop).unwrap();
    let err = ledger.remove_allocation(drop).unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));

    // The surviving allocation is untouched.
    assert_eq!(ledger.allocated_for_payment(payment), dec!(300));
    assert_eq!(ledger.outstanding(invoice), dec!(700));
    let _ = keep;
    ledger.assert_invariants();
}

#[test]
fn conservation_holds_across_mixed_sequences() {
    let mut ledger = MemLedger::new();
    let invoice_a = ledger.add_invoice(dec!(750), InvoiceStatus::Final);
    let invoice_b = ledger.add_invoice(dec!(250), InvoiceStatus::Sent);
    let payment = ledger.add_payment_from_net(dec!(900), dec!(10)).unwrap();

    // gross = 900 / 0.9 = 1000
    assert_eq!(ledger.remaining(payment), dec!(1000.00));

    let steps: Vec<(Uuid, rust_decimal::Decimal)> = vec![
        (invoice_a, dec!(300)),
        (invoice_b, dec!(250)),
        (invoice_a, dec!(450)),
    ];
    let mut created = Vec::new();
    for (invoice, amount) in steps {
        created.push(ledger.allocate(payment, invoice, amount).unwrap());
        ledger.assert_invariants();
    }

    assert_eq!(ledger.payment_status(payment), PaymentStatus::Allocated);
    assert_eq!(ledger.outstanding(invoice_a), dec!(0));
    assert_eq!(ledger.outstanding(invoice_b), dec!(0));

    for allocation in created {
        ledger.remove_allocation(allocation).unwrap();
        ledger.assert_invariants();
    }
    assert_eq!(ledger.payment_status(payment), PaymentStatus::Unallocated);
}

/// Invoice of 1000 paid by two payments of gross 600 and 500: the invoice
/// closes out and the second payment keeps 100 remaining.
#[test]
fn two_payments_settle_one_invoice() {
    let mut ledger = MemLedger::new();
    let invoice = ledger.add_invoice(dec!(1000), InvoiceStatus::Final);
    let first = ledger.add_payment_from_net(dec!(600), dec!(0)).unwrap();
    let second = ledger.add_payment_from_net(dec!(500), dec!(0)).unwrap();

    ledger.allocate(first, invoice, dec!(600)).unwrap();
    ledger.allocate(second, invoice, dec!(400)).unwrap();

    assert_eq!(ledger.outstanding(invoice), dec!(0));
    assert_eq!(ledger.remaining(second), dec!(100));
    assert_eq!(
        ledger.payment_status(second),
        PaymentStatus::PartiallyAllocated
    );
    assert_eq!(ledger.payment_status(first), PaymentStatus::Allocated);
    ledger.assert_invariants();
}

/// Withholding is treated as paid from the invoice's perspective: the full
/// gross amount allocates against the invoice balance.
#[test]
fn gross_amount_reduces_invoice_outstanding() {
    let mut ledger = MemLedger::new();
    let invoice = ledger.add_invoice(dec!(1111.11), InvoiceStatus::Final);
    let payment = ledger.add_payment_from_net(dec!(1000), dec!(10)).unwrap();

    ledger.allocate(payment, invoice, dec!(1111.11)).unwrap();

    assert_eq!(ledger.outstanding(invoice), dec!(0));
    assert_eq!(ledger.payment_status(payment), PaymentStatus::Allocated);
    ledger.assert_invariants();
}

/// A net amount far past what the money columns can store must come back as
/// a validation error, not blow up inside the gross back-calculation.
#[test]
fn absurd_net_amount_is_rejected_not_panicking() {
    let mut ledger = MemLedger::new();

    let err = ledger
        .add_payment_from_net(dec!(79000000000000000000000000), dec!(99.99))
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
    assert!(ledger.payments.is_empty());
}
