//! In-memory ledger model for integration tests.
//!
//! Mirrors the store's orchestration (lookup order, fresh aggregates, status
//! recompute) over the same pure domain functions, so the invariants can be
//! exercised without a database.

#![allow(dead_code)]

use std::collections::HashMap;

use rust_decimal::Decimal;
use service_core::error::AppError;
use uuid::Uuid;

use ledger_service::domain::allocation::{validate_allocation, validate_amount, AllocationCheck};
use ledger_service::domain::{balance, tax};
use ledger_service::models::{InvoiceStatus, PaymentStatus};

#[derive(Debug, Clone)]
pub struct MemInvoice {
    pub invoice_id: Uuid,
    pub status: InvoiceStatus,
    pub total_amount: Decimal,
}

#[derive(Debug, Clone)]
pub struct MemPayment {
    pub payment_id: Uuid,
    pub gross_amount: Decimal,
    pub withholding_amount: Decimal,
    pub status: PaymentStatus,
}

#[derive(Debug, Clone)]
pub struct MemAllocation {
    pub allocation_id: Uuid,
    pub payment_id: Uuid,
    pub invoice_id: Uuid,
    pub allocated_amount: Decimal,
}

#[derive(Debug, Default)]
pub struct MemLedger {
    pub invoices: HashMap<Uuid, MemInvoice>,
    pub payments: HashMap<Uuid, MemPayment>,
    pub allocations: Vec<MemAllocation>,
}

impl MemLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_invoice(&mut self, total_amount: Decimal, status: InvoiceStatus) -> Uuid {
        let invoice_id = Uuid::new_v4();
        self.invoices.insert(
            invoice_id,
            MemInvoice {
                invoice_id,
                status,
                total_amount,
            },
        );
        invoice_id
    }

    /// Create a payment from the net cash received, the way the store does:
    /// gross/withholding via the tax calculator, status starts unallocated.
    pub fn add_payment_from_net(
        &mut self,
        net_amount: Decimal,
        withholding_rate: Decimal,
    ) -> Result<Uuid, AppError> {
        let split = tax::withholding_split(net_amount, withholding_rate)?;
        let payment_id = Uuid::new_v4();
        self.payments.insert(
            payment_id,
            MemPayment {
                payment_id,
                gross_amount: split.gross,
                withholding_amount: split.withholding,
                status: PaymentStatus::Unallocated,
            },
        );
        Ok(payment_id)
    }

    pub fn allocated_for_payment(&self, payment_id: Uuid) -> Decimal {
        self.allocations
            .iter()
            .filter(|a| a.payment_id == payment_id)
            .map(|a| a.allocated_amount)
            .sum()
    }

    pub fn allocated_for_invoice(&self, invoice_id: Uuid) -> Decimal {
        self.allocations
            .iter()
            .filter(|a| a.invoice_id == invoice_id)
            .map(|a| a.allocated_amount)
            .sum()
    }

    pub fn remaining(&self, payment_id: Uuid) -> Decimal {
        let payment = &self.payments[&payment_id];
        balance::payment_remaining(payment.gross_amount, self.allocated_for_payment(payment_id))
    }

    pub fn outstanding(&self, invoice_id: Uuid) -> Decimal {
        let invoice = &self.invoices[&invoice_id];
        balance::invoice_outstanding(
            invoice.total_amount,
            self.allocated_for_invoice(invoice_id),
        )
    }

    pub fn payment_status(&self, payment_id: Uuid) -> PaymentStatus {
        self.payments[&payment_id].status
    }

    /// Precondition chain in store order: amount, payment lookup, invoice
    /// lookup, then the conservation checks over fresh aggregates.
    pub fn allocate(
        &mut self,
        payment_id: Uuid,
        invoice_id: Uuid,
        amount: Decimal,
    ) -> Result<Uuid, AppError> {
        validate_amount(amount)?;

        let payment = self
            .payments
            .get(&payment_id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Payment not found")))?;
        let invoice = self
            .invoices
            .get(&invoice_id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Invoice not found")))?;

        let payment_allocated = self.allocated_for_payment(payment_id);
        let invoice_allocated = self.allocated_for_invoice(invoice_id);

        validate_allocation(
            amount,
            AllocationCheck {
                invoice_status: invoice.status,
                invoice_outstanding: balance::invoice_outstanding(
                    invoice.total_amount,
                    invoice_allocated,
                ),
                payment_remaining: balance::payment_remaining(
                    payment.gross_amount,
                    payment_allocated,
                ),
            },
        )?;

        let allocation_id = Uuid::new_v4();
        self.allocations.push(MemAllocation {
            allocation_id,
            payment_id,
            invoice_id,
            allocated_amount: amount,
        });
        self.recompute_status(payment_id);

        Ok(allocation_id)
    }

    pub fn remove_allocation(&mut self, allocation_id: Uuid) -> Result<(), AppError> {
        let index = self
            .allocations
            .iter()
            .position(|a| a.allocation_id == allocation_id)
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Allocation not found")))?;
        let removed = self.allocations.remove(index);
        self.recompute_status(removed.payment_id);
        Ok(())
    }

    fn recompute_status(&mut self, payment_id: Uuid) {
        let allocated = self.allocated_for_payment(payment_id);
        let payment = self.payments.get_mut(&payment_id).unwrap();
        payment.status = PaymentStatus::recompute(allocated, payment.gross_amount);
    }

    /// Money conservation plus status coherence, checked after every step in
    /// the property tests.
    pub fn assert_invariants(&self) {
        for payment in self.payments.values() {
            let allocated = self.allocated_for_payment(payment.payment_id);
            assert!(
                allocated <= payment.gross_amount,
                "payment {} over-allocated: {} > {}",
                payment.payment_id,
                allocated,
                payment.gross_amount
            );
            assert_eq!(
                payment.status,
                PaymentStatus::recompute(allocated, payment.gross_amount),
                "payment {} cached status diverged",
                payment.payment_id
            );
        }
        for invoice in self.invoices.values() {
            let allocated = self.allocated_for_invoice(invoice.invoice_id);
            assert!(
                allocated <= invoice.total_amount,
                "invoice {} over-allocated: {} > {}",
                invoice.invoice_id,
                allocated,
                invoice.total_amount
            );
        }
    }
}
