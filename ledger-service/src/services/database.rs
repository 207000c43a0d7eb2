//! Database service for ledger-service.
//!
//! Every mutation that touches the allocation set or a document-number
//! counter runs in a single transaction with the affected rows locked
//! `FOR UPDATE`; balances are aggregated fresh inside that transaction, and
//! the payment's cached status is rewritten in the same unit of work. Lock
//! order is company, then payment, then invoice.

use crate::domain::{allocation, balance, numbering, tax};
use crate::models::{
    Allocation, Company, CreateCompany, CreateInvoice, CreatePayment, CreateTaxRate, Invoice,
    InvoiceStatus, Payment, PaymentStatus, TaxRate, UnpaidInvoice,
};
use crate::services::metrics::{
    ALLOCATIONS_TOTAL, DB_QUERY_DURATION, ERRORS_TOTAL, NUMBER_CONFLICTS_TOTAL, PAYMENTS_TOTAL,
};
use rust_decimal::Decimal;
use service_core::error::AppError;
use sqlx::postgres::{PgPool, PgPoolOptions, Postgres};
use sqlx::Transaction;
use std::time::Duration;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Bounded retry on duplicate-number collisions before surfacing `Conflict`.
const NUMBER_ISSUE_ATTEMPTS: u32 = 3;

/// Page size for the scan-based numbering fallback.
const SCAN_PAGE_SIZE: i64 = 500;

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database connection pool.
    #[instrument(skip(database_url), fields(service = "ledger-service"))]
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, AppError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to connect: {}", e)))?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Check database health.
    #[instrument(skip(self))]
    pub async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Health check failed: {}", e)))?;
        Ok(())
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Company Operations
    // -------------------------------------------------------------------------

    /// Create a company with fresh numbering sequences.
    #[instrument(skip(self, input))]
    pub async fn create_company(&self, input: &CreateCompany) -> Result<Company, AppError> {
        let company_id = Uuid::new_v4();
        let company = sqlx::query_as::<_, Company>(
            r#"
            INSERT INTO companies (company_id, name, invoice_prefix, payment_prefix)
            VALUES ($1, $2, $3, $4)
            RETURNING company_id, name, invoice_prefix, invoice_next_number,
                payment_prefix, payment_next_number, created_utc
            "#,
        )
        .bind(company_id)
        .bind(&input.name)
        .bind(&input.invoice_prefix)
        .bind(&input.payment_prefix)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to create company: {}", e)))?;

        info!(company_id = %company.company_id, name = %company.name, "Company created");

        Ok(company)
    }

    /// Get a company by ID.
    pub async fn get_company(&self, company_id: Uuid) -> Result<Option<Company>, AppError> {
        let company = sqlx::query_as::<_, Company>(
            r#"
            SELECT company_id, name, invoice_prefix, invoice_next_number,
                payment_prefix, payment_next_number, created_utc
            FROM companies
            WHERE company_id = $1
            "#,
        )
        .bind(company_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get company: {}", e)))?;

        Ok(company)
    }

    // -------------------------------------------------------------------------
    // Tax Rate Operations
    // -------------------------------------------------------------------------

    /// Create a new tax rate.
    #[instrument(skip(self, input), fields(company_id = %input.company_id))]
    pub async fn create_tax_rate(&self, input: &CreateTaxRate) -> Result<TaxRate, AppError> {
        if input.rate_percent < Decimal::ZERO || input.rate_percent > Decimal::ONE_HUNDRED {
            return Err(AppError::Validation(anyhow::anyhow!(
                "Tax rate must be between 0 and 100, got {}",
                input.rate_percent
            )));
        }

        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_tax_rate"])
            .start_timer();

        let tax_rate_id = Uuid::new_v4();
        let tax_rate = sqlx::query_as::<_, TaxRate>(
            r#"
            INSERT INTO tax_rates (tax_rate_id, company_id, name, rate_percent, active)
            VALUES ($1, $2, $3, $4, TRUE)
            RETURNING tax_rate_id, company_id, name, rate_percent, active, created_utc
            "#,
        )
        .bind(tax_rate_id)
        .bind(input.company_id)
        .bind(&input.name)
        .bind(input.rate_percent)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to create tax rate: {}", e)))?;

        timer.observe_duration();

        info!(tax_rate_id = %tax_rate.tax_rate_id, name = %tax_rate.name, "Tax rate created");

        Ok(tax_rate)
    }

    /// Get a tax rate by ID.
    #[instrument(skip(self), fields(company_id = %company_id, tax_rate_id = %tax_rate_id))]
    pub async fn get_tax_rate(
        &self,
        company_id: Uuid,
        tax_rate_id: Uuid,
    ) -> Result<Option<TaxRate>, AppError> {
        let tax_rate = sqlx::query_as::<_, TaxRate>(
            r#"
            SELECT tax_rate_id, company_id, name, rate_percent, active, created_utc
            FROM tax_rates
            WHERE company_id = $1 AND tax_rate_id = $2
            "#,
        )
        .bind(company_id)
        .bind(tax_rate_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get tax rate: {}", e)))?;

        Ok(tax_rate)
    }

    /// List active tax rates for a company.
    #[instrument(skip(self), fields(company_id = %company_id))]
    pub async fn list_tax_rates(&self, company_id: Uuid) -> Result<Vec<TaxRate>, AppError> {
        let tax_rates = sqlx::query_as::<_, TaxRate>(
            r#"
            SELECT tax_rate_id, company_id, name, rate_percent, active, created_utc
            FROM tax_rates
            WHERE company_id = $1 AND active = TRUE
            ORDER BY name
            "#,
        )
        .bind(company_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list tax rates: {}", e)))?;

        Ok(tax_rates)
    }

    // -------------------------------------------------------------------------
    // Invoice Operations
    // -------------------------------------------------------------------------

    /// Create a draft invoice. Totals are computed by the tax calculator and
    /// immutable once the invoice is issued.
    #[instrument(skip(self, input), fields(company_id = %input.company_id))]
    pub async fn create_invoice(&self, input: &CreateInvoice) -> Result<Invoice, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_invoice"])
            .start_timer();

        let sales_tax_percent = match input.tax_rate_id {
            Some(tax_rate_id) => {
                let rate = self
                    .get_tax_rate(input.company_id, tax_rate_id)
                    .await?
                    .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Tax rate not found")))?;
                Some(rate.rate_percent)
            }
            None => None,
        };

        let totals = tax::invoice_totals(
            input.subtotal,
            input.discount_value,
            input.discount_is_percent,
            sales_tax_percent,
        )?;

        let invoice_id = Uuid::new_v4();
        let invoice = sqlx::query_as::<_, Invoice>(
            r#"
            INSERT INTO invoices (
                invoice_id, company_id, customer_id, status,
                subtotal, discount_amount, tax_amount, total_amount
            )
            VALUES ($1, $2, $3, 'draft', $4, $5, $6, $7)
            RETURNING invoice_id, company_id, customer_id, invoice_number, status,
                subtotal, discount_amount, tax_amount, total_amount, created_utc
            "#,
        )
        .bind(invoice_id)
        .bind(input.company_id)
        .bind(input.customer_id)
        .bind(totals.subtotal)
        .bind(totals.discount_amount)
        .bind(totals.tax_amount)
        .bind(totals.total_amount)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to create invoice: {}", e)))?;

        timer.observe_duration();

        info!(invoice_id = %invoice.invoice_id, total = %invoice.total_amount, "Draft invoice created");

        Ok(invoice)
    }

    /// Get an invoice by ID.
    #[instrument(skip(self), fields(company_id = %company_id, invoice_id = %invoice_id))]
    pub async fn get_invoice(
        &self,
        company_id: Uuid,
        invoice_id: Uuid,
    ) -> Result<Option<Invoice>, AppError> {
        let invoice = sqlx::query_as::<_, Invoice>(
            r#"
            SELECT invoice_id, company_id, customer_id, invoice_number, status,
                subtotal, discount_amount, tax_amount, total_amount, created_utc
            FROM invoices
            WHERE company_id = $1 AND invoice_id = $2
            "#,
        )
        .bind(company_id)
        .bind(invoice_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get invoice: {}", e)))?;

        Ok(invoice)
    }

    /// Issue a draft invoice: assign the next invoice number and move it to
    /// `final`. Retries with a fresh number if the unique index reports a
    /// collision from a concurrent issuer.
    #[instrument(skip(self), fields(company_id = %company_id, invoice_id = %invoice_id))]
    pub async fn issue_invoice(
        &self,
        company_id: Uuid,
        invoice_id: Uuid,
    ) -> Result<Invoice, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["issue_invoice"])
            .start_timer();

        let mut attempt = 1;
        let invoice = loop {
            // After a collision the stored counter is stale; reseed from a
            // scan of the rows that actually exist.
            let force_scan = attempt > 1;
            match self.try_issue_invoice(company_id, invoice_id, force_scan).await {
                Err(AppError::Conflict(e)) if attempt < NUMBER_ISSUE_ATTEMPTS => {
                    NUMBER_CONFLICTS_TOTAL
                        .with_label_values(&["invoice"])
                        .inc();
                    warn!(attempt, error = %e, "Invoice number collision; retrying");
                    attempt += 1;
                }
                other => {
                    break other.inspect_err(|_| {
                        ERRORS_TOTAL.with_label_values(&["issue_invoice"]).inc();
                    })?
                }
            }
        };

        timer.observe_duration();

        info!(
            invoice_id = %invoice.invoice_id,
            invoice_number = %invoice.invoice_number.as_deref().unwrap_or(""),
            "Invoice issued"
        );

        Ok(invoice)
    }

    async fn try_issue_invoice(
        &self,
        company_id: Uuid,
        invoice_id: Uuid,
        force_scan: bool,
    ) -> Result<Invoice, AppError> {
        let mut tx = self.begin().await?;

        let company = lock_company(&mut tx, company_id).await?;

        let existing = sqlx::query_as::<_, Invoice>(
            r#"
            SELECT invoice_id, company_id, customer_id, invoice_number, status,
                subtotal, discount_amount, tax_amount, total_amount, created_utc
            FROM invoices
            WHERE company_id = $1 AND invoice_id = $2
            FOR UPDATE
            "#,
        )
        .bind(company_id)
        .bind(invoice_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get invoice: {}", e)))?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Invoice not found")))?;

        if existing.status() != InvoiceStatus::Draft {
            return Err(AppError::InvalidState(anyhow::anyhow!(
                "Only draft invoices can be issued"
            )));
        }

        // Counter-based issuance; a NULL counter, or a counter that just
        // produced a collision, is seeded by scanning the existing numbers.
        let counter = match company.invoice_next_number {
            Some(counter) if !force_scan => counter,
            _ => {
                let numbers = scan_invoice_numbers(&mut tx, company_id).await?;
                numbering::next_from_scan(
                    &company.invoice_prefix,
                    numbers.iter().map(String::as_str),
                )
            }
        };
        let number = numbering::format_number(
            &company.invoice_prefix,
            counter,
            numbering::INVOICE_NUMBER_WIDTH,
        );

        let invoice = sqlx::query_as::<_, Invoice>(
            r#"
            UPDATE invoices
            SET invoice_number = $3, status = 'final'
            WHERE company_id = $1 AND invoice_id = $2
            RETURNING invoice_id, company_id, customer_id, invoice_number, status,
                subtotal, discount_amount, tax_amount, total_amount, created_utc
            "#,
        )
        .bind(company_id)
        .bind(invoice_id)
        .bind(&number)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_number_conflict(e, &number))?;

        sqlx::query(
            r#"
            UPDATE companies SET invoice_next_number = $2 WHERE company_id = $1
            "#,
        )
        .bind(company_id)
        .bind(counter + 1)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to advance invoice counter: {}", e))
        })?;

        commit(tx).await?;

        Ok(invoice)
    }

    /// Mark a finalized invoice as sent.
    #[instrument(skip(self), fields(company_id = %company_id, invoice_id = %invoice_id))]
    pub async fn mark_invoice_sent(
        &self,
        company_id: Uuid,
        invoice_id: Uuid,
    ) -> Result<Invoice, AppError> {
        let existing = self
            .get_invoice(company_id, invoice_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Invoice not found")))?;

        if existing.status() != InvoiceStatus::Final {
            return Err(AppError::InvalidState(anyhow::anyhow!(
                "Only final invoices can be marked sent"
            )));
        }

        let invoice = sqlx::query_as::<_, Invoice>(
            r#"
            UPDATE invoices
            SET status = 'sent'
            WHERE company_id = $1 AND invoice_id = $2 AND status = 'final'
            RETURNING invoice_id, company_id, customer_id, invoice_number, status,
                subtotal, discount_amount, tax_amount, total_amount, created_utc
            "#,
        )
        .bind(company_id)
        .bind(invoice_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to mark sent: {}", e)))?;

        Ok(invoice)
    }

    /// List a customer's invoices with outstanding balance > 0.
    #[instrument(skip(self), fields(company_id = %company_id, customer_id = %customer_id))]
    pub async fn list_unpaid_invoices(
        &self,
        company_id: Uuid,
        customer_id: Uuid,
    ) -> Result<Vec<UnpaidInvoice>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_unpaid_invoices"])
            .start_timer();

        let invoices = sqlx::query_as::<_, UnpaidInvoice>(
            r#"
            SELECT i.invoice_id, i.invoice_number, i.total_amount,
                i.total_amount - COALESCE(SUM(a.allocated_amount), 0) AS outstanding
            FROM invoices i
            LEFT JOIN allocations a ON a.invoice_id = i.invoice_id
            WHERE i.company_id = $1
              AND i.customer_id = $2
              AND i.status IN ('final', 'sent')
            GROUP BY i.invoice_id
            HAVING i.total_amount - COALESCE(SUM(a.allocated_amount), 0) > 0
            ORDER BY i.invoice_number
            "#,
        )
        .bind(company_id)
        .bind(customer_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to list unpaid invoices: {}", e))
        })?;

        timer.observe_duration();

        Ok(invoices)
    }

    // -------------------------------------------------------------------------
    // Payment Operations
    // -------------------------------------------------------------------------

    /// Create a payment: apply the withholding split, assign the next payment
    /// number from the company counter, persist as `unallocated`.
    #[instrument(skip(self, input), fields(company_id = %input.company_id))]
    pub async fn create_payment(&self, input: &CreatePayment) -> Result<Payment, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_payment"])
            .start_timer();

        let rate_percent = match input.withholding_tax_rate_id {
            Some(tax_rate_id) => {
                self.get_tax_rate(input.company_id, tax_rate_id)
                    .await?
                    .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Tax rate not found")))?
                    .rate_percent
            }
            None => Decimal::ZERO,
        };
        let split = tax::withholding_split(input.net_amount, rate_percent)?;

        let mut attempt = 1;
        let payment = loop {
            let force_scan = attempt > 1;
            match self.try_create_payment(input, split, force_scan).await {
                Err(AppError::Conflict(e)) if attempt < NUMBER_ISSUE_ATTEMPTS => {
                    NUMBER_CONFLICTS_TOTAL
                        .with_label_values(&["payment"])
                        .inc();
                    warn!(attempt, error = %e, "Payment number collision; retrying");
                    attempt += 1;
                }
                other => {
                    break other.inspect_err(|_| {
                        ERRORS_TOTAL.with_label_values(&["create_payment"]).inc();
                    })?
                }
            }
        };

        timer.observe_duration();

        PAYMENTS_TOTAL
            .with_label_values(&[PaymentStatus::Unallocated.as_str()])
            .inc();

        info!(
            payment_id = %payment.payment_id,
            payment_number = %payment.payment_number,
            gross = %payment.gross_amount,
            withholding = %payment.withholding_amount,
            "Payment created"
        );

        Ok(payment)
    }

    async fn try_create_payment(
        &self,
        input: &CreatePayment,
        split: tax::WithholdingSplit,
        force_scan: bool,
    ) -> Result<Payment, AppError> {
        let mut tx = self.begin().await?;

        let company = lock_company(&mut tx, input.company_id).await?;

        let counter = if force_scan {
            let numbers = scan_payment_numbers(&mut tx, input.company_id).await?;
            numbering::next_from_scan(&company.payment_prefix, numbers.iter().map(String::as_str))
        } else {
            company.payment_next_number
        };
        let number = numbering::format_number(
            &company.payment_prefix,
            counter,
            numbering::PAYMENT_NUMBER_WIDTH,
        );

        let payment_id = Uuid::new_v4();
        let payment = sqlx::query_as::<_, Payment>(
            r#"
            INSERT INTO payments (
                payment_id, company_id, customer_id, payment_number,
                gross_amount, net_amount, withholding_amount, status
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, 'unallocated')
            RETURNING payment_id, company_id, customer_id, payment_number,
                gross_amount, net_amount, withholding_amount, status, created_utc
            "#,
        )
        .bind(payment_id)
        .bind(input.company_id)
        .bind(input.customer_id)
        .bind(&number)
        .bind(split.gross)
        .bind(split.gross - split.withholding)
        .bind(split.withholding)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_number_conflict(e, &number))?;

        sqlx::query(
            r#"
            UPDATE companies SET payment_next_number = $2 WHERE company_id = $1
            "#,
        )
        .bind(input.company_id)
        .bind(counter + 1)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to advance payment counter: {}", e))
        })?;

        commit(tx).await?;

        Ok(payment)
    }

    /// Get a payment by ID.
    #[instrument(skip(self), fields(company_id = %company_id, payment_id = %payment_id))]
    pub async fn get_payment(
        &self,
        company_id: Uuid,
        payment_id: Uuid,
    ) -> Result<Option<Payment>, AppError> {
        let payment = sqlx::query_as::<_, Payment>(
            r#"
            SELECT payment_id, company_id, customer_id, payment_number,
                gross_amount, net_amount, withholding_amount, status, created_utc
            FROM payments
            WHERE company_id = $1 AND payment_id = $2
            "#,
        )
        .bind(company_id)
        .bind(payment_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get payment: {}", e)))?;

        Ok(payment)
    }

    // -------------------------------------------------------------------------
    // Balance Resolver
    // -------------------------------------------------------------------------

    /// Outstanding balance of an invoice, derived from the allocation set.
    #[instrument(skip(self), fields(company_id = %company_id, invoice_id = %invoice_id))]
    pub async fn invoice_outstanding(
        &self,
        company_id: Uuid,
        invoice_id: Uuid,
    ) -> Result<Decimal, AppError> {
        let invoice = self
            .get_invoice(company_id, invoice_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Invoice not found")))?;

        let allocated = sum_for_invoice(&self.pool, invoice_id).await?;
        Ok(balance::invoice_outstanding(invoice.total_amount, allocated))
    }

    /// Unallocated remainder of a payment's gross amount.
    #[instrument(skip(self), fields(company_id = %company_id, payment_id = %payment_id))]
    pub async fn payment_remaining(
        &self,
        company_id: Uuid,
        payment_id: Uuid,
    ) -> Result<Decimal, AppError> {
        let payment = self
            .get_payment(company_id, payment_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Payment not found")))?;

        let allocated = sum_for_payment(&self.pool, payment_id).await?;
        Ok(balance::payment_remaining(payment.gross_amount, allocated))
    }

    // -------------------------------------------------------------------------
    // Allocation Ledger
    // -------------------------------------------------------------------------

    /// Apply part of a payment's gross amount against an invoice.
    ///
    /// The whole precondition chain, the insert, and the payment-status
    /// recompute run inside one transaction; either everything lands or
    /// nothing does.
    #[instrument(skip(self), fields(
        company_id = %company_id,
        payment_id = %payment_id,
        invoice_id = %invoice_id,
        amount = %amount,
    ))]
    pub async fn allocate(
        &self,
        company_id: Uuid,
        payment_id: Uuid,
        invoice_id: Uuid,
        amount: Decimal,
    ) -> Result<Allocation, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["allocate"])
            .start_timer();

        allocation::validate_amount(amount).inspect_err(|_| {
            ALLOCATIONS_TOTAL
                .with_label_values(&["allocate", "rejected"])
                .inc();
            ERRORS_TOTAL.with_label_values(&["allocate"]).inc();
        })?;

        let result = self
            .allocate_in_tx(company_id, payment_id, invoice_id, amount)
            .await;

        timer.observe_duration();

        match &result {
            Ok(alloc) => {
                ALLOCATIONS_TOTAL.with_label_values(&["allocate", "ok"]).inc();
                info!(
                    allocation_id = %alloc.allocation_id,
                    allocated = %alloc.allocated_amount,
                    "Allocation created"
                );
            }
            Err(_) => {
                ALLOCATIONS_TOTAL
                    .with_label_values(&["allocate", "rejected"])
                    .inc();
                ERRORS_TOTAL.with_label_values(&["allocate"]).inc();
            }
        }

        result
    }

    async fn allocate_in_tx(
        &self,
        company_id: Uuid,
        payment_id: Uuid,
        invoice_id: Uuid,
        amount: Decimal,
    ) -> Result<Allocation, AppError> {
        let mut tx = self.begin().await?;

        let payment = lock_payment(&mut tx, company_id, payment_id).await?;
        let invoice = lock_invoice(&mut tx, company_id, invoice_id).await?;

        let payment_allocated = sum_for_payment(&mut *tx, payment_id).await?;
        let invoice_allocated = sum_for_invoice(&mut *tx, invoice_id).await?;

        allocation::validate_allocation(
            amount,
            allocation::AllocationCheck {
                invoice_status: invoice.status(),
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
        let alloc = sqlx::query_as::<_, Allocation>(
            r#"
            INSERT INTO allocations (allocation_id, company_id, payment_id, invoice_id, allocated_amount)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING allocation_id, company_id, payment_id, invoice_id, allocated_amount, created_utc
            "#,
        )
        .bind(allocation_id)
        .bind(company_id)
        .bind(payment_id)
        .bind(invoice_id)
        .bind(amount)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to insert allocation: {}", e)))?;

        update_payment_status(&mut tx, payment_id, payment_allocated + amount, payment.gross_amount)
            .await?;

        commit(tx).await?;

        Ok(alloc)
    }

    /// Remove an allocation and recompute the owning payment's status.
    /// Removing an already-removed allocation surfaces `NotFound`.
    #[instrument(skip(self), fields(company_id = %company_id, allocation_id = %allocation_id))]
    pub async fn remove_allocation(
        &self,
        company_id: Uuid,
        allocation_id: Uuid,
    ) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["remove_allocation"])
            .start_timer();

        let mut tx = self.begin().await?;

        let alloc = sqlx::query_as::<_, Allocation>(
            r#"
            SELECT allocation_id, company_id, payment_id, invoice_id, allocated_amount, created_utc
            FROM allocations
            WHERE company_id = $1 AND allocation_id = $2
            FOR UPDATE
            "#,
        )
        .bind(company_id)
        .bind(allocation_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get allocation: {}", e)))?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Allocation not found")))?;

        let payment = lock_payment(&mut tx, company_id, alloc.payment_id).await?;

        sqlx::query("DELETE FROM allocations WHERE allocation_id = $1")
            .bind(allocation_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to delete allocation: {}", e))
            })?;

        let remaining_total = sum_for_payment(&mut *tx, alloc.payment_id).await?;
        update_payment_status(&mut tx, alloc.payment_id, remaining_total, payment.gross_amount)
            .await?;

        commit(tx).await?;

        timer.observe_duration();

        ALLOCATIONS_TOTAL.with_label_values(&["remove", "ok"]).inc();

        info!(allocation_id = %allocation_id, payment_id = %alloc.payment_id, "Allocation removed");

        Ok(())
    }

    async fn begin(&self) -> Result<Transaction<'_, Postgres>, AppError> {
        self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })
    }
}

async fn commit(tx: Transaction<'_, Postgres>) -> Result<(), AppError> {
    tx.commit().await.map_err(|e| {
        AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
    })
}

/// Lock the company row for the duration of the transaction.
async fn lock_company(
    tx: &mut Transaction<'_, Postgres>,
    company_id: Uuid,
) -> Result<Company, AppError> {
    sqlx::query_as::<_, Company>(
        r#"
        SELECT company_id, name, invoice_prefix, invoice_next_number,
            payment_prefix, payment_next_number, created_utc
        FROM companies
        WHERE company_id = $1
        FOR UPDATE
        "#,
    )
    .bind(company_id)
    .fetch_optional(&mut **tx)
    .await
    .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to lock company: {}", e)))?
    .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Company not found")))
}

async fn lock_payment(
    tx: &mut Transaction<'_, Postgres>,
    company_id: Uuid,
    payment_id: Uuid,
) -> Result<Payment, AppError> {
    sqlx::query_as::<_, Payment>(
        r#"
        SELECT payment_id, company_id, customer_id, payment_number,
            gross_amount, net_amount, withholding_amount, status, created_utc
        FROM payments
        WHERE company_id = $1 AND payment_id = $2
        FOR UPDATE
        "#,
    )
    .bind(company_id)
    .bind(payment_id)
    .fetch_optional(&mut **tx)
    .await
    .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to lock payment: {}", e)))?
    .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Payment not found")))
}

async fn lock_invoice(
    tx: &mut Transaction<'_, Postgres>,
    company_id: Uuid,
    invoice_id: Uuid,
) -> Result<Invoice, AppError> {
    sqlx::query_as::<_, Invoice>(
        r#"
        SELECT invoice_id, company_id, customer_id, invoice_number, status,
            subtotal, discount_amount, tax_amount, total_amount, created_utc
        FROM invoices
        WHERE company_id = $1 AND invoice_id = $2
        FOR UPDATE
        "#,
    )
    .bind(company_id)
    .bind(invoice_id)
    .fetch_optional(&mut **tx)
    .await
    .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to lock invoice: {}", e)))?
    .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Invoice not found")))
}

/// Sum of allocations against a payment. Runs on the caller's executor so it
/// sees uncommitted rows inside a transaction.
async fn sum_for_payment<'e, E>(executor: E, payment_id: Uuid) -> Result<Decimal, AppError>
where
    E: sqlx::Executor<'e, Database = Postgres>,
{
    sqlx::query_scalar::<_, Decimal>(
        "SELECT COALESCE(SUM(allocated_amount), 0) FROM allocations WHERE payment_id = $1",
    )
    .bind(payment_id)
    .fetch_one(executor)
    .await
    .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to sum payment allocations: {}", e)))
}

/// Sum of allocations against an invoice.
async fn sum_for_invoice<'e, E>(executor: E, invoice_id: Uuid) -> Result<Decimal, AppError>
where
    E: sqlx::Executor<'e, Database = Postgres>,
{
    sqlx::query_scalar::<_, Decimal>(
        "SELECT COALESCE(SUM(allocated_amount), 0) FROM allocations WHERE invoice_id = $1",
    )
    .bind(invoice_id)
    .fetch_one(executor)
    .await
    .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to sum invoice allocations: {}", e)))
}

/// Rewrite the payment's cached status from the fresh allocation total.
async fn update_payment_status(
    tx: &mut Transaction<'_, Postgres>,
    payment_id: Uuid,
    allocated_total: Decimal,
    gross_amount: Decimal,
) -> Result<(), AppError> {
    let status = PaymentStatus::recompute(allocated_total, gross_amount);
    sqlx::query("UPDATE payments SET status = $2 WHERE payment_id = $1")
        .bind(payment_id)
        .bind(status.as_str())
        .execute(&mut **tx)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to update payment status: {}", e))
        })?;
    Ok(())
}

/// Fetch every issued invoice number for a company, paginated so large
/// datasets are never truncated.
async fn scan_invoice_numbers(
    tx: &mut Transaction<'_, Postgres>,
    company_id: Uuid,
) -> Result<Vec<String>, AppError> {
    let mut numbers = Vec::new();
    let mut cursor: Option<Uuid> = None;

    loop {
        let page = sqlx::query_as::<_, (Uuid, String)>(
            r#"
            SELECT invoice_id, invoice_number
            FROM invoices
            WHERE company_id = $1
              AND invoice_number IS NOT NULL
              AND ($2::uuid IS NULL OR invoice_id > $2)
            ORDER BY invoice_id
            LIMIT $3
            "#,
        )
        .bind(company_id)
        .bind(cursor)
        .bind(SCAN_PAGE_SIZE)
        .fetch_all(&mut **tx)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to scan invoice numbers: {}", e))
        })?;

        let page_len = page.len() as i64;
        cursor = page.last().map(|(id, _)| *id);
        numbers.extend(page.into_iter().map(|(_, number)| number));

        if page_len < SCAN_PAGE_SIZE {
            break;
        }
    }

    Ok(numbers)
}

/// Fetch every payment number for a company, paginated like the invoice
/// scan.
async fn scan_payment_numbers(
    tx: &mut Transaction<'_, Postgres>,
    company_id: Uuid,
) -> Result<Vec<String>, AppError> {
    let mut numbers = Vec::new();
    let mut cursor: Option<Uuid> = None;

    loop {
        let page = sqlx::query_as::<_, (Uuid, String)>(
            r#"
            SELECT payment_id, payment_number
            FROM payments
            WHERE company_id = $1
              AND ($2::uuid IS NULL OR payment_id > $2)
            ORDER BY payment_id
            LIMIT $3
            "#,
        )
        .bind(company_id)
        .bind(cursor)
        .bind(SCAN_PAGE_SIZE)
        .fetch_all(&mut **tx)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to scan payment numbers: {}", e))
        })?;

        let page_len = page.len() as i64;
        cursor = page.last().map(|(id, _)| *id);
        numbers.extend(page.into_iter().map(|(_, number)| number));

        if page_len < SCAN_PAGE_SIZE {
            break;
        }
    }

    Ok(numbers)
}

/// Map a unique-constraint violation on a document number to a retryable
/// `Conflict`.
fn map_number_conflict(e: sqlx::Error, number: &str) -> AppError {
    match e {
        sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
            AppError::Conflict(anyhow::anyhow!("Document number {} already issued", number))
        }
        _ => AppError::DatabaseError(anyhow::anyhow!("Failed to persist document: {}", e)),
    }
}
