//! Customer Directory store: creation (single and bulk) and lookups.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use thiserror::Error;
use tracing::instrument;

use anvilcrm_core::{CustomerId, DomainError};
use anvilcrm_customers::{row_problems, Customer, CustomerDraft};

use crate::error::{decode_err, map_sqlx_error, StoreError, StoreResult};
use crate::filters::{self, CustomerFilter};

/// Why a customer creation was rejected.
#[derive(Debug, Error)]
pub enum CustomerCreateError {
    /// Validation problems, including a duplicate email detected at commit
    /// time. The full list of user-facing messages.
    #[error("customer rejected: {}", .0.iter().map(|e| e.to_string()).collect::<Vec<_>>().join(" "))]
    Rejected(Vec<DomainError>),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Outcome of a bulk customer creation: valid rows are created even when
/// other rows fail (partial success).
#[derive(Debug, Default)]
pub struct BulkCreateOutcome {
    pub created: Vec<Customer>,
    pub errors: Vec<String>,
}

impl BulkCreateOutcome {
    pub fn ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Postgres-backed customer store.
#[derive(Debug, Clone)]
pub struct CustomerStore {
    pool: Arc<PgPool>,
}

impl CustomerStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Directory lookup consulted by order placement.
    #[instrument(skip(self), fields(customer_id = %id), err)]
    pub async fn find_by_id(&self, id: CustomerId) -> StoreResult<Option<Customer>> {
        let row = sqlx::query(
            "SELECT id, name, email, phone, created_at FROM customers WHERE id = $1",
        )
        .bind(id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_customer", e))?;

        row.map(|r| customer_from_row(&r)).transpose()
    }

    /// Case-insensitive email lookup.
    pub async fn find_by_email(&self, email: &str) -> StoreResult<Option<Customer>> {
        let row = sqlx::query(
            "SELECT id, name, email, phone, created_at FROM customers WHERE LOWER(email) = LOWER($1)",
        )
        .bind(email)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_customer_by_email", e))?;

        row.map(|r| customer_from_row(&r)).transpose()
    }

    /// Create one customer.
    ///
    /// Problems are batched the way the single-row directory mutation
    /// reports them; a duplicate email that slips past the pre-check is
    /// caught again by the unique index and reported with the same message.
    #[instrument(skip(self, draft), err(Debug))]
    pub async fn create(&self, draft: &CustomerDraft) -> Result<Customer, CustomerCreateError> {
        let draft = draft.normalized();
        let mut errs = draft.problems();
        if !draft.email.is_empty() && self.email_exists(&draft.email).await? {
            errs.push(DomainError::validation("Email already exists."));
        }
        if !errs.is_empty() {
            return Err(CustomerCreateError::Rejected(errs));
        }

        let customer = Customer {
            id: CustomerId::new(),
            name: draft.name,
            email: draft.email,
            phone: draft.phone,
            created_at: Utc::now(),
        };
        match self.insert(&customer).await {
            Ok(()) => Ok(customer),
            // Lost a race against a concurrent insert of the same email.
            Err(StoreError::UniqueViolation(_)) => Err(CustomerCreateError::Rejected(vec![
                DomainError::validation("Email already exists."),
            ])),
            Err(e) => Err(e.into()),
        }
    }

    /// Bulk create with per-row validation and partial success.
    #[instrument(skip(self, drafts), fields(rows = drafts.len()), err)]
    pub async fn bulk_create(&self, drafts: &[CustomerDraft]) -> StoreResult<BulkCreateOutcome> {
        if drafts.is_empty() {
            return Ok(BulkCreateOutcome {
                created: Vec::new(),
                errors: vec!["No customers provided.".to_string()],
            });
        }

        let existing = self.all_emails().await?;
        let mut seen_in_batch: HashSet<String> = HashSet::new();
        let mut outcome = BulkCreateOutcome::default();

        for (idx, raw) in drafts.iter().enumerate() {
            let idx = idx + 1;
            let draft = raw.normalized();
            let mut row_errs = row_problems(&draft, idx);
            if !draft.email.is_empty() {
                if existing.contains(&draft.email) {
                    row_errs.push(format!(
                        "Row {idx}: email already exists ({}).",
                        draft.email
                    ));
                }
                if seen_in_batch.contains(&draft.email) {
                    row_errs.push(format!(
                        "Row {idx}: duplicate email within payload ({}).",
                        draft.email
                    ));
                }
            }
            if !row_errs.is_empty() {
                outcome.errors.extend(row_errs);
                continue;
            }

            seen_in_batch.insert(draft.email.clone());
            let customer = Customer {
                id: CustomerId::new(),
                name: draft.name,
                email: draft.email,
                phone: draft.phone,
                created_at: Utc::now(),
            };
            match self.insert(&customer).await {
                Ok(()) => outcome.created.push(customer),
                Err(StoreError::UniqueViolation(_)) => outcome
                    .errors
                    .push(format!("Email already exists ({}).", customer.email)),
                Err(e) => return Err(e),
            }
        }

        Ok(outcome)
    }

    /// Find customers matching `filter`.
    pub async fn find(&self, filter: &CustomerFilter) -> StoreResult<Vec<Customer>> {
        filters::find_customers(&self.pool, filter).await
    }

    async fn insert(&self, customer: &Customer) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO customers (id, name, email, phone, created_at) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(customer.id.as_uuid())
        .bind(&customer.name)
        .bind(&customer.email)
        .bind(customer.phone.as_deref())
        .bind(customer.created_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_customer", e))?;
        Ok(())
    }

    async fn email_exists(&self, email: &str) -> StoreResult<bool> {
        let row = sqlx::query(
            "SELECT EXISTS (SELECT 1 FROM customers WHERE LOWER(email) = LOWER($1)) AS present",
        )
        .bind(email)
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("email_exists", e))?;
        row.try_get("present").map_err(|e| decode_err("present", e))
    }

    async fn all_emails(&self) -> StoreResult<HashSet<String>> {
        let rows = sqlx::query("SELECT email FROM customers")
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("all_emails", e))?;
        let mut emails = HashSet::with_capacity(rows.len());
        for row in rows {
            let email: String = row.try_get("email").map_err(|e| decode_err("email", e))?;
            emails.insert(email.to_lowercase());
        }
        Ok(emails)
    }
}

pub(crate) fn customer_from_row(row: &PgRow) -> StoreResult<Customer> {
    Ok(Customer {
        id: CustomerId::from_uuid(
            row.try_get("id").map_err(|e| decode_err("customers.id", e))?,
        ),
        name: row
            .try_get("name")
            .map_err(|e| decode_err("customers.name", e))?,
        email: row
            .try_get("email")
            .map_err(|e| decode_err("customers.email", e))?,
        phone: row
            .try_get("phone")
            .map_err(|e| decode_err("customers.phone", e))?,
        created_at: row
            .try_get("created_at")
            .map_err(|e| decode_err("customers.created_at", e))?,
    })
}
