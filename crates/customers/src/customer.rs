use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use anvilcrm_core::{CustomerId, DomainError};

/// Accepted phone formats: `+1234567890` (7-15 digits) or `123-456-7890`.
static PHONE_PATTERNS: LazyLock<[Regex; 2]> = LazyLock::new(|| {
    [
        Regex::new(r"^\+\d{7,15}$").expect("static phone pattern"),
        Regex::new(r"^\d{3}-\d{3}-\d{4}$").expect("static phone pattern"),
    ]
});

/// Whether `phone` matches one of the accepted formats.
///
/// An empty phone is valid (the field is optional).
pub fn phone_is_valid(phone: &str) -> bool {
    phone.is_empty() || PHONE_PATTERNS.iter().any(|rx| rx.is_match(phone))
}

/// A customer row.
///
/// Email is unique case-insensitively; the store enforces that at commit
/// time, so a concurrent duplicate loses even if it passed validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub id: CustomerId,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Incoming customer data before normalization and validation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerDraft {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
}

impl CustomerDraft {
    pub fn new(
        name: impl Into<String>,
        email: impl Into<String>,
        phone: Option<&str>,
    ) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            phone: phone.map(String::from),
        }
    }

    /// Trim and canonicalize fields: name/phone trimmed, email trimmed and
    /// lowercased, empty phone dropped to `None`.
    pub fn normalized(&self) -> CustomerDraft {
        CustomerDraft {
            name: self.name.trim().to_string(),
            email: self.email.trim().to_lowercase(),
            phone: self
                .phone
                .as_deref()
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(String::from),
        }
    }

    /// Validation problems of an already-normalized draft.
    ///
    /// Collects every problem instead of stopping at the first one; the
    /// caller shows the full list.
    pub fn problems(&self) -> Vec<DomainError> {
        let mut errs = Vec::new();
        if self.name.is_empty() {
            errs.push(DomainError::validation("Name is required."));
        }
        if self.email.is_empty() {
            errs.push(DomainError::validation("Email is required."));
        }
        if let Some(phone) = &self.phone {
            if !phone_is_valid(phone) {
                errs.push(DomainError::validation(
                    "Invalid phone format. Use +1234567890 or 123-456-7890.",
                ));
            }
        }
        errs
    }

    /// Normalize, then validate.
    pub fn validate(&self) -> Result<CustomerDraft, Vec<DomainError>> {
        let draft = self.normalized();
        let problems = draft.problems();
        if problems.is_empty() {
            Ok(draft)
        } else {
            Err(problems)
        }
    }
}

/// Per-row validation messages for bulk creation. `row` is 1-based.
///
/// Existence and duplicate-within-payload checks need store state and are
/// appended by the caller.
pub fn row_problems(draft: &CustomerDraft, row: usize) -> Vec<String> {
    let mut errs = Vec::new();
    if draft.name.is_empty() {
        errs.push(format!("Row {row}: name is required."));
    }
    if draft.email.is_empty() {
        errs.push(format!("Row {row}: email is required."));
    }
    if let Some(phone) = &draft.phone {
        if !phone_is_valid(phone) {
            errs.push(format!("Row {row}: invalid phone format."));
        }
    }
    errs
}
