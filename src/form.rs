//! Form Records
//!
//! TigerStyle: Explicit record types, caller inputs kept separate from stored records.
//!
//! A `Form` is what the store persists. Callers never build one directly:
//! creation goes through `FormInput` (no id, no timestamp) and edits go
//! through `FormPatch` (every field optional).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// =============================================================================
// TigerStyle Constants
// =============================================================================

/// Minimum title length in characters
pub const TITLE_CHARS_MIN: usize = 3;

/// Minimum number of fields on a form
pub const FIELDS_COUNT_MIN: i64 = 0;

/// Maximum number of fields on a form
pub const FIELDS_COUNT_MAX: i64 = 50;

// =============================================================================
// Types
// =============================================================================

/// Publication status of a form
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormStatus {
    /// Being edited, not yet visible to respondents
    Draft,
    /// Live
    Active,
    /// Retired
    Archived,
}

impl FormStatus {
    /// Get string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Active => "active",
            Self::Archived => "archived",
        }
    }

    /// All statuses in order.
    pub fn all() -> &'static [FormStatus] {
        &[Self::Draft, Self::Active, Self::Archived]
    }
}

impl fmt::Display for FormStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FormStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::all()
            .iter()
            .copied()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| UnknownStatus(s.to_string()))
    }
}

/// Returned when a status literal is not one of the known values
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown form status: {0}")]
pub struct UnknownStatus(pub String);

/// A stored form record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Form {
    /// Unique identifier (canonical UUID text)
    pub id: String,
    /// Display title
    pub title: String,
    /// Free-text description
    pub description: Option<String>,
    /// Number of fields on the form
    pub fields_count: i64,
    /// Publication status
    pub status: FormStatus,
    /// Time of the last create or update
    pub updated_at: DateTime<Utc>,
}

impl Form {
    /// Shallow-merge a patch over this form.
    ///
    /// Only user-settable fields are touched; the caller owns `id` and
    /// `updated_at`.
    pub fn merged(&self, patch: &FormPatch) -> Form {
        let mut next = self.clone();
        if let Some(title) = &patch.title {
            next.title = title.clone();
        }
        if let Some(description) = &patch.description {
            next.description = description.clone();
        }
        if let Some(fields_count) = patch.fields_count {
            next.fields_count = fields_count;
        }
        if let Some(status) = patch.status {
            next.status = status;
        }
        next
    }
}

/// Caller-supplied fields for creating a form
#[derive(Debug, Clone, PartialEq)]
pub struct FormInput {
    pub title: String,
    pub description: Option<String>,
    pub fields_count: i64,
    pub status: FormStatus,
}

impl FormInput {
    /// Input with no description.
    pub fn new(title: impl Into<String>, fields_count: i64, status: FormStatus) -> Self {
        Self {
            title: title.into(),
            description: None,
            fields_count,
            status,
        }
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Partial update for an existing form
///
/// `description` is doubly optional: `None` keeps the current value,
/// `Some(None)` clears it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FormPatch {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub fields_count: Option<i64>,
    pub status: Option<FormStatus>,
}

impl FormPatch {
    /// True when the patch changes no field.
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.fields_count.is_none()
            && self.status.is_none()
    }
}

// =============================================================================
// Tests
// =============================================================================
