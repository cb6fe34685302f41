//! Form Store
//!
//! TigerStyle: One owner for the form collection, write-through to a
//! best-effort backing medium.
//!
//! The collection is loaded lazily on first access (validate, then repair
//! if needed) and cached for the lifetime of the store. Every mutation
//! replaces the cached collection first and then tries to write it out; a
//! failed write is logged and reported as `Durability::MemoryOnly`, never
//! returned as an error. Memory stays authoritative for the rest of the
//! process when the medium is read-only.
//!
//! All operations hold a single mutex from load through write, so
//! mutations within one process never lose each other's updates.

use crate::backend::{Backend, FileBackend};
use crate::clock::{Clock, SystemClock};
use crate::config::{OnLoadFailure, StoreConfig};
use crate::form::{Form, FormInput, FormPatch};
use crate::ids::{assign_id, IdGenerator, RandomIds};
use crate::repair;
use crate::schema::{self, ValidationError};
use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Mutex;

// =============================================================================
// Types
// =============================================================================

/// Whether a mutation reached the backing medium
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Durability {
    /// Written to the backing medium
    Persisted,
    /// Kept in memory; the write to the backing medium failed
    MemoryOnly,
    /// Nothing changed, nothing written
    Unchanged,
}

/// Result of a mutation plus how durable it is
#[derive(Debug, Clone, PartialEq)]
pub struct Committed<T> {
    pub value: T,
    pub durability: Durability,
}

impl<T> Committed<T> {
    pub fn into_inner(self) -> T {
        self.value
    }
}

// =============================================================================
// FormStore
// =============================================================================

/// The authoritative form collection.
#[derive(Debug)]
pub struct FormStore {
    backend: Arc<dyn Backend>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    on_load_failure: OnLoadFailure,
    /// `None` until first load
    forms: Mutex<Option<Vec<Form>>>,
}

impl FormStore {
    /// File-backed store with the system clock and OS randomness.
    pub fn open(config: &StoreConfig) -> Self {
        Self::builder(Arc::new(FileBackend::new(config.data_path.clone())))
            .on_load_failure(config.on_load_failure)
            .build()
    }

    /// Builder for stores with injected collaborators.
    pub fn builder(backend: Arc<dyn Backend>) -> FormStoreBuilder {
        FormStoreBuilder::new(backend)
    }

    /// Load (once) and return the collection in stored order.
    pub async fn load(&self) -> Result<Vec<Form>, FormError> {
        let mut slot = self.forms.lock().await;
        let forms = self.loaded(&mut slot).await?;
        Ok(forms.clone())
    }

    /// Replace the whole collection and write it out.
    ///
    /// The collection is validated but never repaired.
    pub async fn persist(&self, forms: Vec<Form>) -> Result<Durability, FormError> {
        schema::validate_collection(&forms)?;
        let mut slot = self.forms.lock().await;
        let forms = slot.insert(forms);
        Ok(self.write_back(forms).await)
    }

    /// All forms, most recently updated first. Ties keep stored order.
    pub async fn list(&self) -> Result<Vec<Form>, FormError> {
        let mut forms = self.load().await?;
        forms.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(forms)
    }

    /// The form with this id, if any.
    pub async fn get(&self, id: &str) -> Result<Option<Form>, FormError> {
        let mut slot = self.forms.lock().await;
        let forms = self.loaded(&mut slot).await?;
        Ok(forms.iter().find(|f| f.id == id).cloned())
    }

    /// Create a form. The store picks the id and timestamp.
    pub async fn create(&self, input: FormInput) -> Result<Committed<Form>, FormError> {
        let mut slot = self.forms.lock().await;
        let forms = self.loaded(&mut slot).await?;

        let form = Form {
            id: assign_id(self.ids.as_ref(), self.clock.as_ref()),
            title: input.title,
            description: input.description,
            fields_count: input.fields_count,
            status: input.status,
            updated_at: self.clock.now(),
        };
        schema::validate_form(&form)?;
        if forms.iter().any(|f| f.id == form.id) {
            return Err(ValidationError::DuplicateId(form.id).into());
        }

        forms.push(form.clone());
        let durability = self.write_back(forms).await;
        tracing::debug!(id = %form.id, ?durability, "created form");

        Ok(Committed {
            value: form,
            durability,
        })
    }

    /// Merge a patch over an existing form.
    ///
    /// # Errors
    /// `NotFound` if no form has this id; `Validation` if the merged form is
    /// invalid. The stored form is untouched in both cases.
    pub async fn update(&self, id: &str, patch: FormPatch) -> Result<Committed<Form>, FormError> {
        let mut slot = self.forms.lock().await;
        let forms = self.loaded(&mut slot).await?;

        let index = forms
            .iter()
            .position(|f| f.id == id)
            .ok_or_else(|| FormError::NotFound(id.to_string()))?;

        let current = &forms[index];
        let mut merged = current.merged(&patch);
        merged.id = current.id.clone();
        merged.updated_at = next_timestamp(self.clock.now(), current.updated_at);
        schema::validate_form(&merged)?;

        forms[index] = merged.clone();
        let durability = self.write_back(forms).await;
        tracing::debug!(id = %id, ?durability, "updated form");

        Ok(Committed {
            value: merged,
            durability,
        })
    }

    /// Remove a form. `false` if there was nothing to remove.
    pub async fn delete(&self, id: &str) -> Result<Committed<bool>, FormError> {
        let mut slot = self.forms.lock().await;
        let forms = self.loaded(&mut slot).await?;

        let Some(index) = forms.iter().position(|f| f.id == id) else {
            return Ok(Committed {
                value: false,
                durability: Durability::Unchanged,
            });
        };

        forms.remove(index);
        let durability = self.write_back(forms).await;
        tracing::debug!(id = %id, ?durability, "deleted form");

        Ok(Committed {
            value: true,
            durability,
        })
    }

    // =========================================================================
    // Load
    // =========================================================================

    async fn loaded<'a>(
        &self,
        slot: &'a mut Option<Vec<Form>>,
    ) -> Result<&'a mut Vec<Form>, FormError> {
        if slot.is_none() {
            let forms = self.read_collection().await?;
            tracing::info!(
                backend = %self.backend.describe(),
                count = forms.len(),
                "loaded forms"
            );
            *slot = Some(forms);
        }
        Ok(slot.get_or_insert_with(Vec::new))
    }

    async fn read_collection(&self) -> Result<Vec<Form>, FormError> {
        let bytes = match self.backend.read().await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::info!(
                    backend = %self.backend.describe(),
                    error = %e,
                    "no readable forms document, starting empty"
                );
                return Ok(Vec::new());
            }
        };

        let raw: Value = match serde_json::from_slice(&bytes) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::error!(
                    backend = %self.backend.describe(),
                    error = %e,
                    "failed to parse forms document"
                );
                return self.recover(format!("unparseable forms document: {}", e));
            }
        };

        let invalid = match schema::validate_list(&raw) {
            Ok(forms) => return Ok(forms),
            Err(e) => e,
        };
        tracing::warn!(error = %invalid, "persisted forms failed validation, repairing");

        let Value::Array(items) = raw else {
            return self.recover(invalid.to_string());
        };

        let report = repair::repair(items, self.clock.as_ref(), self.ids.as_ref());
        tracing::warn!(
            kept = report.forms.len(),
            dropped = report.dropped.len(),
            ids_regenerated = report.ids_regenerated,
            timestamps_reset = report.timestamps_reset,
            counts_coerced = report.counts_coerced,
            "repaired persisted forms"
        );
        Ok(report.forms)
    }

    fn recover(&self, reason: String) -> Result<Vec<Form>, FormError> {
        match self.on_load_failure {
            OnLoadFailure::UseEmpty => {
                tracing::warn!(reason = %reason, "falling back to an empty form collection");
                Ok(Vec::new())
            }
            OnLoadFailure::Abort => Err(FormError::LoadAborted(reason)),
        }
    }

    // =========================================================================
    // Write
    // =========================================================================

    async fn write_back(&self, forms: &[Form]) -> Durability {
        let bytes = match serde_json::to_vec_pretty(forms) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(error = %e, "failed to serialize forms, keeping changes in memory");
                return Durability::MemoryOnly;
            }
        };

        match self.backend.write(&bytes).await {
            Ok(()) => Durability::Persisted,
            Err(e) => {
                tracing::warn!(
                    backend = %self.backend.describe(),
                    error = %e,
                    "form write skipped, keeping changes in memory only"
                );
                Durability::MemoryOnly
            }
        }
    }
}

/// Strictly after `previous`, so per-form timestamps never repeat or go back.
fn next_timestamp(now: DateTime<Utc>, previous: DateTime<Utc>) -> DateTime<Utc> {
    if now > previous {
        now
    } else {
        previous + Duration::milliseconds(1)
    }
}

// =============================================================================
// Builder
// =============================================================================

/// Builder for `FormStore`
#[derive(Debug)]
pub struct FormStoreBuilder {
    backend: Arc<dyn Backend>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    on_load_failure: OnLoadFailure,
}

impl FormStoreBuilder {
    fn new(backend: Arc<dyn Backend>) -> Self {
        Self {
            backend,
            clock: Arc::new(SystemClock),
            ids: Arc::new(RandomIds),
            on_load_failure: OnLoadFailure::default(),
        }
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn ids(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    pub fn on_load_failure(mut self, on_load_failure: OnLoadFailure) -> Self {
        self.on_load_failure = on_load_failure;
        self
    }

    pub fn build(self) -> FormStore {
        FormStore {
            backend: self.backend,
            clock: self.clock,
            ids: self.ids,
            on_load_failure: self.on_load_failure,
            forms: Mutex::new(None),
        }
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Form store errors
#[derive(Debug, thiserror::Error)]
pub enum FormError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("form not found: {0}")]
    NotFound(String),

    #[error("form store unavailable: {0}")]
    LoadAborted(String),
}

// =============================================================================
// Tests
// =============================================================================
