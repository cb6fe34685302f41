//! Forms Admin - Role-Gated Forms Administration
//!
//! A small service that lists, views, creates, edits and deletes form
//! records kept in a single JSON document.
//!
//! Features:
//! - Validated records with store-assigned ids and timestamps
//! - Load-time repair of malformed documents
//! - Write-through persistence that degrades to memory-only on a
//!   read-only filesystem
//! - JSON HTTP API with an admin-only mutation gate

pub mod backend;
pub mod clock;
pub mod config;
pub mod form;
pub mod http;
pub mod ids;
pub mod repair;
pub mod schema;
pub mod store;

pub use backend::{Backend, BackendError, FileBackend, MemoryBackend};
pub use config::{ConfigError, OnLoadFailure, StoreConfig};
pub use form::{Form, FormInput, FormPatch, FormStatus};
pub use schema::ValidationError;
pub use store::{Committed, Durability, FormError, FormStore};

// =============================================================================
// TigerStyle Constants
// =============================================================================

/// Default HTTP bind address
pub const HTTP_BIND_ADDRESS_DEFAULT: &str = "127.0.0.1:8285";

/// Application name
pub const APP_NAME: &str = "forms-admin";

/// Application version
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");
