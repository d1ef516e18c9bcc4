//! Error taxonomy for the embedding boundary.
//!
//! Only two conditions are worth a typed error: a configuration problem
//! (missing credential, unsupported provider name), which fails fast before
//! any I/O, and a provider failure (remote call rejected or returned a
//! malformed payload), which propagates to the caller. Missing documents are
//! `Option::None` and empty inputs are empty collections, never errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum KbError {
    /// Fatal setup problem detected before any I/O is attempted.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// An embedding backend failed while producing vectors.
    #[error("embedding provider error: {0}")]
    Provider(String),
}
