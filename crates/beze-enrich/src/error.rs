use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EnrichmentError {
    /// The collaborator could not be reached or answered with an error.
    #[error("{service} unavailable: {reason}")]
    Unavailable { service: &'static str, reason: String },

    /// The overall budget for one collaborator call ran out.
    #[error("{service} timed out after {after:?}")]
    Timeout { service: &'static str, after: Duration },

    #[error("{service} failed after {attempts} attempts")]
    RetriesExhausted { service: &'static str, attempts: u32 },

    /// The unit of work cannot be enriched as given.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Store error: {0}")]
    Store(#[from] beze_store::StoreError),

    #[error("Bus error: {0}")]
    Bus(#[from] beze_bus::BusError),
}

impl EnrichmentError {
    /// Whether the failure originates from an external collaborator.
    pub fn is_collaborator_failure(&self) -> bool {
        matches!(
            self,
            EnrichmentError::Unavailable { .. }
                | EnrichmentError::Timeout { .. }
                | EnrichmentError::RetriesExhausted { .. }
        )
    }
}
