//! # beze-enrich
//!
//! Asynchronous enrichment of chat content by external AI collaborators.
//!
//! An [`Enricher`] turns one decoded unit of work into an [`Outcome`];
//! [`EnrichmentDaemon`] adapts it to a bus handler and applies a named
//! [`FailurePolicy`] to everything that goes wrong. Two instantiations ship
//! as binaries: voice transcription (`voicerecognitiond`) and study-material
//! tagging (`studymateriald`).

pub mod collaborators;
pub mod config;
pub mod daemon;
pub mod error;
pub mod retry;
pub mod study_material;
pub mod voice_recognition;

pub use config::DaemonConfig;
pub use daemon::{run_daemon, EnrichmentDaemon, Enricher, FailurePolicy, Outcome};
pub use error::EnrichmentError;
pub use retry::RetryPolicy;
pub use study_material::StudyMaterialEnricher;
pub use voice_recognition::VoiceRecognitionEnricher;

/// Install the tracing subscriber used by every daemon binary.
pub fn init_tracing(default_filter: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .init();
}
