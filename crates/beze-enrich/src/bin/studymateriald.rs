//! Study-material tagging daemon.
//!
//! Consumes attachment work units, asks the tagging service whether each is
//! study material, and catalogues the positive ones. Nothing is published.

use std::sync::Arc;

use anyhow::Context;
use beze_enrich::collaborators::HttpAttachmentClassifier;
use beze_enrich::{init_tracing, run_daemon, DaemonConfig, EnrichmentDaemon, FailurePolicy, StudyMaterialEnricher};
use beze_store::SqliteStore;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing("info,studymateriald=debug,beze_enrich=debug,beze_bus=debug");
    info!("Starting studymateriald v{}", env!("CARGO_PKG_VERSION"));

    let config = DaemonConfig::from_env();
    info!(?config, "Loaded configuration");

    let store = SqliteStore::open(&config.database_path).context("opening study material store")?;
    let (publisher, subscriber) = beze_bus::connect(&config.bus).context("connecting to the bus")?;

    let enricher = StudyMaterialEnricher::new(
        Arc::new(HttpAttachmentClassifier::new(
            config.tagger_url.clone(),
            config.attachments_bucket.clone(),
            config.request_timeout,
        )),
        Arc::new(store),
        config.tagger_retry,
    );

    run_daemon(
        EnrichmentDaemon::new(enricher, FailurePolicy::LogAndDrop),
        &config.attachment_topic,
        None,
        config.bus.router_config(),
        publisher,
        subscriber,
    )
    .await
}
