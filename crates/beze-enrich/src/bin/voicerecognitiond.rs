//! Voice transcription daemon.
//!
//! Consumes raw voice messages, asks the speech-to-text service for a
//! transcription, stores it on the message, and publishes the message back
//! to the delivery topic as `voice_recognized`.

use std::sync::Arc;

use anyhow::Context;
use beze_enrich::collaborators::HttpSpeechToText;
use beze_enrich::{init_tracing, run_daemon, DaemonConfig, EnrichmentDaemon, FailurePolicy, VoiceRecognitionEnricher};
use beze_store::SqliteStore;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing("info,voicerecognitiond=debug,beze_enrich=debug,beze_bus=debug");
    info!("Starting voicerecognitiond v{}", env!("CARGO_PKG_VERSION"));

    let config = DaemonConfig::from_env();
    info!(?config, "Loaded configuration");

    let store = SqliteStore::open(&config.database_path).context("opening message store")?;
    let (publisher, subscriber) = beze_bus::connect(&config.bus).context("connecting to the bus")?;

    let enricher = VoiceRecognitionEnricher::new(
        Arc::new(HttpSpeechToText::new(
            config.voice_recognition_url.clone(),
            config.request_timeout,
        )),
        Arc::new(store),
        config.voice_recognition_retry,
        config.voice_bucket.clone(),
    );

    run_daemon(
        EnrichmentDaemon::new(enricher, FailurePolicy::LogAndDrop),
        &config.raw_voice_topic,
        Some(&config.delivery_topic),
        config.bus.router_config(),
        publisher,
        subscriber,
    )
    .await
}
