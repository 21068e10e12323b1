use std::sync::Arc;

use anyhow::Context;
use beze_bus::Router;
use beze_chat::{
    api, AppState, ChatConfig, ChatService, ChatTopics, DeliverySubscriber, HttpSessionValidator,
    SessionRegistry,
};
use beze_enrich::collaborators::HttpStructurizer;
use beze_store::SqliteStore;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,beze_chat=debug,beze_bus=debug")),
        )
        .init();

    info!("Starting beze chat service v{}", env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = ChatConfig::from_env();
    info!(?config, "Loaded configuration");

    // -----------------------------------------------------------------------
    // 3. Initialize subsystems (any failure here exits the process)
    // -----------------------------------------------------------------------
    let store = SqliteStore::open(&config.database_path)
        .with_context(|| format!("opening database {}", config.database_path.display()))?;

    let (publisher, subscriber) = beze_bus::connect(&config.bus).context("connecting to the bus")?;

    let validator = Arc::new(HttpSessionValidator::new(&config.auth_url, config.request_timeout)?);
    let structurizer = Arc::new(HttpStructurizer::new(
        config.structurization_url.clone(),
        config.request_timeout,
    ));

    let registry = Arc::new(SessionRegistry::new(
        config.session_write_timeout,
        config.session_queue,
    ));

    let service = Arc::new(ChatService::new(
        Arc::new(store.clone()),
        Arc::new(store.clone()),
        publisher.clone(),
        structurizer,
        config.structurization_retry,
        ChatTopics {
            delivery: config.delivery_topic.clone(),
            raw_voice: config.raw_voice_topic.clone(),
            attachment: config.attachment_topic.clone(),
        },
    ));

    // -----------------------------------------------------------------------
    // 4. Start the outbound fan-out
    // -----------------------------------------------------------------------
    let mut router = Router::new(config.bus.router_config());
    DeliverySubscriber::register(
        &mut router,
        &config.delivery_topics,
        subscriber.clone(),
        registry.clone(),
    )?;
    let mut router = router.start().await.context("starting the delivery router")?;
    info!(
        topics = ?config.delivery_topics,
        handlers = router.handler_count(),
        "Delivery router running"
    );

    // -----------------------------------------------------------------------
    // 5. Run the HTTP API server until Ctrl+C
    // -----------------------------------------------------------------------
    let app_state = AppState {
        service,
        registry: registry.clone(),
        validator,
        channels: Arc::new(store.clone()),
        messages: Arc::new(store),
        config: Arc::new(config.clone()),
    };

    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let mut server = tokio::spawn(api::serve(app_state, config.http_addr, async move {
        let _ = stop_rx.await;
    }));

    tokio::select! {
        result = &mut server => {
            router.close().await;
            registry.close().await;
            return match result {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => {
                    error!(error = %e, "HTTP server failed");
                    Err(e)
                }
                Err(e) => Err(e.into()),
            };
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    // Drain the bus first, then refuse new broadcasts, then stop HTTP.
    router.close().await;
    registry.close().await;
    let _ = stop_tx.send(());
    match server.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!(error = %e, "HTTP server failed during shutdown"),
        Err(e) => error!(error = %e, "HTTP server task failed"),
    }

    subscriber.close().await?;
    publisher.close().await?;
    info!("Shutdown complete");
    Ok(())
}
