//! Chat service configuration loaded from environment variables.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use beze_bus::BusConfig;
use beze_enrich::RetryPolicy;
use beze_shared::constants::{ATTACHMENT_TOPIC, DEFAULT_HTTP_PORT, DELIVERY_TOPIC, MAX_FRAME_SIZE, RAW_VOICE_TOPIC};

#[derive(Debug, Clone)]
pub struct ChatConfig {
    /// Env: `HTTP_ADDR`
    /// Default: `0.0.0.0:8080`
    pub http_addr: SocketAddr,

    /// Env: `DATABASE_PATH`
    /// Default: `./data/beze.db`
    pub database_path: PathBuf,

    pub bus: BusConfig,

    /// Topic inbound messages are published on.
    /// Env: `DELIVERY_TOPIC`
    pub delivery_topic: String,

    /// Topics the outbound fan-out subscribes to, one handler each.
    /// Env: `DELIVERY_TOPICS` (comma-separated)
    /// Default: the delivery topic only.
    pub delivery_topics: Vec<String>,

    /// Env: `RAW_VOICE_TOPIC`
    pub raw_voice_topic: String,

    /// Env: `ATTACHMENT_TOPIC`
    pub attachment_topic: String,

    /// Session validation service.
    /// Env: `AUTH_SERVICE_URL`
    pub auth_url: String,

    /// Env: `AI_STRUCTURIZATION_URL`
    pub structurization_url: String,

    /// Env: `AI_STRUCTURIZATION_TIMEOUT_SECS`, `AI_STRUCTURIZATION_MAX_RETRIES`
    pub structurization_retry: RetryPolicy,

    /// Per-request HTTP timeout for collaborator calls.
    pub request_timeout: Duration,

    /// Bound on one write to a live session during a broadcast.
    /// Env: `SESSION_WRITE_TIMEOUT_MS`
    pub session_write_timeout: Duration,

    /// Outbound frames buffered per live session.
    pub session_queue: usize,

    pub max_frame_size: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            http_addr: ([0, 0, 0, 0], DEFAULT_HTTP_PORT).into(),
            database_path: PathBuf::from("./data/beze.db"),
            bus: BusConfig::default(),
            delivery_topic: DELIVERY_TOPIC.to_string(),
            delivery_topics: vec![DELIVERY_TOPIC.to_string()],
            raw_voice_topic: RAW_VOICE_TOPIC.to_string(),
            attachment_topic: ATTACHMENT_TOPIC.to_string(),
            auth_url: "http://localhost:8090".to_string(),
            structurization_url: "http://localhost:8003".to_string(),
            structurization_retry: RetryPolicy::new(3, Duration::from_secs(10)),
            request_timeout: Duration::from_secs(5),
            session_write_timeout: Duration::from_secs(2),
            session_queue: 64,
            max_frame_size: MAX_FRAME_SIZE,
        }
    }
}

impl ChatConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let mut config = Self {
            bus: BusConfig::from_env(),
            ..Self::default()
        };

        if let Ok(addr) = std::env::var("HTTP_ADDR") {
            if let Ok(parsed) = addr.parse::<SocketAddr>() {
                config.http_addr = parsed;
            } else {
                tracing::warn!(value = %addr, "Invalid HTTP_ADDR, using default");
            }
        }

        if let Ok(path) = std::env::var("DATABASE_PATH") {
            config.database_path = PathBuf::from(path);
        }

        if let Ok(topic) = std::env::var("DELIVERY_TOPIC") {
            if !topic.trim().is_empty() {
                config.delivery_topics = vec![topic.clone()];
                config.delivery_topic = topic;
            }
        }

        if let Ok(list) = std::env::var("DELIVERY_TOPICS") {
            let topics = parse_topic_list(&list);
            if topics.is_empty() {
                tracing::warn!(value = %list, "Empty DELIVERY_TOPICS, using default");
            } else {
                config.delivery_topics = topics;
            }
        }

        if let Ok(topic) = std::env::var("RAW_VOICE_TOPIC") {
            config.raw_voice_topic = topic;
        }

        if let Ok(topic) = std::env::var("ATTACHMENT_TOPIC") {
            config.attachment_topic = topic;
        }

        if let Ok(url) = std::env::var("AUTH_SERVICE_URL") {
            config.auth_url = url;
        }

        if let Ok(url) = std::env::var("AI_STRUCTURIZATION_URL") {
            config.structurization_url = url;
        }

        if let Ok(val) = std::env::var("AI_STRUCTURIZATION_TIMEOUT_SECS") {
            match val.parse::<u64>() {
                Ok(secs) if secs > 0 => config.structurization_retry.timeout = Duration::from_secs(secs),
                _ => tracing::warn!(value = %val, "Invalid AI_STRUCTURIZATION_TIMEOUT_SECS, using default"),
            }
        }

        if let Ok(val) = std::env::var("AI_STRUCTURIZATION_MAX_RETRIES") {
            match val.parse::<u32>() {
                Ok(n) if n > 0 => config.structurization_retry.max_attempts = n,
                _ => tracing::warn!(value = %val, "Invalid AI_STRUCTURIZATION_MAX_RETRIES, using default"),
            }
        }

        if let Ok(val) = std::env::var("SESSION_WRITE_TIMEOUT_MS") {
            match val.parse::<u64>() {
                Ok(ms) if ms > 0 => config.session_write_timeout = Duration::from_millis(ms),
                _ => tracing::warn!(value = %val, "Invalid SESSION_WRITE_TIMEOUT_MS, using default"),
            }
        }

        config
    }
}

fn parse_topic_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(String::from)
        .collect()
}
