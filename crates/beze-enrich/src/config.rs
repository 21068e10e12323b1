//! Daemon configuration loaded from environment variables.

use std::path::PathBuf;
use std::time::Duration;

use beze_bus::BusConfig;
use beze_shared::constants::{ATTACHMENTS_BUCKET, ATTACHMENT_TOPIC, DELIVERY_TOPIC, RAW_VOICE_TOPIC, VOICE_MESSAGES_BUCKET};

use crate::retry::RetryPolicy;

#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub bus: BusConfig,

    /// Env: `DATABASE_PATH`
    /// Default: `./data/beze.db`
    pub database_path: PathBuf,

    /// Env: `DELIVERY_TOPIC`
    pub delivery_topic: String,
    /// Env: `RAW_VOICE_TOPIC`
    pub raw_voice_topic: String,
    /// Env: `ATTACHMENT_TOPIC`
    pub attachment_topic: String,

    pub voice_bucket: String,
    pub attachments_bucket: String,

    /// Env: `AI_VOICE_RECOGNITION_URL`
    pub voice_recognition_url: String,
    /// Env: `AI_VOICE_RECOGNITION_TIMEOUT_SECS`, `AI_VOICE_RECOGNITION_MAX_RETRIES`
    pub voice_recognition_retry: RetryPolicy,

    /// Env: `AI_TAGGER_URL`
    pub tagger_url: String,
    /// Env: `AI_TAGGER_TIMEOUT_SECS`, `AI_TAGGER_MAX_RETRIES`
    pub tagger_retry: RetryPolicy,

    /// Per-request HTTP timeout for collaborator calls.
    pub request_timeout: Duration,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            bus: BusConfig::default(),
            database_path: PathBuf::from("./data/beze.db"),
            delivery_topic: DELIVERY_TOPIC.to_string(),
            raw_voice_topic: RAW_VOICE_TOPIC.to_string(),
            attachment_topic: ATTACHMENT_TOPIC.to_string(),
            voice_bucket: VOICE_MESSAGES_BUCKET.to_string(),
            attachments_bucket: ATTACHMENTS_BUCKET.to_string(),
            voice_recognition_url: "http://localhost:8001".to_string(),
            voice_recognition_retry: RetryPolicy::new(3, Duration::from_secs(10)),
            tagger_url: "http://localhost:8002".to_string(),
            tagger_retry: RetryPolicy::new(3, Duration::from_secs(10)),
            request_timeout: Duration::from_secs(5),
        }
    }
}

impl DaemonConfig {
    pub fn from_env() -> Self {
        let mut config = Self {
            bus: BusConfig::from_env(),
            ..Self::default()
        };

        if let Ok(path) = std::env::var("DATABASE_PATH") {
            config.database_path = PathBuf::from(path);
        }

        override_string("DELIVERY_TOPIC", &mut config.delivery_topic);
        override_string("RAW_VOICE_TOPIC", &mut config.raw_voice_topic);
        override_string("ATTACHMENT_TOPIC", &mut config.attachment_topic);
        override_string("AI_VOICE_RECOGNITION_URL", &mut config.voice_recognition_url);
        override_string("AI_TAGGER_URL", &mut config.tagger_url);

        override_retry(
            "AI_VOICE_RECOGNITION_TIMEOUT_SECS",
            "AI_VOICE_RECOGNITION_MAX_RETRIES",
            &mut config.voice_recognition_retry,
        );
        override_retry("AI_TAGGER_TIMEOUT_SECS", "AI_TAGGER_MAX_RETRIES", &mut config.tagger_retry);

        config
    }
}

fn override_string(var: &str, target: &mut String) {
    if let Ok(val) = std::env::var(var) {
        if !val.trim().is_empty() {
            *target = val;
        }
    }
}

fn override_retry(timeout_var: &str, retries_var: &str, target: &mut RetryPolicy) {
    if let Ok(val) = std::env::var(timeout_var) {
        match val.parse::<u64>() {
            Ok(secs) if secs > 0 => target.timeout = Duration::from_secs(secs),
            _ => tracing::warn!(var = timeout_var, value = %val, "Invalid timeout, using default"),
        }
    }
    if let Ok(val) = std::env::var(retries_var) {
        match val.parse::<u32>() {
            Ok(n) if n > 0 => target.max_attempts = n,
            _ => tracing::warn!(var = retries_var, value = %val, "Invalid retry count, using default"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_topics() {
        let config = DaemonConfig::default();
        assert_eq!(config.delivery_topic, "xb.msg.pub");
        assert_eq!(config.raw_voice_topic, "xb.voice.new");
        assert_eq!(config.attachment_topic, "xb.study_material.attachments");
        assert!(config.voice_recognition_retry.timeout < config.bus.handler_timeout);
    }
}
