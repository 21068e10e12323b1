//! Per-message middleware applied by the router, outermost first:
//! correlation id, timeout, panic recovery.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use futures::FutureExt;
use uuid::Uuid;

use crate::error::HandlerError;
use crate::message::BusMessage;

/// Return the message's correlation id, injecting a fresh one if missing.
pub fn ensure_correlation_id(message: &mut BusMessage) -> String {
    match message.correlation_id() {
        Some(id) if !id.is_empty() => id.to_string(),
        _ => {
            let id = Uuid::new_v4().to_string();
            message.set_correlation_id(id.clone());
            id
        }
    }
}

/// Propagate the correlation id onto every produced message.
pub fn stamp_correlation_id(produced: &mut [BusMessage], id: &str) {
    for message in produced {
        message.set_correlation_id(id);
    }
}

/// Fail the handler once `limit` elapses. The handler future is dropped.
pub async fn timeout<F, T>(limit: Duration, fut: F) -> Result<T, HandlerError>
where
    F: Future<Output = Result<T, HandlerError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(HandlerError::Timeout(limit)),
    }
}

/// Turn a panic inside the handler into a [`HandlerError::Panicked`].
pub async fn recoverer<F, T>(fut: F) -> Result<T, HandlerError>
where
    F: Future<Output = Result<T, HandlerError>>,
{
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(result) => result,
        Err(panic) => Err(HandlerError::Panicked(panic_message(panic.as_ref()))),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
