//! Session registry: the table of live connections.
//!
//! Each live connection registers under a [`SessionId`] with its
//! [`SessionTags`] and gets back the receiving end of a bounded outbound
//! queue. The connection task drains that queue into its socket; the
//! registry only ever writes into the queue, bounded by a per-write
//! timeout, so a stuck socket cannot stall delivery to anyone else.
//!
//! Broadcast evaluates its predicate against every live session at call
//! time. There is no index by user.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use beze_shared::{ChannelId, SessionId, UserId};
use futures::future::join_all;
use tokio::sync::mpsc::error::SendTimeoutError;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};

use crate::error::ChatError;

/// Outbound frame as shared between every matching session.
pub type Frame = Arc<str>;

/// Tags attached to a live session at registration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionTags {
    /// Authenticated owner. A session without one never receives broadcasts.
    pub user_id: Option<UserId>,
    /// Channel the client currently has open, if it said so.
    pub channel_id: Option<ChannelId>,
}

impl SessionTags {
    pub fn for_user(user_id: UserId) -> Self {
        Self {
            user_id: Some(user_id),
            channel_id: None,
        }
    }
}

struct Session {
    tags: SessionTags,
    outbound: mpsc::Sender<Frame>,
}

/// Counts from one broadcast.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub matched: usize,
    pub delivered: usize,
    pub failed: usize,
}

pub struct SessionRegistry {
    sessions: RwLock<HashMap<SessionId, Arc<Session>>>,
    write_timeout: Duration,
    queue_size: usize,
    closed: AtomicBool,
}

impl SessionRegistry {
    pub fn new(write_timeout: Duration, queue_size: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            write_timeout,
            queue_size: queue_size.max(1),
            closed: AtomicBool::new(false),
        }
    }

    /// Add a live session. Re-registering an id replaces the previous entry,
    /// whose queue is then closed.
    pub async fn register(
        &self,
        id: SessionId,
        tags: SessionTags,
    ) -> Result<mpsc::Receiver<Frame>, ChatError> {
        if self.is_closed() {
            return Err(ChatError::ShuttingDown);
        }

        let (tx, rx) = mpsc::channel(self.queue_size);
        let user = tags.user_id.clone();
        let replaced = self.sessions.write().await.insert(
            id,
            Arc::new(Session {
                tags,
                outbound: tx,
            }),
        );
        if replaced.is_some() {
            warn!(session = %id, "Session id re-registered, previous session replaced");
        }
        info!(session = %id, user = ?user, "Session registered");
        Ok(rx)
    }

    pub async fn unregister(&self, id: SessionId) {
        if self.sessions.write().await.remove(&id).is_some() {
            info!(session = %id, "Session unregistered");
        }
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Write one frame to a single session, e.g. an error for the sender.
    pub async fn send_to(&self, id: SessionId, frame: impl Into<Frame>) -> bool {
        let session = self.sessions.read().await.get(&id).cloned();
        match session {
            Some(session) => self.write(id, &session, frame.into()).await,
            None => {
                debug!(session = %id, "Send to unknown session");
                false
            }
        }
    }

    /// Write `frame` to every live session whose owner satisfies `predicate`.
    ///
    /// The session table is snapshotted before any write, so concurrent
    /// register and unregister calls never wait on a slow session. Writes
    /// run concurrently, each bounded by the registry's write timeout.
    pub async fn broadcast<P>(&self, frame: impl Into<Frame>, predicate: P) -> Result<BroadcastReport, ChatError>
    where
        P: Fn(&UserId, &SessionTags) -> bool,
    {
        if self.is_closed() {
            return Err(ChatError::ShuttingDown);
        }

        let frame = frame.into();
        let targets: Vec<(SessionId, Arc<Session>)> = {
            let sessions = self.sessions.read().await;
            sessions
                .iter()
                .filter(|(_, s)| match &s.tags.user_id {
                    Some(user) => predicate(user, &s.tags),
                    None => false,
                })
                .map(|(id, s)| (*id, s.clone()))
                .collect()
        };

        let writes = targets
            .iter()
            .map(|(id, session)| self.write(*id, session, frame.clone()));
        let results = join_all(writes).await;

        let delivered = results.iter().filter(|ok| **ok).count();
        let report = BroadcastReport {
            matched: targets.len(),
            delivered,
            failed: targets.len() - delivered,
        };
        debug!(?report, "Broadcast complete");
        Ok(report)
    }

    /// Refuse new registrations and broadcasts, and drop every live session.
    pub async fn close(&self) {
        self.closed.store(true, Ordering::Release);
        let drained = {
            let mut sessions = self.sessions.write().await;
            let count = sessions.len();
            sessions.clear();
            count
        };
        info!(sessions = drained, "Session registry closed");
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    async fn write(&self, id: SessionId, session: &Session, frame: Frame) -> bool {
        match session.outbound.send_timeout(frame, self.write_timeout).await {
            Ok(()) => true,
            Err(SendTimeoutError::Timeout(_)) => {
                warn!(session = %id, timeout = ?self.write_timeout, "Session write timed out, frame dropped");
                false
            }
            Err(SendTimeoutError::Closed(_)) => {
                debug!(session = %id, "Session queue closed, frame dropped");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> SessionRegistry {
        SessionRegistry::new(Duration::from_millis(50), 4)
    }

    #[tokio::test]
    async fn test_broadcast_reaches_only_matching_sessions() {
        let registry = registry();
        let mut receivers = Vec::new();
        for user in ["alice", "bob", "carol", "dave", "erin"] {
            let rx = registry
                .register(SessionId::new(), SessionTags::for_user(UserId::from(user)))
                .await
                .unwrap();
            receivers.push((user, rx));
        }

        let wanted = [UserId::from("alice"), UserId::from("carol")];
        let report = registry
            .broadcast("hi", |user, _| wanted.contains(user))
            .await
            .unwrap();
        assert_eq!(report.matched, 2);
        assert_eq!(report.delivered, 2);

        for (user, rx) in receivers.iter_mut() {
            let got = rx.try_recv().ok();
            if *user == "alice" || *user == "carol" {
                assert_eq!(got.as_deref(), Some("hi"));
            } else {
                assert!(got.is_none(), "{user} should not receive the frame");
            }
        }
    }

    #[tokio::test]
    async fn test_session_without_identity_never_matches() {
        let registry = registry();
        let mut anonymous = registry
            .register(SessionId::new(), SessionTags::default())
            .await
            .unwrap();

        let report = registry.broadcast("hi", |_, _| true).await.unwrap();
        assert_eq!(report.matched, 0);
        assert!(anonymous.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_two_sessions_of_one_user_both_receive() {
        let registry = registry();
        let alice = UserId::from("alice");
        let mut a = registry
            .register(SessionId::new(), SessionTags::for_user(alice.clone()))
            .await
            .unwrap();
        let mut b = registry
            .register(SessionId::new(), SessionTags::for_user(alice.clone()))
            .await
            .unwrap();

        registry.broadcast("hi", |u, _| *u == alice).await.unwrap();
        assert!(a.try_recv().is_ok());
        assert!(b.try_recv().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stuck_session_does_not_block_others() {
        let registry = SessionRegistry::new(Duration::from_millis(100), 1);
        let alice = UserId::from("alice");
        let bob = UserId::from("bob");

        // Never drained: its single slot fills on the first frame.
        let _stuck = registry
            .register(SessionId::new(), SessionTags::for_user(alice.clone()))
            .await
            .unwrap();
        let mut live = registry
            .register(SessionId::new(), SessionTags::for_user(bob.clone()))
            .await
            .unwrap();

        registry.broadcast("1", |_, _| true).await.unwrap();
        assert_eq!(live.recv().await.as_deref(), Some("1"));

        let report = registry.broadcast("2", |_, _| true).await.unwrap();
        assert_eq!(report.matched, 2);
        assert_eq!(report.delivered, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(live.recv().await.as_deref(), Some("2"));
    }

    #[tokio::test]
    async fn test_unregistered_session_not_targeted() {
        let registry = registry();
        let id = SessionId::new();
        let mut rx = registry
            .register(id, SessionTags::for_user(UserId::from("alice")))
            .await
            .unwrap();
        registry.unregister(id).await;

        let report = registry.broadcast("hi", |_, _| true).await.unwrap();
        assert_eq!(report.matched, 0);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_send_to_targets_one_session() {
        let registry = registry();
        let alice = UserId::from("alice");
        let sender = SessionId::new();
        let mut mine = registry
            .register(sender, SessionTags::for_user(alice.clone()))
            .await
            .unwrap();
        let mut other = registry
            .register(SessionId::new(), SessionTags::for_user(alice))
            .await
            .unwrap();

        assert!(registry.send_to(sender, r#"{"error":"bad"}"#).await);
        assert!(mine.try_recv().is_ok());
        assert!(other.try_recv().is_err());
        assert!(!registry.send_to(SessionId::new(), "x").await);
    }

    #[tokio::test]
    async fn test_closed_registry_refuses_work() {
        let registry = registry();
        let mut rx = registry
            .register(SessionId::new(), SessionTags::for_user(UserId::from("alice")))
            .await
            .unwrap();
        registry.close().await;

        assert!(rx.recv().await.is_none());
        assert!(matches!(
            registry.broadcast("hi", |_, _| true).await,
            Err(ChatError::ShuttingDown)
        ));
        assert!(matches!(
            registry.register(SessionId::new(), SessionTags::default()).await,
            Err(ChatError::ShuttingDown)
        ));
    }
}
