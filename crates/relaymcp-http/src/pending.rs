//! Reply correlation for requests awaiting a response.

use std::collections::HashMap;

use parking_lot::Mutex;
use relaymcp_transport_traits::{JsonRpcMessage, MessageId, TransportError, TransportResult};
use tokio::sync::oneshot;
use tracing::{debug, warn};

type ReplySender = oneshot::Sender<TransportResult<JsonRpcMessage>>;

/// Pending-request table keyed by the string form of the request id.
///
/// Each entry is removed the moment it is resolved, cancelled, or failed, so a key has
/// at most one live waiter.
#[derive(Debug, Default)]
pub(crate) struct PendingRequests {
    waiters: Mutex<HashMap<String, ReplySender>>,
}

/// Receiving half of a registered request.
#[derive(Debug)]
pub(crate) struct PendingReply {
    key: String,
    receiver: oneshot::Receiver<TransportResult<JsonRpcMessage>>,
}

impl PendingReply {
    pub(crate) fn key(&self) -> &str {
        &self.key
    }

    /// Wait for the reply. A dropped sender means the table was torn down.
    pub(crate) async fn wait(self) -> TransportResult<JsonRpcMessage> {
        self.receiver.await.unwrap_or(Err(TransportError::Closed))
    }

    /// Take the reply if it has already arrived.
    pub(crate) fn try_take(&mut self) -> Option<TransportResult<JsonRpcMessage>> {
        self.receiver.try_recv().ok()
    }
}

impl PendingRequests {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn register(&self, id: &MessageId) -> TransportResult<PendingReply> {
        let key = id.key();
        let mut waiters = self.waiters.lock();
        if waiters.contains_key(&key) {
            return Err(TransportError::DuplicateRequestId(key));
        }
        let (tx, rx) = oneshot::channel();
        waiters.insert(key.clone(), tx);
        Ok(PendingReply { key, receiver: rx })
    }

    /// Hand `message` to the waiter for `key`. Returns `false` when nobody was waiting.
    pub(crate) fn resolve(&self, key: &str, message: JsonRpcMessage) -> bool {
        let Some(tx) = self.waiters.lock().remove(key) else {
            return false;
        };
        if tx.send(Ok(message)).is_err() {
            warn!("Reply for request {} arrived after its waiter went away", key);
        } else {
            debug!("Resolved pending request {}", key);
        }
        true
    }

    pub(crate) fn cancel(&self, key: &str) {
        self.waiters.lock().remove(key);
    }

    /// Fail every outstanding waiter with `error`.
    pub(crate) fn fail_all(&self, error: &TransportError) {
        let drained: Vec<_> = self.waiters.lock().drain().collect();
        if !drained.is_empty() {
            debug!("Failing {} pending requests: {}", drained.len(), error);
        }
        for (_, tx) in drained {
            let _ = tx.send(Err(error.clone()));
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.waiters.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_resolve_delivers_once() {
        let pending = PendingRequests::new();
        let reply = pending.register(&MessageId::Number(1)).unwrap();
        assert_eq!(reply.key(), "1");

        let message = JsonRpcMessage::response(1, json!({"ok": true}));
        assert!(pending.resolve("1", message.clone()));
        assert!(!pending.resolve("1", message.clone()));
        assert_eq!(pending.len(), 0);

        assert_eq!(reply.wait().await.unwrap(), message);
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let pending = PendingRequests::new();
        let _first = pending.register(&MessageId::from("a")).unwrap();

        assert_eq!(
            pending.register(&MessageId::from("a")).unwrap_err(),
            TransportError::DuplicateRequestId("a".to_string())
        );
    }

    #[test]
    fn test_cancel_frees_key() {
        let pending = PendingRequests::new();
        let reply = pending.register(&MessageId::Number(3)).unwrap();
        pending.cancel(reply.key());

        assert_eq!(pending.len(), 0);
        assert!(pending.register(&MessageId::Number(3)).is_ok());
    }

    #[tokio::test]
    async fn test_fail_all_wakes_waiters() {
        let pending = PendingRequests::new();
        let a = pending.register(&MessageId::Number(1)).unwrap();
        let b = pending.register(&MessageId::Number(2)).unwrap();

        pending.fail_all(&TransportError::Closed);

        assert_eq!(a.wait().await, Err(TransportError::Closed));
        assert_eq!(b.wait().await, Err(TransportError::Closed));
        assert_eq!(pending.len(), 0);
    }

    #[test]
    fn test_try_take_before_and_after_resolve() {
        let pending = PendingRequests::new();
        let mut reply = pending.register(&MessageId::Number(5)).unwrap();
        assert!(reply.try_take().is_none());

        pending.resolve("5", JsonRpcMessage::response(5, json!(null)));
        assert!(matches!(reply.try_take(), Some(Ok(_))));
    }

    #[tokio::test]
    async fn test_concurrent_resolution() {
        let pending = Arc::new(PendingRequests::new());
        let replies: Vec<_> = (0..32i64)
            .map(|i| pending.register(&MessageId::Number(i)).unwrap())
            .collect();

        let mut tasks = Vec::new();
        for i in 0..32i64 {
            let pending = Arc::clone(&pending);
            tasks.push(tokio::spawn(async move {
                pending.resolve(&i.to_string(), JsonRpcMessage::response(i, json!(i)))
            }));
        }
        for task in tasks {
            assert!(task.await.unwrap());
        }

        for (i, reply) in replies.into_iter().enumerate() {
            let message = reply.wait().await.unwrap();
            assert_eq!(message.id(), Some(&MessageId::Number(i as i64)));
        }
    }
}
