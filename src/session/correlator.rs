//! Request/response correlation over the fire-and-forget push channel.
//!
//! Each outbound request gets a fresh `requestid`. The pending table maps that
//! id to a oneshot completion; the first matching response or error removes
//! the entry and completes it, so every request resolves exactly once.

use crate::error::SdkError;
use crate::shared::RequestId;
use crate::ws::{Method, RequestEnvelope, Transport};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;

type Completion = oneshot::Sender<Result<serde_json::Value, SdkError>>;

struct PendingRequest {
    tx: Completion,
    submitted_at: DateTime<Utc>,
    method: Method,
    uri: String,
}

/// Correlates outbound requests with inbound responses.
pub struct RequestCorrelator {
    transport: Arc<dyn Transport>,
    pending: Arc<DashMap<RequestId, PendingRequest>>,
    timeout: Duration,
}

impl RequestCorrelator {
    pub fn new(transport: Arc<dyn Transport>, timeout: Duration) -> Self {
        Self {
            transport,
            pending: Arc::new(DashMap::new()),
            timeout,
        }
    }

    /// Register a pending entry and hand the id-tagged envelope to the transport.
    ///
    /// A transport failure rejects the entry that was just registered; the
    /// error surfaces from [`ResponseHandle::wait`].
    pub fn send(&self, method: Method, uri: &str, body: serde_json::Value) -> ResponseHandle {
        let requestid = RequestId::generate();
        let (tx, rx) = oneshot::channel();

        self.pending.insert(
            requestid.clone(),
            PendingRequest {
                tx,
                submitted_at: Utc::now(),
                method,
                uri: uri.to_string(),
            },
        );

        let envelope = RequestEnvelope {
            method,
            uri: uri.to_string(),
            requestid: requestid.clone(),
            body,
        };
        if let Err(e) = self.transport.send(envelope) {
            tracing::warn!("Send failed for {} {} ({}): {}", method, uri, requestid, e);
            self.reject(Some(&requestid), SdkError::Transport(e));
        }

        ResponseHandle {
            id: requestid,
            rx,
            pending: self.pending.clone(),
            timeout: self.timeout,
        }
    }

    /// Send and wait for the correlated response.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: serde_json::Value,
    ) -> Result<serde_json::Value, SdkError> {
        self.send(method, uri, body).wait().await
    }

    /// Complete a pending request successfully. Returns `false` when the id is
    /// absent or unknown, in which case nothing happens.
    pub fn resolve(&self, requestid: Option<&RequestId>, value: serde_json::Value) -> bool {
        self.complete(requestid, Ok(value))
    }

    /// Complete a pending request with an error.
    pub fn reject(&self, requestid: Option<&RequestId>, error: SdkError) -> bool {
        self.complete(requestid, Err(error))
    }

    fn complete(
        &self,
        requestid: Option<&RequestId>,
        result: Result<serde_json::Value, SdkError>,
    ) -> bool {
        let Some(id) = requestid else {
            tracing::debug!("Response without requestid ignored");
            return false;
        };
        match self.pending.remove(id) {
            Some((_, pending)) => {
                let elapsed = Utc::now() - pending.submitted_at;
                tracing::debug!(
                    elapsed_ms = elapsed.num_milliseconds(),
                    ok = result.is_ok(),
                    "Completed {} {} ({})",
                    pending.method,
                    pending.uri,
                    id
                );
                // The caller may have stopped waiting; the entry is gone either way.
                let _ = pending.tx.send(result);
                true
            }
            None => {
                tracing::debug!("Unmatched response for requestid {}", id);
                false
            }
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn is_pending(&self, requestid: &RequestId) -> bool {
        self.pending.contains_key(requestid)
    }

    /// Fail every pending request with `SessionClosed`.
    pub fn fail_all(&self) {
        let ids: Vec<RequestId> = self.pending.iter().map(|e| e.key().clone()).collect();
        if !ids.is_empty() {
            tracing::info!("Failing {} pending request(s)", ids.len());
        }
        for id in ids {
            self.reject(Some(&id), SdkError::SessionClosed);
        }
    }
}

// ─── ResponseHandle ──────────────────────────────────────────────────────────

/// The caller's side of one pending request.
///
/// Dropping the handle removes the pending entry.
pub struct ResponseHandle {
    id: RequestId,
    rx: oneshot::Receiver<Result<serde_json::Value, SdkError>>,
    pending: Arc<DashMap<RequestId, PendingRequest>>,
    timeout: Duration,
}

impl ResponseHandle {
    pub fn id(&self) -> &RequestId {
        &self.id
    }

    /// Wait for the response, failing with `SdkError::Timeout` once the
    /// request timeout elapses.
    pub async fn wait(mut self) -> Result<serde_json::Value, SdkError> {
        match tokio::time::timeout(self.timeout, &mut self.rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(SdkError::SessionClosed),
            Err(_) => {
                if self.pending.remove(&self.id).is_none() {
                    // Completed concurrently with the deadline.
                    if let Ok(result) = self.rx.try_recv() {
                        return result;
                    }
                }
                tracing::warn!(
                    "Request {} timed out after {}ms",
                    self.id,
                    self.timeout.as_millis()
                );
                Err(SdkError::Timeout {
                    requestid: self.id.clone(),
                    after_ms: self.timeout.as_millis() as u64,
                })
            }
        }
    }
}

impl Drop for ResponseHandle {
    fn drop(&mut self) {
        self.pending.remove(&self.id);
    }
}

impl std::fmt::Debug for ResponseHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseHandle")
            .field("id", &self.id)
            .field("timeout", &self.timeout)
            .finish()
    }
}
