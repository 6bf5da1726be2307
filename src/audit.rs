/// Audit event pipeline
///
/// Events are handed to a bounded channel consumed by a single worker task,
/// so a slow or failing sink never blocks or fails an auth operation. When
/// the channel is full the event is dropped and logged locally. Dropping
/// every `AuditLogger` clone closes the channel; awaiting the returned join
/// handle drains the worker.
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Per-call budget for the sink; a stuck sink only costs one event
const SINK_TIMEOUT: Duration = Duration::from_secs(2);

/// Kinds of audited operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditKind {
    Login,
    Logout,
    TokenRefresh,
    TokenTheft,
    TokenRevocation,
    PasswordResetRequest,
    PasswordReset,
    InvitationCreated,
    InvitationAccepted,
    InvitationRevoked,
}

/// A single audit event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub kind: AuditKind,
    pub account_id: Option<Uuid>,
    pub email: Option<String>,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub success: bool,
    pub detail: Option<String>,
    pub at: DateTime<Utc>,
}

impl AuditEvent {
    /// Event skeleton; callers fill the optional fields with a struct update
    pub fn new(kind: AuditKind, success: bool) -> Self {
        Self {
            kind,
            account_id: None,
            email: None,
            ip: None,
            user_agent: None,
            success,
            detail: None,
            at: Utc::now(),
        }
    }
}

/// Fire-and-forget audit sink
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, event: AuditEvent);
}

/// Sink that emits audit events as structured tracing events
#[derive(Default)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn record(&self, event: AuditEvent) {
        tracing::info!(
            kind = ?event.kind,
            account_id = ?event.account_id,
            email = ?event.email,
            success = event.success,
            detail = ?event.detail,
            "audit event"
        );
    }
}

/// Non-blocking handle for recording audit events
#[derive(Clone)]
pub struct AuditLogger {
    tx: mpsc::Sender<AuditEvent>,
}

impl AuditLogger {
    /// Spawn the worker task and return the logger plus its join handle
    pub fn spawn(sink: Arc<dyn AuditSink>, capacity: usize) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<AuditEvent>(capacity);

        let handle = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                if tokio::time::timeout(SINK_TIMEOUT, sink.record(event))
                    .await
                    .is_err()
                {
                    tracing::warn!("audit sink timed out, event dropped");
                }
            }
        });

        (Self { tx }, handle)
    }

    /// Queue an event without blocking; drops the event when the channel is
    /// full or closed
    pub fn record(&self, event: AuditEvent) {
        if self.tx.try_send(event).is_err() {
            tracing::warn!("audit channel full or closed, event dropped");
        }
    }
}
