//! In-memory transport driven by the caller.
//!
//! Every connect hands out a fresh session that records what it sends.
//! Lifecycle events are pushed with [`ScriptedConnector::emit`], or queued
//! with [`ScriptedConnector::with_script`] to be replayed on every connect.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{Connector, MediaPayload, Transport, TransportEvent};
use crate::address::ChatId;
use crate::error::GatewayError;

/// A message accepted by a scripted transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SentMessage {
    Text {
        to: ChatId,
        body: String,
    },
    Document {
        to: ChatId,
        media: MediaPayload,
        caption: Option<String>,
    },
}

#[derive(Default)]
struct Inner {
    script: Mutex<Vec<TransportEvent>>,
    /// Held while a script is being replayed so emits queue behind it.
    replay: Arc<tokio::sync::Mutex<()>>,
    events: Mutex<Option<mpsc::Sender<TransportEvent>>>,
    sent: Mutex<Vec<SentMessage>>,
    send_failure: Mutex<Option<String>>,
    hang_sends: AtomicBool,
    refuse_connects: AtomicBool,
    connects: AtomicUsize,
    shutdowns: AtomicUsize,
    send_attempts: AtomicUsize,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Connector whose sessions are controlled from the outside.
#[derive(Clone, Default)]
pub struct ScriptedConnector {
    inner: Arc<Inner>,
}

impl ScriptedConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replay `events` at the start of every new session.
    pub fn with_script(self, events: Vec<TransportEvent>) -> Self {
        *lock(&self.inner.script) = events;
        self
    }

    /// Push an event into the current session.
    ///
    /// Returns `false` when no session is listening.
    pub async fn emit(&self, event: TransportEvent) -> bool {
        let _replayed = self.inner.replay.lock().await;
        let sender = lock(&self.inner.events).clone();
        match sender {
            Some(tx) => tx.send(event).await.is_ok(),
            None => false,
        }
    }

    /// Make every send fail with `detail` (or succeed again with `None`).
    pub fn fail_sends(&self, detail: Option<&str>) {
        *lock(&self.inner.send_failure) = detail.map(str::to_string);
    }

    /// Make every send block forever.
    pub fn hang_sends(&self, hang: bool) {
        self.inner.hang_sends.store(hang, Ordering::SeqCst);
    }

    /// Make connect attempts fail.
    pub fn refuse_connects(&self, refuse: bool) {
        self.inner.refuse_connects.store(refuse, Ordering::SeqCst);
    }

    /// Number of successful connects so far.
    pub fn connect_count(&self) -> usize {
        self.inner.connects.load(Ordering::SeqCst)
    }

    /// Number of sessions shut down so far.
    pub fn shutdown_count(&self) -> usize {
        self.inner.shutdowns.load(Ordering::SeqCst)
    }

    /// Number of send calls that reached a transport, successful or not.
    pub fn send_attempts(&self) -> usize {
        self.inner.send_attempts.load(Ordering::SeqCst)
    }

    /// Messages accepted so far.
    pub fn sent(&self) -> Vec<SentMessage> {
        lock(&self.inner.sent).clone()
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn connect(&self, events: mpsc::Sender<TransportEvent>) -> crate::Result<Arc<dyn Transport>> {
        if self.inner.refuse_connects.load(Ordering::SeqCst) {
            return Err(GatewayError::Transport("connect refused".into()));
        }

        self.inner.connects.fetch_add(1, Ordering::SeqCst);
        *lock(&self.inner.events) = Some(events.clone());

        // The caller may only start draining `events` after we return.
        let script = lock(&self.inner.script).clone();
        let replaying = Arc::clone(&self.inner.replay).lock_owned().await;
        tokio::spawn(async move {
            let _replaying = replaying;
            for event in script {
                if events.send(event).await.is_err() {
                    break;
                }
            }
        });

        Ok(Arc::new(ScriptedTransport {
            inner: Arc::clone(&self.inner),
            closed: AtomicBool::new(false),
        }))
    }
}

struct ScriptedTransport {
    inner: Arc<Inner>,
    closed: AtomicBool,
}

impl ScriptedTransport {
    async fn accept(&self, message: SentMessage) -> crate::Result<()> {
        self.inner.send_attempts.fetch_add(1, Ordering::SeqCst);

        if self.closed.load(Ordering::SeqCst) {
            return Err(GatewayError::Transport("session closed".into()));
        }
        if self.inner.hang_sends.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if let Some(detail) = lock(&self.inner.send_failure).clone() {
            return Err(GatewayError::Transport(detail));
        }

        lock(&self.inner.sent).push(message);
        Ok(())
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send_text(&self, to: &ChatId, body: &str) -> crate::Result<()> {
        self.accept(SentMessage::Text {
            to: to.clone(),
            body: body.to_string(),
        })
        .await
    }

    async fn send_document(
        &self,
        to: &ChatId,
        media: MediaPayload,
        caption: Option<&str>,
    ) -> crate::Result<()> {
        self.accept(SentMessage::Document {
            to: to.clone(),
            media,
            caption: caption.map(str::to_string),
        })
        .await
    }

    async fn shutdown(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.inner.shutdowns.fetch_add(1, Ordering::SeqCst);
        }
    }
}
