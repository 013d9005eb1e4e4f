//! Child-process transport.
//!
//! The bridge is an external program that owns the messaging client. It
//! prints one JSON event per line on stdout and reads one JSON command per
//! line on stdin:
//!
//! ```text
//! <- {"event":"qr","code":"2@..."}
//! <- {"event":"authenticated"}
//! <- {"event":"ready","user":"94771234567@c.us"}
//! <- {"event":"auth_failure","message":"..."}
//! <- {"event":"disconnected","reason":"..."}
//! -> {"op":"send_text","id":1,"to":"94771234567@s.whatsapp.net","body":"hi"}
//! -> {"op":"send_document","id":2,"to":"...","mimetype":"application/pdf","filename":"a.pdf","data":"<base64>","caption":"..."}
//! <- {"event":"ack","id":1}
//! <- {"event":"error","id":2,"message":"..."}
//! ```
//!
//! The credentials directory is passed in the `WA_SESSION_DIR` environment
//! variable.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use super::{Connector, MediaPayload, Transport, TransportEvent};
use crate::address::ChatId;
use crate::error::GatewayError;
use crate::session::{Identity, PairingChallenge, DEFAULT_CREDENTIALS_DIR};

/// Bridge program launched unless configured otherwise.
pub const DEFAULT_BRIDGE_PROGRAM: &str = "wa-bridge";

/// Environment variable carrying the credentials directory.
pub const SESSION_DIR_ENV: &str = "WA_SESSION_DIR";

const EXIT_REASON: &str = "bridge process exited";

type Pending = Arc<Mutex<HashMap<u64, oneshot::Sender<Result<(), String>>>>>;

/// How to launch the bridge process.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Program to execute.
    pub program: String,
    /// Arguments passed to the program.
    pub args: Vec<String>,
    /// Credentials directory handed to the bridge.
    pub session_dir: PathBuf,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            program: DEFAULT_BRIDGE_PROGRAM.to_string(),
            args: Vec::new(),
            session_dir: PathBuf::from(DEFAULT_CREDENTIALS_DIR),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum BridgeEvent {
    Qr {
        code: String,
    },
    Authenticated,
    Ready {
        #[serde(default)]
        user: Option<String>,
    },
    AuthFailure {
        #[serde(default)]
        message: String,
    },
    Disconnected {
        #[serde(default)]
        reason: String,
    },
    Ack {
        id: u64,
    },
    Error {
        id: u64,
        #[serde(default)]
        message: String,
    },
}

#[derive(Debug, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum BridgeCommand<'a> {
    SendText {
        id: u64,
        to: &'a str,
        body: &'a str,
    },
    SendDocument {
        id: u64,
        to: &'a str,
        mimetype: &'a str,
        filename: &'a str,
        data: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        caption: Option<&'a str>,
    },
}

/// Spawns one bridge process per transport session.
pub struct BridgeConnector {
    config: BridgeConfig,
}

impl BridgeConnector {
    pub fn new(config: BridgeConfig) -> Self {
        Self { config }
    }
}

impl BridgeConnector {
    async fn spawn(&self, events: mpsc::Sender<TransportEvent>) -> crate::Result<BridgeTransport> {
        let mut child = Command::new(&self.config.program)
            .args(&self.config.args)
            .env(SESSION_DIR_ENV, &self.config.session_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()?;

        info!(
            "Spawned bridge '{}' (pid {:?})",
            self.config.program,
            child.id()
        );

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| GatewayError::Transport("bridge stdin unavailable".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| GatewayError::Transport("bridge stdout unavailable".into()))?;

        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));
        let reader = tokio::spawn(read_events(stdout, events, Arc::clone(&pending)));

        let (commands, queue) = mpsc::unbounded_channel();
        tokio::spawn(write_commands(stdin, queue, Arc::clone(&pending)));

        Ok(BridgeTransport {
            commands: Mutex::new(Some(commands)),
            child: tokio::sync::Mutex::new(Some(child)),
            reader: Mutex::new(Some(reader)),
            pending,
            next_id: AtomicU64::new(1),
        })
    }
}

#[async_trait]
impl Connector for BridgeConnector {
    async fn connect(&self, events: mpsc::Sender<TransportEvent>) -> crate::Result<Arc<dyn Transport>> {
        Ok(Arc::new(self.spawn(events).await?))
    }
}

/// Sole owner of bridge stdin. Lines are written whole even after the
/// requesting caller has stopped waiting.
async fn write_commands(
    mut stdin: ChildStdin,
    mut queue: mpsc::UnboundedReceiver<String>,
    pending: Pending,
) {
    while let Some(line) = queue.recv().await {
        let written = async {
            stdin.write_all(line.as_bytes()).await?;
            stdin.flush().await
        }
        .await;

        if let Err(e) = written {
            warn!("Bridge writer error: {}", e);
            fail_all(&pending, EXIT_REASON);
            return;
        }
    }
    debug!("Bridge writer: queue closed");
}

/// Forward bridge stdout to the session and resolve pending sends.
async fn read_events(stdout: ChildStdout, events: mpsc::Sender<TransportEvent>, pending: Pending) {
    let mut lines = BufReader::new(stdout).lines();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => {
                debug!("Bridge reader: EOF");
                break;
            }
            Err(e) => {
                warn!("Bridge reader error: {}", e);
                break;
            }
        };

        if line.trim().is_empty() {
            continue;
        }
        trace!("Bridge: {}", line);

        let event = match serde_json::from_str::<BridgeEvent>(&line) {
            Ok(event) => event,
            Err(e) => {
                warn!("Ignoring unparseable bridge line: {}", e);
                continue;
            }
        };

        let lifecycle = match event {
            BridgeEvent::Ack { id } => {
                resolve(&pending, id, Ok(()));
                continue;
            }
            BridgeEvent::Error { id, message } => {
                resolve(&pending, id, Err(message));
                continue;
            }
            BridgeEvent::Qr { code } => TransportEvent::PairingChallenge(PairingChallenge::new(code)),
            BridgeEvent::Authenticated => TransportEvent::Authenticated,
            BridgeEvent::Ready { user } => TransportEvent::Ready {
                identity: user.map(Identity::new),
            },
            BridgeEvent::AuthFailure { message } => TransportEvent::AuthFailure(message),
            BridgeEvent::Disconnected { reason } => TransportEvent::Disconnected(reason),
        };

        if events.send(lifecycle).await.is_err() {
            debug!("Bridge reader: session no longer listening");
            fail_all(&pending, EXIT_REASON);
            return;
        }
    }

    fail_all(&pending, EXIT_REASON);
    let _ = events
        .send(TransportEvent::Disconnected(EXIT_REASON.to_string()))
        .await;
}

fn resolve(pending: &Pending, id: u64, outcome: Result<(), String>) {
    let waiter = pending
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .remove(&id);
    match waiter {
        Some(tx) => {
            let _ = tx.send(outcome);
        }
        None => debug!("Bridge answered unknown request {}", id),
    }
}

fn fail_all(pending: &Pending, reason: &str) {
    let waiters: Vec<_> = pending
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .drain()
        .collect();
    for (_, tx) in waiters {
        let _ = tx.send(Err(reason.to_string()));
    }
}

struct BridgeTransport {
    commands: Mutex<Option<mpsc::UnboundedSender<String>>>,
    child: tokio::sync::Mutex<Option<Child>>,
    reader: Mutex<Option<JoinHandle<()>>>,
    pending: Pending,
    next_id: AtomicU64,
}

/// Drops the pending entry of a request whose caller stopped waiting.
struct PendingGuard<'a> {
    pending: &'a Pending,
    id: u64,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.id);
    }
}

impl BridgeTransport {
    async fn request(&self, id: u64, command: &BridgeCommand<'_>) -> crate::Result<()> {
        let mut line =
            serde_json::to_string(command).map_err(|e| GatewayError::Transport(e.to_string()))?;
        line.push('\n');

        let (tx, rx) = oneshot::channel();
        self.pending
            .lock()
            .map_err(|_| GatewayError::LockPoisoned)?
            .insert(id, tx);
        let _guard = PendingGuard {
            pending: &self.pending,
            id,
        };

        self.enqueue(line)?;

        match rx.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(message)) => Err(GatewayError::Transport(message)),
            Err(_) => Err(GatewayError::Transport(EXIT_REASON.to_string())),
        }
    }

    fn enqueue(&self, line: String) -> crate::Result<()> {
        let commands = self.commands.lock().unwrap_or_else(|e| e.into_inner());
        commands
            .as_ref()
            .ok_or_else(|| GatewayError::Transport("session closed".into()))?
            .send(line)
            .map_err(|_| GatewayError::Transport(EXIT_REASON.to_string()))
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }
}

#[async_trait]
impl Transport for BridgeTransport {
    async fn send_text(&self, to: &ChatId, body: &str) -> crate::Result<()> {
        let id = self.next_id();
        self.request(
            id,
            &BridgeCommand::SendText {
                id,
                to: to.as_str(),
                body,
            },
        )
        .await
    }

    async fn send_document(
        &self,
        to: &ChatId,
        media: MediaPayload,
        caption: Option<&str>,
    ) -> crate::Result<()> {
        let id = self.next_id();
        self.request(
            id,
            &BridgeCommand::SendDocument {
                id,
                to: to.as_str(),
                mimetype: &media.mime_type,
                filename: &media.file_name,
                data: media.base64(),
                caption,
            },
        )
        .await
    }

    async fn shutdown(&self) {
        let reader = self.reader.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(reader) = reader {
            reader.abort();
        }

        self.commands.lock().unwrap_or_else(|e| e.into_inner()).take();

        if let Some(mut child) = self.child.lock().await.take() {
            if let Err(e) = child.kill().await {
                debug!("Bridge already gone: {}", e);
            }
        }

        fail_all(&self.pending, "session closed");
    }
}
