//! Session lifecycle supervisor.
//!
//! All writes to the session happen on one supervisor task that consumes a
//! single control channel: caller commands, transport events and re-init
//! timers. Transport events are tagged with the generation of the session
//! that produced them; bumping the generation on every teardown makes late
//! events and superseded timers harmless.
//!
//! Credential and link failures are never fatal. Each one tears the
//! transport down, wipes stored credentials and schedules a fresh session
//! after [`RecoveryPolicy::retry_delay`]. Retries are unbounded unless
//! [`RecoveryPolicy::max_retries`] is set.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::store::SessionSlot;
use super::{CredentialStore, PairingChallenge, Session, SessionState, SessionStatus};
use crate::error::GatewayError;
use crate::events::{EventBroadcaster, EventPayload, LifecycleEvent, Subscription};
use crate::transport::{Connector, Transport, TransportEvent};

/// Transport events buffered between the transport and the supervisor.
const EVENT_BUFFER: usize = 32;

/// How the manager recovers from failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryPolicy {
    /// Delay before re-initializing after an auth failure or disconnect.
    pub retry_delay: Duration,
    /// Delay before re-initializing after a manual reset.
    pub reset_delay: Duration,
    /// Consecutive failures tolerated before giving up. `None` retries forever.
    pub max_retries: Option<u32>,
}

impl Default for RecoveryPolicy {
    fn default() -> Self {
        Self {
            retry_delay: Duration::from_secs(2),
            reset_delay: Duration::from_secs(1),
            max_retries: None,
        }
    }
}

enum Control {
    Initialize(oneshot::Sender<crate::Result<()>>),
    Reset,
    Event { generation: u64, event: TransportEvent },
    Reinit { generation: u64 },
    Shutdown(Option<oneshot::Sender<()>>),
}

struct Shared {
    slot: RwLock<SessionSlot>,
    broadcaster: Arc<EventBroadcaster>,
}

/// Owner of the single transport session.
///
/// Created with [`SessionManager::start`], which spawns the supervisor task
/// on the current tokio runtime. Reads never block on the supervisor.
pub struct SessionManager {
    shared: Arc<Shared>,
    control: mpsc::UnboundedSender<Control>,
}

impl SessionManager {
    /// Spawn the supervisor. The session stays `Uninitialized` until
    /// [`initialize`](Self::initialize) is called.
    pub fn start(
        connector: Arc<dyn Connector>,
        credentials: CredentialStore,
        broadcaster: Arc<EventBroadcaster>,
        policy: RecoveryPolicy,
    ) -> Arc<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            slot: RwLock::new(SessionSlot::default()),
            broadcaster,
        });

        let supervisor = Supervisor {
            shared: Arc::clone(&shared),
            connector,
            credentials,
            policy,
            control: tx.clone(),
            generation: 0,
            failures: 0,
            forwarder: None,
            reinit: None,
        };
        tokio::spawn(supervisor.run(rx));

        Arc::new(Self {
            shared,
            control: tx,
        })
    }

    /// Start a fresh transport session, replacing any existing one.
    ///
    /// Safe to call repeatedly; the previous transport is shut down first.
    pub async fn initialize(&self) -> crate::Result<()> {
        let (tx, rx) = oneshot::channel();
        self.control
            .send(Control::Initialize(tx))
            .map_err(|_| GatewayError::ChannelClosed)?;
        rx.await.map_err(|_| GatewayError::ChannelClosed)?
    }

    /// Tear down the session, wipe credentials and start over.
    ///
    /// Returns immediately; re-initialization happens in the background.
    pub fn reset_session(&self) {
        info!("Session reset requested");
        if self.control.send(Control::Reset).is_err() {
            warn!("Session supervisor is gone, reset ignored");
        }
    }

    /// Stop the supervisor and release the transport.
    pub async fn shutdown(&self) {
        let (tx, rx) = oneshot::channel();
        if self.control.send(Control::Shutdown(Some(tx))).is_ok() {
            let _ = rx.await;
        }
    }

    /// Readiness and paired identity.
    pub fn current_status(&self) -> SessionStatus {
        self.read(|slot| slot.status())
    }

    /// The pending pairing challenge, if the session is pairing.
    pub fn pending_challenge(&self) -> Option<PairingChallenge> {
        self.read(|slot| match slot.session.state {
            SessionState::Pairing => slot.session.challenge.clone(),
            _ => None,
        })
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.read(|slot| slot.session.state)
    }

    /// Register an observer. A pending challenge is delivered first.
    pub fn subscribe(&self) -> Subscription {
        // Hold the read lock so no transition can publish in between.
        let slot = self.shared.slot.read().unwrap_or_else(|e| e.into_inner());
        let first = match slot.session.state {
            SessionState::Pairing => slot.session.challenge.clone().map(LifecycleEvent::pairing),
            _ => None,
        };
        self.shared.broadcaster.subscribe(first)
    }

    pub fn broadcaster(&self) -> &Arc<EventBroadcaster> {
        &self.shared.broadcaster
    }

    /// The transport if the session is ready, else the pending challenge.
    pub(crate) fn ready_transport(
        &self,
    ) -> std::result::Result<Arc<dyn Transport>, Option<PairingChallenge>> {
        self.read(|slot| {
            slot.ready_transport().ok_or_else(|| match slot.session.state {
                SessionState::Pairing => slot.session.challenge.clone(),
                _ => None,
            })
        })
    }

    fn read<T>(&self, f: impl FnOnce(&SessionSlot) -> T) -> T {
        let slot = self.shared.slot.read().unwrap_or_else(|e| e.into_inner());
        f(&slot)
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        let _ = self.control.send(Control::Shutdown(None));
    }
}

struct Supervisor {
    shared: Arc<Shared>,
    connector: Arc<dyn Connector>,
    credentials: CredentialStore,
    policy: RecoveryPolicy,
    control: mpsc::UnboundedSender<Control>,
    generation: u64,
    failures: u32,
    forwarder: Option<JoinHandle<()>>,
    reinit: Option<JoinHandle<()>>,
}

impl Supervisor {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Control>) {
        while let Some(msg) = rx.recv().await {
            match msg {
                Control::Initialize(reply) => {
                    let result = self.initialize().await;
                    let _ = reply.send(result);
                }
                Control::Reset => self.reset().await,
                Control::Event { generation, event } if generation == self.generation => {
                    self.apply(event).await;
                }
                Control::Event { generation, event } => {
                    debug!("Dropping {:?} from stale session {}", event, generation);
                }
                Control::Reinit { generation } if generation == self.generation => {
                    info!("Re-initializing transport session");
                    let _ = self.initialize().await;
                }
                Control::Reinit { .. } => debug!("Superseded re-initialization skipped"),
                Control::Shutdown(reply) => {
                    self.cancel_reinit();
                    let transport = self.detach(SessionState::Uninitialized, None);
                    self.release(transport).await;
                    if let Some(reply) = reply {
                        let _ = reply.send(());
                    }
                    break;
                }
            }
        }
        debug!("Session supervisor stopped");
    }

    async fn initialize(&mut self) -> crate::Result<()> {
        self.cancel_reinit();
        let previous = self.detach(SessionState::Uninitialized, None);
        self.release(previous).await;

        self.generation += 1;
        let generation = self.generation;
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);

        match self.connector.connect(tx).await {
            Ok(transport) => {
                self.shared
                    .slot
                    .write()
                    .unwrap_or_else(|e| e.into_inner())
                    .transport = Some(transport);
                self.forwarder = Some(tokio::spawn(forward(generation, rx, self.control.clone())));
                info!("Transport session {} started", generation);
                Ok(())
            }
            Err(e) => {
                error!("Failed to start transport session: {}", e);
                // Keep credentials: nothing says they are bad.
                self.degrade(SessionState::Disconnected, e.to_string(), false)
                    .await;
                Err(e)
            }
        }
    }

    async fn apply(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::PairingChallenge(challenge) => {
                let payload = EventPayload::Challenge(challenge.clone());
                self.transition(SessionState::Pairing, payload, |s| {
                    s.challenge = Some(challenge);
                    s.identity = None;
                });
            }
            TransportEvent::Authenticated => {
                self.transition(SessionState::Authenticated, EventPayload::None, |s| {
                    s.challenge = None;
                });
            }
            TransportEvent::Ready { identity } => {
                let payload = identity
                    .clone()
                    .map(EventPayload::Identity)
                    .unwrap_or(EventPayload::None);
                if self.transition(SessionState::Ready, payload, |s| {
                    s.challenge = None;
                    s.identity = identity;
                }) {
                    self.failures = 0;
                }
            }
            TransportEvent::AuthFailure(reason) => {
                self.degrade(SessionState::AuthFailed, reason, true).await;
            }
            TransportEvent::Disconnected(reason) => {
                self.degrade(SessionState::Disconnected, reason, true).await;
            }
        }
    }

    /// Apply a regular transition and publish it. Invalid ones are ignored.
    fn transition(
        &self,
        target: SessionState,
        payload: EventPayload,
        update: impl FnOnce(&mut Session),
    ) -> bool {
        let mut slot = self.shared.slot.write().unwrap_or_else(|e| e.into_inner());
        let from = slot.session.state;

        if let Err(e) = slot.session.transition_to(target) {
            warn!("Ignoring transport event: {}", e);
            return false;
        }
        update(&mut slot.session);

        info!("Session {:?} -> {:?}", from, target);
        self.shared
            .broadcaster
            .publish(&LifecycleEvent::new(target, payload));
        true
    }

    /// Enter a degraded state and schedule recovery.
    async fn degrade(&mut self, state: SessionState, reason: String, purge: bool) {
        match state {
            SessionState::AuthFailed => error!("Authentication failure: {}", reason),
            _ => warn!("Transport disconnected: {}", reason),
        }

        let transport = self.detach(state, Some(EventPayload::Reason(reason)));
        // Anything the dead session still says is stale from here on.
        self.generation += 1;
        self.release(transport).await;

        if purge {
            self.purge().await;
        }

        self.failures += 1;
        if let Some(max) = self.policy.max_retries {
            if self.failures > max {
                error!(
                    "Giving up after {} consecutive failures; reset the session to retry",
                    self.failures
                );
                return;
            }
        }

        self.schedule_reinit(self.policy.retry_delay);
    }

    async fn reset(&mut self) {
        self.cancel_reinit();

        let transport = self.detach(SessionState::Uninitialized, Some(EventPayload::None));
        self.generation += 1;
        self.release(transport).await;
        self.purge().await;

        self.failures = 0;
        self.schedule_reinit(self.policy.reset_delay);
    }

    /// Force `state`, clear session data and take the transport out of the
    /// slot, all under one write. Publishes when `payload` is given.
    fn detach(
        &self,
        state: SessionState,
        payload: Option<EventPayload>,
    ) -> Option<Arc<dyn Transport>> {
        let mut slot = self.shared.slot.write().unwrap_or_else(|e| e.into_inner());
        let from = slot.session.state;

        if let Err(e) = slot.session.transition_to(state) {
            warn!("Forcing session state: {}", e);
            slot.session.state = state;
        }
        slot.session.clear();

        if let Some(payload) = payload {
            info!("Session {:?} -> {:?}", from, state);
            self.shared
                .broadcaster
                .publish(&LifecycleEvent::new(state, payload));
        }

        slot.transport.take()
    }

    async fn release(&mut self, transport: Option<Arc<dyn Transport>>) {
        if let Some(forwarder) = self.forwarder.take() {
            forwarder.abort();
        }
        if let Some(transport) = transport {
            transport.shutdown().await;
        }
    }

    async fn purge(&self) {
        if let Err(e) = self.credentials.purge().await {
            error!("Failed to clear stored session: {}", e);
        }
    }

    fn schedule_reinit(&mut self, delay: Duration) {
        self.cancel_reinit();

        let generation = self.generation;
        let control = self.control.clone();
        debug!("Re-initialization scheduled in {:?}", delay);

        self.reinit = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = control.send(Control::Reinit { generation });
        }));
    }

    fn cancel_reinit(&mut self) {
        if let Some(pending) = self.reinit.take() {
            pending.abort();
        }
    }
}

/// Tag transport events with their session generation.
async fn forward(
    generation: u64,
    mut events: mpsc::Receiver<TransportEvent>,
    control: mpsc::UnboundedSender<Control>,
) {
    while let Some(event) = events.recv().await {
        if control.send(Control::Event { generation, event }).is_err() {
            break;
        }
    }
}
