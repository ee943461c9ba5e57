//! Single-writer registry and fan-out engine for connected peers.
//!
//! [`Hub`] owns the set of registered sessions. Registration, unregistration
//! and broadcast arrive on three separate [`tokio::sync::mpsc`] channels and
//! are applied one at a time by [`Hub::run`], so the membership map is never
//! shared and never locked. Everything else talks to the hub through a
//! cloneable [`HubHandle`].
//!
//! Delivery into a session's outbound queue never waits. A session whose
//! queue is full (or whose writer is gone) is dropped on the spot; see
//! [`DropPolicy`] for whether the rest of the peers hear about it.

use std::collections::{HashMap, VecDeque};

use axum::extract::ws::Utf8Bytes;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};

use super::SessionId;
use crate::error::RelayError;
use crate::ws::messages::ServerMessage;

/// Outbound text payload. Cloning shares the underlying buffer.
pub type Payload = Utf8Bytes;

/// What the hub does after dropping a session for backpressure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DropPolicy {
    /// Broadcast a `playerLeft` notice for the dropped session, exactly as
    /// for a normal unregistration.
    #[default]
    Announce,
    /// Drop the session without telling anyone.
    Silent,
}

/// The hub's non-owning view of a session: its identity and the producer
/// side of its outbound queue.
///
/// The hub holds the only [`mpsc::Sender`] for each queue, so dropping the
/// handle is what closes the queue.
#[derive(Debug)]
pub struct SessionHandle {
    id: SessionId,
    outbound: mpsc::Sender<Payload>,
}

impl SessionHandle {
    /// Wraps a session's identity and outbound queue producer.
    #[must_use]
    pub fn new(id: SessionId, outbound: mpsc::Sender<Payload>) -> Self {
        Self { id, outbound }
    }

    /// Returns the session identity.
    #[must_use]
    pub fn id(&self) -> &SessionId {
        &self.id
    }
}

/// A registration plus the acknowledgement sent once it is applied.
type Registration = (SessionHandle, oneshot::Sender<()>);

/// Read-only requests answered from inside the control loop.
#[derive(Debug)]
enum HubQuery {
    Members(oneshot::Sender<Vec<SessionId>>),
}

/// Authoritative owner of the session set.
///
/// Build with [`Hub::new`], then either drive it with [`Hub::run`] or start
/// it in the background with [`Hub::spawn`].
#[derive(Debug)]
pub struct Hub {
    sessions: HashMap<SessionId, mpsc::Sender<Payload>>,
    drop_policy: DropPolicy,
    register_rx: mpsc::Receiver<Registration>,
    unregister_rx: mpsc::Receiver<SessionId>,
    broadcast_rx: mpsc::Receiver<Payload>,
    query_rx: mpsc::Receiver<HubQuery>,
}

/// Cloneable sender side of the hub's event channels.
#[derive(Debug, Clone)]
pub struct HubHandle {
    register_tx: mpsc::Sender<Registration>,
    unregister_tx: mpsc::Sender<SessionId>,
    broadcast_tx: mpsc::Sender<Payload>,
    query_tx: mpsc::Sender<HubQuery>,
}

impl Hub {
    /// Creates a hub whose event channels each buffer `event_capacity`
    /// events, and the handle used to feed it.
    ///
    /// `event_capacity` is clamped to at least 1.
    #[must_use]
    pub fn new(event_capacity: usize, drop_policy: DropPolicy) -> (Self, HubHandle) {
        let capacity = event_capacity.max(1);
        let (register_tx, register_rx) = mpsc::channel(capacity);
        let (unregister_tx, unregister_rx) = mpsc::channel(capacity);
        let (broadcast_tx, broadcast_rx) = mpsc::channel(capacity);
        let (query_tx, query_rx) = mpsc::channel(capacity);

        let hub = Self {
            sessions: HashMap::new(),
            drop_policy,
            register_rx,
            unregister_rx,
            broadcast_rx,
            query_rx,
        };
        let handle = HubHandle {
            register_tx,
            unregister_tx,
            broadcast_tx,
            query_tx,
        };
        (hub, handle)
    }

    /// Creates a hub and runs its control loop on a new Tokio task.
    #[must_use]
    pub fn spawn(event_capacity: usize, drop_policy: DropPolicy) -> HubHandle {
        let (hub, handle) = Self::new(event_capacity, drop_policy);
        tokio::spawn(hub.run());
        handle
    }

    /// Runs the control loop.
    ///
    /// Services one event at a time, picking among whichever channels are
    /// ready with no priority. Returns once every [`HubHandle`] is gone.
    pub async fn run(mut self) {
        tracing::info!(policy = ?self.drop_policy, "hub running");
        loop {
            tokio::select! {
                Some((session, applied)) = self.register_rx.recv() => {
                    self.register(session);
                    let _ = applied.send(());
                }
                Some(id) = self.unregister_rx.recv() => self.unregister(&id),
                Some(payload) = self.broadcast_rx.recv() => self.broadcast(payload),
                Some(query) = self.query_rx.recv() => self.answer(query),
                else => break,
            }
        }
        tracing::info!(sessions = self.sessions.len(), "hub stopped");
    }

    fn register(&mut self, session: SessionHandle) {
        let SessionHandle { id, outbound } = session;
        self.sessions.insert(id.clone(), outbound);
        tracing::info!(session = %id, sessions = self.sessions.len(), "session registered");
    }

    fn unregister(&mut self, id: &SessionId) {
        if self.sessions.remove(id).is_none() {
            tracing::debug!(session = %id, "unregister for absent session ignored");
            return;
        }
        tracing::info!(session = %id, sessions = self.sessions.len(), "session unregistered");
        if let Some(notice) = departure_notice(id) {
            self.broadcast(notice);
        }
    }

    /// Fans `payload` out to every registered session.
    ///
    /// Sessions that cannot take the payload are removed. Under
    /// [`DropPolicy::Announce`] their departure notices are queued behind the
    /// current payload and delivered the same way. A notice is only queued
    /// for a session that was just removed, so the worklist drains.
    fn broadcast(&mut self, payload: Payload) {
        let mut pending = VecDeque::from([payload]);
        while let Some(payload) = pending.pop_front() {
            for id in self.deliver(&payload) {
                if self.sessions.remove(&id).is_none() {
                    continue;
                }
                tracing::warn!(
                    session = %id,
                    sessions = self.sessions.len(),
                    "outbound queue full or closed, dropping session"
                );
                if self.drop_policy == DropPolicy::Announce
                    && let Some(notice) = departure_notice(&id)
                {
                    pending.push_back(notice);
                }
            }
        }
    }

    /// Offers `payload` to every session without waiting and returns the
    /// sessions that refused it.
    fn deliver(&self, payload: &Payload) -> Vec<SessionId> {
        let mut stalled = Vec::new();
        for (id, outbound) in &self.sessions {
            match outbound.try_send(payload.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_) | TrySendError::Closed(_)) => stalled.push(id.clone()),
            }
        }
        stalled
    }

    fn answer(&self, query: HubQuery) {
        match query {
            HubQuery::Members(reply) => {
                let mut members: Vec<SessionId> = self.sessions.keys().cloned().collect();
                members.sort();
                let _ = reply.send(members);
            }
        }
    }
}

fn departure_notice(id: &SessionId) -> Option<Payload> {
    match (ServerMessage::PlayerLeft { id: id.clone() }).encode() {
        Ok(payload) => Some(payload),
        Err(err) => {
            tracing::error!(session = %id, error = %err, "failed to encode departure notice");
            None
        }
    }
}

impl HubHandle {
    /// Adds a session to the hub's membership.
    ///
    /// Resolves only after the control loop has inserted the session, so an
    /// [`HubHandle::unregister`] issued afterwards always finds it.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::HubClosed`] if the control loop has stopped.
    pub async fn register(&self, session: SessionHandle) -> Result<(), RelayError> {
        let (applied_tx, applied_rx) = oneshot::channel();
        self.register_tx
            .send((session, applied_tx))
            .await
            .map_err(|_| RelayError::HubClosed)?;
        applied_rx.await.map_err(|_| RelayError::HubClosed)
    }

    /// Removes a session, closes its outbound queue and announces its
    /// departure. A no-op for sessions that are not registered.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::HubClosed`] if the control loop has stopped.
    pub async fn unregister(&self, id: SessionId) -> Result<(), RelayError> {
        self.unregister_tx
            .send(id)
            .await
            .map_err(|_| RelayError::HubClosed)
    }

    /// Delivers `payload` to every registered session.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::HubClosed`] if the control loop has stopped.
    pub async fn broadcast(&self, payload: Payload) -> Result<(), RelayError> {
        self.broadcast_tx
            .send(payload)
            .await
            .map_err(|_| RelayError::HubClosed)
    }

    /// Returns a sorted snapshot of the registered session identities.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::HubClosed`] if the control loop has stopped.
    pub async fn members(&self) -> Result<Vec<SessionId>, RelayError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.query_tx
            .send(HubQuery::Members(reply_tx))
            .await
            .map_err(|_| RelayError::HubClosed)?;
        reply_rx.await.map_err(|_| RelayError::HubClosed)
    }
}
