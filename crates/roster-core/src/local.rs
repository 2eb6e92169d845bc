//! In-process session platform.
//!
//! Hosts every participant of a session inside one process. Useful for tests
//! and for the daemon's local runs; it is not a network transport.
//!
//! - The coordinator is the earliest-joined participant still present
//! - When the coordinator leaves, the next participant is promoted and
//!   receives `on_became_coordinator`
//! - Writes are encoded and queued; nothing is delivered until
//!   `deliver_pending()` runs, so delivery delay is under the caller's control
//! - Joiners receive the latest replicated value as a snapshot

use crate::config::RosterConfig;
use crate::fetch::{FetchCompletion, FetchRequest, Fetcher};
use crate::participant::Participant;
use crate::protocol::{self, ReplicationMessage, SessionMessage};
use crate::session::{SessionPlatform, VisibilitySink};
use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone)]
struct Envelope {
    from: String,
    data: Vec<u8>,
}

#[derive(Debug, Default)]
struct Inner {
    /// Participant IDs in join order; the first one is the coordinator
    members: Vec<String>,
    /// Identity per participant ID (`None` = not yet resolvable)
    identities: HashMap<String, Option<String>>,
    /// Encoded writes awaiting delivery
    outbox: VecDeque<Envelope>,
    /// Highest-ordered replicated write, handed to joiners
    latest: Option<ReplicationMessage>,
    /// Most recent envelope, kept for redelivery
    last_sent: Option<Envelope>,
}

/// One participant's view of a [`LocalSession`].
#[derive(Debug, Clone)]
pub struct LocalHandle {
    id: String,
    inner: Rc<RefCell<Inner>>,
}

impl LocalHandle {
    /// Session-scoped participant ID.
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl SessionPlatform for LocalHandle {
    fn is_coordinator(&self) -> bool {
        self.inner.borrow().members.first() == Some(&self.id)
    }

    fn local_identity(&self) -> Option<String> {
        self.inner.borrow().identities.get(&self.id).cloned().flatten()
    }

    fn replicate(&self, message: ReplicationMessage) {
        let data = match protocol::encode(&SessionMessage::Update(message.clone())) {
            Ok(data) => data,
            Err(e) => {
                error!("Failed to encode replication from {}: {}", self.id, e);
                return;
            }
        };

        let envelope = Envelope {
            from: self.id.clone(),
            data,
        };
        let mut inner = self.inner.borrow_mut();
        if inner
            .latest
            .as_ref()
            .is_none_or(|latest| message.supersedes(latest))
        {
            inner.latest = Some(message);
        }
        inner.last_sent = Some(envelope.clone());
        inner.outbox.push_back(envelope);
    }
}

/// A whole session running in one process.
pub struct LocalSession<S: VisibilitySink> {
    config: RosterConfig,
    inner: Rc<RefCell<Inner>>,
    /// Same order as `Inner::members`
    participants: Vec<Participant<LocalHandle, S>>,
}

impl<S: VisibilitySink> LocalSession<S> {
    pub fn new(config: RosterConfig) -> Self {
        Self {
            config,
            inner: Rc::new(RefCell::new(Inner::default())),
            participants: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.participants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

    /// ID of the current coordinator.
    pub fn coordinator_id(&self) -> Option<String> {
        self.inner.borrow().members.first().cloned()
    }

    pub fn participant(&self, id: &str) -> Option<&Participant<LocalHandle, S>> {
        self.participants.iter().find(|p| p.platform().id() == id)
    }

    pub fn participant_mut(&mut self, id: &str) -> Option<&mut Participant<LocalHandle, S>> {
        self.participants.iter_mut().find(|p| p.platform().id() == id)
    }

    pub fn participants(&self) -> impl Iterator<Item = &Participant<LocalHandle, S>> {
        self.participants.iter()
    }

    /// Number of writes waiting for delivery.
    pub fn pending(&self) -> usize {
        self.inner.borrow().outbox.len()
    }

    /// Add a participant to the session.
    ///
    /// Returns the startup fetch when the joiner becomes coordinator.
    pub fn join(
        &mut self,
        id: &str,
        identity: Option<String>,
        sink: S,
    ) -> Option<FetchRequest> {
        if self.participant(id).is_some() {
            warn!("Participant {} already joined", id);
            return None;
        }

        let snapshot = {
            let mut inner = self.inner.borrow_mut();
            inner.members.push(id.to_string());
            inner.identities.insert(id.to_string(), identity);
            inner.latest.clone()
        };
        info!("{} joined the session", id);

        let handle = LocalHandle {
            id: id.to_string(),
            inner: Rc::clone(&self.inner),
        };
        let mut participant = Participant::new(self.config.clone(), handle, sink);
        let request = participant.start();

        if let Some(message) = snapshot {
            // Snapshots travel through the codec like any other delivery
            match protocol::encode(&SessionMessage::Snapshot(message))
                .and_then(|data| protocol::decode(&data))
            {
                Ok(decoded) => participant.on_snapshot(decoded.replication()),
                Err(e) => error!("Failed to deliver snapshot to {}: {}", id, e),
            }
        }

        for existing in &mut self.participants {
            existing.on_participant_joined(id);
        }
        participant.on_participant_joined(id);
        self.participants.push(participant);

        request
    }

    /// Remove a participant.
    ///
    /// Returns the new coordinator's fetch when the coordinator left.
    pub fn leave(&mut self, id: &str) -> Option<FetchRequest> {
        let position = self.participants.iter().position(|p| p.platform().id() == id)?;
        self.participants.remove(position);

        let was_coordinator = {
            let mut inner = self.inner.borrow_mut();
            let was_coordinator = inner.members.first().is_some_and(|m| m == id);
            inner.members.retain(|m| m != id);
            inner.identities.remove(id);
            was_coordinator
        };
        info!("{} left the session", id);

        if !was_coordinator {
            return None;
        }
        let successor = self.participants.first_mut()?;
        info!("Promoting {} to coordinator", successor.platform().id());
        successor.on_became_coordinator()
    }

    /// Resolve (or clear) a participant's identity.
    ///
    /// Participants notice the change on their next tick.
    pub fn set_identity(&mut self, id: &str, identity: Option<String>) {
        let mut inner = self.inner.borrow_mut();
        if let Some(slot) = inner.identities.get_mut(id) {
            *slot = identity;
        }
    }

    /// Deliver every queued write to all participants except its sender.
    ///
    /// Returns the number of individual deliveries.
    pub fn deliver_pending(&mut self) -> usize {
        let pending: Vec<Envelope> = self.inner.borrow_mut().outbox.drain(..).collect();
        let mut delivered = 0;

        for envelope in pending {
            let message = match protocol::decode(&envelope.data) {
                Ok(message) => message,
                Err(e) => {
                    warn!("Dropping undecodable message from {}: {}", envelope.from, e);
                    continue;
                }
            };
            debug!(
                "Delivering {} from {} ({} bytes)",
                message.kind(),
                envelope.from,
                envelope.data.len()
            );

            for participant in self
                .participants
                .iter_mut()
                .filter(|p| p.platform().id() != envelope.from)
            {
                match &message {
                    SessionMessage::Update(m) => participant.on_replication(m),
                    SessionMessage::Snapshot(m) => participant.on_snapshot(m),
                }
                delivered += 1;
            }
        }

        delivered
    }

    /// Queue the most recent write again (at-least-once delivery).
    pub fn redeliver_last(&mut self) -> bool {
        let mut inner = self.inner.borrow_mut();
        match inner.last_sent.clone() {
            Some(envelope) => {
                inner.outbox.push_back(envelope);
                true
            }
            None => false,
        }
    }

    /// Tick every participant. Returns fetches to run, tagged by participant.
    pub fn tick(&mut self, elapsed: Duration) -> Vec<(String, FetchRequest)> {
        self.participants
            .iter_mut()
            .filter_map(|p| {
                let request = p.tick(elapsed)?;
                Some((p.platform().id().to_string(), request))
            })
            .collect()
    }

    /// Manual refresh on one participant.
    pub fn refresh(&mut self, id: &str) -> Option<FetchRequest> {
        self.participant_mut(id)?.refresh()
    }

    /// Replace the source URL on every participant.
    pub fn set_source_url(&mut self, url: &str) -> Vec<(String, FetchRequest)> {
        self.config.source_url = url.to_string();
        self.participants
            .iter_mut()
            .filter_map(|p| {
                let request = p.set_source_url(url)?;
                Some((p.platform().id().to_string(), request))
            })
            .collect()
    }

    /// Route a completion back to the participant that issued it.
    pub fn complete(&mut self, id: &str, completion: FetchCompletion) {
        match self.participant_mut(id) {
            Some(participant) => participant.on_fetch_complete(completion),
            None => debug!("Discarding completion for departed participant {}", id),
        }
    }

    /// Run a fetch to completion and route the result.
    pub async fn run_fetch<F: Fetcher + ?Sized>(
        &mut self,
        id: &str,
        request: FetchRequest,
        fetcher: &F,
    ) {
        let completion = request.run(fetcher).await;
        self.complete(id, completion);
    }
}
