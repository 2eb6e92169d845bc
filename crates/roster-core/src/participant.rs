//! Participant: the per-participant pipeline Store → Parser → Decision → Sink.
//!
//! Every participant runs the same pipeline over its own replica. The
//! coordinator additionally owns the refresh scheduler and is the only one
//! that writes the replicated value:
//!
//! 1. A trigger (startup, role acquired, manual, cooldown) starts a cycle and
//!    hands the host a `FetchRequest`
//! 2. The host runs the fetch and returns the `FetchCompletion`
//! 3. On success the coordinator writes the body; the local echo re-parses
//!    and re-decides, and the platform replicates the write
//! 4. Other participants re-parse and re-decide when the write arrives
//!
//! Role is queried once per tick and selects the coordinator or participant
//! strategy for that tick.

use crate::config::{ConfigError, RosterConfig};
use crate::error::RosterError;
use crate::events::{StoreEvent, Subscription};
use crate::fetch::{FetchCompletion, FetchRequest};
use crate::protocol::ReplicationMessage;
use crate::scheduler::{CycleId, RefreshScheduler, SchedulerPhase, Trigger};
use crate::session::{Role, SessionPlatform, VisibilitySink};
use crate::store::Replica;
use crate::whitelist::Whitelist;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Explicit per-participant state record.
///
/// Created when the participant joins, reset on reconnect.
#[derive(Debug, Default)]
pub struct ParticipantState {
    /// Local replica of the session's replicated text
    pub replica: Replica,
    /// Parsed from `replica` on every change
    pub whitelist: Whitelist,
    /// Last decision pushed to the sink
    pub decision: Option<bool>,
    /// Whether the local identity was resolvable at the last decision
    pub identity_resolved: bool,
    /// Whether valid whitelist data has ever been obtained this session
    pub has_valid_data: bool,
    /// Whether the parse→decide pipeline has run at least once
    pub processed_once: bool,
}

impl ParticipantState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear everything except the replica's subscriptions.
    pub fn reset(&mut self) {
        self.replica.reset();
        self.whitelist = Whitelist::new();
        self.decision = None;
        self.identity_resolved = false;
        self.has_valid_data = false;
        self.processed_once = false;
    }
}

/// Point-in-time view of a participant, for status output.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantStatus {
    pub role: Role,
    pub revision: u64,
    pub entries: usize,
    pub decision: Option<bool>,
    pub identity_resolved: bool,
    pub has_valid_data: bool,
    pub phase: SchedulerPhase,
    pub cooldown_elapsed_secs: f64,
    pub errors_reported: u64,
}

/// One participant of a session.
pub struct Participant<P: SessionPlatform, S: VisibilitySink> {
    config: RosterConfig,
    platform: P,
    sink: S,
    state: ParticipantState,
    /// Only meaningful while this participant is the coordinator
    scheduler: RefreshScheduler,
    /// Errors surfaced through logging so far
    errors_reported: u64,
    /// Role observed on the previous tick
    last_role: Role,
    started: bool,
}

impl<P: SessionPlatform, S: VisibilitySink> Participant<P, S> {
    pub fn new(config: RosterConfig, platform: P, sink: S) -> Self {
        let scheduler = RefreshScheduler::new(config.refresh_interval());
        let last_role = Role::from_flag(platform.is_coordinator());
        Self {
            config,
            platform,
            sink,
            state: ParticipantState::new(),
            scheduler,
            errors_reported: 0,
            last_role,
            started: false,
        }
    }

    pub fn role(&self) -> Role {
        Role::from_flag(self.platform.is_coordinator())
    }

    pub fn config(&self) -> &RosterConfig {
        &self.config
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn state(&self) -> &ParticipantState {
        &self.state
    }

    pub fn scheduler(&self) -> &RefreshScheduler {
        &self.scheduler
    }

    pub fn replica(&self) -> &Replica {
        &self.state.replica
    }

    pub fn whitelist(&self) -> &Whitelist {
        &self.state.whitelist
    }

    /// Last membership decision pushed to the sink.
    pub fn decision(&self) -> Option<bool> {
        self.state.decision
    }

    /// Register an `onValueChanged` callback on this participant's replica.
    pub fn subscribe(
        &self,
        callback: impl Fn(StoreEvent) + Send + Sync + 'static,
    ) -> Subscription {
        self.state.replica.subscribe(callback)
    }

    pub fn status(&self) -> ParticipantStatus {
        ParticipantStatus {
            role: self.role(),
            revision: self.state.replica.revision(),
            entries: self.state.whitelist.len(),
            decision: self.state.decision,
            identity_resolved: self.state.identity_resolved,
            has_valid_data: self.state.has_valid_data,
            phase: self.scheduler.phase(),
            cooldown_elapsed_secs: self.scheduler.elapsed().as_secs_f64(),
            errors_reported: self.errors_reported,
        }
    }

    /// Start the participant.
    ///
    /// Applies the initial (fail-safe) decision and, when starting as
    /// coordinator, begins the first refresh cycle immediately.
    pub fn start(&mut self) -> Option<FetchRequest> {
        self.started = true;
        let role = self.role();
        self.last_role = role;
        info!("Participant starting as {:?}", role);

        self.recompute();
        match role {
            Role::Coordinator => self.begin_cycle(Trigger::Startup),
            Role::Participant => None,
        }
    }

    /// Periodic tick from the host.
    pub fn tick(&mut self, elapsed: Duration) -> Option<FetchRequest> {
        if !self.started {
            return None;
        }

        let role = self.role();
        if self.last_role.is_coordinator() && !role.is_coordinator() {
            info!("Coordinator role lost; refresh loop stopped");
            self.scheduler.reset();
        }
        self.last_role = role;

        self.check_identity();
        match role {
            Role::Coordinator => self.coordinator_tick(elapsed),
            Role::Participant => None,
        }
    }

    /// Manual refresh. Ignored on non-coordinators.
    pub fn refresh(&mut self) -> Option<FetchRequest> {
        if !self.role().is_coordinator() {
            info!("Refresh ignored: not the coordinator");
            return None;
        }
        self.begin_cycle(Trigger::Manual)
    }

    /// The session platform granted this participant the coordinator role.
    pub fn on_became_coordinator(&mut self) -> Option<FetchRequest> {
        info!("Became coordinator");
        self.last_role = Role::Coordinator;
        self.scheduler.reset();
        self.state.replica.claim_epoch();
        self.begin_cycle(Trigger::BecameCoordinator)
    }

    /// A participant (possibly ourselves) joined the session.
    pub fn on_participant_joined(&mut self, id: &str) {
        debug!("Participant joined: {}", id);
        self.check_identity();
    }

    /// A replication event arrived from the coordinator.
    pub fn on_replication(&mut self, message: &ReplicationMessage) {
        let changed = self.state.replica.apply(message);
        self.note_replicated_data();
        if changed {
            self.process();
        }
    }

    /// The late-join snapshot arrived.
    ///
    /// Always runs the pipeline: a snapshot is not necessarily a change.
    pub fn on_snapshot(&mut self, message: &ReplicationMessage) {
        self.state.replica.apply_snapshot(message);
        self.note_replicated_data();
        self.process();
    }

    /// A fetch issued by this participant completed.
    pub fn on_fetch_complete(&mut self, completion: FetchCompletion) {
        let FetchCompletion { cycle, url, result } = completion;
        let held = self.scheduler.finish(cycle);

        if url != self.config.source_url {
            let stale = RosterError::StaleCompletion { url };
            debug!("Discarding {}: {}", cycle, stale);
            return;
        }
        if !held {
            debug!("Discarding {}: no longer in progress", cycle);
            return;
        }
        if !self.role().is_coordinator() {
            info!("Discarding fetch result for {}: no longer the coordinator", cycle);
            return;
        }

        match result {
            Ok(body) => self.on_fetch_success(cycle, body),
            Err(e) => {
                self.report(e.into());
                self.apply_fail_safe();
            }
        }
    }

    /// Replace the source URL.
    ///
    /// Any in-flight fetch becomes stale. On the coordinator a fresh cycle
    /// starts immediately.
    pub fn set_source_url(&mut self, url: impl Into<String>) -> Option<FetchRequest> {
        let url = url.into();
        if url == self.config.source_url {
            return None;
        }

        info!("Source URL changed to {}", url);
        self.config.source_url = url;
        if let Some(cycle) = self.scheduler.abandon() {
            debug!("Abandoned {} after source change", cycle);
        }

        if self.role().is_coordinator() && self.started {
            self.begin_cycle(Trigger::SourceChanged)
        } else {
            None
        }
    }

    /// Drop all session state, as on reconnect. Call `start()` again after.
    pub fn reset(&mut self) {
        info!("Resetting participant state");
        self.state.reset();
        self.scheduler.reset();
        self.started = false;
    }

    fn coordinator_tick(&mut self, elapsed: Duration) -> Option<FetchRequest> {
        let cycle = self.scheduler.advance(elapsed)?;
        self.prepare_cycle(cycle)
    }

    fn begin_cycle(&mut self, trigger: Trigger) -> Option<FetchRequest> {
        let cycle = self.scheduler.trigger(trigger)?;
        self.prepare_cycle(cycle)
    }

    fn prepare_cycle(&mut self, cycle: CycleId) -> Option<FetchRequest> {
        if let Err(e) = self.config.validate() {
            self.scheduler.abandon();
            let missing_target = e == ConfigError::MissingTarget;
            self.report(e.into());
            if missing_target {
                // Record the fail-safe without touching the sink
                if !self.state.has_valid_data {
                    self.state.decision = Some(false);
                }
            } else {
                self.apply_fail_safe();
            }
            return None;
        }

        info!("Fetching whitelist from {} ({})", self.config.source_url, cycle);
        Some(FetchRequest {
            cycle,
            url: self.config.source_url.clone(),
        })
    }

    fn on_fetch_success(&mut self, cycle: CycleId, body: String) {
        self.state.has_valid_data = true;
        let changed = self.state.replica.current_value() != body;

        match self.state.replica.set_value(Role::Coordinator, &body) {
            Ok(Some(message)) => {
                info!(
                    "Whitelist written at {}.{} ({} bytes, {})",
                    message.epoch,
                    message.revision,
                    body.len(),
                    cycle
                );
                self.platform.replicate(message);
                // Local echo of our own write
                if changed || !self.state.processed_once {
                    self.process();
                }
            }
            Ok(None) => {
                debug!("Whitelist unchanged ({}); skipping replication", cycle);
                if !self.state.processed_once {
                    self.process();
                }
            }
            Err(e) => self.report(e.into()),
        }
    }

    fn note_replicated_data(&mut self) {
        if self.state.replica.revision() > 0 {
            self.state.has_valid_data = true;
        }
    }

    /// Parse the replica and re-decide.
    fn process(&mut self) {
        self.state.whitelist = Whitelist::parse(self.state.replica.current_value());
        self.state.processed_once = true;
        debug!("Parsed {} whitelist entries", self.state.whitelist.len());
        self.recompute();
    }

    fn recompute(&mut self) {
        let identity = self.platform.local_identity();
        self.state.identity_resolved = identity.is_some();
        let visible = self.state.whitelist.contains(identity.as_deref());
        self.apply(visible);
    }

    /// Recompute once the local identity becomes resolvable.
    fn check_identity(&mut self) {
        if !self.started || self.state.identity_resolved {
            return;
        }
        if self.platform.local_identity().is_some() {
            info!("Local identity resolved");
            self.recompute();
        }
    }

    fn apply_fail_safe(&mut self) {
        if self.state.has_valid_data {
            return;
        }
        warn!("No whitelist data obtained yet; treating local participant as not a member");
        self.apply(false);
    }

    fn apply(&mut self, visible: bool) {
        self.state.decision = Some(visible);
        let target = self.config.target.clone().filter(|t| !t.trim().is_empty());
        match target {
            Some(target) => {
                debug!("Applying visibility {} to {}", visible, target);
                self.sink.apply_visibility(&target, visible);
            }
            None => self.report(ConfigError::MissingTarget.into()),
        }
    }

    fn report(&mut self, error: RosterError) {
        if !error.is_reportable() {
            debug!("{}", error);
            return;
        }
        self.errors_reported += 1;
        match &error {
            RosterError::Fetch(_) => warn!("{}", error),
            _ => error!("{}", error),
        }
    }
}
