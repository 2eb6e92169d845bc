//! roster-daemon: Headless host for a whitelist session.
//!
//! Runs a local session with one local participant plus any simulated peers,
//! fetches the whitelist over HTTP on the coordinator and logs each
//! participant's visibility decision.

use anyhow::Result;
use clap::Parser;
use futures::future::LocalBoxFuture;
use futures::stream::FuturesUnordered;
use futures::{FutureExt, StreamExt};
use serde::Serialize;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use roster_daemon::{Args, Command, CommandReader, HttpFetcher, PeerSpec, TracingSink};

use roster_core::{FetchCompletion, FetchRequest, LocalSession, ParticipantStatus};

/// How often participants are ticked.
const TICK_INTERVAL: Duration = Duration::from_secs(1);

/// A running fetch, tagged with the participant that issued it.
type PendingFetch = LocalBoxFuture<'static, (String, FetchCompletion)>;

/// One line of `status` output.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusLine<'a> {
    id: &'a str,
    local: bool,
    #[serde(flatten)]
    status: ParticipantStatus,
    visible: Option<bool>,
}

/// Daemon state holding all components.
struct Daemon {
    /// Every hosted participant
    session: LocalSession<TracingSink>,
    /// Shared HTTP client
    fetcher: HttpFetcher,
    /// Fetches awaiting completion
    in_flight: FuturesUnordered<PendingFetch>,
    /// ID of the participant this daemon represents
    local_id: String,
}

impl Daemon {
    /// Start a fetch on behalf of participant `id`.
    fn spawn_fetch(&mut self, id: String, request: FetchRequest) {
        info!("{} fetching {} ({})", id, request.url, request.cycle);
        let fetcher = self.fetcher.clone();
        self.in_flight.push(
            async move {
                let completion = request.run(&fetcher).await;
                (id, completion)
            }
            .boxed_local(),
        );
    }

    fn spawn_all(&mut self, requests: Vec<(String, FetchRequest)>) {
        for (id, request) in requests {
            self.spawn_fetch(id, request);
        }
    }

    /// Push queued replication to every participant.
    fn deliver(&mut self) {
        let delivered = self.session.deliver_pending();
        if delivered > 0 {
            debug!("Delivered {} replication event(s)", delivered);
        }
    }

    fn on_tick(&mut self, elapsed: Duration) {
        let requests = self.session.tick(elapsed);
        self.spawn_all(requests);
        self.deliver();
    }

    fn on_fetch_complete(&mut self, id: String, completion: FetchCompletion) {
        debug!("{} completed for {}", completion.cycle, id);
        self.session.complete(&id, completion);
        self.deliver();
    }

    fn join(&mut self, peer: &PeerSpec) {
        let sink = TracingSink::new(&peer.id);
        if let Some(request) = self.session.join(&peer.id, Some(peer.identity.clone()), sink) {
            self.spawn_fetch(peer.id.clone(), request);
        }
        self.deliver();
    }

    /// Handle an operator command. Returns false when the daemon should stop.
    fn on_command(&mut self, command: Command) -> bool {
        match command {
            Command::Refresh => {
                let id = self.local_id.clone();
                match self.session.participant(&id) {
                    Some(_) => {
                        if let Some(request) = self.session.refresh(&id) {
                            self.spawn_fetch(id, request);
                        }
                    }
                    None => warn!("Local participant {} has left the session", id),
                }
            }
            Command::Join(peer) => self.join(&peer),
            Command::Leave(id) => {
                if self.session.participant(&id).is_none() {
                    warn!("No participant named {}", id);
                    return true;
                }
                if let Some(request) = self.session.leave(&id) {
                    if let Some(coordinator) = self.session.coordinator_id() {
                        self.spawn_fetch(coordinator, request);
                    }
                }
                self.deliver();
            }
            Command::Status => self.print_status(),
            Command::Url(url) => {
                let requests = self.session.set_source_url(&url);
                self.spawn_all(requests);
            }
            Command::Quit => return false,
        }
        true
    }

    fn print_status(&self) {
        let target = self.session.participants().next().and_then(|p| p.config().target.clone());
        for participant in self.session.participants() {
            let id = participant.platform().id();
            let line = StatusLine {
                id,
                local: id == self.local_id,
                status: participant.status(),
                visible: target
                    .as_deref()
                    .and_then(|t| participant.sink().is_visible(t)),
            };
            match serde_json::to_string(&line) {
                Ok(json) => println!("{}", json),
                Err(e) => error!("Failed to serialize status for {}: {}", id, e),
            }
        }
        if !self.in_flight.is_empty() {
            info!("{} fetch(es) in flight", self.in_flight.len());
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Set up logging - respects RUST_LOG env var, defaults to info (or debug with --verbose)
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(args.default_filter()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Starting roster-daemon");
    info!("Whitelist URL: {}", args.url);

    let config = args.roster_config();
    if let Err(e) = config.validate() {
        warn!("Configuration incomplete: {} (refreshes will be skipped)", e);
    }

    // Generate participant ID if not provided
    let local_id = args.participant_id.clone().unwrap_or_else(|| {
        let id = uuid::Uuid::new_v4().to_string();
        info!("Generated participant ID: {}", id);
        id
    });

    let fetcher = HttpFetcher::new(args.fetch_timeout())?;

    let mut daemon = Daemon {
        session: LocalSession::new(config),
        fetcher,
        in_flight: FuturesUnordered::new(),
        local_id: local_id.clone(),
    };

    // The local participant joins first and coordinates
    let sink = TracingSink::new(&local_id);
    if let Some(request) = daemon.session.join(&local_id, args.identity.clone(), sink) {
        daemon.spawn_fetch(local_id.clone(), request);
    }
    if args.identity.is_none() {
        info!("Local identity unresolved; decision stays false");
    }
    for peer in &args.peers {
        daemon.join(peer);
    }

    let mut commands = CommandReader::stdin();
    let mut ticker = tokio::time::interval(TICK_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last_tick = Instant::now();

    info!(
        "Daemon running with {} participant(s). Press Ctrl+C to stop.",
        daemon.session.len()
    );

    // Main event loop
    loop {
        tokio::select! {
            // Drive every participant's refresh timer
            now = ticker.tick() => {
                let elapsed = now.saturating_duration_since(last_tick);
                last_tick = now;
                daemon.on_tick(elapsed);
            }

            // Route fetch completions back to their participants
            Some((id, completion)) = daemon.in_flight.next(), if !daemon.in_flight.is_empty() => {
                daemon.on_fetch_complete(id, completion);
            }

            // Handle operator commands
            Some(command) = commands.command_rx().recv() => {
                if !daemon.on_command(command) {
                    info!("Quit requested");
                    break;
                }
            }

            // Handle graceful shutdown
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
        }
    }

    info!("Shutting down");
    Ok(())
}
