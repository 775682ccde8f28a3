//! Stream session lifecycle
//!
//! A single task owns the subscription channel, its heartbeat and the last
//! filter written to it. Setup requests, watchlist changes, inbound updates,
//! heartbeat ticks and scheduled reconnects are all serialized through
//! [`SessionManager::run`], so at most one setup is ever in flight and a
//! burst of triggers collapses into one filter write.

use crate::streamer_core::balance_extractor::{timestamp_from_parts, TransactionEvent};
use crate::streamer_core::config::{ReconnectPolicy, SessionSettings};
use crate::streamer_core::dispatcher::{BuyOrder, SignalDispatcher};
use crate::streamer_core::error_handler::ReconnectBackoff;
use crate::streamer_core::grpc_client::{RequestSink, Transport, TransportError, UpdateStream};
use crate::streamer_core::heartbeat::{Beat, Heartbeat};
use crate::streamer_core::output_writer::SignalRecord;
use crate::streamer_core::subscription::{FilterError, SubscriptionFilter};
use crate::streamer_core::trade_detector::{classify, DecodeError, TradeSignal};
use crate::streamer_core::writer_backend::SignalWriter;
use crate::watchlist::WatchlistSource;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use std::future::pending;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::time::{sleep_until, Instant};
use yellowstone_grpc_proto::geyser::subscribe_update::UpdateOneof;
use yellowstone_grpc_proto::geyser::SubscribeUpdate;
use yellowstone_grpc_proto::prelude::SubscribeUpdateTransaction;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No usable channel. A setup may be requested.
    Idle,
    /// Setup in flight
    Connecting,
    /// Channel open and the current filter has been written to it
    Active,
    /// Channel ended and the policy says not to reconnect on its own
    Closed,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SessionState::Idle => "Idle",
            SessionState::Connecting => "Connecting",
            SessionState::Active => "Active",
            SessionState::Closed => "Closed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionCommand {
    Setup,
    Shutdown,
}

/// Why a channel stopped delivering updates
#[derive(Debug, Clone, PartialEq)]
pub enum Termination {
    Error(TransportError),
    End,
}

#[derive(Debug)]
pub enum SessionError {
    Transport(TransportError),
    Filter(FilterError),
}

impl From<TransportError> for SessionError {
    fn from(err: TransportError) -> Self {
        SessionError::Transport(err)
    }
}

impl From<FilterError> for SessionError {
    fn from(err: FilterError) -> Self {
        SessionError::Filter(err)
    }
}

impl std::fmt::Display for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionError::Transport(e) => write!(f, "Transport error: {}", e),
            SessionError::Filter(e) => write!(f, "Filter error: {}", e),
        }
    }
}

impl std::error::Error for SessionError {}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SessionStats {
    pub setups: u64,
    pub channels_opened: u64,
    pub filter_writes: u64,
    pub filter_writes_skipped: u64,
    pub reconnects: u64,
    pub signals: u64,
    pub buys_dispatched: u64,
    pub decode_failures: u64,
}

/// Cloneable handle for driving a running session from other tasks
#[derive(Debug, Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<SessionCommand>,
}

impl SessionHandle {
    pub fn channel(buffer: usize) -> (Self, mpsc::Receiver<SessionCommand>) {
        let (tx, rx) = mpsc::channel(buffer);
        (Self { commands: tx }, rx)
    }

    pub async fn request_setup(&self) -> bool {
        self.commands.send(SessionCommand::Setup).await.is_ok()
    }

    pub async fn shutdown(&self) -> bool {
        self.commands.send(SessionCommand::Shutdown).await.is_ok()
    }
}

struct ActiveChannel {
    sink: Box<dyn RequestSink>,
    updates: UpdateStream,
    generation: u64,
}

enum SessionEvent {
    SetupRequested,
    WatchlistChanged,
    WatchlistClosed,
    Inbound(Option<Result<SubscribeUpdate, TransportError>>),
    HeartbeatDue,
    ReconnectDue,
}

pub struct SessionManager {
    transport: Arc<dyn Transport>,
    watchlist: Arc<dyn WatchlistSource>,
    /// Subscribed at construction so changes published before `run` starts
    /// are still pending when it does.
    watchlist_rx: watch::Receiver<Vec<String>>,
    watchlist_open: bool,
    dispatcher: Arc<dyn SignalDispatcher>,
    journal: Option<Box<dyn SignalWriter>>,
    settings: SessionSettings,
    state: SessionState,
    channel: Option<ActiveChannel>,
    heartbeat: Option<Heartbeat>,
    last_filter: Option<SubscriptionFilter>,
    backoff: ReconnectBackoff,
    reconnect_at: Option<Instant>,
    generation: u64,
    stats: SessionStats,
}

impl SessionManager {
    pub fn new(
        transport: Arc<dyn Transport>,
        watchlist: Arc<dyn WatchlistSource>,
        dispatcher: Arc<dyn SignalDispatcher>,
        settings: SessionSettings,
    ) -> Self {
        let backoff = ReconnectBackoff::new(
            settings.reconnect_initial_delay_ms,
            settings.reconnect_max_delay_ms,
        );

        let watchlist_rx = watchlist.subscribe();

        Self {
            transport,
            watchlist,
            watchlist_rx,
            watchlist_open: true,
            dispatcher,
            journal: None,
            settings,
            state: SessionState::Idle,
            channel: None,
            heartbeat: None,
            last_filter: None,
            backoff,
            reconnect_at: None,
            generation: 0,
            stats: SessionStats::default(),
        }
    }

    /// Append every classified signal to `journal`
    pub fn with_journal(mut self, journal: Box<dyn SignalWriter>) -> Self {
        log::info!("📝 Signal journal enabled ({})", journal.backend_type());
        self.journal = Some(journal);
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    pub fn has_channel(&self) -> bool {
        self.channel.is_some()
    }

    pub fn heartbeat_active(&self) -> bool {
        self.heartbeat.is_some()
    }

    pub fn last_filter(&self) -> Option<&SubscriptionFilter> {
        self.last_filter.as_ref()
    }

    pub fn reconnect_pending(&self) -> bool {
        self.reconnect_at.is_some()
    }

    /// Make sure a usable channel exists and carries the current filter.
    ///
    /// Reuses a healthy channel, otherwise opens a new one and binds a
    /// heartbeat to it. On failure the session is left Idle; no retry is
    /// attempted here.
    pub async fn setup_stream(&mut self) -> Result<(), SessionError> {
        self.stats.setups += 1;
        log::info!("🚀 Setting up stream");

        if !self.channel_usable() {
            self.set_state(SessionState::Connecting);
        }

        match self.update_subscription().await {
            Ok(()) => {
                self.set_state(SessionState::Active);
                self.backoff.reset();
                self.reconnect_at = None;
                Ok(())
            }
            Err(e) => {
                log::error!("❌ Stream setup error: {}", e);
                self.set_state(SessionState::Idle);
                Err(e)
            }
        }
    }

    /// Write the filter for the current watchlist snapshot.
    ///
    /// Opens a channel first when none is usable. The write is skipped when
    /// the exact same filter was already accepted on this channel.
    pub async fn update_subscription(&mut self) -> Result<(), SessionError> {
        self.ensure_channel().await?;

        let filter = SubscriptionFilter::new(
            &self.settings.target_program_id,
            self.watchlist.addresses(),
            self.settings.commitment_level,
        )?;

        if self.last_filter.as_ref() == Some(&filter) {
            self.stats.filter_writes_skipped += 1;
            log::debug!("⏭️  Filter unchanged, skipping subscription write");
            return Ok(());
        }

        if filter.include().is_empty() {
            log::warn!(
                "⚠️  Watchlist is empty: filter matches every {} transaction",
                filter.required_program()
            );
        }

        let channel = self.channel.as_mut().ok_or(TransportError::Closed)?;
        log::info!(
            "📡 Updating subscription on channel #{} with {} address(es)",
            channel.generation,
            filter.include().len()
        );

        if let Err(e) = channel.sink.send(filter.to_request()).await {
            log::error!("❌ Subscription request error: {}", e);
            return Err(e.into());
        }

        log::info!("✅ Subscription request sent");
        self.stats.filter_writes += 1;
        self.last_filter = Some(filter);
        Ok(())
    }

    pub async fn handle_channel_error(&mut self, error: TransportError) {
        self.on_channel_terminated(Termination::Error(error)).await;
    }

    pub async fn handle_channel_end(&mut self) {
        self.on_channel_terminated(Termination::End).await;
    }

    pub async fn handle_channel_close(&mut self) {
        self.on_channel_terminated(Termination::End).await;
    }

    /// Tear down the channel and decide whether to come back on our own.
    ///
    /// Errors leave the session Idle and always reconnect. A normal end
    /// leaves it Closed and reconnects only under [`ReconnectPolicy::Always`];
    /// otherwise it waits for the next setup request or watchlist change.
    /// The first reconnect runs on the next loop turn. A failed attempt is
    /// retried with a growing delay until one succeeds.
    pub async fn on_channel_terminated(&mut self, cause: Termination) {
        let reconnect = match &cause {
            Termination::Error(e) => {
                log::error!("❌ Stream error: {}", e);
                self.set_state(SessionState::Idle);
                true
            }
            Termination::End => {
                log::info!("🔚 Stream ended");
                self.set_state(SessionState::Closed);
                self.settings.reconnect_policy == ReconnectPolicy::Always
            }
        };

        self.drop_channel();

        if reconnect {
            log::info!("🔄 Reconnecting now");
            self.reconnect_at = Some(Instant::now());
        } else {
            log::info!("💤 Session closed, waiting for the next setup trigger");
        }
    }

    async fn reconnect(&mut self) {
        self.reconnect_at = None;
        self.stats.reconnects += 1;
        log::info!("🔄 Reconnecting (attempt {})", self.backoff.attempts());

        if self.setup_stream().await.is_err() {
            self.schedule_reconnect();
        }
    }

    fn schedule_reconnect(&mut self) {
        let delay = self.backoff.next_attempt();
        self.reconnect_at = Some(Instant::now() + delay);
    }

    pub async fn handle_update(&mut self, update: SubscribeUpdate) {
        let created_at = update
            .created_at
            .as_ref()
            .and_then(|ts| timestamp_from_parts(ts.seconds, ts.nanos));

        match update.update_oneof {
            Some(UpdateOneof::Transaction(tx)) => self.handle_transaction(&tx, created_at).await,
            Some(UpdateOneof::Ping(_)) => log::debug!("📶 Server ping"),
            Some(UpdateOneof::Pong(pong)) => log::debug!("🏓 Pong (id: {})", pong.id),
            Some(_) => log::debug!("Ignoring non-transaction update"),
            None => log::debug!("Ignoring empty update"),
        }
    }

    async fn handle_transaction(
        &mut self,
        update: &SubscribeUpdateTransaction,
        created_at: Option<DateTime<Utc>>,
    ) {
        let decoded = TransactionEvent::from_update(update, created_at)
            .and_then(|event| classify(&event, Utc::now()));

        let signal = match decoded {
            Ok(signal) => signal,
            Err(e @ DecodeError::UnresolvedMint { .. }) => {
                self.stats.decode_failures += 1;
                log::warn!("⚠️  Skipping signal: {}", e);
                return;
            }
            Err(e) => {
                self.stats.decode_failures += 1;
                log::debug!("Dropping undecodable transaction at slot {}: {}", update.slot, e);
                return;
            }
        };

        self.stats.signals += 1;
        log::info!(
            "{} {} | actor: {} | mint: {} | {:.6} SOL | latency: {}ms | sig: {}",
            if signal.is_buy() { "🟢" } else { "🔴" },
            signal.direction,
            signal.actor_address,
            signal.token_mint_address,
            signal.sol_amount,
            signal.observed_latency_ms,
            signal.signature
        );

        let dispatched = signal.is_buy();
        if dispatched {
            self.dispatch_buy(&signal);
        }

        if let Some(journal) = self.journal.as_mut() {
            if let Err(e) = journal.write(&SignalRecord::from_signal(&signal, dispatched)).await {
                log::error!("❌ Failed to journal signal {}: {}", signal.signature, e);
            }
        }
    }

    /// Hand a buy to the dispatcher on its own task so a slow execution never
    /// stalls the stream.
    fn dispatch_buy(&mut self, signal: &TradeSignal) {
        let order = BuyOrder {
            token_mint_address: signal.token_mint_address.clone(),
            sol_amount: self.settings.buy_sol_amount,
            slippage_bps: self.settings.slippage_bps,
            created_at_ms: signal.event_timestamp.timestamp_millis(),
            priority_fee_lamports: self.settings.priority_fee_lamports,
        };

        self.stats.buys_dispatched += 1;
        let dispatcher = Arc::clone(&self.dispatcher);
        let signature = signal.signature.clone();

        tokio::spawn(async move {
            if let Err(e) = dispatcher.execute_buy(order).await {
                log::error!("❌ Buy for {} failed: {}", signature, e);
            }
        });
    }

    /// Drive the session until a Shutdown command arrives or every command
    /// sender is dropped.
    pub async fn run(&mut self, mut commands: mpsc::Receiver<SessionCommand>) {
        log::info!("▶️  Session loop started ({})", self.transport.endpoint());

        loop {
            let event = tokio::select! {
                biased;
                command = commands.recv() => match command {
                    Some(SessionCommand::Setup) => SessionEvent::SetupRequested,
                    Some(SessionCommand::Shutdown) | None => break,
                },
                _ = next_tick(&mut self.heartbeat) => SessionEvent::HeartbeatDue,
                _ = reconnect_due(self.reconnect_at) => SessionEvent::ReconnectDue,
                changed = watchlist_changed(&mut self.watchlist_rx, self.watchlist_open) => match changed {
                    Ok(()) => SessionEvent::WatchlistChanged,
                    Err(_) => SessionEvent::WatchlistClosed,
                },
                // Inbound last: a busy stream must not hold back keepalives.
                update = next_update(&mut self.channel) => SessionEvent::Inbound(update),
            };

            match event {
                SessionEvent::SetupRequested => {
                    let _ = self.setup_stream().await;
                }
                SessionEvent::WatchlistChanged => {
                    let count = self.watchlist_rx.borrow_and_update().len();
                    log::info!("👀 Watchlist changed ({} address(es)), refreshing subscription", count);
                    let _ = self.setup_stream().await;
                }
                SessionEvent::WatchlistClosed => {
                    log::warn!("⚠️  Watchlist source dropped, no further filter updates");
                    self.watchlist_open = false;
                }
                SessionEvent::Inbound(Some(Ok(update))) => {
                    self.handle_update(update).await;
                    // An always-ready stream would otherwise never return to
                    // the runtime, and timers would stop being driven.
                    tokio::task::coop::consume_budget().await;
                }
                SessionEvent::Inbound(Some(Err(e))) => self.handle_channel_error(e).await,
                SessionEvent::Inbound(None) => self.handle_channel_end().await,
                SessionEvent::HeartbeatDue => self.beat().await,
                SessionEvent::ReconnectDue => self.reconnect().await,
            }
        }

        self.shutdown().await;
    }

    async fn beat(&mut self) {
        let outcome = match (self.heartbeat.as_mut(), self.channel.as_mut()) {
            (Some(heartbeat), Some(channel)) => heartbeat.beat(channel.sink.as_mut()).await,
            _ => Beat::ChannelGone,
        };

        if outcome == Beat::ChannelGone {
            self.heartbeat = None;
        }
    }

    async fn shutdown(&mut self) {
        log::info!("🛑 Shutting down session");
        self.drop_channel();
        self.reconnect_at = None;
        self.set_state(SessionState::Closed);

        if let Some(journal) = self.journal.as_mut() {
            if let Err(e) = journal.flush().await {
                log::error!("❌ Failed to flush signal journal: {}", e);
            }
        }

        log::info!(
            "📊 Session stats: setups={} opened={} writes={} skipped={} reconnects={} signals={} buys={} decode_failures={}",
            self.stats.setups,
            self.stats.channels_opened,
            self.stats.filter_writes,
            self.stats.filter_writes_skipped,
            self.stats.reconnects,
            self.stats.signals,
            self.stats.buys_dispatched,
            self.stats.decode_failures
        );
    }

    fn channel_usable(&self) -> bool {
        self.channel
            .as_ref()
            .map(|channel| !channel.sink.is_closed())
            .unwrap_or(false)
    }

    async fn ensure_channel(&mut self) -> Result<(), TransportError> {
        if self.channel_usable() {
            return Ok(());
        }

        if self.channel.is_some() {
            log::info!("Channel no longer writable, opening a new one");
            self.drop_channel();
        }

        let mut opened = self.transport.open().await?;
        self.generation += 1;
        self.stats.channels_opened += 1;
        log::info!("🔗 Channel #{} open ({})", self.generation, self.transport.endpoint());

        let heartbeat = Heartbeat::start(self.settings.heartbeat_interval, opened.sink.as_mut()).await;

        self.channel = Some(ActiveChannel {
            sink: opened.sink,
            updates: opened.updates,
            generation: self.generation,
        });
        self.heartbeat = Some(heartbeat);
        self.last_filter = None;
        Ok(())
    }

    /// The heartbeat and the last accepted filter belong to the channel and
    /// go with it.
    fn drop_channel(&mut self) {
        if let Some(channel) = self.channel.take() {
            log::debug!("Dropping channel #{}", channel.generation);
        }
        self.heartbeat = None;
        self.last_filter = None;
    }

    fn set_state(&mut self, next: SessionState) {
        if self.state != next {
            log::info!("🔀 Session {} -> {}", self.state, next);
            self.state = next;
        }
    }
}

async fn watchlist_changed(
    rx: &mut watch::Receiver<Vec<String>>,
    open: bool,
) -> Result<(), watch::error::RecvError> {
    if open {
        rx.changed().await
    } else {
        pending().await
    }
}

async fn next_update(
    channel: &mut Option<ActiveChannel>,
) -> Option<Result<SubscribeUpdate, TransportError>> {
    match channel {
        Some(channel) => channel.updates.next().await,
        None => pending().await,
    }
}

async fn next_tick(heartbeat: &mut Option<Heartbeat>) {
    match heartbeat {
        Some(heartbeat) => heartbeat.tick().await,
        None => pending().await,
    }
}

async fn reconnect_due(at: Option<Instant>) {
    match at {
        Some(at) => sleep_until(at).await,
        None => pending().await,
    }
}
