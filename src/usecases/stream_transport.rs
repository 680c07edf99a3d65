//! Stream Transport - One Live Connection per Subscription Set
//!
//! A single actor task owns the connection, the reconnect deadline and
//! the market store's write path. Callers talk to it through a cloneable
//! `StreamHandle`:
//! 1. Commands (`open`, `update_subscription`, `close`, `reconnect`) are
//!    queued on an mpsc channel and handled strictly in order
//! 2. Connection status is published on a `watch` channel
//! 3. Prices, event state, heartbeats and state changes fan out on a
//!    `broadcast` channel
//!
//! Connection attempts run as spawned tasks tagged with an epoch. Every
//! new attempt bumps the epoch and aborts the previous task; an outcome
//! carrying an old epoch is discarded and its stream closed.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, instrument, warn};

use crate::config::StreamConfig;
use crate::domain::backoff::ReconnectPolicy;
use crate::domain::market::{EventUpdate, MarketPrices};
use crate::domain::normalizer::{ControlSignal, MarketUpdate, MessageNormalizer, NormalizedUpdate};
use crate::domain::subscription::{SubscriptionSet, MAX_SUBSCRIPTIONS};
use crate::error::{StreamError, TransportError};
use crate::ports::credentials::CredentialProvider;
use crate::ports::stream::{ConnectRequest, FrameStream, StreamConnector, SubscribeDirective};

use super::market_store::SharedMarketStore;

const COMMAND_BUFFER: usize = 64;
const EVENT_BUFFER: usize = 1024;

/// Lifecycle of the logical connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
  /// No session requested.
  #[default]
  Idle,
  /// Credential fetch or handshake in flight.
  Connecting,
  /// Receiving frames.
  Open,
  /// Waiting for the next automatic retry.
  Reconnecting,
  /// Terminal until a manual `open` or `reconnect`.
  Failed,
}

impl ConnectionState {
  /// Whether a session is requested (connected or on its way there).
  pub const fn is_active(self) -> bool {
    matches!(self, Self::Connecting | Self::Open | Self::Reconnecting)
  }
}

/// Snapshot published on every change.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransportStatus {
  /// Current state.
  pub state: ConnectionState,
  /// Shorthand for `state == Open`.
  pub connected: bool,
  /// User-actionable error, set only in `Failed`.
  pub error: Option<StreamError>,
  /// Consecutive automatic retries so far.
  pub attempt: u32,
  /// Effective (truncated) subscription of the current session.
  pub subscription: SubscriptionSet,
  /// Epoch of the latest connection attempt.
  pub epoch: u64,
}

/// Notifications fanned out to consumers.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
  /// Merged prices of a market after a frame was applied.
  Price(MarketPrices),
  /// Merged event state of a market after a frame was applied.
  Event(EventUpdate),
  /// Periodic liveness ping while open.
  Heartbeat {
    /// Time since the last upstream frame of any kind.
    since_last_frame: Duration,
  },
  /// The connection state changed.
  State(ConnectionState),
}

/// Frame counters, read by the metrics exporter.
#[derive(Debug, Default)]
pub struct StreamStats {
  frames: AtomicU64,
  decode_drops: AtomicU64,
  reconnects: AtomicU64,
}

/// Point-in-time copy of `StreamStats`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamStatsSnapshot {
  /// Text frames received.
  pub frames: u64,
  /// Frames that were invalid JSON or matched no known shape.
  pub decode_drops: u64,
  /// Automatic reconnects scheduled.
  pub reconnects: u64,
}

impl StreamStats {
  /// Read all counters.
  pub fn snapshot(&self) -> StreamStatsSnapshot {
    StreamStatsSnapshot {
      frames: self.frames.load(Ordering::Relaxed),
      decode_drops: self.decode_drops.load(Ordering::Relaxed),
      reconnects: self.reconnects.load(Ordering::Relaxed),
    }
  }
}

/// Transport parameters.
#[derive(Debug, Clone)]
pub struct TransportConfig {
  /// Subscription type carried in the subscribe directive.
  pub subscription_type: String,
  /// Upstream limit on markets per connection.
  pub max_subscriptions: usize,
  /// Handshake deadline.
  pub connect_timeout: Duration,
  /// Interval of the transport's own heartbeat.
  pub heartbeat_interval: Duration,
  /// Retry policy after errors.
  pub reconnect: ReconnectPolicy,
  /// Request path the handshake credential is signed for.
  pub credential_path: String,
}

impl Default for TransportConfig {
  fn default() -> Self {
    Self {
      subscription_type: "market_data_lite".to_string(),
      max_subscriptions: MAX_SUBSCRIPTIONS,
      connect_timeout: Duration::from_secs(10),
      heartbeat_interval: Duration::from_secs(15),
      reconnect: ReconnectPolicy::default(),
      credential_path: "/".to_string(),
    }
  }
}

impl From<&StreamConfig> for TransportConfig {
  fn from(config: &StreamConfig) -> Self {
    Self {
      subscription_type: config.subscription_type.clone(),
      max_subscriptions: config.max_subscriptions,
      connect_timeout: Duration::from_millis(config.connect_timeout_ms),
      heartbeat_interval: Duration::from_millis(config.heartbeat_interval_ms),
      reconnect: ReconnectPolicy {
        base: Duration::from_millis(config.reconnect_base_ms),
        max: Duration::from_millis(config.reconnect_max_ms),
        max_attempts: config.max_reconnect_attempts,
      },
      credential_path: url_path(&config.ws_url).to_string(),
    }
  }
}

/// Path component of a URL, `/` when there is none.
fn url_path(url: &str) -> &str {
  let rest = url.split_once("://").map_or(url, |(_, rest)| rest);
  rest.find('/').map_or("/", |i| &rest[i..])
}

/// What a reconciliation asked the transport to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileAction {
  /// Nothing requested and nothing running.
  Noop,
  /// A new session was opened.
  Opened,
  /// The running session was handed the desired set.
  Updated,
  /// The running session was closed (desired set empty).
  Closed,
}

#[derive(Debug)]
enum Command {
  Open(SubscriptionSet),
  UpdateSubscription(SubscriptionSet),
  Reconcile(SubscriptionSet, oneshot::Sender<ReconcileAction>),
  Close,
  Reconnect,
}

enum ConnectFailure {
  Credential(String),
  Transport(TransportError),
}

struct ConnectOutcome {
  epoch: u64,
  result: Result<Box<dyn FrameStream>, ConnectFailure>,
}

/// Cloneable client side of the transport.
#[derive(Clone)]
pub struct StreamHandle {
  commands: mpsc::Sender<Command>,
  status: watch::Receiver<TransportStatus>,
  events: broadcast::Sender<StreamEvent>,
  store: SharedMarketStore,
  stats: Arc<StreamStats>,
}

impl StreamHandle {
  async fn send(&self, command: Command) -> Result<(), StreamError> {
    self
      .commands
      .send(command)
      .await
      .map_err(|_| StreamError::TransportStopped)
  }

  /// Open a session for `markets`, replacing any existing one.
  ///
  /// Resets the retry counter. Sets above the upstream limit are
  /// truncated to their first entries.
  pub async fn open(&self, markets: SubscriptionSet) -> Result<(), StreamError> {
    self.send(Command::Open(markets)).await
  }

  /// Alias of [`Self::open`].
  pub async fn connect(&self, markets: SubscriptionSet) -> Result<(), StreamError> {
    self.open(markets).await
  }

  /// Reopen only if `markets` differs from the active set (order-independent).
  pub async fn update_subscription(&self, markets: SubscriptionSet) -> Result<(), StreamError> {
    self.send(Command::UpdateSubscription(markets)).await
  }

  /// Open, update or close depending on the actor's current state.
  ///
  /// The active check runs inside the actor, so back-to-back calls see
  /// the effect of the previous one.
  pub async fn reconcile(&self, desired: SubscriptionSet) -> Result<ReconcileAction, StreamError> {
    let (reply_tx, reply_rx) = oneshot::channel();
    self.send(Command::Reconcile(desired, reply_tx)).await?;
    reply_rx.await.map_err(|_| StreamError::TransportStopped)
  }

  /// Tear down the session and go idle.
  pub async fn close(&self) -> Result<(), StreamError> {
    self.send(Command::Close).await
  }

  /// Alias of [`Self::close`].
  pub async fn disconnect(&self) -> Result<(), StreamError> {
    self.close().await
  }

  /// Manual retry with the last requested set, e.g. after `Failed`.
  pub async fn reconnect(&self) -> Result<(), StreamError> {
    self.send(Command::Reconnect).await
  }

  /// Current status.
  pub fn status(&self) -> TransportStatus {
    self.status.borrow().clone()
  }

  /// Whether the connection is open.
  pub fn is_connected(&self) -> bool {
    self.status.borrow().connected
  }

  /// User-actionable error, if any.
  pub fn error(&self) -> Option<StreamError> {
    self.status.borrow().error.clone()
  }

  /// Status watcher.
  pub fn watch_status(&self) -> watch::Receiver<TransportStatus> {
    self.status.clone()
  }

  /// New receiver on the event stream.
  pub fn subscribe_events(&self) -> broadcast::Receiver<StreamEvent> {
    self.events.subscribe()
  }

  /// Shared market store.
  pub fn store(&self) -> &SharedMarketStore {
    &self.store
  }

  /// Frame counters.
  pub fn stats(&self) -> StreamStatsSnapshot {
    self.stats.snapshot()
  }
}

/// The actor. Built with [`StreamTransport::new`], driven by [`StreamTransport::run`].
pub struct StreamTransport {
  config: TransportConfig,
  connector: Arc<dyn StreamConnector>,
  credentials: Arc<dyn CredentialProvider>,
  normalizer: MessageNormalizer,
  store: SharedMarketStore,
  stats: Arc<StreamStats>,

  commands: mpsc::Receiver<Command>,
  status_tx: watch::Sender<TransportStatus>,
  events_tx: broadcast::Sender<StreamEvent>,
  outcome_tx: mpsc::Sender<ConnectOutcome>,
  outcome_rx: mpsc::Receiver<ConnectOutcome>,

  state: ConnectionState,
  subscription: SubscriptionSet,
  epoch: u64,
  attempt: u32,
  error: Option<StreamError>,
  reconnect_at: Option<Instant>,
  pending: Option<JoinHandle<()>>,
  stream: Option<Box<dyn FrameStream>>,
  last_frame_at: Instant,
  last_applied_ms: i64,
}

impl StreamTransport {
  /// Create the actor and its handle.
  pub fn new(
    config: TransportConfig,
    connector: Arc<dyn StreamConnector>,
    credentials: Arc<dyn CredentialProvider>,
    store: SharedMarketStore,
  ) -> (Self, StreamHandle) {
    let (commands_tx, commands) = mpsc::channel(COMMAND_BUFFER);
    let (status_tx, status_rx) = watch::channel(TransportStatus::default());
    let (events_tx, _) = broadcast::channel(EVENT_BUFFER);
    let (outcome_tx, outcome_rx) = mpsc::channel(4);
    let stats = Arc::new(StreamStats::default());

    let handle = StreamHandle {
      commands: commands_tx,
      status: status_rx,
      events: events_tx.clone(),
      store: Arc::clone(&store),
      stats: Arc::clone(&stats),
    };

    let transport = Self {
      config,
      connector,
      credentials,
      normalizer: MessageNormalizer::new(),
      store,
      stats,
      commands,
      status_tx,
      events_tx,
      outcome_tx,
      outcome_rx,
      state: ConnectionState::Idle,
      subscription: SubscriptionSet::new(),
      epoch: 0,
      attempt: 0,
      error: None,
      reconnect_at: None,
      pending: None,
      stream: None,
      last_frame_at: Instant::now(),
      last_applied_ms: i64::MIN,
    };

    (transport, handle)
  }

  /// Run until shutdown or until every handle is dropped.
  #[instrument(skip(self, shutdown_rx), name = "stream_transport")]
  pub async fn run(mut self, mut shutdown_rx: broadcast::Receiver<()>) {
    let mut heartbeat = tokio::time::interval(self.config.heartbeat_interval);
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!(
      subscription_type = %self.config.subscription_type,
      max_subscriptions = self.config.max_subscriptions,
      "Stream transport started"
    );

    loop {
      tokio::select! {
        biased;
        _ = shutdown_rx.recv() => {
          info!("Shutdown signal in stream transport");
          break;
        }
        command = self.commands.recv() => match command {
          Some(command) => self.handle_command(command).await,
          None => {
            debug!("All stream handles dropped");
            break;
          }
        },
        Some(outcome) = self.outcome_rx.recv() => self.handle_outcome(outcome).await,
        frame = Self::next_frame(&mut self.stream) => self.handle_frame(frame).await,
        () = Self::wait_until(self.reconnect_at) => {
          self.reconnect_at = None;
          self.start_connect();
        }
        _ = heartbeat.tick() => self.emit_heartbeat(),
      }
      self.publish();
    }

    self.teardown().await;
    self.state = ConnectionState::Idle;
    self.publish();
  }

  /// Next frame of the live stream; pending forever without one.
  async fn next_frame(
    stream: &mut Option<Box<dyn FrameStream>>,
  ) -> Option<Result<String, TransportError>> {
    match stream {
      Some(stream) => stream.next_frame().await,
      None => std::future::pending().await,
    }
  }

  /// Sleep until the deadline; pending forever without one.
  async fn wait_until(deadline: Option<Instant>) {
    match deadline {
      Some(deadline) => tokio::time::sleep_until(deadline).await,
      None => std::future::pending().await,
    }
  }

  async fn handle_command(&mut self, command: Command) {
    debug!(?command, state = ?self.state, "Transport command");
    match command {
      Command::Open(markets) => self.open(markets).await,
      Command::UpdateSubscription(markets) => self.update_subscription(markets).await,
      Command::Reconcile(desired, reply) => {
        let action = match (self.state.is_active(), desired.is_empty()) {
          (false, true) => ReconcileAction::Noop,
          (false, false) => {
            self.open(desired).await;
            ReconcileAction::Opened
          }
          (true, true) => {
            self.close().await;
            ReconcileAction::Closed
          }
          (true, false) => {
            self.update_subscription(desired).await;
            ReconcileAction::Updated
          }
        };
        // The caller may have given up waiting.
        let _ = reply.send(action);
      }
      Command::Close => self.close().await,
      Command::Reconnect => {
        if self.subscription.is_empty() {
          warn!("Manual reconnect with no subscription, ignored");
          return;
        }
        info!(markets = self.subscription.len(), "Manual reconnect");
        self.teardown().await;
        self.attempt = 0;
        self.error = None;
        self.state = ConnectionState::Connecting;
        self.start_connect();
      }
    }
  }

  /// Reopen only when the effective set differs.
  async fn update_subscription(&mut self, markets: SubscriptionSet) {
    let (effective, _) = markets.truncated(self.config.max_subscriptions);
    if effective.same_markets(&self.subscription) {
      debug!(markets = effective.len(), "Subscription unchanged, keeping session");
      return;
    }
    self.open(markets).await;
  }

  async fn close(&mut self) {
    self.teardown().await;
    self.subscription = SubscriptionSet::new();
    self.attempt = 0;
    self.error = None;
    self.state = ConnectionState::Idle;
    info!("Stream closed");
  }

  /// Replace the session with one for `markets`.
  async fn open(&mut self, markets: SubscriptionSet) {
    let (effective, dropped) = markets.truncated(self.config.max_subscriptions);
    if !dropped.is_empty() {
      warn!(
        kept = effective.len(),
        dropped = dropped.len(),
        dropped_markets = ?dropped,
        "Subscription exceeds upstream limit, truncated"
      );
    }

    self.teardown().await;
    self.attempt = 0;
    self.error = None;
    self.subscription = effective;

    if self.subscription.is_empty() {
      self.state = ConnectionState::Idle;
      debug!("Empty subscription, staying idle");
      return;
    }

    self.state = ConnectionState::Connecting;
    self.start_connect();
  }

  /// Drop the live stream, the pending attempt and the retry deadline.
  async fn teardown(&mut self) {
    self.reconnect_at = None;
    if let Some(pending) = self.pending.take() {
      pending.abort();
    }
    // Invalidate any outcome already queued by the aborted attempt.
    self.epoch += 1;
    if let Some(mut stream) = self.stream.take() {
      stream.close().await;
    }
  }

  /// Spawn a connection attempt for the current subscription.
  fn start_connect(&mut self) {
    if let Some(pending) = self.pending.take() {
      pending.abort();
    }
    self.epoch += 1;
    self.state = ConnectionState::Connecting;

    let epoch = self.epoch;
    let connector = Arc::clone(&self.connector);
    let credentials = Arc::clone(&self.credentials);
    let path = self.config.credential_path.clone();
    let timeout = self.config.connect_timeout;
    let directive = SubscribeDirective {
      subscription_type: self.config.subscription_type.clone(),
      market_ids: self.subscription.as_slice().to_vec(),
    };
    let outcome_tx = self.outcome_tx.clone();

    debug!(epoch, markets = directive.market_ids.len(), "Connecting");

    self.pending = Some(tokio::spawn(async move {
      let result = Self::connect_once(connector, credentials, &path, directive, timeout).await;
      // The actor may be gone; the stream is dropped with the outcome.
      let _ = outcome_tx.send(ConnectOutcome { epoch, result }).await;
    }));
  }

  /// Fetch the credential, then handshake.
  ///
  /// Both steps share one deadline. A credential provider that does not
  /// answer in time is a credential failure and is not retried.
  async fn connect_once(
    connector: Arc<dyn StreamConnector>,
    credentials: Arc<dyn CredentialProvider>,
    path: &str,
    directive: SubscribeDirective,
    timeout: Duration,
  ) -> Result<Box<dyn FrameStream>, ConnectFailure> {
    let deadline = Instant::now() + timeout;

    let fetch = credentials.credential("GET", path);
    let credential = match tokio::time::timeout_at(deadline, fetch).await {
      Ok(Ok(credential)) => credential,
      Ok(Err(e)) => return Err(ConnectFailure::Credential(format!("{e:#}"))),
      Err(_) => {
        return Err(ConnectFailure::Credential(format!(
          "credential provider did not answer within {timeout:?}"
        )));
      }
    };

    let request = ConnectRequest {
      directive,
      credential,
    };
    match tokio::time::timeout_at(deadline, connector.connect(request)).await {
      Ok(Ok(stream)) => Ok(stream),
      Ok(Err(e)) => Err(ConnectFailure::Transport(e)),
      Err(_) => Err(ConnectFailure::Transport(TransportError::Timeout(timeout))),
    }
  }

  async fn handle_outcome(&mut self, outcome: ConnectOutcome) {
    if outcome.epoch != self.epoch {
      debug!(
        stale_epoch = outcome.epoch,
        epoch = self.epoch,
        "Discarding superseded connection attempt"
      );
      if let Ok(mut stream) = outcome.result {
        stream.close().await;
      }
      return;
    }
    self.pending = None;

    match outcome.result {
      Ok(stream) => {
        self.stream = Some(stream);
        self.state = ConnectionState::Open;
        self.attempt = 0;
        self.error = None;
        self.last_frame_at = Instant::now();
        info!(
          epoch = self.epoch,
          markets = self.subscription.len(),
          "Stream open"
        );
      }
      Err(ConnectFailure::Credential(reason)) => {
        error!(reason = %reason, "Credential fetch failed, not retrying");
        self.state = ConnectionState::Failed;
        self.error = Some(StreamError::Credential(reason));
      }
      Err(ConnectFailure::Transport(e)) => self.schedule_reconnect(e),
    }
  }

  /// Back off after a failure, or give up once retries are exhausted.
  fn schedule_reconnect(&mut self, cause: TransportError) {
    self.stream = None;
    match self.config.reconnect.next_delay(self.attempt) {
      Some(delay) => {
        self.attempt += 1;
        self.reconnect_at = Some(Instant::now() + delay);
        self.state = ConnectionState::Reconnecting;
        self.stats.reconnects.fetch_add(1, Ordering::Relaxed);
        warn!(
          error = %cause,
          attempt = self.attempt,
          delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
          "Stream lost, reconnecting"
        );
      }
      None => {
        error!(error = %cause, attempts = self.attempt, "Reconnect attempts exhausted");
        self.state = ConnectionState::Failed;
        self.error = Some(StreamError::ReconnectExhausted {
          attempts: self.attempt,
          last: cause,
        });
      }
    }
  }

  async fn handle_frame(&mut self, frame: Option<Result<String, TransportError>>) {
    let text = match frame {
      Some(Ok(text)) => text,
      Some(Err(e)) => {
        if let Some(mut stream) = self.stream.take() {
          stream.close().await;
        }
        self.schedule_reconnect(e);
        return;
      }
      None => {
        self.stream = None;
        self.schedule_reconnect(TransportError::Closed);
        return;
      }
    };

    self.last_frame_at = Instant::now();
    self.stats.frames.fetch_add(1, Ordering::Relaxed);

    match self.normalizer.decode(&text) {
      Err(e) => {
        self.stats.decode_drops.fetch_add(1, Ordering::Relaxed);
        debug!(error = %e, "Dropping undecodable frame");
      }
      Ok(None) => {
        self.stats.decode_drops.fetch_add(1, Ordering::Relaxed);
        debug!(len = text.len(), "Dropping frame of unknown shape");
      }
      Ok(Some(NormalizedUpdate::Control(signal))) => self.handle_control(signal).await,
      Ok(Some(NormalizedUpdate::Market(update))) => self.apply_update(&update).await,
    }
  }

  async fn handle_control(&mut self, signal: ControlSignal) {
    match signal {
      ControlSignal::Heartbeat => {}
      ControlSignal::Connected => debug!("Upstream confirmed session"),
      ControlSignal::Subscribed(markets) => {
        info!(markets = markets.len(), "Subscription acknowledged");
      }
      ControlSignal::Error(message) => warn!(message = %message, "Upstream error frame"),
      ControlSignal::Disconnected => {
        warn!("Upstream announced disconnect");
        if let Some(mut stream) = self.stream.take() {
          stream.close().await;
        }
        self.schedule_reconnect(TransportError::Closed);
      }
    }
  }

  async fn apply_update(&mut self, update: &MarketUpdate) {
    // Series reject points older than their last one; a wall clock
    // stepping backwards must not stall them.
    let now_ms = Utc::now().timestamp_millis().max(self.last_applied_ms);
    self.last_applied_ms = now_ms;
    let mut store = self.store.write().await;
    let applied = store.apply(update, now_ms);

    if applied.price {
      if let Some(prices) = store.price(&update.market_id) {
        let _ = self.events_tx.send(StreamEvent::Price(prices.clone()));
      }
    }
    if applied.event {
      if let Some(event) = store.event(&update.market_id) {
        let _ = self.events_tx.send(StreamEvent::Event(event.clone()));
      }
    }
  }

  fn emit_heartbeat(&self) {
    if self.state == ConnectionState::Open {
      let _ = self.events_tx.send(StreamEvent::Heartbeat {
        since_last_frame: self.last_frame_at.elapsed(),
      });
    }
  }

  /// Push the status if it changed; emit a state event on transitions.
  fn publish(&self) {
    let status = TransportStatus {
      state: self.state,
      connected: self.state == ConnectionState::Open,
      error: self.error.clone(),
      attempt: self.attempt,
      subscription: self.subscription.clone(),
      epoch: self.epoch,
    };
    let mut previous_state = None;
    self.status_tx.send_if_modified(|current| {
      if *current == status {
        return false;
      }
      previous_state = Some(current.state);
      *current = status;
      true
    });

    if let Some(previous) = previous_state.filter(|previous| *previous != self.state) {
      debug!(from = ?previous, to = ?self.state, "Connection state changed");
      let _ = self.events_tx.send(StreamEvent::State(self.state));
    }
  }
}
