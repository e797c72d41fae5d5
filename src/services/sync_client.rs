use std::{future, sync::Arc};

use reqwest::Url;
use tokio::{
    sync::{mpsc, oneshot, watch},
    task::JoinHandle,
};
use tokio_stream::wrappers::WatchStream;
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

use crate::{
    config::ClientConfig,
    dto::{
        format_instant,
        leaderboard::{HistoricalPeriodSummary, LeaderboardSnapshot},
        ws::PushEvent,
    },
    error::{ClientError, PullResult},
    services::{
        fallback::{FallbackAction, PullReason, TransportFallbackController, TransportSignal},
        history_service,
        pull_service::{HttpPullSource, PullSource},
        websocket_service::{ChannelEvent, PushConnector, PushHandle, WebSocketConnector},
    },
    state::{
        Clock, Connectivity, CountdownChange, CountdownProjector, StateReconciler, SyncState,
        SystemClock,
    },
};

/// Handle on a running leaderboard synchronisation session.
///
/// A background driver task owns all mutable state; this handle only reads the
/// published [`SyncState`]. Dropping the handle stops the driver, same as
/// [`SyncClient::dispose`] without waiting for it.
pub struct SyncClient {
    session: Uuid,
    state: watch::Receiver<SyncState>,
    shutdown: Option<oneshot::Sender<()>>,
    driver: Option<JoinHandle<()>>,
    pull: Arc<dyn PullSource>,
}

impl SyncClient {
    /// Start a client against the configured backend using WebSocket push and HTTP pull.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(config: &ClientConfig) -> Result<Self, ClientError> {
        let backend =
            Url::parse(&config.backend_url).map_err(|err| ClientError::InvalidBackendUrl {
                url: config.backend_url.clone(),
                reason: err.to_string(),
            })?;
        let push = WebSocketConnector::from_config(&backend, config).ok_or_else(|| {
            ClientError::InvalidBackendUrl {
                url: config.backend_url.clone(),
                reason: format!("unsupported scheme `{}`", backend.scheme()),
            }
        })?;
        let pull = HttpPullSource::new(&backend, config.pull_timeout)?;

        info!(
            backend_url = %backend,
            push_endpoint = %push.endpoint(),
            "starting leaderboard sync"
        );
        Ok(Self::with_transports(
            Arc::new(push),
            Arc::new(pull),
            Arc::new(SystemClock),
        ))
    }

    /// Start a client over arbitrary transports and clock.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn with_transports(
        push: Arc<dyn PushConnector>,
        pull: Arc<dyn PullSource>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let session = Uuid::new_v4();
        let (state_tx, state_rx) = watch::channel(SyncState::default());
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let driver = Driver::new(push, Arc::clone(&pull), clock, state_tx);
        let span = info_span!("sync_client", session = %session);
        let task = tokio::spawn(driver.run(shutdown_rx).instrument(span));

        Self {
            session,
            state: state_rx,
            shutdown: Some(shutdown_tx),
            driver: Some(task),
            pull,
        }
    }

    /// Identifier attached to this session's log lines.
    pub fn session_id(&self) -> Uuid {
        self.session
    }

    /// Latest published state.
    pub fn state(&self) -> SyncState {
        self.state.borrow().clone()
    }

    /// Current push channel connectivity.
    pub fn connectivity(&self) -> Connectivity {
        self.state.borrow().connectivity
    }

    /// New receiver observing every published state.
    pub fn subscribe(&self) -> watch::Receiver<SyncState> {
        self.state.clone()
    }

    /// Published states as a stream, starting with the current one.
    pub fn updates(&self) -> WatchStream<SyncState> {
        WatchStream::new(self.state.clone())
    }

    /// Top ten of a past period, from its embedded snapshot or the historical endpoint.
    pub async fn load_period(
        &self,
        summary: &HistoricalPeriodSummary,
    ) -> Option<LeaderboardSnapshot> {
        history_service::load_period(self.pull.as_ref(), summary).await
    }

    /// Stop the push channel and the countdown, then wait for the driver to exit.
    ///
    /// The published state never changes after this returns.
    pub async fn dispose(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(driver) = self.driver.take() {
            if let Err(err) = driver.await {
                warn!(session = %self.session, error = %err, "sync driver ended abnormally");
            }
        }
    }
}

impl Drop for SyncClient {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
    }
}

/// Completed pull reported back to the driver.
struct PullOutcome {
    reason: PullReason,
    result: PullResult<LeaderboardSnapshot>,
}

/// Single owner of the reconciler, projector and fallback controller.
struct Driver {
    push: Arc<dyn PushConnector>,
    pull: Arc<dyn PullSource>,
    controller: TransportFallbackController,
    reconciler: StateReconciler,
    projector: CountdownProjector,
    state: watch::Sender<SyncState>,
    pull_tx: mpsc::UnboundedSender<PullOutcome>,
    pull_rx: mpsc::UnboundedReceiver<PullOutcome>,
}

impl Driver {
    fn new(
        push: Arc<dyn PushConnector>,
        pull: Arc<dyn PullSource>,
        clock: Arc<dyn Clock>,
        state: watch::Sender<SyncState>,
    ) -> Self {
        let (pull_tx, pull_rx) = mpsc::unbounded_channel();
        Self {
            push,
            pull,
            controller: TransportFallbackController::new(),
            reconciler: StateReconciler::new(),
            projector: CountdownProjector::new(clock),
            state,
            pull_tx,
            pull_rx,
        }
    }

    async fn run(mut self, mut shutdown: oneshot::Receiver<()>) {
        debug!("sync driver started");
        let mut push = Some(self.push.open());
        if let Some(action) = self.controller.start() {
            self.perform(action, push.as_ref());
        }
        self.publish();

        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => break,
                event = next_push_event(&mut push) => match event {
                    Some(event) => self.on_channel_event(event, push.as_ref()),
                    None => {
                        warn!("push channel closed; serving pulled state only");
                        push = None;
                    }
                },
                Some(outcome) = self.pull_rx.recv() => self.on_pull_outcome(outcome),
                _ = self.projector.tick() => self.publish(),
            }
        }

        self.projector.disarm();
        drop(push);
        debug!("sync driver stopped");
    }

    fn on_channel_event(&mut self, event: ChannelEvent, push: Option<&PushHandle>) {
        match event {
            ChannelEvent::Connected => {
                info!("push channel connected");
                self.on_signal(TransportSignal::Connected, push);
            }
            ChannelEvent::Disconnected { reason } => {
                warn!(%reason, "push channel disconnected");
                self.on_signal(TransportSignal::Disconnected, push);
            }
            ChannelEvent::ConnectError { reason } => {
                warn!(%reason, "push channel connect error");
                self.on_signal(TransportSignal::ConnectError, push);
            }
            ChannelEvent::Event(PushEvent::Leaderboard(payload)) => {
                match self.reconciler.accept_leaderboard_payload(payload) {
                    Ok(()) => {
                        debug!(
                            entries = self.reconciler.snapshot().ranked_entries().len(),
                            "applied pushed leaderboard"
                        );
                        self.publish();
                    }
                    Err(err) => warn!(error = %err, "dropping malformed leaderboard update"),
                }
            }
            ChannelEvent::Event(PushEvent::Countdown(payload)) => {
                match self.reconciler.accept_countdown_payload(payload) {
                    Ok(CountdownChange::Rearm(end)) => {
                        let breakdown = self.projector.arm(end);
                        debug!(end = %format_instant(end), %breakdown, "countdown re-armed");
                        self.publish();
                    }
                    Ok(CountdownChange::Unchanged) => {}
                    Err(err) => warn!(error = %err, "dropping malformed countdown update"),
                }
            }
            ChannelEvent::Event(PushEvent::Other(name)) => {
                debug!(event = %name, "ignoring unknown push event");
            }
        }
    }

    fn on_signal(&mut self, signal: TransportSignal, push: Option<&PushHandle>) {
        if let Some(action) = self.controller.on_signal(signal) {
            self.perform(action, push);
        }
        self.publish();
    }

    fn perform(&mut self, action: FallbackAction, push: Option<&PushHandle>) {
        match action {
            FallbackAction::RequestUpdate => {
                if !push.is_some_and(PushHandle::request_update) {
                    debug!("push channel gone; request_update skipped");
                }
            }
            FallbackAction::Pull(reason) => self.spawn_pull(reason),
        }
    }

    fn spawn_pull(&self, reason: PullReason) {
        debug!(?reason, "pulling current leaderboard");
        let fetch = self.pull.fetch_current();
        let outcomes = self.pull_tx.clone();
        // Detached: once the driver is gone the outcome has nowhere to go.
        tokio::spawn(
            async move {
                let result = fetch.await;
                let _ = outcomes.send(PullOutcome { reason, result });
            }
            .in_current_span(),
        );
    }

    fn on_pull_outcome(&mut self, outcome: PullOutcome) {
        self.controller.on_pull_finished();
        match outcome.result {
            Ok(snapshot) => {
                info!(
                    reason = ?outcome.reason,
                    entries = snapshot.ranked_entries().len(),
                    "applied pulled leaderboard"
                );
                self.reconciler.apply_leaderboard_update(snapshot);
                self.publish();
            }
            Err(err) => warn!(
                reason = ?outcome.reason,
                error = %err,
                "leaderboard pull failed; keeping last snapshot"
            ),
        }
    }

    fn publish(&self) {
        self.state.send_replace(SyncState {
            connectivity: self.controller.connectivity(),
            leaderboard: self.reconciler.shared_snapshot(),
            countdown: self.projector.breakdown(),
            end_instant: self.projector.end_instant(),
        });
    }
}

async fn next_push_event(push: &mut Option<PushHandle>) -> Option<ChannelEvent> {
    match push {
        Some(handle) => handle.next_event().await,
        None => future::pending().await,
    }
}
