use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

use super::error::SessionError;
use super::stream_id::handoff;
use crate::core::agent::{
    AgentConnector, AgentReceiver, AgentSender, ReceiverReport, SenderReport, run_audio_sender,
};
use crate::core::audio::{AudioFramer, DEFAULT_CHUNK_SIZE};
use crate::core::functions::FunctionDispatcher;
use crate::core::telephony::{ReaderReport, TelephonyReader, TelephonySender};
use crate::core::transport::{BoxedSink, BoxedSource};

/// Default bound on opening the agent connection.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default bound on stopping the workers and closing both connections.
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Lifecycle of a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Opening the agent connection and sending settings
    Connecting,
    /// All three workers are relaying
    Active,
    /// One worker finished; the rest are being stopped
    Draining,
    /// Both connections are closed
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Connecting => write!(f, "connecting"),
            SessionState::Active => write!(f, "active"),
            SessionState::Draining => write!(f, "draining"),
            SessionState::Closed => write!(f, "closed"),
        }
    }
}

/// The three concurrent halves of an active call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Worker {
    TelephonyReader,
    AudioSender,
    AgentReceiver,
}

impl fmt::Display for Worker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Worker::TelephonyReader => write!(f, "telephony_reader"),
            Worker::AudioSender => write!(f, "audio_sender"),
            Worker::AgentReceiver => write!(f, "agent_receiver"),
        }
    }
}

/// Per-call tuning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Bytes of caller audio per agent chunk
    pub chunk_size: usize,
    /// Bound on opening the agent connection
    pub connect_timeout: Duration,
    /// Fail the call if the agent is silent this long
    pub receive_timeout: Option<Duration>,
    /// Workers still running this long after the call ends are aborted;
    /// each connection close is bounded by the same limit
    pub drain_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            receive_timeout: None,
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
        }
    }
}

/// Summary of a finished call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionReport {
    pub call_id: String,
    pub stream_sid: Option<String>,
    /// Worker whose exit ended the call
    pub ended_by: Option<Worker>,
    pub telephony_frames: u64,
    pub malformed_frames: u64,
    pub chunks_queued: u64,
    pub chunks_sent: u64,
    pub discarded_bytes: usize,
    pub media_frames: u64,
    pub clears: u64,
    pub function_calls: u64,
}

impl SessionReport {
    fn record(&mut self, outcome: &WorkerOutcome) {
        match outcome {
            WorkerOutcome::Reader(Ok(report)) => self.absorb_reader(report),
            WorkerOutcome::Sender(Ok(report)) => self.absorb_sender(report),
            WorkerOutcome::Receiver(Ok(report)) => self.absorb_receiver(report),
            _ => {}
        }
    }

    fn absorb_reader(&mut self, report: &ReaderReport) {
        self.telephony_frames = report.frames;
        self.malformed_frames = report.malformed_frames;
        self.chunks_queued = report.chunks_queued;
        self.discarded_bytes = report.discarded_bytes;
    }

    fn absorb_sender(&mut self, report: &SenderReport) {
        self.chunks_sent = report.chunks_sent;
    }

    fn absorb_receiver(&mut self, report: &ReceiverReport) {
        self.stream_sid = report.stream_sid.clone();
        self.media_frames = report.media_frames;
        self.clears = report.clears;
        self.function_calls = report.function_calls;
    }
}

enum WorkerOutcome {
    Reader(Result<ReaderReport, SessionError>),
    Sender(Result<SenderReport, SessionError>),
    Receiver(Result<ReceiverReport, SessionError>),
}

impl WorkerOutcome {
    fn worker(&self) -> Worker {
        match self {
            WorkerOutcome::Reader(_) => Worker::TelephonyReader,
            WorkerOutcome::Sender(_) => Worker::AudioSender,
            WorkerOutcome::Receiver(_) => Worker::AgentReceiver,
        }
    }

    fn error(&self) -> Option<&SessionError> {
        match self {
            WorkerOutcome::Reader(Err(e)) => Some(e),
            WorkerOutcome::Sender(Err(e)) => Some(e),
            WorkerOutcome::Receiver(Err(e)) => Some(e),
            _ => None,
        }
    }
}

/// One bridged call between a telephony socket and an agent connection.
///
/// ```ignore
/// let session = CallSession::new(connector, dispatcher, settings, SessionConfig::default());
/// let report = session.run(telephony_sink, telephony_source).await?;
/// ```
pub struct CallSession {
    call_id: String,
    config: SessionConfig,
    connector: Arc<dyn AgentConnector>,
    dispatcher: Arc<FunctionDispatcher>,
    agent_settings: Arc<Value>,
    state: watch::Sender<SessionState>,
}

impl CallSession {
    pub fn new(
        connector: Arc<dyn AgentConnector>,
        dispatcher: Arc<FunctionDispatcher>,
        agent_settings: Arc<Value>,
        config: SessionConfig,
    ) -> Self {
        let (state, _) = watch::channel(SessionState::Connecting);
        Self {
            call_id: Uuid::new_v4().to_string(),
            config,
            connector,
            dispatcher,
            agent_settings,
            state,
        }
    }

    pub fn call_id(&self) -> &str {
        &self.call_id
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Follow lifecycle transitions.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    fn set_state(&self, state: SessionState) {
        self.state.send_replace(state);
        debug!(state = %state, "Session state changed");
    }

    /// Relay the call until either side ends it.
    ///
    /// Opens the agent connection, sends the settings document, then runs
    /// the telephony reader, audio sender and agent receiver concurrently.
    /// The first worker to finish stops the other two; both connections are
    /// closed before this returns. An error ends the call with an `error`
    /// frame to the telephony peer.
    pub async fn run(
        self,
        telephony_sink: BoxedSink,
        telephony_source: BoxedSource,
    ) -> Result<SessionReport, SessionError> {
        let span = info_span!("call", call_id = %self.call_id);
        self.relay(telephony_sink, telephony_source)
            .instrument(span)
            .await
    }

    async fn relay(
        self,
        telephony_sink: BoxedSink,
        telephony_source: BoxedSource,
    ) -> Result<SessionReport, SessionError> {
        let telephony = TelephonySender::new(telephony_sink);
        self.set_state(SessionState::Connecting);
        info!(endpoint = %self.connector.endpoint(), "Opening agent connection");

        let (agent_sink, agent_source) = match self.open_agent().await {
            Ok(halves) => halves,
            Err(e) => {
                error!(error = %e, "Agent setup failed");
                self.close_telephony(&telephony, Some(&e)).await;
                self.set_state(SessionState::Closed);
                return Err(e);
            }
        };

        let agent = AgentSender::new(agent_sink);
        if let Err(e) = agent.send_settings(&self.agent_settings).await {
            let e = SessionError::SettingsSend(e);
            error!(error = %e, "Agent setup failed");
            close_agent(&agent).await;
            self.close_telephony(&telephony, Some(&e)).await;
            self.set_state(SessionState::Closed);
            return Err(e);
        }
        debug!("Agent settings sent");

        let cancel = CancellationToken::new();
        let (audio_tx, audio_rx) = mpsc::unbounded_channel();
        // Held until every worker has stopped so the queue never closes
        // underneath an active session.
        let queue_guard = audio_tx.clone();
        let (stream_writer, stream_reader) = handoff();

        let reader = TelephonyReader::new(
            telephony_source,
            AudioFramer::new(self.config.chunk_size),
            audio_tx,
            stream_writer,
        );
        let receiver = AgentReceiver::new(
            agent_source,
            telephony.clone(),
            agent.clone(),
            self.dispatcher.clone(),
            stream_reader,
        )
        .with_receive_timeout(self.config.receive_timeout);

        let mut workers = JoinSet::new();
        {
            let cancel = cancel.clone();
            workers.spawn(
                async move { WorkerOutcome::Reader(reader.run(cancel).await) }.in_current_span(),
            );
        }
        {
            let cancel = cancel.clone();
            let agent = agent.clone();
            workers.spawn(
                async move { WorkerOutcome::Sender(run_audio_sender(audio_rx, agent, cancel).await) }
                    .in_current_span(),
            );
        }
        {
            let cancel = cancel.clone();
            workers.spawn(
                async move { WorkerOutcome::Receiver(receiver.run(cancel).await) }
                    .in_current_span(),
            );
        }

        self.set_state(SessionState::Active);
        info!("Call relay active");

        let mut report = SessionReport {
            call_id: self.call_id.clone(),
            ..SessionReport::default()
        };

        let result = match workers.join_next().await {
            Some(joined) => self.settle_first(joined, &mut report),
            None => Ok(()),
        };

        self.set_state(SessionState::Draining);
        cancel.cancel();

        let limit = self.config.drain_timeout;
        if tokio::time::timeout(limit, drain_workers(&mut workers, &mut report))
            .await
            .is_err()
        {
            warn!(remaining = workers.len(), "Workers did not stop in time; aborting");
            workers.abort_all();
            drain_workers(&mut workers, &mut report).await;
        }
        drop(queue_guard);

        tokio::join!(
            bounded_close("agent", limit, close_agent(&agent)),
            bounded_close(
                "telephony",
                limit,
                self.close_telephony(&telephony, result.as_ref().err())
            ),
        );
        self.set_state(SessionState::Closed);

        match result {
            Ok(()) => {
                info!(
                    ended_by = ?report.ended_by,
                    chunks_sent = report.chunks_sent,
                    media_frames = report.media_frames,
                    function_calls = report.function_calls,
                    "Call ended"
                );
                Ok(report)
            }
            Err(e) => {
                error!(error = %e, ended_by = ?report.ended_by, "Call failed");
                Err(e)
            }
        }
    }

    async fn open_agent(&self) -> Result<(BoxedSink, BoxedSource), SessionError> {
        let limit = self.config.connect_timeout;
        tokio::time::timeout(limit, self.connector.connect())
            .await
            .map_err(|_| SessionError::ConnectTimeout(limit))?
    }

    fn settle_first(
        &self,
        joined: Result<WorkerOutcome, JoinError>,
        report: &mut SessionReport,
    ) -> Result<(), SessionError> {
        let outcome = joined.map_err(|e| {
            error!(error = %e, "Session worker aborted");
            SessionError::Worker(e.to_string())
        })?;

        let worker = outcome.worker();
        report.ended_by = Some(worker);
        report.record(&outcome);

        match outcome.error() {
            Some(e) => {
                warn!(worker = %worker, error = %e, "Worker failed; ending call");
                Err(e.clone())
            }
            None => {
                info!(worker = %worker, "Worker finished; ending call");
                Ok(())
            }
        }
    }

    async fn close_telephony(&self, telephony: &TelephonySender, failure: Option<&SessionError>) {
        if let Some(e) = failure
            && let Err(send_err) = telephony.send_error(e.code(), &e.to_string()).await
        {
            debug!(error = %send_err, "Could not deliver error frame");
        }
        if let Err(e) = telephony.close().await {
            debug!(error = %e, "Telephony close failed");
        }
    }
}

/// Collect the outcome of every worker still in the set.
async fn drain_workers(workers: &mut JoinSet<WorkerOutcome>, report: &mut SessionReport) {
    while let Some(joined) = workers.join_next().await {
        match joined {
            Ok(outcome) => {
                if let Some(e) = outcome.error() {
                    debug!(worker = %outcome.worker(), error = %e, "Worker failed while draining");
                }
                report.record(&outcome);
            }
            Err(e) => debug!(error = %e, "Worker aborted while draining"),
        }
    }
}

async fn bounded_close(side: &'static str, limit: Duration, close: impl Future<Output = ()>) {
    if tokio::time::timeout(limit, close).await.is_err() {
        warn!(side, "Connection close timed out");
    }
}

async fn close_agent(agent: &AgentSender) {
    if let Err(e) = agent.close().await {
        debug!(error = %e, "Agent close failed");
    }
}
