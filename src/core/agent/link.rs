use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use serde_json::Value;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, warn};

use super::messages::{ControlEvent, FunctionCallResponse};
use crate::core::audio::AudioChunk;
use crate::core::functions::FunctionDispatcher;
use crate::core::session::{SessionError, StreamIdReader};
use crate::core::telephony::TelephonySender;
use crate::core::transport::{BoxedSink, BoxedSource, Frame, TransportError};

/// Shared writer for the agent socket.
///
/// The audio sender and concurrent function-call tasks all write here; the
/// mutex keeps each frame whole.
#[derive(Clone)]
pub struct AgentSender {
    sink: Arc<Mutex<BoxedSink>>,
}

impl AgentSender {
    pub fn new(sink: BoxedSink) -> Self {
        Self {
            sink: Arc::new(Mutex::new(sink)),
        }
    }

    /// Send the session settings document.
    pub async fn send_settings(&self, settings: &Value) -> Result<(), TransportError> {
        self.send(Frame::Text(settings.to_string())).await
    }

    pub async fn send_audio(&self, chunk: AudioChunk) -> Result<(), TransportError> {
        self.send(Frame::Binary(chunk.into_bytes())).await
    }

    pub async fn send_function_response(
        &self,
        response: &FunctionCallResponse,
    ) -> Result<(), TransportError> {
        let text =
            serde_json::to_string(response).map_err(|e| TransportError::Send(e.to_string()))?;
        self.send(Frame::Text(text)).await
    }

    async fn send(&self, frame: Frame) -> Result<(), TransportError> {
        self.sink.lock().await.send(frame).await
    }

    pub async fn close(&self) -> Result<(), TransportError> {
        self.sink.lock().await.close().await
    }
}

// =============================================================================
// Audio sender
// =============================================================================

/// Counters collected by the audio sender.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SenderReport {
    pub chunks_sent: u64,
}

/// Drain the audio queue into the agent, in order, until the session is
/// cancelled.
///
/// The session keeps the queue open for as long as it runs, so a closed
/// queue means the call is broken and is reported as `AudioQueueClosed`.
pub async fn run_audio_sender(
    mut audio_rx: mpsc::UnboundedReceiver<AudioChunk>,
    agent: AgentSender,
    cancel: CancellationToken,
) -> Result<SenderReport, SessionError> {
    let mut chunks_sent = 0u64;

    loop {
        let chunk = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(SenderReport { chunks_sent }),
            chunk = audio_rx.recv() => chunk,
        };

        let Some(chunk) = chunk else {
            debug!(chunks_sent, "Audio queue closed");
            return Err(SessionError::AudioQueueClosed);
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(SenderReport { chunks_sent }),
            sent = agent.send_audio(chunk) => sent.map_err(SessionError::AgentTransport)?,
        }
        chunks_sent += 1;
    }
}

// =============================================================================
// Agent receiver
// =============================================================================

/// Why the agent receiver stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiverExit {
    /// The agent closed its socket
    AgentClosed,
    /// The telephony leg ended before a stream started
    NoStream,
    /// The session asked the receiver to stop
    Cancelled,
}

/// Counters collected by the agent receiver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiverReport {
    pub exit: ReceiverExit,
    pub stream_sid: Option<String>,
    pub media_frames: u64,
    pub clears: u64,
    pub function_calls: u64,
    pub ignored_events: u64,
}

impl ReceiverReport {
    fn new(exit: ReceiverExit) -> Self {
        Self {
            exit,
            stream_sid: None,
            media_frames: 0,
            clears: 0,
            function_calls: 0,
            ignored_events: 0,
        }
    }
}

/// Reads the agent socket: relays synthesized audio to the caller, turns
/// barge-in into a `clear`, and answers function calls.
pub struct AgentReceiver {
    source: BoxedSource,
    telephony: TelephonySender,
    agent: AgentSender,
    dispatcher: Arc<FunctionDispatcher>,
    stream_id: StreamIdReader,
    receive_timeout: Option<Duration>,
}

impl AgentReceiver {
    pub fn new(
        source: BoxedSource,
        telephony: TelephonySender,
        agent: AgentSender,
        dispatcher: Arc<FunctionDispatcher>,
        stream_id: StreamIdReader,
    ) -> Self {
        Self {
            source,
            telephony,
            agent,
            dispatcher,
            stream_id,
            receive_timeout: None,
        }
    }

    /// Fail the session if the agent sends nothing for `timeout`.
    pub fn with_receive_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.receive_timeout = timeout;
        self
    }

    pub async fn run(self, cancel: CancellationToken) -> Result<ReceiverReport, SessionError> {
        let AgentReceiver {
            mut source,
            telephony,
            agent,
            dispatcher,
            mut stream_id,
            receive_timeout,
        } = self;

        // Nothing addressed to the caller can go out before the stream is known.
        let stream_sid = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(ReceiverReport::new(ReceiverExit::Cancelled)),
            assigned = stream_id.wait() => match assigned {
                Ok(stream_sid) => stream_sid,
                Err(e) => {
                    debug!(error = %e, "Telephony ended before the stream started");
                    return Ok(ReceiverReport::new(ReceiverExit::NoStream));
                }
            },
        };
        debug!(stream_sid = %stream_sid, "Agent receiver has stream identifier");

        let mut report = ReceiverReport::new(ReceiverExit::AgentClosed);
        let mut calls: JoinSet<Result<(), SessionError>> = JoinSet::new();

        let exit = loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => break ReceiverExit::Cancelled,
                Some(joined) = calls.join_next() => {
                    match joined {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => return Err(e),
                        Err(e) => warn!(error = %e, "Function call task ended abnormally"),
                    }
                    continue;
                }
                next = next_frame(&mut source, receive_timeout) => next?,
            };

            match next {
                None | Some(Ok(Frame::Close)) => break ReceiverExit::AgentClosed,
                Some(Err(e)) => return Err(SessionError::AgentTransport(e)),
                Some(Ok(Frame::Binary(audio))) => {
                    // A stalled caller must not hold up cancellation
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => break ReceiverExit::Cancelled,
                        sent = relay_audio(&telephony, &stream_sid, audio) => sent?,
                    }
                    report.media_frames += 1;
                }
                Some(Ok(Frame::Text(text))) => match ControlEvent::parse(&text) {
                    Ok(ControlEvent::UserStartedSpeaking) => {
                        info!("Caller barged in; clearing playback");
                        tokio::select! {
                            biased;
                            _ = cancel.cancelled() => break ReceiverExit::Cancelled,
                            sent = telephony.send_clear(&stream_sid) => {
                                sent.map_err(SessionError::TelephonyTransport)?
                            }
                        }
                        report.clears += 1;
                    }
                    Ok(ControlEvent::FunctionCallRequest(requests)) => {
                        for request in requests {
                            let dispatcher = dispatcher.clone();
                            let agent = agent.clone();
                            calls.spawn(
                                async move {
                                    let response = dispatcher.respond(&request).await;
                                    agent
                                        .send_function_response(&response)
                                        .await
                                        .map_err(SessionError::AgentTransport)
                                }
                                .in_current_span(),
                            );
                            report.function_calls += 1;
                        }
                    }
                    Ok(ControlEvent::Other { event_type }) => {
                        report.ignored_events += 1;
                        match event_type.as_deref() {
                            Some(tag @ ("Error" | "error" | "Warning")) => {
                                warn!(event_type = tag, event = %text, "Agent reported a problem")
                            }
                            tag => debug!(event_type = ?tag, "Unhandled agent event"),
                        }
                    }
                    Err(e) => {
                        report.ignored_events += 1;
                        warn!(error = %e, "Ignoring undecodable agent event");
                    }
                },
            }
        };

        report.exit = exit;
        report.stream_sid = Some(stream_sid);
        Ok(report)
    }
}

async fn next_frame(
    source: &mut BoxedSource,
    receive_timeout: Option<Duration>,
) -> Result<Option<Result<Frame, TransportError>>, SessionError> {
    match receive_timeout {
        Some(limit) => tokio::time::timeout(limit, source.next_frame())
            .await
            .map_err(|_| SessionError::ReceiveTimeout(limit)),
        None => Ok(source.next_frame().await),
    }
}

async fn relay_audio(
    telephony: &TelephonySender,
    stream_sid: &str,
    audio: Bytes,
) -> Result<(), SessionError> {
    telephony
        .send_media(stream_sid, &audio)
        .await
        .map_err(SessionError::TelephonyTransport)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::functions::{FunctionRegistry, ParameterSchema, handler_fn};
    use crate::core::session::handoff;
    use crate::core::transport::memory;
    use serde_json::json;

    fn parse(frame: &Frame) -> Value {
        match frame {
            Frame::Text(text) => serde_json::from_str(text).unwrap(),
            other => panic!("Expected text frame, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_audio_sender_preserves_order() {
        let (sink, _source, mut peer) = memory::pair();
        let agent = AgentSender::new(Box::new(sink));
        let (tx, rx) = mpsc::unbounded_channel();

        for byte in 0u8..3 {
            tx.send(AudioChunk::from(vec![byte; 2])).unwrap();
        }
        drop(tx);

        let err = run_audio_sender(rx, agent, CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err, SessionError::AudioQueueClosed);

        assert_eq!(
            peer.drain(),
            vec![
                Frame::binary(vec![0u8, 0]),
                Frame::binary(vec![1u8, 1]),
                Frame::binary(vec![2u8, 2]),
            ]
        );
    }

    #[tokio::test]
    async fn test_audio_sender_stops_on_cancel() {
        let (sink, _source, _peer) = memory::pair();
        let agent = AgentSender::new(Box::new(sink));
        let (_tx, rx) = mpsc::unbounded_channel::<AudioChunk>();

        let cancel = CancellationToken::new();
        cancel.cancel();
        let report = run_audio_sender(rx, agent, cancel).await.unwrap();
        assert_eq!(report.chunks_sent, 0);
    }

    #[tokio::test]
    async fn test_audio_sender_cancels_stalled_send() {
        let agent = AgentSender::new(Box::new(memory::StalledSink));
        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(AudioChunk::from(vec![1u8; 2])).unwrap();

        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_audio_sender(rx, agent, cancel.clone()));
        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();

        let report = tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("sender ignored cancellation")
            .unwrap()
            .unwrap();
        assert_eq!(report.chunks_sent, 0);
    }

    #[tokio::test]
    async fn test_audio_sender_send_failure_is_fatal() {
        let (sink, _source, _peer) = memory::pair();
        let agent = AgentSender::new(Box::new(sink));
        agent.close().await.unwrap();

        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(AudioChunk::from(vec![1u8; 2])).unwrap();

        let err = run_audio_sender(rx, agent, CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err, SessionError::AgentTransport(TransportError::Closed));
    }

    #[tokio::test]
    async fn test_receiver_waits_for_stream_then_relays() {
        let (tel_sink, _tel_source, mut tel_peer) = memory::pair();
        let (agent_sink, agent_source, mut agent_peer) = memory::pair();
        let (writer, reader) = handoff();

        let receiver = AgentReceiver::new(
            Box::new(agent_source),
            TelephonySender::new(Box::new(tel_sink)),
            AgentSender::new(Box::new(agent_sink)),
            Arc::new(FunctionDispatcher::empty()),
            reader,
        );
        let task = tokio::spawn(receiver.run(CancellationToken::new()));

        agent_peer.send_binary(vec![7u8; 4]);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(tel_peer.drain().is_empty());

        writer.assign("S1").unwrap();
        agent_peer.send_text(r#"{"type":"UserStartedSpeaking"}"#);
        agent_peer.hang_up();

        let report = task.await.unwrap().unwrap();
        assert_eq!(report.exit, ReceiverExit::AgentClosed);
        assert_eq!(report.stream_sid.as_deref(), Some("S1"));
        assert_eq!(report.media_frames, 1);
        assert_eq!(report.clears, 1);

        let frames: Vec<Value> = tel_peer.drain().iter().map(parse).collect();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0]["event"], "media");
        assert_eq!(frames[0]["streamSid"], "S1");
        assert_eq!(frames[1], json!({"event": "clear", "streamSid": "S1"}));
    }

    #[tokio::test]
    async fn test_receiver_answers_function_calls() {
        let (tel_sink, _tel_source, _tel_peer) = memory::pair();
        let (agent_sink, agent_source, mut agent_peer) = memory::pair();
        let (writer, reader) = handoff();
        writer.assign("S1").unwrap();

        let dispatcher = FunctionRegistry::new()
            .register(
                "ping",
                ParameterSchema::new(),
                handler_fn(|_| async { Ok(json!("pong")) }),
            )
            .build();

        let receiver = AgentReceiver::new(
            Box::new(agent_source),
            TelephonySender::new(Box::new(tel_sink)),
            AgentSender::new(Box::new(agent_sink)),
            Arc::new(dispatcher),
            reader,
        );
        let task = tokio::spawn(receiver.run(CancellationToken::new()));

        agent_peer.send_text(
            json!({"type": "FunctionCallRequest", "functions": [
                {"id": "1", "name": "ping", "arguments": "{}"},
                {"id": "2", "name": "missing", "arguments": {}}
            ]})
            .to_string(),
        );

        let mut responses = Vec::new();
        for _ in 0..2 {
            responses.push(parse(&agent_peer.recv().await.unwrap()));
        }
        responses.sort_by(|a, b| a["id"].as_str().cmp(&b["id"].as_str()));

        assert_eq!(responses[0]["type"], "function_call_response");
        assert_eq!(responses[0]["content"], "\"pong\"");
        assert_eq!(responses[1]["name"], "missing");
        assert_eq!(
            responses[1]["content"],
            "{\"error\":\"Unknown function: missing\"}"
        );

        agent_peer.hang_up();
        let report = task.await.unwrap().unwrap();
        assert_eq!(report.function_calls, 2);
    }

    #[tokio::test]
    async fn test_receiver_ignores_unknown_events() {
        let (tel_sink, _tel_source, mut tel_peer) = memory::pair();
        let (agent_sink, agent_source, mut agent_peer) = memory::pair();
        let (writer, reader) = handoff();
        writer.assign("S1").unwrap();

        let receiver = AgentReceiver::new(
            Box::new(agent_source),
            TelephonySender::new(Box::new(tel_sink)),
            AgentSender::new(Box::new(agent_sink)),
            Arc::new(FunctionDispatcher::empty()),
            reader,
        );

        agent_peer.send_text(r#"{"type":"Welcome","request_id":"x"}"#);
        agent_peer.send_text("{{{");
        agent_peer.hang_up();

        let report = receiver.run(CancellationToken::new()).await.unwrap();
        assert_eq!(report.ignored_events, 2);
        assert!(tel_peer.drain().is_empty());
    }

    #[tokio::test]
    async fn test_receiver_without_stream() {
        let (tel_sink, _tel_source, _tel_peer) = memory::pair();
        let (agent_sink, agent_source, _agent_peer) = memory::pair();
        let (writer, reader) = handoff();
        drop(writer);

        let receiver = AgentReceiver::new(
            Box::new(agent_source),
            TelephonySender::new(Box::new(tel_sink)),
            AgentSender::new(Box::new(agent_sink)),
            Arc::new(FunctionDispatcher::empty()),
            reader,
        );

        let report = receiver.run(CancellationToken::new()).await.unwrap();
        assert_eq!(report.exit, ReceiverExit::NoStream);
    }

    #[tokio::test]
    async fn test_receiver_cancels_stalled_relay() {
        let (agent_sink, agent_source, agent_peer) = memory::pair();
        let (writer, reader) = handoff();
        writer.assign("S1").unwrap();

        let receiver = AgentReceiver::new(
            Box::new(agent_source),
            TelephonySender::new(Box::new(memory::StalledSink)),
            AgentSender::new(Box::new(agent_sink)),
            Arc::new(FunctionDispatcher::empty()),
            reader,
        );
        let cancel = CancellationToken::new();
        let task = tokio::spawn(receiver.run(cancel.clone()));

        agent_peer.send_binary(vec![7u8; 160]);
        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();

        let report = tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("receiver ignored cancellation")
            .unwrap()
            .unwrap();
        assert_eq!(report.exit, ReceiverExit::Cancelled);
        assert_eq!(report.media_frames, 0);
    }

    #[tokio::test]
    async fn test_receiver_timeout() {
        let (tel_sink, _tel_source, _tel_peer) = memory::pair();
        let (agent_sink, agent_source, _agent_peer) = memory::pair();
        let (writer, reader) = handoff();
        writer.assign("S1").unwrap();

        let receiver = AgentReceiver::new(
            Box::new(agent_source),
            TelephonySender::new(Box::new(tel_sink)),
            AgentSender::new(Box::new(agent_sink)),
            Arc::new(FunctionDispatcher::empty()),
            reader,
        )
        .with_receive_timeout(Some(Duration::from_millis(30)));

        let err = receiver.run(CancellationToken::new()).await.unwrap_err();
        assert_eq!(err, SessionError::ReceiveTimeout(Duration::from_millis(30)));
    }
}
