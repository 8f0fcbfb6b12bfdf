//! The caller's voice to text: inbound audio through a recognition session,
//! collapsed into one utterance.

use crate::error::CallError;
use crate::session::CallSession;
use agentcall_types::Speaker;
use agentcall_voice::{
    AudioSource, RecognitionSession, SpeechRecognizer, TranscriptionConfig,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// How a listen settled on its text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    /// The recognizer marked the utterance complete.
    Final,
    /// The recognition stream ended; the text is the last partial.
    StreamClosed,
    /// The wait ran out; the text is the last partial.
    TimedOut,
    /// The listen was cancelled; the text is the last partial and was not logged.
    Cancelled,
}

/// What the user said, and how sure we are that they finished saying it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Utterance {
    pub text: String,
    pub resolution: Resolution,
}

/// Listens for the user's reply on a call.
#[derive(Clone)]
pub struct SpeechIn {
    recognizer: Arc<dyn SpeechRecognizer>,
    config: TranscriptionConfig,
    timeout: Duration,
}

impl SpeechIn {
    pub fn new(
        recognizer: Arc<dyn SpeechRecognizer>,
        config: TranscriptionConfig,
        timeout: Duration,
    ) -> Self {
        Self {
            recognizer,
            config,
            timeout,
        }
    }

    /// Streams the call's inbound audio to the recognizer until the user's
    /// utterance resolves.
    ///
    /// A non-empty resolved utterance is appended to the session as a user
    /// turn, except when the listen is cancelled.
    pub async fn listen(
        &self,
        session: &CallSession,
        cancel: &CancellationToken,
    ) -> Result<Utterance, CallError> {
        let source = session
            .leg()
            .audio_source()
            .ok_or(CallError::TransportUnavailable)?;

        let RecognitionSession { audio, mut events } = self
            .recognizer
            .transcribe_stream(&self.config)
            .await
            .map_err(CallError::RecognitionUnavailable)?;

        // Stops the forwarder on every way out of this function.
        let forwarding = cancel.child_token();
        let _forwarding_guard = forwarding.clone().drop_guard();
        tokio::spawn(forward_audio(source, audio, forwarding));

        let deadline = tokio::time::sleep(self.timeout);
        tokio::pin!(deadline);

        let mut candidate = String::new();
        let resolution = loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::debug!(call_id = %session.id(), partial = %candidate, "listen cancelled");
                    return Ok(Utterance {
                        text: candidate,
                        resolution: Resolution::Cancelled,
                    });
                }
                event = events.recv() => match event {
                    None => break Resolution::StreamClosed,
                    Some(Err(source)) => {
                        return Err(CallError::RecognitionStreamError {
                            partial: candidate,
                            source,
                        });
                    }
                    Some(Ok(event)) => {
                        if event.transcript.trim().is_empty() {
                            continue;
                        }
                        candidate = event.transcript;
                        if event.is_final {
                            break Resolution::Final;
                        }
                    }
                },
                _ = &mut deadline => break Resolution::TimedOut,
            }
        };

        if !candidate.is_empty() {
            session.append_turn(Speaker::User, candidate.as_str());
        }
        tracing::info!(
            call_id = %session.id(),
            resolution = ?resolution,
            chars = candidate.len(),
            "user utterance resolved"
        );

        Ok(Utterance {
            text: candidate,
            resolution,
        })
    }
}

/// Copies inbound frames into the recognizer until end of stream, a read
/// error, or cancellation. Exits silently.
async fn forward_audio(
    source: Arc<dyn AudioSource>,
    audio: mpsc::Sender<Vec<u8>>,
    cancel: CancellationToken,
) {
    loop {
        let read = tokio::select! {
            _ = cancel.cancelled() => break,
            read = source.read() => read,
        };
        let frame = match read {
            Ok(Some(frame)) => frame,
            Ok(None) => break,
            Err(e) => {
                tracing::debug!(error = %e, "inbound audio read failed");
                break;
            }
        };
        tokio::select! {
            _ = cancel.cancelled() => break,
            sent = audio.send(frame) => {
                if sent.is_err() {
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentcall_voice::mock::{
        MockCallScript, MockEvent, MockRecognition, MockRecognizer, MockSignaling,
    };
    use agentcall_voice::SignalingBackend;

    async fn session_with(script: MockCallScript) -> (Arc<MockSignaling>, CallSession) {
        let signaling = Arc::new(MockSignaling::new(script));
        let leg = signaling.dial("+15550001111").await.unwrap();
        (signaling, CallSession::new("call-1-0", leg))
    }

    fn speech_in(recognizer: MockRecognizer, timeout: Duration) -> (Arc<MockRecognizer>, SpeechIn) {
        let recognizer = Arc::new(recognizer);
        let config = TranscriptionConfig::telephony("en-US", "nova-2", 800);
        (recognizer.clone(), SpeechIn::new(recognizer, config, timeout))
    }

    #[tokio::test]
    async fn final_transcript_resolves_and_is_logged() {
        let (_, session) = session_with(MockCallScript::default()).await;
        let (_, listener) = speech_in(
            MockRecognizer::new([MockRecognition::events(vec![
                MockEvent::Partial("yes".into()),
                MockEvent::Final("yes go ahead".into()),
                MockEvent::Final("ignored".into()),
            ])]),
            Duration::from_secs(5),
        );

        let utterance = listener
            .listen(&session, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(utterance.text, "yes go ahead");
        assert_eq!(utterance.resolution, Resolution::Final);
        assert_eq!(session.last_user_utterance().as_deref(), Some("yes go ahead"));
    }

    #[tokio::test]
    async fn stream_close_uses_last_partial() {
        let (_, session) = session_with(MockCallScript::default()).await;
        let (_, listener) = speech_in(
            MockRecognizer::new([MockRecognition::events(vec![
                MockEvent::Partial("may".into()),
                MockEvent::Partial("maybe later".into()),
            ])]),
            Duration::from_secs(5),
        );

        let utterance = listener
            .listen(&session, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(utterance.text, "maybe later");
        assert_eq!(utterance.resolution, Resolution::StreamClosed);
        assert_eq!(session.transcript().len(), 1);
    }

    #[tokio::test]
    async fn empty_final_does_not_resolve() {
        let (_, session) = session_with(MockCallScript::default()).await;
        let (_, listener) = speech_in(
            MockRecognizer::new([MockRecognition::events(vec![
                MockEvent::Partial("hold on".into()),
                MockEvent::Final(String::new()),
            ])]),
            Duration::from_secs(5),
        );

        let utterance = listener
            .listen(&session, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(utterance.text, "hold on");
        assert_eq!(utterance.resolution, Resolution::StreamClosed);
    }

    #[tokio::test(start_paused = true)]
    async fn silence_times_out_without_a_turn() {
        let (_, session) = session_with(MockCallScript::default()).await;
        let (_, listener) = speech_in(
            MockRecognizer::new([MockRecognition::silence()]),
            Duration::from_secs(3),
        );

        let started = tokio::time::Instant::now();
        let utterance = listener
            .listen(&session, &CancellationToken::new())
            .await
            .unwrap();

        assert!(started.elapsed() < Duration::from_secs(3) + Duration::from_millis(50));
        assert_eq!(utterance.text, "");
        assert_eq!(utterance.resolution, Resolution::TimedOut);
        assert!(session.transcript().is_empty());
    }

    #[tokio::test]
    async fn inbound_audio_reaches_the_recognizer() {
        let (signaling, session) = session_with(MockCallScript::default()).await;
        let inbound = signaling.last_leg().unwrap().inbound().unwrap();
        inbound.send(vec![7; 160]).await.unwrap();
        inbound.send(vec![8; 160]).await.unwrap();

        let (recognizer, listener) = speech_in(
            MockRecognizer::new([MockRecognition::events(vec![
                MockEvent::Pause(Duration::from_millis(50)),
                MockEvent::Final("ok".into()),
            ])]),
            Duration::from_secs(5),
        );

        listener
            .listen(&session, &CancellationToken::new())
            .await
            .unwrap();

        let received = recognizer.received_audio();
        assert_eq!(received.len(), 320);
        assert!(received[..160].iter().all(|b| *b == 7));
    }

    #[tokio::test]
    async fn error_event_carries_partial() {
        let (_, session) = session_with(MockCallScript::default()).await;
        let (_, listener) = speech_in(
            MockRecognizer::new([MockRecognition::events(vec![
                MockEvent::Partial("I think".into()),
                MockEvent::Error("socket reset".into()),
            ])]),
            Duration::from_secs(5),
        );

        let err = listener
            .listen(&session, &CancellationToken::new())
            .await
            .unwrap_err();

        match err {
            CallError::RecognitionStreamError { partial, .. } => assert_eq!(partial, "I think"),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(session.transcript().is_empty());
    }

    #[tokio::test]
    async fn recognizer_start_failure() {
        let (_, session) = session_with(MockCallScript::default()).await;
        let (_, listener) = speech_in(
            MockRecognizer::new([MockRecognition::failing_to_start("bad key")]),
            Duration::from_secs(5),
        );

        let err = listener
            .listen(&session, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, CallError::RecognitionUnavailable(_)));
    }

    #[tokio::test]
    async fn missing_source_is_transport_unavailable() {
        let (_, session) = session_with(MockCallScript::default().without_transport()).await;
        let (recognizer, listener) = speech_in(MockRecognizer::default(), Duration::from_secs(5));

        let err = listener
            .listen(&session, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, CallError::TransportUnavailable));
        assert_eq!(recognizer.sessions_opened(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_returns_partial_without_logging() {
        let (_, session) = session_with(MockCallScript::default()).await;
        let (_, listener) = speech_in(
            MockRecognizer::new([
                MockRecognition::events(vec![MockEvent::Partial("wait".into())]).held_open()
            ]),
            Duration::from_secs(60),
        );
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });

        let utterance = listener.listen(&session, &cancel).await.unwrap();

        assert_eq!(utterance.text, "wait");
        assert_eq!(utterance.resolution, Resolution::Cancelled);
        assert!(session.transcript().is_empty());
    }
}
