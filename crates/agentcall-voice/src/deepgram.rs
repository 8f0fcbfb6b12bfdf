//! Deepgram live transcription over WebSocket.
//!
//! Deepgram reports an utterance as a series of `Results` messages. Interim
//! results revise the segment currently being spoken; `is_final` results
//! lock a segment in; `speech_final` (or a later `UtteranceEnd`) marks the
//! end of the utterance. [`SegmentAccumulator`] folds those into the
//! partial/final [`TranscriptEvent`]s the call pipeline consumes.

use crate::config::{DeepgramConfig, TranscriptionConfig};
use crate::error::VoiceError;
use crate::stt::{RecognitionSession, SpeechRecognizer, TranscriptEvent};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use reqwest::Url;
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;

const AUDIO_CHANNEL_CAPACITY: usize = 256;
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Deepgram closes idle sockets after about ten seconds without audio.
const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(8);

/// Smallest `utterance_end_ms` Deepgram accepts.
const MIN_UTTERANCE_END_MS: u32 = 1000;

/// Server messages. Only the fields the accumulator needs are decoded.
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ServerMessage {
    Results {
        #[serde(default)]
        is_final: bool,
        #[serde(default)]
        speech_final: bool,
        channel: ResultsChannel,
    },
    UtteranceEnd {},
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct ResultsChannel {
    #[serde(default)]
    alternatives: Vec<Alternative>,
}

#[derive(Debug, Deserialize)]
struct Alternative {
    #[serde(default)]
    transcript: String,
}

/// Folds Deepgram segment results into utterance-level transcript events.
#[derive(Debug, Default)]
pub struct SegmentAccumulator {
    finalized: Vec<String>,
}

impl SegmentAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handles one `Results` message.
    pub fn on_results(
        &mut self,
        transcript: &str,
        is_final: bool,
        speech_final: bool,
    ) -> Option<TranscriptEvent> {
        let transcript = transcript.trim();

        if is_final {
            if !transcript.is_empty() {
                self.finalized.push(transcript.to_string());
            }
            if speech_final {
                return self.flush();
            }
            if self.finalized.is_empty() {
                return None;
            }
            return Some(TranscriptEvent::partial(self.finalized.join(" ")));
        }

        if transcript.is_empty() {
            return None;
        }
        let mut text = self.finalized.join(" ");
        if !text.is_empty() {
            text.push(' ');
        }
        text.push_str(transcript);
        Some(TranscriptEvent::partial(text))
    }

    /// Handles an `UtteranceEnd` message.
    pub fn on_utterance_end(&mut self) -> Option<TranscriptEvent> {
        self.flush()
    }

    fn flush(&mut self) -> Option<TranscriptEvent> {
        if self.finalized.is_empty() {
            return None;
        }
        let text = self.finalized.join(" ");
        self.finalized.clear();
        Some(TranscriptEvent::final_(text))
    }
}

/// Builds the `/v1/listen` URL for a session, with every parameter
/// percent-encoded.
pub fn listen_url(api_base: &str, config: &TranscriptionConfig) -> Result<Url, VoiceError> {
    let mut url = Url::parse(&format!("{}/v1/listen", api_base.trim_end_matches('/')))
        .map_err(|e| VoiceError::Config(format!("invalid Deepgram API base {api_base:?}: {e}")))?;
    url.query_pairs_mut()
        .append_pair("model", &config.model)
        .append_pair("language", &config.language)
        .append_pair("encoding", config.encoding.deepgram_name())
        .append_pair("sample_rate", &config.sample_rate.to_string())
        .append_pair("channels", &config.channels.to_string())
        .append_pair("punctuate", &config.punctuation.to_string())
        .append_pair("interim_results", "true")
        .append_pair("endpointing", &config.endpointing_ms.to_string())
        .append_pair(
            "utterance_end_ms",
            &config.endpointing_ms.max(MIN_UTTERANCE_END_MS).to_string(),
        );
    Ok(url)
}

/// Streams audio to Deepgram's live transcription endpoint.
#[derive(Debug, Clone)]
pub struct DeepgramRecognizer {
    config: DeepgramConfig,
}

impl DeepgramRecognizer {
    pub fn new(config: DeepgramConfig) -> Self {
        Self { config }
    }
}

fn ws_error(e: tokio_tungstenite::tungstenite::Error) -> VoiceError {
    VoiceError::WebSocket(e.to_string())
}

#[async_trait]
impl SpeechRecognizer for DeepgramRecognizer {
    async fn transcribe_stream(
        &self,
        config: &TranscriptionConfig,
    ) -> Result<RecognitionSession, VoiceError> {
        let mut request = listen_url(&self.config.api_base, config)?
            .as_str()
            .into_client_request()
            .map_err(ws_error)?;
        let auth = HeaderValue::from_str(&format!("Token {}", self.config.api_key))
            .map_err(|e| VoiceError::Config(format!("invalid Deepgram API key: {e}")))?;
        request.headers_mut().insert("Authorization", auth);

        let (socket, _response) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| VoiceError::Stt(format!("failed to connect to Deepgram: {e}")))?;
        tracing::debug!(model = %config.model, language = %config.language, "Deepgram session opened");

        let (mut ws_tx, mut ws_rx) = socket.split();
        let (audio_tx, mut audio_rx) = mpsc::channel::<Vec<u8>>(AUDIO_CHANNEL_CAPACITY);
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

        tokio::spawn(async move {
            let mut keepalive = tokio::time::interval(KEEPALIVE_INTERVAL);
            keepalive.tick().await;
            loop {
                tokio::select! {
                    frame = audio_rx.recv() => {
                        let Some(frame) = frame else {
                            let close = r#"{"type":"CloseStream"}"#;
                            if let Err(e) = ws_tx.send(Message::Text(close.into())).await {
                                tracing::debug!(error = %e, "failed to send CloseStream");
                            }
                            break;
                        };
                        if let Err(e) = ws_tx.send(Message::Binary(frame.into())).await {
                            tracing::warn!(error = %e, "Deepgram audio send failed");
                            break;
                        }
                    }
                    _ = keepalive.tick() => {
                        let ping = r#"{"type":"KeepAlive"}"#;
                        if ws_tx.send(Message::Text(ping.into())).await.is_err() {
                            break;
                        }
                    }
                }
            }
        });

        tokio::spawn(async move {
            let mut accumulator = SegmentAccumulator::new();
            while let Some(message) = ws_rx.next().await {
                let text = match message {
                    Ok(Message::Text(text)) => text,
                    Ok(Message::Close(_)) => break,
                    Ok(_) => continue,
                    Err(e) => {
                        let _ = event_tx.send(Err(ws_error(e))).await;
                        break;
                    }
                };

                let event = match serde_json::from_str::<ServerMessage>(text.as_str()) {
                    Ok(ServerMessage::Results {
                        is_final,
                        speech_final,
                        channel,
                    }) => {
                        let transcript = channel
                            .alternatives
                            .first()
                            .map(|alt| alt.transcript.as_str())
                            .unwrap_or_default();
                        accumulator.on_results(transcript, is_final, speech_final)
                    }
                    Ok(ServerMessage::UtteranceEnd {}) => accumulator.on_utterance_end(),
                    Ok(ServerMessage::Other) => None,
                    Err(e) => {
                        tracing::debug!(error = %e, "ignoring undecodable Deepgram message");
                        None
                    }
                };

                if let Some(event) = event {
                    if event_tx.send(Ok(event)).await.is_err() {
                        break;
                    }
                }
            }
            tracing::debug!("Deepgram session closed");
        });

        Ok(RecognitionSession {
            audio: audio_tx,
            events: event_rx,
        })
    }
}
