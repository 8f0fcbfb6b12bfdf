//! Capability trait for streaming speech recognition.

use crate::config::TranscriptionConfig;
use crate::error::VoiceError;
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Transcript update emitted by a recognition session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptEvent {
    pub transcript: String,
    /// `true` once the recognizer considers the utterance complete.
    pub is_final: bool,
}

impl TranscriptEvent {
    pub fn partial(transcript: impl Into<String>) -> Self {
        Self {
            transcript: transcript.into(),
            is_final: false,
        }
    }

    pub fn final_(transcript: impl Into<String>) -> Self {
        Self {
            transcript: transcript.into(),
            is_final: true,
        }
    }
}

/// A live recognition session.
///
/// Audio written to `audio` is transcribed; dropping `audio` tells the
/// provider no more audio is coming. `events` closes when the provider
/// ends the session.
#[derive(Debug)]
pub struct RecognitionSession {
    pub audio: mpsc::Sender<Vec<u8>>,
    pub events: mpsc::Receiver<Result<TranscriptEvent, VoiceError>>,
}

/// Transcribes streamed audio.
#[async_trait]
pub trait SpeechRecognizer: Send + Sync {
    /// Opens a recognition session.
    async fn transcribe_stream(
        &self,
        config: &TranscriptionConfig,
    ) -> Result<RecognitionSession, VoiceError>;
}
