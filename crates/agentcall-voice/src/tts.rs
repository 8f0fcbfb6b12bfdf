//! Capability trait for streaming speech synthesis.

use crate::config::SynthesisConfig;
use crate::error::VoiceError;
use async_trait::async_trait;
use tokio::sync::mpsc;

/// One piece of synthesized audio.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioChunk {
    /// Encoded audio, possibly empty.
    pub audio: Vec<u8>,
    /// Set on the last chunk of the stream.
    pub is_final: bool,
}

impl AudioChunk {
    pub fn audio(audio: impl Into<Vec<u8>>) -> Self {
        Self {
            audio: audio.into(),
            is_final: false,
        }
    }

    /// An empty chunk that marks the end of the stream.
    pub fn end() -> Self {
        Self {
            audio: Vec::new(),
            is_final: true,
        }
    }
}

/// Audio chunks in synthesis order. An `Err` item aborts the stream.
pub type AudioChunkStream = mpsc::Receiver<Result<AudioChunk, VoiceError>>;

/// Renders text as a stream of encoded audio.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Starts synthesis of `text`.
    ///
    /// Returns an error when the provider rejects the request up front
    /// (empty text, unknown voice, bad credentials).
    async fn synthesize_stream(
        &self,
        text: &str,
        config: &SynthesisConfig,
    ) -> Result<AudioChunkStream, VoiceError>;
}
