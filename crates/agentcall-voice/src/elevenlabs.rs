//! ElevenLabs streaming synthesis over HTTP.

use crate::config::{ElevenLabsConfig, SynthesisConfig};
use crate::error::VoiceError;
use crate::tts::{AudioChunk, AudioChunkStream, SpeechSynthesizer};
use async_trait::async_trait;
use futures_util::StreamExt;
use serde::Serialize;
use std::time::Duration;
use tokio::sync::mpsc;

/// Chunks buffered between the HTTP body and the consumer.
const CHUNK_CHANNEL_CAPACITY: usize = 64;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Longest silence tolerated between body chunks. A whole response may take
/// longer than this, so there is no total timeout.
const READ_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Serialize)]
struct SynthesisRequest<'a> {
    text: &'a str,
    model_id: &'a str,
}

/// `output_format` value, e.g. `ulaw_8000`.
pub fn output_format(config: &SynthesisConfig) -> String {
    format!(
        "{}_{}",
        config.output_encoding.elevenlabs_name(),
        config.sample_rate
    )
}

/// Streams speech from the ElevenLabs text-to-speech API.
#[derive(Debug, Clone)]
pub struct ElevenLabsSynthesizer {
    http: reqwest::Client,
    config: ElevenLabsConfig,
}

impl ElevenLabsSynthesizer {
    pub fn new(config: ElevenLabsConfig) -> Self {
        Self {
            http: reqwest::Client::builder()
                .connect_timeout(CONNECT_TIMEOUT)
                .read_timeout(READ_TIMEOUT)
                .build()
                .unwrap_or_default(),
            config,
        }
    }

    fn stream_url(&self, config: &SynthesisConfig) -> String {
        format!(
            "{}/v1/text-to-speech/{}/stream?output_format={}",
            self.config.api_base.trim_end_matches('/'),
            config.voice,
            output_format(config)
        )
    }
}

#[async_trait]
impl SpeechSynthesizer for ElevenLabsSynthesizer {
    async fn synthesize_stream(
        &self,
        text: &str,
        config: &SynthesisConfig,
    ) -> Result<AudioChunkStream, VoiceError> {
        if text.trim().is_empty() {
            return Err(VoiceError::Tts("cannot synthesize empty text".to_string()));
        }

        let response = self
            .http
            .post(self.stream_url(config))
            .header("xi-api-key", &self.config.api_key)
            .header("accept", "audio/basic")
            .json(&SynthesisRequest {
                text,
                model_id: &config.model,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(VoiceError::Tts(format!(
                "ElevenLabs returned {status}: {body}"
            )));
        }

        let (tx, rx) = mpsc::channel(CHUNK_CHANNEL_CAPACITY);
        let mut body = response.bytes_stream();
        let voice = config.voice.clone();

        tokio::spawn(async move {
            let mut bytes_total = 0usize;
            while let Some(next) = body.next().await {
                let item = match next {
                    Ok(bytes) => {
                        bytes_total += bytes.len();
                        Ok(AudioChunk::audio(bytes.to_vec()))
                    }
                    Err(e) => Err(VoiceError::Http(e)),
                };
                let failed = item.is_err();
                if tx.send(item).await.is_err() || failed {
                    // Consumer went away, or the stream is already poisoned.
                    return;
                }
            }
            tracing::debug!(voice = %voice, bytes_total, "synthesis stream complete");
            let _ = tx.send(Ok(AudioChunk::end())).await;
        });

        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn telephony_output_format() {
        let config = SynthesisConfig::telephony("voice", "model");
        assert_eq!(output_format(&config), "ulaw_8000");
    }

    #[test]
    fn stream_url_includes_voice_and_format() {
        let mut elevenlabs = ElevenLabsConfig::new("key");
        elevenlabs.api_base = "http://localhost:9000/".to_string();
        let synth = ElevenLabsSynthesizer::new(elevenlabs);
        let config = SynthesisConfig::telephony("21m00Tcm4TlvDq8ikWAM", "eleven_turbo_v2_5");
        assert_eq!(
            synth.stream_url(&config),
            "http://localhost:9000/v1/text-to-speech/21m00Tcm4TlvDq8ikWAM/stream?output_format=ulaw_8000"
        );
    }

    #[tokio::test]
    async fn rejects_blank_text_without_a_request() {
        let synth = ElevenLabsSynthesizer::new(ElevenLabsConfig::new("key"));
        let config = SynthesisConfig::telephony("voice", "model");
        let err = synth.synthesize_stream("   ", &config).await.unwrap_err();
        assert!(matches!(err, VoiceError::Tts(_)));
    }
}
