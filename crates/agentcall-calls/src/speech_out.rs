//! Text to the caller's ear: synthesis streamed onto the call's audio sink.

use crate::error::CallError;
use crate::session::CallSession;
use agentcall_types::Speaker;
use agentcall_voice::{SpeechSynthesizer, SynthesisConfig};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Speaks text on a call.
#[derive(Clone)]
pub struct SpeechOut {
    synthesizer: Arc<dyn SpeechSynthesizer>,
    config: SynthesisConfig,
}

impl SpeechOut {
    pub fn new(synthesizer: Arc<dyn SpeechSynthesizer>, config: SynthesisConfig) -> Self {
        Self {
            synthesizer,
            config,
        }
    }

    /// Records `text` as an assistant turn, then streams its synthesis to
    /// the call.
    ///
    /// The turn is logged before anything is sent, so it is present even
    /// when synthesis or delivery fails. Frames reach the sink in synthesis
    /// order; there are no retries.
    pub async fn speak(
        &self,
        session: &CallSession,
        text: &str,
        cancel: &CancellationToken,
    ) -> Result<(), CallError> {
        session.append_turn(Speaker::Assistant, text);

        let sink = session
            .leg()
            .audio_sink()
            .ok_or(CallError::TransportUnavailable)?;

        let mut stream = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(CallError::DeliveryInterrupted("cancelled before synthesis".into()));
            }
            started = self.synthesizer.synthesize_stream(text, &self.config) => {
                started.map_err(CallError::SynthesisFailed)?
            }
        };

        let mut frames = 0usize;
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Err(CallError::DeliveryInterrupted("cancelled".into()));
                }
                next = stream.recv() => next,
            };
            let Some(chunk) = next else { break };
            let chunk = chunk.map_err(CallError::SynthesisFailed)?;

            if !chunk.audio.is_empty() {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        return Err(CallError::DeliveryInterrupted("cancelled".into()));
                    }
                    written = sink.write(&chunk.audio) => {
                        written.map_err(|e| CallError::DeliveryInterrupted(e.to_string()))?;
                    }
                }
                frames += 1;
            }

            if chunk.is_final {
                break;
            }
        }

        tracing::debug!(call_id = %session.id(), frames, "speech delivered");
        Ok(())
    }
}
