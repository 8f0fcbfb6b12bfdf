use agentcall_voice::{SynthesisConfig, TranscriptionConfig};
use std::time::Duration;

pub const DEFAULT_ANSWER_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);
pub const DEFAULT_TRANSCRIPT_TIMEOUT: Duration = Duration::from_millis(180_000);
/// Time left for the final message to play out before hanging up.
pub const DEFAULT_END_GRACE: Duration = Duration::from_secs(2);

/// Tunables of the call orchestrator.
#[derive(Debug, Clone)]
pub struct CallSettings {
    /// Number dialed by `initiate`, E.164.
    pub user_number: String,
    pub answer_timeout: Duration,
    pub poll_interval: Duration,
    /// Longest a single listen waits for the user to finish speaking.
    pub transcript_timeout: Duration,
    pub end_grace: Duration,
    pub synthesis: SynthesisConfig,
    pub transcription: TranscriptionConfig,
}

impl CallSettings {
    pub fn new(
        user_number: impl Into<String>,
        synthesis: SynthesisConfig,
        transcription: TranscriptionConfig,
    ) -> Self {
        Self {
            user_number: user_number.into(),
            answer_timeout: DEFAULT_ANSWER_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            transcript_timeout: DEFAULT_TRANSCRIPT_TIMEOUT,
            end_grace: DEFAULT_END_GRACE,
            synthesis,
            transcription,
        }
    }
}
