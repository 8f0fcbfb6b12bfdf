use agentcall_types::CallStatus;
use agentcall_voice::VoiceError;
use std::fmt;
use thiserror::Error;

/// Why an outbound call never reached the answered state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotAnsweredReason {
    /// The leg reached a terminal status before answering.
    Status(CallStatus),
    /// The answer wait ran out.
    TimedOut,
    /// The caller gave up while the phone was ringing.
    Cancelled,
}

impl fmt::Display for NotAnsweredReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Status(status) => write!(f, "call ended with status {status}"),
            Self::TimedOut => f.write_str("timed out waiting for an answer"),
            Self::Cancelled => f.write_str("cancelled while ringing"),
        }
    }
}

#[derive(Error, Debug)]
pub enum CallError {
    #[error("failed to place call: {0}")]
    DialFailed(#[source] VoiceError),

    #[error("call not answered: {reason}")]
    CallNotAnswered { reason: NotAnsweredReason },

    #[error("call not found: {0}")]
    CallNotFound(String),

    #[error("no audio transport available")]
    TransportUnavailable,

    #[error("speech synthesis failed: {0}")]
    SynthesisFailed(#[source] VoiceError),

    #[error("audio delivery interrupted: {0}")]
    DeliveryInterrupted(String),

    #[error("speech recognition unavailable: {0}")]
    RecognitionUnavailable(#[source] VoiceError),

    #[error("speech recognition failed after {partial:?}: {source}")]
    RecognitionStreamError {
        /// Best transcript heard before the failure.
        partial: String,
        #[source]
        source: VoiceError,
    },

    /// The session is evicted even though the provider refused the hangup.
    #[error("failed to hang up call {call_id}: {source}")]
    HangupFailed {
        call_id: String,
        #[source]
        source: VoiceError,
    },
}

impl CallError {
    /// `true` when the failure came from a provider or the audio path rather
    /// than from the request itself.
    pub fn is_upstream(&self) -> bool {
        matches!(
            self,
            Self::DialFailed(_)
                | Self::TransportUnavailable
                | Self::SynthesisFailed(_)
                | Self::DeliveryInterrupted(_)
                | Self::RecognitionUnavailable(_)
                | Self::RecognitionStreamError { .. }
                | Self::HangupFailed { .. }
        )
    }
}
