//! Shared types for the agentcall workspace.
//!
//! This crate holds the small vocabulary every other crate speaks: who said
//! a line of a conversation, what state a call leg is in, and the request and
//! response bodies of the four conversation tools. It has no runtime
//! dependencies beyond `serde` and `chrono` so the voice providers, the
//! orchestration engine, and the HTTP server can all share it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod tools;

/// The author of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    /// Text the agent asked to be spoken.
    Assistant,
    /// Text transcribed from the person on the phone.
    User,
}

impl Speaker {
    /// Returns the wire label for this speaker.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Assistant => "assistant",
            Self::User => "user",
        }
    }
}

/// Status of a call leg as reported by the signaling backend.
///
/// `Dialing` and `Ringing` are the pre-answer phase. `Ended`, `Failed`,
/// `Busy` and `NoAnswer` are terminal; there is no transition out of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallStatus {
    /// The call has been placed but the far end is not ringing yet.
    Dialing,
    /// The far end is ringing, or the call is up but audio is not connected.
    Ringing,
    /// The call is answered and its audio transport is usable.
    Answered,
    /// The call has completed or was cancelled.
    Ended,
    /// The call could not be placed.
    Failed,
    /// The far end was busy.
    Busy,
    /// Nobody picked up.
    NoAnswer,
}

impl CallStatus {
    /// Returns `true` for statuses that can never lead to `Answered`.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Ended | Self::Failed | Self::Busy | Self::NoAnswer)
    }

    /// Returns the snake_case label for this status.
    pub fn label(self) -> &'static str {
        match self {
            Self::Dialing => "dialing",
            Self::Ringing => "ringing",
            Self::Answered => "answered",
            Self::Ended => "ended",
            Self::Failed => "failed",
            Self::Busy => "busy",
            Self::NoAnswer => "no_answer",
        }
    }
}

impl std::fmt::Display for CallStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// One spoken line of a call. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub speaker: Speaker,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl ConversationTurn {
    /// Creates a turn stamped with the current time.
    pub fn now(speaker: Speaker, text: impl Into<String>) -> Self {
        Self {
            speaker,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_statuses() {
        for status in [
            CallStatus::Ended,
            CallStatus::Failed,
            CallStatus::Busy,
            CallStatus::NoAnswer,
        ] {
            assert!(status.is_terminal(), "{status} should be terminal");
        }
        for status in [CallStatus::Dialing, CallStatus::Ringing, CallStatus::Answered] {
            assert!(!status.is_terminal(), "{status} should not be terminal");
        }
    }

    #[test]
    fn speaker_serializes_snake_case() {
        let json = serde_json::to_string(&Speaker::Assistant).expect("should serialize");
        assert_eq!(json, "\"assistant\"");
        assert_eq!(Speaker::User.as_str(), "user");
    }

    #[test]
    fn status_labels_match_serde() {
        let json = serde_json::to_string(&CallStatus::NoAnswer).expect("should serialize");
        assert_eq!(json, format!("\"{}\"", CallStatus::NoAnswer.label()));
    }
}
