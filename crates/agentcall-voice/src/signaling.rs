//! Capability traits for placing calls and moving their audio.

use crate::error::VoiceError;
use agentcall_types::CallStatus;
use async_trait::async_trait;
use std::sync::Arc;

/// Outbound half of a call's duplex audio transport.
///
/// Not safe for interleaved writers: callers serialize speech per call.
#[async_trait]
pub trait AudioSink: Send + Sync {
    /// Writes one encoded audio frame toward the far end.
    async fn write(&self, frame: &[u8]) -> Result<(), VoiceError>;
}

/// Inbound half of a call's duplex audio transport.
#[async_trait]
pub trait AudioSource: Send + Sync {
    /// Reads the next inbound frame. `Ok(None)` signals end of stream.
    async fn read(&self) -> Result<Option<Vec<u8>>, VoiceError>;
}

/// One outbound call leg placed through a [`SignalingBackend`].
#[async_trait]
pub trait CallLeg: Send + Sync {
    /// Provider-side identifier of the leg (e.g. a Twilio call SID).
    fn provider_id(&self) -> &str;

    /// Current status of the leg.
    async fn status(&self) -> Result<CallStatus, VoiceError>;

    /// Terminates the leg.
    async fn hangup(&self) -> Result<(), VoiceError>;

    /// Outbound audio, or `None` while the media pipeline is not established.
    fn audio_sink(&self) -> Option<Arc<dyn AudioSink>>;

    /// Inbound audio, or `None` while the media pipeline is not established.
    fn audio_source(&self) -> Option<Arc<dyn AudioSource>>;
}

/// Places outbound calls.
#[async_trait]
pub trait SignalingBackend: Send + Sync {
    /// Dials `destination` (E.164) and returns the new leg.
    async fn dial(&self, destination: &str) -> Result<Arc<dyn CallLeg>, VoiceError>;
}
