//! Twilio signaling: REST call control plus the Media Streams bridge.
//!
//! Dialing, status and hangup go through the Twilio REST API. Audio travels
//! over a Media Streams WebSocket that Twilio opens back to this server once
//! the callee answers; the server hands each such socket to the
//! [`MediaStreamHub`], which is where call legs find their transport.

use crate::config::TwilioConfig;
use crate::error::VoiceError;
use crate::signaling::{AudioSink, AudioSource, CallLeg, SignalingBackend};
use agentcall_types::CallStatus;
use async_trait::async_trait;
use base64::Engine;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tokio::sync::{mpsc, Mutex as AsyncMutex};

/// Buffered frames per direction. Twilio sends a 20 ms frame every 20 ms.
const MEDIA_CHANNEL_CAPACITY: usize = 256;

/// Upper bound on any single REST request.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Maps a Twilio `CallStatus` value onto [`CallStatus`].
pub fn map_call_status(status: &str) -> CallStatus {
    match status {
        "queued" | "initiated" => CallStatus::Dialing,
        "ringing" => CallStatus::Ringing,
        "in-progress" | "answered" => CallStatus::Answered,
        "completed" | "canceled" => CallStatus::Ended,
        "busy" => CallStatus::Busy,
        "no-answer" => CallStatus::NoAnswer,
        "failed" => CallStatus::Failed,
        other => {
            tracing::debug!(status = other, "unrecognised Twilio call status");
            CallStatus::Dialing
        }
    }
}

/// WebSocket URL Twilio should stream media to, derived from the public URL.
pub fn media_stream_url(public_url: &str) -> String {
    let base = public_url.trim_end_matches('/');
    let ws_base = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        base.to_string()
    };
    format!("{ws_base}/media-stream")
}

/// TwiML that connects an answered call to the media stream endpoint.
pub fn connect_twiml(public_url: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<Response>
    <Connect>
        <Stream url="{}">
            <Parameter name="direction" value="both"/>
        </Stream>
    </Connect>
</Response>"#,
        media_stream_url(public_url)
    )
}

/// Messages Twilio sends over a Media Streams socket.
#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum MediaStreamMessage {
    Connected {},
    Start {
        #[serde(rename = "streamSid")]
        stream_sid: String,
        start: StreamStart,
    },
    Media {
        media: MediaPayload,
    },
    Stop {},
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
pub struct StreamStart {
    #[serde(rename = "callSid")]
    pub call_sid: String,
}

#[derive(Debug, Deserialize)]
pub struct MediaPayload {
    /// Base64 mu-law audio.
    pub payload: String,
    #[serde(default)]
    pub track: Option<String>,
}

/// Encodes an outbound frame as a Media Streams `media` message.
pub fn outbound_media_message(stream_sid: &str, frame: &[u8]) -> String {
    serde_json::json!({
        "event": "media",
        "streamSid": stream_sid,
        "media": {
            "payload": base64::engine::general_purpose::STANDARD.encode(frame),
        },
    })
    .to_string()
}

/// Audio link between one call leg and its Media Streams socket.
#[derive(Debug)]
pub struct MediaStreamLink {
    stream_sid: String,
    outbound: mpsc::Sender<Vec<u8>>,
    inbound: AsyncMutex<mpsc::Receiver<Vec<u8>>>,
}

impl MediaStreamLink {
    pub fn stream_sid(&self) -> &str {
        &self.stream_sid
    }
}

#[async_trait]
impl AudioSink for MediaStreamLink {
    async fn write(&self, frame: &[u8]) -> Result<(), VoiceError> {
        self.outbound
            .send(frame.to_vec())
            .await
            .map_err(|_| VoiceError::TransportClosed)
    }
}

#[async_trait]
impl AudioSource for MediaStreamLink {
    async fn read(&self) -> Result<Option<Vec<u8>>, VoiceError> {
        Ok(self.inbound.lock().await.recv().await)
    }
}

#[derive(Debug, Default)]
struct HubState {
    links: RwLock<HashMap<String, Arc<MediaStreamLink>>>,
    statuses: RwLock<HashMap<String, CallStatus>>,
}

/// Registry of live media streams and last-reported call statuses, keyed by call SID.
///
/// Uses `std::sync::RwLock`: every acquisition is a short map operation that
/// never spans an `.await`.
#[derive(Debug, Clone, Default)]
pub struct MediaStreamHub {
    state: Arc<HubState>,
}

impl MediaStreamHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the media socket for `call_sid`, replacing any earlier one.
    pub fn attach(&self, call_sid: &str, stream_sid: &str) -> MediaStreamSession {
        let (outbound_tx, outbound_rx) = mpsc::channel(MEDIA_CHANNEL_CAPACITY);
        let (inbound_tx, inbound_rx) = mpsc::channel(MEDIA_CHANNEL_CAPACITY);

        let link = Arc::new(MediaStreamLink {
            stream_sid: stream_sid.to_string(),
            outbound: outbound_tx,
            inbound: AsyncMutex::new(inbound_rx),
        });

        let replaced = self
            .state
            .links
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(call_sid.to_string(), link)
            .is_some();

        tracing::info!(call_sid, stream_sid, replaced, "media stream attached");

        MediaStreamSession {
            call_sid: call_sid.to_string(),
            stream_sid: stream_sid.to_string(),
            inbound: inbound_tx,
            outbound: Some(outbound_rx),
            hub: self.clone(),
        }
    }

    /// The live link for `call_sid`, if its socket is connected.
    pub fn link(&self, call_sid: &str) -> Option<Arc<MediaStreamLink>> {
        self.state
            .links
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(call_sid)
            .cloned()
    }

    /// Records a status callback value.
    ///
    /// A terminal status for a call that is not tracked (typically the
    /// trailing `completed` after our own hangup forgot it) is dropped, and
    /// `None` is returned.
    pub fn record_status(&self, call_sid: &str, twilio_status: &str) -> Option<CallStatus> {
        let status = map_call_status(twilio_status);
        let mut statuses = self
            .state
            .statuses
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        match statuses.get_mut(call_sid) {
            Some(current) => *current = status,
            None if status.is_terminal() => return None,
            None => {
                statuses.insert(call_sid.to_string(), status);
            }
        }
        Some(status)
    }

    /// Last status reported through a callback.
    pub fn status(&self, call_sid: &str) -> Option<CallStatus> {
        self.state
            .statuses
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(call_sid)
            .copied()
    }

    /// Drops everything known about `call_sid`.
    pub fn forget(&self, call_sid: &str) {
        self.state
            .links
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(call_sid);
        self.state
            .statuses
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(call_sid);
    }

    fn detach(&self, call_sid: &str, stream_sid: &str) {
        let mut links = self
            .state
            .links
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        // A reconnect may already have replaced this stream.
        if links
            .get(call_sid)
            .is_some_and(|link| link.stream_sid == stream_sid)
        {
            links.remove(call_sid);
            tracing::info!(call_sid, stream_sid, "media stream detached");
        }
    }
}

/// The socket side of a [`MediaStreamLink`]. Dropping it detaches the stream
/// and ends the call's inbound audio.
#[derive(Debug)]
pub struct MediaStreamSession {
    call_sid: String,
    stream_sid: String,
    inbound: mpsc::Sender<Vec<u8>>,
    outbound: Option<mpsc::Receiver<Vec<u8>>>,
    hub: MediaStreamHub,
}

impl MediaStreamSession {
    pub fn call_sid(&self) -> &str {
        &self.call_sid
    }

    pub fn stream_sid(&self) -> &str {
        &self.stream_sid
    }

    /// Decodes a base64 `media` payload and queues it as inbound audio.
    ///
    /// Frames are dropped, with a warning, when nobody is listening fast enough.
    pub fn push_inbound_payload(&self, payload: &str) -> Result<(), VoiceError> {
        let frame = base64::engine::general_purpose::STANDARD
            .decode(payload)
            .map_err(|e| VoiceError::WebSocket(format!("invalid media payload: {e}")))?;

        match self.inbound.try_send(frame) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(call_sid = %self.call_sid, "inbound media buffer full, dropping frame");
                Ok(())
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(VoiceError::TransportClosed),
        }
    }

    /// Hands the outbound side to the socket writer. Only the first call
    /// returns `Some`.
    pub fn take_outbound(&mut self) -> Option<MediaOutbound> {
        let frames = self.outbound.take()?;
        Some(MediaOutbound {
            stream_sid: self.stream_sid.clone(),
            frames,
        })
    }
}

/// Frames waiting to be written to a Media Streams socket.
#[derive(Debug)]
pub struct MediaOutbound {
    stream_sid: String,
    frames: mpsc::Receiver<Vec<u8>>,
}

impl MediaOutbound {
    /// Next frame encoded as a `media` message. `None` once the link is gone.
    pub async fn next_message(&mut self) -> Option<String> {
        let frame = self.frames.recv().await?;
        Some(outbound_media_message(&self.stream_sid, &frame))
    }
}

impl Drop for MediaStreamSession {
    fn drop(&mut self) {
        self.hub.detach(&self.call_sid, &self.stream_sid);
    }
}

#[derive(Debug, Deserialize)]
struct CallResource {
    sid: String,
    status: String,
}

#[derive(Debug)]
struct TwilioClient {
    http: reqwest::Client,
    config: TwilioConfig,
    hub: MediaStreamHub,
}

impl TwilioClient {
    fn calls_url(&self) -> String {
        format!(
            "{}/2010-04-01/Accounts/{}/Calls.json",
            self.config.api_base.trim_end_matches('/'),
            self.config.account_sid
        )
    }

    fn call_url(&self, call_sid: &str) -> String {
        format!(
            "{}/2010-04-01/Accounts/{}/Calls/{}.json",
            self.config.api_base.trim_end_matches('/'),
            self.config.account_sid,
            call_sid
        )
    }

    async fn check(response: reqwest::Response, action: &str) -> Result<reqwest::Response, VoiceError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(VoiceError::Signaling(format!(
            "Twilio {action} failed with {status}: {body}"
        )))
    }

    async fn fetch_status(&self, call_sid: &str) -> Result<CallStatus, VoiceError> {
        let response = self
            .http
            .get(self.call_url(call_sid))
            .basic_auth(&self.config.account_sid, Some(&self.config.auth_token))
            .send()
            .await?;
        let call: CallResource = Self::check(response, "status lookup").await?.json().await?;
        Ok(map_call_status(&call.status))
    }
}

/// Places calls through the Twilio REST API.
#[derive(Debug, Clone)]
pub struct TwilioSignaling {
    client: Arc<TwilioClient>,
}

impl TwilioSignaling {
    pub fn new(config: TwilioConfig, hub: MediaStreamHub) -> Self {
        Self {
            client: Arc::new(TwilioClient {
                http: reqwest::Client::builder()
                    .timeout(REQUEST_TIMEOUT)
                    .build()
                    .unwrap_or_default(),
                config,
                hub,
            }),
        }
    }
}

#[async_trait]
impl SignalingBackend for TwilioSignaling {
    async fn dial(&self, destination: &str) -> Result<Arc<dyn CallLeg>, VoiceError> {
        let public_url = self.client.config.public_url.trim_end_matches('/');
        let mut form: Vec<(&str, String)> = vec![
            ("To", destination.to_string()),
            ("From", self.client.config.from_number.clone()),
            ("Url", format!("{public_url}/voice")),
            ("StatusCallback", format!("{public_url}/status")),
        ];
        for event in ["initiated", "ringing", "answered", "completed"] {
            form.push(("StatusCallbackEvent", event.to_string()));
        }

        let response = self
            .client
            .http
            .post(self.client.calls_url())
            .basic_auth(
                &self.client.config.account_sid,
                Some(&self.client.config.auth_token),
            )
            .form(&form)
            .send()
            .await?;
        let call: CallResource = TwilioClient::check(response, "dial").await?.json().await?;

        tracing::info!(call_sid = %call.sid, status = %call.status, "Twilio call placed");
        self.client.hub.record_status(&call.sid, &call.status);

        let leg: Arc<dyn CallLeg> = Arc::new(TwilioCallLeg {
            call_sid: call.sid,
            client: self.client.clone(),
        });
        Ok(leg)
    }
}

/// A call placed through Twilio.
#[derive(Debug)]
pub struct TwilioCallLeg {
    call_sid: String,
    client: Arc<TwilioClient>,
}

#[async_trait]
impl CallLeg for TwilioCallLeg {
    fn provider_id(&self) -> &str {
        &self.call_sid
    }

    async fn status(&self) -> Result<CallStatus, VoiceError> {
        let reported = match self.client.hub.status(&self.call_sid) {
            Some(status) => status,
            None => self.client.fetch_status(&self.call_sid).await?,
        };

        // Answered without a media socket is not usable yet.
        if reported == CallStatus::Answered && self.client.hub.link(&self.call_sid).is_none() {
            return Ok(CallStatus::Ringing);
        }
        Ok(reported)
    }

    async fn hangup(&self) -> Result<(), VoiceError> {
        let response = self
            .client
            .http
            .post(self.client.call_url(&self.call_sid))
            .basic_auth(
                &self.client.config.account_sid,
                Some(&self.client.config.auth_token),
            )
            .form(&[("Status", "completed")])
            .send()
            .await;

        // The stream is useless after a hangup attempt either way.
        self.client.hub.forget(&self.call_sid);

        TwilioClient::check(response?, "hangup").await?;
        tracing::info!(call_sid = %self.call_sid, "Twilio call hung up");
        Ok(())
    }

    fn audio_sink(&self) -> Option<Arc<dyn AudioSink>> {
        self.client
            .hub
            .link(&self.call_sid)
            .map(|link| link as Arc<dyn AudioSink>)
    }

    fn audio_source(&self) -> Option<Arc<dyn AudioSource>> {
        self.client
            .hub
            .link(&self.call_sid)
            .map(|link| link as Arc<dyn AudioSource>)
    }
}
