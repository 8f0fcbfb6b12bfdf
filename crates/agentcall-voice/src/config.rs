use serde::{Deserialize, Serialize};
use std::fmt;

/// Telephony sample rate. Phone audio is narrowband.
pub const TELEPHONY_SAMPLE_RATE: u32 = 8000;

/// Audio encodings the providers are asked to produce or consume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioEncoding {
    /// G.711 mu-law, one byte per sample.
    #[default]
    Mulaw,
    /// Signed 16-bit little-endian PCM.
    Linear16,
}

impl AudioEncoding {
    /// Name used in ElevenLabs `output_format` values (`ulaw_8000`).
    pub fn elevenlabs_name(self) -> &'static str {
        match self {
            Self::Mulaw => "ulaw",
            Self::Linear16 => "pcm",
        }
    }

    /// Name used in the Deepgram `encoding` query parameter.
    pub fn deepgram_name(self) -> &'static str {
        match self {
            Self::Mulaw => "mulaw",
            Self::Linear16 => "linear16",
        }
    }
}

/// Parameters of one streaming synthesis request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesisConfig {
    pub voice: String,
    pub model: String,
    pub output_encoding: AudioEncoding,
    pub sample_rate: u32,
}

impl SynthesisConfig {
    /// Mu-law at 8 kHz, matched to the phone channel.
    pub fn telephony(voice: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            voice: voice.into(),
            model: model.into(),
            output_encoding: AudioEncoding::Mulaw,
            sample_rate: TELEPHONY_SAMPLE_RATE,
        }
    }
}

/// Parameters of one streaming recognition session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptionConfig {
    pub language: String,
    pub model: String,
    pub encoding: AudioEncoding,
    pub sample_rate: u32,
    pub channels: u16,
    pub punctuation: bool,
    /// Silence, in milliseconds, that ends an utterance.
    pub endpointing_ms: u32,
}

impl TranscriptionConfig {
    /// Mono mu-law at 8 kHz with punctuation enabled.
    pub fn telephony(
        language: impl Into<String>,
        model: impl Into<String>,
        endpointing_ms: u32,
    ) -> Self {
        Self {
            language: language.into(),
            model: model.into(),
            encoding: AudioEncoding::Mulaw,
            sample_rate: TELEPHONY_SAMPLE_RATE,
            channels: 1,
            punctuation: true,
            endpointing_ms,
        }
    }
}

fn default_twilio_api_base() -> String {
    "https://api.twilio.com".to_string()
}

fn default_elevenlabs_api_base() -> String {
    "https://api.elevenlabs.io".to_string()
}

fn default_deepgram_api_base() -> String {
    "wss://api.deepgram.com".to_string()
}

/// Credentials and addressing for the Twilio signaling provider.
#[derive(Clone, Serialize, Deserialize)]
pub struct TwilioConfig {
    pub account_sid: String,
    #[serde(skip_serializing)]
    pub auth_token: String,
    /// Caller id, E.164 (e.g. `+15551234567`).
    pub from_number: String,
    /// Publicly reachable base URL of this server; Twilio calls back into it.
    pub public_url: String,
    #[serde(default = "default_twilio_api_base")]
    pub api_base: String,
}

impl fmt::Debug for TwilioConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TwilioConfig")
            .field("account_sid", &self.account_sid)
            .field("auth_token", &"[REDACTED]")
            .field("from_number", &self.from_number)
            .field("public_url", &self.public_url)
            .field("api_base", &self.api_base)
            .finish()
    }
}

impl TwilioConfig {
    pub fn new(
        account_sid: impl Into<String>,
        auth_token: impl Into<String>,
        from_number: impl Into<String>,
        public_url: impl Into<String>,
    ) -> Self {
        Self {
            account_sid: account_sid.into(),
            auth_token: auth_token.into(),
            from_number: from_number.into(),
            public_url: public_url.into(),
            api_base: default_twilio_api_base(),
        }
    }
}

/// Credentials for the ElevenLabs synthesis provider.
#[derive(Clone, Serialize, Deserialize)]
pub struct ElevenLabsConfig {
    #[serde(skip_serializing)]
    pub api_key: String,
    #[serde(default = "default_elevenlabs_api_base")]
    pub api_base: String,
}

impl fmt::Debug for ElevenLabsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ElevenLabsConfig")
            .field("api_key", &"[REDACTED]")
            .field("api_base", &self.api_base)
            .finish()
    }
}

impl ElevenLabsConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_base: default_elevenlabs_api_base(),
        }
    }
}

/// Credentials for the Deepgram recognition provider.
#[derive(Clone, Serialize, Deserialize)]
pub struct DeepgramConfig {
    #[serde(skip_serializing)]
    pub api_key: String,
    #[serde(default = "default_deepgram_api_base")]
    pub api_base: String,
}

impl fmt::Debug for DeepgramConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeepgramConfig")
            .field("api_key", &"[REDACTED]")
            .field("api_base", &self.api_base)
            .finish()
    }
}

impl DeepgramConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_base: default_deepgram_api_base(),
        }
    }
}
