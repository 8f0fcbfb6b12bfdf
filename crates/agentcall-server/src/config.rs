//! Server configuration loading from file and environment variables.

use serde::Deserialize;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Top-level server configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Server network settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Telephony provider and numbers.
    #[serde(default)]
    pub phone: PhoneConfig,

    /// Speech synthesis provider.
    #[serde(default)]
    pub tts: TtsConfig,

    /// Speech recognition provider.
    #[serde(default)]
    pub stt: SttConfig,

    /// Call orchestration timing.
    #[serde(default)]
    pub calls: CallTimingConfig,
}

/// Network configuration for the HTTP server.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to.
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Public base URL the telephony provider reaches this server at
    /// (usually a tunnel such as `https://abc.ngrok.app`).
    #[serde(default)]
    pub public_url: String,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "agentcall_calls=debug,info").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to output logs in JSON format.
    #[serde(default)]
    pub json: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PhoneProvider {
    #[default]
    Twilio,
    Mock,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TtsProvider {
    #[default]
    ElevenLabs,
    Mock,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SttProvider {
    #[default]
    Deepgram,
    Mock,
}

macro_rules! provider_from_str {
    ($ty:ty, $label:literal, $($name:literal => $variant:expr),+ $(,)?) => {
        impl FromStr for $ty {
            type Err = ConfigError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_ascii_lowercase().as_str() {
                    $($name => Ok($variant),)+
                    other => Err(ConfigError::Invalid(format!(
                        "unknown {} provider: {other}",
                        $label
                    ))),
                }
            }
        }
    };
}

provider_from_str!(PhoneProvider, "phone", "twilio" => PhoneProvider::Twilio, "mock" => PhoneProvider::Mock);
provider_from_str!(TtsProvider, "tts", "elevenlabs" => TtsProvider::ElevenLabs, "mock" => TtsProvider::Mock);
provider_from_str!(SttProvider, "stt", "deepgram" => SttProvider::Deepgram, "mock" => SttProvider::Mock);

/// Telephony configuration.
#[derive(Clone, Default, Deserialize)]
pub struct PhoneConfig {
    #[serde(default)]
    pub provider: PhoneProvider,

    #[serde(default)]
    pub account_sid: String,

    #[serde(default)]
    pub auth_token: String,

    /// Caller id the calls are placed from, E.164.
    #[serde(default)]
    pub number: String,

    /// The user's phone, E.164. Every call dials this number.
    #[serde(default)]
    pub user_number: String,
}

/// Speech synthesis configuration.
#[derive(Clone, Deserialize)]
pub struct TtsConfig {
    #[serde(default)]
    pub provider: TtsProvider,

    #[serde(default)]
    pub elevenlabs_api_key: String,

    #[serde(default = "default_tts_voice")]
    pub voice: String,

    #[serde(default = "default_tts_model")]
    pub model: String,
}

/// Speech recognition configuration.
#[derive(Clone, Deserialize)]
pub struct SttConfig {
    #[serde(default)]
    pub provider: SttProvider,

    #[serde(default)]
    pub deepgram_api_key: String,

    #[serde(default = "default_stt_model")]
    pub model: String,

    #[serde(default = "default_stt_language")]
    pub language: String,

    /// Silence that ends an utterance.
    #[serde(default = "default_silence_duration_ms")]
    pub silence_duration_ms: u32,
}

/// Call orchestration timing, all in milliseconds.
#[derive(Debug, Clone, Deserialize)]
pub struct CallTimingConfig {
    #[serde(default = "default_transcript_timeout_ms")]
    pub transcript_timeout_ms: u64,

    #[serde(default = "default_answer_timeout_ms")]
    pub answer_timeout_ms: u64,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    #[serde(default = "default_end_grace_ms")]
    pub end_grace_ms: u64,
}

impl CallTimingConfig {
    pub fn transcript_timeout(&self) -> Duration {
        Duration::from_millis(self.transcript_timeout_ms)
    }

    pub fn answer_timeout(&self) -> Duration {
        Duration::from_millis(self.answer_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn end_grace(&self) -> Duration {
        Duration::from_millis(self.end_grace_ms)
    }
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))
}

fn default_port() -> u16 {
    3333
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_tts_voice() -> String {
    // "Rachel"
    "21m00Tcm4TlvDq8ikWAM".to_string()
}

fn default_tts_model() -> String {
    "eleven_turbo_v2_5".to_string()
}

fn default_stt_model() -> String {
    "nova-2".to_string()
}

fn default_stt_language() -> String {
    "en-US".to_string()
}

fn default_silence_duration_ms() -> u32 {
    800
}

fn default_transcript_timeout_ms() -> u64 {
    180_000
}

fn default_answer_timeout_ms() -> u64 {
    30_000
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_end_grace_ms() -> u64 {
    2_000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            public_url: String::new(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            provider: TtsProvider::default(),
            elevenlabs_api_key: String::new(),
            voice: default_tts_voice(),
            model: default_tts_model(),
        }
    }
}

impl Default for SttConfig {
    fn default() -> Self {
        Self {
            provider: SttProvider::default(),
            deepgram_api_key: String::new(),
            model: default_stt_model(),
            language: default_stt_language(),
            silence_duration_ms: default_silence_duration_ms(),
        }
    }
}

impl Default for CallTimingConfig {
    fn default() -> Self {
        Self {
            transcript_timeout_ms: default_transcript_timeout_ms(),
            answer_timeout_ms: default_answer_timeout_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            end_grace_ms: default_end_grace_ms(),
        }
    }
}

fn redact(secret: &str) -> &'static str {
    if secret.is_empty() {
        "<unset>"
    } else {
        "[REDACTED]"
    }
}

impl fmt::Debug for PhoneConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PhoneConfig")
            .field("provider", &self.provider)
            .field("account_sid", &self.account_sid)
            .field("auth_token", &redact(&self.auth_token))
            .field("number", &self.number)
            .field("user_number", &self.user_number)
            .finish()
    }
}

impl fmt::Debug for TtsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TtsConfig")
            .field("provider", &self.provider)
            .field("elevenlabs_api_key", &redact(&self.elevenlabs_api_key))
            .field("voice", &self.voice)
            .field("model", &self.model)
            .finish()
    }
}

impl fmt::Debug for SttConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SttConfig")
            .field("provider", &self.provider)
            .field("deepgram_api_key", &redact(&self.deepgram_api_key))
            .field("model", &self.model)
            .field("language", &self.language)
            .field("silence_duration_ms", &self.silence_duration_ms)
            .finish()
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// A setting has a value the server cannot use.
    #[error("invalid configuration: {0}")]
    Invalid(String),

    /// Required settings for the selected providers are not set.
    #[error("missing required settings: {}", .0.join(", "))]
    Missing(Vec<&'static str>),
}

impl Config {
    /// Checks that every setting the selected providers need is present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` for a zero answer timeout or poll
    /// interval, and `ConfigError::Missing` listing every missing setting.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.calls.answer_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "calls.answer_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.calls.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "calls.poll_interval_ms must be greater than zero".to_string(),
            ));
        }

        let mut missing = Vec::new();

        if self.phone.user_number.trim().is_empty() {
            missing.push("phone.user_number");
        }
        if self.phone.provider == PhoneProvider::Twilio {
            if self.phone.account_sid.trim().is_empty() {
                missing.push("phone.account_sid");
            }
            if self.phone.auth_token.trim().is_empty() {
                missing.push("phone.auth_token");
            }
            if self.phone.number.trim().is_empty() {
                missing.push("phone.number");
            }
            if self.server.public_url.trim().is_empty() {
                missing.push("server.public_url");
            }
        }
        if self.tts.provider == TtsProvider::ElevenLabs
            && self.tts.elevenlabs_api_key.trim().is_empty()
        {
            missing.push("tts.elevenlabs_api_key");
        }
        if self.stt.provider == SttProvider::Deepgram
            && self.stt.deepgram_api_key.trim().is_empty()
        {
            missing.push("stt.deepgram_api_key");
        }

        if missing.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Missing(missing))
        }
    }
}

/// Loads configuration from a TOML file, falling back to defaults, then
/// applies environment overrides.
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed, or
/// an override names an unknown provider.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    load_config_with(path, |key| std::env::var(key).ok())
}

/// [`load_config`] with an explicit environment lookup.
pub fn load_config_with<F>(path: Option<&str>, env: F) -> Result<Config, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = match path {
        Some(p) => match std::fs::read_to_string(p) {
            Ok(contents) => toml::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = p, "config file not found, using defaults");
                Config::default()
            }
            Err(e) => return Err(ConfigError::FileRead(e)),
        },
        None => Config::default(),
    };

    apply_env_overrides(&mut config, env)?;
    Ok(config)
}

/// Environment variable overrides:
/// - `AGENTCALL_HOST`, `AGENTCALL_PORT`, `AGENTCALL_PUBLIC_URL` override `server.*`
/// - `AGENTCALL_LOG_LEVEL`, `AGENTCALL_LOG_JSON` override `logging.*`
/// - `AGENTCALL_PHONE_PROVIDER`, `AGENTCALL_PHONE_ACCOUNT_SID`,
///   `AGENTCALL_PHONE_AUTH_TOKEN`, `AGENTCALL_PHONE_NUMBER`,
///   `AGENTCALL_USER_PHONE_NUMBER` override `phone.*`
/// - `AGENTCALL_TTS_PROVIDER`, `AGENTCALL_ELEVENLABS_API_KEY` (or
///   `ELEVENLABS_API_KEY`), `AGENTCALL_TTS_VOICE`, `AGENTCALL_TTS_MODEL`
///   override `tts.*`
/// - `AGENTCALL_STT_PROVIDER`, `AGENTCALL_DEEPGRAM_API_KEY` (or
///   `DEEPGRAM_API_KEY`), `AGENTCALL_STT_MODEL`, `AGENTCALL_STT_LANGUAGE`,
///   `AGENTCALL_STT_SILENCE_DURATION_MS` override `stt.*`
/// - `AGENTCALL_TRANSCRIPT_TIMEOUT_MS` overrides `calls.transcript_timeout_ms`
fn apply_env_overrides<F>(config: &mut Config, env: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let var = |key: &str| env(key).filter(|value| !value.trim().is_empty());

    if let Some(host) = var("AGENTCALL_HOST") {
        if let Ok(parsed) = host.parse() {
            config.server.host = parsed;
        }
    }
    if let Some(port) = var("AGENTCALL_PORT") {
        if let Ok(parsed) = port.parse() {
            config.server.port = parsed;
        }
    }
    if let Some(url) = var("AGENTCALL_PUBLIC_URL") {
        config.server.public_url = url;
    }
    if let Some(level) = var("AGENTCALL_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Some(json) = var("AGENTCALL_LOG_JSON") {
        config.logging.json = json == "true" || json == "1";
    }

    if let Some(provider) = var("AGENTCALL_PHONE_PROVIDER") {
        config.phone.provider = provider.parse()?;
    }
    if let Some(sid) = var("AGENTCALL_PHONE_ACCOUNT_SID") {
        config.phone.account_sid = sid;
    }
    if let Some(token) = var("AGENTCALL_PHONE_AUTH_TOKEN") {
        config.phone.auth_token = token;
    }
    if let Some(number) = var("AGENTCALL_PHONE_NUMBER") {
        config.phone.number = number;
    }
    if let Some(number) = var("AGENTCALL_USER_PHONE_NUMBER") {
        config.phone.user_number = number;
    }

    if let Some(provider) = var("AGENTCALL_TTS_PROVIDER") {
        config.tts.provider = provider.parse()?;
    }
    if let Some(key) = var("AGENTCALL_ELEVENLABS_API_KEY").or_else(|| var("ELEVENLABS_API_KEY")) {
        config.tts.elevenlabs_api_key = key;
    }
    if let Some(voice) = var("AGENTCALL_TTS_VOICE") {
        config.tts.voice = voice;
    }
    if let Some(model) = var("AGENTCALL_TTS_MODEL") {
        config.tts.model = model;
    }

    if let Some(provider) = var("AGENTCALL_STT_PROVIDER") {
        config.stt.provider = provider.parse()?;
    }
    if let Some(key) = var("AGENTCALL_DEEPGRAM_API_KEY").or_else(|| var("DEEPGRAM_API_KEY")) {
        config.stt.deepgram_api_key = key;
    }
    if let Some(model) = var("AGENTCALL_STT_MODEL") {
        config.stt.model = model;
    }
    if let Some(language) = var("AGENTCALL_STT_LANGUAGE") {
        config.stt.language = language;
    }
    if let Some(ms) = var("AGENTCALL_STT_SILENCE_DURATION_MS") {
        if let Ok(parsed) = ms.parse() {
            config.stt.silence_duration_ms = parsed;
        }
    }
    if let Some(ms) = var("AGENTCALL_TRANSCRIPT_TIMEOUT_MS") {
        if let Ok(parsed) = ms.parse() {
            config.calls.transcript_timeout_ms = parsed;
        }
    }

    Ok(())
}
