//! Builds provider trait objects from configuration.

use crate::config::{Config, PhoneProvider, SttProvider, TtsProvider};
use agentcall_calls::CallSettings;
use agentcall_voice::mock::{MockRecognizer, MockSignaling, MockSynthesizer};
use agentcall_voice::{
    DeepgramConfig, DeepgramRecognizer, ElevenLabsConfig, ElevenLabsSynthesizer, MediaStreamHub,
    SignalingBackend, SpeechRecognizer, SpeechSynthesizer, SynthesisConfig, TranscriptionConfig,
    TwilioConfig, TwilioSignaling,
};
use std::sync::Arc;

/// The three capabilities a call needs.
#[derive(Clone)]
pub struct Providers {
    pub signaling: Arc<dyn SignalingBackend>,
    pub synthesizer: Arc<dyn SpeechSynthesizer>,
    pub recognizer: Arc<dyn SpeechRecognizer>,
}

impl Providers {
    /// Instantiates the configured providers. Twilio legs find their audio
    /// through `media`.
    pub fn from_config(config: &Config, media: &MediaStreamHub) -> Self {
        let signaling: Arc<dyn SignalingBackend> = match config.phone.provider {
            PhoneProvider::Twilio => Arc::new(TwilioSignaling::new(
                TwilioConfig::new(
                    &config.phone.account_sid,
                    &config.phone.auth_token,
                    &config.phone.number,
                    &config.server.public_url,
                ),
                media.clone(),
            )),
            PhoneProvider::Mock => Arc::new(MockSignaling::default()),
        };

        let synthesizer: Arc<dyn SpeechSynthesizer> = match config.tts.provider {
            TtsProvider::ElevenLabs => Arc::new(ElevenLabsSynthesizer::new(
                ElevenLabsConfig::new(&config.tts.elevenlabs_api_key),
            )),
            TtsProvider::Mock => Arc::new(MockSynthesizer::new()),
        };

        let recognizer: Arc<dyn SpeechRecognizer> = match config.stt.provider {
            SttProvider::Deepgram => Arc::new(DeepgramRecognizer::new(DeepgramConfig::new(
                &config.stt.deepgram_api_key,
            ))),
            SttProvider::Mock => Arc::new(MockRecognizer::default()),
        };

        tracing::info!(
            phone = ?config.phone.provider,
            tts = ?config.tts.provider,
            stt = ?config.stt.provider,
            "voice providers configured"
        );

        Self {
            signaling,
            synthesizer,
            recognizer,
        }
    }
}

/// Orchestrator settings derived from configuration.
pub fn call_settings(config: &Config) -> CallSettings {
    let mut settings = CallSettings::new(
        &config.phone.user_number,
        SynthesisConfig::telephony(&config.tts.voice, &config.tts.model),
        TranscriptionConfig::telephony(
            &config.stt.language,
            &config.stt.model,
            config.stt.silence_duration_ms,
        ),
    );
    settings.answer_timeout = config.calls.answer_timeout();
    settings.poll_interval = config.calls.poll_interval();
    settings.transcript_timeout = config.calls.transcript_timeout();
    settings.end_grace = config.calls.end_grace();
    settings
}
