//! Voice provider infrastructure for agentcall.
//!
//! Defines the three capabilities a phone conversation needs, each as a
//! trait so providers can be swapped: a signaling backend that places calls
//! and exposes their duplex audio, a streaming speech synthesizer, and a
//! streaming speech recognizer.
//!
//! Concrete providers live alongside the traits: Twilio for signaling
//! (REST call control plus Media Streams audio), ElevenLabs for synthesis,
//! Deepgram for recognition, and scripted in-memory mocks for tests and
//! offline runs. Audio is mu-law at 8 kHz end to end so nothing on the call
//! path transcodes.

pub mod config;
pub mod deepgram;
pub mod elevenlabs;
pub mod error;
pub mod mock;
pub mod signaling;
pub mod stt;
pub mod tts;
pub mod twilio;

pub use config::{
    AudioEncoding, DeepgramConfig, ElevenLabsConfig, SynthesisConfig, TranscriptionConfig,
    TwilioConfig, TELEPHONY_SAMPLE_RATE,
};
pub use deepgram::DeepgramRecognizer;
pub use elevenlabs::ElevenLabsSynthesizer;
pub use error::VoiceError;
pub use signaling::{AudioSink, AudioSource, CallLeg, SignalingBackend};
pub use stt::{RecognitionSession, SpeechRecognizer, TranscriptEvent};
pub use tts::{AudioChunk, AudioChunkStream, SpeechSynthesizer};
pub use twilio::{MediaOutbound, MediaStreamHub, MediaStreamSession, TwilioSignaling};
