//! In-process providers.
//!
//! Every capability has a scripted stand-in here. They back the test suites
//! and let the server run end to end without a phone number or API keys
//! (`provider = "mock"` in each config section).
//!
//! Recorded history (dialed legs, written frames, forwarded audio) is kept
//! in bounded buffers that drop the oldest entries, so a long local run
//! holds steady memory.

use crate::config::{SynthesisConfig, TranscriptionConfig};
use crate::error::VoiceError;
use crate::signaling::{AudioSink, AudioSource, CallLeg, SignalingBackend};
use crate::stt::{RecognitionSession, SpeechRecognizer, TranscriptEvent};
use crate::tts::{AudioChunk, AudioChunkStream, SpeechSynthesizer};
use agentcall_types::CallStatus;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{mpsc, Mutex as AsyncMutex};

/// 20 ms of 8 kHz mu-law.
const MOCK_FRAME_BYTES: usize = 160;

const MOCK_CHANNEL_CAPACITY: usize = 64;

/// Most recent legs kept by [`MockSignaling::legs`].
pub const MOCK_LEG_HISTORY: usize = 64;

/// Most recent frames kept per sink, 30 s of audio.
pub const MOCK_SINK_HISTORY_FRAMES: usize = 1500;

/// Most recent bytes kept by [`MockRecognizer::received_audio`].
pub const MOCK_AUDIO_HISTORY_BYTES: usize = 64 * 1024;

/// Most recent texts kept by [`MockSynthesizer::requests`].
const MOCK_REQUEST_HISTORY: usize = 256;

fn push_bounded<T>(buffer: &mut VecDeque<T>, item: T, limit: usize) {
    if buffer.len() == limit {
        buffer.pop_front();
    }
    buffer.push_back(item);
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Behaviour of the legs a [`MockSignaling`] dials.
#[derive(Debug, Clone)]
pub struct MockCallScript {
    /// Statuses returned by successive polls. The last one repeats.
    pub statuses: Vec<CallStatus>,
    /// When set, `hangup()` fails with this message.
    pub hangup_error: Option<String>,
    /// When `false`, the leg never exposes an audio transport.
    pub with_transport: bool,
    /// Outbound writes fail once this many frames have been accepted.
    pub sink_fails_after: Option<usize>,
}

impl Default for MockCallScript {
    fn default() -> Self {
        Self::answered_after(1)
    }
}

impl MockCallScript {
    /// Rings for `polls` status checks, then answers.
    pub fn answered_after(polls: usize) -> Self {
        let mut statuses = vec![CallStatus::Ringing; polls];
        statuses.push(CallStatus::Answered);
        Self {
            statuses,
            hangup_error: None,
            with_transport: true,
            sink_fails_after: None,
        }
    }

    /// Rings forever.
    pub fn never_answered() -> Self {
        Self {
            statuses: vec![CallStatus::Ringing],
            ..Self::answered_after(0)
        }
    }

    /// Rings once, then lands in `status`.
    pub fn ending_with(status: CallStatus) -> Self {
        Self {
            statuses: vec![CallStatus::Ringing, status],
            ..Self::answered_after(0)
        }
    }

    pub fn with_hangup_error(mut self, message: impl Into<String>) -> Self {
        self.hangup_error = Some(message.into());
        self
    }

    pub fn without_transport(mut self) -> Self {
        self.with_transport = false;
        self
    }

    pub fn with_sink_failing_after(mut self, frames: usize) -> Self {
        self.sink_fails_after = Some(frames);
        self
    }
}

/// Signaling backend whose legs follow a [`MockCallScript`].
#[derive(Debug)]
pub struct MockSignaling {
    script: MockCallScript,
    dial_error: Option<String>,
    legs: Mutex<VecDeque<Arc<MockCallLeg>>>,
    dialed: AtomicUsize,
}

impl Default for MockSignaling {
    fn default() -> Self {
        Self::new(MockCallScript::default())
    }
}

impl MockSignaling {
    pub fn new(script: MockCallScript) -> Self {
        Self {
            script,
            dial_error: None,
            legs: Mutex::new(VecDeque::new()),
            dialed: AtomicUsize::new(0),
        }
    }

    /// A backend that refuses every dial.
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            dial_error: Some(message.into()),
            ..Self::default()
        }
    }

    /// The most recent legs dialed, oldest first.
    pub fn legs(&self) -> Vec<Arc<MockCallLeg>> {
        lock(&self.legs).iter().cloned().collect()
    }

    pub fn last_leg(&self) -> Option<Arc<MockCallLeg>> {
        lock(&self.legs).back().cloned()
    }
}

#[async_trait]
impl SignalingBackend for MockSignaling {
    async fn dial(&self, destination: &str) -> Result<Arc<dyn CallLeg>, VoiceError> {
        if let Some(message) = &self.dial_error {
            return Err(VoiceError::Signaling(message.clone()));
        }

        let n = self.dialed.fetch_add(1, Ordering::SeqCst) + 1;
        let leg = Arc::new(MockCallLeg::new(
            format!("MOCK{n:04}"),
            destination,
            self.script.clone(),
        ));
        push_bounded(&mut lock(&self.legs), leg.clone(), MOCK_LEG_HISTORY);

        tracing::debug!(leg = %leg.id, destination, "mock call dialed");
        Ok(leg as Arc<dyn CallLeg>)
    }
}

/// A scripted call leg with an in-memory duplex transport.
#[derive(Debug)]
pub struct MockCallLeg {
    id: String,
    destination: String,
    statuses: Mutex<VecDeque<CallStatus>>,
    hangup_error: Option<String>,
    hung_up: AtomicBool,
    polls: AtomicUsize,
    hangups: AtomicUsize,
    sink: Option<Arc<MockAudioSink>>,
    source: Option<Arc<MockAudioSource>>,
    inbound_tx: Mutex<Option<mpsc::Sender<Vec<u8>>>>,
}

impl MockCallLeg {
    fn new(id: String, destination: &str, script: MockCallScript) -> Self {
        let (sink, source, inbound_tx) = if script.with_transport {
            let (tx, rx) = mpsc::channel(MOCK_CHANNEL_CAPACITY);
            (
                Some(Arc::new(MockAudioSink::new(script.sink_fails_after))),
                Some(Arc::new(MockAudioSource::new(rx))),
                Some(tx),
            )
        } else {
            (None, None, None)
        };

        Self {
            id,
            destination: destination.to_string(),
            statuses: Mutex::new(script.statuses.into()),
            hangup_error: script.hangup_error,
            hung_up: AtomicBool::new(false),
            polls: AtomicUsize::new(0),
            hangups: AtomicUsize::new(0),
            sink,
            source,
            inbound_tx: Mutex::new(inbound_tx),
        }
    }

    pub fn destination(&self) -> &str {
        &self.destination
    }

    /// Number of `status()` calls made so far.
    pub fn poll_count(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }

    /// Number of `hangup()` calls made so far, failed ones included.
    pub fn hangup_count(&self) -> usize {
        self.hangups.load(Ordering::SeqCst)
    }

    /// Feed for inbound (caller-to-agent) audio, until the leg hangs up.
    pub fn inbound(&self) -> Option<mpsc::Sender<Vec<u8>>> {
        lock(&self.inbound_tx).clone()
    }

    /// Outbound audio written so far, concatenated.
    pub fn sent_audio(&self) -> Vec<u8> {
        self.sink
            .as_ref()
            .map(|sink| sink.frames().concat())
            .unwrap_or_default()
    }

    /// Outbound audio written so far, frame by frame.
    pub fn sent_frames(&self) -> Vec<Vec<u8>> {
        self.sink
            .as_ref()
            .map(|sink| sink.frames())
            .unwrap_or_default()
    }
}

#[async_trait]
impl CallLeg for MockCallLeg {
    fn provider_id(&self) -> &str {
        &self.id
    }

    async fn status(&self) -> Result<CallStatus, VoiceError> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        if self.hung_up.load(Ordering::SeqCst) {
            return Ok(CallStatus::Ended);
        }

        let mut statuses = lock(&self.statuses);
        let status = if statuses.len() > 1 {
            statuses.pop_front()
        } else {
            statuses.front().copied()
        };
        Ok(status.unwrap_or(CallStatus::Ended))
    }

    async fn hangup(&self) -> Result<(), VoiceError> {
        self.hangups.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = &self.hangup_error {
            return Err(VoiceError::Signaling(message.clone()));
        }

        self.hung_up.store(true, Ordering::SeqCst);
        // Dropping the feed ends the inbound stream.
        lock(&self.inbound_tx).take();
        Ok(())
    }

    fn audio_sink(&self) -> Option<Arc<dyn AudioSink>> {
        self.sink.clone().map(|sink| sink as Arc<dyn AudioSink>)
    }

    fn audio_source(&self) -> Option<Arc<dyn AudioSource>> {
        self.source.clone().map(|source| source as Arc<dyn AudioSource>)
    }
}

/// Records the frames written to it.
#[derive(Debug)]
pub struct MockAudioSink {
    frames: Mutex<VecDeque<Vec<u8>>>,
    written: AtomicUsize,
    fails_after: Option<usize>,
}

impl MockAudioSink {
    fn new(fails_after: Option<usize>) -> Self {
        Self {
            frames: Mutex::new(VecDeque::new()),
            written: AtomicUsize::new(0),
            fails_after,
        }
    }

    /// The most recent frames, oldest first.
    pub fn frames(&self) -> Vec<Vec<u8>> {
        lock(&self.frames).iter().cloned().collect()
    }
}

#[async_trait]
impl AudioSink for MockAudioSink {
    async fn write(&self, frame: &[u8]) -> Result<(), VoiceError> {
        let mut frames = lock(&self.frames);
        if self
            .fails_after
            .is_some_and(|limit| self.written.load(Ordering::SeqCst) >= limit)
        {
            return Err(VoiceError::TransportClosed);
        }
        self.written.fetch_add(1, Ordering::SeqCst);
        push_bounded(&mut frames, frame.to_vec(), MOCK_SINK_HISTORY_FRAMES);
        Ok(())
    }
}

/// Yields whatever is pushed through [`MockCallLeg::inbound`].
#[derive(Debug)]
pub struct MockAudioSource {
    rx: AsyncMutex<mpsc::Receiver<Vec<u8>>>,
}

impl MockAudioSource {
    fn new(rx: mpsc::Receiver<Vec<u8>>) -> Self {
        Self {
            rx: AsyncMutex::new(rx),
        }
    }
}

#[async_trait]
impl AudioSource for MockAudioSource {
    async fn read(&self) -> Result<Option<Vec<u8>>, VoiceError> {
        Ok(self.rx.lock().await.recv().await)
    }
}

/// Synthesizer that "renders" text as its own bytes, in telephony-sized frames.
#[derive(Debug, Default)]
pub struct MockSynthesizer {
    rejection: Option<String>,
    error_after_chunks: Option<usize>,
    requests: Mutex<VecDeque<String>>,
}

impl MockSynthesizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rejects every request up front.
    pub fn rejecting(message: impl Into<String>) -> Self {
        Self {
            rejection: Some(message.into()),
            ..Self::default()
        }
    }

    /// Emits `chunks` audio chunks, then an error item.
    pub fn failing_after(chunks: usize) -> Self {
        Self {
            error_after_chunks: Some(chunks),
            ..Self::default()
        }
    }

    /// The most recent texts synthesized, oldest first.
    pub fn requests(&self) -> Vec<String> {
        lock(&self.requests).iter().cloned().collect()
    }
}

#[async_trait]
impl SpeechSynthesizer for MockSynthesizer {
    async fn synthesize_stream(
        &self,
        text: &str,
        _config: &SynthesisConfig,
    ) -> Result<AudioChunkStream, VoiceError> {
        push_bounded(
            &mut lock(&self.requests),
            text.to_string(),
            MOCK_REQUEST_HISTORY,
        );

        if let Some(message) = &self.rejection {
            return Err(VoiceError::Tts(message.clone()));
        }
        if text.trim().is_empty() {
            return Err(VoiceError::Tts("text must not be empty".to_string()));
        }

        let chunks: Vec<AudioChunk> = text
            .as_bytes()
            .chunks(MOCK_FRAME_BYTES)
            .map(|frame| AudioChunk::audio(frame.to_vec()))
            .collect();

        let (tx, rx) = mpsc::channel(chunks.len() + 2);
        for (index, chunk) in chunks.into_iter().enumerate() {
            if self.error_after_chunks == Some(index) {
                let _ = tx.try_send(Err(VoiceError::Tts("synthesis stream interrupted".into())));
                return Ok(rx);
            }
            let _ = tx.try_send(Ok(chunk));
        }
        let _ = tx.try_send(Ok(AudioChunk::end()));
        Ok(rx)
    }
}

/// One step of a scripted recognition session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockEvent {
    Partial(String),
    Final(String),
    Error(String),
    Pause(Duration),
}

/// Script for one recognition session.
#[derive(Debug, Clone, Default)]
pub struct MockRecognition {
    pub events: Vec<MockEvent>,
    /// Keep the event stream open after the script, until the audio writer drops.
    pub hold_open: bool,
    /// Fail `transcribe_stream` itself with this message.
    pub start_error: Option<String>,
}

impl MockRecognition {
    /// A single final transcript.
    pub fn reply(text: impl Into<String>) -> Self {
        Self::events(vec![MockEvent::Final(text.into())])
    }

    /// No events at all, stream held open.
    pub fn silence() -> Self {
        Self {
            hold_open: true,
            ..Self::default()
        }
    }

    pub fn events(events: Vec<MockEvent>) -> Self {
        Self {
            events,
            ..Self::default()
        }
    }

    pub fn failing_to_start(message: impl Into<String>) -> Self {
        Self {
            start_error: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn held_open(mut self) -> Self {
        self.hold_open = true;
        self
    }
}

/// Recognizer that plays one [`MockRecognition`] per session, in order.
///
/// Once the queue is exhausted every further session closes immediately
/// without events.
#[derive(Debug, Default)]
pub struct MockRecognizer {
    sessions: Mutex<VecDeque<MockRecognition>>,
    opened: AtomicUsize,
    last_config: Mutex<Option<TranscriptionConfig>>,
    received_audio: Arc<Mutex<VecDeque<u8>>>,
}

impl MockRecognizer {
    pub fn new(sessions: impl IntoIterator<Item = MockRecognition>) -> Self {
        Self {
            sessions: Mutex::new(sessions.into_iter().collect()),
            ..Self::default()
        }
    }

    pub fn sessions_opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn last_config(&self) -> Option<TranscriptionConfig> {
        lock(&self.last_config).clone()
    }

    /// The most recent audio forwarded to any session, oldest byte first.
    pub fn received_audio(&self) -> Vec<u8> {
        lock(&self.received_audio).iter().copied().collect()
    }
}

#[async_trait]
impl SpeechRecognizer for MockRecognizer {
    async fn transcribe_stream(
        &self,
        config: &TranscriptionConfig,
    ) -> Result<RecognitionSession, VoiceError> {
        *lock(&self.last_config) = Some(config.clone());
        let script = lock(&self.sessions).pop_front().unwrap_or_default();

        if let Some(message) = script.start_error {
            return Err(VoiceError::Stt(message));
        }
        self.opened.fetch_add(1, Ordering::SeqCst);

        let (audio_tx, mut audio_rx) = mpsc::channel::<Vec<u8>>(MOCK_CHANNEL_CAPACITY);
        let (events_tx, events_rx) = mpsc::channel(MOCK_CHANNEL_CAPACITY);
        let received = self.received_audio.clone();

        tokio::spawn(async move {
            let drain = tokio::spawn(async move {
                while let Some(frame) = audio_rx.recv().await {
                    let mut received = lock(&received);
                    received.extend(frame);
                    let excess = received.len().saturating_sub(MOCK_AUDIO_HISTORY_BYTES);
                    received.drain(..excess);
                }
            });

            for event in script.events {
                let item = match event {
                    MockEvent::Pause(duration) => {
                        tokio::time::sleep(duration).await;
                        continue;
                    }
                    MockEvent::Partial(text) => Ok(TranscriptEvent::partial(text)),
                    MockEvent::Final(text) => Ok(TranscriptEvent::final_(text)),
                    MockEvent::Error(message) => Err(VoiceError::Stt(message)),
                };
                if events_tx.send(item).await.is_err() {
                    break;
                }
            }

            if script.hold_open {
                let _ = drain.await;
            }
            drop(events_tx);
        });

        Ok(RecognitionSession {
            audio: audio_tx,
            events: events_rx,
        })
    }
}
