use agentcall_types::CallStatus;
use agentcall_voice::mock::{
    MockCallScript, MockEvent, MockRecognition, MockRecognizer, MockSignaling, MockSynthesizer,
    MOCK_LEG_HISTORY, MOCK_SINK_HISTORY_FRAMES,
};
use agentcall_voice::{
    AudioSink, AudioSource, CallLeg, DeepgramConfig, MediaStreamHub, SignalingBackend,
    SpeechRecognizer, SpeechSynthesizer, SynthesisConfig, TranscriptEvent, TranscriptionConfig,
    TwilioConfig, VoiceError,
};

#[tokio::test]
async fn mock_leg_follows_script_and_repeats_last_status() {
    let signaling = MockSignaling::new(MockCallScript::answered_after(2));
    let leg = signaling.dial("+15550001111").await.unwrap();

    assert_eq!(leg.provider_id(), "MOCK0001");
    assert_eq!(leg.status().await.unwrap(), CallStatus::Ringing);
    assert_eq!(leg.status().await.unwrap(), CallStatus::Ringing);
    assert_eq!(leg.status().await.unwrap(), CallStatus::Answered);
    assert_eq!(leg.status().await.unwrap(), CallStatus::Answered);

    let mock = signaling.last_leg().unwrap();
    assert_eq!(mock.destination(), "+15550001111");
    assert_eq!(mock.poll_count(), 4);
}

#[tokio::test]
async fn mock_hangup_ends_inbound_audio() {
    let signaling = MockSignaling::default();
    let leg = signaling.dial("+15550001111").await.unwrap();
    let source = leg.audio_source().expect("transport attached");

    let inbound = signaling.last_leg().unwrap().inbound().unwrap();
    inbound.send(vec![1, 2, 3]).await.unwrap();
    drop(inbound);

    assert_eq!(source.read().await.unwrap(), Some(vec![1, 2, 3]));
    leg.hangup().await.unwrap();
    assert_eq!(source.read().await.unwrap(), None);
    assert_eq!(leg.status().await.unwrap(), CallStatus::Ended);
}

#[tokio::test]
async fn mock_hangup_error_is_reported_and_counted() {
    let signaling = MockSignaling::new(MockCallScript::default().with_hangup_error("carrier down"));
    let leg = signaling.dial("+15550001111").await.unwrap();

    let err = leg.hangup().await.unwrap_err();
    assert!(matches!(err, VoiceError::Signaling(msg) if msg == "carrier down"));
    assert_eq!(signaling.last_leg().unwrap().hangup_count(), 1);
}

#[tokio::test]
async fn mock_dial_failure() {
    let signaling = MockSignaling::failing("invalid number");
    assert!(signaling.dial("+1").await.is_err());
    assert!(signaling.legs().is_empty());
}

#[tokio::test]
async fn mock_history_drops_oldest_entries() {
    let signaling = MockSignaling::default();
    for _ in 0..MOCK_LEG_HISTORY + 6 {
        signaling.dial("+15550001111").await.unwrap();
    }
    let legs = signaling.legs();
    assert_eq!(legs.len(), MOCK_LEG_HISTORY);
    assert_eq!(legs[0].provider_id(), "MOCK0007");
    assert_eq!(signaling.last_leg().unwrap().provider_id(), "MOCK0070");

    let leg = signaling.last_leg().unwrap();
    let sink = leg.audio_sink().expect("transport attached");
    for i in 0..MOCK_SINK_HISTORY_FRAMES + 10 {
        sink.write(&[(i % 256) as u8]).await.unwrap();
    }
    let frames = leg.sent_frames();
    assert_eq!(frames.len(), MOCK_SINK_HISTORY_FRAMES);
    assert_eq!(frames[0], vec![10]);
}

#[tokio::test]
async fn mock_sink_failure_counts_every_write() {
    let signaling = MockSignaling::new(MockCallScript::default().with_sink_failing_after(2));
    let leg = signaling.dial("+15550001111").await.unwrap();
    let sink = leg.audio_sink().expect("transport attached");

    sink.write(&[1]).await.unwrap();
    sink.write(&[2]).await.unwrap();
    assert!(matches!(
        sink.write(&[3]).await,
        Err(VoiceError::TransportClosed)
    ));
}

#[tokio::test]
async fn mock_synthesizer_frames_text_and_terminates() {
    let synth = MockSynthesizer::new();
    let config = SynthesisConfig::telephony("voice", "model");
    let text = "x".repeat(400);

    let mut stream = synth.synthesize_stream(&text, &config).await.unwrap();
    let mut sizes = Vec::new();
    let mut saw_final = false;
    while let Some(chunk) = stream.recv().await {
        let chunk = chunk.unwrap();
        if chunk.is_final {
            saw_final = true;
            break;
        }
        sizes.push(chunk.audio.len());
    }

    assert_eq!(sizes, vec![160, 160, 80]);
    assert!(saw_final);
    assert_eq!(synth.requests(), vec![text]);
}

#[tokio::test]
async fn mock_synthesizer_rejects_blank_text() {
    let synth = MockSynthesizer::new();
    let config = SynthesisConfig::telephony("voice", "model");
    assert!(matches!(
        synth.synthesize_stream("  ", &config).await,
        Err(VoiceError::Tts(_))
    ));
}

#[tokio::test]
async fn mock_recognizer_plays_scripts_in_order() {
    let recognizer = MockRecognizer::new([
        MockRecognition::events(vec![
            MockEvent::Partial("may".into()),
            MockEvent::Final("maybe later".into()),
        ]),
        MockRecognition::failing_to_start("no credits"),
    ]);
    let config = TranscriptionConfig::telephony("en-US", "nova-2", 800);

    let mut session = recognizer.transcribe_stream(&config).await.unwrap();
    session.audio.send(vec![9; 160]).await.unwrap();

    assert_eq!(
        session.events.recv().await.unwrap().unwrap(),
        TranscriptEvent::partial("may")
    );
    assert_eq!(
        session.events.recv().await.unwrap().unwrap(),
        TranscriptEvent::final_("maybe later")
    );
    assert!(session.events.recv().await.is_none());

    assert!(matches!(
        recognizer.transcribe_stream(&config).await,
        Err(VoiceError::Stt(_))
    ));
    assert_eq!(recognizer.sessions_opened(), 1);
    assert_eq!(recognizer.last_config(), Some(config));
}

#[tokio::test]
async fn hub_links_media_session_to_sink_and_source() {
    let hub = MediaStreamHub::new();
    assert!(hub.link("CA1").is_none());

    let mut session = hub.attach("CA1", "MZ1");
    let mut outbound = session.take_outbound().expect("outbound available once");
    assert!(session.take_outbound().is_none());
    let link = hub.link("CA1").expect("link registered");
    assert_eq!(link.stream_sid(), "MZ1");

    // Outbound: sink write becomes a media message on the socket side.
    link.write(&[0xff, 0xff, 0x00]).await.unwrap();
    let message = outbound.next_message().await.unwrap();
    assert!(message.contains(r#""payload":"//8A""#));

    // Inbound: socket payload becomes a source frame.
    session.push_inbound_payload("AQID").unwrap();
    assert_eq!(link.read().await.unwrap(), Some(vec![1, 2, 3]));

    drop(session);
    drop(outbound);
    assert!(hub.link("CA1").is_none());
    assert_eq!(link.read().await.unwrap(), None);
    assert!(link.write(&[0]).await.is_err());
}

#[tokio::test]
async fn hub_reconnect_is_not_detached_by_stale_session() {
    let hub = MediaStreamHub::new();
    let first = hub.attach("CA1", "MZ1");
    let _second = hub.attach("CA1", "MZ2");

    drop(first);
    assert_eq!(hub.link("CA1").unwrap().stream_sid(), "MZ2");
}

#[test]
fn hub_records_callback_statuses() {
    let hub = MediaStreamHub::new();
    assert_eq!(hub.record_status("CA1", "ringing"), Some(CallStatus::Ringing));
    assert_eq!(hub.status("CA1"), Some(CallStatus::Ringing));
    assert_eq!(hub.record_status("CA1", "completed"), Some(CallStatus::Ended));
    assert_eq!(hub.status("CA1"), Some(CallStatus::Ended));
    hub.forget("CA1");
    assert_eq!(hub.status("CA1"), None);
}

#[test]
fn hub_ignores_final_callbacks_after_forget() {
    let hub = MediaStreamHub::new();
    for n in 0..1000 {
        let call_sid = format!("CA{n}");
        hub.record_status(&call_sid, "queued");
        hub.forget(&call_sid);
        assert_eq!(hub.record_status(&call_sid, "completed"), None);
        assert_eq!(hub.status(&call_sid), None);
    }
    assert_eq!(hub.record_status("CA-late", "busy"), None);
    assert_eq!(hub.status("CA-late"), None);
}

#[test]
fn provider_configs_deserialize_with_default_api_bases() {
    let twilio: TwilioConfig = toml::from_str(
        r#"
        account_sid = "AC123"
        auth_token = "secret"
        from_number = "+15550000000"
        public_url = "https://example.ngrok.app"
        "#,
    )
    .unwrap();
    assert_eq!(twilio.api_base, "https://api.twilio.com");
    assert!(!format!("{twilio:?}").contains("secret"));

    let deepgram: DeepgramConfig = toml::from_str(r#"api_key = "dg-key""#).unwrap();
    assert_eq!(deepgram.api_base, "wss://api.deepgram.com");
    assert!(!format!("{deepgram:?}").contains("dg-key"));
}
