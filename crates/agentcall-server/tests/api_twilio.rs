//! Telephony webhooks: TwiML, status callbacks and the media stream socket.

use agentcall_calls::{CallManager, CallSettings};
use agentcall_server::{app, AppState};
use agentcall_types::CallStatus;
use agentcall_voice::mock::{MockRecognizer, MockSignaling, MockSynthesizer};
use agentcall_voice::twilio::MediaStreamLink;
use agentcall_voice::{
    AudioSink, AudioSource, MediaStreamHub, SynthesisConfig, TranscriptionConfig,
};
use axum::body::Body;
use axum::http::{Request, StatusCode};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

fn test_state() -> AppState {
    let calls = CallManager::new(
        Arc::new(MockSignaling::default()),
        Arc::new(MockSynthesizer::new()),
        Arc::new(MockRecognizer::default()),
        CallSettings::new(
            "+15557654321",
            SynthesisConfig::telephony("voice", "model"),
            TranscriptionConfig::telephony("en-US", "nova-2", 800),
        ),
    );
    AppState {
        calls: Arc::new(calls),
        media: MediaStreamHub::new(),
        public_url: "https://agentcall.example.com".to_string(),
        shutdown: CancellationToken::new(),
    }
}

#[tokio::test]
async fn voice_webhook_returns_stream_twiml() {
    let response = app(test_state())
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/voice")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "text/xml");
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let twiml = String::from_utf8(body.to_vec()).unwrap();
    assert!(twiml.contains(r#"<Stream url="wss://agentcall.example.com/media-stream">"#));
}

#[tokio::test]
async fn status_callback_is_recorded() {
    let state = test_state();
    let media = state.media.clone();

    let response = app(state)
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/status")
                .header("content-type", "application/x-www-form-urlencoded")
                .body(Body::from(
                    "CallSid=CA123&CallStatus=ringing&AccountSid=AC1&Direction=outbound-api",
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(media.status("CA123"), Some(CallStatus::Ringing));
}

#[tokio::test]
async fn final_status_for_untracked_call_is_not_kept() {
    let state = test_state();
    let media = state.media.clone();
    let router = app(state);

    let response = router
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/status")
                .header("content-type", "application/x-www-form-urlencoded")
                .body(Body::from("CallSid=CA999&CallStatus=completed"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(media.status("CA999"), None);
}

async fn wait_for_link(media: &MediaStreamHub, call_sid: &str) -> Arc<MediaStreamLink> {
    for _ in 0..100 {
        if let Some(link) = media.link(call_sid) {
            return link;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("media stream for {call_sid} never attached");
}

#[tokio::test]
async fn media_stream_bridges_audio_both_ways() {
    let state = test_state();
    let media = state.media.clone();

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app(state)).await.unwrap();
    });

    let (mut socket, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/media-stream"))
        .await
        .expect("websocket connects");

    socket
        .send(Message::Text(r#"{"event":"connected","protocol":"Call","version":"1.0.0"}"#.into()))
        .await
        .unwrap();
    socket
        .send(Message::Text(
            r#"{"event":"start","sequenceNumber":"1","streamSid":"MZ1",
                "start":{"accountSid":"AC1","streamSid":"MZ1","callSid":"CA1","tracks":["inbound"]}}"#
                .into(),
        ))
        .await
        .unwrap();
    socket
        .send(Message::Text(
            r#"{"event":"media","streamSid":"MZ1","media":{"track":"inbound","payload":"AQID"}}"#
                .into(),
        ))
        .await
        .unwrap();

    let link = wait_for_link(&media, "CA1").await;
    assert_eq!(link.read().await.unwrap(), Some(vec![1, 2, 3]));

    link.write(&[0xff, 0xff, 0x00]).await.unwrap();
    let outbound = loop {
        match socket.next().await {
            Some(Ok(Message::Text(text))) => break text,
            Some(Ok(_)) => continue,
            other => panic!("socket closed early: {other:?}"),
        }
    };
    let outbound: serde_json::Value = serde_json::from_str(outbound.as_str()).unwrap();
    assert_eq!(outbound["event"], "media");
    assert_eq!(outbound["streamSid"], "MZ1");
    assert_eq!(outbound["media"]["payload"], "//8A");

    socket
        .send(Message::Text(r#"{"event":"stop","streamSid":"MZ1"}"#.into()))
        .await
        .unwrap();

    // Stop detaches the stream and ends inbound audio.
    assert_eq!(
        tokio::time::timeout(Duration::from_secs(2), link.read())
            .await
            .expect("inbound audio ends")
            .unwrap(),
        None
    );
    assert!(media.link("CA1").is_none());
}
