//! End-to-end test over a real WebSocket
//!
//! A local tokio-tungstenite server stands in for the inference service: it
//! answers each frame with a result envelope and each ping with a pong, and
//! flags an emergency on the third frame. A second server never reads until
//! told to, standing in for a stalled service.

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use guardian_link::capture::{
    EncodedFrame, FitMode, FrameEncoder, SyntheticCamera, SyntheticOptions,
};
use guardian_link::config::{AppConfig, StreamConfig};
use guardian_link::emergency::EmergencyDecision;
use guardian_link::session::StreamingSession;
use guardian_link::stream::{
    ConnectionManager, ConnectionState, OutboundMessage, SendOutcome, WebSocketTransport,
};
use guardian_link::telemetry::DropReason;
use image::{Rgb, RgbImage};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;

async fn spawn_service() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
        let mut frames = 0;
        while let Some(Ok(message)) = ws.next().await {
            let Message::Text(text) = message else {
                continue;
            };
            let reply = if text.starts_with(EncodedFrame::PREFIX) {
                frames += 1;
                json!({
                    "status": if frames == 3 { "alert" } else { "monitoring" },
                    "sign": "Neutral",
                    "caption": format!("frame {}", frames),
                    "sbar": "",
                    "audio_ready": false,
                })
            } else {
                json!({ "type": "pong" })
            };
            if ws.send(Message::Text(reply.to_string())).await.is_err() {
                break;
            }
        }
    });

    format!("ws://{}/ws/stream", addr)
}

#[tokio::test]
async fn test_frames_round_trip_through_websocket() {
    let endpoint = spawn_service().await;
    let mut config = AppConfig::default();
    config.stream.endpoint = endpoint;
    config.capture.cadence_ms = 50;
    config.capture.width = 64;
    config.capture.height = 48;

    let camera = Arc::new(SyntheticCamera::with_options(
        "synthetic",
        SyntheticOptions {
            width: 128,
            height: 72,
            ..SyntheticOptions::default()
        },
    ));
    let session =
        StreamingSession::new(config, Arc::new(WebSocketTransport::new()), camera).unwrap();
    let mut states = session.subscribe_state();
    let mut results = session.subscribe_results();
    let mut emergencies = session.subscribe_emergencies();
    session.start().unwrap();

    let event = tokio::time::timeout(Duration::from_secs(10), emergencies.recv())
        .await
        .expect("emergency within timeout")
        .unwrap();
    assert_eq!(event.decision, EmergencyDecision::Explicit);
    assert_eq!(event.result.caption.as_deref(), Some("frame 3"));

    let first = results.recv().await.unwrap();
    assert_eq!(first.caption.as_deref(), Some("frame 1"));

    assert_eq!(states.recv().await.unwrap(), ConnectionState::Connecting);
    assert_eq!(states.recv().await.unwrap(), ConnectionState::Connected);

    session.stop();
    assert_eq!(session.state(), ConnectionState::Disconnected);
}

/// Server that accepts, then reads nothing until `go` fires. Reports how many
/// frames it eventually received before the client went away.
async fn spawn_stalled_service() -> (String, oneshot::Sender<()>, oneshot::Receiver<usize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (go_tx, go_rx) = oneshot::channel::<()>();
    let (count_tx, count_rx) = oneshot::channel();

    tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
        let _ = go_rx.await;
        let mut frames = 0;
        while let Some(Ok(message)) = ws.next().await {
            match message {
                Message::Text(text) if text.starts_with(EncodedFrame::PREFIX) => frames += 1,
                Message::Close(_) => break,
                _ => {}
            }
        }
        let _ = count_tx.send(frames);
    });

    (format!("ws://{}/ws/stream", addr), go_tx, count_rx)
}

#[tokio::test]
async fn test_stalled_service_gets_no_backlog_after_stop() {
    let (endpoint, go, received) = spawn_stalled_service().await;
    let config = StreamConfig {
        endpoint: endpoint.clone(),
        ..StreamConfig::default()
    };
    let manager = ConnectionManager::new(config, Arc::new(WebSocketTransport::new()));
    let (state_tx, mut state_rx) = mpsc::unbounded_channel::<ConnectionState>();
    manager
        .start(
            &endpoint,
            Arc::new(move |state: ConnectionState| {
                let _ = state_tx.send(state);
            }),
            Arc::new(|_: String| {}),
        )
        .unwrap();
    tokio::time::timeout(Duration::from_secs(5), async {
        while let Some(state) = state_rx.recv().await {
            if state == ConnectionState::Connected {
                break;
            }
        }
    })
    .await
    .expect("connected within timeout");

    let encoder = FrameEncoder::new(320, 240, 0.9, FitMode::Stretch).unwrap();
    let image = RgbImage::from_fn(320, 240, |x, y| Rgb([x as u8, y as u8, (x ^ y) as u8]));
    let frame = encoder.encode(&image).unwrap();

    let mut sent = 0;
    let mut backpressured = 0;
    for _ in 0..400 {
        match manager.send(OutboundMessage::Frame(frame.clone())) {
            SendOutcome::Sent => sent += 1,
            SendOutcome::Dropped(DropReason::Backpressure) => backpressured += 1,
            other => panic!("unexpected outcome {:?}", other),
        }
    }
    assert!(sent <= 2, "{} frames accepted by a stalled link", sent);
    assert_eq!(sent + backpressured, 400);

    manager.stop();
    let _ = go.send(());
    let received = tokio::time::timeout(Duration::from_secs(5), received)
        .await
        .expect("server saw the socket close")
        .unwrap();
    assert_eq!(received, 0, "frames were flushed after stop");
}
