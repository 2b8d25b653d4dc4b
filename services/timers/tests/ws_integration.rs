//! Timer socket integration tests
//!
//! The router is served on an ephemeral port and driven by a real
//! WebSocket client; the clock is advanced by hand.

use std::sync::Arc;
use std::time::Duration;

use common::cache::KvStore;
use common::timer::{Timer, TimerStatus};
use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};

use timers::{
    build_state, clock::ManualClock, config::Settings, routes::create_router, state::AppState,
};

const START: i64 = 1_700_000_000_000;
const WAIT: Duration = Duration::from_secs(5);

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct TestService {
    address: String,
    state: AppState,
    clock: ManualClock,
}

async fn spawn_service() -> TestService {
    let mut settings = Settings::default();
    settings.ws.tick_interval_ms = 50;

    let clock = ManualClock::new(START);
    let (state, scheduler) = build_state(&settings, KvStore::memory(), Arc::new(clock.clone()));
    tokio::spawn(scheduler.run());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    let router = create_router(state.clone());
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    TestService {
        address: format!("ws://{}/api/v2/timers/ws", address),
        state,
        clock,
    }
}

async fn connect(url: &str) -> Socket {
    let (socket, _) = connect_async(url).await.unwrap();
    socket
}

/// Next text frame as JSON, skipping control frames
async fn next_frame(socket: &mut Socket) -> Value {
    tokio::time::timeout(WAIT, async {
        loop {
            match socket.next().await {
                Some(Ok(Message::Text(text))) => return serde_json::from_str(&text).unwrap(),
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
                other => panic!("expected a text frame, got {:?}", other),
            }
        }
    })
    .await
    .expect("no frame received in time")
}

/// Skip frames until one satisfies `accept`
async fn frame_matching(socket: &mut Socket, accept: impl Fn(&Value) -> bool) -> Value {
    tokio::time::timeout(WAIT, async {
        loop {
            let frame = next_frame(socket).await;
            if accept(&frame) {
                return frame;
            }
        }
    })
    .await
    .expect("no matching frame received in time")
}

fn running_timer(id: &str, remaining: u64) -> Timer {
    Timer {
        id: id.to_string(),
        user_id: "u1".to_string(),
        creation_id: "c1".to_string(),
        duration: remaining,
        label: "Boil".to_string(),
        start_time: START,
        remaining,
        status: TimerStatus::Running,
        step_index: None,
        version: 0,
    }
}

#[tokio::test]
async fn test_missing_user_id_is_rejected_and_closed() {
    let service = spawn_service().await;
    let mut socket = connect(&service.address).await;

    assert_eq!(
        next_frame(&mut socket).await,
        json!({"type": "error", "message": "Missing userId"})
    );

    let closing = tokio::time::timeout(WAIT, socket.next()).await.unwrap();
    assert!(
        matches!(closing, Some(Ok(Message::Close(_))) | None | Some(Err(_))),
        "expected the socket to close, got {:?}",
        closing
    );

    let mut socket = connect(&format!("{}?userId=", service.address)).await;
    assert_eq!(next_frame(&mut socket).await["message"], "Missing userId");
}

#[tokio::test]
async fn test_init_then_updates_are_written() {
    let service = spawn_service().await;
    service
        .state
        .timers
        .store_timer(&running_timer("t1", 60))
        .await
        .unwrap();

    let mut socket = connect(&format!("{}?userId=u1", service.address)).await;

    let init = next_frame(&mut socket).await;
    assert_eq!(init["type"], "init");
    assert_eq!(init["timers"][0]["id"], "t1");
    assert_eq!(init["timers"][0]["remaining"], 60);

    let update = next_frame(&mut socket).await;
    assert_eq!(
        update,
        json!({"type": "update", "timers": [{"id": "t1", "remaining": 60, "status": "running"}]})
    );

    service.clock.advance_secs(5);
    frame_matching(&mut socket, |frame| frame["timers"][0]["remaining"] == 55).await;

    socket
        .send(Message::Text(r#"{"type":"ping"}"#.to_string()))
        .await
        .unwrap();
    frame_matching(&mut socket, |frame| frame["type"] == "pong").await;

    socket
        .send(Message::Text(
            r#"{"type":"command","timerId":"t1","action":"pause"}"#.to_string(),
        ))
        .await
        .unwrap();
    let ack = frame_matching(&mut socket, |frame| frame["type"] == "ack").await;
    assert_eq!(ack["timerId"], "t1");

    let stored = service.state.timers.get_timer("u1", "t1").await.unwrap().unwrap();
    assert_eq!(stored.status, TimerStatus::Paused);
    assert_eq!(stored.remaining, 55);
}

#[tokio::test]
async fn test_running_timer_completes_over_the_wire() {
    let service = spawn_service().await;
    service
        .state
        .timers
        .store_timer(&running_timer("t1", 3))
        .await
        .unwrap();

    let mut socket = connect(&format!("{}?userId=u1", service.address)).await;
    assert_eq!(next_frame(&mut socket).await["type"], "init");

    service.clock.advance_secs(3);
    let completed = frame_matching(&mut socket, |frame| {
        frame["type"] == "update" && frame["timers"][0]["status"] == "completed"
    })
    .await;
    assert_eq!(completed["timers"][0]["remaining"], 0);
}

#[tokio::test]
async fn test_loop_exits_when_client_closes() {
    let service = spawn_service().await;
    let mut socket = connect(&format!("{}?userId=u1", service.address)).await;
    assert_eq!(next_frame(&mut socket).await["type"], "init");
    assert_eq!(service.state.hub.subscriber_count(), 1);

    socket.close(None).await.unwrap();

    tokio::time::timeout(WAIT, async {
        while service.state.hub.subscriber_count() > 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("socket task still running after close");
}
