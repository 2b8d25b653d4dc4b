//! REST client against an in-process timer service

use std::sync::Arc;

use common::cache::KvStore;
use common::timer::TimerStatus;
use timer_client::{ClientError, TimerUpload, TimersClient};
use timers::{build_state, clock::SystemClock, config::Settings, routes::create_router};
use tokio::net::TcpListener;

async fn spawn_service() -> String {
    let (state, scheduler) = build_state(
        &Settings::default(),
        KvStore::memory(),
        Arc::new(SystemClock),
    );
    tokio::spawn(scheduler.run());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, create_router(state)).await.unwrap();
    });

    format!("http://{}", address)
}

fn upload(timer_id: &str) -> TimerUpload {
    TimerUpload {
        timer_id: timer_id.to_string(),
        creation_id: "c1".to_string(),
        duration: 600,
        label: "Simmer".to_string(),
        remaining: 600,
        step_index: Some(2),
    }
}

#[tokio::test]
async fn test_start_list_pause_delete() {
    let client = TimersClient::new(&spawn_service().await, "u1");

    let started = client.start(&upload("t1")).await.unwrap();
    assert_eq!(started.status, TimerStatus::Running);
    assert_eq!(started.step_index, Some(2));

    let timers = client.list().await.unwrap();
    assert_eq!(timers.len(), 1);
    assert_eq!(timers[0].label, "Simmer");

    let paused = client
        .pause(&TimerUpload {
            remaining: 420,
            ..upload("t1")
        })
        .await
        .unwrap();
    assert_eq!(paused.status, TimerStatus::Paused);
    assert_eq!(paused.remaining, 420);
    assert_eq!(paused.duration, 600);

    client.delete("t1").await.unwrap();
    client.delete("t1").await.unwrap();
    assert!(client.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_server_errors_carry_message() {
    let client = TimersClient::new(&spawn_service().await, "u1");

    let result = client
        .start(&TimerUpload {
            creation_id: String::new(),
            ..upload("t1")
        })
        .await;

    match result {
        Err(ClientError::Server { status, message }) => {
            assert_eq!(status, 400);
            assert_eq!(message, "Missing required fields: userId, timerId, creationId");
        }
        other => panic!("expected server error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_detect() {
    let client = TimersClient::new(&spawn_service().await, "u1");

    let detected = client
        .detect("Bake for 25 minutes until golden")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(detected.duration, 1500);
    assert_eq!(detected.label, "Bake");

    assert!(client.detect("Serve").await.unwrap().is_none());
}
