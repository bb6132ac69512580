use super::*;
use crate::config::Config;
use crate::event::Role;
use crate::services::{board, voice};
use crate::state::test_helpers::{connect, recv_frame, test_app_state, test_app_state_with};
use serde_json::json;

const TTL: Duration = Duration::from_secs(30);

fn later() -> Instant {
    Instant::now() + Duration::from_secs(120)
}

#[test]
fn disabled_by_default() {
    let state = test_app_state();
    assert!(spawn_sweep_task(state).is_none());
}

#[tokio::test]
async fn enabled_when_ttl_configured() {
    let config = Config { room_idle_ttl: Some(TTL), ..Config::default() };
    let state = test_app_state_with(config, &[]);
    let handle = spawn_sweep_task(state).expect("sweep should start");
    handle.abort();
}

#[tokio::test(start_paused = true)]
async fn spawned_task_evicts_abandoned_board_on_tick() {
    let config = Config {
        room_idle_ttl: Some(Duration::from_secs(5)),
        room_sweep_interval: Duration::from_secs(1),
        ..Config::default()
    };
    let state = test_app_state_with(config, &[]);
    let (host, _rx) = connect(&state);
    board::join_board(&state, "ticking-board", host, Role::Host, json!("s")).await;
    state.clients.unregister(host);

    let handle = spawn_sweep_task(state.clone()).expect("sweep should start");

    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(state.rooms.len().await, 1, "not idle long enough yet");

    tokio::time::sleep(Duration::from_secs(4)).await;
    assert_eq!(state.rooms.len().await, 0);
    handle.abort();
}

#[tokio::test]
async fn evicts_board_after_everyone_disconnects() {
    let state = test_app_state();
    let (host, _rx) = connect(&state);
    board::join_board(&state, "orphan-board", host, Role::Host, json!("s")).await;

    assert!(sweep_once(&state, TTL, later()).await.is_empty(), "host still connected");

    state.clients.unregister(host);
    assert_eq!(sweep_once(&state, TTL, later()).await, vec!["orphan-board".to_owned()]);
    assert_eq!(state.rooms.len().await, 0);
}

#[tokio::test]
async fn voice_member_keeps_board_alive() {
    let state = test_app_state();
    let (talker, _rx) = connect(&state);
    voice::join_voice(&state, "voice-board", talker, "P".into()).await;

    assert!(sweep_once(&state, TTL, later()).await.is_empty());
}

#[tokio::test]
async fn evicted_board_restarts_unseeded() {
    let state = test_app_state();
    let (host, _host_rx) = connect(&state);
    board::join_board(&state, "reset-board", host, Role::Host, json!("old")).await;
    state.clients.unregister(host);
    sweep_once(&state, TTL, later()).await;

    let (viewer, mut viewer_rx) = connect(&state);
    board::join_board(&state, "reset-board", viewer, Role::Viewer, serde_json::Value::Null).await;

    let current = recv_frame(&mut viewer_rx).await;
    assert_eq!(current.data.get("seeded"), Some(&json!(false)));
}
