use super::*;
use crate::event::{ALL_PEERS, USER_JOINED_VOICE, USER_LEFT_VOICE};
use crate::state::test_helpers::{assert_no_frame, connect, drain, recv_frame, test_app_state};
use serde_json::json;
use std::collections::HashSet;
use uuid::Uuid;

const BOARD: &str = "board-voice-0001";

fn peers_of(delivery: &Delivery) -> HashSet<String> {
    delivery.frame.data["peers"]
        .as_array()
        .expect("peers array")
        .iter()
        .filter_map(|v| v.as_str().map(str::to_owned))
        .collect()
}

// =============================================================================
// PURE HANDLERS
// =============================================================================

#[test]
fn first_joiner_gets_empty_peer_list_only() {
    let c1 = Uuid::new_v4();
    let mut room = BoardRoom::new();

    let out = join(&mut room, BOARD, c1, "P1".into());

    assert_eq!(out.len(), 1);
    assert_eq!(out[0].to, vec![c1]);
    assert_eq!(out[0].frame.syscall, ALL_PEERS);
    assert!(peers_of(&out[0]).is_empty());
}

#[test]
fn second_joiner_learns_first_and_first_is_told() {
    let (c1, c2) = (Uuid::new_v4(), Uuid::new_v4());
    let mut room = BoardRoom::new();
    join(&mut room, BOARD, c1, "P1".into());

    let out = join(&mut room, BOARD, c2, "P2".into());

    assert_eq!(out.len(), 2);
    let announce = &out[0];
    assert_eq!(announce.to, vec![c1]);
    assert_eq!(announce.frame.syscall, USER_JOINED_VOICE);
    assert_eq!(announce.frame.str_field("socketId"), Some(c2.to_string().as_str()));
    assert_eq!(announce.frame.str_field("peerId"), Some("P2"));

    let reply = &out[1];
    assert_eq!(reply.to, vec![c2]);
    assert_eq!(peers_of(reply), HashSet::from(["P1".to_owned()]));
}

#[test]
fn rejoin_replaces_peer_id_and_excludes_self() {
    let (c1, c2) = (Uuid::new_v4(), Uuid::new_v4());
    let mut room = BoardRoom::new();
    join(&mut room, BOARD, c1, "P1".into());
    join(&mut room, BOARD, c2, "P2".into());

    let out = join(&mut room, BOARD, c2, "P2-new".into());

    assert_eq!(room.voice_count(), 2);
    assert_eq!(room.voice_peer(c2), Some("P2-new"));
    assert_eq!(peers_of(&out[1]), HashSet::from(["P1".to_owned()]));
}

#[test]
fn leave_announces_prior_peer_id_to_remaining() {
    let (c1, c2, c3) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
    let mut room = BoardRoom::new();
    join(&mut room, BOARD, c1, "P1".into());
    join(&mut room, BOARD, c2, "P2".into());
    join(&mut room, BOARD, c3, "P3".into());

    let out = leave(&mut room, BOARD, c2);

    assert_eq!(out.len(), 1);
    let mut to = out[0].to.clone();
    to.sort();
    let mut expected = vec![c1, c3];
    expected.sort();
    assert_eq!(to, expected);
    assert_eq!(out[0].frame.syscall, USER_LEFT_VOICE);
    assert_eq!(out[0].frame.str_field("peerId"), Some("P2"));
    assert_eq!(room.voice_count(), 2);
}

#[test]
fn leave_without_entry_is_noop() {
    let (c1, stranger) = (Uuid::new_v4(), Uuid::new_v4());
    let mut room = BoardRoom::new();
    join(&mut room, BOARD, c1, "P1".into());

    assert!(leave(&mut room, BOARD, stranger).is_empty());
    assert_eq!(room.voice_count(), 1);
}

#[test]
fn last_leaver_sends_nothing() {
    let c1 = Uuid::new_v4();
    let mut room = BoardRoom::new();
    join(&mut room, BOARD, c1, "P1".into());
    assert!(leave(&mut room, BOARD, c1).is_empty());
    assert_eq!(room.voice_count(), 0);
}

#[test]
fn membership_tracks_join_leave_sequence() {
    let conns: Vec<Uuid> = (0..4).map(|_| Uuid::new_v4()).collect();
    let mut room = BoardRoom::new();
    for (i, c) in conns.iter().enumerate() {
        join(&mut room, BOARD, *c, format!("P{i}"));
    }
    leave(&mut room, BOARD, conns[1]);
    leave(&mut room, BOARD, conns[3]);
    join(&mut room, BOARD, conns[1], "P1-again".into());

    let out = join(&mut room, BOARD, conns[0], "P0".into());
    assert_eq!(
        peers_of(out.last().expect("reply")),
        HashSet::from(["P1-again".to_owned(), "P2".to_owned()])
    );
    assert_eq!(room.voice_count(), 3);
}

#[test]
fn voice_channel_is_independent_of_drawing() {
    let (drawer, talker) = (Uuid::new_v4(), Uuid::new_v4());
    let mut room = BoardRoom::new();
    room.subscribe(drawer);

    let out = join(&mut room, BOARD, talker, "P".into());

    assert_eq!(out.len(), 1, "drawing members hear nothing");
    assert!(!room.is_member(talker));
}

// =============================================================================
// ASYNC WRAPPERS
// =============================================================================

#[tokio::test]
async fn join_voice_delivers_both_directions() {
    let state = test_app_state();
    let (c1, mut rx1) = connect(&state);
    let (c2, mut rx2) = connect(&state);

    join_voice(&state, BOARD, c1, "P1".into()).await;
    assert_eq!(recv_frame(&mut rx1).await.syscall, ALL_PEERS);

    join_voice(&state, BOARD, c2, "P2".into()).await;

    let announce = recv_frame(&mut rx1).await;
    assert_eq!(announce.syscall, USER_JOINED_VOICE);
    assert_eq!(announce.str_field("peerId"), Some("P2"));

    let reply = recv_frame(&mut rx2).await;
    assert_eq!(reply.syscall, ALL_PEERS);
    assert_eq!(reply.data.get("peers"), Some(&json!(["P1"])));
}

#[tokio::test]
async fn leave_voice_on_unknown_board_is_noop() {
    let state = test_app_state();
    let (c1, mut rx1) = connect(&state);
    leave_voice(&state, "no-such-board", c1).await;
    assert_eq!(state.rooms.len().await, 0);
    assert_no_frame(&mut rx1).await;
}

#[tokio::test]
async fn leave_voice_notifies_remaining() {
    let state = test_app_state();
    let (c1, mut rx1) = connect(&state);
    let (c2, mut rx2) = connect(&state);
    join_voice(&state, BOARD, c1, "P1".into()).await;
    join_voice(&state, BOARD, c2, "P2".into()).await;
    drain(&mut rx1);
    drain(&mut rx2);

    leave_voice(&state, BOARD, c2).await;

    let left = recv_frame(&mut rx1).await;
    assert_eq!(left.syscall, USER_LEFT_VOICE);
    assert_eq!(left.str_field("socketId"), Some(c2.to_string().as_str()));
    assert_no_frame(&mut rx2).await;

    // Second leave is silent.
    leave_voice(&state, BOARD, c2).await;
    assert_no_frame(&mut rx1).await;
}
