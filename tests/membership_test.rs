//! Membership and connection lifecycle: connect-time subscription, explicit
//! join/leave, and the immediate cut-off of revoked members.

mod common;

use common::*;
use parlor::rooms::{self, membership, msg, ws};
use parlor::AppError;

#[tokio::test]
async fn connecting_subscribes_to_every_room_of_the_user() {
    let state = test_state().await;
    let alice = seed_user(&state, "alice").await;
    let bob = seed_user(&state, "bob").await;
    let room_a = seed_room(&state, alice, "general", false).await;
    let room_b = seed_room(&state, alice, "random", false).await;
    membership::add_member(&state.db_pool, bob, room_a, false)
        .await
        .unwrap();
    membership::add_member(&state.db_pool, bob, room_b, false)
        .await
        .unwrap();

    let (_conn, mut bob_rx) = connect(&state, bob).await;

    msg::send_message(&state, alice, room_a, "in general").await.unwrap();
    msg::send_message(&state, alice, room_b, "in random").await.unwrap();

    assert_eq!(drain(&mut bob_rx).len(), 2);
}

#[tokio::test]
async fn a_revoked_member_stops_receiving_immediately() {
    let state = test_state().await;
    let alice = seed_user(&state, "alice").await;
    let bob = seed_user(&state, "bob").await;
    let room = seed_room(&state, alice, "general", false).await;
    membership::add_member(&state.db_pool, bob, room, false)
        .await
        .unwrap();

    let (_a, mut alice_rx) = connect(&state, alice).await;
    let (_b, mut bob_rx) = connect(&state, bob).await;

    membership::remove_member(&state, bob, room).await.unwrap();
    msg::send_message(&state, alice, room, "after the kick")
        .await
        .unwrap();

    // bob's subscriptions were cut before the user.left broadcast
    assert!(drain(&mut bob_rx).is_empty());

    let alice_events = drain(&mut alice_rx);
    assert_eq!(alice_events.len(), 1);
    assert_eq!(alice_events[0]["event"], "user.left");
    assert_eq!(alice_events[0]["user_id"], bob.to_string());
}

#[tokio::test]
async fn joining_subscribes_all_live_connections() {
    let state = test_state().await;
    let alice = seed_user(&state, "alice").await;
    let bob = seed_user(&state, "bob").await;
    let room = seed_room(&state, alice, "general", false).await;

    let (_a, mut alice_rx) = connect(&state, alice).await;
    // bob connects on two devices before being a member of anything
    let (_b1, mut bob_rx1) = connect(&state, bob).await;
    let (_b2, mut bob_rx2) = connect(&state, bob).await;

    rooms::join_room(&state, bob, room).await.unwrap();
    assert!(membership::is_member(&state.db_pool, bob, room).await.unwrap());

    let alice_events = drain(&mut alice_rx);
    assert_eq!(alice_events.len(), 1);
    assert_eq!(alice_events[0]["event"], "user.joined");
    assert_eq!(alice_events[0]["username"], "bob");

    msg::send_message(&state, alice, room, "welcome").await.unwrap();
    assert_eq!(drain(&mut bob_rx1).pop().unwrap()["event"], "message.received");
    assert_eq!(drain(&mut bob_rx2).pop().unwrap()["event"], "message.received");
}

#[tokio::test]
async fn a_private_room_cannot_be_self_joined() {
    let state = test_state().await;
    let alice = seed_user(&state, "alice").await;
    let bob = seed_user(&state, "bob").await;
    let room = seed_room(&state, alice, "secret", true).await;

    let result = rooms::join_room(&state, bob, room).await;
    assert!(matches!(result, Err(AppError::Forbidden)));
    assert!(!membership::is_member(&state.db_pool, bob, room).await.unwrap());
}

#[tokio::test]
async fn leaving_a_room_you_are_not_in_is_forbidden() {
    let state = test_state().await;
    let alice = seed_user(&state, "alice").await;
    let bob = seed_user(&state, "bob").await;
    let room = seed_room(&state, alice, "general", false).await;

    let result = rooms::leave_room(&state, bob, room).await;
    assert!(matches!(result, Err(AppError::Forbidden)));
}

#[tokio::test]
async fn a_mere_disconnect_broadcasts_nothing() {
    let state = test_state().await;
    let alice = seed_user(&state, "alice").await;
    let bob = seed_user(&state, "bob").await;
    let room = seed_room(&state, alice, "general", false).await;
    membership::add_member(&state.db_pool, bob, room, false)
        .await
        .unwrap();

    let (_a, mut alice_rx) = connect(&state, alice).await;
    let (bob_conn, _bob_rx) = connect(&state, bob).await;

    ws::detach_connection(&state, bob, bob_conn).await;

    assert!(drain(&mut alice_rx).is_empty());
    // and bob no longer receives anything either
    msg::send_message(&state, alice, room, "anyone here?")
        .await
        .unwrap();
    assert_eq!(state.router.subscriber_count(room), 1);
}
