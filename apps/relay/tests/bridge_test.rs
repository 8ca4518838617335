mod common;

use relay::gateway::dispatch;

// ---------------------------------------------------------------------------
// Inbound store traffic
// ---------------------------------------------------------------------------

#[tokio::test]
async fn inbound_for_unknown_resource_is_discarded() {
    let (state, bridge) = common::test_state();

    bridge.inject(
        "status:/acct/nobody",
        r#"{"op":"set","to":"status:/acct/nobody","key":"a","value":1}"#,
    );

    common::settle().await;
    assert!(state.registry.get("status:/acct/nobody").is_none());
}

#[tokio::test]
async fn corrupted_inbound_payload_is_discarded_without_mutation() {
    let (state, bridge) = common::test_state();
    let (client, mut rx) = common::test_client("a");

    dispatch::handle_message(
        &state,
        &client,
        r#"{"op":"subscribe","to":"status:/acct/ticker"}"#,
    )
    .await;
    common::settle().await;

    bridge.inject("status:/acct/ticker", "{definitely not json");
    common::settle().await;

    assert!(common::next_frame(&mut rx).is_none(), "nothing fanned out");

    dispatch::handle_message(&state, &client, r#"{"op":"get","to":"status:/acct/ticker"}"#)
        .await;
    let reply = common::next_frame(&mut rx).expect("get reply");
    assert_eq!(reply["value"], serde_json::json!({}), "state untouched");
}

// ---------------------------------------------------------------------------
// Echo-path semantics
// ---------------------------------------------------------------------------

#[tokio::test]
async fn status_set_round_trips_through_the_echo() {
    let (state, _bridge) = common::test_state();
    let (client, mut rx) = common::test_client("a");

    dispatch::handle_message(
        &state,
        &client,
        r#"{"op":"subscribe","to":"status:/acct/ticker"}"#,
    )
    .await;
    common::wait_until("subscribe ack", || {
        state
            .registry
            .get("status:/acct/ticker")
            .is_some_and(|r| r.is_acknowledged())
    })
    .await;

    dispatch::handle_message(
        &state,
        &client,
        r#"{"op":"set","to":"status:/acct/ticker","key":"alice","value":"away","ack":true}"#,
    )
    .await;

    common::wait_until("ack and fanout frames", || rx.len() >= 2).await;
    let ack = common::next_frame(&mut rx).unwrap();
    assert_eq!(
        ack,
        serde_json::json!({"op": "ack", "to": "status:/acct/ticker", "value": "set"})
    );
    let fanned = common::next_frame(&mut rx).unwrap();
    assert_eq!(fanned["op"], "set");
    assert_eq!(fanned["key"], "alice");
    assert_eq!(fanned["value"], "away");

    dispatch::handle_message(&state, &client, r#"{"op":"get","to":"status:/acct/ticker"}"#)
        .await;
    let reply = common::next_frame(&mut rx).expect("get reply");
    assert_eq!(reply["value"], serde_json::json!({"alice": "away"}));
}

#[tokio::test]
async fn message_publish_fans_out_and_buffers_history() {
    let (state, _bridge) = common::test_state();
    let (alice, mut alice_rx) = common::test_client("alice");
    let (bob, mut bob_rx) = common::test_client("bob");

    dispatch::handle_message(
        &state,
        &alice,
        r#"{"op":"subscribe","to":"message:/acct/chat"}"#,
    )
    .await;
    common::wait_until("subscribe ack", || {
        state
            .registry
            .get("message:/acct/chat")
            .is_some_and(|r| r.is_acknowledged())
    })
    .await;

    dispatch::handle_message(
        &state,
        &bob,
        r#"{"op":"publish","to":"message:/acct/chat","message":"hello","ack":true}"#,
    )
    .await;

    let ack = common::next_frame(&mut bob_rx).expect("publish ack");
    assert_eq!(ack["op"], "ack");
    assert_eq!(ack["value"], "publish");

    common::wait_until("fanout to alice", || alice_rx.len() >= 1).await;
    let fanned = common::next_frame(&mut alice_rx).unwrap();
    assert_eq!(fanned["op"], "publish");
    assert_eq!(fanned["message"], "hello");
    assert!(fanned["id"].is_i64(), "server stamped an id");
    assert!(common::next_frame(&mut bob_rx).is_none(), "bob never subscribed");

    // A later sync replays the buffered entry.
    dispatch::handle_message(&state, &bob, r#"{"op":"sync","to":"message:/acct/chat"}"#)
        .await;
    let sync = common::next_frame(&mut bob_rx).expect("sync reply");
    assert_eq!(sync["value"].as_array().unwrap().len(), 1);
    assert_eq!(sync["value"][0]["message"], "hello");
}

#[tokio::test]
async fn presence_tracks_online_and_implicit_offline() {
    let (state, _bridge) = common::test_state();
    let (alice, mut alice_rx) = common::test_client("alice");
    let (bob, mut bob_rx) = common::test_client("bob");

    dispatch::handle_message(
        &state,
        &bob,
        r#"{"op":"subscribe","to":"presence:/acct/room"}"#,
    )
    .await;
    common::wait_until("subscribe ack", || {
        state
            .registry
            .get("presence:/acct/room")
            .is_some_and(|r| r.is_acknowledged())
    })
    .await;

    dispatch::handle_message(
        &state,
        &alice,
        r#"{"op":"set","to":"presence:/acct/room","key":"alice","value":"online"}"#,
    )
    .await;

    common::wait_until("online fanout", || bob_rx.len() >= 1).await;
    let online = common::next_frame(&mut bob_rx).unwrap();
    assert_eq!(online["key"], "alice");
    assert_eq!(online["value"], "online");

    dispatch::handle_message(&state, &bob, r#"{"op":"get","to":"presence:/acct/room"}"#)
        .await;
    let reply = common::next_frame(&mut bob_rx).expect("get reply");
    assert_eq!(reply["value"], serde_json::json!({"alice": "online"}));

    // Alice's connection goes away: her declared identity goes offline.
    let resource = state.registry.get("presence:/acct/room").unwrap();
    resource.unsubscribe(&alice, false).await;

    common::wait_until("offline fanout", || bob_rx.len() >= 1).await;
    let offline = common::next_frame(&mut bob_rx).unwrap();
    assert_eq!(offline["key"], "alice");
    assert_eq!(offline["value"], "offline");

    dispatch::handle_message(&state, &bob, r#"{"op":"get","to":"presence:/acct/room"}"#)
        .await;
    let reply = common::next_frame(&mut bob_rx).expect("get reply");
    assert_eq!(reply["value"], serde_json::json!({}));
    assert!(common::next_frame(&mut alice_rx).is_none());
}
