//! Trade engine invariants under repetition and concurrency

mod common;

use common::{has_error, TradeHarness};
use tradepost::config::TradeConfig;
use tradepost::trade::{ClientMessage, ServerMessage};

#[tokio::test]
async fn test_terminated_session_is_unreachable() {
    let h = TradeHarness::new();
    let mut alice = h.online_user("alice");
    let mut bob = h.online_user("bob");
    let sword = h.item("Sword", true);
    h.grant(alice.user_id, sword, 1);
    let session_id = h.open_session(&mut alice, &mut bob).await;

    h.add(&alice, &session_id, sword, 1).await;
    h.confirm(&alice, &session_id).await;
    h.confirm(&bob, &session_id).await;
    alice.drain();
    bob.drain();

    h.confirm(&alice, &session_id).await;
    h.send(
        &bob,
        ClientMessage::Cancel {
            session_id: session_id.clone(),
        },
    )
    .await;

    for client in [&mut alice, &mut bob] {
        match client.drain().as_slice() {
            [ServerMessage::Error { message }] => assert!(message.contains("not found")),
            other => panic!("expected a single not-found error, got {:?}", other),
        }
    }
    assert_eq!(h.storage.list_trades(None, 10).unwrap().len(), 1);
    assert_eq!(h.quantity(bob.user_id, sword), 1);
}

#[tokio::test]
async fn test_repeat_cancel_is_not_found() {
    let h = TradeHarness::new();
    let mut alice = h.online_user("alice");
    let mut bob = h.online_user("bob");
    let session_id = h.open_session(&mut alice, &mut bob).await;

    let cancel = || ClientMessage::Cancel {
        session_id: session_id.clone(),
    };
    h.send(&alice, cancel()).await;
    assert!(!has_error(&alice.drain()));

    h.send(&alice, cancel()).await;
    assert!(has_error(&alice.drain()));
    assert!(bob
        .drain()
        .iter()
        .all(|m| matches!(m, ServerMessage::SessionCancelled { .. })));
}

#[tokio::test]
async fn test_identical_adds_produce_two_lines() {
    let h = TradeHarness::new();
    let mut alice = h.online_user("alice");
    let mut bob = h.online_user("bob");
    let sword = h.item("Sword", true);
    h.grant(alice.user_id, sword, 4);
    let session_id = h.open_session(&mut alice, &mut bob).await;

    h.add(&alice, &session_id, sword, 2).await;
    h.add(&alice, &session_id, sword, 2).await;

    let view = bob.last_update().unwrap();
    assert_eq!(view.partner_items.len(), 2);
    assert!(view.partner_items.iter().all(|i| i.quantity == 2));

    // A third line would exceed the 4 owned in total.
    h.add(&alice, &session_id, sword, 1).await;
    assert!(has_error(&alice.drain()));
    assert_eq!(
        h.engine()
            .snapshot(&session_id)
            .await
            .unwrap()
            .initiator_items
            .len(),
        2
    );
}

#[tokio::test]
async fn test_merge_policy_collapses_identical_adds() {
    let h = TradeHarness::with_config(TradeConfig {
        merge_duplicate_items: true,
        ..TradeConfig::default()
    });
    let mut alice = h.online_user("alice");
    let mut bob = h.online_user("bob");
    let sword = h.item("Sword", true);
    h.grant(alice.user_id, sword, 4);
    let session_id = h.open_session(&mut alice, &mut bob).await;

    h.add(&alice, &session_id, sword, 2).await;
    h.add(&alice, &session_id, sword, 2).await;

    let view = bob.last_update().unwrap();
    assert_eq!(view.partner_items.len(), 1);
    assert_eq!(view.partner_items[0].quantity, 4);
}

#[tokio::test]
async fn test_settlement_conserves_quantities() {
    let h = TradeHarness::new();
    let mut alice = h.online_user("alice");
    let mut bob = h.online_user("bob");
    let gem = h.item("Gem", true);
    let ore = h.item("Ore", true);
    h.grant(alice.user_id, gem, 7);
    h.grant(bob.user_id, gem, 2);
    h.grant(bob.user_id, ore, 3);
    let session_id = h.open_session(&mut alice, &mut bob).await;

    let (a, b) = (alice.user_id, bob.user_id);
    let total = |item| h.quantity(a, item) + h.quantity(b, item);
    let (gems_before, ore_before) = (total(gem), total(ore));

    h.add(&alice, &session_id, gem, 3).await;
    h.add(&alice, &session_id, gem, 4).await;
    h.add(&bob, &session_id, gem, 2).await;
    h.add(&bob, &session_id, ore, 3).await;
    h.confirm(&alice, &session_id).await;
    h.confirm(&bob, &session_id).await;

    assert!(matches!(
        alice.drain().last(),
        Some(ServerMessage::SessionCompleted { .. })
    ));
    assert_eq!(total(gem), gems_before);
    assert_eq!(total(ore), ore_before);
    assert_eq!(h.quantity(alice.user_id, gem), 2);
    assert_eq!(h.quantity(bob.user_id, gem), 7);
    assert_eq!(h.quantity(alice.user_id, ore), 3);
    for user in [alice.user_id, bob.user_id] {
        assert!(h
            .storage
            .inventory(user)
            .unwrap()
            .iter()
            .all(|e| e.quantity > 0));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_same_item_in_two_sessions_settles_once() {
    let h = TradeHarness::new();
    let mut alice = h.online_user("alice");
    let mut bob = h.online_user("bob");
    let mut carol = h.online_user("carol");
    let relic = h.item("Relic", true);
    h.grant(alice.user_id, relic, 1);

    let with_bob = h.open_session(&mut alice, &mut bob).await;
    let with_carol = h.open_session(&mut alice, &mut carol).await;
    h.add(&alice, &with_bob, relic, 1).await;
    h.add(&alice, &with_carol, relic, 1).await;
    h.confirm(&bob, &with_bob).await;
    h.confirm(&carol, &with_carol).await;

    tokio::join!(
        h.confirm(&alice, &with_bob),
        h.confirm(&alice, &with_carol)
    );

    let completed = |msgs: Vec<ServerMessage>| {
        msgs.iter()
            .any(|m| matches!(m, ServerMessage::SessionCompleted { .. }))
    };
    let failed = |msgs: Vec<ServerMessage>| {
        msgs.iter()
            .any(|m| matches!(m, ServerMessage::SessionFailed { .. }))
    };
    let bob_msgs = bob.drain();
    let carol_msgs = carol.drain();
    let bob_won = completed(bob_msgs.clone());
    let carol_won = completed(carol_msgs.clone());
    assert!(bob_won ^ carol_won, "exactly one settlement must succeed");
    assert!(if bob_won {
        failed(carol_msgs)
    } else {
        failed(bob_msgs)
    });

    assert_eq!(h.quantity(alice.user_id, relic), 0);
    assert_eq!(
        h.quantity(bob.user_id, relic) + h.quantity(carol.user_id, relic),
        1
    );
    assert_eq!(h.storage.list_trades(None, 10).unwrap().len(), 1);
    assert_eq!(h.engine().session_count(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_adds_on_one_session_both_apply() {
    let h = TradeHarness::new();
    let mut alice = h.online_user("alice");
    let mut bob = h.online_user("bob");
    let sword = h.item("Sword", true);
    let shield = h.item("Shield", true);
    h.grant(alice.user_id, sword, 1);
    h.grant(bob.user_id, shield, 1);
    let session_id = h.open_session(&mut alice, &mut bob).await;
    h.confirm(&alice, &session_id).await;

    tokio::join!(
        h.add(&alice, &session_id, sword, 1),
        h.add(&bob, &session_id, shield, 1)
    );

    let session = h.engine().snapshot(&session_id).await.unwrap();
    assert_eq!(session.initiator_items.len(), 1);
    assert_eq!(session.target_items.len(), 1);
    assert!(!session.initiator_confirmed && !session.target_confirmed);
}

#[tokio::test]
async fn test_reconnect_keeps_session_and_routes_to_new_connection() {
    let h = TradeHarness::new();
    let mut alice = h.online_user("alice");
    let mut bob = h.online_user("bob");
    let session_id = h.open_session(&mut alice, &mut bob).await;

    let mut alice_again = h.connect(alice.user_id, "alice");
    h.dispatcher
        .disconnect(alice.user_id, alice.connection)
        .await;
    assert!(h.engine().snapshot(&session_id).await.is_some());

    h.confirm(&bob, &session_id).await;
    let view = alice_again.last_update().unwrap();
    assert!(view.partner_confirmed);
    assert!(alice.drain().is_empty());
}

#[tokio::test]
async fn test_pending_invite_expires() {
    let h = TradeHarness::with_config(TradeConfig {
        pending_ttl_seconds: 30,
        ..TradeConfig::default()
    });
    let mut alice = h.online_user("alice");
    let mut bob = h.online_user("bob");
    h.send(
        &alice,
        ClientMessage::Invite {
            target_user_id: bob.user_id,
        },
    )
    .await;
    let session_id = bob.received_invite().unwrap();
    alice.drain();

    let later = chrono::Utc::now() + chrono::Duration::seconds(31);
    assert_eq!(h.engine().evict_stale(later).await, 1);

    let expected = ServerMessage::SessionCancelled {
        session_id: session_id.clone(),
        by_user: None,
    };
    assert_eq!(alice.drain(), vec![expected.clone()]);
    assert_eq!(bob.drain(), vec![expected]);

    h.send(&bob, ClientMessage::Accept { session_id }).await;
    assert!(has_error(&bob.drain()));
}

#[tokio::test]
async fn test_overflowing_add_is_rejected_without_state_change() {
    let h = TradeHarness::with_config(TradeConfig {
        merge_duplicate_items: true,
        ..TradeConfig::default()
    });
    let mut alice = h.online_user("alice");
    let mut bob = h.online_user("bob");
    let sword = h.item("Sword", true);
    h.grant(alice.user_id, sword, 3);
    let session_id = h.open_session(&mut alice, &mut bob).await;

    h.add(&alice, &session_id, sword, 1).await;
    h.confirm(&bob, &session_id).await;
    alice.drain();
    bob.drain();

    h.add(&alice, &session_id, sword, i64::MAX).await;
    assert!(matches!(
        alice.drain().as_slice(),
        [ServerMessage::Error { .. }]
    ));
    assert!(bob.drain().is_empty());

    let session = h.engine().snapshot(&session_id).await.unwrap();
    assert_eq!(session.initiator_items.len(), 1);
    assert_eq!(session.initiator_items[0].quantity, 1);
    assert!(session.target_confirmed);
}
