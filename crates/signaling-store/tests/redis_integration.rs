//! Live-store integration tests.
//!
//! These run against a real Redis and are ignored by default:
//!
//! ```text
//! REDIS_URL=redis://127.0.0.1:6379 cargo test -- --ignored
//! ```
//!
//! Each test mints fresh random identifiers, so tests are independent
//! and safe to run against a shared instance.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::collections::HashMap;
use std::time::Duration;

use common::tokens::generate_token;
use signaling_store::callstate::{CallState, CallStateEvent};
use signaling_store::config::StoreConfig;
use signaling_store::store::Storage;
use signaling_store::types::{
    CallRecord, CallUrl, CallUrlPatch, Room, RoomParticipant, SimplePushUrls,
};
use signaling_store::StoreError;

fn test_config() -> StoreConfig {
    let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());
    let vars = HashMap::from([("REDIS_URL".to_string(), url)]);
    StoreConfig::from_vars(&vars).expect("config should load")
}

async fn storage() -> Storage {
    // RUST_LOG=debug surfaces the store's reconciliation and
    // admission traces while debugging a failure.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();

    Storage::connect(test_config())
        .await
        .expect("redis should be reachable")
}

fn unique(prefix: &str) -> String {
    format!("{prefix}-{}", generate_token(12).unwrap())
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

fn test_call_url(user_mac: &str, timestamp: i64, expires_at: i64) -> CallUrl {
    CallUrl {
        call_url_id: unique("url"),
        user_mac: user_mac.to_string(),
        caller_id: None,
        issuer: None,
        timestamp,
        expires_at,
    }
}

fn test_room(token: &str, owner: &str, max_size: u32) -> Room {
    let now = now();
    Room {
        room_token: token.to_string(),
        room_owner_hmac: owner.to_string(),
        room_name: "UX planning".to_string(),
        max_size,
        session_id: "2_MX4".to_string(),
        api_key: "4468asd".to_string(),
        creation_time: now,
        update_time: now,
        expires_at: now + 3600,
    }
}

fn test_participant(hawk_id: &str, cap: u32) -> RoomParticipant {
    RoomParticipant {
        hawk_id_hmac: hawk_id.to_string(),
        display_name: "Alexis".to_string(),
        client_max_size: cap,
        user_mac: None,
    }
}

#[tokio::test]
#[ignore = "requires a running Redis"]
async fn ping_round_trips() {
    storage().await.ping().await.expect("ping should succeed");
}

#[tokio::test]
#[ignore = "requires a running Redis"]
async fn call_url_listing_reconciles_expired_entries() {
    let store = storage().await;
    let user = unique("user");

    let live = test_call_url(&user, now(), now() + 3600);
    let doomed = test_call_url(&user, now() - 10, now() + 1);
    store.add_call_url(&live).await.unwrap();
    store.add_call_url(&doomed).await.unwrap();

    let urls = store.user_call_urls(&user).await.unwrap();
    assert_eq!(urls.len(), 2);
    // Oldest first.
    assert_eq!(urls.first().unwrap().call_url_id, doomed.call_url_id);

    tokio::time::sleep(Duration::from_millis(1500)).await;

    // The doomed entry has expired; listing drops it and prunes the
    // index member as a side effect.
    let urls = store.user_call_urls(&user).await.unwrap();
    assert_eq!(urls.len(), 1);
    assert_eq!(urls.first().unwrap().call_url_id, live.call_url_id);
}

#[tokio::test]
#[ignore = "requires a running Redis"]
async fn weakest_client_shrinks_the_room() {
    let store = storage().await;
    let token = unique("room");
    let room = test_room(&token, &unique("owner"), 5);
    store.set_room(&room).await.unwrap();

    // Two cap-4 clients are admitted into the cap-5 room.
    for i in 0u32..2 {
        let count = store
            .add_room_participant(&token, 5, &test_participant(&format!("client-{i}"), 4), 300)
            .await
            .unwrap();
        assert_eq!(count, i + 1);
    }

    // A cap-2 client cannot support the 2 already present.
    let err = store
        .add_room_participant(&token, 5, &test_participant("weak", 2), 300)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        StoreError::ClientCapacityTooLow {
            client_max_size: 2,
            active_count: 2,
        }
    ));

    // A third cap-4 client still fits (effective capacity 4).
    let count = store
        .add_room_participant(&token, 5, &test_participant("client-2", 4), 300)
        .await
        .unwrap();
    assert_eq!(count, 3);
}

#[tokio::test]
#[ignore = "requires a running Redis"]
async fn full_room_rejects_with_effective_capacity() {
    let store = storage().await;
    let token = unique("room");
    let room = test_room(&token, &unique("owner"), 2);
    store.set_room(&room).await.unwrap();

    for i in 0..2 {
        store
            .add_room_participant(&token, 2, &test_participant(&format!("client-{i}"), 10), 300)
            .await
            .unwrap();
    }

    let err = store
        .add_room_participant(&token, 2, &test_participant("late", 10), 300)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        StoreError::RoomFull {
            effective_capacity: 2,
        }
    ));
}

#[tokio::test]
#[ignore = "requires a running Redis"]
async fn rejoin_does_not_count_against_itself() {
    let store = storage().await;
    let token = unique("room");
    store
        .set_room(&test_room(&token, &unique("owner"), 2))
        .await
        .unwrap();

    store
        .add_room_participant(&token, 2, &test_participant("a", 10), 300)
        .await
        .unwrap();
    store
        .add_room_participant(&token, 2, &test_participant("b", 10), 300)
        .await
        .unwrap();

    // The room is full, but "a" rejoining replaces its own entry.
    let count = store
        .add_room_participant(&token, 2, &test_participant("a", 10), 300)
        .await
        .unwrap();
    assert_eq!(count, 2);
}

#[tokio::test]
#[ignore = "requires a running Redis"]
async fn lapsed_participant_must_rejoin() {
    let store = storage().await;
    let token = unique("room");
    store
        .set_room(&test_room(&token, &unique("owner"), 5))
        .await
        .unwrap();

    store
        .add_room_participant(&token, 5, &test_participant("brief", 4), 1)
        .await
        .unwrap();
    assert!(store
        .touch_room_participant(&token, "brief", 300)
        .await
        .unwrap());

    tokio::time::sleep(Duration::from_millis(1500)).await;

    // The presence window lapsed: refresh reports false, the access
    // token is gone, and the participant no longer lists.
    assert!(!store
        .touch_room_participant(&token, "brief", 300)
        .await
        .unwrap());
    assert!(!store
        .is_room_access_token_valid(&token, "brief")
        .await
        .unwrap());
    assert!(store.room_participants(&token).await.unwrap().is_empty());
}

#[tokio::test]
#[ignore = "requires a running Redis"]
async fn updating_a_call_url_merges_and_restamps() {
    let store = storage().await;
    let user = unique("user");
    let url = test_call_url(&user, now(), now() + 3600);
    store.add_call_url(&url).await.unwrap();

    let new_expiry = now() + 7200;
    let updated = store
        .update_call_url(
            &user,
            &url.call_url_id,
            CallUrlPatch {
                caller_id: None,
                issuer: Some("UX planning".to_string()),
                expires_at: Some(new_expiry),
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.issuer.as_deref(), Some("UX planning"));
    assert_eq!(updated.expires_at, new_expiry);
    assert_eq!(updated.timestamp, url.timestamp);

    let fetched = store.call_url(&url.call_url_id).await.unwrap().unwrap();
    assert_eq!(fetched, updated);

    // A url outside the owner's index is not found.
    let err = store
        .update_call_url(&unique("other"), &url.call_url_id, CallUrlPatch::default())
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::NotFound("call url")));
}

#[tokio::test]
#[ignore = "requires a running Redis"]
async fn leaving_twice_is_idempotent() {
    let store = storage().await;
    let token = unique("room");
    store
        .set_room(&test_room(&token, &unique("owner"), 5))
        .await
        .unwrap();

    store
        .add_room_participant(&token, 5, &test_participant("solo", 4), 300)
        .await
        .unwrap();
    store.remove_room_participant(&token, "solo").await.unwrap();

    // The second leave finds nothing to remove and still succeeds.
    store.remove_room_participant(&token, "solo").await.unwrap();
    assert!(store.room_participants(&token).await.unwrap().is_empty());
    assert!(!store
        .is_room_access_token_valid(&token, "solo")
        .await
        .unwrap());
}

#[tokio::test]
#[ignore = "requires a running Redis"]
async fn capacity_recovers_when_the_weak_client_leaves() {
    let store = storage().await;
    let token = unique("room");
    store
        .set_room(&test_room(&token, &unique("owner"), 5))
        .await
        .unwrap();

    // A (cap 5) and B (cap 3) join; B shrinks the room to 3.
    store
        .add_room_participant(&token, 5, &test_participant("a", 5), 300)
        .await
        .unwrap();
    store
        .add_room_participant(&token, 5, &test_participant("b", 3), 300)
        .await
        .unwrap();

    // A third cap-5 client still fits (effective 3, active 2).
    let count = store
        .add_room_participant(&token, 5, &test_participant("c", 5), 300)
        .await
        .unwrap();
    assert_eq!(count, 3);

    // At 3 active the effective cap of 3 is reached.
    let err = store
        .add_room_participant(&token, 5, &test_participant("d", 5), 300)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        StoreError::RoomFull {
            effective_capacity: 3,
        }
    ));

    // B leaving lifts the cap back to min(5, 5, 5) = 5.
    store.remove_room_participant(&token, "b").await.unwrap();
    let count = store
        .add_room_participant(&token, 5, &test_participant("d", 5), 300)
        .await
        .unwrap();
    assert_eq!(count, 3);
}

#[tokio::test]
#[ignore = "requires a running Redis"]
async fn state_cannot_outlive_the_call_record() {
    // A one-second call duration so the record expires quickly.
    let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());
    let vars = HashMap::from([
        ("REDIS_URL".to_string(), url),
        ("CALL_DURATION_SECONDS".to_string(), "1".to_string()),
    ]);
    let store = Storage::connect(StoreConfig::from_vars(&vars).unwrap())
        .await
        .expect("redis should be reachable");

    let call_id = unique("call");
    let record = CallRecord {
        call_id: call_id.clone(),
        caller_id: "caller@example.com".to_string(),
        user_mac: unique("user"),
        session_id: "2_MX4".to_string(),
        callee_token: "tok".to_string(),
        timestamp: now(),
    };
    store.add_call(&record).await.unwrap();
    store
        .advance_call_state(&call_id, CallStateEvent::Init, None)
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(1500)).await;

    // The record has expired: an inherited-TTL advance is refused
    // instead of writing a state hash with no expiry.
    let err = store
        .advance_call_state(&call_id, CallStateEvent::InitCaller, None)
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::NotFound("call")));
    assert_eq!(store.call_state(&call_id).await.unwrap(), None);
    assert_eq!(store.call_state_ttl(&call_id).await.unwrap(), -1);
}

#[tokio::test]
#[ignore = "requires a running Redis"]
async fn call_state_progresses_and_deduplicates() {
    let store = storage().await;
    let call_id = unique("call");
    let record = CallRecord {
        call_id: call_id.clone(),
        caller_id: "caller@example.com".to_string(),
        user_mac: unique("user"),
        session_id: "2_MX4".to_string(),
        callee_token: "tok".to_string(),
        timestamp: now(),
    };
    store.add_call(&record).await.unwrap();

    let state = store
        .advance_call_state(&call_id, CallStateEvent::Init, Some(90))
        .await
        .unwrap();
    assert_eq!(state, CallState::Init);

    // Reapplying the same event is a no-op.
    let state = store
        .advance_call_state(&call_id, CallStateEvent::Init, None)
        .await
        .unwrap();
    assert_eq!(state, CallState::Init);

    let expected = [
        (CallStateEvent::InitCaller, CallState::HalfInitiated),
        (CallStateEvent::InitCallee, CallState::Alerting),
        (CallStateEvent::Connecting, CallState::Connecting),
        (CallStateEvent::ConnectedCaller, CallState::HalfConnected),
        (CallStateEvent::ConnectedCallee, CallState::Connected),
    ];
    for (event, want) in expected {
        let state = store.advance_call_state(&call_id, event, None).await.unwrap();
        assert_eq!(state, want);
        assert_eq!(store.call_state(&call_id).await.unwrap(), Some(want));
    }

    // The state outlives termination only as the implicit
    // record-present reading.
    let state = store
        .advance_call_state(&call_id, CallStateEvent::Terminate, None)
        .await
        .unwrap();
    assert_eq!(state, CallState::Terminated);
    assert_eq!(
        store.call_state(&call_id).await.unwrap(),
        Some(CallState::Terminated)
    );

    assert!(store.delete_call(&call_id).await.unwrap());
    assert_eq!(store.call_state(&call_id).await.unwrap(), None);
}

#[tokio::test]
#[ignore = "requires a running Redis"]
async fn push_urls_deduplicate_across_devices() {
    let store = storage().await;
    let user = unique("user");

    let shared = "https://push.example.com/shared".to_string();
    store
        .set_push_subscription(
            &user,
            "device-a",
            &SimplePushUrls {
                calls: Some(shared.clone()),
                rooms: Some("https://push.example.com/rooms-a".to_string()),
            },
        )
        .await
        .unwrap();
    store
        .set_push_subscription(
            &user,
            "device-b",
            &SimplePushUrls {
                calls: Some(shared.clone()),
                rooms: None,
            },
        )
        .await
        .unwrap();

    let urls = store.push_urls(&user).await.unwrap();
    assert_eq!(urls.calls, vec![shared]);
    assert_eq!(urls.rooms.len(), 1);

    store
        .remove_push_subscription(&user, "device-a")
        .await
        .unwrap();
    let urls = store.push_urls(&user).await.unwrap();
    assert!(urls.rooms.is_empty());
}

#[tokio::test]
#[ignore = "requires a running Redis"]
async fn deleted_room_marker_is_visible_within_the_window() {
    let store = storage().await;
    let owner = unique("owner");
    let token = unique("room");
    store.set_room(&test_room(&token, &owner, 5)).await.unwrap();

    let room = store.delete_room(&token).await.unwrap();
    assert_eq!(room.room_token, token);
    assert!(store.room(&token).await.unwrap().is_none());

    let deleted = store.deleted_rooms(&owner, None).await.unwrap();
    assert_eq!(deleted, vec![token.clone()]);

    // A cutoff in the future hides the marker.
    let deleted = store.deleted_rooms(&owner, Some(now() + 10)).await.unwrap();
    assert!(deleted.is_empty());

    // Deleting an already-deleted room is not found.
    let err = store.delete_room(&token).await.unwrap_err();
    assert!(matches!(err, StoreError::NotFound("room")));
}

#[tokio::test]
#[ignore = "requires a running Redis"]
async fn touch_room_restamps_update_time_and_ttl() {
    let store = storage().await;
    let token = unique("room");
    let mut room = test_room(&token, &unique("owner"), 5);
    room.update_time = now() - 100;
    store.set_room(&room).await.unwrap();

    let touched = store.touch_room(&token).await.unwrap();
    assert!(touched.update_time > room.update_time);
    assert_eq!(touched.expires_at, room.expires_at);
}

#[tokio::test]
#[ignore = "requires a running Redis"]
async fn session_teardown_removes_all_associations() {
    let store = storage().await;
    let hawk_id = unique("hawk");

    store.set_session_key(&hawk_id, "secret-key").await.unwrap();
    store.set_user_id(&hawk_id, "encrypted-id").await.unwrap();

    let creds = store.session_credentials(&hawk_id).await.unwrap().unwrap();
    assert_eq!(creds.key, "secret-key");
    assert_eq!(creds.algorithm, "sha256");
    assert_eq!(
        store.user_id(&hawk_id).await.unwrap().as_deref(),
        Some("encrypted-id")
    );

    store.touch_session(&hawk_id).await.unwrap();
    store.delete_session(&hawk_id).await.unwrap();
    store.delete_user_id(&hawk_id).await.unwrap();

    assert!(store.session_credentials(&hawk_id).await.unwrap().is_none());
    assert!(store.user_id(&hawk_id).await.unwrap().is_none());
}
