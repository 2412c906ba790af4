//! Session bootstrap from every combination of cache, bootstrap payload
//! and server state.

#![allow(clippy::unwrap_used)]

use std::time::Duration;

use chrono::{TimeDelta, Utc};
use serde_json::{Value, json};

use commuter_client::cache::{self, keys};
use commuter_client::{BackgroundTask, SessionError, SessionEvent};
use commuter_core::{Commuter, PLACEHOLDER_NAME, ServiceAlert};
use commuter_integration_tests::{Failure, FakeApi, Harness, eventually, next_event, user};

// =============================================================================
// User and commuter resolution
// =============================================================================

#[tokio::test]
async fn test_empty_cache_loads_anonymous_session() {
    let harness = Harness::new();
    let session = harness.session(None);

    let state = session.load().await.unwrap();

    assert!(state.loaded);
    assert!(!state.is_logged_in);
    assert!(state.user.is_none());
    assert!(state.commuter.as_ref().unwrap().anonymous);
    assert!(state.plan.is_some());
    assert!(state.settings.is_empty());
    assert_eq!(FakeApi::count(&harness.api.find_calls), 0);
    assert!(harness.analytics.calls().is_empty());
}

#[tokio::test]
async fn test_bootstrap_user_fetches_commuter_from_server() {
    let harness = Harness::new();
    let user = user("dana");
    let mut stored = Commuter::for_user(&user);
    stored.given_name = Some("Dana".to_string());
    let stored = harness.api.insert(stored);

    let session = harness.session(Some(user.clone()));
    let state = session.load().await.unwrap();

    assert!(state.is_logged_in);
    assert_eq!(state.user.as_ref(), Some(&user));
    assert_eq!(state.commuter.as_ref(), Some(&stored));
    assert_eq!(FakeApi::count(&harness.api.find_calls), 1);

    eventually(|| harness.analytics.calls().len() == 1).await;
    let (user_id, traits) = harness.analytics.calls().remove(0);
    assert_eq!(user_id, user.user_id);
    assert_eq!(traits.get("email"), Some(&json!("dana@example.com")));
}

#[tokio::test]
async fn test_user_without_commuter_gets_placeholder_profile() {
    let harness = Harness::new();
    let session = harness.session(Some(user("eli")));

    let state = session.load().await.unwrap();
    let commuter = state.commuter.unwrap();

    assert!(!commuter.anonymous);
    assert!(commuter.id.is_none());
    assert_eq!(commuter.account.as_deref(), Some("acct-eli"));
    assert_eq!(commuter.given_name.as_deref(), Some(PLACEHOLDER_NAME));
    assert_eq!(commuter.surname.as_deref(), Some(PLACEHOLDER_NAME));
}

#[tokio::test]
async fn test_cached_anonymous_commuter_is_claimed_by_cached_user() {
    let harness = Harness::new();
    let mut commuter = Commuter::anonymous();
    commuter.opts.insert("from".to_string(), json!("Home"));
    cache::write(harness.cache.as_ref(), keys::USER, &user("fay")).await.unwrap();
    cache::write(harness.cache.as_ref(), keys::COMMUTER, &commuter).await.unwrap();

    let session = harness.session(None);
    let state = session.load().await.unwrap();

    assert!(state.is_logged_in);
    let loaded = state.commuter.unwrap();
    assert!(!loaded.anonymous);
    assert_eq!(loaded.opts.get("from"), Some(&json!("Home")));
    assert_eq!(FakeApi::count(&harness.api.find_calls), 0);
}

#[tokio::test]
async fn test_cached_commuter_without_user_stays_anonymous() {
    let harness = Harness::new();
    cache::write(harness.cache.as_ref(), keys::COMMUTER, &Commuter::anonymous())
        .await
        .unwrap();
    cache::write(harness.cache.as_ref(), keys::SESSION, &json!({ "mode": "TRANSIT,WALK" }))
        .await
        .unwrap();

    let state = harness.session(None).load().await.unwrap();

    assert!(!state.is_logged_in);
    assert!(state.commuter.unwrap().anonymous);
    assert_eq!(state.settings.get("mode"), Some(&json!("TRANSIT,WALK")));
}

#[tokio::test]
async fn test_malformed_cache_entries_are_ignored() {
    let harness = Harness::new();
    cache::write(harness.cache.as_ref(), keys::USER, &json!(42)).await.unwrap();
    cache::write(harness.cache.as_ref(), keys::COMMUTER, &Value::Null).await.unwrap();

    let state = harness.session(None).load().await.unwrap();

    assert!(state.loaded);
    assert!(!state.is_logged_in);
    assert!(state.commuter.unwrap().anonymous);
}

#[tokio::test]
async fn test_cached_user_wins_over_bootstrap() {
    let harness = Harness::new();
    let cached = user("gus");
    cache::write(harness.cache.as_ref(), keys::USER, &cached).await.unwrap();

    let state = harness.session(Some(user("hal"))).load().await.unwrap();

    assert_eq!(state.user, Some(cached));
}

#[tokio::test]
async fn test_registration_code_is_folded_into_identify() {
    let harness = Harness::new();
    cache::write(harness.cache.as_ref(), keys::REGISTRATION_CODE, &json!("METRO-42"))
        .await
        .unwrap();

    harness.session(Some(user("ivy"))).load().await.unwrap();

    eventually(|| harness.analytics.calls().len() == 1).await;
    let (_, traits) = harness.analytics.calls().remove(0);
    assert_eq!(traits.get("registrationCode"), Some(&json!("METRO-42")));
    let remaining: Option<Value> = cache::read(harness.cache.as_ref(), keys::REGISTRATION_CODE).await;
    assert!(remaining.is_none());
}

#[tokio::test]
async fn test_admin_flag_requires_logged_in_admin() {
    let harness = Harness::new();
    let mut admin = user("jo");
    admin.app_metadata.insert("is_admin".to_string(), json!(true));

    let session = harness.session(Some(admin));
    assert!(!session.is_admin().await);

    session.load().await.unwrap();
    assert!(session.is_admin().await);

    let other = Harness::new().session(Some(user("kim")));
    other.load().await.unwrap();
    assert!(!other.is_admin().await);
}

// =============================================================================
// Lookup failures and concurrency
// =============================================================================

#[tokio::test]
async fn test_lookup_rejection_falls_back_to_placeholder() {
    let harness = Harness::new();
    harness.api.fail_lookup(Failure::Status(500));

    let state = harness.session(Some(user("lee"))).load().await.unwrap();

    let commuter = state.commuter.unwrap();
    assert!(!commuter.anonymous);
    assert_eq!(commuter.given_name.as_deref(), Some(PLACEHOLDER_NAME));
}

#[tokio::test]
async fn test_unreachable_server_aborts_load() {
    let harness = Harness::new();
    harness.api.fail_lookup(Failure::Transport);
    let session = harness.session(Some(user("max")));

    let err = session.load().await.unwrap_err();

    assert!(matches!(err, SessionError::Commuter(_)));
    assert!(!session.loaded().await);
    assert!(session.commuter().await.is_none());
}

#[tokio::test]
async fn test_retry_after_unreachable_server_keeps_user() {
    let harness = Harness::new();
    let user = user("mia");
    let stored = harness.api.insert(Commuter::for_user(&user));
    harness.api.fail_lookup(Failure::Transport);
    let session = harness.session(Some(user.clone()));

    session.load().await.unwrap_err();
    harness.api.clear_lookup_failure();
    let state = session.load().await.unwrap();

    assert!(state.loaded);
    assert!(state.is_logged_in);
    assert_eq!(state.user, Some(user));
    assert_eq!(state.commuter, Some(stored));
    assert_eq!(FakeApi::count(&harness.api.find_calls), 2);
}

#[tokio::test]
async fn test_concurrent_loads_share_one_lookup() {
    let harness = Harness::new();
    harness.api.delay_lookup(Duration::from_millis(100));
    let session = harness.session(Some(user("ned")));

    let (a, b, c) = tokio::join!(session.load(), session.load(), session.load());

    let (a, b, c) = (a.unwrap(), b.unwrap(), c.unwrap());
    assert_eq!(a, b);
    assert_eq!(b, c);
    assert_eq!(FakeApi::count(&harness.api.find_calls), 1);

    session.load().await.unwrap();
    assert_eq!(FakeApi::count(&harness.api.find_calls), 1);
}

#[tokio::test]
async fn test_bootstrap_user_is_consumed_once() {
    let harness = Harness::new();
    let session = harness.session(Some(user("oli")));

    assert!(session.load().await.unwrap().is_logged_in);
    session.clear().await;

    let state = session.load().await.unwrap();
    assert!(!state.is_logged_in);
    assert!(state.commuter.unwrap().anonymous);
}

// =============================================================================
// Service alerts
// =============================================================================

fn window(from: i64, to: i64) -> ServiceAlert {
    let today = Utc::now().date_naive();
    ServiceAlert::new(
        (today + TimeDelta::days(from)).to_string(),
        (today + TimeDelta::days(to)).to_string(),
    )
}

#[tokio::test]
async fn test_only_alerts_active_today_are_kept() {
    let harness = Harness::new();
    harness.api.set_alerts(vec![
        window(-1, 1),
        window(1, 2),
        window(-2, -1),
        window(0, 0),
    ]);
    let session = harness.session(None);
    let mut events = session.subscribe();

    let state = session.load().await.unwrap();
    assert!(state.loaded);

    let event = next_event(&mut events, |e| {
        matches!(e, SessionEvent::ServiceAlertsUpdated { .. })
    })
    .await;
    assert_eq!(event, SessionEvent::ServiceAlertsUpdated { active: 2 });
    assert_eq!(session.service_alerts().await, vec![window(-1, 1), window(0, 0)]);
}

#[tokio::test]
async fn test_alert_failure_leaves_session_loaded() {
    let harness = Harness::new();
    harness.api.fail_alerts(Failure::Status(503));
    let session = harness.session(None);
    let mut events = session.subscribe();

    session.load().await.unwrap();

    let event = next_event(&mut events, |e| {
        matches!(e, SessionEvent::BackgroundFailure { .. })
    })
    .await;
    assert!(matches!(
        event,
        SessionEvent::BackgroundFailure {
            task: BackgroundTask::ServiceAlerts,
            ..
        }
    ));
    assert!(session.loaded().await);
    assert!(session.service_alerts().await.is_empty());
}

#[tokio::test]
async fn test_refresh_returns_active_alerts() {
    let harness = Harness::new();
    harness.api.set_alerts(vec![window(-3, -2), window(0, 5)]);
    let session = harness.session(None);

    let alerts = session.refresh_service_alerts().await;

    assert_eq!(alerts, vec![window(0, 5)]);
    assert_eq!(session.service_alerts().await, vec![window(0, 5)]);
}
