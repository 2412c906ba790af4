//! Paged passes over the commuter collection and the email records that
//! drive commuter status.

#![allow(clippy::unwrap_used)]

use std::num::NonZeroUsize;
use std::sync::Arc;

use commuter_core::{Commuter, NOT_INVITED};
use commuter_integration_tests::{RecordingMailer, commuter_service};
use commuter_server::db::MemoryStore;
use commuter_server::models::EmailOptions;
use commuter_server::services::accounts::NewAccount;
use commuter_server::services::batch::{BatchError, BatchOptions, BatchSummary};
use commuter_server::services::commuters::PLAN_TEMPLATE;
use commuter_server::services::{CommuterError, CommuterService};

struct Fixture {
    store: Arc<MemoryStore>,
    mailer: Arc<RecordingMailer>,
    service: CommuterService,
}

fn fixture() -> Fixture {
    let store = Arc::new(MemoryStore::new());
    let mailer = Arc::new(RecordingMailer::default());
    let service = commuter_service(&store, &mailer);
    Fixture {
        store,
        mailer,
        service,
    }
}

fn named(n: usize) -> Commuter {
    Commuter {
        given_name: Some(format!("Commuter{n}")),
        surname: Some("Test".to_string()),
        email: Some(format!("commuter{n}@example.com")),
        anonymous: false,
        ..Commuter::default()
    }
}

async fn populate(service: &CommuterService, count: usize) -> Vec<Commuter> {
    let mut created = Vec::with_capacity(count);
    for n in 0..count {
        created.push(service.generate(None, named(n)).await.unwrap());
    }
    created
}

fn limit(n: usize) -> BatchOptions {
    BatchOptions::with_limit(NonZeroUsize::new(n).unwrap())
}

// =============================================================================
// Paged passes
// =============================================================================

#[tokio::test]
async fn test_pass_visits_pages_in_order() {
    let f = fixture();
    populate(&f.service, 250).await;
    let mut transforms = Vec::new();
    let mut ticks = 0;

    let summary = f
        .service
        .iterate_and_apply(
            limit(100),
            |page| {
                transforms.push(page.len());
                page.into_iter()
                    .map(|c| async move { Ok::<_, CommuterError>(c.id) })
                    .collect()
            },
            |_| ticks += 1,
        )
        .await
        .unwrap();

    assert_eq!(transforms, [100, 100, 50]);
    assert_eq!(ticks, 3);
    assert_eq!(summary, BatchSummary { pages: 3, records: 250 });
}

#[tokio::test]
async fn test_empty_collection_is_a_no_op() {
    let f = fixture();

    let summary = f.service.update_all_statuses(limit(100)).await.unwrap();

    assert_eq!(summary, BatchSummary::default());
}

#[tokio::test]
async fn test_statuses_follow_latest_email() {
    let f = fixture();
    let commuters = populate(&f.service, 250).await;

    f.mailer.report_status(Some("delivered"));
    f.service.send_plan(&commuters[10]).await.unwrap();
    f.mailer.report_status(None);
    f.service.send_plan(&commuters[180]).await.unwrap();

    let summary = f.service.update_all_statuses(limit(100)).await.unwrap();
    assert_eq!(summary.records, 250);

    let status = |n: usize| {
        let service = f.service.clone();
        let id = commuters[n].id.unwrap();
        async move { service.get(id).await.unwrap().unwrap().status }
    };
    assert_eq!(status(10).await, "delivered");
    assert_eq!(status(180).await, "sent");
    assert_eq!(status(0).await, NOT_INVITED);
    assert_eq!(status(249).await, NOT_INVITED);
}

#[tokio::test]
async fn test_failing_record_stops_the_pass() {
    let f = fixture();
    let mut commuters = populate(&f.service, 250).await;

    // The directory knows no accounts, so syncing this one fails
    let broken = &mut commuters[150];
    broken.account = Some("acct-missing".to_string());
    f.service.save(broken).await.unwrap();

    let err = f.service.sync_all_accounts(limit(100)).await.unwrap_err();

    assert!(matches!(
        err,
        BatchError::Transform {
            page: 2,
            source: CommuterError::Account(_)
        }
    ));
}

// =============================================================================
// Email records
// =============================================================================

#[tokio::test]
async fn test_generate_and_send_plan_records_email() {
    let f = fixture();
    let account = NewAccount {
        email: "pat@example.com".to_string(),
        given_name: Some("Pat".to_string()),
        surname: Some("Lee".to_string()),
        password: None,
    };
    let mut commuter = named(1);
    commuter.email = Some("pat@example.com".to_string());

    let created = f
        .service
        .generate_and_send_plan(Some(&account), commuter)
        .await
        .unwrap();

    assert_eq!(created.account.as_deref(), Some("acct-pat@example.com"));
    let link = created.link.clone().unwrap();

    let sent = f.mailer.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].template.as_deref(), Some(PLAN_TEMPLATE));
    assert_eq!(
        sent[0].link.as_deref(),
        Some(format!("https://planner.example.com/planner/{link}").as_str())
    );
    assert_eq!(sent[0].survey.as_deref(), Some("https://survey.example.com"));

    let records = f.store.emails().await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].commuter, created.id.unwrap());
    assert_eq!(records[0].account, created.account);
    assert_eq!(records[0].delivery_status(), "sent");
}

#[tokio::test]
async fn test_missing_recipient_sends_nothing() {
    let f = fixture();
    let mut commuter = named(2);
    commuter.email = None;
    let commuter = f.service.generate(None, commuter).await.unwrap();

    let err = f
        .service
        .send_email(&commuter, PLAN_TEMPLATE, EmailOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(err, CommuterError::InvalidEmail(_)));
    assert!(f.mailer.sent().is_empty());
    assert!(f.store.emails().await.is_empty());
}

#[tokio::test]
async fn test_failed_delivery_creates_no_record() {
    let f = fixture();
    let commuter = f.service.generate(None, named(3)).await.unwrap();
    f.mailer.fail();

    let err = f.service.send_plan(&commuter).await.unwrap_err();

    assert!(matches!(err, CommuterError::Delivery(_)));
    assert!(f.store.emails().await.is_empty());
}
