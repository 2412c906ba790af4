//! The HTTP client and a session against a live in-process server.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use chrono::Utc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tower_sessions::SessionManagerLayer;
use url::Url;

use commuter_client::api::{HttpApi, SessionApi};
use commuter_client::cache::MemoryCache;
use commuter_client::config::ClientConfig;
use commuter_client::{ClientError, Session, SessionDeps, SessionEvent};
use commuter_core::{Commuter, ServiceAlert};
use commuter_integration_tests::{RecordingAnalytics, RecordingMailer, commuter_service, next_event, user};
use commuter_server::db::{CommuterStore, MemoryStore};
use commuter_server::routes::routes;
use commuter_server::state::AppState;

struct Server {
    url: Url,
    store: Arc<MemoryStore>,
}

async fn spawn_server() -> Server {
    let store = Arc::new(MemoryStore::new());
    let mailer = Arc::new(RecordingMailer::default());
    let state = AppState::new(commuter_service(&store, &mailer), store.clone(), None);

    let sessions = SessionManagerLayer::new(tower_sessions::MemoryStore::default()).with_secure(false);
    let app = routes().layer(sessions).with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    Server {
        url: Url::parse(&format!("http://{addr}/")).unwrap(),
        store,
    }
}

fn api(server: &Server) -> HttpApi {
    HttpApi::new(&ClientConfig {
        api_url: server.url.clone(),
        cache_path: None,
    })
    .unwrap()
}

#[tokio::test]
async fn test_create_find_and_save_over_http() {
    let server = spawn_server().await;
    let api = api(&server);
    let user = user("quinn");

    let created = api.create_commuter(&Commuter::for_user(&user)).await.unwrap();
    assert!(created.id.is_some());
    assert!(created.link.is_some());

    let found = api.find_commuters(user.account_id()).await.unwrap();
    assert_eq!(found, vec![created.clone()]);

    let mut changed = created.clone();
    changed.given_name = Some("Quinn".to_string());
    changed.link = Some("attempted-overwrite".to_string());
    let saved = api.save_commuter(&changed).await.unwrap();

    assert_eq!(saved.given_name.as_deref(), Some("Quinn"));
    assert_eq!(saved.link, created.link);
}

#[tokio::test]
async fn test_unknown_link_is_an_api_error() {
    let server = spawn_server().await;

    let err = api(&server).login_with_link("missing").await.unwrap_err();

    assert!(matches!(err, ClientError::Api { status: 404, .. }));
    assert!(!err.is_transport());
}

#[tokio::test]
async fn test_truncated_body_is_not_a_transport_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut request = [0_u8; 1024];
        socket.read(&mut request).await.unwrap();
        socket
            .write_all(b"HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: 100\r\n\r\n[")
            .await
            .unwrap();
    });
    let api = HttpApi::new(&ClientConfig {
        api_url: Url::parse(&format!("http://{addr}/")).unwrap(),
        cache_path: None,
    })
    .unwrap();

    let err = api.find_commuters("acct-cut").await.unwrap_err();

    assert!(matches!(err, ClientError::Api { status: 200, .. }));
    assert!(!err.is_transport());
}

#[tokio::test]
async fn test_session_logs_in_with_link_and_sees_alerts() {
    let server = spawn_server().await;
    let today = Utc::now().date_naive().to_string();
    server
        .store
        .insert_alert(ServiceAlert::new(today.clone(), today))
        .await;
    server
        .store
        .insert_alert(ServiceAlert::new("2001-01-01", "2001-01-02"))
        .await;
    let stored = server
        .store
        .create(Commuter::for_user(&user("remy")))
        .await
        .unwrap();

    let session = Session::initialize(SessionDeps {
        cache: Arc::new(MemoryCache::new()),
        api: Arc::new(api(&server)),
        analytics: Arc::new(RecordingAnalytics::default()),
        bootstrap: None,
    });
    let mut events = session.subscribe();

    let state = session
        .login_with_link(stored.link.as_deref().unwrap())
        .await
        .unwrap();
    assert_eq!(state.commuter.unwrap().id, stored.id);

    let event = next_event(&mut events, |e| {
        matches!(e, SessionEvent::ServiceAlertsUpdated { .. })
    })
    .await;
    assert_eq!(event, SessionEvent::ServiceAlertsUpdated { active: 1 });

    session.logout().await.unwrap();
    assert!(!session.loaded().await);
    session.teardown().await;
}
