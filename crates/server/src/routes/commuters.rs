//! Commuter route handlers.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde::Deserialize;
use tracing::instrument;

use commuter_core::{Commuter, CommuterId};

use crate::error::{AppError, Result};
use crate::state::AppState;

/// Query for `GET /commuters`.
#[derive(Debug, Deserialize)]
pub struct AccountQuery {
    pub account: Option<String>,
}

/// Commuters linked to a directory account.
#[instrument(skip(state))]
pub async fn by_account(
    State(state): State<AppState>,
    Query(query): Query<AccountQuery>,
) -> Result<Json<Vec<Commuter>>> {
    let account = query
        .account
        .filter(|account| !account.trim().is_empty())
        .ok_or_else(|| AppError::BadRequest("account is required".to_string()))?;

    Ok(Json(state.commuters().find_by_account(&account).await?))
}

/// Create a commuter. Any link in the body is replaced by a fresh one.
#[instrument(skip_all)]
pub async fn create(
    State(state): State<AppState>,
    Json(mut commuter): Json<Commuter>,
) -> Result<(StatusCode, Json<Commuter>)> {
    commuter.id = None;
    let commuter = state.commuters().generate(None, commuter).await?;
    Ok((StatusCode::CREATED, Json(commuter)))
}

/// Save a commuter. The stored link is kept.
#[instrument(skip(state, commuter))]
pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(mut commuter): Json<Commuter>,
) -> Result<Json<Commuter>> {
    commuter.id = Some(CommuterId::new(id));
    state.commuters().save(&mut commuter).await?;
    Ok(Json(commuter))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use serde_json::json;
    use tower::ServiceExt;

    use super::*;
    use crate::db::CommuterStore;
    use crate::routes::{routes, test_support::memory_state};

    async fn body_json<T: serde::de::DeserializeOwned>(response: axum::response::Response) -> T {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn json_request(method: &str, uri: &str, body: &serde_json::Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_find_by_account_requires_account() {
        let (state, _) = memory_state();
        let response = routes()
            .with_state(state)
            .oneshot(Request::get("/commuters").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_find_by_account_returns_matches() {
        let (state, store) = memory_state();
        let mut linked = Commuter {
            account: Some("acct-1".to_string()),
            anonymous: false,
            ..Commuter::default()
        };
        store.save(&mut linked).await.unwrap();
        store.create(Commuter::anonymous()).await.unwrap();

        let response = routes()
            .with_state(state)
            .oneshot(
                Request::get("/commuters?account=acct-1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let found: Vec<Commuter> = body_json(response).await;
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, linked.id);
    }

    #[tokio::test]
    async fn test_create_assigns_id_and_fresh_link() {
        let (state, _) = memory_state();
        let response = routes()
            .with_state(state)
            .oneshot(json_request(
                "POST",
                "/commuters",
                &json!({ "anonymous": false, "givenName": "Ada", "link": "chosen" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let created: Commuter = body_json(response).await;
        assert!(created.id.is_some());
        assert_eq!(created.given_name.as_deref(), Some("Ada"));
        assert_ne!(created.link.as_deref(), Some("chosen"));
    }

    #[tokio::test]
    async fn test_update_keeps_stored_link() {
        let (state, store) = memory_state();
        let stored = store.create(Commuter::anonymous()).await.unwrap();
        let id = stored.id.unwrap();

        let response = routes()
            .with_state(state)
            .oneshot(json_request(
                "PUT",
                &format!("/commuters/{id}"),
                &json!({ "anonymous": false, "surname": "Lovelace", "link": "other" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let saved: Commuter = body_json(response).await;
        assert_eq!(saved.surname.as_deref(), Some("Lovelace"));
        assert_eq!(saved.link, stored.link);
        assert_eq!(store.get(id).await.unwrap().unwrap().link, stored.link);
    }

    #[tokio::test]
    async fn test_update_unknown_commuter_is_not_found() {
        let (state, _) = memory_state();
        let response = routes()
            .with_state(state)
            .oneshot(json_request("PUT", "/commuters/404", &json!({})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
