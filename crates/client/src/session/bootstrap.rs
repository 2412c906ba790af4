//! Session bootstrap.
//!
//! Resolution order, first match wins at each step:
//!
//! 1. Settings: cache, else empty.
//! 2. User: in memory, cache, bootstrap payload, else anonymous.
//! 3. Commuter: in memory, cache, server lookup by account (logged in),
//!    else a new anonymous commuter.
//! 4. Plan: derived from the commuter's options.
//!
//! The session is marked loaded before service alerts are fetched.

use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::instrument;

use commuter_core::{Commuter, Plan, Settings, User};

use super::{BackgroundTask, Session, SessionEvent, SessionState};
use crate::cache::{self, keys};
use crate::error::SessionError;

/// Where the user came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UserSource {
    Memory,
    Cache,
    Bootstrap,
}

impl Session {
    /// Populate the session.
    ///
    /// Concurrent calls wait for the first one; once loaded, calls return
    /// the current state without touching the cache or the network.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Commuter` if the logged-in user's commuter
    /// cannot be fetched because the server is unreachable. The session
    /// stays unloaded in that case but keeps the resolved user, so a later
    /// call retries the lookup for the same user.
    #[instrument(skip(self))]
    pub async fn load(&self) -> Result<SessionState, SessionError> {
        let _load = self.inner.load_lock.lock().await;
        if self.inner.commands.lock().await.is_none() {
            return Err(SessionError::TornDown);
        }

        let shared = &self.inner.shared;
        {
            let state = shared.state.read().await;
            if state.loaded {
                return Ok(state.clone());
            }
        }

        let settings: Settings = cache::read(shared.cache.as_ref(), keys::SESSION)
            .await
            .unwrap_or_default();

        let user = self.resolve_user().await;
        if let Some((user, source)) = &user {
            tracing::debug!(source = ?source, "User resolved");
            if *source != UserSource::Memory {
                self.identify(user).await;
            }
        }
        let user = user.map(|(user, _)| user);

        // Keep the user in memory so a retry after a failed lookup still
        // resolves it
        if user.is_some() {
            let mut state = shared.state.write().await;
            state.user.clone_from(&user);
            state.is_logged_in = true;
        }

        let commuter = self.resolve_commuter(user.as_ref()).await?;
        let plan = Plan::from_options(&commuter.opts);

        let snapshot = {
            let mut state = shared.state.write().await;
            state.settings = settings;
            state.is_logged_in = user.is_some();
            state.user = user;
            state.commuter = Some(commuter);
            state.plan = Some(plan);
            state.loaded = true;
            state.clone()
        };

        tracing::info!(
            logged_in = snapshot.is_logged_in,
            anonymous = snapshot.commuter.as_ref().is_some_and(|c| c.anonymous),
            "Session loaded"
        );
        shared.publish(SessionEvent::Loaded);

        self.spawn_service_alerts().await;
        Ok(snapshot)
    }

    async fn resolve_user(&self) -> Option<(User, UserSource)> {
        let shared = &self.inner.shared;

        if let Some(user) = shared.state.read().await.user.clone() {
            return Some((user, UserSource::Memory));
        }

        if let Some(user) = cache::read::<User>(shared.cache.as_ref(), keys::USER).await {
            return Some((user, UserSource::Cache));
        }

        self.inner
            .bootstrap
            .lock()
            .await
            .take()
            .map(|user| (user, UserSource::Bootstrap))
    }

    async fn resolve_commuter(&self, user: Option<&User>) -> Result<Commuter, SessionError> {
        let shared = &self.inner.shared;

        if let Some(commuter) = shared.state.read().await.commuter.clone() {
            return Ok(commuter);
        }

        if let Some(mut commuter) = cache::read::<Commuter>(shared.cache.as_ref(), keys::COMMUTER).await {
            // A logged-in user is never anonymous, even with a stale cache
            if user.is_some() {
                commuter.anonymous = false;
            }
            return Ok(commuter);
        }

        let Some(user) = user else {
            return Ok(Commuter::anonymous());
        };

        match shared.api.find_commuters(user.account_id()).await {
            Ok(found) => Ok(found
                .into_iter()
                .next()
                .unwrap_or_else(|| Commuter::for_user(user))),
            Err(e) if e.is_transport() => Err(SessionError::Commuter(e)),
            Err(e) => {
                tracing::warn!(error = %e, "Commuter lookup failed, creating one for the user");
                Ok(Commuter::for_user(user))
            }
        }
    }

    /// Forward the user to analytics in the background, folding in a
    /// pending registration code.
    pub(super) async fn identify(&self, user: &User) {
        let shared = Arc::clone(&self.inner.shared);

        let mut traits = match serde_json::to_value(user) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        };
        if let Some(code) = cache::read::<Value>(shared.cache.as_ref(), keys::REGISTRATION_CODE).await {
            traits.insert("registrationCode".to_string(), code);
            if let Err(e) = shared.cache.remove(keys::REGISTRATION_CODE).await {
                tracing::warn!(error = %e, "Failed to remove registration code");
            }
        }

        let user_id = user.user_id.clone();
        tokio::spawn(async move {
            if let Err(e) = shared.analytics.identify(&user_id, traits).await {
                shared.report(BackgroundTask::Identify, &e);
            }
        });
    }
}
