//! The client session aggregate.
//!
//! A [`Session`] is built with [`Session::initialize`], populated by
//! [`Session::load`] and stopped with [`Session::teardown`]. Clones share the
//! same session.
//!
//! # Fields
//!
//! `loaded == true` implies a commuter is present, and `is_logged_in == true`
//! implies a user is present. Read other fields only once `loaded` is set.
//! Service alerts arrive after `load` returns; subscribe to
//! [`SessionEvent::ServiceAlertsUpdated`] instead of assuming they are there.
//!
//! # Persistence
//!
//! `update_settings`, `update_user` and `update_commuter` change the
//! in-memory state and queue a change for a background task. The task writes
//! the cache and saves non-anonymous commuters to the server, one batch at a
//! time: whatever is queued when it wakes is coalesced so the latest value
//! per key wins. [`Session::clear`] starts a new epoch; changes queued before
//! it are dropped. Background failures are logged and published as
//! [`SessionEvent::BackgroundFailure`].

mod alerts;
mod bootstrap;
mod persist;

use std::fmt::Display;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{Mutex, RwLock, broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;

use commuter_core::{Commuter, Plan, ServiceAlert, Settings, User};

use crate::analytics::{Analytics, TracingAnalytics};
use crate::api::{HttpApi, SessionApi};
use crate::cache::{FileCache, LocalCache, MemoryCache, keys};
use crate::config::ClientConfig;
use crate::error::{ClientError, SessionError};
use persist::{Change, Command};

const EVENT_CAPACITY: usize = 64;

/// Snapshot of every session field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionState {
    pub settings: Settings,
    /// `None` means anonymous.
    pub user: Option<User>,
    pub commuter: Option<Commuter>,
    /// Derived from the commuter's options at load time.
    pub plan: Option<Plan>,
    pub is_logged_in: bool,
    pub loaded: bool,
    /// Alerts active today, filled in after load.
    pub service_alerts: Vec<ServiceAlert>,
}

/// Background work whose failures never reach session callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackgroundTask {
    Identify,
    ServiceAlerts,
    CacheWrite,
    RemoteSave,
}

/// Notifications published by a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Loaded,
    ServiceAlertsUpdated { active: usize },
    CommuterSaved,
    Cleared,
    BackgroundFailure {
        task: BackgroundTask,
        message: String,
    },
}

/// Collaborators of a [`Session`].
pub struct SessionDeps {
    pub cache: Arc<dyn LocalCache>,
    pub api: Arc<dyn SessionApi>,
    pub analytics: Arc<dyn Analytics>,
    /// User embedded by the server at render time; consumed at most once.
    pub bootstrap: Option<User>,
}

impl SessionDeps {
    /// Production collaborators: the HTTP API, a file or memory cache and
    /// log-based analytics.
    ///
    /// # Errors
    ///
    /// Returns `ClientError` if the HTTP client cannot be built.
    pub fn from_config(config: &ClientConfig, bootstrap: Option<User>) -> Result<Self, ClientError> {
        let cache: Arc<dyn LocalCache> = match &config.cache_path {
            Some(path) => Arc::new(FileCache::new(path)),
            None => Arc::new(MemoryCache::new()),
        };

        Ok(Self {
            cache,
            api: Arc::new(HttpApi::new(config)?),
            analytics: Arc::new(TracingAnalytics),
            bootstrap,
        })
    }
}

/// State shared with background tasks.
struct Shared {
    cache: Arc<dyn LocalCache>,
    api: Arc<dyn SessionApi>,
    analytics: Arc<dyn Analytics>,
    state: RwLock<SessionState>,
    epoch: AtomicU64,
    /// Held while background writes run and while clearing.
    io_lock: Mutex<()>,
    events: broadcast::Sender<SessionEvent>,
}

impl Shared {
    fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    fn publish(&self, event: SessionEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    fn report(&self, task: BackgroundTask, error: &dyn Display) {
        tracing::warn!(task = ?task, error = %error, "Background session task failed");
        self.publish(SessionEvent::BackgroundFailure {
            task,
            message: error.to_string(),
        });
    }
}

/// The client session.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    shared: Arc<Shared>,
    bootstrap: Mutex<Option<User>>,
    load_lock: Mutex<()>,
    commands: Mutex<Option<mpsc::UnboundedSender<Command>>>,
    persist_task: Mutex<Option<JoinHandle<()>>>,
    alerts_task: Mutex<Option<JoinHandle<()>>>,
}

impl Session {
    /// Create an unloaded session and start its persistence task.
    ///
    /// Must be called within a tokio runtime.
    #[must_use]
    pub fn initialize(deps: SessionDeps) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let shared = Arc::new(Shared {
            cache: deps.cache,
            api: deps.api,
            analytics: deps.analytics,
            state: RwLock::new(SessionState::default()),
            epoch: AtomicU64::new(0),
            io_lock: Mutex::new(()),
            events,
        });

        let (commands, receiver) = mpsc::unbounded_channel();
        let persist_task = tokio::spawn(persist::run(shared.clone(), receiver));

        Self {
            inner: Arc::new(SessionInner {
                shared,
                bootstrap: Mutex::new(deps.bootstrap),
                load_lock: Mutex::new(()),
                commands: Mutex::new(Some(commands)),
                persist_task: Mutex::new(Some(persist_task)),
                alerts_task: Mutex::new(None),
            }),
        }
    }

    /// Receive session events published from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.shared.events.subscribe()
    }

    // =========================================================================
    // Getters
    // =========================================================================

    pub async fn snapshot(&self) -> SessionState {
        self.inner.shared.state.read().await.clone()
    }

    pub async fn settings(&self) -> Settings {
        self.inner.shared.state.read().await.settings.clone()
    }

    pub async fn user(&self) -> Option<User> {
        self.inner.shared.state.read().await.user.clone()
    }

    pub async fn commuter(&self) -> Option<Commuter> {
        self.inner.shared.state.read().await.commuter.clone()
    }

    pub async fn plan(&self) -> Option<Plan> {
        self.inner.shared.state.read().await.plan.clone()
    }

    pub async fn is_logged_in(&self) -> bool {
        self.inner.shared.state.read().await.is_logged_in
    }

    pub async fn loaded(&self) -> bool {
        self.inner.shared.state.read().await.loaded
    }

    pub async fn service_alerts(&self) -> Vec<ServiceAlert> {
        self.inner.shared.state.read().await.service_alerts.clone()
    }

    /// Whether the logged-in user is flagged as an administrator.
    pub async fn is_admin(&self) -> bool {
        let state = self.inner.shared.state.read().await;
        state.is_logged_in && state.user.as_ref().is_some_and(User::is_admin)
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Change the settings and persist them to the cache.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::TornDown` after [`teardown`](Self::teardown).
    pub async fn update_settings(&self, f: impl FnOnce(&mut Settings) + Send) -> Result<(), SessionError> {
        self.mutate(|state| {
            f(&mut state.settings);
            Ok(Change::Settings(state.settings.clone()))
        })
        .await
    }

    /// Change the logged-in user and persist it to the cache.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::NotLoggedIn` without a user.
    pub async fn update_user(&self, f: impl FnOnce(&mut User) + Send) -> Result<(), SessionError> {
        self.mutate(|state| {
            let user = state.user.as_mut().ok_or(SessionError::NotLoggedIn)?;
            f(user);
            Ok(Change::User(user.clone()))
        })
        .await
    }

    /// Change the commuter, persist it to the cache and, unless it is
    /// anonymous, save it to the server.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::NotLoaded` without a commuter.
    pub async fn update_commuter(&self, f: impl FnOnce(&mut Commuter) + Send) -> Result<(), SessionError> {
        self.mutate(|state| {
            let commuter = state.commuter.as_mut().ok_or(SessionError::NotLoaded)?;
            f(commuter);
            Ok(Change::Commuter {
                remote: !commuter.anonymous,
                commuter: commuter.clone(),
            })
        })
        .await
    }

    /// Wait until every change queued so far has been processed.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::TornDown` after [`teardown`](Self::teardown).
    pub async fn flush(&self) -> Result<(), SessionError> {
        let (ack, done) = oneshot::channel();
        self.send(Command::Flush(ack)).await?;
        done.await.map_err(|_| SessionError::TornDown)
    }

    /// Apply `f` and queue its change, holding the state lock throughout so
    /// that queue order matches state order.
    async fn mutate(
        &self,
        f: impl FnOnce(&mut SessionState) -> Result<Change, SessionError> + Send,
    ) -> Result<(), SessionError> {
        let shared = &self.inner.shared;
        let mut state = shared.state.write().await;
        let commands = self.inner.commands.lock().await;
        let sender = commands.as_ref().ok_or(SessionError::TornDown)?;

        let change = f(&mut *state)?;
        sender
            .send(Command::Persist {
                epoch: shared.epoch(),
                change,
            })
            .map_err(|_| SessionError::TornDown)
    }

    async fn send(&self, command: Command) -> Result<(), SessionError> {
        self.inner
            .commands
            .lock()
            .await
            .as_ref()
            .ok_or(SessionError::TornDown)?
            .send(command)
            .map_err(|_| SessionError::TornDown)
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Forget everything: reset the state to unloaded and remove the cached
    /// session, user, commuter and plan.
    ///
    /// Waits for an in-progress load and for the current persistence batch.
    pub async fn clear(&self) {
        let _load = self.inner.load_lock.lock().await;
        let shared = &self.inner.shared;
        let _io = shared.io_lock.lock().await;

        {
            let mut state = shared.state.write().await;
            shared.epoch.fetch_add(1, Ordering::SeqCst);
            *state = SessionState::default();
        }

        if let Some(task) = self.inner.alerts_task.lock().await.take() {
            task.abort();
        }

        for key in keys::SESSION_KEYS {
            if let Err(e) = shared.cache.remove(key).await {
                tracing::warn!(key, error = %e, "Failed to remove cached value");
            }
        }

        shared.publish(SessionEvent::Cleared);
        tracing::debug!("Session cleared");
    }

    /// Clear the session, then end the server session.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Logout` if the server request fails; the local
    /// session is cleared either way.
    pub async fn logout(&self) -> Result<(), SessionError> {
        tracing::debug!("Logging out");
        self.clear().await;
        self.inner
            .shared
            .api
            .logout()
            .await
            .map_err(SessionError::Logout)
    }

    /// Replace the session with one for `user` and load it.
    ///
    /// # Errors
    ///
    /// Returns any error from [`load`](Self::load).
    pub async fn login(&self, user: User) -> Result<SessionState, SessionError> {
        self.clear().await;
        self.identify(&user).await;
        self.mutate(|state| {
            state.user = Some(user.clone());
            Ok(Change::User(user))
        })
        .await?;
        self.load().await
    }

    /// Log in with a commuter's invite link and load the session around
    /// that commuter.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Login` if the server rejects the link; the
    /// current session is kept in that case.
    pub async fn login_with_link(&self, link: &str) -> Result<SessionState, SessionError> {
        tracing::debug!("Logging in with link");
        let commuter = self
            .inner
            .shared
            .api
            .login_with_link(link)
            .await
            .map_err(SessionError::Login)?;

        self.clear().await;
        self.mutate(|state| {
            state.commuter = Some(commuter.clone());
            Ok(Change::Commuter {
                commuter,
                remote: false,
            })
        })
        .await?;
        self.load().await
    }

    /// Stop background work. Changes queued so far are still persisted.
    ///
    /// Later mutations fail with `SessionError::TornDown`.
    pub async fn teardown(&self) {
        drop(self.inner.commands.lock().await.take());

        if let Some(task) = self.inner.alerts_task.lock().await.take() {
            task.abort();
        }

        if let Some(task) = self.inner.persist_task.lock().await.take()
            && let Err(e) = task.await
        {
            tracing::error!(error = %e, "Session persistence task failed");
        }
    }
}
