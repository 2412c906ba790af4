//! Background persistence of session changes.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::instrument;

use commuter_core::{Commuter, Settings, User};

use super::{BackgroundTask, SessionEvent, Shared};
use crate::cache::{self, keys};

/// A value to persist.
#[derive(Debug)]
pub(super) enum Change {
    Settings(Settings),
    User(User),
    /// `remote` asks for a server save in addition to the cache write.
    Commuter { commuter: Commuter, remote: bool },
}

#[derive(Debug)]
pub(super) enum Command {
    Persist { epoch: u64, change: Change },
    /// Answered once everything queued before it has been processed.
    Flush(oneshot::Sender<()>),
}

/// Latest queued value per key.
#[derive(Debug, Default)]
struct Batch {
    settings: Option<(u64, Settings)>,
    user: Option<(u64, User)>,
    commuter: Option<(u64, Commuter, bool)>,
    flushes: Vec<oneshot::Sender<()>>,
    changes: usize,
}

impl Batch {
    fn push(&mut self, command: Command) {
        match command {
            Command::Flush(ack) => self.flushes.push(ack),
            Command::Persist { epoch, change } => {
                self.changes += 1;
                match change {
                    Change::Settings(settings) => self.settings = Some((epoch, settings)),
                    Change::User(user) => self.user = Some((epoch, user)),
                    Change::Commuter { commuter, remote } => {
                        // A pending server save survives a later cache-only change
                        let remote = remote
                            || self
                                .commuter
                                .as_ref()
                                .is_some_and(|(previous, _, r)| *previous == epoch && *r);
                        self.commuter = Some((epoch, commuter, remote));
                    }
                }
            }
        }
    }
}

/// Process commands until every sender is gone.
pub(super) async fn run(shared: Arc<Shared>, mut commands: mpsc::UnboundedReceiver<Command>) {
    while let Some(first) = commands.recv().await {
        let mut batch = Batch::default();
        batch.push(first);
        while let Ok(next) = commands.try_recv() {
            batch.push(next);
        }

        let flushes = std::mem::take(&mut batch.flushes);
        apply(&shared, batch).await;
        for ack in flushes {
            let _ = ack.send(());
        }
    }

    tracing::debug!("Session persistence task stopped");
}

#[instrument(skip_all, fields(changes = batch.changes))]
async fn apply(shared: &Shared, batch: Batch) {
    let _io = shared.io_lock.lock().await;
    let epoch = shared.epoch();

    if let Some((_, settings)) = batch.settings.filter(|(e, _)| *e == epoch) {
        write(shared, keys::SESSION, &settings).await;
    }

    if let Some((_, user)) = batch.user.filter(|(e, _)| *e == epoch) {
        write(shared, keys::USER, &user).await;
    }

    if let Some((_, mut commuter, remote)) = batch.commuter.filter(|(e, _, _)| *e == epoch) {
        adopt_identity(shared, &mut commuter).await;
        write(shared, keys::COMMUTER, &commuter).await;
        if remote && !commuter.anonymous {
            save_remote(shared, commuter).await;
        }
    }
}

async fn write<T: serde::Serialize + Sync>(shared: &Shared, key: &str, value: &T) {
    if let Err(e) = cache::write(shared.cache.as_ref(), key, value).await {
        shared.report(BackgroundTask::CacheWrite, &e);
    }
}

/// Copy the server identity onto a change queued before the commuter was
/// first created remotely.
async fn adopt_identity(shared: &Shared, commuter: &mut Commuter) {
    if commuter.id.is_some() {
        return;
    }
    let state = shared.state.read().await;
    if let Some(current) = state.commuter.as_ref().filter(|c| c.id.is_some()) {
        commuter.id = current.id;
        commuter.link.clone_from(&current.link);
    }
}

async fn save_remote(shared: &Shared, commuter: Commuter) {
    let created = commuter.id.is_none();
    let result = if created {
        shared.api.create_commuter(&commuter).await
    } else {
        shared.api.save_commuter(&commuter).await
    };

    let saved = match result {
        Ok(saved) => saved,
        Err(e) => {
            shared.report(BackgroundTask::RemoteSave, &e);
            return;
        }
    };

    if created && saved.id.is_some() {
        let updated = {
            let mut state = shared.state.write().await;
            state
                .commuter
                .as_mut()
                .filter(|current| current.id.is_none())
                .map(|current| {
                    current.id = saved.id;
                    current.link.clone_from(&saved.link);
                    current.clone()
                })
        };
        if let Some(updated) = updated {
            write(shared, keys::COMMUTER, &updated).await;
        }
    }

    tracing::debug!(commuter = ?saved.id, created, "Commuter saved");
    shared.publish(SessionEvent::CommuterSaved);
}
