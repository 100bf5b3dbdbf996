use std::thread::{self, JoinHandle};

use clipkeep_core::{ClipboardEntry, EntryId, EntryUpdate, NewEntry};
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::{HistoryStore, StoreError};

enum StoreCommand {
    Add {
        entry: NewEntry,
        reply: oneshot::Sender<Result<Option<ClipboardEntry>, StoreError>>,
    },
    Update {
        id: EntryId,
        update: EntryUpdate,
        reply: oneshot::Sender<Option<ClipboardEntry>>,
    },
    Promote {
        id: EntryId,
        reply: oneshot::Sender<Option<ClipboardEntry>>,
    },
    Remove {
        id: EntryId,
        reply: oneshot::Sender<bool>,
    },
    Find {
        id: EntryId,
        reply: oneshot::Sender<Option<ClipboardEntry>>,
    },
    GetAll {
        reply: oneshot::Sender<Vec<ClipboardEntry>>,
    },
    Clear {
        reply: oneshot::Sender<()>,
    },
    Len {
        reply: oneshot::Sender<usize>,
    },
}

/// Cloneable access to a [`HistoryStore`] owned by a single worker thread.
///
/// Commands are applied one at a time in arrival order, so an `add` that is
/// copying files cannot interleave with another mutation.
#[derive(Debug, Clone)]
pub struct HistoryHandle {
    tx: mpsc::UnboundedSender<StoreCommand>,
}

/// Moves `store` onto a dedicated thread. The thread exits once every
/// handle has been dropped.
pub fn spawn_history_service(
    mut store: HistoryStore,
) -> Result<(HistoryHandle, JoinHandle<()>), StoreError> {
    let (tx, mut rx) = mpsc::unbounded_channel::<StoreCommand>();

    let worker = thread::Builder::new()
        .name("clipkeep-history".to_owned())
        .spawn(move || {
            while let Some(command) = rx.blocking_recv() {
                handle_command(&mut store, command);
            }
            debug!("history service stopped");
        })
        .map_err(StoreError::Spawn)?;

    Ok((HistoryHandle { tx }, worker))
}

fn handle_command(store: &mut HistoryStore, command: StoreCommand) {
    // A dropped reply receiver only means the caller stopped waiting.
    match command {
        StoreCommand::Add { entry, reply } => {
            let _ = reply.send(store.add(entry));
        }
        StoreCommand::Update { id, update, reply } => {
            let _ = reply.send(store.update(&id, update));
        }
        StoreCommand::Promote { id, reply } => {
            let _ = reply.send(store.promote(&id));
        }
        StoreCommand::Remove { id, reply } => {
            let _ = reply.send(store.remove(&id));
        }
        StoreCommand::Find { id, reply } => {
            let _ = reply.send(store.find(&id));
        }
        StoreCommand::GetAll { reply } => {
            let _ = reply.send(store.get_all());
        }
        StoreCommand::Clear { reply } => {
            store.clear();
            let _ = reply.send(());
        }
        StoreCommand::Len { reply } => {
            let _ = reply.send(store.len());
        }
    }
}

impl HistoryHandle {
    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> StoreCommand,
    ) -> Result<T, StoreError> {
        let (reply, response) = oneshot::channel();
        self.tx
            .send(build(reply))
            .map_err(|_| StoreError::ServiceClosed)?;
        response.await.map_err(|_| StoreError::ServiceClosed)
    }

    pub async fn add(&self, entry: NewEntry) -> Result<Option<ClipboardEntry>, StoreError> {
        self.request(|reply| StoreCommand::Add { entry, reply }).await?
    }

    pub async fn update(
        &self,
        id: impl Into<EntryId>,
        update: EntryUpdate,
    ) -> Result<Option<ClipboardEntry>, StoreError> {
        let id = id.into();
        self.request(|reply| StoreCommand::Update { id, update, reply }).await
    }

    pub async fn set_favorite(
        &self,
        id: impl Into<EntryId>,
        is_favorite: bool,
    ) -> Result<Option<ClipboardEntry>, StoreError> {
        self.update(
            id,
            EntryUpdate {
                is_favorite: Some(is_favorite),
            },
        )
        .await
    }

    pub async fn promote(
        &self,
        id: impl Into<EntryId>,
    ) -> Result<Option<ClipboardEntry>, StoreError> {
        let id = id.into();
        self.request(|reply| StoreCommand::Promote { id, reply }).await
    }

    pub async fn remove(&self, id: impl Into<EntryId>) -> Result<bool, StoreError> {
        let id = id.into();
        self.request(|reply| StoreCommand::Remove { id, reply }).await
    }

    pub async fn find(
        &self,
        id: impl Into<EntryId>,
    ) -> Result<Option<ClipboardEntry>, StoreError> {
        let id = id.into();
        self.request(|reply| StoreCommand::Find { id, reply }).await
    }

    pub async fn get_all(&self) -> Result<Vec<ClipboardEntry>, StoreError> {
        self.request(|reply| StoreCommand::GetAll { reply }).await
    }

    pub async fn clear(&self) -> Result<(), StoreError> {
        self.request(|reply| StoreCommand::Clear { reply }).await
    }

    pub async fn len(&self) -> Result<usize, StoreError> {
        self.request(|reply| StoreCommand::Len { reply }).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StoreConfig;

    #[tokio::test]
    async fn worker_exits_when_last_handle_dropped() {
        let dir = tempfile::tempdir().expect("create tempdir");
        let store = HistoryStore::new(StoreConfig::in_dir(dir.path()));
        let (handle, worker) = spawn_history_service(store).expect("spawn history service");

        handle.add(NewEntry::text("one")).await.expect("add entry");
        assert_eq!(handle.len().await.expect("history length"), 1);

        let clone = handle.clone();
        drop(handle);
        assert_eq!(clone.get_all().await.expect("read history").len(), 1);
        drop(clone);
        worker.join().expect("join history worker");
    }

    #[tokio::test]
    async fn concurrent_adds_of_same_content_store_one_entry() {
        let dir = tempfile::tempdir().expect("create tempdir");
        let store = HistoryStore::new(StoreConfig::in_dir(dir.path()));
        let (handle, _worker) = spawn_history_service(store).expect("spawn history service");

        let a = handle.clone();
        let b = handle.clone();
        let (ra, rb) = tokio::join!(
            a.add(NewEntry::text("same")),
            b.add(NewEntry::text("same"))
        );

        let stored = [ra.expect("first add"), rb.expect("second add")];
        assert_eq!(stored.iter().filter(|r| r.is_some()).count(), 1);
        assert_eq!(handle.len().await.expect("history length"), 1);
    }
}
