use std::{
    fs, io,
    path::{Path, PathBuf},
};

use clipkeep_core::{
    ClipboardEntry, EntryId, EntryUpdate, MAX_UNPINNED_ENTRIES, NewEntry, join_paths, now_unix_ms,
};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::{FileMaterializer, StoreError};

pub const HISTORY_FILE_NAME: &str = "history.json";
pub const FILES_DIR_NAME: &str = "files";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub history_path: PathBuf,
    pub files_dir: PathBuf,
    /// Cap on non-favorite entries.
    pub max_unpinned: usize,
}

impl StoreConfig {
    pub fn in_dir(data_dir: &Path) -> Self {
        Self {
            history_path: data_dir.join(HISTORY_FILE_NAME),
            files_dir: data_dir.join(FILES_DIR_NAME),
            max_unpinned: MAX_UNPINNED_ENTRIES,
        }
    }

    pub fn with_max_unpinned(mut self, max_unpinned: usize) -> Self {
        self.max_unpinned = max_unpinned.max(1);
        self
    }
}

/// Receives the full history after every mutation.
pub trait HistoryObserver: Send {
    fn history_changed(&self, entries: &[ClipboardEntry]);
}

impl HistoryObserver for watch::Sender<Vec<ClipboardEntry>> {
    fn history_changed(&self, entries: &[ClipboardEntry]) {
        self.send_replace(entries.to_vec());
    }
}

type Clock = Box<dyn Fn() -> u64 + Send>;

/// Ordered clipboard history backed by a JSON file.
///
/// Order is always favorites newest-first, then the rest newest-first. The
/// file is read on first access, not at construction.
pub struct HistoryStore {
    config: StoreConfig,
    materializer: FileMaterializer,
    entries: Vec<ClipboardEntry>,
    loaded: bool,
    observer: Option<Box<dyn HistoryObserver>>,
    clock: Clock,
}

impl HistoryStore {
    pub fn new(config: StoreConfig) -> Self {
        Self {
            materializer: FileMaterializer::new(config.files_dir.clone()),
            config,
            entries: Vec::new(),
            loaded: false,
            observer: None,
            clock: Box::new(now_unix_ms),
        }
    }

    pub fn with_clock(mut self, clock: impl Fn() -> u64 + Send + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn set_observer(&mut self, observer: impl HistoryObserver + 'static) {
        self.observer = Some(Box::new(observer));
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn materializer(&self) -> &FileMaterializer {
        &self.materializer
    }

    /// Inserts a capture at the top.
    ///
    /// Returns `Ok(None)` when the top entry already has the same hash. A match
    /// further down is moved to the top keeping its id and files.
    pub fn add(&mut self, new: NewEntry) -> Result<Option<ClipboardEntry>, StoreError> {
        self.ensure_loaded();

        let hash = new.fingerprint();
        if self.entries.first().is_some_and(|top| top.hash == hash) {
            debug!("capture matches top of history; skipping");
            return Ok(None);
        }

        let now = self.next_stamp();
        let entry = match self.entries.iter().position(|e| e.hash == hash) {
            Some(index) => {
                let mut existing = self.entries.remove(index);
                existing.created_at = now;
                debug!(id = %existing.id, from = index, "duplicate capture moved to top");
                existing
            }
            None => self.build_entry(new, hash, now)?,
        };

        self.entries.insert(0, entry.clone());
        self.save();
        Ok(Some(entry))
    }

    fn build_entry(
        &self,
        new: NewEntry,
        hash: String,
        created_at: u64,
    ) -> Result<ClipboardEntry, StoreError> {
        let id = new_entry_id();
        let (content, metadata) = if new.kind.is_file_backed() {
            if new.files.is_empty() {
                return Err(StoreError::MissingFiles);
            }
            let metadata = self.materializer.materialize(&id, &new.files)?;
            let content = join_paths(metadata.iter().map(|m| m.path.as_path()));
            (content, metadata)
        } else {
            (new.content, Vec::new())
        };

        info!(id = %id, kind = ?new.kind, "new history entry");
        Ok(ClipboardEntry {
            id,
            kind: new.kind,
            content,
            metadata,
            hash,
            created_at,
            is_favorite: new.is_favorite,
        })
    }

    pub fn update(&mut self, id: &str, update: EntryUpdate) -> Option<ClipboardEntry> {
        self.ensure_loaded();

        let entry = self.entries.iter_mut().find(|e| e.id == id)?;
        if let Some(is_favorite) = update.is_favorite {
            entry.is_favorite = is_favorite;
        }
        let updated = entry.clone();
        self.save();
        Some(updated)
    }

    /// Moves an entry to the top of its group with a fresh timestamp.
    pub fn promote(&mut self, id: &str) -> Option<ClipboardEntry> {
        self.ensure_loaded();

        let now = self.next_stamp();
        let index = self.entries.iter().position(|e| e.id == id)?;
        let mut entry = self.entries.remove(index);
        entry.created_at = now;
        self.entries.insert(0, entry.clone());
        self.save();
        Some(entry)
    }

    /// Clock reading that never sorts below an existing entry, so a restamped
    /// entry leads its group even when the clock repeats or steps back.
    fn next_stamp(&self) -> u64 {
        let newest = self.entries.iter().map(|e| e.created_at).max().unwrap_or(0);
        (self.clock)().max(newest)
    }

    pub fn remove(&mut self, id: &str) -> bool {
        self.ensure_loaded();

        let Some(index) = self.entries.iter().position(|e| e.id == id) else {
            return false;
        };
        let removed = self.entries.remove(index);
        self.materializer.discard(&removed.id);
        self.save();
        true
    }

    pub fn clear(&mut self) {
        self.ensure_loaded();

        for entry in self.entries.drain(..) {
            self.materializer.discard(&entry.id);
        }
        self.save();
    }

    pub fn find(&mut self, id: &str) -> Option<ClipboardEntry> {
        self.ensure_loaded();
        self.entries.iter().find(|e| e.id == id).cloned()
    }

    pub fn get_all(&mut self) -> Vec<ClipboardEntry> {
        self.ensure_loaded();
        self.entries.clone()
    }

    pub fn len(&mut self) -> usize {
        self.ensure_loaded();
        self.entries.len()
    }

    pub fn is_empty(&mut self) -> bool {
        self.len() == 0
    }

    fn ensure_loaded(&mut self) {
        if self.loaded {
            return;
        }
        self.loaded = true;

        match load_history(&self.config.history_path) {
            Ok(entries) => {
                debug!(count = entries.len(), "history loaded");
                self.entries = entries;
            }
            Err(err) => {
                error!(
                    path = %self.config.history_path.display(),
                    "history unreadable; starting empty: {err}"
                );
                self.entries.clear();
            }
        }
    }

    /// Reorders, evicts, persists and notifies. Disk failures are logged and
    /// the in-memory list still moves to the new state.
    fn save(&mut self) {
        let (mut favorites, mut others): (Vec<ClipboardEntry>, Vec<ClipboardEntry>) =
            std::mem::take(&mut self.entries)
                .into_iter()
                .partition(|e| e.is_favorite);

        favorites.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        others.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let evicted = if others.len() > self.config.max_unpinned {
            others.split_off(self.config.max_unpinned)
        } else {
            Vec::new()
        };
        for entry in &evicted {
            debug!(id = %entry.id, "evicting history entry");
            self.materializer.discard(&entry.id);
        }

        favorites.extend(others);
        self.entries = favorites;

        if let Err(err) = write_history(&self.config.history_path, &self.entries) {
            warn!(path = %self.config.history_path.display(), "{err}");
        }

        if let Some(observer) = &self.observer {
            observer.history_changed(&self.entries);
        }
    }
}

/// Reads a history file. A missing file is an empty history.
pub fn load_history(path: &Path) -> Result<Vec<ClipboardEntry>, StoreError> {
    let data = match fs::read_to_string(path) {
        Ok(data) => data,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(StoreError::Read(err)),
    };
    serde_json::from_str(&data).map_err(StoreError::Parse)
}

fn write_history(path: &Path, entries: &[ClipboardEntry]) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(StoreError::Write)?;
    }

    let tmp = path.with_extension("json.tmp");
    let payload = serde_json::to_string_pretty(entries).map_err(StoreError::Serialize)?;
    fs::write(&tmp, payload.as_bytes()).map_err(StoreError::Write)?;
    fs::rename(&tmp, path).map_err(StoreError::Write)?;
    Ok(())
}

fn new_entry_id() -> EntryId {
    hex::encode(rand::random::<[u8; 16]>())
}
