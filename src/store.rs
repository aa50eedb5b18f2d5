//! Flat-file state store.
//!
//! The whole collection of word entries lives in one JSON document that is
//! rewritten wholesale on every mutation. All access goes through a single
//! writer thread: each request is a message on a channel and the writer
//! runs load → mutate → save for one message at a time, so two generation
//! jobs finishing together cannot clobber each other's fields.

use std::path::{Path, PathBuf};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::model::{EntryId, WordEntry, WordState};

/// The backing JSON document. Synchronous; owned by the writer thread.
#[derive(Debug, Clone)]
pub struct JsonFile {
    path: PathBuf,
}

impl JsonFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every entry. A missing file is an empty collection.
    pub fn load(&self) -> Result<Vec<WordEntry>> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) if content.trim().is_empty() => Ok(Vec::new()),
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// Replace the document with `entries`.
    ///
    /// Writes a sibling temp file and renames it over the target, so a crash
    /// mid-write leaves the previous document intact.
    pub fn save(&self, entries: &[WordEntry]) -> Result<()> {
        let json = serde_json::to_string_pretty(entries)?;
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)?;
        debug!(path = %self.path.display(), entries = entries.len(), "state saved");
        Ok(())
    }
}

type Op = Box<dyn FnOnce(&JsonFile) + Send>;

/// Cloneable handle to the single-writer store.
#[derive(Clone)]
pub struct Store {
    tx: mpsc::UnboundedSender<Op>,
}

impl Store {
    /// Start the writer thread for the document at `path`.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let file = JsonFile::new(path);
        let (tx, mut rx) = mpsc::unbounded_channel::<Op>();

        std::thread::Builder::new()
            .name("lexideck-store".to_string())
            .spawn(move || {
                while let Some(op) = rx.blocking_recv() {
                    op(&file);
                }
                debug!(path = %file.path().display(), "store writer stopped");
            })?;

        Ok(Self { tx })
    }

    /// Run `f` on the writer thread and wait for its result.
    async fn run<R, F>(&self, f: F) -> Result<R>
    where
        R: Send + 'static,
        F: FnOnce(&JsonFile) -> Result<R> + Send + 'static,
    {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Box::new(move |file| {
                let _ = reply.send(f(file));
            }))
            .map_err(|_| Error::StoreClosed)?;
        rx.await.map_err(|_| Error::StoreClosed)?
    }

    /// Snapshot of every entry, in insertion order.
    pub async fn load(&self) -> Result<Vec<WordEntry>> {
        self.run(|file| file.load()).await
    }

    /// Full read-modify-write. The document is saved only if `f` succeeds.
    pub async fn update<R, F>(&self, f: F) -> Result<R>
    where
        R: Send + 'static,
        F: FnOnce(&mut Vec<WordEntry>) -> Result<R> + Send + 'static,
    {
        self.run(move |file| {
            let mut entries = file.load()?;
            let out = f(&mut entries)?;
            file.save(&entries)?;
            Ok(out)
        })
        .await
    }

    pub async fn get(&self, id: EntryId) -> Result<Option<WordEntry>> {
        let entries = self.load().await?;
        Ok(entries.into_iter().find(|e| e.id == id))
    }

    /// Resolve a full UUID or a unique prefix of one to an entry id.
    pub async fn resolve(&self, id_or_prefix: &str) -> Result<EntryId> {
        let entries = self.load().await?;
        let matches: Vec<EntryId> = entries
            .iter()
            .filter(|e| e.id.0.to_string().starts_with(id_or_prefix))
            .map(|e| e.id)
            .collect();
        match matches.as_slice() {
            [] => Err(Error::NotFound(id_or_prefix.to_string())),
            [id] => Ok(*id),
            many => Err(Error::Other(format!(
                "{} entries match prefix '{id_or_prefix}', be more specific",
                many.len()
            ))),
        }
    }

    /// Append new entries at the end of the document.
    pub async fn append(&self, new: Vec<WordEntry>) -> Result<()> {
        self.update(move |entries| {
            entries.extend(new);
            Ok(())
        })
        .await
    }

    /// Remove one entry, returning it.
    pub async fn remove(&self, id: EntryId) -> Result<WordEntry> {
        self.update(move |entries| {
            let idx = entries
                .iter()
                .position(|e| e.id == id)
                .ok_or_else(|| Error::NotFound(id.0.to_string()))?;
            Ok(entries.remove(idx))
        })
        .await
    }

    /// Remove every entry, or only those in `status`. Returns how many went.
    pub async fn clear(&self, status: Option<WordState>) -> Result<usize> {
        let removed = self
            .update(move |entries| {
                let before = entries.len();
                match status {
                    Some(s) => entries.retain(|e| e.status != s),
                    None => entries.clear(),
                }
                Ok(before - entries.len())
            })
            .await?;
        if removed == 0 {
            warn!(status = ?status, "clear removed nothing");
        }
        Ok(removed)
    }
}
