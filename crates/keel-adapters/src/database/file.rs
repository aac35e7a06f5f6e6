//! JSON file persistence engine for the dev environment.
//!
//! The whole store is one pretty-printed document shaped
//! `{ "<collection>": { "<id>": <doc> } }`, so it can be read and edited by
//! hand between runs. Commits write a sibling temp file and rename it over
//! the store, which keeps the file intact if the process dies mid-write.
//!
//! Several engines (other containers, other processes) may share one store.
//! Every operation takes an advisory lock on a sibling `<store>.lock` file
//! and works on what is on disk at that moment: reads under a shared lock,
//! commits re-read, merge and replace under an exclusive one.

use std::{
    collections::BTreeMap,
    ffi::OsString,
    fs::{self, File, OpenOptions},
    io,
    path::{Path, PathBuf},
};

use fd_lock::RwLock as FileLock;
use keel_core::{
    application::{
        ApplicationError, EngineKind,
        ports::{Change, ChangeSet, DocumentKey, PersistenceEngine},
    },
    error::{KeelError, KeelResult},
};
use serde_json::Value;

type Collections = BTreeMap<String, BTreeMap<String, Value>>;

/// Document store backed by a single JSON file.
#[derive(Debug)]
pub struct FileEngine {
    path: PathBuf,
    lock_path: PathBuf,
}

impl FileEngine {
    /// Open the store at `path`, creating it (and its parent directories)
    /// when it does not exist yet.
    ///
    /// An existing store is parsed once so a corrupt file fails here rather
    /// than on first use.
    pub fn open(path: impl Into<PathBuf>) -> KeelResult<Self> {
        let path = path.into();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .map_err(|e| map_io_error(parent, e, "create directory"))?;
            }
        }

        let engine = Self {
            lock_path: sibling_path(&path, "lock"),
            path,
        };

        {
            let mut lock = engine.lock_file()?;
            let _guard = lock
                .write()
                .map_err(|e| map_io_error(&engine.lock_path, e, "lock store"))?;
            if engine.path.exists() {
                engine.read_store()?;
            } else {
                write_store(&engine.path, &Collections::new())?;
                tracing::info!(path = %engine.path.display(), "Created empty document store");
            }
        }

        Ok(engine)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock_file(&self) -> KeelResult<FileLock<File>> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.lock_path)
            .map_err(|e| map_io_error(&self.lock_path, e, "open lock file"))?;
        Ok(FileLock::new(file))
    }

    /// Current on-disk contents. Callers hold the store lock.
    fn read_store(&self) -> KeelResult<Collections> {
        match fs::read_to_string(&self.path) {
            Ok(raw) => parse_store(&self.path, &raw),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Collections::new()),
            Err(e) => Err(map_io_error(&self.path, e, "read store")),
        }
    }
}

impl PersistenceEngine for FileEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::File
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }

    fn load(&self, key: &DocumentKey) -> KeelResult<Option<Value>> {
        let lock = self.lock_file()?;
        let _guard = lock
            .read()
            .map_err(|e| map_io_error(&self.lock_path, e, "lock store"))?;

        let mut state = self.read_store()?;
        Ok(state
            .get_mut(&key.collection)
            .and_then(|docs| docs.remove(&key.id)))
    }

    fn apply(&self, changes: &ChangeSet) -> KeelResult<()> {
        if changes.is_empty() {
            return Ok(());
        }

        let mut lock = self.lock_file()?;
        let _guard = lock
            .write()
            .map_err(|e| map_io_error(&self.lock_path, e, "lock store"))?;

        // Merge onto what is on disk now, not what this engine last saw.
        let mut state = self.read_store()?;
        for change in changes.iter() {
            match change {
                Change::Put { collection, id, doc } => {
                    state
                        .entry(collection.to_string())
                        .or_default()
                        .insert(id.to_string(), doc.clone());
                }
                Change::Delete { collection, id } => {
                    if let Some(docs) = state.get_mut(collection) {
                        docs.remove(id);
                        if docs.is_empty() {
                            state.remove(collection);
                        }
                    }
                }
            }
        }

        write_store(&self.path, &state)?;

        tracing::debug!(
            path = %self.path.display(),
            changes = changes.len(),
            "Document store written"
        );
        Ok(())
    }

    fn ping(&self) -> KeelResult<()> {
        fs::metadata(&self.path)
            .map(|_| ())
            .map_err(|e| map_io_error(&self.path, e, "stat store"))
    }
}

fn parse_store(path: &Path, raw: &str) -> KeelResult<Collections> {
    if raw.trim().is_empty() {
        return Ok(Collections::new());
    }

    serde_json::from_str(raw).map_err(|e| {
        ApplicationError::persistence(format!(
            "{} is not a valid document store: {}",
            path.display(),
            e
        ))
        .into()
    })
}

fn write_store(path: &Path, state: &Collections) -> KeelResult<()> {
    let mut body = serde_json::to_string_pretty(state).map_err(|e| KeelError::Internal {
        message: format!("document store serialization failed: {e}"),
    })?;
    body.push('\n');

    let tmp = sibling_path(path, "tmp");
    fs::write(&tmp, body).map_err(|e| map_io_error(&tmp, e, "write file"))?;
    fs::rename(&tmp, path).map_err(|e| map_io_error(path, e, "replace store"))
}

/// `<dir>/<store name>.<extension>`
fn sibling_path(path: &Path, extension: &str) -> PathBuf {
    let mut name = path
        .file_name()
        .map(OsString::from)
        .unwrap_or_else(|| OsString::from("store"));
    name.push(".");
    name.push(extension);
    path.with_file_name(name)
}

fn map_io_error(path: &Path, e: io::Error, operation: &str) -> KeelError {
    ApplicationError::persistence(format!(
        "Failed to {} {}: {}",
        operation,
        path.display(),
        e
    ))
    .into()
}
