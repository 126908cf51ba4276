// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Persisted scalar state.
//!
//! Rigup keeps a handful of tiny values between runs, e.g., the snooze
//! deadline and the version marker written by the installer. Each value is a
//! single string stored under a key. Components receive a [`StateStore`]
//! instead of reaching for fixed paths themselves, so tests can swap in a
//! [`MemoryStore`].
//!
//! # File Layout
//!
//! [`FileStore`] maps every key to a file of the same name inside its root
//! directory, which defaults to `$XDG_CONFIG_HOME/rigup`. Writing a key
//! replaces the whole file. Values never accumulate.

use std::{
    cell::RefCell,
    collections::HashMap,
    fs::{read_to_string, remove_file, write},
    io::ErrorKind,
    path::PathBuf,
};
use tracing::debug;

/// Key-value storage for persisted scalars.
pub trait StateStore {
    /// Read value stored under key, if any.
    fn read(&self, key: &str) -> Result<Option<String>>;

    /// Replace value stored under key.
    fn write(&self, key: &str, value: &str) -> Result<()>;

    /// Remove value stored under key. Removing a missing key is not an error.
    fn remove(&self, key: &str) -> Result<()>;
}

/// State store backed by one file per key.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Construct new file store rooted at target directory.
    ///
    /// The directory is only created once something gets written.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn key_path(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }
}

impl StateStore for FileStore {
    fn read(&self, key: &str) -> Result<Option<String>> {
        let path = self.key_path(key);
        match read_to_string(&path) {
            Ok(content) => Ok(Some(content)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(StateError::Read { source: err, path }),
        }
    }

    fn write(&self, key: &str, value: &str) -> Result<()> {
        mkdirp::mkdirp(&self.root).map_err(|err| StateError::CreateRoot {
            source: err,
            path: self.root.clone(),
        })?;

        let path = self.key_path(key);
        debug!("write state {key:?} to {}", path.display());
        write(&path, value.as_bytes()).map_err(|err| StateError::Write { source: err, path })
    }

    fn remove(&self, key: &str) -> Result<()> {
        let path = self.key_path(key);
        match remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(StateError::Remove { source: err, path }),
        }
    }
}

/// State store that lives only as long as the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: RefCell<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateStore for MemoryStore {
    fn read(&self, key: &str) -> Result<Option<String>> {
        Ok(self.values.borrow().get(key).cloned())
    }

    fn write(&self, key: &str, value: &str) -> Result<()> {
        self.values
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.values.borrow_mut().remove(key);
        Ok(())
    }
}

/// State store error types.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    /// State directory cannot be created.
    #[error("failed to create state directory at {:?}", path.display())]
    CreateRoot {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// State file cannot be read from.
    #[error("failed to read state from {:?}", path.display())]
    Read {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// State file cannot be written to.
    #[error("failed to write state to {:?}", path.display())]
    Write {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// State file cannot be removed.
    #[error("failed to remove state at {:?}", path.display())]
    Remove {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },
}

/// Friendly result alias :3
pub type Result<T, E = StateError> = std::result::Result<T, E>;
