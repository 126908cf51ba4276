// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Managed repositories.
//!
//! Rigup manages two repositories: the __core__ repository that contains
//! rigup itself, and an optional __overlay__ repository that an organization
//! layers on top of it. The core repository follows a tag-based release
//! channel model. The overlay has no channels and always tracks the default
//! branch of its remote.
//!
//! # Discovery
//!
//! Handles are discovered once at startup by probing candidate paths in
//! order: the durable copy inside rigup's store first, then any configured
//! search paths. Search paths may be glob patterns. The first candidate that
//! is a repository wins.

use crate::{
    marker::VersionMarker,
    vcs::{short_id, Vcs, VcsError},
    version::resolve_latest,
};

use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    path::{Path, PathBuf},
};
use tracing::{debug, warn};

/// Kind of managed repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RepoKind {
    Core,
    Overlay,
}

impl RepoKind {
    /// Name used for labels and durable store entries.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Core => "core",
            Self::Overlay => "overlay",
        }
    }

    /// Location of durable copy inside store directory.
    pub fn durable_path(&self, store: impl AsRef<Path>) -> PathBuf {
        store.as_ref().join(self.as_str())
    }
}

impl Display for RepoKind {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(self.as_str())
    }
}

/// Handle to a discovered repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryHandle {
    pub kind: RepoKind,
    pub local_path: PathBuf,
    pub remote_url: String,
    installed_ref: String,
}

impl RepositoryHandle {
    pub fn new(
        kind: RepoKind,
        local_path: impl Into<PathBuf>,
        remote_url: impl Into<String>,
        installed_ref: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            local_path: local_path.into(),
            remote_url: remote_url.into(),
            installed_ref: installed_ref.into(),
        }
    }

    /// Reference currently installed.
    ///
    /// A version tag for the core repository, and an abbreviated commit for
    /// the overlay.
    pub fn installed_ref(&self) -> &str {
        self.installed_ref.as_str()
    }

    pub(crate) fn set_installed_ref(&mut self, installed_ref: impl Into<String>) {
        self.installed_ref = installed_ref.into();
    }

    /// Discover repository among candidate paths.
    ///
    /// The remote URL comes from the repository's `origin`, falling back to
    /// the configured URL. For the core repository, the installed reference
    /// comes from the version marker if there is one, otherwise from the tags
    /// pointing at HEAD, and finally from HEAD itself.
    ///
    /// # Errors
    ///
    /// - Return [`DiscoverError::NotFound`] if no candidate is a repository.
    /// - Return [`DiscoverError::Vcs`] if HEAD of discovered repository
    ///   cannot be read.
    pub fn discover(
        vcs: &impl Vcs,
        kind: RepoKind,
        candidates: &[PathBuf],
        configured_url: &str,
        marker: Option<&VersionMarker>,
    ) -> Result<Self> {
        let local_path = candidates
            .iter()
            .find(|path| {
                debug!("probe {kind} candidate {}", path.display());
                vcs.is_repository(path)
            })
            .ok_or_else(|| DiscoverError::NotFound {
                kind,
                searched: candidates.to_vec(),
            })?;

        let remote_url = match vcs.origin_url(local_path) {
            Ok(url) => url,
            Err(err) => {
                warn!("using configured {kind} remote: {err}");
                configured_url.to_string()
            }
        };

        let head = vcs.head_commit(local_path)?;
        let installed_ref = match (kind, marker) {
            (RepoKind::Core, Some(marker)) => marker.tag.to_string(),
            (RepoKind::Core, None) => resolve_latest(vcs.head_tags(local_path)?)
                .map(|tag| tag.to_string())
                .unwrap_or_else(|| short_id(&head).to_string()),
            (RepoKind::Overlay, _) => short_id(&head).to_string(),
        };

        debug!("discovered {kind} at {} on {installed_ref}", local_path.display());

        Ok(Self::new(kind, local_path.clone(), remote_url, installed_ref))
    }
}

/// Expand search paths into candidate paths, durable path first.
///
/// Search paths containing glob patterns expand to every existing match in
/// sorted order. Invalid patterns are skipped with a warning.
pub fn candidate_paths(durable: impl Into<PathBuf>, search_paths: &[String]) -> Vec<PathBuf> {
    let mut candidates = vec![durable.into()];
    for pattern in search_paths {
        match glob::glob(pattern) {
            Ok(paths) => {
                let mut matched = paths.filter_map(|path| path.ok()).collect::<Vec<_>>();
                matched.sort();
                candidates.extend(matched);
            }
            Err(err) => warn!("skipping invalid search path {pattern:?}: {err}"),
        }
    }

    candidates.dedup();
    candidates
}

/// Repository discovery error types.
#[derive(Debug, thiserror::Error)]
pub enum DiscoverError {
    /// No candidate path holds a repository.
    #[error("no {kind} repository found, searched {searched:?}")]
    NotFound {
        kind: RepoKind,
        searched: Vec<PathBuf>,
    },

    /// Discovered repository cannot be inspected.
    #[error(transparent)]
    Vcs(#[from] VcsError),
}

/// Friendly result alias :3
pub type Result<T, E = DiscoverError> = std::result::Result<T, E>;
