// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Version control capabilities.
//!
//! Everything rigup needs from git sits behind the [`Vcs`] trait: listing
//! what a remote advertises, shallow clones and fetches, resolving local
//! references, and moving a working tree around. The update logic only ever
//! talks to this trait, so it can be exercised against a fake in tests
//! without a real remote.
//!
//! # Remotes
//!
//! Every managed repository has exactly one remote named `origin`. Rigup
//! never adds, renames, or removes remotes.
//!
//! # See Also
//!
//! 1. [`Git2Vcs`]

mod libgit;

#[cfg(test)]
pub(crate) mod fake;

pub use libgit::{Git2Vcs, IndicatifPrompter};

use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    path::{Path, PathBuf},
    time::Duration,
};

/// Length of abbreviated commit identifiers shown to the user.
pub const SHORT_ID_LEN: usize = 7;

/// Abbreviate commit identifier.
pub fn short_id(commit: &str) -> &str {
    commit.get(..SHORT_ID_LEN).unwrap_or(commit)
}

/// Check if text looks like a full 40 digit hexadecimal commit identifier.
pub fn is_full_commit_id(text: &str) -> bool {
    text.len() == 40 && text.bytes().all(|byte| byte.is_ascii_hexdigit())
}

/// Everything a remote advertised in one round trip.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RemoteListing {
    /// Commit that the remote's HEAD points at.
    pub head: Option<String>,

    /// Short name of the branch the remote's HEAD points at.
    pub default_branch: Option<String>,

    /// Tag names without the `refs/tags/` prefix.
    pub tags: Vec<String>,

    /// Branch names without the `refs/heads/` prefix.
    pub branches: Vec<String>,
}

/// How an adopted reference was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefKind {
    /// Resolved as a tag. Checked out with a detached HEAD.
    Tag,

    /// Resolved as a remote branch. Checked out as a local branch.
    Branch,

    /// Resolved by fetching the name directly. Checked out with a detached HEAD.
    Named,
}

/// Reference that was resolved and is about to be, or has been, checked out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdoptedRef {
    pub name: String,
    pub commit: String,
    pub kind: RefKind,
}

impl Display for AdoptedRef {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        write!(fmt, "{} ({})", self.name, short_id(&self.commit))
    }
}

/// Version control operations used by the update logic.
pub trait Vcs {
    /// Check if path is the top-level of a repository.
    fn is_repository(&self, path: &Path) -> bool;

    /// URL of the `origin` remote of repository at path.
    fn origin_url(&self, path: &Path) -> Result<String>;

    /// Commit that HEAD currently points at.
    fn head_commit(&self, path: &Path) -> Result<String>;

    /// Local tags that point at the HEAD commit.
    fn head_tags(&self, path: &Path) -> Result<Vec<String>>;

    /// List what remote advertises without touching any repository.
    fn ls_remote(&self, url: &str) -> Result<RemoteListing>;

    /// Shallow clone remote into path, optionally checking out a branch.
    fn clone_repo(&self, url: &str, path: &Path, branch: Option<&str>) -> Result<()>;

    /// Shallow fetch refspecs from `origin`.
    fn fetch(&self, path: &Path, refspecs: &[String]) -> Result<()>;

    /// Resolve full reference name to a commit, if it exists locally.
    fn resolve_ref(&self, path: &Path, name: &str) -> Result<Option<String>>;

    /// Delete local reference if it exists.
    fn remove_ref(&self, path: &Path, name: &str) -> Result<()>;

    /// Stash local modifications. Returns whether anything was stashed.
    fn stash(&self, path: &Path) -> Result<bool>;

    /// Restore most recent stash entry and drop it.
    fn stash_pop(&self, path: &Path) -> Result<()>;

    /// Move working tree and HEAD to adopted reference, all or nothing.
    fn checkout(&self, path: &Path, target: &AdoptedRef) -> Result<()>;

    /// Hard reset working tree and current branch to a revision.
    fn hard_reset(&self, path: &Path, revision: &str) -> Result<()>;
}

/// Version control error types.
#[derive(Debug, thiserror::Error)]
pub enum VcsError {
    /// Network operation ran past its deadline.
    #[error("remote operation timed out after {}s", timeout.as_secs())]
    TimedOut {
        #[source]
        source: git2::Error,
        timeout: Duration,
    },

    /// Repository has no usable `origin` remote URL.
    #[error("repository at {:?} has no origin URL", path.display())]
    NoOriginUrl { path: PathBuf },

    /// Style template cannot be set for progress bars.
    #[error(transparent)]
    IndicatifStyleTemplate(#[from] indicatif::style::TemplateError),

    /// Operations from libgit2 fail.
    #[error(transparent)]
    Git2(#[from] git2::Error),
}

/// Friendly result alias :3
pub type Result<T, E = VcsError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn abbreviate_commit_ids() {
        assert_eq!(short_id("0123456789abcdef"), "0123456");
        assert_eq!(short_id("abc"), "abc");
    }

    #[test]
    fn detect_full_commit_ids() {
        assert!(is_full_commit_id("0123456789abcdef0123456789ABCDEF01234567"));
        assert!(!is_full_commit_id("0123456789abcdef"));
        assert!(!is_full_commit_id("g123456789abcdef0123456789abcdef01234567"));
        assert!(!is_full_commit_id("v1.2.3"));
    }
}
