// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Reference resolution and checkout.
//!
//! A user-supplied name may be a tag, a branch, or anything else the remote
//! is willing to hand over by name. Rather than asking the user which one
//! they meant, rigup walks a fixed fallback chain of shallow fetches:
//!
//! 1. Fetch the name directly into a scratch reference.
//! 2. Fetch every remote branch and look for a branch of that name.
//! 3. Fetch a tag of that name explicitly.
//!
//! The first step that produces a commit wins. Only after a commit is known
//! does anything touch the working tree, so a failed resolution leaves the
//! repository exactly as it was.
//!
//! Full commit identifiers are refused up front. Shallow fetches cannot
//! reliably reach an arbitrary commit, and a detached commit has no name to
//! report later.

use crate::{
    repo::{RepoKind, RepositoryHandle},
    trust::TrustMarker,
    vcs::{is_full_commit_id, short_id, AdoptedRef, RefKind, Vcs, VcsError},
    version::resolve_latest,
};

use std::path::Path;
use tracing::{debug, info, instrument, warn};

/// Local reference that direct fetches land in.
pub const SCRATCH_REF: &str = "refs/rigup/fetched";

/// Refspec mirroring every remote branch into remote-tracking references.
pub const BRANCHES_REFSPEC: &str = "+refs/heads/*:refs/remotes/origin/*";

/// Position in the fallback chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    TryDirect,
    TryBranch,
    TryTag,
    Failed,
    Resolved(AdoptedRef),
}

/// Resolves a name into a commit through the fallback chain.
///
/// Each step is independent. Driving the chain one step at a time through
/// [`RefResolver::advance`] is how the chain is observed in isolation.
#[derive(Debug)]
pub struct RefResolver<'vcs, V: Vcs> {
    vcs: &'vcs V,
    path: &'vcs Path,
    target: &'vcs str,
}

impl<'vcs, V: Vcs> RefResolver<'vcs, V> {
    pub fn new(vcs: &'vcs V, path: &'vcs Path, target: &'vcs str) -> Self {
        Self { vcs, path, target }
    }

    /// Run the chain until it resolves or runs out of steps.
    ///
    /// # Errors
    ///
    /// - Return [`CheckoutError::RefNotFound`] if no step finds the name.
    pub fn resolve(&self, remote_url: &str) -> Result<AdoptedRef> {
        let mut step = Step::TryDirect;
        loop {
            step = match step {
                Step::Resolved(adopted) => return Ok(adopted),
                Step::Failed => {
                    return Err(CheckoutError::RefNotFound {
                        target: self.target.to_string(),
                        url: remote_url.to_string(),
                    })
                }
                step => self.advance(step),
            }
        }
    }

    /// Perform one step of the chain and return the next one.
    pub fn advance(&self, step: Step) -> Step {
        let target = self.target;
        match step {
            Step::TryDirect => {
                // INVARIANT: A stale scratch ref from an earlier run must never
                // be mistaken for a fresh result.
                if let Err(err) = self.vcs.remove_ref(self.path, SCRATCH_REF) {
                    debug!("cannot clear {SCRATCH_REF}: {err}");
                }

                let candidates = [
                    (SCRATCH_REF.to_string(), RefKind::Named),
                    (format!("refs/tags/{target}"), RefKind::Tag),
                ];
                self.attempt(format!("+{target}:{SCRATCH_REF}"), &candidates)
                    .map_or(Step::TryBranch, Step::Resolved)
            }
            Step::TryBranch => {
                let candidates = [(format!("refs/remotes/origin/{target}"), RefKind::Branch)];
                self.attempt(BRANCHES_REFSPEC.to_string(), &candidates)
                    .map_or(Step::TryTag, Step::Resolved)
            }
            Step::TryTag => {
                let candidates = [(format!("refs/tags/{target}"), RefKind::Tag)];
                self.attempt(format!("+refs/tags/{target}:refs/tags/{target}"), &candidates)
                    .map_or(Step::Failed, Step::Resolved)
            }
            Step::Failed | Step::Resolved(_) => step,
        }
    }

    fn attempt(&self, refspec: String, candidates: &[(String, RefKind)]) -> Option<AdoptedRef> {
        debug!("fetch {refspec}");
        if let Err(err) = self.vcs.fetch(self.path, &[refspec]) {
            debug!("fetch failed: {err}");
            return None;
        }

        for (name, kind) in candidates {
            match self.vcs.resolve_ref(self.path, name) {
                Ok(Some(commit)) => {
                    return Some(AdoptedRef {
                        name: self.target.to_string(),
                        commit,
                        kind: *kind,
                    })
                }
                Ok(None) => continue,
                Err(err) => debug!("cannot resolve {name}: {err}"),
            }
        }

        None
    }
}

/// Resolve target and check it out in the repository behind the handle.
///
/// Without a target, the core repository adopts the best version tag on its
/// remote, and the overlay adopts its remote's default branch. If the
/// resolved commit is already checked out, the working tree is left alone.
/// Otherwise local changes are stashed on a best-effort basis before the
/// checkout. On success the handle's installed reference is updated and the
/// repository is trusted if it carries a trust marker.
///
/// # Errors
///
/// - Return [`CheckoutError::UnsupportedRefKind`] for full commit
///   identifiers, before any network access.
/// - Return [`CheckoutError::NoRecognizedTag`] or
///   [`CheckoutError::NoDefaultBranch`] if no default target exists.
/// - Return [`CheckoutError::RefNotFound`] if the fallback chain fails.
/// - Return [`CheckoutError::Vcs`] if the checkout itself fails. The working
///   tree is left at its prior state in that case.
#[instrument(skip(vcs, trust, repo), fields(kind = %repo.kind), level = "debug")]
pub fn resolve_and_checkout(
    vcs: &impl Vcs,
    trust: &TrustMarker,
    repo: &mut RepositoryHandle,
    target: Option<&str>,
) -> Result<AdoptedRef> {
    if let Some(target) = target {
        if is_full_commit_id(target) {
            return Err(CheckoutError::UnsupportedRefKind(target.to_string()));
        }
    }

    let target = match target {
        Some(target) => target.to_string(),
        None => default_target(vcs, repo)?,
    };

    let path = repo.local_path.clone();
    let adopted = RefResolver::new(vcs, &path, &target).resolve(&repo.remote_url)?;
    let head = vcs.head_commit(&path)?;

    if head == adopted.commit {
        info!("{} already at {adopted}", repo.kind);
    } else {
        let stashed = match vcs.stash(&path) {
            Ok(stashed) => stashed,
            Err(err) => {
                warn!("cannot stash local changes in {}: {err}", path.display());
                false
            }
        };
        if stashed {
            info!("local changes in {} were stashed", path.display());
        }

        if let Err(err) = vcs.checkout(&path, &adopted) {
            // INVARIANT: A failed checkout hands local changes back.
            if stashed {
                if let Err(pop) = vcs.stash_pop(&path) {
                    warn!(
                        "cannot restore stashed changes in {}: {pop}",
                        path.display()
                    );
                }
            }
            return Err(err.into());
        }
    }

    trust.apply(&path);

    let installed = match repo.kind {
        RepoKind::Core => adopted.name.clone(),
        RepoKind::Overlay => short_id(&adopted.commit).to_string(),
    };
    repo.set_installed_ref(installed);

    Ok(adopted)
}

fn default_target(vcs: &impl Vcs, repo: &RepositoryHandle) -> Result<String> {
    let listing = vcs.ls_remote(&repo.remote_url)?;
    match repo.kind {
        RepoKind::Core => resolve_latest(&listing.tags)
            .map(|tag| tag.to_string())
            .ok_or_else(|| CheckoutError::NoRecognizedTag {
                url: repo.remote_url.clone(),
            }),
        RepoKind::Overlay => listing
            .default_branch
            .ok_or_else(|| CheckoutError::NoDefaultBranch {
                url: repo.remote_url.clone(),
            }),
    }
}

/// Reference resolution and checkout error types.
#[derive(Debug, thiserror::Error)]
pub enum CheckoutError {
    /// No fallback step could resolve target.
    #[error(
        "reference {target:?} not found on {url}, check that it exists there as a branch or tag"
    )]
    RefNotFound { target: String, url: String },

    /// Target is a form of reference that cannot be adopted.
    #[error("cannot check out commit {0}, use a branch or tag name instead")]
    UnsupportedRefKind(String),

    /// Remote has no version tag to adopt by default.
    #[error("no release tags found on {url}")]
    NoRecognizedTag { url: String },

    /// Remote does not advertise a default branch.
    #[error("{url} does not advertise a default branch")]
    NoDefaultBranch { url: String },

    /// Version control operation failed.
    #[error(transparent)]
    Vcs(#[from] VcsError),
}

/// Friendly result alias :3
pub type Result<T, E = CheckoutError> = std::result::Result<T, E>;
