// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Durable copies of managed repositories.
//!
//! Rigup may have been started from a throwaway checkout, like a clone in a
//! temporary directory during first-time setup. Every update therefore also
//! brings a durable copy inside rigup's store up to date, cloning it the
//! first time around. The core copy is pinned to the same reference as the
//! source. The overlay copy always tracks its remote's default branch.

use crate::{
    repo::{RepoKind, RepositoryHandle},
    trust::TrustMarker,
    update::checkout::{resolve_and_checkout, CheckoutError, BRANCHES_REFSPEC},
    vcs::{Vcs, VcsError},
    version::resolve_latest,
};

use std::{
    fs::read_dir,
    path::{Path, PathBuf},
};
use tracing::{debug, info, instrument, warn};

/// What synchronizing a durable copy did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Durable copy did not exist and was cloned.
    Cloned,

    /// Durable copy moved to a new commit.
    Updated,

    /// Durable copy was already current.
    Unchanged,

    /// Source is not a repository, so there is nothing to persist.
    Skipped,
}

/// Bring durable copy of a repository in line with its source.
///
/// For the core repository, `desired_ref` names the reference to pin. If it
/// is absent, the release tag the source is sitting on is used, and failing
/// that the latest release on the remote. The overlay ignores `desired_ref`
/// and follows its remote's default branch. A fetch happens even when the
/// durable copy turns out to be current already.
///
/// # Errors
///
/// - Return [`SyncError::NoRemote`] if source has no `origin` URL.
/// - Return [`SyncError::Occupied`] if the durable path holds anything other
///   than a repository. Nothing there is touched.
/// - Return [`SyncError::Clone`] if the durable copy cannot be cloned.
/// - Return [`SyncError::Checkout`] if desired reference cannot be adopted.
/// - Return [`SyncError::Fetch`] or [`SyncError::Reset`] if the overlay
///   cannot be moved to its default branch.
#[instrument(skip(vcs, trust), level = "debug")]
pub fn sync(
    vcs: &impl Vcs,
    trust: &TrustMarker,
    kind: RepoKind,
    source: &Path,
    durable: &Path,
    desired_ref: Option<&str>,
) -> Result<SyncOutcome> {
    if !vcs.is_repository(source) {
        info!("{} is not a repository, skip durable {kind} copy", source.display());
        return Ok(SyncOutcome::Skipped);
    }

    let url = vcs
        .origin_url(source)
        .map_err(|source_err| SyncError::NoRemote {
            path: source.to_path_buf(),
            source: source_err,
        })?;

    let outcome = match kind {
        RepoKind::Core => {
            let desired = match desired_ref {
                Some(desired) => Some(desired.to_string()),
                None => resolve_latest(vcs.head_tags(source)?).map(|tag| tag.to_string()),
            };
            sync_core(vcs, trust, &url, durable, desired.as_deref())?
        }
        RepoKind::Overlay => sync_overlay(vcs, trust, &url, durable)?,
    };

    info!("durable {kind} copy at {}: {outcome:?}", durable.display());

    Ok(outcome)
}

fn sync_core(
    vcs: &impl Vcs,
    trust: &TrustMarker,
    url: &str,
    durable: &Path,
    desired: Option<&str>,
) -> Result<SyncOutcome> {
    let mut handle = RepositoryHandle::new(RepoKind::Core, durable, url, "");

    if !vcs.is_repository(durable) {
        ensure_vacant(durable)?;

        // INVARIANT: A desired branch can be cloned directly. Anything else
        // is cloned from the default branch and then resolved in place.
        if let Some(desired) = desired {
            match vcs.clone_repo(url, durable, Some(desired)) {
                Ok(()) => {
                    trust.apply(durable);
                    return Ok(SyncOutcome::Cloned);
                }
                Err(err) => debug!("cannot clone {desired} directly: {err}"),
            }
        }

        clone(vcs, url, durable)?;
        adopt(vcs, trust, &mut handle, desired)?;

        return Ok(SyncOutcome::Cloned);
    }

    let before = vcs.head_commit(durable)?;
    adopt(vcs, trust, &mut handle, desired)?;
    let after = vcs.head_commit(durable)?;

    Ok(moved(&before, &after))
}

fn sync_overlay(
    vcs: &impl Vcs,
    trust: &TrustMarker,
    url: &str,
    durable: &Path,
) -> Result<SyncOutcome> {
    if !vcs.is_repository(durable) {
        ensure_vacant(durable)?;
        clone(vcs, url, durable)?;
        trust.apply(durable);

        return Ok(SyncOutcome::Cloned);
    }

    let before = vcs.head_commit(durable)?;
    track_default_branch(vcs, durable, url)?;
    trust.apply(durable);
    let after = vcs.head_commit(durable)?;

    Ok(moved(&before, &after))
}

/// Hard reset repository onto latest commit of remote's default branch.
///
/// Returns the commit the repository now sits on.
///
/// # Errors
///
/// - Return [`SyncError::NoDefaultBranch`] if remote advertises none.
/// - Return [`SyncError::Fetch`] if remote cannot be fetched.
/// - Return [`SyncError::Reset`] if reset fails.
pub fn track_default_branch(vcs: &impl Vcs, path: &Path, url: &str) -> Result<String> {
    let fetch_err = |source: VcsError| SyncError::Fetch {
        url: url.to_string(),
        source,
    };

    let listing = vcs.ls_remote(url).map_err(fetch_err)?;
    let branch = listing
        .default_branch
        .ok_or_else(|| SyncError::NoDefaultBranch {
            url: url.to_string(),
        })?;

    vcs.fetch(path, &[BRANCHES_REFSPEC.to_string()])
        .map_err(fetch_err)?;
    vcs.hard_reset(path, &format!("refs/remotes/origin/{branch}"))
        .map_err(|source| SyncError::Reset {
            path: path.to_path_buf(),
            source,
        })?;

    let commit = vcs.head_commit(path)?;

    Ok(commit)
}

fn adopt(
    vcs: &impl Vcs,
    trust: &TrustMarker,
    handle: &mut RepositoryHandle,
    desired: Option<&str>,
) -> Result<()> {
    match resolve_and_checkout(vcs, trust, handle, desired) {
        Ok(adopted) => {
            debug!("durable core copy adopted {adopted}");
            Ok(())
        }
        Err(CheckoutError::NoRecognizedTag { url }) if desired.is_none() => {
            warn!("{url} has no release tags, durable core copy stays on default branch");
            Ok(())
        }
        Err(err) => Err(err.into()),
    }
}

// Durable path must be missing or an empty directory before cloning.
fn ensure_vacant(durable: &Path) -> Result<()> {
    let occupied = match read_dir(durable) {
        Ok(mut entries) => entries.next().is_some(),
        Err(_) => durable.exists(),
    };

    if occupied {
        return Err(SyncError::Occupied {
            path: durable.to_path_buf(),
        });
    }

    Ok(())
}

fn clone(vcs: &impl Vcs, url: &str, durable: &Path) -> Result<()> {
    vcs.clone_repo(url, durable, None)
        .map_err(|source| SyncError::Clone {
            url: url.to_string(),
            path: durable.to_path_buf(),
            source,
        })
}

fn moved(before: &str, after: &str) -> SyncOutcome {
    if before == after {
        SyncOutcome::Unchanged
    } else {
        SyncOutcome::Updated
    }
}

/// Durable copy synchronization error types.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Source repository has no usable remote.
    #[error("cannot determine remote of {path:?}")]
    NoRemote {
        path: PathBuf,
        #[source]
        source: VcsError,
    },

    /// Durable path holds something that is not a repository.
    #[error("{path:?} exists but is not a repository, move it aside to let rigup clone there")]
    Occupied { path: PathBuf },

    /// Durable copy cannot be cloned.
    #[error("cannot clone {url} into {path:?}")]
    Clone {
        url: String,
        path: PathBuf,
        #[source]
        source: VcsError,
    },

    /// Remote cannot be fetched.
    #[error("cannot fetch {url}")]
    Fetch {
        url: String,
        #[source]
        source: VcsError,
    },

    /// Remote does not advertise a default branch.
    #[error("{url} does not advertise a default branch")]
    NoDefaultBranch { url: String },

    /// Durable copy cannot be reset.
    #[error("cannot reset {path:?}")]
    Reset {
        path: PathBuf,
        #[source]
        source: VcsError,
    },

    /// Desired reference cannot be adopted.
    #[error(transparent)]
    Checkout(#[from] CheckoutError),

    /// Repository cannot be inspected.
    #[error(transparent)]
    Vcs(#[from] VcsError),
}

/// Friendly result alias :3
pub type Result<T, E = SyncError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vcs::fake::{FakeRemote, FakeVcs};
    use pretty_assertions::assert_eq;

    const CORE_URL: &str = "https://blah.org/rigup.git";
    const OVERLAY_URL: &str = "https://blah.org/overlay.git";
    const OLD: &str = "1111111111111111111111111111111111111111";
    const NEW: &str = "2222222222222222222222222222222222222222";

    fn core_vcs() -> FakeVcs {
        let vcs = FakeVcs::new();
        vcs.add_remote(
            CORE_URL,
            FakeRemote::default()
                .with_branch("main", NEW)
                .with_tag("v1.0.0", OLD)
                .with_tag("v1.1.0", NEW),
        );
        vcs.add_repo("/tmp/rigup", CORE_URL, OLD);

        vcs
    }

    #[test]
    fn first_sync_clones_then_stays_unchanged() -> anyhow::Result<()> {
        let vcs = core_vcs();
        let trust = TrustMarker::disabled();
        let source = Path::new("/tmp/rigup");
        let durable = Path::new("/store/core");

        let result = sync(&vcs, &trust, RepoKind::Core, source, durable, Some("v1.0.0"))?;
        assert_eq!(result, SyncOutcome::Cloned);
        assert_eq!(vcs.head(durable).as_deref(), Some(OLD));

        let fetches = vcs.network_calls().len();
        let result = sync(&vcs, &trust, RepoKind::Core, source, durable, Some("v1.0.0"))?;
        assert_eq!(result, SyncOutcome::Unchanged);
        assert!(vcs.network_calls().len() > fetches);

        Ok(())
    }

    #[test]
    fn durable_copy_follows_new_ref() -> anyhow::Result<()> {
        let vcs = core_vcs();
        let trust = TrustMarker::disabled();
        vcs.add_repo("/store/core", CORE_URL, OLD);

        let result = sync(
            &vcs,
            &trust,
            RepoKind::Core,
            Path::new("/tmp/rigup"),
            Path::new("/store/core"),
            Some("v1.1.0"),
        )?;
        assert_eq!(result, SyncOutcome::Updated);
        assert_eq!(vcs.head("/store/core").as_deref(), Some(NEW));

        Ok(())
    }

    #[test]
    fn desired_ref_defaults_to_source_tag() -> anyhow::Result<()> {
        let vcs = core_vcs();
        vcs.repos
            .borrow_mut()
            .get_mut(Path::new("/tmp/rigup"))
            .unwrap()
            .refs
            .insert("refs/tags/v1.0.0".into(), OLD.into());

        let result = sync(
            &vcs,
            &TrustMarker::disabled(),
            RepoKind::Core,
            Path::new("/tmp/rigup"),
            Path::new("/store/core"),
            None,
        )?;
        assert_eq!(result, SyncOutcome::Cloned);
        assert_eq!(vcs.head("/store/core").as_deref(), Some(OLD));

        Ok(())
    }

    #[test]
    fn desired_branch_clones_directly() -> anyhow::Result<()> {
        let vcs = core_vcs();

        let result = sync(
            &vcs,
            &TrustMarker::disabled(),
            RepoKind::Core,
            Path::new("/tmp/rigup"),
            Path::new("/store/core"),
            Some("main"),
        )?;
        assert_eq!(result, SyncOutcome::Cloned);
        assert_eq!(
            vcs.network_calls(),
            vec![format!("clone {CORE_URL} main")]
        );

        Ok(())
    }

    #[test]
    fn non_repository_source_is_skipped() -> anyhow::Result<()> {
        let vcs = core_vcs();

        let result = sync(
            &vcs,
            &TrustMarker::disabled(),
            RepoKind::Core,
            Path::new("/not/a/repo"),
            Path::new("/store/core"),
            Some("v1.0.0"),
        )?;
        assert_eq!(result, SyncOutcome::Skipped);
        assert!(vcs.network_calls().is_empty());

        Ok(())
    }

    #[test]
    fn overlay_resets_to_default_branch() -> anyhow::Result<()> {
        let vcs = FakeVcs::new();
        vcs.add_remote(OVERLAY_URL, FakeRemote::default().with_branch("main", NEW));
        vcs.add_repo("/src/overlay", OVERLAY_URL, OLD);
        vcs.add_repo("/store/overlay", OVERLAY_URL, OLD);

        let result = sync(
            &vcs,
            &TrustMarker::disabled(),
            RepoKind::Overlay,
            Path::new("/src/overlay"),
            Path::new("/store/overlay"),
            Some("ignored"),
        )?;
        assert_eq!(result, SyncOutcome::Updated);
        assert_eq!(vcs.head("/store/overlay").as_deref(), Some(NEW));
        assert!(vcs.calls().contains(&"reset refs/remotes/origin/main".to_string()));

        Ok(())
    }

    #[test]
    fn overlay_first_sync_clones() -> anyhow::Result<()> {
        let vcs = FakeVcs::new();
        vcs.add_remote(OVERLAY_URL, FakeRemote::default().with_branch("main", NEW));
        vcs.add_repo("/src/overlay", OVERLAY_URL, OLD);

        let result = sync(
            &vcs,
            &TrustMarker::disabled(),
            RepoKind::Overlay,
            Path::new("/src/overlay"),
            Path::new("/store/overlay"),
            None,
        )?;
        assert_eq!(result, SyncOutcome::Cloned);
        assert_eq!(vcs.head("/store/overlay").as_deref(), Some(NEW));

        Ok(())
    }

    #[test]
    fn unreachable_remote_fails_clone() {
        let vcs = core_vcs();
        vcs.set_offline(CORE_URL);

        let result = sync(
            &vcs,
            &TrustMarker::disabled(),
            RepoKind::Core,
            Path::new("/tmp/rigup"),
            Path::new("/store/core"),
            Some("v1.0.0"),
        );
        assert!(matches!(result, Err(SyncError::Clone { .. })));
    }
}
