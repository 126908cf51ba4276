// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Read-only update checks.
//!
//! A check performs one shallow query against a repository's remote and
//! compares what it finds with the installed reference. Nothing local is
//! modified. Failing to reach the remote is reported as
//! [`CheckOutcome::Failed`], which callers must never mistake for
//! [`CheckOutcome::NoChange`].

use crate::{
    repo::{RepoKind, RepositoryHandle},
    update::UpdatePlan,
    vcs::{short_id, Vcs},
    version::resolve_latest,
};

use tracing::{debug, instrument};

/// Result of checking one repository for updates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    /// Remote or local repository could not be inspected.
    Failed(String),

    /// Installed reference is already the one to adopt.
    NoChange,

    /// Newer reference is available.
    Available(UpdatePlan),
}

impl CheckOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    /// Human readable "label: old → new" line, if an update is available.
    pub fn message(&self) -> Option<String> {
        match self {
            Self::Available(plan) => Some(plan.to_string()),
            _ => None,
        }
    }
}

/// Check one repository for an update.
///
/// The core repository is compared against the best version tag on its
/// remote. The overlay repository is compared against the remote's HEAD
/// commit. A core remote without any recognizable version tag has nothing
/// to offer, so it yields [`CheckOutcome::NoChange`].
#[instrument(skip(vcs, repo), fields(kind = %repo.kind), level = "debug")]
pub fn check(vcs: &impl Vcs, repo: &RepositoryHandle) -> CheckOutcome {
    if !vcs.is_repository(&repo.local_path) {
        return CheckOutcome::Failed(format!(
            "no {} repository at {}",
            repo.kind,
            repo.local_path.display()
        ));
    }

    let listing = match vcs.ls_remote(&repo.remote_url) {
        Ok(listing) => listing,
        Err(err) => {
            debug!("cannot reach {}: {err}", repo.remote_url);
            return CheckOutcome::Failed(format!("cannot reach {}: {err}", repo.remote_url));
        }
    };

    let target = match repo.kind {
        RepoKind::Core => match resolve_latest(&listing.tags) {
            Some(tag) => tag.to_string(),
            None => {
                debug!("no version tags advertised by {}", repo.remote_url);
                return CheckOutcome::NoChange;
            }
        },
        RepoKind::Overlay => match listing.head.as_deref() {
            Some(head) => short_id(head).to_string(),
            None => {
                return CheckOutcome::Failed(format!("{} advertised no HEAD", repo.remote_url))
            }
        },
    };

    if target == repo.installed_ref() {
        debug!("{} already on {target}", repo.kind);
        return CheckOutcome::NoChange;
    }

    CheckOutcome::Available(UpdatePlan {
        kind: repo.kind,
        current_ref: repo.installed_ref().to_string(),
        target_ref: target,
        forced: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vcs::fake::{FakeRemote, FakeVcs};
    use pretty_assertions::assert_eq;

    const CORE_URL: &str = "https://blah.org/rigup.git";
    const OVERLAY_URL: &str = "https://blah.org/overlay.git";
    const OLD: &str = "1111111111111111111111111111111111111111";
    const NEW: &str = "2222222222222222222222222222222222222222";

    fn core_handle(vcs: &FakeVcs, installed: &str) -> RepositoryHandle {
        vcs.add_repo("/store/core", CORE_URL, OLD);
        RepositoryHandle::new(RepoKind::Core, "/store/core", CORE_URL, installed)
    }

    #[test]
    fn core_update_available() {
        let vcs = FakeVcs::new();
        vcs.add_remote(
            CORE_URL,
            FakeRemote::default()
                .with_branch("main", NEW)
                .with_tag("v1.2.0", NEW)
                .with_tag("v1.3.0-rc.1", NEW)
                .with_tag("v1.1.0", OLD),
        );
        let handle = core_handle(&vcs, "v1.1.0");

        let result = check(&vcs, &handle);
        assert_eq!(result.message().as_deref(), Some("core: v1.1.0 → v1.2.0"));
        assert_eq!(vcs.network_calls(), vec![format!("ls_remote {CORE_URL}")]);
    }

    #[test]
    fn core_already_current() {
        let vcs = FakeVcs::new();
        vcs.add_remote(
            CORE_URL,
            FakeRemote::default().with_tag("v1.2.0", NEW).with_tag("v1.3.0-beta.2", NEW),
        );
        let handle = core_handle(&vcs, "v1.2.0");

        assert_eq!(check(&vcs, &handle), CheckOutcome::NoChange);
    }

    #[test]
    fn core_without_version_tags() {
        let vcs = FakeVcs::new();
        vcs.add_remote(CORE_URL, FakeRemote::default().with_tag("nightly", NEW));
        let handle = core_handle(&vcs, "v1.2.0");

        assert_eq!(check(&vcs, &handle), CheckOutcome::NoChange);
    }

    #[test]
    fn unreachable_remote_fails() {
        let vcs = FakeVcs::new();
        vcs.add_remote(CORE_URL, FakeRemote::default().with_tag("v9.0.0", NEW));
        vcs.set_offline(CORE_URL);
        let handle = core_handle(&vcs, "v1.2.0");

        let result = check(&vcs, &handle);
        assert!(result.is_failed());
        assert_eq!(result.message(), None);
    }

    #[test]
    fn missing_local_repository_fails() {
        let vcs = FakeVcs::new();
        vcs.add_remote(CORE_URL, FakeRemote::default().with_tag("v9.0.0", NEW));
        let handle = RepositoryHandle::new(RepoKind::Core, "/gone", CORE_URL, "v1.0.0");

        assert!(check(&vcs, &handle).is_failed());
        assert!(vcs.network_calls().is_empty());
    }

    #[test]
    fn overlay_tracks_remote_head() {
        let vcs = FakeVcs::new();
        vcs.add_remote(OVERLAY_URL, FakeRemote::default().with_branch("main", NEW));
        vcs.add_repo("/store/overlay", OVERLAY_URL, OLD);
        let handle =
            RepositoryHandle::new(RepoKind::Overlay, "/store/overlay", OVERLAY_URL, "1111111");

        let result = check(&vcs, &handle);
        assert_eq!(result.message().as_deref(), Some("overlay: 1111111 → 2222222"));

        let current =
            RepositoryHandle::new(RepoKind::Overlay, "/store/overlay", OVERLAY_URL, "2222222");
        assert_eq!(check(&vcs, &current), CheckOutcome::NoChange);
    }
}
