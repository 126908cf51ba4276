// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Update orchestration.
//!
//! An update session checks both managed repositories, shows what would
//! change, asks for confirmation, applies the change in place, brings the
//! durable copies in line, and finally hands over to the installer.
//!
//! The core and overlay repositories are checked independently. A failure
//! to reach one remote never hides an update available on the other. Only
//! when every checked repository failed does the session report that it is
//! offline. A session that could not check anything never claims to be up to
//! date.
//!
//! # Forced targets
//!
//! Asking for a specific core reference skips the core check and the
//! confirmation prompt entirely. The reference is applied even if it is the
//! one already installed, which makes a forced target the way to repair a
//! damaged checkout.
//!
//! # See Also
//!
//! 1. [`check`]
//! 2. [`checkout`]
//! 3. [`persist`]

pub mod check;
pub mod checkout;
pub mod handoff;
pub mod persist;

use crate::{
    config::Settings,
    marker::VersionMarker,
    repo::{candidate_paths, DiscoverError, RepoKind, RepositoryHandle},
    trust::TrustMarker,
    update::{
        check::CheckOutcome,
        checkout::{resolve_and_checkout, CheckoutError},
        handoff::{Confirm, HandoffError, Installer},
        persist::{track_default_branch, SyncError},
    },
    vcs::{is_full_commit_id, Vcs},
};

use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    path::{Path, PathBuf},
};
use tracing::{info, instrument, warn};

/// Planned move of one repository from one reference to another.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdatePlan {
    pub kind: RepoKind,
    pub current_ref: String,
    pub target_ref: String,
    pub forced: bool,
}

impl Display for UpdatePlan {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        write!(fmt, "{}: {} → {}", self.kind, self.current_ref, self.target_ref)
    }
}

/// Outcome of repository discovery.
pub type Discovered = std::result::Result<RepositoryHandle, DiscoverError>;

/// Repositories an update session works with.
#[derive(Debug)]
pub struct Installation {
    pub core: Discovered,

    /// Absent when no overlay is configured.
    pub overlay: Option<Discovered>,
}

impl Installation {
    /// Discover managed repositories, durable copies first.
    pub fn discover(
        vcs: &impl Vcs,
        settings: &Settings,
        store: &Path,
        marker: Option<&VersionMarker>,
    ) -> Self {
        let core = RepositoryHandle::discover(
            vcs,
            RepoKind::Core,
            &candidate_paths(RepoKind::Core.durable_path(store), &settings.core.search_paths),
            &settings.core.url,
            marker,
        );
        let overlay = settings.overlay.as_ref().map(|overlay| {
            RepositoryHandle::discover(
                vcs,
                RepoKind::Overlay,
                &candidate_paths(RepoKind::Overlay.durable_path(store), &overlay.search_paths),
                &overlay.url,
                None,
            )
        });

        Self { core, overlay }
    }
}

/// What the user asked an update session to do.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct UpdateRequest {
    /// Core reference to adopt regardless of what the remote offers.
    pub target: Option<String>,

    /// Whether the user can be asked for confirmation.
    pub interactive: bool,
}

/// How an update session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateReport {
    /// Every checked repository failed. Carries the failure reasons.
    Offline(Vec<String>),

    /// Nothing to update.
    UpToDate,

    /// User declined the update.
    Declined,

    /// Updates were applied. Carries one "label: old → new" line each.
    Applied(Vec<String>),
}

/// Update session driver.
#[derive(Debug)]
pub struct Updater<'vcs, V: Vcs> {
    vcs: &'vcs V,
    trust: &'vcs TrustMarker,
    store: PathBuf,
}

impl<'vcs, V: Vcs> Updater<'vcs, V> {
    /// Construct new updater keeping durable copies inside store directory.
    pub fn new(vcs: &'vcs V, trust: &'vcs TrustMarker, store: impl Into<PathBuf>) -> Self {
        Self {
            vcs,
            trust,
            store: store.into(),
        }
    }

    /// Check every repository of installation, each independently.
    pub fn check_all(&self, installation: &Installation) -> Vec<(RepoKind, CheckOutcome)> {
        let mut outcomes = vec![(
            RepoKind::Core,
            self.check_discovered(RepoKind::Core, &installation.core),
        )];
        if let Some(overlay) = &installation.overlay {
            outcomes.push((
                RepoKind::Overlay,
                self.check_discovered(RepoKind::Overlay, overlay),
            ));
        }

        outcomes
    }

    /// Run a whole update session.
    ///
    /// # Errors
    ///
    /// - Return [`UpdateError::NotInstalled`] if a forced target is requested
    ///   without a core repository.
    /// - Return [`UpdateError::Checkout`] if an update cannot be applied.
    /// - Return [`UpdateError::Sync`] if the overlay cannot be moved.
    /// - Return [`UpdateError::Handoff`] if confirmation or installer fail.
    #[instrument(skip(self, installation, confirm, installer), level = "debug")]
    pub fn run(
        &self,
        installation: &mut Installation,
        request: &UpdateRequest,
        confirm: &mut impl Confirm,
        installer: &mut impl Installer,
    ) -> Result<UpdateReport> {
        let mut plans = Vec::new();
        let mut outcomes = Vec::new();

        match request.target.as_deref() {
            Some(target) => {
                let core = installation
                    .core
                    .as_ref()
                    .map_err(|err| UpdateError::NotInstalled {
                        kind: RepoKind::Core,
                        reason: err.to_string(),
                    })?;
                if is_full_commit_id(target) {
                    return Err(CheckoutError::UnsupportedRefKind(target.to_string()).into());
                }

                plans.push(UpdatePlan {
                    kind: RepoKind::Core,
                    current_ref: core.installed_ref().to_string(),
                    target_ref: target.to_string(),
                    forced: true,
                });
            }
            None => outcomes.push(self.check_discovered(RepoKind::Core, &installation.core)),
        }

        if let Some(overlay) = &installation.overlay {
            outcomes.push(self.check_discovered(RepoKind::Overlay, overlay));
        }

        if plans.is_empty() && !outcomes.is_empty() && outcomes.iter().all(CheckOutcome::is_failed)
        {
            let reasons = outcomes
                .into_iter()
                .filter_map(|outcome| match outcome {
                    CheckOutcome::Failed(reason) => Some(reason),
                    _ => None,
                })
                .collect();
            return Ok(UpdateReport::Offline(reasons));
        }

        for outcome in outcomes {
            match outcome {
                CheckOutcome::Failed(reason) => warn!("{reason}"),
                CheckOutcome::NoChange => {}
                CheckOutcome::Available(plan) => plans.push(plan),
            }
        }

        if plans.is_empty() {
            return Ok(UpdateReport::UpToDate);
        }

        let lines = plans.iter().map(ToString::to_string).collect::<Vec<_>>();
        for line in &lines {
            info!("{line}");
        }

        let forced = plans.iter().any(|plan| plan.forced);
        if request.interactive && !forced && !confirm.confirm("Apply update?")? {
            return Ok(UpdateReport::Declined);
        }

        for plan in &plans {
            match plan.kind {
                RepoKind::Core => {
                    let core = installed(&mut installation.core, RepoKind::Core)?;
                    self.apply_core(core, &plan.target_ref)?;
                }
                RepoKind::Overlay => {
                    let overlay = match installation.overlay.as_mut() {
                        Some(overlay) => installed(overlay, RepoKind::Overlay)?,
                        None => continue,
                    };
                    self.apply_overlay(overlay)?;
                }
            }
        }

        let core_path = match &installation.core {
            Ok(core) => core.local_path.clone(),
            Err(_) => RepoKind::Core.durable_path(&self.store),
        };
        installer.install(&core_path)?;

        Ok(UpdateReport::Applied(lines))
    }

    fn check_discovered(&self, kind: RepoKind, discovered: &Discovered) -> CheckOutcome {
        match discovered {
            Ok(repo) => check::check(self.vcs, repo),
            Err(err) => CheckOutcome::Failed(format!("{kind}: {err}")),
        }
    }

    fn apply_core(&self, core: &mut RepositoryHandle, target: &str) -> Result<()> {
        let adopted = resolve_and_checkout(self.vcs, self.trust, core, Some(target))?;
        self.persist(RepoKind::Core, core, Some(&adopted.name));

        Ok(())
    }

    fn apply_overlay(&self, overlay: &RepositoryHandle) -> Result<()> {
        track_default_branch(self.vcs, &overlay.local_path, &overlay.remote_url)?;
        self.trust.apply(&overlay.local_path);
        self.persist(RepoKind::Overlay, overlay, None);

        Ok(())
    }

    fn persist(&self, kind: RepoKind, repo: &RepositoryHandle, desired: Option<&str>) {
        let durable = kind.durable_path(&self.store);
        if repo.local_path == durable {
            return;
        }

        match persist::sync(
            self.vcs,
            self.trust,
            kind,
            &repo.local_path,
            &durable,
            desired,
        ) {
            Ok(outcome) => info!("durable {kind} copy {outcome:?}"),
            Err(err) => warn!("cannot update durable {kind} copy: {err}"),
        }
    }
}

fn installed(discovered: &mut Discovered, kind: RepoKind) -> Result<&mut RepositoryHandle> {
    discovered
        .as_mut()
        .map_err(|err| UpdateError::NotInstalled {
            kind,
            reason: err.to_string(),
        })
}

/// Update session error types.
#[derive(Debug, thiserror::Error)]
pub enum UpdateError {
    /// Repository to update was never discovered.
    #[error("{kind} repository is not installed: {reason}")]
    NotInstalled { kind: RepoKind, reason: String },

    /// Update could not be checked out.
    #[error(transparent)]
    Checkout(#[from] CheckoutError),

    /// Repository could not be synchronized.
    #[error(transparent)]
    Sync(#[from] SyncError),

    /// Confirmation or installer failed.
    #[error(transparent)]
    Handoff(#[from] HandoffError),
}

/// Friendly result alias :3
pub type Result<T, E = UpdateError> = std::result::Result<T, E>;
