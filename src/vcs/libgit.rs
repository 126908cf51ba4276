// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Version control through libgit2.

use crate::{
    config::UpdateSettings,
    vcs::{AdoptedRef, RefKind, RemoteListing, Result, Vcs, VcsError},
};

use auth_git2::{GitAuthenticator, Prompter};
use git2::{
    build::{CheckoutBuilder, RepoBuilder},
    Config, Direction, ErrorCode, FetchOptions, Oid, Remote, RemoteCallbacks, Repository,
    ResetType, Signature, StatusOptions,
};
use indicatif::{ProgressBar, ProgressStyle};
use inquire::{Password, Text};
use std::{
    fs::remove_dir_all,
    path::Path,
    time::{Duration, Instant},
};
use tracing::{debug, info, instrument, warn};

/// Version control through libgit2.
///
/// Network operations are bounded by a deadline in two layers. libgit2's
/// own connect and read timeouts cover connecting and waiting on a silent
/// server. Progress callbacks cancel a transfer that is still running once
/// the deadline passes. Both surface as [`VcsError::TimedOut`].
#[derive(Debug, Clone)]
pub struct Git2Vcs {
    depth: i32,
    timeout: Duration,
    progress: bool,
    prompts: bool,
}

impl Git2Vcs {
    /// Construct new libgit2 backend from update settings.
    ///
    /// Progress bars are hidden by default, while credential prompts are
    /// allowed.
    pub fn new(settings: &UpdateSettings) -> Self {
        let timeout = settings.timeout();
        set_server_timeouts(timeout);

        Self {
            depth: settings.fetch_depth,
            timeout,
            progress: false,
            prompts: true,
        }
    }

    /// Show progress bars for clones and fetches.
    pub fn with_progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }

    /// Allow asking user for credentials on the terminal.
    ///
    /// Without prompts, credentials come from helpers, the SSH agent, and
    /// unencrypted default keys only.
    pub fn with_prompts(mut self, prompts: bool) -> Self {
        self.prompts = prompts;
        self
    }

    fn authenticator(&self, bar: &ProgressBar) -> GitAuthenticator {
        if self.prompts {
            GitAuthenticator::default().set_prompter(IndicatifPrompter::new(bar.clone()))
        } else {
            GitAuthenticator::default()
                .try_password_prompt(0)
                .prompt_ssh_key_password(false)
        }
    }

    fn progress_bar(&self, message: &str) -> Result<ProgressBar> {
        if !self.progress {
            return Ok(ProgressBar::hidden());
        }

        let bar = ProgressBar::new(0);
        let style = ProgressStyle::with_template(
            "{elapsed_precise:.green}  {msg:<50}  [{wide_bar:.yellow/blue}]",
        )?
        .progress_chars("-Cco.");
        bar.set_style(style);
        bar.set_message(message.to_string());
        bar.enable_steady_tick(Duration::from_millis(100));

        Ok(bar)
    }

    // Run a remote operation with credentials, progress reporting, and the
    // deadline wired into its callbacks.
    fn with_callbacks<T>(
        &self,
        message: &str,
        operation: impl FnOnce(RemoteCallbacks<'_>) -> std::result::Result<T, git2::Error>,
    ) -> Result<T> {
        let bar = self.progress_bar(message)?;
        let authenticator = self.authenticator(&bar);
        let config = Config::open_default()?;
        let deadline = Instant::now() + self.timeout;

        let mut throttle = Instant::now();
        let progress = bar.clone();
        let mut rc = RemoteCallbacks::new();
        rc.credentials(authenticator.credentials(&config));
        rc.transfer_progress(move |stats| {
            if throttle.elapsed() > Duration::from_millis(10) {
                throttle = Instant::now();
                progress.set_length(stats.total_objects() as u64);
                progress.set_position(stats.received_objects() as u64);
            }
            Instant::now() < deadline
        });
        rc.sideband_progress(move |_| Instant::now() < deadline);

        let result = operation(rc);
        bar.finish_and_clear();

        result.map_err(|err| {
            if Instant::now() >= deadline || is_timeout(&err) {
                VcsError::TimedOut {
                    source: err,
                    timeout: self.timeout,
                }
            } else {
                VcsError::Git2(err)
            }
        })
    }
}

// Apply deadline to libgit2's socket connect and read timeouts.
fn set_server_timeouts(timeout: Duration) {
    let millis = i32::try_from(timeout.as_millis()).unwrap_or(i32::MAX);

    // SAFETY: Global libgit2 options are set while constructing the backend,
    // before it starts any remote operation.
    let result = unsafe {
        git2::opts::set_server_connect_timeout_in_milliseconds(millis)
            .and_then(|_| git2::opts::set_server_timeout_in_milliseconds(millis))
    };

    if let Err(err) = result {
        warn!("cannot set libgit2 server timeouts: {err}");
    }
}

fn is_timeout(err: &git2::Error) -> bool {
    err.message().to_ascii_lowercase().contains("timed out")
}

impl Vcs for Git2Vcs {
    fn is_repository(&self, path: &Path) -> bool {
        Repository::open(path).is_ok()
    }

    fn origin_url(&self, path: &Path) -> Result<String> {
        let repo = Repository::open(path)?;
        let remote = repo.find_remote("origin")?;
        let url = remote.url().map(str::to_owned);

        url.ok_or_else(|| VcsError::NoOriginUrl {
            path: path.to_path_buf(),
        })
    }

    fn head_commit(&self, path: &Path) -> Result<String> {
        let repo = Repository::open(path)?;
        let commit = repo.head()?.peel_to_commit()?.id();

        Ok(commit.to_string())
    }

    fn head_tags(&self, path: &Path) -> Result<Vec<String>> {
        let repo = Repository::open(path)?;
        let head = repo.head()?.peel_to_commit()?.id();
        let names = repo.tag_names(None)?;

        let mut tags = Vec::new();
        for name in names.iter().flatten() {
            // INVARIANT: Skip tags that do not point at a commit.
            let tagged = repo
                .find_reference(&format!("refs/tags/{name}"))
                .and_then(|reference| reference.peel_to_commit())
                .map(|commit| commit.id());
            if matches!(tagged, Ok(id) if id == head) {
                tags.push(name.to_string());
            }
        }

        Ok(tags)
    }

    #[instrument(skip(self), level = "debug")]
    fn ls_remote(&self, url: &str) -> Result<RemoteListing> {
        self.with_callbacks(url, |callbacks| {
            let mut remote = Remote::create_detached(url)?;
            let connection = remote.connect_auth(Direction::Fetch, Some(callbacks), None)?;
            let advertised_default = connection
                .default_branch()
                .ok()
                .and_then(|name| name.as_str().map(str::to_owned));

            let mut listing = RemoteListing::default();
            let mut branch_heads = Vec::new();
            for head in connection.list()? {
                let name = head.name();
                if name == "HEAD" {
                    listing.head = Some(head.oid().to_string());
                } else if let Some(tag) = name.strip_prefix("refs/tags/") {
                    // INVARIANT: Peeled entries duplicate their annotated tag.
                    if !tag.ends_with("^{}") {
                        listing.tags.push(tag.to_string());
                    }
                } else if let Some(branch) = name.strip_prefix("refs/heads/") {
                    listing.branches.push(branch.to_string());
                    branch_heads.push((branch.to_string(), head.oid().to_string()));
                }
            }

            // INVARIANT: Fall back to the branch sharing HEAD's commit when the
            // remote does not advertise its symbolic HEAD.
            listing.default_branch = advertised_default
                .and_then(|name| name.strip_prefix("refs/heads/").map(str::to_owned))
                .or_else(|| {
                    branch_heads
                        .iter()
                        .find(|(_, oid)| Some(oid) == listing.head.as_ref())
                        .map(|(branch, _)| branch.clone())
                });

            debug!(
                "remote advertised {} tags and {} branches",
                listing.tags.len(),
                listing.branches.len()
            );

            Ok(listing)
        })
    }

    #[instrument(skip(self), level = "debug")]
    fn clone_repo(&self, url: &str, path: &Path, branch: Option<&str>) -> Result<()> {
        info!("clone {url} into {}", path.display());
        let existed = path.exists();
        let result = self.with_callbacks(url, |callbacks| {
            let mut fo = FetchOptions::new();
            fo.remote_callbacks(callbacks);
            fo.depth(self.depth);

            let mut builder = RepoBuilder::new();
            builder.fetch_options(fo);
            if let Some(branch) = branch {
                builder.branch(branch);
            }

            builder.clone(url, path).map(|_| ())
        });

        // INVARIANT: Only remove what the failed clone itself created.
        if result.is_err() && !existed && path.exists() {
            if let Err(err) = remove_dir_all(path) {
                warn!("cannot clean up failed clone at {}: {err}", path.display());
            }
        }

        result
    }

    #[instrument(skip(self), level = "debug")]
    fn fetch(&self, path: &Path, refspecs: &[String]) -> Result<()> {
        let repo = Repository::open(path)?;
        let mut remote = repo.find_remote("origin")?;
        let url = remote.url().unwrap_or("origin").to_string();

        self.with_callbacks(&url, |callbacks| {
            let mut fo = FetchOptions::new();
            fo.remote_callbacks(callbacks);
            fo.depth(self.depth);
            remote.fetch(refspecs, Some(&mut fo), None)
        })
    }

    fn resolve_ref(&self, path: &Path, name: &str) -> Result<Option<String>> {
        let repo = Repository::open(path)?;
        let reference = match repo.find_reference(name) {
            Ok(reference) => reference,
            Err(err) if matches!(err.code(), ErrorCode::NotFound | ErrorCode::InvalidSpec) => {
                return Ok(None)
            }
            Err(err) => return Err(err.into()),
        };
        let commit = reference.peel_to_commit()?.id();

        Ok(Some(commit.to_string()))
    }

    fn remove_ref(&self, path: &Path, name: &str) -> Result<()> {
        let repo = Repository::open(path)?;
        match repo.find_reference(name) {
            Ok(mut reference) => reference.delete()?,
            Err(err) if err.code() == ErrorCode::NotFound => {}
            Err(err) => return Err(err.into()),
        }

        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    fn stash(&self, path: &Path) -> Result<bool> {
        let mut repo = Repository::open(path)?;
        let dirty = {
            let mut opts = StatusOptions::new();
            opts.include_untracked(false).include_ignored(false);
            let statuses = repo.statuses(Some(&mut opts))?;
            !statuses.is_empty()
        };

        if !dirty {
            return Ok(false);
        }

        let signature = repo
            .signature()
            .or_else(|_| Signature::now("rigup", "rigup@localhost"))?;
        repo.stash_save(&signature, "rigup: stash before update", None)?;
        info!("stashed local changes in {}", path.display());

        Ok(true)
    }

    #[instrument(skip(self), level = "debug")]
    fn stash_pop(&self, path: &Path) -> Result<()> {
        let mut repo = Repository::open(path)?;
        repo.stash_pop(0, None)?;
        info!("restored stashed changes in {}", path.display());

        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    fn checkout(&self, path: &Path, target: &AdoptedRef) -> Result<()> {
        let repo = Repository::open(path)?;
        let prior = repo.head().ok().and_then(|head| head.target());
        let oid = Oid::from_str(&target.commit)?;
        let commit = repo.find_commit(oid)?;

        // INVARIANT: Safe checkout refuses to clobber local changes before
        // writing anything, so a failure here leaves the tree untouched.
        let mut builder = CheckoutBuilder::new();
        builder.safe();
        repo.checkout_tree(commit.as_object(), Some(&mut builder))?;

        let moved = match target.kind {
            RefKind::Branch => {
                let refname = format!("refs/heads/{}", target.name);
                repo.reference(&refname, oid, true, "rigup: update branch")
                    .and_then(|_| repo.set_head(&refname))
            }
            RefKind::Tag | RefKind::Named => repo.set_head_detached(oid),
        };

        if let Err(err) = moved {
            warn!("cannot move HEAD to {target}, restoring previous tree");
            if let Some(prior) = prior {
                let commit = repo.find_commit(prior)?;
                let mut builder = CheckoutBuilder::new();
                builder.force();
                repo.checkout_tree(commit.as_object(), Some(&mut builder))?;
            }
            return Err(err.into());
        }

        info!("checked out {target} in {}", path.display());

        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    fn hard_reset(&self, path: &Path, revision: &str) -> Result<()> {
        let repo = Repository::open(path)?;
        let object = repo.revparse_single(revision)?;
        let commit = object.peel_to_commit()?;
        repo.reset(commit.as_object(), ResetType::Hard, None)?;
        info!("reset {} to {revision}", path.display());

        Ok(())
    }
}

/// Git2 authentication prompter for progress bar.
#[derive(Debug, Clone)]
pub struct IndicatifPrompter {
    pub(crate) bar: ProgressBar,
}

impl IndicatifPrompter {
    /// Construct new progress bar authenticator.
    pub fn new(bar: ProgressBar) -> Self {
        Self { bar }
    }
}

impl Prompter for IndicatifPrompter {
    #[instrument(skip(self, url, _config), level = "debug")]
    fn prompt_username_password(
        &mut self,
        url: &str,
        _config: &git2::Config,
    ) -> Option<(String, String)> {
        info!("authentication required at {url}");
        self.bar.suspend(|| -> Option<(String, String)> {
            let username = Text::new("username").prompt().ok()?;
            let password = Password::new("password")
                .without_confirmation()
                .prompt()
                .ok()?;
            Some((username, password))
        })
    }

    #[instrument(skip(self, username, url, _config), level = "debug")]
    fn prompt_password(
        &mut self,
        username: &str,
        url: &str,
        _config: &git2::Config,
    ) -> Option<String> {
        info!("authentication required at {url} for user {username}");
        self.bar.suspend(|| -> Option<String> {
            Password::new("password")
                .without_confirmation()
                .prompt()
                .ok()
        })
    }

    #[instrument(skip(self, ssh_key_path, _config), level = "debug")]
    fn prompt_ssh_key_passphrase(
        &mut self,
        ssh_key_path: &Path,
        _config: &git2::Config,
    ) -> Option<String> {
        info!(
            "authentication required with ssh key at {}",
            ssh_key_path.display()
        );
        self.bar.suspend(|| -> Option<String> {
            Password::new("passphrase")
                .without_confirmation()
                .prompt()
                .ok()
        })
    }
}
