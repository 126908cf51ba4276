// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use rigup::{
    config::Settings,
    marker::VersionMarker,
    path::{default_config_dir, default_store_dir},
    repo::RepoKind,
    snooze::Snooze,
    state::FileStore,
    trust::TrustMarker,
    update::{
        check::CheckOutcome,
        handoff::{CommandInstaller, TerminalConfirm},
        persist, Installation, UpdateReport, UpdateRequest, Updater,
    },
    vcs::{short_id, Git2Vcs, Vcs},
};

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use std::{
    io::IsTerminal,
    path::{Path, PathBuf},
    process::exit,
};
use tracing::{debug, error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Check passed with nothing to update.
const EXIT_UP_TO_DATE: i32 = 0;

/// Check found an update.
const EXIT_UPDATE_AVAILABLE: i32 = 100;

/// Check or command failed.
const EXIT_FAILED: i32 = 1;

#[derive(Debug, Clone, Parser)]
#[command(
    about,
    override_usage = "rigup [options] <rigup-command>",
    subcommand_help_heading = "Commands",
    version
)]
struct Cli {
    /// Path to configuration file.
    #[arg(short, long, global = true, value_name = "path")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    fn run(self) -> Result<i32> {
        let config = match self.config {
            Some(path) => path,
            None => default_config_dir()?.join("config.toml"),
        };
        let settings = Settings::load(&config)?;
        debug!("loaded settings from {}", config.display());

        let session = Session::new(settings)?;
        match self.command {
            Command::Check(opts) => session.run_check(opts),
            Command::Apply(opts) => session.run_apply(opts),
            Command::Snooze(opts) => session.run_snooze(opts),
            Command::Unsnooze => session.run_unsnooze(),
            Command::Version => session.run_version(),
            Command::Sync(opts) => session.run_sync(opts),
        }
    }
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Check core and overlay repositories for updates.
    #[command(override_usage = "rigup check [options]")]
    Check(CheckOptions),

    /// Apply available updates, or adopt a specific core reference.
    #[command(override_usage = "rigup apply [options] [<ref>]")]
    Apply(ApplyOptions),

    /// Silence advisory update checks for a number of hours.
    #[command(override_usage = "rigup snooze <hours>")]
    Snooze(SnoozeOptions),

    /// Lift an active snooze.
    #[command(override_usage = "rigup unsnooze")]
    Unsnooze,

    /// Show installed versions of core and overlay repositories.
    #[command(override_usage = "rigup version")]
    Version,

    /// Bring durable repository copies in line with their sources.
    #[command(override_usage = "rigup sync [options]")]
    Sync(SyncOptions),
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct CheckOptions {
    /// Honor snooze and report unreachable remotes quietly.
    #[arg(short, long)]
    pub advisory: bool,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct ApplyOptions {
    /// Branch or tag of core repository to adopt.
    #[arg(value_name = "ref")]
    pub target: Option<String>,

    /// Apply without asking for confirmation.
    #[arg(short, long)]
    pub yes: bool,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct SnoozeOptions {
    /// Number of hours to stay quiet.
    #[arg(required = true, value_name = "hours")]
    pub hours: String,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct SyncOptions {
    /// Core checkout to copy from instead of the discovered one.
    #[arg(short, long, value_name = "path")]
    pub source: Option<PathBuf>,

    /// Core reference to pin durable copy to.
    #[arg(short, long, value_name = "ref")]
    pub r#ref: Option<String>,
}

struct Session {
    settings: Settings,
    state: FileStore,
    store: PathBuf,
    trust: TrustMarker,
}

impl Session {
    fn new(settings: Settings) -> Result<Self> {
        let state = FileStore::new(default_config_dir()?);
        let store = match settings.store.clone() {
            Some(store) => store,
            None => default_store_dir()?,
        };
        let trust = TrustMarker::new(&settings.trust);

        Ok(Self {
            settings,
            state,
            store,
            trust,
        })
    }

    fn vcs(&self, interactive: bool) -> Git2Vcs {
        Git2Vcs::new(&self.settings.update)
            .with_progress(interactive && std::io::stderr().is_terminal())
            .with_prompts(interactive && std::io::stdin().is_terminal())
    }

    fn installation(&self, vcs: &impl Vcs) -> Installation {
        let marker = match VersionMarker::load(&self.state) {
            Ok(marker) => marker,
            Err(err) => {
                warn!("ignoring version marker: {err}");
                None
            }
        };

        Installation::discover(vcs, &self.settings, &self.store, marker.as_ref())
    }

    fn run_check(&self, opts: CheckOptions) -> Result<i32> {
        if opts.advisory {
            if let Some(remaining) = Snooze::new(&self.state).remaining() {
                debug!("update checks snoozed for another {remaining}s");
                return Ok(EXIT_UP_TO_DATE);
            }
        }

        let vcs = self.vcs(!opts.advisory);
        let installation = self.installation(&vcs);
        let updater = Updater::new(&vcs, &self.trust, &self.store);
        let outcomes = updater.check_all(&installation);

        for (kind, outcome) in &outcomes {
            match outcome {
                CheckOutcome::Available(plan) => println!("{plan}"),
                CheckOutcome::NoChange => debug!("{kind} is up to date"),
                CheckOutcome::Failed(reason) if opts.advisory => debug!("{reason}"),
                CheckOutcome::Failed(reason) => warn!("{reason}"),
            }
        }

        if opts.advisory && outcomes.iter().all(|(_, outcome)| outcome.is_failed()) {
            println!("offline, skipped update check");
        }

        let code = check_exit_code(&outcomes, opts.advisory);
        if code == EXIT_FAILED {
            error!("cannot check every repository for updates");
        }

        Ok(code)
    }

    fn run_apply(&self, opts: ApplyOptions) -> Result<i32> {
        let vcs = self.vcs(true);
        let mut installation = self.installation(&vcs);
        let updater = Updater::new(&vcs, &self.trust, &self.store);
        let request = UpdateRequest {
            target: opts.target,
            interactive: !opts.yes && std::io::stdin().is_terminal(),
        };
        let mut installer = CommandInstaller::new(self.settings.install.command.clone());

        let report = updater.run(
            &mut installation,
            &request,
            &mut TerminalConfirm,
            &mut installer,
        )?;

        match report {
            UpdateReport::Offline(reasons) => {
                for reason in reasons {
                    warn!("{reason}");
                }
                error!("offline, cannot check for updates");
                Ok(EXIT_FAILED)
            }
            UpdateReport::UpToDate => {
                info!("already up to date");
                Ok(EXIT_UP_TO_DATE)
            }
            UpdateReport::Declined => {
                info!("update declined");
                Ok(EXIT_UP_TO_DATE)
            }
            UpdateReport::Applied(lines) => {
                if let Err(err) = Snooze::new(&self.state).clear() {
                    warn!("cannot clear snooze: {err}");
                }
                info!("applied {} update(s)", lines.len());
                Ok(EXIT_UP_TO_DATE)
            }
        }
    }

    fn run_snooze(&self, opts: SnoozeOptions) -> Result<i32> {
        Snooze::new(&self.state).set(&opts.hours)?;
        info!("update checks snoozed for {} hour(s)", opts.hours.trim());

        Ok(EXIT_UP_TO_DATE)
    }

    fn run_unsnooze(&self) -> Result<i32> {
        Snooze::new(&self.state).clear()?;
        info!("update checks resumed");

        Ok(EXIT_UP_TO_DATE)
    }

    fn run_version(&self) -> Result<i32> {
        let vcs = self.vcs(false);
        let installation = self.installation(&vcs);

        let mut repos = vec![(RepoKind::Core, &installation.core)];
        if let Some(overlay) = &installation.overlay {
            repos.push((RepoKind::Overlay, overlay));
        }

        for (kind, discovered) in repos {
            match discovered {
                Ok(repo) => {
                    let commit = vcs.head_commit(&repo.local_path)?;
                    println!(
                        "{kind}: {} ({}) from {}",
                        repo.installed_ref(),
                        short_id(&commit),
                        repo.remote_url
                    );
                }
                Err(err) => println!("{kind}: not installed ({err})"),
            }
        }

        Ok(EXIT_UP_TO_DATE)
    }

    fn run_sync(&self, opts: SyncOptions) -> Result<i32> {
        let vcs = self.vcs(true);
        let installation = self.installation(&vcs);

        let source = match (opts.source, &installation.core) {
            (Some(source), _) => source,
            (None, Ok(core)) => core.local_path.clone(),
            (None, Err(err)) => return Err(anyhow!("no core checkout to sync from: {err}")),
        };
        sync_one(
            &vcs,
            &self.trust,
            RepoKind::Core,
            &source,
            &self.store,
            opts.r#ref.as_deref(),
        )?;

        match &installation.overlay {
            Some(Ok(overlay)) => sync_one(
                &vcs,
                &self.trust,
                RepoKind::Overlay,
                &overlay.local_path,
                &self.store,
                None,
            )?,
            Some(Err(err)) => warn!("skip overlay: {err}"),
            None => {}
        }

        Ok(EXIT_UP_TO_DATE)
    }
}

/// Exit status of a check.
///
/// An available update wins over failures. Otherwise any failed repository
/// fails the check, unless it is advisory.
fn check_exit_code(outcomes: &[(RepoKind, CheckOutcome)], advisory: bool) -> i32 {
    let available = outcomes
        .iter()
        .any(|(_, outcome)| matches!(outcome, CheckOutcome::Available(_)));
    let failed = outcomes.iter().any(|(_, outcome)| outcome.is_failed());

    match (available, failed) {
        (true, _) => EXIT_UPDATE_AVAILABLE,
        (false, true) if !advisory => EXIT_FAILED,
        _ => EXIT_UP_TO_DATE,
    }
}

fn sync_one(
    vcs: &impl Vcs,
    trust: &TrustMarker,
    kind: RepoKind,
    source: &Path,
    store: &Path,
    desired: Option<&str>,
) -> Result<()> {
    let durable = kind.durable_path(store);
    if source == durable {
        info!("{kind} already runs from its durable copy");
        return Ok(());
    }

    let outcome = persist::sync(vcs, trust, kind, source, &durable, desired)?;
    info!("{kind}: {outcome:?}");

    Ok(())
}

fn main() {
    let layer = fmt::layer()
        .compact()
        .with_target(false)
        .without_time();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .init();

    match run() {
        Ok(code) => exit(code),
        Err(error) => {
            error!("{error:?}");
            exit(EXIT_FAILED);
        }
    }
}

fn run() -> Result<i32> {
    Cli::parse().run()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rigup::update::UpdatePlan;
    use simple_test_case::test_case;

    fn available() -> CheckOutcome {
        CheckOutcome::Available(UpdatePlan {
            kind: RepoKind::Core,
            current_ref: "v1.0.0".into(),
            target_ref: "v1.1.0".into(),
            forced: false,
        })
    }

    fn current() -> CheckOutcome {
        CheckOutcome::NoChange
    }

    fn failed() -> CheckOutcome {
        CheckOutcome::Failed("cannot reach remote".into())
    }

    #[test_case(available(), current(), false, EXIT_UPDATE_AVAILABLE; "update found")]
    #[test_case(available(), failed(), false, EXIT_UPDATE_AVAILABLE; "update despite failure")]
    #[test_case(current(), current(), false, EXIT_UP_TO_DATE; "up to date")]
    #[test_case(failed(), current(), false, EXIT_FAILED; "core unchecked")]
    #[test_case(failed(), failed(), false, EXIT_FAILED; "offline")]
    #[test_case(failed(), current(), true, EXIT_UP_TO_DATE; "advisory partial failure")]
    #[test_case(failed(), failed(), true, EXIT_UP_TO_DATE; "advisory offline")]
    #[test]
    fn exit_code_of_check(core: CheckOutcome, overlay: CheckOutcome, advisory: bool, expect: i32) {
        let outcomes = vec![(RepoKind::Core, core), (RepoKind::Overlay, overlay)];
        self::assert_eq!(check_exit_code(&outcomes, advisory), expect);
    }
}
