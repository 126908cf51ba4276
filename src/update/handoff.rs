// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! User confirmation and installer handoff.
//!
//! Both ends of an update that leave rigup's hands sit behind small traits:
//! asking the user whether to proceed, and re-running the installer once new
//! code is in place.

use std::{
    ffi::OsStr,
    io::IsTerminal,
    path::{Path, PathBuf},
    process::Command,
    time::Duration,
};
use tracing::{debug, info, instrument};

/// Ask the user to confirm an update.
pub trait Confirm {
    fn confirm(&mut self, prompt: &str) -> Result<bool>;
}

/// Terminal confirmation prompt.
///
/// Anything typed ahead while rigup was busy is discarded first, so a stray
/// keypress during a slow fetch cannot answer the prompt by accident.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalConfirm;

impl Confirm for TerminalConfirm {
    fn confirm(&mut self, prompt: &str) -> Result<bool> {
        drain_pending_input();
        let answer = inquire::Confirm::new(prompt)
            .with_default(false)
            .prompt()?;

        Ok(answer)
    }
}

fn drain_pending_input() {
    if !std::io::stdin().is_terminal() {
        return;
    }

    if let Err(err) = crossterm::terminal::enable_raw_mode() {
        debug!("cannot enter raw mode to drain input: {err}");
        return;
    }

    let mut drained = 0usize;
    while matches!(crossterm::event::poll(Duration::ZERO), Ok(true)) {
        if crossterm::event::read().is_err() {
            break;
        }
        drained += 1;
    }

    if let Err(err) = crossterm::terminal::disable_raw_mode() {
        debug!("cannot leave raw mode: {err}");
    }

    if drained > 0 {
        debug!("discarded {drained} pending input events");
    }
}

/// Run the installer after new code is in place.
pub trait Installer {
    /// Install from core repository at path.
    fn install(&mut self, core_path: &Path) -> Result<()>;
}

/// Installer that runs an external command inside the core repository.
#[derive(Debug, Clone)]
pub struct CommandInstaller {
    command: Vec<String>,
}

impl CommandInstaller {
    pub fn new(command: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            command: command.into_iter().map(Into::into).collect(),
        }
    }
}

impl Installer for CommandInstaller {
    #[instrument(skip(self), level = "debug")]
    fn install(&mut self, core_path: &Path) -> Result<()> {
        let (program, args) = self
            .command
            .split_first()
            .ok_or(HandoffError::NoInstallCommand)?;

        info!("run installer {program:?} in {}", core_path.display());
        syscall_interactive(program, args, core_path).map_err(|source| {
            HandoffError::Install {
                program: program.clone(),
                cwd: core_path.to_path_buf(),
                source,
            }
        })
    }
}

fn syscall_interactive(
    cmd: impl AsRef<OsStr>,
    args: impl IntoIterator<Item = impl AsRef<OsStr>>,
    cwd: &Path,
) -> std::io::Result<()> {
    let status = Command::new(cmd.as_ref())
        .args(args)
        .current_dir(cwd)
        .spawn()?
        .wait()?;
    if !status.success() {
        return Err(std::io::Error::other(format!(
            "command {:?} failed with {status}",
            cmd.as_ref()
        )));
    }

    Ok(())
}

/// Handoff error types.
#[derive(Debug, thiserror::Error)]
pub enum HandoffError {
    /// Confirmation prompt failed.
    #[error(transparent)]
    Prompt(#[from] inquire::InquireError),

    /// No installer command is configured.
    #[error("no installer command configured")]
    NoInstallCommand,

    /// Installer failed to run or exited unsuccessfully.
    #[error("installer {program:?} failed in {cwd:?}")]
    Install {
        program: String,
        cwd: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Friendly result alias :3
pub type Result<T, E = HandoffError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use sealed_test::prelude::*;

    #[cfg(unix)]
    #[sealed_test]
    fn installer_runs_in_core_path() -> anyhow::Result<()> {
        let root = std::env::current_dir()?;
        let core = root.join("core");
        std::fs::create_dir_all(&core)?;

        let mut installer = CommandInstaller::new(["sh", "-c", "touch installed"]);
        installer.install(&core)?;
        assert!(core.join("installed").is_file());

        Ok(())
    }

    #[cfg(unix)]
    #[sealed_test]
    fn failing_installer_is_reported() -> anyhow::Result<()> {
        let root = std::env::current_dir()?;
        let mut installer = CommandInstaller::new(["sh", "-c", "exit 3"]);

        let result = installer.install(&root);
        assert!(matches!(result, Err(HandoffError::Install { .. })));

        Ok(())
    }

    #[test]
    fn empty_installer_command() {
        let mut installer = CommandInstaller::new(Vec::<String>::new());
        let result = installer.install(Path::new("/"));
        assert!(matches!(result, Err(HandoffError::NoInstallCommand)));
    }
}
