// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Build-tool trust marking.
//!
//! Some build tools refuse to load a project configuration until the user
//! explicitly trusts it. When a checkout carries such a configuration file,
//! rigup trusts it right away so the first run after an update does not stop
//! to ask. Trust marking is strictly best-effort.

use crate::config::TrustSettings;

use std::{
    ffi::{OsStr, OsString},
    io::ErrorKind,
    path::Path,
    process::Command,
};
use tracing::{debug, info, warn};

/// Trust marker lookup and trust command.
#[derive(Debug, Clone, Default)]
pub struct TrustMarker {
    markers: Vec<String>,
    command: Vec<String>,
}

impl TrustMarker {
    pub fn new(settings: &TrustSettings) -> Self {
        Self {
            markers: settings.markers.clone(),
            command: settings.command.clone(),
        }
    }

    /// Trust marker that never does anything.
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Check if repository at path carries a trust marker file.
    pub fn is_marked(&self, path: impl AsRef<Path>) -> bool {
        self.markers
            .iter()
            .any(|marker| path.as_ref().join(marker).is_file())
    }

    /// Trust repository at path if it carries a marker file.
    ///
    /// Returns whether the trust command ran successfully. Failures are only
    /// logged.
    pub fn apply(&self, path: impl AsRef<Path>) -> bool {
        let path = path.as_ref();
        if !self.is_marked(path) {
            return false;
        }

        let Some((program, args)) = self.command.split_first() else {
            debug!("no trust command configured");
            return false;
        };

        let mut args = args.iter().map(OsString::from).collect::<Vec<_>>();
        args.push(path.as_os_str().to_os_string());

        match syscall_non_interactive(program, args) {
            Ok(output) => {
                info!("trusted {}", path.display());
                if !output.is_empty() {
                    debug!("{output}");
                }
                true
            }
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("trust command {program:?} not installed");
                false
            }
            Err(err) => {
                warn!("cannot trust {}: {err}", path.display());
                false
            }
        }
    }
}

fn syscall_non_interactive(
    cmd: impl AsRef<OsStr>,
    args: impl IntoIterator<Item = impl AsRef<OsStr>>,
) -> std::io::Result<String> {
    let output = Command::new(cmd.as_ref()).args(args).output()?;
    let stdout = String::from_utf8_lossy(output.stdout.as_slice()).into_owned();
    let stderr = String::from_utf8_lossy(output.stderr.as_slice()).into_owned();
    let mut message = String::new();

    if !stdout.is_empty() {
        message.push_str(format!("stdout: {stdout}").as_str());
    }

    if !stderr.is_empty() {
        message.push_str(format!("stderr: {stderr}").as_str());
    }

    // INVARIANT: Chomp trailing newlines.
    let message = message
        .strip_suffix("\r\n")
        .or(message.strip_suffix('\n'))
        .map(ToString::to_string)
        .unwrap_or(message);

    if !output.status.success() {
        return Err(std::io::Error::other(format!(
            "command {:?} failed:\n{message}",
            cmd.as_ref()
        )));
    }

    Ok(message)
}
