// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Path resolution utilities.
//!
//! Determine relevent path information for external files that need to be
//! interacted with, or managed in some way.

use std::path::PathBuf;

/// Determine default absolute path to rigup's configuration directory.
///
/// Uses XDG Base Directory path `$XDG_CONFIG_HOME/rigup`. Houses the
/// configuration file along with persisted state like the snooze deadline
/// and the installed version marker. Does not check if the path returned
/// actually exists.
///
/// # Errors
///
/// - Return [`NoWayHome`] if home directory path cannot be determined.
///
/// # See Also
///
/// - [XDG Base Directory](https://wiki.archlinux.org/title/XDG_Base_Directory)
pub fn default_config_dir() -> Result<PathBuf> {
    dirs::config_dir()
        .map(|path| path.join("rigup"))
        .ok_or(NoWayHome)
}

/// Determine default absolute path to the durable repository store.
///
/// Uses XDG Base Directory path `$XDG_DATA_HOME/rigup`. The core and
/// overlay repositories are kept underneath it so updates work no matter
/// where rigup was first invoked from. Does not check if the path returned
/// actually exists.
///
/// # Errors
///
/// - Return [`NoWayHome`] if home directory path cannot be determined.
pub fn default_store_dir() -> Result<PathBuf> {
    dirs::data_dir()
        .map(|path| path.join("rigup"))
        .ok_or(NoWayHome)
}

/// No way to determine user's home directory.
///
/// # See Also
///
/// - [`dirs::home_dir`](https://docs.rs/dirs/latest/dirs/fn.home_dir.html)
#[derive(Clone, Debug, thiserror::Error)]
#[error("cannot determine absolute path to user's home directory")]
pub struct NoWayHome;

/// Friendly result alias :3
pub type Result<T, E = NoWayHome> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sealed_test::prelude::*;

    #[cfg(target_os = "linux")]
    #[sealed_test(env = [
        ("HOME", "/home/blah"),
        ("XDG_CONFIG_HOME", "/home/blah/.cfg"),
        ("XDG_DATA_HOME", "/home/blah/.data"),
    ])]
    fn xdg_paths() -> anyhow::Result<()> {
        assert_eq!(default_config_dir()?, PathBuf::from("/home/blah/.cfg/rigup"));
        assert_eq!(default_store_dir()?, PathBuf::from("/home/blah/.data/rigup"));

        Ok(())
    }
}
