// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Configuration layout.
//!
//! Specify the layout of rigup's configuration file to simplify the process
//! of serialization and deserialization. Every field has a sensible default,
//! so an empty or missing file is a valid configuration. File I/O is left to
//! the caller to figure out, except for [`Settings::load`] which is a thin
//! convenience over [`FromStr`].

use serde::{Deserialize, Serialize};
use std::{
    fmt::{Display, Error as FmtError, Formatter, Result as FmtResult},
    fs::read_to_string,
    io::ErrorKind,
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};

/// Well-known remote of the core repository.
pub const DEFAULT_CORE_URL: &str = "https://github.com/rigup-dev/rigup.git";

/// Rigup configuration layout.
///
/// # General Layout
///
/// The top-level `store` field names the directory that holds durable copies
/// of the core and overlay repositories. The `core` and `overlay` tables
/// describe the two managed repositories. The overlay table is optional,
/// because not every installation is customized by an organization. The
/// remaining tables tune update behavior, build-tool trust marking, and the
/// installer that runs after a successful update.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    /// Directory housing durable repository copies.
    pub store: Option<PathBuf>,

    /// Core repository settings.
    pub core: RepoSettings,

    /// Organization overlay repository settings.
    pub overlay: Option<RepoSettings>,

    /// Update behavior.
    pub update: UpdateSettings,

    /// Build-tool trust marking.
    pub trust: TrustSettings,

    /// Installer to hand off to after update.
    pub install: InstallSettings,
}

impl Settings {
    /// Load settings from target file.
    ///
    /// A missing file yields default settings.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::Read`] if file exists but cannot be read.
    /// - Return [`ConfigError::Deserialize`] if file contents are invalid.
    /// - Return [`ConfigError::ShellExpansion`] if path expansion fails.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        match read_to_string(path.as_ref()) {
            Ok(content) => content.parse(),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(ConfigError::Read {
                source: err,
                path: path.as_ref().to_path_buf(),
            }),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            store: None,
            core: RepoSettings {
                url: DEFAULT_CORE_URL.into(),
                search_paths: Vec::new(),
            },
            overlay: None,
            update: UpdateSettings::default(),
            trust: TrustSettings::default(),
            install: InstallSettings::default(),
        }
    }
}

impl FromStr for Settings {
    type Err = ConfigError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let mut settings: Settings = toml::de::from_str(data).map_err(ConfigError::Deserialize)?;

        // INVARIANT: Perform shell expansion on every configured path.
        if let Some(store) = settings.store.take() {
            settings.store = Some(expand_path(&store)?);
        }
        settings.core.search_paths = expand_all(&settings.core.search_paths)?;
        if let Some(overlay) = settings.overlay.as_mut() {
            overlay.search_paths = expand_all(&overlay.search_paths)?;
        }

        Ok(settings)
    }
}

impl Display for Settings {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(
            toml::ser::to_string_pretty(self)
                .map_err(ConfigError::Serialize)?
                .as_str(),
        )
    }
}

/// Settings for one managed repository.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RepoSettings {
    /// Canonical remote URL.
    pub url: String,

    /// Extra places to look for an existing checkout. Glob patterns allowed.
    pub search_paths: Vec<String>,
}

/// Update behavior settings.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UpdateSettings {
    /// Upper bound on a single network operation in seconds.
    pub timeout_secs: u64,

    /// History depth for fetch and clone. Zero means full history.
    pub fetch_depth: i32,
}

impl UpdateSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for UpdateSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 5,
            fetch_depth: 1,
        }
    }
}

/// Build-tool trust marking settings.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TrustSettings {
    /// File names that mark a repository as needing trust.
    pub markers: Vec<String>,

    /// Command to run with the repository path appended.
    pub command: Vec<String>,
}

impl Default for TrustSettings {
    fn default() -> Self {
        Self {
            markers: vec!["mise.toml".into(), ".mise.toml".into()],
            command: vec!["mise".into(), "trust".into()],
        }
    }
}

/// Installer hand-off settings.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct InstallSettings {
    /// Command to run inside the core checkout.
    pub command: Vec<String>,
}

impl Default for InstallSettings {
    fn default() -> Self {
        Self {
            command: vec!["./install.sh".into()],
        }
    }
}

fn expand_path(path: &Path) -> Result<PathBuf> {
    Ok(PathBuf::from(
        shellexpand::full(path.to_string_lossy().as_ref())
            .map_err(ConfigError::ShellExpansion)?
            .into_owned(),
    ))
}

fn expand_all(patterns: &[String]) -> Result<Vec<String>> {
    patterns
        .iter()
        .map(|pattern| {
            shellexpand::full(pattern)
                .map(|expanded| expanded.into_owned())
                .map_err(ConfigError::ShellExpansion)
        })
        .collect()
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Configuration file cannot be read.
    #[error("failed to read configuration at {:?}", path.display())]
    Read {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Failed to deserialize configuration.
    #[error(transparent)]
    Deserialize(#[from] toml::de::Error),

    /// Failed to serialize configuration.
    #[error(transparent)]
    Serialize(#[from] toml::ser::Error),

    /// Failed to perform shell expansion on configuration.
    #[error(transparent)]
    ShellExpansion(#[from] shellexpand::LookupError<std::env::VarError>),
}

impl From<ConfigError> for FmtError {
    fn from(_: ConfigError) -> Self {
        FmtError
    }
}

/// Friendly result alias :3
type Result<T, E = ConfigError> = std::result::Result<T, E>;
