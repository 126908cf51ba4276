// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Installed version marker.
//!
//! The installer leaves a one line marker behind describing what it
//! installed. Rigup only ever reads it to learn the installed core tag. The
//! line is split on whitespace:
//!
//! ```text
//! 2025-10-01 14:03:22 v2.1.0 ...
//! ```
//!
//! The first field is the installation date, and the third field is the
//! version tag. Anything after the tag is ignored.

use crate::{
    state::{StateError, StateStore},
    version::VersionTag,
};

use std::str::FromStr;

const MARKER_KEY: &str = "version";
const DATE_FIELD: usize = 0;
const TAG_FIELD: usize = 2;

/// Parsed version marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionMarker {
    pub installed_on: String,
    pub tag: VersionTag,
}

impl VersionMarker {
    /// Load version marker from state store.
    ///
    /// Returns `None` if no marker has been written yet.
    ///
    /// # Errors
    ///
    /// - Return [`MarkerError::State`] if marker cannot be read.
    /// - Return [`MarkerError::Malformed`] if marker does not follow the
    ///   expected layout.
    pub fn load(store: &impl StateStore) -> Result<Option<Self>> {
        store
            .read(MARKER_KEY)?
            .map(|content| content.parse())
            .transpose()
    }
}

impl FromStr for VersionMarker {
    type Err = MarkerError;

    fn from_str(content: &str) -> Result<Self, Self::Err> {
        let line = content
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .ok_or_else(|| MarkerError::Malformed(content.to_string()))?;

        let fields = line.split_whitespace().collect::<Vec<_>>();
        let installed_on = fields
            .get(DATE_FIELD)
            .filter(|date| looks_like_date(date))
            .ok_or_else(|| MarkerError::Malformed(line.to_string()))?;
        let tag = fields
            .get(TAG_FIELD)
            .and_then(|tag| tag.parse::<VersionTag>().ok())
            .ok_or_else(|| MarkerError::Malformed(line.to_string()))?;

        Ok(Self {
            installed_on: installed_on.to_string(),
            tag,
        })
    }
}

// INVARIANT: Dates are YYYY-MM-DD, digits only apart from the dashes.
fn looks_like_date(field: &str) -> bool {
    let parts = field.split('-').collect::<Vec<_>>();
    parts.len() == 3
        && [4, 2, 2]
            .iter()
            .zip(&parts)
            .all(|(len, part)| part.len() == *len && part.bytes().all(|b| b.is_ascii_digit()))
}

/// Version marker error types.
#[derive(Debug, thiserror::Error)]
pub enum MarkerError {
    /// Marker does not follow the expected layout.
    #[error("malformed version marker {0:?}")]
    Malformed(String),

    /// Marker cannot be read.
    #[error(transparent)]
    State(#[from] StateError),
}

/// Friendly result alias :3
pub type Result<T, E = MarkerError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::MemoryStore;
    use indoc::indoc;
    use pretty_assertions::assert_eq;

    #[test]
    fn parse_marker_line() -> anyhow::Result<()> {
        let marker: VersionMarker = indoc! {"

            2025-10-01 14:03:22 v2.1.0-rc.3 installed-by install.sh
        "}
        .parse()?;

        assert_eq!(marker.installed_on, "2025-10-01");
        assert_eq!(marker.tag.as_str(), "v2.1.0-rc.3");

        Ok(())
    }

    #[test]
    fn reject_marker_without_tag() {
        assert!("2025-10-01 14:03:22".parse::<VersionMarker>().is_err());
        assert!("2025-10-01 14:03:22 main".parse::<VersionMarker>().is_err());
        assert!("yesterday 14:03:22 v1.0.0".parse::<VersionMarker>().is_err());
        assert!("".parse::<VersionMarker>().is_err());
    }

    #[test]
    fn load_missing_marker() -> anyhow::Result<()> {
        let store = MemoryStore::new();
        assert_eq!(VersionMarker::load(&store)?, None);

        store.write(MARKER_KEY, "2024-01-31 08:00:00 v1.0.0\n")?;
        let marker = VersionMarker::load(&store)?.unwrap();
        assert_eq!(marker.tag.as_str(), "v1.0.0");

        Ok(())
    }
}
