// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Release tag classification and selection.
//!
//! Rigup publishes itself through git tags. Every tag belongs to exactly one
//! __channel__ determined by its suffix alone:
//!
//! - `vX.Y.Z` is a release.
//! - `vX.Y.Z-rc.N` is a release candidate.
//! - `vX.Y.Z-beta.N` is a beta.
//!
//! Anything else is not a version tag and gets ignored.
//!
//! # Channel Priority
//!
//! Channel outranks recency. If the remote carries any release tag, the
//! greatest release wins even when a numerically later candidate or beta
//! exists. Candidates are only consulted when there are no releases at all,
//! and betas only when there are no candidates either.

use std::{
    cmp::Ordering,
    fmt::{Display, Formatter, Result as FmtResult},
    str::FromStr,
};

/// Stability classification of a version tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Release,
    Rc,
    Beta,
}

impl Channel {
    fn from_suffix(suffix: &str) -> Option<Self> {
        match suffix {
            "rc" => Some(Self::Rc),
            "beta" => Some(Self::Beta),
            _ => None,
        }
    }
}

impl Display for Channel {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Release => fmt.write_str("release"),
            Self::Rc => fmt.write_str("rc"),
            Self::Beta => fmt.write_str("beta"),
        }
    }
}

/// Git tag that follows rigup's version grammar.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VersionTag {
    raw: String,
    channel: Channel,
    major: u64,
    minor: u64,
    patch: u64,
    pre: u64,
}

impl VersionTag {
    /// Raw tag name as it appears on the remote.
    pub fn as_str(&self) -> &str {
        self.raw.as_str()
    }

    pub fn channel(&self) -> Channel {
        self.channel
    }

    /// Numeric components in comparison order.
    ///
    /// Release tags have no trailing number, so their last component is
    /// always zero. Comparing across channels is meaningless anyway.
    pub fn components(&self) -> (u64, u64, u64, u64) {
        (self.major, self.minor, self.patch, self.pre)
    }

    /// Compare numeric components only, ignoring channel.
    pub fn cmp_numeric(&self, other: &Self) -> Ordering {
        self.components().cmp(&other.components())
    }
}

impl FromStr for VersionTag {
    type Err = NotVersionTag;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let not_version = || NotVersionTag(raw.to_string());
        let body = raw.strip_prefix('v').ok_or_else(not_version)?;

        let (core, suffix) = match body.split_once('-') {
            Some((core, suffix)) => (core, Some(suffix)),
            None => (body, None),
        };

        let mut parts = core.split('.');
        let major = parts.next().and_then(parse_number).ok_or_else(not_version)?;
        let minor = parts.next().and_then(parse_number).ok_or_else(not_version)?;
        let patch = parts.next().and_then(parse_number).ok_or_else(not_version)?;
        if parts.next().is_some() {
            return Err(not_version());
        }

        let (channel, pre) = match suffix {
            None => (Channel::Release, 0),
            Some(suffix) => {
                let (name, number) = suffix.split_once('.').ok_or_else(not_version)?;
                let channel = Channel::from_suffix(name).ok_or_else(not_version)?;
                let pre = parse_number(number).ok_or_else(not_version)?;
                (channel, pre)
            }
        };

        Ok(Self {
            raw: raw.to_string(),
            channel,
            major,
            minor,
            patch,
            pre,
        })
    }
}

impl Display for VersionTag {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(self.as_str())
    }
}

// INVARIANT: Only plain ASCII digits count, no signs or whitespace.
fn parse_number(text: &str) -> Option<u64> {
    if text.is_empty() || !text.bytes().all(|byte| byte.is_ascii_digit()) {
        return None;
    }

    text.parse().ok()
}

/// Select the best tag to adopt from a set of remote tags.
///
/// Tags that do not follow the version grammar are discarded. Returns `None`
/// when nothing recognizable remains, which is a normal outcome rather than
/// an error.
pub fn resolve_latest<I, S>(tags: I) -> Option<VersionTag>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut release: Option<VersionTag> = None;
    let mut rc: Option<VersionTag> = None;
    let mut beta: Option<VersionTag> = None;

    for tag in tags {
        let Ok(tag) = tag.as_ref().parse::<VersionTag>() else {
            continue;
        };

        let slot = match tag.channel() {
            Channel::Release => &mut release,
            Channel::Rc => &mut rc,
            Channel::Beta => &mut beta,
        };

        let replace = match slot {
            Some(best) => tag.cmp_numeric(best) == Ordering::Greater,
            None => true,
        };
        if replace {
            *slot = Some(tag);
        }
    }

    release.or(rc).or(beta)
}

/// String does not follow the version tag grammar.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0:?} is not a version tag")]
pub struct NotVersionTag(pub String);
