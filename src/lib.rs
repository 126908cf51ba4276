// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Self-update machinery of the rigup workstation provisioner.
//!
//! Rigup keeps a developer workstation provisioned from two git
//! repositories: the __core__ repository holding rigup itself, and an
//! optional organization __overlay__ layered on top. This crate decides
//! whether either has something newer to offer, resolves exactly which
//! reference to adopt, checks it out without clobbering local work, and keeps
//! durable copies of both repositories inside rigup's store.
//!
//! # Release channels
//!
//! Core releases are tagged `vX.Y.Z`, with release candidates tagged
//! `vX.Y.Z-rc.N` and betas tagged `vX.Y.Z-beta.N`. A plain release always
//! wins over any candidate or beta, no matter how recent the candidate is.
//! See [`version::resolve_latest`].
//!
//! # See Also
//!
//! 1. [`update::Updater`]
//! 2. [`vcs::Vcs`]

pub mod config;
pub mod marker;
pub mod path;
pub mod repo;
pub mod snooze;
pub mod state;
pub mod trust;
pub mod update;
pub mod vcs;
pub mod version;
