// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! In-memory stand-in for a real version control backend.
//!
//! Models one remote per URL and one local repository per path. Fetching a
//! refspec copies matching remote refs into the local repository the same
//! way git would, so resolution logic behaves as it would against a real
//! remote. Every call is recorded for later inspection.

use crate::vcs::{AdoptedRef, RefKind, RemoteListing, Result, Vcs};

use std::{
    cell::RefCell,
    collections::{BTreeMap, HashMap, HashSet},
    path::{Path, PathBuf},
};

#[derive(Debug, Default, Clone)]
pub(crate) struct FakeRemote {
    /// Full ref name to commit.
    pub(crate) refs: BTreeMap<String, String>,
    pub(crate) default_branch: Option<String>,
}

impl FakeRemote {
    pub(crate) fn with_branch(mut self, name: &str, commit: &str) -> Self {
        self.refs.insert(format!("refs/heads/{name}"), commit.into());
        if self.default_branch.is_none() {
            self.default_branch = Some(name.into());
        }
        self
    }

    pub(crate) fn with_tag(mut self, name: &str, commit: &str) -> Self {
        self.refs.insert(format!("refs/tags/{name}"), commit.into());
        self
    }

    fn head(&self) -> Option<&String> {
        let branch = self.default_branch.as_ref()?;
        self.refs.get(&format!("refs/heads/{branch}"))
    }
}

#[derive(Debug, Default, Clone)]
pub(crate) struct FakeRepo {
    pub(crate) url: String,
    pub(crate) head: String,
    pub(crate) refs: BTreeMap<String, String>,
    pub(crate) dirty: bool,
    pub(crate) stashes: usize,
}

#[derive(Debug, Default)]
pub(crate) struct FakeVcs {
    pub(crate) remotes: RefCell<HashMap<String, FakeRemote>>,
    pub(crate) repos: RefCell<HashMap<PathBuf, FakeRepo>>,
    pub(crate) calls: RefCell<Vec<String>>,
    pub(crate) offline: RefCell<HashSet<String>>,
    pub(crate) fail_stash: bool,
    pub(crate) fail_checkout: bool,
    /// Remote names that a direct fetch by name cannot resolve.
    pub(crate) no_direct: RefCell<HashSet<String>>,
}

impl FakeVcs {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn add_remote(&self, url: &str, remote: FakeRemote) {
        self.remotes.borrow_mut().insert(url.into(), remote);
    }

    pub(crate) fn add_repo(&self, path: impl Into<PathBuf>, url: &str, head: &str) {
        self.repos.borrow_mut().insert(
            path.into(),
            FakeRepo {
                url: url.into(),
                head: head.into(),
                ..Default::default()
            },
        );
    }

    pub(crate) fn set_offline(&self, url: &str) {
        self.offline.borrow_mut().insert(url.into());
    }

    pub(crate) fn head(&self, path: impl AsRef<Path>) -> Option<String> {
        self.repos
            .borrow()
            .get(path.as_ref())
            .map(|repo| repo.head.clone())
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    pub(crate) fn network_calls(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|call| {
                call.starts_with("ls_remote")
                    || call.starts_with("fetch")
                    || call.starts_with("clone")
            })
            .collect()
    }

    fn record(&self, call: String) {
        self.calls.borrow_mut().push(call);
    }

    fn remote(&self, url: &str) -> Result<FakeRemote> {
        if self.offline.borrow().contains(url) {
            return Err(git2::Error::from_str("could not resolve host").into());
        }

        self.remotes
            .borrow()
            .get(url)
            .cloned()
            .ok_or_else(|| git2::Error::from_str("repository not found").into())
    }

    fn repo(&self, path: &Path) -> Result<FakeRepo> {
        self.repos
            .borrow()
            .get(path)
            .cloned()
            .ok_or_else(|| git2::Error::from_str("could not find repository").into())
    }
}

// Expand a refspec source the way git does when it is not fully qualified.
fn dwim(remote: &FakeRemote, source: &str) -> Vec<(String, String)> {
    if let Some(prefix) = source.strip_suffix('*') {
        return remote
            .refs
            .iter()
            .filter(|(name, _)| name.starts_with(prefix))
            .map(|(name, commit)| (name.clone(), commit.clone()))
            .collect();
    }

    let candidates = [
        source.to_string(),
        format!("refs/{source}"),
        format!("refs/tags/{source}"),
        format!("refs/heads/{source}"),
    ];
    candidates
        .iter()
        .find_map(|name| remote.refs.get(name).map(|commit| (name.clone(), commit.clone())))
        .into_iter()
        .collect()
}

impl Vcs for FakeVcs {
    fn is_repository(&self, path: &Path) -> bool {
        self.repos.borrow().contains_key(path)
    }

    fn origin_url(&self, path: &Path) -> Result<String> {
        Ok(self.repo(path)?.url)
    }

    fn head_commit(&self, path: &Path) -> Result<String> {
        Ok(self.repo(path)?.head)
    }

    fn head_tags(&self, path: &Path) -> Result<Vec<String>> {
        let repo = self.repo(path)?;
        let tags = repo
            .refs
            .iter()
            .filter(|(_, commit)| **commit == repo.head)
            .filter_map(|(name, _)| name.strip_prefix("refs/tags/").map(str::to_owned))
            .collect();

        Ok(tags)
    }

    fn ls_remote(&self, url: &str) -> Result<RemoteListing> {
        self.record(format!("ls_remote {url}"));
        let remote = self.remote(url)?;
        let prefixed = |prefix: &str| {
            remote
                .refs
                .keys()
                .filter_map(|name| name.strip_prefix(prefix).map(str::to_owned))
                .collect::<Vec<_>>()
        };

        Ok(RemoteListing {
            head: remote.head().cloned(),
            default_branch: remote.default_branch.clone(),
            tags: prefixed("refs/tags/"),
            branches: prefixed("refs/heads/"),
        })
    }

    fn clone_repo(&self, url: &str, path: &Path, branch: Option<&str>) -> Result<()> {
        self.record(format!("clone {url} {}", branch.unwrap_or("-")));
        let remote = self.remote(url)?;
        let head = match branch {
            Some(branch) => remote
                .refs
                .get(&format!("refs/heads/{branch}"))
                .cloned()
                .ok_or_else(|| git2::Error::from_str("remote branch not found"))?,
            None => remote
                .head()
                .cloned()
                .ok_or_else(|| git2::Error::from_str("remote has no HEAD"))?,
        };

        let mut refs = BTreeMap::new();
        for (name, commit) in &remote.refs {
            if let Some(branch) = name.strip_prefix("refs/heads/") {
                refs.insert(format!("refs/remotes/origin/{branch}"), commit.clone());
            }
        }

        self.repos.borrow_mut().insert(
            path.to_path_buf(),
            FakeRepo {
                url: url.into(),
                head,
                refs,
                ..Default::default()
            },
        );

        Ok(())
    }

    fn fetch(&self, path: &Path, refspecs: &[String]) -> Result<()> {
        self.record(format!("fetch {}", refspecs.join(" ")));
        let mut repo = self.repo(path)?;
        let remote = self.remote(&repo.url)?;

        for refspec in refspecs {
            let refspec = refspec.trim_start_matches('+');
            let (source, destination) = refspec.split_once(':').unwrap_or((refspec, ""));
            if !source.contains('/') && self.no_direct.borrow().contains(source) {
                continue;
            }

            let matched = dwim(&remote, source);
            if matched.is_empty() {
                return Err(git2::Error::from_str("couldn't find remote ref").into());
            }

            for (name, commit) in matched {
                let local = match destination.strip_suffix('*') {
                    Some(prefix) => {
                        let source_prefix = source.trim_end_matches('*');
                        format!("{prefix}{}", name.trim_start_matches(source_prefix))
                    }
                    None => destination.to_string(),
                };
                if !local.is_empty() {
                    repo.refs.insert(local, commit);
                }
            }
        }

        self.repos.borrow_mut().insert(path.to_path_buf(), repo);

        Ok(())
    }

    fn resolve_ref(&self, path: &Path, name: &str) -> Result<Option<String>> {
        Ok(self.repo(path)?.refs.get(name).cloned())
    }

    fn remove_ref(&self, path: &Path, name: &str) -> Result<()> {
        let mut repos = self.repos.borrow_mut();
        let repo = repos
            .get_mut(path)
            .ok_or_else(|| git2::Error::from_str("could not find repository"))?;
        repo.refs.remove(name);

        Ok(())
    }

    fn stash(&self, path: &Path) -> Result<bool> {
        self.record(format!("stash {}", path.display()));
        if self.fail_stash {
            return Err(git2::Error::from_str("cannot stash").into());
        }

        let mut repos = self.repos.borrow_mut();
        let repo = repos
            .get_mut(path)
            .ok_or_else(|| git2::Error::from_str("could not find repository"))?;
        let stashed = repo.dirty;
        if stashed {
            repo.stashes += 1;
        }
        repo.dirty = false;

        Ok(stashed)
    }

    fn stash_pop(&self, path: &Path) -> Result<()> {
        self.record(format!("stash pop {}", path.display()));
        let mut repos = self.repos.borrow_mut();
        let repo = repos
            .get_mut(path)
            .ok_or_else(|| git2::Error::from_str("could not find repository"))?;
        if repo.stashes == 0 {
            return Err(git2::Error::from_str("no stash entries").into());
        }
        repo.stashes -= 1;
        repo.dirty = true;

        Ok(())
    }

    fn checkout(&self, path: &Path, target: &AdoptedRef) -> Result<()> {
        self.record(format!("checkout {}", target.name));
        if self.fail_checkout {
            return Err(git2::Error::from_str("conflicting local changes").into());
        }

        let mut repos = self.repos.borrow_mut();
        let repo = repos
            .get_mut(path)
            .ok_or_else(|| git2::Error::from_str("could not find repository"))?;
        repo.head = target.commit.clone();
        if target.kind == RefKind::Branch {
            repo.refs
                .insert(format!("refs/heads/{}", target.name), target.commit.clone());
        }

        Ok(())
    }

    fn hard_reset(&self, path: &Path, revision: &str) -> Result<()> {
        self.record(format!("reset {revision}"));
        let mut repos = self.repos.borrow_mut();
        let repo = repos
            .get_mut(path)
            .ok_or_else(|| git2::Error::from_str("could not find repository"))?;
        let commit = repo
            .refs
            .get(revision)
            .cloned()
            .ok_or_else(|| git2::Error::from_str("revspec not found"))?;
        repo.head = commit;
        repo.dirty = false;

        Ok(())
    }
}
