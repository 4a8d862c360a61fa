use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use git2::{
    Commit as Git2Commit, ErrorCode, Oid as Git2Oid, Repository as Git2Repository,
    Signature as Git2Signature,
};
use tracing::{debug, warn};

use crate::commit::{ScmCommit, ScmSignature};
use crate::errors::{ScmError, ScmResult};
use crate::platforms::{ScmCommitHistory, ScmPlatformTag};

const DEFAULT_REMOTE: &str = "origin";

impl From<Git2Commit<'_>> for ScmCommit {
    fn from(value: Git2Commit) -> Self {
        ScmCommit {
            id: value.id().to_string(),
            message: value.message().unwrap_or_default().to_string(),
            author: value.author().into(),
            committer: value.committer().into(),
        }
    }
}

impl From<Git2Signature<'_>> for ScmSignature {
    fn from(signature: Git2Signature) -> Self {
        let seconds = signature.when().seconds();
        let date = DateTime::<Utc>::from_timestamp(seconds, 0).unwrap_or_else(|| {
            warn!(
                "signature time {seconds} of {} is out of range, using the unix epoch",
                signature.email().unwrap_or_default()
            );
            DateTime::<Utc>::default()
        });

        Self {
            name: signature.name().map(String::from),
            email: signature.email().map(String::from),
            date,
        }
    }
}

/// Commit history backed by a local clone.
///
/// `git2::Repository` isn't `Sync` so access is serialized, which is fine given lookups are cheap
/// compared to the hosting platform calls they replace.
pub struct GitScmRepository {
    inner: Mutex<Git2Repository>,
}

impl GitScmRepository {
    pub fn discover<P: AsRef<Path>>(path: P) -> ScmResult<Self> {
        Ok(Self {
            inner: Mutex::new(Git2Repository::discover(path)?),
        })
    }

    pub fn new<P: AsRef<Path>>(path: P) -> ScmResult<Self> {
        Ok(Self {
            inner: Mutex::new(Git2Repository::open(&path)?),
        })
    }

    fn repository(&self) -> MutexGuard<'_, Git2Repository> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn reachable_from(repository: &Git2Repository, oid: Git2Oid) -> ScmResult<HashSet<String>> {
        let mut revwalk = repository.revwalk()?;
        revwalk.push(oid)?;

        let mut shas = HashSet::new();
        for id in revwalk {
            shas.insert(id?.to_string());
        }

        Ok(shas)
    }

    /// Resolves a branch by local name first and falls back to the remote tracking branch.
    fn resolve_branch(repository: &Git2Repository, branch: &str) -> ScmResult<Git2Oid> {
        let candidates = [
            format!("refs/heads/{branch}"),
            format!("refs/remotes/{DEFAULT_REMOTE}/{branch}"),
        ];

        for candidate in candidates {
            match repository.find_reference(&candidate) {
                Ok(reference) => return Ok(reference.peel_to_commit()?.id()),
                Err(e) if e.code() == ErrorCode::NotFound => {
                    debug!("reference {candidate} not found");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(ScmError::BranchNotFound(branch.to_string()))
    }
}

impl ScmCommitHistory for GitScmRepository {
    fn tag_shas(&self, tags: &[ScmPlatformTag]) -> ScmResult<HashMap<String, HashSet<String>>> {
        let repository = self.repository();
        let mut shas = HashMap::with_capacity(tags.len());
        for tag in tags {
            let oid = Git2Oid::from_str(&tag.commit_sha)?;
            // annotated tags point to a tag object rather than the commit
            let commit = repository.find_object(oid, None)?.peel_to_commit()?;
            shas.insert(
                tag.name.clone(),
                Self::reachable_from(&repository, commit.id())?,
            );
        }

        Ok(shas)
    }

    fn commits_in_branch(&self, branch: &str) -> ScmResult<HashSet<String>> {
        let repository = self.repository();
        let oid = Self::resolve_branch(&repository, branch)?;
        Self::reachable_from(&repository, oid)
    }

    fn commit(&self, id: &str) -> ScmResult<ScmCommit> {
        let repository = self.repository();
        let oid = Git2Oid::from_str(id).map_err(|_| ScmError::CommitNotFound(id.to_string()))?;
        let commit: ScmCommit = match repository.find_commit(oid) {
            Ok(commit) => commit.into(),
            Err(e) if e.code() == ErrorCode::NotFound => {
                return Err(ScmError::CommitNotFound(id.to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        Ok(commit)
    }

    /// The branch `origin/HEAD` points to, otherwise the currently checked out branch. A detached
    /// `HEAD` falls back to `init.defaultBranch` when that branch exists.
    fn default_branch(&self) -> ScmResult<String> {
        let repository = self.repository();
        let remote_head = format!("refs/remotes/{DEFAULT_REMOTE}/HEAD");
        if let Ok(reference) = repository.find_reference(&remote_head) {
            if let Some(target) = reference.symbolic_target() {
                let prefix = format!("refs/remotes/{DEFAULT_REMOTE}/");
                return Ok(target.trim_start_matches(&prefix).to_string());
            }
        }

        let head = repository.head()?;
        if head.is_branch() {
            if let Some(branch) = head.shorthand() {
                return Ok(branch.to_string());
            }
        }

        // detached checkouts, e.g. on CI, usually lack origin/HEAD as well
        let snapshot = repository.config()?.snapshot()?;
        if let Ok(branch) = snapshot.get_string("init.defaultBranch") {
            if Self::resolve_branch(&repository, &branch).is_ok() {
                return Ok(branch);
            }
        }

        Err(ScmError::DetachedHead)
    }
}
