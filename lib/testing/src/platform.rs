use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use scm::commit::{ScmCommit, ScmSignature};
use scm::errors::{ScmError, ScmResult};
use scm::platforms::{
    ScmCommitHistory, ScmPlatformActivity, ScmPlatformComment, ScmPlatformEvent, ScmPlatformTag,
};

/// Hosting platform stand-in serving canned data and recording what was requested.
pub struct InMemoryScmPlatform {
    tag_shas: HashMap<String, HashSet<String>>,
    branches: HashMap<String, HashSet<String>>,
    default_branch: String,
    commits: HashMap<String, ScmCommit>,
    events: HashMap<u64, Vec<ScmPlatformEvent>>,
    comments: HashMap<u64, Vec<ScmPlatformComment>>,
    branch_requests: Mutex<Vec<String>>,
    event_requests: Mutex<Vec<Vec<u64>>>,
    comment_requests: Mutex<Vec<Vec<u64>>>,
    commit_requests: AtomicUsize,
}

impl Default for InMemoryScmPlatform {
    fn default() -> Self {
        Self {
            tag_shas: HashMap::new(),
            branches: HashMap::new(),
            default_branch: "main".to_string(),
            commits: HashMap::new(),
            events: HashMap::new(),
            comments: HashMap::new(),
            branch_requests: Mutex::new(vec![]),
            event_requests: Mutex::new(vec![]),
            comment_requests: Mutex::new(vec![]),
            commit_requests: AtomicUsize::new(0),
        }
    }
}

impl InMemoryScmPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tag<S: AsRef<str>>(mut self, name: &str, shas: &[S]) -> Self {
        self.tag_shas
            .insert(name.to_string(), shas.iter().map(|s| s.as_ref().to_string()).collect());
        self
    }

    pub fn with_branch<S: AsRef<str>>(mut self, name: &str, shas: &[S]) -> Self {
        self.branches
            .insert(name.to_string(), shas.iter().map(|s| s.as_ref().to_string()).collect());
        self
    }

    pub fn with_default_branch(mut self, name: &str) -> Self {
        self.default_branch = name.to_string();
        self
    }

    /// Registers a commit authored at `authored` and committed an hour later.
    pub fn with_commit(mut self, id: &str, authored: DateTime<Utc>) -> Self {
        let signature = |date| ScmSignature {
            name: Some("Sean".to_string()),
            email: Some("sean@doctavious.com".to_string()),
            date,
        };
        self.commits.insert(
            id.to_string(),
            ScmCommit {
                id: id.to_string(),
                message: format!("commit {id}"),
                author: signature(authored),
                committer: signature(authored + chrono::Duration::hours(1)),
            },
        );
        self
    }

    pub fn with_events(mut self, number: u64, events: Vec<ScmPlatformEvent>) -> Self {
        self.events.insert(number, events);
        self
    }

    pub fn with_comments<S: AsRef<str>>(mut self, number: u64, bodies: &[S]) -> Self {
        self.comments.insert(
            number,
            bodies
                .iter()
                .map(|b| ScmPlatformComment {
                    body: b.as_ref().to_string(),
                })
                .collect(),
        );
        self
    }

    pub fn branch_requests(&self) -> Vec<String> {
        self.branch_requests.lock().unwrap().clone()
    }

    pub fn event_requests(&self) -> Vec<Vec<u64>> {
        self.event_requests.lock().unwrap().clone()
    }

    pub fn comment_requests(&self) -> Vec<Vec<u64>> {
        self.comment_requests.lock().unwrap().clone()
    }

    pub fn commit_requests(&self) -> usize {
        self.commit_requests.load(Ordering::SeqCst)
    }
}

impl ScmCommitHistory for InMemoryScmPlatform {
    fn tag_shas(&self, tags: &[ScmPlatformTag]) -> ScmResult<HashMap<String, HashSet<String>>> {
        Ok(tags
            .iter()
            .filter_map(|t| {
                self.tag_shas
                    .get(&t.name)
                    .map(|shas| (t.name.clone(), shas.clone()))
            })
            .collect())
    }

    fn commits_in_branch(&self, branch: &str) -> ScmResult<HashSet<String>> {
        self.branch_requests.lock().unwrap().push(branch.to_string());
        self.branches
            .get(branch)
            .cloned()
            .ok_or_else(|| ScmError::BranchNotFound(branch.to_string()))
    }

    fn commit(&self, id: &str) -> ScmResult<ScmCommit> {
        self.commit_requests.fetch_add(1, Ordering::SeqCst);
        self.commits
            .get(id)
            .cloned()
            .ok_or_else(|| ScmError::PlatformError(format!("No commit found for SHA: {id}")))
    }

    fn default_branch(&self) -> ScmResult<String> {
        Ok(self.default_branch.clone())
    }
}

impl ScmPlatformActivity for InMemoryScmPlatform {
    fn events(&self, numbers: &[u64]) -> ScmResult<HashMap<u64, Vec<ScmPlatformEvent>>> {
        self.event_requests.lock().unwrap().push(numbers.to_vec());
        Ok(numbers
            .iter()
            .filter_map(|n| self.events.get(n).map(|e| (*n, e.clone())))
            .collect())
    }

    fn comments(&self, numbers: &[u64]) -> ScmResult<HashMap<u64, Vec<ScmPlatformComment>>> {
        self.comment_requests.lock().unwrap().push(numbers.to_vec());
        Ok(numbers
            .iter()
            .filter_map(|n| self.comments.get(n).map(|c| (*n, c.clone())))
            .collect())
    }
}
