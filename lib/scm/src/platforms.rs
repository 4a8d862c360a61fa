use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde_derive::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::commit::ScmCommit;
use crate::errors::ScmResult;

/// A release tag as reported by the hosting platform.
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct ScmPlatformTag {
    /// The name of the tag
    pub name: String,

    /// Commit the tag points at
    pub commit_sha: String,
}

impl ScmPlatformTag {
    pub fn new<N: Into<String>, S: Into<String>>(name: N, commit_sha: S) -> Self {
        Self {
            name: name.into(),
            commit_sha: commit_sha.into(),
        }
    }
}

// serde requires the `other` variant to be last
#[derive(Clone, Copy, Debug, Deserialize, Display, EnumString, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ScmPlatformEventKind {
    Closed,
    Merged,
    Referenced,
    Reopened,
    // platforms report dozens of event kinds (labeled, assigned, ...) which we don't care about
    #[serde(other)]
    Other,
}

/// Entry of an issue's or merge request's timeline.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ScmPlatformEvent {
    pub event: ScmPlatformEventKind,

    /// Commit associated with the event, e.g. the merge commit of a `merged` event
    #[serde(default)]
    pub commit_id: Option<String>,
}

impl ScmPlatformEvent {
    pub fn new(event: ScmPlatformEventKind, commit_id: Option<&str>) -> Self {
        Self {
            event,
            commit_id: commit_id.map(String::from),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ScmPlatformComment {
    pub body: String,
}

/// An issue or merge request.
///
/// Merge requests are issues which have been merged, i.e. `merged_at` is set. `events` and
/// `comments` are `None` until they have been fetched and are kept in chronological order.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct ScmPlatformIssue {
    pub number: u64,

    #[serde(default)]
    pub title: String,

    #[serde(default)]
    pub events: Option<Vec<ScmPlatformEvent>>,

    #[serde(default)]
    pub comments: Option<Vec<ScmPlatformComment>>,

    #[serde(default)]
    pub closed_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub merged_at: Option<DateTime<Utc>>,

    /// Oldest tag containing the change
    #[serde(default)]
    pub first_occurring_tag: Option<String>,

    /// Date the change was actually authored/closed, see closed date reconciliation
    #[serde(default)]
    pub actual_date: Option<DateTime<Utc>>,
}

impl ScmPlatformIssue {
    pub fn new(number: u64) -> Self {
        Self {
            number,
            ..Default::default()
        }
    }

    pub fn is_merged(&self) -> bool {
        self.merged_at.is_some()
    }

    /// First `merged` event in the timeline. Platforms occasionally report more than one, the
    /// earliest wins.
    pub fn merge_event(&self) -> Option<&ScmPlatformEvent> {
        self.events
            .as_ref()?
            .iter()
            .find(|e| e.event == ScmPlatformEventKind::Merged)
    }
}

/// Commit history of the repository, either from a local clone or the hosting platform.
pub trait ScmCommitHistory {
    /// All commit shas reachable from each tag, inclusive of the tagged commit, keyed by tag name.
    fn tag_shas(&self, tags: &[ScmPlatformTag]) -> ScmResult<HashMap<String, HashSet<String>>>;

    /// All commit shas reachable from the head of `branch`.
    fn commits_in_branch(&self, branch: &str) -> ScmResult<HashSet<String>>;

    /// Looks up a single commit. Fails when the commit isn't accessible, which is common for
    /// commits of merge requests opened from forks.
    fn commit(&self, id: &str) -> ScmResult<ScmCommit>;

    fn default_branch(&self) -> ScmResult<String>;
}

/// Timeline data of issues and merge requests. Each call is a batch keyed by issue number.
/// Numbers missing from the returned map have no data.
pub trait ScmPlatformActivity {
    fn events(&self, numbers: &[u64]) -> ScmResult<HashMap<u64, Vec<ScmPlatformEvent>>>;

    fn comments(&self, numbers: &[u64]) -> ScmResult<HashMap<u64, Vec<ScmPlatformComment>>>;
}

/// Everything the changelog needs from the outside world. Implementations are shared between
/// worker threads so must be `Sync`.
pub trait ScmPlatformFetcher: ScmCommitHistory + ScmPlatformActivity + Sync {}

impl<T> ScmPlatformFetcher for T where T: ScmCommitHistory + ScmPlatformActivity + Sync {}

/// Pairs a commit history source with an activity source, e.g. a local git clone with a hosting
/// platform client.
pub struct ScmFetcher<H, A> {
    pub history: H,
    pub activity: A,
}

impl<H, A> ScmFetcher<H, A> {
    pub fn new(history: H, activity: A) -> Self {
        Self { history, activity }
    }
}

impl<H: ScmCommitHistory, A> ScmCommitHistory for ScmFetcher<H, A> {
    fn tag_shas(&self, tags: &[ScmPlatformTag]) -> ScmResult<HashMap<String, HashSet<String>>> {
        self.history.tag_shas(tags)
    }

    fn commits_in_branch(&self, branch: &str) -> ScmResult<HashSet<String>> {
        self.history.commits_in_branch(branch)
    }

    fn commit(&self, id: &str) -> ScmResult<ScmCommit> {
        self.history.commit(id)
    }

    fn default_branch(&self) -> ScmResult<String> {
        self.history.default_branch()
    }
}

impl<H, A: ScmPlatformActivity> ScmPlatformActivity for ScmFetcher<H, A> {
    fn events(&self, numbers: &[u64]) -> ScmResult<HashMap<u64, Vec<ScmPlatformEvent>>> {
        self.activity.events(numbers)
    }

    fn comments(&self, numbers: &[u64]) -> ScmResult<HashMap<u64, Vec<ScmPlatformComment>>> {
        self.activity.comments(numbers)
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use crate::platforms::{ScmPlatformEventKind, ScmPlatformIssue};

    #[test]
    fn deserialize_issue_timeline() {
        let issue: ScmPlatformIssue = serde_json::from_str(
            r#"{
                "number": 42,
                "title": "Fix tag lookup",
                "closed_at": "2024-03-01T10:00:00Z",
                "merged_at": "2024-03-01T10:00:00Z",
                "events": [
                    {"event": "labeled"},
                    {"event": "reopened"},
                    {"event": "merged", "commit_id": "aaaa"},
                    {"event": "closed", "commit_id": null}
                ]
            }"#,
        )
        .unwrap();

        assert!(issue.is_merged());
        assert!(issue.comments.is_none());
        let events = issue.events.as_ref().unwrap();
        assert_eq!(ScmPlatformEventKind::Other, events[0].event);
        assert_eq!(ScmPlatformEventKind::Reopened, events[1].event);
        assert_eq!(Some("aaaa"), issue.merge_event().and_then(|e| e.commit_id.as_deref()));
    }

    #[test]
    fn first_merge_event_wins() {
        let issue: ScmPlatformIssue = serde_json::from_str(
            r#"{
                "number": 7,
                "events": [
                    {"event": "merged", "commit_id": "first"},
                    {"event": "merged", "commit_id": "second"}
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(
            Some("first"),
            issue.merge_event().and_then(|e| e.commit_id.as_deref())
        );
    }

    #[test]
    fn merge_event_without_events() {
        assert!(ScmPlatformIssue::new(1).merge_event().is_none());
    }

    #[test]
    fn event_kind_from_str() {
        assert_eq!(
            ScmPlatformEventKind::Merged,
            ScmPlatformEventKind::from_str("merged").unwrap()
        );
        assert_eq!("closed", ScmPlatformEventKind::Closed.to_string());
    }
}
