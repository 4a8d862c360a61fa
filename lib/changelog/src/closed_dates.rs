use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use scm::platforms::{ScmCommitHistory, ScmPlatformEventKind, ScmPlatformIssue};
use tracing::warn;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ReconciliationResult {
    pub issue_id: u64,
    pub actual_date: Option<DateTime<Utc>>,
}

impl ReconciliationResult {
    /// Writes `actual_date` back onto the matching issues.
    pub fn apply(results: &[ReconciliationResult], issues: &mut [ScmPlatformIssue]) {
        let dates: HashMap<u64, Option<DateTime<Utc>>> = results
            .iter()
            .map(|r| (r.issue_id, r.actual_date))
            .collect();

        for issue in issues {
            if let Some(actual_date) = dates.get(&issue.number) {
                issue.actual_date = *actual_date;
            }
        }
    }
}

/// Works out when an issue was really closed.
///
/// The platform's `closed_at` reflects when the issue was closed on the platform which, for
/// rebased history, can lag behind or misrepresent when the change was made. When the closing
/// event references a commit, that commit's author date is used instead.
pub struct ClosedDateReconciler<'a, F: ?Sized> {
    fetcher: &'a F,
}

impl<'a, F> ClosedDateReconciler<'a, F>
where
    F: ScmCommitHistory + Sync + ?Sized,
{
    pub fn new(fetcher: &'a F) -> Self {
        Self { fetcher }
    }

    /// `None` when the issue has no events or no closing event. Never fails, a commit that
    /// can't be fetched falls back to `closed_at`.
    pub fn reconcile(&self, issue: &ScmPlatformIssue) -> Option<ReconciliationResult> {
        let events = issue.events.as_ref()?;
        let kind = if issue.is_merged() {
            ScmPlatformEventKind::Merged
        } else {
            ScmPlatformEventKind::Closed
        };

        // latest closing event
        let event = events.iter().rev().find(|e| e.event == kind)?;

        let actual_date = match &event.commit_id {
            None => issue.closed_at,
            Some(commit_id) => match self.fetcher.commit(commit_id) {
                Ok(commit) => Some(commit.authored_at()),
                Err(e) => {
                    warn!(
                        "Can't fetch commit {commit_id} for #{}. It is probably referenced from another repo: {e}",
                        issue.number
                    );
                    issue.closed_at
                }
            },
        };

        Some(ReconciliationResult {
            issue_id: issue.number,
            actual_date,
        })
    }

    /// Reconciles issues in parallel, results keep the order of `issues`.
    pub fn reconcile_all(&self, issues: &[ScmPlatformIssue]) -> Vec<ReconciliationResult> {
        issues
            .par_iter()
            .filter_map(|issue| self.reconcile(issue))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use scm::platforms::{ScmPlatformEvent, ScmPlatformEventKind, ScmPlatformIssue};
    use testing::platform::InMemoryScmPlatform;
    use testing::{datetime, sha};
    use tracing_test::traced_test;

    use crate::closed_dates::{ClosedDateReconciler, ReconciliationResult};

    fn closed(commit_id: Option<&str>) -> ScmPlatformEvent {
        ScmPlatformEvent::new(ScmPlatformEventKind::Closed, commit_id)
    }

    fn merged(commit_id: Option<&str>) -> ScmPlatformEvent {
        ScmPlatformEvent::new(ScmPlatformEventKind::Merged, commit_id)
    }

    fn issue(number: u64, events: Vec<ScmPlatformEvent>) -> ScmPlatformIssue {
        ScmPlatformIssue {
            events: Some(events),
            closed_at: Some(datetime("2024-05-01T00:00:00Z")),
            ..ScmPlatformIssue::new(number)
        }
    }

    #[test]
    fn latest_closed_event_wins() {
        let platform = InMemoryScmPlatform::new()
            .with_commit("abc", datetime("2024-01-01T00:00:00Z"))
            .with_commit("def", datetime("2024-02-01T00:00:00Z"));
        let issue = issue(1, vec![closed(Some("abc")), closed(Some("def"))]);

        let result = ClosedDateReconciler::new(&platform)
            .reconcile(&issue)
            .unwrap();

        assert_eq!(1, result.issue_id);
        // author date, the committer date is an hour later
        assert_eq!(Some(datetime("2024-02-01T00:00:00Z")), result.actual_date);
        assert_eq!(1, platform.commit_requests());
    }

    #[test]
    fn merged_event_for_merge_requests() {
        let platform = InMemoryScmPlatform::new()
            .with_commit(&sha(1), datetime("2024-03-01T08:30:00Z"))
            .with_commit(&sha(2), datetime("2024-03-02T08:30:00Z"));
        let pr = ScmPlatformIssue {
            merged_at: Some(datetime("2024-04-01T00:00:00Z")),
            ..issue(2, vec![merged(Some(sha(1).as_str())), closed(Some(sha(2).as_str()))])
        };

        let result = ClosedDateReconciler::new(&platform).reconcile(&pr).unwrap();

        assert_eq!(Some(datetime("2024-03-01T08:30:00Z")), result.actual_date);
    }

    #[test]
    fn event_without_commit_uses_closed_at() {
        let platform = InMemoryScmPlatform::new();
        let issue = issue(3, vec![closed(Some("abc")), closed(None)]);

        let result = ClosedDateReconciler::new(&platform)
            .reconcile(&issue)
            .unwrap();

        assert_eq!(Some(datetime("2024-05-01T00:00:00Z")), result.actual_date);
        assert_eq!(0, platform.commit_requests());
    }

    #[test]
    #[traced_test]
    fn inaccessible_commit_falls_back_to_closed_at() {
        let platform = InMemoryScmPlatform::new();
        let issue = issue(4, vec![closed(Some("from-a-fork"))]);

        let result = ClosedDateReconciler::new(&platform)
            .reconcile(&issue)
            .unwrap();

        assert_eq!(issue.closed_at, result.actual_date);
        assert_eq!(1, platform.commit_requests());
        assert!(logs_contain("Can't fetch commit from-a-fork for #4"));
    }

    #[test]
    fn no_events_is_skipped() {
        let platform = InMemoryScmPlatform::new();
        let issue = ScmPlatformIssue {
            closed_at: Some(datetime("2024-05-01T00:00:00Z")),
            ..ScmPlatformIssue::new(5)
        };

        assert_eq!(None, ClosedDateReconciler::new(&platform).reconcile(&issue));
        assert_eq!(0, platform.commit_requests());
    }

    #[test]
    fn no_closing_event_is_skipped() {
        let platform = InMemoryScmPlatform::new();
        // a merge request only looks at merged events
        let pr = ScmPlatformIssue {
            merged_at: Some(datetime("2024-04-01T00:00:00Z")),
            ..issue(6, vec![closed(Some("abc"))])
        };

        assert_eq!(None, ClosedDateReconciler::new(&platform).reconcile(&pr));
    }

    #[test]
    fn reconcile_all_keeps_order() {
        let platform = InMemoryScmPlatform::new().with_commit("abc", datetime("2024-01-01T00:00:00Z"));
        let mut issues = vec![
            issue(10, vec![closed(Some("abc"))]),
            ScmPlatformIssue::new(11),
            issue(12, vec![closed(None)]),
            issue(13, vec![closed(Some("missing"))]),
        ];

        let results = ClosedDateReconciler::new(&platform).reconcile_all(&issues);

        assert_eq!(
            vec![10, 12, 13],
            results.iter().map(|r| r.issue_id).collect::<Vec<_>>()
        );

        ReconciliationResult::apply(&results, &mut issues);

        assert_eq!(Some(datetime("2024-01-01T00:00:00Z")), issues[0].actual_date);
        assert_eq!(None, issues[1].actual_date);
        assert_eq!(issues[2].closed_at, issues[2].actual_date);
        assert_eq!(issues[3].closed_at, issues[3].actual_date);
    }
}
