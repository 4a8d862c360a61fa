use scm::platforms::{ScmPlatformFetcher, ScmPlatformIssue, ScmPlatformTag};
use tracing::{debug, info};

use crate::association::TagAssociator;
use crate::closed_dates::{ClosedDateReconciler, ReconciliationResult};
use crate::errors::ChangelogResult;
use crate::settings::ChangelogSettings;
use crate::tags::TagShaIndex;

/// Issues and merge requests annotated with when, and in which release, they landed.
#[derive(Debug)]
pub struct Changelog {
    issues: Vec<ScmPlatformIssue>,
    pull_requests: Vec<ScmPlatformIssue>,
    unassociated: Vec<u64>,
}

impl Changelog {
    /// Annotates already fetched issues and merge requests.
    ///
    /// `tags` must be ordered newest to oldest. Merge requests closed without being merged are
    /// dropped. Fails when a merge request can't be associated with any evidence, in which case no
    /// partial changelog is produced.
    pub fn collect<F>(
        settings: &ChangelogSettings,
        fetcher: &F,
        tags: Vec<ScmPlatformTag>,
        mut issues: Vec<ScmPlatformIssue>,
        pull_requests: Vec<ScmPlatformIssue>,
    ) -> ChangelogResult<Self>
    where
        F: ScmPlatformFetcher + ?Sized,
    {
        let mut pull_requests: Vec<ScmPlatformIssue> = pull_requests
            .into_iter()
            .filter(|pr| {
                if !pr.is_merged() {
                    debug!("skipping PR {} as it was closed without being merged", pr.number);
                }
                pr.is_merged()
            })
            .collect();

        // every lookup below depends on the tag index being complete
        let index = TagShaIndex::build(fetcher, tags)?;

        Self::populate_events(fetcher, &mut issues, &mut pull_requests)?;

        if settings.verbose {
            info!("Fetching closed dates for issues...");
        }
        let reconciler = ClosedDateReconciler::new(fetcher);
        ReconciliationResult::apply(&reconciler.reconcile_all(&issues), &mut issues);
        ReconciliationResult::apply(&reconciler.reconcile_all(&pull_requests), &mut pull_requests);
        if settings.verbose {
            info!("Fetching closed dates for issues: Done!");
        }

        let associations =
            TagAssociator::new(fetcher, settings).associate(&index, &pull_requests)?;
        associations.apply(&mut pull_requests);

        Ok(Self {
            issues,
            pull_requests,
            unassociated: associations.unassociated,
        })
    }

    /// Loads events, in one batch, for everything which doesn't have them yet.
    fn populate_events<F>(
        fetcher: &F,
        issues: &mut [ScmPlatformIssue],
        pull_requests: &mut [ScmPlatformIssue],
    ) -> ChangelogResult<()>
    where
        F: ScmPlatformFetcher + ?Sized,
    {
        let missing: Vec<u64> = issues
            .iter()
            .chain(pull_requests.iter())
            .filter(|i| i.events.is_none())
            .map(|i| i.number)
            .collect();

        if missing.is_empty() {
            return Ok(());
        }

        debug!("fetching events for {} issues and PRs", missing.len());
        let mut events = fetcher.events(&missing)?;
        for issue in issues
            .iter_mut()
            .chain(pull_requests.iter_mut())
            .filter(|i| i.events.is_none())
        {
            issue.events = Some(events.remove(&issue.number).unwrap_or_default());
        }

        Ok(())
    }

    pub fn issues(&self) -> &[ScmPlatformIssue] {
        &self.issues
    }

    pub fn pull_requests(&self) -> &[ScmPlatformIssue] {
        &self.pull_requests
    }

    /// Merged merge requests that aren't part of any tag or the release branch.
    pub fn unassociated_pull_requests(&self) -> Vec<&ScmPlatformIssue> {
        self.pull_requests
            .iter()
            .filter(|pr| self.unassociated.contains(&pr.number))
            .collect()
    }
}
