use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};

use lazy_static::lazy_static;
use rayon::prelude::*;
use regex::Regex;
use scm::platforms::{ScmPlatformComment, ScmPlatformFetcher, ScmPlatformIssue};
use tracing::{debug, info, warn};

use crate::errors::{ChangelogErrors, ChangelogResult};
use crate::settings::ChangelogSettings;
use crate::tags::TagShaIndex;

lazy_static! {
    static ref REBASED_COMMIT_REGEX: Regex =
        Regex::new(r"(?i)rebased commit: ([0-9a-f]{40})").unwrap();
}

/// Latest sha recorded via a `rebased commit: <sha>` comment. Comments are in chronological
/// order.
pub fn rebased_sha(comments: &[ScmPlatformComment]) -> Option<String> {
    comments.iter().rev().find_map(|c| {
        REBASED_COMMIT_REGEX
            .captures(&c.body)
            .and_then(|captures| captures.get(1))
            .map(|m| m.as_str().to_ascii_lowercase())
    })
}

/// Where a commit was found.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ShaLocation {
    /// Released, with the name of the oldest tag containing the commit
    Tag(String),

    /// Merged but not yet released
    ReleaseBranch,
}

impl ShaLocation {
    pub fn tag_name(&self) -> Option<&str> {
        match self {
            ShaLocation::Tag(name) => Some(name.as_str()),
            ShaLocation::ReleaseBranch => None,
        }
    }
}

/// Commit sets a sha is looked up in. Tags take precedence over the release branch.
pub struct ShaLookup<'a> {
    pub tags: &'a TagShaIndex,

    /// `None` until the release branch history has been fetched
    pub release_branch: Option<&'a HashSet<String>>,
}

impl ShaLookup<'_> {
    /// Whether a sha missing from `locate` is missing for good.
    pub fn is_complete(&self) -> bool {
        self.release_branch.is_some()
    }

    pub fn locate(&self, sha: &str) -> Option<ShaLocation> {
        if let Some(tag) = self.tags.earliest_tag_containing(sha) {
            return Some(ShaLocation::Tag(tag.name.clone()));
        }

        self.release_branch
            .filter(|shas| shas.contains(sha))
            .map(|_| ShaLocation::ReleaseBranch)
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum AssociationFailure {
    NoMergeSha,
    RebasedShaNotFound(String),
}

/// Steps taken to associate a merge request with a tag.
///
/// A merge sha is tried first, then a rebased commit comment. Which of the two was missing decides
/// whether running out of evidence is fatal: a merge sha that can't be found only warrants a
/// warning while a merge request without any merge sha is an error.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum AssociationState {
    /// No merge event, a rebased commit comment is the only remaining signal
    NoEvidence,

    HaveMergeSha(String),

    /// Merge event whose commit, if it had one, is in neither a tag nor the release branch
    MergeShaUnmatched(Option<String>),

    HaveRebaseSha(String),

    Associated(ShaLocation),

    Unassociated,

    Fatal(AssociationFailure),
}

impl AssociationState {
    pub fn initial(pr: &ScmPlatformIssue) -> Self {
        match pr.merge_event() {
            Some(event) => match &event.commit_id {
                Some(sha) => AssociationState::HaveMergeSha(sha.clone()),
                None => AssociationState::MergeShaUnmatched(None),
            },
            None => AssociationState::NoEvidence,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AssociationState::Associated(_)
                | AssociationState::Unassociated
                | AssociationState::Fatal(_)
        )
    }

    pub fn needs_comments(&self) -> bool {
        matches!(
            self,
            AssociationState::NoEvidence | AssociationState::MergeShaUnmatched(_)
        )
    }

    /// Holds a sha which isn't tagged and can only be settled by the release branch.
    pub fn needs_release_branch(&self, lookup: &ShaLookup<'_>) -> bool {
        match self {
            AssociationState::HaveMergeSha(sha) | AssociationState::HaveRebaseSha(sha) => {
                !lookup.is_complete() && lookup.locate(sha).is_none()
            }
            _ => false,
        }
    }

    /// Single transition. States stay put until the `comments` or release branch they need are
    /// available.
    pub fn next(self, lookup: &ShaLookup<'_>, comments: Option<&[ScmPlatformComment]>) -> Self {
        if self.needs_release_branch(lookup) {
            return self;
        }

        match self {
            AssociationState::HaveMergeSha(sha) => match lookup.locate(&sha) {
                Some(location) => AssociationState::Associated(location),
                None => AssociationState::MergeShaUnmatched(Some(sha)),
            },
            AssociationState::NoEvidence => match comments {
                None => AssociationState::NoEvidence,
                Some(comments) => match rebased_sha(comments) {
                    Some(sha) => AssociationState::HaveRebaseSha(sha),
                    None => AssociationState::Fatal(AssociationFailure::NoMergeSha),
                },
            },
            AssociationState::MergeShaUnmatched(merge_sha) => match comments {
                None => AssociationState::MergeShaUnmatched(merge_sha),
                Some(comments) => match rebased_sha(comments) {
                    Some(sha) => AssociationState::HaveRebaseSha(sha),
                    None => AssociationState::Unassociated,
                },
            },
            AssociationState::HaveRebaseSha(sha) => match lookup.locate(&sha) {
                Some(location) => AssociationState::Associated(location),
                None => AssociationState::Fatal(AssociationFailure::RebasedShaNotFound(sha)),
            },
            terminal => terminal,
        }
    }

    /// Runs transitions until the state is terminal or waits on comments or the release branch.
    pub fn resolve(self, lookup: &ShaLookup<'_>, comments: Option<&[ScmPlatformComment]>) -> Self {
        let mut state = self;
        while !state.is_terminal()
            && !(state.needs_comments() && comments.is_none())
            && !state.needs_release_branch(lookup)
        {
            state = state.next(lookup, comments);
        }
        state
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AssociationResult {
    pub pr_id: u64,

    /// `None` when the merge request is only part of the release branch
    pub tag_name: Option<String>,
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Associations {
    pub associated: Vec<AssociationResult>,

    /// Merge requests which could not be found in any tag or the release branch
    pub unassociated: Vec<u64>,
}

impl Associations {
    pub fn tag_for(&self, pr_id: u64) -> Option<&str> {
        self.associated
            .iter()
            .find(|a| a.pr_id == pr_id)
            .and_then(|a| a.tag_name.as_deref())
    }

    pub fn is_associated(&self, pr_id: u64) -> bool {
        self.associated.iter().any(|a| a.pr_id == pr_id)
    }

    /// Writes `first_occurring_tag` for associated merge requests.
    pub fn apply(&self, prs: &mut [ScmPlatformIssue]) {
        let tags: HashMap<u64, &Option<String>> = self
            .associated
            .iter()
            .map(|a| (a.pr_id, &a.tag_name))
            .collect();

        for pr in prs {
            if let Some(tag_name) = tags.get(&pr.number) {
                pr.first_occurring_tag = (*tag_name).clone();
            }
        }
    }

    pub fn unassociated_prs<'p>(&self, prs: &'p [ScmPlatformIssue]) -> Vec<&'p ScmPlatformIssue> {
        prs.iter()
            .filter(|pr| self.unassociated.contains(&pr.number))
            .collect()
    }
}

/// Determines the first tag, or the release branch, each merge request landed in.
pub struct TagAssociator<'a, F: ?Sized> {
    fetcher: &'a F,
    settings: &'a ChangelogSettings,
}

impl<'a, F> TagAssociator<'a, F>
where
    F: ScmPlatformFetcher + ?Sized,
{
    pub fn new(fetcher: &'a F, settings: &'a ChangelogSettings) -> Self {
        Self { fetcher, settings }
    }

    pub fn release_branch(&self) -> ChangelogResult<String> {
        match &self.settings.release_branch {
            Some(branch) => Ok(branch.clone()),
            None => Ok(self.fetcher.default_branch()?),
        }
    }

    fn release_branch_shas(&self) -> ChangelogResult<HashSet<String>> {
        let branch = self.release_branch()?;
        debug!("fetching commits of release branch {branch}");
        Ok(self.fetcher.commits_in_branch(&branch)?)
    }

    /// Associates every merge request with the oldest tag containing it.
    ///
    /// `prs` are expected to have their events loaded. Tags are tried before anything else is
    /// fetched. Comments are fetched in a single batch for merge requests that need them and don't
    /// have them yet. The release branch history is fetched at most once, and only when a merge or
    /// rebased sha isn't part of any tag.
    pub fn associate(
        &self,
        tags: &TagShaIndex,
        prs: &[ScmPlatformIssue],
    ) -> ChangelogResult<Associations> {
        let total = prs.len();
        let progress = AtomicUsize::new(0);
        let report = || {
            let count = progress.fetch_add(1, Ordering::SeqCst) + 1;
            if self.settings.verbose {
                info!("Associating PRs with tags: {count}/{total}");
            }
        };

        let mut fetched: HashMap<u64, Vec<ScmPlatformComment>> = HashMap::new();
        let mut release_branch_shas: Option<HashSet<String>> = None;

        let tags_only = ShaLookup {
            tags,
            release_branch: None,
        };
        let mut states: Vec<AssociationState> = prs.iter().map(AssociationState::initial).collect();
        states = Self::advance(prs, states, &tags_only, &fetched, &report);

        // an untagged merge sha can only be found in the release branch
        if states
            .iter()
            .any(|state| matches!(state, AssociationState::HaveMergeSha(_)))
        {
            release_branch_shas = Some(self.release_branch_shas()?);
            let lookup = ShaLookup {
                tags,
                release_branch: release_branch_shas.as_ref(),
            };
            states = Self::advance(prs, states, &lookup, &fetched, &report);
        }

        let pending: Vec<u64> = prs
            .iter()
            .zip(&states)
            .filter(|(pr, state)| state.needs_comments() && pr.comments.is_none())
            .map(|(pr, _)| pr.number)
            .collect();
        if !pending.is_empty() {
            debug!("fetching comments for {} PRs", pending.len());
            fetched = self.fetcher.comments(&pending)?;
            for number in pending {
                fetched.entry(number).or_default();
            }

            let lookup = ShaLookup {
                tags,
                release_branch: release_branch_shas.as_ref(),
            };
            states = Self::advance(prs, states, &lookup, &fetched, &report);
        }

        if release_branch_shas.is_none() && states.iter().any(|state| !state.is_terminal()) {
            release_branch_shas = Some(self.release_branch_shas()?);
            let lookup = ShaLookup {
                tags,
                release_branch: release_branch_shas.as_ref(),
            };
            states = Self::advance(prs, states, &lookup, &fetched, &report);
        }

        let mut associations = Associations::default();
        let mut failures = Vec::new();
        for (pr, state) in prs.iter().zip(states) {
            match state {
                AssociationState::Associated(location) => {
                    associations.associated.push(AssociationResult {
                        pr_id: pr.number,
                        tag_name: location.tag_name().map(String::from),
                    })
                }
                AssociationState::Unassociated => {
                    warn!(
                        "PR {} merge commit was not found in the release branch or tagged git history and no rebased SHA comment was found",
                        pr.number
                    );
                    associations.unassociated.push(pr.number);
                }
                AssociationState::Fatal(failure) => failures.push((pr.number, failure)),
                state => unreachable!("association of PR {} stopped at {state:?}", pr.number),
            }
        }

        if let Some((number, failure)) = failures.into_iter().min_by_key(|(number, _)| *number) {
            return Err(match failure {
                AssociationFailure::NoMergeSha => ChangelogErrors::NoMergeSha(number),
                AssociationFailure::RebasedShaNotFound(sha) => {
                    ChangelogErrors::RebasedShaNotFound { number, sha }
                }
            });
        }

        Ok(associations)
    }

    /// Moves every unsettled merge request as far as `lookup` and the available comments allow.
    fn advance<R>(
        prs: &[ScmPlatformIssue],
        states: Vec<AssociationState>,
        lookup: &ShaLookup<'_>,
        fetched: &HashMap<u64, Vec<ScmPlatformComment>>,
        report: &R,
    ) -> Vec<AssociationState>
    where
        R: Fn() + Sync,
    {
        prs.par_iter()
            .zip(states.into_par_iter())
            .map(|(pr, state)| {
                if state.is_terminal() {
                    return state;
                }

                let comments = pr
                    .comments
                    .as_deref()
                    .or_else(|| fetched.get(&pr.number).map(Vec::as_slice));
                let state = state.resolve(lookup, comments);
                if state.is_terminal() {
                    report();
                }
                state
            })
            .collect()
    }
}
