use std::collections::HashSet;

use scm::platforms::{ScmCommitHistory, ScmPlatformTag};
use tracing::{debug, warn};

use crate::errors::ChangelogResult;

#[derive(Clone, Debug)]
pub struct IndexedTag {
    pub tag: ScmPlatformTag,

    /// Every commit reachable from the tag, including the tagged commit.
    pub shas_in_tag: HashSet<String>,
}

/// Commits contained in each release tag.
///
/// Tags are kept in the order they were given, newest to oldest. The index is built once per run
/// and only read afterwards.
#[derive(Clone, Debug, Default)]
pub struct TagShaIndex {
    tags: Vec<IndexedTag>,
}

impl TagShaIndex {
    /// Fetches the commits of all tags in a single batch.
    pub fn build<H>(history: &H, tags: Vec<ScmPlatformTag>) -> ChangelogResult<Self>
    where
        H: ScmCommitHistory + ?Sized,
    {
        debug!("fetching commits for {} tags", tags.len());
        let mut shas = history.tag_shas(&tags)?;

        let tags = tags
            .into_iter()
            .map(|tag| {
                let shas_in_tag = shas.remove(&tag.name).unwrap_or_else(|| {
                    warn!("No commits found for tag {}", tag.name);
                    HashSet::new()
                });
                IndexedTag { tag, shas_in_tag }
            })
            .collect();

        Ok(Self { tags })
    }

    pub fn from_tags(tags: Vec<IndexedTag>) -> Self {
        Self { tags }
    }

    /// Oldest tag whose history contains `sha`, i.e. the first release that shipped the commit.
    pub fn earliest_tag_containing(&self, sha: &str) -> Option<&ScmPlatformTag> {
        self.tags
            .iter()
            .rev()
            .find(|t| t.shas_in_tag.contains(sha))
            .map(|t| &t.tag)
    }

    pub fn shas_in_tag(&self, name: &str) -> Option<&HashSet<String>> {
        self.tags
            .iter()
            .find(|t| t.tag.name == name)
            .map(|t| &t.shas_in_tag)
    }

    pub fn tags(&self) -> impl Iterator<Item = &ScmPlatformTag> {
        self.tags.iter().map(|t| &t.tag)
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }
}
