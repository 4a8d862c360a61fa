use scm::ScmError;
use thiserror::Error;

#[remain::sorted]
#[derive(Debug, Error)]
pub enum ChangelogErrors {
    /// Error that may occur while I/O operations.
    #[error(transparent)]
    IoError(#[from] std::io::Error),

    /// The platform reported neither a merge event nor a rebased commit comment for the merge
    /// request so there is nothing to associate it with.
    #[error("No merge sha found for PR #{0} via the platform API")]
    NoMergeSha(u64),

    /// A rebased commit comment should always be verifiable, if it isn't the data is inconsistent.
    #[error(
        "PR #{number} has a rebased SHA comment ({sha}) but that SHA was not found in the release branch or any tags"
    )]
    RebasedShaNotFound { number: u64, sha: String },

    #[error(transparent)]
    ScmError(#[from] ScmError),

    #[error(transparent)]
    TomlError(#[from] toml::de::Error),
}

pub type ChangelogResult<T> = Result<T, ChangelogErrors>;
