use thiserror::Error;

#[remain::sorted]
#[derive(Debug, Error)]
pub enum ScmError {
    #[error("Branch `{0}` could not be found")]
    BranchNotFound(String),

    #[error("Commit `{0}` could not be found")]
    CommitNotFound(String),

    /// `HEAD` doesn't point at a branch and no default branch could be found in its place.
    #[error("HEAD is detached and no default branch could be determined, configure a release branch")]
    DetachedHead,

    /// Error variant that represents errors coming out of libgit2.
    #[error("Git error: `{0}`")]
    GitError(#[from] git2::Error),

    /// Failure reported by a hosting platform client, e.g. an inaccessible commit or a failed
    /// batch request.
    #[error("Platform error: {0}")]
    PlatformError(String),
}

pub type ScmResult<T> = Result<T, ScmError>;
