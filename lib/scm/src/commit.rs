use chrono::{DateTime, Utc};
use serde_derive::{Deserialize, Serialize};

// TODO: should we have a CommitId type? Shas are compared as lowercase hex strings for now
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct ScmCommit {
    /// Commit ID
    pub id: String,

    /// Commit message
    #[serde(default)]
    pub message: String,

    /// The author of the commit
    pub author: ScmSignature,

    /// Committer.
    pub committer: ScmSignature,
}

impl ScmCommit {
    /// When the change was originally written. Unlike the committer date this survives rebases
    /// and cherry-picks.
    pub fn authored_at(&self) -> DateTime<Utc> {
        self.author.date
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct ScmSignature {
    pub name: Option<String>,
    pub email: Option<String>,
    pub date: DateTime<Utc>,
}
