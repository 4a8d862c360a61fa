use std::fs;
use std::path::Path;

use serde_derive::{Deserialize, Serialize};

use crate::errors::ChangelogResult;

/// Table holding changelog settings when they are part of a larger configuration file
pub const CHANGELOG_SECTION: &str = "changelog";

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default)]
pub struct ChangelogSettings {
    /// Branch holding merged but not yet released changes.
    /// Defaults to the repository's default branch.
    pub release_branch: Option<String>,

    /// Whether to report progress while associating merge requests with tags.
    pub verbose: bool,
}

impl ChangelogSettings {
    /// Parses settings from either a `[changelog]` table or a document containing only changelog
    /// settings.
    pub fn from_toml(content: &str) -> ChangelogResult<Self> {
        let mut document: toml::Table = toml::from_str(content)?;
        let settings: Self = match document.remove(CHANGELOG_SECTION) {
            Some(section) => section.try_into()?,
            None => toml::Value::Table(document).try_into()?,
        };

        Ok(settings)
    }

    pub fn from_path(path: &Path) -> ChangelogResult<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_toml(&content)
    }
}
