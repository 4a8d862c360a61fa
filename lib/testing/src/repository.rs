use std::path::Path;

use git2::{Oid, Repository, RepositoryInitOptions, Signature, Time};
use tempfile::TempDir;

/// Throwaway git repository with an initial branch of `main`. Removed when dropped.
pub struct TestRepository {
    repository: Repository,
    dir: TempDir,
}

impl TestRepository {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("create temp dir");
        let mut options = RepositoryInitOptions::new();
        options.initial_head("main");
        let repository = Repository::init_opts(dir.path(), &options).expect("init repository");
        Self { repository, dir }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Commits an empty tree on top of `HEAD`, authored at `authored` seconds since epoch.
    /// Returns the sha of the new commit.
    pub fn commit(&self, message: &str, authored: i64) -> String {
        self.commit_on("HEAD", message, authored)
    }

    /// Commits on top of `reference`, e.g. `refs/heads/feature`, without moving `HEAD`.
    pub fn commit_on(&self, reference: &str, message: &str, authored: i64) -> String {
        let author = Signature::new("Sean", "sean@doctavious.com", &Time::new(authored, 0))
            .expect("author signature");
        let committer = Signature::new(
            "Doctavious",
            "bot@doctavious.com",
            &Time::new(authored + 3600, 0),
        )
        .expect("committer signature");

        let tree_id = self
            .repository
            .index()
            .expect("index")
            .write_tree()
            .expect("write tree");
        let tree = self.repository.find_tree(tree_id).expect("find tree");

        let parent = self
            .repository
            .revparse_single(reference)
            .ok()
            .and_then(|o| o.peel_to_commit().ok());
        let parents = parent.iter().collect::<Vec<_>>();

        self.repository
            .commit(
                Some(reference),
                &author,
                &committer,
                message,
                &tree,
                &parents,
            )
            .expect("commit")
            .to_string()
    }

    /// Creates a lightweight tag pointing at `sha`.
    pub fn tag(&self, name: &str, sha: &str) {
        let object = self.object(sha);
        self.repository
            .tag_lightweight(name, &object, false)
            .expect("lightweight tag");
    }

    /// Creates an annotated tag pointing at `sha` and returns the sha of the tag object.
    pub fn annotated_tag(&self, name: &str, sha: &str) -> String {
        let object = self.object(sha);
        let tagger = Signature::now("Sean", "sean@doctavious.com").expect("tagger signature");
        self.repository
            .tag(name, &object, &tagger, &format!("Release {name}"), false)
            .expect("annotated tag")
            .to_string()
    }

    /// Creates branch `name` at `sha`.
    pub fn branch(&self, name: &str, sha: &str) {
        let commit = self
            .repository
            .find_commit(Oid::from_str(sha).expect("valid sha"))
            .expect("find commit");
        self.repository
            .branch(name, &commit, false)
            .expect("create branch");
    }

    /// Checks out `sha` without a branch, the way CI checkouts usually leave a clone.
    pub fn detach_head(&self, sha: &str) {
        self.repository
            .set_head_detached(Oid::from_str(sha).expect("valid sha"))
            .expect("detach head");
    }

    /// Sets `key` in the repository's local config.
    pub fn set_config(&self, key: &str, value: &str) {
        self.repository
            .config()
            .expect("config")
            .set_str(key, value)
            .expect("set config");
    }

    fn object(&self, sha: &str) -> git2::Object<'_> {
        self.repository
            .find_object(Oid::from_str(sha).expect("valid sha"), None)
            .expect("find object")
    }
}

impl Default for TestRepository {
    fn default() -> Self {
        Self::new()
    }
}
