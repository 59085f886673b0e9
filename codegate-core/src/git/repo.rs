//! Git repository detection and diff extraction

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use git2::{Commit, Diff, DiffFormat, DiffOptions, DiffStatsFormat, Repository, Tree};
use tracing::debug;

use crate::{Error, Result};

/// A pending commit message older than this is from an earlier commit
const PENDING_MESSAGE_MAX_AGE: Duration = Duration::from_secs(60);

/// Which change to review
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DiffSource {
    /// The index against HEAD
    #[default]
    Staged,
    /// A commit against its first parent
    Commit(String),
}

impl std::fmt::Display for DiffSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DiffSource::Staged => write!(f, "staged changes"),
            DiffSource::Commit(rev) => write!(f, "commit {}", rev),
        }
    }
}

/// A git repository wrapper providing review-specific operations
pub struct GitRepo {
    /// The underlying git2 repository
    repo: Repository,
    /// Path to the repository root
    root: PathBuf,
}

impl std::fmt::Debug for GitRepo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitRepo")
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}

impl GitRepo {
    /// Open a git repository at the given path
    ///
    /// This will search upward from the given path to find the repository root.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let repo = Repository::discover(path).map_err(|e| {
            if e.code() == git2::ErrorCode::NotFound {
                Error::Git(format!(
                    "Not a git repository: {}. Run 'git init' first or navigate to a git repository.",
                    path.display()
                ))
            } else {
                Error::from(e)
            }
        })?;

        let root = repo
            .workdir()
            .ok_or_else(|| Error::Git("Bare repositories are not supported".to_string()))?
            .to_path_buf();

        Ok(Self { repo, root })
    }

    /// Get the repository root path
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the `.git` directory
    pub fn git_dir(&self) -> &Path {
        self.repo.path()
    }

    /// Check if the given path is inside a git repository
    pub fn is_git_repo(path: impl AsRef<Path>) -> bool {
        Repository::discover(path.as_ref()).is_ok()
    }

    /// Get the current branch name
    pub fn current_branch(&self) -> Result<Option<String>> {
        let head = match self.repo.head() {
            Ok(h) => h,
            Err(e) if e.code() == git2::ErrorCode::UnbornBranch => {
                // No commits yet; HEAD still names the branch
                let name = self
                    .repo
                    .find_reference("HEAD")
                    .ok()
                    .and_then(|r| r.symbolic_target().map(str::to_string))
                    .map(|t| t.trim_start_matches("refs/heads/").to_string());
                return Ok(name);
            }
            Err(e) => return Err(e.into()),
        };

        if head.is_branch() {
            Ok(head.shorthand().map(|s| s.to_string()))
        } else {
            // Detached HEAD
            Ok(None)
        }
    }

    fn head_tree(&self) -> Result<Option<Tree<'_>>> {
        match self.repo.head() {
            Ok(head) => Ok(Some(head.peel_to_tree()?)),
            Err(e) if e.code() == git2::ErrorCode::UnbornBranch => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn find_commit(&self, rev: &str) -> Result<Commit<'_>> {
        let object = self
            .repo
            .revparse_single(rev)
            .map_err(|e| Error::Git(format!("Unknown revision '{}': {}", rev, e.message())))?;
        Ok(object.peel_to_commit()?)
    }

    fn diff(&self, source: &DiffSource, pathspec: Option<&str>) -> Result<Diff<'_>> {
        let mut opts = DiffOptions::new();
        if let Some(path) = pathspec {
            opts.pathspec(path).disable_pathspec_match(true);
        }

        let diff = match source {
            DiffSource::Staged => {
                let head = self.head_tree()?;
                self.repo
                    .diff_tree_to_index(head.as_ref(), None, Some(&mut opts))?
            }
            DiffSource::Commit(rev) => {
                let commit = self.find_commit(rev)?;
                let tree = commit.tree()?;
                let parent = match commit.parents().next() {
                    Some(parent) => Some(parent.tree()?),
                    None => None,
                };
                self.repo
                    .diff_tree_to_tree(parent.as_ref(), Some(&tree), Some(&mut opts))?
            }
        };
        Ok(diff)
    }

    /// Paths touched by the change, in diff order
    pub fn changed_files(&self, source: &DiffSource) -> Result<Vec<String>> {
        let diff = self.diff(source, None)?;
        let files = diff
            .deltas()
            .filter_map(|delta| {
                delta
                    .new_file()
                    .path()
                    .or_else(|| delta.old_file().path())
                    .map(|p| p.to_string_lossy().replace('\\', "/"))
            })
            .collect();
        Ok(files)
    }

    /// Unified diff of the whole change
    pub fn diff_text(&self, source: &DiffSource) -> Result<String> {
        patch_text(&self.diff(source, None)?)
    }

    /// Unified diff of one file of the change
    pub fn file_diff(&self, source: &DiffSource, path: &str) -> Result<String> {
        patch_text(&self.diff(source, Some(path))?)
    }

    /// One-line change statistics, like `git diff --shortstat`
    pub fn shortstat(&self, source: &DiffSource) -> Result<String> {
        let stats = self.diff(source, None)?.stats()?;
        let buf = stats.to_buf(DiffStatsFormat::SHORT, 80)?;
        Ok(buf.as_str().unwrap_or_default().trim().to_string())
    }

    /// Subject line describing the change
    ///
    /// For a commit this is its summary. For staged changes it is the message
    /// of a commit being made right now, when one is available.
    pub fn change_summary(&self, source: &DiffSource) -> Result<Option<String>> {
        match source {
            DiffSource::Staged => Ok(self.pending_commit_message()),
            DiffSource::Commit(rev) => {
                let commit = self.find_commit(rev)?;
                Ok(commit.summary().map(str::to_string).filter(|s| !s.is_empty()))
            }
        }
    }

    /// First line of a fresh `COMMIT_EDITMSG`, as seen from a pre-commit hook
    fn pending_commit_message(&self) -> Option<String> {
        let path = self.repo.path().join("COMMIT_EDITMSG");
        let modified = std::fs::metadata(&path).and_then(|m| m.modified()).ok()?;
        let age = SystemTime::now().duration_since(modified).unwrap_or_default();
        if age > PENDING_MESSAGE_MAX_AGE {
            debug!(path = %path.display(), "Ignoring stale commit message");
            return None;
        }

        let message = std::fs::read_to_string(&path).ok()?;
        message
            .lines()
            .next()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    }

    /// Staged files
    pub fn staged_files(&self) -> Result<Vec<String>> {
        self.changed_files(&DiffSource::Staged)
    }

    /// Diff of everything staged
    pub fn staged_diff(&self) -> Result<String> {
        self.diff_text(&DiffSource::Staged)
    }

    /// Staged diff of one file
    pub fn staged_file_diff(&self, path: &str) -> Result<String> {
        self.file_diff(&DiffSource::Staged, path)
    }

    /// Files changed by a commit
    pub fn commit_files(&self, rev: &str) -> Result<Vec<String>> {
        self.changed_files(&DiffSource::Commit(rev.to_string()))
    }

    /// Diff of a commit against its first parent
    pub fn commit_diff(&self, rev: &str) -> Result<String> {
        self.diff_text(&DiffSource::Commit(rev.to_string()))
    }

    /// Diff of one file in a commit
    pub fn commit_file_diff(&self, rev: &str, path: &str) -> Result<String> {
        self.file_diff(&DiffSource::Commit(rev.to_string()), path)
    }

    /// Get access to the underlying git2 repository
    pub fn inner(&self) -> &Repository {
        &self.repo
    }
}

/// Render a diff as patch text
fn patch_text(diff: &Diff<'_>) -> Result<String> {
    let mut out = String::new();
    diff.print(DiffFormat::Patch, |_delta, _hunk, line| {
        if matches!(line.origin(), '+' | '-' | ' ') {
            out.push(line.origin());
        }
        out.push_str(&String::from_utf8_lossy(line.content()));
        true
    })?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn commit_all(repo: &Repository, message: &str) {
        let mut index = repo.index().unwrap();
        index
            .add_all(["*"].iter(), git2::IndexAddOption::DEFAULT, None)
            .unwrap();
        index.write().unwrap();
        let tree_id = index.write_tree().unwrap();
        let tree = repo.find_tree(tree_id).unwrap();
        let sig = git2::Signature::now("Test", "test@example.com").unwrap();
        let parents: Vec<Commit<'_>> = repo
            .head()
            .ok()
            .and_then(|h| h.peel_to_commit().ok())
            .into_iter()
            .collect();
        let parent_refs: Vec<&Commit<'_>> = parents.iter().collect();
        repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &parent_refs)
            .unwrap();
    }

    fn stage(repo: &Repository, path: &str) {
        let mut index = repo.index().unwrap();
        index.add_path(Path::new(path)).unwrap();
        index.write().unwrap();
    }

    /// Repo with one commit, then a staged edit to a.rs and a staged new b.rs
    fn fixture() -> (TempDir, GitRepo) {
        let dir = TempDir::new().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        std::fs::write(dir.path().join("a.rs"), "fn a() {}\n").unwrap();
        commit_all(&repo, "Initial commit\n\nWith a body");

        std::fs::write(dir.path().join("a.rs"), "fn a() { todo!() }\n").unwrap();
        std::fs::write(dir.path().join("b.rs"), "fn b() {}\n").unwrap();
        stage(&repo, "a.rs");
        stage(&repo, "b.rs");

        let git = GitRepo::open(dir.path()).unwrap();
        (dir, git)
    }

    #[test]
    fn test_open_non_git_dir() {
        let dir = TempDir::new().unwrap();
        let err = GitRepo::open(dir.path()).unwrap_err();
        assert!(err.to_string().contains("Not a git repository"));
        assert!(!GitRepo::is_git_repo(dir.path()));
    }

    #[test]
    fn test_staged_files_and_diff() {
        let (_dir, git) = fixture();
        assert_eq!(git.staged_files().unwrap(), vec!["a.rs", "b.rs"]);

        let diff = git.staged_file_diff("a.rs").unwrap();
        assert!(diff.starts_with("diff --git a/a.rs b/a.rs"));
        assert!(diff.contains("-fn a() {}\n"));
        assert!(diff.contains("+fn a() { todo!() }\n"));
        assert!(!diff.contains("b.rs"));

        let whole = git.staged_diff().unwrap();
        assert!(whole.contains("diff --git a/b.rs b/b.rs"));
    }

    #[test]
    fn test_shortstat() {
        let (_dir, git) = fixture();
        let stat = git.shortstat(&DiffSource::Staged).unwrap();
        assert_eq!(stat, "2 files changed, 2 insertions(+), 1 deletion(-)");
    }

    #[test]
    fn test_commit_diff_and_summary() {
        let (_dir, git) = fixture();
        commit_all(git.inner(), "Add b");

        assert_eq!(git.commit_files("HEAD").unwrap(), vec!["a.rs", "b.rs"]);
        assert!(git.commit_file_diff("HEAD", "b.rs").unwrap().contains("+fn b() {}"));
        assert!(git.commit_diff("HEAD~1").unwrap().contains("+fn a() {}"));
        assert_eq!(
            git.change_summary(&DiffSource::Commit("HEAD~1".into())).unwrap(),
            Some("Initial commit".to_string())
        );
        assert!(git.staged_files().unwrap().is_empty());
    }

    #[test]
    fn test_unknown_revision() {
        let (_dir, git) = fixture();
        let err = git.commit_files("no-such-rev").unwrap_err();
        assert!(err.to_string().contains("Unknown revision 'no-such-rev'"));
    }

    #[test]
    fn test_pending_commit_message() {
        let (_dir, git) = fixture();
        assert_eq!(git.change_summary(&DiffSource::Staged).unwrap(), None);

        std::fs::write(git.git_dir().join("COMMIT_EDITMSG"), "Fix parser\n\nDetails").unwrap();
        assert_eq!(
            git.change_summary(&DiffSource::Staged).unwrap(),
            Some("Fix parser".to_string())
        );
    }

    #[test]
    fn test_current_branch_unborn() {
        let dir = TempDir::new().unwrap();
        Repository::init(dir.path()).unwrap();
        let git = GitRepo::open(dir.path()).unwrap();
        assert!(git.current_branch().unwrap().is_some());
    }
}
