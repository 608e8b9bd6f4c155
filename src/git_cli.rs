//! Git access through the `git` command line.
//!
//! Repositories are expected under the configured root as
//! `<root>/<organization>/<project>/<repository>.git` (bare) or
//! `<root>/<organization>/<project>/<repository>` (working copy). Every
//! read is a `git --git-dir <dir> ...` invocation, so the working tree is
//! never touched.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use tokio::process::Command;

use blobdex_core::git::{GitRepo, GitRepoReader};
use blobdex_core::identity::RepoScope;

/// Opens repositories below a root directory.
#[derive(Debug, Clone)]
pub struct CliGitReader {
    root: PathBuf,
}

impl CliGitReader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve `scope` to a git directory on disk.
    pub fn resolve(&self, scope: &RepoScope) -> Result<PathBuf> {
        let base = self.root.join(&scope.organization).join(&scope.project);
        let bare = base.join(format!("{}.git", scope.repository));
        if bare.is_dir() {
            return Ok(bare);
        }
        let work = base.join(&scope.repository);
        let dot_git = work.join(".git");
        if dot_git.is_dir() {
            return Ok(dot_git);
        }
        if work.is_dir() {
            return Ok(work);
        }
        bail!("No git repository for {} under {}", scope, self.root.display());
    }

    pub fn open(&self, scope: &RepoScope) -> Result<CliGitRepo> {
        Ok(CliGitRepo {
            git_dir: self.resolve(scope)?,
        })
    }
}

#[async_trait]
impl GitRepoReader for CliGitReader {
    async fn get_git_repo(&self, scope: &RepoScope) -> Result<Arc<dyn GitRepo>> {
        Ok(Arc::new(self.open(scope)?))
    }
}

/// One blob entry of a recursive tree listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    pub mode: String,
    pub blob: String,
    pub size: u64,
    pub path: String,
}

/// An open repository addressed by its git directory.
#[derive(Debug, Clone)]
pub struct CliGitRepo {
    git_dir: PathBuf,
}

impl CliGitRepo {
    pub fn git_dir(&self) -> &Path {
        &self.git_dir
    }

    async fn git(&self, args: &[&str]) -> Result<Vec<u8>> {
        let output = Command::new("git")
            .arg("--git-dir")
            .arg(&self.git_dir)
            .args(args)
            .output()
            .await
            .with_context(|| format!("Failed to execute 'git {}'. Is git installed?", args[0]))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!("git {} failed: {}", args[0], stderr.trim());
        }

        Ok(output.stdout)
    }

    pub async fn read_blob_bytes(&self, blob: &str) -> Result<Vec<u8>> {
        self.git(&["cat-file", "blob", blob]).await
    }

    /// Every blob reachable from `reference`, recursively. Submodule
    /// entries are skipped.
    pub async fn list_tree(&self, reference: &str) -> Result<Vec<TreeEntry>> {
        let out = self.git(&["ls-tree", "-r", "-z", "--long", reference]).await?;
        parse_ls_tree(&out)
    }

    /// Short names of all branches and tags.
    pub async fn list_refs(&self) -> Result<Vec<String>> {
        let out = self
            .git(&[
                "for-each-ref",
                "--format=%(refname:short)",
                "refs/heads",
                "refs/tags",
            ])
            .await?;
        Ok(String::from_utf8_lossy(&out)
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(String::from)
            .collect())
    }
}

#[async_trait]
impl GitRepo for CliGitRepo {
    async fn read_blob(&self, blob: &str) -> Result<String> {
        let bytes = self.read_blob_bytes(blob).await?;
        String::from_utf8(bytes).with_context(|| format!("Blob {} is not UTF-8", blob))
    }
}

/// Parse `git ls-tree -r -z --long` output.
///
/// Each record is `<mode> SP <type> SP <object> SP+ <size> TAB <path> NUL`.
pub fn parse_ls_tree(output: &[u8]) -> Result<Vec<TreeEntry>> {
    let mut entries = Vec::new();

    for record in output.split(|b| *b == 0).filter(|r| !r.is_empty()) {
        let record = String::from_utf8_lossy(record);
        let (meta, path) = record
            .split_once('\t')
            .with_context(|| format!("Malformed ls-tree record: {}", record))?;

        let fields: Vec<&str> = meta.split_whitespace().collect();
        let &[mode, kind, object, size] = fields.as_slice() else {
            bail!("Malformed ls-tree record: {}", record);
        };
        if kind != "blob" {
            continue;
        }
        let size = size
            .parse::<u64>()
            .with_context(|| format!("Bad blob size in ls-tree record: {}", record))?;

        entries.push(TreeEntry {
            mode: mode.to_string(),
            blob: object.to_string(),
            size,
            path: path.to_string(),
        });
    }

    Ok(entries)
}
