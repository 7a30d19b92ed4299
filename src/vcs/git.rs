use std::path::Path;

use async_trait::async_trait;

use crate::error::VcsError;
use crate::process::{self, Dimensions, ProcessEvent};

/// Runs the working-tree status query for a directory.
///
/// Returns everything the query printed; any output means the tree is dirty.
#[async_trait]
pub trait StatusProbe: Send + Sync {
    async fn porcelain_status(&self, dir: &Path, size: Dimensions) -> Result<String, VcsError>;
}

/// Status probe backed by the `git` command line
pub struct GitCli {
    /// Path to git binary
    git_path: String,
}

impl GitCli {
    pub fn new(git_path: impl Into<String>) -> Self {
        Self {
            git_path: git_path.into(),
        }
    }
}

impl Default for GitCli {
    fn default() -> Self {
        Self::new("git")
    }
}

#[async_trait]
impl StatusProbe for GitCli {
    async fn porcelain_status(&self, dir: &Path, size: Dimensions) -> Result<String, VcsError> {
        let mut events = process::spawn(&self.git_path, &["status", "--porcelain"], dir, size)
            .map_err(|e| VcsError::StatusQuery(e.to_string()))?;

        let mut changes = String::new();
        let mut errors = String::new();
        while let Some(event) = events.recv().await {
            match event {
                ProcessEvent::Output(chunk) => changes.push_str(&chunk),
                ProcessEvent::Stderr(chunk) => errors.push_str(&chunk),
                ProcessEvent::Exit(Some(0)) => return Ok(changes),
                ProcessEvent::Exit(code) => {
                    tracing::debug!("git status exited with {:?} in {}", code, dir.display());
                    return Err(VcsError::StatusQuery(format!(
                        "git status exited with {:?}: {}",
                        code,
                        errors.trim()
                    )));
                }
            }
        }
        Err(VcsError::StatusQuery("git status ended without an exit status".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_binary_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let git = GitCli::new("no-such-git-binary");
        let result = git.porcelain_status(dir.path(), Dimensions::new(80, 20)).await;
        assert!(matches!(result, Err(VcsError::StatusQuery(_))));
    }

    #[tokio::test]
    async fn test_failed_status_query_is_an_error() {
        // A marker directory holding only HEAD is not a repository git accepts
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join(".git")).unwrap();
        std::fs::write(dir.path().join(".git/HEAD"), "ref: refs/heads/main\n").unwrap();

        let result = GitCli::default()
            .porcelain_status(dir.path(), Dimensions::new(80, 20))
            .await;
        assert!(matches!(result, Err(VcsError::StatusQuery(_))));
    }
}
