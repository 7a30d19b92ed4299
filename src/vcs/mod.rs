mod git;
mod head;
mod watcher;

pub use git::{GitCli, StatusProbe};
pub use head::Head;
pub use watcher::{RepositoryWatcher, WatchOutcome};

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::VcsError;
use crate::process::Dimensions;

/// Repository marker directory
pub const MARKER_DIR: &str = ".git";

/// Whether the working tree has uncommitted changes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Cleanliness {
    Clean,
    Dirty,
}

/// Version-control state of a working directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryStatus {
    pub is_repository: bool,
    /// Checked-out branch, `None` for a detached head
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(rename = "status", skip_serializing_if = "Option::is_none")]
    pub cleanliness: Option<Cleanliness>,
}

impl RepositoryStatus {
    pub fn not_repository() -> Self {
        Self {
            is_repository: false,
            branch: None,
            cleanliness: None,
        }
    }
}

/// Derive the status of the repository rooted at `dir`.
///
/// The head file is read before the status query runs; an unreadable head
/// fails the whole update.
pub async fn compute_status(
    dir: &Path,
    probe: &dyn StatusProbe,
    size: Dimensions,
) -> Result<RepositoryStatus, VcsError> {
    let head_path = dir.join(MARKER_DIR).join("HEAD");
    let contents = tokio::fs::read_to_string(&head_path)
        .await
        .map_err(|source| VcsError::HeadUnreadable {
            path: head_path.clone(),
            source,
        })?;
    let head = Head::parse(&contents);

    let changes = probe.porcelain_status(dir, size).await?;
    let cleanliness = if changes.is_empty() {
        Cleanliness::Clean
    } else {
        Cleanliness::Dirty
    };

    Ok(RepositoryStatus {
        is_repository: true,
        branch: head.branch().map(str::to_string),
        cleanliness: Some(cleanliness),
    })
}

/// Whether a change at `path` under the watched `root` can affect status.
///
/// Writes inside the marker directory are ignored except for the head file
/// and local branch refs, since the status query itself touches the index
/// and its lock file.
pub fn is_relevant_change(root: &Path, path: &Path) -> bool {
    let Ok(relative) = path.strip_prefix(root) else {
        return false;
    };
    let marker = Path::new(MARKER_DIR);
    !relative.starts_with(marker)
        || relative == marker.join("HEAD")
        || relative.starts_with(marker.join("refs").join("heads"))
}
