use std::path::{Path, PathBuf};
use std::sync::Arc;

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;

use super::{compute_status, is_relevant_change, StatusProbe, MARKER_DIR};
use crate::error::VcsError;
use crate::events::SessionEvent;
use crate::process::Dimensions;

/// Result of pointing the watcher at a directory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchOutcome {
    /// No marker directory; nothing is watched
    NotRepository,
    /// A status check is running and changes are being observed
    Watching,
}

/// Watches one working directory and re-derives its repository status.
///
/// Every status check carries a version. Starting a new check aborts the
/// running one, so at most one check is in flight and only the result of
/// the latest version is accepted.
pub struct RepositoryWatcher {
    probe: Arc<dyn StatusProbe>,
    status_size: Dimensions,
    events: UnboundedSender<SessionEvent>,
    directory: Option<PathBuf>,
    fs_watcher: Option<RecommendedWatcher>,
    /// Bumped whenever the fs watcher is replaced
    generation: u64,
    /// Version of the most recently requested check
    version: u64,
    in_flight: Option<JoinHandle<()>>,
}

impl RepositoryWatcher {
    pub fn new(
        probe: Arc<dyn StatusProbe>,
        status_size: Dimensions,
        events: UnboundedSender<SessionEvent>,
    ) -> Self {
        Self {
            probe,
            status_size,
            events,
            directory: None,
            fs_watcher: None,
            generation: 0,
            version: 0,
            in_flight: None,
        }
    }

    /// Stop watching and cancel any running check
    pub fn release(&mut self) {
        if self.fs_watcher.take().is_some() {
            tracing::debug!("Released watcher for generation {}", self.generation);
        }
        if let Some(task) = self.in_flight.take() {
            task.abort();
        }
        self.directory = None;
        self.generation += 1;
    }

    /// Replace the current watch with one on `dir`.
    ///
    /// When `dir` holds a marker directory a status check starts right away
    /// and a recursive watcher is installed.
    pub fn watch(&mut self, dir: &Path) -> Result<WatchOutcome, VcsError> {
        self.release();

        let marker = dir.join(MARKER_DIR);
        match std::fs::metadata(&marker) {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => return Ok(WatchOutcome::NotRepository),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(WatchOutcome::NotRepository)
            }
            Err(source) => return Err(VcsError::Marker { path: marker, source }),
        }

        self.directory = Some(dir.to_path_buf());
        self.request_update();

        match self.install(dir) {
            Ok(watcher) => self.fs_watcher = Some(watcher),
            Err(e) => {
                self.release();
                return Err(e);
            }
        }

        tracing::info!("Watching repository at {}", dir.display());
        Ok(WatchOutcome::Watching)
    }

    fn install(&self, dir: &Path) -> Result<RecommendedWatcher, VcsError> {
        let generation = self.generation;
        let tx = self.events.clone();
        let mut watcher = notify::recommended_watcher(
            move |result: std::result::Result<Event, notify::Error>| match result {
                Ok(event) => {
                    if matches!(event.kind, EventKind::Access(_)) {
                        return;
                    }
                    let _ = tx.send(SessionEvent::FilesChanged {
                        generation,
                        paths: event.paths,
                    });
                }
                Err(err) => tracing::warn!("File watcher error: {}", err),
            },
        )
        .map_err(|source| VcsError::Watch {
            path: dir.to_path_buf(),
            source,
        })?;
        watcher
            .watch(dir, RecursiveMode::Recursive)
            .map_err(|source| VcsError::Watch {
                path: dir.to_path_buf(),
                source,
            })?;
        Ok(watcher)
    }

    /// Start a status check for the watched directory, superseding any
    /// check still running
    pub fn request_update(&mut self) {
        let Some(dir) = self.directory.clone() else {
            return;
        };
        if let Some(stale) = self.in_flight.take() {
            tracing::debug!("Superseding status check {}", self.version);
            stale.abort();
        }
        self.version += 1;

        let version = self.version;
        let probe = Arc::clone(&self.probe);
        let size = self.status_size;
        let tx = self.events.clone();
        self.in_flight = Some(tokio::spawn(async move {
            let result = compute_status(&dir, probe.as_ref(), size).await;
            let _ = tx.send(SessionEvent::StatusComputed { version, result });
        }));
    }

    /// Handle a batch of changed paths from the fs watcher.
    ///
    /// Returns whether a new status check was started.
    pub fn on_files_changed(&mut self, generation: u64, paths: &[PathBuf]) -> bool {
        if generation != self.generation {
            return false;
        }
        let Some(dir) = self.directory.as_deref() else {
            return false;
        };
        if !paths.iter().any(|p| is_relevant_change(dir, p)) {
            tracing::trace!("Ignoring changes to {:?}", paths);
            return false;
        }
        self.request_update();
        true
    }

    /// Mark the check `version` as finished. Returns false for stale results.
    pub fn complete(&mut self, version: u64) -> bool {
        if version != self.version || self.in_flight.is_none() {
            return false;
        }
        self.in_flight = None;
        true
    }

    pub fn is_watching(&self) -> bool {
        self.fs_watcher.is_some()
    }

    /// Version of the check currently running, if any
    pub fn in_flight_version(&self) -> Option<u64> {
        self.in_flight.as_ref().map(|_| self.version)
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn directory(&self) -> Option<&Path> {
        self.directory.as_deref()
    }
}

impl Drop for RepositoryWatcher {
    fn drop(&mut self) {
        if let Some(task) = self.in_flight.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::mpsc;

    /// Probe that counts calls and returns a fixed output
    struct CountingProbe {
        calls: AtomicUsize,
        output: &'static str,
    }

    #[async_trait]
    impl StatusProbe for CountingProbe {
        async fn porcelain_status(&self, _dir: &Path, _size: Dimensions) -> Result<String, VcsError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.output.to_string())
        }
    }

    fn watcher(output: &'static str) -> (RepositoryWatcher, mpsc::UnboundedReceiver<SessionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let probe = Arc::new(CountingProbe {
            calls: AtomicUsize::new(0),
            output,
        });
        (RepositoryWatcher::new(probe, Dimensions::new(80, 20), tx), rx)
    }

    fn init_repo(dir: &Path) {
        std::fs::create_dir_all(dir.join(".git/refs/heads")).unwrap();
        std::fs::write(dir.join(".git/HEAD"), "ref: refs/heads/main\n").unwrap();
    }

    #[tokio::test]
    async fn test_no_marker_installs_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let (mut watcher, _rx) = watcher("");
        assert_eq!(watcher.watch(dir.path()).unwrap(), WatchOutcome::NotRepository);
        assert!(!watcher.is_watching());
        assert_eq!(watcher.in_flight_version(), None);
    }

    #[tokio::test]
    async fn test_repository_starts_check_and_watch() {
        let dir = tempfile::tempdir().unwrap();
        init_repo(dir.path());
        let (mut watcher, mut rx) = watcher(" M a.txt\n");

        assert_eq!(watcher.watch(dir.path()).unwrap(), WatchOutcome::Watching);
        assert!(watcher.is_watching());
        assert_eq!(watcher.in_flight_version(), Some(1));

        loop {
            match rx.recv().await.unwrap() {
                SessionEvent::StatusComputed { version, result } => {
                    assert_eq!(version, 1);
                    let status = result.unwrap();
                    assert_eq!(status.branch.as_deref(), Some("main"));
                    assert!(watcher.complete(version));
                    break;
                }
                _ => continue,
            }
        }
        assert_eq!(watcher.in_flight_version(), None);
    }

    #[tokio::test]
    async fn test_relevant_change_supersedes_in_flight_check() {
        let dir = tempfile::tempdir().unwrap();
        init_repo(dir.path());
        let (mut watcher, _rx) = watcher("");
        watcher.watch(dir.path()).unwrap();
        let generation = watcher.generation();

        assert!(watcher.on_files_changed(generation, &[dir.path().join("src/lib.rs")]));
        assert_eq!(watcher.in_flight_version(), Some(2));

        // Result of the superseded check is not accepted
        assert!(!watcher.complete(1));
        assert_eq!(watcher.in_flight_version(), Some(2));
        assert!(watcher.complete(2));
    }

    #[tokio::test]
    async fn test_irrelevant_and_stale_changes_ignored() {
        let dir = tempfile::tempdir().unwrap();
        init_repo(dir.path());
        let (mut watcher, _rx) = watcher("");
        watcher.watch(dir.path()).unwrap();
        let generation = watcher.generation();

        assert!(!watcher.on_files_changed(generation, &[dir.path().join(".git/index.lock")]));
        assert!(!watcher.on_files_changed(generation - 1, &[dir.path().join("README.md")]));
        assert_eq!(watcher.in_flight_version(), Some(1));
    }

    #[tokio::test]
    async fn test_file_write_triggers_a_new_check() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().canonicalize().unwrap();
        init_repo(&dir);
        let (mut watcher, mut rx) = watcher("?? README.md\n");
        watcher.watch(&dir).unwrap();

        std::fs::write(dir.join("README.md"), "hello\n").unwrap();

        let version = tokio::time::timeout(Duration::from_secs(10), async {
            loop {
                match rx.recv().await {
                    Some(SessionEvent::FilesChanged { generation, paths }) => {
                        watcher.on_files_changed(generation, &paths);
                    }
                    Some(SessionEvent::StatusComputed { version, result }) => {
                        if watcher.complete(version) && version >= 2 {
                            assert!(result.unwrap().is_repository);
                            return version;
                        }
                    }
                    Some(_) => {}
                    None => panic!("event channel closed"),
                }
            }
        })
        .await
        .expect("no status check after the file write");
        assert!(version >= 2);
    }

    #[tokio::test]
    async fn test_index_write_does_not_trigger_a_check() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().canonicalize().unwrap();
        init_repo(&dir);
        let (mut watcher, mut rx) = watcher("");
        watcher.watch(&dir).unwrap();

        std::fs::write(dir.join(".git/index"), "index").unwrap();

        let mut saw_change = false;
        let _ = tokio::time::timeout(Duration::from_millis(500), async {
            while let Some(event) = rx.recv().await {
                match event {
                    SessionEvent::FilesChanged { generation, paths } => {
                        saw_change = true;
                        assert!(!watcher.on_files_changed(generation, &paths));
                    }
                    SessionEvent::StatusComputed { version, .. } => {
                        assert_eq!(version, 1);
                        assert!(watcher.complete(version));
                    }
                    _ => {}
                }
            }
        })
        .await;
        assert!(saw_change);
        assert_eq!(watcher.in_flight_version(), None);
    }

    #[tokio::test]
    async fn test_rewatch_releases_previous() {
        let repo = tempfile::tempdir().unwrap();
        init_repo(repo.path());
        let plain = tempfile::tempdir().unwrap();
        let (mut watcher, _rx) = watcher("");

        watcher.watch(repo.path()).unwrap();
        let first_generation = watcher.generation();
        watcher.watch(plain.path()).unwrap();

        assert!(!watcher.is_watching());
        assert_eq!(watcher.in_flight_version(), None);
        assert!(watcher.generation() > first_generation);
        assert!(!watcher.on_files_changed(first_generation, &[repo.path().join("x")]));
    }
}
