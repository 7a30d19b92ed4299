use std::path::Path;

/// Integration points with the surrounding application shell.
///
/// Every call is fire-and-forget: implementations swallow their own
/// failures.
pub trait HostShell: Send + Sync {
    /// An invocation finished; draw the user's attention
    fn notify_activity(&self);
    /// Show `path` as the document the window represents
    fn set_represented_file(&self, path: &Path);
    /// Add `path` to the host's recent documents
    fn add_recent_document(&self, path: &Path);
}

/// Host shell that does nothing
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHostShell;

impl HostShell for NoopHostShell {
    fn notify_activity(&self) {}
    fn set_represented_file(&self, _path: &Path) {}
    fn add_recent_document(&self, _path: &Path) {}
}

/// Host shell for headless runs; records each call in the log
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingHostShell;

impl HostShell for TracingHostShell {
    fn notify_activity(&self) {
        tracing::debug!("Host activity notification");
    }

    fn set_represented_file(&self, path: &Path) {
        tracing::debug!("Window now represents {}", path.display());
    }

    fn add_recent_document(&self, path: &Path) {
        tracing::debug!("Recent document {}", path.display());
    }
}
