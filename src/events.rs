use std::path::PathBuf;

use crate::error::VcsError;
use crate::invocation::{InvocationEvent, InvocationId};
use crate::vcs::RepositoryStatus;

/// Messages consumed by the session event loop
#[derive(Debug)]
pub enum SessionEvent {
    /// An invocation reported a lifecycle event or output
    Invocation {
        id: InvocationId,
        event: InvocationEvent,
    },
    /// The directory watcher saw changes
    FilesChanged {
        /// Watcher that produced the event
        generation: u64,
        paths: Vec<PathBuf>,
    },
    /// A repository status check finished
    StatusComputed {
        version: u64,
        result: Result<RepositoryStatus, VcsError>,
    },
}

/// Observable outputs of a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionNotification {
    /// A new invocation was created and is now current
    InvocationCreated(InvocationId),
    /// Repository status of the working directory changed
    VcsData(RepositoryStatus),
    /// Output produced by a running invocation
    Output { invocation: InvocationId, chunk: String },
}
