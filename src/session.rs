//! The session aggregate: owns the invocation list, the repository watcher
//! and the persisted properties of one terminal session.
//!
//! All mutation goes through methods called from a single event loop.
//! Invocations, the fs watcher and status checks only send
//! [`SessionEvent`]s back into that loop.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::mpsc::UnboundedSender;

use crate::codec::{self, PropertyValue};
use crate::config::Config;
use crate::error::{CodecError, InvocationError, StateError};
use crate::events::{SessionEvent, SessionNotification};
use crate::history::History;
use crate::host::HostShell;
use crate::invocation::{Invocation, InvocationEvent, InvocationId, Reaction};
use crate::process::Dimensions;
use crate::state::{Property, StateStore};
use crate::vcs::{RepositoryStatus, RepositoryWatcher, StatusProbe, WatchOutcome};

pub struct Session {
    config: Config,
    host: Arc<dyn HostShell>,
    store: StateStore,
    current_directory: PathBuf,
    dimensions: Dimensions,
    history: History,
    invocations: Vec<Invocation>,
    next_invocation_id: u64,
    repository: RepositoryWatcher,
    vcs_status: Option<RepositoryStatus>,
    events: UnboundedSender<SessionEvent>,
    notifications: UnboundedSender<SessionNotification>,
}

impl Session {
    /// Restore persisted properties and create the first invocation.
    ///
    /// Must be called inside a tokio runtime, since restoring the working
    /// directory may start a repository status check.
    pub fn new(
        config: Config,
        dimensions: Dimensions,
        host: Arc<dyn HostShell>,
        probe: Arc<dyn StatusProbe>,
        events: UnboundedSender<SessionEvent>,
        notifications: UnboundedSender<SessionNotification>,
    ) -> Self {
        let store = StateStore::new(config.state_file.clone(), config.home_dir.clone());
        let repository = RepositoryWatcher::new(probe, config.status_dimensions, events.clone());

        let mut session = Self {
            current_directory: config.home_dir.clone(),
            config,
            host,
            store,
            dimensions,
            history: History::new(),
            invocations: Vec::new(),
            next_invocation_id: 0,
            repository,
            vcs_status: None,
            events,
            notifications,
        };

        session.deserialize();
        session.clear_invocations();
        session
    }

    pub fn current_directory(&self) -> &Path {
        &self.current_directory
    }

    pub fn dimensions(&self) -> Dimensions {
        self.dimensions
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn invocations(&self) -> &[Invocation] {
        &self.invocations
    }

    pub fn current_invocation(&self) -> Option<&Invocation> {
        self.invocations.last()
    }

    /// Last repository status published
    pub fn vcs_status(&self) -> Option<&RepositoryStatus> {
        self.vcs_status.as_ref()
    }

    pub fn repository(&self) -> &RepositoryWatcher {
        &self.repository
    }

    /// Append a new current invocation and persist the session
    pub fn create_invocation(&mut self) -> InvocationId {
        self.next_invocation_id += 1;
        let id = InvocationId(self.next_invocation_id);
        let invocation = Invocation::new(
            id,
            self.current_directory.clone(),
            self.dimensions,
            self.history.clone(),
            self.config.shell.clone(),
            self.config.home_dir.clone(),
            self.events.clone(),
        );
        self.invocations.push(invocation);
        tracing::debug!("Created invocation {} in {}", id, self.current_directory.display());

        self.notify(SessionNotification::InvocationCreated(id));
        self.persist();
        id
    }

    pub fn set_dimensions(&mut self, dimensions: Dimensions) {
        self.dimensions = dimensions;
        for invocation in &mut self.invocations {
            invocation.set_dimensions(dimensions);
        }
    }

    /// Drop every invocation and start over with a single fresh one
    pub fn clear_invocations(&mut self) {
        self.invocations.clear();
        self.create_invocation();
    }

    /// Run `command` in the current invocation
    pub fn execute(&mut self, command: &str) -> Result<InvocationId, InvocationError> {
        let invocation = self
            .invocations
            .last_mut()
            .ok_or(InvocationError::NoCurrentInvocation)?;
        invocation.execute(command)?;
        Ok(invocation.id())
    }

    pub fn set_current_directory(&mut self, path: &Path) {
        let directory = normalize_directory(path, &self.config.home_dir);
        self.host.set_represented_file(&directory);
        self.host.add_recent_document(&directory);
        tracing::info!("Working directory is now {}", directory.display());
        self.current_directory = directory.clone();
        self.watch_git_branch(&directory);
    }

    /// Point the repository watcher at `directory`, replacing any previous
    /// watch
    pub fn watch_git_branch(&mut self, directory: &Path) {
        match self.repository.watch(directory) {
            Ok(WatchOutcome::Watching) => {}
            Ok(WatchOutcome::NotRepository) => {
                self.publish_status(RepositoryStatus::not_repository());
            }
            Err(e) => {
                tracing::warn!("Treating {} as not a repository: {}", directory.display(), e);
                self.publish_status(RepositoryStatus::not_repository());
            }
        }
    }

    /// Recompute repository status, superseding a check already running
    pub fn update_git_data(&mut self) {
        self.repository.request_update();
    }

    /// Dispatch one event from the session loop
    pub fn handle_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Invocation { id, event } => self.handle_invocation_event(id, event),
            SessionEvent::FilesChanged { generation, paths } => {
                self.repository.on_files_changed(generation, &paths);
            }
            SessionEvent::StatusComputed { version, result } => {
                if !self.repository.complete(version) {
                    tracing::debug!("Discarding stale status check {}", version);
                    return;
                }
                match result {
                    Ok(status) => self.publish_status(status),
                    Err(e) => {
                        tracing::warn!("Repository status check failed: {}", e);
                        self.publish_status(RepositoryStatus::not_repository());
                    }
                }
            }
        }
    }

    fn handle_invocation_event(&mut self, id: InvocationId, event: InvocationEvent) {
        if let InvocationEvent::Output(chunk) = event {
            self.notify(SessionNotification::Output { invocation: id, chunk });
            return;
        }

        let Some(invocation) = self.invocations.iter_mut().find(|i| i.id() == id) else {
            tracing::debug!("Ignoring {:?} from untracked invocation {}", event, id);
            return;
        };

        match event {
            InvocationEvent::Clear => {
                if invocation.take_reaction(Reaction::Clear) {
                    self.clear_invocations();
                }
            }
            InvocationEvent::End { exit_code } => {
                invocation.mark_finished();
                if invocation.take_reaction(Reaction::End) {
                    tracing::debug!("Invocation {} ended with {:?}", id, exit_code);
                    self.host.notify_activity();
                    self.create_invocation();
                }
            }
            InvocationEvent::WorkingDirectoryChanged(directory) => {
                if invocation.take_reaction(Reaction::DirectoryChanged) {
                    self.set_current_directory(&directory);
                }
            }
            InvocationEvent::Output(_) => {}
        }
    }

    /// Write every declared property to the state file
    pub fn serialize(&self) -> Result<(), StateError> {
        let values: Vec<(Property, PropertyValue)> = Property::ALL
            .into_iter()
            .map(|p| (p, self.property_value(p)))
            .collect();
        self.store.save(&values)
    }

    fn persist(&self) {
        if let Err(e) = self.serialize() {
            if self.config.report_write_failures {
                tracing::warn!("{}", e);
            } else {
                tracing::debug!("{}", e);
            }
        }
    }

    fn deserialize(&mut self) {
        let state = self.store.load_or_defaults();
        for (name, tagged) in &state {
            let Some(property) = Property::from_name(name) else {
                tracing::debug!("Ignoring unknown state key {}", name);
                continue;
            };
            let restored = codec::decode(tagged).and_then(|value| self.apply_property(property, value));
            if let Err(e) = restored {
                tracing::warn!("Restoring default {}: {}", property.name(), e);
                let default = self.store.default_value(property);
                if let Err(e) = self.apply_property(property, default) {
                    tracing::warn!("Default for {} rejected: {}", property.name(), e);
                }
            }
        }
    }

    fn property_value(&self, property: Property) -> PropertyValue {
        match property {
            Property::CurrentDirectory => {
                PropertyValue::String(self.current_directory.to_string_lossy().to_string())
            }
            Property::History => PropertyValue::History(self.history.entries()),
        }
    }

    fn apply_property(&mut self, property: Property, value: PropertyValue) -> Result<(), CodecError> {
        match (property, value) {
            (Property::CurrentDirectory, PropertyValue::String(raw)) => {
                let directory = normalize_directory(Path::new(&raw), &self.config.home_dir);
                if directory.is_dir() {
                    self.set_current_directory(&directory);
                } else {
                    tracing::warn!("Saved directory {} is gone, using home", directory.display());
                    let home = self.config.home_dir.clone();
                    self.set_current_directory(&home);
                }
                Ok(())
            }
            (Property::History, PropertyValue::History(entries)) => {
                self.history.replace(entries);
                Ok(())
            }
            (property, _) => Err(CodecError::TypeMismatch {
                property: property.name(),
                expected: self.store.default_value(property).type_name(),
            }),
        }
    }

    fn publish_status(&mut self, status: RepositoryStatus) {
        self.vcs_status = Some(status.clone());
        self.notify(SessionNotification::VcsData(status));
    }

    fn notify(&self, notification: SessionNotification) {
        let _ = self.notifications.send(notification);
    }
}

/// Expand `~`, resolve against home when relative, and canonicalize when
/// the directory exists
pub fn normalize_directory(path: &Path, home: &Path) -> PathBuf {
    let expanded = match path.strip_prefix("~") {
        Ok(rest) => home.join(rest),
        Err(_) if path.is_relative() => home.join(path),
        Err(_) => path.to_path_buf(),
    };
    expanded
        .canonicalize()
        .unwrap_or_else(|_| expanded.components().collect())
}
