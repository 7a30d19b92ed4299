use std::fmt;
use std::path::{Path, PathBuf};

use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;

use crate::error::InvocationError;
use crate::events::SessionEvent;
use crate::history::History;
use crate::process::{self, Dimensions, ProcessEvent};

/// Identifier of an invocation, unique within a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InvocationId(pub u64);

impl fmt::Display for InvocationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Events an invocation reports to its session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvocationEvent {
    /// A chunk of command output
    Output(String),
    /// The user asked to clear the screen
    Clear,
    /// The command finished
    End { exit_code: Option<i32> },
    /// The command changed the working directory
    WorkingDirectoryChanged(PathBuf),
}

/// Lifecycle events the session reacts to, at most once each
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reaction {
    Clear,
    End,
    DirectoryChanged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvocationStatus {
    Created,
    Running,
    Finished,
}

#[derive(Debug, Clone, Copy)]
struct ArmedReactions {
    clear: bool,
    end: bool,
    directory_changed: bool,
}

impl ArmedReactions {
    fn all() -> Self {
        Self {
            clear: true,
            end: true,
            directory_changed: true,
        }
    }

    fn slot(&mut self, reaction: Reaction) -> &mut bool {
        match reaction {
            Reaction::Clear => &mut self.clear,
            Reaction::End => &mut self.end,
            Reaction::DirectoryChanged => &mut self.directory_changed,
        }
    }
}

/// One command's execution context within a session
pub struct Invocation {
    id: InvocationId,
    directory: PathBuf,
    dimensions: Dimensions,
    history: History,
    shell: String,
    home_dir: PathBuf,
    status: InvocationStatus,
    reactions: ArmedReactions,
    events: UnboundedSender<SessionEvent>,
    task: Option<JoinHandle<()>>,
}

impl Invocation {
    pub fn new(
        id: InvocationId,
        directory: PathBuf,
        dimensions: Dimensions,
        history: History,
        shell: String,
        home_dir: PathBuf,
        events: UnboundedSender<SessionEvent>,
    ) -> Self {
        Self {
            id,
            directory,
            dimensions,
            history,
            shell,
            home_dir,
            status: InvocationStatus::Created,
            reactions: ArmedReactions::all(),
            events,
            task: None,
        }
    }

    pub fn id(&self) -> InvocationId {
        self.id
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn dimensions(&self) -> Dimensions {
        self.dimensions
    }

    pub fn status(&self) -> InvocationStatus {
        self.status
    }

    /// Takes effect for the next spawned command
    pub fn set_dimensions(&mut self, dimensions: Dimensions) {
        self.dimensions = dimensions;
    }

    /// Consume the one-shot `reaction`. Returns false if it already fired.
    ///
    /// A clear is terminal: it disarms every other reaction.
    pub fn take_reaction(&mut self, reaction: Reaction) -> bool {
        let slot = self.reactions.slot(reaction);
        if !*slot {
            return false;
        }
        *slot = false;
        if reaction == Reaction::Clear {
            self.reactions = ArmedReactions {
                clear: false,
                end: false,
                directory_changed: false,
            };
        }
        true
    }

    pub fn mark_finished(&mut self) {
        self.status = InvocationStatus::Finished;
    }

    /// Run `command` in this invocation.
    ///
    /// `clear` and `cd` are handled here; anything else runs through the
    /// configured shell.
    pub fn execute(&mut self, command: &str) -> Result<(), InvocationError> {
        if self.status != InvocationStatus::Created {
            return Err(InvocationError::AlreadyStarted(self.id.0));
        }
        self.status = InvocationStatus::Running;
        self.history.add(command);

        let line = command.trim();
        let (word, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
        match word {
            "" => self.emit(InvocationEvent::End { exit_code: Some(0) }),
            "clear" => self.emit(InvocationEvent::Clear),
            "cd" => {
                // The rest of the line is one path, spaces included
                let target = rest.trim();
                self.change_directory((!target.is_empty()).then_some(target))
            }
            _ => self.spawn(command),
        }
        Ok(())
    }

    fn change_directory(&self, target: Option<&str>) {
        let path = resolve_directory(&self.directory, target, &self.home_dir);
        if path.is_dir() {
            self.emit(InvocationEvent::WorkingDirectoryChanged(path));
            self.emit(InvocationEvent::End { exit_code: Some(0) });
        } else {
            self.emit(InvocationEvent::Output(format!(
                "cd: no such directory: {}\n",
                target.unwrap_or("~")
            )));
            self.emit(InvocationEvent::End { exit_code: Some(1) });
        }
    }

    fn spawn(&mut self, command: &str) {
        let mut rx = match process::spawn(&self.shell, &["-c", command], &self.directory, self.dimensions) {
            Ok(rx) => rx,
            Err(e) => {
                tracing::warn!("Invocation {} failed to start: {}", self.id, e);
                self.emit(InvocationEvent::Output(format!("{}\n", e)));
                self.emit(InvocationEvent::End { exit_code: None });
                return;
            }
        };

        let id = self.id;
        let tx = self.events.clone();
        self.task = Some(tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                let event = match event {
                    ProcessEvent::Output(chunk) | ProcessEvent::Stderr(chunk) => {
                        InvocationEvent::Output(chunk)
                    }
                    ProcessEvent::Exit(exit_code) => InvocationEvent::End { exit_code },
                };
                if tx.send(SessionEvent::Invocation { id, event }).is_err() {
                    break;
                }
            }
        }));
    }

    fn emit(&self, event: InvocationEvent) {
        let _ = self.events.send(SessionEvent::Invocation { id: self.id, event });
    }
}

impl Drop for Invocation {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl fmt::Debug for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Invocation")
            .field("id", &self.id)
            .field("directory", &self.directory)
            .field("dimensions", &self.dimensions)
            .field("status", &self.status)
            .finish()
    }
}

/// Resolve a `cd` argument against `base`. No argument means home.
pub fn resolve_directory(base: &Path, target: Option<&str>, home: &Path) -> PathBuf {
    match target {
        None | Some("~") => home.to_path_buf(),
        Some(t) => match t.strip_prefix("~/") {
            Some(rest) => home.join(rest),
            None => base.join(t),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn invocation(dir: &Path) -> (Invocation, mpsc::UnboundedReceiver<SessionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let inv = Invocation::new(
            InvocationId(1),
            dir.to_path_buf(),
            Dimensions::default(),
            History::new(),
            "sh".to_string(),
            PathBuf::from("/home/someone"),
            tx,
        );
        (inv, rx)
    }

    async fn next_event(rx: &mut mpsc::UnboundedReceiver<SessionEvent>) -> InvocationEvent {
        match rx.recv().await {
            Some(SessionEvent::Invocation { event, .. }) => event,
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_resolve_directory() {
        let home = Path::new("/home/someone");
        let base = Path::new("/srv/app");
        assert_eq!(resolve_directory(base, None, home), home);
        assert_eq!(resolve_directory(base, Some("~/src"), home), home.join("src"));
        assert_eq!(resolve_directory(base, Some("logs"), home), base.join("logs"));
        assert_eq!(resolve_directory(base, Some("/etc"), home), PathBuf::from("/etc"));
    }

    #[test]
    fn test_reactions_are_one_shot() {
        let dir = tempfile::tempdir().unwrap();
        let (mut inv, _rx) = invocation(dir.path());
        assert!(inv.take_reaction(Reaction::End));
        assert!(!inv.take_reaction(Reaction::End));
        assert!(inv.take_reaction(Reaction::DirectoryChanged));
    }

    #[test]
    fn test_clear_disarms_everything() {
        let dir = tempfile::tempdir().unwrap();
        let (mut inv, _rx) = invocation(dir.path());
        assert!(inv.take_reaction(Reaction::Clear));
        assert!(!inv.take_reaction(Reaction::End));
        assert!(!inv.take_reaction(Reaction::DirectoryChanged));
    }

    #[tokio::test]
    async fn test_cd_reports_directory_then_end() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        let (mut inv, mut rx) = invocation(dir.path());

        inv.execute("cd sub").unwrap();
        assert_eq!(
            next_event(&mut rx).await,
            InvocationEvent::WorkingDirectoryChanged(dir.path().join("sub"))
        );
        assert_eq!(next_event(&mut rx).await, InvocationEvent::End { exit_code: Some(0) });
    }

    #[tokio::test]
    async fn test_cd_accepts_path_with_spaces() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("my dir")).unwrap();
        let (mut inv, mut rx) = invocation(dir.path());

        inv.execute("cd my dir ").unwrap();
        assert_eq!(
            next_event(&mut rx).await,
            InvocationEvent::WorkingDirectoryChanged(dir.path().join("my dir"))
        );
        assert_eq!(next_event(&mut rx).await, InvocationEvent::End { exit_code: Some(0) });
    }

    #[tokio::test]
    async fn test_cd_to_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let (mut inv, mut rx) = invocation(dir.path());

        inv.execute("cd nowhere").unwrap();
        assert!(matches!(next_event(&mut rx).await, InvocationEvent::Output(_)));
        assert_eq!(next_event(&mut rx).await, InvocationEvent::End { exit_code: Some(1) });
    }

    #[tokio::test]
    async fn test_shell_command_streams_output() {
        let dir = tempfile::tempdir().unwrap();
        let (mut inv, mut rx) = invocation(dir.path());
        inv.execute("echo hello").unwrap();

        let mut output = String::new();
        loop {
            match next_event(&mut rx).await {
                InvocationEvent::Output(chunk) => output.push_str(&chunk),
                InvocationEvent::End { exit_code } => {
                    assert_eq!(exit_code, Some(0));
                    break;
                }
                other => panic!("unexpected event: {:?}", other),
            }
        }
        assert_eq!(output, "hello\n");
    }

    #[tokio::test]
    async fn test_execute_records_history_and_runs_once() {
        let dir = tempfile::tempdir().unwrap();
        let (mut inv, mut rx) = invocation(dir.path());
        let history = inv.history.clone();

        inv.execute("clear").unwrap();
        assert_eq!(next_event(&mut rx).await, InvocationEvent::Clear);
        assert_eq!(history.entries(), vec!["clear".to_string()]);
        assert!(matches!(
            inv.execute("ls"),
            Err(InvocationError::AlreadyStarted(1))
        ));
    }
}
