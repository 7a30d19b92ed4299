use std::collections::VecDeque;

/// Command lines waiting for an idle invocation.
///
/// Lines that arrive while a command is still running are held back until
/// the session announces its next invocation.
#[derive(Debug)]
pub struct CommandQueue {
    pending: VecDeque<String>,
    busy: bool,
    input_closed: bool,
}

impl CommandQueue {
    /// A queue that waits for the first invocation announcement, which a
    /// new session always emits.
    pub fn new() -> Self {
        Self {
            pending: VecDeque::new(),
            busy: true,
            input_closed: false,
        }
    }

    pub fn push(&mut self, line: String) {
        self.pending.push_back(line);
    }

    /// No more lines will arrive
    pub fn close_input(&mut self) {
        self.input_closed = true;
    }

    /// The current invocation is ready for a command
    pub fn invocation_ready(&mut self) {
        self.busy = false;
    }

    /// Next line to execute, if the current invocation is idle.
    ///
    /// Handing out a line marks the queue busy until [`invocation_ready`]
    /// is called again.
    ///
    /// [`invocation_ready`]: CommandQueue::invocation_ready
    pub fn next_command(&mut self) -> Option<String> {
        if self.busy {
            return None;
        }
        let line = self.pending.pop_front()?;
        self.busy = true;
        Some(line)
    }

    pub fn is_input_closed(&self) -> bool {
        self.input_closed
    }

    /// Input is exhausted and the last command has finished
    pub fn is_finished(&self) -> bool {
        self.input_closed && !self.busy && self.pending.is_empty()
    }
}

impl Default for CommandQueue {
    fn default() -> Self {
        Self::new()
    }
}
