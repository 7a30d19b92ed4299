use std::sync::{Arc, RwLock};

/// Ordered log of executed command lines.
///
/// Cloning yields another handle to the same log, which is how a session
/// shares it with every invocation it creates.
#[derive(Debug, Clone, Default)]
pub struct History {
    entries: Arc<RwLock<Vec<String>>>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: Vec<String>) -> Self {
        Self {
            entries: Arc::new(RwLock::new(entries)),
        }
    }

    /// Append a command line. Blank lines are not recorded.
    pub fn add(&self, command: &str) {
        let command = command.trim();
        if command.is_empty() {
            return;
        }
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.push(command.to_string());
    }

    /// Replace the whole log, keeping every handle pointed at it
    pub fn replace(&self, new_entries: Vec<String>) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        *entries = new_entries;
    }

    pub fn entries(&self) -> Vec<String> {
        self.entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn latest(&self) -> Option<String> {
        self.entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .last()
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handles_share_entries() {
        let history = History::new();
        let shared = history.clone();
        shared.add("ls -la");
        history.add("   ");
        assert_eq!(history.entries(), vec!["ls -la".to_string()]);
        assert_eq!(shared.latest().as_deref(), Some("ls -la"));
    }

    #[test]
    fn test_replace_is_visible_to_clones() {
        let history = History::from_entries(vec!["a".into()]);
        let shared = history.clone();
        history.replace(vec!["b".into(), "c".into()]);
        assert_eq!(shared.len(), 2);
    }
}
