use std::path::PathBuf;

use crate::process::Dimensions;

const STATE_FILE_NAME: &str = ".term-session-state";

/// Runtime configuration, resolved from the home directory and environment
#[derive(Debug, Clone)]
pub struct Config {
    /// Home directory, also the default working directory
    pub home_dir: PathBuf,
    /// Where session properties are persisted
    pub state_file: PathBuf,
    /// Shell used to run invocation commands
    pub shell: String,
    /// Binary used for repository status queries
    pub git_program: String,
    /// Terminal size the status query runs with
    pub status_dimensions: Dimensions,
    /// Log state write failures at warn instead of debug
    pub report_write_failures: bool,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let home_dir = dirs::home_dir().unwrap_or_else(|| PathBuf::from("/"));
        let state_file = lookup("TERM_SESSION_STATE_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|| home_dir.join(STATE_FILE_NAME));
        let shell = lookup("TERM_SESSION_SHELL")
            .or_else(|| lookup("SHELL"))
            .unwrap_or_else(|| "sh".to_string());
        let git_program = lookup("TERM_SESSION_GIT").unwrap_or_else(|| "git".to_string());
        let report_write_failures = lookup("TERM_SESSION_REPORT_WRITE_FAILURES")
            .map(|v| matches!(v.as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        Self {
            home_dir,
            state_file,
            shell,
            git_program,
            status_dimensions: Dimensions::new(80, 20),
            report_write_failures,
        }
    }

    /// Configuration rooted at `home`, for embedding and tests
    pub fn with_home(home: impl Into<PathBuf>) -> Self {
        let home_dir = home.into();
        Self {
            state_file: home_dir.join(STATE_FILE_NAME),
            home_dir,
            shell: "sh".to_string(),
            git_program: "git".to_string(),
            status_dimensions: Dimensions::new(80, 20),
            report_write_failures: false,
        }
    }
}
