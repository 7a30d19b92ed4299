//! Session core for a terminal: chains command invocations, watches the
//! working directory's git status and persists session properties.

pub mod codec;
pub mod config;
pub mod error;
pub mod events;
pub mod history;
pub mod host;
pub mod input;
pub mod invocation;
pub mod process;
pub mod session;
pub mod state;
pub mod vcs;

pub use config::Config;
pub use events::{SessionEvent, SessionNotification};
pub use input::CommandQueue;
pub use process::Dimensions;
pub use session::Session;
