use std::path::Path;
use std::process::Stdio;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::sync::mpsc;

use crate::error::InvocationError;

/// Size of the virtual terminal a child process sees
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    pub columns: u16,
    pub rows: u16,
}

impl Dimensions {
    pub const fn new(columns: u16, rows: u16) -> Self {
        Self { columns, rows }
    }

    /// Size of the controlling terminal, or 80x24 when there is none
    pub fn from_terminal() -> Self {
        crossterm::terminal::size()
            .map(|(columns, rows)| Self::new(columns, rows))
            .unwrap_or_default()
    }
}

impl Default for Dimensions {
    fn default() -> Self {
        Self::new(80, 24)
    }
}

/// Events produced by a spawned child process
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessEvent {
    /// A chunk of stdout output
    Output(String),
    /// A chunk of stderr output
    Stderr(String),
    /// The process exited. Always the last event.
    Exit(Option<i32>),
}

/// Spawn `program` in `cwd` and stream its output.
///
/// The child is killed once the returned receiver is dropped.
pub fn spawn(
    program: &str,
    args: &[&str],
    cwd: &Path,
    dimensions: Dimensions,
) -> Result<mpsc::UnboundedReceiver<ProcessEvent>, InvocationError> {
    let mut child = Command::new(program)
        .args(args)
        .current_dir(cwd)
        .env("COLUMNS", dimensions.columns.to_string())
        .env("LINES", dimensions.rows.to_string())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| InvocationError::Spawn {
            program: program.to_string(),
            source,
        })?;

    let (tx, rx) = mpsc::unbounded_channel();
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    tokio::spawn(async move {
        // Both pipes must be drained before waiting or a chatty child blocks
        let drained = async {
            tokio::join!(
                forward(stdout, tx.clone(), ProcessEvent::Output),
                forward(stderr, tx.clone(), ProcessEvent::Stderr)
            );
        };
        tokio::select! {
            _ = drained => {}
            _ = tx.closed() => {
                if let Err(e) = child.kill().await {
                    tracing::debug!("Failed to kill abandoned child: {}", e);
                }
                return;
            }
        }
        let code = match child.wait().await {
            Ok(status) => status.code(),
            Err(e) => {
                tracing::warn!("Failed to wait for child process: {}", e);
                None
            }
        };
        let _ = tx.send(ProcessEvent::Exit(code));
    });

    Ok(rx)
}

async fn forward<R>(
    reader: Option<R>,
    tx: mpsc::UnboundedSender<ProcessEvent>,
    wrap: fn(String) -> ProcessEvent,
) where
    R: AsyncRead + Unpin,
{
    let Some(mut reader) = reader else {
        return;
    };
    let mut buf = [0u8; 4096];
    // Bytes of a multi-byte character split across reads
    let mut pending: Vec<u8> = Vec::new();
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                pending.extend_from_slice(&buf[..n]);
                let complete = pending.len() - incomplete_tail_len(&pending);
                if complete == 0 {
                    continue;
                }
                let chunk = String::from_utf8_lossy(&pending[..complete]).to_string();
                pending.drain(..complete);
                if tx.send(wrap(chunk)).is_err() {
                    return;
                }
            }
            Err(e) => {
                tracing::debug!("Stopped reading child output: {}", e);
                break;
            }
        }
    }
    if !pending.is_empty() {
        let _ = tx.send(wrap(String::from_utf8_lossy(&pending).to_string()));
    }
}

/// Length of a trailing UTF-8 sequence that is started but not finished.
fn incomplete_tail_len(bytes: &[u8]) -> usize {
    for back in 1..=bytes.len().min(3) {
        let byte = bytes[bytes.len() - back];
        if byte & 0xC0 == 0x80 {
            continue;
        }
        let expected = match byte {
            0xF0..=0xF7 => 4,
            0xE0..=0xEF => 3,
            0xC0..=0xDF => 2,
            _ => 1,
        };
        return if expected > back { back } else { 0 };
    }
    0
}
