use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;

use term_session::host::TracingHostShell;
use term_session::vcs::{Cleanliness, GitCli};
use term_session::{CommandQueue, Config, Dimensions, Session, SessionEvent, SessionNotification};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = Config::from_env();
    tracing::info!("Using state file {}", config.state_file.display());

    // Create event channels
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<SessionEvent>();
    let (note_tx, mut note_rx) = mpsc::unbounded_channel::<SessionNotification>();

    let probe = Arc::new(GitCli::new(config.git_program.clone()));
    let mut session = Session::new(
        config,
        Dimensions::from_terminal(),
        Arc::new(TracingHostShell),
        probe,
        event_tx,
        note_tx,
    );

    // Spawn input reader
    let (line_tx, mut line_rx) = mpsc::unbounded_channel::<String>();
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if line_tx.send(line).is_err() {
                break;
            }
        }
    });

    let mut stdout = tokio::io::stdout();
    let mut queue = CommandQueue::new();

    // Main event loop
    loop {
        tokio::select! {
            Some(event) = event_rx.recv() => session.handle_event(event),
            Some(notification) = note_rx.recv() => match notification {
                SessionNotification::Output { chunk, .. } => {
                    stdout
                        .write_all(chunk.as_bytes())
                        .await
                        .context("Failed to write command output")?;
                    stdout.flush().await.context("Failed to flush stdout")?;
                }
                SessionNotification::InvocationCreated(_) => {
                    queue.invocation_ready();
                    let prompt = format!("{} $ ", session.current_directory().display());
                    stdout
                        .write_all(prompt.as_bytes())
                        .await
                        .context("Failed to write prompt")?;
                    stdout.flush().await.context("Failed to flush stdout")?;
                }
                SessionNotification::VcsData(status) => {
                    if status.is_repository {
                        let dirty = status.cleanliness == Some(Cleanliness::Dirty);
                        tracing::info!(
                            "Repository on {} ({})",
                            status.branch.as_deref().unwrap_or("detached HEAD"),
                            if dirty { "dirty" } else { "clean" }
                        );
                    } else {
                        tracing::info!("Not a repository");
                    }
                }
            },
            line = line_rx.recv(), if !queue.is_input_closed() => match line {
                Some(line) => queue.push(line),
                None => queue.close_input(),
            },
            _ = tokio::signal::ctrl_c() => break,
        }

        // Lines run one at a time, each in the invocation created after the last
        if let Some(line) = queue.next_command() {
            if let Err(e) = session.execute(&line) {
                tracing::warn!("{}", e);
                queue.invocation_ready();
            }
        }
        if queue.is_finished() {
            break;
        }
    }

    Ok(())
}
