// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Shell command runner
//!
//! A command runs in its own driver task. Output lines from stdout and stderr
//! are merged into one queue, batched by [`DebouncedOutput`], and delivered
//! as [`CommandEvent`]s. The driver reports once when the grace period passes
//! with the process still alive, and kills it at the hard ceiling. Consumers
//! decide independently what to do with each event.

use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::{mpsc, Notify};
use tokio::time::Instant;

use crate::config::CommandConfig;
use crate::error::{Result, TernError};

/// Progress of a running command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandEvent {
    /// A batch of output lines
    Output(Vec<String>),
    /// The grace period passed and the process is still running
    StillRunning,
    /// The process exited on its own (`None` if killed by a signal)
    Exited(Option<i32>),
    /// The process was killed at the hard ceiling
    TimedOut,
    /// The process was killed on request
    Killed,
}

impl CommandEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CommandEvent::Exited(_) | CommandEvent::TimedOut | CommandEvent::Killed
        )
    }
}

/// Flush policy for streamed output: a batch goes out when it reaches
/// `max_lines` or when `interval` has passed since its first line.
#[derive(Debug)]
pub struct DebouncedOutput {
    pending: Vec<String>,
    max_lines: usize,
    interval: Duration,
    first_pending_at: Option<Instant>,
}

impl DebouncedOutput {
    pub fn new(max_lines: usize, interval: Duration) -> Self {
        Self {
            pending: Vec::new(),
            max_lines: max_lines.max(1),
            interval,
            first_pending_at: None,
        }
    }

    /// Buffer a line; returns a batch if the line filled it.
    pub fn push(&mut self, line: String, now: Instant) -> Option<Vec<String>> {
        if self.pending.is_empty() {
            self.first_pending_at = Some(now);
        }
        self.pending.push(line);
        if self.pending.len() >= self.max_lines {
            return Some(self.take());
        }
        None
    }

    /// When the buffered batch must go out, if anything is buffered
    pub fn deadline(&self) -> Option<Instant> {
        self.first_pending_at.map(|at| at + self.interval)
    }

    pub fn is_due(&self, now: Instant) -> bool {
        self.deadline().is_some_and(|deadline| now >= deadline)
    }

    pub fn take(&mut self) -> Vec<String> {
        self.first_pending_at = None;
        std::mem::take(&mut self.pending)
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

/// Handle to a running command
#[derive(Debug)]
pub struct CommandHandle {
    events: mpsc::Receiver<CommandEvent>,
    kill: Arc<Notify>,
}

impl CommandHandle {
    /// Next event; `None` once the driver has finished.
    pub async fn next_event(&mut self) -> Option<CommandEvent> {
        self.events.recv().await
    }

    /// A clonable trigger that kills the process
    pub fn killer(&self) -> CommandKiller {
        CommandKiller {
            kill: Arc::clone(&self.kill),
        }
    }
}

/// Kills a running command from elsewhere
#[derive(Debug, Clone)]
pub struct CommandKiller {
    kill: Arc<Notify>,
}

impl CommandKiller {
    pub fn kill(&self) {
        self.kill.notify_one();
    }
}

/// Start `command` through the platform shell in `cwd`.
pub fn spawn_command(command: &str, cwd: &Path, config: &CommandConfig) -> Result<CommandHandle> {
    let mut cmd = if cfg!(windows) {
        let mut cmd = Command::new("cmd");
        cmd.arg("/C").arg(command);
        cmd
    } else {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(command);
        // Own process group, so killing the command reaches its children too.
        #[cfg(unix)]
        cmd.process_group(0);
        cmd
    };
    let mut child = cmd
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| TernError::ToolExecution(format!("Failed to spawn command: {}", e)))?;

    let (line_tx, line_rx) = mpsc::unbounded_channel();
    if let Some(stdout) = child.stdout.take() {
        tokio::spawn(forward_lines(stdout, line_tx.clone()));
    }
    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(forward_lines(stderr, line_tx.clone()));
    }
    drop(line_tx);

    let (event_tx, event_rx) = mpsc::channel(64);
    let kill = Arc::new(Notify::new());

    tracing::debug!(target: "tern.tools", command = %command, cwd = %cwd.display(), "command started");

    tokio::spawn(drive(child, line_rx, event_tx, Arc::clone(&kill), config.clone()));

    Ok(CommandHandle {
        events: event_rx,
        kill,
    })
}

async fn forward_lines<R>(stream: R, tx: mpsc::UnboundedSender<String>)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(stream).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if tx.send(line).is_err() {
            break;
        }
    }
}

async fn drive(
    mut child: tokio::process::Child,
    mut lines: mpsc::UnboundedReceiver<String>,
    events: mpsc::Sender<CommandEvent>,
    kill: Arc<Notify>,
    config: CommandConfig,
) {
    let started = Instant::now();
    let grace_at = started + Duration::from_secs(config.grace_period_secs);
    let hard_at = started + Duration::from_secs(config.hard_timeout_secs);
    let mut buffer = DebouncedOutput::new(
        config.output_flush_lines,
        Duration::from_millis(config.output_flush_interval_ms),
    );
    let mut grace_reported = false;
    let mut lines_open = true;

    // A closed receiver only means nobody is listening any more; the process
    // still runs to completion or to the ceiling.
    let terminal = loop {
        let flush_at = buffer.deadline().unwrap_or(hard_at);
        tokio::select! {
            line = lines.recv(), if lines_open => match line {
                Some(line) => {
                    if let Some(batch) = buffer.push(line, Instant::now()) {
                        let _ = events.send(CommandEvent::Output(batch)).await;
                    }
                }
                None => lines_open = false,
            },
            status = child.wait(), if !lines_open => {
                break CommandEvent::Exited(status.ok().and_then(|s| s.code()));
            }
            _ = tokio::time::sleep_until(flush_at), if !buffer.is_empty() => {
                let _ = events.send(CommandEvent::Output(buffer.take())).await;
            }
            _ = tokio::time::sleep_until(grace_at), if !grace_reported => {
                grace_reported = true;
                if !buffer.is_empty() {
                    let _ = events.send(CommandEvent::Output(buffer.take())).await;
                }
                let _ = events.send(CommandEvent::StillRunning).await;
            }
            _ = tokio::time::sleep_until(hard_at) => {
                kill_tree(&mut child).await;
                break CommandEvent::TimedOut;
            }
            _ = kill.notified() => {
                kill_tree(&mut child).await;
                break CommandEvent::Killed;
            }
        }
    };

    if !buffer.is_empty() {
        let _ = events.send(CommandEvent::Output(buffer.take())).await;
    }
    tracing::debug!(
        target: "tern.tools",
        event = ?terminal,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "command finished"
    );
    let _ = events.send(terminal).await;
}

/// Kill the shell and everything it started.
async fn kill_tree(child: &mut tokio::process::Child) {
    if let Some(pid) = child.id() {
        kill_group(pid);
    }
    let _ = child.kill().await;
}

#[cfg(unix)]
fn kill_group(pid: u32) {
    // SAFETY: killpg only sends a signal; a group that is already gone yields ESRCH.
    unsafe {
        libc::killpg(pid as libc::pid_t, libc::SIGKILL);
    }
}

#[cfg(not(unix))]
fn kill_group(_pid: u32) {}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn fast_config() -> CommandConfig {
        CommandConfig {
            grace_period_secs: 30,
            hard_timeout_secs: 60,
            output_flush_lines: 2,
            output_flush_interval_ms: 50,
            max_output_lines: 100,
        }
    }

    async fn collect(mut handle: CommandHandle) -> Vec<CommandEvent> {
        let mut events = Vec::new();
        while let Some(event) = handle.next_event().await {
            let done = event.is_terminal();
            events.push(event);
            if done {
                break;
            }
        }
        events
    }

    #[test]
    fn test_debounce_flushes_on_line_count() {
        let now = Instant::now();
        let mut buffer = DebouncedOutput::new(3, Duration::from_millis(100));
        assert!(buffer.push("a".into(), now).is_none());
        assert!(buffer.push("b".into(), now).is_none());
        assert_eq!(
            buffer.push("c".into(), now),
            Some(vec!["a".to_string(), "b".to_string(), "c".to_string()])
        );
        assert!(buffer.is_empty());
        assert!(buffer.deadline().is_none());
    }

    #[test]
    fn test_debounce_deadline_from_first_line() {
        let now = Instant::now();
        let mut buffer = DebouncedOutput::new(10, Duration::from_millis(100));
        buffer.push("a".into(), now);
        buffer.push("b".into(), now + Duration::from_millis(90));
        assert!(!buffer.is_due(now + Duration::from_millis(99)));
        assert!(buffer.is_due(now + Duration::from_millis(100)));
        assert_eq!(buffer.take().len(), 2);
    }

    #[tokio::test]
    async fn test_command_output_and_exit() {
        let dir = TempDir::new().unwrap();
        let handle = spawn_command("echo one; echo two; echo three", dir.path(), &fast_config()).unwrap();
        let events = collect(handle).await;

        let lines: Vec<String> = events
            .iter()
            .filter_map(|e| match e {
                CommandEvent::Output(batch) => Some(batch.clone()),
                _ => None,
            })
            .flatten()
            .collect();
        assert_eq!(lines, vec!["one", "two", "three"]);
        assert_eq!(events.last(), Some(&CommandEvent::Exited(Some(0))));
    }

    #[tokio::test]
    async fn test_command_exit_code() {
        let dir = TempDir::new().unwrap();
        let events = collect(spawn_command("exit 3", dir.path(), &fast_config()).unwrap()).await;
        assert_eq!(events.last(), Some(&CommandEvent::Exited(Some(3))));
    }

    #[tokio::test]
    async fn test_kill() {
        let dir = TempDir::new().unwrap();
        let handle = spawn_command("sleep 30", dir.path(), &fast_config()).unwrap();
        handle.killer().kill();
        let events = collect(handle).await;
        assert_eq!(events.last(), Some(&CommandEvent::Killed));
    }

    #[cfg(target_os = "linux")]
    fn is_gone(pid: u32) -> bool {
        match std::fs::read_to_string(format!("/proc/{}/stat", pid)) {
            Ok(stat) => stat.contains(") Z "),
            Err(_) => true,
        }
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_kill_reaches_background_children() {
        let dir = TempDir::new().unwrap();
        let mut handle = spawn_command("sleep 60 & echo $!; wait", dir.path(), &fast_config()).unwrap();

        let pid: u32 = loop {
            match handle.next_event().await {
                Some(CommandEvent::Output(batch)) => break batch[0].trim().parse().unwrap(),
                Some(other) => panic!("unexpected {:?}", other),
                None => panic!("command ended early"),
            }
        };
        assert!(!is_gone(pid));

        handle.killer().kill();
        let events = collect(handle).await;
        assert_eq!(events.last(), Some(&CommandEvent::Killed));

        for _ in 0..100 {
            if is_gone(pid) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("background process {} survived the kill", pid);
    }

    #[tokio::test(start_paused = true)]
    async fn test_grace_period_then_hard_timeout() {
        let dir = TempDir::new().unwrap();
        let config = CommandConfig {
            grace_period_secs: 30,
            hard_timeout_secs: 40,
            ..fast_config()
        };
        let events = collect(spawn_command("sleep 120", dir.path(), &config).unwrap()).await;
        assert!(events.contains(&CommandEvent::StillRunning));
        assert_eq!(events.last(), Some(&CommandEvent::TimedOut));
    }
}
