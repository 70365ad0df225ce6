//! External command execution with progress streaming and cooperative cancellation.

use crate::installer::error::{Error, Result};
use std::{
    ffi::OsStr,
    process::Stdio,
    sync::{Arc, Mutex},
    time::Duration,
};
use tokio::{
    io::{AsyncBufReadExt, AsyncRead, BufReader},
    process::{Child, Command},
    sync::mpsc,
};
use tokio_util::sync::CancellationToken;

/// Receives one human-readable line per executed step or subprocess output line.
pub type ProgressSink = Arc<dyn Fn(&str) + Send + Sync>;

/// A sink that only forwards to the `log` facade.
pub fn log_sink() -> ProgressSink {
    Arc::new(|line: &str| log::info!("{}", line))
}

/// Grace period between SIGTERM and kill on cancellation
pub const TERMINATION_GRACE: Duration = Duration::from_secs(10);

/// Lines of stderr kept for error messages
const STDERR_TAIL: usize = 20;

/// Shown once when a stop arrives during an [`Interruptible::No`] step.
pub const UNINTERRUPTIBLE_NOTICE: &str =
    "Cancellation requested, but this step cannot be interrupted; stopping once it completes.";

/// Whether a streamed command may be stopped mid-run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interruptible {
    /// Cancellation terminates the process between output lines.
    Yes,
    /// Partition writes and formats: cancellation waits for completion.
    No,
}

/// Captured result of a non-streamed command.
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Runs external tools for one pipeline run.
pub struct CommandRunner {
    progress: ProgressSink,
    cancel: CancellationToken,
    dry_run: bool,
    history: Arc<Mutex<Vec<String>>>,
    grace: Duration,
}

impl std::fmt::Debug for CommandRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandRunner")
            .field("dry_run", &self.dry_run)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

impl CommandRunner {
    pub fn new(progress: ProgressSink, cancel: CancellationToken) -> Self {
        Self {
            progress,
            cancel,
            dry_run: false,
            history: Arc::new(Mutex::new(Vec::new())),
            grace: TERMINATION_GRACE,
        }
    }

    /// Record commands instead of executing them.
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_termination_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// A runner for releasing resources after a stop request: same sink,
    /// dry-run flag and history, but its own token so teardown still runs.
    pub fn teardown(&self) -> CommandRunner {
        CommandRunner {
            progress: Arc::clone(&self.progress),
            cancel: CancellationToken::new(),
            dry_run: self.dry_run,
            history: Arc::clone(&self.history),
            grace: self.grace,
        }
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    pub fn progress(&self) -> &ProgressSink {
        &self.progress
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Forward a line to the progress sink.
    pub fn report(&self, message: &str) {
        log::debug!("{}", message);
        (self.progress)(message);
    }

    /// Command lines seen so far, in order.
    pub fn history(&self) -> Vec<String> {
        self.history
            .lock()
            .map(|h| h.clone())
            .unwrap_or_default()
    }

    pub fn check_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        Ok(())
    }

    fn announce<S: AsRef<OsStr>>(&self, program: &str, args: &[S]) -> String {
        let line = render_command(program, args);
        if let Ok(mut history) = self.history.lock() {
            history.push(line.clone());
        }
        if self.dry_run {
            self.report(&format!("[dry-run] {line}"));
        } else {
            self.report(&format!("Executing: {line}"));
        }
        line
    }

    /// Run a short query command and capture its output; non-zero exit is an error.
    pub async fn output<S: AsRef<OsStr>>(&self, program: &str, args: &[S]) -> Result<CommandOutput> {
        let command = render_command(program, args);
        let output = self.output_unchecked(program, args).await?;
        if !output.success() && !self.dry_run {
            return Err(Error::CommandFailed {
                command,
                code: output.code,
                stderr: output.stderr.trim().to_string(),
            });
        }
        Ok(output)
    }

    /// Like [`CommandRunner::output`] but a non-zero exit is returned, not raised.
    pub async fn output_unchecked<S: AsRef<OsStr>>(
        &self,
        program: &str,
        args: &[S],
    ) -> Result<CommandOutput> {
        self.check_cancelled()?;
        let command = self.announce(program, args);
        if self.dry_run {
            return Ok(CommandOutput {
                code: Some(0),
                ..Default::default()
            });
        }

        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| spawn_error(program, &command, e))?;

        let result = CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };
        if !result.stdout.trim().is_empty() {
            log::debug!("stdout: {}", result.stdout.trim());
        }
        if !result.stderr.trim().is_empty() {
            log::debug!("stderr: {}", result.stderr.trim());
        }
        Ok(result)
    }

    /// Run a long command, forwarding every output line to the progress sink.
    ///
    /// With [`Interruptible::Yes`] a cancellation between lines terminates the
    /// process (SIGTERM, then kill after the grace period).
    pub async fn stream<S: AsRef<OsStr>>(
        &self,
        program: &str,
        args: &[S],
        interruptible: Interruptible,
    ) -> Result<()> {
        self.check_cancelled()?;
        let command = self.announce(program, args);
        if self.dry_run {
            return Ok(());
        }

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| spawn_error(program, &command, e))?;

        let (tx, mut rx) = mpsc::unbounded_channel::<(bool, String)>();
        if let Some(stdout) = child.stdout.take() {
            forward_lines(stdout, false, tx.clone());
        }
        if let Some(stderr) = child.stderr.take() {
            forward_lines(stderr, true, tx.clone());
        }
        drop(tx);

        let mut stderr_tail: Vec<String> = Vec::new();
        let mut warned = false;
        loop {
            let next = match interruptible {
                Interruptible::Yes => tokio::select! {
                    line = rx.recv() => line,
                    _ = self.cancel.cancelled() => {
                        self.report("Stop requested, terminating process...");
                        self.terminate(&mut child).await;
                        return Err(Error::Cancelled);
                    }
                },
                Interruptible::No if !warned => tokio::select! {
                    line = rx.recv() => line,
                    _ = self.cancel.cancelled() => {
                        self.report(UNINTERRUPTIBLE_NOTICE);
                        warned = true;
                        continue;
                    }
                },
                Interruptible::No => rx.recv().await,
            };

            let Some((is_stderr, line)) = next else { break };
            if is_stderr {
                stderr_tail.push(line.clone());
                if stderr_tail.len() > STDERR_TAIL {
                    stderr_tail.remove(0);
                }
            }
            self.report(&line);
        }

        let status = child
            .wait()
            .await
            .map_err(|e| spawn_error(program, &command, e))?;
        if !status.success() {
            return Err(Error::CommandFailed {
                command,
                code: status.code(),
                stderr: stderr_tail.join("\n"),
            });
        }
        Ok(())
    }

    async fn terminate(&self, child: &mut Child) {
        #[cfg(unix)]
        {
            use nix::sys::signal::{Signal, kill};
            use nix::unistd::Pid;
            if let Some(pid) = child.id() {
                if let Err(e) = kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
                    log::debug!("SIGTERM to {} failed: {}", pid, e);
                }
            }
        }
        #[cfg(not(unix))]
        {
            if let Err(e) = child.start_kill() {
                log::debug!("terminate failed: {}", e);
            }
        }

        match tokio::time::timeout(self.grace, child.wait()).await {
            Ok(_) => self.report("Process stopped."),
            Err(_) => {
                self.report("Process did not terminate gracefully, killing.");
                if let Err(e) = child.kill().await {
                    log::warn!("Failed to kill process: {}", e);
                }
            }
        }
    }
}

fn forward_lines<R>(reader: R, is_stderr: bool, tx: mpsc::UnboundedSender<(bool, String)>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if tx.send((is_stderr, line)).is_err() {
                break;
            }
        }
    });
}

fn spawn_error(program: &str, command: &str, e: std::io::Error) -> Error {
    if e.kind() == std::io::ErrorKind::NotFound {
        Error::ToolNotFound {
            tool: program.to_string(),
        }
    } else {
        Error::CommandFailed {
            command: command.to_string(),
            code: None,
            stderr: e.to_string(),
        }
    }
}

/// Render a command line for display, quoting arguments that contain spaces.
pub fn render_command<S: AsRef<OsStr>>(program: &str, args: &[S]) -> String {
    let mut line = program.to_string();
    for arg in args {
        let arg = arg.as_ref().to_string_lossy();
        line.push(' ');
        if arg.contains(' ') || arg.is_empty() {
            line.push('"');
            line.push_str(&arg);
            line.push('"');
        } else {
            line.push_str(&arg);
        }
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runner(dry_run: bool) -> (CommandRunner, Arc<Mutex<Vec<String>>>) {
        let lines = Arc::new(Mutex::new(Vec::new()));
        let sink_lines = lines.clone();
        let sink: ProgressSink = Arc::new(move |l: &str| sink_lines.lock().unwrap().push(l.to_string()));
        (
            CommandRunner::new(sink, CancellationToken::new()).with_dry_run(dry_run),
            lines,
        )
    }

    #[test]
    fn renders_quoted_arguments() {
        assert_eq!(
            render_command("parted", &["-s", "/dev/sdb", "mkpart", "Install macOS Sonoma"]),
            r#"parted -s /dev/sdb mkpart "Install macOS Sonoma""#
        );
    }

    #[tokio::test]
    async fn dry_run_records_without_executing() {
        let (runner, lines) = runner(true);
        runner
            .stream("definitely-not-a-real-tool", &["--flag"], Interruptible::No)
            .await
            .unwrap();
        assert_eq!(runner.history(), vec!["definitely-not-a-real-tool --flag"]);
        assert!(lines.lock().unwrap()[0].starts_with("[dry-run]"));
    }

    #[tokio::test]
    async fn missing_tool_is_reported_as_not_found() {
        let (runner, _) = runner(false);
        let err = runner
            .output("definitely-not-a-real-tool-xyz", &["--version"])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ToolNotFound { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn silent_uninterruptible_step_announces_pending_stop() {
        let (runner, lines) = runner(false);
        let cancel = runner.cancel_token().clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            cancel.cancel();
        });

        runner
            .stream("sh", &["-c", "sleep 1"], Interruptible::No)
            .await
            .unwrap();
        let notices = lines
            .lock()
            .unwrap()
            .iter()
            .filter(|l| l.as_str() == UNINTERRUPTIBLE_NOTICE)
            .count();
        assert_eq!(notices, 1);
    }

    #[tokio::test]
    async fn teardown_runner_ignores_the_stop_and_shares_history() {
        let (runner, _) = runner(true);
        runner.cancel_token().cancel();
        let teardown = runner.teardown();
        teardown.output("umount", &["/mnt/x"]).await.unwrap();
        assert!(teardown.is_dry_run());
        assert_eq!(runner.history(), vec!["umount /mnt/x"]);
    }

    #[tokio::test]
    async fn cancelled_runner_refuses_new_commands() {
        let (runner, _) = runner(true);
        runner.cancel_token().cancel();
        let err = runner.output("true", &[] as &[&str]).await.unwrap_err();
        assert!(matches!(err, Error::Cancelled));
    }
}
