//! Single-worker session around the write pipeline.
//!
//! The worker owns its own current-thread runtime on a dedicated thread so a
//! caller without an async context (a UI loop, the CLI's blocking wait) can
//! start, cancel and await a run. Each run delivers exactly one [`Verdict`].

use crate::installer::{
    error::{Error, Result},
    platform::{LinuxBackend, MacOsBackend, ManualGuide, WindowsBackend},
    process::{CommandRunner, ProgressSink},
    settings::Settings,
    writer::{InstallerWriter, WriteOutcome},
};
use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
        mpsc,
    },
    thread::JoinHandle,
};
use tokio_util::sync::CancellationToken;

/// Terminal state of one run.
#[derive(Debug)]
pub enum Verdict {
    Success(WriteOutcome),
    /// Finished, but continued past at least one degraded condition.
    Degraded(WriteOutcome),
    /// The ESP is done; the installer partition needs the operator.
    ManualSteps(ManualGuide),
    Failed(Error),
    Cancelled,
}

impl Verdict {
    fn from_result(result: Result<WriteOutcome>) -> Self {
        match result {
            Ok(WriteOutcome::ManualStepsRequired { guide, .. }) => Verdict::ManualSteps(guide),
            Ok(outcome) if outcome.warnings().is_empty() => Verdict::Success(outcome),
            Ok(outcome) => Verdict::Degraded(outcome),
            Err(Error::Cancelled) => Verdict::Cancelled,
            Err(e) => Verdict::Failed(e),
        }
    }

    /// The one final line shown to the operator.
    pub fn message(&self) -> String {
        match self {
            Verdict::Success(WriteOutcome::DryRun { commands, .. }) => {
                format!("Dry run complete: {} command(s) planned, nothing written", commands.len())
            }
            Verdict::Degraded(WriteOutcome::DryRun { commands, warnings, .. }) => format!(
                "Dry run complete: {} command(s) planned with {} warning(s), nothing written",
                commands.len(),
                warnings.len()
            ),
            Verdict::Success(_) => "USB installer created successfully".to_string(),
            Verdict::Degraded(outcome) => format!(
                "USB installer created with {} warning(s)",
                outcome.warnings().len()
            ),
            Verdict::ManualSteps(_) => {
                "EFI partition ready; finish the installer partition manually".to_string()
            }
            Verdict::Failed(e) if e.is_critical() => format!("CRITICAL: {e}"),
            Verdict::Failed(e) => format!("USB creation failed: {e}"),
            Verdict::Cancelled => "USB creation cancelled".to_string(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(
            self,
            Verdict::Success(_) | Verdict::Degraded(_) | Verdict::ManualSteps(_)
        )
    }
}

/// Accepts one write at a time.
#[derive(Debug, Clone, Default)]
pub struct Session {
    active: Arc<AtomicBool>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_busy(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Start a write on a worker thread. Fails with [`Error::Busy`] while
    /// another run from this session is still going.
    pub fn start(&self, settings: Settings, sink: ProgressSink) -> Result<WorkerHandle> {
        if self
            .active
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(Error::Busy);
        }

        let cancel = CancellationToken::new();
        let (tx, rx) = mpsc::channel();
        let active = Arc::clone(&self.active);
        let token = cancel.clone();

        let spawned = std::thread::Builder::new()
            .name("installer-writer".into())
            .spawn(move || {
                let verdict = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(runtime) => {
                        Verdict::from_result(runtime.block_on(run_for_host(&settings, sink, token)))
                    }
                    Err(e) => Verdict::Failed(Error::IoError(e)),
                };
                log::info!("{}", verdict.message());
                active.store(false, Ordering::SeqCst);
                // The receiver may be gone if the caller dropped the handle.
                let _ = tx.send(verdict);
            });

        match spawned {
            Ok(thread) => Ok(WorkerHandle {
                cancel,
                thread: Some(thread),
                rx,
            }),
            Err(e) => {
                self.active.store(false, Ordering::SeqCst);
                Err(Error::IoError(e))
            }
        }
    }
}

async fn run_for_host(settings: &Settings, sink: ProgressSink, cancel: CancellationToken) -> Result<WriteOutcome> {
    let runner = CommandRunner::new(sink, cancel).with_dry_run(settings.dry_run());
    match std::env::consts::OS {
        "linux" => InstallerWriter::new(settings, LinuxBackend, &runner).run().await,
        "macos" => InstallerWriter::new(settings, MacOsBackend, &runner).run().await,
        "windows" => {
            let backend = WindowsBackend::new(settings.work_dir());
            InstallerWriter::new(settings, backend, &runner).run().await
        }
        other => Err(Error::UnsupportedHost(format!(
            "no block device backend for {other}"
        ))),
    }
}

/// Handle to a running write.
#[derive(Debug)]
pub struct WorkerHandle {
    cancel: CancellationToken,
    thread: Option<JoinHandle<()>>,
    rx: mpsc::Receiver<Verdict>,
}

impl WorkerHandle {
    /// Ask the run to stop at the next safe point.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// The verdict, if the run has finished.
    pub fn try_verdict(&self) -> Option<Verdict> {
        self.rx.try_recv().ok()
    }

    /// Block until the run finishes.
    pub fn join(mut self) -> Verdict {
        let verdict = self.rx.recv().unwrap_or_else(|_| {
            Verdict::Failed(Error::GenericError(
                "installer worker stopped without a verdict".into(),
            ))
        });
        if let Some(thread) = self.thread.take()
            && thread.join().is_err()
        {
            log::error!("installer worker thread panicked");
        }
        verdict
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::installer::{MacOsVersion, SettingsBuilder, process::log_sink};

    fn dry_run_settings(root: &std::path::Path) -> Settings {
        SettingsBuilder::new()
            .device("/dev/sdz")
            .version(MacOsVersion::Sonoma)
            .download_root(root)
            .work_dir(root.join("work"))
            .enhance_plist(false)
            .dry_run(true)
            .build()
            .unwrap()
    }

    #[test]
    fn missing_assets_fail_with_one_verdict() {
        let dir = tempfile::tempdir().unwrap();
        let session = Session::new();
        let handle = session.start(dry_run_settings(dir.path()), log_sink()).unwrap();
        let verdict = handle.join();
        assert!(matches!(
            verdict,
            Verdict::Failed(Error::MissingRequiredAsset { .. })
        ));
        assert!(!session.is_busy());
    }

    #[test]
    fn verdict_messages_are_distinct() {
        assert_eq!(Verdict::Cancelled.message(), "USB creation cancelled");
        let failed = Verdict::Failed(Error::NotPrivileged);
        assert!(failed.message().starts_with("USB creation failed"));
        assert!(!failed.is_success());
    }

    #[test]
    fn cancelled_result_maps_to_cancelled() {
        assert!(matches!(
            Verdict::from_result(Err(Error::Cancelled)),
            Verdict::Cancelled
        ));
    }
}
