//! `write`: build the installer drive.

use crate::{
    cli::{RuntimeConfig, WriteArgs},
    error::{AppError, CliError, Result},
    installer::{ConfigFile, Session, SettingsBuilder, Verdict, WriteOutcome},
};

/// Exit code for a run stopped by the operator
const EXIT_CANCELLED: i32 = 130;

pub async fn execute(args: &WriteArgs, config: &ConfigFile, runtime_config: &RuntimeConfig) -> Result<i32> {
    if !args.yes && !args.dry_run {
        return Err(CliError::NotConfirmed {
            device: args.device.clone(),
        }
        .into());
    }

    let mut builder = SettingsBuilder::from_config(config)
        .device(args.device.as_str())
        .version(args.version)
        .dry_run(args.dry_run);
    if let Some(downloads) = &args.downloads {
        builder = builder.download_root(downloads);
    }
    if let Some(template) = &args.efi_template {
        builder = builder.efi_template(template);
    }
    if args.no_enhance {
        builder = builder.enhance_plist(false);
    }
    if let Some(work_dir) = &args.work_dir {
        builder = builder.work_dir(work_dir);
    }
    if let Some(seven_zip) = &args.seven_zip {
        builder = builder.seven_zip(seven_zip);
    }
    let settings = builder.build()?;

    runtime_config.section(&format!(
        "macOS {} installer on {}{}",
        settings.version(),
        settings.device(),
        if settings.dry_run() { " (dry run)" } else { "" }
    ))?;
    runtime_config.verbose_println(&format!("Settings: {settings:?}"))?;

    let session = Session::new();
    let handle = session.start(settings, runtime_config.progress_sink())?;

    let cancel = handle.cancel_token();
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("Interrupt received; stopping at the next safe point");
            cancel.cancel();
        }
    });
    let verdict = tokio::task::spawn_blocking(move || handle.join())
        .await
        .map_err(|e| anyhow::anyhow!("installer worker could not be joined: {e}"))?;
    watcher.abort();

    report(verdict, runtime_config)
}

/// Print the details and the single final line for `verdict`.
fn report(verdict: Verdict, runtime_config: &RuntimeConfig) -> Result<i32> {
    let message = verdict.message();
    match verdict {
        Verdict::Success(outcome) => {
            print_outcome(&outcome, runtime_config)?;
            runtime_config.success(&message)?;
            Ok(0)
        }
        Verdict::Degraded(outcome) => {
            print_outcome(&outcome, runtime_config)?;
            runtime_config.section("Warnings")?;
            for warning in outcome.warnings() {
                runtime_config.warn(warning)?;
            }
            runtime_config.success(&message)?;
            Ok(0)
        }
        Verdict::ManualSteps(guide) => {
            runtime_config.section("Manual steps")?;
            for line in guide.to_string().lines() {
                runtime_config.println(line)?;
            }
            runtime_config.warn(&message)?;
            Ok(0)
        }
        Verdict::Cancelled => {
            runtime_config.warn(&message)?;
            Ok(EXIT_CANCELLED)
        }
        Verdict::Failed(e) => {
            let error = AppError::from(e);
            runtime_config.error(&message)?;
            for suggestion in error.recovery_suggestions() {
                runtime_config.indent(&format!("hint: {suggestion}"))?;
            }
            Ok(1)
        }
    }
}

fn print_outcome(outcome: &WriteOutcome, runtime_config: &RuntimeConfig) -> std::io::Result<()> {
    match outcome {
        WriteOutcome::DryRun { plan, commands, .. } => {
            runtime_config.section("Planned commands")?;
            for command in commands {
                runtime_config.indent(command)?;
            }
            runtime_config.section("Planned installer placements")?;
            for line in plan.describe() {
                runtime_config.indent(&line)?;
            }
        }
        WriteOutcome::Completed(summary) | WriteOutcome::ManualStepsRequired { summary, .. } => {
            runtime_config.section("Summary")?;
            runtime_config.indent(&format!("ESP:       {}", summary.partitions.esp))?;
            runtime_config.indent(&format!("Installer: {}", summary.partitions.installer))?;
            runtime_config.indent(&format!("Assets written: {}", summary.assets_written))?;
            if let Some(digest) = &summary.efi_digest {
                runtime_config.verbose_println(&format!("EFI tree sha256: {digest}"))?;
            }
        }
    }
    Ok(())
}
