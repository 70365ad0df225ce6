//! `extract`: pull the raw HFS+ image out of an installer archive.

use crate::{
    cli::{ExtractArgs, RuntimeConfig},
    error::Result,
    installer::{
        ConfigFile, Error,
        extract::{ExtractOptions, SevenZip, extract_hfs},
        process::CommandRunner,
    },
};
use tokio_util::sync::CancellationToken;

pub async fn execute(args: &ExtractArgs, config: &ConfigFile, runtime_config: &RuntimeConfig) -> Result<i32> {
    let cancel = CancellationToken::new();
    let runner = CommandRunner::new(runtime_config.progress_sink(), cancel.clone());

    let program = args.seven_zip.as_deref().or(config.tools.seven_zip.as_deref());
    let archiver = SevenZip::locate(program, &runner)?;

    let mut options = ExtractOptions::default();
    if let Some(work_dir) = args.work_dir.as_ref().or(config.work_dir.as_ref()) {
        options = options.with_work_dir(work_dir);
    }
    if let Some(min_size) = args.min_size {
        options = options.with_fallback_min_size(min_size);
    }

    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("Interrupt received; stopping extraction");
            cancel.cancel();
        }
    });

    runtime_config.progress(&format!("Extracting HFS+ image from {}", args.source.display()))?;
    let result = extract_hfs(&archiver, &args.source, &args.output, &options, runner.progress()).await;
    watcher.abort();

    match result {
        Ok(image) => {
            runtime_config.success(&format!("HFS+ image written to {}", image.display()))?;
            Ok(0)
        }
        Err(Error::Cancelled) => {
            runtime_config.warn("Extraction cancelled")?;
            Ok(130)
        }
        Err(e) => Err(e.into()),
    }
}
