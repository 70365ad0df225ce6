//! Installer write orchestration.

use super::{Cleanup, Stage, WriteOutcome, WriteSummary, tool_detection};
use crate::installer::{
    MacOsVersion,
    assets::{InstallerAssetSet, PlacementPlan},
    efi::{config_plist_path, stage_efi},
    error::{Error, ErrorExt, Result},
    extract::{ExtractOptions, SevenZip, extract_hfs},
    platform::{BlockDeviceBackend, Capability, ManualGuide, PartitionPaths, PartitionRole},
    plist::PlistEnhancer,
    process::CommandRunner,
    settings::Settings,
    utils::{
        checksum::sha256_tree,
        fs::{copy_dir, create_dir_all},
    },
};
use std::path::{Path, PathBuf};

/// Drives one write run against a [`BlockDeviceBackend`].
///
/// # Examples
///
/// ```no_run
/// use macos_usb_builder::installer::{
///     CommandRunner, InstallerWriter, LinuxBackend, Settings, log_sink,
/// };
/// use tokio_util::sync::CancellationToken;
///
/// # async fn example(settings: Settings) -> macos_usb_builder::installer::Result<()> {
/// let runner = CommandRunner::new(log_sink(), CancellationToken::new())
///     .with_dry_run(settings.dry_run());
/// let outcome = InstallerWriter::new(&settings, LinuxBackend, &runner).run().await?;
/// println!("{} warning(s)", outcome.warnings().len());
/// # Ok(())
/// # }
/// ```
pub struct InstallerWriter<'a, B: BlockDeviceBackend> {
    settings: &'a Settings,
    backend: B,
    runner: &'a CommandRunner,
    enhancer: PlistEnhancer,
    stage: Stage,
    warnings: Vec<String>,
}

impl<B: BlockDeviceBackend> std::fmt::Debug for InstallerWriter<'_, B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstallerWriter")
            .field("backend", &self.backend.name())
            .field("stage", &self.stage)
            .field("settings", &self.settings)
            .finish()
    }
}

/// What the dependency check resolved before anything destructive runs.
struct Preflight {
    assets: InstallerAssetSet,
    plan: PlacementPlan,
    label: String,
    seven_zip: Option<PathBuf>,
}

impl<'a, B: BlockDeviceBackend> InstallerWriter<'a, B> {
    pub fn new(settings: &'a Settings, backend: B, runner: &'a CommandRunner) -> Self {
        Self {
            settings,
            backend,
            runner,
            enhancer: PlistEnhancer::for_host(),
            stage: Stage::Idle,
            warnings: Vec::new(),
        }
    }

    /// Replace the host enhancer, e.g. with a fixed hardware snapshot.
    pub fn with_enhancer(mut self, enhancer: PlistEnhancer) -> Self {
        self.enhancer = enhancer;
        self
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Run every stage. Cleanup runs whether or not a stage fails.
    pub async fn run(mut self) -> Result<WriteOutcome> {
        let mut cleanup = Cleanup::new();
        let result = self.run_stages(&mut cleanup).await;
        cleanup.run(&self.backend, self.runner).await;

        match result {
            Ok(outcome) => {
                self.stage = Stage::Done;
                log::info!("✓ Installer write finished on {}", self.settings.device());
                Ok(outcome)
            }
            Err(e) => {
                let failed_at = self.stage;
                self.stage = Stage::Failed;
                log::error!("Installer write failed while {}: {}", failed_at, e);
                self.runner.report(&format!("Failed while {failed_at}: {e}"));
                Err(e)
            }
        }
    }

    fn enter(&mut self, stage: Stage) -> Result<()> {
        self.runner.check_cancelled()?;
        self.stage = stage;
        log::info!("==> {}", stage);
        self.runner.report(&format!("==> {stage}"));
        Ok(())
    }

    fn warn(&mut self, message: String) {
        log::warn!("{}", message);
        self.runner.report(&format!("Warning: {message}"));
        self.warnings.push(message);
    }

    fn version(&self) -> MacOsVersion {
        self.settings.version()
    }

    async fn run_stages(&mut self, cleanup: &mut Cleanup) -> Result<WriteOutcome> {
        let dry_run = self.runner.is_dry_run();
        let pid = std::process::id();
        let work = self.settings.work_dir().to_path_buf();
        let esp_mount = work.join(format!("mnt-{}-{pid}", PartitionRole::Esp.tag()));
        let installer_mount = work.join(format!("mnt-{}-{pid}", PartitionRole::Installer.tag()));

        self.enter(Stage::DependencyCheck)?;
        let preflight = self.preflight()?;

        self.enter(Stage::Cleanup)?;
        std::fs::create_dir_all(&work).fs_context("creating work directory", &work)?;
        for mount_point in [&esp_mount, &installer_mount] {
            if mount_point.exists() {
                if let Err(e) = self.backend.unmount(self.runner, mount_point).await {
                    log::debug!("{} was not mounted: {}", mount_point.display(), e);
                }
                if let Err(e) = std::fs::remove_dir(mount_point) {
                    log::warn!("Stale mount point {} not removed: {}", mount_point.display(), e);
                }
            }
        }
        let prepared = self
            .backend
            .prepare_device(self.runner, self.settings.device())
            .await?;
        if prepared.attached {
            cleanup.push_attached(&prepared.device);
        }
        let device = prepared.device;
        self.runner
            .report(&format!("WARNING: ALL DATA ON {device} WILL BE ERASED!"));

        self.enter(Stage::Partition)?;
        let partitions = self
            .backend
            .partition(self.runner, &device, &preflight.label)
            .await?;
        self.runner.report(&format!(
            "Identified ESP: {}, installer partition: {}",
            partitions.esp, partitions.installer
        ));
        let handle = self.backend.partition_handle(&partitions);
        if let Some(handle) = &handle {
            cleanup.push_attached(handle);
        }

        self.enter(Stage::FormatEsp)?;
        self.backend.format_esp(self.runner, &partitions.esp).await?;

        self.enter(Stage::FormatInstaller)?;
        let mut manual = match self
            .backend
            .format_installer(self.runner, &partitions.installer, &preflight.label)
            .await?
        {
            Capability::Done(()) => None,
            Capability::Unsupported(reason) => Some(reason),
        };

        self.enter(Stage::ExtractBaseSystem)?;
        let image = work.join(format!("BaseSystem-{pid}.hfs"));
        if dry_run {
            self.runner
                .report(&format!("[dry-run] would extract {} to {}", preflight.assets.base_system.display(), image.display()));
        } else {
            let archiver = SevenZip::locate(preflight.seven_zip.as_deref(), self.runner)?;
            let options = ExtractOptions::default().with_work_dir(&work);
            extract_hfs(
                &archiver,
                &preflight.assets.base_system,
                &image,
                &options,
                self.runner.progress(),
            )
            .await?;
            if manual.is_none() {
                cleanup.push_path(&image);
            }
        }

        if manual.is_none() {
            self.enter(Stage::WriteBaseSystemImage)?;
            if let Capability::Unsupported(reason) = self
                .backend
                .write_raw_image(self.runner, &image, &partitions.installer)
                .await?
            {
                manual = Some(reason);
            }
        }

        let mut assets_written = 0;
        if manual.is_none() {
            self.enter(Stage::MountInstaller)?;
            match self
                .mount(cleanup, &partitions.installer, PartitionRole::Installer, &installer_mount)
                .await?
            {
                Capability::Done(root) => {
                    self.enter(Stage::CopyInstallerAssets)?;
                    if dry_run {
                        self.runner.report(&format!(
                            "[dry-run] would copy {} asset(s) to {}",
                            preflight.plan.entries.len(),
                            root.display()
                        ));
                    } else {
                        assets_written = preflight.plan.apply(&root, self.runner.progress()).await?;
                    }
                    self.unmount(cleanup, &installer_mount).await?;
                }
                Capability::Unsupported(reason) => manual = Some(reason),
            }
        }
        if let Some(reason) = &manual {
            self.runner
                .report(&format!("{reason}; the installer partition needs manual steps."));
        }

        self.enter(Stage::BuildEfi)?;
        let staging = tempfile::Builder::new()
            .prefix(&format!("efi-stage-{pid}-"))
            .tempdir_in(&work)
            .fs_context("creating EFI staging directory", &work)?;
        let efi_dir = stage_efi(self.settings.efi_template(), staging.path(), self.runner.progress()).await?;
        if self.settings.enhance_plist() {
            self.enhance(&efi_dir)?;
        }

        self.enter(Stage::CopyEfiToEsp)?;
        let efi_digest = match self
            .mount(cleanup, &partitions.esp, PartitionRole::Esp, &esp_mount)
            .await?
        {
            Capability::Done(root) => {
                let digest = if dry_run {
                    self.runner
                        .report(&format!("[dry-run] would copy EFI folder to {}", root.join("EFI").display()));
                    None
                } else {
                    let copied = copy_dir(&efi_dir, &root.join("EFI")).await?;
                    let digest = sha256_tree(&efi_dir).await?;
                    log::info!("✓ Copied {} EFI file(s) (sha256 {})", copied, digest);
                    Some(digest)
                };
                self.unmount(cleanup, &esp_mount).await?;
                digest
            }
            Capability::Unsupported(reason) => return Err(Error::UnsupportedHost(reason)),
        };

        match self.backend.release(self.runner, &device, &partitions).await {
            Ok(()) => {
                if let Some(handle) = &handle {
                    cleanup.pop_attached(handle);
                }
            }
            Err(e) => self.warn(format!("Releasing {device} failed: {e}")),
        }

        Ok(self.outcome(preflight, partitions, image, manual, assets_written, efi_digest))
    }

    fn preflight(&mut self) -> Result<Preflight> {
        let dry_run = self.runner.is_dry_run();
        let missing = tool_detection::missing_tools(self.backend.required_tools());

        if dry_run {
            if !missing.is_empty() {
                self.warn(format!("Missing tools (ignored in dry-run): {}", missing.join(", ")));
            }
        } else {
            if !*tool_detection::IS_PRIVILEGED {
                return Err(Error::NotPrivileged);
            }
            if let Some(tool) = missing.into_iter().next() {
                return Err(Error::ToolNotFound { tool });
            }
        }

        let seven_zip = if dry_run {
            self.settings.tools().seven_zip.clone()
        } else {
            Some(
                SevenZip::locate(self.settings.tools().seven_zip.as_deref(), self.runner)?
                    .program()
                    .to_path_buf(),
            )
        };

        let version = self.version();
        let assets = InstallerAssetSet::locate(self.settings.download_root(), version)?;
        let plan = PlacementPlan::build(&assets, version)?;
        for skipped in plan.skipped.clone() {
            self.warn(format!("Optional asset {skipped} was not found"));
        }
        self.runner.report("All critical dependencies and assets found.");

        Ok(Preflight {
            assets,
            plan,
            label: version.installer_label(self.backend.installer_label_limit()),
            seven_zip,
        })
    }

    async fn mount(
        &mut self,
        cleanup: &mut Cleanup,
        partition: &str,
        role: PartitionRole,
        mount_point: &Path,
    ) -> Result<Capability<PathBuf>> {
        create_dir_all(mount_point, false).await?;
        cleanup.push_path(mount_point);
        let mounted = self
            .backend
            .mount(self.runner, partition, role, mount_point)
            .await?;
        if let Capability::Done(_) = &mounted {
            cleanup.push_mount(mount_point);
        }
        Ok(mounted)
    }

    async fn unmount(&mut self, cleanup: &mut Cleanup, mount_point: &Path) -> Result<()> {
        self.backend.unmount(self.runner, mount_point).await?;
        cleanup.pop_mount(mount_point);
        Ok(())
    }

    /// Tune the staged config.plist. Only a failed rollback stops the run.
    fn enhance(&mut self, efi_dir: &Path) -> Result<()> {
        let config = config_plist_path(efi_dir);
        if !config.is_file() {
            self.warn(format!(
                "No config.plist at {}; hardware tuning skipped",
                config.display()
            ));
            return Ok(());
        }

        match self
            .enhancer
            .enhance(&config, self.version(), self.runner.progress())
        {
            Ok(outcome) => {
                if !outcome.hardware_detected {
                    self.warn("Hardware detection unavailable on this host; config.plist not tuned".into());
                }
                Ok(())
            }
            Err(e) if e.is_critical() => Err(e),
            Err(e) => {
                self.warn(format!("config.plist enhancement failed: {e}"));
                Ok(())
            }
        }
    }

    fn outcome(
        &self,
        preflight: Preflight,
        partitions: PartitionPaths,
        image: PathBuf,
        manual: Option<String>,
        assets_written: usize,
        efi_digest: Option<String>,
    ) -> WriteOutcome {
        if self.runner.is_dry_run() {
            return WriteOutcome::DryRun {
                plan: preflight.plan,
                commands: self.runner.history(),
                warnings: self.warnings.clone(),
            };
        }

        let summary = WriteSummary {
            device: self.settings.device().to_string(),
            version: self.version(),
            partitions,
            assets_written,
            efi_digest,
            warnings: self.warnings.clone(),
        };
        match manual {
            Some(_) => WriteOutcome::ManualStepsRequired {
                guide: ManualGuide::new(self.settings.device(), image, preflight.plan.describe()),
                summary,
            },
            None => WriteOutcome::Completed(summary),
        }
    }
}
