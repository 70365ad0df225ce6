//! Windows: diskpart for the ESP, manual guidance for HFS+.
//!
//! Windows cannot create or write HFS+ volumes. The ESP, its FAT32 format
//! and the EFI files are automated; partition 2 only gets the HFS+ type GUID
//! and the operator finishes it with an HFS+-capable tool using the
//! [`ManualGuide`].

use super::{
    BlockDeviceBackend, Capability, ESP_LABEL, ESP_SIZE_MIB, PartitionPaths, PartitionRole,
    PreparedDevice,
};
use crate::installer::{
    error::{Error, ErrorExt, Result},
    process::{CommandRunner, Interruptible},
};
use std::{
    fmt,
    path::{Path, PathBuf},
};

/// GPT type GUID of an Apple HFS+ partition
pub const HFS_PARTITION_TYPE: &str = "48465300-0000-11AA-AA11-00306543ECAC";

const TOOLS: &[&str] = &["diskpart"];

/// Letters tried for the ESP, last first to stay clear of local drives.
const CANDIDATE_LETTERS: &str = "ZYXWVUTSRQPONMLKJIHGFE";

const UNSUPPORTED: &str = "Windows cannot format or write HFS+ partitions";

#[derive(Debug, Clone)]
pub struct WindowsBackend {
    /// Where diskpart scripts are written
    script_dir: PathBuf,
}

impl WindowsBackend {
    pub fn new(script_dir: impl Into<PathBuf>) -> Self {
        Self {
            script_dir: script_dir.into(),
        }
    }

    async fn run_script(&self, runner: &CommandRunner, name: &str, script: &str) -> Result<()> {
        let path = self
            .script_dir
            .join(format!("{name}-{}.txt", std::process::id()));
        runner.report(&format!("diskpart script {}:\n{}", path.display(), script.trim_end()));
        if !runner.is_dry_run() {
            std::fs::write(&path, script).fs_context("writing diskpart script", &path)?;
        }
        let target = path.display().to_string();
        let result = runner
            .stream("diskpart", &["/s", target.as_str()], Interruptible::No)
            .await;
        if !runner.is_dry_run() {
            if let Err(e) = std::fs::remove_file(&path) {
                log::debug!("Could not remove {}: {}", path.display(), e);
            }
        }
        result
    }

    async fn remove_letter(&self, runner: &CommandRunner, letter: char) -> Result<()> {
        let script = format!("select volume {letter}\nremove letter={letter}\nexit\n");
        self.run_script(runner, "release", &script).await
    }
}

fn disk_number(device: &str) -> Result<u32> {
    let trimmed = device
        .trim()
        .trim_start_matches(r"\\.\PhysicalDrive")
        .trim_start_matches("PhysicalDrive");
    trimmed.parse().map_err(|_| {
        Error::GenericError(format!(
            "'{device}' is not a disk number; use the number shown by diskpart's 'list disk'"
        ))
    })
}

/// `Z:` -> `Z`
fn drive_letter(volume: &str) -> Option<char> {
    let mut chars = volume.chars();
    match (chars.next(), chars.next(), chars.next()) {
        (Some(letter), Some(':'), None) if letter.is_ascii_alphabetic() => Some(letter),
        _ => None,
    }
}

fn free_drive_letter() -> Option<char> {
    CANDIDATE_LETTERS
        .chars()
        .find(|letter| !Path::new(&format!("{letter}:\\")).exists())
}

/// diskpart script that lays out the ESP and an HFS+-typed partition 2.
pub fn render_diskpart_script(disk: u32, letter: char) -> String {
    format!(
        "select disk {disk}\n\
         clean\n\
         convert gpt\n\
         create partition efi size={ESP_SIZE_MIB}\n\
         format fs=fat32 quick label={ESP_LABEL}\n\
         assign letter={letter}\n\
         create partition primary\n\
         set id={HFS_PARTITION_TYPE}\n\
         exit\n"
    )
}

impl BlockDeviceBackend for WindowsBackend {
    fn name(&self) -> &'static str {
        "windows"
    }

    fn required_tools(&self) -> &'static [&'static str] {
        TOOLS
    }

    fn installer_label_limit(&self) -> usize {
        255
    }

    async fn prepare_device(&self, _runner: &CommandRunner, device: &str) -> Result<PreparedDevice> {
        if Path::new(device).is_file() {
            return Err(Error::UnsupportedHost(
                "writing to an image file is not supported on Windows".into(),
            ));
        }
        disk_number(device)?;
        Ok(PreparedDevice {
            device: device.to_string(),
            attached: false,
        })
    }

    async fn partition(&self, runner: &CommandRunner, device: &str, _label: &str) -> Result<PartitionPaths> {
        let disk = disk_number(device)?;
        let letter = free_drive_letter()
            .ok_or_else(|| Error::GenericError("no free drive letter for the ESP".into()))?;
        self.run_script(runner, "partition", &render_diskpart_script(disk, letter))
            .await?;
        Ok(PartitionPaths {
            esp: format!("{letter}:"),
            installer: format!(r"\\.\PhysicalDrive{disk} partition 2"),
        })
    }

    async fn format_esp(&self, runner: &CommandRunner, esp: &str) -> Result<()> {
        runner.report(&format!("{esp} was formatted FAT32 by diskpart"));
        Ok(())
    }

    async fn format_installer(
        &self,
        _runner: &CommandRunner,
        _partition: &str,
        _label: &str,
    ) -> Result<Capability<()>> {
        Ok(Capability::Unsupported(UNSUPPORTED.into()))
    }

    async fn write_raw_image(
        &self,
        _runner: &CommandRunner,
        _image: &Path,
        _partition: &str,
    ) -> Result<Capability<()>> {
        Ok(Capability::Unsupported(UNSUPPORTED.into()))
    }

    async fn mount(
        &self,
        _runner: &CommandRunner,
        partition: &str,
        role: PartitionRole,
        _mount_point: &Path,
    ) -> Result<Capability<PathBuf>> {
        match role {
            PartitionRole::Esp => Ok(Capability::Done(PathBuf::from(format!("{partition}\\")))),
            PartitionRole::Installer => Ok(Capability::Unsupported(UNSUPPORTED.into())),
        }
    }

    async fn unmount(&self, _runner: &CommandRunner, _mount_point: &Path) -> Result<()> {
        Ok(())
    }

    /// Only drive letters are ever registered; image files are rejected up front.
    async fn detach(&self, runner: &CommandRunner, device: &str) -> Result<()> {
        match drive_letter(device) {
            Some(letter) => self.remove_letter(runner, letter).await,
            None => Ok(()),
        }
    }

    fn partition_handle(&self, partitions: &PartitionPaths) -> Option<String> {
        drive_letter(&partitions.esp).map(|_| partitions.esp.clone())
    }

    async fn release(&self, runner: &CommandRunner, _device: &str, partitions: &PartitionPaths) -> Result<()> {
        match drive_letter(&partitions.esp) {
            Some(letter) => self.remove_letter(runner, letter).await,
            None => Ok(()),
        }
    }
}

/// Steps the operator performs by hand after a Windows run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManualGuide {
    pub disk: String,
    pub partition_number: u32,
    /// Extracted BaseSystem HFS+ image
    pub image: PathBuf,
    /// Raw write command template
    pub dd_command: String,
    /// `source -> destination` copies onto the installer partition
    pub files: Vec<String>,
}

impl ManualGuide {
    pub fn new(disk: &str, image: PathBuf, files: Vec<String>) -> Self {
        let number = disk_number(disk)
            .map(|n| n.to_string())
            .unwrap_or_else(|_| disk.to_string());
        let dd_command = format!(
            r#"dd if="{}" of=\\?\Device\Harddisk{}\Partition2 bs=4M --progress"#,
            image.display(),
            number
        );
        Self {
            disk: disk.to_string(),
            partition_number: 2,
            image,
            dd_command,
            files,
        }
    }
}

impl fmt::Display for ManualGuide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "The EFI partition is ready. Finish the installer partition manually:")?;
        writeln!(
            f,
            "1. Write the BaseSystem image to partition {} of disk {} with an HFS+-capable raw writer, e.g.:",
            self.partition_number, self.disk
        )?;
        writeln!(f, "     {}", self.dd_command)?;
        writeln!(f, "   Image: {}", self.image.display())?;
        writeln!(
            f,
            "2. Using an HFS+-capable tool (such as HFSExplorer or TransMac), copy onto that partition:"
        )?;
        for file in &self.files {
            writeln!(f, "     {file}")?;
        }
        write!(f, "Do not format partition {} from Windows.", self.partition_number)
    }
}
