//! macOS: diskutil, hdiutil and dd.

use super::{
    BlockDeviceBackend, Capability, ESP_LABEL, ESP_SIZE_MIB, PartitionPaths, PartitionRole,
    PreparedDevice,
};
use crate::installer::{
    error::{Error, Result},
    process::{CommandRunner, Interruptible},
};
use plist::{Dictionary, Value};
use std::path::{Path, PathBuf};

const TOOLS: &[&str] = &["diskutil", "hdiutil", "dd"];

#[derive(Debug, Clone, Copy, Default)]
pub struct MacOsBackend;

/// Partition whose volume name or content type equals `wanted`, from
/// `diskutil list -plist <disk>` output.
pub fn find_partition_in_diskutil_plist(bytes: &[u8], disk: &str, wanted: &str) -> Option<String> {
    let disk_id = disk.trim_start_matches("/dev/");
    let root = plist::from_bytes::<Value>(bytes).ok()?;
    let root = root.as_dictionary()?;
    let wanted = wanted.trim().to_lowercase();

    // Older diskutil versions describe a single disk at the root.
    let disks: Vec<&Dictionary> = match root.get("AllDisksAndPartitions").and_then(Value::as_array) {
        Some(entries) => entries.iter().filter_map(Value::as_dictionary).collect(),
        None => vec![root],
    };

    disks
        .into_iter()
        .filter(|d| d.get("DeviceIdentifier").and_then(Value::as_string) == Some(disk_id))
        .filter_map(|d| d.get("Partitions").and_then(Value::as_array))
        .flatten()
        .filter_map(Value::as_dictionary)
        .find_map(|part| {
            let id = part.get("DeviceIdentifier").and_then(Value::as_string)?;
            let matches = |key: &str| {
                part.get(key)
                    .and_then(Value::as_string)
                    .is_some_and(|v| v.trim().to_lowercase() == wanted)
            };
            (matches("VolumeName") || matches("Content")).then(|| format!("/dev/{id}"))
        })
}

/// `/dev/disk4s2` to the unbuffered `/dev/rdisk4s2`.
fn raw_node(partition: &str) -> String {
    match partition.strip_prefix("/dev/disk") {
        Some(rest) => format!("/dev/rdisk{rest}"),
        None => partition.to_string(),
    }
}

impl MacOsBackend {
    async fn locate(&self, runner: &CommandRunner, device: &str, wanted: &str, number: u32) -> String {
        let fallback = format!("{device}s{number}");
        if runner.is_dry_run() {
            return fallback;
        }
        let listing = runner.output("diskutil", &["list", "-plist", device]).await;
        match listing {
            Ok(out) => match find_partition_in_diskutil_plist(out.stdout.as_bytes(), device, wanted) {
                Some(found) => {
                    runner.report(&format!("Found partition '{wanted}' at {found}"));
                    found
                }
                None => {
                    log::debug!("'{}' not listed on {}; assuming {}", wanted, device, fallback);
                    fallback
                }
            },
            Err(e) => {
                log::warn!("diskutil list {} failed: {}", device, e);
                fallback
            }
        }
    }
}

impl BlockDeviceBackend for MacOsBackend {
    fn name(&self) -> &'static str {
        "macos"
    }

    fn required_tools(&self) -> &'static [&'static str] {
        TOOLS
    }

    fn installer_label_limit(&self) -> usize {
        255
    }

    async fn prepare_device(&self, runner: &CommandRunner, device: &str) -> Result<PreparedDevice> {
        if Path::new(device).is_file() {
            runner.report(&format!("{device} is an image file; attaching it with hdiutil"));
            let out = runner
                .output(
                    "hdiutil",
                    &["attach", "-nomount", "-imagekey", "diskimage-class=CRawDiskImage", device],
                )
                .await?;
            let attached = out
                .stdout
                .lines()
                .filter_map(|line| line.split_whitespace().next())
                .find(|node| node.starts_with("/dev/disk"))
                .map(str::to_string);
            let device = match attached {
                Some(node) => node,
                None if runner.is_dry_run() => "/dev/disk99".to_string(),
                None => {
                    return Err(Error::GenericError(format!(
                        "hdiutil did not report a device for {device}: {}",
                        out.stdout.trim()
                    )));
                }
            };
            return Ok(PreparedDevice {
                device,
                attached: true,
            });
        }

        runner
            .output("diskutil", &["unmountDisk", "force", device])
            .await?;
        Ok(PreparedDevice {
            device: device.to_string(),
            attached: false,
        })
    }

    async fn partition(&self, runner: &CommandRunner, device: &str, label: &str) -> Result<PartitionPaths> {
        let esp_size = format!("{}MiB", ESP_SIZE_MIB + 1);
        runner
            .stream(
                "diskutil",
                &[
                    "partitionDisk",
                    device,
                    "GPT",
                    "MS-DOS FAT32",
                    ESP_LABEL,
                    esp_size.as_str(),
                    "JHFS+",
                    label,
                    "0b",
                ],
                Interruptible::No,
            )
            .await?;

        let paths = PartitionPaths {
            esp: self.locate(runner, device, ESP_LABEL, 1).await,
            installer: self.locate(runner, device, label, 2).await,
        };
        if !runner.is_dry_run()
            && !(Path::new(&paths.esp).exists() && Path::new(&paths.installer).exists())
        {
            return Err(Error::PartitionsNotFound {
                device: device.to_string(),
            });
        }
        Ok(paths)
    }

    async fn format_esp(&self, runner: &CommandRunner, esp: &str) -> Result<()> {
        runner.report(&format!("{esp} was formatted FAT32 by partitionDisk"));
        Ok(())
    }

    async fn format_installer(
        &self,
        runner: &CommandRunner,
        partition: &str,
        _label: &str,
    ) -> Result<Capability<()>> {
        runner.report(&format!("{partition} was formatted JHFS+ by partitionDisk"));
        Ok(Capability::Done(()))
    }

    async fn write_raw_image(
        &self,
        runner: &CommandRunner,
        image: &Path,
        partition: &str,
    ) -> Result<Capability<()>> {
        if let Err(e) = runner.output("diskutil", &["unmount", "force", partition]).await {
            log::debug!("{} was not mounted: {}", partition, e);
        }
        let input = format!("if={}", image.display());
        let output = format!("of={}", raw_node(partition));
        runner
            .stream("dd", &[input.as_str(), output.as_str(), "bs=4m"], Interruptible::No)
            .await?;
        Ok(Capability::Done(()))
    }

    async fn mount(
        &self,
        runner: &CommandRunner,
        partition: &str,
        _role: PartitionRole,
        mount_point: &Path,
    ) -> Result<Capability<PathBuf>> {
        let target = mount_point.display().to_string();
        runner
            .output("diskutil", &["mount", "-mountPoint", target.as_str(), partition])
            .await?;
        Ok(Capability::Done(mount_point.to_path_buf()))
    }

    async fn unmount(&self, runner: &CommandRunner, mount_point: &Path) -> Result<()> {
        let target = mount_point.display().to_string();
        runner
            .output("diskutil", &["unmount", "force", target.as_str()])
            .await
            .map(|_| ())
    }

    async fn detach(&self, runner: &CommandRunner, device: &str) -> Result<()> {
        runner.output("hdiutil", &["detach", device]).await.map(|_| ())
    }

    async fn release(&self, runner: &CommandRunner, _device: &str, _partitions: &PartitionPaths) -> Result<()> {
        runner.output("sync", &[] as &[&str]).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<plist version="1.0">
<dict>
  <key>AllDisksAndPartitions</key>
  <array>
    <dict>
      <key>DeviceIdentifier</key><string>disk4</string>
      <key>Partitions</key>
      <array>
        <dict>
          <key>Content</key><string>EFI</string>
          <key>DeviceIdentifier</key><string>disk4s1</string>
          <key>VolumeName</key><string>EFI</string>
        </dict>
        <dict>
          <key>Content</key><string>Apple_HFS</string>
          <key>DeviceIdentifier</key><string>disk4s2</string>
          <key>VolumeName</key><string>Install macOS Sonoma</string>
        </dict>
      </array>
    </dict>
  </array>
</dict>
</plist>"#;

    #[test]
    fn finds_partitions_by_label_and_content() {
        let bytes = LISTING.as_bytes();
        assert_eq!(
            find_partition_in_diskutil_plist(bytes, "/dev/disk4", "install macos sonoma").as_deref(),
            Some("/dev/disk4s2")
        );
        assert_eq!(
            find_partition_in_diskutil_plist(bytes, "disk4", "Apple_HFS").as_deref(),
            Some("/dev/disk4s2")
        );
        assert_eq!(find_partition_in_diskutil_plist(bytes, "disk5", "EFI"), None);
    }

    #[test]
    fn raw_nodes_use_rdisk() {
        assert_eq!(raw_node("/dev/disk4s2"), "/dev/rdisk4s2");
    }
}
