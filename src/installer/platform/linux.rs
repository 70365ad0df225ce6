//! Linux: parted, mkfs, dd and mount.

use super::{
    BlockDeviceBackend, Capability, ESP_LABEL, ESP_SIZE_MIB, PartitionPaths, PartitionRole,
    PreparedDevice,
};
use crate::installer::{
    error::{Error, Result},
    process::{CommandRunner, Interruptible},
};
use std::{
    path::{Path, PathBuf},
    time::Duration,
};

const TOOLS: &[&str] = &[
    "parted",
    "partprobe",
    "lsblk",
    "losetup",
    "mkfs.vfat",
    "mkfs.hfsplus",
    "dd",
    "mount",
    "umount",
];

const DISCOVERY_ATTEMPTS: u32 = 5;

#[derive(Debug, Clone, Copy, Default)]
pub struct LinuxBackend;

/// Node of partition `number` on `device`: `sdb1`, `nvme0n1p1`, `loop0p1`.
pub fn partition_node(device: &str, number: u32) -> String {
    if device.chars().last().is_some_and(|c| c.is_ascii_digit()) {
        format!("{device}p{number}")
    } else {
        format!("{device}{number}")
    }
}

/// `part` entries of `lsblk -lnpo NAME,TYPE` in listing order.
pub fn parse_lsblk_partitions(output: &str) -> Vec<String> {
    output
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let name = fields.next()?;
            (fields.next()? == "part").then(|| name.to_string())
        })
        .collect()
}

impl LinuxBackend {
    async fn discover(&self, runner: &CommandRunner, device: &str) -> Result<PartitionPaths> {
        let fallback = PartitionPaths {
            esp: partition_node(device, 1),
            installer: partition_node(device, 2),
        };
        if runner.is_dry_run() {
            return Ok(fallback);
        }

        for attempt in 1..=DISCOVERY_ATTEMPTS {
            let listed = runner
                .output_unchecked("lsblk", &["-lnpo", "NAME,TYPE", device])
                .await
                .map(|out| parse_lsblk_partitions(&out.stdout))
                .unwrap_or_default();
            if let [esp, installer, ..] = listed.as_slice() {
                return Ok(PartitionPaths {
                    esp: esp.clone(),
                    installer: installer.clone(),
                });
            }
            if Path::new(&fallback.esp).exists() && Path::new(&fallback.installer).exists() {
                return Ok(fallback);
            }
            log::debug!("Partitions on {} not visible yet (attempt {})", device, attempt);
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
        Err(Error::PartitionsNotFound {
            device: device.to_string(),
        })
    }
}

impl BlockDeviceBackend for LinuxBackend {
    fn name(&self) -> &'static str {
        "linux"
    }

    fn required_tools(&self) -> &'static [&'static str] {
        TOOLS
    }

    fn installer_label_limit(&self) -> usize {
        255
    }

    async fn prepare_device(&self, runner: &CommandRunner, device: &str) -> Result<PreparedDevice> {
        let mut prepared = PreparedDevice {
            device: device.to_string(),
            attached: false,
        };

        if Path::new(device).is_file() {
            runner.report(&format!("{device} is an image file; attaching it as a loop device"));
            let out = runner
                .output("losetup", &["--find", "--show", "--partscan", device])
                .await?;
            let loop_dev = out.stdout.trim();
            prepared.device = if loop_dev.is_empty() {
                // dry-run
                "/dev/loop0".to_string()
            } else {
                loop_dev.to_string()
            };
            prepared.attached = true;
            return Ok(prepared);
        }

        let listing = runner
            .output_unchecked("lsblk", &["-lnpo", "NAME,MOUNTPOINT", device])
            .await?;
        for line in listing.stdout.lines() {
            let mut fields = line.split_whitespace();
            if let (Some(node), Some(_mount)) = (fields.next(), fields.next()) {
                if let Err(e) = runner.output("umount", &[node]).await {
                    log::warn!("Could not unmount {}: {}", node, e);
                }
            }
        }
        Ok(prepared)
    }

    async fn partition(&self, runner: &CommandRunner, device: &str, label: &str) -> Result<PartitionPaths> {
        let esp_end = format!("{}MiB", ESP_SIZE_MIB + 1);
        let gpt_name = format!("'{label}'");
        let steps: [Vec<&str>; 4] = [
            vec!["-s", device, "mklabel", "gpt"],
            vec!["-s", device, "mkpart", ESP_LABEL, "fat32", "1MiB", esp_end.as_str()],
            vec!["-s", device, "set", "1", "esp", "on"],
            vec!["-s", device, "mkpart", gpt_name.as_str(), "hfs+", esp_end.as_str(), "100%"],
        ];
        for args in &steps {
            runner.stream("parted", args.as_slice(), Interruptible::No).await?;
        }
        // partprobe can fail on loop devices; lsblk discovery retries anyway.
        if let Err(e) = runner.output("partprobe", &[device]).await {
            log::warn!("partprobe {} failed: {}", device, e);
        }
        self.discover(runner, device).await
    }

    async fn format_esp(&self, runner: &CommandRunner, esp: &str) -> Result<()> {
        runner
            .stream("mkfs.vfat", &["-F", "32", "-n", ESP_LABEL, esp], Interruptible::No)
            .await
    }

    async fn format_installer(
        &self,
        runner: &CommandRunner,
        partition: &str,
        label: &str,
    ) -> Result<Capability<()>> {
        runner
            .stream("mkfs.hfsplus", &["-v", label, partition], Interruptible::No)
            .await?;
        Ok(Capability::Done(()))
    }

    async fn write_raw_image(
        &self,
        runner: &CommandRunner,
        image: &Path,
        partition: &str,
    ) -> Result<Capability<()>> {
        let input = format!("if={}", image.display());
        let output = format!("of={partition}");
        runner
            .stream(
                "dd",
                &[input.as_str(), output.as_str(), "bs=4M", "status=progress", "conv=fsync"],
                Interruptible::No,
            )
            .await?;
        Ok(Capability::Done(()))
    }

    async fn mount(
        &self,
        runner: &CommandRunner,
        partition: &str,
        role: PartitionRole,
        mount_point: &Path,
    ) -> Result<Capability<PathBuf>> {
        let target = mount_point.display().to_string();
        match role {
            PartitionRole::Esp => {
                runner
                    .output("mount", &["-t", "vfat", partition, target.as_str()])
                    .await?
            }
            PartitionRole::Installer => {
                runner
                    .output(
                        "mount",
                        &["-t", "hfsplus", "-o", "force,rw", partition, target.as_str()],
                    )
                    .await?
            }
        };
        Ok(Capability::Done(mount_point.to_path_buf()))
    }

    async fn unmount(&self, runner: &CommandRunner, mount_point: &Path) -> Result<()> {
        runner.output("umount", &[mount_point]).await.map(|_| ())
    }

    async fn detach(&self, runner: &CommandRunner, device: &str) -> Result<()> {
        runner.output("losetup", &["-d", device]).await.map(|_| ())
    }

    async fn release(&self, runner: &CommandRunner, _device: &str, _partitions: &PartitionPaths) -> Result<()> {
        runner.output("sync", &[] as &[&str]).await.map(|_| ())
    }
}
