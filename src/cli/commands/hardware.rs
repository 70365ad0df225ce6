//! `hardware`: print what the enhancer would see.

use crate::{
    cli::{HardwareArgs, RuntimeConfig},
    error::Result,
    installer::hardware::{HardwareSnapshot, host_probe},
};

pub fn execute(args: &HardwareArgs, runtime_config: &RuntimeConfig) -> Result<i32> {
    let probe = host_probe();
    let snapshot = probe.snapshot();

    if args.json {
        runtime_config.println(&serde_json::to_string_pretty(&snapshot)?)?;
        return Ok(0);
    }

    if !probe.is_capable() {
        runtime_config.warn(&format!(
            "Hardware detection is not available on {}",
            std::env::consts::OS
        ))?;
        return Ok(0);
    }
    print_snapshot(&snapshot, runtime_config)?;
    Ok(0)
}

fn print_snapshot(snapshot: &HardwareSnapshot, runtime_config: &RuntimeConfig) -> std::io::Result<()> {
    runtime_config.section("PCI devices")?;
    if snapshot.pci_devices.is_empty() {
        runtime_config.indent("(none detected)")?;
    }
    for device in &snapshot.pci_devices {
        runtime_config.indent(&format!(
            "{:<12} [{}] {}",
            format!("{:?}", device.category),
            device.key(),
            device.description
        ))?;
    }

    runtime_config.section("Audio codecs")?;
    if snapshot.audio_codecs.is_empty() {
        runtime_config.indent("(none detected)")?;
    }
    for codec in &snapshot.audio_codecs {
        runtime_config.indent(codec)?;
    }

    runtime_config.section("CPU")?;
    for (key, value) in &snapshot.cpu {
        if key == "Flags" {
            runtime_config.verbose_println(&format!("{key}: {value}"))?;
        } else {
            runtime_config.indent(&format!("{key}: {value}"))?;
        }
    }
    Ok(())
}
