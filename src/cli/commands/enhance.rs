//! `enhance`: tune a config.plist in place.

use crate::{
    cli::{EnhanceArgs, RuntimeConfig},
    error::Result,
    installer::{
        hardware::{HardwareSnapshot, StaticProbe},
        plist::PlistEnhancer,
    },
};

pub fn execute(args: &EnhanceArgs, runtime_config: &RuntimeConfig) -> Result<i32> {
    let enhancer = match &args.hardware {
        Some(path) => {
            runtime_config.verbose_println(&format!("Replaying hardware snapshot {}", path.display()))?;
            let snapshot: HardwareSnapshot = serde_json::from_str(&std::fs::read_to_string(path)?)?;
            PlistEnhancer::new(Box::new(StaticProbe(snapshot)))
        }
        None => PlistEnhancer::for_host(),
    };

    runtime_config.progress(&format!("Enhancing {}", args.plist.display()))?;
    let sink = runtime_config.progress_sink();
    let outcome = match enhancer.enhance(&args.plist, args.version, &sink) {
        Ok(outcome) => outcome,
        Err(e) if e.is_critical() => {
            runtime_config.error(&format!("CRITICAL: {e}"))?;
            return Ok(2);
        }
        Err(e) => return Err(e.into()),
    };

    if !outcome.hardware_detected {
        runtime_config.warn("Hardware detection unavailable; nothing was tuned")?;
    }
    if outcome.is_modified() {
        for change in &outcome.changes {
            runtime_config.indent(&format!("- {change}"))?;
        }
        runtime_config.success(&format!(
            "Applied {} change(s) to {}",
            outcome.changes.len(),
            args.plist.display()
        ))?;
    } else {
        runtime_config.success("No changes needed")?;
    }
    Ok(0)
}
