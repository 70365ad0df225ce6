//! macOS USB Builder - bootable macOS installer drives with an OpenCore EFI.
//!
//! This binary partitions a USB target, writes the BaseSystem image and the
//! installer assets, and deploys an EFI folder tuned to the host hardware.

use macos_usb_builder::cli;
use std::process;

#[tokio::main]
async fn main() {
    // Initialize logging
    env_logger::init();

    // Run CLI and get exit code
    let exit_code = match cli::run().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {}", e);
            for suggestion in e.recovery_suggestions() {
                eprintln!("  hint: {}", suggestion);
            }
            1
        }
    };

    process::exit(exit_code);
}
