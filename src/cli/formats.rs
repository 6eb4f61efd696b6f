//! CLI handler listing per-platform recording formats.

use crate::audio::{format_for, Platform};
use anyhow::Result;

pub fn handle_formats_command() -> Result<()> {
    let current = Platform::current();

    println!("{:<10} {:<6} {:>8} {:>3} {:>5}", "PLATFORM", "EXT", "RATE", "CH", "BITS");
    for platform in Platform::all() {
        let format = format_for(platform);
        let marker = if platform == current { " *" } else { "" };
        println!(
            "{:<10} {:<6} {:>8} {:>3} {:>5}{}",
            platform.as_str(),
            format.extension,
            format.sample_rate,
            format.channels,
            format.bits_per_sample,
            marker
        );
    }

    println!("\n* current platform");
    Ok(())
}
