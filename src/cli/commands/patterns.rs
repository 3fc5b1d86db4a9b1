//! `sentryfs patterns` - list the compiled detection rule catalog.

use crate::config::ContentScanningConfig;
use crate::patterns::PatternLibrary;
use anyhow::Result;

pub fn execute(config: ContentScanningConfig) -> Result<()> {
    config.validate()?;
    let library = PatternLibrary::from_config(&config)?;

    println!("{:<24} {:<10} {:<9} description", "name", "category", "severity");
    for pattern in library.patterns() {
        println!(
            "{:<24} {:<10} {:<9} {}",
            pattern.name, pattern.category, pattern.severity, pattern.description
        );
    }
    println!("\n{} rule(s) enabled", library.patterns().len());
    Ok(())
}
