//! Onset-aligned track extraction, aggregation and differences.
//!
//! Usage: `extract_tracks [config.toml]`

use perturb_tracks::{extract, logging, RunConfig};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    if let Err(err) = logging::init() {
        eprintln!("Logging disabled: {err}");
    }

    let config = RunConfig::from_args()?;
    extract::run(&config)?;
    Ok(())
}
