//! Figures of the saved aggregates.
//!
//! Usage: `plot_tracks [config.toml]`

use perturb_tracks::{logging, plot, RunConfig};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    if let Err(err) = logging::init() {
        eprintln!("Logging disabled: {err}");
    }

    let config = RunConfig::from_args()?;
    plot::run(&config)?;
    Ok(())
}
