//! Formant ceiling sweep over every configured subject.
//!
//! Usage: `optimize_ceilings [config.toml]`

use perturb_tracks::{ceiling, logging, RunConfig};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    if let Err(err) = logging::init() {
        eprintln!("Logging disabled: {err}");
    }

    let config = RunConfig::from_args()?;
    let sweeps = ceiling::run(&config)?;
    let undefined = sweeps.iter().filter(|s| s.optimal.is_none()).count();
    tracing::info!(
        "Swept {} subjects ({} without a valid ceiling)",
        sweeps.len(),
        undefined
    );
    Ok(())
}
