//! # Hero Sim
//!
//! Headless duel between a scripted hero and NPC opponents, driving the
//! combat core the way a game host would:
//! - Scenario: hero and NPC definitions loaded from TOML or RON
//! - Clock: fixed-step accumulator
//! - Animation: clip player feeding the attack windows
//! - Logging: combat events through `tracing`
//!
//! Usage: `hero-sim [scenario.toml|scenario.ron]`. Without an argument the
//! built-in duel runs.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]

mod animation;
mod app;
mod config;
mod hero;
mod timing;

use anyhow::{Context, Result};
use config::ScenarioConfig;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Main entry point.
fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("hero=info".parse()?))
        .init();

    info!("Hero sim starting...");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config = match std::env::args().nth(1) {
        Some(path) => ScenarioConfig::load_from(&path).with_context(|| format!("loading scenario {path}"))?,
        None => {
            info!("No scenario given, running the built-in duel");
            ScenarioConfig::default()
        },
    };

    let (outcome, _) = app::run(&config)?;

    info!("Hero sim finished: {:?}", outcome);
    Ok(())
}
