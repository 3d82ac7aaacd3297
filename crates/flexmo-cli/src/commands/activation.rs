use std::path::Path;

use anyhow::{Context, Result};
use flexmo_algo::BidStrategy;
use flexmo_core::Direction;
use flexmo_ts::MarketFrame;
use serde::Serialize;
use tracing::info;

use super::print_json;

#[derive(Serialize)]
struct ActivationReport {
    output: String,
    direction: &'static str,
    intervals: usize,
    activated_intervals: usize,
    mean_factor: f64,
}

/// Output column of the activation profile.
pub fn profile_column(direction: Direction) -> String {
    format!("Bid_Activation_{}", direction.as_str())
}

pub fn handle(
    market_data: &Path,
    direction: Direction,
    strategy: &BidStrategy,
    output: &Path,
) -> Result<()> {
    let frame = MarketFrame::read_csv(market_data)
        .with_context(|| format!("reading {}", market_data.display()))?;
    let profile = strategy.profile_from_frame(&frame, direction)?;

    let activated = profile.iter().filter(|f| **f > 0.0).count();
    let mean = if profile.is_empty() {
        0.0
    } else {
        profile.iter().sum::<f64>() / profile.len() as f64
    };

    let mut out = MarketFrame::new(frame.timestamps().to_vec());
    out.insert(profile_column(direction), profile)?;
    out.write_csv(output)?;
    info!(
        output = %output.display(),
        seed = strategy.seed,
        activated,
        "wrote activation profile"
    );

    print_json(&ActivationReport {
        output: output.display().to_string(),
        direction: direction.as_str(),
        intervals: out.len(),
        activated_intervals: activated,
        mean_factor: mean,
    })
}
