//! Expected activation of an aFRR bid.
//!
//! A bid is called when the market clears above its energy price. The call
//! is derated when the market-wide activated volume is smaller than the bid
//! capacity. Exact price ties are decided by a seeded coin flip, so the
//! profile is reproducible for a given seed.

use flexmo_core::{columns, Direction, FlexError, FlexResult};
use flexmo_ts::MarketFrame;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

pub const DEFAULT_SEED: u64 = 42;

/// Strategy of one directional bid.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BidStrategy {
    /// Energy price of the bid (€/MWh)
    pub bid_price: f64,
    /// Offered power (MW)
    pub bid_capacity: f64,
    #[serde(default = "default_seed")]
    pub seed: u64,
}

fn default_seed() -> u64 {
    DEFAULT_SEED
}

impl BidStrategy {
    pub fn new(bid_price: f64, bid_capacity: f64) -> Self {
        Self {
            bid_price,
            bid_capacity,
            seed: DEFAULT_SEED,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn profile(&self, clearing_prices: &[f64], activated_mw: &[f64]) -> FlexResult<Vec<f64>> {
        activation_profile(
            clearing_prices,
            activated_mw,
            self.bid_price,
            self.bid_capacity,
            self.seed,
        )
    }

    /// Profile for one direction of a fused market frame: the direction's
    /// energy price against its market-wide activated volume.
    pub fn profile_from_frame(
        &self,
        frame: &MarketFrame,
        direction: Direction,
    ) -> FlexResult<Vec<f64>> {
        let prices = frame.column_or_zero(columns::energy_price(direction));
        let volumes = frame.column_or_zero(columns::activation_mw(direction));
        self.profile(&prices, &volumes)
    }
}

/// Per-interval activation factor in `[0, 1]`.
///
/// `planned` is 1 when `clear > bid`, 0 when `clear < bid`, and a fair coin
/// on a tie. A planned call delivers `|V| / P_bid` when the market-wide
/// volume `|V|` is below the bid capacity, else 1. Intervals without a
/// finite clearing price or volume are never activated.
pub fn activation_profile(
    clearing_prices: &[f64],
    activated_mw: &[f64],
    bid_price: f64,
    bid_capacity: f64,
    seed: u64,
) -> FlexResult<Vec<f64>> {
    if bid_capacity.is_nan() || bid_capacity <= 0.0 {
        return Err(FlexError::BadInput(format!(
            "bid capacity must be positive, got {bid_capacity}"
        )));
    }
    if !bid_price.is_finite() {
        return Err(FlexError::BadInput(format!(
            "bid price must be finite, got {bid_price}"
        )));
    }
    if clearing_prices.len() != activated_mw.len() {
        return Err(FlexError::BadInput(format!(
            "{} clearing prices but {} activation volumes",
            clearing_prices.len(),
            activated_mw.len()
        )));
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let factors = clearing_prices
        .iter()
        .zip(activated_mw)
        .map(|(&clear, &volume)| {
            if !clear.is_finite() || !volume.is_finite() {
                return 0.0;
            }
            let planned = if clear > bid_price {
                true
            } else if clear < bid_price {
                false
            } else {
                rng.gen_bool(0.5)
            };
            if !planned {
                return 0.0;
            }
            let available = volume.abs();
            if available < bid_capacity {
                available / bid_capacity
            } else {
                1.0
            }
        })
        .collect();
    Ok(factors)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn volume_derates_planned_calls() {
        let factors = activation_profile(&[20.0, 20.0, 5.0], &[2.0, 10.0, 10.0], 10.0, 5.0, 42)
            .unwrap();
        assert!((factors[0] - 0.4).abs() < 1e-12);
        assert_eq!(factors[1], 1.0);
        assert_eq!(factors[2], 0.0);
    }

    #[test]
    fn negative_volumes_count_by_magnitude() {
        let factors = activation_profile(&[20.0], &[-2.5], 10.0, 5.0, 42).unwrap();
        assert_eq!(factors, vec![0.5]);
    }

    #[test]
    fn ties_are_reproducible_per_seed() {
        let prices = vec![10.0; 64];
        let volumes = vec![100.0; 64];
        let a = activation_profile(&prices, &volumes, 10.0, 5.0, 7).unwrap();
        let b = activation_profile(&prices, &volumes, 10.0, 5.0, 7).unwrap();
        assert_eq!(a, b);
        assert!(a.iter().all(|f| *f == 0.0 || *f == 1.0));
        assert!(a.contains(&0.0) && a.contains(&1.0));
    }

    #[test]
    fn missing_prices_are_never_activated() {
        let prices = vec![f64::NAN, f64::INFINITY, 20.0, 10.0];
        let volumes = vec![10.0, 10.0, f64::NAN, 10.0];
        for seed in 0..16 {
            let factors = activation_profile(&prices, &volumes, 10.0, 5.0, seed).unwrap();
            assert_eq!(&factors[..3], &[0.0, 0.0, 0.0]);
        }
        // A NaN price must not consume a draw: the tie keeps its outcome.
        let with_gap = activation_profile(&prices, &volumes, 10.0, 5.0, 3).unwrap();
        let tie_only = activation_profile(&[10.0], &[10.0], 10.0, 5.0, 3).unwrap();
        assert_eq!(with_gap[3], tie_only[0]);
    }

    #[test]
    fn invalid_inputs_are_rejected() {
        assert!(matches!(
            activation_profile(&[1.0], &[1.0], 10.0, 0.0, 42),
            Err(FlexError::BadInput(_))
        ));
        assert!(matches!(
            activation_profile(&[1.0, 2.0], &[1.0], 10.0, 5.0, 42),
            Err(FlexError::BadInput(_))
        ));
        assert!(matches!(
            activation_profile(&[1.0], &[1.0], f64::NAN, 5.0, 42),
            Err(FlexError::BadInput(_))
        ));
    }
}
