//! Scenario files for `flexmo optimize`.
//!
//! ```toml
//! dt_hours = 0.25
//!
//! [asset.battery]
//! p_max = 1.0
//! e_max = 2.0
//!
//! [reserve]
//! market_block_size = 16
//! enable_fcr = true
//!
//! [activation.pos]
//! bid_price = 80.0
//! bid_capacity = 1.0
//!
//! [solver]
//! kind = "clarabel"
//! ```
//!
//! A fleet scenario names both assets, an optional shared grid limit and
//! per-asset bid strategies that override the shared ones:
//!
//! ```toml
//! [asset]
//! grid_limit = 3.0
//! heat_demand = { constant = 1.0 }
//!
//! [asset.battery]
//! p_max = 1.0
//! e_max = 2.0
//!
//! [asset.power_to_heat]
//! p_max = 2.0
//!
//! [activation.power_to_heat.neg]
//! bid_price = -20.0
//! bid_capacity = 2.0
//! ```

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use flexmo_algo::{
    ActivationFactor, BatterySpec, BidStrategy, PowerToHeatSpec, ReserveConfig, SolverSettings,
};
use flexmo_core::{
    Direction, FlexError, AFRR_DURATION_HOURS, DEFAULT_BLOCK_SIZE, DEFAULT_DT_HOURS, FCR_DURATION_HOURS,
};
use flexmo_ts::MarketFrame;
use serde::{Deserialize, Serialize};

fn default_dt() -> f64 {
    DEFAULT_DT_HOURS
}

fn default_block_size() -> usize {
    DEFAULT_BLOCK_SIZE
}

fn default_fcr_duration() -> f64 {
    FCR_DURATION_HOURS
}

fn default_afrr_duration() -> f64 {
    AFRR_DURATION_HOURS
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScenarioConfig {
    #[serde(default = "default_dt")]
    pub dt_hours: f64,
    #[serde(default)]
    pub asset: AssetConfig,
    #[serde(default)]
    pub reserve: ReserveSection,
    #[serde(default)]
    pub activation: ActivationSection,
    #[serde(default)]
    pub solver: SolverSettings,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            dt_hours: DEFAULT_DT_HOURS,
            asset: AssetConfig::default(),
            reserve: ReserveSection::default(),
            activation: ActivationSection::default(),
            solver: SolverSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AssetConfig {
    #[serde(default)]
    pub battery: Option<BatterySpec>,
    #[serde(default)]
    pub power_to_heat: Option<PowerToHeatSpec>,
    #[serde(default)]
    pub heat_demand: Option<HeatDemand>,
    /// Connection limit shared by all assets of a fleet (MW); falls back to
    /// the battery's own limit
    #[serde(default)]
    pub grid_limit: Option<f64>,
}

/// Asset whose reserve inputs are being assembled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetKind {
    Battery,
    PowerToHeat,
}

impl AssetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetKind::Battery => "battery",
            AssetKind::PowerToHeat => "power_to_heat",
        }
    }
}

/// Heat demand of a power-to-heat site (MW thermal).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeatDemand {
    Constant(f64),
    /// Column of the market-data file
    Column(String),
}

impl HeatDemand {
    pub fn profile(&self, frame: &MarketFrame) -> Result<Vec<f64>> {
        match self {
            HeatDemand::Constant(value) => Ok(vec![*value; frame.len()]),
            HeatDemand::Column(name) => frame
                .column(name)
                .map(<[f64]>::to_vec)
                .with_context(|| format!("heat demand column '{name}' not found in market data")),
        }
    }
}

/// `[reserve]` table. Prices always come from the market data; activation
/// factors default to the observed activation ratios.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReserveSection {
    #[serde(default = "default_block_size")]
    pub market_block_size: usize,
    #[serde(default = "default_fcr_duration")]
    pub fcr_duration: f64,
    #[serde(default = "default_afrr_duration")]
    pub afrr_duration: f64,
    #[serde(default = "default_true")]
    pub enable_fcr: bool,
    #[serde(default = "default_true")]
    pub enable_afrr_pos: bool,
    #[serde(default = "default_true")]
    pub enable_afrr_neg: bool,
    #[serde(default)]
    pub activation_factor_pos: Option<ActivationFactor>,
    #[serde(default)]
    pub activation_factor_neg: Option<ActivationFactor>,
}

impl Default for ReserveSection {
    fn default() -> Self {
        Self {
            market_block_size: DEFAULT_BLOCK_SIZE,
            fcr_duration: FCR_DURATION_HOURS,
            afrr_duration: AFRR_DURATION_HOURS,
            enable_fcr: true,
            enable_afrr_pos: true,
            enable_afrr_neg: true,
            activation_factor_pos: None,
            activation_factor_neg: None,
        }
    }
}

/// Bid strategy per aFRR direction.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BidStrategies {
    #[serde(default)]
    pub pos: Option<BidStrategy>,
    #[serde(default)]
    pub neg: Option<BidStrategy>,
}

impl BidStrategies {
    fn get(&self, direction: Direction) -> Option<&BidStrategy> {
        match direction {
            Direction::Pos => self.pos.as_ref(),
            Direction::Neg => self.neg.as_ref(),
        }
    }
}

/// `[activation]` table: bid strategies whose activation profile replaces
/// the observed ratios. `[activation.battery]` and
/// `[activation.power_to_heat]` override the shared strategies for one asset.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ActivationSection {
    #[serde(default)]
    pub pos: Option<BidStrategy>,
    #[serde(default)]
    pub neg: Option<BidStrategy>,
    #[serde(default)]
    pub battery: Option<BidStrategies>,
    #[serde(default)]
    pub power_to_heat: Option<BidStrategies>,
}

impl ActivationSection {
    fn strategy(&self, asset: AssetKind, direction: Direction) -> Option<&BidStrategy> {
        let own = match asset {
            AssetKind::Battery => self.battery.as_ref(),
            AssetKind::PowerToHeat => self.power_to_heat.as_ref(),
        };
        own.and_then(|s| s.get(direction)).or(match direction {
            Direction::Pos => self.pos.as_ref(),
            Direction::Neg => self.neg.as_ref(),
        })
    }
}

impl ScenarioConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading scenario '{}'", path.display()))?;
        Self::from_toml(&text).with_context(|| format!("parsing scenario '{}'", path.display()))
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(text).map_err(|e| FlexError::Config(e.to_string()))?;
        if !(config.dt_hours.is_finite() && config.dt_hours > 0.0) {
            return Err(FlexError::Config(format!(
                "dt_hours must be positive, got {}",
                config.dt_hours
            ))
            .into());
        }
        if let Some(limit) = config.asset.grid_limit {
            if !(limit.is_finite() && limit > 0.0) {
                return Err(FlexError::Config(format!(
                    "asset.grid_limit must be positive, got {limit}"
                ))
                .into());
            }
        }
        Ok(config)
    }

    pub fn battery(&self) -> Result<&BatterySpec> {
        self.asset
            .battery
            .as_ref()
            .context("scenario has no [asset.battery] table")
    }

    pub fn power_to_heat(&self) -> Result<(&PowerToHeatSpec, &HeatDemand)> {
        let spec = self
            .asset
            .power_to_heat
            .as_ref()
            .context("scenario has no [asset.power_to_heat] table")?;
        let demand = self
            .asset
            .heat_demand
            .as_ref()
            .context("scenario has no asset.heat_demand entry")?;
        Ok((spec, demand))
    }

    /// Battery, power-to-heat unit, heat demand and connection limit of a
    /// fleet scenario.
    pub fn fleet(&self) -> Result<(&BatterySpec, &PowerToHeatSpec, &HeatDemand, Option<f64>)> {
        let (battery, power_to_heat) = match (&self.asset.battery, &self.asset.power_to_heat) {
            (Some(battery), Some(power_to_heat)) => (battery, power_to_heat),
            _ => {
                return Err(FlexError::Config(
                    "a fleet needs both [asset.battery] and [asset.power_to_heat]".to_string(),
                )
                .into())
            }
        };
        let (_, demand) = self.power_to_heat()?;
        let grid_limit = self.asset.grid_limit.or(battery.grid_limit);
        Ok((battery, power_to_heat, demand, grid_limit))
    }

    /// Reserve inputs of `asset` for `frame`. Activation factors are taken
    /// from the asset's bid strategy, else the shared one, else the explicit
    /// factor, else the frame's observed ratios.
    pub fn reserve_config(
        &self,
        frame: &MarketFrame,
        asset: AssetKind,
        p_max: f64,
        e_max: f64,
    ) -> Result<ReserveConfig> {
        let section = &self.reserve;
        let mut config = ReserveConfig::from_market_frame(frame, p_max, e_max);
        config.market_block_size = section.market_block_size;
        config.fcr_duration = section.fcr_duration;
        config.afrr_duration = section.afrr_duration;
        config.enable_fcr = section.enable_fcr;
        config.enable_afrr_pos = section.enable_afrr_pos;
        config.enable_afrr_neg = section.enable_afrr_neg;

        for direction in Direction::BOTH {
            let explicit = match direction {
                Direction::Pos => &section.activation_factor_pos,
                Direction::Neg => &section.activation_factor_neg,
            };
            let factor = match (self.activation.strategy(asset, direction), explicit) {
                (Some(strategy), _) => {
                    ActivationFactor::Series(strategy.profile_from_frame(frame, direction)?)
                }
                (None, Some(factor)) => factor.clone(),
                (None, None) => continue,
            };
            match direction {
                Direction::Pos => config.activation_factor_pos = factor,
                Direction::Neg => config.activation_factor_neg = factor,
            }
        }
        Ok(config)
    }
}
