//! Reserve-capacity bids on top of the energy model.
//!
//! One capacity variable `C[m][b] ≥ 0` per market and block. A bid holds for
//! all intervals of its block, while dispatch stays per interval. The
//! builder couples the bids to the asset:
//!
//! Battery, for every interval `t` in block `b`:
//!
//! ```text
//! f_in  + C_FCR + C_neg            ≤ P_max      power headroom, charging
//! f_out + C_FCR + C_pos            ≤ P_max      power headroom, discharging
//! SOC + C_FCR·τ_FCR + C_neg·τ_aFRR ≤ E_max      energy headroom
//! SOC ≥ C_FCR·τ_FCR + C_pos·τ_aFRR              energy footroom
//! f_out ≥ C_pos·α_pos                           delivery, positive
//! f_in  ≥ C_neg·α_neg                           delivery, negative
//! ```
//!
//! Flexible load (no FCR):
//!
//! ```text
//! f_in + C_neg ≤ P_max
//! f_in ≥ C_pos
//! f_in ≥ C_neg·α_neg
//! f_in ≤ P_max − C_pos·α_pos
//! ```
//!
//! The revenue `R` is returned on the [`ReserveHandle`]; the solver
//! minimises `J − R`.

use std::collections::BTreeMap;

use flexmo_core::{
    columns, BlockGrid, Direction, FlexError, FlexResult, Market, AFRR_DURATION_HOURS,
    DEFAULT_BLOCK_SIZE, FCR_DURATION_HOURS,
};
use flexmo_ts::MarketFrame;
use good_lp::{constraint, variable, Expression, Variable};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::model::EnergyModel;

/// Expected activation share, constant or per interval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ActivationFactor {
    Scalar(f64),
    Series(Vec<f64>),
}

impl Default for ActivationFactor {
    fn default() -> Self {
        ActivationFactor::Scalar(0.0)
    }
}

impl ActivationFactor {
    /// Broadcast to `n` intervals, checking length and range.
    pub fn resolve(&self, n: usize, name: &str) -> FlexResult<Vec<f64>> {
        let values = match self {
            ActivationFactor::Scalar(a) => vec![*a; n],
            ActivationFactor::Series(series) => {
                if series.len() != n {
                    return Err(FlexError::BadInput(format!(
                        "{name} has {} values but the model has {n} intervals",
                        series.len()
                    )));
                }
                series.clone()
            }
        };
        if let Some((t, a)) = values
            .iter()
            .enumerate()
            .find(|(_, a)| !(0.0..=1.0).contains(*a))
        {
            return Err(FlexError::BadInput(format!(
                "{name} must lie in [0, 1], got {a} at interval {t}"
            )));
        }
        Ok(values)
    }
}

/// Which component the bids are attached to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReserveTarget {
    /// Storage with inflow `bus -> storage` and outflow `storage -> bus`
    Battery { storage: String, bus: String },
    /// Controllable consumer with inflow `bus -> component`
    FlexibleLoad { component: String, bus: String },
}

impl ReserveTarget {
    /// Label of the component carrying the bids.
    pub fn label(&self) -> &str {
        match self {
            ReserveTarget::Battery { storage, .. } => storage,
            ReserveTarget::FlexibleLoad { component, .. } => component,
        }
    }
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

/// Reserve market inputs and switches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReserveConfig {
    #[serde(default = "default_block_size")]
    pub market_block_size: usize,
    /// Delivery horizon of FCR (h)
    #[serde(default = "default_fcr_duration")]
    pub fcr_duration: f64,
    /// Delivery horizon of aFRR (h)
    #[serde(default = "default_afrr_duration")]
    pub afrr_duration: f64,
    #[serde(default)]
    pub activation_factor_pos: ActivationFactor,
    #[serde(default)]
    pub activation_factor_neg: ActivationFactor,
    #[serde(default = "default_true")]
    pub enable_fcr: bool,
    #[serde(default = "default_true")]
    pub enable_afrr_pos: bool,
    #[serde(default = "default_true")]
    pub enable_afrr_neg: bool,
    /// FCR capacity prices (€/MW per hour)
    #[serde(default)]
    pub fcr_prices: Vec<f64>,
    #[serde(default)]
    pub afrr_pos_cap_prices: Vec<f64>,
    #[serde(default)]
    pub afrr_neg_cap_prices: Vec<f64>,
    /// aFRR energy prices (€/MWh)
    #[serde(default)]
    pub afrr_pos_energy_prices: Vec<f64>,
    #[serde(default)]
    pub afrr_neg_energy_prices: Vec<f64>,
    /// Power limit (MW)
    #[serde(default)]
    pub p_max: f64,
    /// Energy limit (MWh); unused for flexible loads
    #[serde(default)]
    pub e_max: f64,
}

impl ReserveConfig {
    /// All markets enabled, zero prices, no activation.
    pub fn new(n: usize, p_max: f64, e_max: f64) -> Self {
        Self {
            market_block_size: DEFAULT_BLOCK_SIZE,
            fcr_duration: FCR_DURATION_HOURS,
            afrr_duration: AFRR_DURATION_HOURS,
            activation_factor_pos: ActivationFactor::default(),
            activation_factor_neg: ActivationFactor::default(),
            enable_fcr: true,
            enable_afrr_pos: true,
            enable_afrr_neg: true,
            fcr_prices: vec![0.0; n],
            afrr_pos_cap_prices: vec![0.0; n],
            afrr_neg_cap_prices: vec![0.0; n],
            afrr_pos_energy_prices: vec![0.0; n],
            afrr_neg_energy_prices: vec![0.0; n],
            p_max,
            e_max,
        }
    }

    /// Prices and activation ratios taken from a fused market frame.
    pub fn from_market_frame(frame: &MarketFrame, p_max: f64, e_max: f64) -> Self {
        Self {
            fcr_prices: frame.column_or_zero(columns::FCR_CAP_PRICE),
            afrr_pos_cap_prices: frame.column_or_zero(columns::AFRR_POS_CAP_PRICE),
            afrr_neg_cap_prices: frame.column_or_zero(columns::AFRR_NEG_CAP_PRICE),
            afrr_pos_energy_prices: frame.column_or_zero(columns::AFRR_POS_ENERGY_PRICE),
            afrr_neg_energy_prices: frame.column_or_zero(columns::AFRR_NEG_ENERGY_PRICE),
            activation_factor_pos: ActivationFactor::Series(
                frame.column_or_zero(columns::activation_ratio(Direction::Pos)),
            ),
            activation_factor_neg: ActivationFactor::Series(
                frame.column_or_zero(columns::activation_ratio(Direction::Neg)),
            ),
            ..Self::new(frame.len(), p_max, e_max)
        }
    }

    pub fn enabled(&self, market: Market) -> bool {
        match market {
            Market::Fcr => self.enable_fcr,
            Market::AfrrPos => self.enable_afrr_pos,
            Market::AfrrNeg => self.enable_afrr_neg,
        }
    }

    pub fn set_enabled(&mut self, market: Market, enabled: bool) {
        match market {
            Market::Fcr => self.enable_fcr = enabled,
            Market::AfrrPos => self.enable_afrr_pos = enabled,
            Market::AfrrNeg => self.enable_afrr_neg = enabled,
        }
    }

    pub fn capacity_prices(&self, market: Market) -> &[f64] {
        match market {
            Market::Fcr => &self.fcr_prices,
            Market::AfrrPos => &self.afrr_pos_cap_prices,
            Market::AfrrNeg => &self.afrr_neg_cap_prices,
        }
    }

    /// Multiply every capacity and energy price by `factor`.
    pub fn scale_prices(&mut self, factor: f64) {
        for series in [
            &mut self.fcr_prices,
            &mut self.afrr_pos_cap_prices,
            &mut self.afrr_neg_cap_prices,
            &mut self.afrr_pos_energy_prices,
            &mut self.afrr_neg_energy_prices,
        ] {
            series.iter_mut().for_each(|p| *p *= factor);
        }
    }

    /// Validate against `n` intervals and broadcast every input. Disabled
    /// markets resolve to zeros without looking at their inputs.
    pub fn resolve(&self, n: usize, load: bool) -> FlexResult<ResolvedInputs> {
        if self.market_block_size == 0 {
            return Err(FlexError::BadInput(
                "market block size must be at least 1".to_string(),
            ));
        }
        for (name, value) in [
            ("p_max", self.p_max),
            ("e_max", self.e_max),
            ("fcr_duration", self.fcr_duration),
            ("afrr_duration", self.afrr_duration),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(FlexError::BadInput(format!(
                    "{name} must be non-negative, got {value}"
                )));
            }
        }

        let mut enabled = BTreeMap::new();
        for market in Market::ALL {
            let on = self.enabled(market) && !(load && market == Market::Fcr);
            enabled.insert(market, on);
        }
        if load && self.enable_fcr {
            debug!("FCR is not offered by flexible loads, fixing its bids to 0");
        }

        let series = |on: bool, values: &[f64], name: &str| -> FlexResult<Vec<f64>> {
            if !on {
                return Ok(vec![0.0; n]);
            }
            if values.len() != n {
                return Err(FlexError::BadInput(format!(
                    "{name} has {} values but the model has {n} intervals",
                    values.len()
                )));
            }
            Ok(values.to_vec())
        };
        let pos = enabled[&Market::AfrrPos];
        let neg = enabled[&Market::AfrrNeg];

        let mut capacity_prices = BTreeMap::new();
        capacity_prices.insert(
            Market::Fcr,
            series(enabled[&Market::Fcr], &self.fcr_prices, "fcr_prices")?,
        );
        capacity_prices.insert(
            Market::AfrrPos,
            series(pos, &self.afrr_pos_cap_prices, "afrr_pos_cap_prices")?,
        );
        capacity_prices.insert(
            Market::AfrrNeg,
            series(neg, &self.afrr_neg_cap_prices, "afrr_neg_cap_prices")?,
        );

        let alpha_pos = if pos {
            self.activation_factor_pos
                .resolve(n, "activation_factor_pos")?
        } else {
            vec![0.0; n]
        };
        let alpha_neg = if neg {
            self.activation_factor_neg
                .resolve(n, "activation_factor_neg")?
        } else {
            vec![0.0; n]
        };

        Ok(ResolvedInputs {
            enabled,
            capacity_prices,
            energy_price_pos: series(pos, &self.afrr_pos_energy_prices, "afrr_pos_energy_prices")?,
            energy_price_neg: series(neg, &self.afrr_neg_energy_prices, "afrr_neg_energy_prices")?,
            alpha_pos,
            alpha_neg,
            block_size: self.market_block_size,
            fcr_duration: self.fcr_duration,
            afrr_duration: self.afrr_duration,
            p_max: self.p_max,
            e_max: self.e_max,
        })
    }
}

/// Validated, per-interval reserve inputs.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedInputs {
    pub enabled: BTreeMap<Market, bool>,
    pub capacity_prices: BTreeMap<Market, Vec<f64>>,
    pub energy_price_pos: Vec<f64>,
    pub energy_price_neg: Vec<f64>,
    pub alpha_pos: Vec<f64>,
    pub alpha_neg: Vec<f64>,
    pub block_size: usize,
    pub fcr_duration: f64,
    pub afrr_duration: f64,
    pub p_max: f64,
    pub e_max: f64,
}

impl ResolvedInputs {
    /// Revenue per MW bid in market `m` at interval `t`, before `dt`:
    /// capacity price plus, for aFRR, the expected energy payment.
    pub fn revenue_rate(&self, market: Market, t: usize) -> f64 {
        let capacity = self.capacity_prices[&market][t];
        match market {
            Market::Fcr => capacity,
            Market::AfrrPos => capacity + self.alpha_pos[t] * self.energy_price_pos[t],
            Market::AfrrNeg => capacity - self.alpha_neg[t] * self.energy_price_neg[t],
        }
    }
}

/// Variables and data the builder added, kept for extraction.
#[derive(Debug, Clone)]
pub struct ReserveHandle {
    pub target: ReserveTarget,
    pub blocks: BlockGrid,
    pub inputs: ResolvedInputs,
    pub dt_hours: f64,
    capacity: BTreeMap<Market, Vec<Variable>>,
    revenue: Expression,
}

impl ReserveHandle {
    /// Capacity variables of a market, one per block.
    pub fn capacity(&self, market: Market) -> &[Variable] {
        self.capacity
            .get(&market)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Block of each interval.
    pub fn t_to_block(&self) -> &[usize] {
        self.blocks.t_to_block()
    }

    /// The revenue expression `R`.
    pub fn revenue(&self) -> &Expression {
        &self.revenue
    }
}

/// Add reserve bids for `target` to `model`.
pub fn add_reserve_constraints(
    model: &mut EnergyModel,
    target: &ReserveTarget,
    config: &ReserveConfig,
) -> FlexResult<ReserveHandle> {
    let n = model.grid().len();
    let dt = model.grid().dt_hours();
    let load = matches!(target, ReserveTarget::FlexibleLoad { .. });
    let inputs = config.resolve(n, load)?;
    let blocks = BlockGrid::new(n, inputs.block_size)?;

    let mut capacity = BTreeMap::new();
    for market in Market::ALL {
        let vars: Vec<Variable> = (0..blocks.num_blocks())
            .map(|_| model.add_variable(variable().min(0.0)))
            .collect();
        if !inputs.enabled[&market] {
            for var in &vars {
                model.add_constraint(constraint!(*var == 0.0));
            }
        }
        capacity.insert(market, vars);
    }
    let fcr = &capacity[&Market::Fcr];
    let pos = &capacity[&Market::AfrrPos];
    let neg = &capacity[&Market::AfrrNeg];
    let p_max = inputs.p_max;

    match target {
        ReserveTarget::Battery { storage, bus } => {
            let f_in = model.flow(bus, storage)?.to_vec();
            let f_out = model.flow(storage, bus)?.to_vec();
            let soc = model.storage_content(storage)?.to_vec();
            let e_max = inputs.e_max;
            let tau_fcr = inputs.fcr_duration;
            let tau_afrr = inputs.afrr_duration;
            for t in model.timesteps() {
                let b = blocks.block_of(t);
                let (c_fcr, c_pos, c_neg) = (fcr[b], pos[b], neg[b]);
                model.add_constraint(constraint!(f_in[t] + c_fcr + c_neg <= p_max));
                model.add_constraint(constraint!(f_out[t] + c_fcr + c_pos <= p_max));
                model.add_constraint(constraint!(
                    soc[t] + tau_fcr * c_fcr + tau_afrr * c_neg <= e_max
                ));
                model.add_constraint(constraint!(soc[t] >= tau_fcr * c_fcr + tau_afrr * c_pos));
                model.add_constraint(constraint!(f_out[t] >= inputs.alpha_pos[t] * c_pos));
                model.add_constraint(constraint!(f_in[t] >= inputs.alpha_neg[t] * c_neg));
            }
        }
        ReserveTarget::FlexibleLoad { component, bus } => {
            let f_in = model.flow(bus, component)?.to_vec();
            for t in model.timesteps() {
                let b = blocks.block_of(t);
                let (c_pos, c_neg) = (pos[b], neg[b]);
                model.add_constraint(constraint!(f_in[t] + c_neg <= p_max));
                model.add_constraint(constraint!(f_in[t] >= c_pos));
                model.add_constraint(constraint!(f_in[t] >= inputs.alpha_neg[t] * c_neg));
                model.add_constraint(constraint!(f_in[t] <= p_max - inputs.alpha_pos[t] * c_pos));
            }
        }
    }

    // R = Σ_t dt · rate_m(t) · C[m][b(t)], collected per block first.
    let mut revenue = Expression::from(0.0);
    for market in Market::ALL {
        if !inputs.enabled[&market] {
            continue;
        }
        let mut per_block = vec![0.0; blocks.num_blocks()];
        for t in 0..n {
            per_block[blocks.block_of(t)] += dt * inputs.revenue_rate(market, t);
        }
        for (var, coef) in capacity[&market].iter().zip(per_block) {
            if coef != 0.0 {
                revenue += coef * *var;
            }
        }
    }

    debug!(
        blocks = blocks.num_blocks(),
        variables = model.num_variables(),
        constraints = model.num_constraints(),
        "added reserve constraints"
    );
    Ok(ReserveHandle {
        target: target.clone(),
        blocks,
        inputs,
        dt_hours: dt,
        capacity,
        revenue,
    })
}
