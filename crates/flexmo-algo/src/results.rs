//! Result extraction, cashflow accounting and KPIs.
//!
//! [`ResultSet::extract`] reads the primal values of a solved model, rebuilds
//! the per-interval bid series from the block bids, checks that every reserve
//! rule holds within [`EXTRACTION_TOLERANCE`], and derives the cashflow:
//!
//! | column             | value                              |
//! |--------------------|------------------------------------|
//! | `Rev_FCR_Cap`      | `C_FCR·π_FCR·dt`                   |
//! | `Rev_aFRR_Pos_Cap` | `C_pos·π^cap_pos·dt`               |
//! | `Rev_aFRR_Neg_Cap` | `C_neg·π^cap_neg·dt`               |
//! | `Rev_aFRR_Pos_En`  | `C_pos·α_pos·π^en_pos·dt`          |
//! | `Rev_aFRR_Neg_En`  | `−C_neg·α_neg·π^en_neg·dt`         |
//! | `Rev_Spot_Sold`    | `real_spot_out·spot·dt`            |
//! | `Cost_Spot_Bought` | `−real_spot_in·spot·dt`            |
//!
//! Realized spot trades net out the energy delivered through activations:
//! `real_spot_out = max(f_out − C_pos·α_pos, 0)` and
//! `real_spot_in = max(f_in − C_neg·α_neg, 0)`.
//!
//! When several assets share one model, [`FleetResult::extract`] builds one
//! [`ResultSet`] per asset and reports the site objective `J − Σ R`.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::NaiveDateTime;
use csv::WriterBuilder;
use flexmo_core::{FlexError, FlexResult, Market};
use flexmo_ts::{format_decimal_comma, TIMESTAMP_FORMAT};
use polars::prelude::*;
use serde::Serialize;
use tracing::{debug, info};

use crate::io::{ensure_parent_dir, persist_dataframe};
use crate::reserve::{ReserveHandle, ReserveTarget};
use crate::site::{SPOT_BUY, SPOT_SELL};
use crate::solve::SolvedModel;

/// Tolerance of the post-solve rule checks.
pub const EXTRACTION_TOLERANCE: f64 = 1e-6;
/// Power below which a bid or trade counts as inactive (MW).
pub const STATE_THRESHOLD_MW: f64 = 0.01;

/// What the asset does in one interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OperatingState {
    /// Spot trading alongside at least one reserve bid
    MultiUse,
    /// Several reserve products, no spot
    ReserveMix,
    FcrOnly,
    AfrrPosOnly,
    AfrrNegOnly,
    SpotOnly,
    Idle,
}

impl OperatingState {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperatingState::MultiUse => "Multi-Use",
            OperatingState::ReserveMix => "Reserve Mix",
            OperatingState::FcrOnly => "FCR only",
            OperatingState::AfrrPosOnly => "aFRR+ only",
            OperatingState::AfrrNegOnly => "aFRR- only",
            OperatingState::SpotOnly => "Spot only",
            OperatingState::Idle => "Idle",
        }
    }

    /// Classify one interval from its realized spot trades and bids.
    pub fn classify(real_spot_in: f64, real_spot_out: f64, bids: [f64; 3]) -> Self {
        let spot = real_spot_in > STATE_THRESHOLD_MW || real_spot_out > STATE_THRESHOLD_MW;
        let active: Vec<Market> = Market::ALL
            .into_iter()
            .zip(bids)
            .filter(|(_, c)| *c > STATE_THRESHOLD_MW)
            .map(|(m, _)| m)
            .collect();
        match (spot, active.as_slice()) {
            (true, []) => OperatingState::SpotOnly,
            (true, _) => OperatingState::MultiUse,
            (false, []) => OperatingState::Idle,
            (false, [Market::Fcr]) => OperatingState::FcrOnly,
            (false, [Market::AfrrPos]) => OperatingState::AfrrPosOnly,
            (false, [Market::AfrrNeg]) => OperatingState::AfrrNegOnly,
            (false, _) => OperatingState::ReserveMix,
        }
    }
}

/// Per-interval cashflow in €.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Cashflow {
    pub rev_fcr_cap: Vec<f64>,
    pub rev_afrr_pos_cap: Vec<f64>,
    pub rev_afrr_neg_cap: Vec<f64>,
    pub rev_afrr_pos_en: Vec<f64>,
    pub rev_afrr_neg_en: Vec<f64>,
    pub rev_spot_sold: Vec<f64>,
    /// Stored as a negative amount
    pub cost_spot_bought: Vec<f64>,
    pub total_profit: Vec<f64>,
    pub cum_profit: Vec<f64>,
}

impl Cashflow {
    /// Reserve revenue of interval `t`, capacity and energy.
    pub fn reserve_at(&self, t: usize) -> f64 {
        self.rev_fcr_cap[t]
            + self.rev_afrr_pos_cap[t]
            + self.rev_afrr_neg_cap[t]
            + self.rev_afrr_pos_en[t]
            + self.rev_afrr_neg_en[t]
    }

    fn columns(&self) -> [(&'static str, &[f64]); 9] {
        [
            ("Rev_FCR_Cap", self.rev_fcr_cap.as_slice()),
            ("Rev_aFRR_Pos_Cap", self.rev_afrr_pos_cap.as_slice()),
            ("Rev_aFRR_Neg_Cap", self.rev_afrr_neg_cap.as_slice()),
            ("Rev_aFRR_Pos_En", self.rev_afrr_pos_en.as_slice()),
            ("Rev_aFRR_Neg_En", self.rev_afrr_neg_en.as_slice()),
            ("Rev_Spot_Sold", self.rev_spot_sold.as_slice()),
            ("Cost_Spot_Bought", self.cost_spot_bought.as_slice()),
            ("Total_Profit", self.total_profit.as_slice()),
            ("Cum_Profit", self.cum_profit.as_slice()),
        ]
    }
}

/// Aggregate figures of one run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KpiSummary {
    pub intervals: usize,
    pub solver: String,
    pub solve_seconds: f64,
    /// Minimised `J − R`
    pub objective_value: f64,
    pub total_profit: f64,
    pub reserve_revenue: f64,
    pub spot_result: f64,
    /// Capacity plus energy revenue per market
    pub revenue_by_market: BTreeMap<String, f64>,
    pub mean_bid_mw: BTreeMap<String, f64>,
    pub equivalent_full_cycles: Option<f64>,
    pub state_counts: BTreeMap<String, usize>,
}

/// Everything read back from a solved reserve model.
#[derive(Debug, Clone)]
pub struct ResultSet {
    pub timestamps: Vec<NaiveDateTime>,
    pub dt_hours: f64,
    pub target: ReserveTarget,
    pub t_to_block: Vec<usize>,
    /// One value per block and market
    pub block_bids: BTreeMap<Market, Vec<f64>>,
    /// Block bids broadcast to intervals
    pub bids: BTreeMap<Market, Vec<f64>>,
    pub f_in: Vec<f64>,
    /// Zero for flexible loads
    pub f_out: Vec<f64>,
    /// End-of-interval state of charge, batteries only
    pub soc: Option<Vec<f64>>,
    pub spot_prices: Vec<f64>,
    /// Grid exchange of the whole site
    pub spot_bought: Vec<f64>,
    pub spot_sold: Vec<f64>,
    pub real_spot_in: Vec<f64>,
    pub real_spot_out: Vec<f64>,
    /// `f_out − f_in`
    pub net_flow: Vec<f64>,
    /// Flexible loads: `f_in − C_neg·α_neg`
    pub planned_consumption: Option<Vec<f64>>,
    pub cashflow: Cashflow,
    pub states: Vec<OperatingState>,
    /// Site-wide energy cost `J`
    pub base_cost: f64,
    /// `J` minus this asset's reserve revenue; the minimised objective when
    /// the asset is alone in the model
    pub objective_value: f64,
    pub solver: String,
    pub solve_seconds: f64,
    e_max: f64,
}

fn zip_map(a: &[f64], b: &[f64], f: impl Fn(f64, f64) -> f64) -> Vec<f64> {
    a.iter().zip(b).map(|(x, y)| f(*x, *y)).collect()
}

fn mismatch(rule: &str, t: usize, slack: f64) -> FlexError {
    FlexError::ExtractionMismatch(format!("{rule} violated at interval {t} by {:.3e}", -slack))
}

fn check_slack(rule: &str, t: usize, slack: f64) -> FlexResult<()> {
    if slack < -EXTRACTION_TOLERANCE || slack.is_nan() {
        Err(mismatch(rule, t, slack))
    } else {
        Ok(())
    }
}

/// `J` evaluated at the solution: Σ over edges and intervals of cost·dt·flow.
fn site_base_cost(solved: &SolvedModel) -> f64 {
    let index = &solved.index;
    let dt = index.grid.dt_hours();
    let mut base_cost = 0.0;
    for (edge, vars) in index.edge_flows() {
        let costs = &index.system.graph[edge].variable_costs;
        base_cost += vars
            .iter()
            .enumerate()
            .map(|(t, v)| costs.at(t) * dt * solved.value(*v))
            .sum::<f64>();
    }
    base_cost
}

/// `results.csv` becomes `results_battery.csv` for asset `battery`.
pub fn asset_output_path(path: &Path, label: &str) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match path.extension() {
        Some(ext) => format!("{stem}_{label}.{}", ext.to_string_lossy()),
        None => format!("{stem}_{label}"),
    };
    path.with_file_name(name)
}

impl ResultSet {
    /// Read the solution, validate it and derive cashflow and states.
    pub fn extract(solved: &SolvedModel, reserve: &ReserveHandle) -> FlexResult<Self> {
        let index = &solved.index;
        let n = index.grid.len();
        let dt = reserve.dt_hours;
        let inputs = &reserve.inputs;

        let mut block_bids = BTreeMap::new();
        let mut bids = BTreeMap::new();
        for market in Market::ALL {
            let values = solved.values(reserve.capacity(market));
            let per_interval: Vec<f64> =
                reserve.t_to_block().iter().map(|b| values[*b]).collect();
            block_bids.insert(market, values);
            bids.insert(market, per_interval);
        }

        let (bus, f_in, f_out, soc) = match &reserve.target {
            ReserveTarget::Battery { storage, bus } => (
                bus.as_str(),
                solved.flow_values(bus, storage)?,
                solved.flow_values(storage, bus)?,
                Some(solved.storage_values(storage)?),
            ),
            ReserveTarget::FlexibleLoad { component, bus } => (
                bus.as_str(),
                solved.flow_values(bus, component)?,
                vec![0.0; n],
                None,
            ),
        };

        let spot_edge = index.system.edge(SPOT_BUY, bus);
        let spot_prices: Vec<f64> = match spot_edge {
            Some(edge) => {
                let costs = &index.system.graph[edge].variable_costs;
                (0..n).map(|t| costs.at(t)).collect()
            }
            None => vec![0.0; n],
        };
        let spot_bought = solved.flow_values(SPOT_BUY, bus).unwrap_or_else(|_| vec![0.0; n]);
        let spot_sold = solved.flow_values(bus, SPOT_SELL).unwrap_or_else(|_| vec![0.0; n]);

        let c_fcr = &bids[&Market::Fcr];
        let c_pos = &bids[&Market::AfrrPos];
        let c_neg = &bids[&Market::AfrrNeg];
        let delivered_pos = zip_map(c_pos, &inputs.alpha_pos, |c, a| c * a);
        let delivered_neg = zip_map(c_neg, &inputs.alpha_neg, |c, a| c * a);
        let real_spot_out = zip_map(&f_out, &delivered_pos, |f, d| (f - d).max(0.0));
        let real_spot_in = zip_map(&f_in, &delivered_neg, |f, d| (f - d).max(0.0));
        let net_flow = zip_map(&f_out, &f_in, |o, i| o - i);
        let planned_consumption = match reserve.target {
            ReserveTarget::FlexibleLoad { .. } => Some(zip_map(&f_in, &delivered_neg, |f, d| f - d)),
            ReserveTarget::Battery { .. } => None,
        };

        let cap = &inputs.capacity_prices;
        let mut cashflow = Cashflow {
            rev_fcr_cap: (0..n).map(|t| c_fcr[t] * cap[&Market::Fcr][t] * dt).collect(),
            rev_afrr_pos_cap: (0..n)
                .map(|t| c_pos[t] * cap[&Market::AfrrPos][t] * dt)
                .collect(),
            rev_afrr_neg_cap: (0..n)
                .map(|t| c_neg[t] * cap[&Market::AfrrNeg][t] * dt)
                .collect(),
            rev_afrr_pos_en: (0..n)
                .map(|t| delivered_pos[t] * inputs.energy_price_pos[t] * dt)
                .collect(),
            rev_afrr_neg_en: (0..n)
                .map(|t| -delivered_neg[t] * inputs.energy_price_neg[t] * dt)
                .collect(),
            rev_spot_sold: (0..n)
                .map(|t| real_spot_out[t] * spot_prices[t] * dt)
                .collect(),
            cost_spot_bought: (0..n)
                .map(|t| -(real_spot_in[t] * spot_prices[t] * dt))
                .collect(),
            ..Cashflow::default()
        };
        cashflow.total_profit = (0..n)
            .map(|t| cashflow.reserve_at(t) + cashflow.rev_spot_sold[t] + cashflow.cost_spot_bought[t])
            .collect();
        cashflow.cum_profit = cashflow
            .total_profit
            .iter()
            .scan(0.0, |acc, p| {
                *acc += p;
                Some(*acc)
            })
            .collect();

        let states = (0..n)
            .map(|t| {
                OperatingState::classify(real_spot_in[t], real_spot_out[t], [c_fcr[t], c_pos[t], c_neg[t]])
            })
            .collect();

        let base_cost = site_base_cost(solved);
        let reserve_revenue: f64 = (0..n).map(|t| cashflow.reserve_at(t)).sum();

        let result = Self {
            timestamps: index.grid.timestamps().to_vec(),
            dt_hours: dt,
            target: reserve.target.clone(),
            t_to_block: reserve.t_to_block().to_vec(),
            block_bids,
            bids,
            f_in,
            f_out,
            soc,
            spot_prices,
            spot_bought,
            spot_sold,
            real_spot_in,
            real_spot_out,
            net_flow,
            planned_consumption,
            cashflow,
            states,
            base_cost,
            objective_value: base_cost - reserve_revenue,
            solver: solved.solver.to_string(),
            solve_seconds: solved.solve_seconds,
            e_max: inputs.e_max,
        };
        result.validate(reserve)?;
        info!(
            asset = reserve.target.label(),
            intervals = n,
            profit = result.total_profit(),
            reserve_revenue,
            "extracted results"
        );
        Ok(result)
    }

    /// Re-check every reserve rule on the solved values.
    pub fn validate(&self, reserve: &ReserveHandle) -> FlexResult<()> {
        let inputs = &reserve.inputs;
        for market in Market::ALL {
            let blocks = &self.block_bids[&market];
            for (b, c) in blocks.iter().enumerate() {
                check_slack(&format!("{market} bid ≥ 0"), b, *c)?;
                if !inputs.enabled[&market] && c.abs() > EXTRACTION_TOLERANCE {
                    return Err(FlexError::ExtractionMismatch(format!(
                        "{market} is disabled but block {b} bids {c}"
                    )));
                }
            }
            for (t, c) in self.bids[&market].iter().enumerate() {
                let block = blocks[self.t_to_block[t]];
                if (c - block).abs() > EXTRACTION_TOLERANCE {
                    return Err(FlexError::ExtractionMismatch(format!(
                        "{market} bid at interval {t} differs from its block"
                    )));
                }
            }
        }

        let c_fcr = &self.bids[&Market::Fcr];
        let c_pos = &self.bids[&Market::AfrrPos];
        let c_neg = &self.bids[&Market::AfrrNeg];
        let p_max = inputs.p_max;
        for t in 0..self.len() {
            let (f_in, f_out) = (self.f_in[t], self.f_out[t]);
            let (a_pos, a_neg) = (inputs.alpha_pos[t], inputs.alpha_neg[t]);
            match &self.soc {
                Some(soc) => {
                    let e_max = inputs.e_max;
                    let s = soc[t];
                    check_slack("SOC ≥ 0", t, s)?;
                    check_slack("SOC ≤ E_max", t, e_max - s)?;
                    check_slack("charge headroom", t, p_max - f_in - c_fcr[t] - c_neg[t])?;
                    check_slack("discharge headroom", t, p_max - f_out - c_fcr[t] - c_pos[t])?;
                    check_slack(
                        "energy headroom",
                        t,
                        e_max
                            - s
                            - c_fcr[t] * inputs.fcr_duration
                            - c_neg[t] * inputs.afrr_duration,
                    )?;
                    check_slack(
                        "energy footroom",
                        t,
                        s - c_fcr[t] * inputs.fcr_duration - c_pos[t] * inputs.afrr_duration,
                    )?;
                    check_slack("positive delivery", t, f_out - c_pos[t] * a_pos)?;
                    check_slack("negative delivery", t, f_in - c_neg[t] * a_neg)?;
                }
                None => {
                    check_slack("load headroom", t, p_max - f_in - c_neg[t])?;
                    check_slack("load footroom", t, f_in - c_pos[t])?;
                    check_slack("negative delivery", t, f_in - c_neg[t] * a_neg)?;
                    check_slack("positive delivery", t, p_max - c_pos[t] * a_pos - f_in)?;
                }
            }
        }
        debug!(intervals = self.len(), "solution passed reserve checks");
        Ok(())
    }

    pub fn label(&self) -> &str {
        self.target.label()
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn bid(&self, market: Market) -> &[f64] {
        &self.bids[&market]
    }

    pub fn total_profit(&self) -> f64 {
        self.cashflow.cum_profit.last().copied().unwrap_or(0.0)
    }

    /// Sum of all reserve revenue, equal to the solved `R`.
    pub fn reserve_revenue(&self) -> f64 {
        (0..self.len()).map(|t| self.cashflow.reserve_at(t)).sum()
    }

    /// Capacity plus energy revenue of one market.
    pub fn market_revenue(&self, market: Market) -> f64 {
        let cf = &self.cashflow;
        let series: Vec<&[f64]> = match market {
            Market::Fcr => vec![&cf.rev_fcr_cap],
            Market::AfrrPos => vec![&cf.rev_afrr_pos_cap, &cf.rev_afrr_pos_en],
            Market::AfrrNeg => vec![&cf.rev_afrr_neg_cap, &cf.rev_afrr_neg_en],
        };
        series.iter().flat_map(|s| s.iter()).sum()
    }

    /// Equivalent full cycles of a battery, `None` for loads or `E_max = 0`.
    pub fn equivalent_full_cycles(&self) -> Option<f64> {
        if self.soc.is_none() || self.e_max <= 0.0 {
            return None;
        }
        let throughput: f64 = self.f_in.iter().chain(&self.f_out).sum();
        Some(throughput * self.dt_hours / 2.0 / self.e_max)
    }

    pub fn state_counts(&self) -> BTreeMap<OperatingState, usize> {
        let mut counts = BTreeMap::new();
        for state in &self.states {
            *counts.entry(*state).or_insert(0) += 1;
        }
        counts
    }

    pub fn kpis(&self) -> KpiSummary {
        let spot_result = self.cashflow.rev_spot_sold.iter().sum::<f64>()
            + self.cashflow.cost_spot_bought.iter().sum::<f64>();
        let n = self.len().max(1) as f64;
        KpiSummary {
            intervals: self.len(),
            solver: self.solver.clone(),
            solve_seconds: self.solve_seconds,
            objective_value: self.objective_value,
            total_profit: self.total_profit(),
            reserve_revenue: self.reserve_revenue(),
            spot_result,
            revenue_by_market: Market::ALL
                .iter()
                .map(|m| (m.as_str().to_string(), self.market_revenue(*m)))
                .collect(),
            mean_bid_mw: Market::ALL
                .iter()
                .map(|m| (m.as_str().to_string(), self.bids[m].iter().sum::<f64>() / n))
                .collect(),
            equivalent_full_cycles: self.equivalent_full_cycles(),
            state_counts: self
                .state_counts()
                .into_iter()
                .map(|(s, c)| (s.as_str().to_string(), c))
                .collect(),
        }
    }

    /// Numeric output columns in export order.
    pub fn numeric_columns(&self) -> Vec<(&'static str, Vec<f64>)> {
        let mut cols = Vec::new();
        match (&self.soc, &self.planned_consumption) {
            (Some(soc), _) => {
                cols.push(("Charge_MW", self.f_in.clone()));
                cols.push(("Discharge_MW", self.f_out.clone()));
                cols.push(("SOC_MWh", soc.clone()));
            }
            (None, planned) => {
                cols.push(("Consumption_MW", self.f_in.clone()));
                if let Some(planned) = planned {
                    cols.push(("Planned_Consumption_MW", planned.clone()));
                }
            }
        }
        cols.push(("Spot_Price", self.spot_prices.clone()));
        cols.push(("Spot_Bought_MW", self.spot_bought.clone()));
        cols.push(("Spot_Sold_MW", self.spot_sold.clone()));
        cols.push(("Real_Spot_In", self.real_spot_in.clone()));
        cols.push(("Real_Spot_Out", self.real_spot_out.clone()));
        cols.push(("Total_Net_Flow", self.net_flow.clone()));
        cols.push(("Bid_FCR", self.bids[&Market::Fcr].clone()));
        cols.push(("Bid_aFRR_Pos", self.bids[&Market::AfrrPos].clone()));
        cols.push(("Bid_aFRR_Neg", self.bids[&Market::AfrrNeg].clone()));
        cols.push(("Block", self.t_to_block.iter().map(|b| *b as f64).collect()));
        for (name, values) in self.cashflow.columns() {
            cols.push((name, values.to_vec()));
        }
        cols
    }

    /// Write the interval table as `;`-separated CSV with `,` decimals.
    pub fn write_csv(&self, path: &Path) -> FlexResult<()> {
        ensure_parent_dir(path)?;
        let mut writer = WriterBuilder::new().delimiter(b';').from_path(path)?;
        let cols = self.numeric_columns();
        let mut header = vec!["timestamp"];
        header.extend(cols.iter().map(|(name, _)| *name));
        header.push("State");
        writer.write_record(&header)?;
        for t in 0..self.len() {
            let mut record = vec![self.timestamps[t].format(TIMESTAMP_FORMAT).to_string()];
            record.extend(cols.iter().map(|(_, v)| format_decimal_comma(v[t])));
            record.push(self.states[t].as_str().to_string());
            writer.write_record(&record)?;
        }
        writer.flush()?;
        Ok(())
    }

    pub fn to_dataframe(&self) -> anyhow::Result<DataFrame> {
        let mut series = vec![Series::new(
            "timestamp",
            self.timestamps
                .iter()
                .map(|ts| ts.format(TIMESTAMP_FORMAT).to_string())
                .collect::<Vec<_>>(),
        )];
        for (name, values) in self.numeric_columns() {
            series.push(Series::new(name, values));
        }
        series.push(Series::new(
            "State",
            self.states.iter().map(|s| s.as_str()).collect::<Vec<_>>(),
        ));
        DataFrame::new(series).context("building result frame")
    }

    pub fn write_parquet(&self, path: &Path) -> anyhow::Result<()> {
        let mut df = self.to_dataframe()?;
        persist_dataframe(&mut df, path)
    }

    /// Write the KPI summary as pretty JSON.
    pub fn write_summary(&self, path: &Path) -> anyhow::Result<()> {
        ensure_parent_dir(path)?;
        let json = serde_json::to_string_pretty(&self.kpis())?;
        std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))
    }
}

/// Site figures of a fleet run plus the KPIs of every asset.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FleetKpis {
    pub intervals: usize,
    pub solver: String,
    pub solve_seconds: f64,
    /// Minimised `J − Σ R`
    pub objective_value: f64,
    pub base_cost: f64,
    pub total_profit: f64,
    pub reserve_revenue: f64,
    pub assets: BTreeMap<String, KpiSummary>,
}

/// Several assets solved in one model.
#[derive(Debug, Clone)]
pub struct FleetResult {
    /// One entry per reserve layer, in build order
    pub assets: Vec<ResultSet>,
    /// Site-wide energy cost `J`
    pub base_cost: f64,
    /// Minimised `J − Σ R`
    pub objective_value: f64,
    pub solver: String,
    pub solve_seconds: f64,
}

/// Each asset may carry at most one reserve layer per model.
pub(crate) fn ensure_unique_assets<'a>(
    targets: impl IntoIterator<Item = &'a ReserveTarget>,
) -> FlexResult<()> {
    let mut labels = BTreeSet::new();
    for target in targets {
        if !labels.insert(target.label()) {
            return Err(FlexError::BadInput(format!(
                "asset '{}' has more than one reserve layer",
                target.label()
            )));
        }
    }
    Ok(())
}

impl FleetResult {
    /// Extract and validate every asset of a jointly solved model.
    pub fn extract(solved: &SolvedModel, reserves: &[ReserveHandle]) -> FlexResult<Self> {
        ensure_unique_assets(reserves.iter().map(|r| &r.target))?;
        let assets = reserves
            .iter()
            .map(|reserve| ResultSet::extract(solved, reserve))
            .collect::<FlexResult<Vec<_>>>()?;
        let base_cost = site_base_cost(solved);
        let reserve_revenue: f64 = assets.iter().map(ResultSet::reserve_revenue).sum();
        info!(
            assets = assets.len(),
            base_cost,
            reserve_revenue,
            "extracted fleet results"
        );
        Ok(Self {
            assets,
            base_cost,
            objective_value: base_cost - reserve_revenue,
            solver: solved.solver.to_string(),
            solve_seconds: solved.solve_seconds,
        })
    }

    pub fn asset(&self, label: &str) -> Option<&ResultSet> {
        self.assets.iter().find(|a| a.label() == label)
    }

    pub fn intervals(&self) -> usize {
        self.assets.first().map_or(0, ResultSet::len)
    }

    pub fn reserve_revenue(&self) -> f64 {
        self.assets.iter().map(ResultSet::reserve_revenue).sum()
    }

    pub fn total_profit(&self) -> f64 {
        self.assets.iter().map(ResultSet::total_profit).sum()
    }

    pub fn kpis(&self) -> FleetKpis {
        FleetKpis {
            intervals: self.intervals(),
            solver: self.solver.clone(),
            solve_seconds: self.solve_seconds,
            objective_value: self.objective_value,
            base_cost: self.base_cost,
            total_profit: self.total_profit(),
            reserve_revenue: self.reserve_revenue(),
            assets: self
                .assets
                .iter()
                .map(|a| (a.label().to_string(), a.kpis()))
                .collect(),
        }
    }

    /// One interval table per asset next to `path`, see [`asset_output_path`].
    pub fn write_csv(&self, path: &Path) -> FlexResult<Vec<PathBuf>> {
        let mut written = Vec::with_capacity(self.assets.len());
        for asset in &self.assets {
            let out = asset_output_path(path, asset.label());
            asset.write_csv(&out)?;
            written.push(out);
        }
        Ok(written)
    }

    pub fn write_parquet(&self, path: &Path) -> anyhow::Result<Vec<PathBuf>> {
        let mut written = Vec::with_capacity(self.assets.len());
        for asset in &self.assets {
            let out = asset_output_path(path, asset.label());
            asset.write_parquet(&out)?;
            written.push(out);
        }
        Ok(written)
    }

    pub fn write_summary(&self, path: &Path) -> anyhow::Result<()> {
        ensure_parent_dir(path)?;
        let json = serde_json::to_string_pretty(&self.kpis())?;
        std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn states_follow_threshold() {
        use OperatingState::*;
        assert_eq!(OperatingState::classify(0.0, 0.0, [0.0; 3]), Idle);
        assert_eq!(OperatingState::classify(0.005, 0.0, [0.005, 0.0, 0.0]), Idle);
        assert_eq!(OperatingState::classify(0.5, 0.0, [0.0; 3]), SpotOnly);
        assert_eq!(OperatingState::classify(0.0, 0.5, [1.0, 0.0, 0.0]), MultiUse);
        assert_eq!(OperatingState::classify(0.0, 0.0, [1.0, 0.0, 0.0]), FcrOnly);
        assert_eq!(OperatingState::classify(0.0, 0.0, [0.0, 1.0, 0.0]), AfrrPosOnly);
        assert_eq!(OperatingState::classify(0.0, 0.0, [0.0, 0.0, 1.0]), AfrrNegOnly);
        assert_eq!(OperatingState::classify(0.0, 0.0, [0.0, 1.0, 1.0]), ReserveMix);
    }

    #[test]
    fn asset_paths_keep_directory_and_extension() {
        assert_eq!(
            asset_output_path(Path::new("out/results.csv"), "battery"),
            PathBuf::from("out/results_battery.csv")
        );
        assert_eq!(
            asset_output_path(Path::new("results"), "pth"),
            PathBuf::from("results_pth")
        );
    }

    #[test]
    fn slack_check_uses_tolerance() {
        assert!(check_slack("rule", 0, -1e-7).is_ok());
        assert!(matches!(
            check_slack("rule", 3, -1e-3),
            Err(FlexError::ExtractionMismatch(msg)) if msg.contains("interval 3")
        ));
    }
}
