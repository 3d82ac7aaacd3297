//! LP solver selection and invocation.

use std::fmt;
use std::str::FromStr;
use std::time::Instant;

use anyhow::anyhow;
use flexmo_core::{FlexError, FlexResult};
#[cfg(feature = "solver-clarabel")]
use good_lp::solvers::clarabel::clarabel as clarabel_solver;
#[cfg(feature = "solver-highs")]
use good_lp::solvers::highs::highs as highs_solver;
use good_lp::{Constraint, Expression, Solution, SolverModel, Variable};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::model::{EnergyModel, VariableIndex};
use crate::reserve::{add_reserve_constraints, ReserveConfig, ReserveHandle, ReserveTarget};
use crate::results::{ensure_unique_assets, FleetResult, ResultSet};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LpSolverKind {
    #[default]
    Clarabel,
    #[cfg(feature = "solver-highs")]
    Highs,
}

impl LpSolverKind {
    pub fn available() -> &'static [&'static str] {
        AVAILABLE_LP_SOLVERS
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LpSolverKind::Clarabel => "clarabel",
            #[cfg(feature = "solver-highs")]
            LpSolverKind::Highs => "highs",
        }
    }
}

impl fmt::Display for LpSolverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const AVAILABLE_LP_SOLVERS: &[&str] = &[
    "clarabel",
    #[cfg(feature = "solver-highs")]
    "highs",
];

fn unknown_solver_error(label: &str) -> anyhow::Error {
    anyhow!(
        "unknown lp solver '{}'; supported values: {}",
        label,
        LpSolverKind::available().join(", ")
    )
}

impl FromStr for LpSolverKind {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.to_ascii_lowercase();
        match normalized.as_str() {
            "clarabel" => Ok(LpSolverKind::Clarabel),
            "highs" => {
                #[cfg(feature = "solver-highs")]
                {
                    Ok(LpSolverKind::Highs)
                }
                #[cfg(not(feature = "solver-highs"))]
                {
                    Err(unknown_solver_error(&normalized))
                }
            }
            _ => Err(unknown_solver_error(&normalized)),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SolverSettings {
    #[serde(default)]
    pub kind: LpSolverKind,
    /// Wall-clock limit; only honoured by HiGHS
    #[serde(default)]
    pub time_limit_seconds: Option<f64>,
}

impl SolverSettings {
    pub fn new(kind: LpSolverKind) -> Self {
        Self {
            kind,
            time_limit_seconds: None,
        }
    }
}

/// A solved model with its variable lookup.
pub struct SolvedModel {
    pub index: VariableIndex,
    pub solver: LpSolverKind,
    pub solve_seconds: f64,
    solution: Box<dyn Solution>,
}

impl SolvedModel {
    pub fn value(&self, var: Variable) -> f64 {
        self.solution.value(var)
    }

    pub fn values(&self, vars: &[Variable]) -> Vec<f64> {
        vars.iter().map(|v| self.solution.value(*v)).collect()
    }

    /// Solved values of the flow `src -> dst`.
    pub fn flow_values(&self, src: &str, dst: &str) -> FlexResult<Vec<f64>> {
        self.index
            .flow(src, dst)
            .map(|vars| self.values(vars))
            .ok_or_else(|| FlexError::BadInput(format!("no flow {src} -> {dst} in the model")))
    }

    /// Solved end-of-interval contents of a storage.
    pub fn storage_values(&self, label: &str) -> FlexResult<Vec<f64>> {
        self.index
            .storage_content(label)
            .map(|vars| self.values(vars))
            .ok_or_else(|| FlexError::BadInput(format!("no storage '{label}' in the model")))
    }
}

fn with_constraints<M: SolverModel>(mut problem: M, constraints: Vec<Constraint>) -> M {
    for c in constraints {
        problem = problem.with(c);
    }
    problem
}

fn solver_failure(kind: LpSolverKind, err: impl fmt::Display) -> FlexError {
    FlexError::SolverFailure(format!("{kind}: {err}"))
}

/// Minimise `J − Σ R` over the model and the reserve bids of every asset.
pub fn solve(
    model: EnergyModel,
    reserves: &[ReserveHandle],
    settings: &SolverSettings,
) -> FlexResult<SolvedModel> {
    let parts = model.into_parts();
    let mut revenue = Expression::from(0.0);
    for reserve in reserves {
        revenue += reserve.revenue().clone();
    }
    let objective = parts.cost - revenue;
    let num_constraints = parts.constraints.len();
    let unsolved = parts.vars.minimise(objective);
    let started = Instant::now();

    let solution: Box<dyn Solution> = match settings.kind {
        LpSolverKind::Clarabel => {
            #[cfg(feature = "solver-clarabel")]
            {
                if settings.time_limit_seconds.is_some() {
                    debug!("time limit ignored by clarabel");
                }
                let problem = with_constraints(unsolved.using(clarabel_solver), parts.constraints);
                Box::new(
                    problem
                        .solve()
                        .map_err(|e| solver_failure(settings.kind, e))?,
                )
            }
            #[cfg(not(feature = "solver-clarabel"))]
            {
                let _ = unsolved;
                return Err(solver_failure(
                    settings.kind,
                    "built without the solver-clarabel feature",
                ));
            }
        }
        #[cfg(feature = "solver-highs")]
        LpSolverKind::Highs => {
            let mut problem = unsolved.using(highs_solver);
            if let Some(limit) = settings.time_limit_seconds {
                problem = problem.set_time_limit(limit);
            }
            let problem = with_constraints(problem, parts.constraints);
            Box::new(
                problem
                    .solve()
                    .map_err(|e| solver_failure(settings.kind, e))?,
            )
        }
    };

    let solve_seconds = started.elapsed().as_secs_f64();
    info!(
        solver = %settings.kind,
        assets = reserves.len(),
        constraints = num_constraints,
        seconds = solve_seconds,
        "solved reserve model"
    );
    Ok(SolvedModel {
        index: parts.index,
        solver: settings.kind,
        solve_seconds,
        solution,
    })
}

/// Build the reserve layer on `model`, solve, and extract the results.
pub fn optimize(
    mut model: EnergyModel,
    target: &ReserveTarget,
    config: &ReserveConfig,
    settings: &SolverSettings,
) -> FlexResult<ResultSet> {
    let reserve = add_reserve_constraints(&mut model, target, config)?;
    let solved = solve(model, std::slice::from_ref(&reserve), settings)?;
    ResultSet::extract(&solved, &reserve)
}

/// Build one reserve layer per asset on a shared `model`, solve them
/// together, and extract per-asset results.
pub fn optimize_fleet(
    mut model: EnergyModel,
    assets: &[(ReserveTarget, ReserveConfig)],
    settings: &SolverSettings,
) -> FlexResult<FleetResult> {
    if assets.is_empty() {
        return Err(FlexError::BadInput("fleet has no assets".to_string()));
    }
    ensure_unique_assets(assets.iter().map(|(target, _)| target))?;
    let reserves = assets
        .iter()
        .map(|(target, config)| add_reserve_constraints(&mut model, target, config))
        .collect::<FlexResult<Vec<_>>>()?;
    let solved = solve(model, &reserves, settings)?;
    FleetResult::extract(&solved, &reserves)
}
