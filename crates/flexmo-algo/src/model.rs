//! Energy-balance LP over an [`EnergySystem`].
//!
//! Variables (per interval `t`, all non-negative):
//! - `flow[e][t]` for every edge `e`, bounded by the flow's nominal value or
//!   fixed to its profile
//! - `storage_content[s][t]` for every storage, end-of-interval content in
//!   `[0, capacity]`
//!
//! Constraints:
//! - bus balance: `Σ inflow = Σ outflow`
//! - storage: `S_t = S_{t-1}·(1−loss)^dt + (η_in·in − out/η_out)·dt`, with
//!   `S_{-1}` the initial content and `S_{N-1}` pinned to it when balanced
//! - converter: `Σ out = η · Σ in`
//!
//! Objective `J = Σ cost_t · flow_t · dt`. Extensions such as the reserve
//! builder add variables and constraints through [`EnergyModel::add_variable`]
//! and [`EnergyModel::add_constraint`].

use std::collections::HashMap;
use std::ops::Range;

use flexmo_core::{
    Component, EdgeIndex, EnergySystem, FlexError, FlexResult, NodeIndex, TimeGrid,
};
use good_lp::{
    constraint, variable, variables, Constraint, Expression, ProblemVariables, Variable,
    VariableDefinition,
};
use tracing::debug;

pub struct EnergyModel {
    system: EnergySystem,
    grid: TimeGrid,
    vars: ProblemVariables,
    flows: HashMap<EdgeIndex, Vec<Variable>>,
    contents: HashMap<NodeIndex, Vec<Variable>>,
    constraints: Vec<Constraint>,
    cost: Expression,
    num_variables: usize,
}

impl EnergyModel {
    /// Build the base model. The system is validated against the grid first.
    pub fn build(system: EnergySystem, grid: TimeGrid) -> FlexResult<Self> {
        if grid.is_empty() {
            return Err(FlexError::BadInput("time grid is empty".to_string()));
        }
        let diagnostics = system.validate(grid.len())?;
        for issue in &diagnostics.issues {
            debug!(%issue, "energy system check");
        }

        let n = grid.len();
        let dt = grid.dt_hours();
        let mut model = Self {
            system,
            grid,
            vars: variables!(),
            flows: HashMap::new(),
            contents: HashMap::new(),
            constraints: Vec::new(),
            cost: Expression::from(0.0),
            num_variables: 0,
        };

        let edges: Vec<EdgeIndex> = model.system.graph.edge_indices().collect();
        for edge in edges {
            let flow = model.system.graph[edge].clone();
            let mut series = Vec::with_capacity(n);
            for t in 0..n {
                let def = match &flow.fix {
                    Some(profile) => {
                        let value = profile[t];
                        variable().min(value).max(value)
                    }
                    None => match flow.nominal_value {
                        Some(max) => variable().min(0.0).max(max),
                        None => variable().min(0.0),
                    },
                };
                let var = model.add_variable(def);
                let cost = flow.variable_costs.at(t);
                if cost != 0.0 {
                    model.cost += cost * dt * var;
                }
                series.push(var);
            }
            model.flows.insert(edge, series);
        }

        let nodes: Vec<NodeIndex> = model.system.graph.node_indices().collect();
        for node in nodes {
            match model.system.graph[node].clone() {
                Component::Bus(_) => model.add_bus_balance(node),
                Component::Storage(storage) => {
                    let contents: Vec<Variable> = (0..n)
                        .map(|_| model.add_variable(variable().min(0.0).max(storage.nominal_capacity)))
                        .collect();
                    let inflow = model.edge_sums(model.system.inflows(node).collect());
                    let outflow = model.edge_sums(model.system.outflows(node).collect());
                    let retention = (1.0 - storage.loss_rate).powf(dt);
                    let initial = storage.initial_content();
                    for t in 0..n {
                        let previous: Expression = if t == 0 {
                            Expression::from(initial * retention)
                        } else {
                            retention * contents[t - 1]
                        };
                        let charge = storage.inflow_efficiency * dt * inflow[t].clone();
                        let discharge = (dt / storage.outflow_efficiency) * outflow[t].clone();
                        model
                            .constraints
                            .push(constraint!(contents[t] == previous + charge - discharge));
                    }
                    if storage.balanced {
                        model
                            .constraints
                            .push(constraint!(contents[n - 1] == initial));
                    }
                    model.contents.insert(node, contents);
                }
                Component::Converter(converter) => {
                    let inflow = model.edge_sums(model.system.inflows(node).collect());
                    let outflow = model.edge_sums(model.system.outflows(node).collect());
                    for t in 0..n {
                        let input = converter.efficiency * inflow[t].clone();
                        model
                            .constraints
                            .push(constraint!(outflow[t].clone() == input));
                    }
                }
                Component::Source(_) | Component::Sink(_) => {}
            }
        }

        debug!(
            variables = model.num_variables,
            constraints = model.constraints.len(),
            intervals = n,
            "built energy model"
        );
        Ok(model)
    }

    fn add_bus_balance(&mut self, bus: NodeIndex) {
        let inflow = self.edge_sums(self.system.inflows(bus).collect());
        let outflow = self.edge_sums(self.system.outflows(bus).collect());
        for (input, output) in inflow.into_iter().zip(outflow) {
            self.constraints.push(constraint!(input == output));
        }
    }

    /// Per-interval sum of the flow variables of `edges`.
    fn edge_sums(&self, edges: Vec<EdgeIndex>) -> Vec<Expression> {
        (0..self.grid.len())
            .map(|t| {
                edges
                    .iter()
                    .filter_map(|e| self.flows.get(e))
                    .map(|series| Expression::from(series[t]))
                    .sum()
            })
            .collect()
    }

    pub fn add_variable(&mut self, definition: VariableDefinition) -> Variable {
        self.num_variables += 1;
        self.vars.add(definition)
    }

    pub fn add_constraint(&mut self, constraint: Constraint) {
        self.constraints.push(constraint);
    }

    pub fn timesteps(&self) -> Range<usize> {
        0..self.grid.len()
    }

    pub fn grid(&self) -> &TimeGrid {
        &self.grid
    }

    pub fn system(&self) -> &EnergySystem {
        &self.system
    }

    /// Flow variables of the edge `src -> dst`.
    pub fn flow(&self, src: &str, dst: &str) -> FlexResult<&[Variable]> {
        self.system
            .edge(src, dst)
            .and_then(|e| self.flows.get(&e))
            .map(Vec::as_slice)
            .ok_or_else(|| FlexError::BadInput(format!("no flow {src} -> {dst} in the model")))
    }

    /// End-of-interval content variables of a storage.
    pub fn storage_content(&self, label: &str) -> FlexResult<&[Variable]> {
        self.system
            .node(label)
            .and_then(|n| self.contents.get(&n))
            .map(Vec::as_slice)
            .ok_or_else(|| FlexError::BadInput(format!("no storage '{label}' in the model")))
    }

    /// The base objective `J`.
    pub fn objective(&self) -> &Expression {
        &self.cost
    }

    pub fn num_variables(&self) -> usize {
        self.num_variables
    }

    pub fn num_constraints(&self) -> usize {
        self.constraints.len()
    }

    pub(crate) fn into_parts(self) -> ModelParts {
        ModelParts {
            index: VariableIndex {
                system: self.system,
                grid: self.grid,
                flows: self.flows,
                contents: self.contents,
            },
            vars: self.vars,
            cost: self.cost,
            constraints: self.constraints,
        }
    }
}

pub(crate) struct ModelParts {
    pub index: VariableIndex,
    pub vars: ProblemVariables,
    pub cost: Expression,
    pub constraints: Vec<Constraint>,
}

/// Lookup from model entities to their variables, kept after solving.
#[derive(Debug, Clone)]
pub struct VariableIndex {
    pub system: EnergySystem,
    pub grid: TimeGrid,
    flows: HashMap<EdgeIndex, Vec<Variable>>,
    contents: HashMap<NodeIndex, Vec<Variable>>,
}

impl VariableIndex {
    pub fn flow(&self, src: &str, dst: &str) -> Option<&[Variable]> {
        self.system
            .edge(src, dst)
            .and_then(|e| self.flows.get(&e))
            .map(Vec::as_slice)
    }

    pub fn storage_content(&self, label: &str) -> Option<&[Variable]> {
        self.system
            .node(label)
            .and_then(|n| self.contents.get(&n))
            .map(Vec::as_slice)
    }

    /// Every flow edge with its per-interval variables.
    pub fn edge_flows(&self) -> impl Iterator<Item = (EdgeIndex, &[Variable])> + '_ {
        self.flows.iter().map(|(e, vars)| (*e, vars.as_slice()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flexmo_core::{CostSeries, Flow, Storage};

    fn grid(n: usize) -> TimeGrid {
        let t0 = chrono::NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        TimeGrid::regular(t0, n, 0.25).unwrap()
    }

    fn storage_system() -> EnergySystem {
        let mut es = EnergySystem::new();
        es.add(Component::Bus("el".into())).unwrap();
        es.add(Component::Source("buy".into())).unwrap();
        es.add(Component::Storage(Storage::new("bat", 2.0))).unwrap();
        es.connect("buy", "el", Flow::new().with_costs(CostSeries::Constant(10.0)))
            .unwrap();
        es.connect("el", "bat", Flow::new().with_nominal(1.0)).unwrap();
        es.connect("bat", "el", Flow::new().with_nominal(1.0)).unwrap();
        es
    }

    #[test]
    fn variables_and_constraints_per_interval() {
        let model = EnergyModel::build(storage_system(), grid(4)).unwrap();
        // 3 flows + 1 storage content, 4 intervals each
        assert_eq!(model.num_variables(), 16);
        // bus balance + storage equation per interval, plus the balance pin
        assert_eq!(model.num_constraints(), 4 + 4 + 1);
        assert_eq!(model.flow("el", "bat").unwrap().len(), 4);
        assert_eq!(model.storage_content("bat").unwrap().len(), 4);
        assert!(model.flow("bat", "buy").is_err());
        assert!(model.storage_content("el").is_err());
    }

    #[test]
    fn empty_grid_is_rejected() {
        let empty = TimeGrid::new(Vec::new(), 0.25).unwrap();
        assert!(matches!(
            EnergyModel::build(storage_system(), empty),
            Err(FlexError::BadInput(_))
        ));
    }
}
