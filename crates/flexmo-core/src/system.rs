//! Energy-system graph.
//!
//! A site is a directed graph whose nodes are components and whose edges are
//! energy flows. Every flow connects a bus with a non-bus component:
//!
//! ```text
//!   spot_buy ──▶ electricity ──▶ spot_sell
//!                 │      ▲
//!                 ▼      │
//!                battery          (storage: inflow edge, outflow edge)
//!
//!   electricity ──▶ pth ──▶ heat ──▶ heat_demand
//!                            │  ▲
//!                            ▼  │
//!                        thermal_storage
//! ```
//!
//! The LP model in `flexmo-algo` creates one variable per edge and interval
//! and one storage-content variable per storage and interval.

use std::collections::HashMap;

use petgraph::algo::connected_components;
use petgraph::prelude::*;
use serde::{Deserialize, Serialize};

use crate::diagnostics::Diagnostics;
use crate::{FlexError, FlexResult};

/// Cost coefficient of a flow, constant or per interval (€/MWh).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CostSeries {
    #[default]
    Zero,
    Constant(f64),
    Series(Vec<f64>),
}

impl CostSeries {
    #[inline]
    pub fn at(&self, t: usize) -> f64 {
        match self {
            CostSeries::Zero => 0.0,
            CostSeries::Constant(c) => *c,
            CostSeries::Series(values) => values.get(t).copied().unwrap_or(0.0),
        }
    }

    pub fn negated(&self) -> Self {
        match self {
            CostSeries::Zero => CostSeries::Zero,
            CostSeries::Constant(c) => CostSeries::Constant(-c),
            CostSeries::Series(values) => CostSeries::Series(values.iter().map(|v| -v).collect()),
        }
    }

    fn series_len(&self) -> Option<usize> {
        match self {
            CostSeries::Series(values) => Some(values.len()),
            _ => None,
        }
    }
}

/// Properties of a directed flow between a bus and a component.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Flow {
    /// Upper bound in MW
    pub nominal_value: Option<f64>,
    /// Fixed profile in MW; the flow equals it in every interval
    pub fix: Option<Vec<f64>>,
    pub variable_costs: CostSeries,
}

impl Flow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_nominal(mut self, mw: f64) -> Self {
        self.nominal_value = Some(mw);
        self
    }

    pub fn with_fix(mut self, profile: Vec<f64>) -> Self {
        self.fix = Some(profile);
        self
    }

    pub fn with_costs(mut self, costs: CostSeries) -> Self {
        self.variable_costs = costs;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Storage {
    pub label: String,
    /// Energy capacity in MWh
    pub nominal_capacity: f64,
    pub inflow_efficiency: f64,
    pub outflow_efficiency: f64,
    /// Relative self-discharge per hour
    pub loss_rate: f64,
    /// Content before the first interval, as a fraction of capacity
    pub initial_level: f64,
    /// Terminal content must equal the initial content
    pub balanced: bool,
}

impl Storage {
    pub fn new(label: impl Into<String>, nominal_capacity: f64) -> Self {
        Self {
            label: label.into(),
            nominal_capacity,
            inflow_efficiency: 1.0,
            outflow_efficiency: 1.0,
            loss_rate: 0.0,
            initial_level: 0.5,
            balanced: true,
        }
    }

    pub fn initial_content(&self) -> f64 {
        self.initial_level * self.nominal_capacity
    }
}

/// One-input one-output conversion: `output = efficiency · input`.
#[derive(Debug, Clone, PartialEq)]
pub struct Converter {
    pub label: String,
    pub efficiency: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Component {
    Bus(String),
    Source(String),
    Sink(String),
    Storage(Storage),
    Converter(Converter),
}

impl Component {
    pub fn label(&self) -> &str {
        match self {
            Component::Bus(label) | Component::Source(label) | Component::Sink(label) => label,
            Component::Storage(storage) => &storage.label,
            Component::Converter(converter) => &converter.label,
        }
    }

    pub fn is_bus(&self) -> bool {
        matches!(self, Component::Bus(_))
    }

    fn kind(&self) -> &'static str {
        match self {
            Component::Bus(_) => "bus",
            Component::Source(_) => "source",
            Component::Sink(_) => "sink",
            Component::Storage(_) => "storage",
            Component::Converter(_) => "converter",
        }
    }
}

/// Directed component graph with label lookup.
#[derive(Debug, Default, Clone)]
pub struct EnergySystem {
    pub graph: DiGraph<Component, Flow>,
    index: HashMap<String, NodeIndex>,
}

impl EnergySystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, component: Component) -> FlexResult<NodeIndex> {
        let label = component.label().to_string();
        if self.index.contains_key(&label) {
            return Err(FlexError::BadInput(format!(
                "component label '{label}' is used twice"
            )));
        }
        let idx = self.graph.add_node(component);
        self.index.insert(label, idx);
        Ok(idx)
    }

    /// Add a flow from `src` to `dst`. Exactly one side must be a bus.
    pub fn connect(&mut self, src: &str, dst: &str, flow: Flow) -> FlexResult<EdgeIndex> {
        let a = self.require(src)?;
        let b = self.require(dst)?;
        if self.graph[a].is_bus() == self.graph[b].is_bus() {
            return Err(FlexError::BadInput(format!(
                "flow {src} -> {dst} must connect a bus with a non-bus component"
            )));
        }
        if self.graph.find_edge(a, b).is_some() {
            return Err(FlexError::BadInput(format!(
                "flow {src} -> {dst} already exists"
            )));
        }
        Ok(self.graph.add_edge(a, b, flow))
    }

    pub fn node(&self, label: &str) -> Option<NodeIndex> {
        self.index.get(label).copied()
    }

    pub fn component(&self, label: &str) -> Option<&Component> {
        self.node(label).map(|idx| &self.graph[idx])
    }

    fn require(&self, label: &str) -> FlexResult<NodeIndex> {
        self.node(label)
            .ok_or_else(|| FlexError::BadInput(format!("unknown component '{label}'")))
    }

    /// The edge `src -> dst`, if present.
    pub fn edge(&self, src: &str, dst: &str) -> Option<EdgeIndex> {
        self.graph.find_edge(self.node(src)?, self.node(dst)?)
    }

    pub fn inflows(&self, node: NodeIndex) -> impl Iterator<Item = EdgeIndex> + '_ {
        self.graph
            .edges_directed(node, Direction::Incoming)
            .map(|e| e.id())
    }

    pub fn outflows(&self, node: NodeIndex) -> impl Iterator<Item = EdgeIndex> + '_ {
        self.graph
            .edges_directed(node, Direction::Outgoing)
            .map(|e| e.id())
    }

    pub fn stats(&self) -> SystemStats {
        let mut stats = SystemStats::default();
        for component in self.graph.node_weights() {
            match component {
                Component::Bus(_) => stats.num_buses += 1,
                Component::Source(_) => stats.num_sources += 1,
                Component::Sink(_) => stats.num_sinks += 1,
                Component::Storage(_) => stats.num_storages += 1,
                Component::Converter(_) => stats.num_converters += 1,
            }
        }
        stats.num_flows = self.graph.edge_count();
        stats
    }

    /// Structural checks. Populates `diag` with warnings and errors.
    pub fn validate_into(&self, horizon: usize, diag: &mut Diagnostics) {
        let stats = self.stats();
        if stats.num_buses == 0 {
            diag.add_error("structure", "energy system has no buses");
            return;
        }
        if connected_components(&self.graph) > 1 {
            diag.add_warning("structure", "energy system is split into several islands");
        }

        for idx in self.graph.node_indices() {
            let component = &self.graph[idx];
            let label = component.label();
            let n_in = self.inflows(idx).count();
            let n_out = self.outflows(idx).count();
            match component {
                Component::Bus(_) if n_in + n_out == 0 => {
                    diag.add_warning("structure", &format!("bus '{label}' has no flows"))
                }
                Component::Source(_) if n_in > 0 || n_out == 0 => diag.add_error(
                    "structure",
                    &format!("source '{label}' needs outflows and no inflows"),
                ),
                Component::Sink(_) if n_out > 0 || n_in == 0 => diag.add_error(
                    "structure",
                    &format!("sink '{label}' needs inflows and no outflows"),
                ),
                Component::Storage(storage) => {
                    if n_in != 1 || n_out != 1 {
                        diag.add_error(
                            "structure",
                            &format!("storage '{label}' needs exactly one inflow and one outflow"),
                        );
                    }
                    if storage.nominal_capacity < 0.0
                        || !(0.0..=1.0).contains(&storage.initial_level)
                    {
                        diag.add_error(
                            "limits",
                            &format!("storage '{label}' has a negative capacity or an initial level outside [0, 1]"),
                        );
                    }
                    if storage.inflow_efficiency <= 0.0 || storage.outflow_efficiency <= 0.0 {
                        diag.add_error(
                            "limits",
                            &format!("storage '{label}' efficiencies must be positive"),
                        );
                    }
                }
                Component::Converter(converter) => {
                    if n_in != 1 || n_out != 1 {
                        diag.add_error(
                            "structure",
                            &format!(
                                "converter '{label}' needs exactly one input and one output"
                            ),
                        );
                    }
                    if converter.efficiency <= 0.0 {
                        diag.add_error(
                            "limits",
                            &format!("converter '{label}' efficiency must be positive"),
                        );
                    }
                }
                _ => {}
            }
        }

        for edge in self.graph.edge_references() {
            let flow = edge.weight();
            let name = format!(
                "{} -> {}",
                self.graph[edge.source()].label(),
                self.graph[edge.target()].label()
            );
            if flow.nominal_value.is_some_and(|v| v < 0.0) {
                diag.add_error("limits", &format!("flow {name} has a negative nominal value"));
            }
            if flow.fix.as_ref().is_some_and(|fix| fix.len() != horizon) {
                diag.add_error(
                    "alignment",
                    &format!("fixed profile of {name} does not match {horizon} intervals"),
                );
            }
            if flow
                .variable_costs
                .series_len()
                .is_some_and(|len| len != horizon)
            {
                diag.add_error(
                    "alignment",
                    &format!("cost series of {name} does not match {horizon} intervals"),
                );
            }
        }
    }

    /// Validate against a horizon and turn errors into `BadInput`.
    pub fn validate(&self, horizon: usize) -> FlexResult<Diagnostics> {
        let mut diag = Diagnostics::new();
        self.validate_into(horizon, &mut diag);
        if diag.has_errors() {
            let messages: Vec<String> = diag.errors().map(|i| i.message.clone()).collect();
            return Err(FlexError::BadInput(messages.join("; ")));
        }
        Ok(diag)
    }
}

/// Component counts of an [`EnergySystem`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct SystemStats {
    pub num_buses: usize,
    pub num_sources: usize,
    pub num_sinks: usize,
    pub num_storages: usize,
    pub num_converters: usize,
    pub num_flows: usize,
}

impl std::fmt::Display for SystemStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} buses, {} sources, {} sinks, {} storages, {} converters, {} flows",
            self.num_buses,
            self.num_sources,
            self.num_sinks,
            self.num_storages,
            self.num_converters,
            self.num_flows
        )
    }
}

impl std::fmt::Display for Component {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} '{}'", self.kind(), self.label())
    }
}
