//! Cluster evaluation over a fixed input binding.
//!
//! Clusters never read each other's formula cells, so each run only layers
//! its own computed values over the shared constants of the snapshot.

use std::collections::BTreeMap;

use serde::Serialize;
use sheetlogic_dag::{Cluster, CycleClassification, DependencyGraph, NodeId, ScheduleStep};
use sheetlogic_formulas::{CellSource, FormulaEngine};
use sheetlogic_primitives::{Coordinate, ErrorKind, EvaluatedValue, Range};
use tracing::debug;

/// Constant cell values shared by every cluster run.
pub type Constants = BTreeMap<Coordinate, EvaluatedValue>;

/// Local values over the shared constants. Local entries win.
struct Binding<'a> {
    constants: &'a Constants,
    local: BTreeMap<Coordinate, EvaluatedValue>,
}

impl Binding<'_> {
    fn set(&mut self, coordinate: &Coordinate, value: EvaluatedValue) {
        self.local.insert(coordinate.clone(), value);
    }
}

impl CellSource for Binding<'_> {
    fn value(&self, coordinate: &Coordinate) -> EvaluatedValue {
        self.local
            .get(coordinate)
            .or_else(|| self.constants.get(coordinate))
            .cloned()
            .unwrap_or(EvaluatedValue::Empty)
    }

    fn bound_in(&self, range: &Range) -> Vec<(Coordinate, EvaluatedValue)> {
        let mut cells: BTreeMap<Coordinate, EvaluatedValue> =
            self.constants.bound_in(range).into_iter().collect();
        cells.extend(self.local.bound_in(range));
        cells.into_iter().collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum CycleStatus {
    /// Not permitted to iterate.
    Rejected,
    Converged,
    DidNotConverge,
    /// A member produced a value with no numeric distance.
    NonNumeric,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleOutcome {
    /// Index into the graph's circular references.
    pub cycle: usize,
    pub status: CycleStatus,
    pub iterations: u32,
}

/// Values computed by one evaluation of a cluster.
#[derive(Debug, Clone, Default)]
pub struct ClusterRun {
    /// Every formula cell of the cluster.
    pub computed: BTreeMap<Coordinate, EvaluatedValue>,
    pub cycles: Vec<CycleOutcome>,
}

/// Evaluates clusters of one graph against the snapshot constants.
#[derive(Clone, Copy)]
pub struct ClusterEvaluator<'a> {
    graph: &'a DependencyGraph,
    engine: &'a FormulaEngine,
    constants: &'a Constants,
}

impl<'a> ClusterEvaluator<'a> {
    pub fn new(graph: &'a DependencyGraph, engine: &'a FormulaEngine, constants: &'a Constants) -> Self {
        Self {
            graph,
            engine,
            constants,
        }
    }

    pub fn graph(&self) -> &'a DependencyGraph {
        self.graph
    }

    pub fn constant(&self, coordinate: &Coordinate) -> EvaluatedValue {
        self.constants.value(coordinate)
    }

    /// Evaluate `cluster` in schedule order with `overrides` replacing the
    /// stored values of input cells.
    pub fn run(&self, cluster: &Cluster, overrides: &BTreeMap<Coordinate, EvaluatedValue>) -> ClusterRun {
        let mut binding = Binding {
            constants: self.constants,
            local: overrides.clone(),
        };
        let mut run = ClusterRun::default();

        for step in &cluster.schedule {
            match *step {
                ScheduleStep::Node(id) => {
                    if let Some(value) = self.compute(id, &binding) {
                        let coordinate = &self.graph.node(id).coordinate;
                        binding.set(coordinate, value.clone());
                        run.computed.insert(coordinate.clone(), value);
                    }
                }
                ScheduleStep::Cycle(index) => {
                    let outcome = self.resolve_cycle(index, &mut binding);
                    for &id in &self.graph.circular_refs()[index].members {
                        let coordinate = &self.graph.node(id).coordinate;
                        run.computed.insert(coordinate.clone(), binding.value(coordinate));
                    }
                    run.cycles.push(outcome);
                }
            }
        }
        run
    }

    /// `None` for cells whose value is the stored one.
    fn compute(&self, id: NodeId, binding: &Binding<'_>) -> Option<EvaluatedValue> {
        let node = self.graph.node(id);
        if node.failed {
            return Some(EvaluatedValue::Error(ErrorKind::InvalidFormula));
        }
        node.ast.as_ref().map(|ast| self.engine.evaluate(ast, binding))
    }

    fn resolve_cycle(&self, index: usize, binding: &mut Binding<'_>) -> CycleOutcome {
        let circular = &self.graph.circular_refs()[index];
        let members: Vec<&Coordinate> = circular
            .members
            .iter()
            .map(|&id| &self.graph.node(id).coordinate)
            .collect();
        let fill = |binding: &mut Binding<'_>, kind: ErrorKind| {
            for coordinate in &members {
                binding.set(coordinate, EvaluatedValue::Error(kind));
            }
        };

        if circular.classification == CycleClassification::Error {
            fill(binding, ErrorKind::CircularReference);
            return CycleOutcome {
                cycle: index,
                status: CycleStatus::Rejected,
                iterations: 0,
            };
        }

        let max_iterations = circular.max_iterations.unwrap_or(0);
        let threshold = circular.convergence_threshold.unwrap_or(0.0);
        for coordinate in &members {
            binding.set(coordinate, EvaluatedValue::Number(0.0));
        }

        for iteration in 1..=max_iterations {
            let mut delta = 0.0_f64;
            for (&id, coordinate) in circular.members.iter().zip(&members) {
                let previous = numeric(&binding.value(coordinate)).unwrap_or(0.0);
                let value = self.compute(id, binding).unwrap_or(EvaluatedValue::Empty);
                let Some(current) = numeric(&value) else {
                    debug!(cycle = index, iteration, cell = %coordinate, "non-numeric value in iterative cycle");
                    fill(binding, ErrorKind::CircularReference);
                    return CycleOutcome {
                        cycle: index,
                        status: CycleStatus::NonNumeric,
                        iterations: iteration,
                    };
                };
                delta = delta.max((current - previous).abs());
                binding.set(coordinate, value);
            }
            if delta < threshold {
                debug!(cycle = index, iteration, "iterative cycle converged");
                return CycleOutcome {
                    cycle: index,
                    status: CycleStatus::Converged,
                    iterations: iteration,
                };
            }
        }

        fill(binding, ErrorKind::DidNotConverge);
        CycleOutcome {
            cycle: index,
            status: CycleStatus::DidNotConverge,
            iterations: max_iterations,
        }
    }
}

/// Iteration distance is only defined for numbers, dates, and blanks.
fn numeric(value: &EvaluatedValue) -> Option<f64> {
    match value {
        EvaluatedValue::Empty => Some(0.0),
        other => other.as_number(),
    }
}
