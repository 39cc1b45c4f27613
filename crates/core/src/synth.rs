//! Regression test synthesis.
//!
//! Every cluster gets one observed case from the stored inputs, then one case
//! per interesting perturbation of a single input. Identical bindings are
//! collapsed so each case exercises a distinct input vector.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;
use sheetlogic_dag::{Cluster, NodeId};
use sheetlogic_primitives::{Coordinate, EvaluatedValue};

use crate::evaluate::{ClusterEvaluator, ClusterRun};
use crate::snapshot::{CellRole, ClassifiedCell};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum TestOrigin {
    /// Stored workbook values.
    Observed,
    /// Zero, validation bounds, and one step past each bound.
    Boundary,
    /// One declared list option.
    Synthetic,
}

impl TestOrigin {
    pub fn label(self) -> &'static str {
        match self {
            Self::Observed => "observed",
            Self::Boundary => "boundary",
            Self::Synthetic => "synthetic",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TestCase {
    pub id: String,
    pub inputs: BTreeMap<Coordinate, EvaluatedValue>,
    pub expected_outputs: BTreeMap<Coordinate, EvaluatedValue>,
    pub origin: TestOrigin,
}

/// Test cases for one cluster plus everything the runs produced.
#[derive(Debug, Clone)]
pub struct ClusterSynthesis {
    pub tests: Vec<TestCase>,
    /// The observed run.
    pub observed: ClusterRun,
    /// Value of each formula node under every distinct binding.
    pub samples: HashMap<NodeId, Vec<EvaluatedValue>>,
}

#[derive(Debug, Clone, Copy)]
pub struct SynthesisSettings {
    pub boundary_step: f64,
    pub tolerance: f64,
}

pub struct TestSynthesizer<'a> {
    evaluator: ClusterEvaluator<'a>,
    cells: &'a HashMap<Coordinate, &'a ClassifiedCell>,
    settings: SynthesisSettings,
}

impl<'a> TestSynthesizer<'a> {
    pub fn new(
        evaluator: ClusterEvaluator<'a>,
        cells: &'a HashMap<Coordinate, &'a ClassifiedCell>,
        settings: SynthesisSettings,
    ) -> Self {
        Self {
            evaluator,
            cells,
            settings,
        }
    }

    pub fn synthesize(&self, cluster: &Cluster) -> ClusterSynthesis {
        let graph = self.evaluator.graph();
        let observed_inputs: BTreeMap<Coordinate, EvaluatedValue> = cluster
            .inputs
            .iter()
            .map(|&id| {
                let coordinate = &graph.node(id).coordinate;
                (coordinate.clone(), self.evaluator.constant(coordinate))
            })
            .collect();

        let mut bindings: Vec<(TestOrigin, BTreeMap<Coordinate, EvaluatedValue>)> =
            vec![(TestOrigin::Observed, observed_inputs.clone())];
        for (coordinate, current) in &observed_inputs {
            let Some(cell) = self.cells.get(coordinate).filter(|c| c.role == CellRole::Input) else {
                continue;
            };
            for (origin, value) in self.perturbations(cell, current) {
                let mut binding = observed_inputs.clone();
                binding.insert(coordinate.clone(), value);
                if !bindings
                    .iter()
                    .any(|(_, seen)| same_binding(seen, &binding, self.settings.tolerance))
                {
                    bindings.push((origin, binding));
                }
            }
        }

        let formula_nodes: Vec<NodeId> = graph
            .nodes()
            .iter()
            .filter(|n| cluster.contains(n.id) && (n.ast.is_some() || n.failed))
            .map(|n| n.id)
            .collect();

        let mut counters: HashMap<TestOrigin, usize> = HashMap::new();
        let mut samples: HashMap<NodeId, Vec<EvaluatedValue>> = HashMap::new();
        let mut tests = Vec::with_capacity(bindings.len());
        let mut observed = ClusterRun::default();

        for (origin, binding) in bindings {
            let run = self.evaluator.run(cluster, &binding);
            let value_of = |coordinate: &Coordinate| {
                run.computed
                    .get(coordinate)
                    .or_else(|| binding.get(coordinate))
                    .cloned()
                    .unwrap_or_else(|| self.evaluator.constant(coordinate))
            };

            for &id in &formula_nodes {
                let coordinate = &graph.node(id).coordinate;
                samples.entry(id).or_default().push(value_of(coordinate));
            }
            let expected_outputs = cluster
                .outputs
                .iter()
                .map(|&id| {
                    let coordinate = &graph.node(id).coordinate;
                    (coordinate.clone(), value_of(coordinate))
                })
                .collect();

            let counter = counters.entry(origin).or_default();
            tests.push(TestCase {
                id: format!("cluster{}_{}_{}", cluster.id, origin.label(), counter),
                inputs: binding,
                expected_outputs,
                origin,
            });
            *counter += 1;
            if origin == TestOrigin::Observed {
                observed = run;
            }
        }

        ClusterSynthesis {
            tests,
            observed,
            samples,
        }
    }

    /// Candidate values for one input, before deduplication.
    fn perturbations(&self, cell: &ClassifiedCell, current: &EvaluatedValue) -> Vec<(TestOrigin, EvaluatedValue)> {
        let mut out = Vec::new();
        if cell.is_numeric_input() {
            let as_date = cell.is_date() || matches!(current, EvaluatedValue::DateSerial(_));
            let wrap = |n: f64| {
                if as_date {
                    EvaluatedValue::DateSerial(n)
                } else {
                    EvaluatedValue::Number(n)
                }
            };
            let step = self.settings.boundary_step;
            let (min, max) = cell
                .validation
                .as_ref()
                .map_or((None, None), |v| (v.min, v.max));

            out.push((TestOrigin::Boundary, wrap(0.0)));
            if let Some(min) = min {
                out.push((TestOrigin::Boundary, wrap(min)));
                out.push((TestOrigin::Boundary, wrap(min - step)));
            }
            if let Some(max) = max {
                out.push((TestOrigin::Boundary, wrap(max)));
                out.push((TestOrigin::Boundary, wrap(max + step)));
            }
        }
        if let Some(validation) = &cell.validation {
            for option in &validation.options {
                out.push((TestOrigin::Synthetic, option.to_evaluated(cell.is_date())));
            }
        }
        out
    }
}

fn same_binding(
    a: &BTreeMap<Coordinate, EvaluatedValue>,
    b: &BTreeMap<Coordinate, EvaluatedValue>,
    tolerance: f64,
) -> bool {
    a.len() == b.len()
        && a.iter().zip(b).all(|((ka, va), (kb, vb))| {
            ka == kb
                && match (va, vb) {
                    (EvaluatedValue::Number(x), EvaluatedValue::Number(y))
                    | (EvaluatedValue::DateSerial(x), EvaluatedValue::DateSerial(y)) => (x - y).abs() <= tolerance,
                    _ => va == vb,
                }
        })
}
