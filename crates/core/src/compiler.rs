//! The compile pipeline: parse, build the graph, evaluate clusters, synthesize
//! tests, and aggregate failures.

use std::collections::{BTreeMap, HashMap};

use indexmap::IndexMap;
use rayon::prelude::*;
use serde::Serialize;
use sheetlogic_dag::{
    CellInput, Cluster, CycleClassification, DependencyGraph, GraphBuilder, NodeId, NodeRole,
};
use sheetlogic_formulas::{
    CompiledFormula, FormulaAst, FormulaEngine, FormulaError, UnsupportedConstruct, UnsupportedReason,
};
use sheetlogic_primitives::{Coordinate, EvaluatedValue};
use tracing::{debug, info, info_span, warn};

use crate::enrich::{Enrichment, RuleEnricher};
use crate::error::CompileResult;
use crate::evaluate::{ClusterEvaluator, Constants, CycleOutcome, CycleStatus};
use crate::inference::{infer, TypeInference};
use crate::options::CompilerOptions;
use crate::report::{ErrorReport, IssueKind, ReportBuilder};
use crate::snapshot::{CellRole, ClassifiedCell, WorkbookSnapshot};
use crate::synth::{ClusterSynthesis, SynthesisSettings, TestCase, TestSynthesizer};

/// Extracted logic for one formula cell.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CellLogic {
    pub coordinate: Coordinate,
    pub role: NodeRole,
    /// Formula text as written in the workbook.
    pub source: String,
    /// Canonical formula text, absent when the formula failed to compile.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub formula: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ast: Option<FormulaAst>,
    /// Value under the stored inputs.
    pub value: EvaluatedValue,
    pub inferred: TypeInference,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub depth: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnsupportedFeature {
    pub cell: Coordinate,
    pub function: String,
    pub position: usize,
    pub reason: UnsupportedReason,
    /// Cells forward-reachable from `cell`.
    pub impacted: Vec<Coordinate>,
}

/// Everything extracted from one cluster.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogicExtractionResult {
    pub cluster_id: usize,
    pub inputs: Vec<Coordinate>,
    pub outputs: Vec<Coordinate>,
    /// Formula cells in snapshot order.
    pub cells: IndexMap<Coordinate, CellLogic>,
    pub tests: Vec<TestCase>,
    pub unsupported_features: Vec<UnsupportedFeature>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub cycles: Vec<CycleOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enrichment: Option<Enrichment>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompilationOutput {
    pub graph: DependencyGraph,
    pub results: Vec<LogicExtractionResult>,
    pub errors: ErrorReport,
}

impl CompilationOutput {
    pub fn can_proceed(&self) -> bool {
        self.errors.can_proceed
    }

    pub fn result_for(&self, coordinate: &Coordinate) -> Option<&LogicExtractionResult> {
        let id = self.graph.node_id(coordinate)?;
        let cluster = self.graph.node(id).cluster_id;
        self.results.iter().find(|r| r.cluster_id == cluster)
    }

    /// Observed value of a formula cell.
    pub fn value(&self, coordinate: &Coordinate) -> Option<&EvaluatedValue> {
        self.result_for(coordinate)?
            .cells
            .get(coordinate)
            .map(|cell| &cell.value)
    }

    pub fn test_count(&self) -> usize {
        self.results.iter().map(|r| r.tests.len()).sum()
    }
}

/// Compiles classified workbooks. Stateless between snapshots.
#[derive(Debug, Clone, Default)]
pub struct Compiler {
    options: CompilerOptions,
}

impl Compiler {
    pub fn new(options: CompilerOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &CompilerOptions {
        &self.options
    }

    pub fn compile(&self, snapshot: &WorkbookSnapshot) -> CompileResult<CompilationOutput> {
        self.run(snapshot, None)
    }

    /// Compile, then annotate each cluster with `enricher`. Enricher
    /// failures are logged and leave the result unannotated.
    pub fn compile_with_enricher(
        &self,
        snapshot: &WorkbookSnapshot,
        enricher: &dyn RuleEnricher,
    ) -> CompileResult<CompilationOutput> {
        self.run(snapshot, Some(enricher))
    }

    fn run(
        &self,
        snapshot: &WorkbookSnapshot,
        enricher: Option<&dyn RuleEnricher>,
    ) -> CompileResult<CompilationOutput> {
        let _span = info_span!("compile", cells = snapshot.cells.len()).entered();
        let resolver = snapshot.resolver()?;
        let snapshot = snapshot.with_canonical_sheets(&resolver);
        snapshot.validate()?;
        let engine = FormulaEngine::new(resolver, self.options.eval_options());

        let mut parsed = self.parse_cells(&snapshot, &engine);
        let BuiltGraph {
            graph,
            compiled,
            failures,
        } = self.build_graph(&snapshot, &mut parsed)?;
        let constants = constants(&snapshot);
        let cells: HashMap<Coordinate, &ClassifiedCell> = snapshot
            .cells
            .iter()
            .map(|cell| (cell.coordinate.clone(), cell))
            .collect();

        let evaluator = ClusterEvaluator::new(&graph, &engine, &constants);
        let synthesizer = TestSynthesizer::new(
            evaluator,
            &cells,
            SynthesisSettings {
                boundary_step: self.options.boundary_step,
                tolerance: self.options.numeric_tolerance,
            },
        );
        let clusters: Vec<&Cluster> = graph
            .clusters()
            .iter()
            .filter(|cluster| has_logic(&graph, cluster))
            .collect();
        let synthesize = |cluster: &&Cluster| {
            let _span = info_span!("evaluate_cluster", cluster = cluster.id).entered();
            let synthesis = synthesizer.synthesize(cluster);
            debug!(tests = synthesis.tests.len(), "cluster evaluated");
            synthesis
        };
        let syntheses: Vec<ClusterSynthesis> = if self.options.parallel {
            clusters.par_iter().map(synthesize).collect()
        } else {
            clusters.iter().map(synthesize).collect()
        };

        let mut report = ReportBuilder::new(&graph);
        record_failures(&mut report, &graph, &failures);
        record_cycles(&mut report, &graph, &syntheses);
        let mut unsupported = record_unsupported(&mut report, &graph, &compiled);
        let errors = report.finish();

        let mut results: Vec<LogicExtractionResult> = clusters
            .iter()
            .zip(syntheses)
            .map(|(cluster, synthesis)| {
                extract(
                    &graph,
                    cluster,
                    synthesis,
                    &cells,
                    &compiled,
                    unsupported.remove(&cluster.id).unwrap_or_default(),
                    &constants,
                )
            })
            .collect();

        if let Some(enricher) = enricher {
            for result in &mut results {
                match enricher.enrich(result) {
                    Ok(enrichment) => result.enrichment = Some(enrichment),
                    Err(err) => {
                        warn!(cluster = result.cluster_id, error = %err, "enrichment failed, continuing without it");
                    }
                }
            }
        }

        info!(
            clusters = results.len(),
            tests = results.iter().map(|r| r.tests.len()).sum::<usize>(),
            can_proceed = errors.can_proceed,
            "compilation finished"
        );
        Ok(CompilationOutput {
            graph,
            results,
            errors,
        })
    }

    fn parse_cells(
        &self,
        snapshot: &WorkbookSnapshot,
        engine: &FormulaEngine,
    ) -> HashMap<Coordinate, Result<CompiledFormula, FormulaError>> {
        let formula_cells: Vec<&ClassifiedCell> = snapshot
            .cells
            .iter()
            .filter(|cell| cell.role != CellRole::Label && cell.has_formula())
            .collect();
        let parse = |cell: &&ClassifiedCell| {
            let text = cell.raw_formula.as_deref().unwrap_or_default();
            (cell.coordinate.clone(), engine.compile(text, &cell.coordinate.sheet))
        };
        let parsed: HashMap<_, _> = if self.options.parallel {
            formula_cells.par_iter().map(parse).collect()
        } else {
            formula_cells.iter().map(parse).collect()
        };

        let failed = parsed.values().filter(|r| r.is_err()).count();
        info!(formulas = parsed.len(), failed, "formulas parsed");
        parsed
    }

    fn build_graph(
        &self,
        snapshot: &WorkbookSnapshot,
        parsed: &mut HashMap<Coordinate, Result<CompiledFormula, FormulaError>>,
    ) -> CompileResult<BuiltGraph> {
        let mut builder = GraphBuilder::new();
        let mut compiled = Vec::new();
        let mut failures = Vec::new();

        for cell in &snapshot.cells {
            let Some(role) = cell.role.node_role(cell.has_formula()) else {
                continue;
            };
            let coordinate = cell.coordinate.clone();
            let input = match parsed.remove(&coordinate) {
                Some(Ok(formula)) => {
                    let iterative = cell
                        .iterative
                        .or(snapshot.iterative)
                        .or(self.options.default_iterative);
                    let input = CellInput::formula(coordinate, role, formula.ast.clone())
                        .with_iterative(iterative);
                    compiled.push((cell.coordinate.clone(), formula));
                    input
                }
                Some(Err(err)) => {
                    warn!(cell = %coordinate, error = %err, "formula failed to compile");
                    failures.push((cell.coordinate.clone(), err));
                    CellInput::failed(coordinate, role)
                }
                None => CellInput {
                    role,
                    ..CellInput::input(coordinate)
                },
            };
            builder.add_cell(input)?;
        }

        let graph = builder.build();
        let compiled = compiled
            .into_iter()
            .filter_map(|(coordinate, formula)| Some((graph.node_id(&coordinate)?, formula)))
            .collect();
        let failures = failures
            .into_iter()
            .filter_map(|(coordinate, err)| Some((graph.node_id(&coordinate)?, err)))
            .collect();
        Ok(BuiltGraph {
            graph,
            compiled,
            failures,
        })
    }
}

struct BuiltGraph {
    graph: DependencyGraph,
    compiled: BTreeMap<NodeId, CompiledFormula>,
    failures: Vec<(NodeId, FormulaError)>,
}

/// Cells that produced a compiled formula node, in snapshot order.
fn graph_formula(cell: &ClassifiedCell) -> bool {
    cell.role != CellRole::Label && cell.has_formula()
}

/// Values of every cell that is not computed by a formula.
fn constants(snapshot: &WorkbookSnapshot) -> Constants {
    snapshot
        .cells
        .iter()
        .filter(|cell| !graph_formula(cell))
        .map(|cell| (cell.coordinate.clone(), cell.evaluated_value()))
        .filter(|(_, value)| *value != EvaluatedValue::Empty)
        .collect()
}

fn has_logic(graph: &DependencyGraph, cluster: &Cluster) -> bool {
    cluster
        .intermediates
        .iter()
        .chain(&cluster.outputs)
        .any(|&id| {
            let node = graph.node(id);
            node.ast.is_some() || node.failed
        })
}

fn record_failures(report: &mut ReportBuilder<'_>, graph: &DependencyGraph, failures: &[(NodeId, FormulaError)]) {
    for (id, err) in failures {
        let kind = match err {
            FormulaError::Parse { .. } => IssueKind::ParseError,
            FormulaError::UnknownReference { .. } => IssueKind::UnknownReference,
            FormulaError::Arity { .. } => IssueKind::ArityError,
        };
        report.record(
            kind,
            graph.node(*id).coordinate.clone(),
            err.to_string(),
            Some(err.position()),
            &[*id],
        );
    }
}

fn record_cycles(report: &mut ReportBuilder<'_>, graph: &DependencyGraph, syntheses: &[ClusterSynthesis]) {
    for circular in graph.circular_refs() {
        if circular.classification == CycleClassification::Error {
            let path: Vec<String> = circular.cycle.iter().map(ToString::to_string).collect();
            warn!(cycle = %path.join(" -> "), "circular reference");
            report.record(
                IssueKind::CircularReference,
                circular.cycle[0].clone(),
                format!("circular reference: {}", path.join(" -> ")),
                None,
                &circular.members,
            );
        }
    }

    for outcome in syntheses.iter().flat_map(|s| &s.observed.cycles) {
        let circular = &graph.circular_refs()[outcome.cycle];
        let (kind, message) = match outcome.status {
            CycleStatus::Rejected | CycleStatus::Converged => continue,
            CycleStatus::DidNotConverge => (
                IssueKind::DidNotConverge,
                format!("iterative cycle did not converge after {} iterations", outcome.iterations),
            ),
            CycleStatus::NonNumeric => (
                IssueKind::CircularReference,
                format!("iterative cycle produced a non-numeric value at iteration {}", outcome.iterations),
            ),
        };
        warn!(cell = %circular.cycle[0], "{message}");
        report.record(kind, circular.cycle[0].clone(), message, None, &circular.members);
    }
}

fn record_unsupported(
    report: &mut ReportBuilder<'_>,
    graph: &DependencyGraph,
    compiled: &BTreeMap<NodeId, CompiledFormula>,
) -> HashMap<usize, Vec<UnsupportedFeature>> {
    let mut by_cluster: HashMap<usize, Vec<UnsupportedFeature>> = HashMap::new();
    for (&id, formula) in compiled {
        let node = graph.node(id);
        for UnsupportedConstruct {
            position,
            function,
            reason,
        } in &formula.unsupported
        {
            let message = match reason {
                UnsupportedReason::DynamicReference => {
                    format!("{function} computes its reference at runtime")
                }
                UnsupportedReason::UnknownFunction => format!("unknown function {function}"),
            };
            warn!(cell = %node.coordinate, position, "{message}");
            let impacted = report.record(
                IssueKind::UnsupportedConstruct,
                node.coordinate.clone(),
                message,
                Some(*position),
                &[id],
            );
            by_cluster.entry(node.cluster_id).or_default().push(UnsupportedFeature {
                cell: node.coordinate.clone(),
                function: function.clone(),
                position: *position,
                reason: *reason,
                impacted,
            });
        }
    }
    by_cluster
}

fn extract(
    graph: &DependencyGraph,
    cluster: &Cluster,
    synthesis: ClusterSynthesis,
    cells: &HashMap<Coordinate, &ClassifiedCell>,
    compiled: &BTreeMap<NodeId, CompiledFormula>,
    unsupported_features: Vec<UnsupportedFeature>,
    constants: &Constants,
) -> LogicExtractionResult {
    let coordinates = |ids: &[NodeId]| -> Vec<Coordinate> {
        ids.iter().map(|&id| graph.node(id).coordinate.clone()).collect()
    };
    let empty = Vec::new();

    let mut logic = IndexMap::new();
    let mut ids: Vec<NodeId> = cluster.intermediates.iter().chain(&cluster.outputs).copied().collect();
    ids.sort_unstable();
    for id in ids {
        let node = graph.node(id);
        if node.ast.is_none() && !node.failed {
            continue;
        }
        let coordinate = node.coordinate.clone();
        let value = synthesis
            .observed
            .computed
            .get(&coordinate)
            .cloned()
            .unwrap_or_else(|| constants.get(&coordinate).cloned().unwrap_or(EvaluatedValue::Empty));
        let source = cells
            .get(&coordinate)
            .and_then(|cell| cell.raw_formula.clone())
            .unwrap_or_default();
        logic.insert(
            coordinate.clone(),
            CellLogic {
                coordinate: coordinate.clone(),
                role: node.role,
                source,
                formula: node.ast.as_ref().map(|ast| ast.to_formula(&coordinate.sheet)),
                ast: compiled.get(&id).map(|f| f.ast.clone()),
                value,
                inferred: infer(synthesis.samples.get(&id).unwrap_or(&empty)),
                depth: node.depth,
            },
        );
    }

    LogicExtractionResult {
        cluster_id: cluster.id,
        inputs: coordinates(&cluster.inputs),
        outputs: coordinates(&cluster.outputs),
        cells: logic,
        tests: synthesis.tests,
        unsupported_features,
        cycles: synthesis.observed.cycles,
        enrichment: None,
    }
}
