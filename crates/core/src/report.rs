//! Aggregated per-cell failures and their reach.

use std::collections::BTreeSet;

use serde::Serialize;
use sheetlogic_dag::{DependencyGraph, NodeId, NodeRole};
use sheetlogic_primitives::Coordinate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum IssueKind {
    ParseError,
    UnknownReference,
    ArityError,
    CircularReference,
    DidNotConverge,
    UnsupportedConstruct,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Issue {
    pub kind: IssueKind,
    pub cell: Coordinate,
    pub message: String,
    /// Character offset into the formula text, when the issue has one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<usize>,
    /// Cells forward-reachable from the failing cells.
    pub impacted: Vec<Coordinate>,
    /// Declared outputs among the failing and impacted cells.
    pub blocked_outputs: Vec<Coordinate>,
}

impl Issue {
    pub fn is_critical(&self) -> bool {
        !self.blocked_outputs.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImpactAnalysis {
    pub total_cells: usize,
    pub affected_cells: usize,
    pub percentage_affected: f64,
    pub blocked_outputs: Vec<Coordinate>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorReport {
    /// False once any failure reaches a declared output.
    pub can_proceed: bool,
    pub critical_errors: Vec<Issue>,
    pub warnings: Vec<Issue>,
    pub affected_cells: Vec<Coordinate>,
    pub impact_analysis: ImpactAnalysis,
}

impl ErrorReport {
    pub fn issues(&self) -> impl Iterator<Item = &Issue> {
        self.critical_errors.iter().chain(&self.warnings)
    }
}

/// Collects issues against one graph.
pub struct ReportBuilder<'a> {
    graph: &'a DependencyGraph,
    issues: Vec<Issue>,
    affected: BTreeSet<NodeId>,
}

impl<'a> ReportBuilder<'a> {
    pub fn new(graph: &'a DependencyGraph) -> Self {
        Self {
            graph,
            issues: Vec::new(),
            affected: BTreeSet::new(),
        }
    }

    /// Record an issue originating at `sources`. Returns the impacted cells.
    pub fn record(
        &mut self,
        kind: IssueKind,
        cell: Coordinate,
        message: impl Into<String>,
        position: Option<usize>,
        sources: &[NodeId],
    ) -> Vec<Coordinate> {
        let reached = self.graph.forward_reachable(sources.iter().copied());
        let impacted: Vec<Coordinate> = reached
            .iter()
            .filter(|&&id| !sources.contains(&id))
            .map(|&id| self.graph.node(id).coordinate.clone())
            .collect();
        let involved: BTreeSet<NodeId> = sources.iter().copied().chain(reached).collect();
        let blocked_outputs = involved
            .iter()
            .map(|&id| self.graph.node(id))
            .filter(|node| node.role == NodeRole::Output)
            .map(|node| node.coordinate.clone())
            .collect();
        self.affected.extend(involved);
        self.issues.push(Issue {
            kind,
            cell,
            message: message.into(),
            position,
            impacted: impacted.clone(),
            blocked_outputs,
        });
        impacted
    }

    pub fn finish(self) -> ErrorReport {
        let mut affected_cells: Vec<Coordinate> = self
            .affected
            .iter()
            .map(|&id| self.graph.node(id).coordinate.clone())
            .collect();
        affected_cells.sort();
        let blocked: BTreeSet<Coordinate> = self
            .issues
            .iter()
            .flat_map(|issue| issue.blocked_outputs.iter().cloned())
            .collect();
        let total_cells = self.graph.nodes().len();
        let percentage_affected = if total_cells == 0 {
            0.0
        } else {
            affected_cells.len() as f64 * 100.0 / total_cells as f64
        };
        let (critical_errors, warnings): (Vec<Issue>, Vec<Issue>) =
            self.issues.into_iter().partition(Issue::is_critical);

        ErrorReport {
            can_proceed: critical_errors.is_empty(),
            critical_errors,
            warnings,
            impact_analysis: ImpactAnalysis {
                total_cells,
                affected_cells: affected_cells.len(),
                percentage_affected,
                blocked_outputs: blocked.into_iter().collect(),
            },
            affected_cells,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sheetlogic_dag::{CellInput, GraphBuilder};
    use sheetlogic_formulas::{FormulaAst, Reference};
    use sheetlogic_primitives::RefTarget;

    fn at(a1: &str) -> Coordinate {
        Coordinate::from_a1("Sheet1", a1).unwrap()
    }

    fn refers_to(a1: &str) -> FormulaAst {
        FormulaAst::Reference(Reference::new(RefTarget::Cell(at(a1))))
    }

    #[test]
    fn test_failure_reaching_output_blocks() {
        // A1 (failed) -> B1 -> C1 (output); D1 -> E1 stays clean
        let mut builder = GraphBuilder::new();
        builder.add_cell(CellInput::failed(at("A1"), NodeRole::Formula)).unwrap();
        builder
            .add_cell(CellInput::formula(at("B1"), NodeRole::Formula, refers_to("A1")))
            .unwrap();
        builder
            .add_cell(CellInput::formula(at("C1"), NodeRole::Output, refers_to("B1")))
            .unwrap();
        builder.add_cell(CellInput::input(at("D1"))).unwrap();
        builder
            .add_cell(CellInput::formula(at("E1"), NodeRole::Output, refers_to("D1")))
            .unwrap();
        let graph = builder.build();

        let mut report = ReportBuilder::new(&graph);
        let impacted = report.record(IssueKind::ParseError, at("A1"), "unexpected token", Some(3), &[0]);
        assert_eq!(impacted, vec![at("B1"), at("C1")]);
        let report = report.finish();

        assert!(!report.can_proceed);
        assert_eq!(report.critical_errors.len(), 1);
        assert_eq!(report.affected_cells, vec![at("A1"), at("B1"), at("C1")]);
        assert_eq!(report.impact_analysis.total_cells, 5);
        assert_eq!(report.impact_analysis.percentage_affected, 60.0);
        assert_eq!(report.impact_analysis.blocked_outputs, vec![at("C1")]);
    }

    #[test]
    fn test_contained_failure_is_a_warning() {
        let mut builder = GraphBuilder::new();
        builder.add_cell(CellInput::failed(at("A1"), NodeRole::Formula)).unwrap();
        let graph = builder.build();
        let mut report = ReportBuilder::new(&graph);
        report.record(IssueKind::ArityError, at("A1"), "IF expects 2 to 3 arguments", Some(1), &[0]);
        let report = report.finish();
        assert!(report.can_proceed);
        assert_eq!(report.warnings.len(), 1);
        assert!(report.critical_errors.is_empty());
    }
}
