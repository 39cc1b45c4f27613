//! Dependency graph for spreadsheet formula cells.
//!
//! Nodes live in a dense arena indexed by [`NodeId`]. Edges, clusters, and
//! cycles refer to nodes by id only, so the graph serializes as plain data.
//! The graph is built once per snapshot and never mutated afterwards.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};

use serde::{Deserialize, Serialize};
use sheetlogic_formulas::{FormulaAst, Reference};
use sheetlogic_primitives::{Coordinate, RefTarget};
use tracing::{debug, info};

mod scc;
mod union_find;

use union_find::UnionFind;

pub type NodeId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NodeRole {
    Input,
    Formula,
    Output,
}

/// Per-cell permission to resolve a circular reference by iteration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IterativeSettings {
    pub max_iterations: u32,
    pub convergence_threshold: f64,
}

impl IterativeSettings {
    /// Combine two members' settings, keeping the stricter of each bound.
    pub fn strictest(self, other: Self) -> Self {
        Self {
            max_iterations: self.max_iterations.min(other.max_iterations),
            convergence_threshold: self.convergence_threshold.min(other.convergence_threshold),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EdgeKind {
    /// Same-sheet single cell.
    Direct,
    /// Same-sheet cell inside a referenced range.
    Range,
    /// Cell reached through a named range.
    Named,
    /// Cell on another sheet.
    CrossSheet,
}

/// Dependency edge, directed from the referenced cell to the referencing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub from: NodeId,
    pub to: NodeId,
    pub kind: EdgeKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphNode {
    pub id: NodeId,
    pub coordinate: Coordinate,
    pub role: NodeRole,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub ast: Option<FormulaAst>,
    pub in_degree: usize,
    pub out_degree: usize,
    /// Longest path from a source node. `None` for cycle members.
    pub depth: Option<usize>,
    pub cluster_id: usize,
    /// The cell's formula failed to compile. It has no precedents but keeps
    /// its dependents.
    #[serde(default)]
    pub failed: bool,
    /// Referenced by a formula but absent from the classified cells.
    #[serde(default)]
    pub implicit: bool,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub iterative: Option<IterativeSettings>,
    pub precedents: Vec<NodeId>,
    pub dependents: Vec<NodeId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CycleClassification {
    Error,
    Iterative,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CircularRef {
    /// Member coordinates in row-major order.
    pub cycle: Vec<Coordinate>,
    /// Member ids, parallel to `cycle`.
    pub members: Vec<NodeId>,
    pub classification: CycleClassification,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub max_iterations: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub convergence_threshold: Option<f64>,
}

/// One unit of evaluation work: a single acyclic node or a whole cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ScheduleStep {
    Node(NodeId),
    /// Index into [`DependencyGraph::circular_refs`].
    Cycle(usize),
}

/// A weakly-connected component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cluster {
    pub id: usize,
    pub inputs: Vec<NodeId>,
    /// Declared outputs plus formulas nothing else depends on.
    pub outputs: Vec<NodeId>,
    pub intermediates: Vec<NodeId>,
    /// This cluster's share of the global schedule.
    pub schedule: Vec<ScheduleStep>,
}

impl Cluster {
    pub fn len(&self) -> usize {
        self.inputs.len() + self.outputs.len() + self.intermediates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.inputs.contains(&id) || self.outputs.contains(&id) || self.intermediates.contains(&id)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DagError {
    #[error("cell {0} added to the graph twice")]
    DuplicateNode(Coordinate),
    #[error("cell {0} is not a graph node")]
    UnknownNode(Coordinate),
}

/// A classified cell handed to the builder.
#[derive(Debug, Clone, PartialEq)]
pub struct CellInput {
    pub coordinate: Coordinate,
    pub role: NodeRole,
    pub ast: Option<FormulaAst>,
    pub failed: bool,
    pub iterative: Option<IterativeSettings>,
}

impl CellInput {
    pub fn input(coordinate: Coordinate) -> Self {
        Self {
            coordinate,
            role: NodeRole::Input,
            ast: None,
            failed: false,
            iterative: None,
        }
    }

    pub fn formula(coordinate: Coordinate, role: NodeRole, ast: FormulaAst) -> Self {
        Self {
            coordinate,
            role,
            ast: Some(ast),
            failed: false,
            iterative: None,
        }
    }

    /// A formula cell whose text could not be compiled.
    pub fn failed(coordinate: Coordinate, role: NodeRole) -> Self {
        Self {
            coordinate,
            role,
            ast: None,
            failed: true,
            iterative: None,
        }
    }

    pub fn with_iterative(mut self, settings: Option<IterativeSettings>) -> Self {
        self.iterative = settings;
        self
    }
}

/// Collects cells, then links and orders them in [`GraphBuilder::build`].
#[derive(Debug, Default)]
pub struct GraphBuilder {
    nodes: Vec<GraphNode>,
    index: BTreeMap<Coordinate, NodeId>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_cell(&mut self, cell: CellInput) -> Result<NodeId, DagError> {
        if self.index.contains_key(&cell.coordinate) {
            return Err(DagError::DuplicateNode(cell.coordinate));
        }
        Ok(self.push_node(cell, false))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn push_node(&mut self, cell: CellInput, implicit: bool) -> NodeId {
        let id = self.nodes.len();
        self.index.insert(cell.coordinate.clone(), id);
        self.nodes.push(GraphNode {
            id,
            coordinate: cell.coordinate,
            role: cell.role,
            ast: cell.ast,
            in_degree: 0,
            out_degree: 0,
            depth: None,
            cluster_id: 0,
            failed: cell.failed,
            implicit,
            iterative: cell.iterative,
            precedents: Vec::new(),
            dependents: Vec::new(),
        });
        id
    }

    /// One edge per touched coordinate, deduplicated per (from, to) pair.
    ///
    /// Single-cell references to unknown cells create implicit input nodes
    /// before any range is looked at. Ranges then link every node inside
    /// them, found through the row-major index without walking the range.
    fn collect_edges(&mut self) -> Vec<Edge> {
        let mut pending: Vec<(NodeId, RefTarget, EdgeKind)> = Vec::new();
        for node in &self.nodes {
            let Some(ast) = &node.ast else {
                continue;
            };
            ast.for_each_reference(&mut |reference| {
                let kind = edge_kind(reference, &node.coordinate.sheet);
                pending.push((node.id, reference.target.clone(), kind));
            });
        }

        for (_, target, _) in &pending {
            if let RefTarget::Cell(coord) = target {
                if !self.index.contains_key(coord) {
                    self.push_node(CellInput::input(coord.clone()), true);
                }
            }
        }

        let mut seen = HashSet::new();
        let mut edges = Vec::new();
        for (to, target, kind) in pending {
            match &target {
                RefTarget::Cell(coord) => {
                    let Some(&from) = self.index.get(coord) else {
                        continue;
                    };
                    if seen.insert((from, to)) {
                        edges.push(Edge { from, to, kind });
                    }
                }
                RefTarget::Range(range) => {
                    let members: Vec<NodeId> = self
                        .index
                        .range(range.start().clone()..=range.end().clone())
                        .filter(|(coord, _)| range.contains(coord))
                        .map(|(_, &id)| id)
                        .collect();
                    for from in members {
                        if seen.insert((from, to)) {
                            edges.push(Edge { from, to, kind });
                        }
                    }
                }
            }
        }
        edges
    }

    pub fn build(mut self) -> DependencyGraph {
        let edges = self.collect_edges();
        for edge in &edges {
            self.nodes[edge.from].dependents.push(edge.to);
            self.nodes[edge.to].precedents.push(edge.from);
        }
        for node in &mut self.nodes {
            node.in_degree = node.precedents.len();
            node.out_degree = node.dependents.len();
        }

        let (schedule, cycles) = plan(&self.nodes);
        let mut cycle_index = vec![None; self.nodes.len()];
        for (c, members) in cycles.iter().enumerate() {
            for &id in members {
                cycle_index[id] = Some(c);
            }
        }

        assign_depths(&mut self.nodes, &schedule, &cycles, &cycle_index);
        let circular_refs: Vec<CircularRef> = cycles
            .iter()
            .map(|members| classify(&self.nodes, members))
            .collect();
        let clusters = assign_clusters(&mut self.nodes, &edges, &schedule, &circular_refs);

        let order: Vec<NodeId> = schedule
            .iter()
            .filter_map(|step| match step {
                ScheduleStep::Node(id) => Some(*id),
                ScheduleStep::Cycle(_) => None,
            })
            .collect();

        for circular in &circular_refs {
            debug!(
                cycle = ?circular.cycle.iter().map(ToString::to_string).collect::<Vec<_>>(),
                classification = ?circular.classification,
                "circular reference"
            );
        }
        info!(
            nodes = self.nodes.len(),
            edges = edges.len(),
            cycles = circular_refs.len(),
            clusters = clusters.len(),
            "dependency graph built"
        );

        DependencyGraph {
            nodes: self.nodes,
            edges,
            order,
            schedule,
            circular_refs,
            clusters,
            index: self.index,
            cycle_index,
        }
    }
}

fn edge_kind(reference: &Reference, sheet: &str) -> EdgeKind {
    if reference.name.is_some() {
        EdgeKind::Named
    } else if reference.target.sheet() != sheet {
        EdgeKind::CrossSheet
    } else {
        match reference.target {
            RefTarget::Cell(_) => EdgeKind::Direct,
            RefTarget::Range(_) => EdgeKind::Range,
        }
    }
}

/// Kahn's algorithm, then the same over the residue with each strongly
/// connected component collapsed to one unit. Returns the schedule and the
/// member lists of every cycle, in schedule order.
fn plan(nodes: &[GraphNode]) -> (Vec<ScheduleStep>, Vec<Vec<NodeId>>) {
    let n = nodes.len();
    let mut remaining: Vec<usize> = nodes.iter().map(|node| node.in_degree).collect();
    let mut queue: VecDeque<NodeId> = (0..n).filter(|&id| remaining[id] == 0).collect();
    let mut placed = vec![false; n];
    let mut steps = Vec::with_capacity(n);

    while let Some(id) = queue.pop_front() {
        placed[id] = true;
        steps.push(ScheduleStep::Node(id));
        for &dep in &nodes[id].dependents {
            remaining[dep] -= 1;
            if remaining[dep] == 0 {
                queue.push_back(dep);
            }
        }
    }
    if steps.len() == n {
        return (steps, Vec::new());
    }

    // everything left is on a cycle or downstream of one
    let residue: Vec<NodeId> = (0..n).filter(|&id| !placed[id]).collect();
    let included: Vec<bool> = placed.iter().map(|p| !p).collect();
    let adjacency: Vec<Vec<NodeId>> = nodes.iter().map(|node| node.dependents.clone()).collect();
    let mut components = scc::strongly_connected(&residue, &adjacency, &included);
    for component in &mut components {
        component.sort_unstable();
    }
    components.sort_by_key(|component| component[0]);

    let mut unit_of = vec![usize::MAX; n];
    for (unit, component) in components.iter().enumerate() {
        for &id in component {
            unit_of[id] = unit;
        }
    }
    let is_cycle: Vec<bool> = components
        .iter()
        .map(|c| c.len() > 1 || nodes[c[0]].dependents.contains(&c[0]))
        .collect();

    let mut unit_in = vec![0usize; components.len()];
    for &id in &residue {
        for &dep in &nodes[id].dependents {
            if included[dep] && unit_of[dep] != unit_of[id] {
                unit_in[unit_of[dep]] += 1;
            }
        }
    }

    let mut cycles = Vec::new();
    let mut queue: VecDeque<usize> = (0..components.len()).filter(|&u| unit_in[u] == 0).collect();
    while let Some(unit) = queue.pop_front() {
        if is_cycle[unit] {
            steps.push(ScheduleStep::Cycle(cycles.len()));
            cycles.push(components[unit].clone());
        } else {
            steps.push(ScheduleStep::Node(components[unit][0]));
        }
        for &id in &components[unit] {
            for &dep in &nodes[id].dependents {
                if !included[dep] {
                    continue;
                }
                let next = unit_of[dep];
                if next != unit {
                    unit_in[next] -= 1;
                    if unit_in[next] == 0 {
                        queue.push_back(next);
                    }
                }
            }
        }
    }

    (steps, cycles)
}

// Longest path over the condensation. A cycle counts as one unit so nodes
// behind it still get a depth; its members do not.
fn assign_depths(
    nodes: &mut [GraphNode],
    schedule: &[ScheduleStep],
    cycles: &[Vec<NodeId>],
    cycle_index: &[Option<usize>],
) {
    let mut unit_depth = vec![0usize; nodes.len()];
    for step in schedule {
        match *step {
            ScheduleStep::Node(id) => {
                let depth = nodes[id]
                    .precedents
                    .iter()
                    .map(|&p| unit_depth[p] + 1)
                    .max()
                    .unwrap_or(0);
                unit_depth[id] = depth;
                nodes[id].depth = Some(depth);
            }
            ScheduleStep::Cycle(c) => {
                let depth = cycles[c]
                    .iter()
                    .flat_map(|&m| nodes[m].precedents.iter())
                    .filter(|&&p| cycle_index[p] != Some(c))
                    .map(|&p| unit_depth[p] + 1)
                    .max()
                    .unwrap_or(0);
                for &m in &cycles[c] {
                    unit_depth[m] = depth;
                }
            }
        }
    }
}

/// Iterative only when every member opted in; the strictest settings win.
fn classify(nodes: &[GraphNode], members: &[NodeId]) -> CircularRef {
    let mut members = members.to_vec();
    members.sort_by(|a, b| nodes[*a].coordinate.cmp(&nodes[*b].coordinate));
    let cycle = members.iter().map(|&id| nodes[id].coordinate.clone()).collect();

    let settings = members
        .iter()
        .map(|&id| nodes[id].iterative)
        .collect::<Option<Vec<_>>>()
        .and_then(|all| all.into_iter().reduce(IterativeSettings::strictest));

    match settings {
        Some(settings) => CircularRef {
            cycle,
            members,
            classification: CycleClassification::Iterative,
            max_iterations: Some(settings.max_iterations),
            convergence_threshold: Some(settings.convergence_threshold),
        },
        None => CircularRef {
            cycle,
            members,
            classification: CycleClassification::Error,
            max_iterations: None,
            convergence_threshold: None,
        },
    }
}

fn assign_clusters(
    nodes: &mut [GraphNode],
    edges: &[Edge],
    schedule: &[ScheduleStep],
    circular_refs: &[CircularRef],
) -> Vec<Cluster> {
    let mut uf = UnionFind::new(nodes.len());
    for edge in edges {
        uf.union(edge.from, edge.to);
    }

    let mut by_root: HashMap<usize, usize> = HashMap::new();
    let mut clusters: Vec<Cluster> = Vec::new();
    for node in nodes.iter_mut() {
        let root = uf.find(node.id);
        let id = *by_root.entry(root).or_insert_with(|| {
            clusters.push(Cluster {
                id: clusters.len(),
                inputs: Vec::new(),
                outputs: Vec::new(),
                intermediates: Vec::new(),
                schedule: Vec::new(),
            });
            clusters.len() - 1
        });
        node.cluster_id = id;
        let cluster = &mut clusters[id];
        match node.role {
            NodeRole::Input => cluster.inputs.push(node.id),
            NodeRole::Output => cluster.outputs.push(node.id),
            NodeRole::Formula if node.out_degree == 0 => cluster.outputs.push(node.id),
            NodeRole::Formula => cluster.intermediates.push(node.id),
        }
    }

    for step in schedule {
        let owner = match *step {
            ScheduleStep::Node(id) => nodes[id].cluster_id,
            ScheduleStep::Cycle(c) => nodes[circular_refs[c].members[0]].cluster_id,
        };
        clusters[owner].schedule.push(*step);
    }
    clusters
}

/// The validated graph for one workbook snapshot.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencyGraph {
    nodes: Vec<GraphNode>,
    edges: Vec<Edge>,
    /// Topological order of every node outside a cycle.
    #[serde(rename = "topologicalOrder")]
    order: Vec<NodeId>,
    schedule: Vec<ScheduleStep>,
    circular_refs: Vec<CircularRef>,
    clusters: Vec<Cluster>,
    #[serde(skip)]
    index: BTreeMap<Coordinate, NodeId>,
    #[serde(skip)]
    cycle_index: Vec<Option<usize>>,
}

impl DependencyGraph {
    pub fn nodes(&self) -> &[GraphNode] {
        &self.nodes
    }

    pub fn node(&self, id: NodeId) -> &GraphNode {
        &self.nodes[id]
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn topological_order(&self) -> &[NodeId] {
        &self.order
    }

    pub fn schedule(&self) -> &[ScheduleStep] {
        &self.schedule
    }

    pub fn circular_refs(&self) -> &[CircularRef] {
        &self.circular_refs
    }

    pub fn clusters(&self) -> &[Cluster] {
        &self.clusters
    }

    pub fn node_id(&self, coordinate: &Coordinate) -> Option<NodeId> {
        self.index.get(coordinate).copied()
    }

    pub fn require(&self, coordinate: &Coordinate) -> Result<NodeId, DagError> {
        self.node_id(coordinate)
            .ok_or_else(|| DagError::UnknownNode(coordinate.clone()))
    }

    /// Index into [`Self::circular_refs`] of the cycle containing `id`.
    pub fn cycle_of(&self, id: NodeId) -> Option<usize> {
        self.cycle_index[id]
    }

    pub fn is_acyclic(&self) -> bool {
        self.circular_refs.is_empty()
    }

    /// Every node reachable from `starts` along dependent edges. A start node
    /// is only included when it is reachable from another start or itself.
    pub fn forward_reachable(&self, starts: impl IntoIterator<Item = NodeId>) -> BTreeSet<NodeId> {
        let mut reached = BTreeSet::new();
        let mut queue: VecDeque<NodeId> = VecDeque::new();
        for start in starts {
            queue.extend(self.nodes[start].dependents.iter().copied());
        }
        while let Some(id) = queue.pop_front() {
            if reached.insert(id) {
                queue.extend(self.nodes[id].dependents.iter().copied());
            }
        }
        reached
    }

    /// Forward reachability keyed by coordinate.
    pub fn dependents_of(&self, coordinate: &Coordinate) -> Result<BTreeSet<NodeId>, DagError> {
        let id = self.require(coordinate)?;
        Ok(self.forward_reachable([id]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sheetlogic_formulas::BinaryOperator;
    use sheetlogic_primitives::Range;

    fn at(a1: &str) -> Coordinate {
        Coordinate::from_a1("Sheet1", a1).unwrap()
    }

    fn cell_ref(coord: Coordinate) -> FormulaAst {
        FormulaAst::Reference(Reference::new(RefTarget::Cell(coord)))
    }

    fn add(left: FormulaAst, right: FormulaAst) -> FormulaAst {
        FormulaAst::BinaryOp {
            op: BinaryOperator::Add,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    fn one() -> FormulaAst {
        FormulaAst::Literal(sheetlogic_primitives::EvaluatedValue::Number(1.0))
    }

    #[test]
    fn test_edge_kinds() {
        let mut builder = GraphBuilder::new();
        builder.add_cell(CellInput::input(at("A1"))).unwrap();
        builder.add_cell(CellInput::input(at("A2"))).unwrap();
        builder
            .add_cell(CellInput::input(Coordinate::new("Other", 1, 1)))
            .unwrap();
        let range = Range::new(at("A1"), at("A2")).unwrap();
        let ast = FormulaAst::FunctionCall {
            name: "SUM".into(),
            args: vec![
                FormulaAst::Reference(Reference::new(RefTarget::Range(range))),
                cell_ref(Coordinate::new("Other", 1, 1)),
                FormulaAst::Reference(Reference::named("Rate", RefTarget::Cell(at("A1")))),
            ],
        };
        builder
            .add_cell(CellInput::formula(at("B1"), NodeRole::Output, ast))
            .unwrap();
        let graph = builder.build();

        let kinds: Vec<EdgeKind> = graph.edges().iter().map(|e| e.kind).collect();
        // the named A1 edge duplicates the range edge and is dropped
        assert_eq!(kinds, vec![EdgeKind::Range, EdgeKind::Range, EdgeKind::CrossSheet]);
        assert_eq!(graph.node(3).in_degree, 3);
    }

    #[test]
    fn test_implicit_nodes_for_unclassified_cells() {
        let mut builder = GraphBuilder::new();
        builder
            .add_cell(CellInput::formula(at("B1"), NodeRole::Output, add(cell_ref(at("Z9")), one())))
            .unwrap();
        let graph = builder.build();
        let z9 = graph.node_id(&at("Z9")).unwrap();
        assert!(graph.node(z9).implicit);
        assert_eq!(graph.node(z9).role, NodeRole::Input);
        assert_eq!(graph.topological_order(), &[1, 0]);
    }

    #[test]
    fn test_duplicate_cells_rejected() {
        let mut builder = GraphBuilder::new();
        builder.add_cell(CellInput::input(at("A1"))).unwrap();
        assert!(matches!(
            builder.add_cell(CellInput::input(at("A1"))),
            Err(DagError::DuplicateNode(_))
        ));
    }

    #[test]
    fn test_depth_is_longest_path() {
        // A1 -> B1 -> C1, A1 -> C1
        let mut builder = GraphBuilder::new();
        builder.add_cell(CellInput::input(at("A1"))).unwrap();
        builder
            .add_cell(CellInput::formula(at("B1"), NodeRole::Formula, add(cell_ref(at("A1")), one())))
            .unwrap();
        builder
            .add_cell(CellInput::formula(
                at("C1"),
                NodeRole::Output,
                add(cell_ref(at("A1")), cell_ref(at("B1"))),
            ))
            .unwrap();
        let graph = builder.build();
        let depths: Vec<Option<usize>> = graph.nodes().iter().map(|n| n.depth).collect();
        assert_eq!(depths, vec![Some(0), Some(1), Some(2)]);
        assert_eq!(graph.clusters().len(), 1);
        assert_eq!(graph.clusters()[0].intermediates, vec![1]);
    }

    #[test]
    fn test_self_reference_is_a_cycle() {
        let mut builder = GraphBuilder::new();
        builder
            .add_cell(CellInput::formula(at("A1"), NodeRole::Formula, add(cell_ref(at("A1")), one())))
            .unwrap();
        let graph = builder.build();
        assert_eq!(graph.circular_refs().len(), 1);
        assert_eq!(graph.circular_refs()[0].cycle, vec![at("A1")]);
        assert!(graph.topological_order().is_empty());
        assert_eq!(graph.cycle_of(0), Some(0));
    }
}
