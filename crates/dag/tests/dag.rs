use std::collections::HashMap;

use proptest::prelude::*;
use sheetlogic_dag::{
    CellInput, CycleClassification, DagError, DependencyGraph, EdgeKind, GraphBuilder,
    IterativeSettings, NodeRole, ScheduleStep,
};
use sheetlogic_formulas::{BinaryOperator, FormulaAst, Reference};
use sheetlogic_primitives::{Coordinate, EvaluatedValue, Range, RefTarget};

fn at(a1: &str) -> Coordinate {
    Coordinate::from_a1("Sheet1", a1).unwrap()
}

fn cell_ref(coord: Coordinate) -> FormulaAst {
    FormulaAst::Reference(Reference::new(RefTarget::Cell(coord)))
}

fn plus_one(coord: Coordinate) -> FormulaAst {
    FormulaAst::BinaryOp {
        op: BinaryOperator::Add,
        left: Box::new(cell_ref(coord)),
        right: Box::new(FormulaAst::Literal(EvaluatedValue::Number(1.0))),
    }
}

fn sum_of(coords: &[Coordinate]) -> FormulaAst {
    FormulaAst::FunctionCall {
        name: "SUM".to_string(),
        args: coords.iter().cloned().map(cell_ref).collect(),
    }
}

fn two_cell_cycle(iterative: Option<IterativeSettings>) -> DependencyGraph {
    let mut builder = GraphBuilder::new();
    builder
        .add_cell(CellInput::formula(at("A1"), NodeRole::Formula, plus_one(at("B1"))).with_iterative(iterative))
        .unwrap();
    builder
        .add_cell(CellInput::formula(at("B1"), NodeRole::Formula, plus_one(at("A1"))).with_iterative(iterative))
        .unwrap();
    builder.build()
}

#[test]
fn test_two_cell_cycle_without_flag_is_error() {
    let graph = two_cell_cycle(None);
    assert_eq!(graph.circular_refs().len(), 1);
    let circular = &graph.circular_refs()[0];
    assert_eq!(circular.cycle, vec![at("A1"), at("B1")]);
    assert_eq!(circular.classification, CycleClassification::Error);
    assert_eq!(circular.max_iterations, None);
    assert!(graph.topological_order().is_empty());
    assert!(graph.nodes().iter().all(|n| n.depth.is_none()));
}

#[test]
fn test_two_cell_cycle_with_flag_is_iterative() {
    let graph = two_cell_cycle(Some(IterativeSettings {
        max_iterations: 5,
        convergence_threshold: 0.001,
    }));
    let circular = &graph.circular_refs()[0];
    assert_eq!(circular.classification, CycleClassification::Iterative);
    assert_eq!(circular.max_iterations, Some(5));
    assert_eq!(circular.convergence_threshold, Some(0.001));
}

#[test]
fn test_mixed_flags_fall_back_to_error_and_strictest_settings_win() {
    let loose = IterativeSettings {
        max_iterations: 100,
        convergence_threshold: 0.1,
    };
    let strict = IterativeSettings {
        max_iterations: 10,
        convergence_threshold: 0.01,
    };

    let mut builder = GraphBuilder::new();
    builder
        .add_cell(CellInput::formula(at("A1"), NodeRole::Formula, plus_one(at("B1"))).with_iterative(Some(loose)))
        .unwrap();
    builder
        .add_cell(CellInput::formula(at("B1"), NodeRole::Formula, plus_one(at("A1"))))
        .unwrap();
    let graph = builder.build();
    assert_eq!(graph.circular_refs()[0].classification, CycleClassification::Error);

    let mut builder = GraphBuilder::new();
    builder
        .add_cell(CellInput::formula(at("A1"), NodeRole::Formula, plus_one(at("B1"))).with_iterative(Some(loose)))
        .unwrap();
    builder
        .add_cell(CellInput::formula(at("B1"), NodeRole::Formula, plus_one(at("A1"))).with_iterative(Some(strict)))
        .unwrap();
    let graph = builder.build();
    let circular = &graph.circular_refs()[0];
    assert_eq!(circular.max_iterations, Some(10));
    assert_eq!(circular.convergence_threshold, Some(0.01));
}

#[test]
fn test_nodes_downstream_of_cycle_are_still_ordered() {
    // D1 -> A1 <-> B1 -> C1
    let mut builder = GraphBuilder::new();
    builder.add_cell(CellInput::input(at("D1"))).unwrap();
    builder
        .add_cell(CellInput::formula(at("A1"), NodeRole::Formula, sum_of(&[at("B1"), at("D1")])))
        .unwrap();
    builder
        .add_cell(CellInput::formula(at("B1"), NodeRole::Formula, plus_one(at("A1"))))
        .unwrap();
    builder
        .add_cell(CellInput::formula(at("C1"), NodeRole::Output, plus_one(at("B1"))))
        .unwrap();
    let graph = builder.build();

    let c1 = graph.node_id(&at("C1")).unwrap();
    let d1 = graph.node_id(&at("D1")).unwrap();
    assert_eq!(graph.topological_order(), &[d1, c1]);
    assert_eq!(
        graph.schedule(),
        &[ScheduleStep::Node(d1), ScheduleStep::Cycle(0), ScheduleStep::Node(c1)]
    );
    assert_eq!(graph.node(d1).depth, Some(0));
    assert_eq!(graph.node(c1).depth, Some(2));

    let impacted = graph.forward_reachable(graph.circular_refs()[0].members.clone());
    assert!(impacted.contains(&c1));
    assert!(!impacted.contains(&d1));
}

#[test]
fn test_clusters_are_weak_components() {
    let mut builder = GraphBuilder::new();
    builder.add_cell(CellInput::input(at("A1"))).unwrap();
    builder
        .add_cell(CellInput::formula(at("B1"), NodeRole::Output, plus_one(at("A1"))))
        .unwrap();
    builder.add_cell(CellInput::input(at("A5"))).unwrap();
    builder
        .add_cell(CellInput::formula(at("B5"), NodeRole::Formula, plus_one(at("A5"))))
        .unwrap();
    builder
        .add_cell(CellInput::formula(at("C5"), NodeRole::Output, plus_one(at("B5"))))
        .unwrap();
    let graph = builder.build();

    assert_eq!(graph.clusters().len(), 2);
    let first = &graph.clusters()[0];
    assert_eq!(first.inputs, vec![0]);
    assert_eq!(first.outputs, vec![1]);
    assert!(first.intermediates.is_empty());
    let second = &graph.clusters()[1];
    assert_eq!(second.inputs, vec![2]);
    assert_eq!(second.intermediates, vec![3]);
    assert_eq!(second.outputs, vec![4]);
    assert_eq!(
        second.schedule,
        vec![ScheduleStep::Node(2), ScheduleStep::Node(3), ScheduleStep::Node(4)]
    );
    assert!(graph.nodes().iter().all(|n| graph.clusters()[n.cluster_id].contains(n.id)));
}

#[test]
fn test_whole_column_reference_links_existing_cells_only() {
    let mut builder = GraphBuilder::new();
    builder.add_cell(CellInput::input(at("A1"))).unwrap();
    builder.add_cell(CellInput::input(at("A900000"))).unwrap();
    builder.add_cell(CellInput::input(at("B2"))).unwrap();
    let column = Range::whole_columns("Sheet1", 1, 1);
    let ast = FormulaAst::FunctionCall {
        name: "SUM".to_string(),
        args: vec![FormulaAst::Reference(Reference::new(RefTarget::Range(column)))],
    };
    builder
        .add_cell(CellInput::formula(at("C1"), NodeRole::Output, ast))
        .unwrap();
    let graph = builder.build();

    let c1 = graph.node_id(&at("C1")).unwrap();
    assert_eq!(graph.node(c1).precedents, vec![0, 1]);
    assert!(graph.edges().iter().all(|e| e.kind == EdgeKind::Range));
    assert_eq!(graph.nodes().len(), 4);
}

#[test]
fn test_implicit_node_inside_earlier_range_is_linked() {
    let mut builder = GraphBuilder::new();
    builder.add_cell(CellInput::input(at("A1"))).unwrap();
    let range = Range::new(at("A1"), at("A3")).unwrap();
    let ast = FormulaAst::FunctionCall {
        name: "SUM".to_string(),
        args: vec![FormulaAst::Reference(Reference::new(RefTarget::Range(range)))],
    };
    builder
        .add_cell(CellInput::formula(at("B1"), NodeRole::Output, ast))
        .unwrap();
    builder
        .add_cell(CellInput::formula(at("C1"), NodeRole::Output, plus_one(at("A2"))))
        .unwrap();
    let graph = builder.build();

    let a2 = graph.node_id(&at("A2")).unwrap();
    assert!(graph.node(a2).implicit);
    let b1 = graph.node_id(&at("B1")).unwrap();
    assert_eq!(graph.node(b1).precedents, vec![0, a2]);
    assert_eq!(graph.node(a2).dependents.len(), 2);
    assert_eq!(graph.clusters().len(), 1);
}

#[test]
fn test_failed_cells_keep_dependents() {
    let mut builder = GraphBuilder::new();
    builder
        .add_cell(CellInput::failed(at("A1"), NodeRole::Formula))
        .unwrap();
    builder
        .add_cell(CellInput::formula(at("B1"), NodeRole::Output, plus_one(at("A1"))))
        .unwrap();
    let graph = builder.build();
    assert!(graph.node(0).failed);
    let impacted = graph.dependents_of(&at("A1")).unwrap();
    assert_eq!(impacted.into_iter().collect::<Vec<_>>(), vec![1]);
    assert!(matches!(
        graph.dependents_of(&at("Q1")),
        Err(DagError::UnknownNode(_))
    ));
}

#[test]
fn test_graph_serializes() {
    let graph = two_cell_cycle(None);
    let json = serde_json::to_value(&graph).unwrap();
    assert_eq!(json["circularRefs"][0]["cycle"][0], "Sheet1!A1");
    assert_eq!(json["circularRefs"][0]["classification"], "error");
    assert!(json["topologicalOrder"].as_array().unwrap().is_empty());
}

/// Random graphs over `n` cells on one sheet. Each formula cell references
/// an arbitrary subset of cells, so cycles appear freely.
fn random_graph(max_nodes: usize, acyclic: bool) -> impl Strategy<Value = DependencyGraph> {
    (1..max_nodes)
        .prop_flat_map(|n| (Just(n), prop::collection::vec(prop::collection::vec(0..n, 0..4), n)))
        .prop_map(move |(n, refs)| {
            let coord = |i: usize| Coordinate::new("Sheet1", 1, i as u32 + 1);
            let mut builder = GraphBuilder::new();
            for (i, targets) in refs.iter().enumerate() {
                let targets: Vec<Coordinate> = targets
                    .iter()
                    .copied()
                    .filter(|&t| !acyclic || t < i)
                    .map(coord)
                    .collect();
                let cell = if targets.is_empty() {
                    CellInput::input(coord(i))
                } else {
                    CellInput::formula(coord(i), NodeRole::Formula, sum_of(&targets))
                };
                builder.add_cell(cell).unwrap();
            }
            assert_eq!(builder.len(), n);
            builder.build()
        })
}

proptest! {
    #[test]
    fn topological_order_is_a_valid_linearization(graph in random_graph(40, true)) {
        prop_assert!(graph.is_acyclic());
        prop_assert_eq!(graph.topological_order().len(), graph.nodes().len());
        let position: HashMap<usize, usize> = graph
            .topological_order()
            .iter()
            .enumerate()
            .map(|(i, &id)| (id, i))
            .collect();
        for edge in graph.edges() {
            prop_assert!(position[&edge.from] < position[&edge.to]);
        }
    }

    #[test]
    fn every_unordered_node_is_in_exactly_one_cycle(graph in random_graph(30, false)) {
        let ordered: std::collections::HashSet<usize> =
            graph.topological_order().iter().copied().collect();
        let mut membership = vec![0usize; graph.nodes().len()];
        for circular in graph.circular_refs() {
            for &id in &circular.members {
                membership[id] += 1;
            }
        }
        for node in graph.nodes() {
            if ordered.contains(&node.id) {
                prop_assert_eq!(membership[node.id], 0);
            } else {
                prop_assert_eq!(membership[node.id], 1);
            }
        }

        // the schedule respects every edge between distinct units
        let mut position = vec![0usize; graph.nodes().len()];
        for (i, step) in graph.schedule().iter().enumerate() {
            match *step {
                ScheduleStep::Node(id) => position[id] = i,
                ScheduleStep::Cycle(c) => {
                    for &id in &graph.circular_refs()[c].members {
                        position[id] = i;
                    }
                }
            }
        }
        for edge in graph.edges() {
            prop_assert!(position[edge.from] <= position[edge.to]);
        }
    }
}
