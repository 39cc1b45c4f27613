use sheetlogic_core::{
    CellRole, CellValue, ClassifiedCell, CompileError, Compiler, CompilerOptions, Coordinate,
    Enrichment, EnrichmentError, ErrorKind, EvaluatedValue, InferredType, IssueKind,
    IterativeSettings, LogicExtractionResult, NoopEnricher, RuleEnricher, TestOrigin, Validation,
    ValidationKind, WorkbookSnapshot,
};
use sheetlogic_core::evaluate::CycleStatus;
use sheetlogic_formulas::UnsupportedReason;

fn at(a1: &str) -> Coordinate {
    Coordinate::from_a1("Sheet1", a1).unwrap()
}

fn number(a1: &str, n: f64) -> ClassifiedCell {
    ClassifiedCell::input(at(a1), CellValue::Number(n))
}

fn text(a1: &str, s: &str) -> ClassifiedCell {
    ClassifiedCell::input(at(a1), CellValue::Text(s.to_string()))
}

fn formula(a1: &str, f: &str) -> ClassifiedCell {
    ClassifiedCell::formula(at(a1), CellRole::Formula, f)
}

fn output(a1: &str, f: &str) -> ClassifiedCell {
    ClassifiedCell::formula(at(a1), CellRole::Output, f)
}

fn sequential() -> Compiler {
    Compiler::new(CompilerOptions {
        parallel: false,
        ..CompilerOptions::default()
    })
}

#[test]
fn test_sum_skips_text() {
    let snapshot = WorkbookSnapshot::new(vec![
        number("A1", 1.0),
        text("A2", "x"),
        number("A3", 3.0),
        output("B1", "=SUM(A1:A3)"),
    ]);
    let out = Compiler::default().compile(&snapshot).unwrap();
    assert_eq!(out.value(&at("B1")), Some(&EvaluatedValue::Number(4.0)));
    assert!(out.can_proceed());
}

#[test]
fn test_division_error_propagates_without_blocking() {
    let snapshot = WorkbookSnapshot::new(vec![
        number("A1", 10.0),
        number("B1", 0.0),
        formula("C1", "=A1/B1"),
        output("D1", "=C1*2"),
    ]);
    let out = sequential().compile(&snapshot).unwrap();
    let div0 = EvaluatedValue::Error(ErrorKind::DivideByZero);
    assert_eq!(out.value(&at("C1")), Some(&div0));
    assert_eq!(out.value(&at("D1")), Some(&div0));
    // spreadsheet errors are values, not compile issues
    assert!(out.can_proceed());
    assert_eq!(out.errors.issues().count(), 0);
}

#[test]
fn test_boundary_cases_for_validated_input() {
    let snapshot = WorkbookSnapshot::new(vec![
        number("A1", 50.0).with_validation(Validation {
            kind: ValidationKind::Number,
            min: Some(0.0),
            max: Some(100.0),
            options: Vec::new(),
        }),
        output("B1", "=A1*2"),
    ]);
    let out = Compiler::default().compile(&snapshot).unwrap();
    let result = &out.results[0];
    assert_eq!(result.tests.len(), 5);

    let inputs: Vec<f64> = result
        .tests
        .iter()
        .map(|t| t.inputs[&at("A1")].as_number().unwrap())
        .collect();
    assert_eq!(inputs, vec![50.0, 0.0, -1.0, 100.0, 101.0]);

    assert_eq!(result.tests[0].origin, TestOrigin::Observed);
    assert_eq!(result.tests[0].id, "cluster0_observed_0");
    assert!(result.tests[1..].iter().all(|t| t.origin == TestOrigin::Boundary));
    assert_eq!(result.tests[2].id, "cluster0_boundary_1");
    assert_eq!(
        result.tests[2].expected_outputs[&at("B1")],
        EvaluatedValue::Number(-2.0)
    );
    assert_eq!(result.cells[&at("B1")].inferred.inferred_type, InferredType::Number);
}

#[test]
fn test_observed_zero_collapses_with_boundary_zero() {
    let snapshot = WorkbookSnapshot::new(vec![number("A1", 0.0), output("B1", "=A1+1")]);
    let out = Compiler::default().compile(&snapshot).unwrap();
    assert_eq!(out.results[0].tests.len(), 1);
}

#[test]
fn test_list_options_become_synthetic_cases() {
    let snapshot = WorkbookSnapshot::new(vec![
        text("A1", "North").with_validation(Validation {
            kind: ValidationKind::List,
            min: None,
            max: None,
            options: vec![
                CellValue::Text("North".into()),
                CellValue::Text("South".into()),
                CellValue::Text("East".into()),
            ],
        }),
        output("B1", "=IF(A1=\"North\",1,\"other\")"),
    ]);
    let out = Compiler::default().compile(&snapshot).unwrap();
    let result = &out.results[0];
    assert_eq!(result.tests.len(), 3);
    assert_eq!(
        result.tests.iter().filter(|t| t.origin == TestOrigin::Synthetic).count(),
        2
    );
    let inferred = &result.cells[&at("B1")].inferred;
    assert_eq!(inferred.inferred_type, InferredType::Mixed);
    assert!(inferred.needs_review);
}

#[test]
fn test_unflagged_cycle_blocks_outputs() {
    let snapshot = WorkbookSnapshot::new(vec![
        formula("A1", "=B1+1"),
        formula("B1", "=A1+1"),
        output("C1", "=A1"),
    ]);
    let out = Compiler::default().compile(&snapshot).unwrap();
    let circular = EvaluatedValue::Error(ErrorKind::CircularReference);
    assert_eq!(out.value(&at("A1")), Some(&circular));
    assert_eq!(out.value(&at("C1")), Some(&circular));

    assert_eq!(out.graph.circular_refs().len(), 1);
    assert_eq!(out.graph.circular_refs()[0].cycle, vec![at("A1"), at("B1")]);
    assert!(!out.can_proceed());
    let critical = &out.errors.critical_errors[0];
    assert_eq!(critical.kind, IssueKind::CircularReference);
    assert_eq!(critical.blocked_outputs, vec![at("C1")]);
}

#[test]
fn test_iterative_cycle_reports_non_convergence_after_max_iterations() {
    let settings = IterativeSettings {
        max_iterations: 5,
        convergence_threshold: 0.001,
    };
    let snapshot = WorkbookSnapshot::new(vec![
        formula("A1", "=B1+1").with_iterative(settings),
        formula("B1", "=A1+1").with_iterative(settings),
    ]);
    let out = Compiler::default().compile(&snapshot).unwrap();
    let result = out.result_for(&at("A1")).unwrap();
    assert_eq!(result.cycles[0].status, CycleStatus::DidNotConverge);
    assert_eq!(result.cycles[0].iterations, 5);
    assert_eq!(
        out.value(&at("B1")),
        Some(&EvaluatedValue::Error(ErrorKind::DidNotConverge))
    );
    let issue = out.errors.issues().next().unwrap();
    assert_eq!(issue.kind, IssueKind::DidNotConverge);
}

#[test]
fn test_workbook_flag_lets_cycle_converge() {
    let snapshot = WorkbookSnapshot {
        iterative: Some(IterativeSettings {
            max_iterations: 100,
            convergence_threshold: 1e-9,
        }),
        ..WorkbookSnapshot::new(vec![
            number("A3", 100.0),
            formula("A1", "=A3-B1"),
            output("B1", "=A1*0.1"),
        ])
    };
    let out = Compiler::default().compile(&snapshot).unwrap();
    let b1 = out.value(&at("B1")).and_then(EvaluatedValue::as_number).unwrap();
    assert!((b1 - 100.0 / 11.0).abs() < 1e-6);
    assert!(out.can_proceed());
}

#[test]
fn test_dynamic_reference_reaching_output_blocks() {
    let snapshot = WorkbookSnapshot::new(vec![
        number("A1", 1.0),
        formula("B1", "=INDIRECT(\"A1\")"),
        output("C1", "=B1+1"),
    ]);
    let out = Compiler::default().compile(&snapshot).unwrap();
    assert_eq!(
        out.value(&at("C1")),
        Some(&EvaluatedValue::Error(ErrorKind::Unsupported))
    );
    let result = out.result_for(&at("B1")).unwrap();
    let feature = &result.unsupported_features[0];
    assert_eq!(feature.cell, at("B1"));
    assert_eq!(feature.function, "INDIRECT");
    assert_eq!(feature.reason, UnsupportedReason::DynamicReference);
    assert_eq!(feature.impacted, vec![at("C1")]);
    assert!(!out.can_proceed());
}

#[test]
fn test_contained_parse_failure_is_a_warning() {
    let snapshot = WorkbookSnapshot::new(vec![
        number("A1", 2.0),
        output("B1", "=A1*3"),
        formula("D1", "=1+*2"),
    ]);
    let out = Compiler::default().compile(&snapshot).unwrap();
    assert!(out.can_proceed());
    assert_eq!(out.value(&at("B1")), Some(&EvaluatedValue::Number(6.0)));
    assert_eq!(
        out.value(&at("D1")),
        Some(&EvaluatedValue::Error(ErrorKind::InvalidFormula))
    );
    let warning = &out.errors.warnings[0];
    assert_eq!(warning.kind, IssueKind::ParseError);
    assert_eq!(warning.position, Some(3));
    assert!(out.result_for(&at("D1")).unwrap().cells[&at("D1")].formula.is_none());
}

#[test]
fn test_failed_cell_impacts_output() {
    let snapshot = WorkbookSnapshot::new(vec![
        formula("A1", "=IF()"),
        output("B1", "=A1+1"),
    ]);
    let out = Compiler::default().compile(&snapshot).unwrap();
    assert!(!out.can_proceed());
    let critical = &out.errors.critical_errors[0];
    assert_eq!(critical.kind, IssueKind::ArityError);
    assert_eq!(critical.impacted, vec![at("B1")]);
    assert_eq!(out.errors.affected_cells, vec![at("A1"), at("B1")]);
    assert_eq!(out.errors.impact_analysis.percentage_affected, 100.0);
}

#[test]
fn test_named_and_cross_sheet_references() {
    let data = |a1: &str, n: f64| ClassifiedCell::input(Coordinate::from_a1("Data", a1).unwrap(), CellValue::Number(n));
    let snapshot = WorkbookSnapshot::new(vec![
        data("A1", 10.0),
        data("A2", 20.0),
        data("B1", 0.5),
        output("C1", "=SUM(Prices)*Data!B1"),
    ])
    .with_named_range("Prices", "Data!A1:A2");
    let out = Compiler::default().compile(&snapshot).unwrap();
    assert_eq!(out.value(&at("C1")), Some(&EvaluatedValue::Number(15.0)));
    assert_eq!(out.results.len(), 1);
    assert_eq!(out.results[0].inputs.len(), 3);
}

#[test]
fn test_sheet_references_ignore_case() {
    let other = ClassifiedCell::input(Coordinate::from_a1("Sheet2", "A1").unwrap(), CellValue::Number(7.0));
    let mut snapshot = WorkbookSnapshot::new(vec![other, output("B1", "=sheet2!A1")]);
    let out = sequential().compile(&snapshot).unwrap();
    assert_eq!(out.value(&at("B1")), Some(&EvaluatedValue::Number(7.0)));
    assert!(out.errors.issues().next().is_none());

    snapshot.sheets = vec!["Sheet1".to_string(), "Sheet2".to_string()];
    snapshot.cells.push(ClassifiedCell::formula(
        Coordinate::from_a1("SHEET1", "C1").unwrap(),
        CellRole::Output,
        "=B1+SHEET2!A1",
    ));
    let out = sequential().compile(&snapshot).unwrap();
    assert_eq!(out.value(&at("B1")), Some(&EvaluatedValue::Number(7.0)));
    assert_eq!(out.value(&at("C1")), Some(&EvaluatedValue::Number(14.0)));
    assert!(out.can_proceed());
}

#[test]
fn test_labels_are_constants_outside_the_graph() {
    let snapshot = WorkbookSnapshot::new(vec![
        ClassifiedCell {
            role: CellRole::Label,
            ..text("A1", "Total")
        },
        output("B1", "=A1&\":\""),
    ]);
    let out = Compiler::default().compile(&snapshot).unwrap();
    assert_eq!(out.value(&at("B1")), Some(&EvaluatedValue::Text("Total:".into())));
    let a1 = out.graph.node_id(&at("A1")).unwrap();
    assert!(out.graph.node(a1).implicit);
}

#[test]
fn test_independent_clusters_get_separate_results() {
    let snapshot = WorkbookSnapshot::new(vec![
        number("A1", 1.0),
        output("B1", "=A1+1"),
        number("A5", 2.0),
        output("B5", "=A5*2"),
        number("Z9", 7.0),
    ]);
    let out = Compiler::default().compile(&snapshot).unwrap();
    // the lone input has no logic to extract
    assert_eq!(out.graph.clusters().len(), 3);
    assert_eq!(out.results.len(), 2);
    assert_eq!(out.results[1].tests[0].id, "cluster1_observed_0");
}

#[test]
fn test_parallel_and_sequential_agree() {
    let snapshot = WorkbookSnapshot::new(vec![
        number("A1", 3.0),
        number("A2", 4.0),
        formula("B1", "=A1^2+A2^2"),
        output("C1", "=SQRT(B1)"),
        number("E1", 1.0),
        output("F1", "=IF(E1>0,\"pos\",\"neg\")"),
    ]);
    let parallel = serde_json::to_value(Compiler::default().compile(&snapshot).unwrap()).unwrap();
    let serial = serde_json::to_value(sequential().compile(&snapshot).unwrap()).unwrap();
    assert_eq!(parallel, serial);
    assert_eq!(parallel["errors"]["canProceed"], true);
    assert_eq!(parallel["results"][0]["cells"]["Sheet1!C1"]["value"]["Number"], 5.0);
}

#[test]
fn test_duplicate_coordinates_fail_compilation() {
    let snapshot = WorkbookSnapshot::new(vec![number("A1", 1.0), formula("A1", "=1")]);
    assert!(matches!(
        Compiler::default().compile(&snapshot),
        Err(CompileError::DuplicateCell(_))
    ));
}

struct Failing;

impl RuleEnricher for Failing {
    fn enrich(&self, _result: &LogicExtractionResult) -> Result<Enrichment, EnrichmentError> {
        Err(EnrichmentError::Unavailable("offline".into()))
    }
}

struct Naming;

impl RuleEnricher for Naming {
    fn enrich(&self, result: &LogicExtractionResult) -> Result<Enrichment, EnrichmentError> {
        Ok(Enrichment {
            rule_name: Some(format!("rule {}", result.cluster_id)),
            ..Enrichment::default()
        })
    }
}

#[test]
fn test_enrichment_never_changes_values() {
    let snapshot = WorkbookSnapshot::new(vec![number("A1", 2.0), output("B1", "=A1*A1")]);
    let compiler = Compiler::default();
    let plain = compiler.compile(&snapshot).unwrap();
    let failed = compiler.compile_with_enricher(&snapshot, &Failing).unwrap();
    let named = compiler.compile_with_enricher(&snapshot, &Naming).unwrap();
    let noop = compiler.compile_with_enricher(&snapshot, &NoopEnricher).unwrap();

    assert!(plain.results[0].enrichment.is_none());
    assert!(failed.results[0].enrichment.is_none());
    assert_eq!(
        named.results[0].enrichment.as_ref().unwrap().rule_name.as_deref(),
        Some("rule 0")
    );
    assert_eq!(noop.results[0].enrichment, Some(Enrichment::default()));
    assert_eq!(plain.results[0].tests, named.results[0].tests);
    assert_eq!(failed.value(&at("B1")), Some(&EvaluatedValue::Number(4.0)));
}
