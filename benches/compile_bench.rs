use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use sheetlogic_core::{CellRole, CellValue, ClassifiedCell, Compiler, CompilerOptions, Coordinate, WorkbookSnapshot};
use sheetlogic_formulas::{EvalOptions, FormulaEngine, ReferenceResolver};

/// `chains` independent clusters, each an input column feeding a running total.
fn workbook(chains: u32, length: u32) -> WorkbookSnapshot {
    let mut cells = Vec::new();
    for chain in 0..chains {
        let column = chain * 2 + 1;
        for row in 1..=length {
            cells.push(ClassifiedCell::input(
                Coordinate::new("Sheet1", column, row),
                CellValue::Number(f64::from(row)),
            ));
            let total = Coordinate::new("Sheet1", column + 1, row);
            let input = Coordinate::new("Sheet1", column, row).to_a1();
            let text = if row == 1 {
                format!("={input}*1.1")
            } else {
                let above = Coordinate::new("Sheet1", column + 1, row - 1).to_a1();
                format!("={above}+{input}*1.1")
            };
            let role = if row == length { CellRole::Output } else { CellRole::Formula };
            cells.push(ClassifiedCell::formula(total, role, text));
        }
    }
    WorkbookSnapshot::new(cells)
}

fn bench_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse");
    let engine = FormulaEngine::new(ReferenceResolver::default(), EvalOptions::default());

    group.bench_function("simple", |b| b.iter(|| engine.compile(black_box("=1+2"), "Sheet1")));

    group.bench_function("range_sum", |b| {
        b.iter(|| engine.compile(black_box("=SUM(A1:A100)"), "Sheet1"))
    });

    group.bench_function("nested", |b| {
        b.iter(|| {
            engine.compile(
                black_box("=IF(AND(A1>0,B1<100),SUM(C1:C10)*1.1,MAX(D1:D10)/MIN(E1:E10))"),
                "Sheet1",
            )
        })
    });

    group.finish();
}

fn bench_compile(c: &mut Criterion) {
    let mut group = c.benchmark_group("compile");
    group.sample_size(20);

    for chains in [1, 8, 32] {
        let snapshot = workbook(chains, 50);
        let parallel = Compiler::default();
        let sequential = Compiler::new(CompilerOptions {
            parallel: false,
            ..CompilerOptions::default()
        });

        group.bench_with_input(BenchmarkId::new("parallel", chains), &snapshot, |b, s| {
            b.iter(|| parallel.compile(black_box(s)))
        });
        group.bench_with_input(BenchmarkId::new("sequential", chains), &snapshot, |b, s| {
            b.iter(|| sequential.compile(black_box(s)))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_parse, bench_compile);
criterion_main!(benches);
