//! Benchmarks for the loop verifier.
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use loopdep::cfg::build_loop_cfg;
use loopdep::dataflow::{DataflowSolver, LoopDependenceAnalysis};
use loopdep::AnalysisConfig;

const STENCIL: &str = r#"
    symbol src: param double[];
    symbol dst: param double[];
    proc weight(x) {
        var w;
        w = x * 2;
        $result_weight = w + 1;
    }
    loop i = 1 to n {
        var l;
        l = i - 1;
        var r;
        r = i + 1;
        var c;
        c = weight(i);
        if c > 100 goto clamp;
        dst[i] = src[l] + src[i] + src[r];
        goto done;
      clamp:
        dst[i] = src[i];
      done:
    }
"#;

/// Straight-line body with `n` independent index computations.
fn long_body(n: usize) -> String {
    let mut source = String::from("symbol a: param int[];\nloop i = 0 to n {\n");
    for k in 0..n {
        source.push_str(&format!("  var t{k};\n  t{k} = i * {};\n  a[t{k}] = t{k};\n", k + 1));
    }
    source.push_str("}\n");
    source
}

/// Benchmark parsing speed.
fn bench_parsing(c: &mut Criterion) {
    c.bench_function("parse_stencil", |b| b.iter(|| loopdep::parse(black_box(STENCIL)).unwrap()));
}

/// Benchmark the loop-dependence solve on its own.
fn bench_loop_dependence(c: &mut Criterion) {
    let program = loopdep::parse(&long_body(200)).unwrap();
    let (graph, _) = build_loop_cfg(&program, true).unwrap();
    let solver = DataflowSolver::default();

    c.bench_function("loop_dependence_200", |b| {
        b.iter(|| solver.solve(&LoopDependenceAnalysis::new("i"), black_box(&graph)).unwrap())
    });
}

/// Benchmark the full pipeline, with and without the optimizer.
fn bench_analyze(c: &mut Criterion) {
    let program = loopdep::parse(STENCIL).unwrap();

    c.bench_function("analyze_stencil", |b| {
        b.iter(|| loopdep::analyze(black_box(&program), &AnalysisConfig::default()))
    });
    c.bench_function("analyze_stencil_unoptimized", |b| {
        b.iter(|| loopdep::analyze(black_box(&program), &AnalysisConfig::unoptimized()))
    });
}

criterion_group!(benches, bench_parsing, bench_loop_dependence, bench_analyze);
criterion_main!(benches);
