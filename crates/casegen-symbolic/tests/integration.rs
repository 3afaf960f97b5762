//! End-to-end generation tests: C source in, JSON cases out.

use casegen_ir::{compile, CompiledConstraints, Mode};
use casegen_symbolic::{generate, GenerateConfig, Generation, GenerationStatus};
use serde_json::Value;
use std::collections::HashSet;

fn spec_path(name: &str) -> String {
    format!("{}/../../specs/{}", env!("CARGO_MANIFEST_DIR"), name)
}

fn compile_source(src: &str) -> CompiledConstraints {
    let unit = casegen_syntax::parse(src).unwrap_or_else(|e| panic!("parse failed: {e}"));
    compile(&unit, src).unwrap_or_else(|e| panic!("compile failed: {e}"))
}

fn compile_spec(name: &str) -> CompiledConstraints {
    let src = std::fs::read_to_string(spec_path(name)).unwrap();
    compile_source(&src)
}

fn run(compiled: &CompiledConstraints, mode: Mode, count: usize, seed: u64) -> Generation {
    let config = GenerateConfig {
        count,
        max_cycles: 128,
        ..GenerateConfig::default()
    };
    generate(compiled, mode, &config, seed).unwrap()
}

fn int(case: &Value, key: &str) -> i64 {
    case[key]
        .as_i64()
        .unwrap_or_else(|| panic!("{key} is not an integer in {case}"))
}

fn assert_distinct(cases: &[Value]) {
    let keys: HashSet<String> = cases.iter().map(|c| c.to_string()).collect();
    assert_eq!(keys.len(), cases.len(), "duplicate cases");
}

#[test]
fn test_simple_range_positive() {
    let c = compile_spec("simple.c");
    let g = run(&c, Mode::Positive, 4, 7);
    assert_eq!(g.status, GenerationStatus::Complete);
    assert_eq!(g.cases.len(), 4);
    for case in &g.cases {
        let a = int(case, "a");
        assert!(a > 5 && a < 10, "a = {a}");
    }
    assert_distinct(&g.cases);
}

#[test]
fn test_array_positive() {
    let c = compile_spec("array.c");
    let g = run(&c, Mode::Positive, 10, 3);
    assert!(!g.cases.is_empty());
    for case in &g.cases {
        let b = case["b"].as_array().unwrap();
        assert_eq!(b.len(), 3);
        let b: Vec<i64> = b.iter().map(|v| v.as_i64().unwrap()).collect();
        assert!(b[1] > b[2], "{case}");
        assert!(case["total"].is_i64());
    }
    assert_distinct(&g.cases);
}

#[test]
fn test_disjunctions_positive() {
    let c = compile_spec("disjunction.c");
    let g = run(&c, Mode::Positive, 20, 11);
    assert!(!g.cases.is_empty());
    for case in &g.cases {
        let x = int(case, "x");
        let y = int(case, "y");
        let buf = case["buf"].as_array().unwrap();
        assert!(x < -10 || x > 10, "x = {x}");
        assert!((0..=2).contains(&y), "y = {y}");
        assert!((3..=5).contains(&buf.len()), "buf = {buf:?}");
        assert_eq!(buf[0].as_i64().unwrap(), x + y);
    }
    assert_distinct(&g.cases);
}

#[test]
fn test_negative_cases_violate_constraints() {
    let c = compile_source("int a;\nint _CONSTRAINT(void) { a > 5 && a < 10; }");
    let g = run(&c, Mode::Negative, 8, 5);
    assert_eq!(g.cases.len(), 8);
    for case in &g.cases {
        let a = int(case, "a");
        assert!(!(a > 5 && a < 10), "a = {a}");
    }
}

#[test]
fn test_negative_cases_break_some_assertion() {
    let c = compile_source("int a; int b;\nint _CONSTRAINT(void) { a > 0; b > 0; a + b < 50; }");
    let g = run(&c, Mode::Negative, 10, 9);
    assert!(!g.cases.is_empty());
    for case in &g.cases {
        let (a, b) = (int(case, "a"), int(case, "b"));
        assert!(!(a > 0 && b > 0 && a + b < 50), "a = {a}, b = {b}");
    }
}

#[test]
fn test_small_solution_space_dedups() {
    let c = compile_source("int a;\nint _CONSTRAINT(void) { a >= 0 && a <= 2; }");
    let g = run(&c, Mode::Positive, 10, 1);
    assert!(g.cases.len() <= 3);
    assert!(!g.cases.is_empty());
    assert_eq!(g.status, GenerationStatus::BudgetExhausted);
    assert_distinct(&g.cases);
}

#[test]
fn test_unsatisfiable_positive() {
    let c = compile_source("int a;\nint _CONSTRAINT(void) { a > 5; a < 2; }");
    let g = run(&c, Mode::Positive, 3, 1);
    assert!(g.cases.is_empty());
    assert_eq!(g.status, GenerationStatus::Unsatisfiable);
}

#[test]
fn test_gaussian_statistics() {
    let c = compile_source(
        "void GAUSSIAN(double VAR, double mu, double sigma);\n\
         struct S { double c; } s;\n\
         int _CONSTRAINT(void) { GAUSSIAN(s.c, 1.0, 1.0); }",
    );
    let config = GenerateConfig {
        count: 300,
        max_cycles: 600,
        ..GenerateConfig::default()
    };
    let g = generate(&c, Mode::Positive, &config, 2024).unwrap();
    assert_eq!(g.cases.len(), 300);
    let samples: Vec<f64> = g
        .cases
        .iter()
        .map(|case| case["s"]["c"].as_f64().unwrap())
        .collect();
    let n = samples.len() as f64;
    let mean = samples.iter().sum::<f64>() / n;
    let var = samples.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1.0);
    assert!((mean - 1.0).abs() < 0.3, "mean = {mean}");
    assert!((var.sqrt() - 1.0).abs() < 0.3, "sd = {}", var.sqrt());
}

#[test]
fn test_gaussian_spec_respects_bounds() {
    let c = compile_spec("gaussian.c");
    let g = run(&c, Mode::Positive, 20, 8);
    assert!(!g.cases.is_empty());
    for case in &g.cases {
        let t = case["temperature"].as_f64().unwrap();
        let p = int(case, "pressure");
        assert!(t > -50.0 && t < 80.0, "temperature = {t}");
        assert!(p > 0, "pressure = {p}");
    }
}

#[test]
fn test_complex_spec_both_modes() {
    let c = compile_spec("cons_complex.c");
    let positive = run(&c, Mode::Positive, 5, 17);
    assert!(!positive.cases.is_empty());
    for case in &positive.cases {
        let b: Vec<i64> = case["b"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_i64().unwrap())
            .collect();
        assert!(b[1] > b[2] || b[0] < b[1], "b = {b:?}");
        assert_eq!(case["s"].as_array().unwrap().len(), 2);
    }
    let negative = run(&c, Mode::Negative, 5, 18);
    assert!(!negative.cases.is_empty());
}

#[test]
fn test_seeds_are_deterministic() {
    let c = compile_spec("disjunction.c");
    let first = run(&c, Mode::Positive, 6, 99);
    let second = run(&c, Mode::Positive, 6, 99);
    assert_eq!(first.cases, second.cases);
}

#[test]
fn test_real_interval_without_integers() {
    let c = compile_source("double d;\nint _CONSTRAINT(void) { d > 0.5; d < 0.7; }");
    let g = run(&c, Mode::Positive, 3, 5);
    assert!(!g.cases.is_empty(), "status {:?}", g.status);
    for case in &g.cases {
        let d = case["d"]
            .as_f64()
            .unwrap_or_else(|| panic!("d is not a number in {case}"));
        assert!(d > 0.5 && d < 0.7, "d = {d}");
    }
}
