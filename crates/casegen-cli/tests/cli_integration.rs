//! End-to-end tests of the `casegen` binary.

use casegen_eval::Validator;
use casegen_ir::compile;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

fn spec(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("../../specs")
        .join(name)
}

fn casegen(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_casegen"))
        .args(args)
        .output()
        .expect("failed to run casegen")
}

fn generate(spec_name: &str, out: &Path, extra: &[&str]) -> Output {
    let cons = spec(spec_name);
    let mut args = vec![
        "generate",
        "-c",
        cons.to_str().unwrap(),
        "-o",
        out.to_str().unwrap(),
        "--seed",
        "7",
    ];
    args.extend_from_slice(extra);
    casegen(&args)
}

/// Written files by name, sorted.
fn written(dir: &Path) -> Vec<(String, Value)> {
    let mut files: Vec<_> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().path())
        .map(|p| {
            let name = p.file_name().unwrap().to_string_lossy().into_owned();
            let value = serde_json::from_str(&fs::read_to_string(&p).unwrap()).unwrap();
            (name, value)
        })
        .collect();
    files.sort_by(|a, b| a.0.cmp(&b.0));
    files
}

fn validator(spec_name: &str) -> Validator {
    let src = fs::read_to_string(spec(spec_name)).unwrap();
    let unit = casegen_syntax::parse(&src).unwrap();
    Validator::new(&compile(&unit, &src).unwrap().predicates)
}

#[test]
fn test_generate_simple() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("cases");
    let output = generate("simple.c", &out, &["-n", "4", "-p", "0.5"]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("worker 0"));
    assert!(stdout.trim_end().ends_with("ALL DONE"));

    let files = written(&out);
    let names: Vec<_> = files.iter().map(|(n, _)| n.as_str()).collect();
    assert_eq!(names, ["N00000.json", "N00001.json", "P00000.json", "P00001.json"]);
    for (name, case) in &files {
        let a = case["a"].as_i64().unwrap();
        let inside = a > 5 && a < 10;
        assert_eq!(inside, name.starts_with('P'), "{name}: a = {a}");
    }
}

#[test]
fn test_generate_threads_partition_files() {
    let dir = tempfile::tempdir().unwrap();
    let output = generate("array.c", dir.path(), &["-n", "9", "-p", "1.0", "-j", "3"]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let stdout = String::from_utf8_lossy(&output.stdout);
    for worker in 0..3 {
        assert!(stdout.contains(&format!("worker {worker} ")));
    }
    let check = validator("array.c");
    let files = written(dir.path());
    assert!(!files.is_empty());
    for (name, case) in &files {
        assert!(name.starts_with('P'));
        let index: usize = name[1..6].parse().unwrap();
        assert!(index < 9, "{name} outside the planned range");
        assert_eq!(case["b"].as_array().unwrap().len(), 3);
        assert!(check.holds(case).unwrap(), "{name}: {case}");
    }
}

#[test]
fn test_written_cases_match_their_mode() {
    let dir = tempfile::tempdir().unwrap();
    let output = generate("disjunction.c", dir.path(), &["-n", "10", "-j", "2"]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let check = validator("disjunction.c");
    for (name, case) in written(dir.path()) {
        let expected = name.starts_with('P');
        assert_eq!(check.holds(&case).unwrap(), expected, "{name}: {case}");
    }
}

#[test]
fn test_pretty_printed_output() {
    let dir = tempfile::tempdir().unwrap();
    let output = generate("simple.c", dir.path(), &["-n", "1", "-p", "1.0"]);
    assert!(output.status.success());
    let text = fs::read_to_string(dir.path().join("P00000.json")).unwrap();
    assert!(text.starts_with("{\n    \"a\": "), "{text}");
}

#[test]
fn test_compile_error_exits_nonzero() {
    let dir = tempfile::tempdir().unwrap();
    let cons = dir.path().join("bad.c");
    fs::write(&cons, "int a;\nint _CONSTRAINT(void) { a = 3; }\n").unwrap();
    let output = casegen(&[
        "generate",
        "-n",
        "2",
        "-c",
        cons.to_str().unwrap(),
        "-o",
        dir.path().join("out").to_str().unwrap(),
    ]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("compile error"), "{stderr}");
}

#[test]
fn test_missing_file_exits_nonzero() {
    let output = casegen(&["parse", "/definitely/not/here.c"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("failed to read"));
}

#[test]
fn test_bad_ratio_rejected() {
    let cons = spec("simple.c");
    let output = casegen(&["generate", "-n", "2", "-p", "1.5", "-c", cons.to_str().unwrap()]);
    assert!(!output.status.success());
}

#[test]
fn test_parse_and_compile_commands() {
    let cons = spec("cons_complex.c");
    let output = casegen(&["parse", cons.to_str().unwrap()]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("_CONSTRAINT: 25 statements"), "{stdout}");

    let output = casegen(&["compile", cons.to_str().unwrap()]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("globals:"));
    assert!(stdout.contains("[group 0]"));
    assert!(stdout.contains("compile: ok (24 assertions, 1 disjunction groups)"), "{stdout}");
}
