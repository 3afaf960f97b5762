//! Integration tests: parse and compile the sample constraint sources.

use casegen_ir::{compile, CompiledConstraints, Qualifier, Sort, Term, ValueType};
use std::path::PathBuf;

fn specs_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../specs")
}

fn compile_spec(name: &str) -> CompiledConstraints {
    let path = specs_dir().join(name);
    let source = std::fs::read_to_string(&path)
        .unwrap_or_else(|e| panic!("failed to read {}: {e}", path.display()));
    let unit = casegen_syntax::parse(&source)
        .unwrap_or_else(|e| panic!("parse error in {name}: {e}"));
    compile(&unit, &source).unwrap_or_else(|e| panic!("compile error in {name}: {e}"))
}

#[test]
fn test_every_spec_compiles() {
    let mut count = 0;
    for entry in std::fs::read_dir(specs_dir()).unwrap() {
        let path = entry.unwrap().path();
        if path.extension().is_some_and(|e| e == "c") {
            let name = path.file_name().unwrap().to_string_lossy().to_string();
            let compiled = compile_spec(&name);
            assert!(!compiled.predicates.is_empty(), "{name} has no predicates");
            count += 1;
        }
    }
    assert!(count >= 5);
}

#[test]
fn test_cons_complex_layout() {
    let c = compile_spec("cons_complex.c");

    let globals: Vec<_> = c.globals.iter().map(|g| g.name.as_str()).collect();
    assert_eq!(globals, vec!["a", "b", "s", "points", "rects"]);

    let names: Vec<_> = c.blueprints.iter().map(|b| b.name.as_str()).collect();
    assert_eq!(names, vec!["S1", "Point", "Rect"]);

    let s = &c.globals[2];
    assert_eq!(s.qualifier, Qualifier::Array);
    assert_eq!(s.dims, vec![2]);
    assert_eq!(s.ty, ValueType::Struct("S1".to_string()));

    let d = &c.blueprints[0].members[3];
    assert_eq!(d.qualifier, Qualifier::Pointer);
    assert_eq!(d.sort(), Sort::Seq(Box::new(Sort::Int)));

    // 25 statements, one of them a Gaussian tag.
    assert_eq!(c.predicates.len(), 25);
    assert_eq!(c.assertions.len(), 24);
    assert_eq!(c.gaussians.len(), 1);
    assert_eq!(c.gaussians[0].target.to_string(), "s[0].c");
}

#[test]
fn test_cons_complex_atoms_and_groups() {
    let c = compile_spec("cons_complex.c");
    let atoms: Vec<String> = c.atoms.atoms().iter().map(Term::to_string).collect();
    assert_eq!(&atoms[..4], &["a", "b[1]", "b[2]", "b[0]"]);
    assert!(atoms.contains(&"_LENGTH(s[0].d)".to_string()));
    assert!(atoms.contains(&"s[0].d[6]".to_string()));

    let groups = c.disjunctions.groups();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups.values().next(), Some(&vec![2, 3]));
}

#[test]
fn test_disjunction_spec_groups() {
    let c = compile_spec("disjunction.c");
    let groups = c.disjunctions.groups();
    assert_eq!(groups.len(), 2);
    let sizes: Vec<usize> = groups.values().map(Vec::len).collect();
    assert_eq!(sizes, vec![2, 3]);
}

#[test]
fn test_gaussian_spec() {
    let c = compile_spec("gaussian.c");
    assert_eq!(c.gaussians.len(), 2);
    assert_eq!(c.gaussians[1].mean, 100.0);
    assert_eq!(c.gaussians[1].std_dev, 10.0);
    assert_eq!(c.assertions.len(), 2);
}

#[test]
fn test_type_mapping_is_stable_across_compiles() {
    let first = compile_spec("cons_complex.c");
    let second = compile_spec("cons_complex.c");
    assert_eq!(first.globals, second.globals);
    assert_eq!(first.blueprints, second.blueprints);
    for (a, b) in first.blueprints.iter().zip(&second.blueprints) {
        let fields_a: Vec<_> = a.members.iter().map(|m| m.name.as_str()).collect();
        let fields_b: Vec<_> = b.members.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(fields_a, fields_b);
    }
}
