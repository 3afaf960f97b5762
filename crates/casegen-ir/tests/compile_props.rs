//! Property tests for leaf, atom and disjunction-group registration.

use casegen_ir::{compile, CompiledConstraints};
use proptest::prelude::*;

const VARS: [&str; 3] = ["a", "b", "c"];
const OPS: [&str; 6] = ["<", "<=", ">", ">=", "==", "!="];

/// One comparison `var op k`.
fn comparison() -> impl Strategy<Value = String> {
    (0..VARS.len(), 0..OPS.len(), 0i64..100)
        .prop_map(|(v, op, k)| format!("{} {} {k}", VARS[v], OPS[op]))
}

/// A statement is one comparison or a disjunction of two or three.
fn statement() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec(comparison(), 1..=3)
}

fn source(statements: &[Vec<String>]) -> String {
    let body: String = statements
        .iter()
        .map(|parts| format!("    {};\n", parts.join(" || ")))
        .collect();
    format!("int a; int b; int c;\nint _CONSTRAINT(void) {{\n{body}}}\n")
}

fn build(src: &str) -> CompiledConstraints {
    let unit = casegen_syntax::parse(src).unwrap();
    compile(&unit, src).unwrap()
}

fn leaf_texts(c: &CompiledConstraints) -> Vec<String> {
    c.leaves.iter().map(|l| l.term.to_string()).collect()
}

proptest! {
    #[test]
    fn prop_registration_stable_across_recompiles(
        statements in prop::collection::vec(statement(), 1..6)
    ) {
        let src = source(&statements);
        let first = build(&src);
        let second = build(&src);

        prop_assert_eq!(leaf_texts(&first), leaf_texts(&second));
        prop_assert_eq!(first.atoms.atoms(), second.atoms.atoms());
        for atom in first.atoms.atoms() {
            prop_assert_eq!(first.atoms.leaves_of(atom), second.atoms.leaves_of(atom));
        }
        prop_assert_eq!(first.disjunctions.groups(), second.disjunctions.groups());
    }

    #[test]
    fn prop_leaves_and_groups_follow_statements(
        statements in prop::collection::vec(statement(), 1..6)
    ) {
        let c = build(&source(&statements));

        let comparisons: usize = statements.iter().map(Vec::len).sum();
        prop_assert_eq!(c.leaves.len(), comparisons);
        for (i, leaf) in c.leaves.iter().enumerate() {
            prop_assert_eq!(leaf.id, i);
        }
        prop_assert_eq!(c.assertions.len(), statements.len());

        // Each disjunctive statement owns one group holding exactly its leaves.
        let mut expected = Vec::new();
        let mut next = 0;
        for parts in &statements {
            let ids: Vec<usize> = (next..next + parts.len()).collect();
            next += parts.len();
            if parts.len() > 1 {
                expected.push(ids);
            }
        }
        let groups: Vec<Vec<usize>> = c.disjunctions.groups().into_values().collect();
        prop_assert_eq!(groups, expected);

        // Atoms are exactly the variables mentioned, each pointing back at
        // every leaf that mentions it.
        for atom in c.atoms.atoms() {
            let name = atom.to_string();
            prop_assert!(VARS.contains(&name.as_str()), "unexpected atom {}", name);
            for id in c.atoms.leaves_of(atom) {
                prop_assert!(c.leaves[*id].term.to_string().contains(&name));
            }
        }
    }
}
