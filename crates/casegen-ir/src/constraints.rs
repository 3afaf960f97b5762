//! Compiled constraint set and the side tables the generator narrows with.

use crate::term::Term;
use crate::types::{StructBlueprint, SymbolEntry};
use casegen_syntax::Span;
use std::collections::{BTreeMap, HashMap};

/// Index into the leaf formula list.
pub type LeafId = usize;

/// A relational or equality comparison, in encounter order.
#[derive(Debug, Clone)]
pub struct Leaf {
    pub id: LeafId,
    pub term: Term,
    pub span: Span,
}

/// One asserted constraint statement.
#[derive(Debug, Clone)]
pub struct Assertion {
    pub term: Term,
    /// Source text of the statement, without the trailing `;`.
    pub source: String,
    pub span: Span,
}

/// `GAUSSIAN(target, mean, std_dev)`.
#[derive(Debug, Clone)]
pub struct GaussianConstraint {
    pub target: Term,
    pub mean: f64,
    pub std_dev: f64,
    pub span: Span,
}

/// Non-numeral leaf operands and the leaves that mention them.
#[derive(Debug, Clone, Default)]
pub struct AtomTable {
    order: Vec<Term>,
    refs: HashMap<Term, Vec<LeafId>>,
}

impl AtomTable {
    /// Record that `leaf` mentions `atom`.
    pub fn register(&mut self, atom: Term, leaf: LeafId) {
        match self.refs.get_mut(&atom) {
            Some(leaves) => {
                if !leaves.contains(&leaf) {
                    leaves.push(leaf);
                }
            }
            None => {
                self.order.push(atom.clone());
                self.refs.insert(atom, vec![leaf]);
            }
        }
    }

    /// Atoms in first-encounter order.
    pub fn atoms(&self) -> &[Term] {
        &self.order
    }

    /// Leaves that mention `atom`.
    pub fn leaves_of(&self, atom: &Term) -> &[LeafId] {
        self.refs.get(atom).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains(&self, atom: &Term) -> bool {
        self.refs.contains_key(atom)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Drop every leaf reference but keep the atoms themselves.
    pub fn clear_references(&mut self) {
        for leaves in self.refs.values_mut() {
            leaves.clear();
        }
    }
}

/// Disjunction group id with the low bit reserved for "activated".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupTag(u32);

impl GroupTag {
    /// Tag for group number `n` (ids step by two).
    pub fn new(n: u32) -> Self {
        Self(n << 1)
    }

    pub fn group(self) -> u32 {
        self.0 >> 1
    }

    pub fn is_active(self) -> bool {
        self.0 & 1 == 1
    }

    pub fn activated(self) -> Self {
        Self(self.0 | 1)
    }

    pub fn deactivated(self) -> Self {
        Self(self.0 & !1)
    }
}

/// Leaf-to-group membership for leaves that are direct operands of `||`.
#[derive(Debug, Clone, Default)]
pub struct DisjunctionGroups {
    tags: BTreeMap<LeafId, GroupTag>,
    next_group: u32,
}

impl DisjunctionGroups {
    /// Allocate a fresh group.
    pub fn fresh(&mut self) -> GroupTag {
        let tag = GroupTag::new(self.next_group);
        self.next_group += 1;
        tag
    }

    /// Put `leaf` in `tag`'s group, replacing any earlier membership.
    pub fn tag(&mut self, leaf: LeafId, tag: GroupTag) {
        self.tags.insert(leaf, tag);
    }

    pub fn tag_of(&self, leaf: LeafId) -> Option<GroupTag> {
        self.tags.get(&leaf).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    /// Members of each non-empty group, by group number.
    pub fn groups(&self) -> BTreeMap<u32, Vec<LeafId>> {
        let mut groups: BTreeMap<u32, Vec<LeafId>> = BTreeMap::new();
        for (&leaf, tag) in &self.tags {
            groups.entry(tag.group()).or_default().push(leaf);
        }
        groups
    }

    /// Activate exactly the given leaves; every other member goes inactive.
    pub fn activate(&mut self, chosen: &[LeafId]) {
        for (leaf, tag) in self.tags.iter_mut() {
            *tag = if chosen.contains(leaf) {
                tag.activated()
            } else {
                tag.deactivated()
            };
        }
    }

    /// A grouped leaf that was not chosen this cycle.
    pub fn is_inactive(&self, leaf: LeafId) -> bool {
        self.tags.get(&leaf).is_some_and(|tag| !tag.is_active())
    }

    pub fn clear(&mut self) {
        self.tags.clear();
    }
}

/// Everything the generator needs from one constraint source.
#[derive(Debug, Clone)]
pub struct CompiledConstraints {
    /// Global variables in declaration order.
    pub globals: Vec<SymbolEntry>,
    pub blueprints: Vec<StructBlueprint>,
    pub assertions: Vec<Assertion>,
    /// Source text of every constraint statement, Gaussian tags included.
    pub predicates: Vec<String>,
    pub leaves: Vec<Leaf>,
    pub atoms: AtomTable,
    pub disjunctions: DisjunctionGroups,
    pub gaussians: Vec<GaussianConstraint>,
}

impl CompiledConstraints {
    pub fn blueprint(&self, name: &str) -> Option<&StructBlueprint> {
        self.blueprints.iter().find(|b| b.name == name)
    }

    pub fn leaf(&self, id: LeafId) -> Option<&Leaf> {
        self.leaves.get(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::term::Sort;

    fn var(name: &str) -> Term {
        Term::Var {
            name: name.to_string(),
            sort: Sort::Int,
        }
    }

    #[test]
    fn test_atom_table_dedups() {
        let mut atoms = AtomTable::default();
        atoms.register(var("a"), 0);
        atoms.register(var("b"), 0);
        atoms.register(var("a"), 1);
        atoms.register(var("a"), 1);
        assert_eq!(atoms.len(), 2);
        assert_eq!(atoms.leaves_of(&var("a")), &[0, 1]);
        atoms.clear_references();
        assert_eq!(atoms.len(), 2);
        assert!(atoms.leaves_of(&var("a")).is_empty());
    }

    #[test]
    fn test_group_tag_parity() {
        let tag = GroupTag::new(3);
        assert_eq!(tag.group(), 3);
        assert!(!tag.is_active());
        assert!(tag.activated().is_active());
        assert_eq!(tag.activated().group(), 3);
        assert_eq!(tag.activated().deactivated(), tag);
    }

    #[test]
    fn test_activation_marks_exactly_chosen() {
        let mut groups = DisjunctionGroups::default();
        let g = groups.fresh();
        groups.tag(0, g);
        groups.tag(1, g);
        groups.activate(&[1]);
        assert!(groups.is_inactive(0));
        assert!(!groups.is_inactive(1));
        assert!(!groups.is_inactive(7));
        assert_eq!(groups.groups().get(&0), Some(&vec![0, 1]));
    }
}
