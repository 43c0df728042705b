//! Qualitative descriptors tracked by the loop-dependence analysis.

use crate::cfg::NodeId;
use crate::dataflow::framework::{Fact, FactSet};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DescriptorKind {
    Zero,
    One,
    Positive,
    Negative,
    NotZero,
    /// Value changes from one iteration to the next
    LoopDependent,
    /// Value is the same in every iteration
    LoopIndependent,
    /// Value was produced at this node
    Definition(NodeId),
}

impl DescriptorKind {
    pub fn is_definition(&self) -> bool {
        matches!(self, DescriptorKind::Definition(_))
    }
}

impl fmt::Display for DescriptorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DescriptorKind::Zero => write!(f, "zero"),
            DescriptorKind::One => write!(f, "one"),
            DescriptorKind::Positive => write!(f, "positive"),
            DescriptorKind::Negative => write!(f, "negative"),
            DescriptorKind::NotZero => write!(f, "not-zero"),
            DescriptorKind::LoopDependent => write!(f, "loop-dependent"),
            DescriptorKind::LoopIndependent => write!(f, "loop-independent"),
            DescriptorKind::Definition(node) => write!(f, "def@{}", node),
        }
    }
}

/// `name` is described by `kind`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VariableDescriptor {
    pub name: String,
    pub kind: DescriptorKind,
}

impl VariableDescriptor {
    pub fn new(name: impl Into<String>, kind: DescriptorKind) -> Self {
        Self { name: name.into(), kind }
    }
}

impl Fact for VariableDescriptor {
    fn subject(&self) -> Option<&str> {
        Some(&self.name)
    }
}

impl fmt::Display for VariableDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.kind)
    }
}

/// Kinds known for `name`, definitions excluded.
pub fn kinds_of(facts: &FactSet<VariableDescriptor>, name: &str) -> BTreeSet<DescriptorKind> {
    facts
        .iter()
        .filter(|d| d.name == name && !d.kind.is_definition())
        .map(|d| d.kind)
        .collect()
}

/// Nodes whose definition of `name` reaches this point.
pub fn definitions_of(facts: &FactSet<VariableDescriptor>, name: &str) -> BTreeSet<NodeId> {
    facts
        .iter()
        .filter(|d| d.name == name)
        .filter_map(|d| match d.kind {
            DescriptorKind::Definition(node) => Some(node),
            _ => None,
        })
        .collect()
}

/// Union, then forget everything but the definitions of any variable that
/// more than one definition reaches.
pub fn merge_descriptors(
    stored: &FactSet<VariableDescriptor>,
    incoming: &FactSet<VariableDescriptor>,
) -> FactSet<VariableDescriptor> {
    let merged: FactSet<VariableDescriptor> = stored.union(incoming).cloned().collect();

    let mut definitions: BTreeMap<&str, usize> = BTreeMap::new();
    for d in merged.iter().filter(|d| d.kind.is_definition()) {
        *definitions.entry(d.name.as_str()).or_default() += 1;
    }

    merged
        .iter()
        .filter(|d| d.kind.is_definition() || definitions.get(d.name.as_str()).copied().unwrap_or(0) <= 1)
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use DescriptorKind::*;

    fn set(items: &[(&str, DescriptorKind)]) -> FactSet<VariableDescriptor> {
        items.iter().map(|(n, k)| VariableDescriptor::new(*n, *k)).collect()
    }

    #[test]
    fn test_merge_keeps_single_definition_facts() {
        let a = set(&[("x", Definition(NodeId(3))), ("x", Positive)]);
        let b = set(&[("x", Definition(NodeId(3))), ("x", NotZero)]);
        let merged = merge_descriptors(&a, &b);
        assert_eq!(kinds_of(&merged, "x"), [Positive, NotZero].into_iter().collect::<BTreeSet<_>>());
    }

    #[test]
    fn test_merge_drops_facts_of_conflicting_definitions() {
        let a = set(&[("x", Definition(NodeId(3))), ("x", Positive), ("y", LoopDependent)]);
        let b = set(&[("x", Definition(NodeId(5))), ("x", Negative)]);
        let merged = merge_descriptors(&a, &b);
        assert!(kinds_of(&merged, "x").is_empty());
        assert_eq!(definitions_of(&merged, "x").len(), 2);
        assert_eq!(kinds_of(&merged, "y"), [LoopDependent].into_iter().collect::<BTreeSet<_>>());
    }

    #[test]
    fn test_merge_is_sound_for_every_incoming_fact() {
        // every descriptor surviving the merge holds on both incoming paths,
        // or is a definition
        let a = set(&[("x", Definition(NodeId(1))), ("x", Zero), ("x", LoopIndependent)]);
        let b = set(&[("x", Definition(NodeId(2))), ("x", One), ("x", LoopIndependent)]);
        let merged = merge_descriptors(&a, &b);
        for d in &merged {
            assert!(d.kind.is_definition() || (a.contains(d) && b.contains(d)));
        }
    }
}
