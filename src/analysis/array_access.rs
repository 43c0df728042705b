//! Array access verification.
//!
//! Every array access is resolved to its alias group. Within a group that is
//! written, each access must index the array through exactly one dimension
//! that varies with the iteration, and all accesses must agree on that
//! dimension and on its index. Then each iteration touches its own slice of
//! the storage and no value flows between iterations.

use crate::analysis::verdict::{Rejection, RejectionReason, VerifierKind};
use crate::cfg::{ControlFlowGraph, NodeId};
use crate::dataflow::{
    aliases_at, definitions_of, is_loop_dependent, DataflowResult, VariableAlias, VariableDescriptor,
};
use crate::ir::{Expr, Instruction};
use crate::utils::errors::{AnalysisError, AnalysisErrorKind, AnalysisResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// One read or write of an array element.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ArrayAccess {
    pub node: NodeId,
    /// The `ArrayAccess` expression
    pub expression: Expr,
    pub is_write: bool,
}

impl fmt::Display for ArrayAccess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mode = if self.is_write { "write" } else { "read" };
        write!(f, "{} {} at {}", mode, self.expression, self.node)
    }
}

/// Every array access in the graph, in node order.
pub fn collect_accesses(graph: &ControlFlowGraph) -> Vec<ArrayAccess> {
    let mut out = Vec::new();
    for (node, instr) in graph.instruction_nodes() {
        let written = instr.written_array().is_some();
        for (position, expr) in instr.expressions().into_iter().enumerate() {
            for (depth, access) in expr.array_accesses().into_iter().enumerate() {
                out.push(ArrayAccess {
                    node,
                    expression: access.clone(),
                    // the store target is the outermost access of the first expression
                    is_write: written && position == 0 && depth == 0,
                });
            }
        }
    }
    out
}

/// An index expression with every variable resolved to the definitions
/// that reach it, after chasing plain copies.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct ResolvedIndex {
    dimension: usize,
    expression: Expr,
    definitions: Vec<(String, BTreeSet<NodeId>)>,
}

pub struct ArrayAccessVerifier<'a> {
    graph: &'a ControlFlowGraph,
    descriptors: &'a DataflowResult<VariableDescriptor>,
    aliases: &'a DataflowResult<VariableAlias>,
}

impl<'a> ArrayAccessVerifier<'a> {
    pub fn new(
        graph: &'a ControlFlowGraph,
        descriptors: &'a DataflowResult<VariableDescriptor>,
        aliases: &'a DataflowResult<VariableAlias>,
    ) -> Self {
        Self { graph, descriptors, aliases }
    }

    /// `Ok(None)` when every written alias group is accessed consistently.
    pub fn verify(&self) -> AnalysisResult<Option<Rejection>> {
        let mut groups: BTreeMap<Expr, Vec<ArrayAccess>> = BTreeMap::new();
        for access in collect_accesses(self.graph) {
            let Expr::ArrayAccess { name, accessors } = &access.expression else {
                continue;
            };
            if accessors.is_empty() {
                return Err(AnalysisError::new(
                    AnalysisErrorKind::EmptyAccessor,
                    format!("array access '{}' has no index", name),
                ));
            }
            for target in aliases_at(self.aliases, access.node, name)? {
                groups.entry(target).or_default().push(access.clone());
            }
        }

        for (target, accesses) in groups {
            if !accesses.iter().any(|a| a.is_write) {
                log::trace!("group {} is only read", target);
                continue;
            }

            let mut indices = BTreeSet::new();
            for access in &accesses {
                indices.insert(self.resolve(access)?);
            }
            if indices.len() > 1 {
                log::debug!("group {} rejected: {} distinct indices", target, indices.len());
                return Ok(Some(Rejection {
                    verifier: VerifierKind::ArrayAccess,
                    reason: RejectionReason::ConflictingAccesses { target, accesses },
                }));
            }
            log::debug!("group {} accessed consistently by {} accesses", target, accesses.len());
        }
        Ok(None)
    }

    /// The loop-dependent dimension of `access` and its resolved index.
    fn resolve(&self, access: &ArrayAccess) -> AnalysisResult<ResolvedIndex> {
        let Expr::ArrayAccess { name, accessors } = &access.expression else {
            return Err(AnalysisError::new(
                AnalysisErrorKind::EmptyAccessor,
                format!("'{}' is not an array access", access.expression),
            ));
        };
        let facts = self.descriptors.facts_at(access.node);

        let dependent: Vec<usize> = accessors
            .iter()
            .enumerate()
            .filter(|(_, index)| is_loop_dependent(index, &facts))
            .map(|(position, _)| position)
            .collect();
        let dimension = match dependent.as_slice() {
            [single] => *single,
            [] => {
                return Err(AnalysisError::new(
                    AnalysisErrorKind::NoLoopDependentDimension,
                    format!("no index of '{}' depends on the loop at {}", access.expression, access.node),
                ))
            }
            _ => {
                return Err(AnalysisError::new(
                    AnalysisErrorKind::AmbiguousLoopDependentDimension,
                    format!("several indices of '{}' depend on the loop at {}", name, access.node),
                ))
            }
        };

        let mut definitions = Vec::new();
        let expression = accessors[dimension].map_variables(&mut |var: &str| {
            let (resolved, defs) = self.chase(var, access.node);
            definitions.push((resolved.clone(), defs));
            Some(Expr::var(resolved))
        });
        Ok(ResolvedIndex { dimension, expression, definitions })
    }

    /// Follow `name` back through plain copies with a single reaching
    /// definition; returns the final name and the definitions reaching it.
    fn chase(&self, name: &str, node: NodeId) -> (String, BTreeSet<NodeId>) {
        let mut name = name.to_string();
        let mut node = node;
        for _ in 0..self.graph.len() {
            let defs = definitions_of(&self.descriptors.facts_at(node), &name);
            let single = match defs.iter().next() {
                Some(&def) if defs.len() == 1 => def,
                _ => return (name, defs),
            };
            match self.graph.node(single).instruction() {
                Some(Instruction::Assignment { target: Expr::Variable(t), value: Expr::Variable(source) })
                    if *t == name && *source != name =>
                {
                    name = source.clone();
                    node = single;
                }
                _ => return (name, defs),
            }
        }
        let defs = definitions_of(&self.descriptors.facts_at(node), &name);
        (name, defs)
    }
}
