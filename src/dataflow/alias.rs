//! May-alias tracking for array references.
//!
//! A fact `(source, target)` says the name `source` may denote the storage
//! identified by `target`. External symbols are seeded with their alias
//! group; names declared in the analyzed code denote themselves until they
//! are assigned another reference. A computed value (a conditional, an
//! unresolved call, arithmetic) may denote anything its operands denote.

use crate::cfg::{BoundaryKind, ControlFlowGraph, FlowNodeKind, NodeId};
use crate::dataflow::framework::{union, DataflowAnalysis, DataflowResult, Fact, FactSet, MergeFn};
use crate::ir::{Expr, Instruction};
use crate::utils::errors::{AnalysisError, AnalysisErrorKind, AnalysisResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VariableAlias {
    pub source: String,
    pub target: Expr,
}

impl VariableAlias {
    pub fn new(source: impl Into<String>, target: Expr) -> Self {
        Self { source: source.into(), target }
    }
}

impl Fact for VariableAlias {
    fn subject(&self) -> Option<&str> {
        Some(&self.source)
    }
}

pub struct AliasAnalysis {
    external: FactSet<VariableAlias>,
    merge: MergeFn<VariableAlias>,
}

impl AliasAnalysis {
    /// `external` holds one fact per symbol declared outside the loop.
    pub fn new(external: FactSet<VariableAlias>) -> Self {
        Self { external, merge: union }
    }
}

fn targets_of<'a>(facts: &'a FactSet<VariableAlias>, name: &'a str) -> impl Iterator<Item = &'a Expr> + 'a {
    facts.iter().filter(move |f| f.source == name).map(|f| &f.target)
}

impl DataflowAnalysis for AliasAnalysis {
    type Fact = VariableAlias;

    fn name(&self) -> &'static str {
        "alias"
    }

    fn merge(&self) -> MergeFn<VariableAlias> {
        self.merge
    }

    fn extremal_value(&self, _graph: &ControlFlowGraph) -> FactSet<VariableAlias> {
        self.external.clone()
    }

    fn transfer(
        &self,
        graph: &ControlFlowGraph,
        node: NodeId,
        input: &FactSet<VariableAlias>,
    ) -> FactSet<VariableAlias> {
        let flow = graph.node(node);
        let (name, targets): (&String, Vec<Expr>) = match &flow.kind {
            // external symbols stay visible inside callees
            FlowNodeKind::Boundary(BoundaryKind::Start) if flow.procedure != graph.root() => {
                return input.union(&self.external).cloned().collect();
            }
            FlowNodeKind::Instruction(Instruction::Declaration { name }) => (name, vec![Expr::var(name.clone())]),
            FlowNodeKind::Instruction(Instruction::Assignment { target: Expr::Variable(name), value }) => {
                let targets = match value {
                    Expr::Variable(source) => {
                        let known: Vec<Expr> = targets_of(input, source).cloned().collect();
                        if known.is_empty() {
                            vec![value.clone()]
                        } else {
                            known
                        }
                    }
                    // a computed reference may be any reference it reads; with
                    // none known the name is left unresolved
                    _ => value
                        .names()
                        .iter()
                        .flat_map(|read| targets_of(input, read).cloned())
                        .collect::<BTreeSet<_>>()
                        .into_iter()
                        .collect(),
                };
                (name, targets)
            }
            _ => return input.clone(),
        };

        let mut out: FactSet<VariableAlias> = input.iter().filter(|f| &f.source != name).cloned().collect();
        out.extend(targets.into_iter().map(|t| VariableAlias::new(name.clone(), t)));
        out
    }
}

/// Alias targets `name` may denote when control reaches `node`.
///
/// Zero candidates means the name cannot be resolved and is fatal.
pub fn aliases_at(
    result: &DataflowResult<VariableAlias>,
    node: NodeId,
    name: &str,
) -> AnalysisResult<BTreeSet<Expr>> {
    let targets: BTreeSet<Expr> = result
        .input(node)
        .map(|facts| targets_of(facts, name).cloned().collect())
        .unwrap_or_default();
    if targets.is_empty() {
        return Err(AnalysisError::new(
            AnalysisErrorKind::UnresolvedAlias,
            format!("no alias known for '{}' at {}", name, node),
        ));
    }
    Ok(targets)
}
