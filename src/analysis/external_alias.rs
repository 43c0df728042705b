//! Alias groups for array symbols declared outside the loop.
//!
//! The front-end reports, for every external symbol, its rank, element type,
//! visibility and the sites that rebind it. From these facts the collector
//! partitions the arrays the loop reads into groups that may share storage.

use crate::dataflow::{FactSet, VariableAlias};
use crate::ir::{Expr, Instruction, LoopProgram, RebindingValue, SymbolInfo, Visibility};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Symbols that may denote the same storage, identified by `target`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AliasGroup {
    /// `Variable(<first member in name order>)`
    pub target: Expr,
    pub members: BTreeSet<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalAliases {
    groups: Vec<AliasGroup>,
}

impl ExternalAliases {
    pub fn groups(&self) -> &[AliasGroup] {
        &self.groups
    }

    /// Group target of an external symbol.
    pub fn target_of(&self, name: &str) -> Option<&Expr> {
        self.groups.iter().find(|g| g.members.contains(name)).map(|g| &g.target)
    }

    /// Initial alias facts, one per member.
    pub fn seeds(&self) -> FactSet<VariableAlias> {
        self.groups
            .iter()
            .flat_map(|g| g.members.iter().map(move |m| VariableAlias::new(m.clone(), g.target.clone())))
            .collect()
    }
}

/// Whether every way `symbol` can be rebound yields storage nobody else sees.
pub fn is_provably_exclusive(symbol: &SymbolInfo) -> bool {
    symbol.visibility != Visibility::PublicMember
        && symbol.rebindings.iter().all(|r| {
            matches!(r.value, RebindingValue::FreshConstruction | RebindingValue::NullLiteral)
        })
}

/// Whether `a` and `b` may refer to the same array.
pub fn may_alias(a: &SymbolInfo, b: &SymbolInfo) -> bool {
    if a.rank != b.rank {
        return false;
    }
    if a.element_type != b.element_type
        && (a.element_type.is_value_type || b.element_type.is_value_type)
    {
        return false;
    }
    if is_provably_exclusive(a) && is_provably_exclusive(b) {
        let has_parameter = a.visibility == Visibility::Parameter || b.visibility == Visibility::Parameter;
        let has_local = a.visibility == Visibility::Local || b.visibility == Visibility::Local;
        return has_parameter && !has_local;
    }
    true
}

/// Names `body` reads without declaring them itself.
fn undeclared_reads_of(parameters: &[String], body: &[Instruction]) -> BTreeSet<String> {
    let mut read = BTreeSet::new();
    let mut declared: BTreeSet<&str> = parameters.iter().map(String::as_str).collect();
    for instr in body {
        match instr {
            Instruction::Declaration { name } => {
                declared.insert(name.as_str());
            }
            Instruction::Assignment { target: Expr::ArrayAccess { name, .. }, .. } => {
                read.insert(name.clone());
            }
            _ => {}
        }
        for expr in instr.expressions() {
            read.extend(expr.names());
        }
    }
    read.retain(|name| !declared.contains(name.as_str()));
    read
}

/// Names read by the loop or one of its procedures without a declaration
/// in that same body.
fn undeclared_reads(program: &LoopProgram) -> BTreeSet<String> {
    let mut read = undeclared_reads_of(&[], &program.body);
    for procedure in program.procedures.values() {
        read.extend(undeclared_reads_of(&procedure.parameters, &procedure.body));
    }
    read
}

/// Partition the external arrays the loop reads into alias groups.
pub fn collect_external_aliases(program: &LoopProgram) -> ExternalAliases {
    let candidates: Vec<&SymbolInfo> = undeclared_reads(program)
        .iter()
        .filter_map(|name| program.symbols.get(name))
        .filter(|s| s.is_array())
        .collect();

    let mut groups: Vec<Vec<&SymbolInfo>> = Vec::new();
    for symbol in candidates {
        let (joined, rest): (Vec<_>, Vec<_>) = groups
            .into_iter()
            .partition(|g| g.iter().any(|member| may_alias(symbol, member)));
        let mut merged: Vec<&SymbolInfo> = joined.into_iter().flatten().collect();
        merged.push(symbol);
        groups = rest;
        groups.push(merged);
    }

    let mut groups: Vec<AliasGroup> = groups
        .into_iter()
        .map(|g| {
            let members: BTreeSet<String> = g.iter().map(|s| s.name.clone()).collect();
            let first = members.iter().next().cloned().unwrap_or_default();
            AliasGroup { target: Expr::var(first), members }
        })
        .collect();
    groups.sort_by(|a, b| a.target.cmp(&b.target));

    for group in &groups {
        log::debug!("alias group {}: {:?}", group.target, group.members);
    }
    ExternalAliases { groups }
}
