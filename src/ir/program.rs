//! Procedures, loop programs and the external symbol table.
//!
//! A [`LoopProgram`] is everything the engine needs to judge one loop: the
//! lowered body, the helper procedures it may call, and what the front-end
//! knows about symbols that live outside the loop.

use crate::ir::expr::Expr;
use crate::ir::instr::Instruction;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Name of the synthetic procedure wrapping the loop body.
pub const LOOP_PROCEDURE: &str = "$loop";

/// A procedure lowered to a flat instruction sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Procedure {
    pub name: String,
    pub parameters: Vec<String>,
    pub body: Vec<Instruction>,
}

impl Procedure {
    pub fn new(name: impl Into<String>, parameters: Vec<String>, body: Vec<Instruction>) -> Self {
        Self { name: name.into(), parameters, body }
    }

    /// Names of procedures invoked anywhere in the body.
    pub fn callees(&self) -> BTreeSet<String> {
        fn visit(expr: &Expr, out: &mut BTreeSet<String>) {
            if let Expr::Invocation { name, .. } = expr {
                out.insert(name.clone());
            }
            for child in expr.children() {
                visit(child, out);
            }
        }

        let mut out = BTreeSet::new();
        for instr in &self.body {
            if let Instruction::Invocation { name, .. } = instr {
                out.insert(name.clone());
            }
            for expr in instr.expressions() {
                visit(expr, &mut out);
            }
        }
        out
    }
}

/// A counted loop ready for analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoopProgram {
    /// The single induction variable
    pub induction_variable: String,
    /// Inclusive lower bound, if known
    pub lower_bound: Option<Expr>,
    /// Exclusive upper bound, if known
    pub upper_bound: Option<Expr>,
    /// Lowered loop body
    pub body: Vec<Instruction>,
    /// Helper procedures reachable from the body, by name
    pub procedures: BTreeMap<String, Procedure>,
    /// Symbols declared outside the loop
    pub symbols: SymbolTable,
}

impl LoopProgram {
    pub fn new(induction_variable: impl Into<String>, body: Vec<Instruction>) -> Self {
        Self {
            induction_variable: induction_variable.into(),
            lower_bound: None,
            upper_bound: None,
            body,
            procedures: BTreeMap::new(),
            symbols: SymbolTable::new(),
        }
    }

    pub fn with_bounds(mut self, lower: Expr, upper: Expr) -> Self {
        self.lower_bound = Some(lower);
        self.upper_bound = Some(upper);
        self
    }

    pub fn with_procedure(mut self, procedure: Procedure) -> Self {
        self.procedures.insert(procedure.name.clone(), procedure);
        self
    }

    pub fn with_symbol(mut self, symbol: SymbolInfo) -> Self {
        self.symbols.insert(symbol);
        self
    }

    /// The loop body wrapped as the root procedure of the analysis.
    pub fn root_procedure(&self) -> Procedure {
        Procedure::new(LOOP_PROCEDURE, Vec::new(), self.body.clone())
    }
}

/// Where a symbol is declared, as far as other code can observe it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Visibility {
    /// Local variable of the enclosing method
    Local,
    /// Parameter of the enclosing method
    Parameter,
    /// Private, non-virtual member
    PrivateMember,
    /// Field or property visible outside its declaring type
    PublicMember,
}

/// Element type of an array symbol.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ElementType {
    pub name: String,
    /// Values are copied on assignment (`int`, `double`, structs, ...)
    pub is_value_type: bool,
}

impl ElementType {
    const VALUE_TYPES: &'static [&'static str] = &[
        "int", "long", "short", "byte", "char", "bool", "float", "double", "decimal",
    ];

    /// Classify a type name, treating the built-in numeric types as value types.
    pub fn named(name: impl Into<String>) -> Self {
        let name = name.into();
        let is_value_type = Self::VALUE_TYPES.contains(&name.as_str());
        Self { name, is_value_type }
    }
}

/// Syntactic form of a site that may rebind a symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RebindingKind {
    Assignment,
    Initializer,
    /// Passed as a `ref`/`out` argument
    RefArgument,
}

/// What a rebinding site stores into the symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RebindingValue {
    /// A freshly constructed array
    FreshConstruction,
    NullLiteral,
    /// Any reference read from elsewhere
    Reference,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rebinding {
    pub kind: RebindingKind,
    pub value: RebindingValue,
}

/// Front-end facts about one symbol declared outside the loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolInfo {
    pub name: String,
    pub visibility: Visibility,
    pub element_type: ElementType,
    /// Array rank; 0 for scalars
    pub rank: usize,
    pub rebindings: Vec<Rebinding>,
}

impl SymbolInfo {
    pub fn scalar(name: impl Into<String>, visibility: Visibility, ty: &str) -> Self {
        Self {
            name: name.into(),
            visibility,
            element_type: ElementType::named(ty),
            rank: 0,
            rebindings: Vec::new(),
        }
    }

    pub fn array(name: impl Into<String>, visibility: Visibility, element: &str, rank: usize) -> Self {
        Self {
            name: name.into(),
            visibility,
            element_type: ElementType::named(element),
            rank,
            rebindings: Vec::new(),
        }
    }

    pub fn with_rebinding(mut self, kind: RebindingKind, value: RebindingValue) -> Self {
        self.rebindings.push(Rebinding { kind, value });
        self
    }

    pub fn is_array(&self) -> bool {
        self.rank > 0
    }
}

/// Symbols visible to the loop, keyed by name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolTable {
    symbols: BTreeMap<String, SymbolInfo>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, symbol: SymbolInfo) {
        self.symbols.insert(symbol.name.clone(), symbol);
    }

    pub fn get(&self, name: &str) -> Option<&SymbolInfo> {
        self.symbols.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SymbolInfo> {
        self.symbols.values()
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_callees_found_in_nested_expressions() {
        let proc = Procedure::new(
            "p",
            vec![],
            vec![
                Instruction::assign(
                    Expr::var("x"),
                    Expr::add(Expr::call("f", vec![Expr::call("g", vec![])]), Expr::int(1)),
                ),
                Instruction::call("h", vec![]),
            ],
        );
        let callees: Vec<_> = proc.callees().into_iter().collect();
        assert_eq!(callees, vec!["f", "g", "h"]);
    }

    #[test]
    fn test_element_type_classification() {
        assert!(ElementType::named("double").is_value_type);
        assert!(!ElementType::named("Node").is_value_type);
    }

    #[test]
    fn test_symbol_table() {
        let mut table = SymbolTable::new();
        table.insert(SymbolInfo::array("a", Visibility::Parameter, "int", 1));
        table.insert(SymbolInfo::scalar("n", Visibility::Local, "int"));
        assert_eq!(table.len(), 2);
        assert!(table.get("a").map(SymbolInfo::is_array).unwrap_or(false));
        assert!(!table.get("n").map(SymbolInfo::is_array).unwrap_or(true));
    }
}
