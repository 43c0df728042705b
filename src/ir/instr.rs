//! Instructions of the loop IR.

use crate::ir::expr::Expr;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A single three-address instruction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Instruction {
    /// `target = value`, where `target` is a variable or an array element
    Assignment { target: Expr, value: Expr },
    /// `var name;`
    Declaration { name: String },
    /// Jump target
    Label { name: String },
    /// Unconditional jump
    Jump { target: String },
    /// Jump taken when `condition` holds; falls through otherwise
    ConditionalJump { condition: Expr, target: String },
    /// Procedure call evaluated for its side effects
    Invocation { name: String, arguments: Vec<Expr> },
}

impl Instruction {
    pub fn assign(target: Expr, value: Expr) -> Self {
        Instruction::Assignment { target, value }
    }

    pub fn declare(name: impl Into<String>) -> Self {
        Instruction::Declaration { name: name.into() }
    }

    pub fn label(name: impl Into<String>) -> Self {
        Instruction::Label { name: name.into() }
    }

    pub fn jump(target: impl Into<String>) -> Self {
        Instruction::Jump { target: target.into() }
    }

    pub fn branch(condition: Expr, target: impl Into<String>) -> Self {
        Instruction::ConditionalJump { condition, target: target.into() }
    }

    pub fn call(name: impl Into<String>, arguments: Vec<Expr>) -> Self {
        Instruction::Invocation { name: name.into(), arguments }
    }

    /// Scalar variable (re)defined by this instruction.
    ///
    /// Writes to array elements define no variable.
    pub fn defined_variable(&self) -> Option<&str> {
        match self {
            Instruction::Declaration { name } => Some(name),
            Instruction::Assignment { target: Expr::Variable(name), .. } => Some(name),
            _ => None,
        }
    }

    /// Name of the array whose element this instruction writes, if any.
    pub fn written_array(&self) -> Option<&str> {
        match self {
            Instruction::Assignment { target: Expr::ArrayAccess { name, .. }, .. } => Some(name),
            _ => None,
        }
    }

    /// Expressions evaluated by this instruction, in evaluation order.
    ///
    /// For an array-element assignment the target itself is included, so
    /// callers can reach its accessors; use [`Instruction::written_array`]
    /// to tell the write apart from reads.
    pub fn expressions(&self) -> Vec<&Expr> {
        match self {
            Instruction::Assignment { target, value } => match target {
                Expr::ArrayAccess { .. } => vec![target, value],
                _ => vec![value],
            },
            Instruction::ConditionalJump { condition, .. } => vec![condition],
            Instruction::Invocation { arguments, .. } => arguments.iter().collect(),
            Instruction::Declaration { .. } | Instruction::Label { .. } | Instruction::Jump { .. } => {
                Vec::new()
            }
        }
    }

    /// Whether any evaluated expression contains a procedure call.
    pub fn contains_invocation(&self) -> bool {
        matches!(self, Instruction::Invocation { .. })
            || self.expressions().into_iter().any(Expr::contains_invocation)
    }

    /// Rebuild the instruction with scalar reads substituted by `f`.
    ///
    /// The assigned variable of an assignment is a write and is left alone;
    /// the accessors of an assigned array element are reads and are rewritten.
    pub fn map_reads<F>(&self, f: &mut F) -> Instruction
    where
        F: FnMut(&str) -> Option<Expr>,
    {
        match self {
            Instruction::Assignment { target, value } => {
                let target = match target {
                    Expr::ArrayAccess { .. } => target.map_variables(f),
                    _ => target.clone(),
                };
                Instruction::Assignment { target, value: value.map_variables(f) }
            }
            Instruction::ConditionalJump { condition, target } => Instruction::ConditionalJump {
                condition: condition.map_variables(f),
                target: target.clone(),
            },
            Instruction::Invocation { name, arguments } => Instruction::Invocation {
                name: name.clone(),
                arguments: arguments.iter().map(|a| a.map_variables(f)).collect(),
            },
            Instruction::Declaration { .. } | Instruction::Label { .. } | Instruction::Jump { .. } => {
                self.clone()
            }
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instruction::Assignment { target, value } => write!(f, "{} = {};", target, value),
            Instruction::Declaration { name } => write!(f, "var {};", name),
            Instruction::Label { name } => write!(f, "{}:", name),
            Instruction::Jump { target } => write!(f, "goto {};", target),
            Instruction::ConditionalJump { condition, target } => {
                write!(f, "if {} goto {};", condition, target)
            }
            Instruction::Invocation { name, arguments } => {
                write!(f, "call {};", Expr::call(name.clone(), arguments.clone()))
            }
        }
    }
}
