//! Expressions of the loop IR.
//!
//! Expressions are immutable trees compared by value: two expressions are
//! equal iff they have the same shape, operators and leaves. Every analysis
//! in the crate dispatches on [`Expr`] with an exhaustive `match`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// An expression in three-address form (operands are usually names or literals).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Expr {
    /// Read of a scalar or array reference
    Variable(String),
    /// Element access `name[a0][a1]...`
    ArrayAccess {
        name: String,
        accessors: Vec<Expr>,
    },
    /// Integer constant
    IntegerLiteral(i64),
    /// Floating-point constant
    DoubleLiteral(DoubleValue),
    /// Arithmetic negation
    UnaryMinus(Box<Expr>),
    /// Binary operation
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// Explicit grouping
    Parentheses(Box<Expr>),
    /// `condition ? when_true : when_false`
    Conditional {
        condition: Box<Expr>,
        when_true: Box<Expr>,
        when_false: Box<Expr>,
    },
    /// Call of a procedure
    Invocation {
        name: String,
        arguments: Vec<Expr>,
    },
}

/// Binary operators.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    /// Any operator the analyses do not model (`&`, `<<`, `&&`, ...)
    Generic(String),
    Comparison(CompareOp),
}

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    /// Source form of the operator.
    pub fn symbol(&self) -> &'static str {
        match self {
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        }
    }
}

impl BinaryOp {
    /// Source form of the operator.
    pub fn symbol(&self) -> &str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Subtract => "-",
            BinaryOp::Multiply => "*",
            BinaryOp::Divide => "/",
            BinaryOp::Modulo => "%",
            BinaryOp::Generic(op) => op,
            BinaryOp::Comparison(op) => op.symbol(),
        }
    }
}

/// A double constant stored by its bit pattern so expressions stay `Eq + Ord + Hash`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "f64", into = "f64")]
pub struct DoubleValue(u64);

impl DoubleValue {
    pub fn new(value: f64) -> Self {
        // -0.0 and 0.0 denote the same constant
        if value == 0.0 {
            Self(0.0f64.to_bits())
        } else if value.is_nan() {
            Self(f64::NAN.to_bits())
        } else {
            Self(value.to_bits())
        }
    }

    pub fn get(&self) -> f64 {
        f64::from_bits(self.0)
    }
}

impl From<f64> for DoubleValue {
    fn from(value: f64) -> Self {
        Self::new(value)
    }
}

impl From<DoubleValue> for f64 {
    fn from(value: DoubleValue) -> Self {
        value.get()
    }
}

impl Expr {
    pub fn var(name: impl Into<String>) -> Self {
        Expr::Variable(name.into())
    }

    pub fn int(value: i64) -> Self {
        Expr::IntegerLiteral(value)
    }

    pub fn double(value: f64) -> Self {
        Expr::DoubleLiteral(DoubleValue::new(value))
    }

    pub fn array(name: impl Into<String>, accessors: Vec<Expr>) -> Self {
        Expr::ArrayAccess { name: name.into(), accessors }
    }

    pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Self {
        Expr::Binary { op, left: Box::new(left), right: Box::new(right) }
    }

    pub fn add(left: Expr, right: Expr) -> Self {
        Self::binary(BinaryOp::Add, left, right)
    }

    pub fn sub(left: Expr, right: Expr) -> Self {
        Self::binary(BinaryOp::Subtract, left, right)
    }

    pub fn mul(left: Expr, right: Expr) -> Self {
        Self::binary(BinaryOp::Multiply, left, right)
    }

    pub fn div(left: Expr, right: Expr) -> Self {
        Self::binary(BinaryOp::Divide, left, right)
    }

    pub fn rem(left: Expr, right: Expr) -> Self {
        Self::binary(BinaryOp::Modulo, left, right)
    }

    pub fn neg(operand: Expr) -> Self {
        Expr::UnaryMinus(Box::new(operand))
    }

    pub fn paren(inner: Expr) -> Self {
        Expr::Parentheses(Box::new(inner))
    }

    pub fn compare(op: CompareOp, left: Expr, right: Expr) -> Self {
        Self::binary(BinaryOp::Comparison(op), left, right)
    }

    pub fn conditional(condition: Expr, when_true: Expr, when_false: Expr) -> Self {
        Expr::Conditional {
            condition: Box::new(condition),
            when_true: Box::new(when_true),
            when_false: Box::new(when_false),
        }
    }

    pub fn call(name: impl Into<String>, arguments: Vec<Expr>) -> Self {
        Expr::Invocation { name: name.into(), arguments }
    }

    /// The variable name if this is a plain variable read.
    pub fn as_variable(&self) -> Option<&str> {
        match self {
            Expr::Variable(name) => Some(name),
            _ => None,
        }
    }

    /// Direct sub-expressions, in evaluation order.
    pub fn children(&self) -> Vec<&Expr> {
        match self {
            Expr::Variable(_) | Expr::IntegerLiteral(_) | Expr::DoubleLiteral(_) => Vec::new(),
            Expr::ArrayAccess { accessors, .. } => accessors.iter().collect(),
            Expr::UnaryMinus(inner) | Expr::Parentheses(inner) => vec![inner.as_ref()],
            Expr::Binary { left, right, .. } => vec![left.as_ref(), right.as_ref()],
            Expr::Conditional { condition, when_true, when_false } => {
                vec![condition.as_ref(), when_true.as_ref(), when_false.as_ref()]
            }
            Expr::Invocation { arguments, .. } => arguments.iter().collect(),
        }
    }

    /// Scalar variables read by this expression (array names excluded).
    pub fn variables(&self) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        self.collect_names(&mut out, false);
        out
    }

    /// Every name referenced, including the names of accessed arrays.
    pub fn names(&self) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        self.collect_names(&mut out, true);
        out
    }

    fn collect_names(&self, out: &mut BTreeSet<String>, with_arrays: bool) {
        match self {
            Expr::Variable(name) => {
                out.insert(name.clone());
            }
            Expr::ArrayAccess { name, .. } if with_arrays => {
                out.insert(name.clone());
            }
            _ => {}
        }
        for child in self.children() {
            child.collect_names(out, with_arrays);
        }
    }

    /// Whether `name` is read, either as a scalar or as an accessed array.
    pub fn reads(&self, name: &str) -> bool {
        match self {
            Expr::Variable(v) if v == name => true,
            Expr::ArrayAccess { name: array, .. } if array == name => true,
            _ => self.children().into_iter().any(|c| c.reads(name)),
        }
    }

    /// All array accesses in pre-order, including those nested in accessors.
    pub fn array_accesses(&self) -> Vec<&Expr> {
        let mut out = Vec::new();
        self.collect_accesses(&mut out);
        out
    }

    fn collect_accesses<'a>(&'a self, out: &mut Vec<&'a Expr>) {
        if let Expr::ArrayAccess { .. } = self {
            out.push(self);
        }
        for child in self.children() {
            child.collect_accesses(out);
        }
    }

    pub fn contains_invocation(&self) -> bool {
        matches!(self, Expr::Invocation { .. })
            || self.children().into_iter().any(Expr::contains_invocation)
    }

    pub fn contains_array_access(&self) -> bool {
        matches!(self, Expr::ArrayAccess { .. })
            || self.children().into_iter().any(Expr::contains_array_access)
    }

    /// Whether the expression computes something that CSE may reuse.
    ///
    /// Loads and calls are excluded: their value depends on memory the
    /// available-expressions analysis does not track precisely.
    pub fn is_reusable_computation(&self) -> bool {
        match self {
            Expr::Binary { .. } | Expr::UnaryMinus(_) | Expr::Parentheses(_) | Expr::Conditional { .. } => {
                !self.contains_invocation() && !self.contains_array_access()
            }
            _ => false,
        }
    }

    /// Rebuild the expression, replacing scalar variable reads for which `f`
    /// returns a substitute. Array names are never rewritten.
    pub fn map_variables<F>(&self, f: &mut F) -> Expr
    where
        F: FnMut(&str) -> Option<Expr>,
    {
        match self {
            Expr::Variable(name) => f(name).unwrap_or_else(|| self.clone()),
            Expr::IntegerLiteral(_) | Expr::DoubleLiteral(_) => self.clone(),
            Expr::ArrayAccess { name, accessors } => Expr::ArrayAccess {
                name: name.clone(),
                accessors: accessors.iter().map(|a| a.map_variables(f)).collect(),
            },
            Expr::UnaryMinus(inner) => Expr::UnaryMinus(Box::new(inner.map_variables(f))),
            Expr::Parentheses(inner) => Expr::Parentheses(Box::new(inner.map_variables(f))),
            Expr::Binary { op, left, right } => Expr::Binary {
                op: op.clone(),
                left: Box::new(left.map_variables(f)),
                right: Box::new(right.map_variables(f)),
            },
            Expr::Conditional { condition, when_true, when_false } => Expr::Conditional {
                condition: Box::new(condition.map_variables(f)),
                when_true: Box::new(when_true.map_variables(f)),
                when_false: Box::new(when_false.map_variables(f)),
            },
            Expr::Invocation { name, arguments } => Expr::Invocation {
                name: name.clone(),
                arguments: arguments.iter().map(|a| a.map_variables(f)).collect(),
            },
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Variable(name) => write!(f, "{}", name),
            Expr::ArrayAccess { name, accessors } => {
                write!(f, "{}", name)?;
                for accessor in accessors {
                    write!(f, "[{}]", accessor)?;
                }
                Ok(())
            }
            Expr::IntegerLiteral(v) => write!(f, "{}", v),
            Expr::DoubleLiteral(v) => write!(f, "{:?}", v.get()),
            Expr::UnaryMinus(inner) => write!(f, "-{}", inner),
            Expr::Binary { op, left, right } => write!(f, "{} {} {}", left, op.symbol(), right),
            Expr::Parentheses(inner) => write!(f, "({})", inner),
            Expr::Conditional { condition, when_true, when_false } => {
                write!(f, "{} ? {} : {}", condition, when_true, when_false)
            }
            Expr::Invocation { name, arguments } => {
                write!(f, "{}(", name)?;
                for (i, arg) in arguments.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                write!(f, ")")
            }
        }
    }
}
