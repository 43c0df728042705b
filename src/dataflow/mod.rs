//! Fixed-point dataflow analyses over control-flow graphs.
//!
//! - `framework`: the generic worklist solver and the analysis trait
//! - `descriptor` / `loop_dependence`: qualitative loop-dependence facts
//! - `available_expressions`, `copy_propagation`: facts driving the optimizer
//! - `alias`: may-alias tracking for array references

pub mod alias;
pub mod available_expressions;
pub mod copy_propagation;
pub mod descriptor;
pub mod framework;
pub mod loop_dependence;

pub use alias::{aliases_at, AliasAnalysis, VariableAlias};
pub use available_expressions::{AvailableExpression, AvailableExpressions};
pub use copy_propagation::{copies_of, CopyFact, CopyPropagation};
pub use descriptor::{definitions_of, kinds_of, merge_descriptors, DescriptorKind, VariableDescriptor};
pub use framework::{
    intersection, union, DataflowAnalysis, DataflowResult, DataflowSolver, Direction, Fact, FactSet,
    MergeFn, WorklistSeed, DEFAULT_MAX_ITERATIONS,
};
pub use loop_dependence::{evaluate, is_loop_dependent, LoopDependenceAnalysis};
