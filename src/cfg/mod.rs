//! Control-flow graphs over the loop IR.
//!
//! This module contains:
//! - The arena-backed graph (`graph`)
//! - Lowering of instruction sequences, with call stitching (`builder`)
//! - The call graph recorded during stitching (`call_graph`)

pub mod builder;
pub mod call_graph;
pub mod graph;

pub use builder::{
    argument_prefix, argument_variable, build_loop_cfg, build_procedure_cfg, call_variable,
    result_variable,
};
pub use call_graph::{CallGraph, CallSite};
pub use graph::{BoundaryKind, ControlFlowGraph, FlowEdge, FlowNode, FlowNodeKind, NodeId, TransferKind};
