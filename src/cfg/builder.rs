//! Lowering of flat instruction sequences into a [`ControlFlowGraph`].
//!
//! In interprocedural mode every call is hoisted out of the instruction that
//! contains it. For a call `f(a0, a1)` the builder emits, in order:
//!
//! ```text
//! var $arg_f_0; $arg_f_0 = a0;
//! var $arg_f_1; $arg_f_1 = a1;
//! invoke f($arg_f_0, $arg_f_1)      -> enter $loop -> f -> start f ...
//!                                   <- return f -> $loop <- end f
//! var $call_f_0; $call_f_0 = $result_f;
//! ```
//!
//! and the call expression is replaced by `$call_f_0`. Each callee is built
//! once, behind a prologue that declares `$result_f` and binds every
//! parameter to its `$arg_f_k` variable.

use crate::cfg::call_graph::{CallGraph, CallSite};
use crate::cfg::graph::{ControlFlowGraph, FlowNodeKind, NodeId, TransferKind};
use crate::ir::{Expr, Instruction, LoopProgram, Procedure, LOOP_PROCEDURE};
use crate::utils::errors::{AnalysisError, AnalysisResult};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Variable holding argument `index` of a call to `procedure`.
pub fn argument_variable(procedure: &str, index: usize) -> String {
    format!("$arg_{}_{}", procedure, index)
}

/// Prefix shared by every argument variable of `procedure`.
pub fn argument_prefix(procedure: &str) -> String {
    format!("$arg_{}_", procedure)
}

/// Variable a procedure assigns its return value to.
pub fn result_variable(procedure: &str) -> String {
    format!("$result_{}", procedure)
}

/// Variable capturing the value of the `n`-th call to `procedure`.
pub fn call_variable(procedure: &str, n: usize) -> String {
    format!("$call_{}_{}", procedure, n)
}

/// Build the CFG of a loop body.
///
/// With `interprocedural` set, every reachable procedure is stitched in and
/// the returned [`CallGraph`] records the call sites.
pub fn build_loop_cfg(
    program: &LoopProgram,
    interprocedural: bool,
) -> AnalysisResult<(ControlFlowGraph, CallGraph)> {
    let mut builder = CfgBuilder::new(LOOP_PROCEDURE, &program.procedures, interprocedural);
    builder.lower_body(LOOP_PROCEDURE, Vec::new(), &program.body)?;
    Ok(builder.finish())
}

/// Build the intraprocedural CFG of a single procedure.
pub fn build_procedure_cfg(procedure: &Procedure) -> AnalysisResult<ControlFlowGraph> {
    let empty = BTreeMap::new();
    let mut builder = CfgBuilder::new(&procedure.name, &empty, false);
    builder.lower_body(&procedure.name, Vec::new(), &procedure.body)?;
    Ok(builder.finish().0)
}

struct CfgBuilder<'a> {
    procedures: &'a BTreeMap<String, Procedure>,
    interprocedural: bool,
    graph: ControlFlowGraph,
    call_graph: CallGraph,
    built: BTreeSet<String>,
    call_counters: HashMap<String, usize>,
}

impl<'a> CfgBuilder<'a> {
    fn new(root: &str, procedures: &'a BTreeMap<String, Procedure>, interprocedural: bool) -> Self {
        let mut built = BTreeSet::new();
        built.insert(root.to_string());
        Self {
            procedures,
            interprocedural,
            graph: ControlFlowGraph::new(root),
            call_graph: CallGraph::new(root),
            built,
            call_counters: HashMap::new(),
        }
    }

    fn finish(mut self) -> (ControlFlowGraph, CallGraph) {
        self.graph.finalize();
        (self.graph, self.call_graph)
    }

    /// Lower `body` between the Start and End of `procedure`.
    fn lower_body(
        &mut self,
        procedure: &str,
        prologue: Vec<Instruction>,
        body: &'a [Instruction],
    ) -> AnalysisResult<()> {
        let (start, end) = self.graph.add_procedure(procedure);
        let mut prev = Some(start);
        let mut labels: HashMap<&str, NodeId> = HashMap::new();
        let mut jumps: Vec<(NodeId, &str)> = Vec::new();

        for instr in prologue {
            self.emit(procedure, FlowNodeKind::Instruction(instr), &mut prev);
        }

        for (index, instr) in body.iter().enumerate() {
            let lowered = if self.interprocedural && instr.contains_invocation() {
                match self.hoist_instruction(procedure, index, instr, &mut prev)? {
                    Some(lowered) => lowered,
                    // call statement, already represented by its call site
                    None => continue,
                }
            } else {
                instr.clone()
            };

            let node = self.graph.register_instruction(procedure, index, lowered);
            if let Some(p) = prev {
                self.graph.add_edge(p, node);
            }

            match instr {
                Instruction::Label { name } => {
                    if labels.insert(name.as_str(), node).is_some() {
                        return Err(AnalysisError::duplicate_label(name, procedure));
                    }
                    prev = Some(node);
                }
                Instruction::Jump { target } => {
                    jumps.push((node, target.as_str()));
                    prev = None;
                }
                Instruction::ConditionalJump { target, .. } => {
                    jumps.push((node, target.as_str()));
                    prev = Some(node);
                }
                _ => prev = Some(node),
            }
        }

        if let Some(p) = prev {
            self.graph.add_edge(p, end);
        }

        for (node, target) in jumps {
            let label = labels
                .get(target)
                .copied()
                .ok_or_else(|| AnalysisError::unknown_label(target, procedure))?;
            self.graph.add_edge(node, label);
        }

        log::trace!("lowered '{}': {} instructions", procedure, body.len());
        Ok(())
    }

    /// Append a synthetic node after `prev` and advance `prev` to it.
    fn emit(&mut self, procedure: &str, kind: FlowNodeKind, prev: &mut Option<NodeId>) -> NodeId {
        let id = self.graph.add_node(procedure, kind);
        if let Some(p) = *prev {
            self.graph.add_edge(p, id);
        }
        *prev = Some(id);
        id
    }

    /// Hoist every call out of `instr`. Returns the rewritten instruction, or
    /// `None` for a call statement, whose position is mapped onto its call site.
    fn hoist_instruction(
        &mut self,
        procedure: &str,
        index: usize,
        instr: &Instruction,
        prev: &mut Option<NodeId>,
    ) -> AnalysisResult<Option<Instruction>> {
        let lowered = match instr {
            Instruction::Assignment { target, value } => {
                let target = match target {
                    Expr::ArrayAccess { .. } => self.hoist_expr(procedure, target, prev)?,
                    _ => target.clone(),
                };
                let value = self.hoist_expr(procedure, value, prev)?;
                Instruction::Assignment { target, value }
            }
            Instruction::ConditionalJump { condition, target } => Instruction::ConditionalJump {
                condition: self.hoist_expr(procedure, condition, prev)?,
                target: target.clone(),
            },
            Instruction::Invocation { name, arguments } => {
                let arguments = self.hoist_all(procedure, arguments, prev)?;
                let call_node = self.emit_call(procedure, name, arguments, prev)?;
                self.graph.alias_instruction(procedure, index, call_node);
                return Ok(None);
            }
            Instruction::Declaration { .. } | Instruction::Label { .. } | Instruction::Jump { .. } => {
                instr.clone()
            }
        };
        Ok(Some(lowered))
    }

    fn hoist_all(
        &mut self,
        procedure: &str,
        exprs: &[Expr],
        prev: &mut Option<NodeId>,
    ) -> AnalysisResult<Vec<Expr>> {
        let mut out = Vec::with_capacity(exprs.len());
        for expr in exprs {
            out.push(self.hoist_expr(procedure, expr, prev)?);
        }
        Ok(out)
    }

    /// Rewrite `expr` with each call replaced by its `$call_*` capture,
    /// emitting the hoisted nodes in evaluation order.
    fn hoist_expr(
        &mut self,
        procedure: &str,
        expr: &Expr,
        prev: &mut Option<NodeId>,
    ) -> AnalysisResult<Expr> {
        let rewritten = match expr {
            Expr::Variable(_) | Expr::IntegerLiteral(_) | Expr::DoubleLiteral(_) => expr.clone(),
            Expr::ArrayAccess { name, accessors } => Expr::ArrayAccess {
                name: name.clone(),
                accessors: self.hoist_all(procedure, accessors, prev)?,
            },
            Expr::UnaryMinus(inner) => Expr::neg(self.hoist_expr(procedure, inner, prev)?),
            Expr::Parentheses(inner) => Expr::paren(self.hoist_expr(procedure, inner, prev)?),
            Expr::Binary { op, left, right } => {
                let left = self.hoist_expr(procedure, left, prev)?;
                let right = self.hoist_expr(procedure, right, prev)?;
                Expr::binary(op.clone(), left, right)
            }
            Expr::Conditional { condition, when_true, when_false } => {
                let condition = self.hoist_expr(procedure, condition, prev)?;
                let when_true = self.hoist_expr(procedure, when_true, prev)?;
                let when_false = self.hoist_expr(procedure, when_false, prev)?;
                Expr::conditional(condition, when_true, when_false)
            }
            Expr::Invocation { name, arguments } => {
                let arguments = self.hoist_all(procedure, arguments, prev)?;
                self.emit_call(procedure, name, arguments, prev)?;

                let counter = self.call_counters.entry(name.clone()).or_insert(0);
                let capture = call_variable(name, *counter);
                *counter += 1;

                self.emit(procedure, FlowNodeKind::Instruction(Instruction::declare(&capture)), prev);
                let assign = Instruction::assign(Expr::var(&capture), Expr::var(result_variable(name)));
                self.emit(procedure, FlowNodeKind::Instruction(assign), prev);
                Expr::var(capture)
            }
        };
        Ok(rewritten)
    }

    /// Emit argument bindings and the call site, and connect it to `callee`.
    fn emit_call(
        &mut self,
        caller: &str,
        callee: &str,
        arguments: Vec<Expr>,
        prev: &mut Option<NodeId>,
    ) -> AnalysisResult<NodeId> {
        let procedures = self.procedures;
        let target = procedures
            .get(callee)
            .ok_or_else(|| AnalysisError::unknown_procedure(callee))?;

        let mut bound = Vec::with_capacity(arguments.len());
        for (k, argument) in arguments.into_iter().enumerate() {
            let var = argument_variable(callee, k);
            self.emit(caller, FlowNodeKind::Instruction(Instruction::declare(&var)), prev);
            self.emit(
                caller,
                FlowNodeKind::Instruction(Instruction::assign(Expr::var(&var), argument)),
                prev,
            );
            bound.push(Expr::var(var));
        }

        let call_node = self.emit(
            caller,
            FlowNodeKind::Invocation { callee: callee.to_string(), arguments: bound },
            prev,
        );

        if self.built.insert(callee.to_string()) {
            self.lower_body(callee, prologue(target), &target.body)?;
        }
        let (callee_start, callee_end) = self.graph.add_procedure(callee);

        let enter = self.graph.add_node(
            caller,
            FlowNodeKind::Transfer {
                kind: TransferKind::Enter,
                from: caller.to_string(),
                to: callee.to_string(),
            },
        );
        let ret = self.graph.add_node(
            caller,
            FlowNodeKind::Transfer {
                kind: TransferKind::Return,
                from: callee.to_string(),
                to: caller.to_string(),
            },
        );
        self.graph.add_edge(call_node, enter);
        self.graph.add_edge(enter, callee_start);
        self.graph.add_edge(callee_end, ret);
        self.graph.add_edge(ret, call_node);

        self.call_graph.add_call(CallSite {
            caller: caller.to_string(),
            callee: callee.to_string(),
            call_node,
            enter,
            ret,
        });
        log::trace!("stitched call {} -> {} at {}", caller, callee, call_node);
        Ok(call_node)
    }
}

/// Declarations every callee body starts with.
fn prologue(procedure: &Procedure) -> Vec<Instruction> {
    let mut out = vec![Instruction::declare(result_variable(&procedure.name))];
    for (k, parameter) in procedure.parameters.iter().enumerate() {
        out.push(Instruction::declare(parameter));
        out.push(Instruction::assign(
            Expr::var(parameter),
            Expr::var(argument_variable(&procedure.name, k)),
        ));
    }
    out
}
