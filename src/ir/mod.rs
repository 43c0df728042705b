//! Intermediate representation analyzed by the engine.
//!
//! This module defines:
//! - Expressions: value-compared trees (`expr`)
//! - Instructions: the flat three-address statements of a body (`instr`)
//! - Procedures, loop programs and external symbol facts (`program`)

pub mod expr;
pub mod instr;
pub mod program;

pub use expr::*;
pub use instr::*;
pub use program::*;
