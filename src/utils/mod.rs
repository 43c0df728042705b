//! Utility modules shared across the engine.
//!
//! - Error types and diagnostics
//! - Source location tracking
//! - Pretty printing of the loop IR

pub mod errors;
pub mod location;
pub mod pretty;

// Re-exports
pub use errors::*;
pub use location::{SourceLocation, Span};
pub use self::pretty::PrettyPrint;
