//! rf-compile - Rule compiler for Ruleflow
//!
//! The natural-language interpreter is a black box behind the
//! [`Interpreter`] trait. Everything after that single call is deterministic:
//! [`RuleCompiler`] resolves identifiers, checks aggregates against the
//! registry, expands segments and configured formulas, and emits a validated
//! [`rf_core::TransformSpec`].

pub mod candidate;
pub mod compiler;
pub mod error;
pub mod interpreter;

pub use candidate::{
    CandidateAggregation, CandidateDerived, CandidateRank, CandidateReference, CandidateRule,
    CandidateSegment, CandidateThreshold,
};
pub use compiler::{CompileOptions, RuleCompiler};
pub use error::{CompileError, CompileResult, InterpretationError};
pub use interpreter::{Interpreter, StaticInterpreter};
