//! # agent-runtime
//!
//! Script and external command execution for the fleet agent.
//!
//! This crate provides:
//! - A closed set of supported script interpreters
//! - Attribute and fault evaluation of server-defined scripts
//! - A time-bounded, cancellable command runner shared by every collaborator
//!   that shells out (package manager, printing system, hardware probe)
//!
//! ## Example
//!
//! ```ignore
//! use agent_runtime::{AttributeEvaluator, CommandRunner, FaultSpec};
//! use std::time::Duration;
//!
//! let evaluator = AttributeEvaluator::new(CommandRunner::new(Duration::from_secs(60)));
//! let faults = evaluator.evaluate_faults(&[FaultSpec {
//!     name: "disk-full".into(),
//!     language: "bash".into(),
//!     code: "echo FULL".into(),
//! }])?;
//! assert!(faults[0].is_triggered());
//! ```

mod command;
mod error;
mod evaluator;
mod interpreter;

pub use command::{CancelToken, CommandOutput, CommandRunner};
pub use error::{Error, Result};
pub use evaluator::{
    AttributeEvaluator, AttributeSpec, AttributeValue, FaultSpec, FaultValue, ScriptOutcome,
};
pub use interpreter::Interpreter;
