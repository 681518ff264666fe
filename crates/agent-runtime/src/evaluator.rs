//! Evaluation of server-defined attribute and fault scripts.

use crate::command::CommandRunner;
use crate::interpreter::Interpreter;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::io::Write;
use tempfile::NamedTempFile;

/// A custom fact computed by a script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeSpec {
    /// Attribute prefix (key in the uploaded map).
    pub prefix: String,
    /// Language name, see [`Interpreter`].
    pub language: String,
    /// Script source.
    pub code: String,
}

/// A fault check computed by a script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaultSpec {
    /// Fault name (key in the uploaded map).
    pub name: String,
    /// Language name, see [`Interpreter`].
    pub language: String,
    /// Script source.
    pub code: String,
}

/// Result of running one script.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScriptOutcome {
    /// Trimmed standard output.
    pub output: String,
    /// Description of an execution failure (non-zero exit, timeout, spawn error).
    pub error: Option<String>,
}

/// Evaluated attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeValue {
    pub prefix: String,
    pub value: String,
    pub error: Option<String>,
}

impl AttributeValue {
    /// An attribute without a value is reported as failed.
    pub fn is_alert(&self) -> bool {
        self.value.is_empty()
    }
}

/// Evaluated fault.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FaultValue {
    pub name: String,
    pub value: String,
    pub error: Option<String>,
}

impl FaultValue {
    /// A fault with output has been detected.
    pub fn is_triggered(&self) -> bool {
        !self.value.is_empty()
    }
}

/// Runs attribute and fault scripts under their interpreters.
#[derive(Debug, Clone)]
pub struct AttributeEvaluator {
    runner: CommandRunner,
}

impl AttributeEvaluator {
    /// Create an evaluator that runs scripts through `runner`.
    pub fn new(runner: CommandRunner) -> Self {
        Self { runner }
    }

    /// Run `code` under the interpreter named by `language`.
    ///
    /// Unknown languages succeed with empty output. Script failures are
    /// reported in [`ScriptOutcome::error`]; only cancellation is returned as
    /// [`Error::Cancelled`].
    pub fn eval_code(&self, language: &str, code: &str) -> Result<ScriptOutcome> {
        let code = code.replace('\r', "");
        let code = code.trim();
        log::debug!("Language code: {language}");
        log::debug!("Code: {code}");

        let Some(interpreter) = Interpreter::from_language(language) else {
            log::warn!("Unsupported language {language:?}, skipping script");
            return Ok(ScriptOutcome::default());
        };

        match self.execute(interpreter, code) {
            Ok(outcome) => Ok(outcome),
            Err(e @ Error::Cancelled { .. }) => Err(e),
            Err(e) => {
                log::error!("Error: {e}");
                Ok(ScriptOutcome {
                    output: String::new(),
                    error: Some(format!("Code \"{code}\" with error: {e}")),
                })
            }
        }
    }

    fn execute(&self, interpreter: Interpreter, code: &str) -> Result<ScriptOutcome> {
        let mut script = tempfile::Builder::new()
            .prefix(".agent-script-")
            .suffix(interpreter.extension())
            .tempfile()?;
        script.write_all(code.as_bytes())?;
        script.flush()?;

        let result = self.runner.run_script(interpreter.program(), script.path());
        discard(script);
        let output = result?;

        log::debug!("Output: {}", output.stdout);
        let error = if output.success() {
            None
        } else {
            log::error!("Error: {}", output.stderr.trim());
            Some(format!(
                "Code \"{code}\" with error: {}",
                output.stderr.trim()
            ))
        };

        Ok(ScriptOutcome {
            output: output.stdout.trim().to_string(),
            error,
        })
    }

    /// Evaluate every attribute, in order. Stops at the first cancelled script.
    pub fn evaluate_attributes(&self, specs: &[AttributeSpec]) -> Result<Vec<AttributeValue>> {
        specs
            .iter()
            .map(|spec| {
                let outcome = self.eval_code(&spec.language, &spec.code)?;
                Ok(AttributeValue {
                    prefix: spec.prefix.clone(),
                    value: outcome.output,
                    error: outcome.error,
                })
            })
            .collect()
    }

    /// Evaluate every fault, in order. Stops at the first cancelled script.
    pub fn evaluate_faults(&self, specs: &[FaultSpec]) -> Result<Vec<FaultValue>> {
        specs
            .iter()
            .map(|spec| {
                let outcome = self.eval_code(&spec.language, &spec.code)?;
                Ok(FaultValue {
                    name: spec.name.clone(),
                    value: outcome.output,
                    error: outcome.error,
                })
            })
            .collect()
    }
}

/// Best-effort removal of a materialized script.
fn discard(script: NamedTempFile) {
    if let Err(e) = script.close() {
        log::debug!("Could not remove script file: {e}");
    }
}
