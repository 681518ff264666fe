//! Hardware inventory capture.

use agent_runtime::CommandRunner;
use serde_json::Value;
use std::process::Command;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HardwareError {
    #[error("hardware command is empty")]
    EmptyCommand,

    #[error(transparent)]
    Command(#[from] agent_runtime::Error),

    #[error("{command} command failed: {stderr}")]
    Failed { command: String, stderr: String },

    #[error("invalid hardware inventory: {0}")]
    Json(#[from] serde_json::Error),
}

/// Source of the hardware inventory.
pub trait HardwareProbe {
    fn capture(&self) -> Result<Value, HardwareError>;
}

/// Runs an external command (`lshw -json` by default) printing JSON.
#[derive(Debug, Clone)]
pub struct CommandProbe {
    runner: CommandRunner,
    command: String,
}

impl CommandProbe {
    pub fn new(runner: CommandRunner, command: impl Into<String>) -> Self {
        Self {
            runner,
            command: command.into(),
        }
    }
}

impl HardwareProbe for CommandProbe {
    fn capture(&self) -> Result<Value, HardwareError> {
        let mut parts = self.command.split_whitespace();
        let program = parts.next().ok_or(HardwareError::EmptyCommand)?;

        let mut command = Command::new(program);
        command.env("LC_ALL", "C").args(parts);
        let output = self.runner.run_command(program, command)?;
        if !output.success() {
            return Err(HardwareError::Failed {
                command: self.command.clone(),
                stderr: output.stderr.trim().to_string(),
            });
        }
        Ok(serde_json::from_str(&output.stdout)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn probe(command: &str) -> CommandProbe {
        CommandProbe::new(CommandRunner::new(Duration::from_secs(10)), command)
    }

    #[test]
    fn test_capture_parses_json() {
        let value = probe(r#"echo {"id":"computer","class":"system"}"#).capture().unwrap();
        assert_eq!(value["class"], "system");
    }

    #[test]
    fn test_capture_runs_with_c_locale() {
        let err = probe("printenv LC_ALL").capture().unwrap_err();
        // "C" is not a JSON document
        assert!(matches!(err, HardwareError::Json(_)));
    }

    #[test]
    fn test_capture_failures() {
        assert!(matches!(probe("  ").capture(), Err(HardwareError::EmptyCommand)));
        assert!(matches!(probe("false").capture(), Err(HardwareError::Failed { .. })));
        assert!(matches!(
            probe("echo not-json").capture(),
            Err(HardwareError::Json(_))
        ));
    }
}
