use serde::{Deserialize, Serialize};
use std::fmt;

/// Scripting languages the agent is allowed to execute.
///
/// Anything outside this set is not an error: evaluating it is a no-op that
/// succeeds with empty output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Interpreter {
    /// GNU Bash.
    Bash,
    /// Python 3.
    Python,
    /// Perl 5.
    Perl,
    /// PHP command line.
    Php,
    /// Ruby.
    Ruby,
}

impl Interpreter {
    /// All supported interpreters.
    pub const ALL: [Interpreter; 5] = [
        Interpreter::Bash,
        Interpreter::Python,
        Interpreter::Perl,
        Interpreter::Php,
        Interpreter::Ruby,
    ];

    /// Resolve a language name as sent by the server.
    pub fn from_language(language: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|interpreter| interpreter.language() == language.trim())
    }

    /// Language name as used on the wire.
    pub fn language(self) -> &'static str {
        match self {
            Interpreter::Bash => "bash",
            Interpreter::Python => "python",
            Interpreter::Perl => "perl",
            Interpreter::Php => "php",
            Interpreter::Ruby => "ruby",
        }
    }

    /// Program invoked with the script file as its only argument.
    pub fn program(self) -> &'static str {
        match self {
            Interpreter::Bash => "bash",
            Interpreter::Python => "python3",
            Interpreter::Perl => "perl",
            Interpreter::Php => "php",
            Interpreter::Ruby => "ruby",
        }
    }

    /// Suffix given to the materialized script file.
    pub fn extension(self) -> &'static str {
        match self {
            Interpreter::Bash => ".sh",
            Interpreter::Python => ".py",
            Interpreter::Perl => ".pl",
            Interpreter::Php => ".php",
            Interpreter::Ruby => ".rb",
        }
    }
}

impl fmt::Display for Interpreter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.language())
    }
}
