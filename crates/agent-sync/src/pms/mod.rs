//! Package management systems.

mod apt;

pub use apt::Apt;

use agent_runtime::CommandRunner;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Failures of a package management action.
#[derive(Debug, Error)]
pub enum PmsError {
    /// The command could not run to completion.
    #[error(transparent)]
    Command(#[from] agent_runtime::Error),

    /// The command ran and reported failure.
    #[error("{command} failed: {stderr}")]
    Failed { command: String, stderr: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A repository assigned to the computer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
    pub name: String,
}

/// Operations the agent needs from the local package manager.
pub trait Pms {
    /// Short name reported to the server.
    fn name(&self) -> &str;

    /// Install packages (whitespace separated) on request of the user.
    fn install(&self, package: &str) -> Result<(), PmsError>;

    /// Purge packages (whitespace separated) on request of the user.
    fn remove(&self, package: &str) -> Result<(), PmsError>;

    /// Search available packages; returns the listing.
    fn search(&self, pattern: &str) -> Result<String, PmsError>;

    /// Upgrade every package without prompting.
    fn update_silent(&self) -> Result<(), PmsError>;

    /// Install the packages of `packages` that are not installed yet.
    fn install_silent(&self, packages: &[String]) -> Result<(), PmsError>;

    /// Purge the packages of `packages` that are installed.
    fn remove_silent(&self, packages: &[String]) -> Result<(), PmsError>;

    fn is_installed(&self, package: &str) -> bool;

    /// Drop cached metadata and fetch it again.
    fn clean_all(&self) -> Result<(), PmsError>;

    /// Installed packages as `name-version`.
    fn query_all(&self) -> Result<Vec<String>, PmsError>;

    /// Replace the agent repository definitions.
    ///
    /// `template` may reference `{server}` and `{project}`.
    fn create_repos(
        &self,
        template: &str,
        server: &str,
        project: &str,
        repositories: &[Repository],
    ) -> Result<(), PmsError>;

    /// Trust the repository signing key in `key_file`.
    fn import_server_key(&self, key_file: &Path) -> Result<(), PmsError>;

    /// Machine architecture as named by the package manager.
    fn architecture(&self) -> String;
}

/// Pick the package manager available on this system.
pub fn detect(runner: CommandRunner) -> Option<Box<dyn Pms>> {
    if Apt::is_available() {
        return Some(Box::new(Apt::new(runner)));
    }
    None
}

/// Expand the `{server}` and `{project}` placeholders of a repository URL template.
pub fn expand_template(template: &str, server: &str, project: &str) -> String {
    template
        .trim()
        .trim_matches('"')
        .replace("{server}", server)
        .replace("{project}", project)
}
