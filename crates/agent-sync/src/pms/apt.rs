use super::{expand_template, Pms, PmsError, Repository};
use agent_runtime::{CommandOutput, CommandRunner};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

const APT_GET: &str = "/usr/bin/apt-get";
const SOURCES_FILE: &str = "/etc/apt/sources.list.d/fleet-agent.list";

const SILENT_OPTIONS: &[&str] = &[
    "-o",
    "APT::Get::Purge=true",
    "-o",
    "Dpkg::Options::=--force-confdef",
    "-o",
    "Dpkg::Options::=--force-confold",
    "-o",
    "Debug::pkgProblemResolver=1",
    "--assume-yes",
    "--allow-unauthenticated",
    "--auto-remove",
];

/// Package management for apt based systems (Debian, Ubuntu, Mint).
#[derive(Debug, Clone)]
pub struct Apt {
    runner: CommandRunner,
    sources_file: PathBuf,
}

impl Apt {
    pub fn new(runner: CommandRunner) -> Self {
        Self {
            runner,
            sources_file: PathBuf::from(SOURCES_FILE),
        }
    }

    /// Write repository definitions to `path` instead of the system location.
    pub fn with_sources_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.sources_file = path.into();
        self
    }

    pub fn is_available() -> bool {
        Path::new(APT_GET).is_file()
    }

    fn apt_get(&self, args: &[&str]) -> Result<CommandOutput, PmsError> {
        let mut command = Command::new(APT_GET);
        command.env("DEBIAN_FRONTEND", "noninteractive").args(args);
        Ok(self.runner.run_command("apt-get", command)?)
    }

    fn apt_get_checked(&self, args: &[&str]) -> Result<(), PmsError> {
        let output = self.apt_get(args)?;
        check("apt-get", output)
    }

    fn silent(&self, action: &str, packages: &[String]) -> Result<(), PmsError> {
        let mut args: Vec<&str> = SILENT_OPTIONS.to_vec();
        args.push(action);
        args.extend(packages.iter().map(String::as_str));
        self.apt_get_checked(&args)
    }
}

fn check(command: &str, output: CommandOutput) -> Result<(), PmsError> {
    if output.success() {
        Ok(())
    } else {
        Err(PmsError::Failed {
            command: command.to_string(),
            stderr: output.stderr.trim().to_string(),
        })
    }
}

impl Pms for Apt {
    fn name(&self) -> &str {
        "apt-get"
    }

    fn install(&self, package: &str) -> Result<(), PmsError> {
        let mut args = vec!["install", "--assume-yes", "-o", "APT::Get::Purge=true"];
        args.extend(package.split_whitespace());
        self.apt_get_checked(&args)
    }

    fn remove(&self, package: &str) -> Result<(), PmsError> {
        let mut args = vec!["purge", "--assume-yes"];
        args.extend(package.split_whitespace());
        self.apt_get_checked(&args)
    }

    fn search(&self, pattern: &str) -> Result<String, PmsError> {
        let output = self.runner.run("apt-cache", &["search", pattern.trim()])?;
        let stdout = output.stdout.clone();
        check("apt-cache", output)?;
        Ok(stdout)
    }

    fn update_silent(&self) -> Result<(), PmsError> {
        self.silent("dist-upgrade", &[])
    }

    fn install_silent(&self, packages: &[String]) -> Result<(), PmsError> {
        let missing: Vec<String> = packages
            .iter()
            .filter(|p| !self.is_installed(p))
            .cloned()
            .collect();
        if missing.is_empty() {
            return Ok(());
        }
        self.silent("install", &missing)
    }

    fn remove_silent(&self, packages: &[String]) -> Result<(), PmsError> {
        let present: Vec<String> = packages
            .iter()
            .filter(|p| self.is_installed(p))
            .cloned()
            .collect();
        if present.is_empty() {
            return Ok(());
        }
        self.silent("purge", &present)
    }

    fn is_installed(&self, package: &str) -> bool {
        match self
            .runner
            .run("dpkg-query", &["-W", "-f=${Status}", package.trim()])
        {
            Ok(output) => output.success() && output.stdout.trim() == "install ok installed",
            Err(e) => {
                log::warn!("{e}");
                false
            }
        }
    }

    fn clean_all(&self) -> Result<(), PmsError> {
        self.apt_get_checked(&["clean"])?;
        self.apt_get_checked(&["-o", "Acquire::Languages=none", "--assume-yes", "update"])
    }

    fn query_all(&self) -> Result<Vec<String>, PmsError> {
        let output = self.runner.run("dpkg", &["--list"])?;
        let packages = parse_dpkg_list(&output.stdout);
        check("dpkg", output)?;
        Ok(packages)
    }

    fn create_repos(
        &self,
        template: &str,
        server: &str,
        project: &str,
        repositories: &[Repository],
    ) -> Result<(), PmsError> {
        let base = expand_template(template, server, project);
        let content: String = repositories
            .iter()
            .map(|repo| format!("deb {base} {} PKGS\n", repo.name))
            .collect();
        if let Some(parent) = self.sources_file.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.sources_file, content)?;
        log::debug!("Repositories written to {}", self.sources_file.display());
        Ok(())
    }

    fn import_server_key(&self, key_file: &Path) -> Result<(), PmsError> {
        let mut command = Command::new("apt-key");
        command.arg("add").arg(key_file);
        let output = self.runner.run_command("apt-key", command)?;
        check("apt-key", output)
    }

    fn architecture(&self) -> String {
        self.runner
            .run("dpkg", &["--print-architecture"])
            .ok()
            .filter(CommandOutput::success)
            .map(|output| output.stdout.trim().to_string())
            .unwrap_or_default()
    }
}

/// `name-version` of every installed (`ii`) line of `dpkg --list`.
fn parse_dpkg_list(output: &str) -> Vec<String> {
    output
        .lines()
        .filter(|line| line.starts_with("ii"))
        .filter_map(|line| {
            let mut fields = line.split_whitespace().skip(1);
            let name = fields.next()?;
            let version = fields.next()?;
            Some(format!("{name}-{version}"))
        })
        .collect()
}
