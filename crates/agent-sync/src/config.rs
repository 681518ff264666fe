//! Agent configuration: a TOML file with a `[client]` table, overridden by
//! `FLEET_AGENT_*` environment variables.

use crate::{Result, SyncError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default configuration file location.
pub const DEFAULT_CONF_FILE: &str = "/etc/fleet-agent.toml";
/// Environment variable overriding the configuration file location.
pub const CONF_ENV: &str = "FLEET_AGENT_CONF";
/// Prefix of per-key environment overrides.
pub const ENV_PREFIX: &str = "FLEET_AGENT_";

/// Name of the server public key file.
pub const SERVER_PUBLIC_KEY: &str = "server.pub";
/// Name of the repositories signing key file.
pub const REPOSITORIES_KEY: &str = "repositories.pub";

/// The `[client]` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Server host (and optional port).
    pub server: String,
    /// Project the computer belongs to.
    pub project: String,
    /// Name reported for this computer; the host name when unset.
    pub computer_name: Option<String>,
    /// Run a full package upgrade on every sync.
    pub auto_update_packages: bool,
    /// HTTP proxy for server requests.
    pub proxy: Option<String>,
    /// CA certificate of the server; enables https.
    pub ssl_cert: Option<PathBuf>,
    /// Package proxy cache placed in front of the server in repository URLs.
    pub package_proxy_cache: Option<String>,
    /// Keep the error ledger after upload and log at debug level.
    pub debug: bool,
    /// Hard limit for attribute and fault scripts.
    pub script_timeout_secs: u64,
    /// Hard limit for package manager and printing commands.
    pub command_timeout_secs: u64,
    /// Timeout of a single server request.
    pub request_timeout_secs: u64,
    /// Command printing the hardware inventory as JSON.
    pub hardware_command: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server: "localhost".to_string(),
            project: "default".to_string(),
            computer_name: None,
            auto_update_packages: true,
            proxy: None,
            ssl_cert: None,
            package_proxy_cache: None,
            debug: false,
            script_timeout_secs: 300,
            command_timeout_secs: 3600,
            request_timeout_secs: 120,
            hardware_command: "lshw -json".to_string(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    client: ClientConfig,
}

/// Filesystem locations used by the agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paths {
    /// Root of the key directories, one per server.
    pub keys_dir: PathBuf,
    /// Driver fingerprints of installed devices.
    pub devices_dir: PathBuf,
    /// Lock and error ledger files.
    pub tmp_dir: PathBuf,
    /// Software snapshot of the last upload.
    pub software_file: PathBuf,
}

impl Default for Paths {
    fn default() -> Self {
        Self {
            keys_dir: PathBuf::from("/var/lib/fleet-agent/keys"),
            devices_dir: PathBuf::from("/var/lib/fleet-agent/devices"),
            tmp_dir: PathBuf::from("/tmp/fleet-agent"),
            software_file: PathBuf::from("/var/tmp/installed_software.txt"),
        }
    }
}

impl Paths {
    /// Every location below `root`.
    pub fn under(root: &Path) -> Self {
        Self {
            keys_dir: root.join("keys"),
            devices_dir: root.join("devices"),
            tmp_dir: root.join("tmp"),
            software_file: root.join("installed_software.txt"),
        }
    }

    /// Lock file of `command`.
    pub fn lock_file(&self, command: &str) -> PathBuf {
        self.tmp_dir.join(format!("{command}.pid"))
    }

    /// Error ledger of `command`.
    pub fn error_file(&self, command: &str) -> PathBuf {
        self.tmp_dir.join(format!("{command}.err"))
    }
}

/// Locations of the key files for one server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPaths {
    pub dir: PathBuf,
    pub private: PathBuf,
    pub server_public: PathBuf,
    pub repositories: PathBuf,
}

impl KeyPaths {
    /// Whether every key file exists.
    pub fn all_present(&self) -> bool {
        [&self.private, &self.server_public, &self.repositories]
            .iter()
            .all(|path| path.is_file())
    }
}

/// Complete agent configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub client: ClientConfig,
    pub paths: Paths,
    /// File the configuration was read from, if any.
    pub source: Option<PathBuf>,
}

impl Config {
    /// Load from `FLEET_AGENT_CONF` (or the default location) and the process
    /// environment.
    pub fn load() -> Result<Self> {
        let path = std::env::var_os(CONF_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONF_FILE));
        let mut config = Self::from_path(&path)?;
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Load from `path`. A missing file yields the defaults.
    pub fn from_path(path: &Path) -> Result<Self> {
        if !path.is_file() {
            log::debug!("Config file {} not found, using defaults", path.display());
            return Ok(Self {
                client: ClientConfig::default(),
                paths: Paths::default(),
                source: None,
            });
        }
        let text = std::fs::read_to_string(path)?;
        Ok(Self {
            client: Self::parse(&text)?,
            paths: Paths::default(),
            source: Some(path.to_path_buf()),
        })
    }

    /// Parse the `[client]` table from TOML text.
    pub fn parse(text: &str) -> Result<ClientConfig> {
        let file: ConfigFile =
            toml::from_str(text).map_err(|e| SyncError::Config(e.to_string()))?;
        Ok(file.client)
    }

    /// Apply `FLEET_AGENT_<KEY>` overrides found through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(&format!("{ENV_PREFIX}{key}"));
        let client = &mut self.client;

        if let Some(value) = get("SERVER") {
            client.server = value;
        }
        if let Some(value) = get("PROJECT") {
            client.project = value;
        }
        if let Some(value) = get("COMPUTER_NAME") {
            client.computer_name = Some(value);
        }
        if let Some(value) = get("AUTO_UPDATE_PACKAGES") {
            client.auto_update_packages = parse_bool("AUTO_UPDATE_PACKAGES", &value)?;
        }
        if let Some(value) = get("PROXY") {
            client.proxy = Some(value);
        }
        if let Some(value) = get("SSL_CERT") {
            client.ssl_cert = Some(PathBuf::from(value));
        }
        if let Some(value) = get("PACKAGE_PROXY_CACHE") {
            client.package_proxy_cache = Some(value);
        }
        if let Some(value) = get("DEBUG") {
            client.debug = parse_bool("DEBUG", &value)?;
        }
        if let Some(value) = get("SCRIPT_TIMEOUT_SECS") {
            client.script_timeout_secs = parse_secs("SCRIPT_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = get("COMMAND_TIMEOUT_SECS") {
            client.command_timeout_secs = parse_secs("COMMAND_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = get("REQUEST_TIMEOUT_SECS") {
            client.request_timeout_secs = parse_secs("REQUEST_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = get("HARDWARE_COMMAND") {
            client.hardware_command = value;
        }
        Ok(())
    }

    /// Key files for the configured server and project.
    pub fn key_paths(&self) -> KeyPaths {
        let dir = self.paths.keys_dir.join(&self.client.server);
        KeyPaths {
            private: dir.join(format!("{}.pri", self.client.project)),
            server_public: dir.join(SERVER_PUBLIC_KEY),
            repositories: dir.join(REPOSITORIES_KEY),
            dir,
        }
    }

    /// Base URL of the server API, with trailing slash.
    pub fn base_url(&self) -> String {
        let scheme = if self.client.ssl_cert.is_some() {
            "https"
        } else {
            "http"
        };
        format!("{scheme}://{}/api/v1/", self.client.server)
    }

    /// Server as written into repository URLs.
    pub fn repository_server(&self) -> String {
        match &self.client.package_proxy_cache {
            Some(cache) => format!("{cache}/{}", self.client.server),
            None => self.client.server.clone(),
        }
    }

    /// Project name reduced to `[a-z0-9-]`.
    pub fn project_slug(&self) -> String {
        slugify(&self.client.project)
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(SyncError::Config(format!(
            "{ENV_PREFIX}{key}: expected a boolean, got {other:?}"
        ))),
    }
}

fn parse_secs(key: &str, value: &str) -> Result<u64> {
    value.trim().parse().map_err(|_| {
        SyncError::Config(format!(
            "{ENV_PREFIX}{key}: expected seconds, got {value:?}"
        ))
    })
}

pub(crate) fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    for c in text.trim().chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    slug.trim_end_matches('-').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(text: &str) -> Config {
        Config {
            client: Config::parse(text).unwrap(),
            paths: Paths::default(),
            source: None,
        }
    }

    #[test]
    fn test_parse_uses_defaults_for_missing_keys() {
        let client = Config::parse("[client]\nserver = \"fleet.example.org\"\n").unwrap();
        assert_eq!(client.server, "fleet.example.org");
        assert!(client.auto_update_packages);
        assert!(!client.debug);
        assert_eq!(client.script_timeout_secs, 300);
        assert_eq!(client.hardware_command, "lshw -json");
    }

    #[test]
    fn test_parse_empty_file() {
        assert_eq!(Config::parse("").unwrap(), ClientConfig::default());
    }

    #[test]
    fn test_parse_rejects_wrong_types() {
        let err = Config::parse("[client]\ndebug = \"maybe\"\n").unwrap_err();
        assert!(matches!(err, SyncError::Config(_)));
    }

    #[test]
    fn test_env_overrides_file() {
        let mut config = config("[client]\nserver = \"a\"\nauto_update_packages = true\n");
        let env: HashMap<String, String> = [
            ("FLEET_AGENT_SERVER", "b"),
            ("FLEET_AGENT_AUTO_UPDATE_PACKAGES", "off"),
            ("FLEET_AGENT_DEBUG", "1"),
            ("FLEET_AGENT_SCRIPT_TIMEOUT_SECS", "5"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        config.apply_env(|key| env.get(key).cloned()).unwrap();

        assert_eq!(config.client.server, "b");
        assert!(!config.client.auto_update_packages);
        assert!(config.client.debug);
        assert_eq!(config.client.script_timeout_secs, 5);
    }

    #[test]
    fn test_env_bad_bool_is_config_error() {
        let mut config = config("");
        let err = config
            .apply_env(|key| (key == "FLEET_AGENT_DEBUG").then(|| "perhaps".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("FLEET_AGENT_DEBUG"));
    }

    #[test]
    fn test_base_url_scheme_follows_ssl_cert() {
        let mut config = config("[client]\nserver = \"fleet.local:8080\"\n");
        assert_eq!(config.base_url(), "http://fleet.local:8080/api/v1/");
        config.client.ssl_cert = Some(PathBuf::from("/etc/ssl/fleet.pem"));
        assert_eq!(config.base_url(), "https://fleet.local:8080/api/v1/");
    }

    #[test]
    fn test_key_paths_are_per_server_and_project() {
        let mut config = config("[client]\nserver = \"fleet\"\nproject = \"acme\"\n");
        config.paths = Paths::under(Path::new("/r"));
        let keys = config.key_paths();
        assert_eq!(keys.private, PathBuf::from("/r/keys/fleet/acme.pri"));
        assert_eq!(keys.server_public, PathBuf::from("/r/keys/fleet/server.pub"));
        assert_eq!(keys.repositories, PathBuf::from("/r/keys/fleet/repositories.pub"));
    }

    #[test]
    fn test_repository_server_with_proxy_cache() {
        let mut config = config("[client]\nserver = \"fleet\"\n");
        assert_eq!(config.repository_server(), "fleet");
        config.client.package_proxy_cache = Some("cache:3142".to_string());
        assert_eq!(config.repository_server(), "cache:3142/fleet");
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Ubuntu Focal 20.04"), "ubuntu-focal-20-04");
        assert_eq!(slugify("  --acme--  "), "acme");
        assert_eq!(slugify(""), "");
    }
}
