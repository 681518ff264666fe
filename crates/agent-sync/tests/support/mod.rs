#![allow(dead_code)]

use agent_runtime::CancelToken;
use agent_sync::devices::{LogicalPrinter, PhysicalPrinter, PrinterError, PrinterSystem};
use agent_sync::hardware::{HardwareError, HardwareProbe};
use agent_sync::pms::{Pms, PmsError, Repository};
use agent_sync::{
    ClientConfig, Collaborators, Config, Console, Endpoint, ErrorCode, HostIdentity, Paths,
    SyncOrchestrator, Transport, TransportError,
};
use rand::rngs::OsRng;
use rsa::pkcs8::{EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::RsaPrivateKey;
use serde_json::{json, Value};
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;
use std::sync::OnceLock;
use tempfile::TempDir;

pub const COMPUTER_ID: u64 = 42;

/// Server double answering each endpoint with a fixed response.
#[derive(Default)]
pub struct FakeTransport {
    responses: RefCell<HashMap<Endpoint, Result<Value, TransportError>>>,
    calls: RefCell<Vec<(Endpoint, Value)>>,
}

impl FakeTransport {
    /// A server that knows the computer and has nothing special to say.
    pub fn healthy() -> Self {
        let transport = Self::default();
        transport.respond(Endpoint::ComputerId, json!(COMPUTER_ID));
        transport.respond(Endpoint::Properties, json!([]));
        transport.respond(Endpoint::FaultDefinitions, json!([]));
        transport.respond(
            Endpoint::RepositoriesUrlTemplate,
            json!("http://{server}/public/{project}/repos"),
        );
        transport.respond(Endpoint::Repositories, json!([{"name": "base"}]));
        transport.fail(Endpoint::MandatoryPackages, ErrorCode::NotFound);
        transport.respond(Endpoint::HardwareRequired, json!({"capture": false}));
        transport.fail(Endpoint::Devices, ErrorCode::NotFound);
        transport
    }

    pub fn respond(&self, endpoint: Endpoint, value: Value) {
        self.responses.borrow_mut().insert(endpoint, Ok(value));
    }

    pub fn fail(&self, endpoint: Endpoint, code: ErrorCode) {
        self.responses
            .borrow_mut()
            .insert(endpoint, Err(TransportError::new(code, format!("{endpoint} failed"))));
    }

    pub fn calls(&self) -> Vec<(Endpoint, Value)> {
        self.calls.borrow().clone()
    }

    pub fn endpoints(&self) -> Vec<Endpoint> {
        self.calls.borrow().iter().map(|(e, _)| *e).collect()
    }

    /// Payloads sent to `endpoint`, in order.
    pub fn sent(&self, endpoint: Endpoint) -> Vec<Value> {
        self.calls
            .borrow()
            .iter()
            .filter(|(e, _)| *e == endpoint)
            .map(|(_, v)| v.clone())
            .collect()
    }
}

impl Transport for FakeTransport {
    fn request(&self, endpoint: Endpoint, data: Value) -> Result<Value, TransportError> {
        self.calls.borrow_mut().push((endpoint, data));
        self.responses
            .borrow()
            .get(&endpoint)
            .cloned()
            .unwrap_or(Ok(Value::Null))
    }
}

/// Package manager double keeping the installed set in memory.
#[derive(Default)]
pub struct FakePms {
    installed: RefCell<Vec<String>>,
    calls: RefCell<Vec<String>>,
    failing: RefCell<HashSet<&'static str>>,
    cancelling: RefCell<Option<(&'static str, CancelToken)>>,
}

impl FakePms {
    pub fn with_installed(packages: &[&str]) -> Self {
        let pms = Self::default();
        *pms.installed.borrow_mut() = packages.iter().map(|p| p.to_string()).collect();
        pms
    }

    /// Make `operation` (e.g. `"install_silent"`) fail.
    pub fn fail(&self, operation: &'static str) {
        self.failing.borrow_mut().insert(operation);
    }

    /// Cancel `token` while `operation` runs, as a signal would, and make
    /// the operation fail the way a killed command does.
    pub fn cancel_during(&self, operation: &'static str, token: CancelToken) {
        *self.cancelling.borrow_mut() = Some((operation, token));
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    pub fn called(&self, operation: &str) -> bool {
        self.calls
            .borrow()
            .iter()
            .any(|c| c.split(' ').next() == Some(operation))
    }

    fn call(&self, operation: &'static str, args: &[String]) -> Result<(), PmsError> {
        self.calls
            .borrow_mut()
            .push(format!("{operation} {}", args.join(" ")).trim_end().to_string());
        if let Some((_, token)) = self
            .cancelling
            .borrow()
            .as_ref()
            .filter(|(op, _)| *op == operation)
        {
            token.cancel();
            return Err(PmsError::Command(agent_runtime::Error::Cancelled {
                program: "apt-get".to_string(),
            }));
        }
        if self.failing.borrow().contains(operation) {
            return Err(PmsError::Failed {
                command: operation.to_string(),
                stderr: "E: unable to locate package".to_string(),
            });
        }
        Ok(())
    }

    fn add(&self, packages: &[String]) {
        let mut installed = self.installed.borrow_mut();
        for package in packages {
            let id = format!("{package}-1.0");
            if !installed.contains(&id) {
                installed.push(id);
            }
        }
    }

    fn drop_packages(&self, packages: &[String]) {
        self.installed
            .borrow_mut()
            .retain(|id| !packages.iter().any(|name| is_package(id, name)));
    }
}

impl Pms for FakePms {
    fn name(&self) -> &str {
        "fake"
    }

    fn install(&self, package: &str) -> Result<(), PmsError> {
        let packages: Vec<String> = package.split_whitespace().map(str::to_string).collect();
        self.call("install", &packages)?;
        self.add(&packages);
        Ok(())
    }

    fn remove(&self, package: &str) -> Result<(), PmsError> {
        let packages: Vec<String> = package.split_whitespace().map(str::to_string).collect();
        self.call("remove", &packages)?;
        self.drop_packages(&packages);
        Ok(())
    }

    fn search(&self, pattern: &str) -> Result<String, PmsError> {
        self.call("search", &[pattern.to_string()])?;
        Ok(format!("{pattern} - sample package\n"))
    }

    fn update_silent(&self) -> Result<(), PmsError> {
        self.call("update_silent", &[])
    }

    fn install_silent(&self, packages: &[String]) -> Result<(), PmsError> {
        self.call("install_silent", packages)?;
        self.add(packages);
        Ok(())
    }

    fn remove_silent(&self, packages: &[String]) -> Result<(), PmsError> {
        self.call("remove_silent", packages)?;
        self.drop_packages(packages);
        Ok(())
    }

    fn is_installed(&self, package: &str) -> bool {
        self.installed
            .borrow()
            .iter()
            .any(|id| is_package(id, package))
    }

    fn clean_all(&self) -> Result<(), PmsError> {
        self.call("clean_all", &[])
    }

    fn query_all(&self) -> Result<Vec<String>, PmsError> {
        if self.failing.borrow().contains("query_all") {
            return Err(PmsError::Failed {
                command: "dpkg".to_string(),
                stderr: "dpkg: error: database is locked".to_string(),
            });
        }
        Ok(self.installed.borrow().clone())
    }

    fn create_repos(
        &self,
        template: &str,
        server: &str,
        project: &str,
        repositories: &[Repository],
    ) -> Result<(), PmsError> {
        let mut args = vec![template.to_string(), server.to_string(), project.to_string()];
        args.extend(repositories.iter().map(|r| r.name.clone()));
        self.call("create_repos", &args)
    }

    fn import_server_key(&self, key_file: &Path) -> Result<(), PmsError> {
        self.call("import_server_key", &[key_file.display().to_string()])
    }

    fn architecture(&self) -> String {
        "amd64".to_string()
    }
}

/// Whether `id` (`name-version`) is a version of package `name`.
fn is_package(id: &str, name: &str) -> bool {
    id.strip_prefix(name)
        .is_some_and(|version| version.starts_with('-'))
}

/// Printing system double.
#[derive(Default)]
pub struct FakePrinters {
    printers: RefCell<Vec<PhysicalPrinter>>,
    default: RefCell<Option<String>>,
    actions: RefCell<Vec<String>>,
    failing: RefCell<HashSet<String>>,
}

impl FakePrinters {
    pub fn add(&self, printer: PhysicalPrinter) {
        self.printers.borrow_mut().push(printer);
    }

    pub fn set_current_default(&self, name: &str) {
        *self.default.borrow_mut() = Some(name.to_string());
    }

    /// Make every action on printer `name` fail.
    pub fn fail_on(&self, name: &str) {
        self.failing.borrow_mut().insert(name.to_string());
    }

    pub fn printers(&self) -> Vec<PhysicalPrinter> {
        self.printers.borrow().clone()
    }

    pub fn current_default(&self) -> Option<String> {
        self.default.borrow().clone()
    }

    pub fn actions(&self) -> Vec<String> {
        self.actions.borrow().clone()
    }

    pub fn clear_actions(&self) {
        self.actions.borrow_mut().clear();
    }

    fn act(&self, action: &str, name: &str) -> Result<(), PrinterError> {
        self.actions.borrow_mut().push(format!("{action} {name}"));
        if self.failing.borrow().contains(name) {
            return Err(PrinterError::Failed {
                command: format!("lpadmin {action}"),
                stderr: format!("lpadmin: Unable to {action} {name}"),
            });
        }
        Ok(())
    }
}

impl PrinterSystem for FakePrinters {
    fn printers(&self) -> Result<Vec<PhysicalPrinter>, PrinterError> {
        Ok(self.printers.borrow().clone())
    }

    fn install(&self, printer: &LogicalPrinter) -> Result<(), PrinterError> {
        self.act("install", &printer.name)?;
        let mut printers = self.printers.borrow_mut();
        printers.retain(|p| p.name != printer.name);
        printers.push(PhysicalPrinter {
            name: printer.name.clone(),
            info: printer.info.clone(),
            location: printer.location.clone(),
            uri: printer.uri.clone(),
        });
        Ok(())
    }

    fn remove(&self, name: &str) -> Result<(), PrinterError> {
        self.act("remove", name)?;
        self.printers.borrow_mut().retain(|p| p.name != name);
        Ok(())
    }

    fn default_printer(&self) -> Result<Option<String>, PrinterError> {
        Ok(self.default.borrow().clone())
    }

    fn set_default(&self, name: &str) -> Result<(), PrinterError> {
        self.act("default", name)?;
        *self.default.borrow_mut() = Some(name.to_string());
        Ok(())
    }
}

/// Hardware probe double.
pub struct FakeHardware {
    inventory: Option<Value>,
}

impl FakeHardware {
    pub fn new(inventory: Value) -> Self {
        Self {
            inventory: Some(inventory),
        }
    }

    pub fn broken() -> Self {
        Self { inventory: None }
    }
}

impl HardwareProbe for FakeHardware {
    fn capture(&self) -> Result<Value, HardwareError> {
        self.inventory.clone().ok_or(HardwareError::EmptyCommand)
    }
}

/// PEM encoded (private, public) key pair, generated once per test binary.
pub fn key_pems() -> &'static (String, String) {
    static KEYS: OnceLock<(String, String)> = OnceLock::new();
    KEYS.get_or_init(|| {
        let private = RsaPrivateKey::new(&mut OsRng, 1024).unwrap();
        let public = private.to_public_key();
        (
            private.to_pkcs8_pem(LineEnding::LF).unwrap().to_string(),
            public.to_public_key_pem(LineEnding::LF).unwrap(),
        )
    })
}

pub fn identity() -> HostIdentity {
    HostIdentity {
        uuid: "4c4c4544-0042-3510-8052-b4c04f4e4432".to_string(),
        name: "pc-01".to_string(),
        fqdn: "pc-01.example.org".to_string(),
        ip_address: "10.0.0.21".to_string(),
        user: "ana".to_string(),
        fullname: "Ana Pérez".to_string(),
    }
}

/// An isolated agent installation with fakes for every collaborator.
pub struct Harness {
    pub dir: TempDir,
    pub config: Config,
    pub transport: FakeTransport,
    pub pms: FakePms,
    pub printers: FakePrinters,
    pub hardware: FakeHardware,
}

impl Harness {
    /// A registered computer.
    pub fn new() -> Self {
        let harness = Self::unregistered();
        let keys = harness.config.key_paths();
        let (private, public) = key_pems();
        fs::create_dir_all(&keys.dir).unwrap();
        fs::write(&keys.private, private).unwrap();
        fs::write(&keys.server_public, public).unwrap();
        fs::write(&keys.repositories, "repository key").unwrap();
        harness
    }

    /// A computer without key material.
    pub fn unregistered() -> Self {
        let dir = TempDir::new().unwrap();
        let config = Config {
            client: ClientConfig {
                server: "fleet.test".to_string(),
                project: "Acme Desktop".to_string(),
                script_timeout_secs: 10,
                ..ClientConfig::default()
            },
            paths: Paths::under(dir.path()),
            source: None,
        };
        Self {
            dir,
            config,
            transport: FakeTransport::healthy(),
            pms: FakePms::with_installed(&["bash-5.1", "vim-9.0"]),
            printers: FakePrinters::default(),
            hardware: FakeHardware::new(json!({"id": "pc-01", "class": "system"})),
        }
    }

    pub fn orchestrator(&self) -> SyncOrchestrator<'_> {
        let collaborators = Collaborators {
            transport: &self.transport,
            pms: &self.pms,
            printers: &self.printers,
            hardware: &self.hardware,
        };
        SyncOrchestrator::new(&self.config, collaborators, identity()).with_console(Console::quiet())
    }

    pub fn ledger_path(&self) -> std::path::PathBuf {
        self.config.paths.error_file(agent_sync::COMMAND)
    }

    pub fn ledger_text(&self) -> String {
        fs::read_to_string(self.ledger_path()).unwrap_or_default()
    }
}
