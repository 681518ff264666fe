//! The synchronization workflow.

use crate::config::Config;
use crate::console::Console;
use crate::devices::{DeviceReconciler, DevicesResponse, PrinterSystem};
use crate::hardware::HardwareProbe;
use crate::ledger::ErrorLedger;
use crate::lock::LockFile;
use crate::pms::{Pms, PmsError, Repository};
use crate::session::SyncSession;
use crate::software::{SnapshotStore, SoftwareDiff, SoftwareHistory};
use crate::system::HostIdentity;
use crate::transport::{Endpoint, Transport, TransportError};
use crate::{Result, SyncError, EXIT_PMS_FAILED};
use agent_envelope::keys;
use agent_runtime::{AttributeEvaluator, AttributeSpec, CancelToken, CommandRunner, FaultSpec};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Name of the agent command; names its lock and error files.
pub const COMMAND: &str = "fleet-agent";

/// Local and remote services the orchestrator drives.
#[derive(Clone, Copy)]
pub struct Collaborators<'a> {
    pub transport: &'a dyn Transport,
    pub pms: &'a dyn Pms,
    pub printers: &'a dyn PrinterSystem,
    pub hardware: &'a dyn HardwareProbe,
}

/// Outcome of a command that ran to completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub computer_id: Option<u64>,
    pub pms_status_ok: bool,
    /// Software changes uploaded with the inventory.
    pub history: SoftwareHistory,
}

impl SyncReport {
    /// Process exit status: success unless a package action failed.
    pub fn exit_code(&self) -> i32 {
        if self.pms_status_ok {
            0
        } else {
            EXIT_PMS_FAILED
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct MandatoryPackages {
    #[serde(default)]
    install: Vec<String>,
    #[serde(default)]
    remove: Vec<String>,
}

/// Runs the agent commands against the server.
///
/// A sync executes its phases strictly in order. Fatal failures end the run
/// with a [`SyncError`]; every other failure is written to the error ledger
/// and the run continues. Changes already applied to the computer are never
/// rolled back.
pub struct SyncOrchestrator<'a> {
    config: &'a Config,
    transport: &'a dyn Transport,
    pms: &'a dyn Pms,
    printers: &'a dyn PrinterSystem,
    hardware: &'a dyn HardwareProbe,
    identity: HostIdentity,
    evaluator: AttributeEvaluator,
    ledger: ErrorLedger,
    snapshots: SnapshotStore,
    session: SyncSession,
    console: Console,
    cancel: CancelToken,
    force_upgrade: bool,
}

impl<'a> SyncOrchestrator<'a> {
    pub fn new(config: &'a Config, collaborators: Collaborators<'a>, identity: HostIdentity) -> Self {
        let session = SyncSession::new(identity.user.clone(), config.client.debug);
        Self {
            config,
            transport: collaborators.transport,
            pms: collaborators.pms,
            printers: collaborators.printers,
            hardware: collaborators.hardware,
            evaluator: AttributeEvaluator::new(script_runner(config)),
            ledger: ErrorLedger::new(config.paths.error_file(COMMAND)),
            snapshots: SnapshotStore::new(&config.paths.software_file),
            session,
            identity,
            console: Console::new(),
            cancel: CancelToken::new(),
            force_upgrade: false,
        }
    }

    /// Stop between phases, and kill running scripts, once `cancel` is set.
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.evaluator = AttributeEvaluator::new(script_runner(self.config).with_cancel(cancel.clone()));
        self.cancel = cancel;
        self
    }

    pub fn with_console(mut self, console: Console) -> Self {
        self.console = console;
        self
    }

    /// Upgrade packages even when `auto_update_packages` is off.
    pub fn force_upgrade(mut self, force: bool) -> Self {
        self.force_upgrade = force;
        self
    }

    pub fn session(&self) -> &SyncSession {
        &self.session
    }

    pub fn ledger(&self) -> &ErrorLedger {
        &self.ledger
    }

    /// Synchronize the computer with the server.
    pub fn sync(&mut self) -> Result<SyncReport> {
        let _lock = LockFile::acquire(&self.config.paths.lock_file(COMMAND), COMMAND)?;
        self.synchronize()
    }

    fn synchronize(&mut self) -> Result<SyncReport> {
        self.check_keys()?;
        self.console.banner("Connecting to server...");

        self.checkpoint()?;
        self.upload_old_errors()?;

        self.checkpoint()?;
        self.computer_id()?;

        self.checkpoint()?;
        self.upload_attributes()?;

        self.checkpoint()?;
        self.upload_faults()?;

        self.checkpoint()?;
        let before = self.query_software()?;
        let mut history = match &before {
            Some(before) => self.snapshots.history(before),
            None => SoftwareHistory::default(),
        };

        self.checkpoint()?;
        self.create_repositories()?;

        self.checkpoint()?;
        self.clean_pms_cache()?;

        self.checkpoint()?;
        self.mandatory_packages()?;

        if self.config.client.auto_update_packages || self.force_upgrade {
            self.checkpoint()?;
            self.update_packages()?;
        }

        self.checkpoint()?;
        self.upload_software(before.as_deref(), &mut history)?;

        self.checkpoint()?;
        if self.hardware_capture_is_required()? {
            self.update_hardware_inventory()?;
        }

        self.checkpoint()?;
        self.sync_devices()?;

        self.upload_execution_errors();
        self.end_synchronization();
        self.end_of_transmission();
        self.console.banner("Completed operations");

        Ok(self.report(history))
    }

    /// Install `package` and upload the resulting software changes.
    pub fn install_package(&mut self, package: &str) -> Result<SyncReport> {
        let _lock = LockFile::acquire(&self.config.paths.lock_file(COMMAND), COMMAND)?;
        self.manage_package(&format!("Installing package: {package}"), |pms| {
            pms.install(package)
        })
    }

    /// Purge `package` and upload the resulting software changes.
    pub fn purge_package(&mut self, package: &str) -> Result<SyncReport> {
        let _lock = LockFile::acquire(&self.config.paths.lock_file(COMMAND), COMMAND)?;
        self.manage_package(&format!("Removing package: {package}"), |pms| {
            pms.remove(package)
        })
    }

    fn manage_package<F>(&mut self, banner: &str, action: F) -> Result<SyncReport>
    where
        F: FnOnce(&dyn Pms) -> std::result::Result<(), PmsError>,
    {
        self.check_keys()?;
        let before = self.query_software()?;
        let mut history = match &before {
            Some(before) => self.snapshots.history(before),
            None => SoftwareHistory::default(),
        };

        self.console.banner(banner);
        match action(self.pms) {
            Ok(()) => self.console.ok(),
            Err(e) => {
                self.checkpoint()?;
                self.session.pms_failed();
                self.console.failed(&e.to_string());
                log::error!("{banner}: {e}");
            }
        }

        self.checkpoint()?;
        self.upload_software(before.as_deref(), &mut history)?;
        self.end_of_transmission();
        Ok(self.report(history))
    }

    /// Search the package manager.
    pub fn search(&self, pattern: &str) -> std::result::Result<String, PmsError> {
        self.pms.search(pattern)
    }

    /// Download the key material of this computer and register it.
    pub fn register(&mut self, user: &str, password: &SecretString) -> Result<u64> {
        let keys = self.config.key_paths();
        self.console.banner("Registering computer...");

        let response = self
            .transport
            .request(
                Endpoint::ProjectKeys,
                json!({
                    "username": user,
                    "password": password.expose_secret(),
                    "project": self.config.client.project,
                    "platform": std::env::consts::OS,
                    "pms": self.pms.name(),
                    "architecture": self.pms.architecture(),
                }),
            )
            .map_err(|e| self.fatal("register computer", e))?;
        let files = response.as_object().ok_or_else(|| SyncError::UnexpectedResponse {
            context: "register computer",
            detail: "expected a map of key files".to_string(),
        })?;

        fs::create_dir_all(&keys.dir)?;
        for (name, content) in files {
            let path = match name.as_str() {
                "server.pub" => &keys.server_public,
                "client.pri" => &keys.private,
                other => {
                    log::debug!("Ignoring key file {other}");
                    continue;
                }
            };
            write_key(path, expect_text("register computer", content)?)?;
            self.console.line(&format!("Key {} created", path.display()));
        }

        let key = self
            .transport
            .request(Endpoint::RepositoriesKey, Value::Null)
            .map_err(|e| self.fatal("repositories key", e))?;
        write_key(&keys.repositories, expect_text("repositories key", &key)?)?;
        match self.pms.import_server_key(&keys.repositories) {
            Ok(()) => self
                .console
                .line(&format!("Key {} created", keys.repositories.display())),
            Err(e) => self.console.failed(&format!(
                "Key {} not imported: {e}",
                keys.repositories.display()
            )),
        }

        self.check_keys()?;
        let id = self.computer_id()?;
        self.console.ok_with("Computer registered at server");
        Ok(id)
    }

    /// Server id of this computer, resolved once per session.
    ///
    /// A computer unknown to the server is registered on the fly.
    pub fn computer_id(&mut self) -> Result<u64> {
        if let Some(id) = self.session.computer_id() {
            return Ok(id);
        }
        let response = self.transport.request(
            Endpoint::ComputerId,
            json!({"uuid": self.identity.uuid, "name": self.identity.name}),
        );
        let id = match response {
            Ok(value) => parse_id("computer id", &value)?,
            Err(e) if e.is_not_found() => self.save_computer()?,
            Err(e) => return Err(self.fatal("computer id", e)),
        };
        log::debug!("Computer id: {id}");
        Ok(self.session.set_computer_id(id))
    }

    fn save_computer(&self) -> Result<u64> {
        let response = self
            .transport
            .request(
                Endpoint::RegisterComputer,
                json!({
                    "uuid": self.identity.uuid,
                    "name": self.identity.name,
                    "ip_address": self.identity.ip_address,
                }),
            )
            .map_err(|e| self.fatal("save computer", e))?;
        parse_id("save computer", &response)
    }

    fn check_keys(&self) -> Result<()> {
        let paths = self.config.key_paths();
        if !paths.all_present() {
            log::warn!("Security keys are not present in {}", paths.dir.display());
            self.console.failed("Security keys are not present");
            return Err(SyncError::KeysMissing);
        }
        keys::load_private_key(&paths.private)?;
        keys::load_public_key(&paths.server_public)?;
        Ok(())
    }

    fn checkpoint(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(self.interrupted());
        }
        Ok(())
    }

    fn interrupted(&self) -> SyncError {
        self.console.banner(&format!("Killing {COMMAND} before time!!!"));
        log::error!("Exiting {COMMAND}: interrupted");
        SyncError::Interrupted
    }

    fn fatal(&self, context: &'static str, e: TransportError) -> SyncError {
        self.console.failed(&e.info);
        SyncError::server(context, e)
    }

    /// Request that must succeed, decoded as `T`.
    fn fetch<T: DeserializeOwned>(
        &self,
        endpoint: Endpoint,
        context: &'static str,
        data: Value,
    ) -> Result<T> {
        let value = self
            .transport
            .request(endpoint, data)
            .map_err(|e| self.fatal(context, e))?;
        decode(context, value)
    }

    fn record(&self, message: &str) {
        self.console.failed(message);
        self.ledger.record(message);
    }

    fn record_pms_failure(&mut self, message: &str) {
        self.session.pms_failed();
        self.record(message);
    }

    /// Record a failed package manager step. A step killed by cancellation
    /// stops the run instead.
    fn pms_step_failed(&mut self, message: &str) -> Result<()> {
        self.checkpoint()?;
        self.record_pms_failure(message);
        Ok(())
    }

    /// Installed software, or `None` (recorded) when the query fails.
    fn query_software(&mut self) -> Result<Option<Vec<String>>> {
        match self.pms.query_all() {
            Ok(packages) => {
                log::debug!("Actual software: {packages:?}");
                Ok(Some(packages))
            }
            Err(e) => {
                self.pms_step_failed(&format!("Error querying installed software: {e}"))?;
                Ok(None)
            }
        }
    }

    fn upload_old_errors(&mut self) -> Result<()> {
        let description = match self.ledger.read() {
            Ok(Some(description)) => description,
            Ok(None) => return Ok(()),
            Err(e) => {
                log::warn!("Failed to read {}: {e}", self.ledger.path().display());
                return Ok(());
            }
        };
        let id = self.computer_id()?;

        self.console.banner("Uploading old errors...");
        match self.transport.request(
            Endpoint::UploadErrors,
            json!({"id": id, "description": description}),
        ) {
            Ok(_) => {
                self.console.ok();
                if let Err(e) = self.ledger.clear() {
                    log::warn!("Failed to clear {}: {e}", self.ledger.path().display());
                }
            }
            Err(e) => {
                self.console.failed(&e.info);
                log::error!("Failed to upload old errors: {e}");
            }
        }
        Ok(())
    }

    fn upload_attributes(&mut self) -> Result<()> {
        let id = self.computer_id()?;

        self.console.banner("Getting properties...");
        let specs: Vec<AttributeSpec> =
            self.fetch(Endpoint::Properties, "properties", json!({"id": id}))?;
        self.console.ok();

        self.console.banner("Evaluating attributes...");
        let values = self
            .evaluator
            .evaluate_attributes(&specs)
            .map_err(|_| self.interrupted())?;
        let mut attributes = Map::new();
        for value in values {
            if let Some(error) = &value.error {
                self.ledger.record(error);
            }
            let info = format!("{}: {}", value.prefix, value.value);
            if value.is_alert() {
                self.console.failed(&info);
                self.ledger
                    .record(&format!("Error: property {} without value", value.prefix));
            } else {
                self.console.ok_with(&info);
            }
            attributes.insert(value.prefix, Value::String(value.value));
        }

        let payload = json!({
            "id": id,
            "uuid": self.identity.uuid,
            "name": self.identity.name,
            "fqdn": self.identity.fqdn,
            "ip_address": self.identity.ip_address,
            "sync_user": self.session.graphic_user,
            "sync_fullname": self.identity.fullname,
            "sync_attributes": attributes,
        });
        log::debug!("Attributes to send: {payload}");

        self.checkpoint()?;
        self.console.banner("Uploading attributes...");
        self.fetch::<Value>(Endpoint::UploadAttributes, "upload attributes", payload)?;
        self.console.ok();
        Ok(())
    }

    fn upload_faults(&mut self) -> Result<()> {
        let id = self.computer_id()?;

        self.console.banner("Getting fault definitions...");
        let specs: Vec<FaultSpec> =
            self.fetch(Endpoint::FaultDefinitions, "fault definitions", json!({"id": id}))?;
        self.console.ok();
        if specs.is_empty() {
            return Ok(());
        }

        self.console.banner("Executing faults...");
        let values = self
            .evaluator
            .evaluate_faults(&specs)
            .map_err(|_| self.interrupted())?;
        let mut faults = Map::new();
        for fault in values {
            if let Some(error) = &fault.error {
                self.ledger.record(error);
            }
            let info = format!("{}: {}", fault.name, fault.value);
            if fault.is_triggered() {
                self.console.failed(&info);
                faults.insert(fault.name, Value::String(fault.value));
            } else {
                self.console.ok_with(&info);
            }
        }

        let payload = json!({"id": id, "faults": faults});
        log::debug!("Faults to send: {payload}");

        self.checkpoint()?;
        self.console.banner("Uploading faults...");
        self.fetch::<Value>(Endpoint::UploadFaults, "upload faults", payload)?;
        self.console.ok();
        Ok(())
    }

    fn create_repositories(&mut self) -> Result<()> {
        let id = self.computer_id()?;

        let template = match self
            .transport
            .request(Endpoint::RepositoriesUrlTemplate, Value::Null)
        {
            Ok(Value::String(template)) => template,
            Ok(other) => {
                self.record_pms_failure(&format!("Invalid repositories URL template: {other}"));
                return Ok(());
            }
            Err(e) => {
                self.record_pms_failure(&format!("Error getting repositories URL template: {e}"));
                return Ok(());
            }
        };
        log::debug!("Repositories URL template: {template}");

        self.console.banner("Getting repositories...");
        let repositories = self
            .transport
            .request(Endpoint::Repositories, json!({"id": id}))
            .map_err(|e| e.to_string())
            .and_then(|value| {
                serde_json::from_value::<Vec<Repository>>(value).map_err(|e| e.to_string())
            });
        let repositories = match repositories {
            Ok(repositories) => repositories,
            Err(e) => {
                self.record_pms_failure(&format!("Error getting repositories: {e}"));
                return Ok(());
            }
        };
        self.console.ok();

        self.console.banner("Creating repositories...");
        match self.pms.create_repos(
            &template,
            &self.config.repository_server(),
            &self.config.project_slug(),
            &repositories,
        ) {
            Ok(()) => self.console.ok(),
            Err(e) => self.pms_step_failed(&format!(
                "Error creating repositories {}: {e}",
                names(&repositories)
            ))?,
        }
        Ok(())
    }

    fn clean_pms_cache(&mut self) -> Result<()> {
        self.console.banner("Getting repositories metadata...");
        match self.pms.clean_all() {
            Ok(()) => self.console.ok(),
            Err(e) => {
                self.checkpoint()?;
                self.record(&format!("Error getting repositories metadata: {e}"));
            }
        }
        Ok(())
    }

    fn mandatory_packages(&mut self) -> Result<()> {
        let id = self.computer_id()?;

        self.console.banner("Getting mandatory packages...");
        let packages: MandatoryPackages =
            match self.transport.request(Endpoint::MandatoryPackages, json!({"id": id})) {
                Ok(Value::Null) => MandatoryPackages::default(),
                Ok(value) => decode("mandatory packages", value)?,
                Err(e) if e.is_not_found() => MandatoryPackages::default(),
                Err(e) => return Err(self.fatal("mandatory packages", e)),
            };
        self.console.ok();

        if !packages.remove.is_empty() {
            self.console.banner("Uninstalling packages...");
            match self.pms.remove_silent(&packages.remove) {
                Ok(()) => self.console.ok(),
                Err(e) => self.pms_step_failed(&format!("Error uninstalling packages: {e}"))?,
            }
        }

        if !packages.install.is_empty() {
            self.console.banner("Installing mandatory packages...");
            match self.pms.install_silent(&packages.install) {
                Ok(()) => self.console.ok(),
                Err(e) => self.pms_step_failed(&format!("Error installing packages: {e}"))?,
            }
        }
        Ok(())
    }

    fn update_packages(&mut self) -> Result<()> {
        self.console.banner("Updating packages...");
        match self.pms.update_silent() {
            Ok(()) => self.console.ok(),
            Err(e) => self.pms_step_failed(&format!("Error updating packages: {e}"))?,
        }
        Ok(())
    }

    /// Upload inventory and history, then make the inventory the new
    /// snapshot. Skipped when the installed software cannot be queried.
    fn upload_software(
        &mut self,
        before: Option<&[String]>,
        history: &mut SoftwareHistory,
    ) -> Result<()> {
        let id = self.computer_id()?;

        let Some(after) = self.query_software()? else {
            return Ok(());
        };
        if let Some(before) = before {
            let diff = SoftwareDiff::between(before, &after);
            if !diff.is_empty() {
                history.merge(diff);
                log::info!("Software diff: {history:?}");
            }
        }

        self.checkpoint()?;
        self.console.banner("Uploading software...");
        self.fetch::<Value>(
            Endpoint::UploadSoftware,
            "upload software",
            json!({"id": id, "inventory": after, "history": history}),
        )?;
        self.console.ok();

        if let Err(e) = self.snapshots.persist(&after) {
            log::warn!("Failed to write {}: {e}", self.snapshots.path().display());
        }
        Ok(())
    }

    fn hardware_capture_is_required(&mut self) -> Result<bool> {
        let id = self.computer_id()?;
        match self
            .transport
            .request(Endpoint::HardwareRequired, json!({"id": id}))
        {
            Ok(value) => Ok(value
                .get("capture")
                .and_then(Value::as_bool)
                .unwrap_or(false)),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(self.fatal("hardware capture", e)),
        }
    }

    fn update_hardware_inventory(&mut self) -> Result<()> {
        let id = self.computer_id()?;

        self.console.banner("Capturing hardware information...");
        let hardware = match self.hardware.capture() {
            Ok(hardware) => hardware,
            Err(e) => {
                self.checkpoint()?;
                self.record(&format!("Hardware capture failed: {e}"));
                return Ok(());
            }
        };
        self.console.ok();

        self.checkpoint()?;
        self.console.banner("Sending hardware information...");
        match self.transport.request(
            Endpoint::UploadHardware,
            json!({"id": id, "hardware": hardware}),
        ) {
            Ok(_) => self.console.ok(),
            Err(e) => self.record(&e.info),
        }
        Ok(())
    }

    fn sync_devices(&mut self) -> Result<()> {
        let id = self.computer_id()?;

        self.console.banner("Getting devices...");
        let devices: DevicesResponse =
            match self.transport.request(Endpoint::Devices, json!({"id": id})) {
                Ok(Value::Null) => return Ok(()),
                Ok(value) => match serde_json::from_value(value) {
                    Ok(devices) => devices,
                    Err(e) => {
                        self.record(&format!("Invalid devices response: {e}"));
                        return Ok(());
                    }
                },
                Err(e) if e.is_not_found() => {
                    self.console.ok();
                    return Ok(());
                }
                Err(e) => {
                    self.record(&format!("Error getting devices: {e}"));
                    return Ok(());
                }
            };
        self.console.ok();

        let reconciler = DeviceReconciler::new(
            self.printers,
            self.pms,
            &self.config.paths.devices_dir,
            &self.config.client.project,
        );
        let report = reconciler.reconcile(&devices);
        self.checkpoint()?;

        for name in &report.removed {
            self.console.ok_with(&format!("Device removed: {name}"));
        }
        for name in &report.installed {
            self.console.ok_with(&format!("Device installed: {name}"));
        }
        if let Some(name) = &report.default_set {
            self.console.ok_with(&format!("Default device: {name}"));
        }
        for failure in &report.failures {
            self.record(failure);
        }
        if report.aborted {
            self.session.pms_failed();
        }
        Ok(())
    }

    fn upload_execution_errors(&mut self) {
        let description = match self.ledger.read() {
            Ok(Some(description)) => description,
            Ok(None) => return,
            Err(e) => {
                log::warn!("Failed to read {}: {e}", self.ledger.path().display());
                return;
            }
        };
        let Some(id) = self.session.computer_id() else {
            return;
        };

        self.console.banner("Sending errors to server...");
        match self.transport.request(
            Endpoint::UploadErrors,
            json!({"id": id, "description": description}),
        ) {
            Ok(_) => {
                self.console.ok();
                if !self.session.debug {
                    if let Err(e) = self.ledger.clear() {
                        log::warn!("Failed to clear {}: {e}", self.ledger.path().display());
                    }
                }
            }
            Err(e) => {
                self.console.failed(&e.info);
                log::error!("Failed to upload errors: {e}");
            }
        }
    }

    fn end_synchronization(&mut self) {
        let Some(id) = self.session.computer_id() else {
            return;
        };

        self.console.banner("Ending synchronization...");
        let payload = json!({
            "id": id,
            "start_date": self.session.start_date().format("%Y-%m-%dT%H:%M:%S%.6f").to_string(),
            "consumer": format!("{COMMAND} {}", env!("CARGO_PKG_VERSION")),
            "pms_status_ok": self.session.pms_status_ok(),
        });
        match self.transport.request(Endpoint::UploadSync, payload) {
            Ok(_) => self.console.ok(),
            Err(e) => self.record(&format!("Error ending synchronization: {e}")),
        }
    }

    fn end_of_transmission(&mut self) {
        let Some(id) = self.session.computer_id() else {
            return;
        };
        if let Err(e) = self
            .transport
            .request(Endpoint::EndOfTransmission, json!({"id": id}))
        {
            log::warn!("End of transmission failed: {e}");
        }
    }

    fn report(&self, history: SoftwareHistory) -> SyncReport {
        SyncReport {
            computer_id: self.session.computer_id(),
            pms_status_ok: self.session.pms_status_ok(),
            history,
        }
    }
}

fn script_runner(config: &Config) -> CommandRunner {
    CommandRunner::new(Duration::from_secs(config.client.script_timeout_secs))
}

fn decode<T: DeserializeOwned>(context: &'static str, value: Value) -> Result<T> {
    serde_json::from_value(value).map_err(|e| SyncError::UnexpectedResponse {
        context,
        detail: e.to_string(),
    })
}

/// Id from a bare number, a numeric string or an `{"id": ..}` object.
fn parse_id(context: &'static str, value: &Value) -> Result<u64> {
    let id = match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        Value::Object(map) => map.get("id").and_then(|id| match id {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }),
        _ => None,
    };
    id.filter(|id| *id != 0)
        .ok_or_else(|| SyncError::UnexpectedResponse {
            context,
            detail: format!("no computer id in {value}"),
        })
}

fn expect_text<'v>(context: &'static str, value: &'v Value) -> Result<&'v str> {
    value.as_str().ok_or_else(|| SyncError::UnexpectedResponse {
        context,
        detail: format!("expected text, got {value}"),
    })
}

fn write_key(path: &Path, content: &str) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, content)?;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    Ok(())
}

fn names(repositories: &[Repository]) -> String {
    repositories
        .iter()
        .map(|r| r.name.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}
