use super::{driver_fingerprint, DevicesResponse, LogicalPrinter, PrinterSystem};
use crate::pms::Pms;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Outcome of one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Printers (re)installed.
    pub installed: Vec<String>,
    /// Orphan printers removed.
    pub removed: Vec<String>,
    /// Printer made the system default.
    pub default_set: Option<String>,
    /// Human readable failures, in order.
    pub failures: Vec<String>,
    /// Stopped because device packages could not be installed.
    pub aborted: bool,
}

impl ReconcileReport {
    /// Number of changes made to the printing system.
    pub fn actions(&self) -> usize {
        self.installed.len() + self.removed.len() + usize::from(self.default_set.is_some())
    }

    fn fail(&mut self, message: String) {
        self.failures.push(message);
    }
}

/// Brings the local printers in line with the logical devices of the server.
pub struct DeviceReconciler<'a> {
    printers: &'a dyn PrinterSystem,
    pms: &'a dyn Pms,
    devices_dir: PathBuf,
    project: String,
}

impl<'a> DeviceReconciler<'a> {
    /// `devices_dir` holds the driver fingerprints of installed printers.
    pub fn new(
        printers: &'a dyn PrinterSystem,
        pms: &'a dyn Pms,
        devices_dir: impl Into<PathBuf>,
        project: impl Into<String>,
    ) -> Self {
        Self {
            printers,
            pms,
            devices_dir: devices_dir.into(),
            project: project.into(),
        }
    }

    /// Run one pass over `devices`.
    ///
    /// Only a failed device package installation stops the pass; every other
    /// failure is reported and the pass continues.
    pub fn reconcile(&self, devices: &DevicesResponse) -> ReconcileReport {
        let mut report = ReconcileReport::default();

        for entry in devices.logical.iter().filter(|e| !e.packages.is_empty()) {
            if let Err(e) = self.pms.install_silent(&entry.packages) {
                report.fail(format!("Error installing packages: {e}"));
                report.fail(format!(
                    "Device reconciliation aborted: packages {} could not be installed",
                    entry.packages.join(" ")
                ));
                report.aborted = true;
                return report;
            }
        }

        let mut logical: BTreeMap<u64, LogicalPrinter> = devices
            .logical
            .iter()
            .filter_map(|entry| entry.printer.as_ref())
            .map(|spec| {
                let printer = LogicalPrinter::from_spec(spec);
                (printer.id, printer)
            })
            .collect();

        let physical = match self.printers.printers() {
            Ok(physical) => physical,
            Err(e) => {
                report.fail(format!("Error querying printers: {e}"));
                return report;
            }
        };

        for printer in physical {
            let Some(id) = printer.device_id() else {
                continue;
            };
            if let Some(device) = logical.get_mut(&id) {
                device.physical = Some(printer);
                continue;
            }
            match self.printers.remove(&printer.name) {
                Ok(()) => {
                    log::debug!("Device removed: {}", printer.name);
                    self.forget_driver(id);
                    report.removed.push(printer.name);
                }
                Err(e) => report.fail(format!("Error removing device {}: {e}", printer.name)),
            }
        }

        for device in logical.values() {
            let Some(driver) = &device.driver else {
                report.fail(format!(
                    "Error: no driver defined for device {}. Please, configure feature {}, in the model {} {}, and project {}",
                    device.name, device.feature, device.manufacturer, device.model, self.project
                ));
                continue;
            };
            if !self.is_changed(device, driver) {
                continue;
            }
            match self.install(device, driver) {
                Ok(()) => {
                    log::debug!("Device installed: {}", device.name);
                    report.installed.push(device.name.clone());
                }
                Err(e) => report.fail(format!("Error installing device {}: {e}", device.name)),
            }
        }

        if devices.default != 0 {
            if let Some(device) = logical.get(&devices.default) {
                self.apply_default(device, &mut report);
            }
        }

        report
    }

    /// No local printer, different connection, or a new driver.
    fn is_changed(&self, device: &LogicalPrinter, driver: &str) -> bool {
        let Some(physical) = &device.physical else {
            return true;
        };
        physical.info != device.info
            || physical.location != device.location
            || physical.uri != device.uri
            || self.is_driver_changed(device.id, driver)
    }

    fn is_driver_changed(&self, id: u64, driver: &str) -> bool {
        match fs::read_to_string(self.fingerprint_path(id)) {
            Ok(stored) => stored.trim() != driver_fingerprint(driver),
            Err(_) => true,
        }
    }

    fn install(&self, device: &LogicalPrinter, driver: &str) -> Result<(), String> {
        if let Some(physical) = &device.physical {
            if let Err(e) = self.printers.remove(&physical.name) {
                log::warn!("Failed to remove {} before reinstalling: {e}", physical.name);
            }
        }
        self.printers.install(device).map_err(|e| e.to_string())?;

        let path = self.fingerprint_path(device.id);
        let stored = fs::create_dir_all(&self.devices_dir)
            .and_then(|()| fs::write(&path, driver_fingerprint(driver)));
        if let Err(e) = stored {
            log::warn!("Failed to write {}: {e}", path.display());
        }
        Ok(())
    }

    fn apply_default(&self, device: &LogicalPrinter, report: &mut ReconcileReport) {
        let current = match self.current_default_id() {
            Ok(current) => current,
            Err(e) => {
                report.fail(format!("Error reading default device: {e}"));
                return;
            }
        };
        if current == Some(device.id) {
            return;
        }
        match self.printers.set_default(&device.name) {
            Ok(()) => report.default_set = Some(device.name.clone()),
            Err(e) => report.fail(format!("Error setting default device {}: {e}", device.name)),
        }
    }

    fn current_default_id(&self) -> Result<Option<u64>, super::PrinterError> {
        let Some(name) = self.printers.default_printer()? else {
            return Ok(None);
        };
        Ok(self
            .printers
            .printers()?
            .into_iter()
            .find(|p| p.name == name)
            .and_then(|p| p.device_id()))
    }

    fn fingerprint_path(&self, id: u64) -> PathBuf {
        fingerprint_path(&self.devices_dir, id)
    }

    fn forget_driver(&self, id: u64) {
        let path = self.fingerprint_path(id);
        if path.exists() {
            if let Err(e) = fs::remove_file(&path) {
                log::warn!("Failed to remove {}: {e}", path.display());
            }
        }
    }
}

/// Location of the stored driver fingerprint of device `id`.
pub(crate) fn fingerprint_path(devices_dir: &Path, id: u64) -> PathBuf {
    devices_dir.join(format!("{id}.hash"))
}
