//! Logical devices assigned by the server and the local printing system.

mod cups;
mod reconcile;

pub use cups::Cups;
pub use reconcile::{DeviceReconciler, ReconcileReport};

use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::path::Path;
use thiserror::Error;

/// Separator of the fields of a device info string.
pub const INFO_SEPARATOR: &str = "__";

/// Number of fields of an info string written by the agent.
pub const INFO_FIELDS: usize = 5;

/// Failures of the printing system.
#[derive(Debug, Error)]
pub enum PrinterError {
    #[error(transparent)]
    Command(#[from] agent_runtime::Error),

    #[error("{command} failed: {stderr}")]
    Failed { command: String, stderr: String },
}

/// Device id embedded in `manufacturer__model__feature__name__id`.
///
/// Strings with another number of fields were not written by the agent.
pub fn device_id_from_info(info: &str) -> Option<u64> {
    let fields: Vec<&str> = info.split(INFO_SEPARATOR).collect();
    if fields.len() != INFO_FIELDS {
        return None;
    }
    fields[INFO_FIELDS - 1].trim().parse().ok()
}

/// Devices assigned to the computer.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DevicesResponse {
    #[serde(default)]
    pub logical: Vec<DeviceEntry>,
    /// Id of the default device, 0 for none.
    #[serde(default, deserialize_with = "default_from_any")]
    pub default: u64,
}

/// One logical device. Only printers are handled.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeviceEntry {
    /// Packages required before the device can be configured.
    #[serde(default)]
    pub packages: Vec<String>,
    #[serde(rename = "PRINTER", default)]
    pub printer: Option<PrinterSpec>,
}

/// Printer definition as sent by the server.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PrinterSpec {
    #[serde(deserialize_with = "id_from_any")]
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub manufacturer: String,
    #[serde(default)]
    pub feature: String,
    #[serde(default)]
    pub driver: Option<String>,
    #[serde(rename = "TCP", default)]
    pub tcp: Option<Connection>,
    #[serde(rename = "LPT", default)]
    pub lpt: Option<Connection>,
    #[serde(rename = "USB", default)]
    pub usb: Option<Connection>,
    #[serde(rename = "SRL", default)]
    pub srl: Option<Connection>,
    #[serde(rename = "LPD", default)]
    pub lpd: Option<Connection>,
}

/// Connection parameters of a printer.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Connection {
    #[serde(rename = "IP", default, deserialize_with = "string_from_any")]
    pub ip: Option<String>,
    #[serde(rename = "PORT", default, deserialize_with = "string_from_any")]
    pub port: Option<String>,
    #[serde(rename = "LOCATION", default, deserialize_with = "string_from_any")]
    pub location: Option<String>,
    #[serde(rename = "NAME", default, deserialize_with = "string_from_any")]
    pub name: Option<String>,
    #[serde(rename = "CUPSWRAPPER", default, deserialize_with = "string_from_any")]
    pub cups_wrapper: Option<String>,
}

fn string_from_any<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    })
}

fn id_from_any<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::Number(n) => n
            .as_u64()
            .ok_or_else(|| serde::de::Error::custom(format!("invalid device id {n}"))),
        Value::String(s) => s
            .trim()
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("invalid device id {s:?}"))),
        other => Err(serde::de::Error::custom(format!("invalid device id {other}"))),
    }
}

/// Default device id; anything that is not an id means no default.
fn default_from_any<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(n) => n.as_u64().unwrap_or(0),
        Value::String(s) => s.trim().parse().unwrap_or(0),
        _ => 0,
    })
}

/// Value of an optional connection field, ignoring `""` and `"undefined"`.
fn defined(value: &Option<String>) -> Option<&str> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty() && *v != "undefined")
}

/// A printer as the local printing system reports it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PhysicalPrinter {
    pub name: String,
    pub info: String,
    pub location: String,
    pub uri: String,
}

impl PhysicalPrinter {
    /// Logical id of a printer installed by the agent.
    pub fn device_id(&self) -> Option<u64> {
        device_id_from_info(&self.info)
    }
}

/// A printer the server wants configured, with the local printer it maps to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogicalPrinter {
    pub id: u64,
    pub name: String,
    pub info: String,
    pub uri: String,
    pub location: String,
    pub driver: Option<String>,
    pub manufacturer: String,
    pub model: String,
    pub feature: String,
    /// Local printer carrying this printer's id, if any.
    pub physical: Option<PhysicalPrinter>,
}

impl LogicalPrinter {
    pub fn from_spec(spec: &PrinterSpec) -> Self {
        let mut uri = String::new();
        let mut location = String::new();

        let connection = if let Some(conn) = &spec.tcp {
            if let Some(ip) = defined(&conn.ip) {
                let port = defined(&conn.port).unwrap_or("9100");
                uri = format!("socket://{ip}:{port}");
                location = defined(&conn.location).unwrap_or_default().to_string();
            }
            Some(conn)
        } else if let Some(conn) = &spec.lpt {
            uri = format!("parallel:/dev/lp{}", defined(&conn.port).unwrap_or("0"));
            Some(conn)
        } else if let Some(conn) = &spec.usb {
            uri = format!("parallel:/dev/usb/lp{}", defined(&conn.port).unwrap_or("0"));
            Some(conn)
        } else if let Some(conn) = &spec.srl {
            uri = format!("serial:/dev/ttyS{}", defined(&conn.port).unwrap_or("0"));
            Some(conn)
        } else if let Some(conn) = &spec.lpd {
            if let Some(ip) = defined(&conn.ip) {
                uri = format!("lpd://{ip}/{}", defined(&conn.port).unwrap_or_default());
                location = defined(&conn.location).unwrap_or_default().to_string();
            }
            Some(conn)
        } else {
            None
        };

        if let Some(wrapper) = connection.and_then(|c| defined(&c.cups_wrapper)) {
            uri = format!("{wrapper}:{uri}");
        }

        let name = match connection.and_then(|c| defined(&c.name)) {
            Some(alias) => [alias, spec.feature.as_str(), spec.name.as_str()].join(INFO_SEPARATOR),
            None => [&spec.manufacturer, &spec.model, &spec.feature, &spec.name]
                .map(String::as_str)
                .join(INFO_SEPARATOR),
        };

        let info = format!(
            "{}{sep}{}{sep}{}{sep}{}{sep}{}",
            spec.manufacturer,
            spec.model,
            spec.feature,
            spec.name,
            spec.id,
            sep = INFO_SEPARATOR
        );

        Self {
            id: spec.id,
            name,
            info,
            uri,
            location,
            driver: spec.driver.clone().filter(|d| !d.trim().is_empty()),
            manufacturer: spec.manufacturer.clone(),
            model: spec.model.clone(),
            feature: spec.feature.clone(),
            physical: None,
        }
    }
}

/// The local printing system.
pub trait PrinterSystem {
    /// Every configured printer.
    fn printers(&self) -> Result<Vec<PhysicalPrinter>, PrinterError>;

    /// Create (or replace) a printer from its logical definition.
    fn install(&self, printer: &LogicalPrinter) -> Result<(), PrinterError>;

    fn remove(&self, name: &str) -> Result<(), PrinterError>;

    /// Name of the system default printer.
    fn default_printer(&self) -> Result<Option<String>, PrinterError>;

    fn set_default(&self, name: &str) -> Result<(), PrinterError>;
}

/// Fingerprint of a driver: BLAKE3 of the driver file, or of the driver
/// string itself when it is not a readable file.
pub fn driver_fingerprint(driver: &str) -> String {
    let hash = match std::fs::read(Path::new(driver)) {
        Ok(contents) => blake3::hash(&contents),
        Err(_) => blake3::hash(driver.as_bytes()),
    };
    hex::encode(hash.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn spec(value: Value) -> PrinterSpec {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_lenient_default_device() {
        let parse = |default: Value| -> u64 {
            serde_json::from_value::<DevicesResponse>(json!({"logical": [], "default": default}))
                .unwrap()
                .default
        };
        assert_eq!(parse(json!(135)), 135);
        assert_eq!(parse(json!("135")), 135);
        assert_eq!(parse(Value::Null), 0);
        assert_eq!(parse(json!("none")), 0);
        assert_eq!(parse(json!(-1)), 0);
        assert_eq!(
            serde_json::from_value::<DevicesResponse>(json!({"logical": []}))
                .unwrap()
                .default,
            0
        );
    }

    #[test]
    fn test_device_id_from_info() {
        assert_eq!(device_id_from_info("HP__LJ400__DEFAULT__1000__135"), Some(135));
        assert_eq!(device_id_from_info("HP__LJ400__DEFAULT__135"), None);
        assert_eq!(device_id_from_info("a__b__c__d__e__6"), None);
        assert_eq!(device_id_from_info("HP__LJ400__DEFAULT__1000__x"), None);
        assert_eq!(device_id_from_info(""), None);
    }

    #[test]
    fn test_tcp_printer() {
        let printer = LogicalPrinter::from_spec(&spec(json!({
            "id": 135,
            "name": "1000",
            "model": "IRC-5000",
            "manufacturer": "Canon",
            "driver": "/usr/share/ppd/IRC-5000.ppd",
            "feature": "DEFAULT",
            "TCP": {"IP": "192.168.100.254", "PORT": 9100, "LOCATION": "Entry"}
        })));
        assert_eq!(printer.uri, "socket://192.168.100.254:9100");
        assert_eq!(printer.location, "Entry");
        assert_eq!(printer.info, "Canon__IRC-5000__DEFAULT__1000__135");
        assert_eq!(printer.name, "Canon__IRC-5000__DEFAULT__1000");
        assert_eq!(printer.driver.as_deref(), Some("/usr/share/ppd/IRC-5000.ppd"));
    }

    #[test]
    fn test_tcp_default_port_and_alias() {
        let printer = LogicalPrinter::from_spec(&spec(json!({
            "id": "7",
            "name": "hall",
            "model": "M1",
            "manufacturer": "HP",
            "feature": "COLOR",
            "TCP": {"IP": "10.0.0.9", "PORT": "undefined", "LOCATION": "", "NAME": "Hall"}
        })));
        assert_eq!(printer.id, 7);
        assert_eq!(printer.uri, "socket://10.0.0.9:9100");
        assert_eq!(printer.location, "");
        assert_eq!(printer.name, "Hall__COLOR__hall");
        assert_eq!(printer.driver, None);
    }

    #[test]
    fn test_local_connections() {
        let base = json!({"id": 1, "name": "n", "model": "m", "manufacturer": "x", "feature": "f"});
        let with = |kind: &str, conn: Value| {
            let mut value = base.clone();
            value[kind] = conn;
            LogicalPrinter::from_spec(&spec(value)).uri
        };
        assert_eq!(with("LPT", json!({"PORT": 1})), "parallel:/dev/lp1");
        assert_eq!(with("USB", json!({})), "parallel:/dev/usb/lp0");
        assert_eq!(with("SRL", json!({"PORT": ""})), "serial:/dev/ttyS0");
        assert_eq!(
            with("LPD", json!({"IP": "10.1.1.1", "PORT": "queue", "LOCATION": "Lab"})),
            "lpd://10.1.1.1/queue"
        );
        assert_eq!(
            with("USB", json!({"PORT": 2, "CUPSWRAPPER": "beh"})),
            "beh:parallel:/dev/usb/lp2"
        );
    }

    #[test]
    fn test_devices_response_defaults() {
        let response: DevicesResponse = serde_json::from_value(json!({
            "logical": [{"packages": ["cups"]}, {"SCANNER": {}}]
        }))
        .unwrap();
        assert_eq!(response.default, 0);
        assert_eq!(response.logical.len(), 2);
        assert!(response.logical.iter().all(|d| d.printer.is_none()));
    }

    #[test]
    fn test_driver_fingerprint() {
        let dir = tempfile::TempDir::new().unwrap();
        let ppd = dir.path().join("a.ppd");
        std::fs::write(&ppd, "*PPD-Adobe: \"4.3\"").unwrap();
        let path = ppd.to_str().unwrap();

        let first = driver_fingerprint(path);
        assert_eq!(first.len(), 64);
        assert_eq!(first, driver_fingerprint(path));

        std::fs::write(&ppd, "*PPD-Adobe: \"4.4\"").unwrap();
        assert_ne!(first, driver_fingerprint(path));
        assert_ne!(driver_fingerprint("raw"), driver_fingerprint("drv:///generic.ppd"));
    }
}
