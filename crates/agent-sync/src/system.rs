//! Facts about the local computer reported to the server.

use crate::config::Config;
use nix::unistd::User;
use std::fs;
use std::net::UdpSocket;
use std::process::Command;

/// Identity of the computer and of its interactive user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostIdentity {
    pub uuid: String,
    pub name: String,
    pub fqdn: String,
    pub ip_address: String,
    /// User of the graphical session.
    pub user: String,
    pub fullname: String,
}

impl HostIdentity {
    /// Gather the identity of this computer.
    pub fn detect(config: &Config) -> Self {
        let host = host_name();
        let user = graphic_user();
        let fullname = full_name(&user);

        Self {
            uuid: hardware_uuid(),
            name: config.client.computer_name.clone().unwrap_or_else(|| host.clone()),
            fqdn: fqdn().unwrap_or(host),
            ip_address: local_ip(&config.client.server).unwrap_or_default(),
            user,
            fullname,
        }
    }
}

fn hardware_uuid() -> String {
    if let Ok(uuid) = fs::read_to_string("/sys/class/dmi/id/product_uuid") {
        let uuid = uuid.trim().to_ascii_lowercase();
        if !uuid.is_empty() {
            return uuid;
        }
    }
    fs::read_to_string("/etc/machine-id")
        .ok()
        .and_then(|id| uuid_from_machine_id(id.trim()))
        .unwrap_or_default()
}

/// `0123456789abcdef0123456789abcdef` as `01234567-89ab-cdef-0123-456789abcdef`.
fn uuid_from_machine_id(id: &str) -> Option<String> {
    if id.len() != 32 || !id.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    Some(format!(
        "{}-{}-{}-{}-{}",
        &id[0..8],
        &id[8..12],
        &id[12..16],
        &id[16..20],
        &id[20..32]
    ))
}

fn host_name() -> String {
    hostname::get()
        .ok()
        .and_then(|name| name.into_string().ok())
        .unwrap_or_default()
}

fn fqdn() -> Option<String> {
    let output = Command::new("hostname").arg("--fqdn").output().ok()?;
    let fqdn = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (output.status.success() && !fqdn.is_empty()).then_some(fqdn)
}

/// Address of the interface used to reach `server`. No packet is sent.
fn local_ip(server: &str) -> Option<String> {
    let target = if server.contains(':') {
        server.to_string()
    } else {
        format!("{server}:80")
    };
    let socket = UdpSocket::bind("0.0.0.0:0").ok()?;
    socket.connect(target).ok()?;
    Some(socket.local_addr().ok()?.ip().to_string())
}

/// The user who invoked the agent through sudo, else the current user.
fn graphic_user() -> String {
    std::env::var("SUDO_USER")
        .ok()
        .filter(|user| !user.is_empty())
        .unwrap_or_else(whoami::username)
}

/// Full name of `user` from the user database, empty when unknown.
fn full_name(user: &str) -> String {
    match User::from_name(user) {
        Ok(Some(entry)) => first_gecos_field(&entry.gecos.to_string_lossy()),
        Ok(None) => String::new(),
        Err(e) => {
            log::debug!("Failed to look up user {user}: {e}");
            if user == whoami::username() {
                whoami::realname()
            } else {
                String::new()
            }
        }
    }
}

/// `Ana Pérez,,,` as `Ana Pérez`.
fn first_gecos_field(gecos: &str) -> String {
    gecos.split(',').next().unwrap_or_default().trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uuid_from_machine_id() {
        assert_eq!(
            uuid_from_machine_id("0123456789abcdef0123456789abcdef").as_deref(),
            Some("01234567-89ab-cdef-0123-456789abcdef")
        );
        assert_eq!(uuid_from_machine_id("short"), None);
        assert_eq!(uuid_from_machine_id("zz23456789abcdef0123456789abcdef"), None);
    }

    #[test]
    fn test_first_gecos_field() {
        assert_eq!(first_gecos_field("Ana Pérez,,,"), "Ana Pérez");
        assert_eq!(first_gecos_field("root"), "root");
        assert_eq!(first_gecos_field(""), "");
    }

    #[test]
    fn test_unknown_user_has_no_full_name() {
        assert_eq!(full_name("no-such-user-for-fleet-agent"), "");
    }

    #[test]
    fn test_host_name_is_not_empty() {
        assert!(!host_name().is_empty());
    }

    #[test]
    fn test_graphic_user_is_not_empty() {
        assert!(!graphic_user().is_empty());
    }
}
