//! Serial port enumeration and selection.

use serialport::SerialPortType;
use serde::{Deserialize, Serialize};
use std::io;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// A candidate serial port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortInfo {
    pub name: String,
    /// Product or manufacturer string, when the platform reports one
    pub description: String,
    pub bluetooth: bool,
}

impl PortInfo {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            bluetooth: false,
        }
    }
}

impl std::fmt::Display for PortInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.description.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{} ({})", self.name, self.description)
        }
    }
}

/// Source of the port list.
pub trait PortLister: Send + Sync {
    fn list(&self) -> io::Result<Vec<PortInfo>>;
}

/// Lists ports through `serialport`.
#[derive(Debug, Default)]
pub struct SerialPortLister;

impl PortLister for SerialPortLister {
    fn list(&self) -> io::Result<Vec<PortInfo>> {
        let ports = serialport::available_ports().map_err(io::Error::from)?;
        Ok(ports
            .into_iter()
            .map(|p| {
                let (description, bluetooth) = match p.port_type {
                    SerialPortType::UsbPort(usb) => (
                        usb.product.or(usb.manufacturer).unwrap_or_default(),
                        false,
                    ),
                    SerialPortType::BluetoothPort => ("Bluetooth".to_string(), true),
                    SerialPortType::PciPort => ("PCI".to_string(), false),
                    SerialPortType::Unknown => (String::new(), false),
                };
                PortInfo {
                    name: p.port_name,
                    description,
                    bluetooth,
                }
            })
            .collect())
    }
}

/// Drop wireless and virtual ports.
///
/// A port is excluded when it is Bluetooth-typed or when its name or
/// description contains any of `excluded`.
pub fn filter_ports(ports: Vec<PortInfo>, excluded: &[String]) -> Vec<PortInfo> {
    ports
        .into_iter()
        .filter(|p| !p.bluetooth)
        .filter(|p| {
            !excluded
                .iter()
                .any(|needle| p.name.contains(needle.as_str()) || p.description.contains(needle.as_str()))
        })
        .collect()
}

/// The operator's port choice and the most recent scan.
///
/// With `auto` set and nothing requested, the first available port is used.
#[derive(Debug, Default)]
pub struct PortSelector {
    requested: Mutex<Option<String>>,
    available: Mutex<Vec<PortInfo>>,
    auto: bool,
}

impl PortSelector {
    pub fn new(requested: Option<String>) -> Self {
        Self {
            requested: Mutex::new(requested),
            ..Self::default()
        }
    }

    /// Follow the first available port when nothing is requested.
    pub fn automatic() -> Self {
        Self {
            auto: true,
            ..Self::default()
        }
    }

    fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
        m.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Change the requested port.
    pub fn request(&self, port: Option<String>) {
        *Self::lock(&self.requested) = port;
    }

    pub fn requested(&self) -> Option<String> {
        Self::lock(&self.requested).clone()
    }

    /// Ports seen on the last scan.
    pub fn available(&self) -> Vec<PortInfo> {
        Self::lock(&self.available).clone()
    }

    /// Record a scan and pick the port to use from it.
    pub fn resolve(&self, ports: Vec<PortInfo>) -> Option<String> {
        let chosen = match self.requested() {
            Some(name) => ports.iter().find(|p| p.name == name).map(|p| p.name.clone()),
            None if self.auto => ports.first().map(|p| p.name.clone()),
            None => None,
        };
        *Self::lock(&self.available) = ports;
        chosen
    }

    /// Whether `port` is still the port to use.
    pub fn is_selected(&self, port: &str) -> bool {
        match self.requested() {
            Some(name) => name == port,
            None => self.auto,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bluetooth(name: &str) -> PortInfo {
        PortInfo {
            bluetooth: true,
            ..PortInfo::new(name, "")
        }
    }

    #[test]
    fn test_filter_excludes_wireless() {
        let ports = vec![
            PortInfo::new("/dev/tty.Bluetooth-Incoming-Port", ""),
            PortInfo::new("COM7", "Standard Serial over Bluetooth link"),
            bluetooth("/dev/rfcomm0"),
            PortInfo::new("/dev/ttyACM0", "Gadget Serial"),
        ];
        let kept = filter_ports(ports, &["Bluetooth".to_string()]);
        assert_eq!(kept, vec![PortInfo::new("/dev/ttyACM0", "Gadget Serial")]);
    }

    #[test]
    fn test_requested_port_must_be_present() {
        let selector = PortSelector::new(Some("/dev/ttyACM1".to_string()));
        let scan = vec![PortInfo::new("/dev/ttyACM0", "")];
        assert_eq!(selector.resolve(scan.clone()), None);
        assert_eq!(selector.available(), scan);

        selector.request(Some("/dev/ttyACM0".to_string()));
        assert_eq!(selector.resolve(scan), Some("/dev/ttyACM0".to_string()));
        assert!(selector.is_selected("/dev/ttyACM0"));
        assert!(!selector.is_selected("/dev/ttyACM1"));
    }

    #[test]
    fn test_automatic_selection() {
        let selector = PortSelector::automatic();
        assert_eq!(selector.resolve(Vec::new()), None);
        let scan = vec![PortInfo::new("a", ""), PortInfo::new("b", "")];
        assert_eq!(selector.resolve(scan), Some("a".to_string()));

        let manual = PortSelector::new(None);
        assert_eq!(manual.resolve(vec![PortInfo::new("a", "")]), None);
    }
}
