use anyhow::{Context, Result};
use std::fmt;
use tokio_serial::{SerialPortInfo, SerialPortType};
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectedPort {
    pub device: String,
    pub description: String,
    pub hwid: String,
}

impl fmt::Display for DetectedPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} : {} : {}", self.device, self.description, self.hwid)
    }
}

impl From<SerialPortInfo> for DetectedPort {
    fn from(p: SerialPortInfo) -> Self {
        let (description, hwid) = match p.port_type {
            SerialPortType::UsbPort(usb) => {
                let description = [usb.manufacturer.as_deref(), usb.product.as_deref()]
                    .into_iter()
                    .flatten()
                    .collect::<Vec<_>>()
                    .join(" ");
                let hwid = format!(
                    "USB VID:PID={:04X}:{:04X} SER={}",
                    usb.vid,
                    usb.pid,
                    usb.serial_number.as_deref().unwrap_or("")
                );
                (description, hwid)
            }
            SerialPortType::PciPort => ("PCI".into(), "PCI".into()),
            SerialPortType::BluetoothPort => ("Bluetooth".into(), "BTH".into()),
            SerialPortType::Unknown => ("n/a".into(), "n/a".into()),
        };
        Self { device: p.port_name, description, hwid }
    }
}

pub trait PortScanner {
    fn scan(&self) -> Result<Vec<DetectedPort>>;
}

/// Serial ports the OS knows about.
pub struct SystemPorts;

impl PortScanner for SystemPorts {
    fn scan(&self) -> Result<Vec<DetectedPort>> {
        let ports = tokio_serial::available_ports().context("enumerate serial ports")?;
        Ok(ports.into_iter().map(DetectedPort::from).collect())
    }
}

/// Board names autopilots typically enumerate with.
pub fn default_preferred_ports() -> Vec<String> {
    vec![
        "*FTDI*".into(),
        "*Arduino_Mega_2560*".into(),
        "*3D_Robotics*".into(),
        "*USB_to_UART*".into(),
        "*PX4*".into(),
        "*FMU*".into(),
        "*Gumstix*".into(),
    ]
}

/// Ports matching any of `preferred`; every scanned port when none match.
pub fn auto_detect(scanner: &dyn PortScanner, preferred: &[String]) -> Result<Vec<DetectedPort>> {
    let patterns: Vec<glob::Pattern> = preferred
        .iter()
        .filter_map(|p| match glob::Pattern::new(p) {
            Ok(pat) => Some(pat),
            Err(e) => {
                warn!("ignoring bad port pattern {:?}: {}", p, e);
                None
            }
        })
        .collect();

    let (matched, others): (Vec<_>, Vec<_>) = scanner
        .scan()?
        .into_iter()
        .partition(|p| is_preferred(p, &patterns));
    debug!("autodetect: {} preferred, {} other", matched.len(), others.len());

    if matched.is_empty() {
        Ok(others)
    } else {
        Ok(matched)
    }
}

fn is_preferred(port: &DetectedPort, patterns: &[glob::Pattern]) -> bool {
    // udev by-id names use '_' where USB strings have spaces
    let by_id = port.description.replace(' ', "_");
    let fields = [
        port.device.as_str(),
        port.description.as_str(),
        by_id.as_str(),
        port.hwid.as_str(),
    ];
    patterns
        .iter()
        .any(|pat| fields.iter().any(|f| pat.matches(f)))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub struct FixedPorts(pub Vec<DetectedPort>);

    impl PortScanner for FixedPorts {
        fn scan(&self) -> Result<Vec<DetectedPort>> {
            Ok(self.0.clone())
        }
    }

    pub fn port(device: &str, description: &str) -> DetectedPort {
        DetectedPort { device: device.into(), description: description.into(), hwid: "n/a".into() }
    }

    #[test]
    fn preferred_ports_win() {
        let scanner = FixedPorts(vec![
            port("/dev/ttyS0", "n/a"),
            port("/dev/ttyACM0", "3D Robotics PX4 FMU v2.x"),
            port("/dev/ttyUSB0", "FTDI FT232R USB UART"),
        ]);
        let found = auto_detect(&scanner, &default_preferred_ports()).unwrap();
        let devs: Vec<_> = found.iter().map(|p| p.device.as_str()).collect();
        assert_eq!(devs, ["/dev/ttyACM0", "/dev/ttyUSB0"]);
    }

    #[test]
    fn falls_back_to_everything() {
        let scanner = FixedPorts(vec![port("/dev/ttyS0", "n/a"), port("/dev/ttyS1", "n/a")]);
        let found = auto_detect(&scanner, &default_preferred_ports()).unwrap();
        assert_eq!(found.len(), 2);
    }

    #[test]
    fn nothing_found() {
        let found = auto_detect(&FixedPorts(vec![]), &default_preferred_ports()).unwrap();
        assert!(found.is_empty());
    }

    #[test]
    fn matches_device_path_and_bad_patterns_are_skipped() {
        let scanner = FixedPorts(vec![
            port("/dev/ttyS0", "n/a"),
            port("/dev/serial/by-id/usb-Gumstix_Overo-if00", "n/a"),
        ]);
        let prefs = vec!["[".to_string(), "*Gumstix*".to_string()];
        let found = auto_detect(&scanner, &prefs).unwrap();
        assert_eq!(found.len(), 1);
        assert!(found[0].device.ends_with("Overo-if00"));
    }

    #[test]
    fn display_lists_all_fields() {
        let p = port("/dev/ttyACM0", "PX4 FMU");
        assert_eq!(p.to_string(), "/dev/ttyACM0 : PX4 FMU : n/a");
    }
}
