//! Transport descriptors as typed on the command line.
//!
//! Accepted forms:
//! - `DEVICE[,BAUD]`  serial device, e.g. `/dev/ttyACM0,921600` or `COM4`
//! - `HOST:PORT`      UDP, listening (e.g. `0.0.0.0:14550`)
//! - `tcp:HOST:PORT`  TCP client
//! - `udp:`, `udpin:`, `udpout:`, `tcpin:` prefixes for the explicit variants

use std::fmt;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EndpointError {
    #[error("empty port descriptor")]
    Empty,
    #[error("invalid baud rate {0:?}")]
    BadBaud(String),
    #[error("expected HOST:PORT, got {0:?}")]
    BadHostPort(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    Serial { path: String, baud: u32 },
    UdpIn(String),
    UdpOut(String),
    TcpOut(String),
    TcpIn(String),
}

impl Endpoint {
    /// Parse a descriptor. `default_baud` applies to serial devices that do
    /// not carry their own `,BAUD` suffix; network forms ignore it.
    pub fn parse(s: &str, default_baud: u32) -> Result<Self, EndpointError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(EndpointError::Empty);
        }

        if let Some(rest) = s.strip_prefix("tcp:") {
            return Ok(Endpoint::TcpOut(host_port(rest)?));
        }
        if let Some(rest) = s.strip_prefix("tcpin:") {
            return Ok(Endpoint::TcpIn(host_port(rest)?));
        }
        if let Some(rest) = s.strip_prefix("udpout:") {
            return Ok(Endpoint::UdpOut(host_port(rest)?));
        }
        if let Some(rest) = s.strip_prefix("udpin:").or_else(|| s.strip_prefix("udp:")) {
            return Ok(Endpoint::UdpIn(host_port(rest)?));
        }
        if looks_like_host_port(s) {
            return Ok(Endpoint::UdpIn(s.to_string()));
        }

        let (path, baud) = match s.rsplit_once(',') {
            Some((path, baud)) => {
                let baud = baud
                    .trim()
                    .parse::<u32>()
                    .ok()
                    .filter(|b| *b > 0)
                    .ok_or_else(|| EndpointError::BadBaud(baud.to_string()))?;
                (path, baud)
            }
            None => (s, default_baud),
        };
        Ok(Endpoint::Serial { path: path.to_string(), baud })
    }

    /// Address string understood by `mavlink::connect`.
    pub fn mavlink_address(&self) -> String {
        match self {
            Endpoint::Serial { path, baud } => format!("serial:{}:{}", path, baud),
            Endpoint::UdpIn(a) => format!("udpin:{}", a),
            Endpoint::UdpOut(a) => format!("udpout:{}", a),
            Endpoint::TcpOut(a) => format!("tcpout:{}", a),
            Endpoint::TcpIn(a) => format!("tcpin:{}", a),
        }
    }

    pub fn is_serial(&self) -> bool {
        matches!(self, Endpoint::Serial { .. })
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Serial { path, baud } => write!(f, "{} @ {}", path, baud),
            other => f.write_str(&other.mavlink_address()),
        }
    }
}

fn host_port(s: &str) -> Result<String, EndpointError> {
    if looks_like_host_port(s) {
        Ok(s.to_string())
    } else {
        Err(EndpointError::BadHostPort(s.to_string()))
    }
}

// Device paths never parse as HOST:PORT because their "port" part is not a number.
fn looks_like_host_port(s: &str) -> bool {
    match s.rsplit_once(':') {
        Some((host, port)) => !host.is_empty() && !host.contains('/') && port.parse::<u16>().is_ok(),
        None => false,
    }
}
