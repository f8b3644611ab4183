pub mod autodetect;
pub mod channel;
pub mod endpoint;
pub mod frame;
pub mod link;
pub mod local;
pub mod reboot;

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// `SERIAL_CONTROL_DEV_SHELL`: the NuttX shell on PX4 autopilots.
pub const SHELL_DEVNUM: u8 = 10;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ShellConfig {
    /// SERIAL_CONTROL device number to open on the FCU.
    pub devnum: u8,

    /// Channel debug verbosity. 0 is silent, 2 traces bytes, 3 dumps frames.
    pub verbosity: u8,

    /// Receive poll window per read, in milliseconds.
    pub poll_timeout_ms: u64,

    /// Give up waiting for the FCU heartbeat after this long.
    /// Unset means wait forever.
    pub heartbeat_timeout_ms: Option<u64>,

    /// MAVLink ids we send with (GCS side). 255/0 matches common GCS tools.
    pub sys_id: u8,
    pub comp_id: u8,

    /// Reopen the link when the transport drops.
    pub autoreconnect: bool,

    /// Glob patterns tried against detected serial ports, in preference order.
    pub preferred_ports: Vec<String>,

    /// Port used on macOS instead of scanning.
    pub macos_default_port: String,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            devnum: SHELL_DEVNUM,
            verbosity: 0,
            poll_timeout_ms: 30,
            heartbeat_timeout_ms: None,
            sys_id: 255,
            comp_id: 0,
            autoreconnect: true,
            preferred_ports: autodetect::default_preferred_ports(),
            macos_default_port: "/dev/tty.usbmodem01".into(),
        }
    }
}

impl ShellConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let s = std::fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        toml::from_str(&s).context("parse config toml")
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }

    pub fn heartbeat_timeout(&self) -> Option<Duration> {
        self.heartbeat_timeout_ms.map(Duration::from_millis)
    }
}
