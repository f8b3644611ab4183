//! Reboot an FCU by typing `reboot` into its MAVLink shell.

use anyhow::{Context, Result};
use std::io::Write;
use tracing::info;

use crate::autodetect::{auto_detect, PortScanner};
use crate::channel::ShellPort;
use crate::endpoint::Endpoint;
use crate::ShellConfig;

pub const DEFAULT_BAUDRATE: u32 = 57600;

#[derive(Debug, Clone)]
pub struct RebootArgs {
    /// Transport descriptor; auto-detected when absent.
    pub port: Option<String>,
    pub baudrate: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Rebooted,
    /// Auto-detection found no serial device; nothing was sent.
    NoDevice,
}

impl Outcome {
    /// Process exit status. A missing device is reported but still exits 0,
    /// which is what existing scripts around this tool expect.
    pub fn exit_status(self) -> u8 {
        match self {
            Outcome::Rebooted | Outcome::NoDevice => 0,
        }
    }
}

/// Pick the port to use, printing what auto-detection saw.
/// `None` means no device could be found.
pub fn resolve_port(
    args: &RebootArgs,
    cfg: &ShellConfig,
    scanner: &dyn PortScanner,
    out: &mut dyn Write,
) -> Result<Option<String>> {
    if let Some(port) = &args.port {
        return Ok(Some(port.clone()));
    }
    if cfg!(target_os = "macos") {
        return Ok(Some(cfg.macos_default_port.clone()));
    }

    let found = auto_detect(scanner, &cfg.preferred_ports)?;
    let Some(first) = found.first() else {
        writeln!(out, "Error: no serial connection found")?;
        return Ok(None);
    };
    if found.len() > 1 {
        writeln!(out, "Auto-detected serial ports are:")?;
        for p in &found {
            writeln!(out, " {}", p)?;
        }
    }
    writeln!(out, "Using port {}", first)?;
    Ok(Some(first.device.clone()))
}

/// Wake the shell with a newline, then ask it to reboot.
pub fn send_reboot(port: &mut dyn ShellPort, out: &mut dyn Write) -> Result<()> {
    port.write(b"\n").context("start shell")?;
    port.write(b"reboot").context("send reboot")?;
    writeln!(out, "FCU rebooting...")?;
    port.close().context("release shell")
}

pub fn run<P, F>(
    args: &RebootArgs,
    cfg: &ShellConfig,
    scanner: &dyn PortScanner,
    connect: F,
    out: &mut dyn Write,
) -> Result<Outcome>
where
    P: ShellPort,
    F: FnOnce(&Endpoint, &ShellConfig) -> Result<P>,
{
    let Some(port) = resolve_port(args, cfg, scanner, out)? else {
        return Ok(Outcome::NoDevice);
    };
    let endpoint = Endpoint::parse(&port, args.baudrate)
        .with_context(|| format!("bad port {:?}", port))?;

    writeln!(out, "Connecting to FCU...")?;
    info!("fc: connecting {}", endpoint);
    let mut shell = connect(&endpoint, cfg)?;

    send_reboot(&mut shell, out)?;
    info!("fc: reboot sent");
    Ok(Outcome::Rebooted)
}
