//! A serial port emulated over MAVLink SERIAL_CONTROL messages.

use anyhow::{Context, Result};
use mavlink::common::{MavMessage, SerialControlDev};
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::info;

use crate::endpoint::Endpoint;
use crate::frame;
use crate::link::{FcLink, MavTransport};
use crate::ShellConfig;

/// Byte-stream view of a shell, whether it sits behind a UART or a MAVLink link.
pub trait ShellPort {
    fn write(&mut self, bytes: &[u8]) -> Result<()>;
    /// Up to `n` bytes of output; empty when nothing arrived.
    fn read(&mut self, n: usize) -> Result<Vec<u8>>;
    fn close(&mut self) -> Result<()>;
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChannelError {
    #[error("virtual serial channel is closed")]
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Open,
    Closed,
}

pub struct VirtualSerial<T: MavTransport> {
    link: T,
    port: SerialControlDev,
    verbosity: u8,
    poll_timeout: Duration,
    rx: VecDeque<u8>,
    state: ChannelState,
}

impl VirtualSerial<FcLink> {
    /// Open `endpoint`, wait for the FCU heartbeat and lock `cfg.devnum`.
    pub fn connect(endpoint: &Endpoint, cfg: &ShellConfig) -> Result<Self> {
        let port = frame::device(cfg.devnum)?;
        let mut chan = Self::new(FcLink::open(endpoint, cfg)?, port, cfg.verbosity);
        chan.poll_timeout = cfg.poll_timeout();
        chan.debug(&format!("Connecting with MAVLink to {} ...", endpoint), 1);
        chan.link
            .wait_heartbeat(cfg.heartbeat_timeout())
            .with_context(|| format!("waiting for heartbeat on {}", endpoint))?;
        info!("fc: heartbeat from {}", endpoint);
        chan.debug("HEARTBEAT OK\n", 1);
        chan.debug("Locked serial device\n", 1);
        Ok(chan)
    }
}

impl<T: MavTransport> VirtualSerial<T> {
    /// Wrap an already-connected transport.
    pub fn new(link: T, port: SerialControlDev, verbosity: u8) -> Self {
        Self {
            link,
            port,
            verbosity,
            poll_timeout: Duration::from_millis(30),
            rx: VecDeque::new(),
            state: ChannelState::Open,
        }
    }

    pub fn state(&self) -> ChannelState {
        self.state
    }

    /// Bytes received but not yet read.
    pub fn buffered(&self) -> usize {
        self.rx.len()
    }

    pub fn transport(&self) -> &T {
        &self.link
    }

    /// Print diagnostics when the channel verbosity is at least `level`.
    pub fn debug(&self, msg: &str, level: u8) {
        if self.verbosity >= level {
            println!("{}", msg);
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.state == ChannelState::Closed {
            return Err(ChannelError::Closed.into());
        }
        Ok(())
    }

    /// One poll window for a SERIAL_CONTROL frame carrying data.
    fn recv(&mut self) -> Result<()> {
        let deadline = Instant::now() + self.poll_timeout;
        loop {
            let left = deadline.saturating_duration_since(Instant::now());
            let Some(msg) = self.link.recv_timeout(left)? else { return Ok(()) };
            if let Some(sc) = frame::as_data_frame(&msg) {
                let data = frame::payload(sc);
                if self.verbosity > 2 {
                    println!("{:?} count={} data={}", sc.device, sc.count, hex::encode(data));
                }
                self.rx.extend(data);
                return Ok(());
            }
            if left.is_zero() {
                return Ok(());
            }
        }
    }
}

impl<T: MavTransport> ShellPort for VirtualSerial<T> {
    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        self.ensure_open()?;
        if let Some(first) = bytes.first() {
            self.debug(
                &format!(
                    "sending '{}' (0x{:02x}) of len {}\n",
                    String::from_utf8_lossy(bytes),
                    first,
                    bytes.len()
                ),
                2,
            );
        }
        for f in frame::data_frames(self.port, bytes) {
            self.link.send(&MavMessage::SERIAL_CONTROL(f))?;
        }
        Ok(())
    }

    fn read(&mut self, n: usize) -> Result<Vec<u8>> {
        self.ensure_open()?;
        if self.rx.is_empty() {
            self.recv()?;
        }
        let n = n.min(self.rx.len());
        let out: Vec<u8> = self.rx.drain(..n).collect();
        if self.verbosity >= 2 {
            for b in &out {
                self.debug(&format!("read 0x{:x}", b), 2);
            }
        }
        Ok(out)
    }

    fn close(&mut self) -> Result<()> {
        self.link
            .send(&MavMessage::SERIAL_CONTROL(frame::release_frame(self.port)))?;
        self.state = ChannelState::Closed;
        Ok(())
    }
}
