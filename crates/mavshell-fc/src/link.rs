use anyhow::{Context, Result};
use mavlink::peek_reader::PeekReader;
use mavlink::{common::MavMessage, error::MessageReadError, MavConnection, MavHeader, MavlinkVersion};
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender, TrySendError};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio_serial::SerialPort;
use tracing::{debug, info, warn};

use crate::endpoint::Endpoint;
use crate::ShellConfig;

const RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Serial reads give up after this long so a poll window can end on time.
const SERIAL_READ_SLICE: Duration = Duration::from_millis(10);

/// Messages the network reader may hold before it starts dropping them.
const RX_QUEUE: usize = 256;

/// Message-level access to a MAVLink peer.
pub trait MavTransport {
    fn send(&mut self, msg: &MavMessage) -> Result<()>;

    /// Next incoming message, or `None` once `timeout` has passed.
    fn recv_timeout(&mut self, timeout: Duration) -> Result<Option<MavMessage>>;

    /// Block until the peer announces itself. `None` waits forever.
    fn wait_heartbeat(&mut self, timeout: Option<Duration>) -> Result<()> {
        let start = Instant::now();
        loop {
            let slice = match timeout {
                Some(t) => match t.checked_sub(start.elapsed()) {
                    Some(left) if !left.is_zero() => left,
                    _ => anyhow::bail!("no heartbeat within {:?}", t),
                },
                None => Duration::from_secs(1),
            };
            if let Some(msg) = self.recv_timeout(slice)? {
                if matches!(msg, MavMessage::HEARTBEAT(_)) {
                    return Ok(());
                }
            }
        }
    }
}

/// A live MAVLink connection to one FCU.
pub struct FcLink {
    io: LinkIo,
    hdr: MavHeader,
}

enum LinkIo {
    Serial(SerialIo),
    Net(NetIo),
}

impl FcLink {
    pub fn open(endpoint: &Endpoint, cfg: &ShellConfig) -> Result<Self> {
        let io = match endpoint {
            Endpoint::Serial { path, baud } => {
                LinkIo::Serial(SerialIo::open(path, *baud, cfg.autoreconnect)?)
            }
            other => LinkIo::Net(NetIo::open(other.mavlink_address(), cfg.autoreconnect)?),
        };
        info!("mavlink: connected {}", endpoint);
        Ok(Self {
            io,
            hdr: MavHeader { system_id: cfg.sys_id, component_id: cfg.comp_id, sequence: 0 },
        })
    }
}

impl MavTransport for FcLink {
    fn send(&mut self, msg: &MavMessage) -> Result<()> {
        self.hdr.sequence = self.hdr.sequence.wrapping_add(1);
        match &mut self.io {
            LinkIo::Serial(s) => s.send(self.hdr, msg),
            LinkIo::Net(n) => n.send(&self.hdr, msg),
        }
    }

    fn recv_timeout(&mut self, timeout: Duration) -> Result<Option<MavMessage>> {
        match &mut self.io {
            LinkIo::Serial(s) => s.recv_timeout(timeout),
            LinkIo::Net(n) => n.recv_timeout(timeout),
        }
    }
}

/// Serial links are read on the caller's thread. The port is split with
/// `try_clone` so writes never wait on a read in progress.
struct SerialIo {
    path: String,
    baud: u32,
    autoreconnect: bool,
    reader: PeekReader<Box<dyn SerialPort>>,
    writer: Box<dyn SerialPort>,
}

impl SerialIo {
    fn open(path: &str, baud: u32, autoreconnect: bool) -> Result<Self> {
        let (reader, writer) = open_split(path, baud)?;
        Ok(Self { path: path.to_string(), baud, autoreconnect, reader, writer })
    }

    fn send(&mut self, hdr: MavHeader, msg: &MavMessage) -> Result<()> {
        mavlink::write_versioned_msg(&mut self.writer, MavlinkVersion::V2, hdr, msg)
            .with_context(|| format!("mavlink send {}", self.path))?;
        Ok(())
    }

    fn recv_timeout(&mut self, timeout: Duration) -> Result<Option<MavMessage>> {
        let deadline = Instant::now() + timeout;
        loop {
            match mavlink::read_v2_msg::<MavMessage, _>(&mut self.reader) {
                Ok((_hdr, msg)) => return Ok(Some(msg)),
                Err(MessageReadError::Io(e)) if transient(&e) => {}
                Err(MessageReadError::Io(e)) => {
                    if !self.autoreconnect {
                        return Err(e).with_context(|| format!("mavlink read {}", self.path));
                    }
                    warn!("mavlink {}: {}; reconnecting", self.path, e);
                    self.reconnect();
                }
                Err(e) => debug!("mavlink parse error: {:?}", e),
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
        }
    }

    fn reconnect(&mut self) {
        std::thread::sleep(RECONNECT_DELAY);
        match open_split(&self.path, self.baud) {
            Ok((reader, writer)) => {
                self.reader = reader;
                self.writer = writer;
                info!("mavlink: reconnected {}", self.path);
            }
            Err(e) => warn!("mavlink reconnect {} failed: {:#}", self.path, e),
        }
    }
}

type SerialHalves = (PeekReader<Box<dyn SerialPort>>, Box<dyn SerialPort>);

fn open_split(path: &str, baud: u32) -> Result<SerialHalves> {
    let port = tokio_serial::new(path, baud)
        .timeout(SERIAL_READ_SLICE)
        .open()
        .with_context(|| format!("open fc serial device {}", path))?;
    let writer = port
        .try_clone()
        .with_context(|| format!("clone fc serial device {}", path))?;
    Ok((PeekReader::new(port), writer))
}

type SharedConn = Arc<dyn MavConnection<MavMessage> + Send + Sync>;

/// UDP and TCP connections lock their read and write halves separately, so a
/// reader thread parked in `recv` does not hold up sends.
struct NetIo {
    conn: Arc<Mutex<SharedConn>>,
    rx: Receiver<MavMessage>,
    shutdown: Arc<AtomicBool>,
}

impl NetIo {
    fn open(url: String, autoreconnect: bool) -> Result<Self> {
        let conn: SharedConn = Arc::from(
            mavlink::connect::<MavMessage>(&url)
                .with_context(|| format!("mavlink connect {}", url))?,
        );
        let conn = Arc::new(Mutex::new(conn));
        let shutdown = Arc::new(AtomicBool::new(false));
        let (tx, rx) = mpsc::sync_channel(RX_QUEUE);
        let reader = Reader { conn: conn.clone(), url, autoreconnect, shutdown: shutdown.clone() };
        std::thread::Builder::new()
            .name("mavlink-rx".into())
            .spawn(move || reader.run(tx))
            .context("spawn mavlink reader")?;
        Ok(Self { conn, rx, shutdown })
    }

    fn send(&mut self, hdr: &MavHeader, msg: &MavMessage) -> Result<()> {
        let conn = lock(&self.conn).clone();
        conn.send(hdr, msg).context("mavlink send")?;
        Ok(())
    }

    fn recv_timeout(&mut self, timeout: Duration) -> Result<Option<MavMessage>> {
        match self.rx.recv_timeout(timeout) {
            Ok(msg) => Ok(Some(msg)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => anyhow::bail!("mavlink link closed"),
        }
    }
}

impl Drop for NetIo {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }
}

struct Reader {
    conn: Arc<Mutex<SharedConn>>,
    url: String,
    autoreconnect: bool,
    shutdown: Arc<AtomicBool>,
}

impl Reader {
    fn run(self, tx: SyncSender<MavMessage>) {
        while !self.shutdown.load(Ordering::Relaxed) {
            let conn = lock(&self.conn).clone();
            match conn.recv() {
                Ok((_hdr, msg)) => match tx.try_send(msg) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => debug!("mavlink rx queue full, dropping message"),
                    Err(TrySendError::Disconnected(_)) => return,
                },
                Err(MessageReadError::Io(e)) if transient(&e) => {}
                Err(MessageReadError::Io(e)) => {
                    if !self.autoreconnect {
                        warn!("mavlink {}: {}", self.url, e);
                        return;
                    }
                    warn!("mavlink {}: {}; reconnecting", self.url, e);
                    self.reconnect();
                }
                Err(e) => debug!("mavlink parse error: {:?}", e),
            }
        }
    }

    fn reconnect(&self) {
        std::thread::sleep(RECONNECT_DELAY);
        match mavlink::connect::<MavMessage>(&self.url) {
            Ok(c) => {
                *lock(&self.conn) = Arc::from(c);
                info!("mavlink: reconnected {}", self.url);
            }
            Err(e) => warn!("mavlink reconnect {} failed: {}", self.url, e),
        }
    }
}

fn transient(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut | io::ErrorKind::Interrupted
    )
}

fn lock(m: &Mutex<SharedConn>) -> std::sync::MutexGuard<'_, SharedConn> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
