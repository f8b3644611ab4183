use anyhow::{Context, Result};
use std::io::{self, Read, Write};
use std::time::Duration;
use tokio_serial::SerialPort;

use crate::channel::ShellPort;

/// A shell on a directly attached UART, e.g. a NuttX console cable.
pub struct LocalSerial {
    port: Option<Box<dyn SerialPort>>,
    name: String,
}

impl LocalSerial {
    pub fn open(dev: &str, baud: u32, timeout: Duration) -> Result<Self> {
        let port = tokio_serial::new(dev, baud)
            .timeout(timeout)
            .open()
            .with_context(|| format!("open serial device {}", dev))?;
        Ok(Self { port: Some(port), name: dev.to_string() })
    }

    fn port(&mut self) -> Result<&mut Box<dyn SerialPort>> {
        self.port
            .as_mut()
            .with_context(|| format!("serial device {} is closed", self.name))
    }
}

impl ShellPort for LocalSerial {
    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        let name = self.name.clone();
        self.port()?
            .write_all(bytes)
            .with_context(|| format!("write {}", name))
    }

    fn read(&mut self, n: usize) -> Result<Vec<u8>> {
        let name = self.name.clone();
        let mut buf = vec![0u8; n];
        match self.port()?.read(&mut buf) {
            Ok(got) => {
                buf.truncate(got);
                Ok(buf)
            }
            Err(e) if e.kind() == io::ErrorKind::TimedOut => Ok(Vec::new()),
            Err(e) => Err(e).with_context(|| format!("read {}", name)),
        }
    }

    fn close(&mut self) -> Result<()> {
        if let Some(mut port) = self.port.take() {
            port.flush().with_context(|| format!("flush {}", self.name))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_device_is_an_error() {
        let err = LocalSerial::open("/dev/does-not-exist-mavshell", 57600, Duration::from_millis(30))
            .err()
            .unwrap();
        assert!(format!("{:#}", err).contains("/dev/does-not-exist-mavshell"));
    }

    #[cfg(unix)]
    mod pty {
        use super::*;
        use crate::link::pty::fcu_pty;
        use std::time::Instant;

        fn open(path: &str) -> LocalSerial {
            LocalSerial::open(path, 57600, Duration::from_millis(50)).unwrap()
        }

        #[test]
        fn write_reaches_the_device() {
            let (mut master, path) = fcu_pty();
            let mut shell = open(&path);
            shell.write(b"help\n").unwrap();

            let mut buf = [0u8; 5];
            master.read_exact(&mut buf).unwrap();
            assert_eq!(&buf, b"help\n");
        }

        #[test]
        fn read_returns_device_output() {
            let (mut master, path) = fcu_pty();
            let mut shell = open(&path);
            master.write_all(b"nsh> ").unwrap();

            let start = Instant::now();
            let mut got = Vec::new();
            while got.len() < 5 && start.elapsed() < Duration::from_secs(2) {
                got.extend(shell.read(16).unwrap());
            }
            assert_eq!(got, b"nsh> ");
        }

        #[test]
        fn silent_device_reads_empty() {
            let (_master, path) = fcu_pty();
            let mut shell = open(&path);
            assert!(shell.read(16).unwrap().is_empty());
        }

        #[test]
        fn closed_port_rejects_io() {
            let (_master, path) = fcu_pty();
            let mut shell = open(&path);
            shell.close().unwrap();

            let err = shell.write(b"ls").unwrap_err();
            assert!(err.to_string().contains("is closed"));
            assert!(shell.read(1).is_err());
            shell.close().unwrap();
        }
    }
}
