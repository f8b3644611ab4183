use anyhow::Result;
use clap::Parser;
use std::process::ExitCode;
use tracing::info;

use mavshell_fc::autodetect::SystemPorts;
use mavshell_fc::channel::VirtualSerial;
use mavshell_fc::link::FcLink;
use mavshell_fc::reboot::{self, RebootArgs, DEFAULT_BAUDRATE};
use mavshell_fc::ShellConfig;

/// Reboot a flight controller through its MAVLink shell.
#[derive(Debug, Parser)]
#[command(name = "reboot-mavlink-shell", version)]
struct Cli {
    /// Mavlink port name: serial: DEVICE[,BAUD], udp: IP:PORT, tcp: tcp:IP:PORT.
    /// Eg: /dev/ttyUSB0 or 0.0.0.0:14550. Auto-detect serial if not given.
    #[arg(value_name = "PORT")]
    port: Option<String>,

    /// Mavlink port baud rate
    #[arg(short, long, default_value_t = DEFAULT_BAUDRATE)]
    baudrate: u32,

    /// Optional TOML config overriding devnum, timeouts and port patterns.
    #[arg(long)]
    config: Option<String>,

    /// Shell channel debug output; repeat for more.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let mut cfg = match &cli.config {
        Some(path) => ShellConfig::load(path)?,
        None => ShellConfig::default(),
    };
    cfg.verbosity = cfg.verbosity.max(cli.verbose);

    let args = RebootArgs { port: cli.port, baudrate: cli.baudrate };
    let mut stdout = std::io::stdout();
    let outcome = reboot::run(
        &args,
        &cfg,
        &SystemPorts,
        VirtualSerial::<FcLink>::connect,
        &mut stdout,
    )?;
    info!("done: {:?}", outcome);

    Ok(ExitCode::from(outcome.exit_status()))
}
