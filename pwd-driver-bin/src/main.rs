//! Command-line runner for the Play-with-Docker machine driver.
//!
//! Each invocation loads the machine's persisted record, runs one lifecycle
//! operation or query, and writes the record back. Query output goes to
//! stdout; logs go to stderr.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use pwd_driver_runtime::config::{default_store_path, parse_session_url};
use pwd_driver_runtime::flags::create_flags;
use pwd_driver_runtime::{
    DEFAULT_PWD_HOSTNAME, Driver, DriverConfig, DriverError, DriverState, HostEncoding,
    IdentityKind, RemoteEndpoint,
};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "pwd-machine", about = "Provision Play-with-Docker instances", version)]
struct Cli {
    #[command(flatten)]
    options: DriverArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug, Clone)]
struct DriverArgs {
    #[arg(
        long = "machine",
        global = true,
        env = "PWD_MACHINE_NAME",
        default_value = "default",
        help = "Machine name; selects the record under <store>/machines"
    )]
    machine: String,

    #[arg(
        short = 's',
        long = "storage-path",
        global = true,
        env = "MACHINE_STORAGE_PATH",
        value_name = "PATH",
        help = "Store root for certificates and machine records"
    )]
    storage_path: Option<PathBuf>,

    #[arg(
        long = "pwd-url",
        global = true,
        env = "PWD_URL",
        value_name = "URL",
        help = "Session URL (https://<host>/p/<session>); overrides session id and hostname"
    )]
    url: Option<String>,

    #[arg(long = "pwd-session-id", global = true, env = "PWD_SESSION_ID", default_value = "")]
    session_id: String,

    #[arg(
        long = "pwd-hostname",
        global = true,
        env = "PWD_HOSTNAME",
        default_value = DEFAULT_PWD_HOSTNAME
    )]
    hostname: String,

    #[arg(long = "pwd-ssl-port", global = true, env = "PWD_SSL_PORT", default_value_t = 443)]
    tls_port: u16,

    #[arg(long = "pwd-port", global = true, env = "PWD_PORT", default_value_t = 80)]
    api_port: u16,

    #[arg(
        long = "pwd-identity",
        global = true,
        env = "PWD_IDENTITY",
        default_value = "tar",
        value_parser = parse_identity
    )]
    identity: IdentityKind,

    #[arg(
        long = "pwd-host-encoding",
        global = true,
        env = "PWD_HOST_ENCODING",
        value_parser = parse_host_encoding
    )]
    host_encoding: Option<HostEncoding>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Allocate an instance and install its TLS identity
    Create,
    /// Delete the instance from the session
    Rm,
    /// Print the daemon URL
    Url,
    /// Print the instance IP address
    Ip,
    /// Print the machine state
    Status,
    /// Print the driver type name
    DriverName,
    /// List the create flags and their environment variables
    Flags,
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("{0}")]
    Driver(#[from] DriverError),
    #[error("cannot resolve a storage path; pass -s or set MACHINE_STORAGE_PATH")]
    NoStorePath,
}

fn parse_identity(value: &str) -> Result<IdentityKind, String> {
    IdentityKind::parse(value).map_err(|err| err.to_string())
}

fn parse_host_encoding(value: &str) -> Result<HostEncoding, String> {
    HostEncoding::parse(value).map_err(|err| err.to_string())
}

impl DriverArgs {
    fn to_config(&self) -> Result<DriverConfig, CliError> {
        let store_path = self
            .storage_path
            .clone()
            .or_else(default_store_path)
            .ok_or(CliError::NoStorePath)?;
        let (hostname, session_id) = match self.url.as_deref().filter(|url| !url.trim().is_empty()) {
            Some(url) => parse_session_url(url)?,
            None => (self.hostname.clone(), self.session_id.clone()),
        };
        let mut config = DriverConfig::new(&session_id, &self.machine, store_path)
            .with_identity(self.identity);
        if let Some(encoding) = self.host_encoding {
            config.host_encoding = encoding;
        }
        config.endpoint = RemoteEndpoint {
            hostname,
            api_port: self.api_port,
            tls_port: self.tls_port,
        };
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    setup_log();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(%err, "command failed");
            eprintln!("Error: {err}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    if let Command::Flags = cli.command {
        print_flags();
        return Ok(());
    }

    let config = cli.options.to_config()?;
    let mut driver = Driver::load(config.clone())?;

    match cli.command {
        Command::Create => {
            if driver.state() == DriverState::Configured {
                driver.set_config(config)?;
            }
            driver.create().await?;
            info!(machine = %driver.get_machine_name()?, "machine created");
            println!("{}", driver.get_url()?);
        }
        Command::Rm => {
            driver.remove().await?;
            info!(machine = %driver.get_machine_name()?, "machine removed");
        }
        Command::Url => println!("{}", driver.get_url()?),
        Command::Ip => println!("{}", driver.get_ip()?),
        Command::Status => println!("{}", driver.get_state()),
        Command::DriverName => println!("{}", driver.driver_name()),
        Command::Flags => {}
    }
    Ok(())
}

fn print_flags() {
    for flag in create_flags() {
        println!(
            "--{:<20} {:<20} {:<22} {}",
            flag.name,
            flag.env_var,
            flag.default.unwrap_or("-"),
            flag.usage
        );
    }
}

fn setup_log() {
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::{EnvFilter, fmt};
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .try_init()
        .is_err()
    {}
}
