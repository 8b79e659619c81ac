//! Play-with-Docker machine driver runtime.
//!
//! Allocates container-engine instances inside a remote Play-with-Docker
//! session and equips each one with a TLS identity the local client trusts.
//! The `driver` module holds the lifecycle state machine; `identity` holds the
//! three ways the daemon's certificate reaches the instance.

pub mod config;
pub mod driver;
pub mod error;
pub mod flags;
pub mod http;
pub mod identity;
pub mod pki;
pub mod session;
pub mod store;

pub use config::{DowngradeMode, DriverConfig, HostEncoding, IdentityKind, RemoteEndpoint};
pub use driver::{Driver, DriverRecord, DriverState, Instance, MachineState};
pub use error::{DriverError, Result};
pub use identity::{IdentityDistribution, strategy_for, strategy_from_env};
pub use store::{CertStore, CertificateBundle};

pub const DRIVER_NAME: &str = "pwd";
/// Reported in place of `DRIVER_NAME` once remote provisioning is suppressed.
pub const SENTINEL_DRIVER_NAME: &str = "none";

pub const DEFAULT_PWD_HOSTNAME: &str = "play-with-docker.com";
pub const DEFAULT_TLS_PORT: &str = "443";
pub const DEFAULT_API_PORT: &str = "80";
/// Plain daemon port, encoded into IP-form instance hostnames.
pub const DAEMON_PORT: u16 = 2375;
