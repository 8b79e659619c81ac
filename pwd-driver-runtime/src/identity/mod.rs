//! Identity distribution strategies.
//!
//! Each strategy allocates an instance on the remote session system and makes
//! sure the instance's daemon ends up with a TLS identity the local client
//! trusts. The three variants mirror the deployed generations of the session
//! API and are selected through `strategy_factory`.

pub mod embedded;
pub mod push;
pub mod strategy_factory;
pub mod tar_archive;

use tracing::debug;

use crate::config::{HostEncoding, IdentityKind, RemoteEndpoint};
use crate::error::{DriverError, Result};
use crate::pki;
use crate::session::{AllocatedInstance, SessionClient};
use crate::store::{CA_CERT, CA_KEY, CertStore};

pub use strategy_factory::{strategy_for, strategy_from_env};

/// Inputs shared by every strategy for one create call.
pub struct ProvisionContext<'a> {
    pub client: &'a SessionClient,
    pub store: &'a CertStore,
    pub session_id: &'a str,
    /// Per-instance alias, sent to the API where it accepts one.
    pub alias: &'a str,
    /// Organization written into generated certificates.
    pub org: &'a str,
    pub host_encoding: HostEncoding,
}

impl ProvisionContext<'_> {
    pub fn endpoint(&self) -> &RemoteEndpoint {
        self.client.endpoint()
    }

    pub fn daemon_host(&self, ip: Option<&str>) -> Result<String> {
        self.host_encoding
            .daemon_host(self.endpoint(), self.session_id, self.alias, ip)
    }
}

#[async_trait::async_trait]
pub trait IdentityDistribution: Send + Sync {
    /// Allocate an instance and install its TLS identity.
    async fn provision(&self, ctx: &ProvisionContext<'_>) -> Result<AllocatedInstance>;

    fn kind(&self) -> IdentityKind;

    /// Whether the shared CA and client pair must exist locally before provisioning.
    fn needs_local_authority(&self) -> bool {
        false
    }

    /// Whether the instance expects a local SSH-capable key.
    fn needs_ssh_key(&self) -> bool {
        false
    }
}

/// Sign a server pair for `hosts` with the store's authority and keep a copy
/// in the machine directory.
pub(crate) async fn issue_server_pair(
    store: &CertStore,
    hosts: Vec<String>,
    org: &str,
) -> Result<(Vec<u8>, Vec<u8>)> {
    debug!(?hosts, "generating server certificate");
    let ca_cert = store.shared_path(CA_CERT);
    let ca_key = store.shared_path(CA_KEY);
    let org = org.to_string();
    let task_hosts = hosts.clone();

    // 2048-bit RSA generation is CPU-bound.
    let (cert, key) = tokio::task::spawn_blocking(move || {
        pki::generate_server_certificate(&task_hosts, &org, &ca_cert, &ca_key)
    })
    .await
    .map_err(|err| DriverError::Generation(format!("key generation task failed: {err}")))??;

    pki::ensure_covers(&cert, &hosts)?;
    store.write_server_pair(&cert, &key)?;
    Ok((cert, key))
}
