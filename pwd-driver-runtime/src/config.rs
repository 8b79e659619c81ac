use std::env;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{DriverError, Result};
use crate::flags;

/// How the daemon's TLS identity is installed on a new instance.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityKind {
    /// Fetch a tar archive of shared keys before allocating the instance.
    #[default]
    Tar,
    /// Send the full bundle in the instance creation request.
    Embedded,
    /// Allocate first, then push the server pair to the instance.
    Push,
}

impl IdentityKind {
    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_lowercase().as_str() {
            "tar" => Ok(IdentityKind::Tar),
            "embedded" => Ok(IdentityKind::Embedded),
            "push" => Ok(IdentityKind::Push),
            other => Err(DriverError::Configuration(format!(
                "Unknown identity distribution '{other}'. Supported values: tar, embedded, push"
            ))),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            IdentityKind::Tar => "tar",
            IdentityKind::Embedded => "embedded",
            IdentityKind::Push => "push",
        }
    }
}

/// Encoding of the instance host inside the daemon URL.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostEncoding {
    /// `ip10_0_0_5-2375.<hostname>`
    IpEmbedded,
    /// `pwd<alias>-<session prefix>-2375.<hostname>`
    SessionAlias,
}

impl HostEncoding {
    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_lowercase().as_str() {
            "ip" => Ok(HostEncoding::IpEmbedded),
            "alias" => Ok(HostEncoding::SessionAlias),
            other => Err(DriverError::Configuration(format!(
                "Unknown host encoding '{other}'. Supported values: ip, alias"
            ))),
        }
    }

    /// Host part of the daemon URL. The IP form needs the allocated address.
    pub fn daemon_host(
        self,
        endpoint: &RemoteEndpoint,
        session: &str,
        alias: &str,
        ip: Option<&str>,
    ) -> Result<String> {
        match self {
            HostEncoding::IpEmbedded => {
                let ip = ip.filter(|ip| !ip.is_empty()).ok_or_else(|| {
                    DriverError::Configuration(
                        "IP host encoding requires an allocated instance address".into(),
                    )
                })?;
                Ok(format!(
                    "ip{}-{}.{}",
                    ip.replace('.', "_"),
                    crate::DAEMON_PORT,
                    endpoint.hostname
                ))
            }
            HostEncoding::SessionAlias => {
                if alias.is_empty() {
                    return Err(DriverError::Configuration(
                        "alias host encoding requires an instance alias".into(),
                    ));
                }
                Ok(format!(
                    "pwd{alias}-{}-{}.{}",
                    session_prefix(session),
                    crate::DAEMON_PORT,
                    endpoint.hostname
                ))
            }
        }
    }

    /// The form each identity variant was deployed with.
    pub fn native_for(kind: IdentityKind) -> Self {
        match kind {
            IdentityKind::Tar | IdentityKind::Push => HostEncoding::IpEmbedded,
            IdentityKind::Embedded => HostEncoding::SessionAlias,
        }
    }
}

/// `tcp://<host>:<tls port>`
pub fn daemon_url(host: &str, tls_port: u16) -> String {
    format!("tcp://{host}:{tls_port}")
}

/// First eight characters of the session id, or all of it when shorter.
pub fn session_prefix(session: &str) -> &str {
    match session.char_indices().nth(8) {
        Some((end, _)) => &session[..end],
        None => session,
    }
}

/// Fresh instance alias: a v4 UUID without dashes.
pub fn new_alias() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// SSH user the session system assigns to an instance: `10-0-0-5-<session prefix>`.
pub fn derive_ssh_user(ip: &str, session: &str) -> String {
    format!("{}-{}", ip.replace('.', "-"), session_prefix(session))
}

/// Split a session URL such as `https://labs.play-with-docker.com/p/<session>`
/// into its hostname and session id.
pub fn parse_session_url(raw: &str) -> Result<(String, String)> {
    let incorrect = || DriverError::Configuration(format!("Incorrect PWD URL '{raw}'"));
    let url = reqwest::Url::parse(raw.trim()).map_err(|_| incorrect())?;
    let hostname = url
        .host_str()
        .filter(|host| !host.is_empty())
        .ok_or_else(incorrect)?
        .to_string();
    let session = url
        .path()
        .strip_prefix("/p/")
        .map(|rest| rest.trim_end_matches('/'))
        .filter(|session| !session.is_empty() && !session.contains('/'))
        .ok_or_else(incorrect)?
        .to_string();
    Ok((hostname, session))
}

/// How the driver tells the host tool to stop SSH provisioning after create.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DowngradeMode {
    /// Answer driver-name queries with the sentinel name after creation.
    #[default]
    QueryCounter,
    /// Always answer the real name; callers check `remote_provisioning_disabled`.
    CapabilityFlag,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteEndpoint {
    pub hostname: String,
    pub api_port: u16,
    pub tls_port: u16,
}

impl RemoteEndpoint {
    /// Base URL of the session management API.
    pub fn api_base(&self) -> String {
        format!("http://{}:{}", self.hostname, self.api_port)
    }
}

impl Default for RemoteEndpoint {
    fn default() -> Self {
        Self {
            hostname: crate::DEFAULT_PWD_HOSTNAME.to_string(),
            api_port: 80,
            tls_port: 443,
        }
    }
}

/// Everything a provisioning run needs before `create` is called.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverConfig {
    pub session_id: String,
    pub endpoint: RemoteEndpoint,
    pub machine_name: String,
    pub store_path: PathBuf,
    pub identity: IdentityKind,
    pub host_encoding: HostEncoding,
    #[serde(default)]
    pub downgrade: DowngradeMode,
}

impl DriverConfig {
    pub fn new(
        session_id: impl Into<String>,
        machine_name: impl Into<String>,
        store_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            endpoint: RemoteEndpoint::default(),
            machine_name: machine_name.into(),
            store_path: store_path.into(),
            identity: IdentityKind::Tar,
            host_encoding: HostEncoding::native_for(IdentityKind::Tar),
            downgrade: DowngradeMode::QueryCounter,
        }
    }

    /// Switch the identity variant, moving the host encoding along with it.
    pub fn with_identity(mut self, identity: IdentityKind) -> Self {
        self.identity = identity;
        self.host_encoding = HostEncoding::native_for(identity);
        self
    }

    /// Build a configuration from the create-flag environment variables.
    ///
    /// The store root comes from `MACHINE_STORAGE_PATH`, falling back to the
    /// host tool's default (which `validate` then rejects).
    /// A session URL (`PWD_URL`) takes precedence over the separate session id
    /// and hostname options.
    pub fn from_env(machine_name: &str) -> Result<Self> {
        let (hostname, session_id) = match flags::URL.resolve() {
            Some(url) => parse_session_url(&url)?,
            None => (
                flags::HOSTNAME
                    .resolve()
                    .unwrap_or_else(|| crate::DEFAULT_PWD_HOSTNAME.to_string()),
                flags::SESSION_ID.resolve().unwrap_or_default(),
            ),
        };
        let tls_port = parse_port(&flags::TLS_PORT)?;
        let api_port = parse_port(&flags::API_PORT)?;
        let identity = match flags::IDENTITY.resolve() {
            Some(value) => IdentityKind::parse(&value)?,
            None => IdentityKind::default(),
        };
        let host_encoding = match flags::HOST_ENCODING.resolve() {
            Some(value) => HostEncoding::parse(&value)?,
            None => HostEncoding::native_for(identity),
        };
        let store_path = env::var("MACHINE_STORAGE_PATH")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from)
            .or_else(default_store_path)
            .ok_or_else(|| {
                DriverError::Configuration(
                    "Cannot resolve a storage path: set MACHINE_STORAGE_PATH".into(),
                )
            })?;

        Ok(Self {
            session_id,
            endpoint: RemoteEndpoint {
                hostname,
                api_port,
                tls_port,
            },
            machine_name: machine_name.to_string(),
            store_path,
            identity,
            host_encoding,
            downgrade: DowngradeMode::default(),
        })
    }

    /// Precondition gate run before any lifecycle operation touches the network.
    pub fn validate(&self) -> Result<()> {
        if default_store_path().is_some_and(|default| default == self.store_path) {
            return Err(DriverError::Configuration(
                "Default storage path is discouraged when using PWD driver. \
                 Use -s flag or MACHINE_STORAGE_PATH env variable to set one"
                    .into(),
            ));
        }
        if self.session_id.trim().is_empty() {
            return Err(DriverError::Configuration(
                "Session Id must be specified".into(),
            ));
        }
        if self.machine_name.trim().is_empty() {
            return Err(DriverError::Configuration(
                "Machine name must be specified".into(),
            ));
        }
        if self.identity == IdentityKind::Embedded
            && self.host_encoding == HostEncoding::IpEmbedded
        {
            return Err(DriverError::Configuration(
                "Embedded identity is generated before the instance IP is known; \
                 use the alias host encoding"
                    .into(),
            ));
        }
        Ok(())
    }
}

fn parse_port(flag: &flags::CreateFlag) -> Result<u16> {
    let raw = flag.resolve().unwrap_or_default();
    raw.trim().parse::<u16>().map_err(|_| {
        DriverError::Configuration(format!("Invalid {} '{raw}'", flag.env_var))
    })
}

pub fn home_dir() -> Option<PathBuf> {
    env::var_os("HOME")
        .or_else(|| env::var_os("USERPROFILE"))
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

/// The host tool's shared store root, `<home>/.docker/machine`.
pub fn default_store_path() -> Option<PathBuf> {
    home_dir().map(|home| home.join(".docker").join("machine"))
}
