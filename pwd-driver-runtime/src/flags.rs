//! Create-time options accepted by the driver.
//!
//! Each option can be given as a flag or through its environment variable.
//! `DriverConfig::from_env` resolves options through this table.

use std::env;

use crate::{DEFAULT_API_PORT, DEFAULT_PWD_HOSTNAME, DEFAULT_TLS_PORT};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CreateFlag {
    pub name: &'static str,
    pub usage: &'static str,
    pub env_var: &'static str,
    pub default: Option<&'static str>,
}

impl CreateFlag {
    /// Environment value if set and non-empty, otherwise the flag default.
    pub fn resolve(&self) -> Option<String> {
        env::var(self.env_var)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .or_else(|| self.default.map(str::to_string))
    }
}

pub const URL: CreateFlag = CreateFlag {
    name: "pwd-url",
    usage: "PWD session URL (https://<host>/p/<session>); overrides session id and hostname",
    env_var: "PWD_URL",
    default: None,
};

pub const SESSION_ID: CreateFlag = CreateFlag {
    name: "pwd-session-id",
    usage: "PWD session id to create the instance",
    env_var: "PWD_SESSION_ID",
    default: None,
};

pub const HOSTNAME: CreateFlag = CreateFlag {
    name: "pwd-hostname",
    usage: "PWD hostname create machines from",
    env_var: "PWD_HOSTNAME",
    default: Some(DEFAULT_PWD_HOSTNAME),
};

pub const TLS_PORT: CreateFlag = CreateFlag {
    name: "pwd-ssl-port",
    usage: "PWD ssl port to connect to the daemon",
    env_var: "PWD_SSL_PORT",
    default: Some(DEFAULT_TLS_PORT),
};

pub const API_PORT: CreateFlag = CreateFlag {
    name: "pwd-port",
    usage: "PWD port to connect to the API",
    env_var: "PWD_PORT",
    default: Some(DEFAULT_API_PORT),
};

pub const IDENTITY: CreateFlag = CreateFlag {
    name: "pwd-identity",
    usage: "How the daemon TLS identity reaches the instance (tar, embedded, push)",
    env_var: "PWD_IDENTITY",
    default: Some("tar"),
};

pub const HOST_ENCODING: CreateFlag = CreateFlag {
    name: "pwd-host-encoding",
    usage: "Daemon URL host form (ip, alias); defaults to the identity's native form",
    env_var: "PWD_HOST_ENCODING",
    default: None,
};

static CREATE_FLAGS: [CreateFlag; 7] = [
    URL,
    SESSION_ID,
    HOSTNAME,
    TLS_PORT,
    API_PORT,
    IDENTITY,
    HOST_ENCODING,
];

pub fn create_flags() -> &'static [CreateFlag] {
    &CREATE_FLAGS
}
