//! Client for the remote session management API.
//!
//! Every call is a single HTTP round trip. A connection failure or any
//! status other than 200 comes back as `DriverError::Transport`; retries are
//! the host tool's business.

use reqwest::{Method, Url};
use serde::{Deserialize, Serialize, Serializer};
use tracing::debug;

use crate::config::RemoteEndpoint;
use crate::error::{DriverError, Result};
use crate::http::{build_url, send, send_json};
use crate::store::CertificateBundle;

/// Instance as allocated by the remote, before the driver derives its URL.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct AllocatedInstance {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "IP")]
    pub ip: String,
    #[serde(rename = "SshUser", default)]
    pub ssh_user: Option<String>,
}

#[derive(Serialize)]
struct IdentityRequest<'a> {
    #[serde(rename = "Alias")]
    alias: &'a str,
    #[serde(rename = "ServerCert", serialize_with = "base64_bytes")]
    server_cert: &'a [u8],
    #[serde(rename = "ServerKey", serialize_with = "base64_bytes")]
    server_key: &'a [u8],
    #[serde(rename = "CACert", serialize_with = "base64_bytes")]
    ca_cert: &'a [u8],
    #[serde(rename = "Cert", serialize_with = "base64_bytes")]
    cert: &'a [u8],
    #[serde(rename = "Key", serialize_with = "base64_bytes")]
    key: &'a [u8],
}

#[derive(Serialize)]
struct PushKeysRequest<'a> {
    #[serde(serialize_with = "base64_bytes")]
    server_cert: &'a [u8],
    #[serde(serialize_with = "base64_bytes")]
    server_key: &'a [u8],
}

fn base64_bytes<S: Serializer>(bytes: &[u8], serializer: S) -> std::result::Result<S::Ok, S::Error> {
    use base64::Engine as _;
    serializer.serialize_str(&base64::engine::general_purpose::STANDARD.encode(bytes))
}

#[derive(Clone, Debug)]
pub struct SessionClient {
    endpoint: RemoteEndpoint,
}

impl SessionClient {
    pub fn new(endpoint: RemoteEndpoint) -> Self {
        Self { endpoint }
    }

    pub fn endpoint(&self) -> &RemoteEndpoint {
        &self.endpoint
    }

    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = build_url(&self.endpoint.api_base(), "/")?;
        url.path_segments_mut()
            .map_err(|_| DriverError::Configuration("API base URL cannot carry a path".into()))?
            .clear()
            .extend(segments);
        Ok(url)
    }

    /// `POST /sessions/{session}/instances` with an empty body.
    pub async fn create_instance(&self, session: &str) -> Result<AllocatedInstance> {
        let url = self.url(&["sessions", session, "instances"])?;
        debug!(%url, "requesting instance");
        let body = send_json(Method::POST, url, None).await?;
        parse_instance(body)
    }

    /// `POST /sessions/{session}/instances` carrying the full TLS bundle.
    pub async fn create_instance_with_identity(
        &self,
        session: &str,
        alias: &str,
        bundle: &CertificateBundle,
    ) -> Result<AllocatedInstance> {
        let url = self.url(&["sessions", session, "instances"])?;
        let payload = serde_json::to_value(IdentityRequest {
            alias,
            server_cert: &bundle.server_cert,
            server_key: &bundle.server_key,
            ca_cert: &bundle.ca_cert,
            cert: &bundle.client_cert,
            key: &bundle.client_key,
        })
        .map_err(|err| DriverError::transport(format!("Failed to encode identity: {err}")))?;
        debug!(%url, alias, "requesting instance with embedded identity");
        let body = send_json(Method::POST, url, Some(payload)).await?;
        parse_instance(body)
    }

    /// `POST /sessions/{session}/instances/{name}/keys`.
    pub async fn push_keys(
        &self,
        session: &str,
        instance_name: &str,
        server_cert: &[u8],
        server_key: &[u8],
    ) -> Result<()> {
        let url = self.url(&["sessions", session, "instances", instance_name, "keys"])?;
        let payload = serde_json::to_value(PushKeysRequest {
            server_cert,
            server_key,
        })
        .map_err(|err| DriverError::transport(format!("Failed to encode keys: {err}")))?;
        debug!(%url, "pushing server keys");
        send(Method::POST, url, Some(payload)).await?;
        Ok(())
    }

    /// `GET /keys`, returning the raw tar stream.
    pub async fn fetch_key_archive(&self) -> Result<Vec<u8>> {
        let url = self.url(&["keys"])?;
        debug!(%url, "fetching key archive");
        send(Method::GET, url, None).await
    }

    /// `DELETE /sessions/{session}/instances/{name}`.
    pub async fn delete_instance(&self, session: &str, instance_name: &str) -> Result<()> {
        let url = self.url(&["sessions", session, "instances", instance_name])?;
        debug!(%url, "deleting instance");
        send(Method::DELETE, url, None).await?;
        Ok(())
    }
}

fn parse_instance(body: serde_json::Value) -> Result<AllocatedInstance> {
    let instance: AllocatedInstance = serde_json::from_value(body).map_err(|err| {
        DriverError::transport(format!("Invalid instance response: {err}"))
    })?;
    if instance.name.is_empty() || instance.ip.is_empty() {
        return Err(DriverError::transport(
            "Instance response is missing Name or IP",
        ));
    }
    Ok(instance)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn urls_escape_segments() {
        let client = SessionClient::new(RemoteEndpoint {
            hostname: "pwd.local".into(),
            api_port: 8080,
            tls_port: 443,
        });
        let url = client.url(&["sessions", "a b", "instances"]).unwrap();
        assert_eq!(url.as_str(), "http://pwd.local:8080/sessions/a%20b/instances");
    }

    #[test]
    fn parse_instance_reads_name_and_ip() {
        let instance = parse_instance(json!({"Name": "abc123", "IP": "10.0.0.5"})).unwrap();
        assert_eq!(instance.name, "abc123");
        assert_eq!(instance.ip, "10.0.0.5");
        assert_eq!(instance.ssh_user, None);
    }

    #[test]
    fn parse_instance_rejects_missing_ip() {
        let err = parse_instance(json!({"Name": "abc123", "IP": ""})).unwrap_err();
        assert!(matches!(err, DriverError::Transport { .. }));
    }

    #[test]
    fn push_request_is_base64() {
        let value = serde_json::to_value(PushKeysRequest {
            server_cert: b"cert",
            server_key: b"key",
        })
        .unwrap();
        assert_eq!(value, json!({"server_cert": "Y2VydA==", "server_key": "a2V5"}));
    }
}
