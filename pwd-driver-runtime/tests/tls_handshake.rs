//! Generated server certificates complete a real TLS handshake.

use std::sync::Arc;

use pwd_driver_runtime::pki::{CertificateAuthority, generate_server_certificate};
use pwd_driver_runtime::store::{CA_CERT, CA_KEY};
use pwd_driver_runtime::CertStore;
use rustls::pki_types::pem::PemObject;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName};
use rustls::{ClientConfig, RootCertStore, ServerConfig};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_rustls::{TlsAcceptor, TlsConnector};

fn provider() -> Arc<rustls::crypto::CryptoProvider> {
    Arc::new(rustls::crypto::ring::default_provider())
}

fn server_config(cert_pem: &[u8], key_pem: &[u8]) -> ServerConfig {
    let cert = CertificateDer::from_pem_slice(cert_pem).unwrap();
    let key = PrivateKeyDer::from_pem_slice(key_pem).unwrap();
    ServerConfig::builder_with_provider(provider())
        .with_safe_default_protocol_versions()
        .unwrap()
        .with_no_client_auth()
        .with_single_cert(vec![cert], key)
        .unwrap()
}

fn client_config(ca_pem: &[u8]) -> ClientConfig {
    let mut roots = RootCertStore::empty();
    roots
        .add(CertificateDer::from_pem_slice(ca_pem).unwrap())
        .unwrap();
    ClientConfig::builder_with_provider(provider())
        .with_safe_default_protocol_versions()
        .unwrap()
        .with_root_certificates(roots)
        .with_no_client_auth()
}

/// Run one handshake over an in-memory pipe and echo a byte through it.
async fn handshake(
    server: ServerConfig,
    client: ClientConfig,
    name: &'static str,
) -> std::io::Result<()> {
    let (client_io, server_io) = tokio::io::duplex(16 * 1024);
    let acceptor = TlsAcceptor::from(Arc::new(server));
    let connector = TlsConnector::from(Arc::new(client));

    let server_task = tokio::spawn(async move {
        let mut stream = acceptor.accept(server_io).await?;
        let mut buf = [0u8; 1];
        stream.read_exact(&mut buf).await?;
        stream.write_all(&buf).await?;
        stream.flush().await
    });

    let server_name = ServerName::try_from(name).unwrap();
    let result = async {
        let mut stream = connector.connect(server_name, client_io).await?;
        stream.write_all(b"p").await?;
        let mut buf = [0u8; 1];
        stream.read_exact(&mut buf).await?;
        assert_eq!(&buf, b"p");
        Ok::<_, std::io::Error>(())
    }
    .await;

    if result.is_ok() {
        server_task.await.unwrap()?;
    } else {
        server_task.abort();
    }
    result
}

#[tokio::test]
async fn server_cert_validates_for_ip_sni() {
    let ca = CertificateAuthority::new("pwd-test").unwrap();
    let hosts = vec!["10.0.0.5".to_string(), "localhost".to_string()];
    let (cert, key) = ca.generate_server_cert(&hosts, "pwd.node1").unwrap();

    let result = handshake(
        server_config(cert.as_bytes(), key.as_bytes()),
        client_config(ca.ca_cert_pem().as_bytes()),
        "10.0.0.5",
    )
    .await;
    assert!(result.is_ok(), "handshake failed: {result:?}");
}

#[tokio::test]
async fn server_cert_validates_for_localhost() {
    let ca = CertificateAuthority::new("pwd-test").unwrap();
    let (cert, key) = ca
        .generate_server_cert(&["10.0.0.5".to_string()], "pwd.node1")
        .unwrap();

    let result = handshake(
        server_config(cert.as_bytes(), key.as_bytes()),
        client_config(ca.ca_cert_pem().as_bytes()),
        "localhost",
    )
    .await;
    assert!(result.is_ok(), "handshake failed: {result:?}");
}

#[tokio::test]
async fn foreign_host_is_rejected() {
    let ca = CertificateAuthority::new("pwd-test").unwrap();
    let (cert, key) = ca
        .generate_server_cert(&["10.0.0.5".to_string()], "pwd.node1")
        .unwrap();

    let result = handshake(
        server_config(cert.as_bytes(), key.as_bytes()),
        client_config(ca.ca_cert_pem().as_bytes()),
        "10.0.0.6",
    )
    .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn store_authority_signs_trusted_server_pair() {
    let dir = tempfile::tempdir().unwrap();
    let store = CertStore::new(dir.path(), "node1");
    assert!(store.ensure_authority("pwd.node1").unwrap());
    assert!(!store.ensure_authority("pwd.node1").unwrap());

    let (cert, key) = generate_server_certificate(
        &["10.0.0.5".to_string()],
        "pwd.node1",
        &store.shared_path(CA_CERT),
        &store.shared_path(CA_KEY),
    )
    .unwrap();
    let ca_pem = std::fs::read(store.shared_path(CA_CERT)).unwrap();

    let result = handshake(server_config(&cert, &key), client_config(&ca_pem), "10.0.0.5").await;
    assert!(result.is_ok(), "handshake failed: {result:?}");
}
