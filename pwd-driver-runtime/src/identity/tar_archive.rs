//! Legacy distribution: the session API serves the shared keys as a tar stream.
//!
//! Every entry is written to both the shared `certs/` directory and the
//! machine directory in one pass. Entries that are not plain files with a
//! plain name are skipped with a warning. A stream that cannot be read, or
//! one that lacks any of `REQUIRED_ENTRIES`, is an I/O failure.

use std::io::{self, Cursor};
use std::path::{Component, Path};

use tracing::{info, warn};

use super::{IdentityDistribution, ProvisionContext};
use crate::config::IdentityKind;
use crate::error::{DriverError, Result};
use crate::session::AllocatedInstance;
use crate::store::{CA_CERT, CLIENT_CERT, CLIENT_KEY, CertStore, is_plain_file_name};

/// Files the archive must provide for the local client to reach the daemon.
pub const REQUIRED_ENTRIES: [&str; 3] = [CA_CERT, CLIENT_CERT, CLIENT_KEY];

pub struct TarArchiveDistribution;

#[async_trait::async_trait]
impl IdentityDistribution for TarArchiveDistribution {
    async fn provision(&self, ctx: &ProvisionContext<'_>) -> Result<AllocatedInstance> {
        let archive = ctx.client.fetch_key_archive().await?;
        let written = unpack_key_archive(ctx.store, &archive)?;
        info!(entries = ?written, "installed key archive");
        ctx.client.create_instance(ctx.session_id).await
    }

    fn kind(&self) -> IdentityKind {
        IdentityKind::Tar
    }
}

/// Single plain file name of an archive entry, ignoring a leading `./`.
fn entry_file_name(path: &Path) -> Option<String> {
    let mut parts = path.components().filter(|c| !matches!(c, Component::CurDir));
    match (parts.next(), parts.next()) {
        (Some(Component::Normal(name)), None) => name
            .to_str()
            .filter(|name| is_plain_file_name(name))
            .map(str::to_string),
        _ => None,
    }
}

/// Fan every usable entry out into the store. Returns the names written.
pub fn unpack_key_archive(store: &CertStore, archive: &[u8]) -> Result<Vec<String>> {
    let mut archive = tar::Archive::new(Cursor::new(archive));
    let entries = archive
        .entries()
        .map_err(|err| DriverError::Io(format!("failed to read key archive: {err}")))?;

    let mut written = Vec::new();
    for entry in entries {
        let mut entry =
            entry.map_err(|err| DriverError::Io(format!("failed to read key archive: {err}")))?;

        if !entry.header().entry_type().is_file() {
            warn!(
                entry_type = ?entry.header().entry_type(),
                "skipping non-file key archive entry"
            );
            continue;
        }
        let name = match entry.path() {
            Ok(path) => match entry_file_name(&path) {
                Some(name) => name,
                None => {
                    warn!(path = %path.display(), "skipping key archive entry with unusable name");
                    continue;
                }
            },
            Err(err) => {
                warn!(%err, "skipping key archive entry with unreadable path");
                continue;
            }
        };

        let mut out = store.fan_out(&name)?;
        io::copy(&mut entry, &mut out)
            .map_err(|err| DriverError::Io(format!("failed to copy key '{name}': {err}")))?;
        written.push(name);
    }

    let missing: Vec<&str> = REQUIRED_ENTRIES
        .into_iter()
        .filter(|required| !written.iter().any(|name| name == required))
        .collect();
    if !missing.is_empty() {
        return Err(DriverError::Io(format!(
            "key archive is missing {}",
            missing.join(", ")
        )));
    }

    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn archive(entries: &[(&str, &str)]) -> Vec<u8> {
        let mut builder = tar::Builder::new(Vec::new());
        for (name, body) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(body.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, name, body.as_bytes()).unwrap();
        }
        builder.into_inner().unwrap()
    }

    #[test]
    fn entry_names() {
        assert_eq!(entry_file_name(Path::new("ca.pem")).as_deref(), Some("ca.pem"));
        assert_eq!(entry_file_name(Path::new("./key.pem")).as_deref(), Some("key.pem"));
        assert_eq!(entry_file_name(Path::new("nested/key.pem")), None);
        assert_eq!(entry_file_name(Path::new("../key.pem")), None);
        assert_eq!(entry_file_name(Path::new("/etc/passwd")), None);
    }

    #[test]
    fn unpack_writes_both_stores() {
        let dir = tempfile::tempdir().unwrap();
        let store = CertStore::new(dir.path(), "node1");
        let bytes = archive(&[
            ("ca.pem", "ca"),
            ("cert.pem", "cert"),
            ("key.pem", "key"),
        ]);

        let written = unpack_key_archive(&store, &bytes).unwrap();
        assert_eq!(written, vec!["ca.pem", "cert.pem", "key.pem"]);
        for (name, body) in [("ca.pem", "ca"), ("cert.pem", "cert"), ("key.pem", "key")] {
            assert_eq!(fs::read_to_string(store.shared_path(name)).unwrap(), body);
            assert_eq!(fs::read_to_string(store.resolve_store_path(name)).unwrap(), body);
        }
    }

    #[test]
    fn unpack_skips_nested_entries() {
        let dir = tempfile::tempdir().unwrap();
        let store = CertStore::new(dir.path(), "node1");
        let bytes = archive(&[
            ("ca.pem", "ca"),
            ("extra/notes.txt", "ignored"),
            ("cert.pem", "cert"),
            ("key.pem", "key"),
        ]);

        let written = unpack_key_archive(&store, &bytes).unwrap();
        assert_eq!(written.len(), 3);
        assert!(!dir.path().join("certs/extra").exists());
    }

    #[test]
    fn unpack_requires_complete_bundle() {
        let dir = tempfile::tempdir().unwrap();
        let store = CertStore::new(dir.path(), "node1");
        let bytes = archive(&[("ca.pem", "ca")]);
        let err = unpack_key_archive(&store, &bytes).unwrap_err();
        assert!(matches!(err, DriverError::Io(ref msg) if msg.contains("cert.pem")));
    }

    #[test]
    fn truncated_archive_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = CertStore::new(dir.path(), "node1");
        let body = "x".repeat(2048);
        let mut bytes = archive(&[("ca.pem", body.as_str())]);
        bytes.truncate(700);
        assert!(matches!(
            unpack_key_archive(&store, &bytes),
            Err(DriverError::Io(_))
        ));
    }
}
