//! Instance creation request carries the full TLS bundle.
//!
//! The server certificate is issued before the instance exists, so its only
//! subject name is the alias-encoded host.

use tracing::info;

use super::{IdentityDistribution, ProvisionContext, issue_server_pair};
use crate::config::IdentityKind;
use crate::error::Result;
use crate::session::AllocatedInstance;

pub struct EmbeddedDistribution;

#[async_trait::async_trait]
impl IdentityDistribution for EmbeddedDistribution {
    async fn provision(&self, ctx: &ProvisionContext<'_>) -> Result<AllocatedInstance> {
        let host = ctx.daemon_host(None)?;
        let (cert, key) = issue_server_pair(ctx.store, vec![host.clone()], ctx.org).await?;
        let bundle = ctx.store.shared_bundle(cert, key)?;
        info!(%host, alias = ctx.alias, "creating instance with embedded identity");
        ctx.client
            .create_instance_with_identity(ctx.session_id, ctx.alias, &bundle)
            .await
    }

    fn kind(&self) -> IdentityKind {
        IdentityKind::Embedded
    }

    fn needs_local_authority(&self) -> bool {
        true
    }

    fn needs_ssh_key(&self) -> bool {
        true
    }
}
