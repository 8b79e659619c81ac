//! Allocate first, then push a server pair issued for the real address.

use tracing::{info, warn};

use super::{IdentityDistribution, ProvisionContext, issue_server_pair};
use crate::config::IdentityKind;
use crate::error::Result;
use crate::session::AllocatedInstance;

pub struct PushDistribution;

#[async_trait::async_trait]
impl IdentityDistribution for PushDistribution {
    async fn provision(&self, ctx: &ProvisionContext<'_>) -> Result<AllocatedInstance> {
        let instance = ctx.client.create_instance(ctx.session_id).await?;
        let host = ctx.daemon_host(Some(&instance.ip))?;
        let (cert, key) =
            issue_server_pair(ctx.store, vec![instance.ip.clone(), host.clone()], ctx.org).await?;

        // The instance stays allocated if the push fails; remove cleans it up.
        if let Err(err) = ctx
            .client
            .push_keys(ctx.session_id, &instance.name, &cert, &key)
            .await
        {
            warn!(instance = %instance.name, %err, "failed to push server keys");
            return Err(err);
        }
        info!(instance = %instance.name, %host, "pushed server keys");
        Ok(instance)
    }

    fn kind(&self) -> IdentityKind {
        IdentityKind::Push
    }

    fn needs_local_authority(&self) -> bool {
        true
    }

    fn needs_ssh_key(&self) -> bool {
        true
    }
}
