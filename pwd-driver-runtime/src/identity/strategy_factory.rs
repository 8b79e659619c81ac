//! Identity strategy selection via the `PWD_IDENTITY` environment variable.
//!
//! # Supported values for `PWD_IDENTITY`
//!
//! | Value      | Strategy                  | Local authority | SSH key |
//! |------------|---------------------------|-----------------|---------|
//! | `tar`      | Shared key archive        | no              | no      |
//! | `embedded` | Bundle in create request  | yes             | yes     |
//! | `push`     | Keys pushed after create  | yes             | yes     |
//!
//! Unset or empty selects `tar`.

use std::sync::Arc;

use super::IdentityDistribution;
use super::embedded::EmbeddedDistribution;
use super::push::PushDistribution;
use super::tar_archive::TarArchiveDistribution;
use crate::config::IdentityKind;
use crate::error::Result;
use crate::flags;

pub fn strategy_for(kind: IdentityKind) -> Arc<dyn IdentityDistribution> {
    match kind {
        IdentityKind::Tar => Arc::new(TarArchiveDistribution),
        IdentityKind::Embedded => Arc::new(EmbeddedDistribution),
        IdentityKind::Push => Arc::new(PushDistribution),
    }
}

/// Construct the strategy named by `PWD_IDENTITY`.
pub fn strategy_from_env() -> Result<Arc<dyn IdentityDistribution>> {
    let kind = match flags::IDENTITY.resolve() {
        Some(value) => IdentityKind::parse(&value)?,
        None => IdentityKind::default(),
    };
    Ok(strategy_for(kind))
}
