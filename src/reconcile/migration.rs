// Copyright 2025 RustFS Team
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! One-time migrations of tenants created by older operator releases.
//!
//! `status.syncVersion` records the last checkpoint applied to a tenant. Checkpoints newer than
//! it run in increasing order and each one is persisted as soon as its migration succeeded, so a
//! failed chain resumes at the first checkpoint that did not complete.

use super::label_selector;
use crate::context::Context;
use crate::error::{Error, SyncVersionTooOldSnafu};
use crate::types::error::InvalidVersionSnafu;
use crate::types::v1alpha1::status::pool::PoolState;
use crate::types::v1alpha1::tenant::Tenant;
use async_trait::async_trait;
use semver::Version;
use snafu::ResultExt;
use tracing::info;

/// Checkpoint recorded on tenants that never needed a migration.
pub const LATEST: &str = "v1.1.0";

/// Tenants recorded below this version are not migrated.
pub const MINIMUM: &str = "v0.1.0";

fn parse_version(version: &str) -> Result<Version, Error> {
    let trimmed = version.trim();
    Version::parse(trimmed.strip_prefix('v').unwrap_or(trimmed))
        .context(InvalidVersionSnafu { version })
        .map_err(Error::from)
}

#[async_trait]
trait Migrate: Send + Sync {
    async fn migrate(&self, ctx: &Context, tenant: Tenant) -> Result<Tenant, Error>;
}

/// Republishes the headless service with not-ready addresses and restarts the servers on it.
struct PublishNotReadyAddresses;

#[async_trait]
impl Migrate for PublishNotReadyAddresses {
    async fn migrate(&self, ctx: &Context, tenant: Tenant) -> Result<Tenant, Error> {
        let namespace = tenant.namespace()?;
        ctx.store
            .apply_service(&namespace, &tenant.new_headless_service())
            .await?;
        ctx.store
            .delete_pods(&namespace, &label_selector(&tenant.selector_labels()))
            .await?;
        Ok(tenant)
    }
}

/// Records the workloads of tenants without pool status as initialized pools.
struct AdoptPools;

#[async_trait]
impl Migrate for AdoptPools {
    async fn migrate(&self, ctx: &Context, tenant: Tenant) -> Result<Tenant, Error> {
        if tenant
            .status
            .as_ref()
            .is_some_and(|status| !status.pools.is_empty())
        {
            return Ok(tenant);
        }

        let namespace = tenant.namespace()?;
        let statefulsets = ctx
            .store
            .list_statefulsets(&namespace, &label_selector(&tenant.selector_labels()))
            .await?;

        let mut defaulted = tenant.clone();
        defaulted.ensure_defaults();
        let adopted: Vec<String> = defaulted
            .spec
            .pools
            .iter()
            .map(|pool| defaulted.statefulset_name(pool))
            .filter(|name| {
                statefulsets.iter().any(|ss| {
                    ss.metadata.name.as_deref() == Some(name.as_str()) && defaulted.controls(ss)
                })
            })
            .collect();

        if adopted.is_empty() {
            return Ok(tenant);
        }
        info!(tenant = %tenant.key(), pools = ?adopted, "adopting existing pools");
        Ok(ctx
            .update_status(&tenant, |status| {
                for name in &adopted {
                    status.set_pool_state(name, PoolState::Initialized);
                }
            })
            .await?)
    }
}

fn checkpoints() -> Vec<(&'static str, Box<dyn Migrate>)> {
    vec![
        ("v1.0.0", Box::new(PublishNotReadyAddresses) as Box<dyn Migrate>),
        (LATEST, Box::new(AdoptPools)),
    ]
}

pub async fn run(ctx: &Context, tenant: Tenant) -> Result<Tenant, Error> {
    apply(ctx, tenant, &checkpoints()).await
}

async fn apply(
    ctx: &Context,
    tenant: Tenant,
    chain: &[(&'static str, Box<dyn Migrate>)],
) -> Result<Tenant, Error> {
    let recorded = tenant
        .status
        .as_ref()
        .map(|status| status.sync_version.clone())
        .unwrap_or_default();

    if recorded.is_empty() {
        let Some((latest, _)) = chain.last() else {
            return Ok(tenant);
        };
        return Ok(ctx
            .update_status(&tenant, |status| status.sync_version = (*latest).to_owned())
            .await?);
    }

    let current = parse_version(&recorded)?;
    if current < parse_version(MINIMUM)? {
        return SyncVersionTooOldSnafu {
            version: recorded,
            minimum: MINIMUM,
        }
        .fail();
    }

    let mut tenant = tenant;
    for (checkpoint, migration) in chain {
        if parse_version(checkpoint)? <= current {
            continue;
        }

        info!(tenant = %tenant.key(), checkpoint, "running migration");
        tenant = migration.migrate(ctx, tenant).await?;
        tenant = ctx
            .update_status(&tenant, |status| status.sync_version = (*checkpoint).to_owned())
            .await?;
    }

    Ok(tenant)
}
