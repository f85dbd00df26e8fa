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

use crate::context::Context;
use crate::error::{Error, NotOwnedSnafu};
use crate::types;
use crate::types::v1alpha1::status::state::State;
use crate::types::v1alpha1::tenant::Tenant;
use tracing::{debug, info, warn};

/// Service account, RBAC and the services in front of the servers.
pub async fn reconcile_network(ctx: &Context, tenant: &Tenant) -> Result<(), Error> {
    let ns = tenant.namespace()?;

    if tenant.manages_rbac() {
        let role = tenant.new_role();
        ctx.store.apply_role(&ns, &role).await?;

        if tenant.spec.service_account_name.is_none() {
            ctx.store
                .apply_service_account(&ns, &tenant.new_service_account())
                .await?;
        }
        ctx.store
            .apply_role_binding(
                &ns,
                &tenant.new_role_binding(&tenant.service_account_name(), &role),
            )
            .await?;
    }

    ctx.store.apply_service(&ns, &tenant.new_io_service()).await?;
    ctx.store
        .apply_service(&ns, &tenant.new_console_service())
        .await?;
    ctx.store
        .apply_service(&ns, &tenant.new_headless_service())
        .await?;
    Ok(())
}

/// Brings every pool StatefulSet in line with the spec.
pub async fn reconcile_statefulsets(ctx: &Context, tenant: Tenant) -> Result<Tenant, Error> {
    let ns = tenant.namespace()?;
    let domain = &ctx.config.cluster_domain;

    for pool in &tenant.spec.pools {
        let name = tenant.statefulset_name(pool);
        let Some(existing) = ctx.store.get_statefulset(&ns, &name).await? else {
            debug!(tenant = %tenant.key(), pool = %pool.name, "statefulset gone, recreated next pass");
            continue;
        };

        if !tenant.controls(&existing) {
            warn!(tenant = %tenant.key(), statefulset = %name, "statefulset not controlled by the tenant");
            ctx.update_state(&tenant, State::NotOwned).await?;
            return NotOwnedSnafu { name }.fail();
        }

        let replicas = existing
            .spec
            .as_ref()
            .and_then(|spec| spec.replicas)
            .unwrap_or(1);
        if replicas != pool.servers {
            ctx.update_state(
                &tenant,
                State::ServerCountImmutable {
                    pool: pool.name.clone(),
                },
            )
            .await?;
            return Err(types::error::Error::ImmutableFieldModified {
                name,
                field: "spec.pools.servers".to_owned(),
                message: format!("{replicas} servers are running, {} requested", pool.servers),
            }
            .into());
        }

        if let Err(e) = tenant.validate_statefulset_update(&existing, pool, domain) {
            ctx.update_state(
                &tenant,
                State::InvalidConfiguration {
                    reason: e.to_string(),
                },
            )
            .await?;
            return Err(e.into());
        }

        if tenant.statefulset_needs_update(&existing, pool, domain)? {
            info!(tenant = %tenant.key(), pool = %pool.name, "updating statefulset");
            let merged = tenant.merge_statefulset(&existing, pool, domain)?;
            ctx.store.replace_statefulset(&ns, &merged).await?;
        }
    }

    Ok(tenant)
}
