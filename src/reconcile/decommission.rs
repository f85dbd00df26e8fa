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

use super::Flow;
use super::pool::restart_pool;
use crate::admin::Credentials;
use crate::context::Context;
use crate::error::{DecommissionNotAllowedSnafu, Error};
use crate::types::v1alpha1::pool::Pool;
use crate::types::v1alpha1::status::pool::{self as pool_status, PoolState};
use crate::types::v1alpha1::status::state::State;
use crate::types::v1alpha1::tenant::Tenant;
use jiff::Timestamp;
use k8s_openapi::apimachinery::pkg::apis::meta::v1 as metav1;
use kube::runtime::events::EventType;
use std::collections::HashSet;
use tracing::{info, warn};

fn dedup(pools: &[pool_status::Pool]) -> Vec<pool_status::Pool> {
    let mut seen = HashSet::with_capacity(pools.len());
    pools
        .iter()
        .filter(|p| seen.insert(p.ss_name.clone()))
        .cloned()
        .collect()
}

/// Rejects a shrink the remaining pools cannot be matched against by name.
fn check_names(pools: &[Pool]) -> Result<(), String> {
    let mut names = HashSet::with_capacity(pools.len());
    for (index, pool) in pools.iter().enumerate() {
        if pool.name.is_empty() {
            return Err(format!("the name of spec.pools[{index}] is empty"));
        }
        if !names.insert(pool.name.as_str()) {
            return Err(format!("the name of spec.pools[{index}] is duplicated"));
        }
    }
    Ok(())
}

/// Removes the pools dropped from the spec.
///
/// Runs before defaults are applied so pools without a name are seen as such.
pub async fn check(ctx: &Context, tenant: Tenant, credentials: &Credentials) -> Result<Flow, Error> {
    let spec_pools = tenant.spec.pools.clone();
    let status_pools = tenant
        .status
        .as_ref()
        .map(|status| status.pools.clone())
        .unwrap_or_default();
    let mut tenant = tenant;

    let deduped = dedup(&status_pools);
    if deduped.len() < status_pools.len() {
        warn!(tenant = %tenant.key(), "duplicated pools in status, repairing");
        tenant = ctx
            .update_status(&tenant, |status| {
                status.pools = deduped.clone();
                status.current_state = State::NotOwned;
            })
            .await?;
    }

    if deduped.len() <= spec_pools.len() {
        return Ok(Flow::Continue(tenant));
    }

    if let Err(reason) = check_names(&spec_pools) {
        warn!(tenant = %tenant.key(), "decommission is not allowed because {reason}");
        ctx.update_state(&tenant, State::DecommissioningNotAllowed)
            .await?;
        return DecommissionNotAllowedSnafu { reason }.fail();
    }

    let kept: HashSet<String> = spec_pools
        .iter()
        .map(|pool| tenant.statefulset_name(pool))
        .collect();
    let removed: Vec<pool_status::Pool> = deduped
        .iter()
        .filter(|p| !kept.contains(&p.ss_name))
        .cloned()
        .collect();
    if removed.is_empty() {
        return Ok(Flow::Continue(tenant));
    }

    let template = spec_pools
        .iter()
        .find(|pool| {
            deduped.iter().any(|p| {
                p.ss_name == tenant.statefulset_name(pool) && p.state == PoolState::Initialized
            })
        })
        .cloned();

    for pool in &removed {
        ctx.notify(
            &tenant,
            EventType::Normal,
            "PoolRemoved",
            &format!("Tenant pool {} removed", pool.ss_name),
        )
        .await;
    }

    let removed_names: HashSet<String> = removed.iter().map(|p| p.ss_name.clone()).collect();
    let restarting = template.is_some();
    if let Some(template) = &template {
        info!(tenant = %tenant.key(), pool = %template.name, "restarting servers without removed pools");
        restart_pool(ctx, &tenant, template, credentials).await?;
    }

    let now = metav1::Time(Timestamp::now());
    tenant = ctx
        .update_status(&tenant, |status| {
            status.pools.retain(|p| !removed_names.contains(&p.ss_name));
            if restarting {
                status.waiting_on_ready = Some(now.clone());
                status.current_state = State::Restarting;
            }
        })
        .await?;

    let namespace = tenant.namespace()?;
    for name in &removed_names {
        ctx.store.delete_statefulset(&namespace, name).await?;
        info!(tenant = %tenant.key(), pool = %name, "pool removed");
    }

    if restarting {
        return Ok(Flow::Restart);
    }
    Ok(Flow::Continue(tenant))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admin::{MockAdminClient, MockAdminConnector};
    use crate::tests::{create_test_tenant, owned_statefulset, running_pod};
    use crate::types::v1alpha1::status::Status;

    fn credentials() -> Credentials {
        Credentials {
            access_key: "rustfsadmin".to_owned(),
            secret_key: "rustfsadmin".to_owned(),
        }
    }

    /// A tenant whose status still tracks `pool-0` and `pool-1` in the given state.
    fn shrunk_tenant(spec_names: &[&str], state: PoolState) -> Tenant {
        let mut tenant = create_test_tenant(None, None);
        let template = tenant.spec.pools[0].clone();
        tenant.spec.pools = spec_names
            .iter()
            .map(|name| Pool {
                name: (*name).to_owned(),
                ..template.clone()
            })
            .collect();
        let mut status = Status::default();
        status.set_pool_state("test-tenant-pool-0", state);
        status.set_pool_state("test-tenant-pool-1", state);
        tenant.status = Some(status);
        tenant
    }

    #[tokio::test]
    async fn test_shrink_removes_unmatched_pool_and_restarts() {
        let mut client = MockAdminClient::new();
        client.expect_service_restart().times(1).returning(|| Ok(()));
        let mut admin = MockAdminConnector::new();
        admin
            .expect_connect_pod()
            .times(1)
            .return_once(move |_, _, _| Ok(Box::new(client)));
        let (ctx, store) = crate::tests::context_with(admin);

        let tenant = store.insert_tenant(shrunk_tenant(&["pool-0"], PoolState::Initialized));
        let pool_1 = Pool {
            name: "pool-1".to_owned(),
            ..tenant.spec.pools[0].clone()
        };
        store.insert_statefulset(owned_statefulset(&tenant, &tenant.spec.pools[0]));
        store.insert_statefulset(owned_statefulset(&tenant, &pool_1));
        store.insert_pod(running_pod(&tenant, &tenant.spec.pools[0], "test-tenant-pool-0-0"));

        let flow = check(&ctx, tenant.clone(), &credentials()).await.unwrap();

        assert!(matches!(flow, Flow::Restart));
        let status = store.tenant(&tenant.key()).status.unwrap();
        assert_eq!(status.current_state, State::Restarting);
        assert!(status.waiting_on_ready.is_some());
        assert_eq!(status.pools.len(), 1);
        assert_eq!(status.pools[0].ss_name, "test-tenant-pool-0");
        assert_eq!(store.statefulset_names(), vec!["test-tenant-pool-0".to_owned()]);
        assert!(store.events().contains(&"PoolRemoved".to_owned()));
    }

    #[tokio::test]
    async fn test_removing_created_pool_restarts_initialized_pool() {
        let mut client = MockAdminClient::new();
        client.expect_service_restart().times(1).returning(|| Ok(()));
        let mut admin = MockAdminConnector::new();
        admin
            .expect_connect_pod()
            .times(1)
            .return_once(move |_, _, _| Ok(Box::new(client)));
        let (ctx, store) = crate::tests::context_with(admin);

        let mut tenant = shrunk_tenant(&["pool-0"], PoolState::Initialized);
        if let Some(status) = tenant.status.as_mut() {
            status.set_pool_state("test-tenant-pool-1", PoolState::Created);
        }
        let tenant = store.insert_tenant(tenant);
        let pool_1 = Pool {
            name: "pool-1".to_owned(),
            ..tenant.spec.pools[0].clone()
        };
        store.insert_statefulset(owned_statefulset(&tenant, &tenant.spec.pools[0]));
        store.insert_statefulset(owned_statefulset(&tenant, &pool_1));
        store.insert_pod(running_pod(&tenant, &tenant.spec.pools[0], "test-tenant-pool-0-0"));

        let flow = check(&ctx, tenant.clone(), &credentials()).await.unwrap();

        assert!(matches!(flow, Flow::Restart));
        let status = store.tenant(&tenant.key()).status.unwrap();
        assert_eq!(status.current_state, State::Restarting);
        assert!(status.waiting_on_ready.is_some());
        assert_eq!(status.pools.len(), 1);
        assert_eq!(store.statefulset_names(), vec!["test-tenant-pool-0".to_owned()]);
    }

    #[tokio::test]
    async fn test_shrink_of_uninitialized_pools_needs_no_restart() {
        let (ctx, store) = crate::tests::context();
        let tenant = store.insert_tenant(shrunk_tenant(&["pool-0"], PoolState::Created));

        let flow = check(&ctx, tenant.clone(), &credentials()).await.unwrap();

        let Flow::Continue(tenant) = flow else {
            panic!("expected the pass to continue");
        };
        assert_eq!(tenant.status.unwrap().pools.len(), 1);
    }

    #[tokio::test]
    async fn test_shrink_with_empty_name_is_rejected() {
        let (ctx, store) = crate::tests::context();
        let tenant = store.insert_tenant(shrunk_tenant(&[""], PoolState::Initialized));

        let err = check(&ctx, tenant.clone(), &credentials()).await.unwrap_err();

        assert!(err.is_terminal());
        let status = store.tenant(&tenant.key()).status.unwrap();
        assert_eq!(status.current_state, State::DecommissioningNotAllowed);
        assert_eq!(status.pools.len(), 2);
    }

    #[tokio::test]
    async fn test_shrink_with_duplicate_names_is_rejected() {
        let (ctx, store) = crate::tests::context();
        let mut tenant = shrunk_tenant(&["pool-0", "pool-0"], PoolState::Initialized);
        if let Some(status) = tenant.status.as_mut() {
            status.set_pool_state("test-tenant-pool-2", PoolState::Initialized);
        }
        let tenant = store.insert_tenant(tenant);

        let err = check(&ctx, tenant.clone(), &credentials()).await.unwrap_err();

        assert!(matches!(err, Error::DecommissionNotAllowed { .. }));
        assert_eq!(store.tenant(&tenant.key()).status.unwrap().pools.len(), 3);
    }

    #[tokio::test]
    async fn test_duplicated_status_pools_are_repaired() {
        let (ctx, store) = crate::tests::context();
        let mut tenant = create_test_tenant(None, None);
        tenant.status = Some(Status {
            pools: vec![
                pool_status::Pool {
                    ss_name: "test-tenant-pool-0".to_owned(),
                    state: PoolState::Initialized,
                },
                pool_status::Pool {
                    ss_name: "test-tenant-pool-0".to_owned(),
                    state: PoolState::Initialized,
                },
            ],
            ..Default::default()
        });
        let tenant = store.insert_tenant(tenant);

        let flow = check(&ctx, tenant, &credentials()).await.unwrap();

        let Flow::Continue(tenant) = flow else {
            panic!("expected the pass to continue");
        };
        let status = tenant.status.unwrap();
        assert_eq!(status.pools.len(), 1);
        assert_eq!(status.current_state, State::NotOwned);
    }
}
