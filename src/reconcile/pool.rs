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

use super::{Flow, label_selector};
use crate::admin::Credentials;
use crate::context::Context;
use crate::error::{Error, NoRunningPodSnafu};
use crate::types::v1alpha1::pool::Pool;
use crate::types::v1alpha1::status::pool::PoolState;
use crate::types::v1alpha1::status::state::State;
use crate::types::v1alpha1::tenant::Tenant;
use jiff::{SignedDuration, Timestamp};
use k8s_openapi::api::apps::v1 as appsv1;
use k8s_openapi::apimachinery::pkg::apis::meta::v1 as metav1;
use kube::runtime::events::EventType;
use std::collections::BTreeSet;
use tracing::{debug, info};

/// A restart is given this long to bring the cluster back before it is considered settled.
pub const WAITING_ON_READY_TIMEOUT: SignedDuration = SignedDuration::from_mins(5);

/// What the creation pass observed across all pools.
#[derive(Debug, Default)]
pub struct PoolSummary {
    pub available_replicas: i32,
    /// Server images currently deployed, one entry per distinct image.
    pub images: BTreeSet<String>,
}

fn server_image(statefulset: &appsv1::StatefulSet) -> Option<String> {
    statefulset
        .spec
        .as_ref()?
        .template
        .spec
        .as_ref()?
        .containers
        .first()?
        .image
        .clone()
}

fn pool_state(tenant: &Tenant, ss_name: &str) -> Option<PoolState> {
    tenant.status.as_ref()?.pool(ss_name).map(|p| p.state)
}

/// Creation pass: every spec pool gets a status entry and a workload.
pub async fn ensure_pools(ctx: &Context, tenant: Tenant) -> Result<(Tenant, PoolSummary), Error> {
    let namespace = tenant.namespace()?;
    let domain = ctx.config.cluster_domain.clone();
    let pools = tenant.spec.pools.clone();
    let mut tenant = tenant;
    let mut summary = PoolSummary::default();

    for pool in &pools {
        let ss_name = tenant.statefulset_name(pool);

        if pool_state(&tenant, &ss_name).is_none() {
            tenant = ctx
                .update_status(&tenant, |status| {
                    status.advance_pool_state(&ss_name, PoolState::NotCreated)
                })
                .await?;
        }

        let statefulset = match ctx.store.get_statefulset(&namespace, &ss_name).await? {
            Some(existing) => {
                if pool_state(&tenant, &ss_name) == Some(PoolState::NotCreated) {
                    tenant = ctx
                        .update_status(&tenant, |status| {
                            status.advance_pool_state(&ss_name, PoolState::Created)
                        })
                        .await?;
                }
                existing
            }
            None => {
                info!(tenant = %tenant.key(), pool = %pool.name, "creating pool statefulset");
                tenant = ctx
                    .update_state(&tenant, State::ProvisioningStatefulSet)
                    .await?;

                let created = ctx
                    .store
                    .create_statefulset(&namespace, &tenant.new_statefulset(pool, &domain)?)
                    .await?;
                ctx.notify(
                    &tenant,
                    EventType::Normal,
                    "PoolCreated",
                    &format!("Tenant pool {} created", pool.name),
                )
                .await;

                tenant = ctx
                    .update_status(&tenant, |status| {
                        status.advance_pool_state(&ss_name, PoolState::Created)
                    })
                    .await?;
                created
            }
        };

        summary.available_replicas += statefulset
            .status
            .as_ref()
            .and_then(|status| status.available_replicas)
            .unwrap_or_default();
        if let Some(image) = server_image(&statefulset) {
            summary.images.insert(image);
        }
    }

    Ok((tenant, summary))
}

/// Initialization pass.
///
/// Pools created next to an already initialized pool only join the cluster once the running
/// servers restart with the new topology. Without an initialized pool there is nothing running
/// yet and every pool is initialized as is.
pub async fn initialize_pools(
    ctx: &Context,
    tenant: Tenant,
    credentials: &Credentials,
) -> Result<Flow, Error> {
    let pending: Vec<String> = tenant
        .spec
        .pools
        .iter()
        .map(|pool| tenant.statefulset_name(pool))
        .filter(|ss_name| pool_state(&tenant, ss_name) != Some(PoolState::Initialized))
        .collect();
    if pending.is_empty() {
        return Ok(Flow::Continue(tenant));
    }

    let template = tenant
        .spec
        .pools
        .iter()
        .find(|pool| pool_state(&tenant, &tenant.statefulset_name(pool)) == Some(PoolState::Initialized))
        .cloned();

    let Some(template) = template else {
        let tenant = ctx
            .update_status(&tenant, |status| {
                for ss_name in &pending {
                    status.advance_pool_state(ss_name, PoolState::Initialized);
                }
            })
            .await?;
        return Ok(Flow::Continue(tenant));
    };

    info!(
        tenant = %tenant.key(),
        pool = %template.name,
        pools = ?pending,
        "restarting servers to join new pools"
    );
    restart_pool(ctx, &tenant, &template, credentials).await?;

    let now = metav1::Time(Timestamp::now());
    ctx.update_status(&tenant, |status| {
        status.waiting_on_ready = Some(now.clone());
        status.current_state = State::Restarting;
        for ss_name in &pending {
            status.advance_pool_state(ss_name, PoolState::Initialized);
        }
    })
    .await?;

    Ok(Flow::Restart)
}

/// Holds the pass back while a restart is settling.
pub async fn resolve_waiting_on_ready(ctx: &Context, tenant: Tenant) -> Result<Flow, Error> {
    let Some(since) = tenant
        .status
        .as_ref()
        .and_then(|status| status.waiting_on_ready.clone())
    else {
        return Ok(Flow::Continue(tenant));
    };

    if Timestamp::now().duration_since(since.0) > WAITING_ON_READY_TIMEOUT {
        info!(tenant = %tenant.key(), "restart did not settle in time, continue");
    } else if ctx.admin.is_healthy(&tenant).await {
        debug!(tenant = %tenant.key(), "tenant is ready after restart");
    } else {
        return Ok(Flow::Restart);
    }

    let tenant = ctx
        .update_status(&tenant, |status| status.waiting_on_ready = None)
        .await?;
    Ok(Flow::Continue(tenant))
}

/// Restarts every server of the cluster through a running member of `pool`.
pub async fn restart_pool(
    ctx: &Context,
    tenant: &Tenant,
    pool: &Pool,
    credentials: &Credentials,
) -> Result<(), Error> {
    let namespace = tenant.namespace()?;
    let pods = ctx
        .store
        .list_pods(&namespace, &label_selector(&tenant.pool_selector_labels(pool)))
        .await?;

    let pod = pods
        .iter()
        .filter(|pod| pod.metadata.deletion_timestamp.is_none())
        .find(|pod| {
            pod.status
                .as_ref()
                .and_then(|status| status.phase.as_deref())
                == Some("Running")
        })
        .and_then(|pod| pod.metadata.name.clone())
        .ok_or_else(|| {
            NoRunningPodSnafu {
                pool: pool.name.clone(),
            }
            .build()
        })?;

    let client = ctx.admin.connect_pod(tenant, &pod, credentials)?;
    client.service_restart().await?;
    ctx.notify(
        tenant,
        EventType::Normal,
        "Restarting",
        &format!("Restarting RustFS through pod {pod}"),
    )
    .await;
    Ok(())
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

    fn with_pools(states: &[(&str, PoolState)]) -> Tenant {
        let mut tenant = create_test_tenant(None, None);
        let mut status = Status::default();
        for (ss_name, state) in states {
            status.set_pool_state(ss_name, *state);
        }
        tenant.status = Some(status);
        tenant
    }

    #[tokio::test]
    async fn test_existing_workload_advances_not_created_pool() {
        let (ctx, store) = crate::tests::context();
        let tenant = store.insert_tenant(with_pools(&[("test-tenant-pool-0", PoolState::NotCreated)]));
        store.insert_statefulset(owned_statefulset(&tenant, &tenant.spec.pools[0]));

        let (tenant, summary) = ensure_pools(&ctx, tenant).await.unwrap();

        assert_eq!(
            pool_state(&tenant, "test-tenant-pool-0"),
            Some(PoolState::Created)
        );
        assert!(store.created_statefulsets().is_empty());
        assert_eq!(summary.images.len(), 1);
    }

    #[tokio::test]
    async fn test_creation_never_regresses_initialized_pool() {
        let (ctx, store) = crate::tests::context();
        let tenant = store.insert_tenant(with_pools(&[("test-tenant-pool-0", PoolState::Initialized)]));

        // workload deleted out of band
        let (tenant, _) = ensure_pools(&ctx, tenant).await.unwrap();

        assert_eq!(store.created_statefulsets().len(), 1);
        assert_eq!(
            pool_state(&tenant, "test-tenant-pool-0"),
            Some(PoolState::Initialized)
        );
    }

    #[tokio::test]
    async fn test_restart_needs_running_pod() {
        let (ctx, store) = crate::tests::context();
        let tenant = store.insert_tenant(create_test_tenant(None, None));
        let mut pod = running_pod(&tenant, &tenant.spec.pools[0], "test-tenant-pool-0-0");
        if let Some(status) = pod.status.as_mut() {
            status.phase = Some("Pending".to_owned());
        }
        store.insert_pod(pod);

        let err = restart_pool(&ctx, &tenant, &tenant.spec.pools[0], &credentials())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NoRunningPod { .. }));
    }

    #[tokio::test]
    async fn test_restart_goes_through_running_pod() {
        let mut client = MockAdminClient::new();
        client.expect_service_restart().times(1).returning(|| Ok(()));
        let mut admin = MockAdminConnector::new();
        admin
            .expect_connect_pod()
            .withf(|_, pod, _| pod == "test-tenant-pool-0-1")
            .return_once(move |_, _, _| Ok(Box::new(client)));
        let (ctx, store) = crate::tests::context_with(admin);
        let tenant = store.insert_tenant(create_test_tenant(None, None));
        let mut pending = running_pod(&tenant, &tenant.spec.pools[0], "test-tenant-pool-0-0");
        if let Some(status) = pending.status.as_mut() {
            status.phase = Some("Pending".to_owned());
        }
        store.insert_pod(pending);
        store.insert_pod(running_pod(&tenant, &tenant.spec.pools[0], "test-tenant-pool-0-1"));

        restart_pool(&ctx, &tenant, &tenant.spec.pools[0], &credentials())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_recent_restart_waits_for_health() {
        let mut admin = MockAdminConnector::new();
        admin.expect_is_healthy().times(1).returning(|_| false);
        let (ctx, store) = crate::tests::context_with(admin);
        let mut tenant = with_pools(&[("test-tenant-pool-0", PoolState::Initialized)]);
        if let Some(status) = tenant.status.as_mut() {
            status.waiting_on_ready = Some(metav1::Time(Timestamp::now() - SignedDuration::from_mins(1)));
        }
        let tenant = store.insert_tenant(tenant);

        let flow = resolve_waiting_on_ready(&ctx, tenant).await.unwrap();

        assert!(matches!(flow, Flow::Restart));
        assert_eq!(store.status_writes(), 0);
    }

    #[tokio::test]
    async fn test_healthy_tenant_clears_restart_marker() {
        let mut admin = MockAdminConnector::new();
        admin.expect_is_healthy().returning(|_| true);
        let (ctx, store) = crate::tests::context_with(admin);
        let mut tenant = with_pools(&[("test-tenant-pool-0", PoolState::Initialized)]);
        if let Some(status) = tenant.status.as_mut() {
            status.waiting_on_ready = Some(metav1::Time(Timestamp::now()));
        }
        let tenant = store.insert_tenant(tenant);

        let flow = resolve_waiting_on_ready(&ctx, tenant).await.unwrap();

        let Flow::Continue(tenant) = flow else {
            panic!("expected the pass to continue");
        };
        assert!(tenant.status.unwrap().waiting_on_ready.is_none());
    }
}
