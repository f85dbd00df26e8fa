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

//! The per-key sync handler.
//!
//! A pass always starts from the stored tenant, walks every step in a fixed order and persists
//! progress through [`Context::update_status`] as it goes, so an interrupted pass resumes where
//! the stored status says it stopped.

mod credentials;
mod decommission;
mod health;
mod migration;
mod pool;
mod provision;
mod upgrade;
mod workload;

pub use health::check_health;

use crate::context::Context;
use crate::error::{Error, InvalidKeySnafu, MultipleTenantsSnafu};
use crate::types::v1alpha1::status::state::State;
use crate::types::v1alpha1::tenant::Tenant;
use snafu::OptionExt;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Delay of every explicit retry a pass asks for.
pub const REQUEUE_DELAY: Duration = Duration::from_secs(5);

/// What the scheduler should do with a key after a successful pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Action {
    /// Nothing to do until the next change.
    Done,
    RequeueAfter(Duration),
    /// A disruptive restart was issued, check back with backoff.
    Restart,
}

/// Outcome of a single step of a pass.
#[derive(Debug)]
pub(crate) enum Flow {
    Continue(Tenant),
    Restart,
    RequeueAfter(Duration),
}

/// Unwraps [`Flow::Continue`] or ends the pass with the matching [`Action`].
macro_rules! proceed {
    ($flow:expr) => {
        match $flow {
            Flow::Continue(tenant) => tenant,
            Flow::Restart => return Ok(Action::Restart),
            Flow::RequeueAfter(delay) => return Ok(Action::RequeueAfter(delay)),
        }
    };
}

/// Splits a `namespace/name` key.
pub fn split_key(key: &str) -> Result<(&str, &str), Error> {
    key.split_once('/')
        .filter(|(namespace, name)| !namespace.is_empty() && !name.is_empty() && !name.contains('/'))
        .context(InvalidKeySnafu { key })
}

/// Renders labels as an equality based label selector.
pub(crate) fn label_selector(labels: &BTreeMap<String, String>) -> String {
    labels
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join(",")
}

pub async fn reconcile(ctx: &Context, key: &str) -> Result<Action, Error> {
    let (namespace, name) = split_key(key)?;

    let tenant = match ctx.store.get_tenant(namespace, name).await {
        Ok(tenant) => tenant,
        Err(e) if e.is_not_found() => {
            debug!(tenant = key, "tenant no longer exists");
            return Ok(Action::Done);
        }
        Err(e) => return Err(e.into()),
    };

    if tenant.metadata.deletion_timestamp.is_some() {
        debug!(
            tenant = key,
            "tenant is deleted, deletion_timestamp is {:?}", tenant.metadata.deletion_timestamp
        );
        return Ok(Action::Done);
    }

    sync(ctx, tenant).await
}

async fn sync(ctx: &Context, tenant: Tenant) -> Result<Action, Error> {
    let credentials = match credentials::resolve(ctx, &tenant).await {
        Ok(credentials) => credentials,
        Err(e) => {
            warn!(tenant = %tenant.key(), "{e}");
            ctx.update_state(&tenant, State::CredentialsNotSet).await?;
            return Err(e);
        }
    };

    let tenant = migration::run(ctx, tenant).await?;
    let mut tenant = proceed!(decommission::check(ctx, tenant, &credentials).await?);

    tenant.ensure_defaults();
    if let Err(e) = tenant.validate() {
        ctx.update_state(
            &tenant,
            State::InvalidConfiguration {
                reason: e.to_string(),
            },
        )
        .await?;
        return Err(e.into());
    }

    ensure_single_tenant(ctx, &tenant).await?;
    let tenant = proceed!(ensure_certificates(ctx, tenant).await?);
    workload::reconcile_network(ctx, &tenant).await?;

    let (tenant, summary) = pool::ensure_pools(ctx, tenant).await?;
    let tenant = proceed!(pool::initialize_pools(ctx, tenant, &credentials).await?);
    if !tenant
        .status
        .as_ref()
        .is_some_and(|status| status.all_pools_initialized())
    {
        return Err(Error::WaitingForPools);
    }
    let tenant = proceed!(pool::resolve_waiting_on_ready(ctx, tenant).await?);

    let tenant = proceed!(upgrade::reconcile_version(ctx, tenant, &summary.images, &credentials).await?);
    let tenant = workload::reconcile_statefulsets(ctx, tenant).await?;

    if !ctx.admin.is_healthy(&tenant).await {
        info!(tenant = %tenant.key(), "waiting for tenant to be healthy");
        ctx.update_state(&tenant, State::WaitingForHealthy).await?;
        return Ok(Action::RequeueAfter(REQUEUE_DELAY));
    }

    let tenant = proceed!(provision::users(ctx, tenant, &credentials).await?);
    let tenant = proceed!(provision::buckets(ctx, tenant, &credentials).await?);

    ctx.update_status(&tenant, |status| {
        status.current_state = State::Initialized;
        status.available_replicas = summary.available_replicas;
    })
    .await?;

    Ok(Action::Done)
}

/// Only the oldest tenant of a namespace is served, later ones are rejected.
async fn ensure_single_tenant(ctx: &Context, tenant: &Tenant) -> Result<(), Error> {
    let namespace = tenant.namespace()?;
    let tenants = ctx.store.list_tenants(Some(&namespace)).await?;

    let oldest = tenants
        .iter()
        .min_by(|a, b| {
            a.metadata
                .creation_timestamp
                .as_ref()
                .map(|t| t.0)
                .cmp(&b.metadata.creation_timestamp.as_ref().map(|t| t.0))
                .then_with(|| a.name().cmp(&b.name()))
        })
        .map(Tenant::name);

    if oldest.is_some_and(|oldest| oldest != tenant.name()) {
        ctx.update_state(tenant, State::MultipleTenants).await?;
        return MultipleTenantsSnafu { namespace }.fail();
    }
    Ok(())
}

async fn ensure_certificates(ctx: &Context, tenant: Tenant) -> Result<Flow, Error> {
    let auto_cert = tenant.auto_cert();
    let custom: Vec<String> = tenant
        .spec
        .external_cert_secret
        .iter()
        .chain(tenant.spec.external_client_cert_secret.iter())
        .map(|secret| secret.name.clone())
        .collect();
    let tenant = ctx
        .update_status(&tenant, |status| {
            status.certificates.auto_cert_enabled = Some(auto_cert);
            status.certificates.custom_certificates = custom.clone();
        })
        .await?;

    let ensured = match ctx.certificates.ensure_server_cert(&tenant).await {
        Ok(()) => ctx.certificates.ensure_client_cert(&tenant).await,
        Err(e) => Err(e),
    };
    if let Err(e) = ensured {
        warn!(tenant = %tenant.key(), "{e}");
        ctx.update_state(&tenant, State::WaitingForCertificate).await?;
        return Ok(Flow::RequeueAfter(REQUEUE_DELAY));
    }

    Ok(Flow::Continue(tenant))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admin::{MockAdminClient, MockAdminConnector};
    use crate::tests::{FakeStore, create_test_tenant, owned_statefulset, running_pod};
    use crate::types::v1alpha1::status::pool::PoolState;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1 as metav1;

    fn healthy_admin() -> MockAdminConnector {
        let mut admin = MockAdminConnector::new();
        admin.expect_is_healthy().returning(|_| true);
        admin
    }

    fn pool_states(store: &FakeStore, key: &str) -> Vec<(String, PoolState)> {
        store
            .tenant(key)
            .status
            .unwrap_or_default()
            .pools
            .into_iter()
            .map(|p| (p.ss_name, p.state))
            .collect()
    }

    #[test]
    fn test_split_key() {
        assert_eq!(split_key("default/t").unwrap(), ("default", "t"));
        assert!(split_key("t").unwrap_err().is_terminal());
        assert!(split_key("/t").is_err());
        assert!(split_key("default/").is_err());
        assert!(split_key("a/b/c").is_err());
    }

    #[tokio::test]
    async fn test_missing_tenant_is_done() {
        let (ctx, _store) = crate::tests::context();
        assert_eq!(reconcile(&ctx, "default/missing").await.unwrap(), Action::Done);
    }

    #[tokio::test]
    async fn test_unreadable_tenant_is_a_transient_error() {
        let (ctx, store) = crate::tests::context();
        store.insert_tenant(create_test_tenant(None, None));
        store.fail_tenant_reads();

        let err = reconcile(&ctx, "default/test-tenant").await.unwrap_err();

        assert!(!err.is_terminal());
        assert!(!err.is_not_found());
        assert_eq!(store.status_writes(), 0);
    }

    #[tokio::test]
    async fn test_deleted_tenant_is_done() {
        let (ctx, store) = crate::tests::context();
        let mut tenant = create_test_tenant(None, None);
        tenant.metadata.deletion_timestamp = Some(metav1::Time(jiff::Timestamp::now()));
        store.insert_tenant(tenant);

        assert_eq!(reconcile(&ctx, "default/test-tenant").await.unwrap(), Action::Done);
        assert_eq!(store.status_writes(), 0);
    }

    #[tokio::test]
    async fn test_first_pool_initializes_without_restart() {
        let (ctx, store) = crate::tests::context_with(healthy_admin());
        let tenant = store.insert_tenant(create_test_tenant(None, None));

        let action = reconcile(&ctx, &tenant.key()).await.unwrap();

        assert_eq!(action, Action::Done);
        assert_eq!(
            pool_states(&store, &tenant.key()),
            vec![("test-tenant-pool-0".to_owned(), PoolState::Initialized)]
        );
        assert_eq!(store.created_statefulsets(), vec!["test-tenant-pool-0".to_owned()]);
        assert_eq!(store.pool_state_history("test-tenant-pool-0"), vec![
            PoolState::NotCreated,
            PoolState::Created,
            PoolState::Initialized
        ]);
        let status = store.tenant(&tenant.key()).status.unwrap();
        assert_eq!(status.current_state, State::Initialized);
        assert!(status.waiting_on_ready.is_none());
    }

    #[tokio::test]
    async fn test_second_pass_writes_nothing() {
        let (ctx, store) = crate::tests::context_with(healthy_admin());
        let tenant = store.insert_tenant(create_test_tenant(None, None));
        reconcile(&ctx, &tenant.key()).await.unwrap();

        let status_writes = store.status_writes();
        let workload_writes = store.workload_writes();
        assert_eq!(reconcile(&ctx, &tenant.key()).await.unwrap(), Action::Done);

        assert_eq!(store.status_writes(), status_writes);
        assert_eq!(store.workload_writes(), workload_writes);
    }

    #[tokio::test]
    async fn test_new_pool_next_to_initialized_pool_restarts() {
        let mut client = MockAdminClient::new();
        client.expect_service_restart().times(1).returning(|| Ok(()));
        let mut admin = MockAdminConnector::new();
        admin
            .expect_connect_pod()
            .withf(|_, pod, _| pod == "test-tenant-pool-0-0")
            .return_once(move |_, _, _| Ok(Box::new(client)));
        let (ctx, store) = crate::tests::context_with(admin);

        let mut tenant = create_test_tenant(None, None);
        let mut status = crate::types::v1alpha1::status::Status::default();
        status.set_pool_state("test-tenant-pool-0", PoolState::Initialized);
        status.sync_version = migration::LATEST.to_owned();
        tenant.status = Some(status);
        let pool_1 = crate::types::v1alpha1::pool::Pool {
            name: "pool-1".to_owned(),
            ..tenant.spec.pools[0].clone()
        };
        tenant.spec.pools.push(pool_1);
        let tenant = store.insert_tenant(tenant);
        store.insert_statefulset(owned_statefulset(&tenant, &tenant.spec.pools[0]));
        store.insert_pod(running_pod(&tenant, &tenant.spec.pools[0], "test-tenant-pool-0-0"));

        let action = reconcile(&ctx, &tenant.key()).await.unwrap();

        assert_eq!(action, Action::Restart);
        let status = store.tenant(&tenant.key()).status.unwrap();
        assert_eq!(status.current_state, State::Restarting);
        assert!(status.waiting_on_ready.is_some());
        assert_eq!(status.pool("test-tenant-pool-1").unwrap().state, PoolState::Initialized);
    }

    #[tokio::test]
    async fn test_stale_waiting_on_ready_is_cleared_by_timeout() {
        let mut admin = MockAdminConnector::new();
        admin.expect_is_healthy().returning(|_| false);
        let (ctx, store) = crate::tests::context_with(admin);

        let mut tenant = create_test_tenant(None, None);
        let mut status = crate::types::v1alpha1::status::Status::default();
        status.set_pool_state("test-tenant-pool-0", PoolState::Initialized);
        status.sync_version = migration::LATEST.to_owned();
        status.waiting_on_ready = Some(metav1::Time(
            jiff::Timestamp::now() - jiff::SignedDuration::from_mins(6),
        ));
        tenant.status = Some(status);
        let tenant = store.insert_tenant(tenant);
        store.insert_statefulset(owned_statefulset(&tenant, &tenant.spec.pools[0]));

        let action = reconcile(&ctx, &tenant.key()).await.unwrap();

        // cleared, then stopped by the health gate
        assert_eq!(action, Action::RequeueAfter(REQUEUE_DELAY));
        let status = store.tenant(&tenant.key()).status.unwrap();
        assert!(status.waiting_on_ready.is_none());
        assert_eq!(status.current_state, State::WaitingForHealthy);
    }

    #[tokio::test]
    async fn test_invalid_spec_is_terminal() {
        let (ctx, store) = crate::tests::context();
        let mut tenant = create_test_tenant(None, None);
        tenant.spec.pools[0].servers = 0;
        let tenant = store.insert_tenant(tenant);

        let err = reconcile(&ctx, &tenant.key()).await.unwrap_err();

        assert!(err.is_terminal());
        assert!(matches!(
            store.tenant(&tenant.key()).status.unwrap().current_state,
            State::InvalidConfiguration { .. }
        ));
    }

    #[tokio::test]
    async fn test_second_tenant_in_namespace_is_rejected() {
        let (ctx, store) = crate::tests::context_with(healthy_admin());
        let mut first = create_test_tenant(None, None);
        first.metadata.creation_timestamp = Some(metav1::Time(
            jiff::Timestamp::now() - jiff::SignedDuration::from_hours(1),
        ));
        store.insert_tenant(first);
        let mut second = create_test_tenant(None, None);
        second.metadata.name = Some("second".to_owned());
        second.metadata.creation_timestamp = Some(metav1::Time(jiff::Timestamp::now()));
        let second = store.insert_tenant(second);

        let err = reconcile(&ctx, &second.key()).await.unwrap_err();

        assert!(matches!(err, Error::MultipleTenants { .. }));
        assert_eq!(
            store.tenant(&second.key()).status.unwrap().current_state,
            State::MultipleTenants
        );
        assert!(store.created_statefulsets().is_empty());
    }

    #[tokio::test]
    async fn test_missing_certificate_waits() {
        let mut certificates = crate::certificate::MockCertificateManager::new();
        certificates.expect_ensure_server_cert().returning(|_| {
            Err(crate::certificate::Error::Missing {
                name: "test-tenant-tls".to_owned(),
            })
        });
        let (ctx, store) = crate::tests::Fixture::default()
            .certificates(certificates)
            .build();
        let mut tenant = create_test_tenant(None, None);
        tenant.spec.request_auto_cert = Some(true);
        let tenant = store.insert_tenant(tenant);

        let action = reconcile(&ctx, &tenant.key()).await.unwrap();

        assert_eq!(action, Action::RequeueAfter(REQUEUE_DELAY));
        let status = store.tenant(&tenant.key()).status.unwrap();
        assert_eq!(status.current_state, State::WaitingForCertificate);
        assert_eq!(status.certificates.auto_cert_enabled, Some(true));
    }

    #[tokio::test]
    async fn test_unhealthy_tenant_waits() {
        let mut admin = MockAdminConnector::new();
        admin.expect_is_healthy().returning(|_| false);
        let (ctx, store) = crate::tests::context_with(admin);
        let tenant = store.insert_tenant(create_test_tenant(None, None));

        let action = reconcile(&ctx, &tenant.key()).await.unwrap();

        assert_eq!(action, Action::RequeueAfter(REQUEUE_DELAY));
        assert_eq!(
            store.tenant(&tenant.key()).status.unwrap().current_state,
            State::WaitingForHealthy
        );
        // pools are provisioned before the health gate
        assert_eq!(store.created_statefulsets().len(), 1);
    }
}
