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

use super::{Context, Error};
use crate::types::v1alpha1::status::Status;
use crate::types::v1alpha1::status::state::State;
use crate::types::v1alpha1::tenant::{Tenant, TenantSpec};
use tracing::{debug, info};

/// The status write for `base` with `mutator` applied, or `None` when nothing would change.
fn status_body<F>(base: &Tenant, mutator: &mut F) -> Option<Tenant>
where
    F: FnMut(&mut Status),
{
    let current = base.status.clone().unwrap_or_default();
    let mut status = current.clone();
    mutator(&mut status);
    if status == current {
        return None;
    }

    // status writes never carry a spec
    let mut body = base.clone();
    body.spec = TenantSpec::default();
    body.status = Some(status);
    Some(body)
}

fn fresh(mut tenant: Tenant) -> Tenant {
    tenant.ensure_defaults();
    tenant
}

impl Context {
    /// Applies `mutator` to the status of `tenant` and persists the result.
    ///
    /// Nothing is written when the mutator leaves the status as it is. A conflicting write
    /// re-reads the tenant and is retried once; a second conflict is returned to the caller.
    /// The returned tenant is the stored object with defaults applied.
    pub async fn update_status<F>(&self, tenant: &Tenant, mut mutator: F) -> Result<Tenant, Error>
    where
        F: FnMut(&mut Status),
    {
        let Some(body) = status_body(tenant, &mut mutator) else {
            debug!(tenant = %tenant.key(), "status unchanged, skip update");
            return Ok(tenant.clone());
        };

        match self.store.replace_tenant_status(&body).await {
            Ok(updated) => Ok(fresh(updated)),
            Err(e) if e.is_conflict() => {
                info!(
                    tenant = %tenant.key(),
                    "status update failed due to conflict, retrieve the latest resource and retry."
                );

                let latest = self
                    .store
                    .get_tenant(&tenant.namespace()?, &tenant.name())
                    .await?;
                match status_body(&latest, &mut mutator) {
                    Some(body) => self.store.replace_tenant_status(&body).await.map(fresh),
                    None => Ok(fresh(latest)),
                }
            }
            Err(e) => Err(e),
        }
    }

    /// Persists `state` as the current state.
    pub async fn update_state(&self, tenant: &Tenant, state: State) -> Result<Tenant, Error> {
        self.update_status(tenant, |status| status.current_state = state.clone())
            .await
    }
}

#[cfg(test)]
mod tests {
    use crate::types::v1alpha1::status::pool::PoolState;
    use crate::types::v1alpha1::status::state::State;

    #[tokio::test]
    async fn test_unchanged_status_is_not_written() {
        let (ctx, store) = crate::tests::context();
        let tenant = store.insert_tenant(crate::tests::create_test_tenant(None, None));

        let tenant = ctx
            .update_state(&tenant, State::ProvisioningStatefulSet)
            .await
            .unwrap();
        assert_eq!(store.status_writes(), 1);

        ctx.update_state(&tenant, State::ProvisioningStatefulSet)
            .await
            .unwrap();
        assert_eq!(store.status_writes(), 1);
    }

    #[tokio::test]
    async fn test_status_write_never_carries_spec() {
        let (ctx, store) = crate::tests::context();
        let tenant = store.insert_tenant(crate::tests::create_test_tenant(None, None));

        let updated = ctx.update_state(&tenant, State::Initialized).await.unwrap();

        let submitted = store.last_status_body().unwrap();
        assert!(submitted.spec.pools.is_empty());
        // the stored object keeps its spec
        assert_eq!(updated.spec.pools.len(), 1);
        assert_eq!(updated.status.unwrap().current_state, State::Initialized);
    }

    #[tokio::test]
    async fn test_conflict_is_retried_once_against_fresh_copy() {
        let (ctx, store) = crate::tests::context();
        let stale = store.insert_tenant(crate::tests::create_test_tenant(None, None));
        // someone else wrote in between
        store.bump_tenant(&stale.key(), |status| status.sync_version = "v1.1.0".to_string());

        let updated = ctx
            .update_status(&stale, |status| {
                status.set_pool_state("test-tenant-pool-0", PoolState::Created)
            })
            .await
            .unwrap();

        let status = updated.status.unwrap();
        assert_eq!(status.sync_version, "v1.1.0");
        assert_eq!(status.pools.len(), 1);
        assert_eq!(store.status_writes(), 1);
    }

    #[tokio::test]
    async fn test_second_conflict_propagates() {
        let (ctx, store) = crate::tests::context();
        let tenant = store.insert_tenant(crate::tests::create_test_tenant(None, None));
        store.fail_status_writes_with_conflict(2);

        let err = ctx
            .update_state(&tenant, State::Initialized)
            .await
            .expect_err("second conflict must propagate");
        assert!(err.is_conflict());
        assert_eq!(store.status_writes(), 0);
    }
}
