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

//! One-shot creation of the initial users and buckets of a tenant.

use super::Flow;
use super::credentials::secret_field;
use crate::admin::{CONSOLE_ADMIN_POLICY, Credentials};
use crate::context::{self, Context};
use crate::error::{CredentialsInvalidSnafu, Error};
use crate::types::v1alpha1::status::state::State;
use crate::types::v1alpha1::tenant::Tenant;
use kube::runtime::events::EventType;
use tracing::{info, warn};

const USER_ACCESS_KEY_FIELD: &str = "CONSOLE_ACCESS_KEY";
const USER_SECRET_KEY_FIELD: &str = "CONSOLE_SECRET_KEY";

async fn create_users(ctx: &Context, tenant: &Tenant, credentials: &Credentials) -> Result<(), Error> {
    let ns = tenant.namespace()?;
    let client = ctx.admin.connect(tenant, credentials)?;

    for reference in &tenant.spec.users {
        let secret = ctx
            .store
            .get_secret(&ns, &reference.name)
            .await?
            .ok_or_else(|| context::Error::NotFound {
                kind: "Secret".to_owned(),
                name: reference.name.clone(),
            })?;

        let (Some(access_key), Some(secret_key)) = (
            secret_field(&secret, USER_ACCESS_KEY_FIELD),
            secret_field(&secret, USER_SECRET_KEY_FIELD),
        ) else {
            return CredentialsInvalidSnafu {
                reason: format!(
                    "user secret {} needs {USER_ACCESS_KEY_FIELD} and {USER_SECRET_KEY_FIELD}",
                    reference.name
                ),
            }
            .fail();
        };

        client.add_user(&access_key, &secret_key).await?;
        client.set_policy(CONSOLE_ADMIN_POLICY, &access_key).await?;
    }
    Ok(())
}

async fn create_buckets(ctx: &Context, tenant: &Tenant, credentials: &Credentials) -> Result<(), Error> {
    let client = ctx.admin.connect(tenant, credentials)?;
    for bucket in &tenant.spec.buckets {
        client.make_bucket(bucket).await?;
    }
    Ok(())
}

pub async fn users(ctx: &Context, tenant: Tenant, credentials: &Credentials) -> Result<Flow, Error> {
    let provisioned = tenant
        .status
        .as_ref()
        .is_some_and(|status| status.provisioned_users);
    if provisioned || tenant.spec.users.is_empty() {
        return Ok(Flow::Continue(tenant));
    }

    let tenant = ctx.update_state(&tenant, State::ProvisioningUsers).await?;
    if let Err(e) = create_users(ctx, &tenant, credentials).await {
        warn!(tenant = %tenant.key(), "failed to create users: {e}");
        ctx.notify(&tenant, EventType::Warning, "UsersCreatedFailed", &e.to_string())
            .await;
        return Err(e);
    }

    info!(tenant = %tenant.key(), users = tenant.spec.users.len(), "users created");
    let tenant = ctx
        .update_status(&tenant, |status| status.provisioned_users = true)
        .await?;
    ctx.notify(&tenant, EventType::Normal, "UsersCreated", "Users created")
        .await;
    Ok(Flow::Continue(tenant))
}

pub async fn buckets(ctx: &Context, tenant: Tenant, credentials: &Credentials) -> Result<Flow, Error> {
    let provisioned = tenant
        .status
        .as_ref()
        .is_some_and(|status| status.provisioned_buckets);
    if provisioned || tenant.spec.buckets.is_empty() {
        return Ok(Flow::Continue(tenant));
    }

    let tenant = ctx.update_state(&tenant, State::ProvisioningBuckets).await?;
    if let Err(e) = create_buckets(ctx, &tenant, credentials).await {
        warn!(tenant = %tenant.key(), "failed to create buckets: {e}");
        ctx.notify(&tenant, EventType::Warning, "BucketsCreatedFailed", &e.to_string())
            .await;
        return Err(e);
    }

    info!(tenant = %tenant.key(), buckets = tenant.spec.buckets.len(), "buckets created");
    let tenant = ctx
        .update_status(&tenant, |status| status.provisioned_buckets = true)
        .await?;
    ctx.notify(&tenant, EventType::Normal, "BucketsCreated", "Buckets created")
        .await;
    Ok(Flow::Continue(tenant))
}
