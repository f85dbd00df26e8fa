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

//! Binary upgrades.
//!
//! Servers that support it replace their binary in place from the artifact the operator serves,
//! which keeps every pod running. Older servers answer the update call with 405/501 and are
//! moved to the new image by a rolling update of their StatefulSets instead.

use super::Flow;
use crate::admin::Credentials;
use crate::context::Context;
use crate::error::{Error, InconsistentVersionsSnafu, NotHealthySnafu, UpdateFailedSnafu};
use crate::types::v1alpha1::status::state::State;
use crate::types::v1alpha1::tenant::{Tenant, image_tag};
use kube::runtime::events::EventType;
use semver::Version;
use std::collections::BTreeSet;
use tracing::{info, warn};

/// First release serving the console from the server process.
pub const UNIFIED_CONSOLE_VERSION: &str = "1.0.0-alpha.60";

fn tag_version(tag: &str) -> Option<Version> {
    Version::parse(tag.strip_prefix('v').unwrap_or(tag)).ok()
}

/// Whether moving from `from` to `to` makes the standalone console deployment obsolete.
fn crosses_console_boundary(from: &str, to: &str) -> bool {
    let (Some(from), Some(to), Some(boundary)) = (
        tag_version(from),
        tag_version(to),
        tag_version(UNIFIED_CONSOLE_VERSION),
    ) else {
        return false;
    };
    from < boundary && to >= boundary
}

pub async fn reconcile_version(
    ctx: &Context,
    tenant: Tenant,
    images: &BTreeSet<String>,
    credentials: &Credentials,
) -> Result<Flow, Error> {
    if images.len() > 1 {
        warn!(tenant = %tenant.key(), ?images, "pools run different images");
        ctx.update_state(&tenant, State::InconsistentVersions)
            .await?;
        return InconsistentVersionsSnafu {
            images: images.iter().cloned().collect::<Vec<_>>(),
        }
        .fail();
    }

    let Some(running) = images.first() else {
        return Ok(Flow::Continue(tenant));
    };
    let target = tenant.image().to_owned();
    let (from, to) = (image_tag(running).to_owned(), image_tag(&target).to_owned());
    if from == to {
        return Ok(Flow::Continue(tenant));
    }

    if !ctx.admin.is_healthy(&tenant).await {
        ctx.update_state(&tenant, State::WaitingForHealthy).await?;
        return NotHealthySnafu.fail();
    }

    info!(tenant = %tenant.key(), from = %from, to = %to, "updating rustfs version");
    let tenant = ctx.update_state(&tenant, State::UpdatingVersion).await?;

    let artifact = ctx.artifacts.fetch(&target).await?;
    let update_url = ctx.config.update_url(&artifact.checksum_file_name());
    let client = ctx.admin.connect(&tenant, credentials)?;

    match client.server_update(&update_url).await {
        Ok(result) => {
            let errors = result.errors();
            if !errors.is_empty() {
                let reason = errors.join("; ");
                ctx.update_state(
                    &tenant,
                    State::UpdateFailed {
                        reason: reason.clone(),
                    },
                )
                .await?;
                return UpdateFailedSnafu { reason }.fail();
            }

            if result.version_changed() && crosses_console_boundary(&from, &to) {
                let console = tenant.legacy_console_deployment_name();
                info!(tenant = %tenant.key(), deployment = %console, "removing standalone console");
                ctx.store
                    .delete_deployment(&tenant.namespace()?, &console)
                    .await?;
            }
        }
        Err(e) if e.is_not_supported() => {
            info!(tenant = %tenant.key(), "in-place update not supported, rolling update");
        }
        Err(e) => {
            ctx.update_state(
                &tenant,
                State::UpdateFailed {
                    reason: e.to_string(),
                },
            )
            .await?;
            return Err(e.into());
        }
    }

    if let Err(e) = ctx.artifacts.remove(&artifact).await {
        warn!(tenant = %tenant.key(), "failed to remove artifact: {e}");
    }

    let namespace = tenant.namespace()?;
    for pool in &tenant.spec.pools {
        let name = tenant.statefulset_name(pool);
        if let Some(existing) = ctx.store.get_statefulset(&namespace, &name).await? {
            let updated = tenant.merge_statefulset(&existing, pool, &ctx.config.cluster_domain)?;
            ctx.store.replace_statefulset(&namespace, &updated).await?;
        }
    }

    ctx.notify(
        &tenant,
        EventType::Normal,
        "Updated",
        &format!("Tenant updated to {to}"),
    )
    .await;

    Ok(Flow::Continue(tenant))
}
