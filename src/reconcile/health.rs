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

//! Periodic health report of a tenant, kept in its status.

use super::{credentials, label_selector, split_key};
use crate::admin::{AdminClient, Credentials};
use crate::context::Context;
use crate::error::Error;
use crate::types::v1alpha1::status::health::{HealthStatus, TierUsage, Usage};
use crate::types::v1alpha1::tenant::Tenant;
use tracing::{debug, warn};

#[derive(Clone, Debug, PartialEq, Eq)]
struct Report {
    health: HealthStatus,
    message: String,
    drives_online: i32,
    drives_offline: i32,
    drives_healing: i32,
    write_quorum: i32,
    usage: Option<Usage>,
}

impl Report {
    fn red(message: String) -> Self {
        Self {
            health: HealthStatus::Red,
            message,
            drives_online: 0,
            drives_offline: 0,
            drives_healing: 0,
            write_quorum: 0,
            usage: None,
        }
    }
}

fn saturating_i32(n: usize) -> i32 {
    i32::try_from(n).unwrap_or(i32::MAX)
}

fn saturating_i64(n: u64) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

async fn usage(client: &dyn AdminClient, report: &mut Report) {
    let mut usage = Usage::default();

    match client.storage_info().await {
        Ok(info) => {
            let online = info.disks.iter().filter(|d| d.is_online()).count();
            report.drives_online = saturating_i32(online);
            report.drives_offline = saturating_i32(info.disks.len() - online);
            usage.raw_usage = info.disks.iter().map(|d| saturating_i64(d.used_space)).sum();
            usage.raw_capacity = info.disks.iter().map(|d| saturating_i64(d.total_space)).sum();
        }
        Err(e) => warn!("failed to get storage info: {e}"),
    }

    match client.tier_stats().await {
        Ok(tiers) => {
            usage.tiers = tiers
                .into_iter()
                .map(|tier| TierUsage {
                    name: tier.name,
                    type_: tier.type_,
                    total_size: saturating_i64(tier.total_size),
                })
                .collect();
        }
        Err(e) if e.is_not_supported() => {}
        Err(e) => warn!("failed to get tier stats: {e}"),
    }

    report.usage = Some(usage);
}

async fn probe(ctx: &Context, tenant: &Tenant, credentials: &Credentials) -> Result<Report, Error> {
    let pods = ctx
        .store
        .list_pods(&tenant.namespace()?, &label_selector(&tenant.selector_labels()))
        .await?;
    let not_running = pods
        .iter()
        .filter(|pod| pod.status.as_ref().and_then(|s| s.phase.as_deref()) != Some("Running"))
        .count();

    let client = match ctx.admin.connect(tenant, credentials) {
        Ok(client) => client,
        Err(e) => return Ok(Report::red(format!("admin endpoint unavailable: {e}"))),
    };
    let health = match client.health().await {
        Ok(health) => health,
        Err(e) => return Ok(Report::red(format!("cluster health unavailable: {e}"))),
    };

    let mut report = Report::red("no write quorum".to_owned());
    report.write_quorum = health.write_quorum;
    report.drives_healing = health.healing_drives;
    usage(client.as_ref(), &mut report).await;

    if !health.healthy {
        return Ok(report);
    }

    let mut problems = Vec::new();
    if report.drives_offline > 0 {
        problems.push(format!("{} drives offline", report.drives_offline));
    }
    if report.drives_healing > 0 {
        problems.push(format!("{} drives healing", report.drives_healing));
    }
    if not_running > 0 {
        problems.push(format!("{not_running} pods not running"));
    }

    report.health = if problems.is_empty() {
        HealthStatus::Green
    } else {
        HealthStatus::Yellow
    };
    report.message = problems.join(", ");
    Ok(report)
}

/// Refreshes the health report of the tenant behind `key`.
///
/// Returns whether the tenant is fully healthy; a tenant that no longer exists counts as
/// healthy so its key is dropped.
pub async fn check_health(ctx: &Context, key: &str) -> Result<bool, Error> {
    let (namespace, name) = split_key(key)?;
    let mut tenant = match ctx.store.get_tenant(namespace, name).await {
        Ok(tenant) => tenant,
        Err(e) if e.is_not_found() => return Ok(true),
        Err(e) => return Err(e.into()),
    };
    if tenant.metadata.deletion_timestamp.is_some() {
        return Ok(true);
    }
    tenant.ensure_defaults();

    let credentials = credentials::resolve(ctx, &tenant).await?;
    let report = probe(ctx, &tenant, &credentials).await?;
    debug!(tenant = key, health = %report.health, message = %report.message, "health checked");

    ctx.update_status(&tenant, |status| {
        status.health_status = Some(report.health);
        status.health_message = report.message.clone();
        status.drives_online = report.drives_online;
        status.drives_offline = report.drives_offline;
        status.drives_healing = report.drives_healing;
        status.write_quorum = report.write_quorum;
        if let Some(usage) = &report.usage {
            status.usage = usage.clone();
        }
    })
    .await?;

    Ok(report.health == HealthStatus::Green)
}
