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

//! Watches, work queues and the workers draining them.

use crate::context::Context;
use crate::error_policy::error_policy;
use crate::reconcile::{check_health, reconcile};
use crate::scheduler::WorkQueue;
use crate::types::v1alpha1::tenant::{TENANT_LABEL, Tenant};
use futures::{Stream, StreamExt, future};
use k8s_openapi::api::apps::v1 as appsv1;
use k8s_openapi::api::core::v1 as corev1;
use kube::runtime::{WatchStreamExt, watcher};
use kube::{Api, Client, Resource, ResourceExt};
use std::sync::Arc;
use tokio_stream::wrappers::IntervalStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Reconcile key of the tenant controlling `statefulset`.
fn owner_key(statefulset: &appsv1::StatefulSet) -> Option<String> {
    let namespace = statefulset.namespace()?;
    statefulset
        .owner_references()
        .iter()
        .find(|owner| owner.controller == Some(true) && owner.kind == Tenant::kind(&()))
        .map(|owner| format!("{namespace}/{}", owner.name))
}

/// Reconcile key of the tenant a pod belongs to.
fn pod_tenant_key(pod: &corev1::Pod) -> Option<String> {
    let namespace = pod.namespace()?;
    let tenant = pod.labels().get(TENANT_LABEL)?;
    Some(format!("{namespace}/{tenant}"))
}

pub struct Controller {
    ctx: Context,
    client: Client,
    tenants: Arc<WorkQueue>,
    health: Arc<WorkQueue>,
}

impl Controller {
    pub fn new(ctx: Context, client: Client) -> Self {
        Self {
            ctx,
            client,
            tenants: WorkQueue::with_default_limiter("tenants"),
            health: WorkQueue::with_default_limiter("health"),
        }
    }

    /// Runs until `shutdown` is cancelled. Passes in flight are finished before returning.
    pub async fn run(self, shutdown: CancellationToken) {
        let workers = self.ctx.config.workers.max(1);
        info!(workers, "starting controller");

        let mut tasks = Vec::new();
        tasks.push(tokio::spawn(watch(
            watcher(Api::<Tenant>::all(self.client.clone()), watcher::Config::default())
                .default_backoff()
                .applied_objects(),
            self.tenants.clone(),
            self.ctx.clone(),
            |tenant: &Tenant| Some(tenant.key()),
            shutdown.clone(),
        )));
        tasks.push(tokio::spawn(watch(
            watcher(
                Api::<appsv1::StatefulSet>::all(self.client.clone()),
                watcher::Config::default().labels(TENANT_LABEL),
            )
            .default_backoff()
            .touched_objects(),
            self.tenants.clone(),
            self.ctx.clone(),
            owner_key,
            shutdown.clone(),
        )));
        tasks.push(tokio::spawn(watch(
            watcher(
                Api::<corev1::Pod>::all(self.client.clone()),
                watcher::Config::default().labels(TENANT_LABEL),
            )
            .default_backoff()
            .touched_objects(),
            self.health.clone(),
            self.ctx.clone(),
            pod_tenant_key,
            shutdown.clone(),
        )));

        if let Some(interval) = self.ctx.config.monitoring_interval() {
            tasks.push(tokio::spawn(monitor(
                self.ctx.clone(),
                self.health.clone(),
                interval,
                shutdown.clone(),
            )));
        }

        for _ in 0..workers {
            tasks.push(tokio::spawn(reconcile_worker(
                self.ctx.clone(),
                self.tenants.clone(),
            )));
        }
        tasks.push(tokio::spawn(health_worker(
            self.ctx.clone(),
            self.health.clone(),
        )));

        shutdown.cancelled().await;
        info!("shutting down controller");
        self.tenants.shutdown();
        self.health.shutdown();

        for result in future::join_all(tasks).await {
            if let Err(e) = result {
                warn!("controller task failed: {e}");
            }
        }
        info!("controller stopped");
    }
}

/// Feeds the keys of watched objects into `queue`.
async fn watch<K, S, F>(
    stream: S,
    queue: Arc<WorkQueue>,
    ctx: Context,
    key_of: F,
    shutdown: CancellationToken,
) where
    K: Resource + Send,
    S: Stream<Item = Result<K, watcher::Error>> + Send + 'static,
    F: Fn(&K) -> Option<String> + Send + 'static,
{
    let mut stream = std::pin::pin!(stream.take_until(shutdown.cancelled_owned()));
    while let Some(event) = stream.next().await {
        match event {
            Ok(object) => {
                let Some(key) = key_of(&object) else {
                    continue;
                };
                if object
                    .meta()
                    .namespace
                    .as_deref()
                    .is_some_and(|ns| ctx.config.watches(ns))
                {
                    queue.add(&key);
                }
            }
            Err(e) => warn!("watch error: {e}"),
        }
    }
}

/// Periodically queues every tenant for a health check.
async fn monitor(
    ctx: Context,
    health: Arc<WorkQueue>,
    interval: std::time::Duration,
    shutdown: CancellationToken,
) {
    let ticks = IntervalStream::new(tokio::time::interval(interval));
    let mut ticks = std::pin::pin!(ticks.take_until(shutdown.cancelled_owned()));
    while ticks.next().await.is_some() {
        match ctx.store.list_tenants(None).await {
            Ok(tenants) => tenants
                .iter()
                .filter(|t| t.metadata.namespace.as_deref().is_some_and(|ns| ctx.config.watches(ns)))
                .for_each(|t| health.add(&t.key())),
            Err(e) => warn!("failed to list tenants for health check: {e}"),
        }
    }
}

/// Handles one key of the tenant queue. Returns `false` once the queue is shut down.
async fn process_next(ctx: &Context, queue: &Arc<WorkQueue>) -> bool {
    let Some(key) = queue.get().await else {
        return false;
    };
    debug!(tenant = %key, "reconciling");
    let result = reconcile(ctx, &key).await;
    error_policy(queue, &key, &result);
    queue.done(&key);
    true
}

async fn reconcile_worker(ctx: Context, queue: Arc<WorkQueue>) {
    while process_next(&ctx, &queue).await {}
}

/// Handles one key of the health queue, re-adding it until the tenant is healthy.
async fn check_next(ctx: &Context, queue: &Arc<WorkQueue>) -> bool {
    let Some(key) = queue.get().await else {
        return false;
    };
    match check_health(ctx, &key).await {
        Ok(true) => queue.forget(&key),
        Ok(false) => queue.add_rate_limited(&key),
        Err(e) => {
            warn!(tenant = %key, "health check failed: {e}");
            queue.add_rate_limited(&key);
        }
    }
    queue.done(&key);
    true
}

async fn health_worker(ctx: Context, queue: Arc<WorkQueue>) {
    while check_next(&ctx, &queue).await {}
}
