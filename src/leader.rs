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

//! Leader election on a `coordination.k8s.io/v1` Lease.
//!
//! Every write carries the resourceVersion it was based on, so two replicas racing for an
//! expired lease cannot both win: the loser gets a 409 and keeps waiting.

use jiff::{SignedDuration, Timestamp};
use k8s_openapi::api::coordination::v1::{Lease, LeaseSpec};
use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{MicroTime, ObjectMeta};
use kube::Client;
use kube::api::{Api, Patch, PatchParams, PostParams};
use serde_json::json;
use snafu::{ResultExt, Snafu};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub const LEASE_NAME: &str = "rustfs-operator-lock";
pub const LEADER_LABEL_KEY: &str = "operator";
pub const LEADER_LABEL_VALUE: &str = "leader";

const LEASE_DURATION: Duration = Duration::from_secs(60);
const RENEW_INTERVAL: Duration = Duration::from_secs(15);
const RETRY_INTERVAL: Duration = Duration::from_secs(5);
const FIELD_MANAGER: &str = "rustfs-operator";

#[derive(Snafu, Debug)]
pub enum Error {
    #[snafu(display("lease API error: {}", source))]
    Kube { source: kube::Error },
}

fn is_conflict(e: &kube::Error) -> bool {
    matches!(e, kube::Error::Api(e) if e.code == 409)
}

/// Whether a lease last renewed at `renew_time` for `duration_secs` has run out at `now`.
fn expired(renew_time: Option<&MicroTime>, duration_secs: Option<i32>, now: Timestamp) -> bool {
    match (renew_time, duration_secs) {
        (Some(renewed), Some(duration)) => {
            now > renewed.0 + SignedDuration::from_secs(i64::from(duration))
        }
        _ => true,
    }
}

pub struct LeaderElector {
    client: Client,
    namespace: String,
    identity: String,
}

impl LeaderElector {
    pub fn new(client: Client, namespace: &str, identity: &str) -> Arc<Self> {
        Arc::new(Self {
            client,
            namespace: namespace.to_owned(),
            identity: identity.to_owned(),
        })
    }

    fn leases(&self) -> Api<Lease> {
        Api::namespaced(self.client.clone(), &self.namespace)
    }

    fn lease_spec(&self, now: Timestamp, transitions: i32) -> LeaseSpec {
        LeaseSpec {
            holder_identity: Some(self.identity.clone()),
            lease_duration_seconds: Some(LEASE_DURATION.as_secs() as i32),
            acquire_time: Some(MicroTime(now)),
            renew_time: Some(MicroTime(now)),
            lease_transitions: Some(transitions),
            ..Default::default()
        }
    }

    /// Blocks until this replica holds the lease.
    pub async fn acquire(self: &Arc<Self>) -> LeaderGuard {
        info!(identity = %self.identity, lease = LEASE_NAME, "waiting for leadership");

        loop {
            match self.try_acquire_or_renew().await {
                Ok(true) => {
                    info!(identity = %self.identity, "leadership acquired");
                    return self.guard();
                }
                Ok(false) => debug!(identity = %self.identity, "lease held by another replica"),
                Err(e) => warn!(identity = %self.identity, "failed to acquire lease: {e}"),
            }
            tokio::time::sleep(RETRY_INTERVAL).await;
        }
    }

    fn guard(self: &Arc<Self>) -> LeaderGuard {
        let (lost_tx, lost_rx) = oneshot::channel();
        let elector = Arc::clone(self);
        let renewal = tokio::spawn(async move { elector.renew_loop(lost_tx).await });

        LeaderGuard {
            elector: Arc::clone(self),
            renewal,
            lost_rx: Some(lost_rx),
        }
    }

    async fn try_acquire_or_renew(&self) -> Result<bool, Error> {
        let api = self.leases();
        let now = Timestamp::now();

        let Some(lease) = api.get_opt(LEASE_NAME).await.context(KubeSnafu)? else {
            let lease = Lease {
                metadata: ObjectMeta {
                    name: Some(LEASE_NAME.to_owned()),
                    namespace: Some(self.namespace.clone()),
                    ..Default::default()
                },
                spec: Some(self.lease_spec(now, 0)),
            };
            return match api.create(&PostParams::default(), &lease).await {
                Ok(_) => Ok(true),
                Err(e) if is_conflict(&e) => Ok(false),
                Err(e) => Err(Error::Kube { source: e }),
            };
        };

        let spec = lease.spec.clone().unwrap_or_default();
        let mut updated = lease.clone();

        if spec.holder_identity.as_deref() == Some(self.identity.as_str()) {
            updated.spec = Some(LeaseSpec {
                renew_time: Some(MicroTime(now)),
                ..spec
            });
        } else if expired(spec.renew_time.as_ref(), spec.lease_duration_seconds, now) {
            let transitions = spec.lease_transitions.unwrap_or_default() + 1;
            updated.spec = Some(self.lease_spec(now, transitions));
        } else {
            return Ok(false);
        }

        // resourceVersion of the read is kept, a concurrent writer makes this fail with 409
        match api.replace(LEASE_NAME, &PostParams::default(), &updated).await {
            Ok(_) => Ok(true),
            Err(e) if is_conflict(&e) => Ok(false),
            Err(e) => Err(Error::Kube { source: e }),
        }
    }

    async fn renew_loop(&self, lost_tx: oneshot::Sender<()>) {
        loop {
            tokio::time::sleep(RENEW_INTERVAL).await;

            match self.try_acquire_or_renew().await {
                Ok(true) => debug!(identity = %self.identity, "lease renewed"),
                Ok(false) | Err(_) => {
                    warn!(identity = %self.identity, "leadership lost");
                    let _ = lost_tx.send(());
                    return;
                }
            }
        }
    }

    async fn set_leader_label(&self, value: Option<&str>) -> Result<(), Error> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), &self.namespace);
        let patch = json!({ "metadata": { "labels": { LEADER_LABEL_KEY: value } } });

        api.patch(&self.identity, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .context(KubeSnafu)?;
        Ok(())
    }

    async fn release_lease(&self) -> Result<(), Error> {
        let api = self.leases();
        let Some(lease) = api.get_opt(LEASE_NAME).await.context(KubeSnafu)? else {
            return Ok(());
        };

        let holder = lease.spec.as_ref().and_then(|s| s.holder_identity.as_deref());
        if holder != Some(self.identity.as_str()) {
            return Ok(());
        }

        // an expired renew time lets the next replica take over right away
        let past = Timestamp::now() - SignedDuration::from_secs(LEASE_DURATION.as_secs() as i64);
        let patch = json!({ "spec": { "holderIdentity": null, "renewTime": MicroTime(past) } });
        api.patch(
            LEASE_NAME,
            &PatchParams::apply(FIELD_MANAGER).force(),
            &Patch::Merge(&patch),
        )
        .await
        .context(KubeSnafu)?;

        info!(identity = %self.identity, "lease released");
        Ok(())
    }
}

/// Held while this replica leads; the lease is renewed in the background.
pub struct LeaderGuard {
    elector: Arc<LeaderElector>,
    renewal: JoinHandle<()>,
    lost_rx: Option<oneshot::Receiver<()>>,
}

impl LeaderGuard {
    /// Resolves once a renewal fails.
    pub async fn lost(&mut self) {
        if let Some(rx) = self.lost_rx.take() {
            let _ = rx.await;
        }
    }

    /// Labels this pod `operator=leader`.
    pub async fn label_pod(&self) -> Result<(), Error> {
        self.elector.set_leader_label(Some(LEADER_LABEL_VALUE)).await
    }

    /// Stops renewing, removes the leader label and frees the lease.
    pub async fn release(self) -> Result<(), Error> {
        self.renewal.abort();
        if let Err(e) = self.elector.set_leader_label(None).await {
            warn!(identity = %self.elector.identity, "failed to remove leader label: {e}");
        }
        self.elector.release_lease().await
    }
}

impl Drop for LeaderGuard {
    fn drop(&mut self) {
        self.renewal.abort();
    }
}
