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

use clap::Args;
use snafu::{OptionExt, Snafu};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Snafu, Debug)]
pub enum Error {
    #[snafu(display("cannot determine the operator pod name, set POD_NAME or HOSTNAME"))]
    NoIdentity,
}

/// Operator settings, parsed once at startup and shared by reference.
#[derive(Args, Debug, Clone, PartialEq)]
pub struct Config {
    /// DNS suffix of in-cluster service names
    #[arg(long, env = "CLUSTER_DOMAIN", default_value = "cluster.local")]
    pub cluster_domain: String,

    /// Namespace the operator runs in, holds the leader lease
    #[arg(long, env = "OPERATOR_NAMESPACE", default_value = "rustfs-system")]
    pub operator_namespace: String,

    /// Name of this operator pod, falls back to HOSTNAME
    #[arg(long, env = "POD_NAME")]
    pub pod_name: Option<String>,

    /// Service fronting the operator pods, used in update URLs
    #[arg(long, env = "OPERATOR_SERVICE", default_value = "rustfs-operator")]
    pub operator_service: String,

    /// Number of reconcile workers
    #[arg(long, env = "WORKERS", default_value_t = 2)]
    pub workers: usize,

    /// Minutes between health sweeps of every tenant, 0 disables them
    #[arg(long, env = "MONITORING_INTERVAL", default_value_t = 3)]
    pub monitoring_interval: u64,

    /// Comma separated namespaces to watch, all when empty
    #[arg(long, env = "WATCHED_NAMESPACE", value_delimiter = ',')]
    pub watched_namespaces: Vec<String>,

    /// Port of the health and update artifact endpoints
    #[arg(long, env = "HTTP_PORT", default_value_t = 4221)]
    pub http_port: u16,

    /// Directory downloaded RustFS binaries are kept in
    #[arg(long, env = "ARTIFACTS_DIR", default_value = "/tmp/rustfs-operator")]
    pub artifacts_dir: PathBuf,

    /// Base URL RustFS release binaries are downloaded from
    #[arg(
        long,
        env = "RELEASE_MIRROR",
        default_value = "https://dl.rustfs.com/artifacts/rustfs/release"
    )]
    pub release_mirror: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cluster_domain: "cluster.local".to_owned(),
            operator_namespace: "rustfs-system".to_owned(),
            pod_name: None,
            operator_service: "rustfs-operator".to_owned(),
            workers: 2,
            monitoring_interval: 3,
            watched_namespaces: vec![],
            http_port: 4221,
            artifacts_dir: PathBuf::from("/tmp/rustfs-operator"),
            release_mirror: "https://dl.rustfs.com/artifacts/rustfs/release".to_owned(),
        }
    }
}

impl Config {
    /// Identity used for the leader lease and events.
    pub fn identity(&self) -> Result<String, Error> {
        self.pod_name
            .clone()
            .filter(|name| !name.is_empty())
            .or_else(|| std::env::var("HOSTNAME").ok().filter(|name| !name.is_empty()))
            .context(NoIdentitySnafu)
    }

    pub fn watches(&self, namespace: &str) -> bool {
        self.watched_namespaces.is_empty()
            || self.watched_namespaces.iter().any(|ns| ns == namespace)
    }

    pub fn monitoring_interval(&self) -> Option<Duration> {
        match self.monitoring_interval {
            0 => None,
            minutes => Some(Duration::from_secs(minutes * 60)),
        }
    }

    /// URL servers fetch a new binary's checksum sidecar from while updating in place.
    pub fn update_url(&self, file: &str) -> String {
        format!(
            "http://{}.{}.svc.{}:{}/webhook/v1/update/{}",
            self.operator_service,
            self.operator_namespace,
            self.cluster_domain,
            self.http_port,
            file
        )
    }
}
