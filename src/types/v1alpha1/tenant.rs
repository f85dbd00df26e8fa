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

mod rbac;
mod services;
mod workloads;

use crate::types;
use crate::types::error::NoNamespaceSnafu;
use crate::types::v1alpha1::k8s;
use crate::types::v1alpha1::pool::Pool;
use k8s_openapi::api::apps::v1;
use k8s_openapi::api::core::v1 as corev1;
use k8s_openapi::apimachinery::pkg::apis::meta::v1 as metav1;
use kube::{CustomResource, KubeSchema, Resource, ResourceExt};
use serde::{Deserialize, Serialize};
use snafu::OptionExt;
use std::collections::{BTreeMap, HashSet};

pub const TENANT_LABEL: &str = "rustfs.tenant";
pub const POOL_LABEL: &str = "rustfs.pool";
pub const MANAGED_BY: &str = "rustfs-operator";
pub const DEFAULT_IMAGE: &str = "rustfs/rustfs:latest";

/// S3 API port of every server.
pub const SERVER_PORT: i32 = 9000;
pub const CONSOLE_PORT: i32 = 9001;

#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, KubeSchema, Default, PartialEq)]
#[kube(
    group = "rustfs.com",
    version = "v1alpha1",
    kind = "Tenant",
    namespaced,
    status = "crate::types::v1alpha1::status::Status",
    shortname = "tenant",
    plural = "tenants",
    singular = "tenant",
    printcolumn = r#"{"name":"State", "type":"string", "jsonPath":".status.currentState"}"#,
    printcolumn = r#"{"name":"Health", "type":"string", "jsonPath":".status.healthStatus"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#,
    crates(serde_json = "k8s_openapi::serde_json")
)]
#[serde(rename_all = "camelCase")]
pub struct TenantSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduler: Option<String>,

    #[x_kube(validation = Rule::new("self.size() > 0").message("pools must be configured"))]
    pub pools: Vec<Pool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_pull_secret: Option<corev1::LocalObjectReference>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pod_management_policy: Option<k8s::PodManagementPolicy>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_pull_policy: Option<k8s::ImagePullPolicy>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<corev1::EnvVar>,

    /// Secret with `accesskey` and `secretkey` for the root user.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creds_secret: Option<corev1::LocalObjectReference>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_account_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_service_account_rbac: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority_class_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lifecycle: Option<corev1::Lifecycle>,

    /// Serve TLS with a certificate kept in `{tenant}-tls`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_auto_cert: Option<bool>,

    /// Secret holding a user managed server certificate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_cert_secret: Option<corev1::LocalObjectReference>,

    /// Secret holding the client certificate servers present to other services.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_client_cert_secret: Option<corev1::LocalObjectReference>,

    /// Secrets with `CONSOLE_ACCESS_KEY` and `CONSOLE_SECRET_KEY` created once as users.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub users: Vec<corev1::LocalObjectReference>,

    /// Buckets created once after the tenant first becomes healthy.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub buckets: Vec<Bucket>,
}

#[derive(Deserialize, Serialize, Clone, Debug, KubeSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Bucket {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,

    #[serde(default)]
    pub object_lock: bool,
}

impl Tenant {
    pub fn namespace(&self) -> Result<String, types::error::Error> {
        ResourceExt::namespace(self).context(NoNamespaceSnafu)
    }

    pub fn name(&self) -> String {
        ResourceExt::name_any(self)
    }

    /// The `namespace/name` reconcile key of this tenant.
    pub fn key(&self) -> String {
        match ResourceExt::namespace(self) {
            Some(ns) => format!("{}/{}", ns, self.name()),
            None => self.name(),
        }
    }

    /// a new owner reference for tenant
    pub fn new_owner_ref(&self) -> metav1::OwnerReference {
        metav1::OwnerReference {
            api_version: Self::api_version(&()).to_string(),
            kind: Self::kind(&()).to_string(),
            name: self.name(),
            uid: self.meta().uid.clone().unwrap_or_default(),
            controller: Some(true),
            block_owner_deletion: Some(true),
        }
    }

    /// Whether `statefulset` has this tenant as its controlling owner.
    pub fn controls(&self, statefulset: &v1::StatefulSet) -> bool {
        let uid = self.meta().uid.as_deref();
        statefulset.owner_references().iter().any(|owner| {
            owner.controller == Some(true)
                && owner.kind == Self::kind(&())
                && owner.name == self.name()
                && (uid.is_none() || Some(owner.uid.as_str()) == uid)
        })
    }

    pub fn selector_labels(&self) -> BTreeMap<String, String> {
        BTreeMap::from([(TENANT_LABEL.to_owned(), self.name())])
    }

    pub fn common_labels(&self) -> BTreeMap<String, String> {
        let mut labels = self.selector_labels();
        labels.insert("app.kubernetes.io/name".to_owned(), "rustfs".to_owned());
        labels.insert(
            "app.kubernetes.io/managed-by".to_owned(),
            MANAGED_BY.to_owned(),
        );
        labels
    }

    pub fn pool_selector_labels(&self, pool: &Pool) -> BTreeMap<String, String> {
        let mut labels = self.selector_labels();
        labels.insert(POOL_LABEL.to_owned(), pool.name.clone());
        labels
    }

    pub fn pool_labels(&self, pool: &Pool) -> BTreeMap<String, String> {
        let mut labels = self.common_labels();
        labels.insert(POOL_LABEL.to_owned(), pool.name.clone());
        labels
    }

    pub fn image(&self) -> &str {
        self.spec.image.as_deref().unwrap_or(DEFAULT_IMAGE)
    }

    pub fn auto_cert(&self) -> bool {
        self.spec.request_auto_cert.unwrap_or(false)
    }

    pub fn tls(&self) -> bool {
        self.auto_cert() || self.spec.external_cert_secret.is_some()
    }

    fn scheme(&self) -> &'static str {
        if self.tls() { "https" } else { "http" }
    }

    /// In-cluster URL of the S3 service fronting every pool.
    pub fn service_endpoint(&self, cluster_domain: &str) -> Result<String, types::error::Error> {
        Ok(format!(
            "{}://{}.{}.svc.{}:{}",
            self.scheme(),
            self.io_service_name(),
            self.namespace()?,
            cluster_domain,
            SERVER_PORT
        ))
    }

    /// In-cluster URL of one server pod, addressed through the headless service.
    pub fn pod_endpoint(
        &self,
        pod_name: &str,
        cluster_domain: &str,
    ) -> Result<String, types::error::Error> {
        Ok(format!(
            "{}://{}.{}.{}.svc.{}:{}",
            self.scheme(),
            pod_name,
            self.headless_service_name(),
            self.namespace()?,
            cluster_domain,
            SERVER_PORT
        ))
    }

    /// Fills in the fields a tenant may omit. Pool names default to `pool-{index}`.
    pub fn ensure_defaults(&mut self) {
        for (index, pool) in self.spec.pools.iter_mut().enumerate() {
            if pool.name.is_empty() {
                pool.name = format!("pool-{index}");
            }
        }

        if self.spec.image.as_deref().is_none_or(str::is_empty) {
            self.spec.image = Some(DEFAULT_IMAGE.to_owned());
        }
        self.spec
            .image_pull_policy
            .get_or_insert(k8s::ImagePullPolicy::IfNotPresent);
        self.spec
            .pod_management_policy
            .get_or_insert(k8s::PodManagementPolicy::Parallel);
    }

    /// Validates the spec after defaults were applied.
    pub fn validate(&self) -> Result<(), types::error::Error> {
        if self.spec.pools.is_empty() {
            return Err(types::error::Error::InvalidSpec {
                reason: "pools must be configured".to_owned(),
            });
        }

        let mut names = HashSet::with_capacity(self.spec.pools.len());
        for (index, pool) in self.spec.pools.iter().enumerate() {
            pool.validate(index)?;
            if !names.insert(pool.name.as_str()) {
                return Err(types::error::Error::InvalidSpec {
                    reason: format!("pool name '{}' is used more than once", pool.name),
                });
            }
        }

        if let Some(creds) = &self.spec.creds_secret
            && creds.name.is_empty()
        {
            return Err(types::error::Error::InvalidSpec {
                reason: "credsSecret must name a secret".to_owned(),
            });
        }

        Ok(())
    }

    pub fn io_service_name(&self) -> String {
        "rustfs".to_owned()
    }

    pub fn console_service_name(&self) -> String {
        format!("{}-console", self.name())
    }

    pub fn headless_service_name(&self) -> String {
        format!("{}-hl", self.name())
    }

    pub fn role_binding_name(&self) -> String {
        format!("{}-role-binding", self.name())
    }

    pub fn role_name(&self) -> String {
        format!("{}-role", self.name())
    }

    pub fn service_account_name(&self) -> String {
        self.spec
            .service_account_name
            .clone()
            .unwrap_or_else(|| format!("{}-sa", self.name()))
    }

    pub fn statefulset_name(&self, pool: &Pool) -> String {
        format!("{}-{}", self.name(), pool.name)
    }

    pub fn secret_name(&self) -> String {
        format!("{}-tls", self.name())
    }

    /// Name of the standalone console deployment older releases ran next to the servers.
    pub fn legacy_console_deployment_name(&self) -> String {
        format!("{}-console", self.name())
    }
}

/// Returns the tag of an image reference, `latest` when none is given.
pub fn image_tag(image: &str) -> &str {
    let without_digest = image.split('@').next().unwrap_or(image);
    match without_digest.rsplit_once(':') {
        Some((repository, tag)) if !tag.contains('/') && !repository.is_empty() => tag,
        _ => "latest",
    }
}
