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

use super::{CONSOLE_PORT, SERVER_PORT, Tenant};
use crate::types;
use crate::types::v1alpha1::pool::Pool;
use k8s_openapi::api::apps::v1;
use k8s_openapi::api::core::v1 as corev1;
use k8s_openapi::apimachinery::pkg::apis::meta::v1 as metav1;
use serde::Serialize;

const VOLUME_CLAIM_TEMPLATE_PREFIX: &str = "vol";
const LOG_VOLUME_NAME: &str = "logs";
const LOG_VOLUME_MOUNT_PATH: &str = "/logs";
const TLS_VOLUME_NAME: &str = "tls";
const TLS_MOUNT_PATH: &str = "/opt/tls";
const DEFAULT_RUN_AS_USER: i64 = 10001;
const DEFAULT_RUN_AS_GROUP: i64 = 10001;
const DEFAULT_FS_GROUP: i64 = 10001;

/// Annotation ignored when comparing workloads, kubectl owns it.
const LAST_APPLIED_ANNOTATION: &str = "kubectl.kubernetes.io/last-applied-configuration";

fn volume_claim_template_name(shard: i32) -> String {
    format!("{VOLUME_CLAIM_TEMPLATE_PREFIX}-{shard}")
}

fn env_value(name: &str, value: impl Into<String>) -> corev1::EnvVar {
    corev1::EnvVar {
        name: name.to_owned(),
        value: Some(value.into()),
        ..Default::default()
    }
}

fn env_from_secret(name: &str, secret: &str, key: &str) -> corev1::EnvVar {
    corev1::EnvVar {
        name: name.to_owned(),
        value_from: Some(corev1::EnvVarSource {
            secret_key_ref: Some(corev1::SecretKeySelector {
                name: secret.to_owned(),
                key: key.to_owned(),
                optional: Some(false),
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn json_differs<T: Serialize>(a: &T, b: &T) -> Result<bool, types::error::Error> {
    Ok(serde_json::to_value(a)? != serde_json::to_value(b)?)
}

fn missing(what: &str) -> types::error::Error {
    types::error::Error::InternalError {
        msg: format!("{what} missing spec"),
    }
}

impl Tenant {
    /// Value of `RUSTFS_VOLUMES`: one ellipsis pattern per pool, space separated, e.g.
    /// `http://{tenant}-{pool}-{0...3}.{tenant}-hl.{ns}.svc.{domain}:9000/data/rustfs{0...3}`.
    /// Every pool sees the full topology, so adding a pool changes all of them.
    fn rustfs_volumes_env_value(&self, cluster_domain: &str) -> Result<String, types::error::Error> {
        let namespace = self.namespace()?;
        let headless_service = self.headless_service_name();
        let scheme = if self.tls() { "https" } else { "http" };

        let volume_specs: Vec<String> = self
            .spec
            .pools
            .iter()
            .map(|pool| {
                format!(
                    "{scheme}://{}-{{0...{}}}.{headless_service}.{namespace}.svc.{cluster_domain}:{SERVER_PORT}{}/rustfs{{0...{}}}",
                    self.statefulset_name(pool),
                    pool.servers - 1,
                    pool.persistence.base_path(),
                    pool.persistence.volumes_per_server - 1
                )
            })
            .collect();

        Ok(volume_specs.join(" "))
    }

    fn volume_claim_templates(&self, pool: &Pool) -> Vec<corev1::PersistentVolumeClaim> {
        let spec = pool.persistence.claim_spec();

        let mut labels = self.pool_labels(pool);
        if let Some(user_labels) = &pool.persistence.labels {
            labels.extend(user_labels.clone());
        }

        (0..pool.persistence.volumes_per_server)
            .map(|i| corev1::PersistentVolumeClaim {
                metadata: metav1::ObjectMeta {
                    name: Some(volume_claim_template_name(i)),
                    labels: Some(labels.clone()),
                    annotations: pool.persistence.annotations.clone(),
                    ..Default::default()
                },
                spec: Some(spec.clone()),
                ..Default::default()
            })
            .collect()
    }

    /// Operator managed variables first, then `spec.env` which may override them.
    fn server_env(&self, cluster_domain: &str) -> Result<Vec<corev1::EnvVar>, types::error::Error> {
        let mut env_vars = vec![
            env_value("RUSTFS_VOLUMES", self.rustfs_volumes_env_value(cluster_domain)?),
            env_value("RUSTFS_ADDRESS", format!("0.0.0.0:{SERVER_PORT}")),
            env_value("RUSTFS_CONSOLE_ADDRESS", format!("0.0.0.0:{CONSOLE_PORT}")),
            env_value("RUSTFS_CONSOLE_ENABLE", "true"),
        ];

        if self.tls() {
            env_vars.push(env_value("RUSTFS_TLS_PATH", TLS_MOUNT_PATH));
        }

        if let Some(cfg) = &self.spec.creds_secret
            && !cfg.name.is_empty()
        {
            env_vars.push(env_from_secret("RUSTFS_ACCESS_KEY", &cfg.name, "accesskey"));
            env_vars.push(env_from_secret("RUSTFS_SECRET_KEY", &cfg.name, "secretkey"));
        }

        for user_env in &self.spec.env {
            env_vars.retain(|e| e.name != user_env.name);
            env_vars.push(user_env.clone());
        }

        Ok(env_vars)
    }

    fn tls_secret_name(&self) -> Option<String> {
        match &self.spec.external_cert_secret {
            Some(secret) => Some(secret.name.clone()),
            None if self.auto_cert() => Some(self.secret_name()),
            None => None,
        }
    }

    /// Desired StatefulSet of `pool`.
    pub fn new_statefulset(
        &self,
        pool: &Pool,
        cluster_domain: &str,
    ) -> Result<v1::StatefulSet, types::error::Error> {
        let labels = self.pool_labels(pool);

        let mut volume_mounts: Vec<corev1::VolumeMount> = (0..pool.persistence.volumes_per_server)
            .map(|i| corev1::VolumeMount {
                name: volume_claim_template_name(i),
                mount_path: format!("{}/rustfs{}", pool.persistence.base_path(), i),
                ..Default::default()
            })
            .collect();
        volume_mounts.push(corev1::VolumeMount {
            name: LOG_VOLUME_NAME.to_string(),
            mount_path: LOG_VOLUME_MOUNT_PATH.to_string(),
            ..Default::default()
        });

        let mut pod_volumes = vec![corev1::Volume {
            name: LOG_VOLUME_NAME.to_string(),
            empty_dir: Some(corev1::EmptyDirVolumeSource::default()),
            ..Default::default()
        }];

        if let Some(secret_name) = self.tls_secret_name() {
            let item = |key: &str, path: &str| corev1::KeyToPath {
                key: key.to_owned(),
                path: path.to_owned(),
                ..Default::default()
            };
            pod_volumes.push(corev1::Volume {
                name: TLS_VOLUME_NAME.to_string(),
                secret: Some(corev1::SecretVolumeSource {
                    secret_name: Some(secret_name),
                    items: Some(vec![
                        item("tls.crt", "rustfs_cert.pem"),
                        item("tls.key", "rustfs_key.pem"),
                    ]),
                    ..Default::default()
                }),
                ..Default::default()
            });
            volume_mounts.push(corev1::VolumeMount {
                name: TLS_VOLUME_NAME.to_string(),
                mount_path: TLS_MOUNT_PATH.to_string(),
                read_only: Some(true),
                ..Default::default()
            });
        }

        let container = corev1::Container {
            name: "rustfs".to_owned(),
            image: Some(self.image().to_owned()),
            env: Some(self.server_env(cluster_domain)?),
            ports: Some(vec![
                corev1::ContainerPort {
                    container_port: SERVER_PORT,
                    name: Some("http".to_owned()),
                    protocol: Some("TCP".to_owned()),
                    ..Default::default()
                },
                corev1::ContainerPort {
                    container_port: CONSOLE_PORT,
                    name: Some("console".to_owned()),
                    protocol: Some("TCP".to_owned()),
                    ..Default::default()
                },
            ]),
            volume_mounts: Some(volume_mounts),
            lifecycle: self.spec.lifecycle.clone(),
            resources: pool.scheduling.resources.clone(),
            image_pull_policy: self
                .spec
                .image_pull_policy
                .as_ref()
                .map(ToString::to_string),
            ..Default::default()
        };

        Ok(v1::StatefulSet {
            metadata: metav1::ObjectMeta {
                name: Some(self.statefulset_name(pool)),
                namespace: self.namespace().ok(),
                owner_references: Some(vec![self.new_owner_ref()]),
                labels: Some(labels.clone()),
                ..Default::default()
            },
            spec: Some(v1::StatefulSetSpec {
                replicas: Some(pool.servers),
                service_name: Some(self.headless_service_name()),
                pod_management_policy: self
                    .spec
                    .pod_management_policy
                    .as_ref()
                    .map(ToString::to_string),
                selector: metav1::LabelSelector {
                    match_labels: Some(self.pool_selector_labels(pool)),
                    ..Default::default()
                },
                template: corev1::PodTemplateSpec {
                    metadata: Some(metav1::ObjectMeta {
                        labels: Some(labels),
                        ..Default::default()
                    }),
                    spec: Some(corev1::PodSpec {
                        service_account_name: Some(self.service_account_name()),
                        containers: vec![container],
                        security_context: Some(corev1::PodSecurityContext {
                            run_as_user: Some(DEFAULT_RUN_AS_USER),
                            run_as_group: Some(DEFAULT_RUN_AS_GROUP),
                            fs_group: Some(DEFAULT_FS_GROUP),
                            fs_group_change_policy: Some("OnRootMismatch".to_string()),
                            ..Default::default()
                        }),
                        volumes: Some(pod_volumes),
                        image_pull_secrets: self.spec.image_pull_secret.clone().map(|s| vec![s]),
                        scheduler_name: self.spec.scheduler.clone(),
                        priority_class_name: pool
                            .scheduling
                            .priority_class_name
                            .clone()
                            .or_else(|| self.spec.priority_class_name.clone()),
                        node_selector: pool.scheduling.node_selector.clone(),
                        affinity: pool.scheduling.affinity.clone(),
                        tolerations: pool.scheduling.tolerations.clone(),
                        topology_spread_constraints: pool
                            .scheduling
                            .topology_spread_constraints
                            .clone(),
                        ..Default::default()
                    }),
                },
                volume_claim_templates: Some(self.volume_claim_templates(pool)),
                ..Default::default()
            }),
            ..Default::default()
        })
    }

    /// Whether `existing` drifted from the desired StatefulSet of `pool`: replicas, labels,
    /// annotations, pod placement and the server container (image, env, resources, mounts).
    pub fn statefulset_needs_update(
        &self,
        existing: &v1::StatefulSet,
        pool: &Pool,
        cluster_domain: &str,
    ) -> Result<bool, types::error::Error> {
        let desired = self.new_statefulset(pool, cluster_domain)?;

        let existing_spec = existing.spec.as_ref().ok_or_else(|| missing("existing StatefulSet"))?;
        let desired_spec = desired.spec.as_ref().ok_or_else(|| missing("desired StatefulSet"))?;

        if existing_spec.replicas != desired_spec.replicas
            || existing_spec.pod_management_policy != desired_spec.pod_management_policy
        {
            return Ok(true);
        }

        // the operator's labels must be present, extra labels added by others are fine
        let existing_labels = existing.metadata.labels.clone().unwrap_or_default();
        let labels_drifted = desired
            .metadata
            .labels
            .iter()
            .flatten()
            .any(|(k, v)| existing_labels.get(k) != Some(v));
        if labels_drifted {
            return Ok(true);
        }

        let annotations = |ss: &v1::StatefulSet| {
            let mut annotations = ss.metadata.annotations.clone().unwrap_or_default();
            annotations.remove(LAST_APPLIED_ANNOTATION);
            annotations
        };
        if !annotations(&desired).is_empty() && annotations(existing) != annotations(&desired) {
            return Ok(true);
        }

        let existing_template = &existing_spec.template;
        let desired_template = &desired_spec.template;

        if existing_template.metadata.as_ref().and_then(|m| m.labels.as_ref())
            != desired_template.metadata.as_ref().and_then(|m| m.labels.as_ref())
        {
            return Ok(true);
        }

        let existing_pod = existing_template.spec.as_ref().ok_or_else(|| missing("existing pod template"))?;
        let desired_pod = desired_template.spec.as_ref().ok_or_else(|| missing("desired pod template"))?;

        if existing_pod.service_account_name != desired_pod.service_account_name
            || existing_pod.scheduler_name != desired_pod.scheduler_name
            || existing_pod.priority_class_name != desired_pod.priority_class_name
            || existing_pod.node_selector != desired_pod.node_selector
            || json_differs(&existing_pod.affinity, &desired_pod.affinity)?
            || json_differs(&existing_pod.tolerations, &desired_pod.tolerations)?
            || json_differs(
                &existing_pod.topology_spread_constraints,
                &desired_pod.topology_spread_constraints,
            )?
            || json_differs(&existing_pod.volumes, &desired_pod.volumes)?
        {
            return Ok(true);
        }

        let (Some(existing_container), Some(desired_container)) =
            (existing_pod.containers.first(), desired_pod.containers.first())
        else {
            return Err(types::error::Error::InternalError {
                msg: "Pod spec missing container".to_string(),
            });
        };

        Ok(existing_container.image != desired_container.image
            || existing_container.image_pull_policy != desired_container.image_pull_policy
            || json_differs(&existing_container.env, &desired_container.env)?
            || json_differs(&existing_container.resources, &desired_container.resources)?
            || json_differs(&existing_container.lifecycle, &desired_container.lifecycle)?
            || json_differs(&existing_container.volume_mounts, &desired_container.volume_mounts)?)
    }

    /// Rejects updates touching StatefulSet fields the API server treats as immutable:
    /// the selector, the service name and the volume claim templates.
    pub fn validate_statefulset_update(
        &self,
        existing: &v1::StatefulSet,
        pool: &Pool,
        cluster_domain: &str,
    ) -> Result<(), types::error::Error> {
        let desired = self.new_statefulset(pool, cluster_domain)?;

        let existing_spec = existing.spec.as_ref().ok_or_else(|| missing("existing StatefulSet"))?;
        let desired_spec = desired.spec.as_ref().ok_or_else(|| missing("desired StatefulSet"))?;

        let name = existing.metadata.name.clone().unwrap_or_else(|| "<unknown>".to_string());
        let immutable = |field: String, message: String| types::error::Error::ImmutableFieldModified {
            name: name.clone(),
            field,
            message,
        };

        if json_differs(&existing_spec.selector, &desired_spec.selector)? {
            return Err(immutable(
                "spec.selector".to_string(),
                "StatefulSet selector cannot be modified. Pool name may have changed.".to_string(),
            ));
        }

        if existing_spec.service_name != desired_spec.service_name {
            return Err(immutable(
                "spec.serviceName".to_string(),
                "StatefulSet serviceName cannot be modified.".to_string(),
            ));
        }

        let existing_vcts = existing_spec.volume_claim_templates.clone().unwrap_or_default();
        let desired_vcts = desired_spec.volume_claim_templates.clone().unwrap_or_default();

        if existing_vcts.len() != desired_vcts.len() {
            return Err(immutable(
                "spec.volumeClaimTemplates".to_string(),
                format!(
                    "Cannot change volumesPerServer from {} to {}.",
                    existing_vcts.len(),
                    desired_vcts.len()
                ),
            ));
        }

        for (i, (existing_vct, desired_vct)) in existing_vcts.iter().zip(&desired_vcts).enumerate() {
            let existing_name = existing_vct.metadata.name.as_deref().unwrap_or_default();
            let desired_name = desired_vct.metadata.name.as_deref().unwrap_or_default();
            if existing_name != desired_name {
                return Err(immutable(
                    format!("spec.volumeClaimTemplates[{i}].metadata.name"),
                    format!("Volume claim template name changed from '{existing_name}' to '{desired_name}'."),
                ));
            }

            let storage_class = |vct: &corev1::PersistentVolumeClaim| {
                vct.spec.as_ref().and_then(|s| s.storage_class_name.clone())
            };
            if storage_class(existing_vct) != storage_class(desired_vct) {
                return Err(immutable(
                    format!("spec.volumeClaimTemplates[{i}].spec.storageClassName"),
                    format!(
                        "Storage class changed from '{:?}' to '{:?}'.",
                        storage_class(existing_vct),
                        storage_class(desired_vct)
                    ),
                ));
            }
        }

        Ok(())
    }

    /// `existing` with the desired pod template, update strategy and labels of `pool`. The
    /// replica count and the immutable fields are kept as they are.
    pub fn merge_statefulset(
        &self,
        existing: &v1::StatefulSet,
        pool: &Pool,
        cluster_domain: &str,
    ) -> Result<v1::StatefulSet, types::error::Error> {
        let desired = self.new_statefulset(pool, cluster_domain)?;
        let desired_spec = desired.spec.ok_or_else(|| missing("desired StatefulSet"))?;

        let mut merged = existing.clone();
        let labels = merged.metadata.labels.get_or_insert_with(Default::default);
        labels.extend(desired.metadata.labels.unwrap_or_default());

        let spec = merged.spec.get_or_insert_with(Default::default);
        spec.template = desired_spec.template;
        spec.update_strategy = desired_spec.update_strategy;
        spec.pod_management_policy = desired_spec.pod_management_policy;
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::{
        DEFAULT_FS_GROUP, DEFAULT_RUN_AS_USER, LOG_VOLUME_MOUNT_PATH, LOG_VOLUME_NAME, TLS_MOUNT_PATH,
    };
    use k8s_openapi::api::core::v1 as corev1;

    const DOMAIN: &str = "cluster.local";

    fn pod_spec(ss: k8s_openapi::api::apps::v1::StatefulSet) -> corev1::PodSpec {
        ss.spec
            .expect("StatefulSet should have spec")
            .template
            .spec
            .expect("Pod template should have spec")
    }

    #[test]
    fn test_statefulset_sets_security_context_and_log_volume() {
        let tenant = crate::tests::create_test_tenant(None, None);
        let pool = &tenant.spec.pools[0];

        let pod_spec = pod_spec(tenant.new_statefulset(pool, DOMAIN).expect("Should create StatefulSet"));

        let security_context = pod_spec.security_context.as_ref().expect("securityContext");
        assert_eq!(security_context.run_as_user, Some(DEFAULT_RUN_AS_USER));
        assert_eq!(security_context.fs_group, Some(DEFAULT_FS_GROUP));

        let volumes = pod_spec.volumes.as_ref().expect("volumes");
        assert!(volumes.iter().any(|v| v.name == LOG_VOLUME_NAME && v.empty_dir.is_some()));

        let log_mount = pod_spec.containers[0]
            .volume_mounts
            .as_ref()
            .and_then(|mounts| mounts.iter().find(|m| m.name == LOG_VOLUME_NAME))
            .expect("Container should mount logs volume");
        assert_eq!(log_mount.mount_path, LOG_VOLUME_MOUNT_PATH);
    }

    #[test]
    fn test_statefulset_volumes_env_spans_all_pools() {
        let mut tenant = crate::tests::create_test_tenant(None, None);
        let mut second = tenant.spec.pools[0].clone();
        second.name = "pool-1".to_string();
        second.servers = 2;
        tenant.spec.pools.push(second);

        let ss = tenant.new_statefulset(&tenant.spec.pools[0], "example.org").unwrap();
        let env = pod_spec(ss).containers[0].env.clone().unwrap();
        let volumes = env
            .iter()
            .find(|e| e.name == "RUSTFS_VOLUMES")
            .and_then(|e| e.value.clone())
            .expect("RUSTFS_VOLUMES should be set");

        assert_eq!(
            volumes,
            "http://test-tenant-pool-0-{0...3}.test-tenant-hl.default.svc.example.org:9000/data/rustfs{0...3} \
             http://test-tenant-pool-1-{0...1}.test-tenant-hl.default.svc.example.org:9000/data/rustfs{0...3}"
        );
    }

    #[test]
    fn test_statefulset_uses_custom_sa() {
        let tenant = crate::tests::create_test_tenant(Some("my-custom-sa".to_string()), Some(true));
        let pool = &tenant.spec.pools[0];

        let pod_spec = pod_spec(tenant.new_statefulset(pool, DOMAIN).unwrap());
        assert_eq!(pod_spec.service_account_name, Some("my-custom-sa".to_string()));
    }

    #[test]
    fn test_pool_priority_class_overrides_tenant() {
        let mut tenant = crate::tests::create_test_tenant(None, None);
        tenant.spec.priority_class_name = Some("tenant-priority".to_string());
        tenant.spec.pools[0].scheduling.priority_class_name = Some("pool-priority".to_string());

        let pod_spec = pod_spec(tenant.new_statefulset(&tenant.spec.pools[0], DOMAIN).unwrap());
        assert_eq!(pod_spec.priority_class_name, Some("pool-priority".to_string()));
    }

    #[test]
    fn test_auto_cert_mounts_tls_secret() {
        let mut tenant = crate::tests::create_test_tenant(None, None);
        tenant.spec.request_auto_cert = Some(true);

        let pod_spec = pod_spec(tenant.new_statefulset(&tenant.spec.pools[0], DOMAIN).unwrap());
        let tls = pod_spec
            .volumes
            .unwrap()
            .into_iter()
            .find(|v| v.secret.is_some())
            .expect("TLS secret volume");
        assert_eq!(tls.secret.unwrap().secret_name, Some("test-tenant-tls".to_string()));

        let env = pod_spec.containers[0].env.clone().unwrap();
        assert!(env.iter().any(|e| e.name == "RUSTFS_TLS_PATH" && e.value.as_deref() == Some(TLS_MOUNT_PATH)));
        let volumes = env.iter().find(|e| e.name == "RUSTFS_VOLUMES").unwrap();
        assert!(volumes.value.as_deref().unwrap().starts_with("https://"));
    }

    #[test]
    fn test_statefulset_no_update_needed() {
        let tenant = crate::tests::create_test_tenant(None, None);
        let pool = &tenant.spec.pools[0];
        let existing = tenant.new_statefulset(pool, DOMAIN).unwrap();

        assert!(!tenant.statefulset_needs_update(&existing, pool, DOMAIN).unwrap());
    }

    #[test]
    fn test_statefulset_image_change_detected() {
        let mut tenant = crate::tests::create_test_tenant(None, None);
        let existing = tenant.new_statefulset(&tenant.spec.pools[0], DOMAIN).unwrap();

        tenant.spec.image = Some("rustfs/rustfs:2.0.0".to_string());
        assert!(tenant.statefulset_needs_update(&existing, &tenant.spec.pools[0], DOMAIN).unwrap());
    }

    #[test]
    fn test_statefulset_env_change_detected() {
        let mut tenant = crate::tests::create_test_tenant(None, None);
        let existing = tenant.new_statefulset(&tenant.spec.pools[0], DOMAIN).unwrap();

        tenant.spec.env.push(corev1::EnvVar {
            name: "RUSTFS_REGION".to_string(),
            value: Some("eu-west-1".to_string()),
            ..Default::default()
        });
        assert!(tenant.statefulset_needs_update(&existing, &tenant.spec.pools[0], DOMAIN).unwrap());
    }

    #[test]
    fn test_statefulset_foreign_labels_ignored() {
        let tenant = crate::tests::create_test_tenant(None, None);
        let pool = &tenant.spec.pools[0];
        let mut existing = tenant.new_statefulset(pool, DOMAIN).unwrap();
        existing
            .metadata
            .labels
            .get_or_insert_with(Default::default)
            .insert("team".to_string(), "storage".to_string());

        assert!(!tenant.statefulset_needs_update(&existing, pool, DOMAIN).unwrap());
    }

    #[test]
    fn test_statefulset_volumes_per_server_change_rejected() {
        let mut tenant = crate::tests::create_test_tenant(None, None);
        let existing = tenant.new_statefulset(&tenant.spec.pools[0], DOMAIN).unwrap();

        tenant.spec.pools[0].persistence.volumes_per_server = 8;
        let err = tenant
            .validate_statefulset_update(&existing, &tenant.spec.pools[0], DOMAIN)
            .expect_err("volume count change must be rejected");
        assert!(err.to_string().contains("spec.volumeClaimTemplates"));
    }

    #[test]
    fn test_statefulset_safe_update_allowed() {
        let mut tenant = crate::tests::create_test_tenant(None, None);
        let existing = tenant.new_statefulset(&tenant.spec.pools[0], DOMAIN).unwrap();

        tenant.spec.image = Some("rustfs/rustfs:2.0.0".to_string());
        assert!(tenant
            .validate_statefulset_update(&existing, &tenant.spec.pools[0], DOMAIN)
            .is_ok());
    }

    #[test]
    fn test_merge_keeps_replicas_and_resource_version() {
        let mut tenant = crate::tests::create_test_tenant(None, None);
        let mut existing = tenant.new_statefulset(&tenant.spec.pools[0], DOMAIN).unwrap();
        existing.metadata.resource_version = Some("42".to_string());

        tenant.spec.pools[0].servers = 8;
        tenant.spec.image = Some("rustfs/rustfs:2.0.0".to_string());
        let merged = tenant
            .merge_statefulset(&existing, &tenant.spec.pools[0], DOMAIN)
            .unwrap();

        assert_eq!(merged.metadata.resource_version, Some("42".to_string()));
        let spec = merged.spec.unwrap();
        assert_eq!(spec.replicas, Some(4));
        assert_eq!(
            spec.template.spec.unwrap().containers[0].image,
            Some("rustfs/rustfs:2.0.0".to_string())
        );
    }
}
