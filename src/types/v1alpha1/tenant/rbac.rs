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

use super::Tenant;
use k8s_openapi::Resource as _;
use k8s_openapi::api::core::v1 as corev1;
use k8s_openapi::api::rbac::v1 as rbacv1;
use k8s_openapi::apimachinery::pkg::apis::meta::v1 as metav1;
use kube::{Resource, ResourceExt};

fn rule(api_group: &str, resource: &str, verbs: &[&str]) -> rbacv1::PolicyRule {
    rbacv1::PolicyRule {
        api_groups: Some(vec![api_group.to_owned()]),
        resources: Some(vec![resource.to_owned()]),
        verbs: verbs.iter().map(|v| (*v).to_owned()).collect(),
        ..Default::default()
    }
}

impl Tenant {
    fn rbac_metadata(&self, name: String) -> metav1::ObjectMeta {
        metav1::ObjectMeta {
            name: Some(name),
            namespace: self.namespace().ok(),
            owner_references: Some(vec![self.new_owner_ref()]),
            labels: Some(self.common_labels()),
            ..Default::default()
        }
    }

    pub fn new_role_binding(&self, sa_name: &str, role: &rbacv1::Role) -> rbacv1::RoleBinding {
        rbacv1::RoleBinding {
            metadata: self.rbac_metadata(self.role_binding_name()),
            subjects: Some(vec![rbacv1::Subject {
                kind: corev1::ServiceAccount::KIND.to_owned(),
                namespace: self.namespace().ok(),
                name: sa_name.to_owned(),
                ..Default::default()
            }]),
            role_ref: rbacv1::RoleRef {
                api_group: rbacv1::Role::GROUP.to_owned(),
                kind: rbacv1::Role::KIND.to_owned(),
                name: role.name_any(),
            },
        }
    }

    /// Permissions of the server pods: read their secrets and tenant, manage their services.
    pub fn new_role(&self) -> rbacv1::Role {
        rbacv1::Role {
            metadata: self.rbac_metadata(self.role_name()),
            rules: Some(vec![
                rule("", "secrets", &["get", "list", "watch"]),
                rule("", "services", &["create", "delete", "get"]),
                rule(
                    &Self::group(&()),
                    &Self::plural(&()),
                    &["get", "list", "watch"],
                ),
            ]),
        }
    }

    pub fn new_service_account(&self) -> corev1::ServiceAccount {
        corev1::ServiceAccount {
            metadata: self.rbac_metadata(self.service_account_name()),
            ..Default::default()
        }
    }

    /// Whether the operator manages the role (and binding) of this tenant's service account.
    pub fn manages_rbac(&self) -> bool {
        let custom_sa = self.spec.service_account_name.is_some();
        !custom_sa || self.spec.create_service_account_rbac.unwrap_or(false)
    }
}
