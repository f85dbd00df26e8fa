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
use k8s_openapi::api::core::v1 as corev1;
use k8s_openapi::apimachinery::pkg::apis::meta::v1 as metav1;
use k8s_openapi::apimachinery::pkg::util::intstr;

fn port(name: &str, port: i32) -> corev1::ServicePort {
    corev1::ServicePort {
        port,
        target_port: Some(intstr::IntOrString::Int(port)),
        name: Some(name.to_owned()),
        protocol: Some("TCP".to_owned()),
        ..Default::default()
    }
}

impl Tenant {
    fn service_metadata(&self, name: String) -> metav1::ObjectMeta {
        metav1::ObjectMeta {
            name: Some(name),
            namespace: self.namespace().ok(),
            owner_references: Some(vec![self.new_owner_ref()]),
            labels: Some(self.common_labels()),
            ..Default::default()
        }
    }

    /// S3 endpoint balanced across every server of every pool.
    pub fn new_io_service(&self) -> corev1::Service {
        let name = if self.tls() { "https-rustfs" } else { "http-rustfs" };
        corev1::Service {
            metadata: self.service_metadata(self.io_service_name()),
            spec: Some(corev1::ServiceSpec {
                type_: Some("ClusterIP".to_owned()),
                selector: Some(self.selector_labels()),
                ports: Some(vec![port(name, SERVER_PORT)]),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    pub fn new_console_service(&self) -> corev1::Service {
        corev1::Service {
            metadata: self.service_metadata(self.console_service_name()),
            spec: Some(corev1::ServiceSpec {
                type_: Some("ClusterIP".to_owned()),
                selector: Some(self.selector_labels()),
                ports: Some(vec![port("http-console", CONSOLE_PORT)]),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    /// Headless service giving each server a stable DNS name. Not-ready addresses are
    /// published so servers can find each other before the cluster reaches quorum.
    pub fn new_headless_service(&self) -> corev1::Service {
        corev1::Service {
            metadata: self.service_metadata(self.headless_service_name()),
            spec: Some(corev1::ServiceSpec {
                type_: Some("ClusterIP".to_owned()),
                cluster_ip: Some("None".to_owned()),
                publish_not_ready_addresses: Some(true),
                selector: Some(self.selector_labels()),
                ports: Some(vec![port("http-rustfs", SERVER_PORT)]),
                ..Default::default()
            }),
            ..Default::default()
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    #[test]
    fn test_headless_service_publishes_not_ready_addresses() {
        let tenant = crate::tests::create_test_tenant(None, None);

        let svc = tenant.new_headless_service();
        let spec = svc.spec.expect("service spec");

        assert_eq!(svc.metadata.name, Some("test-tenant-hl".to_string()));
        assert_eq!(spec.cluster_ip, Some("None".to_string()));
        assert_eq!(spec.publish_not_ready_addresses, Some(true));
        assert_eq!(
            spec.selector.unwrap().get("rustfs.tenant"),
            Some(&"test-tenant".to_string())
        );
    }

    #[test]
    fn test_io_service_port_name_follows_tls() {
        let mut tenant = crate::tests::create_test_tenant(None, None);
        let ports = tenant.new_io_service().spec.unwrap().ports.unwrap();
        assert_eq!(ports[0].name, Some("http-rustfs".to_string()));
        assert_eq!(ports[0].port, 9000);

        tenant.spec.request_auto_cert = Some(true);
        let ports = tenant.new_io_service().spec.unwrap().ports.unwrap();
        assert_eq!(ports[0].name, Some("https-rustfs".to_string()));
    }
}
