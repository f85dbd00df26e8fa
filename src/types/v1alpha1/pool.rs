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

use crate::types;
use crate::types::v1alpha1::persistence::PersistenceConfig;
use k8s_openapi::api::core::v1 as corev1;
use kube::KubeSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Deserialize, Serialize, Clone, Debug, KubeSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Pool {
    /// Assigned as `pool-{index}` when left empty. Must stay stable once set: the pool's
    /// StatefulSet and status entry are named after it.
    #[serde(default)]
    pub name: String,

    #[x_kube(validation = Rule::new("self > 0").message("servers must be greater than 0"))]
    pub servers: i32,

    pub persistence: PersistenceConfig,

    #[serde(flatten)]
    pub scheduling: SchedulingConfig,
}

/// Pod placement and resources applied to every server of a pool.
#[derive(Deserialize, Serialize, Clone, Debug, KubeSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SchedulingConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_selector: Option<BTreeMap<String, String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affinity: Option<corev1::Affinity>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tolerations: Option<Vec<corev1::Toleration>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topology_spread_constraints: Option<Vec<corev1::TopologySpreadConstraint>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<corev1::ResourceRequirements>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority_class_name: Option<String>,
}

impl Pool {
    /// Checks the erasure coding minimums and the volume claim of the pool at `index`.
    pub fn validate(&self, index: usize) -> Result<(), types::error::Error> {
        let invalid = |reason: String| types::error::Error::InvalidSpec { reason };

        if self.servers <= 0 {
            return Err(invalid(format!("pool #{index} cannot have 0 servers")));
        }

        let volumes = self.persistence.volumes_per_server;
        if volumes <= 0 {
            return Err(invalid(format!("pool #{index} cannot have 0 volumes per server")));
        }

        if self.servers * volumes < 4 {
            let minimum = if self.servers == 1 { 4 } else { 2 };
            return Err(invalid(format!(
                "pool #{index} setup must have a minimum of {minimum} volumes per server"
            )));
        }

        let claim = self.persistence.claim_spec();
        if claim.access_modes.as_ref().is_none_or(Vec::is_empty) {
            return Err(invalid(format!(
                "pool #{index} volume claim template must declare access modes"
            )));
        }

        if self.persistence.volume_bytes().is_none_or(|bytes| bytes <= 0) {
            return Err(invalid(format!(
                "pool #{index} volume claim template must request storage"
            )));
        }

        Ok(())
    }

    /// Raw capacity of the pool in bytes, before erasure coding.
    pub fn raw_capacity(&self) -> i64 {
        let per_volume = self.persistence.volume_bytes().unwrap_or_default();
        i64::from(self.servers) * i64::from(self.persistence.volumes_per_server) * per_volume
    }
}
