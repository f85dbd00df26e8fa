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

use k8s_openapi::api::core::v1 as corev1;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use kube::KubeSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const DEFAULT_VOLUME_SIZE: &str = "10Gi";

#[derive(Deserialize, Serialize, Clone, Debug, KubeSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PersistenceConfig {
    #[x_kube(validation = Rule::new("self > 0").message("volumesPerServer must be greater than 0"))]
    pub volumes_per_server: i32,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume_claim_template: Option<corev1::PersistentVolumeClaimSpec>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[x_kube(validation = Rule::new("self != ''").message("path must be not empty when specified"))]
    pub path: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<BTreeMap<String, String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotations: Option<BTreeMap<String, String>>,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            volumes_per_server: 4,
            volume_claim_template: None,
            path: None,
            labels: None,
            annotations: None,
        }
    }
}

impl PersistenceConfig {
    /// The claim spec used for every volume of a server, `ReadWriteOnce` 10Gi when unset.
    pub fn claim_spec(&self) -> corev1::PersistentVolumeClaimSpec {
        self.volume_claim_template.clone().unwrap_or_else(|| {
            corev1::PersistentVolumeClaimSpec {
                access_modes: Some(vec!["ReadWriteOnce".to_string()]),
                resources: Some(corev1::VolumeResourceRequirements {
                    requests: Some(BTreeMap::from([(
                        "storage".to_string(),
                        Quantity(DEFAULT_VOLUME_SIZE.to_string()),
                    )])),
                    ..Default::default()
                }),
                ..Default::default()
            }
        })
    }

    /// Requested storage of a single volume in bytes.
    pub fn volume_bytes(&self) -> Option<i64> {
        self.claim_spec()
            .resources
            .and_then(|r| r.requests)
            .and_then(|requests| requests.get("storage").and_then(quantity_bytes))
    }

    pub fn base_path(&self) -> &str {
        self.path.as_deref().unwrap_or("/data").trim_end_matches('/')
    }
}

/// Converts a storage quantity such as `10Gi` or `500M` into bytes.
pub fn quantity_bytes(quantity: &Quantity) -> Option<i64> {
    const SUFFIXES: [(&str, f64); 12] = [
        ("Ki", 1024f64),
        ("Mi", 1048576f64),
        ("Gi", 1073741824f64),
        ("Ti", 1099511627776f64),
        ("Pi", 1125899906842624f64),
        ("Ei", 1152921504606846976f64),
        ("k", 1e3),
        ("M", 1e6),
        ("G", 1e9),
        ("T", 1e12),
        ("P", 1e15),
        ("E", 1e18),
    ];

    let value = quantity.0.trim();
    let (number, multiplier) = SUFFIXES
        .iter()
        .find_map(|(suffix, m)| value.strip_suffix(suffix).map(|n| (n, *m)))
        .unwrap_or((value, 1f64));

    let parsed: f64 = number.parse().ok()?;
    if !parsed.is_finite() || parsed < 0f64 {
        return None;
    }
    Some((parsed * multiplier) as i64)
}
