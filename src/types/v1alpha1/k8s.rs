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

//! Kubernetes enum types shared by the Tenant spec.

use k8s_openapi::schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Pod management policy for the pool StatefulSets.
///
/// Pools default to `Parallel`: every server of a pool must be reachable before the
/// erasure sets come online, so ordered startup only delays the first quorum.
///
/// https://kubernetes.io/docs/tutorials/stateful-application/basic-stateful-set/#pod-management-policy
#[derive(
    Default, Deserialize, Serialize, Clone, Copy, Debug, JsonSchema, Display, EnumString, PartialEq, Eq,
)]
#[serde(rename_all = "PascalCase")]
#[schemars(rename_all = "PascalCase")]
pub enum PodManagementPolicy {
    #[strum(to_string = "OrderedReady")]
    OrderedReady,

    #[strum(to_string = "Parallel")]
    #[default]
    Parallel,
}

/// https://kubernetes.io/docs/concepts/containers/images/#image-pull-policy
#[derive(
    Default, Deserialize, Serialize, Clone, Copy, Debug, JsonSchema, Display, EnumString, PartialEq, Eq,
)]
#[serde(rename_all = "PascalCase")]
#[schemars(rename_all = "PascalCase")]
pub enum ImagePullPolicy {
    #[strum(to_string = "Always")]
    Always,

    #[strum(to_string = "Never")]
    Never,

    #[strum(to_string = "IfNotPresent")]
    #[default]
    IfNotPresent,
}
