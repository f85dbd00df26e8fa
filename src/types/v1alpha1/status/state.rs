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

//! Tenant progress states.
//!
//! `status.currentState` is the only progress signal external tooling sees, so every state
//! renders to a fixed human readable string and parses back from it.
//!
//! | state                        | entered when                                          | retried |
//! |------------------------------|-------------------------------------------------------|---------|
//! | `CredentialsNotSet`          | credentials secret is malformed                        | no      |
//! | `CredentialsNotSet`          | credentials secret does not exist yet                  | yes     |
//! | `NotOwned`                   | a pool StatefulSet is not controlled by the tenant     | no      |
//! | `DecommissioningNotAllowed`  | pools shrink while spec pool names are empty or shared | no      |
//! | `InvalidConfiguration`       | spec validation failed                                 | no      |
//! | `MultipleTenants`            | another tenant lives in the namespace                  | no      |
//! | `ServerCountImmutable`       | a pool's server count was edited                       | no      |
//! | `Restarting`                 | topology changed and a live restart was issued         | yes     |
//! | `WaitingForCertificate`      | TLS secret not available yet                           | yes     |
//! | `ProvisioningStatefulSet`    | a pool StatefulSet is being created                    | yes     |
//! | `InconsistentVersions`       | pools run different images                             | yes     |
//! | `UpdatingVersion`            | the binary upgrade is running                          | yes     |
//! | `UpdateFailed`               | the in-place binary update reported an error           | yes     |
//! | `WaitingForHealthy`          | the cluster has not reported green yet                 | yes     |
//! | `ProvisioningUsers`          | initial users are being created                        | yes     |
//! | `ProvisioningBuckets`        | default buckets are being created                      | yes     |
//! | `Initialized`                | a reconcile pass completed                             |         |

use schemars::{JsonSchema, Schema, SchemaGenerator, json_schema};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::str::FromStr;
use strum::{Display, EnumIter, EnumString};

const SERVER_COUNT_PREFIX: &str = "Can't modify server count for pool ";
const INVALID_CONFIGURATION_PREFIX: &str = "Tenant configuration invalid: ";
const UPDATE_FAILED_PREFIX: &str = "RustFS update failed: ";

#[derive(
    Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq, Display, EnumIter, EnumString,
)]
#[serde(from = "String", into = "String")]
pub enum State {
    /// Nothing recorded yet.
    #[default]
    #[strum(to_string = "")]
    Unset,
    #[strum(to_string = "Initialized")]
    Initialized,
    #[strum(to_string = "Provisioning RustFS Statefulset")]
    ProvisioningStatefulSet,
    #[strum(to_string = "Provisioning initial users")]
    ProvisioningUsers,
    #[strum(to_string = "Provisioning default buckets")]
    ProvisioningBuckets,
    #[strum(to_string = "Waiting for Tenant to be healthy")]
    WaitingForHealthy,
    #[strum(to_string = "Waiting for RustFS TLS Certificate")]
    WaitingForCertificate,
    #[strum(to_string = "Updating RustFS Version")]
    UpdatingVersion,
    #[strum(to_string = "RustFS update failed: {reason}")]
    UpdateFailed { reason: String },
    #[strum(to_string = "Statefulset not controlled by operator")]
    NotOwned,
    #[strum(to_string = "Another RustFS Tenant already exists in the namespace")]
    MultipleTenants,
    #[strum(to_string = "Tenant credentials are not set properly")]
    CredentialsNotSet,
    #[strum(to_string = "Different versions across RustFS Pools")]
    InconsistentVersions,
    #[strum(to_string = "Restarting RustFS")]
    Restarting,
    #[strum(to_string = "Pool Decommissioning Not Allowed")]
    DecommissioningNotAllowed,
    #[strum(to_string = "Tenant configuration invalid: {reason}")]
    InvalidConfiguration { reason: String },
    #[strum(to_string = "Can't modify server count for pool {pool}")]
    ServerCountImmutable { pool: String },
    /// A state written by a different operator version.
    #[strum(default, transparent)]
    Other(String),
}

impl From<String> for State {
    fn from(value: String) -> Self {
        if let Some(pool) = value.strip_prefix(SERVER_COUNT_PREFIX) {
            return State::ServerCountImmutable {
                pool: pool.to_owned(),
            };
        }
        if let Some(reason) = value.strip_prefix(INVALID_CONFIGURATION_PREFIX) {
            return State::InvalidConfiguration {
                reason: reason.to_owned(),
            };
        }
        if let Some(reason) = value.strip_prefix(UPDATE_FAILED_PREFIX) {
            return State::UpdateFailed {
                reason: reason.to_owned(),
            };
        }

        State::from_str(&value).unwrap_or(State::Other(value))
    }
}

impl From<State> for String {
    fn from(value: State) -> Self {
        value.to_string()
    }
}

impl JsonSchema for State {
    fn schema_name() -> Cow<'static, str> {
        Cow::Borrowed("State")
    }
    fn schema_id() -> Cow<'static, str> {
        Cow::Borrowed(concat!(module_path!(), "::", "State"))
    }
    fn json_schema(_generator: &mut SchemaGenerator) -> Schema {
        json_schema! {
            {"type": "string"}
        }
    }
}
