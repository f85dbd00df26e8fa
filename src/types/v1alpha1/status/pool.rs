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

use kube::KubeSchema;
use schemars::{JsonSchema, Schema, SchemaGenerator, json_schema};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use strum::Display;

#[derive(Deserialize, Serialize, Clone, Debug, KubeSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Pool {
    pub ss_name: String,
    pub state: PoolState,
}

/// Provisioning state of a pool. Only ever advances in declaration order.
#[derive(Deserialize, Serialize, Clone, Copy, Debug, Display, PartialEq, Eq, PartialOrd, Ord)]
pub enum PoolState {
    #[strum(serialize = "PoolNotCreated")]
    #[serde(rename = "PoolNotCreated")]
    NotCreated,

    #[strum(serialize = "PoolCreated")]
    #[serde(rename = "PoolCreated")]
    Created,

    #[strum(serialize = "PoolInitialized")]
    #[serde(rename = "PoolInitialized")]
    Initialized,
}

impl JsonSchema for PoolState {
    fn schema_name() -> Cow<'static, str> {
        Cow::Borrowed("PoolState")
    }
    fn schema_id() -> Cow<'static, str> {
        Cow::Borrowed(concat!(module_path!(), "::", "PoolState"))
    }
    fn json_schema(_generator: &mut SchemaGenerator) -> Schema {
        json_schema! {
            {
                "type": "string",
                "enum": ["PoolNotCreated", "PoolCreated", "PoolInitialized"]
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_state_wire_format() {
        let pool = Pool {
            ss_name: "t-pool-0".to_string(),
            state: PoolState::Initialized,
        };
        let json = serde_json::to_value(&pool).expect("serialize pool status");
        assert_eq!(json["ssName"], "t-pool-0");
        assert_eq!(json["state"], "PoolInitialized");
        assert_eq!(PoolState::Created.to_string(), "PoolCreated");
    }

    #[test]
    fn test_pool_state_order() {
        assert!(PoolState::NotCreated < PoolState::Created);
        assert!(PoolState::Created < PoolState::Initialized);
    }
}
