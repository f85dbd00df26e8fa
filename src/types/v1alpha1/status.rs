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

pub mod certificate;
pub mod health;
pub mod pool;
pub mod state;

use k8s_openapi::apimachinery::pkg::apis::meta::v1 as metav1;
use kube::KubeSchema;
use serde::{Deserialize, Serialize};

#[derive(Deserialize, Serialize, Clone, Debug, KubeSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Status {
    #[serde(default)]
    pub current_state: state::State,

    #[serde(default)]
    pub available_replicas: i32,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pools: Vec<pool::Pool>,

    /// Last operator migration checkpoint applied to this tenant.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub sync_version: String,

    #[serde(default)]
    pub certificates: certificate::Status,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_status: Option<health::HealthStatus>,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub health_message: String,

    #[serde(default)]
    pub drives_online: i32,

    #[serde(default)]
    pub drives_offline: i32,

    #[serde(default)]
    pub drives_healing: i32,

    #[serde(default)]
    pub write_quorum: i32,

    #[serde(default)]
    pub usage: health::Usage,

    #[serde(default)]
    pub provisioned_users: bool,

    #[serde(default)]
    pub provisioned_buckets: bool,

    /// Set when a restart was issued; cleared once the tenant is healthy again or after a timeout.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub waiting_on_ready: Option<metav1::Time>,
}

impl Status {
    pub fn pool(&self, ss_name: &str) -> Option<&pool::Pool> {
        self.pools.iter().find(|p| p.ss_name == ss_name)
    }

    pub fn pool_mut(&mut self, ss_name: &str) -> Option<&mut pool::Pool> {
        self.pools.iter_mut().find(|p| p.ss_name == ss_name)
    }

    /// Records `state` for the pool, appending an entry when the pool is not tracked yet.
    pub fn set_pool_state(&mut self, ss_name: &str, state: pool::PoolState) {
        match self.pool_mut(ss_name) {
            Some(p) => p.state = state,
            None => self.pools.push(pool::Pool {
                ss_name: ss_name.to_owned(),
                state,
            }),
        }
    }

    /// Like [`Status::set_pool_state`] but never moves a pool back to an earlier state.
    pub fn advance_pool_state(&mut self, ss_name: &str, state: pool::PoolState) {
        match self.pool_mut(ss_name) {
            Some(p) if p.state >= state => {}
            _ => self.set_pool_state(ss_name, state),
        }
    }

    pub fn all_pools_initialized(&self) -> bool {
        self.pools
            .iter()
            .all(|p| p.state == pool::PoolState::Initialized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pool::PoolState;

    #[test]
    fn test_pool_state_never_goes_back() {
        let mut status = Status::default();
        status.advance_pool_state("t-pool-0", PoolState::NotCreated);
        status.advance_pool_state("t-pool-0", PoolState::Initialized);
        status.advance_pool_state("t-pool-0", PoolState::Created);

        assert_eq!(status.pools.len(), 1);
        assert_eq!(status.pools[0].state, PoolState::Initialized);
        assert!(status.all_pools_initialized());
    }

    #[test]
    fn test_wire_format() {
        let status: Status = serde_json::from_value(serde_json::json!({
            "currentState": "Initialized",
            "pools": [{"ssName": "t-pool-0", "state": "PoolCreated"}],
            "syncVersion": "v1.1.0",
        }))
        .unwrap();

        assert_eq!(status.current_state, state::State::Initialized);
        assert_eq!(status.pool("t-pool-0").map(|p| p.state), Some(PoolState::Created));
        assert!(!status.all_pools_initialized());
    }
}
