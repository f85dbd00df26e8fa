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

mod status;
pub mod store;

use crate::admin::AdminConnector;
use crate::artifact::ArtifactStore;
use crate::certificate::CertificateManager;
use crate::config::Config;
use crate::types;
use crate::types::v1alpha1::tenant::Tenant;
use kube::runtime::events::EventType;
use snafu::Snafu;
use std::sync::Arc;
use tracing::warn;

pub use store::{KubeStore, Store};

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("Kubernetes API error: {}", source))]
    Kube { source: kube::Error },

    #[snafu(display("record event error: {}", source))]
    Record { source: kube::Error },

    #[snafu(transparent)]
    Types { source: types::error::Error },

    #[snafu(display("{} '{}' not found", kind, name))]
    NotFound { kind: String, name: String },

    #[snafu(display("{} '{}' was modified concurrently", kind, name))]
    Conflict { kind: String, name: String },

    #[snafu(transparent)]
    Serde { source: serde_json::Error },
}

impl Error {
    fn api_code(&self) -> Option<u16> {
        match self {
            Error::Kube {
                source: kube::Error::Api(e),
            } => Some(e.code),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. }) || self.api_code() == Some(404)
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Conflict { .. }) || self.api_code() == Some(409)
    }
}

/// Everything a reconcile pass talks to.
#[derive(Clone)]
pub struct Context {
    pub store: Arc<dyn Store>,
    pub admin: Arc<dyn AdminConnector>,
    pub certificates: Arc<dyn CertificateManager>,
    pub artifacts: Arc<dyn ArtifactStore>,
    pub config: Arc<Config>,
}

impl Context {
    pub fn new(
        store: Arc<dyn Store>,
        admin: Arc<dyn AdminConnector>,
        certificates: Arc<dyn CertificateManager>,
        artifacts: Arc<dyn ArtifactStore>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            store,
            admin,
            certificates,
            artifacts,
            config,
        }
    }

    /// send event
    #[inline]
    pub async fn record(
        &self,
        resource: &Tenant,
        event_type: EventType,
        reason: &str,
        message: &str,
    ) -> Result<(), Error> {
        self.store
            .publish_event(resource, event_type, reason, message)
            .await
    }

    /// Like [`Context::record`] but only logs a failure, events are best effort.
    pub async fn notify(&self, resource: &Tenant, event_type: EventType, reason: &str, message: &str) {
        if let Err(e) = self.record(resource, event_type, reason, message).await {
            warn!(tenant = %resource.key(), reason, "failed to record event: {e}");
        }
    }
}
