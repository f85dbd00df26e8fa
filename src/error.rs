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

use crate::{admin, artifact, certificate, context, types};
use snafu::Snafu;

#[derive(Snafu, Debug)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(transparent)]
    Context { source: context::Error },

    #[snafu(transparent)]
    Types { source: types::error::Error },

    #[snafu(transparent)]
    Admin { source: admin::Error },

    #[snafu(transparent)]
    Certificate { source: certificate::Error },

    #[snafu(transparent)]
    Artifact { source: artifact::Error },

    #[snafu(display("tenant credentials are invalid: {}", reason))]
    CredentialsInvalid { reason: String },

    #[snafu(display("pool decommission is not allowed: {}", reason))]
    DecommissionNotAllowed { reason: String },

    #[snafu(display("another tenant already exists in namespace {}", namespace))]
    MultipleTenants { namespace: String },

    #[snafu(display("statefulset {} is not controlled by the operator", name))]
    NotOwned { name: String },

    #[snafu(display("waiting for all pools to initialize"))]
    WaitingForPools,

    #[snafu(display("tenant is not healthy"))]
    NotHealthy,

    #[snafu(display("pools run different versions: {}", images.join(", ")))]
    InconsistentVersions { images: Vec<String> },

    #[snafu(display("rustfs update failed: {}", reason))]
    UpdateFailed { reason: String },

    #[snafu(display("sync version {} is older than the oldest supported {}", version, minimum))]
    SyncVersionTooOld { version: String, minimum: String },

    #[snafu(display("invalid reconcile key '{}'", key))]
    InvalidKey { key: String },

    #[snafu(display("no running pod in pool {}", pool))]
    NoRunningPod { pool: String },
}

impl Error {
    /// Terminal errors are recorded in the tenant status and not retried.
    pub fn is_terminal(&self) -> bool {
        match self {
            Error::Types {
                source:
                    types::error::Error::InvalidSpec { .. }
                    | types::error::Error::ImmutableFieldModified { .. }
                    | types::error::Error::InvalidVersion { .. },
            } => true,
            Error::CredentialsInvalid { .. }
            | Error::DecommissionNotAllowed { .. }
            | Error::MultipleTenants { .. }
            | Error::NotOwned { .. }
            | Error::SyncVersionTooOld { .. }
            | Error::InvalidKey { .. } => true,
            _ => false,
        }
    }

    pub fn is_not_found(&self) -> bool {
        match self {
            Error::Context { source } => source.is_not_found(),
            Error::Certificate {
                source: certificate::Error::Context { source },
            } => source.is_not_found(),
            _ => false,
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Context { source } if source.is_conflict())
    }
}
