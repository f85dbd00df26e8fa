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

//! Server and client certificates of a tenant.
//!
//! Certificates are issued outside the operator (cert-manager or by hand). This module only checks
//! that the secrets the servers mount exist and hold a matching key pair.

use crate::context;
use crate::context::Store;
use crate::types;
use crate::types::v1alpha1::tenant::Tenant;
use crate::utils::tls;
use async_trait::async_trait;
use snafu::Snafu;
use std::sync::Arc;

#[cfg(test)]
use mockall::automock;

#[derive(Snafu, Debug)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("waiting for certificate secret '{}'", name))]
    Missing { name: String },

    #[snafu(display("certificate secret '{}' is invalid: {}", name, source))]
    Invalid { name: String, source: tls::Error },

    #[snafu(transparent)]
    Context { source: context::Error },

    #[snafu(transparent)]
    Types { source: types::error::Error },
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait CertificateManager: Send + Sync {
    /// Ensures the certificate servers present to clients is available.
    async fn ensure_server_cert(&self, tenant: &Tenant) -> Result<(), Error>;

    /// Ensures the certificate servers present to other services is available.
    async fn ensure_client_cert(&self, tenant: &Tenant) -> Result<(), Error>;
}

pub struct SecretCertificates {
    store: Arc<dyn Store>,
}

impl SecretCertificates {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    async fn check(&self, tenant: &Tenant, name: &str) -> Result<(), Error> {
        let secret = self
            .store
            .get_secret(&tenant.namespace()?, name)
            .await?
            .ok_or_else(|| Error::Missing {
                name: name.to_owned(),
            })?;

        tls::secret_key_pair(&secret).map_err(|source| Error::Invalid {
            name: name.to_owned(),
            source,
        })
    }
}

#[async_trait]
impl CertificateManager for SecretCertificates {
    async fn ensure_server_cert(&self, tenant: &Tenant) -> Result<(), Error> {
        if let Some(external) = &tenant.spec.external_cert_secret {
            return self.check(tenant, &external.name).await;
        }
        if tenant.auto_cert() {
            return self.check(tenant, &tenant.secret_name()).await;
        }
        Ok(())
    }

    async fn ensure_client_cert(&self, tenant: &Tenant) -> Result<(), Error> {
        match &tenant.spec.external_client_cert_secret {
            Some(secret) => self.check(tenant, &secret.name).await,
            None => Ok(()),
        }
    }
}
