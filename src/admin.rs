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

//! Client for the admin API of a running tenant.

use crate::types::v1alpha1::tenant::{Bucket, Tenant};
use crate::utils::sigv4::{self, Signer};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use snafu::{ResultExt, Snafu};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use tracing::debug;
use url::Url;

#[cfg(test)]
use mockall::automock;

const ADMIN_PREFIX: &str = "/rustfs/admin/v3";
const HEALTH_PATH: &str = "/rustfs/health/cluster";
const WRITE_QUORUM_HEADER: &str = "x-rustfs-write-quorum";
const HEALING_DRIVES_HEADER: &str = "x-rustfs-healing-drives";
const REGION: &str = "us-east-1";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);
const HEALTH_TIMEOUT: Duration = Duration::from_secs(60);
const STORAGE_INFO_TIMEOUT: Duration = Duration::from_secs(120);

/// Policy attached to users provisioned from the tenant spec.
pub const CONSOLE_ADMIN_POLICY: &str = "consoleAdmin";

#[derive(Snafu, Debug)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("invalid admin endpoint '{}': {}", endpoint, source))]
    InvalidEndpoint {
        endpoint: String,
        source: url::ParseError,
    },

    #[snafu(display("build http client error: {}", source))]
    Build { source: reqwest::Error },

    #[snafu(display("admin request {} failed: {}", path, source))]
    Request { path: String, source: reqwest::Error },

    #[snafu(display("admin request {} returned {}: {}", path, status, message))]
    Status {
        path: String,
        status: u16,
        message: String,
    },

    #[snafu(display("{} is not supported by the server", path))]
    NotSupported { path: String },

    #[snafu(display("sign admin request {} error: {}", path, source))]
    Sign { path: String, source: sigv4::Error },

    #[snafu(display("invalid admin response from {}: {}", path, source))]
    Decode {
        path: String,
        source: serde_json::Error,
    },
}

impl Error {
    pub fn is_not_supported(&self) -> bool {
        matches!(self, Error::NotSupported { .. })
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub access_key: String,
    pub secret_key: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key", &self.access_key)
            .field("secret_key", &"***")
            .finish()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ClusterHealth {
    pub healthy: bool,
    pub write_quorum: i32,
    pub healing_drives: i32,
}

#[derive(Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ServerUpdateStatus {
    pub server: String,
    #[serde(default)]
    pub current_version: String,
    #[serde(default)]
    pub updated_version: String,
    #[serde(default)]
    pub err: Option<String>,
}

#[derive(Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ServerUpdateResult {
    #[serde(default)]
    pub results: Vec<ServerUpdateStatus>,
}

impl ServerUpdateResult {
    /// Whether some server reported a version different from the one it ran before.
    pub fn version_changed(&self) -> bool {
        self.results
            .iter()
            .any(|r| r.err.is_none() && r.current_version != r.updated_version)
    }

    pub fn errors(&self) -> Vec<String> {
        self.results
            .iter()
            .filter_map(|r| r.err.as_ref().map(|e| format!("{}: {e}", r.server)))
            .collect()
    }
}

#[derive(Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct Disk {
    #[serde(default)]
    pub endpoint: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub healing: bool,
    #[serde(default, rename = "totalspace")]
    pub total_space: u64,
    #[serde(default, rename = "usedspace")]
    pub used_space: u64,
}

impl Disk {
    pub fn is_online(&self) -> bool {
        self.state == "ok"
    }
}

#[derive(Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct StorageInfo {
    #[serde(default, rename = "Disks")]
    pub disks: Vec<Disk>,
}

#[derive(Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TierStats {
    pub name: String,
    #[serde(default, rename = "type")]
    pub type_: String,
    #[serde(default)]
    pub total_size: u64,
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait AdminClient: Send + Sync {
    async fn health(&self) -> Result<ClusterHealth, Error>;

    async fn service_restart(&self) -> Result<(), Error>;

    /// Asks every server to replace its binary with the one behind `update_url`.
    async fn server_update(&self, update_url: &str) -> Result<ServerUpdateResult, Error>;

    async fn storage_info(&self) -> Result<StorageInfo, Error>;

    async fn tier_stats(&self) -> Result<Vec<TierStats>, Error>;

    async fn add_user(&self, access_key: &str, secret_key: &str) -> Result<(), Error>;

    async fn set_policy(&self, policy: &str, user: &str) -> Result<(), Error>;

    async fn make_bucket(&self, bucket: &Bucket) -> Result<(), Error>;
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait AdminConnector: Send + Sync {
    /// A client for the service fronting every pool of `tenant`.
    fn connect(
        &self,
        tenant: &Tenant,
        credentials: &Credentials,
    ) -> Result<Box<dyn AdminClient>, Error>;

    /// A client bound to a single server pod of `tenant`.
    fn connect_pod(
        &self,
        tenant: &Tenant,
        pod: &str,
        credentials: &Credentials,
    ) -> Result<Box<dyn AdminClient>, Error>;

    /// Anonymous cluster health probe, any failure counts as unhealthy.
    async fn is_healthy(&self, tenant: &Tenant) -> bool;
}

pub struct HttpAdminConnector {
    http: reqwest::Client,
    cluster_domain: String,
}

impl HttpAdminConnector {
    pub fn new(cluster_domain: &str) -> Result<Self, Error> {
        // tenants commonly serve self-signed certificates
        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .build()
            .context(BuildSnafu)?;

        Ok(Self {
            http,
            cluster_domain: cluster_domain.to_owned(),
        })
    }

    fn client(&self, endpoint: &str, credentials: Option<&Credentials>) -> Result<HttpAdminClient, Error> {
        let endpoint = Url::parse(endpoint).context(InvalidEndpointSnafu { endpoint })?;
        Ok(HttpAdminClient {
            http: self.http.clone(),
            endpoint,
            credentials: credentials.cloned(),
        })
    }
}

fn endpoint_error(endpoint: String) -> Error {
    Error::InvalidEndpoint {
        endpoint,
        source: url::ParseError::EmptyHost,
    }
}

#[async_trait]
impl AdminConnector for HttpAdminConnector {
    fn connect(
        &self,
        tenant: &Tenant,
        credentials: &Credentials,
    ) -> Result<Box<dyn AdminClient>, Error> {
        let endpoint = tenant
            .service_endpoint(&self.cluster_domain)
            .map_err(|_| endpoint_error(tenant.key()))?;
        Ok(Box::new(self.client(&endpoint, Some(credentials))?))
    }

    fn connect_pod(
        &self,
        tenant: &Tenant,
        pod: &str,
        credentials: &Credentials,
    ) -> Result<Box<dyn AdminClient>, Error> {
        let endpoint = tenant
            .pod_endpoint(pod, &self.cluster_domain)
            .map_err(|_| endpoint_error(format!("{}/{pod}", tenant.key())))?;
        Ok(Box::new(self.client(&endpoint, Some(credentials))?))
    }

    async fn is_healthy(&self, tenant: &Tenant) -> bool {
        let Ok(endpoint) = tenant.service_endpoint(&self.cluster_domain) else {
            return false;
        };
        match self.client(&endpoint, None) {
            Ok(client) => client.health().await.is_ok_and(|h| h.healthy),
            Err(_) => false,
        }
    }
}

pub struct HttpAdminClient {
    http: reqwest::Client,
    endpoint: Url,
    credentials: Option<Credentials>,
}

impl HttpAdminClient {
    fn url(&self, path: &str, query: &[(&str, &str)]) -> Result<Url, Error> {
        let mut url = self
            .endpoint
            .join(path)
            .context(InvalidEndpointSnafu { endpoint: path })?;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url)
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Vec<u8>,
        timeout: Duration,
    ) -> Result<reqwest::Response, Error> {
        let url = self.url(path, query)?;
        let mut request = self.http.request(method.clone(), url.clone()).timeout(timeout);

        if let Some(credentials) = &self.credentials {
            let now = Utc::now();
            let amz_date = sigv4::amz_date(now);
            let payload_hash = sigv4::sha256_hex(&body);
            let headers = BTreeMap::from([
                ("host".to_owned(), sigv4::host_header(&url)),
                (sigv4::AMZ_DATE_HEADER.to_owned(), amz_date.clone()),
                (sigv4::CONTENT_SHA256_HEADER.to_owned(), payload_hash.clone()),
            ]);
            let signer = Signer {
                access_key: &credentials.access_key,
                secret_key: &credentials.secret_key,
                region: REGION,
                service: "s3",
            };
            let authorization = signer
                .authorization(method.as_str(), &url, &headers, &payload_hash, now)
                .context(SignSnafu { path })?;

            request = request
                .header(sigv4::AMZ_DATE_HEADER, amz_date)
                .header(sigv4::CONTENT_SHA256_HEADER, payload_hash)
                .header(reqwest::header::AUTHORIZATION, authorization);
        }

        debug!(%method, path, "admin request");
        request
            .body(body)
            .send()
            .await
            .context(RequestSnafu { path })
    }

    async fn call(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Vec<u8>,
        timeout: Duration,
    ) -> Result<Vec<u8>, Error> {
        let response = self.send(method, path, query, body, timeout).await?;
        let status = response.status();
        let body = response.bytes().await.context(RequestSnafu { path })?;

        match status {
            StatusCode::METHOD_NOT_ALLOWED | StatusCode::NOT_IMPLEMENTED => {
                NotSupportedSnafu { path }.fail()
            }
            s if s.is_success() => Ok(body.to_vec()),
            s => StatusSnafu {
                path,
                status: s.as_u16(),
                message: String::from_utf8_lossy(&body).into_owned(),
            }
            .fail(),
        }
    }

    async fn call_json<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        timeout: Duration,
    ) -> Result<T, Error> {
        let body = self.call(method, path, query, vec![], timeout).await?;
        serde_json::from_slice(&body).context(DecodeSnafu { path })
    }
}

fn header_i32(response: &reqwest::Response, name: &str) -> i32 {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
        .unwrap_or_default()
}

fn admin_path(api: &str) -> String {
    format!("{ADMIN_PREFIX}/{api}")
}

#[async_trait]
impl AdminClient for HttpAdminClient {
    async fn health(&self) -> Result<ClusterHealth, Error> {
        let response = self
            .send(Method::GET, HEALTH_PATH, &[], vec![], HEALTH_TIMEOUT)
            .await?;

        Ok(ClusterHealth {
            healthy: response.status().is_success(),
            write_quorum: header_i32(&response, WRITE_QUORUM_HEADER),
            healing_drives: header_i32(&response, HEALING_DRIVES_HEADER),
        })
    }

    async fn service_restart(&self) -> Result<(), Error> {
        self.call(
            Method::POST,
            &admin_path("service"),
            &[("action", "restart")],
            vec![],
            DEFAULT_TIMEOUT,
        )
        .await?;
        Ok(())
    }

    async fn server_update(&self, update_url: &str) -> Result<ServerUpdateResult, Error> {
        self.call_json(
            Method::POST,
            &admin_path("update"),
            &[("updateURL", update_url)],
            DEFAULT_TIMEOUT,
        )
        .await
    }

    async fn storage_info(&self) -> Result<StorageInfo, Error> {
        self.call_json(Method::GET, &admin_path("storageinfo"), &[], STORAGE_INFO_TIMEOUT)
            .await
    }

    async fn tier_stats(&self) -> Result<Vec<TierStats>, Error> {
        self.call_json(Method::GET, &admin_path("tier-stats"), &[], DEFAULT_TIMEOUT)
            .await
    }

    async fn add_user(&self, access_key: &str, secret_key: &str) -> Result<(), Error> {
        let body = serde_json::json!({ "secretKey": secret_key, "status": "enabled" });
        self.call(
            Method::PUT,
            &admin_path("add-user"),
            &[("accessKey", access_key)],
            body.to_string().into_bytes(),
            DEFAULT_TIMEOUT,
        )
        .await?;
        Ok(())
    }

    async fn set_policy(&self, policy: &str, user: &str) -> Result<(), Error> {
        self.call(
            Method::PUT,
            &admin_path("set-user-or-group-policy"),
            &[
                ("policyName", policy),
                ("userOrGroup", user),
                ("isGroup", "false"),
            ],
            vec![],
            DEFAULT_TIMEOUT,
        )
        .await?;
        Ok(())
    }

    async fn make_bucket(&self, bucket: &Bucket) -> Result<(), Error> {
        let path = format!("/{}", bucket.name);
        let body = match &bucket.region {
            Some(region) => format!(
                "<CreateBucketConfiguration><LocationConstraint>{region}</LocationConstraint></CreateBucketConfiguration>"
            )
            .into_bytes(),
            None => vec![],
        };
        let query: &[(&str, &str)] = if bucket.object_lock {
            &[("objectLock", "true")]
        } else {
            &[]
        };

        match self.call(Method::PUT, &path, query, body, DEFAULT_TIMEOUT).await {
            // an existing bucket owned by the same credentials is fine
            Err(Error::Status { status: 409, .. }) => Ok(()),
            other => other.map(|_| ()),
        }
    }
}
