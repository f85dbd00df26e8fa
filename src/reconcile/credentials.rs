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

use crate::admin::Credentials;
use crate::context::{self, Context};
use crate::error::{CredentialsInvalidSnafu, Error};
use crate::types::v1alpha1::tenant::Tenant;
use k8s_openapi::api::core::v1 as corev1;

pub const ACCESS_KEY_ENV: &str = "RUSTFS_ACCESS_KEY";
pub const SECRET_KEY_ENV: &str = "RUSTFS_SECRET_KEY";
const ACCESS_KEY_FIELD: &str = "accesskey";
const SECRET_KEY_FIELD: &str = "secretkey";
const DEFAULT_ACCESS_KEY: &str = "rustfsadmin";
const DEFAULT_SECRET_KEY: &str = "rustfsadmin";
const MIN_KEY_LENGTH: usize = 8;

pub(super) fn secret_field(secret: &corev1::Secret, field: &str) -> Option<String> {
    if let Some(value) = secret.data.as_ref().and_then(|data| data.get(field)) {
        return String::from_utf8(value.0.clone()).ok();
    }
    secret
        .string_data
        .as_ref()
        .and_then(|data| data.get(field))
        .cloned()
}

fn from_secret(secret: &corev1::Secret) -> Result<Credentials, Error> {
    let name = secret.metadata.name.clone().unwrap_or_default();
    let read = |field: &str| {
        let value = secret_field(secret, field).unwrap_or_default();
        if value.trim().len() < MIN_KEY_LENGTH {
            return CredentialsInvalidSnafu {
                reason: format!(
                    "{field} in secret {name} must be at least {MIN_KEY_LENGTH} characters"
                ),
            }
            .fail();
        }
        Ok(value.trim().to_owned())
    };

    Ok(Credentials {
        access_key: read(ACCESS_KEY_FIELD)?,
        secret_key: read(SECRET_KEY_FIELD)?,
    })
}

fn from_env(tenant: &Tenant) -> Option<Credentials> {
    let env = |name: &str| {
        tenant
            .spec
            .env
            .iter()
            .find(|var| var.name == name)
            .and_then(|var| var.value.clone())
            .filter(|value| !value.is_empty())
    };

    Some(Credentials {
        access_key: env(ACCESS_KEY_ENV)?,
        secret_key: env(SECRET_KEY_ENV)?,
    })
}

/// Root credentials of the tenant.
///
/// `spec.credsSecret` wins, then `RUSTFS_ACCESS_KEY`/`RUSTFS_SECRET_KEY` from `spec.env`, then the
/// defaults the server image starts with.
pub async fn resolve(ctx: &Context, tenant: &Tenant) -> Result<Credentials, Error> {
    if let Some(reference) = &tenant.spec.creds_secret {
        let secret = ctx
            .store
            .get_secret(&tenant.namespace()?, &reference.name)
            .await?;
        return match secret {
            Some(secret) => from_secret(&secret),
            // may still be on its way, retried with backoff
            None => Err(context::Error::NotFound {
                kind: "Secret".to_owned(),
                name: reference.name.clone(),
            }
            .into()),
        };
    }

    Ok(from_env(tenant).unwrap_or_else(|| Credentials {
        access_key: DEFAULT_ACCESS_KEY.to_owned(),
        secret_key: DEFAULT_SECRET_KEY.to_owned(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::{create_test_tenant, secret};

    #[tokio::test]
    async fn test_defaults_without_secret_or_env() {
        let (ctx, _store) = crate::tests::context();
        let credentials = resolve(&ctx, &create_test_tenant(None, None)).await.unwrap();
        assert_eq!(credentials.access_key, DEFAULT_ACCESS_KEY);
    }

    #[tokio::test]
    async fn test_env_overrides_defaults() {
        let (ctx, _store) = crate::tests::context();
        let mut tenant = create_test_tenant(None, None);
        tenant.spec.env = vec![
            corev1::EnvVar {
                name: ACCESS_KEY_ENV.to_owned(),
                value: Some("env-access".to_owned()),
                ..Default::default()
            },
            corev1::EnvVar {
                name: SECRET_KEY_ENV.to_owned(),
                value: Some("env-secret".to_owned()),
                ..Default::default()
            },
        ];

        let credentials = resolve(&ctx, &tenant).await.unwrap();
        assert_eq!(credentials.access_key, "env-access");
        assert_eq!(credentials.secret_key, "env-secret");
    }

    #[tokio::test]
    async fn test_secret_wins() {
        let (ctx, store) = crate::tests::context();
        store.insert_secret(secret(
            "creds",
            &[(ACCESS_KEY_FIELD, "secret-access"), (SECRET_KEY_FIELD, "secret-secret")],
        ));
        let mut tenant = create_test_tenant(None, None);
        tenant.spec.creds_secret = Some(corev1::LocalObjectReference {
            name: "creds".to_owned(),
        });

        let credentials = resolve(&ctx, &tenant).await.unwrap();
        assert_eq!(credentials.access_key, "secret-access");
    }

    #[tokio::test]
    async fn test_short_keys_are_terminal() {
        let (ctx, store) = crate::tests::context();
        store.insert_secret(secret(
            "creds",
            &[(ACCESS_KEY_FIELD, "short"), (SECRET_KEY_FIELD, "long-enough")],
        ));
        let mut tenant = create_test_tenant(None, None);
        tenant.spec.creds_secret = Some(corev1::LocalObjectReference {
            name: "creds".to_owned(),
        });
        assert!(resolve(&ctx, &tenant).await.unwrap_err().is_terminal());

        tenant.spec.creds_secret = Some(corev1::LocalObjectReference {
            name: "missing".to_owned(),
        });
        let err = resolve(&ctx, &tenant).await.unwrap_err();
        assert!(err.is_not_found());
        assert!(!err.is_terminal());
    }
}
