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

use crate::admin::HttpAdminConnector;
use crate::artifact::HttpArtifacts;
use crate::certificate::SecretCertificates;
use crate::config::Config;
use crate::context::{Context, KubeStore, Store};
use crate::controller::Controller;
use crate::leader::LeaderElector;
use crate::types::v1alpha1::tenant::Tenant;
use kube::{Client, CustomResourceExt};
use std::pin::Pin;
use std::sync::Arc;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

pub mod admin;
pub mod artifact;
pub mod certificate;
pub mod config;
pub mod context;
pub mod controller;
pub mod error;
mod error_policy;
pub mod leader;
pub mod reconcile;
pub mod scheduler;
pub mod server;
pub mod types;
pub mod utils;


/// Cancels `token` on SIGINT or SIGTERM.
fn cancel_on_signal(token: CancellationToken) {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{SignalKind, signal};
            match signal(SignalKind::terminate()) {
                Ok(mut term) => {
                    tokio::select! {
                        _ = tokio::signal::ctrl_c() => {}
                        _ = term.recv() => {}
                    }
                }
                Err(e) => {
                    warn!("cannot listen for SIGTERM: {e}");
                    let _ = tokio::signal::ctrl_c().await;
                }
            }
        }
        #[cfg(not(unix))]
        let _ = tokio::signal::ctrl_c().await;

        info!("shutdown signal received");
        token.cancel();
    });
}

pub async fn run(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_level(true)
        .with_file(true)
        .with_line_number(true)
        .with_target(true)
        .init();

    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        warn!("a rustls crypto provider is already installed");
    }

    let identity = config.identity()?;
    let config = Arc::new(config);
    info!(identity = %identity, namespace = %config.operator_namespace, "starting operator");

    let client = Client::try_default().await?;
    let store: Arc<dyn Store> = Arc::new(KubeStore::new(client.clone(), Some(identity.clone())));
    let context = Context::new(
        store.clone(),
        Arc::new(HttpAdminConnector::new(&config.cluster_domain)?),
        Arc::new(SecretCertificates::new(store)),
        Arc::new(HttpArtifacts::new(&config.release_mirror, &config.artifacts_dir)?),
        config.clone(),
    );

    let shutdown = CancellationToken::new();
    cancel_on_signal(shutdown.clone());

    // every replica answers /healthz, the leader also serves update artifacts
    let server = {
        let token = shutdown.clone();
        let port = config.http_port;
        let dir = config.artifacts_dir.clone();
        tokio::spawn(async move {
            let result = server::run(port, &dir, token.clone()).await;
            if result.is_err() {
                token.cancel();
            }
            result
        })
    };

    let elector = LeaderElector::new(client.clone(), &config.operator_namespace, &identity);
    let guard = tokio::select! {
        guard = elector.acquire() => Some(guard),
        _ = shutdown.cancelled() => None,
    };

    if let Some(mut guard) = guard {
        if let Err(e) = guard.label_pod().await {
            warn!("failed to label leader pod: {e}");
        }

        let controller = Controller::new(context, client);
        let running = controller.run(shutdown.clone());
        tokio::pin!(running);

        let lost = tokio::select! {
            _ = &mut running => false,
            _ = guard.lost() => true,
        };

        if lost {
            warn!(identity = %identity, "leadership lost, shutting down");
            shutdown.cancel();
            running.await;
        } else if let Err(e) = guard.release().await {
            warn!("failed to release leadership: {e}");
        }
    }

    shutdown.cancel();
    server.await??;
    info!("operator stopped");
    Ok(())
}

pub async fn crd(file: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    let mut writer: Pin<Box<dyn AsyncWrite + Send>> = if let Some(file) = file {
        Box::pin(
            tokio::fs::OpenOptions::new()
                .create(true)
                .truncate(true)
                .write(true)
                .open(file)
                .await?,
        )
    } else {
        Box::pin(tokio::io::stdout())
    };

    writer
        .write_all(serde_yaml_ng::to_string(&Tenant::crd())?.as_bytes())
        .await?;
    writer.flush().await?;

    Ok(())
}
