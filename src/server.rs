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

//! HTTP endpoints served by every operator replica, leader or not.

use axum::{Router, http::StatusCode, response::IntoResponse, routing::get};
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tower_http::{services::ServeDir, trace::TraceLayer};

/// Path tenants download update binaries and checksums from.
pub const UPDATE_PATH: &str = "/webhook/v1/update";

pub fn router(artifacts_dir: &Path) -> Router {
    Router::new()
        .route("/healthz", get(health_check))
        .nest_service(UPDATE_PATH, ServeDir::new(artifacts_dir))
        .layer(TraceLayer::new_for_http())
}

pub async fn run(
    port: u16,
    artifacts_dir: &Path,
    shutdown: CancellationToken,
) -> Result<(), std::io::Error> {
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("http server listening on http://{}", addr);

    axum::serve(listener, router(artifacts_dir))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
}

async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_healthz() {
        let response = router(Path::new("/nonexistent"))
            .oneshot(Request::get("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_serves_update_artifacts() {
        let dir = std::env::temp_dir().join(format!("rustfs-update-{}", std::process::id()));
        tokio::fs::create_dir_all(&dir).await.unwrap();
        tokio::fs::write(dir.join("rustfs.1.0.0.sha256sum"), "abc rustfs.1.0.0\n")
            .await
            .unwrap();

        let response = router(&dir)
            .oneshot(
                Request::get("/webhook/v1/update/rustfs.1.0.0.sha256sum")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let missing = router(&dir)
            .oneshot(Request::get("/webhook/v1/update/rustfs.2.0.0").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
        let _ = tokio::fs::remove_dir_all(&dir).await;
    }
}
