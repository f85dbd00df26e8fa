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

//! RustFS binaries served to tenants that update in place.

use crate::types::v1alpha1::tenant::image_tag;
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use snafu::{ResultExt, Snafu};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

#[cfg(test)]
use mockall::automock;

const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Snafu, Debug)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("build http client error: {}", source))]
    Client { source: reqwest::Error },

    #[snafu(display("download {} failed: {}", url, source))]
    Download { url: String, source: reqwest::Error },

    #[snafu(display("download {} returned {}", url, status))]
    DownloadStatus { url: String, status: u16 },

    #[snafu(display("write {} failed: {}", path.display(), source))]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// A downloaded binary and its checksum sidecar, both named after the image tag.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Artifact {
    pub tag: String,
    pub binary: PathBuf,
    pub checksum: PathBuf,
}

impl Artifact {
    /// File servers are pointed at, relative to the update endpoint.
    pub fn checksum_file_name(&self) -> String {
        format!("rustfs.{}.sha256sum", self.tag)
    }
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Makes the binary of `image` available to tenants.
    async fn fetch(&self, image: &str) -> Result<Artifact, Error>;

    async fn remove(&self, artifact: &Artifact) -> Result<(), Error>;
}

pub struct HttpArtifacts {
    http: reqwest::Client,
    mirror: String,
    dir: PathBuf,
}

fn release_arch() -> &'static str {
    match std::env::consts::ARCH {
        "aarch64" => "arm64",
        _ => "amd64",
    }
}

fn checksum_line(payload: &[u8], file_name: &str) -> String {
    format!("{:x} {file_name}\n", Sha256::digest(payload))
}

async fn write(path: &Path, contents: &[u8]) -> Result<(), Error> {
    tokio::fs::write(path, contents)
        .await
        .context(WriteSnafu { path })
}

impl HttpArtifacts {
    pub fn new(mirror: &str, dir: &Path) -> Result<Self, Error> {
        let http = reqwest::Client::builder()
            .timeout(DOWNLOAD_TIMEOUT)
            .build()
            .context(ClientSnafu)?;

        Ok(Self {
            http,
            mirror: mirror.trim_end_matches('/').to_owned(),
            dir: dir.to_owned(),
        })
    }

    fn download_url(&self, tag: &str) -> String {
        format!("{}/{tag}/rustfs-linux-{}", self.mirror, release_arch())
    }

    fn artifact(&self, tag: &str) -> Artifact {
        Artifact {
            tag: tag.to_owned(),
            binary: self.dir.join(format!("rustfs.{tag}")),
            checksum: self.dir.join(format!("rustfs.{tag}.sha256sum")),
        }
    }

    async fn store(&self, artifact: &Artifact, payload: &[u8]) -> Result<(), Error> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .context(WriteSnafu { path: &self.dir })?;

        let file_name = artifact
            .binary
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        write(&artifact.binary, payload).await?;
        write(&artifact.checksum, checksum_line(payload, &file_name).as_bytes()).await
    }
}

#[async_trait]
impl ArtifactStore for HttpArtifacts {
    async fn fetch(&self, image: &str) -> Result<Artifact, Error> {
        let artifact = self.artifact(image_tag(image));
        if tokio::fs::try_exists(&artifact.checksum).await.unwrap_or(false) {
            return Ok(artifact);
        }

        let url = self.download_url(&artifact.tag);
        info!(%url, "downloading rustfs binary");
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .context(DownloadSnafu { url: &url })?;
        if !response.status().is_success() {
            return DownloadStatusSnafu {
                url,
                status: response.status().as_u16(),
            }
            .fail();
        }
        let payload = response.bytes().await.context(DownloadSnafu { url: &url })?;

        self.store(&artifact, &payload).await?;
        Ok(artifact)
    }

    async fn remove(&self, artifact: &Artifact) -> Result<(), Error> {
        for path in [&artifact.binary, &artifact.checksum] {
            match tokio::fs::remove_file(path).await {
                Err(e) if e.kind() != std::io::ErrorKind::NotFound => {
                    return Err(Error::Write {
                        path: path.clone(),
                        source: e,
                    });
                }
                _ => {}
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum_line() {
        assert_eq!(
            checksum_line(b"", "rustfs.1.0.0"),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855 rustfs.1.0.0\n"
        );
    }

    #[test]
    fn test_artifact_paths() {
        let artifacts = HttpArtifacts::new("https://mirror.example/release/", Path::new("/tmp/a")).unwrap();
        let artifact = artifacts.artifact(image_tag("rustfs/rustfs:1.0.0-alpha.60"));

        assert_eq!(artifact.binary, PathBuf::from("/tmp/a/rustfs.1.0.0-alpha.60"));
        assert_eq!(artifact.checksum_file_name(), "rustfs.1.0.0-alpha.60.sha256sum");
        assert!(
            artifacts
                .download_url(&artifact.tag)
                .starts_with("https://mirror.example/release/1.0.0-alpha.60/rustfs-linux-")
        );
    }

    #[tokio::test]
    async fn test_store_and_remove() {
        let dir = std::env::temp_dir().join(format!("rustfs-artifacts-{}", std::process::id()));
        let artifacts = HttpArtifacts::new("https://mirror.example", &dir).unwrap();
        let artifact = artifacts.artifact("1.2.3");

        artifacts.store(&artifact, b"binary").await.unwrap();
        let checksum = tokio::fs::read_to_string(&artifact.checksum).await.unwrap();
        assert!(checksum.ends_with(" rustfs.1.2.3\n"));

        // cached artifacts are not downloaded again
        assert_eq!(artifacts.fetch("rustfs/rustfs:1.2.3").await.unwrap(), artifact);

        artifacts.remove(&artifact).await.unwrap();
        assert!(!artifact.binary.exists());
        artifacts.remove(&artifact).await.unwrap();
        let _ = tokio::fs::remove_dir(&dir).await;
    }
}
