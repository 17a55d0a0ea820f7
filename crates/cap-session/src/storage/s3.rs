//! S3 implementation of [`ObjectStore`]
//!
//! The SDK is async; sessions are not. `S3Store` owns a current-thread tokio
//! runtime and blocks on each request, so a transfer runs on the calling
//! thread and any subscriber override the caller installed also applies to
//! the SDK's own tracing output.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use aws_sdk_s3::{
    config::{Credentials, Region},
    primitives::ByteStream,
    Client,
};
use tokio::runtime::Runtime;
use tracing::{debug, info, instrument};

use super::config::StorageConfig;
use super::{concat_part_files, is_part_file, remove_parts_dir, ObjectStore};

pub struct S3Store {
    client: Client,
    bucket: String,
    runtime: Runtime,
}

impl std::fmt::Debug for S3Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Store").field("bucket", &self.bucket).finish()
    }
}

impl S3Store {
    pub fn new(config: StorageConfig) -> Result<Self> {
        debug!(
            bucket = %config.bucket,
            endpoint = ?config.endpoint,
            region = %config.region,
            "Initializing S3 store"
        );

        let credentials = Credentials::new(
            &config.access_key,
            &config.secret_key,
            None,
            None,
            "cap-storage",
        );

        let mut s3_config_builder = aws_sdk_s3::Config::builder()
            .credentials_provider(credentials)
            .region(Region::new(config.region.clone()))
            .force_path_style(config.path_style);

        if let Some(endpoint) = &config.endpoint {
            s3_config_builder = s3_config_builder.endpoint_url(endpoint);
        }

        let client = Client::from_conf(s3_config_builder.build());
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .context("Failed to start runtime for S3 client")?;

        info!("S3 store initialized for bucket: {}", config.bucket);

        Ok(Self {
            client,
            bucket: config.bucket,
            runtime,
        })
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn download(&self, key: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .context(format!("Failed to download from S3: {}", key))?;

        let data = response
            .body
            .collect()
            .await
            .context("Failed to read S3 response body")?
            .into_bytes()
            .to_vec();

        debug!("Downloaded {} bytes from s3://{}/{}", data.len(), self.bucket, key);
        Ok(data)
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut token: Option<String> = None;
        loop {
            let response = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(prefix)
                .set_continuation_token(token.take())
                .send()
                .await
                .context("Failed to list S3 objects")?;

            keys.extend(
                response
                    .contents()
                    .iter()
                    .filter_map(|obj| obj.key().map(|k| k.to_string())),
            );

            match response.next_continuation_token() {
                Some(next) if response.is_truncated().unwrap_or(false) => {
                    token = Some(next.to_string())
                }
                _ => break,
            }
        }
        Ok(keys)
    }
}

fn write_local(local_path: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = local_path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    fs::write(local_path, data).with_context(|| format!("Failed to write {}", local_path.display()))
}

impl ObjectStore for S3Store {
    #[instrument(skip(self, local_path))]
    fn fetch_object(&self, key: &str, local_path: &Path) -> Result<()> {
        let data = self.runtime.block_on(self.download(key))?;
        write_local(local_path, &data)
    }

    #[instrument(skip(self, local_path))]
    fn fetch_multipart_object(&self, prefix: &str, local_path: &Path) -> Result<()> {
        let prefix = format!("{}/", prefix.trim_end_matches('/'));
        let mut keys: Vec<String> = self
            .runtime
            .block_on(self.list(&prefix))?
            .into_iter()
            .filter(|k| k.rsplit('/').next().is_some_and(is_part_file))
            .collect();
        keys.sort();

        let staging = local_path.with_extension("parts");
        let mut parts = Vec::with_capacity(keys.len());
        for (i, key) in keys.iter().enumerate() {
            let data = self.runtime.block_on(self.download(key))?;
            let part = staging.join(format!("{i:05}"));
            write_local(&part, &data)?;
            parts.push(part);
        }

        let joined = concat_part_files(&parts, local_path);
        remove_parts_dir(&staging);
        joined
    }

    #[instrument(skip(self, local_path), fields(local_path = %local_path.display()))]
    fn push_object(&self, local_path: &Path, key: &str) -> Result<()> {
        let body = fs::read(local_path)
            .with_context(|| format!("Failed to read {}", local_path.display()))?;
        let size = body.len();

        debug!("Uploading {} bytes to s3://{}/{}", size, self.bucket, key);

        self.runtime
            .block_on(
                self.client
                    .put_object()
                    .bucket(&self.bucket)
                    .key(key)
                    .body(ByteStream::from(body))
                    .send(),
            )
            .context("Failed to upload to S3")?;

        info!("Successfully uploaded to s3://{}/{}", self.bucket, key);
        Ok(())
    }
}
