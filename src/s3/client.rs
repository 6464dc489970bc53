use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::{Client, config::Credentials};
use std::path::Path;
use tracing::debug;

use super::{
    MULTIPART_THRESHOLD, ObjectPage, ObjectStore, StoreError, download::download_to_file,
    upload::upload_file, upload_multipart,
};
use crate::config::Config;

/// `ObjectStore` backed by the AWS SDK, pointed at any S3-compatible endpoint.
///
/// Construct one per process and share it behind an `Arc`; the SDK client
/// pools connections internally.
#[derive(Debug, Clone)]
pub struct S3Client {
    client: Client,
}

impl S3Client {
    pub async fn new(config: &Config) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(aws_config::Region::new(config.region.clone()));

        if let Some(profile) = &config.profile {
            loader = loader.profile_name(profile);
        }

        if let Some(creds) = &config.credentials {
            loader = loader.credentials_provider(Credentials::new(
                &creds.access_key,
                &creds.secret_key,
                None,
                None,
                "seaweed-sync",
            ));
        }

        if let Some(endpoint) = &config.endpoint {
            loader = loader.endpoint_url(endpoint);
        }

        let sdk_config = loader.load().await;
        let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(config.force_path_style)
            .build();

        debug!(
            endpoint = config.endpoint.as_deref().unwrap_or("<aws>"),
            region = %config.region,
            path_style = config.force_path_style,
            "S3 client created"
        );

        Self {
            client: Client::from_conf(s3_config),
        }
    }
}

#[async_trait]
impl ObjectStore for S3Client {
    async fn create_bucket(&self, bucket: &str) -> Result<(), StoreError> {
        self.client
            .create_bucket()
            .bucket(bucket)
            .send()
            .await
            .map_err(|e| StoreError::from_sdk_error(bucket, None, e))?;
        Ok(())
    }

    async fn list_buckets(&self) -> Result<Vec<String>, StoreError> {
        let output = self
            .client
            .list_buckets()
            .send()
            .await
            .map_err(|e| StoreError::from_sdk_error("", None, e))?;

        Ok(output
            .buckets()
            .iter()
            .filter_map(|b| b.name().map(String::from))
            .collect())
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        local_path: &Path,
    ) -> Result<u64, StoreError> {
        let size = tokio::fs::metadata(local_path)
            .await
            .map_err(|e| StoreError::io(local_path, e))?
            .len();

        if size >= MULTIPART_THRESHOLD {
            upload_multipart(&self.client, bucket, key, local_path, size).await
        } else {
            upload_file(&self.client, bucket, key, local_path, size).await
        }
    }

    async fn get_object(
        &self,
        bucket: &str,
        key: &str,
        local_path: &Path,
    ) -> Result<u64, StoreError> {
        download_to_file(&self.client, bucket, key, local_path).await
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<(), StoreError> {
        self.client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| StoreError::from_sdk_error(bucket, Some(key), e))?;
        Ok(())
    }

    async fn list_objects_page(
        &self,
        bucket: &str,
        prefix: &str,
        continuation_token: Option<String>,
        max_keys: i32,
    ) -> Result<ObjectPage, StoreError> {
        let output = self
            .client
            .list_objects_v2()
            .bucket(bucket)
            .set_prefix((!prefix.is_empty()).then(|| prefix.to_string()))
            .set_continuation_token(continuation_token)
            .max_keys(max_keys)
            .send()
            .await
            .map_err(|e| StoreError::from_sdk_error(bucket, None, e))?;

        Ok(ObjectPage {
            keys: output
                .contents()
                .iter()
                .filter_map(|o| o.key().map(String::from))
                .collect(),
            is_truncated: output.is_truncated().unwrap_or(false),
            next_continuation_token: output.next_continuation_token().map(String::from),
        })
    }
}
