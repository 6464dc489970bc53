use aws_sdk_s3::{
    Client,
    primitives::ByteStream,
    types::{CompletedMultipartUpload, CompletedPart},
};
use std::path::Path;
use tokio::io::AsyncReadExt;
use tracing::{debug, info, warn};

use super::{StoreError, upload::content_type_for};

// Threshold for switching to multipart upload (100MB)
pub const MULTIPART_THRESHOLD: u64 = 100 * 1024 * 1024;

// Size of each part (10MB) - S3 minimum is 5MB
const PART_SIZE: usize = 10 * 1024 * 1024;

/// Upload a large file using S3 multipart upload
///
/// A single PUT tops out at 5GB and must be resent in full on failure, so
/// anything above `MULTIPART_THRESHOLD` goes through here instead. If any
/// part fails the upload is aborted so no orphaned parts are left behind
/// on the store.
pub async fn upload_multipart(
    client: &Client,
    bucket: &str,
    key: &str,
    local_path: &Path,
    size: u64,
) -> Result<u64, StoreError> {
    info!(
        "Starting multipart upload for {} ({} bytes, {} parts)",
        local_path.display(),
        size,
        (size as usize).div_ceil(PART_SIZE)
    );

    let multipart = client
        .create_multipart_upload()
        .bucket(bucket)
        .key(key)
        .content_type(content_type_for(local_path))
        .send()
        .await
        .map_err(|e| StoreError::from_sdk_error(bucket, Some(key), e))?;

    let upload_id = multipart
        .upload_id()
        .ok_or_else(|| StoreError::InvalidResponse("no upload ID returned".to_string()))?
        .to_string();

    debug!("Multipart upload initiated with ID: {}", upload_id);

    match upload_parts(client, bucket, key, local_path, &upload_id).await {
        Ok(parts) => {
            client
                .complete_multipart_upload()
                .bucket(bucket)
                .key(key)
                .upload_id(&upload_id)
                .multipart_upload(
                    CompletedMultipartUpload::builder()
                        .set_parts(Some(parts))
                        .build(),
                )
                .send()
                .await
                .map_err(|e| StoreError::from_sdk_error(bucket, Some(key), e))?;

            info!(
                "Completed multipart upload: {} -> s3://{}/{}",
                local_path.display(),
                bucket,
                key
            );
            Ok(size)
        }
        Err(e) => {
            if let Err(abort_err) = abort_multipart_upload(client, bucket, key, &upload_id).await {
                warn!("Failed to abort multipart upload {}: {}", upload_id, abort_err);
            }
            Err(e)
        }
    }
}

async fn upload_parts(
    client: &Client,
    bucket: &str,
    key: &str,
    local_path: &Path,
    upload_id: &str,
) -> Result<Vec<CompletedPart>, StoreError> {
    let mut file = tokio::fs::File::open(local_path)
        .await
        .map_err(|e| StoreError::io(local_path, e))?;
    let mut parts = Vec::new();
    let mut part_number = 1i32;

    loop {
        let buffer = read_part(&mut file)
            .await
            .map_err(|e| StoreError::io(local_path, e))?;
        if buffer.is_empty() {
            break; // EOF
        }

        debug!("Uploading part {} ({} bytes)", part_number, buffer.len());

        let part = client
            .upload_part()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .part_number(part_number)
            .body(ByteStream::from(buffer))
            .send()
            .await
            .map_err(|e| StoreError::from_sdk_error(bucket, Some(key), e))?;

        parts.push(
            CompletedPart::builder()
                .part_number(part_number)
                .e_tag(part.e_tag().unwrap_or_default())
                .build(),
        );
        part_number += 1;
    }

    Ok(parts)
}

/// Fill a buffer of up to `PART_SIZE` bytes; a short read from the file
/// does not end the part early.
async fn read_part(file: &mut tokio::fs::File) -> std::io::Result<Vec<u8>> {
    let mut buffer = vec![0u8; PART_SIZE];
    let mut filled = 0;
    while filled < PART_SIZE {
        let n = file.read(&mut buffer[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    buffer.truncate(filled);
    Ok(buffer)
}

async fn abort_multipart_upload(
    client: &Client,
    bucket: &str,
    key: &str,
    upload_id: &str,
) -> Result<(), StoreError> {
    client
        .abort_multipart_upload()
        .bucket(bucket)
        .key(key)
        .upload_id(upload_id)
        .send()
        .await
        .map_err(|e| StoreError::from_sdk_error(bucket, Some(key), e))?;

    debug!("Aborted multipart upload {}", upload_id);
    Ok(())
}
