use aws_sdk_s3::{Client, primitives::ByteStream};
use std::path::Path;
use tracing::debug;

use super::StoreError;

/// Upload a file to S3 with a single PUT
pub async fn upload_file(
    client: &Client,
    bucket: &str,
    key: &str,
    local_path: &Path,
    size: u64,
) -> Result<u64, StoreError> {
    let body = ByteStream::from_path(local_path)
        .await
        .map_err(|e| StoreError::io(local_path, std::io::Error::other(e)))?;

    client
        .put_object()
        .bucket(bucket)
        .key(key)
        .body(body)
        .content_length(size as i64)
        .content_type(content_type_for(local_path))
        .send()
        .await
        .map_err(|e| StoreError::from_sdk_error(bucket, Some(key), e))?;

    debug!("Uploaded {} -> s3://{}/{}", local_path.display(), bucket, key);

    Ok(size)
}

/// Guess the Content-Type from the file extension.
///
/// SeaweedFS serves objects with the stored type, so a sensible value
/// matters when files are later fetched through the filer or a browser.
pub fn content_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);

    match ext.as_deref() {
        Some("txt" | "log") => "text/plain",
        Some("csv") => "text/csv",
        Some("md") => "text/markdown",
        Some("html" | "htm") => "text/html",
        Some("json") => "application/json",
        Some("xml") => "application/xml",
        Some("pdf") => "application/pdf",
        Some("parquet") => "application/vnd.apache.parquet",
        Some("zip") => "application/zip",
        Some("gz" | "tgz") => "application/gzip",
        Some("tar") => "application/x-tar",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("svg") => "image/svg+xml",
        Some("mp4") => "video/mp4",
        Some("mov") => "video/quicktime",
        Some("mp3") => "audio/mpeg",
        Some("wav") => "audio/wav",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_content_type_known_extensions() {
        assert_eq!(content_type_for(&PathBuf::from("a/b/data.csv")), "text/csv");
        assert_eq!(content_type_for(&PathBuf::from("photo.JPG")), "image/jpeg");
        assert_eq!(content_type_for(&PathBuf::from("dump.tar")), "application/x-tar");
    }

    #[test]
    fn test_content_type_fallback() {
        assert_eq!(
            content_type_for(&PathBuf::from("tpc-ds-3G.dat")),
            "application/octet-stream"
        );
        assert_eq!(
            content_type_for(&PathBuf::from("Makefile")),
            "application/octet-stream"
        );
    }
}
