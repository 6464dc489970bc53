use aws_sdk_s3::Client;
use std::path::Path;
use tempfile::NamedTempFile;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use super::StoreError;

const TEMP_SUFFIX: &str = ".s3sync-tmp";

/// Stream an object into `local_path`.
///
/// Bytes land in a hidden, uniquely named temp file in the destination's
/// directory and are renamed into place once the body is complete. A failed
/// transfer never leaves a truncated file at the destination, and the temp
/// name cannot clash with another object's destination.
pub async fn download_to_file(
    client: &Client,
    bucket: &str,
    key: &str,
    local_path: &Path,
) -> Result<u64, StoreError> {
    let mut output = client
        .get_object()
        .bucket(bucket)
        .key(key)
        .send()
        .await
        .map_err(|e| StoreError::from_sdk_error(bucket, Some(key), e))?;

    let (file, temp_path) = temp_sibling(local_path)
        .map_err(|e| StoreError::io(local_path, e))?
        .into_parts();
    let mut file = tokio::fs::File::from_std(file);

    // temp_path removes the file on drop unless it has been persisted
    let mut written = 0u64;
    while let Some(chunk) = output.body.try_next().await.map_err(|e| StoreError::Network {
        message: format!("reading body of s3://{}/{}: {}", bucket, key, e),
    })? {
        file.write_all(&chunk)
            .await
            .map_err(|e| StoreError::io(&*temp_path, e))?;
        written += chunk.len() as u64;
    }
    file.flush()
        .await
        .map_err(|e| StoreError::io(&*temp_path, e))?;
    drop(file);

    temp_path
        .persist(local_path)
        .map_err(|e| StoreError::io(local_path, e.error))?;

    debug!("Downloaded s3://{}/{} -> {}", bucket, key, local_path.display());
    Ok(written)
}

/// Create `.<random>.s3sync-tmp` next to `path`
fn temp_sibling(path: &Path) -> std::io::Result<NamedTempFile> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    tempfile::Builder::new()
        .prefix(".")
        .suffix(TEMP_SUFFIX)
        .tempfile_in(dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_temp_sibling_is_hidden_and_unique() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("a.txt");

        let first = temp_sibling(&dest).unwrap();
        let second = temp_sibling(&dest).unwrap();
        assert_ne!(first.path(), second.path());

        assert_eq!(first.path().parent(), Some(dir.path()));
        let name = first.path().file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with('.'));
        assert!(name.ends_with(TEMP_SUFFIX));
    }

    #[test]
    fn test_temp_sibling_leaves_part_files_alone() {
        let dir = TempDir::new().unwrap();
        // a real object whose key happens to end in ".part"
        let neighbour = dir.path().join("a.txt.part");
        std::fs::write(&neighbour, "keep me").unwrap();

        let temp = temp_sibling(&dir.path().join("a.txt")).unwrap();
        let temp_path = temp.path().to_path_buf();
        assert_ne!(temp_path, neighbour);
        drop(temp);

        assert!(!temp_path.exists());
        assert_eq!(std::fs::read_to_string(&neighbour).unwrap(), "keep me");
    }

    #[test]
    fn test_temp_sibling_persists_into_place() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("out.bin");

        let (file, temp_path) = temp_sibling(&dest).unwrap().into_parts();
        std::io::Write::write_all(&mut &file, b"payload").unwrap();
        drop(file);
        temp_path.persist(&dest).unwrap();

        assert_eq!(std::fs::read(&dest).unwrap(), b"payload");
        let leftovers = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(leftovers, 1);
    }
}
