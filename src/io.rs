use std::path::PathBuf;

use tokio::fs::{create_dir_all, File};
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader, BufWriter};
use uuid::Uuid;

use crate::Error;

/// File collaborator: persists uploaded byte streams and hands back the
/// stored name the core records against the group. Names are UUID-v4 plus
/// the upload's extension, so no existence check is needed.
pub struct FileVault {
    root: PathBuf,
}

impl FileVault {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    pub async fn prepare(&self) -> Result<(), Error> {
        create_dir_all(&self.root).await?;
        Ok(())
    }

    pub async fn store(&self, original_name: &str, bytes: &[u8]) -> Result<String, Error> {
        let stored = match original_name.rsplit_once('.') {
            Some((_, ext)) if !ext.is_empty() => format!("{}.{}", Uuid::new_v4(), ext),
            _ => Uuid::new_v4().to_string(),
        };

        let file = File::create(self.root.join(&stored)).await?;
        let mut writer = BufWriter::new(file);
        writer.write_all(bytes).await?;
        writer.flush().await?;
        Ok(stored)
    }

    pub async fn read(&self, stored: &str) -> Result<Vec<u8>, Error> {
        // Stored names are vault-issued; anything path-shaped is not ours.
        if stored.contains('/') || stored.contains("..") {
            return Err(Error::not_found("Invalid file name"));
        }

        let path = self.root.join(stored);
        if !path.exists() {
            return Err(Error::not_found("Missing file content"));
        }
        let mut bytes = Vec::new();
        BufReader::new(File::open(path).await?)
            .read_to_end(&mut bytes)
            .await?;
        Ok(bytes)
    }
}
