use std::path::{Path, PathBuf};

use anyhow::Result;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};
use uuid::Uuid;

/// On-disk storage for profile pictures.
///
/// Each identity's picture is a single flat file at `{dir}/{identity_id}`;
/// its content type is recorded in the database.
pub struct PictureStore {
    dir: PathBuf,
}

impl PictureStore {
    pub async fn new(dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&dir).await?;
        info!("Picture storage directory: {}", dir.display());
        Ok(Self { dir })
    }

    pub fn file_path(&self, identity_id: &str) -> PathBuf {
        self.dir.join(identity_id)
    }

    /// Write `data` next to the identity's picture without replacing it.
    /// Nothing is left on disk if the write fails.
    pub async fn stage(&self, identity_id: &str, data: &[u8]) -> Result<StagedPicture> {
        let staged = StagedPicture {
            tmp: self.dir.join(format!("{identity_id}.{}.upload", Uuid::new_v4())),
            dest: self.file_path(identity_id),
        };
        if let Err(e) = write_file(&staged.tmp, data).await {
            staged.discard().await;
            return Err(e);
        }
        Ok(staged)
    }

    /// Open the picture for streaming, or `None` if there is none.
    pub async fn open(&self, identity_id: &str) -> Result<Option<fs::File>> {
        match fs::File::open(self.file_path(identity_id)).await {
            Ok(file) => Ok(Some(file)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// An upload written to a temp file, not yet visible to readers.
pub struct StagedPicture {
    tmp: PathBuf,
    dest: PathBuf,
}

impl StagedPicture {
    /// Rename over the current picture. Readers never see a partial file.
    pub async fn commit(self) -> Result<()> {
        if let Err(e) = fs::rename(&self.tmp, &self.dest).await {
            self.discard().await;
            return Err(e.into());
        }
        Ok(())
    }

    pub async fn discard(self) {
        if let Err(e) = fs::remove_file(&self.tmp).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to remove {}: {}", self.tmp.display(), e);
            }
        }
    }
}

async fn write_file(path: &Path, data: &[u8]) -> Result<()> {
    let mut file = fs::File::create(path).await?;
    file.write_all(data).await?;
    file.flush().await?;
    Ok(())
}
