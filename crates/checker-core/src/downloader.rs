use async_trait::async_trait;
use reqwest::Client;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::info;

use crate::error::{Error, Result};
use crate::models::Comic;

/// Local archive of comic images.
#[async_trait]
pub trait ImageArchive {
    /// Store the comic's image, returning where it was written.
    async fn save(&self, comic: &Comic) -> Result<PathBuf>;
}

pub struct ImageDownloader {
    client: Client,
    comic_dir: PathBuf,
}

impl ImageDownloader {
    pub fn new(comic_dir: impl Into<PathBuf>) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| Error::Download(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            comic_dir: comic_dir.into(),
        })
    }
}

#[async_trait]
impl ImageArchive for ImageDownloader {
    async fn save(&self, comic: &Comic) -> Result<PathBuf> {
        let response = self
            .client
            .get(&comic.img)
            .send()
            .await
            .map_err(|e| Error::Download(format!("Failed to fetch {}: {}", comic.img, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Download(format!(
                "Image request for {} returned {}",
                comic.img, status
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| Error::Download(format!("Failed to read image body: {}", e)))?;

        let path = write_image(&self.comic_dir, comic, &bytes)?;
        info!(num = comic.num, path = %path.display(), "Downloaded latest comic");

        Ok(path)
    }
}

/// Write image bytes under `dir`, replacing any earlier copy of the same comic.
///
/// The bytes go to a temp file in `dir` first and are renamed into place, so
/// the comic's file is either the old image or the complete new one.
pub fn write_image(dir: &Path, comic: &Comic, bytes: &[u8]) -> Result<PathBuf> {
    fs::create_dir_all(dir).map_err(|e| {
        Error::Download(format!(
            "Unable to create comic directory {}: {}",
            dir.display(),
            e
        ))
    })?;

    let path = dir.join(comic.local_filename());
    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| {
        Error::Download(format!(
            "Unable to create temp file in {}: {}",
            dir.display(),
            e
        ))
    })?;
    tmp.write_all(bytes).map_err(|e| {
        Error::Download(format!("Unable to write {}: {}", path.display(), e))
    })?;
    tmp.persist(&path).map_err(|e| {
        Error::Download(format!("Unable to save {}: {}", path.display(), e.error))
    })?;

    Ok(path)
}
