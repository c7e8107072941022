use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::Result;
use axum::extract::Multipart;
use axum::extract::multipart::Field;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::MediaConfig;
use crate::error::ApiError;

/// Where an uploaded file ended up.
#[derive(Debug, Clone)]
pub struct MediaAsset {
    pub url: String,
    pub bytes: u64,
}

/// Disk-backed media store.
///
/// Uploads arrive as files staged in `temp_dir`. `upload` copies a staged
/// file into `storage_dir` under a random name and hands back its public URL.
/// The staged file is always removed, whether or not the copy worked.
pub struct MediaStore {
    temp_dir: PathBuf,
    storage_dir: PathBuf,
    public_url: String,
}

impl MediaStore {
    pub async fn new(config: &MediaConfig) -> Result<Self> {
        fs::create_dir_all(&config.temp_dir).await?;
        fs::create_dir_all(&config.storage_dir).await?;
        info!(
            "Media staging in {}, storage in {}",
            config.temp_dir.display(),
            config.storage_dir.display()
        );
        Ok(Self {
            temp_dir: config.temp_dir.clone(),
            storage_dir: config.storage_dir.clone(),
            public_url: config.public_url.trim_end_matches('/').to_string(),
        })
    }

    /// Fresh path in the staging directory for an incoming file.
    fn staging_path(&self, original_name: Option<&str>) -> PathBuf {
        self.temp_dir
            .join(format!("{}{}", Uuid::new_v4(), extension(original_name)))
    }

    /// Move a staged file into durable storage. `None` on failure.
    pub async fn upload(&self, local_path: &Path) -> Option<MediaAsset> {
        let result = self.persist(local_path).await;
        remove_staged(local_path).await;

        match result {
            Ok(asset) => {
                info!("Stored media {} ({} bytes)", asset.url, asset.bytes);
                Some(asset)
            }
            Err(e) => {
                warn!("Media upload of {} failed: {}", local_path.display(), e);
                None
            }
        }
    }

    /// Upload every staged file or none of them. Assets already stored are
    /// deleted again when a later one fails.
    pub async fn upload_all(&self, local_paths: &[PathBuf]) -> Option<Vec<MediaAsset>> {
        let mut stored = Vec::with_capacity(local_paths.len());
        let mut failed = false;
        // Keep going after a failure so every staged file is consumed.
        for path in local_paths {
            match self.upload(path).await {
                Some(asset) => stored.push(asset),
                None => failed = true,
            }
        }

        if failed {
            for asset in &stored {
                self.discard(&asset.url).await;
            }
            return None;
        }
        Some(stored)
    }

    /// Delete a stored asset by its public URL. Used when the record that
    /// would have referenced it was never written.
    pub async fn discard(&self, url: &str) {
        let name = url
            .strip_prefix(self.public_url.as_str())
            .and_then(|rest| rest.strip_prefix('/'))
            .filter(|name| {
                !name.is_empty() && !name.contains('/') && !name.contains('\\') && *name != ".."
            });
        let Some(name) = name else {
            warn!("Refusing to discard {}: not one of our assets", url);
            return;
        };

        match fs::remove_file(self.storage_dir.join(name)).await {
            Ok(()) => info!("Discarded media {}", url),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Could not discard media {}: {}", url, e),
        }
    }

    async fn persist(&self, local_path: &Path) -> Result<MediaAsset> {
        let name = format!(
            "{}{}",
            Uuid::new_v4(),
            extension(local_path.file_name().and_then(|n| n.to_str()))
        );
        let bytes = fs::copy(local_path, self.storage_dir.join(&name)).await?;
        Ok(MediaAsset {
            url: format!("{}/{}", self.public_url, name),
            bytes,
        })
    }
}

/// Copy one multipart file part to `path` chunk by chunk. Returns the byte count.
async fn write_part(path: &Path, field: &mut Field<'_>) -> Result<u64, ApiError> {
    let mut file = fs::File::create(path).await.map_err(anyhow::Error::from)?;
    let mut written = 0u64;
    while let Some(chunk) = field.chunk().await? {
        file.write_all(&chunk).await.map_err(anyhow::Error::from)?;
        written += chunk.len() as u64;
    }
    file.flush().await.map_err(anyhow::Error::from)?;
    Ok(written)
}

async fn remove_staged(path: &Path) {
    match fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Could not remove staged file {}: {}", path.display(), e),
    }
}

/// `.ext` taken from a client file name, or empty when it is not a short
/// alphanumeric extension.
fn extension(name: Option<&str>) -> String {
    name.and_then(|n| Path::new(n).extension())
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty() && e.len() <= 8 && e.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|e| format!(".{}", e.to_ascii_lowercase()))
        .unwrap_or_default()
}

/// A multipart form with its file parts staged on disk.
///
/// Handlers `take_file` what they upload; anything still staged when the
/// form is dropped is deleted.
#[derive(Debug, Default)]
pub struct UploadForm {
    fields: HashMap<String, String>,
    files: HashMap<String, PathBuf>,
}

impl UploadForm {
    pub async fn read(store: &MediaStore, mut multipart: Multipart) -> Result<Self, ApiError> {
        let mut form = Self::default();

        while let Some(mut field) = multipart.next_field().await? {
            let Some(name) = field.name().map(str::to_string) else {
                continue;
            };

            match field.file_name().map(str::to_string) {
                Some(file_name) => {
                    // Only the first file per field is kept.
                    if form.files.contains_key(&name) {
                        continue;
                    }
                    let path = store.staging_path(Some(&file_name));
                    let written = match write_part(&path, &mut field).await {
                        Ok(written) => written,
                        Err(e) => {
                            remove_staged(&path).await;
                            return Err(e);
                        }
                    };
                    if written == 0 {
                        remove_staged(&path).await;
                        continue;
                    }
                    form.files.insert(name, path);
                }
                None => {
                    let text = field.text().await?;
                    form.fields.insert(name, text);
                }
            }
        }

        Ok(form)
    }

    /// Trimmed text field, `None` when missing or blank.
    pub fn text(&self, name: &str) -> Option<&str> {
        crate::extract::non_empty(self.fields.get(name).map(String::as_str))
    }

    /// Untrimmed text field, `None` when missing or blank. For passwords.
    pub fn raw_text(&self, name: &str) -> Option<String> {
        self.fields.get(name).filter(|v| !v.trim().is_empty()).cloned()
    }

    pub fn take_file(&mut self, name: &str) -> Option<PathBuf> {
        self.files.remove(name)
    }
}

impl Drop for UploadForm {
    fn drop(&mut self) {
        for path in self.files.values() {
            let _ = std::fs::remove_file(path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn scratch_store() -> MediaStore {
        let root = std::env::temp_dir().join(format!("vidtube-media-{}", Uuid::new_v4()));
        MediaStore::new(&MediaConfig {
            temp_dir: root.join("temp"),
            storage_dir: root.join("media"),
            public_url: "http://cdn.test/media/".into(),
        })
        .await
        .unwrap()
    }

    async fn stage(store: &MediaStore, name: &str, bytes: &[u8]) -> PathBuf {
        let path = store.staging_path(Some(name));
        fs::write(&path, bytes).await.unwrap();
        path
    }

    fn staged_count(store: &MediaStore) -> usize {
        std::fs::read_dir(&store.temp_dir).unwrap().count()
    }

    fn stored_count(store: &MediaStore) -> usize {
        std::fs::read_dir(&store.storage_dir).unwrap().count()
    }

    async fn multipart(body: &'static str) -> Multipart {
        use axum::extract::FromRequest;

        let request = axum::http::Request::builder()
            .method("POST")
            .header("content-type", "multipart/form-data; boundary=XBOUNDARY")
            .body(axum::body::Body::from(body.replace('\n', "\r\n")))
            .unwrap();
        Multipart::from_request(request, &()).await.unwrap()
    }

    #[tokio::test]
    async fn upload_moves_staged_file() {
        let store = scratch_store().await;
        let staged = stage(&store, "avatar.PNG", b"not really a png").await;

        let asset = store.upload(&staged).await.unwrap();
        assert!(asset.url.starts_with("http://cdn.test/media/"));
        assert!(asset.url.ends_with(".png"));
        assert_eq!(asset.bytes, 16);
        assert!(!staged.exists());

        let name = asset.url.rsplit('/').next().unwrap();
        assert!(store.storage_dir.join(name).exists());
    }

    #[tokio::test]
    async fn failed_upload_yields_none() {
        let store = scratch_store().await;
        let missing = store.temp_dir.join("never-staged.png");
        assert!(store.upload(&missing).await.is_none());
    }

    #[tokio::test]
    async fn discard_removes_only_our_assets() {
        let store = scratch_store().await;
        let staged = stage(&store, "cover.jpg", b"jpeg").await;
        let asset = store.upload(&staged).await.unwrap();
        assert_eq!(stored_count(&store), 1);

        store.discard("http://elsewhere.test/media/x.jpg").await;
        store.discard("http://cdn.test/media/../secrets").await;
        assert_eq!(stored_count(&store), 1);

        store.discard(&asset.url).await;
        assert_eq!(stored_count(&store), 0);
    }

    #[tokio::test]
    async fn upload_all_rolls_back_on_failure() {
        let store = scratch_store().await;
        let video = stage(&store, "clip.mp4", b"frames").await;
        let missing = store.temp_dir.join("thumbnail-never-staged.png");

        assert!(store.upload_all(&[video, missing]).await.is_none());
        assert_eq!(stored_count(&store), 0);
        assert_eq!(staged_count(&store), 0);

        let video = stage(&store, "clip.mp4", b"frames").await;
        let thumb = stage(&store, "thumb.png", b"pixels").await;
        let assets = store.upload_all(&[video, thumb]).await.unwrap();
        assert_eq!(assets.len(), 2);
        assert_eq!(stored_count(&store), 2);
    }

    #[tokio::test]
    async fn form_streams_file_parts_to_staging() {
        let store = scratch_store().await;
        let body = "--XBOUNDARY
Content-Disposition: form-data; name=\"title\"

  Holiday  
--XBOUNDARY
Content-Disposition: form-data; name=\"videoFile\"; filename=\"clip.mp4\"
Content-Type: video/mp4

frames
--XBOUNDARY
Content-Disposition: form-data; name=\"thumbnail\"; filename=\"empty.png\"
Content-Type: image/png


--XBOUNDARY--
";
        let mut form = UploadForm::read(&store, multipart(body).await).await.unwrap();

        assert_eq!(form.text("title"), Some("Holiday"));
        // Empty parts are dropped rather than staged.
        assert!(form.take_file("thumbnail").is_none());
        assert_eq!(staged_count(&store), 1);

        let video = form.take_file("videoFile").unwrap();
        assert_eq!(std::fs::read(&video).unwrap(), b"frames");
        assert_eq!(video.extension().unwrap(), "mp4");

        drop(form);
        assert!(video.exists());
        std::fs::remove_file(video).unwrap();
    }

    #[tokio::test]
    async fn dropped_form_clears_staging() {
        let store = scratch_store().await;
        let body = "--XBOUNDARY
Content-Disposition: form-data; name=\"avatar\"; filename=\"a.png\"

pixels
--XBOUNDARY--
";
        let form = UploadForm::read(&store, multipart(body).await).await.unwrap();
        assert_eq!(staged_count(&store), 1);
        drop(form);
        assert_eq!(staged_count(&store), 0);
    }

    #[test]
    fn extension_is_sanitised() {
        assert_eq!(extension(Some("clip.MP4")), ".mp4");
        assert_eq!(extension(Some("../../etc/passwd")), "");
        assert_eq!(extension(Some("weird.ex/t")), "");
        assert_eq!(extension(None), "");
    }
}
