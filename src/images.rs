//! Image sources – turns [`ImageData`] entries into image bytes ready to be
//! written into a Word package.
//!
//! Base64 payloads and remote downloads are staged in a temporary file inside
//! the request's staging directory; the file is removed when the
//! [`StagedImage`] is dropped. Local files are read in place.
//!
//! Every failure is reported as [`ForgeError::ImageSource`] so the caller can
//! skip the affected placeholder and carry on.

use std::path::{Path, PathBuf};
use std::time::Duration;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::ImageFormat;
use reqwest::Client;
use tempfile::NamedTempFile;
use tokio::io::AsyncWriteExt;

use crate::config::ForgeConfig;
use crate::error::{ForgeError, Result};
use crate::model::{ImageData, ImageSourceType};

/// Resolved image bytes plus the file they were staged in, if any.
pub struct StagedImage {
    path: PathBuf,
    bytes: Vec<u8>,
    format: ImageFormat,
    /// Keeps the staged file alive until dropped.
    _temp_file: Option<NamedTempFile>,
}

impl StagedImage {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn format(&self) -> ImageFormat {
        self.format
    }
}

/// Resolves image sources for one request.
pub struct ImageResolver {
    client: Client,
    staging_dir: PathBuf,
}

impl ImageResolver {
    /// Resolver that stages files in `staging_dir`, which must exist.
    pub fn new(config: &ForgeConfig, staging_dir: &Path) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.image_fetch_timeout_secs))
            .build()?;
        Ok(Self {
            client,
            staging_dir: staging_dir.to_path_buf(),
        })
    }

    /// Fetch, decode or read `image` and check that the result is an image.
    pub async fn resolve(&self, image: &ImageData) -> Result<StagedImage> {
        let name = image.placeholder_name.as_str();
        let staged = match image.source_type {
            ImageSourceType::Base64 => self.from_base64(image).await,
            ImageSourceType::LocalFile => from_local_file(name, &image.data).await,
            ImageSourceType::Url => self.from_url(name, &image.data).await,
        }?;
        log::debug!(
            "Resolved image '{name}' ({:?}, {} bytes) from {}",
            staged.format,
            staged.bytes.len(),
            staged.path.display()
        );
        Ok(staged)
    }

    async fn from_base64(&self, image: &ImageData) -> Result<StagedImage> {
        let name = image.placeholder_name.as_str();
        let extension = image
            .normalized_extension()
            .ok_or_else(|| ForgeError::image(name, "no image extension given"))?;
        let bytes = STANDARD
            .decode(strip_data_url(&image.data))
            .map_err(|e| ForgeError::image(name, format!("invalid base64 payload: {e}")))?;
        let format = detect_format(name, &bytes)?;
        self.stage(name, bytes, format, extension).await
    }

    async fn from_url(&self, name: &str, url: &str) -> Result<StagedImage> {
        let url = url.trim();
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(ForgeError::image(
                name,
                format!("unsupported URL scheme in '{url}'"),
            ));
        }

        log::debug!("Downloading image '{name}' from {url}");
        let response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| ForgeError::image(name, format!("download failed: {e}")))?;
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|ct| ct.to_str().ok())
            .map(str::to_string);
        let bytes = response
            .bytes()
            .await
            .map_err(|e| ForgeError::image(name, format!("download failed: {e}")))?
            .to_vec();

        let format = detect_format(name, &bytes)?;
        let extension = extension_from_url(url)
            .or_else(|| content_type.as_deref().and_then(extension_from_content_type))
            .unwrap_or("img")
            .to_string();
        self.stage(name, bytes, format, &extension).await
    }

    async fn stage(
        &self,
        name: &str,
        bytes: Vec<u8>,
        format: ImageFormat,
        extension: &str,
    ) -> Result<StagedImage> {
        let temp_file = tempfile::Builder::new()
            .prefix("image-")
            .suffix(&format!(".{extension}"))
            .tempfile_in(&self.staging_dir)
            .map_err(|e| ForgeError::image(name, format!("cannot stage image: {e}")))?;
        let path = temp_file.path().to_path_buf();

        let mut file = tokio::fs::File::create(&path).await?;
        file.write_all(&bytes).await?;
        file.flush().await?;

        Ok(StagedImage {
            path,
            bytes,
            format,
            _temp_file: Some(temp_file),
        })
    }
}

async fn from_local_file(name: &str, location: &str) -> Result<StagedImage> {
    let path = PathBuf::from(location.trim());
    if path.as_os_str().is_empty() || !tokio::fs::try_exists(&path).await.unwrap_or(false) {
        return Err(ForgeError::image(
            name,
            format!("file not found: {}", path.display()),
        ));
    }
    let bytes = tokio::fs::read(&path)
        .await
        .map_err(|e| ForgeError::image(name, format!("cannot read {}: {e}", path.display())))?;
    let format = detect_format(name, &bytes)?;
    Ok(StagedImage {
        path,
        bytes,
        format,
        _temp_file: None,
    })
}

fn detect_format(name: &str, bytes: &[u8]) -> Result<ImageFormat> {
    if bytes.is_empty() {
        return Err(ForgeError::image(name, "image data is empty"));
    }
    image::guess_format(bytes)
        .map_err(|_| ForgeError::image(name, "data is not a recognised image format"))
}

/// `data:image/png;base64,AAAA` → `AAAA`.
fn strip_data_url(payload: &str) -> &str {
    let payload = payload.trim();
    match payload.strip_prefix("data:") {
        Some(rest) => rest.split_once(',').map_or(rest, |(_, data)| data),
        None => payload,
    }
}

fn extension_from_url(url: &str) -> Option<&str> {
    let path = url.split(['?', '#']).next()?;
    let file = path.rsplit('/').next()?;
    let (_, ext) = file.rsplit_once('.')?;
    let known = ["png", "jpg", "jpeg", "gif", "bmp", "tif", "tiff", "webp"];
    known.iter().find(|k| k.eq_ignore_ascii_case(ext)).copied()
}

fn extension_from_content_type(content_type: &str) -> Option<&'static str> {
    let mime = content_type.split(';').next()?.trim();
    match mime {
        "image/png" => Some("png"),
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/gif" => Some("gif"),
        "image/bmp" => Some("bmp"),
        "image/tiff" => Some("tiff"),
        "image/webp" => Some("webp"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::templates::{PIXEL_PNG, PIXEL_PNG_BASE64};

    fn resolver(dir: &Path) -> ImageResolver {
        ImageResolver::new(&ForgeConfig::default(), dir).unwrap()
    }

    #[tokio::test]
    async fn base64_is_staged_and_removed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let staged = resolver(dir.path())
            .resolve(&ImageData::base64("Logo", PIXEL_PNG_BASE64, ".png"))
            .await
            .unwrap();
        assert_eq!(staged.bytes(), PIXEL_PNG);
        assert_eq!(staged.format(), ImageFormat::Png);
        let path = staged.path().to_path_buf();
        assert!(path.exists());
        assert_eq!(path.extension().unwrap(), "png");
        drop(staged);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn data_url_prefix_is_accepted() {
        let dir = tempfile::tempdir().unwrap();
        let payload = format!("data:image/png;base64,{PIXEL_PNG_BASE64}");
        let staged = resolver(dir.path())
            .resolve(&ImageData::base64("Logo", &payload, "png"))
            .await
            .unwrap();
        assert_eq!(staged.bytes(), PIXEL_PNG);
    }

    #[tokio::test]
    async fn non_image_payload_is_a_resource_error() {
        let dir = tempfile::tempdir().unwrap();
        let payload = STANDARD.encode(b"just some text");
        let err = resolver(dir.path())
            .resolve(&ImageData::base64("Logo", &payload, "png"))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, ForgeError::ImageSource { .. }));
    }

    #[tokio::test]
    async fn missing_local_file_is_a_resource_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.png");
        let err = resolver(dir.path())
            .resolve(&ImageData::local_file("Logo", &missing.to_string_lossy()))
            .await
            .err()
            .unwrap();
        match err {
            ForgeError::ImageSource { placeholder, reason } => {
                assert_eq!(placeholder, "Logo");
                assert!(reason.contains("not found"));
            }
            other => panic!("expected ImageSource, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn local_file_is_read_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("logo.png");
        std::fs::write(&file, PIXEL_PNG).unwrap();
        let staged = resolver(dir.path())
            .resolve(&ImageData::local_file("Logo", &file.to_string_lossy()))
            .await
            .unwrap();
        assert_eq!(staged.path(), file);
        drop(staged);
        assert!(file.exists());
    }

    #[tokio::test]
    async fn unreachable_url_is_a_resource_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = resolver(dir.path())
            .resolve(&ImageData::url("Logo", "http://127.0.0.1:9/logo.png"))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, ForgeError::ImageSource { .. }));
    }

    #[test]
    fn extension_inference() {
        assert_eq!(extension_from_url("https://x.io/a/logo.PNG?v=2"), Some("png"));
        assert_eq!(extension_from_url("https://x.io/a/logo"), None);
        assert_eq!(extension_from_content_type("image/jpeg; q=1"), Some("jpg"));
        assert_eq!(extension_from_content_type("text/html"), None);
    }
}
