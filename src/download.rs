//! Model downloading functionality
//!
//! Streams published model weights into the model cache with progress
//! reporting. Each file is written to a `.part` file first, hashed while it
//! streams, and renamed into place once complete together with its checksum
//! sidecar.

use crate::cache::ModelCache;
use crate::error::{Result, WhiteBgError};
use crate::models::ModelName;
use futures_util::stream::TryStreamExt;
#[cfg(feature = "cli")]
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::Client;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio_util::io::StreamReader;

/// Extension appended to files still being downloaded
const PARTIAL_EXTENSION: &str = "part";

/// Model downloader with progress reporting
#[derive(Debug)]
pub struct ModelDownloader {
    client: Client,
    cache: ModelCache,
}

/// Progress bar abstraction that works with and without CLI features
#[derive(Debug)]
pub enum ProgressIndicator {
    #[cfg(feature = "cli")]
    Indicatif(ProgressBar),
    NoOp,
}

impl ProgressIndicator {
    /// Set message for progress indicator
    pub fn set_message(&self, msg: String) {
        match self {
            #[cfg(feature = "cli")]
            Self::Indicatif(pb) => pb.set_message(msg),
            Self::NoOp => {},
        }
    }

    /// Set length for progress indicator
    pub fn set_length(&self, len: u64) {
        match self {
            #[cfg(feature = "cli")]
            Self::Indicatif(pb) => pb.set_length(len),
            Self::NoOp => {},
        }
    }

    /// Set position for progress indicator
    pub fn set_position(&self, pos: u64) {
        match self {
            #[cfg(feature = "cli")]
            Self::Indicatif(pb) => pb.set_position(pos),
            Self::NoOp => {},
        }
    }

    /// Finish progress indicator with message
    pub fn finish_with_message(&self, msg: String) {
        match self {
            #[cfg(feature = "cli")]
            Self::Indicatif(pb) => pb.finish_with_message(msg),
            Self::NoOp => {},
        }
    }
}

/// Reject URLs the downloader will not fetch
///
/// # Errors
/// - `WhiteBgError::InvalidConfig` for empty or non-HTTPS URLs
pub fn validate_download_url(url: &str) -> Result<()> {
    if url.is_empty() {
        return Err(WhiteBgError::invalid_config("Model URL cannot be empty"));
    }
    if !url.starts_with("https://") {
        return Err(WhiteBgError::invalid_config(format!(
            "Unsupported URL: {url}. Only HTTPS downloads are supported"
        )));
    }
    Ok(())
}

/// Temporary path a download is streamed into
#[must_use]
pub fn partial_path(final_path: &Path) -> PathBuf {
    let mut name = final_path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".");
    name.push(PARTIAL_EXTENSION);
    final_path.with_file_name(name)
}

impl ModelDownloader {
    /// Create a new model downloader writing into `cache`
    ///
    /// # Errors
    /// - Failed to create HTTP client
    pub fn new(cache: ModelCache) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(300))
            .build()
            .map_err(|e| WhiteBgError::network_error("Failed to create HTTP client", e))?;

        Ok(Self { client, cache })
    }

    /// Download a model into the cache unless it is already there
    ///
    /// Returns the path of the cached model file.
    ///
    /// # Errors
    /// - Network errors during download
    /// - File system errors while writing or renaming
    pub async fn download_model(&self, model: ModelName, show_progress: bool) -> Result<PathBuf> {
        let final_path = self.cache.model_path(model);
        if self.cache.is_model_cached(model) {
            log::info!("Model already cached: {}", final_path.display());
            return Ok(final_path);
        }

        let url = model.download_url();
        validate_download_url(&url)?;
        log::info!("Downloading model {model} from: {url}");

        let progress = if show_progress {
            Self::create_progress_indicator()
        } else {
            ProgressIndicator::NoOp
        };
        progress.set_message(format!("Downloading {}", model.file_name()));

        let temp_path = partial_path(&final_path);
        match self.download_file(&url, &temp_path, &progress).await {
            Ok(checksum) => {
                let checksum_path = self.cache.checksum_path(model);
                fs::write(&checksum_path, format!("{checksum}\n")).map_err(|e| {
                    WhiteBgError::file_io_error("write checksum sidecar", &checksum_path, &e)
                })?;
                fs::rename(&temp_path, &final_path).map_err(|e| {
                    WhiteBgError::file_io_error("move downloaded model to cache", &final_path, &e)
                })?;

                progress.finish_with_message(format!("✅ Downloaded {model}"));
                log::info!("Successfully downloaded model: {}", final_path.display());
                Ok(final_path)
            },
            Err(e) => {
                if temp_path.exists() {
                    if let Err(cleanup_err) = fs::remove_file(&temp_path) {
                        log::warn!("Failed to clean up partial download: {}", cleanup_err);
                    }
                }
                progress.finish_with_message("❌ Download failed".to_string());
                Err(e)
            },
        }
    }

    /// Create a progress indicator for download reporting
    fn create_progress_indicator() -> ProgressIndicator {
        #[cfg(feature = "cli")]
        {
            let pb = ProgressBar::new(100);
            if let Ok(style) = ProgressStyle::default_bar().template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}",
            ) {
                pb.set_style(style.progress_chars("#>-"));
            }
            ProgressIndicator::Indicatif(pb)
        }
        #[cfg(not(feature = "cli"))]
        {
            ProgressIndicator::NoOp
        }
    }

    /// Stream a single file to disk, returning its SHA-256
    #[allow(clippy::cast_precision_loss)]
    async fn download_file(
        &self,
        url: &str,
        local_path: &Path,
        progress: &ProgressIndicator,
    ) -> Result<String> {
        log::debug!("Downloading: {} -> {}", url, local_path.display());

        if let Some(parent) = local_path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| WhiteBgError::file_io_error("create directory", parent, &e))?;
        }

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| WhiteBgError::network_error(format!("Failed to download {url}"), e))?;

        if !response.status().is_success() {
            return Err(WhiteBgError::download(format!(
                "HTTP error {} for {}",
                response.status(),
                url
            )));
        }

        let total_size = response.content_length();
        if let Some(total) = total_size {
            progress.set_length(total);
        }

        let mut file = tokio::fs::File::create(local_path)
            .await
            .map_err(|e| WhiteBgError::file_io_error("create file", local_path, &e))?;

        let mut stream = StreamReader::new(
            response
                .bytes_stream()
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e)),
        );

        let mut hasher = Sha256::new();
        let mut downloaded = 0u64;
        let mut buffer = vec![0; 8192];

        loop {
            let bytes_read = tokio::io::AsyncReadExt::read(&mut stream, &mut buffer)
                .await
                .map_err(|e| WhiteBgError::network_error("Failed to read download stream", e))?;

            if bytes_read == 0 {
                break;
            }

            let chunk = buffer.get(..bytes_read).unwrap_or(&[]);
            hasher.update(chunk);
            file.write_all(chunk)
                .await
                .map_err(|e| WhiteBgError::file_io_error("write to file", local_path, &e))?;

            downloaded += bytes_read as u64;
            if total_size.is_some() {
                progress.set_position(downloaded);
            } else {
                progress.set_message(format!(
                    "Downloaded {:.1} MB",
                    downloaded as f64 / 1_048_576.0
                ));
            }
        }

        file.flush()
            .await
            .map_err(|e| WhiteBgError::file_io_error("flush file", local_path, &e))?;

        if downloaded == 0 {
            return Err(WhiteBgError::download(format!("Empty response body from {url}")));
        }

        log::debug!("Downloaded {} bytes to {}", downloaded, local_path.display());
        Ok(format!("{:x}", hasher.finalize()))
    }

    /// Get the model cache for other operations
    #[must_use]
    pub fn cache(&self) -> &ModelCache {
        &self.cache
    }
}
