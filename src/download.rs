//! Model downloading
//!
//! Streams a model file into the cache directory with progress reporting,
//! hashing it on the fly. The file is written under a temporary name and
//! renamed into place only once complete, so an interrupted download never
//! leaves a half-written model behind.

use crate::cache::ModelCache;
use crate::error::{BgRemovalError, Result};
use crate::models::{ModelKind, ModelSource, ModelSpec};
use futures_util::stream::TryStreamExt;
#[cfg(feature = "cli")]
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::Client;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::io::StreamReader;

/// Progress bar abstraction that works with and without CLI features
#[derive(Debug)]
pub enum ProgressIndicator {
    #[cfg(feature = "cli")]
    Indicatif(ProgressBar),
    NoOp,
}

impl ProgressIndicator {
    pub fn set_message(&self, msg: String) {
        match self {
            #[cfg(feature = "cli")]
            Self::Indicatif(pb) => pb.set_message(msg),
            Self::NoOp => {
                let _ = msg;
            },
        }
    }

    pub fn set_length(&self, len: u64) {
        match self {
            #[cfg(feature = "cli")]
            Self::Indicatif(pb) => pb.set_length(len),
            Self::NoOp => {
                let _ = len;
            },
        }
    }

    pub fn set_position(&self, pos: u64) {
        match self {
            #[cfg(feature = "cli")]
            Self::Indicatif(pb) => pb.set_position(pos),
            Self::NoOp => {
                let _ = pos;
            },
        }
    }

    pub fn finish_with_message(&self, msg: String) {
        match self {
            #[cfg(feature = "cli")]
            Self::Indicatif(pb) => pb.finish_with_message(msg),
            Self::NoOp => {
                let _ = msg;
            },
        }
    }
}

/// Model downloader with progress reporting
#[derive(Debug)]
pub struct ModelDownloader {
    client: Client,
    cache: ModelCache,
}

impl ModelDownloader {
    /// Create a downloader for the given cache
    ///
    /// # Errors
    /// - Failed to create HTTP client
    pub fn new(cache: ModelCache) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(300))
            .build()
            .map_err(|e| BgRemovalError::network_error("Failed to create HTTP client", e))?;

        Ok(Self { client, cache })
    }

    /// Download a registry model into the cache unless it is already there
    ///
    /// # Errors
    /// - Network errors or non-success HTTP status
    /// - File system errors while writing the model
    pub async fn download_model(&self, kind: ModelKind, show_progress: bool) -> Result<()> {
        if self.cache.is_model_cached(kind) {
            log::info!("Model already cached: {kind}");
            return Ok(());
        }

        let url = kind.download_url();
        log::info!("Downloading model {kind} from {url}");

        let progress = if show_progress {
            Self::create_progress_indicator()
        } else {
            ProgressIndicator::NoOp
        };
        progress.set_message(format!("Downloading {kind}"));

        match self.download_to_cache(kind, &url, &progress).await {
            Ok(digest) => {
                progress.finish_with_message(format!("Downloaded {kind}"));
                log::info!("Downloaded model {kind} (sha256 {digest})");
                Ok(())
            },
            Err(e) => {
                progress.finish_with_message("Download failed".to_string());
                Err(e)
            },
        }
    }

    fn create_progress_indicator() -> ProgressIndicator {
        #[cfg(feature = "cli")]
        {
            let pb = ProgressBar::new(0);
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

    /// Stream `url` into the cache and return the hex SHA-256 of the body
    async fn download_to_cache(
        &self,
        kind: ModelKind,
        url: &str,
        progress: &ProgressIndicator,
    ) -> Result<String> {
        let cache_dir = self.cache.cache_dir();
        let final_path = self.cache.model_path(kind);

        let response =
            self.client.get(url).send().await.map_err(|e| {
                BgRemovalError::network_error(format!("Failed to download {url}"), e)
            })?;

        if !response.status().is_success() {
            return Err(BgRemovalError::network_error(
                format!("HTTP error for {url}"),
                response.status(),
            ));
        }

        if let Some(total) = response.content_length() {
            progress.set_length(total);
        }

        let temp = tempfile::Builder::new()
            .prefix(".download-")
            .suffix(".part")
            .tempfile_in(cache_dir)
            .map_err(|e| BgRemovalError::file_io_error("create temp file", cache_dir, &e))?;
        let std_file = temp
            .reopen()
            .map_err(|e| BgRemovalError::file_io_error("open temp file", temp.path(), &e))?;
        let mut file = tokio::fs::File::from_std(std_file);

        let mut stream = StreamReader::new(
            response
                .bytes_stream()
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e)),
        );

        let mut hasher = Sha256::new();
        let mut downloaded = 0u64;
        let mut buffer = vec![0; 64 * 1024];

        loop {
            let bytes_read = stream
                .read(&mut buffer)
                .await
                .map_err(|e| BgRemovalError::network_error("Failed to read download stream", e))?;

            if bytes_read == 0 {
                break;
            }

            let chunk = buffer.get(..bytes_read).unwrap_or(&[]);
            hasher.update(chunk);
            file.write_all(chunk)
                .await
                .map_err(|e| BgRemovalError::file_io_error("write to file", temp.path(), &e))?;

            downloaded += bytes_read as u64;
            progress.set_position(downloaded);
        }

        file.flush()
            .await
            .map_err(|e| BgRemovalError::file_io_error("flush file", temp.path(), &e))?;
        drop(file);

        if downloaded == 0 {
            return Err(BgRemovalError::network_error(
                format!("Empty response body for {url}"),
                "no data",
            ));
        }

        let digest = format!("{:x}", hasher.finalize());

        temp.persist(&final_path)
            .map_err(|e| BgRemovalError::file_io_error("move model into cache", &final_path, &e.error))?;
        write_checksum(&self.cache.checksum_path(kind), &digest)?;
        self.cache.mark_verified(kind);

        log::debug!("Downloaded {downloaded} bytes to {}", final_path.display());
        Ok(digest)
    }

    #[must_use]
    pub fn cache(&self) -> &ModelCache {
        &self.cache
    }
}

fn write_checksum(path: &Path, digest: &str) -> Result<()> {
    fs::write(path, format!("{digest}\n"))
        .map_err(|e| BgRemovalError::file_io_error("write checksum", path, &e))
}

/// Make sure the model a spec refers to is usable, downloading it if needed
///
/// # Errors
/// - External model file missing
/// - Download failures for registry models
pub async fn ensure_model_available(
    spec: &ModelSpec,
    cache: &ModelCache,
    show_progress: bool,
) -> Result<()> {
    match &spec.source {
        ModelSource::Named(kind) => {
            if cache.is_model_cached(*kind) {
                return Ok(());
            }
            tracing::info!(model = %kind, "Model not cached, downloading");
            ModelDownloader::new(cache.clone())?
                .download_model(*kind, show_progress)
                .await
        },
        ModelSource::External(path) => {
            if path.is_file() {
                Ok(())
            } else {
                Err(BgRemovalError::model(format!(
                    "Model file does not exist: {}",
                    path.display()
                )))
            }
        },
    }
}
