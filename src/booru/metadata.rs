//! Post metadata and the on-disk layout shared by every booru
//!
//! Media files are named `<sha256>.<ext>`; metadata files
//! `<sha256>_metadata.json`.

use crate::booru::BooruError;
use crate::downloader::RetryingFetcher;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp", "bmp", "tiff"];
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "webm", "avi", "mov", "mkv", "flv", "wmv"];

/// What is known about one post
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    pub tags: Vec<String>,
    pub copyright: Vec<String>,
    pub characters: Vec<String>,
    pub artists: Vec<String>,
    /// SHA-256 of the media, empty until the media is saved
    pub hash: String,
    pub from_host: String,
    pub url: String,
    pub size: u64,
}

/// Result of writing a media file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedMedia {
    pub hash: String,
    pub path: PathBuf,
    pub bytes: u64,
}

/// File extension of a media URL, lowercase and without the dot
pub fn extension_for(media_url: &str) -> Option<String> {
    let path = match url::Url::parse(media_url) {
        Ok(url) => url.path().to_string(),
        Err(_) => media_url.split(['?', '#']).next().unwrap_or_default().to_string(),
    };

    let file_name = path.rsplit('/').next()?;
    let (stem, ext) = file_name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

/// File extension implied by a media `Content-Type`, e.g. `image/png`
pub fn extension_for_content_type(content_type: &str) -> Option<String> {
    let essence = content_type.split(';').next()?.trim().to_ascii_lowercase();
    let (kind, subtype) = essence.split_once('/')?;
    let ext = match subtype {
        "jpeg" => "jpg",
        "quicktime" => "mov",
        "x-matroska" => "mkv",
        other => other,
    };

    let known = match kind {
        "image" => is_image_extension(ext),
        "video" => is_video_extension(ext),
        _ => false,
    };
    known.then(|| ext.to_string())
}

/// Last path segment of a media URL, used in log lines
pub fn media_name(media_url: &str) -> &str {
    media_url
        .rsplit('/')
        .find(|segment| !segment.is_empty())
        .unwrap_or(media_url)
}

pub fn is_image_extension(ext: &str) -> bool {
    IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str())
}

pub fn is_video_extension(ext: &str) -> bool {
    VIDEO_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str())
}

/// Downloads `media_url` and writes it to `directory` under its hash
///
/// A final status other than 200 is an error.
pub async fn save_media_file(
    fetcher: &RetryingFetcher,
    media_url: &str,
    directory: &Path,
) -> Result<SavedMedia, BooruError> {
    if media_url.trim().is_empty() {
        return Err(BooruError::MissingMedia);
    }

    let contents = fetcher.get_contents(media_url).await?;

    let hash = hex::encode(Sha256::digest(&contents.body));
    let ext = extension_for(media_url)
        .or_else(|| {
            contents
                .content_type
                .as_deref()
                .and_then(extension_for_content_type)
        })
        .unwrap_or_else(|| "bin".to_string());
    let path = directory.join(format!("{}.{}", hash, ext));

    tokio::fs::write(&path, &contents.body).await?;
    tracing::debug!("Saved {} to {}", media_url, path.display());

    Ok(SavedMedia {
        hash,
        path,
        bytes: contents.body.len() as u64,
    })
}

/// Writes `<hash>_metadata.json` into `directory`
pub async fn write_metadata(directory: &Path, metadata: &Metadata) -> Result<PathBuf, BooruError> {
    let path = directory.join(format!("{}_metadata.json", metadata.hash));
    let contents = serde_json::to_vec(metadata)?;
    tokio::fs::write(&path, contents).await?;
    Ok(path)
}
