//! Booru listing sources and post persistence
//!
//! The download pipeline only sees two capabilities from this module:
//! - [`ListingSource`]: returns the posts on one listing page
//! - [`Post`]: one resource handle that can classify itself and persist its
//!   media and metadata
//!
//! Everything site-specific (endpoints, JSON shapes, media URL fallbacks)
//! stays behind those traits.

mod danbooru;
mod gelbooru;
mod metadata;

pub use danbooru::{DanbooruPost, DanbooruSource, DANBOORU_HOST};
pub use gelbooru::{GelbooruPost, GelbooruSource, GELBOORU_HOST};
pub use metadata::{
    extension_for, extension_for_content_type, is_image_extension, is_video_extension,
    media_name, save_media_file, write_metadata, Metadata, SavedMedia,
};

use crate::downloader::{FetchError, RetryingFetcher};
use async_trait::async_trait;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use url::Url;

/// Errors raised by listing sources and post persistence
#[derive(Debug, Error)]
pub enum BooruError {
    #[error("{0}")]
    Fetch(#[from] FetchError),

    #[error("Failed to decode listing: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("This booru is not supported: {0}")]
    Unsupported(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Post has no media URL")]
    MissingMedia,
}

/// One page-at-a-time listing of posts
#[async_trait]
pub trait ListingSource: Send + Sync {
    /// Host name this source talks to, for logging
    fn host(&self) -> &str;

    /// Fetches the posts on listing page `page` (1-based) matching `tags`
    async fn get_page(&self, page: u32, tags: &str) -> Result<Vec<Box<dyn Post>>, BooruError>;
}

/// A handle to one post discovered on a listing page
#[async_trait]
pub trait Post: Send + Sync + fmt::Debug {
    /// URL of the post's media file
    fn media_url(&self) -> &str;

    fn tags(&self) -> Vec<String>;

    fn artists(&self) -> Vec<String>;

    fn characters(&self) -> Vec<String>;

    fn copyright(&self) -> Vec<String>;

    /// Media size in bytes (bytes written once saved, otherwise as listed)
    fn size(&self) -> u64;

    fn is_image(&self) -> bool;

    fn is_video(&self) -> bool;

    /// Snapshot of what is known about the post, used for accounting and the
    /// metadata file
    fn metadata(&self) -> Metadata;

    /// Downloads the media into `directory`, named by its SHA-256 hash
    async fn save_media(
        &mut self,
        directory: &Path,
        fetcher: &RetryingFetcher,
    ) -> Result<(), BooruError>;

    /// Writes `<hash>_metadata.json` into `directory`
    async fn save_metadata(&self, directory: &Path) -> Result<(), BooruError> {
        write_metadata(directory, &self.metadata()).await?;
        Ok(())
    }
}

/// Picks the listing source matching the host of `base`
///
/// # Returns
///
/// * `Ok(source)` - danbooru.donmai.us or gelbooru.com
/// * `Err(BooruError::Unsupported)` - any other host
pub fn source_for(
    base: &Url,
    fetcher: Arc<RetryingFetcher>,
) -> Result<Arc<dyn ListingSource>, BooruError> {
    match base.host_str() {
        Some(DANBOORU_HOST) => Ok(Arc::new(DanbooruSource::new(base.clone(), fetcher))),
        Some(GELBOORU_HOST) => Ok(Arc::new(GelbooruSource::new(base.clone(), fetcher))),
        Some(other) => Err(BooruError::Unsupported(other.to_string())),
        None => Err(BooruError::Unsupported(base.to_string())),
    }
}

/// Builds a listing URL: `base` with `path` and the given query parameters
///
/// Query parameters already present on `base` are kept unless overridden.
pub(crate) fn listing_url(base: &Url, path: &str, params: &[(&str, String)]) -> Url {
    let kept: Vec<(String, String)> = base
        .query_pairs()
        .filter(|(key, _)| !params.iter().any(|(name, _)| name == key))
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();

    let mut url = base.clone();
    url.set_path(path);
    url.set_query(None);
    {
        let mut query = url.query_pairs_mut();
        for (key, value) in &kept {
            query.append_pair(key, value);
        }
        for (key, value) in params {
            query.append_pair(key, value);
        }
    }
    url
}

/// Splits a space-separated tag string
pub(crate) fn split_tags(tags: &str) -> Vec<String> {
    tags.split_whitespace().map(str::to_string).collect()
}
