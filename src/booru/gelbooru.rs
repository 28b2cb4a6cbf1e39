//! Gelbooru listing source (`/index.php?page=dapi&s=post&q=index&json=1`)

use crate::booru::{
    extension_for, is_image_extension, is_video_extension, listing_url, save_media_file,
    split_tags, BooruError, ListingSource, Metadata, Post,
};
use crate::downloader::RetryingFetcher;
use async_trait::async_trait;
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use url::Url;

pub const GELBOORU_HOST: &str = "gelbooru.com";

/// Lists posts from a Gelbooru instance through its DAPI endpoint
pub struct GelbooruSource {
    base: Url,
    host: String,
    fetcher: Arc<RetryingFetcher>,
}

impl GelbooruSource {
    pub fn new(base: Url, fetcher: Arc<RetryingFetcher>) -> Self {
        let host = base.host_str().unwrap_or(GELBOORU_HOST).to_string();
        Self {
            base,
            host,
            fetcher,
        }
    }

    /// URL of listing page `page`
    pub fn page_url(&self, page: u32, tags: &str) -> Url {
        let mut params = vec![
            ("page", "dapi".to_string()),
            ("s", "post".to_string()),
            ("q", "index".to_string()),
            ("json", "1".to_string()),
            ("pid", page.max(1).to_string()),
        ];
        if !tags.is_empty() {
            params.push(("tags", tags.to_string()));
        }
        listing_url(&self.base, "/index.php", &params)
    }
}

#[derive(Debug, Default, Deserialize)]
struct GelbooruListing {
    #[serde(rename = "post", default)]
    posts: Vec<GelbooruPost>,
}

#[async_trait]
impl ListingSource for GelbooruSource {
    fn host(&self) -> &str {
        &self.host
    }

    async fn get_page(&self, page: u32, tags: &str) -> Result<Vec<Box<dyn Post>>, BooruError> {
        let url = self.page_url(page, tags);
        let contents = self.fetcher.get_contents(url.as_str()).await?;
        let listing: GelbooruListing = serde_json::from_slice(&contents.body)?;

        Ok(listing
            .posts
            .into_iter()
            .map(|post| Box::new(post) as Box<dyn Post>)
            .collect())
    }
}

/// One post from the DAPI listing
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GelbooruPost {
    pub id: i64,
    pub md5: String,
    pub image: String,
    pub directory: String,
    pub rating: String,
    pub source: String,
    #[serde(rename = "tags")]
    pub tag_string: String,
    pub file_url: String,

    #[serde(skip)]
    media_hash: String,
    #[serde(skip)]
    file_size: u64,
}

impl GelbooruPost {
    fn extension(&self) -> String {
        extension_for(&self.file_url).unwrap_or_default()
    }
}

#[async_trait]
impl Post for GelbooruPost {
    fn media_url(&self) -> &str {
        &self.file_url
    }

    fn tags(&self) -> Vec<String> {
        split_tags(&self.tag_string)
    }

    // The DAPI listing does not categorise tags.
    fn artists(&self) -> Vec<String> {
        Vec::new()
    }

    fn characters(&self) -> Vec<String> {
        Vec::new()
    }

    fn copyright(&self) -> Vec<String> {
        Vec::new()
    }

    /// Unknown (0) until the media has been saved
    fn size(&self) -> u64 {
        self.file_size
    }

    fn is_image(&self) -> bool {
        is_image_extension(&self.extension())
    }

    fn is_video(&self) -> bool {
        is_video_extension(&self.extension())
    }

    fn metadata(&self) -> Metadata {
        Metadata {
            tags: self.tags(),
            copyright: self.copyright(),
            characters: self.characters(),
            artists: self.artists(),
            hash: self.media_hash.clone(),
            from_host: GELBOORU_HOST.to_string(),
            url: self.media_url().to_string(),
            size: self.size(),
        }
    }

    async fn save_media(
        &mut self,
        directory: &Path,
        fetcher: &RetryingFetcher,
    ) -> Result<(), BooruError> {
        let saved = save_media_file(fetcher, &self.file_url, directory).await?;
        self.media_hash = saved.hash;
        self.file_size = saved.bytes;
        Ok(())
    }
}
