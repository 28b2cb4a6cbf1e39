//! Danbooru listing source (`/posts.json`)

use crate::booru::{
    is_image_extension, is_video_extension, listing_url, save_media_file, split_tags,
    BooruError, ListingSource, Metadata, Post,
};
use crate::downloader::RetryingFetcher;
use async_trait::async_trait;
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use url::Url;

pub const DANBOORU_HOST: &str = "danbooru.donmai.us";

/// Lists posts from a Danbooru instance
pub struct DanbooruSource {
    base: Url,
    host: String,
    fetcher: Arc<RetryingFetcher>,
}

impl DanbooruSource {
    /// Creates a source rooted at `base` (any host, so tests can use a mock server)
    pub fn new(base: Url, fetcher: Arc<RetryingFetcher>) -> Self {
        let host = base.host_str().unwrap_or(DANBOORU_HOST).to_string();
        Self {
            base,
            host,
            fetcher,
        }
    }

    /// URL of listing page `page`
    pub fn page_url(&self, page: u32, tags: &str) -> Url {
        let mut params = vec![("page", page.max(1).to_string())];
        if !tags.is_empty() {
            params.push(("tags", tags.to_string()));
        }
        listing_url(&self.base, "/posts.json", &params)
    }
}

#[async_trait]
impl ListingSource for DanbooruSource {
    fn host(&self) -> &str {
        &self.host
    }

    async fn get_page(&self, page: u32, tags: &str) -> Result<Vec<Box<dyn Post>>, BooruError> {
        let url = self.page_url(page, tags);
        let contents = self.fetcher.get_contents(url.as_str()).await?;
        let posts: Vec<DanbooruPost> = serde_json::from_slice(&contents.body)?;

        Ok(posts
            .into_iter()
            .map(|post| Box::new(post) as Box<dyn Post>)
            .collect())
    }
}

/// Media asset attached to a Danbooru post
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MediaAsset {
    pub duration: Option<f64>,
    pub file_ext: Option<String>,
}

/// One post from `/posts.json`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DanbooruPost {
    pub id: i64,
    pub md5: Option<String>,
    pub file_ext: String,
    pub file_size: u64,
    pub source: String,
    pub tag_string_general: String,
    pub tag_string_character: String,
    pub tag_string_copyright: String,
    pub tag_string_artist: String,
    pub tag_string_meta: String,
    pub file_url: Option<String>,
    pub large_file_url: Option<String>,
    pub media_asset: MediaAsset,

    #[serde(skip)]
    media_hash: String,
    #[serde(skip)]
    saved_bytes: Option<u64>,
}

impl DanbooruPost {
    pub fn meta_tags(&self) -> Vec<String> {
        split_tags(&self.tag_string_meta)
    }

    fn duration(&self) -> f64 {
        self.media_asset.duration.unwrap_or(0.0)
    }
}

#[async_trait]
impl Post for DanbooruPost {
    /// `file_url`, falling back to `large_file_url`, then `source`
    fn media_url(&self) -> &str {
        [&self.file_url, &self.large_file_url]
            .into_iter()
            .flatten()
            .find(|url| !url.is_empty())
            .map(String::as_str)
            .unwrap_or(&self.source)
    }

    fn tags(&self) -> Vec<String> {
        split_tags(&self.tag_string_general)
    }

    fn artists(&self) -> Vec<String> {
        split_tags(&self.tag_string_artist)
    }

    fn characters(&self) -> Vec<String> {
        split_tags(&self.tag_string_character)
    }

    fn copyright(&self) -> Vec<String> {
        split_tags(&self.tag_string_copyright)
    }

    fn size(&self) -> u64 {
        self.saved_bytes.unwrap_or(self.file_size)
    }

    fn is_image(&self) -> bool {
        self.duration() == 0.0 || is_image_extension(&self.file_ext)
    }

    fn is_video(&self) -> bool {
        self.duration() > 0.0 || is_video_extension(&self.file_ext)
    }

    fn metadata(&self) -> Metadata {
        Metadata {
            tags: self.tags(),
            copyright: self.copyright(),
            characters: self.characters(),
            artists: self.artists(),
            hash: self.media_hash.clone(),
            from_host: DANBOORU_HOST.to_string(),
            url: self.media_url().to_string(),
            size: self.size(),
        }
    }

    async fn save_media(
        &mut self,
        directory: &Path,
        fetcher: &RetryingFetcher,
    ) -> Result<(), BooruError> {
        let saved = save_media_file(fetcher, self.media_url(), directory).await?;
        self.media_hash = saved.hash;
        self.saved_bytes = Some(saved.bytes);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn post_json() -> serde_json::Value {
        serde_json::json!([
            {
                "id": 1,
                "md5": "aaa",
                "file_ext": "png",
                "file_size": 1234,
                "source": "https://source.example.com/1",
                "tag_string_general": "sky cloud",
                "tag_string_character": "hero",
                "tag_string_copyright": "series",
                "tag_string_artist": "painter",
                "tag_string_meta": "highres",
                "file_url": "https://cdn.donmai.us/original/aa/aaa.png",
                "large_file_url": null,
                "media_asset": { "duration": null, "file_ext": "png" }
            },
            {
                "id": 2,
                "file_ext": "mp4",
                "source": "https://source.example.com/2",
                "file_url": null,
                "large_file_url": "https://cdn.donmai.us/sample/bb/bbb.mp4",
                "media_asset": { "duration": 12.5 }
            }
        ])
    }

    #[test]
    fn test_page_url() {
        let source = DanbooruSource::new(
            Url::parse("https://danbooru.donmai.us/").unwrap(),
            Arc::new(RetryingFetcher::new(reqwest::Client::new(), 0, Duration::ZERO)),
        );

        let url = source.page_url(0, "cat_ears solo");
        assert_eq!(url.path(), "/posts.json");
        assert_eq!(
            url.query(),
            Some("page=1&tags=cat_ears+solo")
        );
    }

    #[test]
    fn test_post_fields() {
        let posts: Vec<DanbooruPost> = serde_json::from_value(post_json()).unwrap();

        let image = &posts[0];
        assert_eq!(image.media_url(), "https://cdn.donmai.us/original/aa/aaa.png");
        assert_eq!(image.tags(), vec!["sky", "cloud"]);
        assert_eq!(image.artists(), vec!["painter"]);
        assert_eq!(image.meta_tags(), vec!["highres"]);
        assert_eq!(image.size(), 1234);
        assert!(image.is_image());
        assert!(!image.is_video());

        let video = &posts[1];
        assert_eq!(video.media_url(), "https://cdn.donmai.us/sample/bb/bbb.mp4");
        assert!(video.is_video());
        assert!(!video.is_image());
    }

    #[test]
    fn test_media_url_falls_back_to_source() {
        let post = DanbooruPost {
            source: "https://source.example.com/x.jpg".to_string(),
            file_url: Some(String::new()),
            ..Default::default()
        };
        assert_eq!(post.media_url(), "https://source.example.com/x.jpg");
    }

    #[tokio::test]
    async fn test_get_page_from_mock_server() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/posts.json"))
            .and(query_param("page", "2"))
            .and(query_param("tags", "sky"))
            .respond_with(ResponseTemplate::new(200).set_body_json(post_json()))
            .expect(1)
            .mount(&mock_server)
            .await;

        let fetcher = Arc::new(RetryingFetcher::new(
            reqwest::Client::new(),
            0,
            Duration::from_millis(1),
        ));
        let source = DanbooruSource::new(Url::parse(&mock_server.uri()).unwrap(), fetcher);

        let posts = source.get_page(2, "sky").await.unwrap();
        assert_eq!(posts.len(), 2);
        assert_eq!(posts[0].metadata().from_host, DANBOORU_HOST);
    }

    #[tokio::test]
    async fn test_get_page_rejects_malformed_json() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/posts.json"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&mock_server)
            .await;

        let fetcher = Arc::new(RetryingFetcher::new(
            reqwest::Client::new(),
            0,
            Duration::from_millis(1),
        ));
        let source = DanbooruSource::new(Url::parse(&mock_server.uri()).unwrap(), fetcher);

        let result = source.get_page(1, "").await;
        assert!(matches!(result, Err(BooruError::Decode(_))));
    }
}
