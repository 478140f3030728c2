//! Gelbooru API access
//!
//! Talks to the DAPI JSON endpoint (`page=dapi&s=post&q=index&json=1`) for the
//! post count and for pages of posts, and turns posts into work items for the
//! download engine.

use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, instrument, trace};

use crate::engine::WorkItem;
use crate::engine::config_loader::Api;

pub mod check_images;
pub mod planner;
pub mod tags;

pub use check_images::{ScanMode, scan_images};
pub use planner::plan_rounds;
pub use tags::{TagStyle, process_tags};

/// Largest page the API will serve.
pub const MAX_LIMIT: usize = 100;

const API_PARAMS: [(&str, &str); 4] = [("page", "dapi"), ("s", "post"), ("q", "index"), ("json", "1")];
const SHOW_PARAMS: [(&str, &str); 3] = [("page", "post"), ("s", "list"), ("q", "index")];

/// Error types for API access
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("API returned {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("Rate limit exceeded")]
    RateLimited,

    #[error("Could not decode API response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Invalid URL: {0}")]
    Url(String),

    #[error("Page limit must be within 1..={MAX_LIMIT}, got {0}")]
    InvalidLimit(usize),
}

/// Result type for API operations
pub type ApiResult<T> = Result<T, ApiError>;

/// Connection settings for the API client.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub user_id: Option<String>,
}

impl From<&Api> for ApiConfig {
    fn from(api: &Api) -> Self {
        Self {
            base_url: api.base_url.clone(),
            api_key: api.api_key.clone(),
            user_id: api.user_id.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct PageAttributes {
    pub limit: usize,
    pub offset: usize,
    pub count: usize,
}

/// One post as listed by the API. Unlisted fields are ignored.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Post {
    pub id: u64,
    #[serde(default)]
    pub md5: String,
    pub file_url: String,
    #[serde(default)]
    pub tags: String,
    #[serde(default)]
    pub image: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiPage {
    #[serde(rename = "@attributes")]
    pub attributes: PageAttributes,
    #[serde(default)]
    pub post: Vec<Post>,
}

impl ApiPage {
    pub fn parse(body: &str) -> ApiResult<Self> {
        Ok(serde_json::from_str(body)?)
    }
}

impl Post {
    /// Builds the download unit for this post with already processed tags.
    pub fn into_work_item(self, tag_text: String) -> WorkItem {
        WorkItem {
            id: self.id,
            file_url: self.file_url,
            file_name: self.image.filter(|name| !name.is_empty()),
            content_hash: Some(self.md5).filter(|md5| !md5.is_empty()),
            tag_text: Some(tag_text),
        }
    }
}

/// Client for the post listing endpoint.
#[derive(Clone)]
pub struct GelbooruClient {
    client: Client,
    config: ApiConfig,
}

impl GelbooruClient {
    pub fn new(client: Client, config: ApiConfig) -> Self {
        Self { client, config }
    }

    /// Browser URL showing the same query.
    pub fn show_url(&self, tags: &str) -> ApiResult<Url> {
        let mut url = Url::parse_with_params(&self.config.base_url, SHOW_PARAMS.iter())
            .map_err(|e| ApiError::Url(e.to_string()))?;
        url.query_pairs_mut().append_pair("tags", tags);
        Ok(url)
    }

    fn api_url(&self, tags: &str, page: Option<(usize, usize)>) -> ApiResult<Url> {
        let mut url = Url::parse_with_params(&self.config.base_url, API_PARAMS.iter())
            .map_err(|e| ApiError::Url(e.to_string()))?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("tags", tags);
            if let Some((limit, pid)) = page {
                query.append_pair("limit", &limit.to_string());
                query.append_pair("pid", &pid.to_string());
            }
            if let Some(api_key) = &self.config.api_key {
                query.append_pair("api_key", api_key);
            }
            if let Some(user_id) = &self.config.user_id {
                query.append_pair("user_id", user_id);
            }
        }
        Ok(url)
    }

    async fn get_page(&self, url: Url) -> ApiResult<ApiPage> {
        trace!("GET {}", url);
        let response = self.client.get(url).send().await?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(ApiError::RateLimited);
        }
        if !status.is_success() {
            return Err(ApiError::Status {
                status,
                body: response.text().await.unwrap_or_default(),
            });
        }

        let body = response.text().await?;
        ApiPage::parse(&body)
    }

    /// Total number of posts matching `tags`.
    #[instrument(skip(self))]
    pub async fn probe(&self, tags: &str) -> ApiResult<usize> {
        let page = self.get_page(self.api_url(tags, None)?).await?;
        debug!("Query matches {} posts", page.attributes.count);
        Ok(page.attributes.count)
    }

    /// Page `pid` of the listing, `None` when it has no posts.
    #[instrument(skip(self))]
    pub async fn fetch_page(&self, tags: &str, limit: usize, pid: usize) -> ApiResult<Option<Vec<Post>>> {
        if !(1..=MAX_LIMIT).contains(&limit) {
            return Err(ApiError::InvalidLimit(limit));
        }

        let page = self.get_page(self.api_url(tags, Some((limit, pid)))?).await?;
        debug!("Page {} listed {} posts", pid, page.post.len());
        if page.post.is_empty() {
            Ok(None)
        } else {
            Ok(Some(page.post))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::test_server::{API_PAGE, TestServer, test_client};

    fn client_for(base_url: String) -> GelbooruClient {
        GelbooruClient::new(
            test_client(),
            ApiConfig {
                base_url,
                api_key: None,
                user_id: None,
            },
        )
    }

    #[test]
    fn page_parses_and_ignores_unknown_fields() {
        let page = ApiPage::parse(API_PAGE).unwrap();
        assert_eq!(page.attributes.count, 3);
        assert_eq!(page.post.len(), 2);
        assert_eq!(page.post[0].id, 11);
        assert_eq!(page.post[1].image.as_deref(), Some("two.png"));
    }

    #[test]
    fn page_without_posts_is_empty() {
        let page = ApiPage::parse(r#"{"@attributes": {"limit": 100, "offset": 0, "count": 0}}"#).unwrap();
        assert_eq!(page.attributes.count, 0);
        assert!(page.post.is_empty());
    }

    #[test]
    fn garbage_is_a_decode_error() {
        assert!(matches!(ApiPage::parse("<html>"), Err(ApiError::Decode(_))));
    }

    #[test]
    fn post_becomes_work_item() {
        let post = ApiPage::parse(API_PAGE).unwrap().post.remove(0);
        let item = post.into_work_item("long hair, smile".to_string());
        assert_eq!(item.id, 11);
        assert_eq!(item.file_name.as_deref(), Some("one.jpg"));
        assert_eq!(item.content_hash.as_deref(), Some("0123456789abcdef0123456789abcdef"));
        assert_eq!(item.tag_text.as_deref(), Some("long hair, smile"));
    }

    #[test]
    fn blank_md5_disables_dedup() {
        let post = Post {
            id: 1,
            md5: String::new(),
            file_url: "https://img.example/a.jpg".into(),
            tags: String::new(),
            image: Some(String::new()),
        };
        let item = post.into_work_item(String::new());
        assert!(item.content_hash.is_none());
        assert!(item.file_name.is_none());
    }

    #[test]
    fn urls_carry_the_query() {
        let mut client = client_for("https://gelbooru.com/index.php".into());
        let show = client.show_url("blue_sky rating:general").unwrap();
        assert_eq!(
            show.as_str(),
            "https://gelbooru.com/index.php?page=post&s=list&q=index&tags=blue_sky+rating%3Ageneral"
        );

        client.config.api_key = Some("key".into());
        client.config.user_id = Some("42".into());
        let api = client.api_url("cat", Some((50, 2))).unwrap();
        assert_eq!(
            api.as_str(),
            "https://gelbooru.com/index.php?page=dapi&s=post&q=index&json=1&tags=cat&limit=50&pid=2&api_key=key&user_id=42"
        );
    }

    #[tokio::test]
    async fn probe_and_fetch_against_server() {
        let server = TestServer::start().await;
        let client = client_for(server.url("/index.php"));

        assert_eq!(client.probe("cat").await.unwrap(), 3);
        let posts = client.fetch_page("cat", 2, 0).await.unwrap().unwrap();
        assert_eq!(posts.len(), 2);
        assert!(client.fetch_page("cat", 2, 1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn out_of_range_limit_is_rejected() {
        let client = client_for("http://127.0.0.1:9/index.php".into());
        assert!(matches!(client.fetch_page("cat", 0, 0).await, Err(ApiError::InvalidLimit(0))));
        assert!(matches!(client.fetch_page("cat", 101, 0).await, Err(ApiError::InvalidLimit(101))));
    }

    #[tokio::test]
    async fn error_status_is_reported() {
        let server = TestServer::start().await;
        let client = client_for(server.url("/missing/index.php"));
        match client.probe("cat").await {
            Err(ApiError::Status { status, .. }) => assert_eq!(status, StatusCode::NOT_FOUND),
            other => panic!("expected status error, got {other:?}"),
        }
    }
}
