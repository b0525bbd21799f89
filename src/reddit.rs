use async_trait::async_trait;
use reqwest::header::USER_AGENT;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::PipelineError;

pub const DEFAULT_FEED_BASE: &str = "https://www.reddit.com";
const BOT_USER_AGENT: &str = "reddit-shorts-bot-rust/0.1";
const IMAGE_EXTENSIONS: [&str; 3] = [".jpg", ".jpeg", ".png"];

#[derive(Debug, Deserialize)]
pub struct RedditListing {
    pub data: RedditListingData,
}

#[derive(Debug, Deserialize)]
pub struct RedditListingData {
    pub children: Vec<RedditChild>,
}

#[derive(Debug, Deserialize)]
pub struct RedditChild {
    pub data: Post,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Post {
    pub title: String,
    #[serde(default)]
    pub selftext: String,
    pub url: String,
    pub permalink: String,
    pub author: String,
    pub score: i64,
    pub is_video: bool,
    #[serde(default)]
    pub media: Option<PostMedia>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PostMedia {
    pub reddit_video: Option<RedditVideo>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RedditVideo {
    pub fallback_url: String,
}

impl Post {
    /// Lowercased extension of the media URL, ignoring any query string or fragment.
    pub fn image_extension(&self) -> Option<&'static str> {
        let path = self
            .url
            .split(['?', '#'])
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase();
        IMAGE_EXTENSIONS
            .iter()
            .copied()
            .find(|ext| path.ends_with(*ext))
            .map(|ext| &ext[1..])
    }

    pub fn is_eligible(&self) -> bool {
        !self.is_video && self.image_extension().is_some()
    }

    pub fn video_fallback_url(&self) -> Option<&str> {
        self.media
            .as_ref()
            .and_then(|m| m.reddit_video.as_ref())
            .map(|v| v.fallback_url.as_str())
    }
}

/// Keeps only static-image posts, preserving the feed's ranking order.
pub fn filter_eligible(posts: Vec<Post>) -> Vec<Post> {
    posts
        .into_iter()
        .filter(|post| {
            let keep = post.is_eligible();
            match (keep, post.video_fallback_url()) {
                (true, _) => {}
                (false, Some(video)) => debug!("Skipping video post {} ({})", post.title, video),
                (false, None) => debug!("Skipping non-image post {} ({})", post.title, post.url),
            }
            keep
        })
        .collect()
}

pub fn parse_listing(body: &str) -> Result<Vec<Post>, PipelineError> {
    let parsed: RedditListing = serde_json::from_str(body)
        .map_err(|e| PipelineError::Network(format!("malformed feed payload: {}", e)))?;
    Ok(parsed.data.children.into_iter().map(|c| c.data).collect())
}

/// Where posts and their images come from.
#[async_trait]
pub trait ContentSource: Send + Sync {
    async fn fetch_top(&self, subreddit: &str, limit: usize) -> Result<Vec<Post>, PipelineError>;

    async fn download_image(&self, url: &str) -> Result<Vec<u8>, PipelineError>;
}

pub struct RedditClient {
    http: reqwest::Client,
    base_url: String,
}

impl RedditClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, PipelineError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PipelineError::Config(format!("cannot build http client: {}", e)))?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl ContentSource for RedditClient {
    async fn fetch_top(&self, subreddit: &str, limit: usize) -> Result<Vec<Post>, PipelineError> {
        let url = format!(
            "{}/r/{}/top.json?limit={}&t=day",
            self.base_url, subreddit, limit
        );
        info!("Fetching top posts of the day from r/{} (limit {})", subreddit, limit);
        let res = self
            .http
            .get(&url)
            .header(USER_AGENT, BOT_USER_AGENT)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        let posts = parse_listing(&res)?;
        info!("Feed returned {} posts for r/{}", posts.len(), subreddit);
        Ok(posts)
    }

    async fn download_image(&self, url: &str) -> Result<Vec<u8>, PipelineError> {
        debug!("Downloading image {}", url);
        let bytes = self
            .http
            .get(url)
            .header(USER_AGENT, BOT_USER_AGENT)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn post(title: &str, url: &str, is_video: bool) -> Post {
        Post {
            title: title.to_string(),
            selftext: String::new(),
            url: url.to_string(),
            permalink: format!("/r/pics/comments/{}", title),
            author: "someone".to_string(),
            score: 1,
            is_video,
            media: None,
        }
    }

    const LISTING: &str = r#"{
        "kind": "Listing",
        "data": {
            "after": null,
            "children": [
                {"kind": "t3", "data": {
                    "title": "A cat", "selftext": "", "url": "https://i.redd.it/cat.jpg",
                    "permalink": "/r/pics/comments/1/a_cat/", "author": "alice",
                    "score": 120, "is_video": false, "over_18": false
                }},
                {"kind": "t3", "data": {
                    "title": "A clip", "selftext": "", "url": "https://v.redd.it/xyz",
                    "permalink": "/r/pics/comments/2/a_clip/", "author": "bob",
                    "score": 80, "is_video": true,
                    "media": {"reddit_video": {"fallback_url": "https://v.redd.it/xyz/DASH_720.mp4"}}
                }}
            ]
        }
    }"#;

    #[test]
    fn parses_listing_in_feed_order() {
        let posts = parse_listing(LISTING).unwrap();
        assert_eq!(posts.len(), 2);
        assert_eq!(posts[0].title, "A cat");
        assert_eq!(posts[0].score, 120);
        assert_eq!(
            posts[1].video_fallback_url(),
            Some("https://v.redd.it/xyz/DASH_720.mp4")
        );
    }

    #[test]
    fn missing_required_field_is_network_error() {
        let body = r#"{"data":{"children":[{"data":{"title":"no url","permalink":"/x","author":"a","score":1,"is_video":false}}]}}"#;
        let err = parse_listing(body).unwrap_err();
        assert!(matches!(err, PipelineError::Network(_)));
    }

    #[test]
    fn eligibility_requires_static_image() {
        assert!(post("a", "https://i.redd.it/a.png", false).is_eligible());
        assert!(post("b", "https://i.redd.it/b.JPG?width=640", false).is_eligible());
        assert!(post("c", "https://i.imgur.com/c.jpeg", false).is_eligible());
        assert!(!post("d", "https://i.redd.it/d.jpg", true).is_eligible());
        assert!(!post("e", "https://i.redd.it/e.gif", false).is_eligible());
        assert!(!post("f", "https://example.com/article", false).is_eligible());
    }

    #[test]
    fn filter_keeps_relative_order() {
        let posts = vec![
            post("1", "https://i.redd.it/1.jpg", false),
            post("2", "https://v.redd.it/2", true),
            post("3", "https://i.redd.it/3.png", false),
            post("4", "https://news.example/4", false),
            post("5", "https://i.redd.it/5.jpg", false),
        ];
        let titles: Vec<_> = filter_eligible(posts)
            .into_iter()
            .map(|p| p.title)
            .collect();
        assert_eq!(titles, vec!["1", "3", "5"]);
    }

    #[test]
    fn filter_of_only_videos_is_empty() {
        let posts = vec![
            post("1", "https://v.redd.it/1", true),
            post("2", "https://youtube.com/watch?v=2", false),
        ];
        assert!(filter_eligible(posts).is_empty());
    }

    #[tokio::test]
    async fn fetch_top_hits_daily_top_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/r/pics/top.json"))
            .and(query_param("limit", "14"))
            .and(query_param("t", "day"))
            .respond_with(ResponseTemplate::new(200).set_body_string(LISTING))
            .expect(1)
            .mount(&server)
            .await;

        let client = RedditClient::new(server.uri(), Duration::from_secs(5)).unwrap();
        let posts = client.fetch_top("pics", 14).await.unwrap();
        assert_eq!(posts.len(), 2);
        assert_eq!(posts[1].author, "bob");
    }

    #[tokio::test]
    async fn fetch_top_non_success_is_network_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/r/pics/top.json"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let client = RedditClient::new(server.uri(), Duration::from_secs(5)).unwrap();
        let err = client.fetch_top("pics", 14).await.unwrap_err();
        assert!(matches!(err, PipelineError::Network(_)));
    }

    #[tokio::test]
    async fn download_image_returns_raw_bytes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/img/cat.jpg"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0xFF, 0xD8, 0xFF]))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/img/gone.jpg"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = RedditClient::new(server.uri(), Duration::from_secs(5)).unwrap();
        let bytes = client
            .download_image(&format!("{}/img/cat.jpg", server.uri()))
            .await
            .unwrap();
        assert_eq!(bytes, vec![0xFF, 0xD8, 0xFF]);

        let err = client
            .download_image(&format!("{}/img/gone.jpg", server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Network(_)));
    }

    #[tokio::test]
    async fn slow_download_times_out_as_network_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/img/slow.png"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(vec![1, 2, 3])
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let client = RedditClient::new(server.uri(), Duration::from_millis(50)).unwrap();
        let err = client
            .download_image(&format!("{}/img/slow.png", server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Network(_)));
    }
}
