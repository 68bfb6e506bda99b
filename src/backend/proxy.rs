use async_trait::async_trait;
use serde::de::{self, Deserializer};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ApiError {
    #[error("request timed out after {} seconds", .0.as_secs())]
    Timeout(Duration),
    #[error("{0}")]
    Transport(String),
    #[error("{0}")]
    Remote(String),
    #[error("no proxy URL configured")]
    NotConfigured,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MangaSummary {
    #[serde(rename = "mangaId")]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, alias = "genre", deserialize_with = "lenient_genres")]
    pub genres: Vec<String>,
    #[serde(rename = "coverImage", default)]
    pub cover_image_url: String,
}

impl PartialEq for MangaSummary {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for MangaSummary {}

impl MangaSummary {
    pub fn has_genre(&self, genre: &str) -> bool {
        self.genres.iter().any(|g| g.eq_ignore_ascii_case(genre))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChapterRef {
    #[serde(rename = "chapter", deserialize_with = "number_or_string")]
    pub label: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Page {
    #[serde(default, deserialize_with = "lenient_count")]
    pub offset: usize,
    #[serde(default, deserialize_with = "lenient_count")]
    pub limit: usize,
    #[serde(default)]
    pub total: usize,
    #[serde(default)]
    pub count: usize,
    #[serde(default)]
    pub data: Vec<MangaSummary>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChapterDetail {
    #[serde(rename = "mangaId")]
    pub manga_id: String,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(rename = "chapterList", default)]
    pub chapter_catalog: Vec<ChapterRef>,
    #[serde(
        rename = "currentChapter",
        default,
        deserialize_with = "number_or_string"
    )]
    pub current_chapter: String,
}

/// Every proxy action may answer with `{ "error": "..." }` instead of, or next
/// to, its payload. Only a truthy `error` counts; an empty string does not.
fn from_envelope<T: DeserializeOwned>(body: serde_json::Value) -> Result<T, ApiError> {
    match body.get("error") {
        Some(serde_json::Value::String(message)) if !message.is_empty() => {
            return Err(ApiError::Remote(message.clone()));
        }
        Some(other @ (serde_json::Value::Bool(true) | serde_json::Value::Object(_))) => {
            return Err(ApiError::Remote(other.to_string()));
        }
        _ => {}
    }
    serde_json::from_value(body)
        .map_err(|e| ApiError::Transport(format!("malformed response from proxy: {e}")))
}

fn number_or_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        serde_json::Value::Null => Ok(String::new()),
        other => Err(de::Error::custom(format!(
            "expected string or number, found {other}"
        ))),
    }
}

fn lenient_count<'de, D>(deserializer: D) -> Result<usize, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = number_or_string(deserializer)?;
    Ok(raw.trim().parse().unwrap_or(0))
}

fn lenient_genres<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let genres = match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::Array(values) => values
            .into_iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        _ => Vec::new(),
    };
    Ok(genres)
}

/// The three operations the controllers need from the remote catalog.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    async fn list_latest(&self, offset: usize, limit: usize) -> Result<Page, ApiError>;

    async fn search(&self, query: &str, offset: usize, limit: usize) -> Result<Page, ApiError>;

    async fn fetch_chapter(&self, manga_id: &str, chapter: &str)
    -> Result<ChapterDetail, ApiError>;
}

pub struct ProxyClient {
    base_url: String,
    client: reqwest::Client,
    timeout: Duration,
}

pub fn build_client(timeout: Duration) -> Result<reqwest::Client, ApiError> {
    reqwest::Client::builder()
        .user_agent(concat!("manga-lite-tui/", env!("CARGO_PKG_VERSION")))
        .timeout(timeout)
        .build()
        .map_err(|e| ApiError::Transport(format!("failed to build HTTP client: {e}")))
}

impl ProxyClient {
    pub fn new(base_url: Option<&str>) -> Result<Self, ApiError> {
        Self::with_timeout(base_url, REQUEST_TIMEOUT)
    }

    pub fn with_timeout(base_url: Option<&str>, timeout: Duration) -> Result<Self, ApiError> {
        let base_url = base_url
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .ok_or(ApiError::NotConfigured)?;

        Ok(Self {
            base_url: base_url.to_string(),
            client: build_client(timeout)?,
            timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn action_url(&self, action: &str, params: &[(&str, &str)]) -> String {
        let separator = if self.base_url.contains('?') { '&' } else { '?' };
        let mut url = format!("{}{}action={}", self.base_url, separator, action);
        for (key, value) in params {
            url.push('&');
            url.push_str(key);
            url.push('=');
            url.push_str(&urlencoding::encode(value));
        }
        url
    }

    async fn get<T: DeserializeOwned>(&self, url: &str) -> Result<T, ApiError> {
        log::debug!("GET {url}");

        let timeout = self.timeout;
        let map_err = move |e: reqwest::Error| map_reqwest(e, timeout);
        let response = self.client.get(url).send().await.map_err(map_err)?;

        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::Transport(format!(
                "proxy responded with HTTP {status}"
            )));
        }

        let body: serde_json::Value = response.json().await.map_err(map_err)?;
        from_envelope(body)
    }
}

fn map_reqwest(err: reqwest::Error, timeout: Duration) -> ApiError {
    if err.is_timeout() {
        ApiError::Timeout(timeout)
    } else if err.is_decode() {
        ApiError::Transport(format!("malformed response from proxy: {err}"))
    } else {
        ApiError::Transport(format!("network request failed: {err}"))
    }
}

#[async_trait]
impl CatalogSource for ProxyClient {
    async fn list_latest(&self, offset: usize, limit: usize) -> Result<Page, ApiError> {
        let url = self.action_url(
            "list",
            &[
                ("offset", &offset.to_string()),
                ("limit", &limit.to_string()),
            ],
        );
        self.get(&url).await
    }

    async fn search(&self, query: &str, offset: usize, limit: usize) -> Result<Page, ApiError> {
        let url = self.action_url(
            "search",
            &[
                ("title", query),
                ("offset", &offset.to_string()),
                ("limit", &limit.to_string()),
            ],
        );
        self.get(&url).await
    }

    async fn fetch_chapter(
        &self,
        manga_id: &str,
        chapter: &str,
    ) -> Result<ChapterDetail, ApiError> {
        let url = self.action_url("detail", &[("mangaId", manga_id), ("chapter", chapter)]);
        self.get(&url).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn client(base: &str) -> ProxyClient {
        ProxyClient::new(Some(base)).unwrap()
    }

    /// Talks to a server on 127.0.0.1, bypassing any proxy set in the environment.
    fn local_client(base: &str, timeout: Duration) -> ProxyClient {
        ProxyClient {
            base_url: base.to_string(),
            client: reqwest::Client::builder()
                .no_proxy()
                .timeout(timeout)
                .build()
                .unwrap(),
            timeout,
        }
    }

    fn parse<T: DeserializeOwned>(raw: &str) -> Result<T, ApiError> {
        from_envelope(serde_json::from_str(raw).unwrap())
    }

    /// Serves one canned HTTP response on a local port and returns the base URL.
    async fn serve_once(status: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 4096];
            let _ = socket.read(&mut buf).await;
            let response = format!(
                "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            let _ = socket.write_all(response.as_bytes()).await;
            let _ = socket.shutdown().await;
        });

        format!("http://{addr}/exec")
    }

    #[test]
    fn test_missing_base_url_is_not_configured() {
        assert!(matches!(ProxyClient::new(None), Err(ApiError::NotConfigured)));
        assert!(matches!(
            ProxyClient::new(Some("   ")),
            Err(ApiError::NotConfigured)
        ));
    }

    #[test]
    fn test_action_urls() {
        let proxy = client("https://script.google.com/macros/s/abc/exec");
        assert_eq!(
            proxy.action_url("list", &[("offset", "0"), ("limit", "24")]),
            "https://script.google.com/macros/s/abc/exec?action=list&offset=0&limit=24"
        );
        assert_eq!(
            proxy.action_url("search", &[("title", "one piece & co")]),
            "https://script.google.com/macros/s/abc/exec?action=search&title=one%20piece%20%26%20co"
        );
    }

    #[test]
    fn test_action_url_keeps_existing_query() {
        let proxy = client("https://script.google.com/macros/s/abc/exec?user=1");
        assert_eq!(
            proxy.action_url("detail", &[("mangaId", "m1"), ("chapter", "10.5")]),
            "https://script.google.com/macros/s/abc/exec?user=1&action=detail&mangaId=m1&chapter=10.5"
        );
    }

    #[test]
    fn test_page_accepts_string_offsets_and_missing_data() {
        let page: Page =
            parse(r#"{"offset":"24","limit":"24","total":40,"count":0}"#).unwrap();
        assert_eq!(page.offset, 24);
        assert_eq!(page.limit, 24);
        assert_eq!(page.total, 40);
        assert!(page.data.is_empty());
    }

    #[test]
    fn test_manga_summary_genre_variants() {
        let manga: MangaSummary = serde_json::from_str(
            r#"{"mangaId":"a","title":"A","description":"","genre":["Action"],"coverImage":"c"}"#,
        )
        .unwrap();
        assert_eq!(manga.genres, vec!["Action".to_string()]);
        assert!(manga.has_genre("action"));

        let manga: MangaSummary = serde_json::from_str(
            r#"{"mangaId":"b","title":"B","description":"","genres":"Drama","coverImage":"c"}"#,
        )
        .unwrap();
        assert!(manga.genres.is_empty());
    }

    #[test]
    fn test_manga_summary_equality_by_id() {
        let a: MangaSummary =
            serde_json::from_str(r#"{"mangaId":"x","title":"First"}"#).unwrap();
        let b: MangaSummary =
            serde_json::from_str(r#"{"mangaId":"x","title":"Renamed"}"#).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_error_envelope_is_remote_error() {
        assert_eq!(
            parse::<ChapterDetail>(r#"{"error":"not found"}"#).unwrap_err(),
            ApiError::Remote("not found".to_string())
        );

        assert_eq!(
            parse::<ChapterDetail>(
                r#"{"mangaId":"m","images":[],"chapterList":[],"currentChapter":"1","error":"quota"}"#,
            )
            .unwrap_err(),
            ApiError::Remote("quota".to_string())
        );
    }

    #[test]
    fn test_chapter_detail_numeric_labels() {
        let detail: ChapterDetail = parse(
            r#"{"mangaId":"m","images":["p1","p2"],"chapterList":[{"chapter":1},{"chapter":"1.5"}],"currentChapter":1,"maxChapter":2}"#,
        )
        .unwrap();
        assert_eq!(detail.images.len(), 2);
        assert_eq!(detail.current_chapter, "1");
        let labels: Vec<&str> = detail
            .chapter_catalog
            .iter()
            .map(|c| c.label.as_str())
            .collect();
        assert_eq!(labels, vec!["1", "1.5"]);
    }

    #[test]
    fn test_empty_error_field_keeps_payload() {
        let page: Page = parse(
            r#"{"error":"","offset":0,"limit":24,"total":1,"data":[{"mangaId":"a","title":"A"}]}"#,
        )
        .unwrap();
        assert_eq!(page.data.len(), 1);

        let page: Page = parse(r#"{"error":null,"data":[]}"#).unwrap();
        assert!(page.data.is_empty());
    }

    #[tokio::test]
    async fn test_http_success_is_parsed() {
        let base = serve_once(
            "200 OK",
            r#"{"offset":0,"limit":24,"total":2,"count":2,"data":[{"mangaId":"a","title":"A"},{"mangaId":"b","title":"B"}]}"#,
        )
        .await;

        let proxy = local_client(&base, REQUEST_TIMEOUT);
        let page = proxy.list_latest(0, 24).await.unwrap();
        assert_eq!(page.total, 2);
        assert_eq!(page.data[1].id, "b");
    }

    #[tokio::test]
    async fn test_http_remote_error_over_the_wire() {
        let base = serve_once("200 OK", r#"{"error":"Manga not found"}"#).await;

        let proxy = local_client(&base, REQUEST_TIMEOUT);
        let err = proxy.fetch_chapter("x", "1").await.unwrap_err();
        assert_eq!(err, ApiError::Remote("Manga not found".to_string()));
    }

    #[tokio::test]
    async fn test_http_error_status_is_transport() {
        let base = serve_once("502 Bad Gateway", "{}").await;

        let proxy = local_client(&base, REQUEST_TIMEOUT);
        match proxy.search("berserk", 0, 24).await {
            Err(ApiError::Transport(message)) => assert!(message.contains("HTTP 502")),
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_http_non_json_body_is_transport() {
        let base = serve_once("200 OK", "<html>Sign in</html>").await;

        let proxy = local_client(&base, REQUEST_TIMEOUT);
        match proxy.list_latest(0, 24).await {
            Err(ApiError::Transport(message)) => assert!(message.contains("malformed response")),
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_http_silent_server_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            // Accept and hold the connection without ever answering.
            let (_socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let timeout = Duration::from_millis(100);
        let proxy = local_client(&format!("http://{addr}/exec"), timeout);
        let err = proxy.list_latest(0, 24).await.unwrap_err();
        assert_eq!(err, ApiError::Timeout(timeout));
    }

    #[tokio::test]
    async fn test_http_refused_connection_is_transport() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = local_client(&format!("http://{addr}/exec"), REQUEST_TIMEOUT)
            .list_latest(0, 24)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Transport(_)));
    }
}
