use crate::domain::ports::{FetchedPage, PageFetcher};
use crate::utils::error::{FetchError, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use url::Url;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_DELAY: Duration = Duration::from_millis(1500);
pub const DEFAULT_USER_AGENT: &str = "Educational Data Validator 1.0";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchConfig {
    pub timeout: Duration,
    pub delay: Duration,
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            delay: DEFAULT_DELAY,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

/// 保證同一個 slot 內任兩次請求的開始時間至少相隔 `delay`
#[derive(Debug)]
pub struct RateLimiter {
    delay: Duration,
    last_start: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            last_start: Mutex::new(None),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Waits until this slot may start another request, then claims it.
    pub async fn acquire(&self) {
        // 持有鎖直到記錄完成，並行呼叫者會依序排隊
        let mut last_start = self.last_start.lock().await;
        if let Some(previous) = *last_start {
            let ready_at = previous + self.delay;
            if ready_at > Instant::now() {
                tracing::debug!("⏳ Pacing next request by {:?}", ready_at - Instant::now());
                tokio::time::sleep_until(ready_at).await;
            }
        }
        *last_start = Some(Instant::now());
    }
}

/// Adds a scheme when missing and rejects anything that is not a usable http(s) URL.
pub fn normalize_url(raw: &str) -> std::result::Result<Url, FetchError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(FetchError::InvalidUrl("empty url".to_string()));
    }

    let candidate = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    };

    let url = Url::parse(&candidate)
        .map_err(|e| FetchError::InvalidUrl(format!("{}: {}", trimmed, e)))?;

    match url.scheme() {
        "http" | "https" => {}
        scheme => {
            return Err(FetchError::InvalidUrl(format!(
                "{}: unsupported scheme '{}'",
                trimmed, scheme
            )))
        }
    }

    if url.host_str().map_or(true, str::is_empty) {
        return Err(FetchError::InvalidUrl(format!("{}: missing host", trimmed)));
    }

    Ok(url)
}

pub struct WebFetcher {
    client: Client,
    config: FetchConfig,
    limiter: RateLimiter,
}

impl WebFetcher {
    pub fn new(config: FetchConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()?;

        Ok(Self {
            client,
            limiter: RateLimiter::new(config.delay),
            config,
        })
    }

    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    /// 批次之間調整延遲；進行中的請求不受影響
    pub fn with_delay(&self, delay: Duration) -> Self {
        Self {
            client: self.client.clone(),
            config: FetchConfig {
                delay,
                ..self.config.clone()
            },
            limiter: RateLimiter::new(delay),
        }
    }
}

/// Clones share the connection pool but get a fresh pacing slot.
impl Clone for WebFetcher {
    fn clone(&self) -> Self {
        self.with_delay(self.config.delay)
    }
}

#[async_trait]
impl PageFetcher for WebFetcher {
    async fn fetch(&self, url: &str) -> std::result::Result<FetchedPage, FetchError> {
        let target = normalize_url(url)?;

        self.limiter.acquire().await;

        tracing::debug!("🌐 Fetching {}", target);
        let response = self
            .client
            .get(target.clone())
            .send()
            .await
            .map_err(FetchError::from)?;

        let status = response.status();
        if !status.is_success() {
            tracing::debug!("🌐 {} answered HTTP {}", target, status);
            return Err(FetchError::HttpError(status.as_u16()));
        }

        let final_url = response.url().to_string();
        let body_text = response.text().await.map_err(FetchError::from)?;

        tracing::debug!("🌐 Fetched {} bytes from {}", body_text.len(), final_url);
        Ok(FetchedPage {
            status_code: status.as_u16(),
            body_text,
            final_url,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    fn quick_fetcher(timeout: Duration) -> WebFetcher {
        WebFetcher::new(FetchConfig {
            timeout,
            delay: Duration::ZERO,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        })
        .unwrap()
    }

    #[test]
    fn test_normalize_url_adds_scheme() {
        let url = normalize_url("abc.ac.in/admissions").unwrap();
        assert_eq!(url.as_str(), "https://abc.ac.in/admissions");

        let url = normalize_url("  http://abc.edu.in ").unwrap();
        assert_eq!(url.scheme(), "http");
    }

    #[test]
    fn test_normalize_url_rejects_bad_input() {
        assert!(matches!(normalize_url(""), Err(FetchError::InvalidUrl(_))));
        assert!(matches!(normalize_url("   "), Err(FetchError::InvalidUrl(_))));
        assert!(matches!(
            normalize_url("ftp://abc.ac.in"),
            Err(FetchError::InvalidUrl(_))
        ));
        assert!(matches!(
            normalize_url("not a url at all"),
            Err(FetchError::InvalidUrl(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limiter_spaces_request_starts() {
        let limiter = RateLimiter::new(Duration::from_millis(1500));
        let start = Instant::now();

        limiter.acquire().await;
        assert!(start.elapsed() < Duration::from_millis(1));

        limiter.acquire().await;
        assert!(start.elapsed() >= Duration::from_millis(1500));

        limiter.acquire().await;
        assert!(start.elapsed() >= Duration::from_millis(3000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limiter_does_not_wait_after_idle_gap() {
        let limiter = RateLimiter::new(Duration::from_millis(500));
        limiter.acquire().await;
        tokio::time::sleep(Duration::from_secs(2)).await;

        let before = Instant::now();
        limiter.acquire().await;
        assert!(before.elapsed() < Duration::from_millis(1));
    }

    #[tokio::test]
    async fn test_fetch_success_returns_body() {
        let server = MockServer::start();
        let page = server.mock(|when, then| {
            when.method(GET).path("/");
            then.status(200)
                .header("Content-Type", "text/html")
                .body("<html><body>Admission open</body></html>");
        });

        let fetcher = quick_fetcher(Duration::from_secs(5));
        let result = fetcher.fetch(&server.url("/")).await.unwrap();

        page.assert();
        assert_eq!(result.status_code, 200);
        assert!(result.body_text.contains("Admission open"));
        assert_eq!(result.final_url, server.url("/"));
    }

    #[tokio::test]
    async fn test_fetch_follows_redirects() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/old");
            then.status(301).header("Location", server.url("/home"));
        });
        server.mock(|when, then| {
            when.method(GET).path("/home");
            then.status(200).body("campus");
        });

        let fetcher = quick_fetcher(Duration::from_secs(5));
        let result = fetcher.fetch(&server.url("/old")).await.unwrap();

        assert!(result.final_url.ends_with("/home"));
        assert_eq!(result.body_text, "campus");
    }

    #[tokio::test]
    async fn test_fetch_http_error_status() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/missing");
            then.status(404);
        });

        let fetcher = quick_fetcher(Duration::from_secs(5));
        let err = fetcher.fetch(&server.url("/missing")).await.unwrap_err();

        assert_eq!(err, FetchError::HttpError(404));
    }

    #[tokio::test]
    async fn test_fetch_timeout() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/slow");
            then.status(200).delay(Duration::from_millis(800)).body("late");
        });

        let fetcher = quick_fetcher(Duration::from_millis(100));
        let err = fetcher.fetch(&server.url("/slow")).await.unwrap_err();

        assert_eq!(err, FetchError::Timeout);
    }

    #[tokio::test]
    async fn test_fetch_connection_refused() {
        let fetcher = quick_fetcher(Duration::from_secs(2));
        let err = fetcher.fetch("http://127.0.0.1:1/").await.unwrap_err();

        assert!(matches!(err, FetchError::ConnectionFailed(_)));
    }

    #[tokio::test]
    async fn test_fetch_invalid_url_skips_network() {
        let fetcher = quick_fetcher(Duration::from_secs(2));
        let err = fetcher.fetch("").await.unwrap_err();
        assert!(matches!(err, FetchError::InvalidUrl(_)));
    }

    #[test]
    fn test_clone_keeps_config_with_new_slot() {
        let fetcher = WebFetcher::new(FetchConfig::default()).unwrap();
        let slot = fetcher.clone();
        assert_eq!(slot.config(), fetcher.config());

        let faster = fetcher.with_delay(Duration::from_millis(200));
        assert_eq!(faster.config().delay, Duration::from_millis(200));
        assert_eq!(faster.config().timeout, DEFAULT_TIMEOUT);
    }
}
