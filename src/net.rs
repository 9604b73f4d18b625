//! Shared HTTP helpers: client construction, retry with linear backoff,
//! and status-checked JSON/text requests.

use std::future::Future;
use std::time::Duration;

use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::HttpError;

/// Desktop Chrome UA. Several providers serve a different (often broken)
/// page to mobile or unknown agents.
pub const DESKTOP_USER_AGENT: &str =
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/129.0.0.0 Safari/537.36";

/// Build a client with the desktop UA, compression, and a cookie store.
pub fn browser_client(timeout: Duration) -> reqwest::Result<Client> {
    Client::builder()
        .user_agent(DESKTOP_USER_AGENT)
        .pool_max_idle_per_host(8)
        .pool_idle_timeout(Duration::from_secs(60))
        .tcp_nodelay(true)
        .brotli(true)
        .gzip(true)
        .deflate(true)
        .cookie_store(true)
        .connect_timeout(Duration::from_secs(10))
        .timeout(timeout)
        .redirect(reqwest::redirect::Policy::limited(10))
        .build()
}

/// Run `operation` up to `max_attempts` times, sleeping
/// `base_delay * attempt` between tries. Returns the last error.
pub async fn with_retry<T, E, F, Fut>(
    max_attempts: u32,
    base_delay: Duration,
    operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    with_retry_if(max_attempts, base_delay, |_| true, operation).await
}

/// Like [`with_retry`], but gives up immediately on errors for which
/// `should_retry` returns `false`.
pub async fn with_retry_if<T, E, F, Fut, P>(
    max_attempts: u32,
    base_delay: Duration,
    should_retry: P,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
{
    let max_attempts = max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < max_attempts && should_retry(&err) => {
                let delay = base_delay * attempt;
                debug!("attempt {attempt}/{max_attempts} failed, retrying in {delay:?}");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

/// GET `url` and decode a JSON body, failing on non-2xx.
pub async fn safe_request<T: DeserializeOwned>(client: &Client, url: &str) -> Result<T, HttpError> {
    let text = send_text(client.get(url), url).await?;
    serde_json::from_str(&text).map_err(|source| HttpError::Decode {
        url: url.to_string(),
        source,
    })
}

/// Send a prepared request and return the body text, failing on non-2xx.
pub async fn send_text(request: RequestBuilder, url: &str) -> Result<String, HttpError> {
    let resp = request.send().await?;
    let status = resp.status();
    if !status.is_success() {
        return Err(HttpError::Status {
            url: url.to_string(),
            status,
        });
    }
    Ok(resp.text().await?)
}

/// Send a prepared request and decode its JSON body, failing on non-2xx.
pub async fn send_json<T: DeserializeOwned>(
    request: RequestBuilder,
    url: &str,
) -> Result<T, HttpError> {
    let text = send_text(request, url).await?;
    serde_json::from_str(&text).map_err(|source| HttpError::Decode {
        url: url.to_string(),
        source,
    })
}

/// Milliseconds since the epoch; used as a cache buster on embed fetches.
pub fn cache_buster() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn retry_stops_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<(), &str> = with_retry(3, Duration::from_millis(1), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err("boom") }
        })
        .await;

        assert_eq!(result, Err("boom"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn retry_returns_first_success() {
        let calls = AtomicU32::new(0);
        let result = with_retry(5, Duration::from_millis(1), || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 1 {
                    Err("flaky")
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(result, Ok(1));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn retry_if_skips_permanent_errors() {
        let calls = AtomicU32::new(0);
        let result: Result<(), &str> =
            with_retry_if(3, Duration::from_millis(1), |e: &&str| *e != "fatal", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err("fatal") }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn zero_attempts_still_runs_once() {
        let calls = AtomicU32::new(0);
        let _: Result<(), ()> = with_retry(0, Duration::ZERO, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(()) }
        })
        .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn safe_request_rejects_non_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = browser_client(Duration::from_secs(5)).unwrap();
        let url = format!("{}/missing", server.uri());
        let err = safe_request::<serde_json::Value>(&client, &url)
            .await
            .unwrap_err();

        assert!(matches!(err, HttpError::Status { status, .. } if status == 404));
    }

    #[tokio::test]
    async fn safe_request_decodes_json() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/movie/27205"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"title":"Inception"}"#))
            .mount(&server)
            .await;

        let client = browser_client(Duration::from_secs(5)).unwrap();
        let url = format!("{}/movie/27205", server.uri());
        let body: serde_json::Value = safe_request(&client, &url).await.unwrap();

        assert_eq!(body["title"], "Inception");
    }
}
