//! HTTP transport seam.
//!
//! Every network call in the pipeline goes through [`Transport::get`]. The
//! trait separates three outcomes the stages need to tell apart:
//!
//! * `Err(TransportError)`: no response at all (connection refused, DNS,
//!   timeout). Stages re-signal this as [`crate::ScoreError::Network`].
//! * `Ok(resp)` with `resp.is_not_found()`: the page-probe terminator.
//! * `Ok(resp)` with any other non-success status: a hard network error.
//!
//! [`HttpTransport`] is the production implementation over `reqwest`.
//! [`MemoryTransport`] replays canned responses, which is how the pipeline
//! is exercised offline.

use crate::error::TransportError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::debug;

/// A fully buffered HTTP response.
#[derive(Debug, Clone, Default)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self {
            status: 200,
            body: body.into(),
        }
    }

    pub fn with_status(status: u16) -> Self {
        Self {
            status,
            ..Self::default()
        }
    }

    /// 2xx.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_not_found(&self) -> bool {
        self.status == 404
    }

    /// Body decoded as UTF-8, replacing invalid sequences.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Something that can perform a GET.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, url: &str) -> Result<HttpResponse, TransportError>;
}

/// `reqwest`-backed transport.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    timeout_secs: u64,
}

impl HttpTransport {
    pub fn new(timeout_secs: u64) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(concat!("scoredl/", env!("CARGO_PKG_VERSION")))
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        Ok(Self {
            client,
            timeout_secs,
        })
    }

    fn map_error(&self, e: reqwest::Error) -> TransportError {
        if e.is_timeout() {
            TransportError::Timeout {
                secs: self.timeout_secs,
            }
        } else if e.is_body() || e.is_decode() {
            TransportError::Body(e.to_string())
        } else {
            TransportError::Connect(e.to_string())
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, url: &str) -> Result<HttpResponse, TransportError> {
        debug!("GET {}", url);
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| self.map_error(e))?;

        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(|e| self.map_error(e))?;
        debug!("GET {} → {} ({} bytes)", url, status, body.len());

        Ok(HttpResponse {
            status,
            body: body.to_vec(),
        })
    }
}

/// Serves canned responses keyed by exact URL.
///
/// Unknown URLs answer 404. A route can carry a delay so that concurrent
/// callers complete out of order.
#[derive(Debug, Default, Clone)]
pub struct MemoryTransport {
    routes: Arc<Mutex<HashMap<String, Route>>>,
    hits: Arc<Mutex<Vec<String>>>,
}

#[derive(Debug, Clone)]
enum Route {
    Respond {
        response: HttpResponse,
        delay: Option<Duration>,
    },
    Fail(TransportError),
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `url` with 200 and `body`.
    pub fn with_body(self, url: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        self.with_response(url, HttpResponse::ok(body))
    }

    pub fn with_response(self, url: impl Into<String>, response: HttpResponse) -> Self {
        self.insert(
            url.into(),
            Route::Respond {
                response,
                delay: None,
            },
        )
    }

    /// Answer `url` with 200 and `body` after sleeping for `delay`.
    pub fn with_delayed_body(
        self,
        url: impl Into<String>,
        body: impl Into<Vec<u8>>,
        delay: Duration,
    ) -> Self {
        self.insert(
            url.into(),
            Route::Respond {
                response: HttpResponse::ok(body),
                delay: Some(delay),
            },
        )
    }

    pub fn with_status(self, url: impl Into<String>, status: u16) -> Self {
        self.with_response(url, HttpResponse::with_status(status))
    }

    /// Make `url` fail below HTTP, as if the connection were refused.
    pub fn with_failure(self, url: impl Into<String>, error: TransportError) -> Self {
        self.insert(url.into(), Route::Fail(error))
    }

    /// URLs requested so far, in call order.
    pub fn requests(&self) -> Vec<String> {
        self.hits.lock().map(|h| h.clone()).unwrap_or_default()
    }

    fn insert(self, url: String, route: Route) -> Self {
        if let Ok(mut routes) = self.routes.lock() {
            routes.insert(url, route);
        }
        self
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn get(&self, url: &str) -> Result<HttpResponse, TransportError> {
        if let Ok(mut hits) = self.hits.lock() {
            hits.push(url.to_string());
        }
        let route = self
            .routes
            .lock()
            .map_err(|e| TransportError::Connect(e.to_string()))?
            .get(url)
            .cloned();

        match route {
            Some(Route::Respond { response, delay }) => {
                if let Some(d) = delay {
                    tokio::time::sleep(d).await;
                }
                Ok(response)
            }
            Some(Route::Fail(e)) => Err(e),
            None => Ok(HttpResponse::with_status(404)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_predicates() {
        assert!(HttpResponse::ok("x").is_success());
        assert!(HttpResponse::with_status(204).is_success());
        assert!(!HttpResponse::with_status(404).is_success());
        assert!(HttpResponse::with_status(404).is_not_found());
        assert!(!HttpResponse::with_status(500).is_not_found());
    }

    #[test]
    fn memory_transport_routes_and_records() {
        let t = MemoryTransport::new()
            .with_body("http://a/1", "one")
            .with_status("http://a/2", 500)
            .with_failure("http://a/3", TransportError::Connect("refused".into()));

        let r1 = tokio_test::block_on(t.get("http://a/1")).unwrap();
        assert_eq!(r1.text(), "one");
        let r2 = tokio_test::block_on(t.get("http://a/2")).unwrap();
        assert_eq!(r2.status, 500);
        assert!(tokio_test::block_on(t.get("http://a/3")).is_err());
        let r4 = tokio_test::block_on(t.get("http://a/unknown")).unwrap();
        assert!(r4.is_not_found());

        assert_eq!(
            t.requests(),
            vec!["http://a/1", "http://a/2", "http://a/3", "http://a/unknown"]
        );
    }

    #[test]
    fn clones_share_routes() {
        let t = MemoryTransport::new();
        let t2 = t.clone().with_body("http://b", "shared");
        let r = tokio_test::block_on(t.get("http://b")).unwrap();
        assert_eq!(r.text(), "shared");
        drop(t2);
    }
}
