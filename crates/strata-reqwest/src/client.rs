//! Shared HTTP plumbing for the reqwest-based strategies.
//!
//! [`HttpFetcher`] performs one GET: through reqwest (optionally proxied,
//! with per-endpoint client caching) or through a caller-supplied Tower
//! service, which is how tests run without a network.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue};
use strata_core::learn::quirks::SiteQuirks;
use strata_core::proxy::pool::ProxyEndpoint;
use strata_core::{Error, ErrorKind, Result};
use tower::util::BoxCloneService;
use tower::{Service, ServiceExt};

/// Default user agent sent when no quirk overrides it.
const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) \
     Chrome/124.0.0.0 Safari/537.36";

/// Redirect hops reqwest may follow per request.
const MAX_REDIRECTS: usize = 10;

/// One completed HTTP exchange.
#[derive(Debug, Clone)]
pub struct HttpExchange {
    /// Response status.
    pub status: u16,
    /// Response headers.
    pub headers: HeaderMap,
    /// URL the response came from, after redirects.
    pub final_url: String,
    /// Response body.
    pub body: String,
}

#[derive(Clone)]
enum Transport {
    Reqwest {
        // One client per proxy endpoint; reqwest binds the proxy at build
        // time.
        clients: Arc<Mutex<HashMap<String, reqwest::Client>>>,
    },
    Service(Arc<Mutex<BoxCloneService<http::Request<Bytes>, http::Response<Bytes>, Error>>>),
}

/// Performs individual HTTP requests for the strategies.
#[derive(Clone)]
pub struct HttpFetcher {
    transport: Transport,
}

impl HttpFetcher {
    /// Creates a fetcher that builds reqwest clients on demand.
    pub fn new() -> Self {
        Self {
            transport: Transport::Reqwest {
                clients: Arc::new(Mutex::new(HashMap::new())),
            },
        }
    }

    /// Creates a fetcher over a Tower service.
    ///
    /// The service sees a GET `http::Request<Bytes>` and must produce an
    /// `http::Response<Bytes>`; proxies and timeouts are the service's
    /// business. Used by tests to script exchanges.
    pub fn from_service<S>(service: S) -> Self
    where
        S: Service<http::Request<Bytes>, Response = http::Response<Bytes>, Error = Error>
            + Clone
            + Send
            + 'static,
        S::Future: Send + 'static,
    {
        Self {
            transport: Transport::Service(Arc::new(Mutex::new(BoxCloneService::new(service)))),
        }
    }

    /// Performs one GET.
    ///
    /// Quirk headers are applied on top of the defaults; a quirk's
    /// preferred user agent replaces the built-in one.
    pub async fn get(
        &self,
        url: &url::Url,
        proxy: Option<&ProxyEndpoint>,
        quirks: Option<&SiteQuirks>,
        timeout: Duration,
    ) -> Result<HttpExchange> {
        let headers = request_headers(quirks);

        match &self.transport {
            Transport::Reqwest { clients } => {
                let client = self.reqwest_client(clients, proxy, quirks, timeout)?;
                let response = client
                    .get(url.clone())
                    .headers(headers)
                    .send()
                    .await
                    .map_err(from_reqwest_error)?;

                let status = response.status().as_u16();
                let response_headers = response.headers().clone();
                let final_url = response.url().to_string();
                let body = response.text().await.map_err(from_reqwest_error)?;

                Ok(HttpExchange {
                    status,
                    headers: response_headers,
                    final_url,
                    body,
                })
            }
            Transport::Service(service) => {
                let mut request = http::Request::builder()
                    .method(http::Method::GET)
                    .uri(url.as_str())
                    .body(Bytes::new())?;
                request.headers_mut().extend(headers);

                let mut service = {
                    let locked = service.lock().unwrap_or_else(|e| e.into_inner());
                    locked.clone()
                };
                let response = service.ready().await?.call(request).await?;

                let status = response.status().as_u16();
                let response_headers = response.headers().clone();
                let body = String::from_utf8_lossy(response.body()).into_owned();

                Ok(HttpExchange {
                    status,
                    headers: response_headers,
                    final_url: url.to_string(),
                    body,
                })
            }
        }
    }

    fn reqwest_client(
        &self,
        clients: &Arc<Mutex<HashMap<String, reqwest::Client>>>,
        proxy: Option<&ProxyEndpoint>,
        quirks: Option<&SiteQuirks>,
        timeout: Duration,
    ) -> Result<reqwest::Client> {
        let key = proxy.map(|proxy| proxy.id.clone()).unwrap_or_default();

        {
            let cached = clients.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(client) = cached.get(&key) {
                return Ok(client.clone());
            }
        }

        let user_agent = quirks
            .and_then(|quirks| quirks.preferred_user_agent.clone())
            .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string());

        let mut builder = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS));

        if let Some(proxy) = proxy {
            let proxy = reqwest::Proxy::all(&proxy.url).map_err(|error| {
                Error::with_source(
                    ErrorKind::Other,
                    "invalid proxy credential URL",
                    Box::new(error),
                )
            })?;
            builder = builder.proxy(proxy);
        }

        let client = builder.build().map_err(|error| {
            Error::with_source(ErrorKind::Other, "failed to build HTTP client", Box::new(error))
        })?;

        let mut cached = clients.lock().unwrap_or_else(|e| e.into_inner());
        cached.insert(key, client.clone());
        Ok(client)
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for HttpFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let transport = match &self.transport {
            Transport::Reqwest { .. } => "Reqwest",
            Transport::Service(_) => "Service",
        };
        f.debug_struct("HttpFetcher")
            .field("transport", &transport)
            .finish_non_exhaustive()
    }
}

/// Maps an HTTP status to the failure the fetcher's fallback policy acts
/// on. `None` for statuses worth extracting from.
#[must_use]
pub fn status_failure(status: u16) -> Option<Error> {
    match status {
        200..=399 => None,
        403 => Some(Error::new(ErrorKind::Blocked, "origin returned 403")),
        429 => Some(Error::new(ErrorKind::Blocked, "origin returned 429")),
        400..=499 => Some(Error::new(
            ErrorKind::Transport,
            format!("origin returned client error {status}"),
        )),
        _ => Some(Error::new(
            ErrorKind::Transport,
            format!("origin returned server error {status}"),
        )),
    }
}

fn request_headers(quirks: Option<&SiteQuirks>) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        http::header::ACCEPT,
        HeaderValue::from_static("text/html,application/xhtml+xml,application/json;q=0.9,*/*;q=0.8"),
    );
    headers.insert(
        http::header::ACCEPT_LANGUAGE,
        HeaderValue::from_static("en-US,en;q=0.9"),
    );

    if let Some(quirks) = quirks {
        for (name, value) in &quirks.required_headers {
            if let (Ok(name), Ok(value)) = (
                HeaderName::try_from(name.as_str()),
                HeaderValue::try_from(value.as_str()),
            ) {
                headers.insert(name, value);
            }
        }
        for name in &quirks.forbidden_headers {
            if let Ok(name) = HeaderName::try_from(name.as_str()) {
                headers.remove(name);
            }
        }
    }

    headers
}

fn from_reqwest_error(error: reqwest::Error) -> Error {
    let kind = if error.is_timeout() || error.is_connect() {
        ErrorKind::Transport
    } else {
        ErrorKind::Other
    };
    Error::with_source(kind, error.to_string(), Box::new(error))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tower::service_fn;

    fn scripted_fetcher(body: &'static str, status: u16) -> HttpFetcher {
        HttpFetcher::from_service(service_fn(move |_request: http::Request<Bytes>| async move {
            let response = http::Response::builder()
                .status(status)
                .header(http::header::CONTENT_TYPE, "text/html")
                .body(Bytes::from_static(body.as_bytes()))?;
            Ok::<_, Error>(response)
        }))
    }

    #[tokio::test]
    async fn service_transport_round_trips() {
        let fetcher = scripted_fetcher("<html>ok</html>", 200);
        let url = url::Url::parse("https://example.com/").unwrap();

        let exchange = fetcher
            .get(&url, None, None, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(exchange.status, 200);
        assert_eq!(exchange.body, "<html>ok</html>");
    }

    #[tokio::test]
    async fn quirk_headers_reach_the_wire() {
        let service = service_fn(|request: http::Request<Bytes>| async move {
            let value = request
                .headers()
                .get("x-requested-with")
                .and_then(|value| value.to_str().ok())
                .unwrap_or("missing")
                .to_string();
            let response = http::Response::builder()
                .status(200)
                .body(Bytes::from(value))?;
            Ok::<_, Error>(response)
        });
        let fetcher = HttpFetcher::from_service(service);

        let mut quirks = SiteQuirks::new("example.com");
        quirks
            .required_headers
            .insert("x-requested-with".into(), "XMLHttpRequest".into());

        let url = url::Url::parse("https://example.com/").unwrap();
        let exchange = fetcher
            .get(&url, None, Some(&quirks), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(exchange.body, "XMLHttpRequest");
    }

    #[test]
    fn status_mapping() {
        assert!(status_failure(200).is_none());
        assert_eq!(
            status_failure(403).unwrap().kind(),
            ErrorKind::Blocked
        );
        assert_eq!(
            status_failure(429).unwrap().kind(),
            ErrorKind::Blocked
        );
        assert_eq!(
            status_failure(404).unwrap().kind(),
            ErrorKind::Transport
        );
        assert_eq!(
            status_failure(503).unwrap().kind(),
            ErrorKind::Transport
        );
    }
}
