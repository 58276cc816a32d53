//! Source Fetching
//!
//! Downloads the raw CIDR list over HTTP(S).
//! Uses hyper with tokio for HTTP/1.1 and rustls for TLS, with the whole
//! round trip bounded by a timeout. Anything other than a 2xx response with
//! a UTF-8 body counts as a failed fetch.

use http_body_util::{BodyExt, Empty, Limited};
use hyper::body::{Bytes, Incoming};
use hyper::header::{HOST, USER_AGENT};
use hyper::{Request, Response, Uri};
use hyper_util::rt::TokioIo;
use rustls::ClientConfig;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tracing::{debug, warn};

/// Source fetch errors
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Unexpected HTTP status: {0}")]
    Status(u16),

    #[error("Body read error: {0}")]
    Body(String),

    #[error("Response body exceeds {0} bytes")]
    TooLarge(usize),

    #[error("Response body is not valid UTF-8")]
    NotUtf8,

    #[error("Request timeout after {0:?}")]
    Timeout(Duration),
}

/// Something that can download the text of a source URL
pub trait Fetch: Send + Sync {
    fn fetch(&self, url: &str) -> impl Future<Output = Result<String, FetchError>> + Send;
}

/// HTTP fetcher configuration
#[derive(Debug, Clone)]
pub struct FetcherConfig {
    /// Bound on the whole request, connect to last body byte
    pub timeout: Duration,
    /// User-Agent string
    pub user_agent: String,
    /// Maximum response body size
    pub max_body_size: usize,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            user_agent: format!("ipnets/{}", env!("CARGO_PKG_VERSION")),
            max_body_size: 10 * 1024 * 1024, // 10 MB
        }
    }
}

/// Plain hyper + rustls HTTP/1.1 fetcher
#[derive(Clone)]
pub struct HttpFetcher {
    config: FetcherConfig,
    tls: TlsConnector,
}

impl HttpFetcher {
    pub fn new(config: FetcherConfig) -> Self {
        let mut root_store = rustls::RootCertStore::empty();
        root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

        let tls_config = ClientConfig::builder()
            .with_root_certificates(root_store)
            .with_no_client_auth();

        debug!("HTTP fetcher initialized (timeout: {:?})", config.timeout);

        Self {
            config,
            tls: TlsConnector::from(Arc::new(tls_config)),
        }
    }

    /// Create with default configuration
    pub fn with_defaults() -> Self {
        Self::new(FetcherConfig::default())
    }

    async fn get(&self, url: &str) -> Result<String, FetchError> {
        let start = Instant::now();

        let uri: Uri = url
            .parse()
            .map_err(|e: hyper::http::uri::InvalidUri| FetchError::InvalidUrl(e.to_string()))?;

        let is_https = match uri.scheme_str() {
            Some("https") => true,
            Some("http") => false,
            _ => return Err(FetchError::InvalidUrl(format!("unsupported scheme in {}", url))),
        };
        let host = uri
            .host()
            .ok_or_else(|| FetchError::InvalidUrl("No host in URL".to_string()))?;
        let port = uri.port_u16().unwrap_or(if is_https { 443 } else { 80 });
        let host_header = match uri.port_u16() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        };
        let path = uri.path_and_query().map(|p| p.as_str()).unwrap_or("/");

        let request = Request::get(path)
            .header(HOST, host_header)
            .header(USER_AGENT, &self.config.user_agent)
            .body(Empty::<Bytes>::new())
            .map_err(|e| FetchError::Http(e.to_string()))?;

        // IPv6 literals come back bracketed from the URI
        let connect_host = host.trim_start_matches('[').trim_end_matches(']');
        let stream = TcpStream::connect((connect_host, port))
            .await
            .map_err(|e| FetchError::ConnectionFailed(e.to_string()))?;

        let response = if is_https {
            let server_name = rustls::pki_types::ServerName::try_from(host.to_string())
                .map_err(|_| FetchError::Tls("Invalid server name".to_string()))?;
            let tls_stream = self
                .tls
                .connect(server_name, stream)
                .await
                .map_err(|e| FetchError::Tls(e.to_string()))?;
            send(tls_stream, request).await?
        } else {
            send(stream, request).await?
        };

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let limit = self.config.max_body_size;
        let collected = Limited::new(response.into_body(), limit)
            .collect()
            .await
            .map_err(|e| {
                if e.is::<http_body_util::LengthLimitError>() {
                    FetchError::TooLarge(limit)
                } else {
                    FetchError::Body(e.to_string())
                }
            })?;
        let body = String::from_utf8(collected.to_bytes().to_vec()).map_err(|_| FetchError::NotUtf8)?;

        debug!(
            "GET {} -> {} ({} bytes, {:?})",
            url,
            status,
            body.len(),
            start.elapsed()
        );

        Ok(body)
    }
}

impl Fetch for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        let timeout = self.config.timeout;
        tokio::time::timeout(timeout, self.get(url))
            .await
            .map_err(|_| FetchError::Timeout(timeout))?
    }
}

/// Run one HTTP/1.1 exchange over an established stream
async fn send<S>(stream: S, request: Request<Empty<Bytes>>) -> Result<Response<Incoming>, FetchError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let io = TokioIo::new(stream);
    let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
        .await
        .map_err(|e| FetchError::Http(e.to_string()))?;

    tokio::spawn(async move {
        if let Err(e) = conn.await {
            warn!("Connection error: {}", e);
        }
    });

    sender
        .send_request(request)
        .await
        .map_err(|e| FetchError::Http(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve a single canned HTTP response and return the URL to reach it
    async fn serve_once(response: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = socket.read(&mut buf).await;
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.unwrap();
        });

        format!("http://{}/ips-v4", addr)
    }

    #[test]
    fn test_default_config() {
        let config = FetcherConfig::default();
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert!(config.user_agent.starts_with("ipnets/"));
    }

    #[tokio::test]
    async fn test_fetch_body() {
        let url = serve_once(
            "HTTP/1.1 200 OK\r\nContent-Length: 26\r\nConnection: close\r\n\r\n10.0.0.0/8\n192.168.0.0/16\n",
        )
        .await;

        let body = HttpFetcher::with_defaults().fetch(&url).await.unwrap();
        assert_eq!(body, "10.0.0.0/8\n192.168.0.0/16\n");
    }

    #[tokio::test]
    async fn test_non_success_status_is_error() {
        let url = serve_once(
            "HTTP/1.1 404 Not Found\r\nContent-Length: 9\r\nConnection: close\r\n\r\nnot found",
        )
        .await;

        let result = HttpFetcher::with_defaults().fetch(&url).await;
        assert!(matches!(result, Err(FetchError::Status(404))));
    }

    #[tokio::test]
    async fn test_oversized_body_is_error() {
        let url = serve_once(
            "HTTP/1.1 200 OK\r\nContent-Length: 26\r\nConnection: close\r\n\r\n10.0.0.0/8\n192.168.0.0/16\n",
        )
        .await;

        let fetcher = HttpFetcher::new(FetcherConfig {
            max_body_size: 8,
            ..FetcherConfig::default()
        });
        let result = fetcher.fetch(&url).await;
        assert!(matches!(result, Err(FetchError::TooLarge(8))));
    }

    #[tokio::test]
    async fn test_connection_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let result = HttpFetcher::with_defaults()
            .fetch(&format!("http://{}/", addr))
            .await;
        assert!(matches!(result, Err(FetchError::ConnectionFailed(_))));
    }

    #[tokio::test]
    async fn test_invalid_url() {
        let fetcher = HttpFetcher::with_defaults();
        assert!(matches!(
            fetcher.fetch("ftp://example.com/list").await,
            Err(FetchError::InvalidUrl(_))
        ));
        assert!(matches!(
            fetcher.fetch("not a url").await,
            Err(FetchError::InvalidUrl(_))
        ));
    }

    #[tokio::test]
    async fn test_timeout() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        // Accept and hold the connection without ever answering.
        tokio::spawn(async move {
            let (_socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let fetcher = HttpFetcher::new(FetcherConfig {
            timeout: Duration::from_millis(100),
            ..FetcherConfig::default()
        });
        let result = fetcher.fetch(&format!("http://{}/", addr)).await;
        assert!(matches!(result, Err(FetchError::Timeout(_))));
    }
}
