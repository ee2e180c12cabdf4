use bytes::Bytes;
use http_body_util::{BodyExt as _, Full};
use hyper::Request;
use hyper::body::Incoming;
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::time::Instant;

use super::transport::{BoxFuture, Transport};
use super::{Error, HttpRequest, HttpResponse, Result};

#[derive(Debug, Clone)]
pub struct HttpClient {
    inner: Client<HttpsConnector<HttpConnector>, Full<Bytes>>,
}

impl Default for HttpClient {
    fn default() -> Self {
        // OS-level TCP connect timeouts can run to tens of seconds; an unreachable target
        // should surface as failed samples right away.
        Self::new(Some(Duration::from_secs(3)))
    }
}

impl HttpClient {
    #[must_use]
    pub fn new(connect_timeout: Option<Duration>) -> Self {
        let mut http_connector = HttpConnector::new();
        http_connector.enforce_http(false);
        http_connector.set_connect_timeout(connect_timeout);

        let https_connector = HttpsConnectorBuilder::new()
            .with_webpki_roots()
            .https_or_http()
            .enable_http1()
            .wrap_connector(http_connector);

        let inner = Client::builder(TokioExecutor::new()).build(https_connector);

        Self { inner }
    }

    pub async fn request(&self, req: HttpRequest) -> Result<HttpResponse> {
        let timeout = req.timeout;
        let started = Instant::now();
        let exchange = self.exchange(req, started);

        match timeout {
            Some(timeout) => tokio::time::timeout(timeout, exchange)
                .await
                .map_err(|_| Error::Timeout(timeout))?,
            None => exchange.await,
        }
    }

    pub async fn get(&self, url: &str) -> Result<HttpResponse> {
        self.request(HttpRequest::get(url)).await
    }

    async fn exchange(&self, req: HttpRequest, started: Instant) -> Result<HttpResponse> {
        let parsed = url::Url::parse(&req.url).map_err(|_| Error::InvalidUrl(req.url.clone()))?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(Error::UnsupportedScheme(req.url));
        }

        let uri: hyper::Uri = req
            .url
            .parse()
            .map_err(|_| Error::InvalidUrl(req.url.clone()))?;

        let mut builder = Request::builder().method(req.method).uri(uri);

        if !has_header(&req.headers, "host")
            && let Some(host) = host_header_value(&parsed)
        {
            builder = builder.header(http::header::HOST, host);
        }
        if !req.body.is_empty() && !has_header(&req.headers, "content-length") {
            builder = builder.header(http::header::CONTENT_LENGTH, req.body.len());
        }

        for (k, v) in req.headers {
            let name = http::header::HeaderName::from_bytes(k.as_bytes())?;
            let value = http::header::HeaderValue::from_str(&v)?;
            builder = builder.header(name, value);
        }

        let req: Request<Full<Bytes>> = builder.body(Full::new(req.body))?;
        let res: hyper::Response<Incoming> = self.inner.request(req).await?;

        let (parts, body) = res.into_parts();
        let status = parts.status.as_u16();

        // Lowercase keys; repeated headers are joined with ", ".
        let mut merged: BTreeMap<String, String> = BTreeMap::new();
        for (name, value) in parts.headers.iter() {
            let key = name.as_str().to_ascii_lowercase();
            let v = String::from_utf8_lossy(value.as_bytes()).to_string();
            merged
                .entry(key)
                .and_modify(|cur| {
                    if !cur.is_empty() {
                        cur.push_str(", ");
                    }
                    cur.push_str(&v);
                })
                .or_insert(v);
        }
        let headers: Vec<(String, String)> = merged.into_iter().collect();

        let body = body.collect().await?.to_bytes();
        let latency = started.elapsed();

        Ok(HttpResponse {
            status,
            headers,
            bytes_received: body.len() as u64,
            body,
            latency,
        })
    }
}

fn has_header(headers: &[(String, String)], name: &str) -> bool {
    headers.iter().any(|(k, _)| k.eq_ignore_ascii_case(name))
}

/// `Url::port` is `None` for the scheme's default port.
fn host_header_value(parsed: &url::Url) -> Option<String> {
    let host = parsed.host_str()?;
    Some(match parsed.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    })
}

impl Transport for HttpClient {
    fn issue(&self, req: HttpRequest) -> BoxFuture<'_, Result<HttpResponse>> {
        Box::pin(self.request(req))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::TransportErrorKind;
    use rampr_testserver::TestServer;

    #[tokio::test]
    async fn unreachable_host_fails_fast_with_connect_timeout() {
        let client = HttpClient::new(Some(Duration::from_millis(200)));
        let req = HttpRequest::get("http://192.0.2.1:81/");

        let started = std::time::Instant::now();
        let _err = client.request(req).await.unwrap_err();
        let elapsed = started.elapsed();

        assert!(
            elapsed < Duration::from_secs(2),
            "expected fast failure, elapsed={elapsed:?}"
        );
    }

    #[test]
    fn host_header_omits_default_port() {
        let url = url::Url::parse("https://example.com:443/x").unwrap();
        assert_eq!(host_header_value(&url).as_deref(), Some("example.com"));
        let url = url::Url::parse("http://127.0.0.1:8080/").unwrap();
        assert_eq!(host_header_value(&url).as_deref(), Some("127.0.0.1:8080"));
    }

    #[tokio::test]
    async fn rejects_non_http_scheme() {
        let client = HttpClient::default();
        let err = client.get("ftp://localhost/file").await.unwrap_err();
        assert_eq!(err.kind(), TransportErrorKind::UnsupportedScheme);
    }

    #[tokio::test]
    async fn stringinate_round_trip_reports_latency_and_size() {
        let server = TestServer::start().await.unwrap();
        let client = HttpClient::default();

        let res = client
            .request(HttpRequest::post_json(
                &server.urls().stringinate,
                r#"{"input":"hello"}"#,
            ))
            .await
            .unwrap();

        assert_eq!(res.status, 200);
        let body = res.body_utf8().unwrap();
        assert!(body.contains(r#""most_frequent":"l""#), "body={body}");
        assert_eq!(res.bytes_received, res.body.len() as u64);
        assert!(res.latency > Duration::ZERO);
        assert!(
            res.header("content-type")
                .is_some_and(|v| v.starts_with("application/json"))
        );

        server.shutdown().await;
    }

    #[tokio::test]
    async fn per_request_timeout_is_reported_as_timeout() {
        let server = TestServer::start().await.unwrap();
        let client = HttpClient::default();

        let url = format!("{}?ms=500", server.urls().slow);
        let err = client
            .issue(HttpRequest::get(url).with_timeout(Duration::from_millis(50)))
            .await
            .unwrap_err();
        assert!(err.is_timeout());

        server.shutdown().await;
    }

    #[tokio::test]
    async fn invalid_transformation_is_bad_request() {
        let server = TestServer::start().await.unwrap();
        let client = HttpClient::default();

        let res = client
            .request(HttpRequest::post_json(
                &server.urls().transform,
                r#"{"text":"abc","transformation":"reverse"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(res.status, 400);

        let res = client
            .request(HttpRequest::post_json(
                &server.urls().transform,
                r#"{"text":"abc def","transformation":"titlecase"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(res.status, 200);
        assert!(res.body_utf8().unwrap().contains(r#""transformed_text":"Abc Def""#));

        server.shutdown().await;
    }
}
