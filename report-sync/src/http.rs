//! REST client for the report backend.
//!
//! Endpoints, relative to the base URL:
//!
//! ```text
//! GET    reports                      -> [ReportSummary]
//! POST   reports                      -> ReportSummary
//! GET    reports/{id}                 -> WireReport
//! PUT    reports/{id}
//! DELETE reports/{id}
//! GET    templates/{id}               -> WireTemplate
//! POST   reports/{id}/pages           -> {"id": ...}
//! PUT    reports/{id}/pages/{page}
//! DELETE reports/{id}/pages/{page}
//! POST   reports/{id}/pages/{page}/elements -> {"id": ...}
//! PUT    reports/{id}/elements/{element}
//! DELETE reports/{id}/elements/{element}
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use report_core::{BackendId, ReportId, ReportSummary, WireElement, WirePage, WireReport, WireTemplate};
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::warn;
use url::Url;

use crate::backend::{BackendError, BackendResult, ReportBackend};
use crate::config::RetryConfig;

/// Asynchronous REST backend client.
#[derive(Clone)]
pub struct HttpBackend {
    inner: Arc<InnerClient>,
}

struct InnerClient {
    http: Client,
    base: Url,
    token: Option<String>,
    retry_config: RetryConfig,
}

impl std::fmt::Debug for HttpBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpBackend")
            .field("base", &self.inner.base.as_str())
            .field("authenticated", &self.inner.token.is_some())
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
struct Created {
    id: BackendId,
}

impl HttpBackend {
    /// Create a client with default retry configuration.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::InvalidUrl`] if the URL is malformed.
    pub fn new(base_url: impl AsRef<str>, token: Option<String>) -> BackendResult<Self> {
        Self::with_retry_config(base_url, token, RetryConfig::default())
    }

    /// Create a client with custom retry configuration.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::InvalidUrl`] if the URL is malformed or cannot
    /// carry a path. Returns [`BackendError::Http`] if the HTTP client fails
    /// to build.
    pub fn with_retry_config(
        base_url: impl AsRef<str>,
        token: Option<String>,
        retry_config: RetryConfig,
    ) -> BackendResult<Self> {
        let base =
            Url::parse(base_url.as_ref()).map_err(|e| BackendError::InvalidUrl(e.to_string()))?;
        if base.cannot_be_a_base() {
            return Err(BackendError::InvalidUrl(format!("{base} cannot be a base URL")));
        }

        let http = Client::builder()
            .user_agent(concat!("report-sync/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            inner: Arc::new(InnerClient {
                http,
                base,
                token: token.filter(|t| !t.is_empty()),
                retry_config,
            }),
        })
    }

    /// The base URL requests are resolved against.
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.inner.base
    }

    fn endpoint(&self, segments: &[&str]) -> BackendResult<Url> {
        let mut url = self.inner.base.clone();
        url.path_segments_mut()
            .map_err(|()| BackendError::InvalidUrl(self.inner.base.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn send<B: Serialize + Sync>(
        &self,
        method: Method,
        segments: &[&str],
        body: Option<&B>,
    ) -> BackendResult<reqwest::Response> {
        let url = self.endpoint(segments)?;
        let config = &self.inner.retry_config;
        let attempts = config.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            let mut request = self.inner.http.request(method.clone(), url.clone());
            if let Some(token) = &self.inner.token {
                request = request.bearer_auth(token);
            }
            if let Some(body) = body {
                request = request.json(body);
            }

            let error = match request.send().await {
                Ok(response) => match Self::check_status(response, &url).await {
                    Ok(response) => return Ok(response),
                    Err(e) => e,
                },
                Err(e) => BackendError::Http(e),
            };

            if !error.is_retryable() || attempt + 1 >= attempts {
                return Err(error);
            }
            let delay = config.delay_for_attempt(attempt);
            warn!(
                "{} {} failed (attempt {}/{}), retrying in {}ms: {}",
                method,
                url.path(),
                attempt + 1,
                attempts,
                delay,
                error
            );
            tokio::time::sleep(tokio::time::Duration::from_millis(delay)).await;
            attempt += 1;
        }
    }

    async fn check_status(response: reqwest::Response, url: &Url) -> BackendResult<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::NOT_FOUND {
            return Err(BackendError::NotFound(url.path().to_string()));
        }
        let message = response.text().await.unwrap_or_default();
        Err(BackendError::Status {
            status: status.as_u16(),
            message,
        })
    }

    async fn get<T: DeserializeOwned>(&self, segments: &[&str]) -> BackendResult<T> {
        let response = self.send::<()>(Method::GET, segments, None).await?;
        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn write<B: Serialize + Sync>(
        &self,
        method: Method,
        segments: &[&str],
        body: &B,
    ) -> BackendResult<()> {
        self.send(method, segments, Some(body)).await?;
        Ok(())
    }

    async fn create<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        segments: &[&str],
        body: &B,
    ) -> BackendResult<T> {
        let response = self.send(Method::POST, segments, Some(body)).await?;
        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn delete(&self, segments: &[&str]) -> BackendResult<()> {
        self.send::<()>(Method::DELETE, segments, None).await?;
        Ok(())
    }
}

fn required_id<'a>(id: Option<&'a BackendId>, what: &str) -> BackendResult<&'a str> {
    id.map(BackendId::as_str)
        .ok_or_else(|| BackendError::NotFound(format!("{what} without backend id")))
}

#[async_trait]
impl ReportBackend for HttpBackend {
    #[tracing::instrument(skip(self))]
    async fn list_reports(&self) -> BackendResult<Vec<ReportSummary>> {
        self.get(&["reports"]).await
    }

    #[tracing::instrument(skip(self))]
    async fn fetch_report(&self, id: &ReportId) -> BackendResult<WireReport> {
        self.get(&["reports", id.as_str()]).await
    }

    #[tracing::instrument(skip(self, report), fields(name = %report.name))]
    async fn create_report(&self, report: &WireReport) -> BackendResult<ReportSummary> {
        self.create(&["reports"], report).await
    }

    #[tracing::instrument(skip(self, report))]
    async fn update_report(&self, id: &ReportId, report: &WireReport) -> BackendResult<()> {
        let header = WireReport {
            pages: Vec::new(),
            ..report.clone()
        };
        self.write(Method::PUT, &["reports", id.as_str()], &header).await
    }

    #[tracing::instrument(skip(self))]
    async fn delete_report(&self, id: &ReportId) -> BackendResult<()> {
        self.delete(&["reports", id.as_str()]).await
    }

    #[tracing::instrument(skip(self))]
    async fn fetch_template(&self, id: &str) -> BackendResult<WireTemplate> {
        self.get(&["templates", id]).await
    }

    #[tracing::instrument(skip(self, page), fields(order = page.order))]
    async fn create_page(&self, report: &ReportId, page: &WirePage) -> BackendResult<BackendId> {
        let created: Created = self.create(&["reports", report.as_str(), "pages"], page).await?;
        Ok(created.id)
    }

    #[tracing::instrument(skip(self, page), fields(order = page.order))]
    async fn update_page(&self, report: &ReportId, page: &WirePage) -> BackendResult<()> {
        let id = required_id(page.id.as_ref(), "page")?;
        self.write(Method::PUT, &["reports", report.as_str(), "pages", id], page)
            .await
    }

    #[tracing::instrument(skip(self))]
    async fn delete_page(&self, report: &ReportId, page: &BackendId) -> BackendResult<()> {
        self.delete(&["reports", report.as_str(), "pages", page.as_str()])
            .await
    }

    #[tracing::instrument(skip(self, element), fields(type_code = element.type_code))]
    async fn create_element(
        &self,
        report: &ReportId,
        page: &BackendId,
        element: &WireElement,
    ) -> BackendResult<BackendId> {
        let created: Created = self
            .create(
                &["reports", report.as_str(), "pages", page.as_str(), "elements"],
                element,
            )
            .await?;
        Ok(created.id)
    }

    #[tracing::instrument(skip(self, element))]
    async fn update_element(&self, report: &ReportId, element: &WireElement) -> BackendResult<()> {
        let id = required_id(element.id.as_ref(), "element")?;
        self.write(Method::PUT, &["reports", report.as_str(), "elements", id], element)
            .await
    }

    #[tracing::instrument(skip(self))]
    async fn delete_element(&self, report: &ReportId, element: &BackendId) -> BackendResult<()> {
        self.delete(&["reports", report.as_str(), "elements", element.as_str()])
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer, retry: RetryConfig) -> HttpBackend {
        HttpBackend::with_retry_config(server.uri(), Some("secret".to_string()), retry)
            .expect("client")
    }

    #[test]
    fn test_invalid_url_error() {
        let result = HttpBackend::new("not a url", None);
        assert!(matches!(result, Err(BackendError::InvalidUrl(_))));

        let result = HttpBackend::new("mailto:someone@example.com", None);
        assert!(matches!(result, Err(BackendError::InvalidUrl(_))));
    }

    #[test]
    fn test_endpoint_keeps_base_path() {
        let backend = HttpBackend::new("https://example.com/api/v1/", None).expect("client");
        let url = backend.endpoint(&["reports", "r 1"]).expect("url");
        assert_eq!(url.as_str(), "https://example.com/api/v1/reports/r%201");
    }

    #[tokio::test]
    #[cfg_attr(
        target_os = "macos",
        ignore = "wiremock/reqwest system-configuration issue on macOS"
    )]
    async fn list_reports_sends_bearer_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/reports"))
            .and(header("authorization", "Bearer secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"id": 7, "name": "Lipid panel", "updatedAt": 10}
            ])))
            .mount(&server)
            .await;

        let reports = client(&server, RetryConfig::none())
            .list_reports()
            .await
            .expect("list");
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].id, ReportId::from("7"));
    }

    #[tokio::test]
    #[cfg_attr(
        target_os = "macos",
        ignore = "wiremock/reqwest system-configuration issue on macOS"
    )]
    async fn create_element_posts_wire_payload() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/reports/r1/pages/p1/elements"))
            .and(body_json(json!({
                "type": 2, "x": 0.0, "y": 0.0, "width": 100.0, "height": 50.0,
                "content": {"headers": ["A"]}
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": 99})))
            .mount(&server)
            .await;

        let element = WireElement {
            id: None,
            type_code: 2,
            x: 0.0,
            y: 0.0,
            width: 100.0,
            height: 50.0,
            content: json!({"headers": ["A"]}),
        };
        let id = client(&server, RetryConfig::none())
            .create_element(&ReportId::from("r1"), &BackendId::new("p1"), &element)
            .await
            .expect("create");
        assert_eq!(id, BackendId::new("99"));
    }

    #[tokio::test]
    #[cfg_attr(
        target_os = "macos",
        ignore = "wiremock/reqwest system-configuration issue on macOS"
    )]
    async fn not_found_is_mapped() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/reports/r1/elements/e1"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = client(&server, RetryConfig::none())
            .delete_element(&ReportId::from("r1"), &BackendId::new("e1"))
            .await
            .expect_err("404");
        assert!(err.is_not_found());
    }

    #[tokio::test]
    #[cfg_attr(
        target_os = "macos",
        ignore = "wiremock/reqwest system-configuration issue on macOS"
    )]
    async fn server_errors_are_retried() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/reports/r1/pages/p1"))
            .respond_with(ResponseTemplate::new(503).set_body_string("busy"))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/reports/r1/pages/p1"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let page = WirePage {
            id: Some(BackendId::new("p1")),
            order: 0,
            name: "Summary".to_string(),
            width: Some(595.0),
            height: Some(842.0),
            elements: Vec::new(),
        };
        client(&server, RetryConfig::new(3, 1, 5, 2.0))
            .update_page(&ReportId::from("r1"), &page)
            .await
            .expect("third attempt succeeds");
    }

    #[tokio::test]
    #[cfg_attr(
        target_os = "macos",
        ignore = "wiremock/reqwest system-configuration issue on macOS"
    )]
    async fn client_errors_are_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/reports"))
            .respond_with(ResponseTemplate::new(422).set_body_string("name required"))
            .expect(1)
            .mount(&server)
            .await;

        let err = client(&server, RetryConfig::new(3, 1, 5, 2.0))
            .create_report(&WireReport::default())
            .await
            .expect_err("422");
        match err {
            BackendError::Status { status, message } => {
                assert_eq!(status, 422);
                assert_eq!(message, "name required");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
