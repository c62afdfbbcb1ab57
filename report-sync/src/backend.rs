//! The report persistence API and an in-process implementation.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use report_core::{BackendId, ReportId, ReportSummary, WireElement, WirePage, WireReport, WireTemplate};
use thiserror::Error;

/// Errors returned by a [`ReportBackend`].
#[derive(Debug, Error)]
pub enum BackendError {
    /// The configured base URL is invalid.
    #[error("invalid backend URL: {0}")]
    InvalidUrl(String),
    /// HTTP layer failed (connection, timeout, etc.).
    #[error("backend HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// JSON parsing failed unexpectedly.
    #[error("failed to parse backend payload: {0}")]
    Json(#[from] serde_json::Error),
    /// The backend answered with an error status.
    #[error("backend returned {status}: {message}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body or reason.
        message: String,
    },
    /// The addressed row does not exist.
    #[error("not found: {0}")]
    NotFound(String),
    /// The backend is temporarily unable to serve the request.
    #[error("backend unavailable: {0}")]
    Unavailable(String),
}

impl BackendError {
    /// Returns true if this error is retryable (transient failures).
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http(_) | Self::Unavailable(_) => true,
            Self::Status { status, .. } => *status >= 500,
            Self::InvalidUrl(_) | Self::Json(_) | Self::NotFound(_) => false,
        }
    }

    /// Whether the error means the row is already gone.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Result alias for backend calls.
pub type BackendResult<T> = Result<T, BackendError>;

/// REST-shaped persistence for reports, pages and elements.
///
/// Elements are addressed by their own backend id; pages are addressed
/// within their report.
#[async_trait]
pub trait ReportBackend: Send + Sync {
    /// List report metadata.
    async fn list_reports(&self) -> BackendResult<Vec<ReportSummary>>;

    /// Fetch one report with its pages and elements.
    async fn fetch_report(&self, id: &ReportId) -> BackendResult<WireReport>;

    /// Create a report row (pages are created separately).
    async fn create_report(&self, report: &WireReport) -> BackendResult<ReportSummary>;

    /// Update report metadata; `report.pages` is ignored.
    async fn update_report(&self, id: &ReportId, report: &WireReport) -> BackendResult<()>;

    /// Delete a report and everything in it.
    async fn delete_report(&self, id: &ReportId) -> BackendResult<()>;

    /// Fetch a template with its pages and elements.
    async fn fetch_template(&self, id: &str) -> BackendResult<WireTemplate>;

    /// Create a page; `page.elements` is ignored. Returns the new id.
    async fn create_page(&self, report: &ReportId, page: &WirePage) -> BackendResult<BackendId>;

    /// Update a page header; `page.id` must be set.
    async fn update_page(&self, report: &ReportId, page: &WirePage) -> BackendResult<()>;

    /// Delete a page and its elements.
    async fn delete_page(&self, report: &ReportId, page: &BackendId) -> BackendResult<()>;

    /// Create an element on a page. Returns the new id.
    async fn create_element(
        &self,
        report: &ReportId,
        page: &BackendId,
        element: &WireElement,
    ) -> BackendResult<BackendId>;

    /// Update an element; `element.id` must be set.
    async fn update_element(&self, report: &ReportId, element: &WireElement) -> BackendResult<()>;

    /// Delete an element.
    async fn delete_element(&self, report: &ReportId, element: &BackendId) -> BackendResult<()>;
}

/// In-process backend for tests and offline use.
///
/// Clones share storage. Writes can be slowed down or made to fail after a
/// number of successful calls.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    inner: Arc<RwLock<MemoryState>>,
}

#[derive(Debug, Default)]
struct MemoryState {
    reports: BTreeMap<ReportId, WireReport>,
    templates: HashMap<String, WireTemplate>,
    write_log: Vec<String>,
    writes_before_failure: Option<usize>,
    latency: Option<Duration>,
}

impl MemoryBackend {
    /// Create an empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::RwLockWriteGuard<'_, MemoryState> {
        self.inner
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Store a report as-is. Missing ids are generated.
    pub fn insert_report(&self, mut report: WireReport) -> ReportId {
        let id = report.id.get_or_insert_with(new_id).clone();
        for page in &mut report.pages {
            page.id.get_or_insert_with(new_id);
            for element in &mut page.elements {
                element.id.get_or_insert_with(new_id);
            }
        }
        let id = ReportId::from(id);
        self.state().reports.insert(id.clone(), report);
        id
    }

    /// Store a template.
    pub fn insert_template(&self, template: WireTemplate) {
        self.state()
            .templates
            .insert(template.id.as_str().to_string(), template);
    }

    /// Current stored copy of a report.
    #[must_use]
    pub fn report(&self, id: &ReportId) -> Option<WireReport> {
        self.state().reports.get(id).cloned()
    }

    /// Let `n` more writes succeed, then fail every write with
    /// [`BackendError::Unavailable`].
    pub fn fail_writes_after(&self, n: usize) {
        self.state().writes_before_failure = Some(n);
    }

    /// Stop failing writes.
    pub fn heal(&self) {
        self.state().writes_before_failure = None;
    }

    /// Delay every write by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        self.state().latency = Some(latency);
    }

    /// Descriptions of successful writes, in order.
    #[must_use]
    pub fn write_log(&self) -> Vec<String> {
        self.state().write_log.clone()
    }

    /// Forget the write log.
    pub fn clear_write_log(&self) {
        self.state().write_log.clear();
    }

    async fn write<T>(
        &self,
        description: String,
        op: impl FnOnce(&mut MemoryState) -> BackendResult<T>,
    ) -> BackendResult<T> {
        let latency = self.state().latency;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let mut state = self.state();
        match state.writes_before_failure {
            Some(0) => {
                return Err(BackendError::Unavailable(format!(
                    "injected failure: {description}"
                )))
            }
            Some(ref mut n) => *n -= 1,
            None => {}
        }
        let value = op(&mut state)?;
        state.write_log.push(description);
        Ok(value)
    }
}

fn new_id() -> BackendId {
    BackendId::new(uuid::Uuid::new_v4().to_string())
}

fn report_mut<'a>(state: &'a mut MemoryState, id: &ReportId) -> BackendResult<&'a mut WireReport> {
    state
        .reports
        .get_mut(id)
        .ok_or_else(|| BackendError::NotFound(format!("report {id}")))
}

fn summary_of(id: &ReportId, report: &WireReport) -> ReportSummary {
    ReportSummary {
        id: id.clone(),
        name: report.name.clone(),
        template_id: report.template_id.clone(),
        patient_id: report.patient_id.clone(),
        patient_name: report.patient_name.clone(),
        created_at: report.created_at.unwrap_or_default(),
        updated_at: report.updated_at.unwrap_or_default(),
    }
}

#[async_trait]
impl ReportBackend for MemoryBackend {
    async fn list_reports(&self) -> BackendResult<Vec<ReportSummary>> {
        let state = self.state();
        Ok(state
            .reports
            .iter()
            .map(|(id, report)| summary_of(id, report))
            .collect())
    }

    async fn fetch_report(&self, id: &ReportId) -> BackendResult<WireReport> {
        self.state()
            .reports
            .get(id)
            .cloned()
            .ok_or_else(|| BackendError::NotFound(format!("report {id}")))
    }

    async fn create_report(&self, report: &WireReport) -> BackendResult<ReportSummary> {
        let mut stored = report.clone();
        stored.pages.clear();
        self.write(format!("create report {}", report.name), move |state| {
            let id = ReportId::from(stored.id.get_or_insert_with(new_id).clone());
            let summary = summary_of(&id, &stored);
            state.reports.insert(id, stored);
            Ok(summary)
        })
        .await
    }

    async fn update_report(&self, id: &ReportId, report: &WireReport) -> BackendResult<()> {
        self.write(format!("update report {id}"), |state| {
            let stored = report_mut(state, id)?;
            stored.name.clone_from(&report.name);
            stored.template_id.clone_from(&report.template_id);
            stored.patient_id.clone_from(&report.patient_id);
            stored.patient_name.clone_from(&report.patient_name);
            if report.updated_at.is_some() {
                stored.updated_at = report.updated_at;
            }
            Ok(())
        })
        .await
    }

    async fn delete_report(&self, id: &ReportId) -> BackendResult<()> {
        self.write(format!("delete report {id}"), |state| {
            state
                .reports
                .remove(id)
                .map(|_| ())
                .ok_or_else(|| BackendError::NotFound(format!("report {id}")))
        })
        .await
    }

    async fn fetch_template(&self, id: &str) -> BackendResult<WireTemplate> {
        self.state()
            .templates
            .get(id)
            .cloned()
            .ok_or_else(|| BackendError::NotFound(format!("template {id}")))
    }

    async fn create_page(&self, report: &ReportId, page: &WirePage) -> BackendResult<BackendId> {
        self.write(format!("create page {}", page.name), |state| {
            let stored = report_mut(state, report)?;
            let id = new_id();
            let mut page = page.clone();
            page.id = Some(id.clone());
            page.elements.clear();
            stored.pages.push(page);
            Ok(id)
        })
        .await
    }

    async fn update_page(&self, report: &ReportId, page: &WirePage) -> BackendResult<()> {
        let id = page.id.clone().unwrap_or_else(|| BackendId::new(""));
        self.write(format!("update page {id}"), |state| {
            let stored = report_mut(state, report)?;
            let existing = stored
                .pages
                .iter_mut()
                .find(|p| p.id.as_ref() == Some(&id))
                .ok_or_else(|| BackendError::NotFound(format!("page {id}")))?;
            existing.name.clone_from(&page.name);
            existing.order = page.order;
            existing.width = page.width;
            existing.height = page.height;
            Ok(())
        })
        .await
    }

    async fn delete_page(&self, report: &ReportId, page: &BackendId) -> BackendResult<()> {
        self.write(format!("delete page {page}"), |state| {
            let stored = report_mut(state, report)?;
            let before = stored.pages.len();
            stored.pages.retain(|p| p.id.as_ref() != Some(page));
            if stored.pages.len() == before {
                return Err(BackendError::NotFound(format!("page {page}")));
            }
            Ok(())
        })
        .await
    }

    async fn create_element(
        &self,
        report: &ReportId,
        page: &BackendId,
        element: &WireElement,
    ) -> BackendResult<BackendId> {
        self.write(format!("create element type {}", element.type_code), |state| {
            let stored = report_mut(state, report)?;
            let target = stored
                .pages
                .iter_mut()
                .find(|p| p.id.as_ref() == Some(page))
                .ok_or_else(|| BackendError::NotFound(format!("page {page}")))?;
            let id = new_id();
            let mut element = element.clone();
            element.id = Some(id.clone());
            target.elements.push(element);
            Ok(id)
        })
        .await
    }

    async fn update_element(&self, report: &ReportId, element: &WireElement) -> BackendResult<()> {
        let id = element.id.clone().unwrap_or_else(|| BackendId::new(""));
        self.write(format!("update element {id}"), |state| {
            let stored = report_mut(state, report)?;
            let existing = stored
                .pages
                .iter_mut()
                .flat_map(|p| p.elements.iter_mut())
                .find(|e| e.id.as_ref() == Some(&id))
                .ok_or_else(|| BackendError::NotFound(format!("element {id}")))?;
            *existing = element.clone();
            Ok(())
        })
        .await
    }

    async fn delete_element(&self, report: &ReportId, element: &BackendId) -> BackendResult<()> {
        self.write(format!("delete element {element}"), |state| {
            let stored = report_mut(state, report)?;
            for page in &mut stored.pages {
                let before = page.elements.len();
                page.elements.retain(|e| e.id.as_ref() != Some(element));
                if page.elements.len() != before {
                    return Ok(());
                }
            }
            Err(BackendError::NotFound(format!("element {element}")))
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn wire_report(name: &str) -> WireReport {
        WireReport {
            name: name.to_string(),
            ..WireReport::default()
        }
    }

    fn wire_page(name: &str) -> WirePage {
        WirePage {
            id: None,
            order: 0,
            name: name.to_string(),
            width: None,
            height: None,
            elements: Vec::new(),
        }
    }

    #[test]
    fn test_backend_error_is_retryable() {
        assert!(BackendError::Unavailable("x".into()).is_retryable());
        assert!(BackendError::Status {
            status: 503,
            message: String::new()
        }
        .is_retryable());
        assert!(!BackendError::Status {
            status: 400,
            message: String::new()
        }
        .is_retryable());
        assert!(!BackendError::NotFound("x".into()).is_retryable());
        assert!(BackendError::NotFound("x".into()).is_not_found());
    }

    #[tokio::test]
    async fn test_create_page_and_element() {
        let backend = MemoryBackend::new();
        let summary = backend.create_report(&wire_report("R")).await.expect("report");
        let page = backend
            .create_page(&summary.id, &wire_page("Page 1"))
            .await
            .expect("page");
        let element = WireElement {
            id: None,
            type_code: 0,
            x: 1.0,
            y: 2.0,
            width: 100.0,
            height: 50.0,
            content: json!({"text": "hi"}),
        };
        let element_id = backend
            .create_element(&summary.id, &page, &element)
            .await
            .expect("element");

        let stored = backend.report(&summary.id).expect("stored");
        assert_eq!(stored.pages.len(), 1);
        assert_eq!(stored.pages[0].elements[0].id, Some(element_id.clone()));

        backend
            .delete_element(&summary.id, &element_id)
            .await
            .expect("delete");
        let err = backend
            .delete_element(&summary.id, &element_id)
            .await
            .expect_err("gone");
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_injected_failure() {
        let backend = MemoryBackend::new();
        let summary = backend.create_report(&wire_report("R")).await.expect("report");
        backend.fail_writes_after(1);

        backend
            .create_page(&summary.id, &wire_page("ok"))
            .await
            .expect("first write succeeds");
        let err = backend
            .create_page(&summary.id, &wire_page("fails"))
            .await
            .expect_err("second write fails");
        assert!(err.is_retryable());
        assert_eq!(backend.report(&summary.id).expect("stored").pages.len(), 1);

        backend.heal();
        backend
            .create_page(&summary.id, &wire_page("healed"))
            .await
            .expect("write after heal");
    }

    #[tokio::test]
    async fn test_list_reports() {
        let backend = MemoryBackend::new();
        backend.insert_report(wire_report("A"));
        backend.insert_report(wire_report("B"));
        assert_eq!(backend.list_reports().await.expect("list").len(), 2);
    }
}
