//! Reports, templates and their wire shapes.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::element::{BackendId, ElementId};
use crate::page::{without_selection, Page, PageId};
use crate::wire::{WireCodec, WireError, WirePage};
use crate::{CanvasError, CanvasResult};

/// Identifier of a report in the persisted store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "BackendId", into = "String")]
pub struct ReportId(String);

impl ReportId {
    /// Wrap a report identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<BackendId> for ReportId {
    fn from(id: BackendId) -> Self {
        Self(id.as_str().to_string())
    }
}

impl From<&str> for ReportId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<ReportId> for String {
    fn from(id: ReportId) -> Self {
        id.0
    }
}

impl fmt::Display for ReportId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The patient a report is about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Patient {
    /// Patient record id.
    pub id: String,
    /// Display name.
    pub name: String,
}

/// A persisted multi-page report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    /// Report identity.
    pub id: ReportId,
    /// Display name.
    pub name: String,
    /// Template the report was created from.
    #[serde(default)]
    pub template_id: Option<String>,
    /// Patient record id.
    #[serde(default)]
    pub patient_id: Option<String>,
    /// Patient display name.
    #[serde(default)]
    pub patient_name: Option<String>,
    /// Pages in document order.
    pub pages: Vec<Page>,
    /// Creation time, ms since epoch.
    #[serde(default)]
    pub created_at: u64,
    /// Last save time, ms since epoch.
    #[serde(default)]
    pub updated_at: u64,
}

impl Report {
    /// Check the report is structurally usable by the editor.
    ///
    /// # Errors
    ///
    /// Returns [`CanvasError::InvalidReport`] if the name is blank or there
    /// are no pages.
    pub fn validate(&self) -> CanvasResult<()> {
        if self.name.trim().is_empty() {
            return Err(CanvasError::InvalidReport(format!("report {} has no name", self.id)));
        }
        if self.pages.is_empty() {
            return Err(CanvasError::InvalidReport(format!("report {} has no pages", self.id)));
        }
        Ok(())
    }

    /// Metadata-only view for listings.
    #[must_use]
    pub fn summary(&self) -> ReportSummary {
        ReportSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            template_id: self.template_id.clone(),
            patient_id: self.patient_id.clone(),
            patient_name: self.patient_name.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }

    /// Decode a report received from the backend.
    ///
    /// # Errors
    ///
    /// Returns [`WireError`] if a page fails to decode, or wraps
    /// [`CanvasError::InvalidReport`] if the report has no id.
    pub fn from_wire(codec: &WireCodec, wire: WireReport) -> Result<Self, WireError> {
        let id = wire
            .id
            .map(ReportId::from)
            .ok_or_else(|| CanvasError::InvalidReport("report without id".to_string()))?;
        Ok(Self {
            id,
            name: wire.name,
            template_id: wire.template_id,
            patient_id: wire.patient_id,
            patient_name: wire.patient_name,
            pages: codec.pages_from_wire(wire.pages)?,
            created_at: wire.created_at.unwrap_or_default(),
            updated_at: wire.updated_at.unwrap_or_default(),
        })
    }

    /// Encode the report, pages included.
    ///
    /// # Errors
    ///
    /// Propagates page encoding errors.
    pub fn to_wire(&self, codec: &WireCodec) -> Result<WireReport, WireError> {
        Ok(WireReport {
            id: Some(BackendId::new(self.id.as_str())),
            name: self.name.clone(),
            template_id: self.template_id.clone(),
            patient_id: self.patient_id.clone(),
            patient_name: self.patient_name.clone(),
            pages: codec.pages_to_wire(&self.pages)?,
            created_at: Some(self.created_at),
            updated_at: Some(self.updated_at),
        })
    }
}

/// A report without its pages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportSummary {
    /// Report identity.
    pub id: ReportId,
    /// Display name.
    pub name: String,
    /// Template the report was created from.
    #[serde(default)]
    pub template_id: Option<String>,
    /// Patient record id.
    #[serde(default)]
    pub patient_id: Option<String>,
    /// Patient display name.
    #[serde(default)]
    pub patient_name: Option<String>,
    /// Creation time, ms since epoch.
    #[serde(default)]
    pub created_at: u64,
    /// Last save time, ms since epoch.
    #[serde(default)]
    pub updated_at: u64,
}

/// A report as the backend sends and accepts it.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireReport {
    /// Backend identity; absent before creation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<BackendId>,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Template the report was created from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_id: Option<String>,
    /// Patient record id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient_id: Option<String>,
    /// Patient display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient_name: Option<String>,
    /// Pages with their elements.
    #[serde(default)]
    pub pages: Vec<WirePage>,
    /// Creation time, ms since epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<u64>,
    /// Last save time, ms since epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<u64>,
}

/// A reusable page layout that new reports start from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Template {
    /// Template identity.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Pages to copy into new reports.
    pub pages: Vec<Page>,
}

impl Template {
    /// Decode a template received from the backend.
    ///
    /// # Errors
    ///
    /// Propagates page decoding errors.
    pub fn from_wire(codec: &WireCodec, wire: WireTemplate) -> Result<Self, WireError> {
        Ok(Self {
            id: wire.id.as_str().to_string(),
            name: wire.name,
            pages: codec.pages_from_wire(wire.pages)?,
        })
    }

    /// Report metadata for a new report about `patient`, without an id yet.
    #[must_use]
    pub fn report_header(&self, patient: &Patient, now: u64) -> WireReport {
        WireReport {
            id: None,
            name: format!("{} - {}", self.name, patient.name),
            template_id: Some(self.id.clone()),
            patient_id: Some(patient.id.clone()),
            patient_name: Some(patient.name.clone()),
            pages: Vec::new(),
            created_at: Some(now),
            updated_at: Some(now),
        }
    }

    /// Copy of the template pages for a new report.
    ///
    /// Every page and element gets a fresh local id and loses its backend
    /// id, so saving creates new rows instead of touching the template's.
    #[must_use]
    pub fn fresh_pages(&self) -> Vec<Page> {
        let mut pages = without_selection(&self.pages);
        for page in &mut pages {
            page.id = PageId::new();
            page.backend_id = None;
            page.fill_default_size();
            for element in &mut page.elements {
                element.id = ElementId::new();
                element.backend_id = None;
            }
        }
        if pages.is_empty() {
            pages.push(Page::new("Page 1"));
        }
        pages
    }
}

/// A template as the backend sends it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireTemplate {
    /// Backend identity.
    pub id: BackendId,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Pages with their elements.
    #[serde(default)]
    pub pages: Vec<WirePage>,
}

/// Get the current Unix timestamp in milliseconds.
#[must_use]
pub fn current_timestamp_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map_or(0, |d| {
        // Timestamp will not exceed u64 max for millennia
        #[allow(clippy::cast_possible_truncation)]
        {
            d.as_millis() as u64
        }
    })
}
