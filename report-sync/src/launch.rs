//! Launch parameters: which report the editor opens with.
//!
//! The host passes a query string such as
//! `reportId=r-1` or `templateId=t-1&templateName=Lipid&patientId=p-7&patientName=Ada`.

use report_core::{Patient, ReportId};
use serde::{Deserialize, Serialize};

/// Raw launch parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchParams {
    /// Existing report to open.
    pub report_id: Option<String>,
    /// Template to create a report from.
    pub template_id: Option<String>,
    /// Template display name.
    pub template_name: Option<String>,
    /// Patient the new report is for.
    pub patient_id: Option<String>,
    /// Patient display name.
    pub patient_name: Option<String>,
}

/// What the editor should do on launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpenRequest {
    /// Fetch and show an existing report.
    Existing(ReportId),
    /// Create a report from a template for a patient.
    FromTemplate {
        /// Template to instantiate.
        template_id: String,
        /// Patient the report is for.
        patient: Patient,
    },
    /// Start with an empty editor.
    Blank,
}

impl LaunchParams {
    /// Parse a URL query string. Unknown keys are ignored; blank values count
    /// as absent.
    #[must_use]
    pub fn from_query(query: &str) -> Self {
        let mut params = Self::default();
        for (key, value) in url::form_urlencoded::parse(query.trim_start_matches('?').as_bytes()) {
            let value = value.trim();
            if value.is_empty() {
                continue;
            }
            let slot = match &*key {
                "reportId" => &mut params.report_id,
                "templateId" => &mut params.template_id,
                "templateName" => &mut params.template_name,
                "patientId" => &mut params.patient_id,
                "patientName" => &mut params.patient_name,
                _ => continue,
            };
            *slot = Some(value.to_string());
        }
        params
    }

    /// Decide what to open. A report id wins; a template needs a patient.
    #[must_use]
    pub fn resolve(&self) -> OpenRequest {
        if let Some(id) = &self.report_id {
            return OpenRequest::Existing(ReportId::new(id.clone()));
        }
        match (&self.template_id, &self.patient_id) {
            (Some(template_id), Some(patient_id)) => OpenRequest::FromTemplate {
                template_id: template_id.clone(),
                patient: Patient {
                    id: patient_id.clone(),
                    name: self
                        .patient_name
                        .clone()
                        .unwrap_or_else(|| patient_id.clone()),
                },
            },
            (Some(template_id), None) => {
                tracing::warn!(template = %template_id, "Template launch without a patient, opening blank");
                OpenRequest::Blank
            }
            _ => OpenRequest::Blank,
        }
    }
}
