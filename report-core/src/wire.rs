//! Backend wire format for pages and elements.
//!
//! The report and template APIs encode the element type as an integer.
//! Only text, chart and table have a code; shapes, comments and signatures
//! are client-side decoration and are not sent.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::element::{BackendId, Element, ElementContent, ElementId, ElementType};
use crate::page::{Page, PageId, PageSize};
use crate::CanvasError;

/// Errors raised while mapping to or from the wire format.
#[derive(Debug, Error)]
pub enum WireError {
    /// A wire element carried a type code outside the known mapping.
    #[error("Unknown wire type code: {0}")]
    UnknownTypeCode(i64),

    /// An element type has no wire encoding.
    #[error("Element type {0} has no wire encoding")]
    Unencodable(ElementType),

    /// Content failed validation or serialization.
    #[error(transparent)]
    Canvas(#[from] CanvasError),
}

/// Numeric element type codes used by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum WireType {
    /// Text element.
    Text = 0,
    /// Chart element.
    Chart = 1,
    /// Table element.
    Table = 2,
}

impl WireType {
    /// The integer sent on the wire.
    #[must_use]
    pub const fn code(self) -> i64 {
        self as i64
    }

    /// The in-memory element type for this code.
    #[must_use]
    pub const fn element_type(self) -> ElementType {
        match self {
            Self::Text => ElementType::Text,
            Self::Chart => ElementType::Chart,
            Self::Table => ElementType::Table,
        }
    }

    /// The wire code for an element type, if it has one.
    #[must_use]
    pub const fn for_element_type(kind: ElementType) -> Option<Self> {
        match kind {
            ElementType::Text => Some(Self::Text),
            ElementType::Chart => Some(Self::Chart),
            ElementType::Table => Some(Self::Table),
            ElementType::Shape | ElementType::Comment | ElementType::Signature => None,
        }
    }
}

impl TryFrom<i64> for WireType {
    type Error = WireError;

    fn try_from(code: i64) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(Self::Text),
            1 => Ok(Self::Chart),
            2 => Ok(Self::Table),
            other => Err(WireError::UnknownTypeCode(other)),
        }
    }
}

/// What to do with elements the mapping cannot express.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnknownTypePolicy {
    /// Skip them and log.
    #[default]
    Drop,
    /// Fail the whole conversion.
    Strict,
}

/// A persisted element as the backend sends and accepts it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireElement {
    /// Backend identity; absent for elements not yet created.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<BackendId>,
    /// Numeric type code.
    #[serde(rename = "type")]
    pub type_code: i64,
    /// Left edge.
    pub x: f64,
    /// Top edge.
    pub y: f64,
    /// Width.
    pub width: f64,
    /// Height.
    pub height: f64,
    /// Type-specific payload.
    #[serde(default)]
    pub content: Value,
}

/// A persisted page as the backend sends and accepts it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WirePage {
    /// Backend identity; absent for pages not yet created.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<BackendId>,
    /// Position within the report.
    #[serde(default)]
    pub order: usize,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Width, if the backend stores one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
    /// Height, if the backend stores one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
    /// Elements in z-order.
    #[serde(default)]
    pub elements: Vec<WireElement>,
}

/// Converts pages and elements between the model and the wire format.
#[derive(Debug, Clone, Copy, Default)]
pub struct WireCodec {
    policy: UnknownTypePolicy,
}

impl WireCodec {
    /// Create a codec with the given fallback policy.
    #[must_use]
    pub const fn new(policy: UnknownTypePolicy) -> Self {
        Self { policy }
    }

    /// The configured fallback policy.
    #[must_use]
    pub const fn policy(&self) -> UnknownTypePolicy {
        self.policy
    }

    /// Encode one element. `Ok(None)` means it was skipped under [`UnknownTypePolicy::Drop`].
    ///
    /// # Errors
    ///
    /// Returns [`WireError::Unencodable`] under [`UnknownTypePolicy::Strict`]
    /// for types without a code.
    pub fn element_to_wire(&self, element: &Element) -> Result<Option<WireElement>, WireError> {
        let Some(wire_type) = WireType::for_element_type(element.element_type()) else {
            return match self.policy {
                UnknownTypePolicy::Drop => {
                    tracing::debug!(
                        "Skipping {} element {} (no wire encoding)",
                        element.element_type(),
                        element.id
                    );
                    Ok(None)
                }
                UnknownTypePolicy::Strict => Err(WireError::Unencodable(element.element_type())),
            };
        };

        Ok(Some(WireElement {
            id: element.backend_id.clone(),
            type_code: wire_type.code(),
            x: element.x,
            y: element.y,
            width: element.width,
            height: element.height,
            content: element.content.to_json()?,
        }))
    }

    /// Decode one element. `Ok(None)` means it was dropped under [`UnknownTypePolicy::Drop`].
    ///
    /// # Errors
    ///
    /// Under [`UnknownTypePolicy::Strict`], returns an error for unknown
    /// codes or content that does not match the type.
    pub fn element_from_wire(&self, wire: WireElement) -> Result<Option<Element>, WireError> {
        let decoded = WireType::try_from(wire.type_code).and_then(|wire_type| {
            ElementContent::from_json(wire_type.element_type(), wire.content).map_err(WireError::from)
        });

        let content = match (decoded, self.policy) {
            (Ok(content), _) => content,
            (Err(err), UnknownTypePolicy::Strict) => return Err(err),
            (Err(err), UnknownTypePolicy::Drop) => {
                tracing::warn!("Dropping wire element {:?}: {err}", wire.id);
                return Ok(None);
            }
        };

        let id = wire
            .id
            .as_ref()
            .map_or_else(ElementId::new, |backend| ElementId::from(backend.as_str()));
        Ok(Some(Element {
            id,
            content,
            x: wire.x,
            y: wire.y,
            width: wire.width,
            height: wire.height,
            is_selected: false,
            backend_id: wire.id,
        }))
    }

    /// Page fields without elements, as sent to page create/update endpoints.
    #[must_use]
    pub fn page_header(page: &Page, order: usize) -> WirePage {
        WirePage {
            id: page.backend_id.clone(),
            order,
            name: page.name.clone(),
            width: Some(page.width),
            height: Some(page.height),
            elements: Vec::new(),
        }
    }

    /// Encode a page at position `order`.
    ///
    /// # Errors
    ///
    /// Propagates element encoding errors.
    pub fn page_to_wire(&self, page: &Page, order: usize) -> Result<WirePage, WireError> {
        let mut wire = Self::page_header(page, order);
        for element in &page.elements {
            if let Some(element) = self.element_to_wire(element)? {
                wire.elements.push(element);
            }
        }
        Ok(wire)
    }

    /// Decode a page.
    ///
    /// # Errors
    ///
    /// Propagates element decoding errors under [`UnknownTypePolicy::Strict`].
    pub fn page_from_wire(&self, wire: WirePage) -> Result<Page, WireError> {
        let mut elements = Vec::with_capacity(wire.elements.len());
        for element in wire.elements {
            if let Some(element) = self.element_from_wire(element)? {
                elements.push(element);
            }
        }

        let fallback = PageSize::default();
        let name = if wire.name.is_empty() {
            format!("Page {}", wire.order + 1)
        } else {
            wire.name
        };
        let mut page = Page {
            id: wire
                .id
                .as_ref()
                .map_or_else(PageId::new, |backend| PageId::from(backend.as_str())),
            name,
            elements,
            width: wire.width.unwrap_or(fallback.width),
            height: wire.height.unwrap_or(fallback.height),
            backend_id: wire.id,
        };
        page.fill_default_size();
        Ok(page)
    }

    /// Decode a list of pages, ordered by their `order` field.
    ///
    /// # Errors
    ///
    /// Propagates page decoding errors.
    pub fn pages_from_wire(&self, mut wire: Vec<WirePage>) -> Result<Vec<Page>, WireError> {
        wire.sort_by_key(|page| page.order);
        wire.into_iter().map(|page| self.page_from_wire(page)).collect()
    }

    /// Encode pages in document order.
    ///
    /// # Errors
    ///
    /// Propagates page encoding errors.
    pub fn pages_to_wire(&self, pages: &[Page]) -> Result<Vec<WirePage>, WireError> {
        pages
            .iter()
            .enumerate()
            .map(|(order, page)| self.page_to_wire(page, order))
            .collect()
    }
}

/// Encode a page with the default (dropping) codec.
///
/// # Errors
///
/// Returns an error if element content cannot be serialized.
pub fn to_wire(page: &Page, order: usize) -> Result<WirePage, WireError> {
    WireCodec::default().page_to_wire(page, order)
}

/// Decode a page with the default (dropping) codec.
///
/// # Errors
///
/// Never fails under the default policy; the signature matches the strict codec.
pub fn from_wire(wire: WirePage) -> Result<Page, WireError> {
    WireCodec::default().page_from_wire(wire)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn wire_page(elements: Value) -> WirePage {
        serde_json::from_value(json!({
            "id": 7,
            "order": 0,
            "name": "Results",
            "elements": elements
        }))
        .expect("wire page")
    }

    #[test]
    fn test_codes_are_bidirectional() {
        for code in 0..3 {
            let wire_type = WireType::try_from(code).expect("known");
            assert_eq!(wire_type.code(), code);
            assert_eq!(
                WireType::for_element_type(wire_type.element_type()),
                Some(wire_type)
            );
        }
        assert!(matches!(
            WireType::try_from(9),
            Err(WireError::UnknownTypeCode(9))
        ));
        assert_eq!(WireType::for_element_type(ElementType::Signature), None);
    }

    #[test]
    fn test_unknown_codes_dropped_on_load() {
        let page = from_wire(wire_page(json!([
            {"id": 1, "type": 0, "x": 0, "y": 0, "width": 100, "height": 50, "content": {"text": "kept"}},
            {"id": 2, "type": 5, "x": 0, "y": 0, "width": 100, "height": 50, "content": {}}
        ])))
        .expect("page");

        assert_eq!(page.elements.len(), 1);
        assert_eq!(page.elements[0].id.as_str(), "1");
        assert_eq!(page.elements[0].backend_id, Some(BackendId::new("1")));
        assert_eq!(page.backend_id, Some(BackendId::new("7")));
        assert_eq!(page.size(), PageSize::A4);
    }

    #[test]
    fn test_strict_policy_rejects_unknown_codes() {
        let codec = WireCodec::new(UnknownTypePolicy::Strict);
        let result = codec.page_from_wire(wire_page(json!([
            {"type": 5, "x": 0, "y": 0, "width": 100, "height": 50}
        ])));
        assert!(matches!(result, Err(WireError::UnknownTypeCode(5))));
    }

    #[test]
    fn test_decoration_elements_skipped_on_save() {
        let mut page = Page::new("Page 1");
        page.elements
            .push(Element::new(ElementContent::default_for(ElementType::Text)));
        page.elements
            .push(Element::new(ElementContent::default_for(ElementType::Signature)));

        let wire = to_wire(&page, 3).expect("wire");
        assert_eq!(wire.order, 3);
        assert_eq!(wire.elements.len(), 1);
        assert_eq!(wire.elements[0].type_code, 0);
        assert!(wire.elements[0].id.is_none());

        let strict = WireCodec::new(UnknownTypePolicy::Strict).page_to_wire(&page, 0);
        assert!(matches!(
            strict,
            Err(WireError::Unencodable(ElementType::Signature))
        ));
    }

    #[test]
    fn test_persisted_page_round_trips_exactly() {
        let loaded = from_wire(wire_page(json!([
            {"id": "a", "type": 0, "x": 10, "y": 20, "width": 200, "height": 60,
             "content": {"text": "Impression", "fontSize": 14}},
            {"id": "b", "type": 2, "x": 10, "y": 100, "width": 400, "height": 200,
             "content": {"headers": ["Test", "Value"], "rows": [["WBC", "6.1"]]}}
        ])))
        .expect("page");

        let again = from_wire(to_wire(&loaded, 0).expect("encode")).expect("decode");
        assert_eq!(again, loaded);
    }

    #[test]
    fn test_pages_sorted_by_order() {
        let pages = WireCodec::default()
            .pages_from_wire(vec![
                WirePage {
                    id: None,
                    order: 1,
                    name: "second".into(),
                    width: None,
                    height: None,
                    elements: Vec::new(),
                },
                WirePage {
                    id: None,
                    order: 0,
                    name: String::new(),
                    width: Some(800.0),
                    height: Some(1100.0),
                    elements: Vec::new(),
                },
            ])
            .expect("pages");
        assert_eq!(pages[0].name, "Page 1");
        assert_eq!(pages[0].size(), PageSize::LEGACY);
        assert_eq!(pages[1].name, "second");
    }
}
