//! Report elements - the typed building blocks of a page.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::{CanvasError, CanvasResult};

/// Smallest width or height an element can be resized to.
pub const MIN_ELEMENT_SIZE: f64 = 50.0;

/// Identifier of an element, unique within its page.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ElementId(String);

impl ElementId {
    /// Create a new unique element ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Borrow the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the id is the empty string.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Default for ElementId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for ElementId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for ElementId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity of a page or element in the persisted store.
///
/// The backend hands these out as either strings or integers; both are
/// accepted and kept as text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct BackendId(String);

impl BackendId {
    /// Wrap a backend identifier.
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

impl fmt::Display for BackendId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for BackendId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Int(i64),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Text(s) => Self(s),
            Raw::Int(n) => Self(n.to_string()),
        })
    }
}

/// The closed set of element types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementType {
    /// Free text block.
    Text,
    /// Bar, line or pie chart.
    Chart,
    /// Rectangle, circle or line decoration.
    Shape,
    /// Reviewer comment.
    Comment,
    /// Signature block with an optional image.
    Signature,
    /// Data table with optional status highlighting.
    Table,
}

impl ElementType {
    /// All element types in toolbar order.
    pub const ALL: [Self; 6] = [
        Self::Text,
        Self::Chart,
        Self::Shape,
        Self::Comment,
        Self::Signature,
        Self::Table,
    ];

    /// Lowercase type name as used in JSON.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Chart => "chart",
            Self::Shape => "shape",
            Self::Comment => "comment",
            Self::Signature => "signature",
            Self::Table => "table",
        }
    }

    /// Size given to a freshly placed element of this type.
    #[must_use]
    pub const fn default_size(self) -> (f64, f64) {
        match self {
            Self::Text => (200.0, 60.0),
            Self::Chart => (400.0, 300.0),
            Self::Shape => (100.0, 100.0),
            Self::Comment => (200.0, 100.0),
            Self::Signature => (250.0, 120.0),
            Self::Table => (500.0, 200.0),
        }
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ElementType {
    type Err = CanvasError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| CanvasError::UnknownElementType(s.to_string()))
    }
}

/// Horizontal text alignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextAlign {
    /// Flush left.
    #[default]
    Left,
    /// Centered.
    Center,
    /// Flush right.
    Right,
    /// Justified.
    Justify,
}

/// Content of a text element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TextContent {
    /// The text itself.
    pub text: String,
    /// Font size in canvas units.
    pub font_size: f64,
    /// CSS font weight (`normal`, `bold`, `600`, ...).
    pub font_weight: String,
    /// Text colour as a CSS colour string.
    pub color: String,
    /// Alignment within the element box.
    pub text_align: TextAlign,
}

impl Default for TextContent {
    fn default() -> Self {
        Self {
            text: "Enter text here".to_string(),
            font_size: 16.0,
            font_weight: "normal".to_string(),
            color: "#000000".to_string(),
            text_align: TextAlign::Left,
        }
    }
}

/// Chart flavour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartType {
    /// Vertical bars.
    #[default]
    Bar,
    /// Connected points.
    Line,
    /// Pie slices.
    Pie,
}

/// A dataset colour: one colour for the series or one per data point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Paint {
    /// One colour for the whole series.
    Solid(String),
    /// One colour per data point.
    PerPoint(Vec<String>),
}

impl Default for Paint {
    fn default() -> Self {
        Self::Solid("rgba(54, 162, 235, 0.5)".to_string())
    }
}

/// One data series of a chart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Dataset {
    /// Legend label.
    pub label: String,
    /// Values, one per chart label.
    pub data: Vec<f64>,
    /// Fill colour(s).
    pub background_color: Paint,
    /// Stroke colour(s).
    pub border_color: Paint,
    /// Stroke width.
    pub border_width: f64,
}

impl Default for Dataset {
    fn default() -> Self {
        Self {
            label: "Dataset 1".to_string(),
            data: vec![12.0, 19.0, 3.0],
            background_color: Paint::default(),
            border_color: Paint::Solid("rgba(54, 162, 235, 1)".to_string()),
            border_width: 1.0,
        }
    }
}

/// Labels plus series of a chart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChartData {
    /// Category labels.
    pub labels: Vec<String>,
    /// Data series.
    pub datasets: Vec<Dataset>,
}

impl Default for ChartData {
    fn default() -> Self {
        Self {
            labels: vec!["A".to_string(), "B".to_string(), "C".to_string()],
            datasets: vec![Dataset::default()],
        }
    }
}

/// Content of a chart element.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChartContent {
    /// Chart flavour.
    #[serde(rename = "type")]
    pub chart_type: ChartType,
    /// Labels and series.
    pub data: ChartData,
}

/// Shape outline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShapeType {
    /// Axis-aligned rectangle.
    #[default]
    Rectangle,
    /// Circle inscribed in the element box.
    Circle,
    /// Horizontal rule.
    Line,
}

/// Content of a shape element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ShapeContent {
    /// Outline.
    #[serde(rename = "type")]
    pub shape_type: ShapeType,
    /// Fill colour.
    pub color: String,
    /// Stroke width.
    pub border_width: f64,
    /// Stroke colour.
    pub border_color: String,
}

impl Default for ShapeContent {
    fn default() -> Self {
        Self {
            shape_type: ShapeType::Rectangle,
            color: "#e3f2fd".to_string(),
            border_width: 1.0,
            border_color: "#1976d2".to_string(),
        }
    }
}

/// Content of a comment element.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CommentContent {
    /// Comment body.
    pub text: String,
    /// Who wrote it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    /// When it was written, as displayed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

/// Content of a signature element.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SignatureContent {
    /// Name of the signing clinician.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Signing date, as displayed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    /// Signature image as a data URI.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

/// Highlight state of a table cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CellStatus {
    /// No highlight.
    #[default]
    Normal,
    /// Favourable result.
    Positive,
    /// Unfavourable result.
    Negative,
    /// Borderline result.
    Warning,
    /// Currently focused cell.
    Active,
}

/// Content of a table element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TableContent {
    /// Column headers.
    pub headers: Vec<String>,
    /// Row-major cell text.
    pub rows: Vec<Vec<String>>,
    /// Caption above the table.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Header background colour.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub header_bg_color: Option<String>,
    /// Colour used for highlighted rows.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub highlight_color: Option<String>,
    /// Per-row highlight flags.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row_highlights: Option<Vec<bool>>,
    /// Per-cell status, row-major.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cell_status: Option<Vec<Vec<CellStatus>>>,
}

impl Default for TableContent {
    fn default() -> Self {
        Self {
            headers: vec![
                "Parameter".to_string(),
                "Result".to_string(),
                "Reference".to_string(),
            ],
            rows: vec![vec![String::new(); 3]; 2],
            title: None,
            header_bg_color: None,
            highlight_color: None,
            row_highlights: None,
            cell_status: None,
        }
    }
}

impl TableContent {
    /// Pad short rows (and the highlight/status grids) to the header width.
    ///
    /// Export consumers index `rows[r][c]` for every header column.
    pub fn normalize(&mut self) {
        let columns = self.headers.len();
        for row in &mut self.rows {
            if row.len() < columns {
                row.resize(columns, String::new());
            }
        }
        let row_count = self.rows.len();
        if let Some(highlights) = &mut self.row_highlights {
            highlights.resize(row_count, false);
        }
        if let Some(status) = &mut self.cell_status {
            status.resize(row_count, Vec::new());
            for row in status.iter_mut() {
                if row.len() < columns {
                    row.resize(columns, CellStatus::Normal);
                }
            }
        }
    }

    /// Status of a cell, `Normal` when no grid is set.
    #[must_use]
    pub fn status(&self, row: usize, column: usize) -> CellStatus {
        self.cell_status
            .as_ref()
            .and_then(|grid| grid.get(row))
            .and_then(|r| r.get(column))
            .copied()
            .unwrap_or_default()
    }
}

/// Typed element payload, keyed by element type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "content", rename_all = "lowercase")]
pub enum ElementContent {
    /// Text block.
    Text(TextContent),
    /// Chart.
    Chart(ChartContent),
    /// Shape.
    Shape(ShapeContent),
    /// Comment.
    Comment(CommentContent),
    /// Signature.
    Signature(SignatureContent),
    /// Table.
    Table(TableContent),
}

impl ElementContent {
    /// The element type this payload belongs to.
    #[must_use]
    pub const fn element_type(&self) -> ElementType {
        match self {
            Self::Text(_) => ElementType::Text,
            Self::Chart(_) => ElementType::Chart,
            Self::Shape(_) => ElementType::Shape,
            Self::Comment(_) => ElementType::Comment,
            Self::Signature(_) => ElementType::Signature,
            Self::Table(_) => ElementType::Table,
        }
    }

    /// Placeholder content for a newly placed element.
    #[must_use]
    pub fn default_for(kind: ElementType) -> Self {
        match kind {
            ElementType::Text => Self::Text(TextContent::default()),
            ElementType::Chart => Self::Chart(ChartContent::default()),
            ElementType::Shape => Self::Shape(ShapeContent::default()),
            ElementType::Comment => Self::Comment(CommentContent::default()),
            ElementType::Signature => Self::Signature(SignatureContent::default()),
            ElementType::Table => Self::Table(TableContent::default()),
        }
    }

    /// Parse a raw JSON payload as content of the given type.
    ///
    /// # Errors
    ///
    /// Returns [`CanvasError::InvalidContent`] if the payload does not match
    /// the type's schema.
    pub fn from_json(kind: ElementType, value: Value) -> CanvasResult<Self> {
        fn parse<T: serde::de::DeserializeOwned>(kind: ElementType, value: Value) -> CanvasResult<T> {
            serde_json::from_value(value).map_err(|e| CanvasError::InvalidContent {
                kind: kind.to_string(),
                reason: e.to_string(),
            })
        }

        let content = match kind {
            ElementType::Text => Self::Text(parse(kind, value)?),
            ElementType::Chart => Self::Chart(parse(kind, value)?),
            ElementType::Shape => Self::Shape(parse(kind, value)?),
            ElementType::Comment => Self::Comment(parse(kind, value)?),
            ElementType::Signature => Self::Signature(parse(kind, value)?),
            ElementType::Table => {
                let mut table: TableContent = parse(kind, value)?;
                table.normalize();
                Self::Table(table)
            }
        };
        Ok(content)
    }

    /// The payload as a bare JSON object, without the type tag.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> CanvasResult<Value> {
        let value = match self {
            Self::Text(c) => serde_json::to_value(c)?,
            Self::Chart(c) => serde_json::to_value(c)?,
            Self::Shape(c) => serde_json::to_value(c)?,
            Self::Comment(c) => serde_json::to_value(c)?,
            Self::Signature(c) => serde_json::to_value(c)?,
            Self::Table(c) => serde_json::to_value(c)?,
        };
        Ok(value)
    }

    /// Shallow-merge `fields` into this payload and re-validate.
    ///
    /// # Errors
    ///
    /// Returns [`CanvasError::InvalidContent`] if the merged payload no longer
    /// matches the schema.
    pub fn merged(&self, fields: &Map<String, Value>) -> CanvasResult<Self> {
        let mut value = self.to_json()?;
        if let Value::Object(object) = &mut value {
            for (key, field) in fields {
                object.insert(key.clone(), field.clone());
            }
        }
        Self::from_json(self.element_type(), value)
    }

    /// Table payload, if this is a table.
    #[must_use]
    pub fn as_table(&self) -> Option<&TableContent> {
        match self {
            Self::Table(table) => Some(table),
            _ => None,
        }
    }
}

/// A positioned, typed unit of page content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Element {
    /// Identifier, unique within the page.
    pub id: ElementId,
    /// Type tag plus payload.
    #[serde(flatten)]
    pub content: ElementContent,
    /// Left edge in canvas units.
    pub x: f64,
    /// Top edge in canvas units.
    pub y: f64,
    /// Width in canvas units.
    pub width: f64,
    /// Height in canvas units.
    pub height: f64,
    /// Transient UI selection flag.
    #[serde(default)]
    pub is_selected: bool,
    /// Identity in the persisted store, once saved.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend_id: Option<BackendId>,
}

impl Element {
    /// Create a new element at the default position with the type's default size.
    #[must_use]
    pub fn new(content: ElementContent) -> Self {
        let (width, height) = content.element_type().default_size();
        Self {
            id: ElementId::new(),
            content,
            x: 50.0,
            y: 50.0,
            width,
            height,
            is_selected: false,
            backend_id: None,
        }
    }

    /// Build an element from a type name and a raw JSON payload.
    ///
    /// # Errors
    ///
    /// Returns [`CanvasError::UnknownElementType`] for a type outside the
    /// closed set and [`CanvasError::InvalidContent`] for a mismatched payload.
    pub fn from_parts(type_name: &str, content: Value) -> CanvasResult<Self> {
        let kind: ElementType = type_name.parse()?;
        Ok(Self::new(ElementContent::from_json(kind, content)?))
    }

    /// Set position and size.
    #[must_use]
    pub fn with_geometry(mut self, x: f64, y: f64, width: f64, height: f64) -> Self {
        self.x = x;
        self.y = y;
        self.width = width;
        self.height = height;
        self
    }

    /// Set the persisted identity.
    #[must_use]
    pub fn with_backend_id(mut self, id: BackendId) -> Self {
        self.backend_id = Some(id);
        self
    }

    /// Element type, derived from the content.
    #[must_use]
    pub const fn element_type(&self) -> ElementType {
        self.content.element_type()
    }

    /// Check if a point (in canvas coordinates) is within this element.
    #[must_use]
    pub fn contains_point(&self, x: f64, y: f64) -> bool {
        x >= self.x && x <= self.x + self.width && y >= self.y && y <= self.y + self.height
    }

    /// Apply a partial update.
    ///
    /// Content is validated before anything is written, so a rejected patch
    /// leaves the element untouched.
    ///
    /// # Errors
    ///
    /// Returns [`CanvasError::InvalidContent`] if replacement content has a
    /// different type or merged fields break the schema.
    pub fn apply_patch(&mut self, patch: &ElementPatch) -> CanvasResult<()> {
        let content = match &patch.content {
            None => None,
            Some(ContentUpdate::Replace(content)) => {
                if content.element_type() != self.element_type() {
                    return Err(CanvasError::InvalidContent {
                        kind: self.element_type().to_string(),
                        reason: format!("cannot replace with {} content", content.element_type()),
                    });
                }
                Some(content.clone())
            }
            Some(ContentUpdate::Merge(fields)) => Some(self.content.merged(fields)?),
        };

        if let Some(x) = patch.x {
            self.x = x;
        }
        if let Some(y) = patch.y {
            self.y = y;
        }
        if let Some(width) = patch.width {
            self.width = width.max(MIN_ELEMENT_SIZE);
        }
        if let Some(height) = patch.height {
            self.height = height.max(MIN_ELEMENT_SIZE);
        }
        if let Some(content) = content {
            self.content = content;
        }
        Ok(())
    }
}

/// Change to an element's payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentUpdate {
    /// Swap in a whole new payload of the same type.
    Replace(ElementContent),
    /// Overwrite individual payload fields.
    Merge(Map<String, Value>),
}

/// Sparse update for an element. Only present fields are applied.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ElementPatch {
    /// New left edge.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
    /// New top edge.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,
    /// New width, clamped to [`MIN_ELEMENT_SIZE`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
    /// New height, clamped to [`MIN_ELEMENT_SIZE`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
    /// Payload change.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<ContentUpdate>,
}

impl ElementPatch {
    /// Patch moving the element to a new position.
    #[must_use]
    pub fn moved_to(x: f64, y: f64) -> Self {
        Self {
            x: Some(x),
            y: Some(y),
            ..Self::default()
        }
    }

    /// Patch resizing the element.
    #[must_use]
    pub fn resized_to(width: f64, height: f64) -> Self {
        Self {
            width: Some(width),
            height: Some(height),
            ..Self::default()
        }
    }

    /// Patch replacing the payload.
    #[must_use]
    pub fn replace_content(content: ElementContent) -> Self {
        Self {
            content: Some(ContentUpdate::Replace(content)),
            ..Self::default()
        }
    }

    /// Patch overwriting payload fields, as a property panel would.
    #[must_use]
    pub fn merge_fields(fields: Map<String, Value>) -> Self {
        Self {
            content: Some(ContentUpdate::Merge(fields)),
            ..Self::default()
        }
    }

    /// Whether the patch changes nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.x.is_none()
            && self.y.is_none()
            && self.width.is_none()
            && self.height.is_none()
            && self.content.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_unknown_type_rejected() {
        let result = Element::from_parts("video", json!({}));
        assert!(matches!(result, Err(CanvasError::UnknownElementType(t)) if t == "video"));
    }

    #[test]
    fn test_from_parts_parses_typed_content() {
        let element = Element::from_parts(
            "text",
            json!({"text": "Hb 13.2", "fontSize": 12, "fontWeight": "bold", "color": "#333", "textAlign": "center"}),
        )
        .expect("valid text");

        match &element.content {
            ElementContent::Text(text) => {
                assert_eq!(text.text, "Hb 13.2");
                assert_eq!(text.text_align, TextAlign::Center);
                assert!((text.font_size - 12.0).abs() < f64::EPSILON);
            }
            other => panic!("expected text, got {other:?}"),
        }
    }

    #[test]
    fn test_mismatched_content_rejected() {
        let result = Element::from_parts("chart", json!({"type": "donut"}));
        assert!(matches!(result, Err(CanvasError::InvalidContent { .. })));
    }

    #[test]
    fn test_element_json_shape() {
        let element = Element::new(ElementContent::default_for(ElementType::Shape))
            .with_geometry(10.0, 20.0, 100.0, 50.0);
        let value = serde_json::to_value(&element).expect("serialize");

        assert_eq!(value["type"], "shape");
        assert_eq!(value["content"]["type"], "rectangle");
        assert_eq!(value["isSelected"], false);
        assert!(value.get("backendId").is_none());

        let back: Element = serde_json::from_value(value).expect("deserialize");
        assert_eq!(back, element);
    }

    #[test]
    fn test_backend_id_accepts_numbers() {
        let id: BackendId = serde_json::from_value(json!(42)).expect("int id");
        assert_eq!(id.as_str(), "42");
        let id: BackendId = serde_json::from_value(json!("abc")).expect("string id");
        assert_eq!(id.as_str(), "abc");
    }

    #[test]
    fn test_resize_clamps_to_minimum() {
        let mut element = Element::new(ElementContent::default_for(ElementType::Text));
        element
            .apply_patch(&ElementPatch::resized_to(10.0, 400.0))
            .expect("resize");
        assert!((element.width - MIN_ELEMENT_SIZE).abs() < f64::EPSILON);
        assert!((element.height - 400.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_merge_fields_updates_single_property() {
        let mut element = Element::new(ElementContent::default_for(ElementType::Text));
        let mut fields = Map::new();
        fields.insert("fontSize".to_string(), json!(24));
        element
            .apply_patch(&ElementPatch::merge_fields(fields))
            .expect("merge");

        let ElementContent::Text(text) = &element.content else {
            panic!("still text");
        };
        assert!((text.font_size - 24.0).abs() < f64::EPSILON);
        assert_eq!(text.text, "Enter text here");
    }

    #[test]
    fn test_replace_with_other_type_leaves_element_untouched() {
        let mut element = Element::new(ElementContent::default_for(ElementType::Text));
        let before = element.clone();
        let patch = ElementPatch {
            x: Some(999.0),
            content: Some(ContentUpdate::Replace(ElementContent::default_for(
                ElementType::Table,
            ))),
            ..ElementPatch::default()
        };

        assert!(element.apply_patch(&patch).is_err());
        assert_eq!(element, before);
    }

    #[test]
    fn test_table_rows_padded_to_headers() {
        let content = ElementContent::from_json(
            ElementType::Table,
            json!({
                "headers": ["Test", "Value", "Unit"],
                "rows": [["Na"], ["K", "4.1", "mmol/L"]],
                "rowHighlights": [true],
                "cellStatus": [["positive"]]
            }),
        )
        .expect("table");

        let table = content.as_table().expect("is table");
        assert!(table.rows.iter().all(|row| row.len() == 3));
        assert_eq!(table.row_highlights.as_deref(), Some(&[true, false][..]));
        assert_eq!(table.status(0, 0), CellStatus::Positive);
        assert_eq!(table.status(1, 2), CellStatus::Normal);
    }

    #[test]
    fn test_chart_paint_accepts_both_forms() {
        let content = ElementContent::from_json(
            ElementType::Chart,
            json!({
                "type": "pie",
                "data": {
                    "labels": ["a", "b"],
                    "datasets": [{
                        "label": "s",
                        "data": [1, 2],
                        "backgroundColor": ["#f00", "#0f0"],
                        "borderColor": "#000",
                        "borderWidth": 2
                    }]
                }
            }),
        )
        .expect("chart");

        let ElementContent::Chart(chart) = content else {
            panic!("expected chart");
        };
        assert_eq!(chart.chart_type, ChartType::Pie);
        assert_eq!(
            chart.data.datasets[0].background_color,
            Paint::PerPoint(vec!["#f00".to_string(), "#0f0".to_string()])
        );
        assert_eq!(chart.data.datasets[0].border_color, Paint::Solid("#000".to_string()));
    }

    #[test]
    fn test_type_names_round_trip() {
        for kind in ElementType::ALL {
            let parsed: ElementType = kind.as_str().parse().expect("known");
            assert_eq!(parsed, kind);
        }
    }
}
