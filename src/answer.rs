//! Answer variants and their wire form.
//!
//! Predictors return [`PredictorResult`]s whose payload is a list of typed
//! variants. Each variant knows how to render itself into the `boxes`
//! envelope the annotation UI consumes: display lines for char runs, one
//! box per page for paragraphs, cell boxes for tables, verbatim regions
//! for outline answers.

use crate::dir::{Char, Element, ElementId, PageRegion};
use crate::geometry::{bounding_box, split_chars, Outline};
use crate::schema::{Mold, SchemaNode};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::rc::Rc;

/// Chars further apart than this still share a display line; used for
/// table cells where the whole selection gets one frame.
const CELL_LINE_INTERVAL: f64 = 1_000_000.0;

/// Axis-aligned box in the wire's key-per-edge form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireBox {
    /// Left edge
    pub box_left: f64,
    /// Top edge
    pub box_top: f64,
    /// Right edge
    pub box_right: f64,
    /// Bottom edge
    pub box_bottom: f64,
}

impl From<&Outline> for WireBox {
    fn from(outline: &Outline) -> Self {
        WireBox {
            box_left: outline.left,
            box_top: outline.top,
            box_right: outline.right,
            box_bottom: outline.bottom,
        }
    }
}

fn serialize_opt_box<S>(value: &Option<WireBox>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    match value {
        Some(b) => b.serialize(serializer),
        // the UI expects an empty object, not null
        None => serde_json::Map::new().serialize(serializer),
    }
}

/// One display box of an answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerBox {
    /// Page number
    pub page: i64,
    /// Box edges; empty when the answer has no geometry
    #[serde(rename = "box", serialize_with = "serialize_opt_box", default)]
    pub outline: Option<WireBox>,
    /// Text covered by the box
    pub text: String,
}

impl AnswerBox {
    fn new(page: i64, outline: Option<&Outline>, text: impl Into<String>) -> Self {
        AnswerBox {
            page,
            outline: outline.map(WireBox::from),
            text: text.into(),
        }
    }
}

/// The `data` entry of one answer item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoxesData {
    /// Display boxes
    pub boxes: Vec<AnswerBox>,
    /// Always `"wireframe"` for machine answers
    #[serde(rename = "handleType")]
    pub handle_type: String,
    /// Source element ids, present for table answers
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub elements: Option<Vec<ElementId>>,
    /// Override text, present for region answers that carry one
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub text: Option<String>,
    /// User-accepted upstream; preserved verbatim downstream
    #[serde(skip_serializing_if = "std::ops::Not::not", default)]
    pub confirm: bool,
}

impl BoxesData {
    fn new() -> Self {
        BoxesData {
            boxes: Vec::new(),
            handle_type: "wireframe".to_string(),
            elements: None,
            text: None,
            confirm: false,
        }
    }
}

/// Payload shapes a predictor can emit.
#[derive(Debug, Clone)]
pub enum VariantKind {
    /// Sub-char-range inside one element; `display_text` replaces the
    /// chars' own text on the first display line
    CharSpan {
        /// Owning element, absent for synthesized text
        element: Option<Rc<Element>>,
        /// Covered chars in order
        chars: Vec<Char>,
        /// Display override
        display_text: Option<String>,
    },
    /// Whole or partial paragraph, one box per page
    Paragraph {
        /// Owning element
        element: Rc<Element>,
        /// Covered chars
        chars: Vec<Char>,
    },
    /// Table cells by `"row_col"` id; empty means the whole table
    TableCells {
        /// Owning table
        element: Rc<Element>,
        /// Selected cell ids
        cell_ids: Vec<String>,
    },
    /// Page regions without an owning element
    OutlineRegion {
        /// One region per page
        regions: Vec<PageRegion>,
        /// Text correction when the regions' own text is unreliable
        text: Option<String>,
    },
    /// Enumeration labels only, no geometry
    LabelEnum {
        /// Label values
        items: Vec<String>,
    },
}

/// One answer payload with its provenance flag.
#[derive(Debug, Clone)]
pub struct Variant {
    /// Payload
    pub kind: VariantKind,
    /// User-accepted upstream
    pub confirm: bool,
}

impl Variant {
    /// Wrap a payload, unconfirmed.
    pub fn new(kind: VariantKind) -> Self {
        Variant {
            kind,
            confirm: false,
        }
    }

    /// Concatenated plain text of the payload.
    pub fn text(&self) -> String {
        match &self.kind {
            VariantKind::CharSpan {
                chars,
                display_text,
                ..
            } => display_text
                .clone()
                .unwrap_or_else(|| chars.iter().map(|c| c.text.as_str()).collect()),
            VariantKind::Paragraph { chars, .. } => {
                chars.iter().map(|c| c.text.as_str()).collect()
            }
            VariantKind::TableCells { element, cell_ids } => {
                let texts: Vec<&str> = cell_ids
                    .iter()
                    .filter_map(|id| element.cells.get(id))
                    .filter(|c| !c.dummy)
                    .map(|c| c.text.as_str())
                    .collect();
                texts.join("|")
            }
            VariantKind::OutlineRegion { regions, text } => text.clone().unwrap_or_else(|| {
                regions
                    .iter()
                    .map(|r| r.text.as_str())
                    .collect::<Vec<_>>()
                    .join("\n")
            }),
            VariantKind::LabelEnum { items } => items.join("|"),
        }
    }

    /// Render into the wire `boxes` envelope.
    pub fn to_boxes(&self) -> BoxesData {
        let mut data = match &self.kind {
            VariantKind::CharSpan {
                chars,
                display_text,
                ..
            } => char_span_boxes(chars, display_text.as_deref(), 100.0),
            VariantKind::Paragraph { chars, .. } => paragraph_boxes(chars),
            VariantKind::TableCells { element, cell_ids } => table_boxes(element, cell_ids),
            VariantKind::OutlineRegion { regions, text } => region_boxes(regions, text.as_deref()),
            VariantKind::LabelEnum { .. } => BoxesData::new(),
        };
        data.confirm = self.confirm;
        data
    }
}

fn chars_by_page(chars: &[Char]) -> BTreeMap<i64, Vec<Char>> {
    let mut pages: BTreeMap<i64, Vec<Char>> = BTreeMap::new();
    for c in chars {
        pages.entry(c.page).or_default().push(c.clone());
    }
    pages
}

fn char_span_boxes(chars: &[Char], display_text: Option<&str>, interval: f64) -> BoxesData {
    let mut data = BoxesData::new();
    let mut used_display = false;
    for (page, page_chars) in chars_by_page(chars) {
        let lines = split_chars(&page_chars, |c: &Char| (c.page, c.outline), interval);
        for range in lines {
            let line = &page_chars[range];
            let line_box = bounding_box(line.iter().map(|c| &c.outline));
            let text = match display_text {
                Some(display) if !used_display => {
                    used_display = true;
                    display.to_string()
                }
                Some(_) => String::new(),
                None => line.iter().map(|c| c.text.as_str()).collect(),
            };
            data.boxes.push(AnswerBox::new(page, line_box.as_ref(), text));
        }
    }
    if data.boxes.is_empty() {
        if let Some(display) = display_text {
            data.boxes.push(AnswerBox::new(0, None, display));
        }
    }
    data
}

fn paragraph_boxes(chars: &[Char]) -> BoxesData {
    let mut data = BoxesData::new();
    for (page, page_chars) in chars_by_page(chars) {
        let text: String = page_chars.iter().map(|c| c.text.as_str()).collect();
        if text.trim().is_empty() {
            continue;
        }
        let page_box = bounding_box(page_chars.iter().map(|c| &c.outline));
        data.boxes.push(AnswerBox::new(page, page_box.as_ref(), text));
    }
    data
}

fn table_boxes(element: &Element, cell_ids: &[String]) -> BoxesData {
    let mut data = BoxesData::new();
    data.elements = Some(vec![element.index]);
    if !cell_ids.is_empty() {
        let mut chars: Vec<Char> = Vec::new();
        for id in cell_ids {
            if let Some(cell) = element.cells.get(id) {
                if !cell.chars.is_empty() {
                    chars.extend(cell.chars.iter().cloned());
                } else if !cell.dummy && !cell.outline.is_empty() {
                    // empty cell with geometry still frames its own box
                    chars.push(Char {
                        page: cell.page,
                        outline: cell.outline,
                        text: cell.text.clone(),
                    });
                }
            }
        }
        let framed = char_span_boxes(&chars, None, CELL_LINE_INTERVAL);
        data.boxes = framed.boxes;
        return data;
    }
    // whole table: one box per page when merged across pages, else the
    // outline with the rendered text
    let cell_chars: Vec<Char> = element
        .cells
        .values()
        .flat_map(|c| c.chars.iter().cloned())
        .collect();
    let pages = chars_by_page(&cell_chars);
    if element.continued || pages.len() > 1 {
        for (page, page_chars) in pages {
            let page_box = bounding_box(page_chars.iter().map(|c| &c.outline));
            let text: String = page_chars.iter().map(|c| c.text.as_str()).collect();
            data.boxes.push(AnswerBox::new(page, page_box.as_ref(), text));
        }
    } else {
        data.boxes.push(AnswerBox::new(
            element.page,
            Some(&element.outline),
            table_text(element),
        ));
    }
    data
}

/// Row-major table text, non-dummy cells concatenated per row.
pub fn table_text(element: &Element) -> String {
    let mut rows: BTreeMap<u32, BTreeMap<u32, &str>> = BTreeMap::new();
    for (key, cell) in &element.cells {
        if cell.dummy {
            continue;
        }
        if let Some((row, col)) = crate::dir::model::parse_cell_key(key) {
            rows.entry(row).or_default().insert(col, &cell.text);
        }
    }
    rows.values()
        .map(|cols| cols.values().copied().collect::<String>())
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn region_boxes(regions: &[PageRegion], text: Option<&str>) -> BoxesData {
    let mut data = BoxesData::new();
    for (index, region) in regions.iter().enumerate() {
        let mut line = region.text.clone();
        if index != 0 && !line.is_empty() && !line.starts_with('\n') {
            line.insert(0, '\n');
        }
        if regions.len() == 1 {
            if let Some(correction) = text {
                // the region's own concatenation can drift from the real
                // content; the supplied text wins
                if line != correction {
                    line = correction.to_string();
                }
            }
        }
        data.boxes
            .push(AnswerBox::new(region.page, Some(&region.outline), line));
    }
    data
}

/// Enum answer value: single label or a merged set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnswerValue {
    /// One label
    Single(String),
    /// Several labels
    Multi(Vec<String>),
}

impl AnswerValue {
    fn labels(&self) -> Vec<String> {
        match self {
            AnswerValue::Single(s) => vec![s.clone()],
            AnswerValue::Multi(v) => v.clone(),
        }
    }
}

/// One predicted answer for one column.
#[derive(Debug, Clone)]
pub struct PredictorResult {
    /// Payload variants in display order
    pub data: Vec<Variant>,
    /// Enum answer label(s)
    pub value: Option<AnswerValue>,
    /// Confidence surfaced to the UI; derived when absent
    pub score: Option<f64>,
    /// Override for the concatenated variant text
    pub text: Option<String>,
    /// Group index per schema level, pushed as the prophet unwinds
    pub group_indexes: Vec<usize>,
}

impl PredictorResult {
    /// A result holding the given variants.
    pub fn new(data: Vec<Variant>) -> Self {
        PredictorResult {
            data,
            value: None,
            score: None,
            text: None,
            group_indexes: Vec::new(),
        }
    }

    /// A result holding one variant.
    pub fn single(variant: Variant) -> Self {
        PredictorResult::new(vec![variant])
    }

    /// Builder-style score.
    pub fn with_score(mut self, score: f64) -> Self {
        self.score = Some(score);
        self
    }

    /// Builder-style enum value.
    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(AnswerValue::Single(value.into()));
        self
    }

    /// Concatenated text of the payload.
    pub fn text(&self) -> String {
        if let Some(text) = &self.text {
            return text.clone();
        }
        self.data
            .iter()
            .map(|v| v.text())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Formatted confidence; `-1` marks "not scored".
    pub fn confidence_score(&self) -> String {
        format!("{:.4}", self.score.unwrap_or(-1.0))
    }

    /// Record the group index of one schema level.
    pub fn push_group_index(&mut self, index: usize) {
        self.group_indexes.push(index);
    }

    /// Fold another result for the same column into this one; enum labels
    /// merge set-wise.
    pub fn merge(&mut self, other: PredictorResult) {
        self.data.extend(other.data);
        self.value = match (self.value.take(), other.value) {
            (Some(a), Some(b)) => {
                let mut labels = a.labels();
                for label in b.labels() {
                    if !labels.contains(&label) {
                        labels.push(label);
                    }
                }
                Some(AnswerValue::Multi(labels))
            }
            (a, b) => a.or(b),
        };
    }

    /// The answer-tree key: `["Name:g0",…,"Leaf:0"]`. Group indexes are
    /// shifted one level (the first belongs to the root's grouping, the
    /// leaf always lands at 0).
    pub fn answer_key(&self, node: &SchemaNode) -> String {
        let mut indexes: Vec<usize> = self.group_indexes.iter().skip(1).copied().collect();
        indexes.resize(node.path.len(), 0);
        let parts: Vec<String> = node
            .path
            .iter()
            .zip(indexes)
            .map(|(name, idx)| format!("{}:{}", name, idx))
            .collect();
        serde_json::to_string(&parts).unwrap_or_default()
    }

    /// Build the wire answer item for this result.
    pub fn to_answer_item(&self, mold: &Mold, node: &SchemaNode) -> AnswerItem {
        AnswerItem {
            key: self.answer_key(node),
            schema: SchemaEnvelope {
                data: SchemaData {
                    field_type: node.field_type.clone(),
                    label: node.name().to_string(),
                    words: node.words.clone(),
                    multi: node.multi,
                    required: node.required,
                },
            },
            score: self.confidence_score(),
            data: self.data.iter().map(Variant::to_boxes).collect(),
            value: self.value.clone(),
            text: if self.data.len() == 1 {
                Some(self.text())
            } else {
                None
            },
            md5: serde_json::to_string(&mold.uuid_path(node)).unwrap_or_default(),
        }
    }
}

/// Schema attributes echoed into each answer item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaData {
    /// Declared type
    #[serde(rename = "type")]
    pub field_type: String,
    /// Field name
    pub label: String,
    /// Hint text
    #[serde(default)]
    pub words: String,
    /// Whether the field repeats
    pub multi: bool,
    /// Whether an answer is mandatory
    pub required: bool,
}

/// The `schema` wrapper of an answer item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaEnvelope {
    /// Attribute payload
    pub data: SchemaData,
}

/// One item of the wire answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerItem {
    /// Schema attributes
    pub schema: SchemaEnvelope,
    /// Formatted confidence
    pub score: String,
    /// Position key in the nested answer tree
    pub key: String,
    /// Boxes envelopes; omitted when empty
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub data: Vec<BoxesData>,
    /// Enum label(s)
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub value: Option<AnswerValue>,
    /// Concatenated text for single-variant answers
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub text: Option<String>,
    /// Uuid path of the schema node
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub md5: String,
}
