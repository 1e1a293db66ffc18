//! Raw DIR records.
//!
//! The DIR (document intermediate representation) is the upstream parser's
//! structured output for one document: category buckets of elements
//! (paragraphs, tables, headers, ...), per-character geometry, syllabus
//! entries, and page statistics. Everything here deserializes the wire form
//! verbatim and stays immutable after load — stitching and cell resolution
//! happen in the reader's processed view, never in place.

use crate::geometry::Outline;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Document-wide element identity.
///
/// Stored as a fixed-point value in hundredths so nested tables can take
/// fractional positions between their parent and the next element: a table
/// embedded in cell `i` of element `p` gets id `p + (i+1)/100`. Whole ids
/// are multiples of 100.
///
/// # Examples
///
/// ```
/// use dir_insight::dir::ElementId;
///
/// let parent = ElementId::whole(7);
/// let nested = parent.nested(0);
/// assert!(parent < nested && nested < ElementId::whole(8));
/// assert!(nested.is_nested());
/// ```
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(from = "f64", into = "f64")]
pub struct ElementId(i64);

impl ElementId {
    /// Id of a top-level element.
    pub fn whole(index: i64) -> Self {
        ElementId(index * 100)
    }

    /// Id of the `i`-th nested table promoted out of this element.
    pub fn nested(self, i: i64) -> Self {
        ElementId(self.0 + i + 1)
    }

    /// The enclosing top-level index.
    pub fn whole_index(self) -> i64 {
        self.0.div_euclid(100)
    }

    /// True for promoted nested-table ids.
    pub fn is_nested(self) -> bool {
        self.0.rem_euclid(100) != 0
    }

    /// The id `steps` whole positions away (negative steps walk backwards).
    pub fn offset(self, steps: i64) -> Self {
        ElementId::whole(self.whole_index() + steps)
    }
}

impl From<f64> for ElementId {
    fn from(v: f64) -> Self {
        ElementId((v * 100.0).round() as i64)
    }
}

impl From<ElementId> for f64 {
    fn from(id: ElementId) -> f64 {
        id.0 as f64 / 100.0
    }
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_nested() {
            write!(f, "{:.2}", f64::from(*self))
        } else {
            write!(f, "{}", self.whole_index())
        }
    }
}

/// Element category, assigned from the owning bucket during pretreatment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ElementClass {
    /// Body paragraph
    Paragraph,
    /// Table (including promoted nested tables)
    Table,
    /// Running page header
    PageHeader,
    /// Running page footer
    PageFooter,
    /// Footnote paragraph
    Footnote,
    /// Raster image
    Image,
    /// Vector shape, possibly with text
    Shape,
    /// Stamp / seal, possibly with text
    Stamp,
    /// Syllabus (table-of-contents) entry rendered in the body
    Syllabus,
    /// Infographic region
    Infographic,
}

/// The enumerated set of DIR element buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bucket {
    /// `paragraphs[]`
    Paragraphs,
    /// `tables[]`
    Tables,
    /// `page_headers[]`
    PageHeaders,
    /// `page_footers[]`
    PageFooters,
    /// `footnotes[]`
    Footnotes,
    /// `images[]`
    Images,
    /// `shapes[]`
    Shapes,
    /// `stamps[]`
    Stamps,
    /// `infographics[]`
    Infographics,
}

impl Bucket {
    /// Every bucket, in pretreatment order.
    pub const ALL: [Bucket; 9] = [
        Bucket::Paragraphs,
        Bucket::Tables,
        Bucket::PageHeaders,
        Bucket::PageFooters,
        Bucket::Footnotes,
        Bucket::Images,
        Bucket::Shapes,
        Bucket::Stamps,
        Bucket::Infographics,
    ];

    /// The element class members of this bucket carry.
    pub fn class(self) -> ElementClass {
        match self {
            Bucket::Paragraphs => ElementClass::Paragraph,
            Bucket::Tables => ElementClass::Table,
            Bucket::PageHeaders => ElementClass::PageHeader,
            Bucket::PageFooters => ElementClass::PageFooter,
            Bucket::Footnotes => ElementClass::Footnote,
            Bucket::Images => ElementClass::Image,
            Bucket::Shapes => ElementClass::Shape,
            Bucket::Stamps => ElementClass::Stamp,
            Bucket::Infographics => ElementClass::Infographic,
        }
    }
}

/// A single character with its page and bounding box.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Char {
    /// Page number (0-based)
    #[serde(default)]
    pub page: i64,
    /// Character bounding box
    #[serde(rename = "box", default)]
    pub outline: Outline,
    /// Character text (usually one char, may be a ligature)
    #[serde(default)]
    pub text: String,
}

/// One table cell.
///
/// `left..right` / `top..bottom` are the cell's half-open span in the
/// normalized grid. `dummy` marks a filled-in slot covered by a merge group
/// other than its head.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Cell {
    /// Page number
    #[serde(default)]
    pub page: i64,
    /// Cell bounding box
    #[serde(rename = "box", default)]
    pub outline: Outline,
    /// Concatenated cell text
    #[serde(default)]
    pub text: String,
    /// Ordered cell chars
    #[serde(default)]
    pub chars: Vec<Char>,
    /// First grid column
    #[serde(default)]
    pub left: u32,
    /// One past the last grid column
    #[serde(default)]
    pub right: u32,
    /// First grid row
    #[serde(default)]
    pub top: u32,
    /// One past the last grid row
    #[serde(default)]
    pub bottom: u32,
    /// Covered by a merge group, not its head
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub dummy: bool,
}

/// Key for a cell map entry at `(row, col)` — the wire form is `"r_c"`.
pub fn cell_key(row: u32, col: u32) -> String {
    format!("{}_{}", row, col)
}

/// Parse a `"r_c"` cell key back into `(row, col)`.
pub fn parse_cell_key(key: &str) -> Option<(u32, u32)> {
    let (r, c) = key.split_once('_')?;
    Some((r.parse().ok()?, c.parse().ok()?))
}

/// Cross-page merged-paragraph record attached to the head segment.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PageMergedParagraph {
    /// Concatenated text of all segments
    #[serde(default)]
    pub text: String,
    /// Member paragraph ids in reading order
    #[serde(default)]
    pub paragraph_indices: Vec<ElementId>,
}

/// A DIR element: any indexable document item.
///
/// One record shape covers all classes; class-specific fields default to
/// empty. Identity is the `index` field, never the memory location.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Element {
    /// Document-wide id
    #[serde(default)]
    pub index: ElementId,
    /// Page number
    #[serde(default)]
    pub page: i64,
    /// Bounding box
    #[serde(default)]
    pub outline: Outline,
    /// Category; raw DIR elements carry it optionally, the processed view
    /// always fills it from the owning bucket
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class: Option<ElementClass>,
    /// Nearest enclosing syllabus index
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub syllabus: Option<i64>,
    /// Concatenated text (paragraph-like elements)
    #[serde(default)]
    pub text: String,
    /// Ordered chars (paragraph-like elements)
    #[serde(default)]
    pub chars: Vec<Char>,
    /// Cell map `"r_c" -> Cell` (tables)
    #[serde(default)]
    pub cells: IndexMap<String, Cell>,
    /// Merge groups, each a list of `[row, col]` coordinates
    #[serde(default)]
    pub merged: Vec<Vec<[u32; 2]>>,
    /// Row/column pixel rulings, passed through untouched
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grid: Option<serde_json::Value>,
    /// Continuation of the previous element across a page break
    #[serde(default)]
    pub continued: bool,
    /// First body row of a continued table fragment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub continued_row: Option<u32>,
    /// Columns whose first body cell continues the previous fragment's value
    #[serde(default)]
    pub continued_cols: Vec<u32>,
    /// Promoted out of a parent table's cell
    #[serde(default)]
    pub is_nested: bool,
    /// Non-head segment of a cross-page merge (set by the processed view)
    #[serde(default)]
    pub fragment: bool,
    /// Cross-page paragraph record on the head segment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_merged_paragraph: Option<PageMergedParagraph>,
}

impl Element {
    /// True for paragraph-shaped classes (paragraph, header, footer,
    /// footnote).
    pub fn is_paragraph_like(&self) -> bool {
        matches!(
            self.class,
            Some(ElementClass::Paragraph)
                | Some(ElementClass::PageHeader)
                | Some(ElementClass::PageFooter)
                | Some(ElementClass::Footnote)
        )
    }

    /// True for tables.
    pub fn is_table(&self) -> bool {
        self.class == Some(ElementClass::Table)
    }

    /// True for shapes or stamps that carry text.
    pub fn is_shape_with_text(&self) -> bool {
        matches!(
            self.class,
            Some(ElementClass::Shape) | Some(ElementClass::Stamp)
        ) && !self.text.is_empty()
    }
}

/// A table-of-contents node bound to a half-open element-index range.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Syllabus {
    /// Position in the syllabus list
    #[serde(default)]
    pub index: i64,
    /// Title text
    #[serde(default)]
    pub title: String,
    /// Nesting depth (roots at the smallest level)
    #[serde(default)]
    pub level: i64,
    /// Parent syllabus index; roots use `None` or a negative sentinel
    #[serde(default)]
    pub parent: Option<i64>,
    /// Child syllabus indices
    #[serde(default)]
    pub children: Vec<i64>,
    /// Element index of the title paragraph
    #[serde(default)]
    pub element: i64,
    /// Half-open `[start, end)` span of covered element indices
    #[serde(default)]
    pub range: [i64; 2],
}

impl Syllabus {
    /// Parent index, mapping the negative root sentinel to `None`.
    pub fn parent_index(&self) -> Option<i64> {
        match self.parent {
            Some(p) if p >= 0 => Some(p),
            _ => None,
        }
    }

    /// Whether the half-open range covers an element index.
    pub fn covers(&self, element_index: i64) -> bool {
        self.range[0] <= element_index && element_index < self.range[1]
    }
}

/// Per-page statistics emitted by the parser.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PageStatis {
    /// Page was produced by OCR
    #[serde(default)]
    pub ocr: bool,
}

/// Page record in the DIR `pages` map.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PageInfo {
    /// Declared page rotation
    #[serde(default)]
    pub rotate: i64,
    /// Rotation recovered by OCR, when present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ret_rotation: Option<i64>,
    /// Statistics record
    #[serde(default)]
    pub statis: PageStatis,
}

/// The parsed document: category buckets plus pages and syllabuses.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DirDocument {
    /// Source document name
    #[serde(default)]
    pub name: String,
    /// Page map, keyed by page-number string
    #[serde(default)]
    pub pages: IndexMap<String, PageInfo>,
    /// Body paragraphs
    #[serde(default)]
    pub paragraphs: Vec<Element>,
    /// Tables
    #[serde(default)]
    pub tables: Vec<Element>,
    /// Page headers
    #[serde(default)]
    pub page_headers: Vec<Element>,
    /// Page footers
    #[serde(default)]
    pub page_footers: Vec<Element>,
    /// Footnotes
    #[serde(default)]
    pub footnotes: Vec<Element>,
    /// Images
    #[serde(default)]
    pub images: Vec<Element>,
    /// Shapes
    #[serde(default)]
    pub shapes: Vec<Element>,
    /// Stamps
    #[serde(default)]
    pub stamps: Vec<Element>,
    /// Infographics
    #[serde(default)]
    pub infographics: Vec<Element>,
    /// Syllabus entries
    #[serde(default)]
    pub syllabuses: Vec<Syllabus>,
    /// Tables embedded in a parent table's cells, keyed by the parent's
    /// whole index as a string
    #[serde(default)]
    pub nested_tables: IndexMap<String, Vec<Element>>,
    /// Groups of table whole-indices forming one cross-page table
    #[serde(default)]
    pub combo_tables: Vec<Vec<i64>>,
    /// Upstream model versions, logged at load
    #[serde(default)]
    pub model_version: IndexMap<String, serde_json::Value>,
}

impl DirDocument {
    /// The elements of one category bucket.
    pub fn bucket(&self, bucket: Bucket) -> &[Element] {
        match bucket {
            Bucket::Paragraphs => &self.paragraphs,
            Bucket::Tables => &self.tables,
            Bucket::PageHeaders => &self.page_headers,
            Bucket::PageFooters => &self.page_footers,
            Bucket::Footnotes => &self.footnotes,
            Bucket::Images => &self.images,
            Bucket::Shapes => &self.shapes,
            Bucket::Stamps => &self.stamps,
            Bucket::Infographics => &self.infographics,
        }
    }
}
