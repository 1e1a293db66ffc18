//! Predictor framework.
//!
//! A predictor model answers one schema column (or a family of sibling
//! columns) from a list of candidate elements. Models share a small
//! life cycle: optional training over a labeled dataset into per-column
//! feature [`Counter`]s, then pure synchronous prediction. The prophet
//! wires models to schema nodes through the registry in [`create_model`].

pub mod models;

use crate::answer::PredictorResult;
use crate::config::Config;
use crate::crude::CrudeStore;
use crate::dir::{Char, DirDocument, DirReader, Element, ElementClass, ElementId, NearByQuery};
use crate::error::{Error, Result};
use crate::geometry::{bounding_box, overlap_pct, Outline, OverlapBase};
use crate::schema::{Mold, SchemaNode};
use crate::text::{clean_txt, index_in_space_string, PatternSet};
use indexmap::IndexMap;
use lazy_static::lazy_static;
use log::{debug, warn};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::rc::Rc;
use std::sync::Arc;

/// Unit tokens recognized in headers and title lines.
pub const UNIT_PATTERN: &str = "[千百万亿]*[美港]?元(?:[/∕／]股)?|万元|亿元|[%％]|股|倍|人|次|吨|平方米";

lazy_static! {
    static ref P_SPECIAL_WORDS: Regex = Regex::new(r"[:：（）()、\.%．，的]").unwrap();
    static ref P_SERIAL_WORDS: Regex = Regex::new(r"^[一二三四五六七八九十\d]{1,2}[、.]").unwrap();
    static ref P_HEADER_UNIT: Regex =
        Regex::new(&format!(r"[（\(](?:{})[\)）]", UNIT_PATTERN)).unwrap();
    static ref P_UNIT_LINE: Regex =
        Regex::new(&format!(r"单位[:：]\s*(?P<dst>{})", UNIT_PATTERN)).unwrap();
    static ref P_CURRENCY: Regex = Regex::new(r"币\s*种\s*[:：]\s*(?P<dst>\w{2,4})").unwrap();
    static ref P_YEAR_TOKENS: Vec<Regex> = vec![
        Regex::new(r"(?P<dst>(?:19|20)\d{2})年\d{1,2}月(?:\d{1,2}日)?").unwrap(),
        Regex::new(r"(?P<dst>(?:19|20)\d{2})年度").unwrap(),
        Regex::new(r"(?P<dst>(?:19|20)\d{2})年").unwrap(),
    ];
    static ref P_YEAR_MONTH: Regex =
        Regex::new(r"(?P<year>(?:19|20)\d{2})\s*年(?:\s*(?P<month>\d{1,2})\s*月)?").unwrap();
    static ref P_MULTI_SPACE: Regex = Regex::new(r"\s{2,}").unwrap();
}

/// A multiset of feature strings, insertion-ordered for stable output.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Counter(IndexMap<String, u64>);

impl Counter {
    /// Empty counter.
    pub fn new() -> Self {
        Counter::default()
    }

    /// Add one observation.
    pub fn add(&mut self, feature: impl Into<String>) {
        *self.0.entry(feature.into()).or_insert(0) += 1;
    }

    /// Add a batch of observations.
    pub fn update<I, S>(&mut self, features: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for feature in features {
            self.add(feature);
        }
    }

    /// Count of one feature.
    pub fn get(&self, feature: &str) -> u64 {
        self.0.get(feature).copied().unwrap_or(0)
    }

    /// Features by descending count; insertion order breaks ties.
    pub fn most_common(&self) -> Vec<(&str, u64)> {
        let mut entries: Vec<(&str, u64)> = self.0.iter().map(|(k, &v)| (k.as_str(), v)).collect();
        entries.sort_by(|a, b| b.1.cmp(&a.1));
        entries
    }

    /// True when nothing was observed.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of distinct features.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Iterate features and counts in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.0.iter().map(|(k, &v)| (k.as_str(), v))
    }
}

/// Per-column feature counters, the persistable output of training.
pub type ModelData = IndexMap<String, Counter>;

/// Neighbor merge instruction for paragraph stitching around a match.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NeighborMerge {
    /// Direction and stride
    #[serde(default = "default_step")]
    pub step: i64,
    /// Neighbors to take
    #[serde(default = "default_amount")]
    pub amount: usize,
    /// Indices to traverse at most
    #[serde(default = "default_steprange")]
    pub steprange: usize,
    /// Stop at the first neighbor matching any of these
    #[serde(default)]
    pub break_patterns: Vec<String>,
}

fn default_step() -> i64 {
    1
}
fn default_amount() -> usize {
    2
}
fn default_steprange() -> usize {
    5
}

/// Per-column overrides of the knobs models read most often.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ColumnOverride {
    /// Extraction patterns
    #[serde(default)]
    pub regs: Option<Vec<String>>,
    /// Answer rejection patterns
    #[serde(default)]
    pub neglect_patterns: Option<Vec<String>>,
    /// Score cut-off
    #[serde(default)]
    pub threshold: Option<f64>,
    /// Features to accept exclusively
    #[serde(default)]
    pub feature_white: Option<Vec<String>>,
    /// Features to reject
    #[serde(default)]
    pub feature_black: Option<Vec<String>>,
}

/// Configuration of one model instance.
///
/// Every knob is optional with a neutral default, so a mold config can
/// spell out only what a column needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelOptions {
    /// Registry name of the model
    pub name: String,
    /// Emit every qualifying answer instead of the best one
    pub multi: bool,
    /// Consider every candidate element instead of the first hit
    pub multi_elements: bool,
    /// Cap on answers when `multi_elements` is set
    pub multi_elements_limit: Option<usize>,
    /// Score cut-off for crude candidates
    pub threshold: f64,
    /// Pages to search; negative counts from the end
    pub pages: Vec<i64>,
    /// Element positions within the page; negative counts from the end
    pub positions: Vec<i64>,
    /// Extraction patterns, capture group `dst` marks the answer span
    pub regs: Vec<String>,
    /// Patterns one of the three preceding paragraphs must match
    pub anchor_regs: Vec<String>,
    /// Answers matching any of these are dropped
    pub neglect_patterns: Vec<String>,
    /// Split a matched span into several answers
    pub split_pattern: Option<String>,
    /// Drop split fragments matching any of these
    pub garbage_patterns: Vec<String>,
    /// Crude child paths whose candidates join with a bonus
    pub element_candidate_priors: Vec<String>,
    /// Candidate cap
    pub element_candidate_count: usize,
    /// Minimum crude score for a candidate to be considered
    pub location_threshold: f64,
    /// Model participates in offline training
    pub need_training: bool,
    /// Fall back to every document element when the crude store is empty
    pub use_all_elements: bool,
    /// Element classes considered; empty means the model's natural target
    pub aim_types: Vec<ElementClass>,
    /// Candidate text must match one of these
    pub text_regs: Vec<String>,
    /// Candidate text must match none of these
    pub neglect_text_regs: Vec<String>,
    /// Enclosing syllabus title must match one of these
    pub syllabus_regs: Vec<String>,
    /// Enclosing syllabus title must match none of these
    pub neglect_syllabus_regs: Vec<String>,
    /// Table title must match one of these
    pub title_patterns: Vec<String>,
    /// Table title must match none of these
    pub neglect_title_patterns: Vec<String>,
    /// Merge neighboring paragraphs before matching
    pub merge_neighbor: Vec<NeighborMerge>,
    /// Answers required for the run to count as complete
    pub necessary: bool,
    /// Degenerate whole-table mode: locate the table, not its rows
    pub just_table: bool,
    /// Stop after this many results
    pub cnt_of_res: Option<usize>,
    /// Keep only the first crude candidate
    pub oneshot: bool,
    /// Include the anchor element itself in nearby walks
    pub include_self: bool,
    /// Walk syllabus candidates in reverse document order
    pub reverse: bool,
    /// Keep the whole learned path instead of the last segment
    pub keep_parent: bool,
    /// Only the first syllabus match wins
    pub only_first: bool,
    /// Include the chapter title element in the answer range
    pub include_title: bool,
    /// Stop collecting chapter content at the first match
    pub stop_patterns: Vec<String>,
    /// Skip chapter elements matching any of these
    pub exclude_patterns: Vec<String>,
    /// Sibling columns whose answers this column's prediction needs
    pub depends: Vec<String>,
    /// Per-column overrides
    pub columns: IndexMap<String, ColumnOverride>,
}

impl Default for ModelOptions {
    fn default() -> Self {
        ModelOptions {
            name: String::new(),
            multi: false,
            multi_elements: false,
            multi_elements_limit: None,
            threshold: 0.0,
            pages: Vec::new(),
            positions: Vec::new(),
            regs: Vec::new(),
            anchor_regs: Vec::new(),
            neglect_patterns: Vec::new(),
            split_pattern: None,
            garbage_patterns: Vec::new(),
            element_candidate_priors: Vec::new(),
            element_candidate_count: 10,
            location_threshold: 0.0,
            need_training: false,
            use_all_elements: false,
            aim_types: Vec::new(),
            text_regs: Vec::new(),
            neglect_text_regs: Vec::new(),
            syllabus_regs: Vec::new(),
            neglect_syllabus_regs: Vec::new(),
            title_patterns: Vec::new(),
            neglect_title_patterns: Vec::new(),
            merge_neighbor: Vec::new(),
            necessary: false,
            just_table: false,
            cnt_of_res: None,
            oneshot: false,
            include_self: false,
            reverse: false,
            keep_parent: false,
            only_first: false,
            include_title: false,
            stop_patterns: Vec::new(),
            exclude_patterns: Vec::new(),
            depends: Vec::new(),
            columns: IndexMap::new(),
        }
    }
}

impl ModelOptions {
    /// Options named after a registry model.
    pub fn named(name: impl Into<String>) -> Self {
        ModelOptions {
            name: name.into(),
            ..ModelOptions::default()
        }
    }

    /// Extraction patterns for a column, override first.
    pub fn regs_for(&self, column: &str) -> &[String] {
        self.columns
            .get(column)
            .and_then(|c| c.regs.as_deref())
            .unwrap_or(&self.regs)
    }

    /// Rejection patterns for a column, override first.
    pub fn neglect_patterns_for(&self, column: &str) -> &[String] {
        self.columns
            .get(column)
            .and_then(|c| c.neglect_patterns.as_deref())
            .unwrap_or(&self.neglect_patterns)
    }

    /// Threshold for a column, override first.
    pub fn threshold_for(&self, column: &str) -> f64 {
        self.columns
            .get(column)
            .and_then(|c| c.threshold)
            .unwrap_or(self.threshold)
    }

    /// Feature whitelist for a column.
    pub fn feature_white_for(&self, column: &str) -> &[String] {
        self.columns
            .get(column)
            .and_then(|c| c.feature_white.as_deref())
            .unwrap_or(&[])
    }

    /// Feature blacklist for a column.
    pub fn feature_black_for(&self, column: &str) -> &[String] {
        self.columns
            .get(column)
            .and_then(|c| c.feature_black.as_deref())
            .unwrap_or(&[])
    }
}

/// A candidate element with its crude score.
#[derive(Debug, Clone)]
pub struct Candidate {
    /// Resolved element
    pub element: Rc<Element>,
    /// Element class
    pub class: ElementClass,
    /// Crude ranker score, `0` when the candidate came from a fallback
    pub score: f64,
}

/// Answers per column from one prediction pass.
pub type ColumnAnswer = IndexMap<String, Vec<PredictorResult>>;

/// Everything a model may consult while predicting.
pub struct PredictContext<'a> {
    /// Document view
    pub reader: &'a DirReader,
    /// Parsed mold
    pub mold: &'a Mold,
    /// Crude-answer shortlists
    pub crude: &'a CrudeStore,
    /// Global settings
    pub config: &'a Config,
    /// Schema node being answered
    pub node: &'a SchemaNode,
    /// Columns this model answers (the node's own name, or an amount
    /// composite's sub-fields)
    pub columns: Vec<String>,
    /// Answers of the parent level this column depends on
    pub parent_answers: &'a [PredictorResult],
}

impl<'a> PredictContext<'a> {
    /// The crude path of a column: the node's path with the leaf swapped.
    pub fn column_path(&self, column: &str) -> Vec<String> {
        if column == self.node.name() {
            self.node.path[1..].to_vec()
        } else if self.node.is_leaf {
            self.node.sibling_path(column)[1..].to_vec()
        } else {
            let mut path = self.node.path[1..].to_vec();
            path.push(column.to_string());
            path
        }
    }
}

/// One labeled document of a training dataset.
pub struct DatasetItem {
    /// Document name, for logging
    pub name: String,
    /// Parsed document
    pub doc: Arc<DirDocument>,
    /// Labeled answers keyed by crude path
    pub answers: IndexMap<String, Vec<LabeledAnswer>>,
}

/// One labeled answer of one column.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LabeledAnswer {
    /// Element the annotator selected, when recorded
    #[serde(default)]
    pub element_index: Option<ElementId>,
    /// Annotation boxes
    #[serde(default)]
    pub boxes: Vec<LabeledBox>,
    /// Enum label
    #[serde(default)]
    pub value: Option<String>,
}

/// One annotation box.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LabeledBox {
    /// Page number
    pub page: i64,
    /// Box outline
    pub outline: Outline,
    /// Covered text
    #[serde(default)]
    pub text: String,
}

/// The model life-cycle contract.
pub trait ColumnModel {
    /// Registry name.
    fn name(&self) -> &str;

    /// Configuration.
    fn options(&self) -> &ModelOptions;

    /// Trained feature counters.
    fn model_data(&self) -> &ModelData;

    /// Update feature counters from a labeled dataset. Models without a
    /// trainable part keep the default no-op.
    fn train(&mut self, dataset: &[DatasetItem], mold: &Mold) -> Result<()> {
        let _ = (dataset, mold);
        Ok(())
    }

    /// Predict answers from candidate elements. Pure and synchronous.
    fn predict(&self, candidates: &[Candidate], ctx: &PredictContext) -> Result<Vec<ColumnAnswer>>;

    /// Degenerate whole-table mode: one answer per table locating headers
    /// and units only.
    fn predict_just_table(
        &self,
        candidates: &[Candidate],
        ctx: &PredictContext,
    ) -> Result<Vec<ColumnAnswer>> {
        let _ = (candidates, ctx);
        Ok(Vec::new())
    }

    /// Default entry point: gather candidates from the crude store and
    /// predict over them.
    fn predict_with_elements(&self, ctx: &PredictContext) -> Result<Vec<ColumnAnswer>> {
        let candidates = gather_candidates(self.options(), ctx)?;
        debug!(
            "model {} for {}: {} candidates",
            self.name(),
            ctx.node.name(),
            candidates.len()
        );
        if self.options().just_table {
            return self.predict_just_table(&candidates, ctx);
        }
        self.predict(&candidates, ctx)
    }
}

/// Resolve the crude shortlist of a node into scored elements, applying
/// the model's location threshold and anchor filter.
pub fn gather_candidates(options: &ModelOptions, ctx: &PredictContext) -> Result<Vec<Candidate>> {
    let path = ctx.column_path(ctx.columns.first().map(String::as_str).unwrap_or(ctx.node.name()));
    let limit = options.element_candidate_count;
    let shortlist = ctx
        .crude
        .element_candidates(&path, &options.element_candidate_priors, limit);

    let anchor = PatternSet::compile(&options.anchor_regs)?;
    let mut out = Vec::new();
    for item in shortlist {
        if item.score < options.location_threshold {
            continue;
        }
        let (class, element) = match ctx.reader.find_element_by_index(item.element_index) {
            Some(found) => found,
            None => continue,
        };
        if !anchor.is_empty() && !match_anchor(ctx.reader, &element, &anchor) {
            continue;
        }
        out.push(Candidate {
            element,
            class,
            score: item.score,
        });
        if options.oneshot {
            break;
        }
    }
    if out.is_empty() && options.use_all_elements {
        for (class, element) in ctx.reader.elements_iter(|_, _| true) {
            out.push(Candidate {
                element,
                class,
                score: 0.0,
            });
        }
    }
    Ok(out)
}

/// Whether the concatenated text of the three preceding paragraphs
/// matches the anchor patterns.
pub fn match_anchor(reader: &DirReader, element: &Element, anchor: &PatternSet) -> bool {
    let query = NearByQuery {
        step: -1,
        amount: 3,
        ..Default::default()
    };
    let mut prev = reader.find_elements_near_by(element.index, &query);
    prev.reverse();
    let text: String = prev.iter().map(|e| clean_txt(&e.text)).collect();
    anchor.is_match(&text)
}

/// Candidate pre-filters shared by the models: class, text, page, and
/// syllabus constraints from the options.
pub fn filter_candidates(
    options: &ModelOptions,
    candidates: &[Candidate],
    ctx: &PredictContext,
) -> Result<Vec<Candidate>> {
    let text_regs = PatternSet::compile(&options.text_regs)?;
    let neglect_text = PatternSet::compile(&options.neglect_text_regs)?;
    let syllabus_regs = PatternSet::compile(&options.syllabus_regs)?;
    let neglect_syllabus = PatternSet::compile(&options.neglect_syllabus_regs)?;
    let pages = resolve_pages(&options.pages, ctx.reader);

    let mut out = Vec::new();
    for candidate in candidates {
        if !options.aim_types.is_empty() && !options.aim_types.contains(&candidate.class) {
            continue;
        }
        if !pages.is_empty() && !pages.contains(&candidate.element.page) {
            continue;
        }
        let text = clean_txt(&element_text(ctx.reader, &candidate.element));
        if !text_regs.is_empty() && !text_regs.is_match(&text) {
            continue;
        }
        if !neglect_text.is_empty() && neglect_text.is_match(&text) {
            continue;
        }
        if !syllabus_regs.is_empty()
            && !match_syllabus(ctx.reader, &candidate.element, &syllabus_regs)
        {
            continue;
        }
        if !neglect_syllabus.is_empty()
            && match_syllabus(ctx.reader, &candidate.element, &neglect_syllabus)
        {
            continue;
        }
        out.push(candidate.clone());
    }
    Ok(out)
}

/// Expand a page list, resolving negative entries from the document end.
pub fn resolve_pages(pages: &[i64], reader: &DirReader) -> Vec<i64> {
    if pages.is_empty() {
        return Vec::new();
    }
    let mut all: Vec<i64> = reader
        .document()
        .pages
        .keys()
        .filter_map(|k| k.parse().ok())
        .collect();
    all.sort_unstable();
    let mut out = Vec::new();
    for &page in pages {
        if page < 0 {
            let back = (-page) as usize;
            if back <= all.len() {
                out.push(all[all.len() - back]);
            }
        } else {
            out.push(page);
        }
    }
    out
}

/// Whether any enclosing syllabus title matches.
pub fn match_syllabus(reader: &DirReader, element: &Element, patterns: &PatternSet) -> bool {
    reader
        .syllabus()
        .find_by_elt_index(element.index.whole_index(), false)
        .iter()
        .any(|s| patterns.is_match(&clean_txt(&s.title)))
}

/// Canonical text of an element for matching purposes.
pub fn element_text(reader: &DirReader, element: &Element) -> String {
    reader.element_text(element)
}

/// Canonical key for a header set: cleaned texts, serials and units
/// stripped, sorted and joined with `"|"`.
pub fn feature_key<S: AsRef<str>>(texts: &[S]) -> String {
    let mut cleaned: Vec<String> = texts
        .iter()
        .map(|t| {
            let t = P_HEADER_UNIT.replace_all(t.as_ref(), "");
            let t = strip_serial(&t);
            P_SPECIAL_WORDS.replace_all(&t, "").into_owned()
        })
        .collect();
    cleaned.sort();
    clean_txt(&cleaned.join("|"))
}

fn strip_serial(text: &str) -> String {
    P_SERIAL_WORDS.replace(text, "").into_owned()
}

/// Text equality after whitespace collapsing and cleaning.
pub fn same_text(cell_text: &str, text: &str) -> bool {
    let a = P_MULTI_SPACE.replace_all(cell_text, " ");
    let b = P_MULTI_SPACE.replace_all(text, " ");
    clean_txt(&a) == clean_txt(&b)
}

/// Whether a run of chars coincides with an annotation box: same page,
/// and the chars' bounding box overlaps the annotation by more than half.
pub fn same_box(chars: &[Char], page: i64, outline: &Outline) -> bool {
    let page_chars: Vec<&Char> = chars.iter().filter(|c| c.page == page).collect();
    let bound = match bounding_box(page_chars.iter().map(|c| &c.outline)) {
        Some(b) => b,
        None => return false,
    };
    overlap_pct(&bound, outline, OverlapBase::Second) >= 0.5
}

/// Locate the labeled element of one annotation: by recorded index first,
/// then by geometry.
pub fn find_labeled_element(
    reader: &DirReader,
    answer: &LabeledAnswer,
) -> Option<(ElementClass, Rc<Element>)> {
    if let Some(index) = answer.element_index {
        if let Some(found) = reader.find_element_by_index(index) {
            return Some(found);
        }
    }
    let first = answer.boxes.first()?;
    reader.find_element_by_outline(first.page, &first.outline)
}

/// Chars of an element covered by one annotation box.
pub fn chars_in_box(element: &Element, page: i64, outline: &Outline) -> Vec<usize> {
    let chars = DirReader::element_chars(element);
    chars
        .iter()
        .enumerate()
        .filter(|(_, c)| {
            c.page == page && crate::geometry::box_in_box_by_center(&c.outline, outline)
        })
        .map(|(i, _)| i)
        .collect()
}

/// Scan an element's text with a `dst`-capturing pattern and slice the
/// matching chars out.
pub fn dst_chars(element: &Element, patterns: &PatternSet) -> Option<Vec<Char>> {
    let cleaned = clean_txt(&element.text);
    let caps = patterns.captures(&cleaned)?;
    let (start, end) = crate::text::dst_span(&caps, &cleaned);
    if start == end {
        return None;
    }
    let (raw_start, raw_end) = index_in_space_string(&element.text, start, end);
    let chars: Vec<Char> = element
        .chars
        .iter()
        .skip(raw_start)
        .take(raw_end.saturating_sub(raw_start))
        .cloned()
        .collect();
    if chars.is_empty() {
        None
    } else {
        Some(chars)
    }
}

/// Find the measurement unit of a table: `单位: X元` in the title
/// paragraph or one of the first table rows.
pub fn find_unit(reader: &DirReader, table: &Element) -> Option<(Rc<Element>, Vec<Char>)> {
    // title paragraph above the table
    let query = NearByQuery {
        step: -1,
        amount: 2,
        ..Default::default()
    };
    for prev in reader.find_elements_near_by(table.index, &query) {
        if let Some(chars) = unit_chars(&prev.text, &prev.chars) {
            return Some((prev, chars));
        }
    }
    // first row cells
    for (key, cell) in &table.cells {
        if !key.starts_with("0_") && !key.starts_with("1_") {
            continue;
        }
        if let Some(chars) = unit_chars(&cell.text, &cell.chars) {
            if let Some((_, elt)) = reader.find_element_by_index(table.index) {
                return Some((elt, chars));
            }
        }
    }
    None
}

fn unit_chars(text: &str, chars: &[Char]) -> Option<Vec<Char>> {
    let cleaned = clean_txt(text);
    let caps = P_UNIT_LINE.captures(&cleaned)?;
    let m = caps.name("dst")?;
    let start = cleaned[..m.start()].chars().count();
    let end = start + m.as_str().chars().count();
    let (raw_start, raw_end) = index_in_space_string(text, start, end);
    let out: Vec<Char> = chars
        .iter()
        .skip(raw_start)
        .take(raw_end.saturating_sub(raw_start))
        .cloned()
        .collect();
    if out.is_empty() {
        None
    } else {
        Some(out)
    }
}

/// Find the currency of a table from its preceding paragraphs.
pub fn find_currency(reader: &DirReader, table: &Element) -> Option<(Rc<Element>, Vec<Char>)> {
    let query = NearByQuery {
        step: -1,
        amount: 3,
        ..Default::default()
    };
    for prev in reader.find_elements_near_by(table.index, &query) {
        let cleaned = clean_txt(&prev.text);
        if let Some(caps) = P_CURRENCY.captures(&cleaned) {
            if let Some(m) = caps.name("dst") {
                let start = cleaned[..m.start()].chars().count();
                let end = start + m.as_str().chars().count();
                let (raw_start, raw_end) = index_in_space_string(&prev.text, start, end);
                let chars: Vec<Char> = prev
                    .chars
                    .iter()
                    .skip(raw_start)
                    .take(raw_end.saturating_sub(raw_start))
                    .cloned()
                    .collect();
                if !chars.is_empty() {
                    return Some((prev, chars));
                }
            }
        }
    }
    None
}

/// Scan the paragraphs above a table for a recognizable year token.
pub fn find_year(reader: &DirReader, table: &Element, lines: usize) -> Option<String> {
    let query = NearByQuery {
        step: -1,
        amount: lines,
        ..Default::default()
    };
    for prev in reader.find_elements_near_by(table.index, &query) {
        let cleaned = clean_txt(&prev.text);
        for pattern in P_YEAR_TOKENS.iter() {
            if let Some(caps) = pattern.captures(&cleaned) {
                if let Some(m) = caps.name("dst") {
                    return Some(m.as_str().to_string());
                }
            }
        }
    }
    None
}

/// Parse a `YYYY年[MM月]` token into a calendar date (first of month).
pub fn parse_year_month(text: &str) -> Option<chrono::NaiveDate> {
    let cleaned = clean_txt(text);
    let caps = P_YEAR_MONTH.captures(&cleaned)?;
    let year: i32 = caps.name("year")?.as_str().parse().ok()?;
    let month: u32 = caps
        .name("month")
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(1);
    chrono::NaiveDate::from_ymd_opt(year, month.clamp(1, 12), 1)
}

/// The earliest of the dates found in a cell's text.
pub fn min_date(text: &str) -> Option<chrono::NaiveDate> {
    dates_in(text).into_iter().min()
}

/// The latest of the dates found in a cell's text.
pub fn max_date(text: &str) -> Option<chrono::NaiveDate> {
    dates_in(text).into_iter().max()
}

fn dates_in(text: &str) -> Vec<chrono::NaiveDate> {
    let cleaned = clean_txt(text);
    P_YEAR_MONTH
        .captures_iter(&cleaned)
        .filter_map(|caps| {
            let year: i32 = caps.name("year")?.as_str().parse().ok()?;
            let month: u32 = caps
                .name("month")
                .and_then(|m| m.as_str().parse().ok())
                .unwrap_or(1);
            chrono::NaiveDate::from_ymd_opt(year, month.clamp(1, 12), 1)
        })
        .collect()
}

/// Instantiate a model by registry name. Unknown names fall back to the
/// score filter so a stale config degrades instead of aborting.
pub fn create_model(options: ModelOptions) -> Result<Box<dyn ColumnModel>> {
    let model: Box<dyn ColumnModel> = match options.name.as_str() {
        "score_filter" => Box::new(models::score_filter::ScoreFilter::new(options)?),
        "table_kv" => Box::new(models::table_kv::KeyValueTable::new(options)?),
        "table_row" => Box::new(models::table_row::RowTable::new(options)?),
        "fixed_position" => Box::new(models::fixed_position::FixedPosition::new(options)?),
        "chapter" => Box::new(models::chapter::Chapter::new(options)?),
        "syllabus_elt" => Box::new(models::syllabus_elt::SyllabusElt::new(options)?),
        "multi_paras" => Box::new(models::multi_paras::MultiParas::new(options)?),
        "partial_text" => Box::new(models::partial_text::PartialText::new(options)?),
        "remote" => Box::new(models::remote::RemoteCall::new(options)?),
        "table_ai" => Box::new(models::remote::AiTable::new(options)?),
        "resume" => Box::new(models::resume::Resume::new(options)?),
        other => {
            warn!("unknown predictor model {:?}, using score_filter", other);
            Box::new(models::score_filter::ScoreFilter::new(ModelOptions {
                name: "score_filter".to_string(),
                ..options
            })?)
        }
    };
    Ok(model)
}

/// A trainable model failed to see the columns it was configured for.
pub fn schema_mismatch(column: &str, reason: impl Into<String>) -> Error {
    Error::SchemaMismatch {
        column: column.to_string(),
        reason: reason.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_most_common_stable() {
        let mut counter = Counter::new();
        counter.update(["甲", "乙", "甲", "丙", "乙", "甲"]);
        let common = counter.most_common();
        assert_eq!(common[0], ("甲", 3));
        assert_eq!(common[1], ("乙", 2));
        assert_eq!(common[2], ("丙", 1));
    }

    #[test]
    fn test_feature_key_strips_units_and_serials() {
        let key = feature_key(&["三、营业收入（万元）", "本期发生额"]);
        assert_eq!(key, "本期发生额|营业收入");
    }

    #[test]
    fn test_feature_key_sorted() {
        assert_eq!(feature_key(&["乙", "甲"]), feature_key(&["甲", "乙"]));
    }

    #[test]
    fn test_same_text_collapses_whitespace() {
        assert!(same_text("发行人  名称", "发行人 名称"));
        assert!(same_text("发行人：名称", "发行人:名称"));
        assert!(!same_text("发行人", "保荐人"));
    }

    #[test]
    fn test_same_box_threshold() {
        let chars = vec![Char {
            page: 2,
            outline: Outline::new(0.0, 0.0, 100.0, 10.0),
            text: "文".to_string(),
        }];
        assert!(same_box(&chars, 2, &Outline::new(0.0, 0.0, 100.0, 10.0)));
        assert!(!same_box(&chars, 3, &Outline::new(0.0, 0.0, 100.0, 10.0)));
        // covers too little of the annotation
        assert!(!same_box(&chars, 2, &Outline::new(0.0, 0.0, 100.0, 40.0)));
    }

    #[test]
    fn test_parse_year_month() {
        let date = parse_year_month("2023年6月").unwrap();
        assert_eq!(date, chrono::NaiveDate::from_ymd_opt(2023, 6, 1).unwrap());
        let date = parse_year_month("2023年度").unwrap();
        assert_eq!(date, chrono::NaiveDate::from_ymd_opt(2023, 1, 1).unwrap());
        assert!(parse_year_month("无日期").is_none());
    }

    #[test]
    fn test_min_max_date() {
        let text = "2021年3月至2023年11月";
        assert_eq!(
            min_date(text),
            chrono::NaiveDate::from_ymd_opt(2021, 3, 1)
        );
        assert_eq!(
            max_date(text),
            chrono::NaiveDate::from_ymd_opt(2023, 11, 1)
        );
    }

    #[test]
    fn test_model_options_column_overrides() {
        let mut options = ModelOptions::named("partial_text");
        options.regs = vec!["默认".to_string()];
        options.threshold = 0.3;
        options.columns.insert(
            "数值".to_string(),
            ColumnOverride {
                regs: Some(vec!["专用".to_string()]),
                threshold: Some(0.8),
                ..Default::default()
            },
        );
        assert_eq!(options.regs_for("数值"), ["专用".to_string()]);
        assert_eq!(options.regs_for("单位"), ["默认".to_string()]);
        assert_eq!(options.threshold_for("数值"), 0.8);
        assert_eq!(options.threshold_for("单位"), 0.3);
    }

    #[test]
    fn test_create_model_unknown_falls_back() {
        let model = create_model(ModelOptions::named("no_such_model")).unwrap();
        assert_eq!(model.name(), "score_filter");
    }

    #[test]
    fn test_options_deserialize_sparse() {
        let options: ModelOptions =
            serde_json::from_str(r#"{"name": "table_kv", "multi": true}"#).unwrap();
        assert_eq!(options.name, "table_kv");
        assert!(options.multi);
        assert_eq!(options.element_candidate_count, 10);
    }
}
