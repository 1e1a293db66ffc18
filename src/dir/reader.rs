//! Indexed, stitched view over a parsed document.
//!
//! The raw [`DirDocument`] stays immutable after load. The reader builds a
//! flat element index at construction (class tagging from the category
//! buckets, nested-table promotion, per-page element lists) and materializes
//! a *processed view* lazily: table cells resolved through [`MergedTable`],
//! cross-page paragraphs stitched back together, non-head segments flagged
//! `fragment`. The processed view is memoized per element, so every query
//! sees the same resolved records.
//!
//! A reader is single-owner: one worker drives one reader from start to
//! finish. Sharing a document across workers means sharing the
//! `Arc<DirDocument>` through the cache and giving each worker its own
//! reader view.

use crate::dir::cache::DirCache;
use crate::dir::model::{
    Bucket, Char, DirDocument, Element, ElementClass, ElementId, Syllabus,
};
use crate::dir::syllabus::SyllabusReader;
use crate::dir::table::{DirTable, MergedTable};
use crate::error::{Error, Result};
use crate::geometry::{box_in_box_by_center, overlap_pct, Outline, OverlapBase};
use crate::text::{clean_txt, PatternSet};
use log::{debug, info};
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::path::Path;
use std::rc::Rc;
use std::sync::Arc;

/// Overlap ratio (over the smaller area) above which an element counts as
/// covered by an annotation outline.
pub const ELEMENT_OVERLAP_THRESHOLD: f64 = 0.618;

/// Where an indexed element lives in the raw document.
#[derive(Debug, Clone)]
enum Loc {
    Bucket(Bucket, usize),
    /// Promoted nested table: parent key in `nested_tables`, position
    Nested(String, usize),
}

#[derive(Debug, Clone)]
struct IndexEntry {
    class: ElementClass,
    page: i64,
    outline: Outline,
    loc: Loc,
}

/// A per-page bounding region over a group of elements.
#[derive(Debug, Clone)]
pub struct PageRegion {
    /// Page number
    pub page: i64,
    /// Bounding box of the member elements on this page
    pub outline: Outline,
    /// Concatenated member text
    pub text: String,
    /// Member element ids
    pub elements: Vec<ElementId>,
}

/// Options for [`DirReader::find_elements_near_by`].
#[derive(Debug, Clone)]
pub struct NearByQuery {
    /// Direction and stride in whole element indices (usually 1 or -1)
    pub step: i64,
    /// Stop after this many hits
    pub amount: usize,
    /// Stop after traversing this many indices
    pub steprange: usize,
    /// Include the starting element itself
    pub include_self: bool,
    /// Element classes that count as hits; `None` means paragraphs only
    pub aim_types: Option<Vec<ElementClass>>,
    /// Reject elements whose cleaned text matches
    pub neg_patterns: PatternSet,
}

impl Default for NearByQuery {
    fn default() -> Self {
        NearByQuery {
            step: -1,
            amount: 1,
            steprange: 20,
            include_self: false,
            aim_types: None,
            neg_patterns: PatternSet::default(),
        }
    }
}

/// Options for [`DirReader::syllabus_outline`].
#[derive(Debug, Clone, Default)]
pub struct SyllabusOutlineOptions {
    /// Include the syllabus title paragraph itself
    pub include_title: bool,
    /// Stop collecting at the first element matching any of these
    pub stop_patterns: PatternSet,
    /// Skip elements matching any of these
    pub exclude_patterns: PatternSet,
    /// Keep only these classes; `None` keeps paragraphs and tables
    pub aim_types: Option<Vec<ElementClass>>,
}

/// Queryable view over one parsed document.
pub struct DirReader {
    doc: Arc<DirDocument>,
    index: BTreeMap<ElementId, IndexEntry>,
    element_dict: BTreeMap<i64, Vec<ElementId>>,
    processed: RefCell<HashMap<ElementId, Rc<Element>>>,
    merged_tables: RefCell<HashMap<ElementId, Rc<MergedTable>>>,
    merged_built: RefCell<bool>,
}

impl DirReader {
    /// Build a reader over a preloaded document.
    pub fn new(doc: Arc<DirDocument>) -> Self {
        let mut index = BTreeMap::new();
        for bucket in Bucket::ALL {
            for (pos, elt) in doc.bucket(bucket).iter().enumerate() {
                index.insert(
                    elt.index,
                    IndexEntry {
                        class: bucket.class(),
                        page: elt.page,
                        outline: elt.outline,
                        loc: Loc::Bucket(bucket, pos),
                    },
                );
            }
        }
        // nested-table promotion: tables embedded in a parent table's cell
        // get fractional ids right after the parent
        for (parent_key, tables) in &doc.nested_tables {
            let parent_id = match parent_key.parse::<i64>() {
                Ok(idx) => ElementId::whole(idx),
                Err(_) => continue,
            };
            for (i, elt) in tables.iter().enumerate() {
                index.insert(
                    parent_id.nested(i as i64),
                    IndexEntry {
                        class: ElementClass::Table,
                        page: elt.page,
                        outline: elt.outline,
                        loc: Loc::Nested(parent_key.clone(), i),
                    },
                );
            }
        }
        let mut element_dict: BTreeMap<i64, Vec<ElementId>> = BTreeMap::new();
        for (id, entry) in &index {
            element_dict.entry(entry.page).or_default().push(*id);
        }
        for ids in element_dict.values_mut() {
            ids.sort();
        }
        DirReader {
            doc,
            index,
            element_dict,
            processed: RefCell::new(HashMap::new()),
            merged_tables: RefCell::new(HashMap::new()),
            merged_built: RefCell::new(false),
        }
    }

    /// Load a DIR archive through the cache and build a reader.
    pub fn open(path: impl AsRef<Path>, cache: &DirCache) -> Result<DirReader> {
        let path = path.as_ref();
        let doc = cache.get_or_load(path, || load_document(path))?;
        for (key, value) in &doc.model_version {
            info!("dir model version: {}: {}", key, value);
        }
        Ok(DirReader::new(doc))
    }

    /// The underlying raw document.
    pub fn document(&self) -> &DirDocument {
        &self.doc
    }

    /// Elements of one category bucket, raw.
    pub fn bucket(&self, bucket: Bucket) -> &[Element] {
        self.doc.bucket(bucket)
    }

    /// Syllabus query view.
    pub fn syllabus(&self) -> SyllabusReader<'_> {
        SyllabusReader::new(&self.doc.syllabuses)
    }

    /// Raw syllabus list.
    pub fn syllabuses(&self) -> &[Syllabus] {
        &self.doc.syllabuses
    }

    fn raw(&self, id: ElementId) -> Option<(&IndexEntry, &Element)> {
        let entry = self.index.get(&id)?;
        let elt = match &entry.loc {
            Loc::Bucket(bucket, pos) => self.doc.bucket(*bucket).get(*pos)?,
            Loc::Nested(key, pos) => self.doc.nested_tables.get(key)?.get(*pos)?,
        };
        Some((entry, elt))
    }

    /// Whether the combo groups or the element's own flag say `id`
    /// continues into the next table.
    fn table_continues(&self, id: ElementId, elt: &Element) -> bool {
        if elt.continued {
            return true;
        }
        let whole = id.whole_index();
        self.doc
            .combo_tables
            .iter()
            .any(|group| group.iter().position(|&w| w == whole).map(|p| p + 1 < group.len()).unwrap_or(false))
    }

    /// Build every merged table once: walk top-level tables in id order,
    /// group candidate runs (explicit continuation or direct adjacency),
    /// and let [`MergedTable::build`] split runs whose column structures
    /// turn out incompatible.
    fn ensure_merged_tables(&self) {
        if *self.merged_built.borrow() {
            return;
        }
        let mut tables: Vec<(ElementId, &Element)> = self
            .doc
            .tables
            .iter()
            .map(|elt| (elt.index, elt))
            .collect();
        tables.sort_by_key(|(id, _)| *id);

        let mut runs: Vec<Vec<&Element>> = Vec::new();
        for (i, (id, elt)) in tables.iter().enumerate() {
            let continues_prev = i > 0 && {
                let (prev_id, prev) = &tables[i - 1];
                self.table_continues(*prev_id, prev)
                    || id.whole_index() == prev_id.whole_index() + 1
            };
            if continues_prev {
                if let Some(run) = runs.last_mut() {
                    run.push(elt);
                    continue;
                }
            }
            runs.push(vec![elt]);
        }

        let mut map = self.merged_tables.borrow_mut();
        for run in runs {
            let mut rest: &[&Element] = &run;
            while !rest.is_empty() {
                let (merged, consumed) = MergedTable::build(rest);
                let merged = Rc::new(merged);
                for id in &merged.table_ids {
                    map.insert(*id, Rc::clone(&merged));
                }
                rest = &rest[consumed..];
            }
        }
        *self.merged_built.borrow_mut() = true;
    }

    /// The merged table an element belongs to, when it is a top-level
    /// table.
    pub fn merged_table(&self, id: ElementId) -> Option<Rc<MergedTable>> {
        self.ensure_merged_tables();
        self.merged_tables.borrow().get(&id).cloned()
    }

    /// Paragraph chain for cross-page stitching: `continued=true` on a
    /// segment means it continues into the next body paragraph. Returns the
    /// chain head-first; a single-segment chain means no stitching.
    fn paragraph_chain(&self, id: ElementId) -> Vec<ElementId> {
        let next_paragraph = |from: ElementId| -> Option<ElementId> {
            self.index
                .range((std::ops::Bound::Excluded(from), std::ops::Bound::Unbounded))
                .find(|(_, e)| {
                    !matches!(e.class, ElementClass::PageHeader | ElementClass::PageFooter)
                })
                .filter(|(_, e)| e.class == ElementClass::Paragraph)
                .map(|(id, _)| *id)
        };
        let prev_paragraph = |from: ElementId| -> Option<ElementId> {
            self.index
                .range(..from)
                .rev()
                .find(|(_, e)| {
                    !matches!(e.class, ElementClass::PageHeader | ElementClass::PageFooter)
                })
                .filter(|(_, e)| e.class == ElementClass::Paragraph)
                .map(|(id, _)| *id)
        };

        // walk back to the head: the predecessor chain of paragraphs that
        // are flagged as continuing into their successor
        let mut head = id;
        while let Some(prev) = prev_paragraph(head) {
            let continues = self.raw(prev).map(|(_, e)| e.continued).unwrap_or(false);
            if !continues {
                break;
            }
            head = prev;
        }
        let mut chain = vec![head];
        let mut cur = head;
        while self.raw(cur).map(|(_, e)| e.continued).unwrap_or(false) {
            match next_paragraph(cur) {
                Some(next) => {
                    chain.push(next);
                    cur = next;
                }
                None => break,
            }
        }
        chain
    }

    fn materialize(&self, id: ElementId) -> Option<Rc<Element>> {
        let (entry, raw) = self.raw(id)?;
        let mut elt = raw.clone();
        elt.index = id;
        elt.class = Some(entry.class);
        if matches!(entry.loc, Loc::Nested(_, _)) {
            elt.is_nested = true;
        }
        match entry.class {
            ElementClass::Table => {
                if !elt.is_nested {
                    if let Some(merged) = self.merged_table(id) {
                        elt.cells = merged.cells.clone();
                        elt.fragment = id != merged.head();
                    }
                }
            }
            ElementClass::Paragraph => {
                let chain = self.paragraph_chain(id);
                if chain.len() > 1 {
                    let head = chain[0];
                    if id == head {
                        let mut chars: Vec<Char> = Vec::new();
                        let mut text = String::new();
                        for member in &chain {
                            if let Some((_, seg)) = self.raw(*member) {
                                chars.extend(seg.chars.iter().cloned());
                                text.push_str(&seg.text);
                            }
                        }
                        elt.chars = chars;
                        elt.text = text.clone();
                        elt.page_merged_paragraph =
                            Some(crate::dir::model::PageMergedParagraph {
                                text,
                                paragraph_indices: chain.clone(),
                            });
                    } else {
                        elt.fragment = true;
                    }
                }
            }
            _ => {}
        }
        Some(Rc::new(elt))
    }

    /// Processed element lookup by id. Post-processing runs exactly once
    /// per element.
    pub fn find_element_by_index(&self, id: ElementId) -> Option<(ElementClass, Rc<Element>)> {
        if let Some(elt) = self.processed.borrow().get(&id) {
            return elt.class.map(|c| (c, Rc::clone(elt)));
        }
        let elt = self.materialize(id)?;
        self.processed.borrow_mut().insert(id, Rc::clone(&elt));
        elt.class.map(|c| (c, elt))
    }

    /// All processed elements on a page, ordered by id.
    pub fn find_elements_by_page(&self, page: i64) -> Vec<(ElementClass, Rc<Element>)> {
        self.element_dict
            .get(&page)
            .into_iter()
            .flatten()
            .filter_map(|id| self.find_element_by_index(*id))
            .collect()
    }

    /// Page-order iteration over every processed element, with an optional
    /// class/content filter applied to the processed record.
    pub fn elements_iter<F>(&self, mut filter: F) -> Vec<(ElementClass, Rc<Element>)>
    where
        F: FnMut(ElementClass, &Element) -> bool,
    {
        let mut out = Vec::new();
        for ids in self.element_dict.values() {
            for id in ids {
                if let Some((class, elt)) = self.find_element_by_index(*id) {
                    if filter(class, &elt) {
                        out.push((class, elt));
                    }
                }
            }
        }
        out
    }

    /// The single element on `page` with the largest overlap ratio over its
    /// own area; ties resolve to the smaller id.
    pub fn find_element_by_outline(
        &self,
        page: i64,
        outline: &Outline,
    ) -> Option<(ElementClass, Rc<Element>)> {
        let mut best: Option<(f64, ElementId)> = None;
        for id in self.element_dict.get(&page).into_iter().flatten() {
            let entry = self.index.get(id)?;
            let pct = overlap_pct(&entry.outline, outline, OverlapBase::First);
            if pct <= 0.0 {
                continue;
            }
            match best {
                Some((best_pct, _)) if pct <= best_pct => {}
                _ => best = Some((pct, *id)),
            }
        }
        best.and_then(|(_, id)| self.find_element_by_index(id))
    }

    /// All elements on `page` whose overlap ratio over the smaller area
    /// exceeds [`ELEMENT_OVERLAP_THRESHOLD`]; falls back to the best single
    /// overlap when nothing clears the bar.
    pub fn find_elements_by_outline(
        &self,
        page: i64,
        outline: &Outline,
    ) -> Vec<(ElementClass, Rc<Element>)> {
        let mut hits = Vec::new();
        for id in self.element_dict.get(&page).into_iter().flatten() {
            let entry = match self.index.get(id) {
                Some(e) => e,
                None => continue,
            };
            if overlap_pct(&entry.outline, outline, OverlapBase::Min) > ELEMENT_OVERLAP_THRESHOLD {
                if let Some(found) = self.find_element_by_index(*id) {
                    hits.push(found);
                }
            }
        }
        if hits.is_empty() {
            if let Some(found) = self.find_element_by_outline(page, outline) {
                hits.push(found);
            }
        }
        hits
    }

    /// Chars of the element found under the outline whose centers fall
    /// inside it. For tables the search space is the union of the cells'
    /// chars.
    pub fn find_chars_by_outline(&self, page: i64, outline: &Outline) -> Vec<Char> {
        match self.find_chars_idx_by_outline(page, outline) {
            Some((elt, indices)) => {
                let chars = Self::element_chars(&elt);
                indices.into_iter().filter_map(|i| chars.get(i).cloned()).collect()
            }
            None => Vec::new(),
        }
    }

    /// Like [`find_chars_by_outline`](Self::find_chars_by_outline), but
    /// returns the element together with char positions so a caller can
    /// slice the element itself.
    pub fn find_chars_idx_by_outline(
        &self,
        page: i64,
        outline: &Outline,
    ) -> Option<(Rc<Element>, Vec<usize>)> {
        let (_, elt) = self.find_element_by_outline(page, outline)?;
        let chars = Self::element_chars(&elt);
        let indices: Vec<usize> = chars
            .iter()
            .enumerate()
            .filter(|(_, c)| c.page == page && box_in_box_by_center(&c.outline, outline))
            .map(|(i, _)| i)
            .collect();
        Some((elt, indices))
    }

    /// All chars of an element: own chars, or every cell's chars for a
    /// table, in cell order.
    pub fn element_chars(elt: &Element) -> Vec<Char> {
        if elt.is_table() {
            elt.cells
                .values()
                .filter(|c| !c.dummy)
                .flat_map(|c| c.chars.iter().cloned())
                .collect()
        } else {
            elt.chars.clone()
        }
    }

    /// The best-overlapping cell of the table under the outline.
    pub fn find_cell_idx_by_outline(
        &self,
        page: i64,
        outline: &Outline,
    ) -> Option<(Rc<Element>, String)> {
        let (class, elt) = self.find_element_by_outline(page, outline)?;
        if class != ElementClass::Table {
            return None;
        }
        let key = DirTable::new(&elt)
            .find_cellidx_list_by_outline(page, outline)
            .into_iter()
            .next()?;
        Some((elt, key))
    }

    /// Every covered cell of the table under the outline that has at least
    /// one non-whitespace char inside it.
    pub fn find_cell_idxes_by_outline(
        &self,
        page: i64,
        outline: &Outline,
    ) -> Option<(Rc<Element>, Vec<String>)> {
        let (class, elt) = self.find_element_by_outline(page, outline)?;
        if class != ElementClass::Table {
            return None;
        }
        let keys: Vec<String> = DirTable::new(&elt)
            .find_cellidx_list_by_outline(page, outline)
            .into_iter()
            .filter(|key| {
                elt.cells
                    .get(key)
                    .map(|cell| {
                        cell.chars.iter().any(|c| {
                            !c.text.trim().is_empty() && box_in_box_by_center(&c.outline, outline)
                        })
                    })
                    .unwrap_or(false)
            })
            .collect();
        Some((elt, keys))
    }

    /// Walk whole element indices from `id` in the direction of
    /// `query.step`, collecting matching elements.
    pub fn find_elements_near_by(&self, id: ElementId, query: &NearByQuery) -> Vec<Rc<Element>> {
        let mut out = Vec::new();
        if query.include_self {
            if let Some((_, elt)) = self.find_element_by_index(id) {
                out.push(elt);
            }
        }
        let mut cursor = id;
        for _ in 0..query.steprange {
            cursor = cursor.offset(query.step);
            if cursor.whole_index() < 0 {
                break;
            }
            let (class, elt) = match self.find_element_by_index(cursor) {
                Some(found) => found,
                None => continue,
            };
            let class_ok = match &query.aim_types {
                Some(types) => types.contains(&class),
                None => class == ElementClass::Paragraph,
            };
            if !class_ok {
                continue;
            }
            if !query.neg_patterns.is_empty()
                && query.neg_patterns.is_match(&clean_txt(&elt.text))
            {
                continue;
            }
            out.push(elt);
            if out.len() >= query.amount {
                break;
            }
        }
        out
    }

    /// Whether a page was produced by OCR.
    pub fn is_ocr_page(&self, page: i64) -> bool {
        self.doc
            .pages
            .get(&page.to_string())
            .map(|p| p.statis.ocr)
            .unwrap_or(false)
    }

    /// Page rotation: OCR pages report their recovered rotation, others
    /// the declared one.
    pub fn page_rotation(&self, page: i64) -> i64 {
        let info = match self.doc.pages.get(&page.to_string()) {
            Some(info) => info,
            None => return 0,
        };
        if info.statis.ocr {
            info.ret_rotation.unwrap_or(info.rotate)
        } else {
            info.rotate
        }
    }

    /// The table on `page` whose outline contains the box's center, if any.
    pub fn box_in_table(&self, outline: &Outline, page: i64) -> Option<Rc<Element>> {
        for id in self.element_dict.get(&page).into_iter().flatten() {
            let entry = self.index.get(id)?;
            if entry.class == ElementClass::Table && box_in_box_by_center(outline, &entry.outline) {
                return self.find_element_by_index(*id).map(|(_, e)| e);
            }
        }
        None
    }

    /// De-dupe cross-page table fragments: keep only the head of each
    /// merged table, preserving input order.
    pub fn filter_table_cross_page(&self, elements: &[Rc<Element>]) -> Vec<Rc<Element>> {
        let mut seen_heads: Vec<ElementId> = Vec::new();
        let mut out = Vec::new();
        for elt in elements {
            if !elt.is_table() || elt.is_nested {
                out.push(Rc::clone(elt));
                continue;
            }
            let head = self
                .merged_table(elt.index)
                .map(|m| m.head())
                .unwrap_or(elt.index);
            if seen_heads.contains(&head) {
                debug!("dropping table fragment {} of {}", elt.index, head);
                continue;
            }
            seen_heads.push(head);
            match self.find_element_by_index(head) {
                Some((_, head_elt)) => out.push(head_elt),
                None => out.push(Rc::clone(elt)),
            }
        }
        out
    }

    /// Group elements by page and compute the per-page bounding box,
    /// preserving text continuity across fragments.
    pub fn elements_outline(&self, elements: &[Rc<Element>]) -> Vec<PageRegion> {
        let mut regions: Vec<PageRegion> = Vec::new();
        for elt in elements {
            let text = self.element_text(elt);
            match regions.iter_mut().find(|r| r.page == elt.page) {
                Some(region) => {
                    region.outline = region.outline.union(&elt.outline);
                    if !text.is_empty() {
                        if !region.text.is_empty() {
                            region.text.push('\n');
                        }
                        region.text.push_str(&text);
                    }
                    region.elements.push(elt.index);
                }
                None => regions.push(PageRegion {
                    page: elt.page,
                    outline: elt.outline,
                    text,
                    elements: vec![elt.index],
                }),
            }
        }
        regions
    }

    /// Canonical text of an element: paragraph text, or a row-major
    /// rendering with `"|"` column separators and `"\n"` row separators for
    /// tables.
    pub fn element_text(&self, elt: &Element) -> String {
        if !elt.is_table() {
            return elt.text.clone();
        }
        let table = DirTable::new(elt);
        let mut rows = Vec::new();
        for row in table.row_indices().collect::<Vec<_>>() {
            let fields: Vec<String> = table
                .row(row)
                .into_iter()
                .filter(|(_, cell)| !cell.dummy)
                .map(|(_, cell)| cell.text.clone())
                .collect();
            rows.push(fields.join("|"));
        }
        rows.join("\n")
    }

    /// Per-page bounding regions of every element under a syllabus.
    pub fn syllabus_outline(
        &self,
        syl: &Syllabus,
        options: &SyllabusOutlineOptions,
    ) -> Vec<PageRegion> {
        let start = if options.include_title {
            syl.range[0]
        } else {
            syl.range[0] + 1
        };
        let mut members = Vec::new();
        for whole in start..syl.range[1] {
            let id = ElementId::whole(whole);
            let (class, elt) = match self.find_element_by_index(id) {
                Some(found) => found,
                None => continue,
            };
            let class_ok = match &options.aim_types {
                Some(types) => types.contains(&class),
                None => matches!(class, ElementClass::Paragraph | ElementClass::Table),
            };
            if !class_ok {
                continue;
            }
            let cleaned = clean_txt(&elt.text);
            if !options.stop_patterns.is_empty() && options.stop_patterns.is_match(&cleaned) {
                break;
            }
            if !options.exclude_patterns.is_empty() && options.exclude_patterns.is_match(&cleaned) {
                continue;
            }
            // fragments keep their local outline so the per-page boxes stay
            // faithful; the head already carries the stitched text
            members.push(elt);
        }
        self.elements_outline(&members)
    }
}

/// Read and decode a DIR archive: a zip container whose first entry is the
/// JSON document, or a bare JSON file.
pub fn load_document(path: impl AsRef<Path>) -> Result<DirDocument> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(Error::DirNotFound(path.display().to_string()));
    }
    let file = File::open(path)?;
    if path.extension().map(|e| e == "json").unwrap_or(false) {
        let doc = serde_json::from_reader(std::io::BufReader::new(file))
            .map_err(|e| Error::InvalidDir(format!("{}: {}", path.display(), e)))?;
        return Ok(doc);
    }
    let mut archive = zip::ZipArchive::new(file)?;
    if archive.is_empty() {
        return Err(Error::InvalidDir(format!(
            "{}: empty archive",
            path.display()
        )));
    }
    let entry = archive.by_index(0)?;
    let doc = serde_json::from_reader(std::io::BufReader::new(entry))
        .map_err(|e| Error::InvalidDir(format!("{}: {}", path.display(), e)))?;
    Ok(doc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dir::model::{cell_key, Cell, PageInfo, PageStatis};
    use crate::geometry::bounding_box;
    use indexmap::IndexMap;

    fn mock_char(page: i64, left: f64, top: f64, text: &str) -> Char {
        Char {
            page,
            outline: Outline::new(left, top, left + 10.0, top + 10.0),
            text: text.to_string(),
        }
    }

    fn mock_paragraph(index: i64, page: i64, text: &str) -> Element {
        let chars: Vec<Char> = text
            .chars()
            .enumerate()
            .map(|(i, c)| mock_char(page, 10.0 * i as f64, 100.0, &c.to_string()))
            .collect();
        let outline = bounding_box(chars.iter().map(|c| &c.outline))
            .unwrap_or_default();
        Element {
            index: ElementId::whole(index),
            page,
            outline,
            text: text.to_string(),
            chars,
            ..Default::default()
        }
    }

    fn mock_table_elt(index: i64, page: i64, cells: &[(u32, u32, &str)]) -> Element {
        let mut map = IndexMap::new();
        for (row, col, text) in cells {
            map.insert(
                cell_key(*row, *col),
                Cell {
                    page,
                    outline: Outline::new(
                        *col as f64 * 60.0,
                        200.0 + *row as f64 * 20.0,
                        (*col + 1) as f64 * 60.0,
                        200.0 + (*row + 1) as f64 * 20.0,
                    ),
                    text: text.to_string(),
                    chars: vec![mock_char(
                        page,
                        *col as f64 * 60.0,
                        200.0 + *row as f64 * 20.0,
                        text,
                    )],
                    left: *col,
                    right: *col + 1,
                    top: *row,
                    bottom: *row + 1,
                    ..Default::default()
                },
            );
        }
        Element {
            index: ElementId::whole(index),
            page,
            outline: Outline::new(0.0, 200.0, 240.0, 300.0),
            cells: map,
            ..Default::default()
        }
    }

    fn mock_doc() -> Arc<DirDocument> {
        let mut doc = DirDocument::default();
        doc.paragraphs = vec![
            mock_paragraph(0, 0, "证券代码:300091"),
            {
                let mut p = mock_paragraph(10, 3, "甲方:北京公司");
                p.continued = true;
                p
            },
            mock_paragraph(11, 4, "(以下简称公司)"),
        ];
        doc.tables = vec![mock_table_elt(
            2,
            0,
            &[(0, 0, "发行人名称"), (0, 1, "金通灵"), (1, 0, "成立日期"), (1, 1, "2001-02-03")],
        )];
        doc.pages.insert(
            "0".to_string(),
            PageInfo {
                rotate: 0,
                ret_rotation: Some(90),
                statis: PageStatis { ocr: true },
            },
        );
        Arc::new(doc)
    }

    #[test]
    fn test_find_element_by_index_tags_class() {
        let reader = DirReader::new(mock_doc());
        let (class, elt) = reader.find_element_by_index(ElementId::whole(2)).unwrap();
        assert_eq!(class, ElementClass::Table);
        assert_eq!(elt.class, Some(ElementClass::Table));
    }

    #[test]
    fn test_cross_page_paragraph_stitching() {
        let reader = DirReader::new(mock_doc());
        let (_, head) = reader.find_element_by_index(ElementId::whole(10)).unwrap();
        assert_eq!(head.text, "甲方:北京公司(以下简称公司)");
        let merged = head.page_merged_paragraph.as_ref().unwrap();
        assert_eq!(
            merged.paragraph_indices,
            vec![ElementId::whole(10), ElementId::whole(11)]
        );
        // char count is the sum of the segments
        assert_eq!(head.chars.len(), "甲方:北京公司".chars().count() + "(以下简称公司)".chars().count());

        let (_, tail) = reader.find_element_by_index(ElementId::whole(11)).unwrap();
        assert!(tail.fragment);
        assert!(!head.fragment);
    }

    #[test]
    fn test_processing_is_memoized() {
        let reader = DirReader::new(mock_doc());
        let (_, a) = reader.find_element_by_index(ElementId::whole(10)).unwrap();
        let (_, b) = reader.find_element_by_index(ElementId::whole(10)).unwrap();
        assert!(Rc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_find_element_by_outline_picks_largest_overlap() {
        let reader = DirReader::new(mock_doc());
        // squarely over the paragraph on page 0
        let (class, elt) = reader
            .find_element_by_outline(0, &Outline::new(0.0, 95.0, 120.0, 115.0))
            .unwrap();
        assert_eq!(class, ElementClass::Paragraph);
        assert_eq!(elt.index, ElementId::whole(0));
    }

    #[test]
    fn test_find_elements_by_outline_fallback_to_best_single() {
        let reader = DirReader::new(mock_doc());
        // tiny sliver: nothing clears 0.618, falls back to best single
        let hits = reader.find_elements_by_outline(0, &Outline::new(0.0, 100.0, 5.0, 104.0));
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn test_find_chars_by_outline_center_rule() {
        let reader = DirReader::new(mock_doc());
        // covers the first five chars of paragraph 0
        let chars = reader.find_chars_by_outline(0, &Outline::new(0.0, 95.0, 50.0, 115.0));
        let text: String = chars.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(text, "证券代码:");
    }

    #[test]
    fn test_find_cell_idx_by_outline() {
        let reader = DirReader::new(mock_doc());
        let (elt, key) = reader
            .find_cell_idx_by_outline(0, &Outline::new(60.0, 200.0, 120.0, 220.0))
            .unwrap();
        assert!(elt.is_table());
        assert_eq!(key, "0_1");
    }

    #[test]
    fn test_find_elements_near_by_walks_backwards() {
        let reader = DirReader::new(mock_doc());
        let found = reader.find_elements_near_by(
            ElementId::whole(10),
            &NearByQuery {
                step: -1,
                amount: 1,
                steprange: 20,
                ..Default::default()
            },
        );
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].index, ElementId::whole(0));
    }

    #[test]
    fn test_is_ocr_page_and_rotation() {
        let reader = DirReader::new(mock_doc());
        assert!(reader.is_ocr_page(0));
        assert_eq!(reader.page_rotation(0), 90);
        assert!(!reader.is_ocr_page(3));
        assert_eq!(reader.page_rotation(3), 0);
    }

    #[test]
    fn test_elements_outline_groups_by_page() {
        let reader = DirReader::new(mock_doc());
        let (_, head) = reader.find_element_by_index(ElementId::whole(10)).unwrap();
        let (_, tail) = reader.find_element_by_index(ElementId::whole(11)).unwrap();
        let regions = reader.elements_outline(&[head, tail]);
        assert_eq!(regions.len(), 2);
        assert_eq!(regions[0].page, 3);
        assert_eq!(regions[1].page, 4);
    }

    #[test]
    fn test_element_text_renders_table() {
        let reader = DirReader::new(mock_doc());
        let (_, table) = reader.find_element_by_index(ElementId::whole(2)).unwrap();
        let text = reader.element_text(&table);
        assert_eq!(text, "发行人名称|金通灵\n成立日期|2001-02-03");
    }

    #[test]
    fn test_load_document_missing_file() {
        let err = load_document("/nonexistent/doc.zip").unwrap_err();
        assert!(matches!(err, Error::DirNotFound(_)));
    }
}
