//! Table normalization.
//!
//! The upstream parser splits tables at page breaks and sometimes disagrees
//! with itself about column structure between the fragments. [`MergedTable`]
//! reassembles a contiguous run of table fragments into one logical table:
//! it normalizes column counts (widening a poorer fragment onto the richer
//! grid when the structure allows it), relabels rows so they are monotone
//! across the run, fills merge groups with dummy cells, and stitches values
//! split across the page break.
//!
//! [`DirTable`] wraps a single resolved table element with row/column
//! grouping and rendering helpers.

use crate::dir::model::{cell_key, parse_cell_key, Cell, Element, ElementId};
use crate::geometry::{overlap_pct, Outline, OverlapBase};
use indexmap::IndexMap;
use log::debug;
use std::collections::BTreeMap;

/// Cell-area overlap ratio above which a cell counts as covered by an
/// annotation outline.
pub const CELL_OVERLAP_THRESHOLD: f64 = 0.618;

fn column_count(cells: &IndexMap<String, Cell>) -> u32 {
    cells
        .keys()
        .filter_map(|k| parse_cell_key(k))
        .map(|(_, c)| c + 1)
        .max()
        .unwrap_or(0)
}

fn row_count(cells: &IndexMap<String, Cell>) -> u32 {
    cells
        .keys()
        .filter_map(|k| parse_cell_key(k))
        .map(|(r, _)| r + 1)
        .max()
        .unwrap_or(0)
}

/// One fragment mid-assembly: cells keyed by local `(row, col)`.
struct Fragment {
    id: ElementId,
    cells: IndexMap<String, Cell>,
    merged: Vec<Vec<[u32; 2]>>,
    continued: bool,
    continued_row: u32,
    continued_cols: Vec<u32>,
    is_nested: bool,
}

impl Fragment {
    fn from_element(elt: &Element) -> Self {
        Fragment {
            id: elt.index,
            cells: elt.cells.clone(),
            merged: elt.merged.clone(),
            continued: elt.continued,
            continued_row: elt.continued_row.unwrap_or(0),
            continued_cols: elt.continued_cols.clone(),
            is_nested: elt.is_nested,
        }
    }

    fn columns(&self) -> u32 {
        column_count(&self.cells)
    }

    fn rows(&self) -> u32 {
        row_count(&self.cells)
    }

    /// Widen every column `c > 0` to `step` grid columns: `c` maps to
    /// `(c-1)*step + 1`, and the widened span becomes a merge group so the
    /// dummy-fill pass completes the grid.
    fn widen_columns(&mut self, step: u32) {
        let mut cells = IndexMap::with_capacity(self.cells.len());
        let mut widened_groups = Vec::new();
        for (key, mut cell) in std::mem::take(&mut self.cells) {
            let (row, col) = match parse_cell_key(&key) {
                Some(rc) => rc,
                None => continue,
            };
            let new_col = if col == 0 { 0 } else { (col - 1) * step + 1 };
            cell.left = new_col;
            cell.right = if col == 0 { 1 } else { new_col + step };
            if col > 0 && step > 1 {
                let group = (new_col..new_col + step).map(|c| [row, c]).collect();
                widened_groups.push(group);
            }
            cells.insert(cell_key(row, new_col), cell);
        }
        for group in &mut self.merged {
            for coord in group.iter_mut() {
                let col = coord[1];
                coord[1] = if col == 0 { 0 } else { (col - 1) * step + 1 };
            }
        }
        self.merged.extend(widened_groups);
        self.cells = cells;
        self.continued_cols = self
            .continued_cols
            .iter()
            .map(|&c| if c == 0 { 0 } else { (c - 1) * step + 1 })
            .collect();
    }

    /// Populate every merge group: the head cell (smallest coordinate
    /// present) spans the group's extent; all other positions get
    /// `dummy=true` copies. Positions already occupied are only flagged,
    /// never overwritten.
    fn fill_merged_cells(&mut self) {
        for group in self.merged.clone() {
            if group.is_empty() {
                continue;
            }
            let min_row = group.iter().map(|c| c[0]).min().unwrap_or(0);
            let min_col = group.iter().map(|c| c[1]).min().unwrap_or(0);
            let max_row = group.iter().map(|c| c[0]).max().unwrap_or(0);
            let max_col = group.iter().map(|c| c[1]).max().unwrap_or(0);

            let head_key = group
                .iter()
                .map(|c| cell_key(c[0], c[1]))
                .find(|k| self.cells.contains_key(k));
            let head_key = match head_key {
                Some(k) => k,
                None => continue, // malformed group, tolerated
            };
            let head = match self.cells.get_mut(&head_key) {
                Some(cell) => {
                    cell.top = min_row;
                    cell.left = min_col;
                    cell.bottom = max_row + 1;
                    cell.right = max_col + 1;
                    cell.dummy = false;
                    cell.clone()
                }
                None => continue,
            };
            for coord in &group {
                let key = cell_key(coord[0], coord[1]);
                if key == head_key {
                    continue;
                }
                match self.cells.get_mut(&key) {
                    Some(existing) => existing.dummy = true,
                    None => {
                        let mut dummy = head.clone();
                        dummy.dummy = true;
                        self.cells.insert(key, dummy);
                    }
                }
            }
        }
    }
}

/// A logical table assembled from one or more contiguous table fragments
/// sharing a column structure across pages.
///
/// After assembly the column count is uniform, rows are monotone across the
/// run, and every coordinate inside a merge group resolves to a cell
/// (exactly one of which is not a dummy).
#[derive(Debug, Clone)]
pub struct MergedTable {
    /// Member fragment ids, head first
    pub table_ids: Vec<ElementId>,
    /// Uniform column count
    pub columns: u32,
    /// Total row count
    pub rows: u32,
    /// Resolved cells keyed `"r_c"` in the normalized grid
    pub cells: IndexMap<String, Cell>,
}

impl MergedTable {
    /// Id of the head fragment.
    pub fn head(&self) -> ElementId {
        self.table_ids[0]
    }

    /// Assemble as many fragments as share a column structure, starting at
    /// `tables[0]`. Returns the merged table and the number of fragments
    /// consumed (at least 1); the caller splits the run at the boundary
    /// where normalization failed.
    pub fn build(tables: &[&Element]) -> (MergedTable, usize) {
        let mut fragments = vec![Fragment::from_element(tables[0])];
        let mut consumed = 1;
        for elt in &tables[1..] {
            let next = Fragment::from_element(elt);
            let prev = &fragments[fragments.len() - 1];
            match Self::fix_table_column(prev, &next) {
                Some(ColumnFix::Keep) => {}
                Some(ColumnFix::WidenPrevious(step)) => {
                    // the earlier fragments carry the poorer grid
                    for frag in &mut fragments {
                        frag.widen_columns(step);
                    }
                }
                None => {
                    debug!(
                        "table {} does not continue {}: column structures differ",
                        elt.index,
                        fragments[0].id
                    );
                    break;
                }
            }
            fragments.push(next);
            consumed += 1;
        }
        (Self::assemble(fragments), consumed)
    }

    /// Decide how the previous fragment and the next one can share a column
    /// structure. `continued=true` on the previous fragment means it
    /// continues into the next, so differing counts resolve to the larger
    /// grid without widening.
    fn fix_table_column(prev: &Fragment, next: &Fragment) -> Option<ColumnFix> {
        let prev_cols = prev.columns();
        let next_cols = next.columns();
        if prev.continued {
            return Some(ColumnFix::Keep);
        }
        if prev_cols == next_cols {
            return Some(ColumnFix::Keep);
        }
        // the later fragment carries the richer schema: widen the earlier
        // one onto its grid when the structures are compatible
        if next_cols > prev_cols && prev_cols > 1 && !prev.is_nested {
            let step = (next_cols - 1) / (prev_cols - 1);
            if step > 1 && (prev_cols - 1) * step + 1 == next_cols {
                return Some(ColumnFix::WidenPrevious(step));
            }
        }
        None
    }

    fn assemble(mut fragments: Vec<Fragment>) -> MergedTable {
        // merge groups the parser attached to the following fragment can
        // describe this fragment's rows when the header repeats across the
        // page break (rows below the continuation's continued_row); adopt
        // them at their stated coordinates
        for i in 0..fragments.len().saturating_sub(1) {
            if !fragments[i].merged.is_empty() {
                continue;
            }
            let cr = fragments[i + 1].continued_row;
            if cr == 0 {
                continue;
            }
            let prev_rows = fragments[i].rows();
            let mut adopted: Vec<Vec<[u32; 2]>> = Vec::new();
            for group in &fragments[i + 1].merged {
                let min_row = match group.iter().map(|c| c[0]).min() {
                    Some(r) => r,
                    None => continue,
                };
                if min_row >= cr {
                    break;
                }
                if min_row < prev_rows {
                    adopted.push(group.clone());
                }
            }
            // only row-level merges transfer; a column merge crossing the
            // break is handled by continued_cols stitching instead
            let mut by_row: BTreeMap<u32, Vec<Vec<[u32; 2]>>> = BTreeMap::new();
            for group in &adopted {
                if group.iter().all(|c| c[0] == group[0][0]) {
                    by_row.entry(group[0][0]).or_default().push(group.clone());
                }
            }
            if by_row.is_empty() {
                continue;
            }
            // this fragment keyed the row densely, unaware of the merge:
            // shift the trailing coordinates right so the dummy fill lands
            // inside the span
            let mut moves: Vec<(String, String)> = Vec::new();
            for groups in by_row.values() {
                let mut offset = 0u32;
                for group in groups {
                    offset += group.len() as u32 - 1;
                    for coord in &group[1..] {
                        moves.push((
                            cell_key(coord[0], coord[1]),
                            cell_key(coord[0], coord[1] + offset),
                        ));
                    }
                }
            }
            for (old, new) in moves {
                if let Some(cell) = fragments[i].cells.shift_remove(&old) {
                    fragments[i].cells.insert(new, cell);
                }
            }
            fragments[i].merged = adopted;
        }

        for frag in &mut fragments {
            frag.fill_merged_cells();
        }

        // cross-page header reuse: a continuation fragment's row-0 merge
        // head with no text inherits the previous fragment's header text
        for i in 1..fragments.len() {
            let mut updates = Vec::new();
            for (key, cell) in &fragments[i].cells {
                let (row, col) = match parse_cell_key(key) {
                    Some(rc) => rc,
                    None => continue,
                };
                if row == 0 && !cell.dummy && cell.text.trim().is_empty() {
                    if let Some(prev_cell) = fragments[i - 1].cells.get(&cell_key(0, col)) {
                        if !prev_cell.text.trim().is_empty() {
                            updates.push((key.clone(), prev_cell.text.clone()));
                        }
                    }
                }
            }
            for (key, text) in updates {
                if let Some(cell) = fragments[i].cells.get_mut(&key) {
                    cell.text = text;
                }
            }
        }

        let columns = fragments.iter().map(|f| f.columns()).max().unwrap_or(0);
        let table_ids = fragments.iter().map(|f| f.id).collect();

        let mut cells: IndexMap<String, Cell> = IndexMap::new();
        let mut row_offset = 0u32;
        let mut last_body_row: Option<u32> = None;
        let mut prev_continued_cols: Vec<u32> = Vec::new();
        for frag in &fragments {
            let frag_rows = frag.rows();
            // value stitching: the first body cell of a continuation column
            // absorbs the text of the previous fragment's last cell
            let stitched: Vec<u32> = std::mem::take(&mut prev_continued_cols);
            for (key, cell) in &frag.cells {
                let (row, col) = match parse_cell_key(key) {
                    Some(rc) => rc,
                    None => continue,
                };
                let mut cell = cell.clone();
                let global_row = row + row_offset;
                cell.top = global_row;
                cell.bottom = cell.bottom + row_offset;
                if row == frag.continued_row && stitched.contains(&col) {
                    if let Some(prev_row) = last_body_row {
                        if let Some(prev_cell) = cells.get(&cell_key(prev_row, col)) {
                            let mut chars = prev_cell.chars.clone();
                            chars.extend(cell.chars.clone());
                            cell.text = format!("{}{}", prev_cell.text, cell.text);
                            cell.chars = chars;
                        }
                    }
                }
                cells.insert(cell_key(global_row, col), cell);
            }
            last_body_row = frag_rows.checked_sub(1).map(|r| r + row_offset);
            row_offset += frag_rows;
            prev_continued_cols = if frag.continued {
                frag.continued_cols.clone()
            } else {
                Vec::new()
            };
        }
        let rows = row_offset;

        MergedTable {
            table_ids,
            columns,
            rows,
            cells,
        }
    }
}

enum ColumnFix {
    Keep,
    WidenPrevious(u32),
}

/// A single resolved table element with grouped rows and rendering helpers.
#[derive(Debug)]
pub struct DirTable<'a> {
    element: &'a Element,
    // rows -> cols -> cell key, both ascending
    grid: BTreeMap<u32, BTreeMap<u32, String>>,
}

impl<'a> DirTable<'a> {
    /// Wrap a processed table element.
    pub fn new(element: &'a Element) -> Self {
        let mut grid: BTreeMap<u32, BTreeMap<u32, String>> = BTreeMap::new();
        for key in element.cells.keys() {
            if let Some((row, col)) = parse_cell_key(key) {
                grid.entry(row).or_default().insert(col, key.clone());
            }
        }
        DirTable { element, grid }
    }

    /// The wrapped element.
    pub fn element(&self) -> &Element {
        self.element
    }

    /// Cell lookup by grid coordinates.
    pub fn cell(&self, row: u32, col: u32) -> Option<&Cell> {
        self.element.cells.get(&cell_key(row, col))
    }

    /// Ascending row indices.
    pub fn row_indices(&self) -> impl Iterator<Item = u32> + '_ {
        self.grid.keys().copied()
    }

    /// Cells of one row in ascending column order.
    pub fn row(&self, row: u32) -> Vec<(u32, &Cell)> {
        self.grid
            .get(&row)
            .map(|cols| {
                cols.iter()
                    .filter_map(|(c, key)| self.element.cells.get(key).map(|cell| (*c, cell)))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Number of header rows: the bottom span of the top-left cell.
    pub fn header_rows(&self) -> u32 {
        self.cell(0, 0).map(|c| c.bottom.max(1)).unwrap_or(1)
    }

    /// Head-cell coordinates for a position covered by a merge group.
    pub fn cell_merged_to(&self, row: u32, col: u32) -> Option<(u32, u32)> {
        for group in &self.element.merged {
            if group.iter().any(|c| c[0] == row && c[1] == col) {
                return group
                    .iter()
                    .filter(|c| {
                        self.cell(c[0], c[1]).map(|cell| !cell.dummy).unwrap_or(false)
                    })
                    .map(|c| (c[0], c[1]))
                    .next();
            }
        }
        None
    }

    /// Detect a duplicated header `A|B|C|A|B|C` in row 0 and return the
    /// column ranges of each repetition. A table whose header repeats over
    /// consecutive column ranges is really two tables set side by side.
    pub fn horizontal_splits(&self) -> Vec<(u32, u32)> {
        let header: Vec<(u32, String)> = self
            .row(0)
            .into_iter()
            .filter(|(_, c)| !c.dummy)
            .map(|(col, c)| (col, crate::text::clean_txt(&c.text)))
            .collect();
        let n = header.len();
        if n < 4 || n % 2 != 0 {
            return Vec::new();
        }
        let half = n / 2;
        let left: Vec<&String> = header[..half].iter().map(|(_, t)| t).collect();
        let right: Vec<&String> = header[half..].iter().map(|(_, t)| t).collect();
        if left != right || left.iter().all(|t| t.is_empty()) {
            return Vec::new();
        }
        let split_col = header[half].0;
        let total_cols = column_count(&self.element.cells);
        vec![(0, split_col), (split_col, total_cols)]
    }

    /// Pipe-separated markdown rendering. When `fill_merged` is set, dummy
    /// cells render their head cell's text instead of an empty slot.
    pub fn markdown(&self, fill_merged: bool) -> String {
        let cols = column_count(&self.element.cells);
        let mut lines = Vec::new();
        for (i, row) in self.grid.keys().enumerate() {
            let mut fields = Vec::with_capacity(cols as usize);
            for col in 0..cols {
                let text = match self.cell(*row, col) {
                    Some(cell) if cell.dummy && fill_merged => self
                        .cell_merged_to(*row, col)
                        .and_then(|(r, c)| self.cell(r, c))
                        .map(|c| c.text.clone())
                        .unwrap_or_default(),
                    Some(cell) if cell.dummy => String::new(),
                    Some(cell) => cell.text.clone(),
                    None => String::new(),
                };
                fields.push(text.replace('|', "\\|").replace('\n', " "));
            }
            lines.push(format!("| {} |", fields.join(" | ")));
            if i == 0 {
                let sep = vec!["---"; cols as usize];
                lines.push(format!("| {} |", sep.join(" | ")));
            }
        }
        lines.join("\n")
    }

    /// Keys of cells on `page` whose box overlaps the outline by more than
    /// [`CELL_OVERLAP_THRESHOLD`] of the cell's own area.
    pub fn find_cellidx_list_by_outline(&self, page: i64, outline: &Outline) -> Vec<String> {
        let mut hits: Vec<(f64, String)> = self
            .element
            .cells
            .iter()
            .filter(|(_, cell)| cell.page == page)
            .filter_map(|(key, cell)| {
                let pct = overlap_pct(&cell.outline, outline, OverlapBase::First);
                if pct > CELL_OVERLAP_THRESHOLD {
                    Some((pct, key.clone()))
                } else {
                    None
                }
            })
            .collect();
        hits.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        hits.into_iter().map(|(_, key)| key).collect()
    }
}
