//! Key/value table extractor.
//!
//! A KV table lays fields out as `key | value [| key | value]` rows.
//! Training records the key-cell text seen for each target column;
//! prediction pairs non-dummy cells left-to-right per row, matches the
//! key against the learned texts (or configured patterns), and emits
//! the value cell. A merged cell holding `"key: value"` in one run is
//! split on the colon.

use crate::answer::{PredictorResult, Variant, VariantKind};
use crate::dir::model::parse_cell_key;
use crate::dir::{Cell, DirReader, Element};
use crate::error::Result;
use crate::geometry::{overlap_pct, OverlapBase};
use crate::predictor::{
    filter_candidates, find_labeled_element, same_text, Candidate, ColumnAnswer, ColumnModel,
    Counter, DatasetItem, ModelData, ModelOptions, PredictContext,
};
use crate::schema::Mold;
use crate::text::{clean_txt, index_in_space_string, PatternSet};
use lazy_static::lazy_static;
use log::debug;
use regex::Regex;
use std::rc::Rc;
use std::sync::Arc;

lazy_static! {
    static ref P_INLINE_KV: Regex = Regex::new(r"^(?P<key>[^:：]{1,20})[:：](?P<val>.+)$").unwrap();
}

/// See the module docs.
pub struct KeyValueTable {
    options: ModelOptions,
    model_data: ModelData,
}

/// A `(key cell, value cell)` pair with the value's cell id.
struct KvPair<'a> {
    key: &'a Cell,
    value: &'a Cell,
    value_id: String,
}

fn kv_pairs(element: &Element) -> Vec<KvPair<'_>> {
    let mut rows: Vec<(u32, Vec<(u32, &str, &Cell)>)> = Vec::new();
    for (id, cell) in &element.cells {
        if cell.dummy || cell.text.trim().is_empty() {
            continue;
        }
        if let Some((row, col)) = parse_cell_key(id) {
            match rows.iter_mut().find(|(r, _)| *r == row) {
                Some((_, cols)) => cols.push((col, id.as_str(), cell)),
                None => rows.push((row, vec![(col, id.as_str(), cell)])),
            }
        }
    }
    rows.sort_by_key(|(r, _)| *r);
    let mut out = Vec::new();
    for (_, mut cols) in rows {
        cols.sort_by_key(|(c, _, _)| *c);
        for pair in cols.chunks(2) {
            if let [(_, _, key), (_, value_id, value)] = pair {
                out.push(KvPair {
                    key,
                    value,
                    value_id: (*value_id).to_string(),
                });
            }
        }
    }
    out
}

impl KeyValueTable {
    /// Build from options.
    pub fn new(options: ModelOptions) -> Result<Self> {
        Ok(KeyValueTable {
            options,
            model_data: ModelData::new(),
        })
    }

    fn key_matches(&self, key_text: &str, column: &str, regs: &PatternSet) -> bool {
        if !regs.is_empty() {
            return regs.is_match(&clean_txt(key_text));
        }
        match self.model_data.get(column) {
            Some(counter) => counter
                .most_common()
                .iter()
                .any(|(learned, _)| same_text(key_text, learned)),
            None => same_text(key_text, column),
        }
    }

    fn inline_kv_result(
        &self,
        candidate: &Candidate,
        column: &str,
        regs: &PatternSet,
    ) -> Option<PredictorResult> {
        // single merged cell holding "key: value"
        for (_, cell) in &candidate.element.cells {
            if cell.dummy {
                continue;
            }
            let cleaned = clean_txt(&cell.text);
            let caps = match P_INLINE_KV.captures(&cleaned) {
                Some(caps) => caps,
                None => continue,
            };
            let key = match caps.name("key") {
                Some(key) => key.as_str(),
                None => continue,
            };
            if !self.key_matches(key, column, regs) {
                continue;
            }
            let val = match caps.name("val") {
                Some(val) => val,
                None => continue,
            };
            let start = cleaned[..val.start()].chars().count();
            let end = start + val.as_str().chars().count();
            let (raw_start, raw_end) = index_in_space_string(&cell.text, start, end);
            let chars: Vec<crate::dir::Char> = cell
                .chars
                .iter()
                .skip(raw_start)
                .take(raw_end.saturating_sub(raw_start))
                .cloned()
                .collect();
            return Some(
                PredictorResult::single(Variant::new(VariantKind::CharSpan {
                    element: Some(Rc::clone(&candidate.element)),
                    chars,
                    display_text: Some(val.as_str().to_string()),
                }))
                .with_score(candidate.score),
            );
        }
        None
    }
}

/// The cell of a table best covering a labeled box, with its id.
fn aim_cell<'a>(
    element: &'a Element,
    page: i64,
    outline: &crate::geometry::Outline,
) -> Option<(&'a str, &'a Cell)> {
    let mut best: Option<(f64, &str, &Cell)> = None;
    for (id, cell) in &element.cells {
        if cell.page != page {
            continue;
        }
        let pct = overlap_pct(&cell.outline, outline, OverlapBase::Second);
        if pct <= 0.5 {
            continue;
        }
        match best {
            Some((best_pct, _, _)) if pct <= best_pct => {}
            _ => best = Some((pct, id, cell)),
        }
    }
    best.map(|(_, id, cell)| (id, cell))
}

/// Key cell of a value cell: the closest non-dummy cell to its left in
/// the same row.
fn key_cell_of<'a>(element: &'a Element, value_id: &str) -> Option<&'a Cell> {
    let (row, col) = parse_cell_key(value_id)?;
    let mut best: Option<(u32, &Cell)> = None;
    for (id, cell) in &element.cells {
        if cell.dummy {
            continue;
        }
        if let Some((r, c)) = parse_cell_key(id) {
            if r == row && c < col {
                match best {
                    Some((best_c, _)) if c <= best_c => {}
                    _ => best = Some((c, cell)),
                }
            }
        }
    }
    best.map(|(_, cell)| cell)
}

impl ColumnModel for KeyValueTable {
    fn name(&self) -> &str {
        "table_kv"
    }

    fn options(&self) -> &ModelOptions {
        &self.options
    }

    fn model_data(&self) -> &ModelData {
        &self.model_data
    }

    fn train(&mut self, dataset: &[DatasetItem], _mold: &Mold) -> Result<()> {
        for item in dataset {
            let reader = DirReader::new(Arc::clone(&item.doc));
            for (column, answers) in &item.answers {
                for answer in answers {
                    let (_, element) = match find_labeled_element(&reader, answer) {
                        Some(found) => found,
                        None => continue,
                    };
                    if !element.is_table() {
                        continue;
                    }
                    for labeled_box in &answer.boxes {
                        let (value_id, _) =
                            match aim_cell(&element, labeled_box.page, &labeled_box.outline) {
                                Some(found) => found,
                                None => continue,
                            };
                        if let Some(key) = key_cell_of(&element, value_id) {
                            self.model_data
                                .entry(column.clone())
                                .or_insert_with(Counter::new)
                                .add(clean_txt(&key.text));
                        }
                    }
                }
            }
            debug!("table_kv trained on {}", item.name);
        }
        Ok(())
    }

    fn predict(&self, candidates: &[Candidate], ctx: &PredictContext) -> Result<Vec<ColumnAnswer>> {
        let mut out = Vec::new();
        for candidate in filter_candidates(&self.options, candidates, ctx)? {
            if !candidate.element.is_table() {
                continue;
            }
            let pairs = kv_pairs(&candidate.element);
            let mut answer = ColumnAnswer::new();
            for column in &ctx.columns {
                let regs = PatternSet::compile(self.options.regs_for(column))?;
                let mut results = Vec::new();
                for pair in &pairs {
                    if !self.key_matches(&pair.key.text, column, &regs) {
                        continue;
                    }
                    if pair.value.text.trim().is_empty() {
                        continue;
                    }
                    results.push(
                        PredictorResult::single(Variant::new(VariantKind::TableCells {
                            element: Rc::clone(&candidate.element),
                            cell_ids: vec![pair.value_id.clone()],
                        }))
                        .with_score(candidate.score),
                    );
                    if !self.options.multi {
                        break;
                    }
                }
                if results.is_empty() {
                    if let Some(inline) = self.inline_kv_result(&candidate, column, &regs) {
                        results.push(inline);
                    }
                }
                if !results.is_empty() {
                    answer.insert(column.clone(), results);
                }
            }
            if !answer.is_empty() {
                out.push(answer);
                if !self.options.multi_elements {
                    break;
                }
            }
        }
        Ok(out)
    }

    fn predict_just_table(
        &self,
        candidates: &[Candidate],
        ctx: &PredictContext,
    ) -> Result<Vec<ColumnAnswer>> {
        let column = match ctx.columns.first() {
            Some(c) => c.as_str(),
            None => ctx.node.name(),
        };
        let mut out = Vec::new();
        for candidate in candidates {
            if !candidate.element.is_table() {
                continue;
            }
            out.push(super::single_answer(
                column,
                PredictorResult::single(Variant::new(VariantKind::TableCells {
                    element: Rc::clone(&candidate.element),
                    cell_ids: Vec::new(),
                }))
                .with_score(candidate.score),
            ));
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::crude::CrudeStore;
    use crate::dir::model::cell_key;
    use crate::dir::{Char, DirDocument, ElementClass, ElementId};
    use crate::geometry::Outline;
    use indexmap::IndexMap;

    fn mock_cell(row: u32, col: u32, text: &str) -> (String, Cell) {
        let outline = Outline::new(
            col as f64 * 100.0,
            row as f64 * 20.0,
            (col + 1) as f64 * 100.0,
            (row + 1) as f64 * 20.0,
        );
        let chars: Vec<Char> = text
            .chars()
            .enumerate()
            .map(|(i, c)| Char {
                page: 0,
                outline: Outline::new(
                    col as f64 * 100.0 + 10.0 * i as f64,
                    row as f64 * 20.0,
                    col as f64 * 100.0 + 10.0 * (i + 1) as f64,
                    (row + 1) as f64 * 20.0,
                ),
                text: c.to_string(),
            })
            .collect();
        (
            cell_key(row, col),
            Cell {
                page: 0,
                outline,
                text: text.to_string(),
                chars,
                left: col,
                right: col + 1,
                top: row,
                bottom: row + 1,
                dummy: false,
            },
        )
    }

    fn mock_table(cells: Vec<(String, Cell)>) -> Candidate {
        let mut map = IndexMap::new();
        for (id, cell) in cells {
            map.insert(id, cell);
        }
        Candidate {
            element: Rc::new(Element {
                index: ElementId::whole(4),
                class: Some(ElementClass::Table),
                cells: map,
                ..Default::default()
            }),
            class: ElementClass::Table,
            score: 0.6,
        }
    }

    fn mock_mold() -> Mold {
        Mold::from_json(
            r#"{"schemas": [{"name": "发行概况", "orders": ["发行人名称"],
                "schema": {"发行人名称": {"type": "文本", "multi": false, "required": false, "words": ""}}}],
               "schema_types": []}"#,
        )
        .unwrap()
    }

    #[test]
    fn test_kv_pairing_left_to_right() {
        let candidate = mock_table(vec![
            mock_cell(0, 0, "发行人名称"),
            mock_cell(0, 1, "金通灵科技"),
            mock_cell(1, 0, "成立日期"),
            mock_cell(1, 1, "2001-02-03"),
        ]);
        let pairs = kv_pairs(&candidate.element);
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0].key.text, "发行人名称");
        assert_eq!(pairs[0].value_id, "0_1");
    }

    #[test]
    fn test_learned_key_selects_value_cell() {
        let mold = mock_mold();
        let config = Config::default();
        let crude = CrudeStore::default();
        let reader = DirReader::new(std::sync::Arc::new(DirDocument::default()));
        let ctx = PredictContext {
            reader: &reader,
            mold: &mold,
            crude: &crude,
            config: &config,
            node: mold.find_by_path(&["发行人名称".to_string()]),
            columns: vec!["发行人名称".to_string()],
            parent_answers: &[],
        };
        let mut model = KeyValueTable::new(ModelOptions::named("table_kv")).unwrap();
        let mut counter = Counter::new();
        counter.add("公司名称");
        model.model_data.insert("发行人名称".to_string(), counter);

        let candidate = mock_table(vec![
            mock_cell(0, 0, "公司名称"),
            mock_cell(0, 1, "金通灵科技"),
        ]);
        let answers = model.predict(&[candidate], &ctx).unwrap();
        assert_eq!(answers.len(), 1);
        assert_eq!(answers[0]["发行人名称"][0].text(), "金通灵科技");
    }

    #[test]
    fn test_column_name_is_default_key() {
        let mold = mock_mold();
        let config = Config::default();
        let crude = CrudeStore::default();
        let reader = DirReader::new(std::sync::Arc::new(DirDocument::default()));
        let ctx = PredictContext {
            reader: &reader,
            mold: &mold,
            crude: &crude,
            config: &config,
            node: mold.find_by_path(&["发行人名称".to_string()]),
            columns: vec!["发行人名称".to_string()],
            parent_answers: &[],
        };
        let model = KeyValueTable::new(ModelOptions::named("table_kv")).unwrap();
        let candidate = mock_table(vec![
            mock_cell(0, 0, "发行人 名称"),
            mock_cell(0, 1, "金通灵科技"),
        ]);
        let answers = model.predict(&[candidate], &ctx).unwrap();
        assert_eq!(answers[0]["发行人名称"][0].text(), "金通灵科技");
    }

    #[test]
    fn test_inline_kv_split() {
        let mold = mock_mold();
        let config = Config::default();
        let crude = CrudeStore::default();
        let reader = DirReader::new(std::sync::Arc::new(DirDocument::default()));
        let ctx = PredictContext {
            reader: &reader,
            mold: &mold,
            crude: &crude,
            config: &config,
            node: mold.find_by_path(&["发行人名称".to_string()]),
            columns: vec!["发行人名称".to_string()],
            parent_answers: &[],
        };
        let model = KeyValueTable::new(ModelOptions::named("table_kv")).unwrap();
        let candidate = mock_table(vec![mock_cell(0, 0, "发行人名称：金通灵科技")]);
        let answers = model.predict(&[candidate], &ctx).unwrap();
        assert_eq!(answers[0]["发行人名称"][0].text(), "金通灵科技");
    }
}
