//! Row-table extractor.
//!
//! A row table carries its field names in the header rows and one
//! record per body row. Training counts the header feature seen above
//! each labeled cell; prediction maps every schema column to a grid
//! column by that feature (or by configured patterns) and emits one
//! answer group per body row.
//!
//! A mid-row — a body row whose single non-dummy cell holds a date —
//! tags the rows after it; the `年度` column inherits the latest tag,
//! falling back to a date found above the table.

use crate::answer::{PredictorResult, Variant, VariantKind};
use crate::dir::model::cell_key;
use crate::dir::table::DirTable;
use crate::dir::{Cell, DirReader, Element};
use crate::error::Result;
use crate::geometry::{overlap_pct, OverlapBase};
use crate::predictor::{
    feature_key, filter_candidates, find_labeled_element, find_year, parse_year_month, Candidate,
    ColumnAnswer, ColumnModel, Counter, DatasetItem, ModelData, ModelOptions, PredictContext,
};
use crate::schema::Mold;
use crate::text::{clean_txt, PatternSet};
use log::debug;
use std::rc::Rc;
use std::sync::Arc;

/// Column name that inherits row-group date tags.
const YEAR_COLUMN: &str = "年度";

/// See the module docs.
pub struct RowTable {
    options: ModelOptions,
    model_data: ModelData,
}

impl RowTable {
    /// Build from options.
    pub fn new(options: ModelOptions) -> Result<Self> {
        Ok(RowTable {
            options,
            model_data: ModelData::new(),
        })
    }

    /// Grid column answering a schema column, by learned header feature
    /// first, then by configured patterns over the raw header text.
    fn match_column(
        &self,
        column: &str,
        headers: &[(u32, String, String)],
        regs: &PatternSet,
    ) -> Option<u32> {
        let white = self.options.feature_white_for(column);
        let black = self.options.feature_black_for(column);
        let usable = |feature: &str| {
            (white.is_empty() || white.iter().any(|w| w == feature))
                && !black.iter().any(|b| b == feature)
        };
        if let Some(counter) = self.model_data.get(column) {
            for (learned, _) in counter.most_common() {
                for (col, feature, _) in headers {
                    if feature == learned && usable(feature) {
                        return Some(*col);
                    }
                }
            }
        }
        if !regs.is_empty() {
            for (col, feature, raw) in headers {
                if regs.is_match(raw) && usable(feature) {
                    return Some(*col);
                }
            }
        }
        None
    }
}

/// Per-grid-column header features: `(col, feature, raw cleaned text)`.
fn header_features(table: &DirTable<'_>) -> Vec<(u32, String, String)> {
    let header_rows = table.header_rows();
    let mut cols: Vec<u32> = Vec::new();
    for row in 0..header_rows {
        for (col, _) in table.row(row) {
            if !cols.contains(&col) {
                cols.push(col);
            }
        }
    }
    cols.sort_unstable();
    cols.into_iter()
        .map(|col| {
            let texts: Vec<String> = (0..header_rows)
                .filter_map(|row| {
                    table
                        .cell(row, col)
                        .or_else(|| {
                            table
                                .cell_merged_to(row, col)
                                .and_then(|(r, c)| table.cell(r, c))
                        })
                        .map(|cell| cell.text.clone())
                })
                .filter(|t| !t.trim().is_empty())
                .collect();
            let raw = clean_txt(&texts.join("|"));
            (col, feature_key(&texts), raw)
        })
        .collect()
}

/// A mid-row's date tag: the single non-dummy cell holding a parseable
/// date.
fn mid_row_tag(cells: &[(u32, &Cell)]) -> Option<(String, Vec<crate::dir::Char>)> {
    let filled: Vec<&(u32, &Cell)> = cells
        .iter()
        .filter(|(_, c)| !c.dummy && !c.text.trim().is_empty())
        .collect();
    if filled.len() != 1 {
        return None;
    }
    let (_, cell) = filled[0];
    parse_year_month(&cell.text)?;
    Some((clean_txt(&cell.text), cell.chars.clone()))
}

fn cell_result(element: &Rc<Element>, row: u32, col: u32, score: f64) -> PredictorResult {
    PredictorResult::single(Variant::new(VariantKind::TableCells {
        element: Rc::clone(element),
        cell_ids: vec![cell_key(row, col)],
    }))
    .with_score(score)
}

impl ColumnModel for RowTable {
    fn name(&self) -> &str {
        "table_row"
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
                    let table = DirTable::new(&element);
                    let headers = header_features(&table);
                    for labeled_box in &answer.boxes {
                        let col = element.cells.iter().find_map(|(id, cell)| {
                            if cell.page != labeled_box.page {
                                return None;
                            }
                            let pct = overlap_pct(
                                &cell.outline,
                                &labeled_box.outline,
                                OverlapBase::Second,
                            );
                            if pct <= 0.5 {
                                return None;
                            }
                            crate::dir::model::parse_cell_key(id).map(|(_, c)| c)
                        });
                        if let Some(col) = col {
                            if let Some((_, feature, _)) =
                                headers.iter().find(|(c, _, _)| *c == col)
                            {
                                self.model_data
                                    .entry(column.clone())
                                    .or_insert_with(Counter::new)
                                    .add(feature.clone());
                            }
                        }
                    }
                }
            }
            debug!("table_row trained on {}", item.name);
        }
        Ok(())
    }

    fn predict(&self, candidates: &[Candidate], ctx: &PredictContext) -> Result<Vec<ColumnAnswer>> {
        let mut out = Vec::new();
        for candidate in filter_candidates(&self.options, candidates, ctx)? {
            if !candidate.element.is_table() {
                continue;
            }
            let table = DirTable::new(&candidate.element);
            let headers = header_features(&table);
            if headers.is_empty() {
                continue;
            }

            let mut column_map: Vec<(String, u32)> = Vec::new();
            for column in &ctx.columns {
                if column == YEAR_COLUMN {
                    continue;
                }
                let regs = PatternSet::compile(self.options.regs_for(column))?;
                if let Some(col) = self.match_column(column, &headers, &regs) {
                    column_map.push((column.clone(), col));
                }
            }
            if column_map.is_empty() {
                continue;
            }
            let wants_year = ctx.columns.iter().any(|c| c == YEAR_COLUMN);
            let pre_table_year = if wants_year {
                find_year(ctx.reader, &candidate.element, 3)
            } else {
                None
            };

            let header_rows = table.header_rows();
            let mut current_tag: Option<(String, Vec<crate::dir::Char>)> = None;
            for row in table.row_indices() {
                if row < header_rows {
                    continue;
                }
                let cells = table.row(row);
                if let Some(tag) = mid_row_tag(&cells) {
                    current_tag = Some(tag);
                    continue;
                }
                if cells
                    .iter()
                    .all(|(_, c)| c.dummy || c.text.trim().is_empty())
                {
                    continue;
                }
                let mut answer = ColumnAnswer::new();
                for (column, col) in &column_map {
                    let filled = cells
                        .iter()
                        .any(|(c, cell)| c == col && !cell.text.trim().is_empty());
                    if !filled {
                        continue;
                    }
                    answer.insert(
                        column.clone(),
                        vec![cell_result(&candidate.element, row, *col, candidate.score)],
                    );
                }
                if answer.is_empty() {
                    continue;
                }
                if wants_year {
                    let (text, chars) = match &current_tag {
                        Some((text, chars)) => (text.clone(), chars.clone()),
                        None => match &pre_table_year {
                            Some(year) => (year.clone(), Vec::new()),
                            None => (String::new(), Vec::new()),
                        },
                    };
                    if !text.is_empty() {
                        answer.insert(
                            YEAR_COLUMN.to_string(),
                            vec![PredictorResult::single(Variant::new(
                                VariantKind::CharSpan {
                                    element: Some(Rc::clone(&candidate.element)),
                                    chars,
                                    display_text: Some(text),
                                },
                            ))
                            .with_score(candidate.score)],
                        );
                    }
                }
                out.push(answer);
            }
            if !out.is_empty() && !self.options.multi_elements {
                break;
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
    use crate::dir::{Char, DirDocument, ElementClass, ElementId};
    use crate::geometry::Outline;
    use indexmap::IndexMap;

    fn mock_cell(row: u32, col: u32, text: &str) -> (String, Cell) {
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
                outline: Outline::new(
                    col as f64 * 100.0,
                    row as f64 * 20.0,
                    (col + 1) as f64 * 100.0,
                    (row + 1) as f64 * 20.0,
                ),
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

    fn mock_dummy(row: u32, col: u32) -> (String, Cell) {
        let (key, mut cell) = mock_cell(row, col, "");
        cell.dummy = true;
        (key, cell)
    }

    fn mock_table(cells: Vec<(String, Cell)>) -> Candidate {
        let mut map = IndexMap::new();
        for (id, cell) in cells {
            map.insert(id, cell);
        }
        Candidate {
            element: Rc::new(Element {
                index: ElementId::whole(6),
                class: Some(ElementClass::Table),
                cells: map,
                ..Default::default()
            }),
            class: ElementClass::Table,
            score: 0.5,
        }
    }

    fn mock_mold() -> Mold {
        Mold::from_json(
            r#"{"schemas": [
                {"name": "主要财务数据", "orders": ["记录"],
                 "schema": {"记录": {"type": "财务记录", "multi": true, "required": false, "words": ""}}},
                {"name": "财务记录", "orders": ["项目", "金额", "年度"],
                 "schema": {
                    "项目": {"type": "文本", "multi": false, "required": false, "words": ""},
                    "金额": {"type": "数字", "multi": false, "required": false, "words": ""},
                    "年度": {"type": "文本", "multi": false, "required": false, "words": ""}}}],
               "schema_types": []}"#,
        )
        .unwrap()
    }

    fn mock_ctx<'a>(
        reader: &'a DirReader,
        mold: &'a Mold,
        crude: &'a CrudeStore,
        config: &'a Config,
    ) -> PredictContext<'a> {
        PredictContext {
            reader,
            mold,
            crude,
            config,
            node: mold.find_by_path(&["记录".to_string()]),
            columns: vec![
                "项目".to_string(),
                "金额".to_string(),
                "年度".to_string(),
            ],
            parent_answers: &[],
        }
    }

    fn trained_model() -> RowTable {
        let mut model = RowTable::new(ModelOptions::named("table_row")).unwrap();
        let mut items = Counter::new();
        items.add(feature_key(&["项目"]));
        model.model_data.insert("项目".to_string(), items);
        let mut amounts = Counter::new();
        amounts.add(feature_key(&["金额（万元）"]));
        model.model_data.insert("金额".to_string(), amounts);
        model
    }

    #[test]
    fn test_one_answer_per_body_row() {
        let mold = mock_mold();
        let config = Config::default();
        let crude = CrudeStore::default();
        let reader = DirReader::new(std::sync::Arc::new(DirDocument::default()));
        let ctx = mock_ctx(&reader, &mold, &crude, &config);
        let model = trained_model();

        let candidate = mock_table(vec![
            mock_cell(0, 0, "项目"),
            mock_cell(0, 1, "金额（万元）"),
            mock_cell(1, 0, "营业收入"),
            mock_cell(1, 1, "1,234.56"),
            mock_cell(2, 0, "净利润"),
            mock_cell(2, 1, "789.01"),
        ]);
        let answers = model.predict(&[candidate], &ctx).unwrap();
        assert_eq!(answers.len(), 2);
        assert_eq!(answers[0]["项目"][0].text(), "营业收入");
        assert_eq!(answers[0]["金额"][0].text(), "1,234.56");
        assert_eq!(answers[1]["项目"][0].text(), "净利润");
    }

    #[test]
    fn test_train_then_predict_round_trip() {
        use crate::predictor::{LabeledAnswer, LabeledBox};

        let mold = mock_mold();
        let config = Config::default();
        let crude = CrudeStore::default();
        let candidate = mock_table(vec![
            mock_cell(0, 0, "项目"),
            mock_cell(0, 1, "金额（万元）"),
            mock_cell(1, 0, "营业收入"),
            mock_cell(1, 1, "1,234.56"),
            mock_cell(2, 0, "净利润"),
            mock_cell(2, 1, "789.01"),
        ]);
        let doc = Arc::new(DirDocument {
            tables: vec![(*candidate.element).clone()],
            ..Default::default()
        });

        // one labeled value cell in the 金额 column
        let mut labeled = IndexMap::new();
        labeled.insert(
            "金额".to_string(),
            vec![LabeledAnswer {
                element_index: Some(ElementId::whole(6)),
                boxes: vec![LabeledBox {
                    page: 0,
                    outline: Outline::new(100.0, 20.0, 200.0, 40.0),
                    text: "1,234.56".to_string(),
                }],
                value: None,
            }],
        );
        let mut model = RowTable::new(ModelOptions::named("table_row")).unwrap();
        model
            .train(
                &[DatasetItem {
                    name: "labeled_doc".to_string(),
                    doc: Arc::clone(&doc),
                    answers: labeled,
                }],
                &mold,
            )
            .unwrap();
        assert!(model.model_data.contains_key("金额"));

        let reader = DirReader::new(doc);
        let ctx = mock_ctx(&reader, &mold, &crude, &config);
        let answers = model.predict(&[candidate], &ctx).unwrap();
        assert_eq!(answers.len(), 2);
        assert_eq!(answers[0]["金额"][0].text(), "1,234.56");
        assert_eq!(answers[1]["金额"][0].text(), "789.01");
    }

    #[test]
    fn test_mid_row_date_tags_year_column() {
        let mold = mock_mold();
        let config = Config::default();
        let crude = CrudeStore::default();
        let reader = DirReader::new(std::sync::Arc::new(DirDocument::default()));
        let ctx = mock_ctx(&reader, &mold, &crude, &config);
        let model = trained_model();

        let candidate = mock_table(vec![
            mock_cell(0, 0, "项目"),
            mock_cell(0, 1, "金额（万元）"),
            mock_cell(1, 0, "2023年度"),
            mock_dummy(1, 1),
            mock_cell(2, 0, "营业收入"),
            mock_cell(2, 1, "1,234.56"),
        ]);
        let answers = model.predict(&[candidate], &ctx).unwrap();
        // the mid-row is a tag, not a data row
        assert_eq!(answers.len(), 1);
        assert_eq!(answers[0]["年度"][0].text(), "2023年度");
    }
}
