//! Per-element chapter extractor.
//!
//! Locates a chapter the same way [`chapter`](super::chapter) does, but
//! emits the elements of the range one by one instead of a single
//! region: paragraphs as paragraph answers, tables as whole-table
//! answers. Useful for list-shaped fields where each paragraph of a
//! section is one record.

use crate::answer::{PredictorResult, Variant, VariantKind};
use crate::dir::{DirReader, Element, ElementClass, ElementId, Syllabus};
use crate::error::Result;
use crate::predictor::{
    find_labeled_element, Candidate, ColumnAnswer, ColumnModel, Counter, DatasetItem, ModelData,
    ModelOptions, PredictContext,
};
use crate::schema::Mold;
use crate::text::{clean_txt, clear_syl_title, Pattern, PatternSet};
use log::debug;
use std::rc::Rc;
use std::sync::Arc;

/// See the module docs.
pub struct SyllabusElt {
    options: ModelOptions,
    model_data: ModelData,
    exclude: PatternSet,
}

impl SyllabusElt {
    /// Build from options, compiling the exclude patterns.
    pub fn new(options: ModelOptions) -> Result<Self> {
        let exclude = PatternSet::compile(&options.exclude_patterns)?;
        Ok(SyllabusElt {
            options,
            model_data: ModelData::new(),
            exclude,
        })
    }

    fn locate<'a>(&self, reader: &'a DirReader, column: &str) -> Vec<&'a Syllabus> {
        let mut out: Vec<&Syllabus> = Vec::new();
        if let Some(counter) = self.model_data.get(column) {
            for (path, _) in counter.most_common() {
                let segments: Vec<&str> = path.split('|').filter(|s| !s.is_empty()).collect();
                if segments.is_empty() {
                    continue;
                }
                let patterns: Vec<Pattern> = if self.options.keep_parent {
                    segments.iter().map(|s| Pattern::literal(s)).collect()
                } else {
                    vec![Pattern::literal(segments[segments.len() - 1])]
                };
                let chain = reader.syllabus().find_syllabus_by_patterns(&patterns);
                if let Some(&syl) = chain.last() {
                    if !out.iter().any(|s| s.index == syl.index) {
                        out.push(syl);
                    }
                }
                if self.options.only_first && !out.is_empty() {
                    break;
                }
            }
        }
        out
    }

    fn range_elements(&self, ctx: &PredictContext, syl: &Syllabus) -> Vec<(ElementClass, Rc<Element>)> {
        let start = if self.options.include_title {
            syl.range[0]
        } else {
            syl.range[0] + 1
        };
        let mut out = Vec::new();
        for whole in start..syl.range[1] {
            let (class, element) = match ctx.reader.find_element_by_index(ElementId::whole(whole)) {
                Some(found) => found,
                None => continue,
            };
            let class_ok = if self.options.aim_types.is_empty() {
                matches!(class, ElementClass::Paragraph | ElementClass::Table)
            } else {
                self.options.aim_types.contains(&class)
            };
            if !class_ok {
                continue;
            }
            if element.fragment {
                continue;
            }
            if !self.exclude.is_empty() && self.exclude.is_match(&clean_txt(&element.text)) {
                continue;
            }
            out.push((class, element));
        }
        if self.options.reverse {
            out.reverse();
        }
        out
    }
}

impl ColumnModel for SyllabusElt {
    fn name(&self) -> &str {
        "syllabus_elt"
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
                    let chain = reader
                        .syllabus()
                        .find_by_elt_index(element.index.whole_index(), true);
                    if let Some(leaf) = chain.last() {
                        let path: Vec<String> = reader
                            .syllabus()
                            .full_syll_path(leaf)
                            .iter()
                            .map(|s| clear_syl_title(&s.title))
                            .collect();
                        self.model_data
                            .entry(column.clone())
                            .or_insert_with(Counter::new)
                            .add(path.join("|"));
                    }
                }
            }
            debug!("syllabus_elt trained on {}", item.name);
        }
        Ok(())
    }

    fn predict(&self, _candidates: &[Candidate], ctx: &PredictContext) -> Result<Vec<ColumnAnswer>> {
        let column = match ctx.columns.first() {
            Some(c) => c.as_str(),
            None => ctx.node.name(),
        };
        let mut out = Vec::new();
        for syl in self.locate(ctx.reader, column) {
            for (class, element) in self.range_elements(ctx, syl) {
                let variant = if class == ElementClass::Table {
                    Variant::new(VariantKind::TableCells {
                        element,
                        cell_ids: Vec::new(),
                    })
                } else {
                    Variant::new(VariantKind::Paragraph {
                        chars: element.chars.clone(),
                        element,
                    })
                };
                out.push(super::single_answer(
                    column,
                    PredictorResult::single(variant).with_score(1.0),
                ));
                if !self.options.multi {
                    return Ok(out);
                }
            }
            if self.options.only_first {
                break;
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::crude::CrudeStore;
    use crate::dir::{Char, DirDocument};
    use crate::geometry::Outline;
    use crate::schema::Mold;

    fn mock_paragraph(index: i64, text: &str) -> Element {
        let chars: Vec<Char> = text
            .chars()
            .enumerate()
            .map(|(i, c)| Char {
                page: 0,
                outline: Outline::new(10.0 * i as f64, 40.0, 10.0 * (i + 1) as f64, 50.0),
                text: c.to_string(),
            })
            .collect();
        Element {
            index: ElementId::whole(index),
            text: text.to_string(),
            chars,
            ..Default::default()
        }
    }

    fn mock_doc() -> Arc<DirDocument> {
        Arc::new(DirDocument {
            paragraphs: vec![
                mock_paragraph(0, "第三节 董事会成员"),
                mock_paragraph(1, "张三，董事长。"),
                mock_paragraph(2, "李四，独立董事。"),
            ],
            syllabuses: vec![Syllabus {
                index: 0,
                title: "第三节 董事会成员".to_string(),
                level: 1,
                parent: None,
                children: vec![],
                element: 0,
                range: [0, 3],
            }],
            ..Default::default()
        })
    }

    fn mock_mold() -> Mold {
        Mold::from_json(
            r#"{"schemas": [{"name": "董事", "orders": ["简介"],
                "schema": {"简介": {"type": "文本", "multi": true, "required": false, "words": ""}}}],
               "schema_types": []}"#,
        )
        .unwrap()
    }

    #[test]
    fn test_each_range_element_is_one_answer() {
        let mold = mock_mold();
        let config = Config::default();
        let crude = CrudeStore::default();
        let reader = DirReader::new(mock_doc());
        let ctx = PredictContext {
            reader: &reader,
            mold: &mold,
            crude: &crude,
            config: &config,
            node: mold.find_by_path(&["简介".to_string()]),
            columns: vec!["简介".to_string()],
            parent_answers: &[],
        };
        let mut options = ModelOptions::named("syllabus_elt");
        options.multi = true;
        let mut model = SyllabusElt::new(options).unwrap();
        let mut counter = Counter::new();
        counter.add("董事会成员");
        model.model_data.insert("简介".to_string(), counter);

        let answers = model.predict(&[], &ctx).unwrap();
        assert_eq!(answers.len(), 2);
        assert_eq!(answers[0]["简介"][0].text(), "张三，董事长。");
        assert_eq!(answers[1]["简介"][0].text(), "李四，独立董事。");
    }

    fn mock_nested_doc() -> Arc<DirDocument> {
        Arc::new(DirDocument {
            paragraphs: vec![
                mock_paragraph(0, "第一节 发行人"),
                mock_paragraph(1, "一、基本情况"),
                mock_paragraph(2, "发行人成立于2001年。"),
                mock_paragraph(3, "第二节 保荐人"),
                mock_paragraph(4, "一、基本情况"),
                mock_paragraph(5, "保荐人为中信证券。"),
            ],
            syllabuses: vec![
                Syllabus {
                    index: 0,
                    title: "第一节 发行人".to_string(),
                    level: 1,
                    parent: None,
                    children: vec![1],
                    element: 0,
                    range: [0, 3],
                },
                Syllabus {
                    index: 1,
                    title: "一、基本情况".to_string(),
                    level: 2,
                    parent: Some(0),
                    children: vec![],
                    element: 1,
                    range: [1, 3],
                },
                Syllabus {
                    index: 2,
                    title: "第二节 保荐人".to_string(),
                    level: 1,
                    parent: None,
                    children: vec![3],
                    element: 3,
                    range: [3, 6],
                },
                Syllabus {
                    index: 3,
                    title: "一、基本情况".to_string(),
                    level: 2,
                    parent: Some(2),
                    children: vec![],
                    element: 4,
                    range: [4, 6],
                },
            ],
            ..Default::default()
        })
    }

    #[test]
    fn test_keep_parent_disambiguates_repeated_title() {
        let mold = mock_mold();
        let config = Config::default();
        let crude = CrudeStore::default();
        let reader = DirReader::new(mock_nested_doc());
        let ctx = PredictContext {
            reader: &reader,
            mold: &mold,
            crude: &crude,
            config: &config,
            node: mold.find_by_path(&["简介".to_string()]),
            columns: vec!["简介".to_string()],
            parent_answers: &[],
        };
        let mut options = ModelOptions::named("syllabus_elt");
        options.multi = true;
        options.keep_parent = true;
        let mut model = SyllabusElt::new(options).unwrap();
        let mut counter = Counter::new();
        counter.add("保荐人|基本情况");
        model.model_data.insert("简介".to_string(), counter);

        // both chapters carry a 基本情况 subsection; the parent segment
        // picks the second one
        let answers = model.predict(&[], &ctx).unwrap();
        assert_eq!(answers.len(), 1);
        assert_eq!(answers[0]["简介"][0].text(), "保荐人为中信证券。");
    }

    #[test]
    fn test_bad_exclude_pattern_fails_construction() {
        let mut options = ModelOptions::named("syllabus_elt");
        options.exclude_patterns = vec!["(".to_string()];
        assert!(SyllabusElt::new(options).is_err());
    }
}
