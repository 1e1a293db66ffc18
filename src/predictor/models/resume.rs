//! Parent-driven biography lookup.
//!
//! A two-level extractor: the parent column has already produced a
//! short text, typically a person's name from a roster table, and this
//! model finds the body paragraph that begins with that text. With
//! `multi_elements` the whole enclosing section is emitted alongside
//! the matched paragraph.

use crate::answer::{PredictorResult, Variant, VariantKind};
use crate::dir::{Element, ElementClass, SyllabusOutlineOptions};
use crate::error::Result;
use crate::predictor::{Candidate, ColumnAnswer, ColumnModel, ModelData, ModelOptions, PredictContext};
use crate::text::clean_txt;
use log::debug;
use std::rc::Rc;

/// See the module docs.
pub struct Resume {
    options: ModelOptions,
    model_data: ModelData,
}

impl Resume {
    /// Build from options.
    pub fn new(options: ModelOptions) -> Result<Self> {
        Ok(Resume {
            options,
            model_data: ModelData::new(),
        })
    }

    /// The first body paragraph whose cleaned text starts with `name`.
    fn find_opening(&self, ctx: &PredictContext, name: &str) -> Option<Rc<Element>> {
        ctx.reader
            .elements_iter(|class, element| {
                class == ElementClass::Paragraph
                    && !element.fragment
                    && clean_txt(&element.text).starts_with(name)
            })
            .into_iter()
            .map(|(_, e)| e)
            .next()
    }
}

impl ColumnModel for Resume {
    fn name(&self) -> &str {
        "resume"
    }

    fn options(&self) -> &ModelOptions {
        &self.options
    }

    fn model_data(&self) -> &ModelData {
        &self.model_data
    }

    fn predict(&self, _candidates: &[Candidate], ctx: &PredictContext) -> Result<Vec<ColumnAnswer>> {
        let column = match ctx.columns.first() {
            Some(c) => c.as_str(),
            None => ctx.node.name(),
        };
        let mut out = Vec::new();
        for parent in ctx.parent_answers {
            let name = clean_txt(&parent.text());
            if name.is_empty() {
                continue;
            }
            let opening = match self.find_opening(ctx, &name) {
                Some(found) => found,
                None => {
                    debug!("no resume paragraph opens with {}", name);
                    continue;
                }
            };
            let mut result = PredictorResult::single(Variant::new(VariantKind::Paragraph {
                chars: opening.chars.clone(),
                element: Rc::clone(&opening),
            }))
            .with_score(1.0);

            if self.options.multi_elements {
                // the whole enclosing section, the matched paragraph included
                let chain = ctx
                    .reader
                    .syllabus()
                    .find_by_elt_index(opening.index.whole_index(), false);
                if let Some(syl) = chain.last() {
                    let regions = ctx
                        .reader
                        .syllabus_outline(syl, &SyllabusOutlineOptions::default());
                    if !regions.is_empty() {
                        result.merge(
                            PredictorResult::single(Variant::new(VariantKind::OutlineRegion {
                                regions,
                                text: None,
                            }))
                            .with_score(1.0),
                        );
                    }
                }
            }
            out.push(super::single_answer(column, result));
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::crude::CrudeStore;
    use crate::dir::{Char, DirDocument, DirReader, ElementId};
    use crate::geometry::Outline;
    use crate::schema::Mold;
    use std::sync::Arc;

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
                mock_paragraph(0, "董事会成员简历"),
                mock_paragraph(1, "张三先生，1970年生，现任董事长。"),
                mock_paragraph(2, "李四先生，1980年生，现任总经理。"),
            ],
            ..Default::default()
        })
    }

    fn mock_mold() -> Mold {
        Mold::from_json(
            r#"{"schemas": [{"name": "董事", "orders": ["简历"],
                "schema": {"简历": {"type": "文本", "multi": false, "required": false, "words": ""}}}],
               "schema_types": []}"#,
        )
        .unwrap()
    }

    #[test]
    fn test_parent_name_selects_opening_paragraph() {
        let mold = mock_mold();
        let config = Config::default();
        let crude = CrudeStore::default();
        let reader = DirReader::new(mock_doc());
        let parent = {
            let mut result = PredictorResult::new(Vec::new());
            result.text = Some("李四".to_string());
            result
        };
        let parents = vec![parent];
        let ctx = PredictContext {
            reader: &reader,
            mold: &mold,
            crude: &crude,
            config: &config,
            node: mold.find_by_path(&["简历".to_string()]),
            columns: vec!["简历".to_string()],
            parent_answers: &parents,
        };
        let model = Resume::new(ModelOptions::named("resume")).unwrap();
        let answers = model.predict(&[], &ctx).unwrap();
        assert_eq!(answers.len(), 1);
        assert_eq!(
            answers[0]["简历"][0].text(),
            "李四先生，1980年生，现任总经理。"
        );
    }

    #[test]
    fn test_unmatched_parent_yields_nothing() {
        let mold = mock_mold();
        let config = Config::default();
        let crude = CrudeStore::default();
        let reader = DirReader::new(mock_doc());
        let parents = vec![{
            let mut result = PredictorResult::new(Vec::new());
            result.text = Some("王五".to_string());
            result
        }];
        let ctx = PredictContext {
            reader: &reader,
            mold: &mold,
            crude: &crude,
            config: &config,
            node: mold.find_by_path(&["简历".to_string()]),
            columns: vec!["简历".to_string()],
            parent_answers: &parents,
        };
        let model = Resume::new(ModelOptions::named("resume")).unwrap();
        let answers = model.predict(&[], &ctx).unwrap();
        assert!(answers.is_empty());
    }
}
