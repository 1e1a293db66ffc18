//! Whole-chapter locator.
//!
//! Training counts the cleaned syllabus-title path (root to leaf,
//! joined with `"|"`) above each labeled answer. Prediction walks the
//! learned paths by frequency, resolves them against the document's
//! own table of contents, and emits the chapter: with two columns the
//! first gets the title paragraph and the second the concatenated
//! content regions, with one column only the content.

use crate::answer::{PredictorResult, Variant, VariantKind};
use crate::dir::{DirReader, Syllabus, SyllabusOutlineOptions};
use crate::error::Result;
use crate::predictor::{
    find_labeled_element, Candidate, ColumnAnswer, ColumnModel, Counter, DatasetItem, ModelData,
    ModelOptions, PredictContext,
};
use crate::schema::Mold;
use crate::text::{clear_syl_title, Pattern, PatternSet};
use log::debug;
use std::sync::Arc;

/// See the module docs.
pub struct Chapter {
    options: ModelOptions,
    model_data: ModelData,
}

impl Chapter {
    /// Build from options.
    pub fn new(options: ModelOptions) -> Result<Self> {
        Ok(Chapter {
            options,
            model_data: ModelData::new(),
        })
    }

    /// Learned title paths by descending frequency, with their share of
    /// all observations.
    fn learned_paths(&self, column: &str) -> Vec<(String, f64)> {
        let counter = match self.model_data.get(column) {
            Some(counter) => counter,
            None => return Vec::new(),
        };
        let total: u64 = counter.iter().map(|(_, n)| n).sum();
        if total == 0 {
            return Vec::new();
        }
        counter
            .most_common()
            .into_iter()
            .map(|(path, n)| (path.to_string(), n as f64 / total as f64))
            .collect()
    }

    /// Resolve one learned path against the document's syllabus tree; the
    /// matched chapter is the tail of the returned ancestor chain.
    fn locate<'a>(&self, reader: &'a DirReader, path: &str) -> Option<&'a Syllabus> {
        let segments: Vec<&str> = path.split('|').filter(|s| !s.is_empty()).collect();
        if segments.is_empty() {
            return None;
        }
        let patterns: Vec<Pattern> = if self.options.keep_parent {
            segments.iter().map(|s| Pattern::literal(s)).collect()
        } else {
            vec![Pattern::literal(segments[segments.len() - 1])]
        };
        reader
            .syllabus()
            .find_syllabus_by_patterns(&patterns)
            .last()
            .copied()
    }

    fn chapter_answer(
        &self,
        ctx: &PredictContext,
        syl: &Syllabus,
        score: f64,
    ) -> Result<Option<ColumnAnswer>> {
        let outline_options = SyllabusOutlineOptions {
            include_title: self.options.include_title,
            stop_patterns: PatternSet::compile(&self.options.stop_patterns)?,
            exclude_patterns: PatternSet::compile(&self.options.exclude_patterns)?,
            aim_types: if self.options.aim_types.is_empty() {
                None
            } else {
                Some(self.options.aim_types.clone())
            },
        };
        let regions = ctx.reader.syllabus_outline(syl, &outline_options);
        if regions.is_empty() {
            return Ok(None);
        }
        let content = PredictorResult::single(Variant::new(VariantKind::OutlineRegion {
            regions,
            text: None,
        }))
        .with_score(score);

        let mut answer = ColumnAnswer::new();
        match ctx.columns.as_slice() {
            [title_column, content_column, ..] => {
                if let Some((_, element)) = ctx
                    .reader
                    .find_element_by_index(crate::dir::ElementId::whole(syl.element))
                {
                    let title = PredictorResult::single(Variant::new(VariantKind::Paragraph {
                        chars: element.chars.clone(),
                        element,
                    }))
                    .with_score(score);
                    answer.insert(title_column.clone(), vec![title]);
                }
                answer.insert(content_column.clone(), vec![content]);
            }
            [only] => {
                answer.insert(only.clone(), vec![content]);
            }
            [] => {
                answer.insert(ctx.node.name().to_string(), vec![content]);
            }
        }
        Ok(Some(answer))
    }
}

impl ColumnModel for Chapter {
    fn name(&self) -> &str {
        "chapter"
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
                    // innermost enclosing chapter
                    let chain = reader
                        .syllabus()
                        .find_by_elt_index(element.index.whole_index(), true);
                    let leaf = match chain.last() {
                        Some(leaf) => *leaf,
                        None => continue,
                    };
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
            debug!("chapter trained on {}", item.name);
        }
        Ok(())
    }

    fn predict(&self, candidates: &[Candidate], ctx: &PredictContext) -> Result<Vec<ColumnAnswer>> {
        let column = match ctx.columns.first() {
            Some(c) => c.as_str(),
            None => ctx.node.name(),
        };
        let mut located: Vec<(&Syllabus, f64)> = Vec::new();
        for (path, share) in self.learned_paths(column) {
            if let Some(syl) = self.locate(ctx.reader, &path) {
                if !located.iter().any(|(s, _)| s.index == syl.index) {
                    located.push((syl, share));
                }
            }
            if self.options.only_first && !located.is_empty() {
                break;
            }
        }
        if located.is_empty() && !self.options.syllabus_regs.is_empty() {
            let mut patterns = Vec::with_capacity(self.options.syllabus_regs.len());
            for raw in &self.options.syllabus_regs {
                patterns.push(Pattern::regex(raw)?);
            }
            let chain = ctx.reader.syllabus().find_syllabus_by_patterns(&patterns);
            if let Some(&syl) = chain.last() {
                located.push((syl, 1.0));
            }
        }
        if located.is_empty() {
            // untrained and unconfigured: the crude shortlist's enclosing
            // chapters are still a usable guess
            for candidate in candidates {
                let chain = ctx
                    .reader
                    .syllabus()
                    .find_by_elt_index(candidate.element.index.whole_index(), true);
                if let Some(&syl) = chain.last() {
                    if !located.iter().any(|(s, _)| s.index == syl.index) {
                        located.push((syl, candidate.score));
                    }
                }
            }
        }

        let mut out = Vec::new();
        for (syl, score) in located {
            if let Some(answer) = self.chapter_answer(ctx, syl, score)? {
                out.push(answer);
            }
            if !self.options.multi {
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
    use crate::dir::{Char, DirDocument, Element, ElementId};
    use crate::geometry::Outline;
    use std::sync::Arc;

    fn mock_paragraph(index: i64, page: i64, text: &str) -> Element {
        let chars: Vec<Char> = text
            .chars()
            .enumerate()
            .map(|(i, c)| Char {
                page,
                outline: Outline::new(10.0 * i as f64, 40.0, 10.0 * (i + 1) as f64, 50.0),
                text: c.to_string(),
            })
            .collect();
        Element {
            index: ElementId::whole(index),
            page,
            outline: Outline::new(0.0, 40.0, 10.0 * text.chars().count() as f64, 50.0),
            text: text.to_string(),
            chars,
            ..Default::default()
        }
    }

    fn mock_doc() -> Arc<DirDocument> {
        Arc::new(DirDocument {
            paragraphs: vec![
                mock_paragraph(0, 0, "第一节 发行人基本情况"),
                mock_paragraph(1, 0, "公司主营工业风机制造。"),
                mock_paragraph(2, 0, "第二节 风险因素"),
                mock_paragraph(3, 0, "市场竞争风险。"),
            ],
            syllabuses: vec![
                Syllabus {
                    index: 0,
                    title: "第一节 发行人基本情况".to_string(),
                    level: 1,
                    parent: None,
                    children: vec![],
                    element: 0,
                    range: [0, 2],
                },
                Syllabus {
                    index: 1,
                    title: "第二节 风险因素".to_string(),
                    level: 1,
                    parent: None,
                    children: vec![],
                    element: 2,
                    range: [2, 4],
                },
            ],
            ..Default::default()
        })
    }

    fn mock_mold() -> Mold {
        Mold::from_json(
            r#"{"schemas": [
                {"name": "章节", "orders": ["标题", "内容"],
                 "schema": {
                    "标题": {"type": "文本", "multi": false, "required": false, "words": ""},
                    "内容": {"type": "文本", "multi": false, "required": false, "words": ""}}}],
               "schema_types": []}"#,
        )
        .unwrap()
    }

    #[test]
    fn test_learned_title_locates_chapter() {
        let mold = mock_mold();
        let config = Config::default();
        let crude = CrudeStore::default();
        let reader = DirReader::new(mock_doc());
        let ctx = PredictContext {
            reader: &reader,
            mold: &mold,
            crude: &crude,
            config: &config,
            node: mold.root(),
            columns: vec!["标题".to_string(), "内容".to_string()],
            parent_answers: &[],
        };
        let mut model = Chapter::new(ModelOptions::named("chapter")).unwrap();
        let mut counter = Counter::new();
        counter.add("风险因素");
        model.model_data.insert("标题".to_string(), counter);

        let answers = model.predict(&[], &ctx).unwrap();
        assert_eq!(answers.len(), 1);
        assert_eq!(answers[0]["标题"][0].text(), "第二节 风险因素");
        assert_eq!(answers[0]["内容"][0].text(), "市场竞争风险。");
    }

    #[test]
    fn test_untrained_model_follows_crude_candidate() {
        let mold = mock_mold();
        let config = Config::default();
        let crude = CrudeStore::default();
        let reader = DirReader::new(mock_doc());
        let ctx = PredictContext {
            reader: &reader,
            mold: &mold,
            crude: &crude,
            config: &config,
            node: mold.root(),
            columns: vec!["标题".to_string(), "内容".to_string()],
            parent_answers: &[],
        };
        let model = Chapter::new(ModelOptions::named("chapter")).unwrap();
        let (class, element) = reader
            .find_element_by_index(ElementId::whole(3))
            .unwrap();
        let candidate = Candidate {
            element,
            class,
            score: 0.7,
        };

        let answers = model.predict(&[candidate], &ctx).unwrap();
        assert_eq!(answers.len(), 1);
        assert_eq!(answers[0]["标题"][0].text(), "第二节 风险因素");
    }
}
