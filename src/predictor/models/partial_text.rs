//! Sentence-template extractor.
//!
//! Each configured pattern declares a capture group named `dst` (or
//! `dst1`, `dst2`, … when one sentence carries several columns); the
//! captured char range becomes the answer. Matching runs over cleaned
//! text, and positions map back to the raw chars through
//! [`index_in_space_string`].

use crate::answer::{PredictorResult, Variant, VariantKind};
use crate::error::Result;
use crate::predictor::{
    filter_candidates, Candidate, ColumnAnswer, ColumnModel, ModelData, ModelOptions,
    PredictContext,
};
use crate::text::{clean_txt, index_in_space_string, PatternSet};
use regex::Regex;
use std::rc::Rc;

/// See the module docs.
pub struct PartialText {
    options: ModelOptions,
    model_data: ModelData,
    split: Option<Regex>,
    garbage: PatternSet,
}

impl PartialText {
    /// Build from options, compiling the split and garbage patterns.
    pub fn new(options: ModelOptions) -> Result<Self> {
        let split = match &options.split_pattern {
            Some(p) => Some(Regex::new(p).map_err(|source| crate::error::Error::Pattern {
                pattern: p.clone(),
                source,
            })?),
            None => None,
        };
        let garbage = PatternSet::compile(&options.garbage_patterns)?;
        Ok(PartialText {
            options,
            model_data: ModelData::new(),
            split,
            garbage,
        })
    }

    /// Capture-group name of a column: `dst` when the model answers one
    /// column, `dst1`, `dst2`, … positionally otherwise.
    fn group_name(&self, columns: &[String], position: usize) -> String {
        if columns.len() <= 1 {
            "dst".to_string()
        } else {
            format!("dst{}", position + 1)
        }
    }

    fn span_results(
        &self,
        candidate: &Candidate,
        neglect: &PatternSet,
        start: usize,
        end: usize,
    ) -> Vec<PredictorResult> {
        let element = &candidate.element;
        let cleaned = clean_txt(&element.text);
        let matched: String = cleaned.chars().skip(start).take(end - start).collect();
        let spans: Vec<(usize, String)> = match &self.split {
            Some(split) => split_spans(&matched, split, start),
            None => vec![(start, matched)],
        };

        let mut out = Vec::new();
        for (piece_start, piece) in spans {
            if piece.trim().is_empty() {
                continue;
            }
            if !neglect.is_empty() && neglect.is_match(&piece) {
                continue;
            }
            if !self.garbage.is_empty() && self.garbage.is_match(&piece) {
                continue;
            }
            let piece_end = piece_start + piece.chars().count();
            let (raw_start, raw_end) = index_in_space_string(&element.text, piece_start, piece_end);
            let chars: Vec<crate::dir::Char> = element
                .chars
                .iter()
                .skip(raw_start)
                .take(raw_end.saturating_sub(raw_start))
                .cloned()
                .collect();
            let result = PredictorResult::single(Variant::new(VariantKind::CharSpan {
                element: Some(Rc::clone(element)),
                chars,
                display_text: Some(piece),
            }))
            .with_score(candidate.score);
            out.push(result);
        }
        out
    }
}

fn split_spans(matched: &str, split: &Regex, base: usize) -> Vec<(usize, String)> {
    let mut out = Vec::new();
    let mut last = 0usize;
    for m in split.find_iter(matched) {
        if m.start() > last {
            let piece = &matched[last..m.start()];
            out.push((base + matched[..last].chars().count(), piece.to_string()));
        }
        last = m.end();
    }
    if last < matched.len() {
        out.push((base + matched[..last].chars().count(), matched[last..].to_string()));
    }
    out
}

impl ColumnModel for PartialText {
    fn name(&self) -> &str {
        "partial_text"
    }

    fn options(&self) -> &ModelOptions {
        &self.options
    }

    fn model_data(&self) -> &ModelData {
        &self.model_data
    }

    fn predict(&self, candidates: &[Candidate], ctx: &PredictContext) -> Result<Vec<ColumnAnswer>> {
        let mut out = Vec::new();
        let limit = self.options.cnt_of_res.unwrap_or(usize::MAX);
        for candidate in filter_candidates(&self.options, candidates, ctx)? {
            if !candidate.element.is_paragraph_like() {
                continue;
            }
            let cleaned = clean_txt(&candidate.element.text);
            let lead = ctx
                .columns
                .first()
                .map(String::as_str)
                .unwrap_or(ctx.node.name());
            let regs = PatternSet::compile(self.options.regs_for(lead))?;
            for caps in regs.captures_iter(&cleaned) {
                let mut answer = ColumnAnswer::new();
                for (position, column) in ctx.columns.iter().enumerate() {
                    let group = self.group_name(&ctx.columns, position);
                    let m = match caps.name(&group).or_else(|| {
                        if group == "dst" {
                            caps.get(0)
                        } else {
                            None
                        }
                    }) {
                        Some(m) => m,
                        None => continue,
                    };
                    let neglect = PatternSet::compile(self.options.neglect_patterns_for(column))?;
                    let start = cleaned[..m.start()].chars().count();
                    let end = start + m.as_str().chars().count();
                    let results = self.span_results(&candidate, &neglect, start, end);
                    if !results.is_empty() {
                        answer.insert(column.clone(), results);
                    }
                }
                if !answer.is_empty() {
                    out.push(answer);
                }
                if !self.options.multi {
                    break;
                }
            }
            if (!self.options.multi && !out.is_empty()) || out.len() >= limit {
                break;
            }
        }
        out.truncate(limit);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::crude::CrudeStore;
    use crate::dir::{Char, DirDocument, DirReader, Element, ElementClass, ElementId};
    use crate::geometry::Outline;
    use crate::schema::Mold;
    use std::sync::Arc;

    fn mock_candidate(text: &str) -> Candidate {
        let chars: Vec<Char> = text
            .chars()
            .enumerate()
            .map(|(i, c)| Char {
                page: 0,
                outline: Outline::new(10.0 * i as f64, 50.0, 10.0 * (i + 1) as f64, 60.0),
                text: c.to_string(),
            })
            .collect();
        Candidate {
            element: Rc::new(Element {
                index: ElementId::whole(3),
                text: text.to_string(),
                chars,
                class: Some(ElementClass::Paragraph),
                ..Default::default()
            }),
            class: ElementClass::Paragraph,
            score: 0.7,
        }
    }

    fn mock_mold() -> Mold {
        Mold::from_json(
            r#"{"schemas": [{"name": "发行概况", "orders": ["保荐机构"],
                "schema": {"保荐机构": {"type": "文本", "multi": false, "required": false, "words": ""}}}],
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
            node: mold.find_by_path(&["保荐机构".to_string()]),
            columns: vec!["保荐机构".to_string()],
            parent_answers: &[],
        }
    }

    #[test]
    fn test_dst_capture_becomes_char_span() {
        let mold = mock_mold();
        let config = Config::default();
        let crude = CrudeStore::default();
        let reader = DirReader::new(Arc::new(DirDocument::default()));
        let ctx = mock_ctx(&reader, &mold, &crude, &config);

        let mut options = ModelOptions::named("partial_text");
        options.regs = vec![r"保荐机构为(?P<dst>\S+?公司)".to_string()];
        let model = PartialText::new(options).unwrap();

        let candidate = mock_candidate("本次发行的保荐机构为中信证券股份有限公司");
        let answers = model.predict(&[candidate], &ctx).unwrap();
        assert_eq!(answers.len(), 1);
        let result = &answers[0]["保荐机构"][0];
        assert_eq!(result.text(), "中信证券股份有限公司");
        assert_eq!(result.confidence_score(), "0.7000");
    }

    #[test]
    fn test_neglect_pattern_drops_answer() {
        let mold = mock_mold();
        let config = Config::default();
        let crude = CrudeStore::default();
        let reader = DirReader::new(Arc::new(DirDocument::default()));
        let ctx = mock_ctx(&reader, &mold, &crude, &config);

        let mut options = ModelOptions::named("partial_text");
        options.regs = vec![r"保荐机构为(?P<dst>\S+?公司)".to_string()];
        options.neglect_patterns = vec!["不适用".to_string()];
        let model = PartialText::new(options).unwrap();

        let candidate = mock_candidate("保荐机构为不适用公司");
        let answers = model.predict(&[candidate], &ctx).unwrap();
        assert!(answers.is_empty());
    }

    #[test]
    fn test_bad_neglect_pattern_surfaces_as_error() {
        let mold = mock_mold();
        let config = Config::default();
        let crude = CrudeStore::default();
        let reader = DirReader::new(Arc::new(DirDocument::default()));
        let ctx = mock_ctx(&reader, &mold, &crude, &config);

        let mut options = ModelOptions::named("partial_text");
        options.regs = vec![r"保荐机构为(?P<dst>\S+?公司)".to_string()];
        options.neglect_patterns = vec!["(".to_string()];
        let model = PartialText::new(options).unwrap();

        let candidate = mock_candidate("本次发行的保荐机构为中信证券股份有限公司");
        assert!(model.predict(&[candidate], &ctx).is_err());
    }

    #[test]
    fn test_split_pattern_yields_pieces() {
        let mold = mock_mold();
        let config = Config::default();
        let crude = CrudeStore::default();
        let reader = DirReader::new(Arc::new(DirDocument::default()));
        let ctx = mock_ctx(&reader, &mold, &crude, &config);

        let mut options = ModelOptions::named("partial_text");
        options.regs = vec![r"联席保荐机构为(?P<dst>\S+)".to_string()];
        options.split_pattern = Some("[,、和]".to_string());
        let model = PartialText::new(options).unwrap();

        let candidate = mock_candidate("联席保荐机构为中信证券、华泰联合");
        let answers = model.predict(&[candidate], &ctx).unwrap();
        let results = &answers[0]["保荐机构"];
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].text(), "中信证券");
        assert_eq!(results[1].text(), "华泰联合");
    }
}
