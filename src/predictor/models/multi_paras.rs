//! Multi-paragraph extractor.
//!
//! Emits every crude candidate paragraph above the threshold. When a
//! candidate is the head of a cross-page run, the stitched chars of the
//! whole run come along; fragments of a run already answered are
//! skipped so a span is never emitted twice.

use super::single_answer;
use crate::answer::{PredictorResult, Variant, VariantKind};
use crate::error::Result;
use crate::predictor::{
    filter_candidates, Candidate, ColumnAnswer, ColumnModel, ModelData, ModelOptions,
    PredictContext,
};
use std::rc::Rc;

/// See the module docs.
pub struct MultiParas {
    options: ModelOptions,
    model_data: ModelData,
}

impl MultiParas {
    /// Build from options.
    pub fn new(options: ModelOptions) -> Result<Self> {
        Ok(MultiParas {
            options,
            model_data: ModelData::new(),
        })
    }
}

impl ColumnModel for MultiParas {
    fn name(&self) -> &str {
        "multi_paras"
    }

    fn options(&self) -> &ModelOptions {
        &self.options
    }

    fn model_data(&self) -> &ModelData {
        &self.model_data
    }

    fn predict(&self, candidates: &[Candidate], ctx: &PredictContext) -> Result<Vec<ColumnAnswer>> {
        let column = match ctx.columns.first() {
            Some(c) => c.as_str(),
            None => ctx.node.name(),
        };
        let threshold = self.options.threshold_for(column);
        let limit = self.options.multi_elements_limit.unwrap_or(usize::MAX);

        let mut answered_runs: Vec<i64> = Vec::new();
        let mut out = Vec::new();
        for candidate in filter_candidates(&self.options, candidates, ctx)? {
            if candidate.score < threshold {
                continue;
            }
            if !candidate.element.is_paragraph_like() {
                continue;
            }
            // a fragment's head already carries the stitched run
            let element = if candidate.element.fragment {
                match run_head(ctx, &candidate) {
                    Some(head) => head,
                    None => continue,
                }
            } else {
                Rc::clone(&candidate.element)
            };
            let run_id = element.index.whole_index();
            if answered_runs.contains(&run_id) {
                continue;
            }
            answered_runs.push(run_id);

            out.push(single_answer(
                column,
                PredictorResult::single(Variant::new(VariantKind::Paragraph {
                    chars: element.chars.clone(),
                    element,
                }))
                .with_score(candidate.score),
            ));
            if !self.options.multi {
                break;
            }
            if out.len() >= limit {
                break;
            }
        }
        Ok(out)
    }
}

fn run_head(ctx: &PredictContext, candidate: &Candidate) -> Option<Rc<crate::dir::Element>> {
    let merged = candidate.element.page_merged_paragraph.as_ref()?;
    let head = *merged.paragraph_indices.first()?;
    ctx.reader.find_element_by_index(head).map(|(_, e)| e)
}
