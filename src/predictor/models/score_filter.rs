//! Crude-score passthrough.
//!
//! Where the upstream ranker alone is authoritative, this model emits
//! the top candidate (or all of them under `multi`) as a whole-element
//! answer, filtered by the score threshold.

use super::{element_result, single_answer};
use crate::error::Result;
use crate::predictor::{
    filter_candidates, Candidate, ColumnAnswer, ColumnModel, ModelData, ModelOptions,
    PredictContext,
};

/// See the module docs.
pub struct ScoreFilter {
    options: ModelOptions,
    model_data: ModelData,
}

impl ScoreFilter {
    /// Build from options.
    pub fn new(options: ModelOptions) -> Result<Self> {
        Ok(ScoreFilter {
            options,
            model_data: ModelData::new(),
        })
    }
}

impl ColumnModel for ScoreFilter {
    fn name(&self) -> &str {
        "score_filter"
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
        let mut out = Vec::new();
        for candidate in filter_candidates(&self.options, candidates, ctx)? {
            if candidate.score < threshold {
                continue;
            }
            out.push(single_answer(column, element_result(&candidate)));
            if !self.options.multi {
                break;
            }
            if let Some(limit) = self.options.multi_elements_limit {
                if out.len() >= limit {
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
            out.push(single_answer(column, element_result(candidate)));
        }
        Ok(out)
    }
}
