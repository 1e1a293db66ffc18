//! The predictor catalog.
//!
//! Each model specializes either the search space (which elements are
//! considered) or the extraction shape (how a match becomes a variant).
//! All of them go through the shared framework in [`crate::predictor`].

pub mod chapter;
pub mod fixed_position;
pub mod multi_paras;
pub mod partial_text;
pub mod remote;
pub mod resume;
pub mod score_filter;
pub mod syllabus_elt;
pub mod table_kv;
pub mod table_row;

use crate::answer::{PredictorResult, Variant, VariantKind};
use crate::predictor::{Candidate, ColumnAnswer};
use std::rc::Rc;

/// The natural whole-element variant of a candidate: the paragraph's
/// chars, or the whole table.
pub(crate) fn element_variant(candidate: &Candidate) -> Variant {
    if candidate.element.is_table() {
        Variant::new(VariantKind::TableCells {
            element: Rc::clone(&candidate.element),
            cell_ids: Vec::new(),
        })
    } else {
        Variant::new(VariantKind::Paragraph {
            element: Rc::clone(&candidate.element),
            chars: candidate.element.chars.clone(),
        })
    }
}

/// Whole-element result carrying the candidate's crude score.
pub(crate) fn element_result(candidate: &Candidate) -> PredictorResult {
    PredictorResult::single(element_variant(candidate)).with_score(candidate.score)
}

/// One-column answer map.
pub(crate) fn single_answer(column: &str, result: PredictorResult) -> ColumnAnswer {
    let mut answer = ColumnAnswer::new();
    answer.insert(column.to_string(), vec![result]);
    answer
}
