//! Fixed-location extractor.
//!
//! For fields printed at known spots — the cover page, running headers,
//! the last page's signature block. Pages and element positions are
//! configured directly (negative indices count from the end); the
//! selected elements, optionally merged with their neighbors, are
//! scanned with the configured patterns.

use super::single_answer;
use crate::answer::{PredictorResult, Variant, VariantKind};
use crate::dir::{Char, Element, ElementClass, NearByQuery};
use crate::error::Result;
use crate::predictor::{
    dst_chars, filter_candidates, resolve_pages, Candidate, ColumnAnswer, ColumnModel, ModelData,
    ModelOptions, PredictContext,
};
use crate::text::{clean_txt, dst_span, index_in_space_string, PatternSet};
use std::rc::Rc;

/// See the module docs.
pub struct FixedPosition {
    options: ModelOptions,
    model_data: ModelData,
}

impl FixedPosition {
    /// Build from options.
    pub fn new(options: ModelOptions) -> Result<Self> {
        Ok(FixedPosition {
            options,
            model_data: ModelData::new(),
        })
    }

    /// Elements at the configured pages and positions.
    fn positional_elements(&self, ctx: &PredictContext) -> Vec<Rc<Element>> {
        let pages = resolve_pages(&self.options.pages, ctx.reader);
        let mut out = Vec::new();
        for page in pages {
            let mut on_page: Vec<Rc<Element>> = ctx
                .reader
                .find_elements_by_page(page)
                .into_iter()
                .filter(|(class, _)| {
                    if self.options.aim_types.is_empty() {
                        matches!(
                            class,
                            ElementClass::Paragraph | ElementClass::PageHeader
                        )
                    } else {
                        self.options.aim_types.contains(class)
                    }
                })
                .map(|(_, e)| e)
                .collect();
            on_page.sort_by_key(|e| e.index);
            if self.options.positions.is_empty() {
                out.extend(on_page);
                continue;
            }
            for &pos in &self.options.positions {
                let resolved = if pos < 0 {
                    on_page.len().checked_sub((-pos) as usize)
                } else {
                    Some(pos as usize)
                };
                if let Some(i) = resolved {
                    if let Some(e) = on_page.get(i) {
                        out.push(Rc::clone(e));
                    }
                }
            }
        }
        out
    }

    /// The element plus its configured neighbors, in reading order.
    fn with_neighbors(&self, ctx: &PredictContext, element: &Rc<Element>) -> Vec<Rc<Element>> {
        let mut out = vec![Rc::clone(element)];
        for merge in &self.options.merge_neighbor {
            let neg_patterns = match PatternSet::compile(&merge.break_patterns) {
                Ok(set) => set,
                Err(_) => PatternSet::default(),
            };
            let query = NearByQuery {
                step: merge.step,
                amount: merge.amount,
                steprange: merge.steprange,
                neg_patterns,
                ..Default::default()
            };
            let neighbors = ctx.reader.find_elements_near_by(element.index, &query);
            if merge.step < 0 {
                for n in neighbors {
                    out.insert(0, n);
                }
            } else {
                out.extend(neighbors);
            }
        }
        out
    }

    fn scan(
        &self,
        elements: &[Rc<Element>],
        column: &str,
        score: f64,
    ) -> Result<Vec<PredictorResult>> {
        let regs = PatternSet::compile(self.options.regs_for(column))?;
        let neglect = PatternSet::compile(self.options.neglect_patterns_for(column))?;
        let mut out = Vec::new();
        for element in elements {
            if element.is_table() {
                out.extend(self.scan_table_cells(element, &regs, &neglect, score));
                continue;
            }
            if regs.is_empty() {
                let text = clean_txt(&element.text);
                if text.is_empty() || (!neglect.is_empty() && neglect.is_match(&text)) {
                    continue;
                }
                out.push(
                    PredictorResult::single(Variant::new(VariantKind::Paragraph {
                        element: Rc::clone(element),
                        chars: element.chars.clone(),
                    }))
                    .with_score(score),
                );
                continue;
            }
            let cleaned = clean_txt(&element.text);
            let caps = match regs.captures(&cleaned) {
                Some(caps) => caps,
                None => continue,
            };
            let (start, end) = dst_span(&caps, &cleaned);
            let matched: String = cleaned.chars().skip(start).take(end - start).collect();
            if matched.is_empty() || (!neglect.is_empty() && neglect.is_match(&matched)) {
                continue;
            }
            let chars = dst_chars(element, &regs).unwrap_or_default();
            out.push(
                PredictorResult::single(Variant::new(VariantKind::CharSpan {
                    element: Some(Rc::clone(element)),
                    chars,
                    display_text: Some(matched),
                }))
                .with_score(score),
            );
        }
        Ok(out)
    }

    /// Cover pages sometimes print their labels in a borderless grid, so a
    /// positioned table is scanned cell by cell as stand-alone lines.
    fn scan_table_cells(
        &self,
        element: &Rc<Element>,
        regs: &PatternSet,
        neglect: &PatternSet,
        score: f64,
    ) -> Vec<PredictorResult> {
        let mut out = Vec::new();
        if regs.is_empty() {
            return out;
        }
        for cell in element.cells.values() {
            if cell.dummy {
                continue;
            }
            let cleaned = clean_txt(&cell.text);
            let caps = match regs.captures(&cleaned) {
                Some(caps) => caps,
                None => continue,
            };
            let (start, end) = dst_span(&caps, &cleaned);
            let matched: String = cleaned.chars().skip(start).take(end - start).collect();
            if matched.is_empty() || (!neglect.is_empty() && neglect.is_match(&matched)) {
                continue;
            }
            let (raw_start, raw_end) = index_in_space_string(&cell.text, start, end);
            let chars: Vec<Char> = cell
                .chars
                .iter()
                .skip(raw_start)
                .take(raw_end.saturating_sub(raw_start))
                .cloned()
                .collect();
            out.push(
                PredictorResult::single(Variant::new(VariantKind::CharSpan {
                    element: Some(Rc::clone(element)),
                    chars,
                    display_text: Some(matched),
                }))
                .with_score(score),
            );
        }
        out
    }
}

impl ColumnModel for FixedPosition {
    fn name(&self) -> &str {
        "fixed_position"
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
        let starts: Vec<(Rc<Element>, f64)> = if self.options.pages.is_empty() {
            filter_candidates(&self.options, candidates, ctx)?
                .into_iter()
                .map(|c| (c.element, c.score))
                .collect()
        } else {
            self.positional_elements(ctx)
                .into_iter()
                .map(|e| (e, 1.0))
                .collect()
        };

        let mut out = Vec::new();
        for (element, score) in starts {
            let group = self.with_neighbors(ctx, &element);
            for result in self.scan(&group, column, score)? {
                out.push(single_answer(column, result));
                if !self.options.multi {
                    return Ok(out);
                }
            }
        }
        Ok(out)
    }
}
