//! Syllabus (table-of-contents) queries.
//!
//! Syllabus entries form a tree by `parent`/`children` and each node covers
//! a half-open range of element indices. Predictors locate chapters either
//! by containment (which syllabuses cover element `i`) or by pattern chains
//! over cleaned titles.

use crate::dir::model::Syllabus;
use crate::text::{clear_syl_title, Pattern};
use lazy_static::lazy_static;
use regex::Regex;

/// Traversal order for pattern searches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyllabusOrder {
    /// Document order (syllabus index) — the default
    #[default]
    Index,
    /// Shallow nodes first
    Level,
}

lazy_static! {
    static ref P_CONTINUED_CHAPTER: Regex = Regex::new(r"\(?续\)?$").unwrap();
}

/// A chapter title that merely continues the previous one across a page
/// break, e.g. `"主要财务数据（续）"`.
pub fn is_continued_chapter(title: &str) -> bool {
    P_CONTINUED_CHAPTER.is_match(&clear_syl_title(title))
}

/// Read-only query view over a document's syllabus list.
pub struct SyllabusReader<'a> {
    syllabuses: &'a [Syllabus],
}

impl<'a> SyllabusReader<'a> {
    /// Wrap a syllabus list.
    pub fn new(syllabuses: &'a [Syllabus]) -> Self {
        SyllabusReader { syllabuses }
    }

    /// Node by syllabus index.
    pub fn get(&self, index: i64) -> Option<&'a Syllabus> {
        self.syllabuses.iter().find(|s| s.index == index)
    }

    /// All nodes.
    pub fn all(&self) -> &'a [Syllabus] {
        self.syllabuses
    }

    /// Root nodes (no parent), in document order.
    pub fn roots(&self) -> Vec<&'a Syllabus> {
        self.syllabuses
            .iter()
            .filter(|s| s.parent_index().is_none())
            .collect()
    }

    /// Every syllabus whose range contains `element_index`, ascending by
    /// index (outermost first). The syllabus whose own title paragraph is
    /// `element_index` is excluded unless `include_self`.
    pub fn find_by_elt_index(&self, element_index: i64, include_self: bool) -> Vec<&'a Syllabus> {
        let mut found: Vec<&Syllabus> = self
            .syllabuses
            .iter()
            .filter(|s| s.covers(element_index))
            .filter(|s| include_self || s.element != element_index)
            .collect();
        found.sort_by_key(|s| s.index);
        found
    }

    /// Ancestor chain from the root down to (and including) `syl`.
    pub fn full_syll_path(&self, syl: &'a Syllabus) -> Vec<&'a Syllabus> {
        let mut path = vec![syl];
        let mut current = syl;
        while let Some(parent_idx) = current.parent_index() {
            match self.get(parent_idx) {
                Some(parent) => {
                    path.push(parent);
                    current = parent;
                }
                None => break,
            }
        }
        path.reverse();
        path
    }

    /// Direct children of a node, in document order.
    pub fn children(&self, syl: &Syllabus) -> Vec<&'a Syllabus> {
        syl.children.iter().filter_map(|&i| self.get(i)).collect()
    }

    /// Descendants of a node, optionally cut off below `max_level`.
    pub fn descendants(&self, syl: &Syllabus, max_level: Option<i64>) -> Vec<&'a Syllabus> {
        let mut out = Vec::new();
        let mut stack: Vec<&Syllabus> = self.children(syl);
        stack.reverse();
        while let Some(node) = stack.pop() {
            if let Some(limit) = max_level {
                if node.level > limit {
                    continue;
                }
            }
            out.push(node);
            let mut kids = self.children(node);
            kids.reverse();
            stack.append(&mut kids);
        }
        out
    }

    /// Depth-first pattern chain.
    ///
    /// The head pattern is matched against each candidate's cleaned title
    /// (every syllabus by default); on a match the tail recurses into that
    /// node's children. With a single pattern this degenerates into a
    /// whole-document title search. Matches are returned in traversal
    /// order.
    pub fn find_by_pattern(
        &self,
        patterns: &[Pattern],
        order: SyllabusOrder,
        reverse: bool,
    ) -> Vec<&'a Syllabus> {
        if patterns.is_empty() {
            return Vec::new();
        }
        let mut candidates: Vec<&Syllabus> = self.syllabuses.iter().collect();
        match order {
            SyllabusOrder::Index => candidates.sort_by_key(|s| s.index),
            SyllabusOrder::Level => candidates.sort_by_key(|s| (s.level, s.index)),
        }
        if reverse {
            candidates.reverse();
        }
        let mut out = Vec::new();
        self.match_chain(patterns, &candidates, &mut out);
        out
    }

    fn match_chain(
        &self,
        patterns: &[Pattern],
        candidates: &[&'a Syllabus],
        out: &mut Vec<&'a Syllabus>,
    ) {
        let (head, tail) = match patterns.split_first() {
            Some(split) => split,
            None => return,
        };
        for candidate in candidates {
            if !head.matches(&clear_syl_title(&candidate.title)) {
                continue;
            }
            if tail.is_empty() {
                if !out.iter().any(|s| s.index == candidate.index) {
                    out.push(candidate);
                }
            } else {
                let children = self.children(candidate);
                self.match_chain(tail, &children, out);
            }
        }
    }

    /// Like [`find_by_pattern`](Self::find_by_pattern), but returns the full
    /// ancestor chain of the first match and may descend through a
    /// non-matching level when the intervening node is not a continued
    /// chapter (`"…（续）"` repeats the parent across a page break and must
    /// not be skipped through).
    pub fn find_syllabus_by_patterns(&self, patterns: &[Pattern]) -> Vec<&'a Syllabus> {
        if patterns.is_empty() {
            return Vec::new();
        }
        let candidates: Vec<&Syllabus> = self.syllabuses.iter().collect();
        self.chain_with_descent(patterns, &candidates)
            .map(|syl| self.full_syll_path(syl))
            .unwrap_or_default()
    }

    fn chain_with_descent(
        &self,
        patterns: &[Pattern],
        candidates: &[&'a Syllabus],
    ) -> Option<&'a Syllabus> {
        let (head, tail) = patterns.split_first()?;
        for candidate in candidates {
            let cleaned = clear_syl_title(&candidate.title);
            if head.matches(&cleaned) {
                if tail.is_empty() {
                    return Some(candidate);
                }
                let children = self.children(candidate);
                if let Some(found) = self.chain_with_descent(tail, &children) {
                    return Some(found);
                }
            } else if !is_continued_chapter(&candidate.title) {
                // descend without consuming the pattern
                let children = self.children(candidate);
                if children.is_empty() {
                    continue;
                }
                if let Some(found) = self.chain_with_descent(patterns, &children) {
                    return Some(found);
                }
            }
        }
        None
    }

    /// Equality or substring match on cleaned titles.
    pub fn find_by_clear_title(&self, title: &str, contains: bool) -> Vec<&'a Syllabus> {
        let target = clear_syl_title(title);
        self.syllabuses
            .iter()
            .filter(|s| {
                let cleaned = clear_syl_title(&s.title);
                if contains {
                    cleaned.contains(&target)
                } else {
                    cleaned == target
                }
            })
            .collect()
    }
}
