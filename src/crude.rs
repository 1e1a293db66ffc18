//! Read-only crude-answer store.
//!
//! Upstream ranking produces, for each schema path, a shortlist of
//! candidate elements with scores. Predictors start from this shortlist;
//! the store itself is never mutated here.

use crate::dir::ElementId;
use crate::error::{Error, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Candidates kept per path when the caller gives no limit.
pub const DEFAULT_CANDIDATE_LIMIT: usize = 10;

/// Score bonus for child-path candidates named in the priors list.
const PRIOR_BONUS: f64 = 1.0;

/// One shortlisted element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrudeCandidate {
    /// Candidate element
    pub element_index: ElementId,
    /// Ranker score
    pub score: f64,
    /// Position among equal scores, when the ranker recorded one
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub ordering: Option<i64>,
}

/// The per-path candidate shortlists of one document.
#[derive(Debug, Clone, Default)]
pub struct CrudeStore {
    answers: IndexMap<String, Vec<CrudeCandidate>>,
}

impl CrudeStore {
    /// Wrap parsed shortlists.
    pub fn new(answers: IndexMap<String, Vec<CrudeCandidate>>) -> Self {
        CrudeStore { answers }
    }

    /// Parse the `path → [{element_index, score}]` JSON map.
    pub fn from_json(raw: &str) -> Result<CrudeStore> {
        let answers = serde_json::from_str(raw)
            .map_err(|e| Error::InvalidDir(format!("crude answers: {}", e)))?;
        Ok(CrudeStore { answers })
    }

    /// Shortlist for one `-`-joined path, empty when absent.
    pub fn candidates(&self, path: &str) -> &[CrudeCandidate] {
        self.answers.get(path).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Whether any shortlist exists.
    pub fn is_empty(&self) -> bool {
        self.answers.is_empty()
    }

    /// Stored paths in input order.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.answers.keys().map(String::as_str)
    }

    /// Candidates for a schema path in priority order.
    ///
    /// Exact-path matches come first; candidates under child paths whose
    /// last segment is listed in `priors` follow with a score bonus. The
    /// merged list is sorted by score descending, de-duplicated by
    /// element, and capped at `limit`.
    pub fn element_candidates(
        &self,
        path: &[String],
        priors: &[String],
        limit: usize,
    ) -> Vec<CrudeCandidate> {
        let exact = path.join("-");
        let mut pool: Vec<CrudeCandidate> = self.candidates(&exact).to_vec();

        let prefix = if exact.is_empty() {
            String::new()
        } else {
            format!("{}-", exact)
        };
        for (key, candidates) in &self.answers {
            if *key == exact || !key.starts_with(&prefix) {
                continue;
            }
            let last = key.rsplit('-').next().unwrap_or("");
            if !priors.iter().any(|p| p == last) {
                continue;
            }
            for candidate in candidates {
                let mut boosted = candidate.clone();
                boosted.score += PRIOR_BONUS;
                pool.push(boosted);
            }
        }

        pool.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        let mut seen: Vec<ElementId> = Vec::new();
        let mut out = Vec::new();
        for candidate in pool {
            if seen.contains(&candidate.element_index) {
                continue;
            }
            seen.push(candidate.element_index);
            out.push(candidate);
            if out.len() >= limit {
                break;
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(index: i64, score: f64) -> CrudeCandidate {
        CrudeCandidate {
            element_index: ElementId::whole(index),
            score,
            ordering: None,
        }
    }

    fn mock_store() -> CrudeStore {
        let mut answers = IndexMap::new();
        answers.insert(
            "募集资金".to_string(),
            vec![candidate(12, 0.9), candidate(30, 0.4)],
        );
        answers.insert(
            "募集资金-数值".to_string(),
            vec![candidate(12, 0.8), candidate(45, 0.7)],
        );
        answers.insert(
            "募集资金-单位".to_string(),
            vec![candidate(60, 0.95)],
        );
        CrudeStore::new(answers)
    }

    #[test]
    fn test_exact_path_only_without_priors() {
        let store = mock_store();
        let found = store.element_candidates(&["募集资金".to_string()], &[], 10);
        let indices: Vec<i64> = found.iter().map(|c| c.element_index.whole_index()).collect();
        assert_eq!(indices, vec![12, 30]);
    }

    #[test]
    fn test_priors_add_boosted_children() {
        let store = mock_store();
        let found = store.element_candidates(
            &["募集资金".to_string()],
            &["数值".to_string()],
            10,
        );
        let indices: Vec<i64> = found.iter().map(|c| c.element_index.whole_index()).collect();
        // boosted children outrank the exact matches; element 12 kept once
        assert_eq!(indices, vec![12, 45, 30]);
        assert!(found[0].score > 1.0);
    }

    #[test]
    fn test_limit_caps_results() {
        let store = mock_store();
        let found = store.element_candidates(&["募集资金".to_string()], &[], 1);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].element_index.whole_index(), 12);
    }

    #[test]
    fn test_from_json_round_trip() {
        let raw = r#"{"发行人名称": [{"element_index": 3, "score": 0.5}]}"#;
        let store = CrudeStore::from_json(raw).unwrap();
        let found = store.candidates("发行人名称");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].element_index, ElementId::whole(3));
        assert_eq!(found[0].score, 0.5);
    }
}
