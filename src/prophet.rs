//! The prophet: schema-tree orchestration of the predictor catalog.
//!
//! One prophet binds a mold to a set of configured models, runs every
//! root-level column against a document, and assembles the wire answer.
//! A failing column never aborts the run: its error is logged and the
//! column lands in the answer as an empty item with score `-1`, exactly
//! like a column no model answered. Confirmed answers supplied by the
//! caller short-circuit prediction for their column and are carried
//! through verbatim.

use crate::answer::{AnswerItem, PredictorResult};
use crate::config::Config;
use crate::crude::CrudeStore;
use crate::dir::DirReader;
use crate::error::Result;
use crate::predictor::{create_model, ColumnAnswer, ColumnModel, ModelOptions, PredictContext};
use crate::schema::{EnumType, Mold, SchemaNode, SchemaRecord};
use crate::text::{clean_txt, similarity, SIMILARITY_THRESHOLD};
use indexmap::IndexMap;
use log::{debug, warn};
use serde::{Deserialize, Serialize};

/// Wire answer version.
const ANSWER_VERSION: &str = "2.2";

/// Per-column model configuration, keyed by the column's crude path.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProphetOptions {
    /// Crude path → model options
    #[serde(default)]
    pub columns: IndexMap<String, ModelOptions>,
}

/// Answers the user already accepted, keyed by crude path. They are
/// echoed into the wire answer without re-prediction.
pub type ConfirmedAnswers = IndexMap<String, Vec<PredictorResult>>;

/// The `schema` envelope of the wire answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireSchema {
    /// Schema records of the mold
    pub schemas: Vec<SchemaRecord>,
    /// Enumeration types of the mold
    pub schema_types: Vec<EnumType>,
    /// Mold checksum
    pub version: String,
}

/// The `userAnswer` envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserAnswer {
    /// Wire format version
    pub version: String,
    /// One item per answer, plus an empty item per unanswered leaf
    pub items: Vec<AnswerItem>,
}

/// The complete wire answer of one document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireAnswer {
    /// Mold echo
    pub schema: WireSchema,
    /// Predicted items
    #[serde(rename = "userAnswer")]
    pub user_answer: UserAnswer,
}

/// See the module docs.
pub struct Prophet<'a> {
    mold: &'a Mold,
    config: &'a Config,
    models: IndexMap<String, Box<dyn ColumnModel>>,
    options: ProphetOptions,
}

impl<'a> Prophet<'a> {
    /// Instantiate the configured models. Columns without configuration
    /// fall back to the crude-score passthrough at predict time.
    pub fn new(mold: &'a Mold, config: &'a Config, options: ProphetOptions) -> Result<Self> {
        let mut models = IndexMap::new();
        for (path, column_options) in &options.columns {
            models.insert(path.clone(), create_model(column_options.clone())?);
        }
        Ok(Prophet {
            mold,
            config,
            models,
            options,
        })
    }

    /// Attach a trained or transport-carrying model to a column,
    /// replacing the one built from options.
    pub fn set_model(&mut self, path: impl Into<String>, model: Box<dyn ColumnModel>) {
        self.models.insert(path.into(), model);
    }

    fn model_for(&self, path: &str) -> Result<&dyn ColumnModel> {
        if let Some(model) = self.models.get(path) {
            return Ok(model.as_ref());
        }
        Err(crate::error::Error::Predictor {
            model: "score_filter".to_string(),
            reason: format!("no model bound for {}", path),
        })
    }

    /// Predict every root-level column and assemble the wire answer.
    pub fn predict(
        &mut self,
        reader: &DirReader,
        crude: &CrudeStore,
        confirmed: &ConfirmedAnswers,
    ) -> Result<WireAnswer> {
        // bind fallbacks for unconfigured root columns up front
        let fallback_paths: Vec<String> = self
            .mold
            .children(self.mold.root())
            .iter()
            .map(|c| c.crude_path())
            .filter(|p| !self.models.contains_key(p) && !confirmed.contains_key(p))
            .collect();
        for path in fallback_paths {
            debug!("column {} has no model, using score_filter", path);
            self.models
                .insert(path, create_model(ModelOptions::named("score_filter"))?);
        }

        let mut items: Vec<AnswerItem> = Vec::new();
        let children: Vec<&SchemaNode> = self.mold.children(self.mold.root());
        for child in children {
            let path = child.crude_path();
            if let Some(results) = confirmed.get(&path) {
                for result in results {
                    let mut result = result.clone();
                    for variant in &mut result.data {
                        variant.confirm = true;
                    }
                    items.push(result.to_answer_item(self.mold, child));
                }
                continue;
            }
            if child.is_leaf {
                self.predict_leaf(reader, crude, child, &mut items)?;
            } else {
                self.predict_composite(reader, crude, child, &mut items)?;
            }
        }

        // every leaf without an answer still appears, empty and unscored
        for leaf in self.mold.leaf_nodes() {
            let key = PredictorResult::new(Vec::new()).answer_key(leaf);
            if !items.iter().any(|item| item.key == key) {
                items.push(PredictorResult::new(Vec::new()).to_answer_item(self.mold, leaf));
            }
        }

        Ok(WireAnswer {
            schema: WireSchema {
                schemas: self.mold.data().schemas.clone(),
                schema_types: self.mold.data().schema_types.clone(),
                version: self.mold.checksum().to_string(),
            },
            user_answer: UserAnswer {
                version: ANSWER_VERSION.to_string(),
                items,
            },
        })
    }

    fn run_guarded(
        &self,
        reader: &DirReader,
        crude: &CrudeStore,
        node: &SchemaNode,
        columns: Vec<String>,
        parent_answers: &[PredictorResult],
        path: &str,
    ) -> Vec<ColumnAnswer> {
        let model = match self.model_for(path) {
            Ok(model) => model,
            Err(e) => {
                warn!("column {} skipped: {}", path, e);
                return Vec::new();
            }
        };
        let ctx = PredictContext {
            reader,
            mold: self.mold,
            crude,
            config: self.config,
            node,
            columns,
            parent_answers,
        };
        match model.predict_with_elements(&ctx) {
            Ok(answers) => answers,
            Err(e) => {
                warn!("column {} failed in {}: {}", path, model.name(), e);
                Vec::new()
            }
        }
    }

    fn predict_leaf(
        &self,
        reader: &DirReader,
        crude: &CrudeStore,
        node: &SchemaNode,
        items: &mut Vec<AnswerItem>,
    ) -> Result<()> {
        let path = node.crude_path();
        let answers = self.run_guarded(
            reader,
            crude,
            node,
            vec![node.name().to_string()],
            &[],
            &path,
        );
        let mut results: Vec<PredictorResult> = Vec::new();
        for mut answer in answers {
            if let Some(found) = answer.swap_remove(node.name()) {
                results.extend(found);
            }
        }
        let results = self.post_process(node, results);
        for result in results {
            items.push(result.to_answer_item(self.mold, node));
        }
        Ok(())
    }

    fn predict_composite(
        &self,
        reader: &DirReader,
        crude: &CrudeStore,
        node: &SchemaNode,
        items: &mut Vec<AnswerItem>,
    ) -> Result<()> {
        let path = node.crude_path();
        let leaves = self.leaf_columns(node);
        let columns: Vec<String> = leaves.iter().map(|n| n.name().to_string()).collect();
        let groups = self.run_guarded(reader, crude, node, columns, &[], &path);

        for (group_index, mut group) in groups.into_iter().enumerate() {
            if group_index >= self.config.limit_of_preset_num {
                break;
            }
            // dependent sub-columns run against this group's results
            for leaf in &leaves {
                let leaf_path = leaf.crude_path();
                let options = match self.options.columns.get(&leaf_path) {
                    Some(options) if !options.depends.is_empty() => options.clone(),
                    _ => continue,
                };
                let parent_column = &options.depends[0];
                let parents: Vec<PredictorResult> = group
                    .get(parent_column.as_str())
                    .cloned()
                    .unwrap_or_default();
                if parents.is_empty() {
                    continue;
                }
                let nested = self.run_guarded(
                    reader,
                    crude,
                    leaf,
                    vec![leaf.name().to_string()],
                    &parents,
                    &leaf_path,
                );
                for mut answer in nested {
                    if let Some(found) = answer.swap_remove(leaf.name()) {
                        group
                            .entry(leaf.name().to_string())
                            .or_insert_with(Vec::new)
                            .extend(found);
                    }
                }
            }

            for leaf in &leaves {
                let results = match group.swap_remove(leaf.name()) {
                    Some(results) => results,
                    None => continue,
                };
                let results = self.post_process(leaf, results);
                for mut result in results {
                    result.group_indexes = group_key(leaf, group_index);
                    items.push(result.to_answer_item(self.mold, leaf));
                }
            }
        }
        Ok(())
    }

    /// Leaf descendants of a composite, in declaration order.
    fn leaf_columns<'m>(&'m self, node: &'m SchemaNode) -> Vec<&'m SchemaNode> {
        let mut out = Vec::new();
        for child in self.mold.children(node) {
            if child.is_leaf {
                out.push(child);
            } else {
                out.extend(self.leaf_columns(child));
            }
        }
        out
    }

    /// Threshold pruning, span dedup, enum canonicalization, and the
    /// per-column cap.
    fn post_process(
        &self,
        node: &SchemaNode,
        results: Vec<PredictorResult>,
    ) -> Vec<PredictorResult> {
        let path = node.crude_path();
        let threshold = self
            .options
            .columns
            .get(&path)
            .map(|o| o.threshold_for(node.name()))
            .unwrap_or(0.0);

        let mut seen: Vec<String> = Vec::new();
        let mut out = Vec::new();
        for mut result in results {
            if let Some(score) = result.score {
                if score < threshold {
                    continue;
                }
            }
            let fingerprint = clean_txt(&result.text());
            if !fingerprint.is_empty() && seen.contains(&fingerprint) {
                continue;
            }
            if node.is_enum && result.value.is_none() {
                if let Some(label) = self.canonical_enum(node, &fingerprint) {
                    result = result.with_value(label);
                }
            }
            seen.push(fingerprint);
            out.push(result);
            if out.len() >= self.config.limit_of_preset_num {
                break;
            }
        }
        out
    }

    /// The enumeration label closest to the answered text.
    fn canonical_enum(&self, node: &SchemaNode, text: &str) -> Option<String> {
        let values = self.mold.enum_values(&node.field_type)?;
        let mut best: Option<(f64, &str)> = None;
        for value in values {
            let ratio = similarity(&clean_txt(value), text);
            match best {
                Some((best_ratio, _)) if ratio <= best_ratio => {}
                _ => best = Some((ratio, value)),
            }
        }
        match best {
            Some((ratio, value)) if ratio >= SIMILARITY_THRESHOLD => Some(value.to_string()),
            _ => None,
        }
    }
}

/// Group-index vector of a result in group `g`: the leaf's own slot is
/// always 0, the grouping level carries `g`.
fn group_key(leaf: &SchemaNode, group: usize) -> Vec<usize> {
    let mut key = vec![0; leaf.path.len()];
    if leaf.path.len() >= 2 {
        key[leaf.path.len() - 1] = group;
    }
    key
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::answer::{Variant, VariantKind};
    use crate::crude::{CrudeCandidate, CrudeStore};
    use crate::dir::{Char, DirDocument, Element, ElementId};
    use crate::geometry::Outline;
    use crate::predictor::{Candidate, ModelData};
    use std::cell::RefCell;
    use std::rc::Rc;
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
            name: "prospectus".to_string(),
            paragraphs: vec![
                mock_paragraph(0, "发行人：金通灵科技"),
                mock_paragraph(1, "承销方式：余额包销"),
            ],
            ..Default::default()
        })
    }

    fn mock_mold() -> Mold {
        Mold::from_json(
            r#"{"schemas": [
                {"name": "发行概况", "orders": ["发行人名称", "承销方式"],
                 "schema": {
                    "发行人名称": {"type": "文本", "multi": false, "required": true, "words": ""},
                    "承销方式": {"type": "承销方式枚举", "multi": false, "required": false, "words": ""}}}],
               "schema_types": [
                 {"label": "承销方式枚举", "values": [{"name": "余额包销"}, {"name": "代销"}]}],
               "checksum": "v7"}"#,
        )
        .unwrap()
    }

    fn mock_crude() -> CrudeStore {
        let mut answers = IndexMap::new();
        answers.insert(
            "发行人名称".to_string(),
            vec![CrudeCandidate {
                element_index: ElementId::whole(0),
                score: 0.9,
                ordering: None,
            }],
        );
        answers.insert(
            "承销方式".to_string(),
            vec![CrudeCandidate {
                element_index: ElementId::whole(1),
                score: 0.8,
                ordering: None,
            }],
        );
        CrudeStore::new(answers)
    }

    #[test]
    fn test_predict_builds_wire_answer() {
        let mold = mock_mold();
        let config = Config::default();
        let reader = DirReader::new(mock_doc());
        let crude = mock_crude();
        let mut prophet = Prophet::new(&mold, &config, ProphetOptions::default()).unwrap();
        let answer = prophet
            .predict(&reader, &crude, &ConfirmedAnswers::new())
            .unwrap();

        assert_eq!(answer.user_answer.version, "2.2");
        assert_eq!(answer.schema.version, "v7");
        // two answered leaves, no extra skeletons
        assert_eq!(answer.user_answer.items.len(), 2);
        let first = &answer.user_answer.items[0];
        assert_eq!(first.text.as_deref(), Some("发行人：金通灵科技"));
        assert_eq!(first.score, "0.9000");
    }

    #[test]
    fn test_enum_answer_canonicalized() {
        let mold = mock_mold();
        let config = Config::default();
        let reader = DirReader::new(mock_doc());
        let crude = mock_crude();
        let mut prophet = Prophet::new(&mold, &config, ProphetOptions::default()).unwrap();
        let answer = prophet
            .predict(&reader, &crude, &ConfirmedAnswers::new())
            .unwrap();
        let item = answer
            .user_answer
            .items
            .iter()
            .find(|i| i.key.contains("承销方式"))
            .unwrap();
        assert_eq!(
            item.value,
            Some(crate::answer::AnswerValue::Single("余额包销".to_string()))
        );
    }

    #[test]
    fn test_unanswered_leaf_gets_empty_item() {
        let mold = mock_mold();
        let config = Config::default();
        let reader = DirReader::new(mock_doc());
        let crude = CrudeStore::default();
        let mut prophet = Prophet::new(&mold, &config, ProphetOptions::default()).unwrap();
        let answer = prophet
            .predict(&reader, &crude, &ConfirmedAnswers::new())
            .unwrap();
        assert_eq!(answer.user_answer.items.len(), 2);
        for item in &answer.user_answer.items {
            assert_eq!(item.score, "-1.0000");
            assert!(item.data.is_empty());
        }
    }

    fn mock_group_mold() -> Mold {
        Mold::from_json(
            r#"{"schemas": [
                {"name": "董事", "orders": ["记录"],
                 "schema": {"记录": {"type": "董事记录", "multi": true, "required": false, "words": ""}}},
                {"name": "董事记录", "orders": ["姓名", "简历"],
                 "schema": {
                    "姓名": {"type": "文本", "multi": false, "required": false, "words": ""},
                    "简历": {"type": "文本", "multi": false, "required": false, "words": ""}}}],
               "schema_types": []}"#,
        )
        .unwrap()
    }

    struct RosterModel {
        options: ModelOptions,
        model_data: ModelData,
    }

    impl ColumnModel for RosterModel {
        fn name(&self) -> &str {
            "roster"
        }

        fn options(&self) -> &ModelOptions {
            &self.options
        }

        fn model_data(&self) -> &ModelData {
            &self.model_data
        }

        fn predict(
            &self,
            _candidates: &[Candidate],
            _ctx: &PredictContext,
        ) -> Result<Vec<ColumnAnswer>> {
            Ok(["张三", "李四", "王五"]
                .iter()
                .map(|name| {
                    let mut answer = ColumnAnswer::new();
                    answer.insert(
                        "姓名".to_string(),
                        vec![PredictorResult::single(Variant::new(VariantKind::LabelEnum {
                            items: vec![name.to_string()],
                        }))
                        .with_score(0.9)],
                    );
                    answer
                })
                .collect())
        }
    }

    struct CountingModel {
        options: ModelOptions,
        model_data: ModelData,
        calls: Rc<RefCell<usize>>,
    }

    impl ColumnModel for CountingModel {
        fn name(&self) -> &str {
            "counting"
        }

        fn options(&self) -> &ModelOptions {
            &self.options
        }

        fn model_data(&self) -> &ModelData {
            &self.model_data
        }

        fn predict(
            &self,
            _candidates: &[Candidate],
            _ctx: &PredictContext,
        ) -> Result<Vec<ColumnAnswer>> {
            *self.calls.borrow_mut() += 1;
            Ok(Vec::new())
        }
    }

    #[test]
    fn test_group_cap_skips_dependent_runs() {
        let mold = mock_group_mold();
        let config = Config::default().with_limit_of_preset_num(2);
        let reader = DirReader::new(mock_doc());
        let crude = CrudeStore::default();

        let mut options = ProphetOptions::default();
        let mut dep = ModelOptions::named("score_filter");
        dep.depends = vec!["姓名".to_string()];
        options.columns.insert("记录-简历".to_string(), dep);

        let calls = Rc::new(RefCell::new(0usize));
        let mut prophet = Prophet::new(&mold, &config, options).unwrap();
        prophet.set_model(
            "记录",
            Box::new(RosterModel {
                options: ModelOptions::named("roster"),
                model_data: ModelData::new(),
            }),
        );
        prophet.set_model(
            "记录-简历",
            Box::new(CountingModel {
                options: ModelOptions::named("counting"),
                model_data: ModelData::new(),
                calls: Rc::clone(&calls),
            }),
        );
        let answer = prophet
            .predict(&reader, &crude, &ConfirmedAnswers::new())
            .unwrap();

        // three groups came back; only the two kept ones run their
        // dependent column
        assert_eq!(*calls.borrow(), 2);
        let names: Vec<_> = answer
            .user_answer
            .items
            .iter()
            .filter(|i| i.key.contains("姓名") && i.score != "-1.0000")
            .collect();
        assert_eq!(names.len(), 2);
    }

    #[test]
    fn test_confirmed_answer_short_circuits() {
        let mold = mock_mold();
        let config = Config::default();
        let reader = DirReader::new(mock_doc());
        let crude = mock_crude();
        let mut confirmed = ConfirmedAnswers::new();
        confirmed.insert(
            "发行人名称".to_string(),
            vec![PredictorResult::single(Variant::new(VariantKind::LabelEnum {
                items: vec!["既定答案".to_string()],
            }))
            .with_score(1.0)],
        );
        let mut prophet = Prophet::new(&mold, &config, ProphetOptions::default()).unwrap();
        let answer = prophet.predict(&reader, &crude, &confirmed).unwrap();
        let item = answer
            .user_answer
            .items
            .iter()
            .find(|i| i.key.contains("发行人名称"))
            .unwrap();
        assert_eq!(item.text.as_deref(), Some("既定答案"));
        assert!(item.data[0].confirm);
    }
}
