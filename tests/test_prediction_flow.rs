//! End-to-end prediction: mold + document + crude shortlists in, wire
//! answer JSON out.

use dir_insight::config::Config;
use dir_insight::crude::CrudeStore;
use dir_insight::dir::{Char, DirDocument, DirReader, Element, ElementId};
use dir_insight::geometry::Outline;
use dir_insight::prophet::{ConfirmedAnswers, Prophet, ProphetOptions};
use dir_insight::schema::Mold;
use std::sync::Arc;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn paragraph(index: i64, text: &str) -> Element {
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

fn sample_doc() -> Arc<DirDocument> {
    Arc::new(DirDocument {
        name: "prospectus".to_string(),
        paragraphs: vec![
            paragraph(0, "发行人：金通灵科技集团股份有限公司"),
            paragraph(1, "保荐机构：华泰联合证券有限责任公司"),
            paragraph(2, "本次发行采用余额包销方式。"),
        ],
        ..Default::default()
    })
}

fn sample_mold() -> Mold {
    Mold::from_json(
        r#"{"schemas": [
            {"name": "发行概况", "orders": ["发行人名称", "保荐机构"],
             "schema": {
                "发行人名称": {"type": "文本", "multi": false, "required": true, "words": ""},
                "保荐机构": {"type": "文本", "multi": false, "required": false, "words": ""}}}],
           "schema_types": [],
           "checksum": "mold-v1"}"#,
    )
    .unwrap()
}

fn sample_crude() -> CrudeStore {
    CrudeStore::from_json(
        r#"{
            "发行人名称": [{"element_index": 0, "score": 0.92}],
            "保荐机构": [{"element_index": 1, "score": 0.85},
                         {"element_index": 2, "score": 0.1}]
        }"#,
    )
    .unwrap()
}

#[test]
fn test_full_run_produces_wire_answer() {
    init_logging();
    let mold = sample_mold();
    let config = Config::new();
    let reader = DirReader::new(sample_doc());
    let crude = sample_crude();

    let mut prophet = Prophet::new(&mold, &config, ProphetOptions::default()).unwrap();
    let answer = prophet
        .predict(&reader, &crude, &ConfirmedAnswers::new())
        .unwrap();

    assert_eq!(answer.schema.version, "mold-v1");
    assert_eq!(answer.user_answer.items.len(), 2);

    let issuer = &answer.user_answer.items[0];
    assert_eq!(
        issuer.text.as_deref(),
        Some("发行人：金通灵科技集团股份有限公司")
    );
    assert_eq!(issuer.score, "0.9200");
    assert_eq!(issuer.key, r#"["发行概况:0","发行人名称:0"]"#);
}

#[test]
fn test_wire_json_shape() {
    init_logging();
    let mold = sample_mold();
    let config = Config::new();
    let reader = DirReader::new(sample_doc());
    let crude = sample_crude();

    let mut prophet = Prophet::new(&mold, &config, ProphetOptions::default()).unwrap();
    let answer = prophet
        .predict(&reader, &crude, &ConfirmedAnswers::new())
        .unwrap();
    let json = serde_json::to_string(&answer).unwrap();

    assert!(json.contains("\"userAnswer\""));
    assert!(json.contains("\"version\":\"2.2\""));
    assert!(json.contains("\"handleType\":\"wireframe\""));
    assert!(json.contains("\"box\":"));
    assert!(!json.contains("\"confirm\""));
}

#[test]
fn test_empty_crude_yields_skeleton_items() {
    init_logging();
    let mold = sample_mold();
    let config = Config::new();
    let reader = DirReader::new(sample_doc());
    let crude = CrudeStore::default();

    let mut prophet = Prophet::new(&mold, &config, ProphetOptions::default()).unwrap();
    let answer = prophet
        .predict(&reader, &crude, &ConfirmedAnswers::new())
        .unwrap();

    assert_eq!(answer.user_answer.items.len(), 2);
    for item in &answer.user_answer.items {
        assert_eq!(item.score, "-1.0000");
        assert!(item.data.is_empty());
        assert!(!item.key.is_empty());
    }
}

#[test]
fn test_confirmed_answers_survive_reprediction() {
    init_logging();
    let mold = sample_mold();
    let config = Config::new();
    let reader = DirReader::new(sample_doc());
    let crude = sample_crude();

    let mut confirmed = ConfirmedAnswers::new();
    confirmed.insert(
        "保荐机构".to_string(),
        vec![{
            use dir_insight::answer::{PredictorResult, Variant, VariantKind};
            PredictorResult::single(Variant::new(VariantKind::LabelEnum {
                items: vec!["中信证券".to_string()],
            }))
            .with_score(1.0)
        }],
    );

    let mut prophet = Prophet::new(&mold, &config, ProphetOptions::default()).unwrap();
    let answer = prophet.predict(&reader, &crude, &confirmed).unwrap();

    let sponsor = answer
        .user_answer
        .items
        .iter()
        .find(|i| i.key.contains("保荐机构"))
        .unwrap();
    assert_eq!(sponsor.text.as_deref(), Some("中信证券"));
    assert!(sponsor.data[0].confirm);
}
