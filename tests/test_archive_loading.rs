//! Loading DIR archives from disk: zip containers, bare JSON files, and
//! the failure paths.

use dir_insight::dir::{load_document, DirCache, DirReader, ElementClass, ElementId};
use dir_insight::Error;
use std::fs::File;
use std::io::Write;
use std::sync::Arc;
use tempfile::TempDir;

fn doc_json() -> String {
    r#"{
        "name": "600519_annual",
        "pages": {
            "0": {"rotate": 0, "statis": {"ocr": false}}
        },
        "paragraphs": [
            {"index": 0, "page": 0, "box": [90.0, 100.0, 500.0, 120.0],
             "text": "贵州茅台酒股份有限公司2023年年度报告",
             "chars": [
                {"page": 0, "box": [90.0, 100.0, 110.0, 120.0], "text": "贵"},
                {"page": 0, "box": [110.0, 100.0, 130.0, 120.0], "text": "州"}
             ]},
            {"index": 1, "page": 0, "box": [90.0, 140.0, 500.0, 160.0],
             "text": "第一节 重要提示", "chars": []}
        ],
        "tables": [
            {"index": 2, "page": 0, "box": [90.0, 200.0, 500.0, 280.0],
             "cells": {
                "0_0": {"page": 0, "box": [90.0, 200.0, 295.0, 240.0], "text": "证券简称"},
                "0_1": {"page": 0, "box": [295.0, 200.0, 500.0, 240.0], "text": "贵州茅台"}
             }}
        ],
        "syllabuses": [
            {"index": 0, "title": "第一节 重要提示", "level": 1,
             "parent": null, "children": [], "element": 1, "range": [1, 3]}
        ]
    }"#
    .to_string()
}

fn write_zip(dir: &TempDir) -> std::path::PathBuf {
    let path = dir.path().join("600519.zip");
    let file = File::create(&path).unwrap();
    let mut writer = zip::ZipWriter::new(file);
    writer
        .start_file("600519.json", zip::write::SimpleFileOptions::default())
        .unwrap();
    writer.write_all(doc_json().as_bytes()).unwrap();
    writer.finish().unwrap();
    path
}

#[test]
fn test_load_from_zip_archive() {
    let dir = TempDir::new().unwrap();
    let path = write_zip(&dir);

    let doc = load_document(&path).unwrap();
    assert_eq!(doc.name, "600519_annual");
    assert_eq!(doc.paragraphs.len(), 2);
    assert_eq!(doc.tables.len(), 1);
    assert_eq!(doc.syllabuses.len(), 1);
}

#[test]
fn test_load_from_bare_json() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("600519.json");
    std::fs::write(&path, doc_json()).unwrap();

    let doc = load_document(&path).unwrap();
    assert_eq!(doc.paragraphs[1].text, "第一节 重要提示");
}

#[test]
fn test_reader_queries_over_loaded_document() {
    let dir = TempDir::new().unwrap();
    let doc = load_document(write_zip(&dir)).unwrap();
    let reader = DirReader::new(Arc::new(doc));

    let (class, element) = reader.find_element_by_index(ElementId::whole(2)).unwrap();
    assert_eq!(class, ElementClass::Table);
    assert_eq!(element.cells.len(), 2);

    let chain = reader.syllabus().find_by_elt_index(2, false);
    assert_eq!(chain.len(), 1);
    assert_eq!(chain[0].title, "第一节 重要提示");
}

#[test]
fn test_missing_archive_is_typed_error() {
    let err = load_document("/nonexistent/path/600519.zip").unwrap_err();
    assert!(matches!(err, Error::DirNotFound(_)));
}

#[test]
fn test_malformed_json_is_invalid_dir() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("broken.json");
    std::fs::write(&path, "{not json").unwrap();
    let err = load_document(&path).unwrap_err();
    assert!(matches!(err, Error::InvalidDir(_)));
}

#[test]
fn test_cache_loads_each_archive_once() {
    let dir = TempDir::new().unwrap();
    let path = write_zip(&dir);
    let cache = DirCache::new(4);

    let first = cache
        .get_or_load(&path, || load_document(&path))
        .unwrap();
    let second = cache
        .get_or_load(&path, || panic!("should hit the cache"))
        .unwrap();
    assert!(Arc::ptr_eq(&first, &second));
}
