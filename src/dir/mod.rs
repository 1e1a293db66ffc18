//! Document model, loading, and query layer.
//!
//! A DIR is the parsed form of one PDF: elements sorted into category
//! buckets, a syllabus tree, per-page statistics. [`DirReader`] is the
//! entry point — it loads an archive (through a [`DirCache`]), indexes the
//! buckets, and answers spatial and structural queries over a lazily
//! processed view of the raw data.

pub mod cache;
pub mod model;
pub mod reader;
pub mod syllabus;
pub mod table;

pub use cache::DirCache;
pub use model::{
    Bucket, Cell, Char, DirDocument, Element, ElementClass, ElementId, PageInfo,
    PageMergedParagraph, PageStatis, Syllabus,
};
pub use reader::{
    load_document, DirReader, NearByQuery, PageRegion, SyllabusOutlineOptions,
    ELEMENT_OVERLAP_THRESHOLD,
};
pub use syllabus::{is_continued_chapter, SyllabusOrder, SyllabusReader};
pub use table::{DirTable, MergedTable, CELL_OVERLAP_THRESHOLD};
