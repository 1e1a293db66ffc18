//! Remote predictors.
//!
//! Two models are defined only by their RPC contracts: `remote` sends
//! the candidate elements and schema path to a prediction service and
//! maps returned boxes back onto document chars; `table_ai` off-loads
//! the header-to-cell mapping of a table to a service that returns
//! per-row cell coordinates.
//!
//! The transport is injected as a trait object so the engine itself
//! never blocks on the network in tests. A transport error or timeout
//! maps to an empty result with one log line; it never crosses the
//! column boundary as an error.

use crate::answer::{PredictorResult, Variant, VariantKind, WireBox};
use crate::dir::ElementId;
use crate::error::Result;
use crate::geometry::Outline;
use crate::predictor::{Candidate, ColumnAnswer, ColumnModel, ModelData, ModelOptions, PredictContext};
use indexmap::IndexMap;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::rc::Rc;
use std::time::Duration;

/// Synchronous RPC seam for the remote models.
pub trait RemoteTransport {
    /// Predict spans for a schema path.
    fn predict(&self, request: &RemotePredictRequest) -> Result<RemotePredictResponse>;

    /// Map table headers to per-row cells.
    fn extract_table(&self, request: &TableExtractRequest) -> Result<TableExtractResponse>;
}

/// One candidate element as sent over the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteElement {
    /// Element id
    pub index: ElementId,
    /// Page number
    pub page: i64,
    /// Element text
    pub text: String,
}

/// Request of the `remote` model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemotePredictRequest {
    /// Service address
    pub address: String,
    /// Call budget in seconds
    pub timeout: f64,
    /// Document name
    pub name: String,
    /// Schema path, root omitted
    pub path: Vec<String>,
    /// Columns to answer
    pub columns: Vec<String>,
    /// Candidate elements
    pub elements: Vec<RemoteElement>,
}

/// One answered span.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteSpan {
    /// Page number
    pub page: i64,
    /// Box edges
    #[serde(rename = "box")]
    pub outline: WireBox,
    /// Covered text
    #[serde(default)]
    pub text: String,
}

/// One per-column answer of the prediction service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteAnswerItem {
    /// Answered column
    pub column: String,
    /// Located spans
    #[serde(default)]
    pub boxes: Vec<RemoteSpan>,
    /// Enumeration label
    #[serde(default)]
    pub value: Option<String>,
    /// Service confidence
    #[serde(default)]
    pub score: Option<f64>,
}

/// Response of the `remote` model.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RemotePredictResponse {
    /// Answers in service order
    #[serde(default)]
    pub results: Vec<RemoteAnswerItem>,
}

/// Request of the `table_ai` model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableExtractRequest {
    /// Service address
    pub address: String,
    /// Call budget in seconds
    pub timeout: f64,
    /// Expand selections to whole rows on the service side
    pub expand: bool,
    /// Table element ids
    pub tables: Vec<ElementId>,
    /// Column labels to map
    pub columns: Vec<String>,
    /// Enclosing syllabus titles, outermost first
    #[serde(default)]
    pub titles: Vec<String>,
}

/// One cell coordinate returned by the table service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteCellRef {
    /// Owning table
    pub element_index: ElementId,
    /// `"row_col"` cell id
    pub cell_id: String,
}

/// Response of the `table_ai` model: one map per body row.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TableExtractResponse {
    /// Column → cell per row
    #[serde(default)]
    pub rows: Vec<IndexMap<String, RemoteCellRef>>,
}

fn outline_of(span: &RemoteSpan) -> Outline {
    Outline::new(
        span.outline.box_left,
        span.outline.box_top,
        span.outline.box_right,
        span.outline.box_bottom,
    )
}

/// Generic remote predictor.
pub struct RemoteCall {
    options: ModelOptions,
    model_data: ModelData,
    transport: Option<Box<dyn RemoteTransport>>,
}

impl RemoteCall {
    /// Build without a transport; stays inert until one is attached.
    pub fn new(options: ModelOptions) -> Result<Self> {
        Ok(RemoteCall {
            options,
            model_data: ModelData::new(),
            transport: None,
        })
    }

    /// Attach the transport.
    pub fn with_transport(mut self, transport: Box<dyn RemoteTransport>) -> Self {
        self.transport = Some(transport);
        self
    }
}

impl ColumnModel for RemoteCall {
    fn name(&self) -> &str {
        "remote"
    }

    fn options(&self) -> &ModelOptions {
        &self.options
    }

    fn model_data(&self) -> &ModelData {
        &self.model_data
    }

    fn predict(&self, candidates: &[Candidate], ctx: &PredictContext) -> Result<Vec<ColumnAnswer>> {
        let transport = match &self.transport {
            Some(transport) => transport,
            None => {
                debug!("remote predictor for {} has no transport", ctx.node.name());
                return Ok(Vec::new());
            }
        };
        let address = match &ctx.config.remote_predict.address {
            Some(address) => address.clone(),
            None => {
                debug!("remote predictor for {} not configured", ctx.node.name());
                return Ok(Vec::new());
            }
        };
        let request = RemotePredictRequest {
            address,
            timeout: duration_secs(ctx.config.remote_predict.timeout),
            name: ctx.reader.document().name.clone(),
            path: ctx.node.path[1..].to_vec(),
            columns: ctx.columns.clone(),
            elements: candidates
                .iter()
                .map(|c| RemoteElement {
                    index: c.element.index,
                    page: c.element.page,
                    text: ctx.reader.element_text(&c.element),
                })
                .collect(),
        };
        let response = match transport.predict(&request) {
            Ok(response) => response,
            Err(e) => {
                warn!(
                    "remote predict failed for {}: {}",
                    ctx.node.name(),
                    e
                );
                return Ok(Vec::new());
            }
        };

        let mut answer = ColumnAnswer::new();
        for item in response.results {
            let mut variants = Vec::new();
            for span in &item.boxes {
                let outline = outline_of(span);
                let chars = ctx.reader.find_chars_by_outline(span.page, &outline);
                let display = if chars.is_empty() && !span.text.is_empty() {
                    Some(span.text.clone())
                } else {
                    None
                };
                let element = ctx
                    .reader
                    .find_element_by_outline(span.page, &outline)
                    .map(|(_, e)| e);
                variants.push(Variant::new(VariantKind::CharSpan {
                    element,
                    chars,
                    display_text: display,
                }));
            }
            if variants.is_empty() && item.value.is_none() {
                continue;
            }
            let mut result = PredictorResult::new(variants);
            if let Some(value) = item.value {
                result = result.with_value(value);
            }
            if let Some(score) = item.score {
                result = result.with_score(score);
            }
            answer
                .entry(item.column)
                .or_insert_with(Vec::new)
                .push(result);
        }
        if answer.is_empty() {
            Ok(Vec::new())
        } else {
            Ok(vec![answer])
        }
    }
}

/// Remote table-structure predictor.
pub struct AiTable {
    options: ModelOptions,
    model_data: ModelData,
    transport: Option<Box<dyn RemoteTransport>>,
}

impl AiTable {
    /// Build without a transport; stays inert until one is attached.
    pub fn new(options: ModelOptions) -> Result<Self> {
        Ok(AiTable {
            options,
            model_data: ModelData::new(),
            transport: None,
        })
    }

    /// Attach the transport.
    pub fn with_transport(mut self, transport: Box<dyn RemoteTransport>) -> Self {
        self.transport = Some(transport);
        self
    }
}

impl ColumnModel for AiTable {
    fn name(&self) -> &str {
        "table_ai"
    }

    fn options(&self) -> &ModelOptions {
        &self.options
    }

    fn model_data(&self) -> &ModelData {
        &self.model_data
    }

    fn predict(&self, candidates: &[Candidate], ctx: &PredictContext) -> Result<Vec<ColumnAnswer>> {
        let transport = match &self.transport {
            Some(transport) => transport,
            None => return Ok(Vec::new()),
        };
        let address = match &ctx.config.table_extract.address {
            Some(address) => address.clone(),
            None => return Ok(Vec::new()),
        };
        let tables: Vec<&Candidate> = candidates
            .iter()
            .filter(|c| c.element.is_table())
            .collect();
        if tables.is_empty() {
            return Ok(Vec::new());
        }
        let titles: Vec<String> = ctx
            .reader
            .syllabus()
            .find_by_elt_index(tables[0].element.index.whole_index(), false)
            .iter()
            .rev()
            .map(|s| s.title.clone())
            .collect();
        let request = TableExtractRequest {
            address,
            timeout: duration_secs(ctx.config.table_extract.timeout),
            expand: ctx.config.table_extract.expand,
            tables: tables.iter().map(|c| c.element.index).collect(),
            columns: ctx.columns.clone(),
            titles,
        };
        let response = match transport.extract_table(&request) {
            Ok(response) => response,
            Err(e) => {
                warn!("table extract failed for {}: {}", ctx.node.name(), e);
                return Ok(Vec::new());
            }
        };

        let mut out = Vec::new();
        for row in response.rows {
            let mut answer = ColumnAnswer::new();
            for (column, cell_ref) in row {
                let element = tables
                    .iter()
                    .find(|c| c.element.index == cell_ref.element_index)
                    .map(|c| Rc::clone(&c.element));
                let element = match element {
                    Some(element) => element,
                    None => continue,
                };
                if !element.cells.contains_key(&cell_ref.cell_id) {
                    continue;
                }
                answer.insert(
                    column,
                    vec![PredictorResult::single(Variant::new(
                        VariantKind::TableCells {
                            element,
                            cell_ids: vec![cell_ref.cell_id],
                        },
                    ))],
                );
            }
            if !answer.is_empty() {
                out.push(answer);
            }
        }
        Ok(out)
    }
}

fn duration_secs(timeout: Duration) -> f64 {
    timeout.as_secs_f64()
}
