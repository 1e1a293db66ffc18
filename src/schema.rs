//! Mold (user schema) parsing and path arithmetic.
//!
//! A mold is a recursive record definition: an ordered list of schema
//! records, the first of which is the root, plus a set of enumeration
//! types. The engine flattens the recursion into a node tree so that
//! predictors and the prophet can iterate leaf paths, key the crude-answer
//! store, and address fields by their semi-opaque rule codes.

use crate::error::{Error, Result};
use indexmap::IndexMap;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Field types that terminate recursion.
pub const BASIC_TYPES: [&str; 3] = ["文本", "数字", "日期"];

lazy_static! {
    static ref P_RULE_CODE: Regex = Regex::new(r"\(?A\d+").unwrap();
}

/// One field declaration inside a schema record.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct FieldDef {
    /// Basic type, enum label, or the name of another schema record
    #[serde(rename = "type")]
    pub field_type: String,
    /// Whether the field repeats
    #[serde(default)]
    pub multi: bool,
    /// Whether an answer is mandatory
    #[serde(default)]
    pub required: bool,
    /// Hint text shown to annotators
    #[serde(default)]
    pub words: String,
    /// Stable field id, generated when the mold does not carry one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
}

/// One named record of the mold.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SchemaRecord {
    /// Record name; doubles as a composite field type
    pub name: String,
    /// Field names in declaration order
    #[serde(default)]
    pub orders: Vec<String>,
    /// Field declarations keyed by name
    #[serde(default)]
    pub schema: IndexMap<String, FieldDef>,
}

/// A single enumeration value.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct EnumValue {
    /// Display name, also the canonical answer value
    pub name: String,
}

/// A named enumeration type.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct EnumType {
    /// Type label referenced from field declarations
    pub label: String,
    /// Ordered values
    pub values: Vec<EnumValue>,
}

/// The raw mold document.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct MoldData {
    /// Ordered schema records; the first is the root
    pub schemas: Vec<SchemaRecord>,
    /// Enumeration types
    #[serde(default)]
    pub schema_types: Vec<EnumType>,
    /// Content checksum used as the answer schema version
    #[serde(default)]
    pub checksum: Option<String>,
}

/// One node of the flattened schema tree.
#[derive(Debug, Clone)]
pub struct SchemaNode {
    /// Names from the root down to this node, root included
    pub path: Vec<String>,
    /// Declared type (basic, enum label, or schema record name)
    pub field_type: String,
    /// Whether the field repeats
    pub multi: bool,
    /// Whether an answer is mandatory
    pub required: bool,
    /// Hint text
    pub words: String,
    /// Stable id
    pub uuid: String,
    /// Terminates recursion (basic or enum type)
    pub is_leaf: bool,
    /// Declared as one of the mold's enumeration types
    pub is_enum: bool,
    parent: Option<usize>,
    children: Vec<usize>,
}

impl SchemaNode {
    /// Last path segment.
    pub fn name(&self) -> &str {
        self.path.last().map(String::as_str).unwrap_or("")
    }

    /// Depth, root = 1.
    pub fn level(&self) -> usize {
        self.path.len()
    }

    /// JSON-array form of the path, the canonical answer-tree key.
    pub fn path_key(&self) -> String {
        serde_json::to_string(&self.path).unwrap_or_default()
    }

    /// `-`-joined path with the root omitted, the crude-store key.
    pub fn crude_path(&self) -> String {
        self.path[1..].join("-")
    }

    /// Path of a sibling column under the same parent.
    pub fn sibling_path(&self, column: &str) -> Vec<String> {
        sibling_path(&self.path, column)
    }
}

/// Replace the last path segment with `column`.
pub fn sibling_path(path: &[String], column: &str) -> Vec<String> {
    match path.split_last() {
        Some((_, init)) => {
            let mut out = init.to_vec();
            out.push(column.to_string());
            out
        }
        None => vec![column.to_string()],
    }
}

/// A parsed mold with its flattened node tree and rule-code maps.
#[derive(Debug, Clone)]
pub struct Mold {
    data: MoldData,
    nodes: Vec<SchemaNode>,
    records: HashMap<String, usize>,
    enums: HashMap<String, usize>,
}

impl Mold {
    /// Flatten a mold document into a node tree.
    ///
    /// Missing field uuids are generated here so every node has a stable
    /// id for the lifetime of the mold.
    pub fn new(data: MoldData) -> Result<Mold> {
        let first = data
            .schemas
            .first()
            .ok_or_else(|| Error::InvalidSchema("mold has no schemas".to_string()))?
            .clone();
        let records: HashMap<String, usize> = data
            .schemas
            .iter()
            .enumerate()
            .map(|(i, s)| (s.name.clone(), i))
            .collect();
        let enums: HashMap<String, usize> = data
            .schema_types
            .iter()
            .enumerate()
            .map(|(i, t)| (t.label.clone(), i))
            .collect();
        let mut mold = Mold {
            data,
            nodes: Vec::new(),
            records,
            enums,
        };
        mold.build_node(&first, vec![first.name.clone()], None)?;
        Ok(mold)
    }

    /// Parse a mold from its JSON document.
    pub fn from_json(raw: &str) -> Result<Mold> {
        let data: MoldData =
            serde_json::from_str(raw).map_err(|e| Error::InvalidSchema(e.to_string()))?;
        Mold::new(data)
    }

    fn build_node(
        &mut self,
        record: &SchemaRecord,
        path: Vec<String>,
        parent: Option<usize>,
    ) -> Result<usize> {
        let idx = self.nodes.len();
        self.nodes.push(SchemaNode {
            path: path.clone(),
            field_type: record.name.clone(),
            multi: false,
            required: false,
            words: String::new(),
            uuid: Uuid::new_v4().simple().to_string(),
            is_leaf: false,
            is_enum: false,
            parent,
            children: Vec::new(),
        });
        for name in record.orders.clone() {
            let field = record.schema.get(&name).cloned().ok_or_else(|| {
                Error::InvalidSchema(format!(
                    "field {} listed in orders of {} but not declared",
                    name, record.name
                ))
            })?;
            let mut child_path = path.clone();
            child_path.push(name.clone());
            let child = if let Some(&rec_idx) = self.records.get(&field.field_type) {
                let sub = self.data.schemas[rec_idx].clone();
                let child = self.build_node(&sub, child_path, Some(idx))?;
                let node = &mut self.nodes[child];
                node.field_type = field.field_type.clone();
                node.multi = field.multi;
                node.required = field.required;
                node.words = field.words.clone();
                if let Some(uuid) = &field.uuid {
                    node.uuid = uuid.clone();
                }
                child
            } else {
                let child = self.nodes.len();
                self.nodes.push(SchemaNode {
                    path: child_path,
                    field_type: field.field_type.clone(),
                    multi: field.multi,
                    required: field.required,
                    words: field.words.clone(),
                    uuid: field
                        .uuid
                        .clone()
                        .unwrap_or_else(|| Uuid::new_v4().simple().to_string()),
                    is_leaf: self.is_leaf_type(&field.field_type),
                    is_enum: self.is_enum_type(&field.field_type),
                    parent: Some(idx),
                    children: Vec::new(),
                });
                child
            };
            self.nodes[idx].children.push(child);
        }
        Ok(idx)
    }

    /// The raw document.
    pub fn data(&self) -> &MoldData {
        &self.data
    }

    /// Root record name.
    pub fn root_name(&self) -> &str {
        &self.data.schemas[0].name
    }

    /// Content checksum, used as the answer schema version.
    pub fn checksum(&self) -> &str {
        self.data.checksum.as_deref().unwrap_or("")
    }

    /// The root node.
    pub fn root(&self) -> &SchemaNode {
        &self.nodes[0]
    }

    /// All nodes in depth-first declaration order.
    pub fn nodes(&self) -> &[SchemaNode] {
        &self.nodes
    }

    /// Direct children of a node.
    pub fn children<'a>(&'a self, node: &SchemaNode) -> Vec<&'a SchemaNode> {
        node.children.iter().map(|&i| &self.nodes[i]).collect()
    }

    /// Parent of a node.
    pub fn parent<'a>(&'a self, node: &SchemaNode) -> Option<&'a SchemaNode> {
        node.parent.map(|i| &self.nodes[i])
    }

    /// Leaf nodes in depth-first declaration order.
    pub fn leaf_nodes(&self) -> impl Iterator<Item = &SchemaNode> {
        self.nodes.iter().filter(|n| n.is_leaf)
    }

    /// Whether a type terminates recursion.
    pub fn is_leaf_type(&self, field_type: &str) -> bool {
        BASIC_TYPES.contains(&field_type) || self.is_enum_type(field_type)
    }

    /// Whether a type names one of the mold's enumerations.
    pub fn is_enum_type(&self, field_type: &str) -> bool {
        self.enums.contains_key(field_type)
    }

    /// An amount composite groups a `单位` column with a numeric one.
    pub fn is_amount(&self, node: &SchemaNode) -> bool {
        let names: Vec<&str> = self.children(node).iter().map(|c| c.name()).collect();
        names.contains(&"单位") && (names.contains(&"数值") || names.contains(&"金额"))
    }

    /// Uuids from the root down to (and including) a node.
    pub fn uuid_path(&self, node: &SchemaNode) -> Vec<String> {
        let mut path = vec![node.uuid.clone()];
        let mut current = node;
        while let Some(parent) = self.parent(current) {
            path.push(parent.uuid.clone());
            current = parent;
        }
        path.reverse();
        path
    }

    /// Map from each leaf's path key to its uuid path.
    pub fn path_mapping(&self) -> HashMap<String, Vec<String>> {
        self.leaf_nodes()
            .map(|n| (n.path_key(), self.uuid_path(n)))
            .collect()
    }

    /// Walk names from the root; stops early at a leaf or an unknown
    /// segment, mirroring partial answer keys.
    pub fn find_by_path(&self, path: &[String]) -> &SchemaNode {
        let mut current = 0usize;
        for name in path {
            let next = self.nodes[current]
                .children
                .iter()
                .find(|&&i| self.nodes[i].name() == name);
            match next {
                Some(&i) => current = i,
                None => break,
            }
        }
        &self.nodes[current]
    }

    /// Resolve a JSON answer key like `["Root:0","Field:1"]`; the root
    /// segment is skipped.
    pub fn find_by_path_key(&self, key: &str) -> Result<&SchemaNode> {
        let parts: Vec<String> = serde_json::from_str(key)
            .map_err(|e| Error::InvalidSchema(format!("bad answer key {}: {}", key, e)))?;
        let names: Vec<String> = parts
            .iter()
            .skip(1)
            .map(|p| p.split(':').next().unwrap_or("").to_string())
            .collect();
        Ok(self.find_by_path(&names))
    }

    /// Enumeration values of a type label, in declaration order.
    pub fn enum_values(&self, label: &str) -> Option<Vec<&str>> {
        self.enums.get(label).map(|&i| {
            self.data.schema_types[i]
                .values
                .iter()
                .map(|v| v.name.as_str())
                .collect()
        })
    }

    /// The `index`-th value of an enumeration, clamped to the last.
    pub fn enum_value(&self, label: &str, index: usize) -> Option<&str> {
        let &i = self.enums.get(label)?;
        let values = &self.data.schema_types[i].values;
        let value = values.get(index).or_else(|| values.last())?;
        Some(&value.name)
    }

    /// Root-level field groups: a leaf field maps to itself, a composite
    /// field to its ordered sub-field names.
    pub fn root_rules_map(&self) -> IndexMap<String, Vec<String>> {
        let mut out = IndexMap::new();
        for child in self.children(self.root()) {
            if child.is_leaf {
                out.insert(child.name().to_string(), vec![child.name().to_string()]);
            } else {
                let subs: Vec<String> = self
                    .leaf_descendant_names(child)
                    .into_iter()
                    .collect();
                out.insert(child.name().to_string(), subs);
            }
        }
        out
    }

    fn leaf_descendant_names(&self, node: &SchemaNode) -> Vec<String> {
        let mut out = Vec::new();
        for child in self.children(node) {
            if child.is_leaf {
                out.push(child.name().to_string());
            } else {
                out.extend(self.leaf_descendant_names(child));
            }
        }
        out
    }

    fn code_for(root: &str, item: &str, index: usize) -> String {
        if P_RULE_CODE.is_match(item) {
            item.to_string()
        } else if item.starts_with('(') {
            format!("({}.{})", root, (index + 1) / 2)
        } else {
            format!("{}.{}", root, (index + 2) / 2)
        }
    }

    /// Field name → rule code. Names already shaped like codes pass
    /// through; the rest get `root.N` codes from their position.
    pub fn name_rule_map(&self) -> IndexMap<String, String> {
        let mut out = IndexMap::new();
        for (root, items) in self.root_rules_map() {
            for (index, item) in items.iter().enumerate() {
                out.insert(item.clone(), Self::code_for(&root, item, index));
            }
        }
        out
    }

    /// Rule code → field name.
    pub fn rule_name_map(&self) -> IndexMap<String, String> {
        self.name_rule_map().into_iter().map(|(k, v)| (v, k)).collect()
    }

    /// Rule code → root-level field name.
    pub fn rule_root_map(&self) -> IndexMap<String, String> {
        let mut out = IndexMap::new();
        for (root, items) in self.root_rules_map() {
            for (index, item) in items.iter().enumerate() {
                out.insert(Self::code_for(&root, item, index), root.clone());
            }
        }
        out
    }

    /// Rule code → crude-store key. Second-level fields join their root;
    /// enum-typed roots keep the bare code.
    pub fn rule_to_crude_key(&self, rule: &str) -> Option<String> {
        let root = self.rule_root_map().get(rule)?.clone();
        let root_node = self.find_by_path(std::slice::from_ref(&root));
        if root_node.is_enum {
            return Some(rule.to_string());
        }
        let name = self.rule_name_map().get(rule)?.clone();
        if root == name {
            Some(name)
        } else {
            Some(format!("{}-{}", root, name))
        }
    }

    /// Crude-store key → rule code.
    pub fn crude_key_to_rule(&self, crude_key: &str) -> Option<String> {
        let name = crude_key.rsplit('-').next()?;
        self.name_rule_map().get(name).cloned()
    }

    /// Enum value for a rule code, resolving the field's declared type.
    pub fn rule_enum_value(&self, rule: &str, index: usize) -> Option<&str> {
        let root = self.rule_root_map().get(rule)?.clone();
        let name = self.rule_name_map().get(rule)?.clone();
        let mut path = vec![root.clone()];
        if name != root {
            path.push(name);
        }
        let node = self.find_by_path(&path);
        if node.is_enum {
            self.enum_value(&node.field_type, index)
        } else {
            None
        }
    }
}
