//! Local representation of a server resource.

use crate::core::meta_api::{well_known, MetaApi};
use crate::core::types::{ResourcePath, UpdatedResources};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// A named bundle of fields attached to a resource.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Sheet(pub Map<String, Value>);

impl Sheet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn set(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(field.into(), value.into());
    }

    /// Builder form of [`set`](Self::set).
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(field, value);
        self
    }

    pub fn remove(&mut self, field: &str) -> Option<Value> {
        self.0.remove(field)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// String elements of a list field (e.g. a pool's `elements`).
    pub fn string_list(&self, field: &str) -> Vec<String> {
        match self.0.get(field) {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
            Some(Value::String(s)) => vec![s.clone()],
            _ => Vec::new(),
        }
    }
}

impl From<Map<String, Value>> for Sheet {
    fn from(map: Map<String, Value>) -> Self {
        Sheet(map)
    }
}

/// One server-side object version, or a resource about to be created.
#[derive(Clone, Debug, PartialEq)]
pub struct Resource {
    pub content_type: String,
    pub path: ResourcePath,
    /// Containing collection. Needed to post, ignored afterwards.
    pub parent: Option<ResourcePath>,
    /// Placeholder for the first version of an item, so version sheets can
    /// point at it before the item exists.
    pub first_version_path: Option<ResourcePath>,
    pub root_versions: Vec<ResourcePath>,
    pub data: BTreeMap<String, Sheet>,
    /// Side effects the server reported for the write that produced this.
    pub updated_resources: Option<UpdatedResources>,
}

impl Resource {
    pub fn new(content_type: impl Into<String>, path: ResourcePath) -> Self {
        Self {
            content_type: content_type.into(),
            path,
            parent: None,
            first_version_path: None,
            root_versions: Vec::new(),
            data: BTreeMap::new(),
            updated_resources: None,
        }
    }

    pub fn with_parent(mut self, parent: ResourcePath) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn with_sheet(mut self, name: impl Into<String>, sheet: Sheet) -> Self {
        self.data.insert(name.into(), sheet);
        self
    }

    pub fn sheet(&self, name: &str) -> Option<&Sheet> {
        self.data.get(name)
    }

    pub fn sheet_mut(&mut self, name: &str) -> &mut Sheet {
        self.data.entry(name.to_string()).or_default()
    }

    /// Point the versionable sheet at a single predecessor.
    pub fn set_follows(&mut self, predecessor: &ResourcePath) {
        let mut sheet = Sheet::new();
        sheet.set("follows", vec![Value::String(predecessor.to_string())]);
        self.data.insert(well_known::VERSIONABLE.to_string(), sheet);
    }

    /// Every path this resource points at: its parent plus all values of
    /// reference-typed fields.
    pub fn referenced_paths(&self, meta: &MetaApi) -> Vec<String> {
        let mut refs = Vec::new();
        if let Some(parent) = &self.parent {
            refs.push(parent.to_string());
        }
        for (sheet_name, sheet) in &self.data {
            for (field, value) in sheet.fields() {
                let is_reference = meta
                    .field(sheet_name, field)
                    .map(|f| f.is_reference())
                    .unwrap_or(false);
                if !is_reference {
                    continue;
                }
                match value {
                    Value::String(s) => refs.push(s.clone()),
                    Value::Array(items) => {
                        refs.extend(items.iter().filter_map(|v| v.as_str().map(str::to_string)))
                    }
                    _ => {}
                }
            }
        }
        refs
    }
}
