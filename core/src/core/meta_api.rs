//! Schema table describing which sheets and fields the backend knows.
//!
//! The backend publishes its resource and sheet types once, at `meta_api/`.
//! [`MetaApi`] turns that document into an immutable lookup table that is
//! shared by import, export and the topological sort. Nothing here is
//! process-global; every service gets the table it was constructed with.

use crate::core::client::ClientConfig;
use crate::core::error::{AgoraError, Result};
use crate::core::traits::HttpNetwork;
use crate::core::types::{HttpRequest, Method};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::debug;

/// Names of backend types this crate relies on.
pub mod well_known {
    pub const VERSIONABLE: &str = "adhocracy_core.sheets.versions.IVersionable";
    pub const TAG: &str = "adhocracy_core.sheets.tags.ITag";
    pub const POOL: &str = "adhocracy_core.sheets.pool.IPool";
    pub const METADATA: &str = "adhocracy_core.sheets.metadata.IMetadata";
    pub const ITEM: &str = "adhocracy_core.interfaces.IItem";
    pub const ABSOLUTE_PATH: &str = "adhocracy_core.schema.AbsolutePath";
    /// Tag holding the current head of a version ladder.
    pub const LAST: &str = "LAST";
}

/// One field of a sheet.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldMeta {
    pub name: String,
    pub readable: bool,
    pub editable: bool,
    pub creatable: bool,
    pub create_mandatory: bool,
    pub valuetype: String,
    pub containertype: Option<String>,
}

impl FieldMeta {
    /// Whether the server accepts this field on a write.
    #[inline]
    pub fn is_writable(&self) -> bool {
        self.editable || self.creatable || self.create_mandatory
    }

    /// Whether the field holds paths to other resources.
    #[inline]
    pub fn is_reference(&self) -> bool {
        self.valuetype == well_known::ABSOLUTE_PATH
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SheetMeta {
    pub fields: Vec<FieldMeta>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceMeta {
    pub sheets: Vec<String>,
    pub super_types: Vec<String>,
}

/// Wire form of the meta API document.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetaApiDocument {
    pub sheets: BTreeMap<String, SheetMeta>,
    pub resources: BTreeMap<String, ResourceMeta>,
}

/// Precomputed view of a sheet.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SheetSchema {
    pub name: String,
    fields: HashMap<String, FieldMeta>,
}

impl SheetSchema {
    pub fn field(&self, name: &str) -> Option<&FieldMeta> {
        self.fields.get(name)
    }

    pub fn fields(&self) -> impl Iterator<Item = &FieldMeta> {
        self.fields.values()
    }
}

/// Precomputed view of a resource type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResourceSchema {
    pub content_type: String,
    pub sheets: Vec<String>,
    pub super_types: HashSet<String>,
    /// Items head a version ladder and get a first-version placeholder.
    pub is_item: bool,
}

impl ResourceSchema {
    pub fn has_sheet(&self, name: &str) -> bool {
        self.sheets.iter().any(|s| s == name)
    }
}

/// Immutable lookup table built from the meta API document.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MetaApi {
    sheets: HashMap<String, SheetSchema>,
    resources: HashMap<String, ResourceSchema>,
}

impl MetaApi {
    pub fn new(document: MetaApiDocument) -> Self {
        let sheets = document
            .sheets
            .into_iter()
            .map(|(name, meta)| {
                let fields = meta
                    .fields
                    .into_iter()
                    .map(|f| (f.name.clone(), f))
                    .collect();
                (name.clone(), SheetSchema { name, fields })
            })
            .collect();
        let resources = document
            .resources
            .into_iter()
            .map(|(content_type, meta)| {
                let super_types: HashSet<String> = meta.super_types.into_iter().collect();
                let is_item =
                    content_type == well_known::ITEM || super_types.contains(well_known::ITEM);
                let schema = ResourceSchema {
                    content_type: content_type.clone(),
                    sheets: meta.sheets,
                    super_types,
                    is_item,
                };
                (content_type, schema)
            })
            .collect();
        Self { sheets, resources }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let document: MetaApiDocument = serde_json::from_str(json)?;
        Ok(Self::new(document))
    }

    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        let document: MetaApiDocument = serde_json::from_value(value)?;
        Ok(Self::new(document))
    }

    pub fn resource(&self, content_type: &str) -> Option<&ResourceSchema> {
        self.resources.get(content_type)
    }

    pub fn sheet(&self, name: &str) -> Option<&SheetSchema> {
        self.sheets.get(name)
    }

    pub fn field(&self, sheet: &str, field: &str) -> Option<&FieldMeta> {
        self.sheets.get(sheet).and_then(|s| s.field(field))
    }

    pub fn is_item(&self, content_type: &str) -> bool {
        self.resource(content_type).is_some_and(|r| r.is_item)
    }

    pub fn resource_count(&self) -> usize {
        self.resources.len()
    }
}

/// Load the schema from `<rest_url>/meta_api/`.
pub async fn fetch_meta_api(network: &dyn HttpNetwork, config: &ClientConfig) -> Result<MetaApi> {
    let url = format!("{}/meta_api/", config.rest_url.trim_end_matches('/'));
    let response = network.send(HttpRequest::new(Method::Get, url.as_str())).await?;
    if !response.is_success() {
        return Err(AgoraError::Http(format!(
            "meta api request to {} failed with status {}",
            url, response.status
        )));
    }
    let document: MetaApiDocument = response.body_json()?;
    let meta = MetaApi::new(document);
    debug!("loaded meta api with {} resource types", meta.resource_count());
    Ok(meta)
}
