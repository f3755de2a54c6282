//! Conversion between wire JSON and [`Resource`].
//!
//! Wire form: `{content_type, path, data: {sheet: {field: value}}}` plus
//! optional `first_version_path`, `root_versions` and `updated_resources`.

use crate::core::client::HttpCache;
use crate::core::error::{AgoraError, Result};
use crate::core::meta_api::{well_known, MetaApi};
use crate::core::types::{PreliminaryNames, Resource, ResourcePath, Sheet, UpdatedResources};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::str::FromStr;
use tracing::debug;

/// How a pool lists its elements (`elements` query parameter).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ElementsMode {
    #[default]
    Paths,
    Content,
    Omit,
}

impl ElementsMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ElementsMode::Paths => "paths",
            ElementsMode::Content => "content",
            ElementsMode::Omit => "omit",
        }
    }
}

impl FromStr for ElementsMode {
    type Err = AgoraError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "paths" => Ok(ElementsMode::Paths),
            "content" => Ok(ElementsMode::Content),
            "omit" => Ok(ElementsMode::Omit),
            other => Err(AgoraError::Import(format!("unknown elements mode: {}", other))),
        }
    }
}

/// Seed inline pool elements into a cache while importing.
pub struct PoolWarmup<'a> {
    pub cache: &'a HttpCache,
    /// Elements mode the caller asked for; the listing is returned in it.
    pub original_elements: ElementsMode,
}

fn parse_path(value: &Value, what: &str) -> Result<ResourcePath> {
    let s = value
        .as_str()
        .ok_or_else(|| AgoraError::Import(format!("{} is not a string: {}", what, value)))?;
    s.parse()
        .map_err(|_| AgoraError::Import(format!("{} is not a valid path: {}", what, s)))
}

fn check_reference(sheet: &str, field: &str, value: &Value) -> Result<()> {
    let ok = match value {
        Value::Null | Value::String(_) => true,
        // Pools list inline content when asked for `elements=content`.
        Value::Array(items) => items.iter().all(|v| v.is_string() || v.is_object()),
        _ => false,
    };
    if ok {
        Ok(())
    } else {
        Err(AgoraError::Import(format!(
            "reference field {}.{} holds a non-path value: {}",
            sheet, field, value
        )))
    }
}

/// Build a [`Resource`] from its wire form.
///
/// Sheets and fields unknown to `meta` are kept verbatim. Items without a
/// `first_version_path` get a fresh placeholder.
pub fn import_resource(
    wire: &Value,
    meta: &MetaApi,
    names: &PreliminaryNames,
    warmup: Option<&PoolWarmup<'_>>,
) -> Result<Resource> {
    let obj = wire
        .as_object()
        .ok_or_else(|| AgoraError::Import(format!("resource is not an object: {}", wire)))?;

    let content_type = obj
        .get("content_type")
        .and_then(Value::as_str)
        .ok_or_else(|| AgoraError::Import("resource has no content_type".into()))?;
    let schema = meta
        .resource(content_type)
        .ok_or_else(|| AgoraError::Import(format!("unknown content type: {}", content_type)))?;

    let path = match obj.get("path") {
        Some(value) => parse_path(value, "path")?,
        None => return Err(AgoraError::Import("resource has no path".into())),
    };

    let mut data = BTreeMap::new();
    match obj.get("data") {
        None | Some(Value::Null) => {}
        Some(Value::Object(sheets)) => {
            for (sheet_name, fields) in sheets {
                let fields = fields.as_object().ok_or_else(|| {
                    AgoraError::Import(format!("sheet {} is not an object", sheet_name))
                })?;
                if let Some(sheet_schema) = meta.sheet(sheet_name) {
                    for (field, value) in fields {
                        if sheet_schema.field(field).is_some_and(|f| f.is_reference()) {
                            check_reference(sheet_name, field, value)?;
                        }
                    }
                }
                data.insert(sheet_name.clone(), Sheet(fields.clone()));
            }
        }
        Some(other) => {
            return Err(AgoraError::Import(format!("data is not an object: {}", other)));
        }
    }

    let first_version_path = match obj.get("first_version_path") {
        Some(value) if !value.is_null() => Some(parse_path(value, "first_version_path")?),
        _ if schema.is_item => Some(names.next_preliminary()),
        _ => None,
    };

    let root_versions = match obj.get("root_versions") {
        Some(Value::Array(items)) => items
            .iter()
            .map(|v| parse_path(v, "root_versions entry"))
            .collect::<Result<Vec<_>>>()?,
        _ => Vec::new(),
    };

    let updated_resources = match obj.get("updated_resources") {
        Some(value) if !value.is_null() => {
            Some(serde_json::from_value::<UpdatedResources>(value.clone()).map_err(|e| {
                AgoraError::Import(format!("malformed updated_resources: {}", e))
            })?)
        }
        _ => None,
    };

    let mut resource = Resource {
        content_type: content_type.to_string(),
        path,
        parent: None,
        first_version_path,
        root_versions,
        data,
        updated_resources,
    };

    if let Some(warmup) = warmup {
        warm_pool_elements(&mut resource, meta, names, warmup)?;
    }

    Ok(resource)
}

/// Import inline pool elements into the cache, then restore the listing to
/// the elements mode the caller asked for.
fn warm_pool_elements(
    resource: &mut Resource,
    meta: &MetaApi,
    names: &PreliminaryNames,
    warmup: &PoolWarmup<'_>,
) -> Result<()> {
    let pool_path = resource.path.to_string();
    let Some(pool) = resource.data.get_mut(well_known::POOL) else {
        return Ok(());
    };
    let Some(Value::Array(elements)) = pool.get("elements").cloned() else {
        return Ok(());
    };

    let mut paths = Vec::with_capacity(elements.len());
    for element in &elements {
        match element {
            Value::Object(_) => {
                let imported = import_resource(element, meta, names, None)?;
                let path = imported.path.to_string();
                warmup.cache.put_cached(&path, "", imported);
                paths.push(Value::String(path));
            }
            Value::String(path) => paths.push(Value::String(path.clone())),
            other => {
                return Err(AgoraError::Import(format!("bad pool element: {}", other)));
            }
        }
    }
    debug!("warmed {} pool elements of {}", paths.len(), pool_path);

    match warmup.original_elements {
        ElementsMode::Content => {}
        ElementsMode::Paths => pool.set("elements", Value::Array(paths)),
        ElementsMode::Omit => {
            pool.remove("elements");
        }
    }
    Ok(())
}

/// Options for [`export_resource`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ExportOptions {
    /// Keep the metadata sheet, which the server otherwise treats as read-only.
    pub keep_metadata: bool,
    /// The resource is being created; every create-mandatory field of the
    /// sheets present must be set.
    pub creating: bool,
}

/// Turn a [`Resource`] into the body of a write.
///
/// Only fields flagged editable, creatable or create-mandatory survive;
/// sheets unknown to `meta` and sheets left empty are dropped. The path never
/// appears in the body.
pub fn export_resource(meta: &MetaApi, resource: &Resource, opts: ExportOptions) -> Result<Value> {
    if meta.resource(&resource.content_type).is_none() {
        return Err(AgoraError::Export(format!(
            "unknown content type: {}",
            resource.content_type
        )));
    }

    let mut data = Map::new();
    for (sheet_name, sheet) in &resource.data {
        let Some(sheet_schema) = meta.sheet(sheet_name) else {
            debug!("export: dropping unknown sheet {}", sheet_name);
            continue;
        };
        let keep_all = opts.keep_metadata && sheet_name == well_known::METADATA;

        let mut fields = Map::new();
        for (field, value) in sheet.fields() {
            let writable = sheet_schema.field(field).is_some_and(|f| f.is_writable());
            if writable || keep_all {
                fields.insert(field.clone(), value.clone());
            }
        }

        if opts.creating {
            if let Some(missing) = sheet_schema
                .fields()
                .find(|f| f.create_mandatory && !fields.contains_key(&f.name))
            {
                return Err(AgoraError::Export(format!(
                    "missing create-mandatory field {}.{}",
                    sheet_name, missing.name
                )));
            }
        }

        if !fields.is_empty() {
            data.insert(sheet_name.clone(), Value::Object(fields));
        }
    }

    let mut wire = json!({
        "content_type": resource.content_type,
        "data": data,
    });
    if !resource.root_versions.is_empty() {
        let root_versions: Vec<String> =
            resource.root_versions.iter().map(ToString::to_string).collect();
        wire["root_versions"] = json!(root_versions);
    }
    Ok(wire)
}
