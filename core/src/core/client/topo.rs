//! Posting order for a set of interdependent new resources.

use crate::core::error::{AgoraError, Result};
use crate::core::meta_api::MetaApi;
use crate::core::types::Resource;
use std::collections::{BTreeSet, HashMap};

/// Order `resources` so that every resource comes after everything it
/// references (parent or reference-typed field) within the set.
///
/// Returns indices into `resources`. Among resources that are ready at the
/// same time, the one earlier in the input goes first. A resource may be
/// referenced by its path or by its first-version placeholder.
pub fn sort_topologically(resources: &[Resource], meta: &MetaApi) -> Result<Vec<usize>> {
    let mut by_path: HashMap<String, usize> = HashMap::new();
    for (i, resource) in resources.iter().enumerate() {
        by_path.insert(resource.path.to_string(), i);
        if let Some(first) = &resource.first_version_path {
            by_path.insert(first.to_string(), i);
        }
    }

    let mut dependents: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); resources.len()];
    let mut in_degree = vec![0usize; resources.len()];
    for (i, resource) in resources.iter().enumerate() {
        let deps: BTreeSet<usize> = resource
            .referenced_paths(meta)
            .iter()
            .filter_map(|p| by_path.get(p).copied())
            .filter(|&j| j != i)
            .collect();
        in_degree[i] = deps.len();
        for j in deps {
            dependents[j].insert(i);
        }
    }

    let mut ready: BTreeSet<usize> = (0..resources.len()).filter(|&i| in_degree[i] == 0).collect();
    let mut order = Vec::with_capacity(resources.len());
    while let Some(i) = ready.pop_first() {
        order.push(i);
        for &d in &dependents[i] {
            in_degree[d] -= 1;
            if in_degree[d] == 0 {
                ready.insert(d);
            }
        }
    }

    if order.len() < resources.len() {
        let stuck = (0..resources.len())
            .filter(|i| in_degree[*i] > 0)
            .map(|i| resources[i].path.to_string())
            .collect();
        return Err(AgoraError::CyclicReference(stuck));
    }
    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{ResourcePath, Sheet};
    use serde_json::json;

    fn meta() -> MetaApi {
        MetaApi::from_value(json!({
            "sheets": {
                "adhocracy_core.sheets.versions.IVersionable": {"fields": [
                    {"name": "follows", "readable": true, "creatable": true,
                     "valuetype": "adhocracy_core.schema.AbsolutePath", "containertype": "list"}
                ]},
                "s.IRef": {"fields": [
                    {"name": "target", "readable": true, "editable": true,
                     "valuetype": "adhocracy_core.schema.AbsolutePath"}
                ]}
            },
            "resources": {"r.I": {"sheets": []}, "r.V": {"sheets": []}}
        }))
        .unwrap()
    }

    #[test]
    fn test_version_after_item() {
        let mut item = Resource::new("r.I", ResourcePath::Preliminary(0))
            .with_parent(ResourcePath::real("/pool/"));
        item.first_version_path = Some(ResourcePath::Preliminary(1));
        let mut version = Resource::new("r.V", ResourcePath::Preliminary(2))
            .with_parent(ResourcePath::Preliminary(0));
        version.set_follows(&ResourcePath::Preliminary(1));

        let order = sort_topologically(&[version, item], &meta()).unwrap();
        assert_eq!(order, vec![1, 0]);
    }

    #[test]
    fn test_independent_keep_input_order() {
        let a = Resource::new("r.I", ResourcePath::Preliminary(0));
        let b = Resource::new("r.I", ResourcePath::Preliminary(1));
        let c = Resource::new("r.I", ResourcePath::Preliminary(2));
        assert_eq!(sort_topologically(&[a, b, c], &meta()).unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn test_stable_among_ready() {
        // c references a; b is independent.
        let a = Resource::new("r.I", ResourcePath::Preliminary(0));
        let c = Resource::new("r.I", ResourcePath::Preliminary(2)).with_sheet(
            "s.IRef",
            Sheet::new().with("target", "@0"),
        );
        let b = Resource::new("r.I", ResourcePath::Preliminary(1));
        assert_eq!(sort_topologically(&[c, b, a], &meta()).unwrap(), vec![1, 2, 0]);
    }

    #[test]
    fn test_cycle_detected() {
        let a = Resource::new("r.I", ResourcePath::Preliminary(0))
            .with_sheet("s.IRef", Sheet::new().with("target", "@1"));
        let b = Resource::new("r.I", ResourcePath::Preliminary(1))
            .with_sheet("s.IRef", Sheet::new().with("target", "@0"));
        let err = sort_topologically(&[a, b], &meta()).unwrap_err();
        assert_eq!(err, AgoraError::CyclicReference(vec!["@0".into(), "@1".into()]));
    }

    #[test]
    fn test_self_reference_ignored() {
        let a = Resource::new("r.I", ResourcePath::Preliminary(0))
            .with_sheet("s.IRef", Sheet::new().with("target", "@0"));
        assert_eq!(sort_topologically(&[a], &meta()).unwrap(), vec![0]);
    }

    #[test]
    fn test_external_references_ignored() {
        let a = Resource::new("r.I", ResourcePath::Preliminary(0))
            .with_parent(ResourcePath::real("/pool/"))
            .with_sheet("s.IRef", Sheet::new().with("target", "/elsewhere/"));
        assert_eq!(sort_topologically(&[a], &meta()).unwrap(), vec![0]);
    }
}
