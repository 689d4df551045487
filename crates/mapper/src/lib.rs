//! dynapi mapper: kind/version <-> resource resolution.
//!
//! [`DefaultRestMapper`] is the base table. [`OutputVersionMapper`] and
//! [`ShortcutExpander`] decorate any [`RestMapper`].

#![forbid(unsafe_code)]

use std::fmt;

use dynapi_core::Schema;
use dynapi_kubehub::DiscoveredResource;
use kube::core::GroupVersionKind;
use serde::{Deserialize, Serialize};

mod expand;
mod output;

pub use expand::{expand_resource_shortcut, ShortcutExpander};
pub use output::OutputVersionMapper;

/// API group that dynamically registered schemas are served under.
pub const CUSTOM_GROUP: &str = "custom";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupKind {
    pub group: String,
    pub kind: String,
}

impl GroupKind {
    pub fn new(group: impl Into<String>, kind: impl Into<String>) -> Self {
        Self { group: group.into(), kind: kind.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupVersion {
    pub group: String,
    pub version: String,
}

impl GroupVersion {
    /// Parse `group/version`, or a bare `version` for the core group.
    pub fn parse(s: &str) -> Result<Self, MapperError> {
        match s.split('/').collect::<Vec<_>>().as_slice() {
            [version] if !version.is_empty() => Ok(Self { group: String::new(), version: (*version).to_string() }),
            [group, version] if !group.is_empty() && !version.is_empty() => {
                Ok(Self { group: (*group).to_string(), version: (*version).to_string() })
            }
            _ => Err(MapperError::InvalidGroupVersion(s.to_string())),
        }
    }
}

impl fmt::Display for GroupVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.group.is_empty() { write!(f, "{}", self.version) } else { write!(f, "{}/{}", self.group, self.version) }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RestScope {
    Namespaced,
    Cluster,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestMapping {
    pub resource: String,
    pub gvk: GroupVersionKind,
    pub scope: RestScope,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum MapperError {
    #[error("no resource matches {0:?}")]
    NoResourceMatch(String),
    #[error("no kind {kind:?} in group {group:?} for versions {versions:?}")]
    NoKindMatch { group: String, kind: String, versions: Vec<String> },
    #[error("invalid group/version {0:?}")]
    InvalidGroupVersion(String),
}

/// Resolves resources to kinds and kinds to REST mappings.
pub trait RestMapper: Send + Sync {
    fn kind_for(&self, resource: &str) -> Result<GroupVersionKind, MapperError>;
    fn resource_is_valid(&self, resource: &str) -> bool { self.kind_for(resource).is_ok() }
    /// Tries `versions` in order; with no versions, the first registered version wins.
    fn rest_mapping(&self, gk: &GroupKind, versions: &[&str]) -> Result<RestMapping, MapperError>;
}

#[derive(Debug, Clone)]
struct Entry {
    gvk: GroupVersionKind,
    plural: String,
    singular: String,
    scope: RestScope,
}

/// Insertion-ordered kind/resource table. Earlier registrations take priority.
#[derive(Debug, Clone, Default)]
pub struct DefaultRestMapper {
    entries: Vec<Entry>,
}

/// Lowercase plural for a kind, e.g. `Ingress` -> `ingresses`, `Policy` -> `policies`.
pub fn kind_to_resource(kind: &str) -> String {
    let lower = kind.to_ascii_lowercase();
    if lower.is_empty() { return lower; }
    if lower.ends_with('s') { return format!("{}es", lower); }
    if let Some(stem) = lower.strip_suffix('y') { return format!("{}ies", stem); }
    format!("{}s", lower)
}

impl DefaultRestMapper {
    pub fn new() -> Self { Self::default() }

    pub fn add(&mut self, gvk: GroupVersionKind, scope: RestScope) {
        let plural = kind_to_resource(&gvk.kind);
        self.add_with_plural(gvk, plural, scope);
    }

    pub fn add_with_plural(&mut self, gvk: GroupVersionKind, plural: impl Into<String>, scope: RestScope) {
        let singular = gvk.kind.to_ascii_lowercase();
        self.entries.push(Entry { gvk, plural: plural.into().to_ascii_lowercase(), singular, scope });
    }

    pub fn from_discovered(resources: &[DiscoveredResource]) -> Self {
        let mut m = Self::new();
        for r in resources.iter() {
            let gvk = GroupVersionKind { group: r.group.clone(), version: r.version.clone(), kind: r.kind.clone() };
            let scope = if r.namespaced { RestScope::Namespaced } else { RestScope::Cluster };
            m.add_with_plural(gvk, r.plural.clone(), scope);
        }
        m
    }

    /// One mapping per schema version, in the `custom` group; kind and resource are the schema name.
    pub fn from_schemas(schemas: &[Schema]) -> Self {
        let mut m = Self::new();
        for s in schemas.iter() {
            for v in s.versions.iter() {
                let gvk = GroupVersionKind { group: CUSTOM_GROUP.to_string(), version: v.name.clone(), kind: s.name().to_string() };
                m.add_with_plural(gvk, s.name(), RestScope::Namespaced);
            }
        }
        m
    }

    pub fn len(&self) -> usize { self.entries.len() }

    pub fn is_empty(&self) -> bool { self.entries.is_empty() }
}

impl RestMapper for DefaultRestMapper {
    fn kind_for(&self, resource: &str) -> Result<GroupVersionKind, MapperError> {
        let r = resource.to_ascii_lowercase();
        self.entries
            .iter()
            .find(|e| e.plural == r || e.singular == r)
            .map(|e| e.gvk.clone())
            .ok_or_else(|| MapperError::NoResourceMatch(resource.to_string()))
    }

    fn rest_mapping(&self, gk: &GroupKind, versions: &[&str]) -> Result<RestMapping, MapperError> {
        let matches_gk = |e: &&Entry| e.gvk.group == gk.group && e.gvk.kind == gk.kind;
        let found = if versions.is_empty() {
            self.entries.iter().find(matches_gk)
        } else {
            versions.iter().find_map(|v| self.entries.iter().filter(matches_gk).find(|e| e.gvk.version == *v))
        };
        found
            .map(|e| RestMapping { resource: e.plural.clone(), gvk: e.gvk.clone(), scope: e.scope })
            .ok_or_else(|| MapperError::NoKindMatch {
                group: gk.group.clone(),
                kind: gk.kind.clone(),
                versions: versions.iter().map(|v| v.to_string()).collect(),
            })
    }
}

#[cfg(test)]
pub(crate) mod testutil {
    use super::*;

    pub fn gvk(group: &str, version: &str, kind: &str) -> GroupVersionKind {
        GroupVersionKind { group: group.into(), version: version.into(), kind: kind.into() }
    }

    pub fn builtins() -> DefaultRestMapper {
        let mut m = DefaultRestMapper::new();
        m.add(gvk("", "v1", "Pod"), RestScope::Namespaced);
        m.add(gvk("", "v1", "Service"), RestScope::Namespaced);
        m.add(gvk("", "v1", "Node"), RestScope::Cluster);
        m.add(gvk("extensions", "v1beta1", "Ingress"), RestScope::Namespaced);
        m.add(gvk("networking.k8s.io", "v1", "Ingress"), RestScope::Namespaced);
        m.add(gvk("apps", "v1", "DaemonSet"), RestScope::Namespaced);
        m.add(gvk("apps", "v1beta2", "DaemonSet"), RestScope::Namespaced);
        m
    }
}

#[cfg(test)]
mod tests {
    use super::testutil::*;
    use super::*;
    use dynapi_core::Version;

    #[test]
    fn pluralizes_kinds() {
        assert_eq!(kind_to_resource("Pod"), "pods");
        assert_eq!(kind_to_resource("Ingress"), "ingresses");
        assert_eq!(kind_to_resource("NetworkPolicy"), "networkpolicies");
    }

    #[test]
    fn kind_for_accepts_plural_and_singular() {
        let m = builtins();
        assert_eq!(m.kind_for("pods").unwrap(), gvk("", "v1", "Pod"));
        assert_eq!(m.kind_for("Pod").unwrap(), gvk("", "v1", "Pod"));
        assert!(m.resource_is_valid("nodes"));
        assert!(!m.resource_is_valid("po"));
    }

    #[test]
    fn rest_mapping_tries_versions_in_order() {
        let m = builtins();
        let gk = GroupKind::new("apps", "DaemonSet");
        assert_eq!(m.rest_mapping(&gk, &["v9", "v1beta2", "v1"]).unwrap().gvk.version, "v1beta2");
        assert_eq!(m.rest_mapping(&gk, &[]).unwrap().gvk.version, "v1");
        let err = m.rest_mapping(&gk, &["v9"]).unwrap_err();
        assert!(matches!(err, MapperError::NoKindMatch { .. }));
        let mapping = m.rest_mapping(&GroupKind::new("", "Node"), &[]).unwrap();
        assert_eq!(mapping.resource, "nodes");
        assert_eq!(mapping.scope, RestScope::Cluster);
    }

    #[test]
    fn schema_mapper_registers_every_version() {
        let s = Schema::new("widgets", vec![
            Version { name: "v1".into(), spec: Default::default() },
            Version { name: "v2".into(), spec: Default::default() },
        ]);
        let m = DefaultRestMapper::from_schemas(&[s]);
        assert_eq!(m.len(), 2);
        assert_eq!(m.kind_for("widgets").unwrap(), gvk(CUSTOM_GROUP, "v1", "widgets"));
        let gk = GroupKind::new(CUSTOM_GROUP, "widgets");
        assert_eq!(m.rest_mapping(&gk, &["v2"]).unwrap().resource, "widgets");
    }

    #[test]
    fn from_discovered_keeps_server_plural() {
        let m = DefaultRestMapper::from_discovered(&[DiscoveredResource {
            group: "example.com".into(),
            version: "v1".into(),
            kind: "Octopus".into(),
            plural: "octopodes".into(),
            namespaced: false,
        }]);
        assert_eq!(m.kind_for("octopodes").unwrap().kind, "Octopus");
        let mapping = m.rest_mapping(&GroupKind::new("example.com", "Octopus"), &["v1"]).unwrap();
        assert_eq!(mapping.scope, RestScope::Cluster);
    }

    #[test]
    fn group_version_parse_and_display() {
        assert_eq!(GroupVersion::parse("v1").unwrap().to_string(), "v1");
        let gv = GroupVersion::parse("apps/v1beta2").unwrap();
        assert_eq!(gv.group, "apps");
        assert_eq!(gv.to_string(), "apps/v1beta2");
        assert!(GroupVersion::parse("a/b/c").is_err());
        assert!(GroupVersion::parse("").is_err());
    }
}
