use kube::core::GroupVersionKind;

use crate::{GroupKind, MapperError, RestMapper, RestMapping};

// Please keep this alphabetized
const SHORT_FORMS: &[(&str, &str)] = &[
    ("cs", "componentstatuses"),
    ("ds", "daemonsets"),
    ("ep", "endpoints"),
    ("ev", "events"),
    ("hpa", "horizontalpodautoscalers"),
    ("ing", "ingresses"),
    ("limits", "limitranges"),
    ("no", "nodes"),
    ("ns", "namespaces"),
    ("po", "pods"),
    ("pv", "persistentvolumes"),
    ("pvc", "persistentvolumeclaims"),
    ("quota", "resourcequotas"),
    ("rc", "replicationcontrollers"),
    ("svc", "services"),
];

/// Canonical resource name for a known shortcut; anything else is returned unchanged.
pub fn expand_resource_shortcut(resource: &str) -> &str {
    match SHORT_FORMS.binary_search_by(|(short, _)| short.cmp(&resource)) {
        Ok(ix) => SHORT_FORMS[ix].1,
        Err(_) => resource,
    }
}

/// Expands resource shortcuts before delegating.
pub struct ShortcutExpander<M> {
    inner: M,
}

impl<M: RestMapper> ShortcutExpander<M> {
    pub fn new(inner: M) -> Self { Self { inner } }
}

impl<M: RestMapper> RestMapper for ShortcutExpander<M> {
    fn kind_for(&self, resource: &str) -> Result<GroupVersionKind, MapperError> {
        self.inner.kind_for(expand_resource_shortcut(resource))
    }

    fn resource_is_valid(&self, resource: &str) -> bool {
        self.inner.resource_is_valid(expand_resource_shortcut(resource))
    }

    fn rest_mapping(&self, gk: &GroupKind, versions: &[&str]) -> Result<RestMapping, MapperError> {
        self.inner.rest_mapping(gk, versions)
    }
}
