use kube::core::GroupVersionKind;

use crate::{GroupKind, GroupVersion, MapperError, RestMapper, RestMapping};

/// Prefers a configured output version per API group before the caller's versions.
///
/// Only the first entry in `output_versions` for a given group has effect.
pub struct OutputVersionMapper<M> {
    inner: M,
    output_versions: Vec<GroupVersion>,
}

impl<M: RestMapper> OutputVersionMapper<M> {
    pub fn new(inner: M, output_versions: Vec<GroupVersion>) -> Self { Self { inner, output_versions } }
}

impl<M: RestMapper> RestMapper for OutputVersionMapper<M> {
    fn kind_for(&self, resource: &str) -> Result<GroupVersionKind, MapperError> { self.inner.kind_for(resource) }

    fn resource_is_valid(&self, resource: &str) -> bool { self.inner.resource_is_valid(resource) }

    fn rest_mapping(&self, gk: &GroupKind, versions: &[&str]) -> Result<RestMapping, MapperError> {
        if let Some(preferred) = self.output_versions.iter().find(|gv| gv.group == gk.group) {
            if let Ok(mapping) = self.inner.rest_mapping(gk, &[preferred.version.as_str()]) {
                return Ok(mapping);
            }
        }
        self.inner.rest_mapping(gk, versions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::builtins;

    fn gv(s: &str) -> GroupVersion { GroupVersion::parse(s).unwrap() }

    #[test]
    fn preferred_version_wins_for_its_group() {
        let m = OutputVersionMapper::new(builtins(), vec![gv("apps/v1beta2")]);
        let got = m.rest_mapping(&GroupKind::new("apps", "DaemonSet"), &["v1"]).unwrap();
        assert_eq!(got.gvk.version, "v1beta2");
    }

    #[test]
    fn only_first_hit_per_group_counts() {
        // second apps entry would match but is never consulted
        let m = OutputVersionMapper::new(builtins(), vec![gv("apps/v9"), gv("apps/v1beta2")]);
        let got = m.rest_mapping(&GroupKind::new("apps", "DaemonSet"), &["v1"]).unwrap();
        assert_eq!(got.gvk.version, "v1");
    }

    #[test]
    fn other_groups_fall_back_to_caller_versions() {
        let m = OutputVersionMapper::new(builtins(), vec![gv("apps/v1beta2")]);
        let got = m.rest_mapping(&GroupKind::new("extensions", "Ingress"), &["v1beta1"]).unwrap();
        assert_eq!(got.gvk.group, "extensions");
        assert!(m.rest_mapping(&GroupKind::new("extensions", "Ingress"), &["v2"]).is_err());
        assert_eq!(m.kind_for("pods").unwrap().kind, "Pod");
    }
}
