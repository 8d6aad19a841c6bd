//! Kind table: API group/version, plural and scope per resource kind.
//!
//! The table covers the kinds a typical application manifest uses. Kinds
//! not in the table are assumed namespaced, their plural is derived by
//! lower-casing and appending `s`, and the manifest must name their
//! `apiVersion`.

use declarative::ResourceId;

/// Built-in kinds: (kind, apiVersion, plural, namespaced).
const BUILTIN: &[(&str, &str, &str, bool)] = &[
    ("Namespace", "v1", "namespaces", false),
    ("ServiceAccount", "v1", "serviceaccounts", true),
    ("ConfigMap", "v1", "configmaps", true),
    ("Secret", "v1", "secrets", true),
    ("Service", "v1", "services", true),
    ("Pod", "v1", "pods", true),
    ("PersistentVolumeClaim", "v1", "persistentvolumeclaims", true),
    ("PersistentVolume", "v1", "persistentvolumes", false),
    ("Deployment", "apps/v1", "deployments", true),
    ("StatefulSet", "apps/v1", "statefulsets", true),
    ("DaemonSet", "apps/v1", "daemonsets", true),
    ("Job", "batch/v1", "jobs", true),
    ("Role", "rbac.authorization.k8s.io/v1", "roles", true),
    ("RoleBinding", "rbac.authorization.k8s.io/v1", "rolebindings", true),
    ("ClusterRole", "rbac.authorization.k8s.io/v1", "clusterroles", false),
    (
        "ClusterRoleBinding",
        "rbac.authorization.k8s.io/v1",
        "clusterrolebindings",
        false,
    ),
    ("StorageClass", "storage.k8s.io/v1", "storageclasses", false),
];

/// How the API serves one kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KindInfo {
    /// Kind name, e.g. `Deployment`.
    pub kind: String,
    /// `group/version`, or just `version` for the core group.
    pub api_version: String,
    /// Lower-case plural used in URLs.
    pub plural: String,
    /// Whether objects of this kind live in a namespace.
    pub namespaced: bool,
}

impl KindInfo {
    /// Look up a built-in kind.
    pub fn builtin(kind: &str) -> Option<Self> {
        BUILTIN
            .iter()
            .find(|(k, ..)| *k == kind)
            .map(|&(kind, api_version, plural, namespaced)| Self {
                kind: kind.to_string(),
                api_version: api_version.to_string(),
                plural: plural.to_string(),
                namespaced,
            })
    }

    /// Describe a kind, preferring an explicit `apiVersion` over the table.
    ///
    /// Returns `None` for a kind that is neither built in nor given an
    /// `apiVersion`.
    pub fn resolve(kind: &str, api_version: Option<&str>) -> Option<Self> {
        match (Self::builtin(kind), api_version) {
            (Some(mut info), Some(version)) => {
                info.api_version = version.to_string();
                Some(info)
            }
            (Some(info), None) => Some(info),
            (None, Some(version)) => Some(Self {
                kind: kind.to_string(),
                api_version: version.to_string(),
                plural: format!("{}s", kind.to_lowercase()),
                namespaced: true,
            }),
            (None, None) => None,
        }
    }

    /// URL prefix: `/api/v1` for the core group, `/apis/<group>/<version>` otherwise.
    pub fn base_path(&self) -> String {
        if self.api_version.contains('/') {
            format!("/apis/{}", self.api_version)
        } else {
            format!("/api/{}", self.api_version)
        }
    }

    /// Path of the collection an object is created in.
    pub fn collection_path(&self, namespace: Option<&str>) -> String {
        match namespace {
            Some(ns) if self.namespaced => format!("{}/namespaces/{}/{}", self.base_path(), ns, self.plural),
            _ => format!("{}/{}", self.base_path(), self.plural),
        }
    }

    /// Path of a single object.
    pub fn object_path(&self, id: &ResourceId) -> String {
        format!("{}/{}", self.collection_path(id.namespace.as_deref()), id.name)
    }
}

/// Whether a kind is namespaced; unknown kinds are assumed to be.
pub fn is_namespaced(kind: &str) -> bool {
    KindInfo::builtin(kind).is_none_or(|info| info.namespaced)
}

/// Default `apiVersion` of a built-in kind.
pub fn default_api_version(kind: &str) -> Option<&'static str> {
    BUILTIN
        .iter()
        .find(|(k, ..)| *k == kind)
        .map(|&(_, api_version, ..)| api_version)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_kind_paths() {
        let info = KindInfo::builtin("PersistentVolumeClaim").unwrap();
        let id = ResourceId::namespaced("PersistentVolumeClaim", "nfs", "data");
        assert_eq!(info.collection_path(Some("nfs")), "/api/v1/namespaces/nfs/persistentvolumeclaims");
        assert_eq!(info.object_path(&id), "/api/v1/namespaces/nfs/persistentvolumeclaims/data");
    }

    #[test]
    fn test_group_kind_paths() {
        let info = KindInfo::builtin("ClusterRoleBinding").unwrap();
        let id = ResourceId::cluster("ClusterRoleBinding", "run-nfs-provisioner");
        assert_eq!(
            info.object_path(&id),
            "/apis/rbac.authorization.k8s.io/v1/clusterrolebindings/run-nfs-provisioner"
        );

        let deploy = KindInfo::builtin("Deployment").unwrap();
        assert_eq!(deploy.collection_path(Some("default")), "/apis/apps/v1/namespaces/default/deployments");
    }

    #[test]
    fn test_cluster_scoped_ignores_namespace() {
        let info = KindInfo::builtin("StorageClass").unwrap();
        assert_eq!(info.collection_path(Some("default")), "/apis/storage.k8s.io/v1/storageclasses");
        assert!(!is_namespaced("StorageClass"));
        assert!(is_namespaced("Pod"));
    }

    #[test]
    fn test_unknown_kind_needs_api_version() {
        assert!(KindInfo::resolve("Certificate", None).is_none());
        let info = KindInfo::resolve("Certificate", Some("cert-manager.io/v1")).unwrap();
        assert_eq!(info.plural, "certificates");
        assert!(info.namespaced);
        assert!(is_namespaced("Certificate"));
        assert_eq!(info.base_path(), "/apis/cert-manager.io/v1");
    }

    #[test]
    fn test_explicit_api_version_overrides_table() {
        let info = KindInfo::resolve("Deployment", Some("apps/v1beta2")).unwrap();
        assert_eq!(info.api_version, "apps/v1beta2");
        assert_eq!(info.plural, "deployments");
        assert_eq!(default_api_version("Deployment"), Some("apps/v1"));
        assert_eq!(default_api_version("Widget"), None);
    }
}
