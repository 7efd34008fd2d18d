use serde::{Deserialize, Serialize};
use std::fmt;

/// A namespaced resource identity.
///
/// The `"<namespace>/<name>"` key is the only equality notion used across the
/// control plane. An empty namespace is representable (cluster-scoped keys
/// render as just `"<name>"`) but most validators reject it.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceIdentifier {
    pub name: String,
    #[serde(default)]
    pub namespace: String,
}

impl ResourceIdentifier {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
        }
    }

    pub fn key(&self) -> String {
        if self.namespace.is_empty() {
            self.name.clone()
        } else {
            format!("{}/{}", self.namespace, self.name)
        }
    }
}

impl fmt::Display for ResourceIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            f.write_str(&self.name)
        } else {
            write!(f, "{}/{}", self.namespace, self.name)
        }
    }
}

macro_rules! typed_ref {
    ($(#[$attr:meta])* $name:ident => $kind:literal) => {
        $(#[$attr])*
        #[derive(
            Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub ResourceIdentifier);

        impl $name {
            /// Kind of the resource this reference points at.
            pub const KIND: &'static str = $kind;

            pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
                Self(ResourceIdentifier::new(namespace, name))
            }

            pub fn id(&self) -> &ResourceIdentifier {
                &self.0
            }

            pub fn name(&self) -> &str {
                &self.0.name
            }

            pub fn namespace(&self) -> &str {
                &self.0.namespace
            }

            pub fn key(&self) -> String {
                self.0.key()
            }
        }

        impl From<ResourceIdentifier> for $name {
            fn from(id: ResourceIdentifier) -> Self {
                Self(id)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }
    };
}

typed_ref! {
    /// Reference to a `Service`.
    ServiceRef => "Service"
}

typed_ref! {
    /// Reference to an `AddressGroup`.
    AddressGroupRef => "AddressGroup"
}

typed_ref! {
    /// Reference to a `ServiceAlias`.
    ServiceAliasRef => "ServiceAlias"
}

typed_ref! {
    /// Reference to a `Network`.
    NetworkRef => "Network"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_includes_namespace() {
        let id = ResourceIdentifier::new("ns1", "svc");
        assert_eq!(id.key(), "ns1/svc");
    }

    #[test]
    fn key_without_namespace_is_bare_name() {
        let id = ResourceIdentifier::new("", "svc");
        assert_eq!(id.key(), "svc");
    }

    #[test]
    fn refs_compare_by_identity() {
        let a = ServiceRef::new("ns1", "svc");
        let b = ServiceRef::from(ResourceIdentifier::new("ns1", "svc"));
        assert_eq!(a, b);
        assert_eq!(a.key(), "ns1/svc");
    }
}
