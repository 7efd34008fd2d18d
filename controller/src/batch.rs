use netguard_controller_core::resources::{
    AddressGroup, AddressGroupBinding, AddressGroupBindingPolicy, AddressGroupPortMapping,
    IEAgAgRule, Network, NetworkBinding, RuleS2S, Service, ServiceAlias,
};
use netguard_controller_core::{Object, ResourceIdentifier};
use std::fmt;

/// Resource kinds a batch may address.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum ResourceKind {
    Service,
    AddressGroup,
    AddressGroupBinding,
    AddressGroupBindingPolicy,
    AddressGroupPortMapping,
    ServiceAlias,
    RuleS2S,
    IEAgAgRule,
    Network,
    NetworkBinding,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Service => Service::KIND,
            ResourceKind::AddressGroup => AddressGroup::KIND,
            ResourceKind::AddressGroupBinding => AddressGroupBinding::KIND,
            ResourceKind::AddressGroupBindingPolicy => AddressGroupBindingPolicy::KIND,
            ResourceKind::AddressGroupPortMapping => AddressGroupPortMapping::KIND,
            ResourceKind::ServiceAlias => ServiceAlias::KIND,
            ResourceKind::RuleS2S => RuleS2S::KIND,
            ResourceKind::IEAgAgRule => IEAgAgRule::KIND,
            ResourceKind::Network => Network::KIND,
            ResourceKind::NetworkBinding => NetworkBinding::KIND,
        }
    }

    /// Derived kinds are owned by the derivation engine; user mutations on
    /// them are rejected before any store access.
    pub fn is_derived(&self) -> bool {
        matches!(
            self,
            ResourceKind::AddressGroupPortMapping | ResourceKind::IEAgAgRule
        )
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A `(kind, identifier)` pair addressing a stored resource.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResourceRef {
    pub kind: ResourceKind,
    pub id: ResourceIdentifier,
}

impl ResourceRef {
    pub fn new(kind: ResourceKind, id: ResourceIdentifier) -> Self {
        Self { kind, id }
    }

    pub fn key(&self) -> String {
        self.id.key()
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.id)
    }
}

/// Closed union over every resource kind.
#[derive(Clone, Debug, PartialEq)]
pub enum Resource {
    Service(Service),
    AddressGroup(AddressGroup),
    AddressGroupBinding(AddressGroupBinding),
    AddressGroupBindingPolicy(AddressGroupBindingPolicy),
    AddressGroupPortMapping(AddressGroupPortMapping),
    ServiceAlias(ServiceAlias),
    RuleS2S(RuleS2S),
    IEAgAgRule(IEAgAgRule),
    Network(Network),
    NetworkBinding(NetworkBinding),
}

impl Resource {
    pub fn kind(&self) -> ResourceKind {
        match self {
            Resource::Service(_) => ResourceKind::Service,
            Resource::AddressGroup(_) => ResourceKind::AddressGroup,
            Resource::AddressGroupBinding(_) => ResourceKind::AddressGroupBinding,
            Resource::AddressGroupBindingPolicy(_) => ResourceKind::AddressGroupBindingPolicy,
            Resource::AddressGroupPortMapping(_) => ResourceKind::AddressGroupPortMapping,
            Resource::ServiceAlias(_) => ResourceKind::ServiceAlias,
            Resource::RuleS2S(_) => ResourceKind::RuleS2S,
            Resource::IEAgAgRule(_) => ResourceKind::IEAgAgRule,
            Resource::Network(_) => ResourceKind::Network,
            Resource::NetworkBinding(_) => ResourceKind::NetworkBinding,
        }
    }

    pub fn id(&self) -> &ResourceIdentifier {
        match self {
            Resource::Service(r) => &r.id,
            Resource::AddressGroup(r) => &r.id,
            Resource::AddressGroupBinding(r) => &r.id,
            Resource::AddressGroupBindingPolicy(r) => &r.id,
            Resource::AddressGroupPortMapping(r) => &r.id,
            Resource::ServiceAlias(r) => &r.id,
            Resource::RuleS2S(r) => &r.id,
            Resource::IEAgAgRule(r) => &r.id,
            Resource::Network(r) => &r.id,
            Resource::NetworkBinding(r) => &r.id,
        }
    }

    pub fn key(&self) -> String {
        self.id().key()
    }

    pub fn to_ref(&self) -> ResourceRef {
        ResourceRef::new(self.kind(), self.id().clone())
    }

    /// Fills blank reference namespaces with the resource's own, so every
    /// later comparison works on fully-qualified references.
    pub(crate) fn normalize(&mut self) {
        fn default_ns(namespace: &mut String, own: &str) {
            if namespace.is_empty() {
                own.clone_into(namespace);
            }
        }

        match self {
            Resource::Service(r) => {
                let ns = r.id.namespace.clone();
                for group in &mut r.spec.address_groups {
                    default_ns(&mut group.0.namespace, &ns);
                }
            }
            Resource::AddressGroupBinding(r) => {
                let ns = r.id.namespace.clone();
                default_ns(&mut r.spec.service_ref.0.namespace, &ns);
                default_ns(&mut r.spec.address_group_ref.0.namespace, &ns);
            }
            Resource::AddressGroupBindingPolicy(r) => {
                let ns = r.id.namespace.clone();
                default_ns(&mut r.spec.service_ref.0.namespace, &ns);
                default_ns(&mut r.spec.address_group_ref.0.namespace, &ns);
            }
            Resource::ServiceAlias(r) => {
                let ns = r.id.namespace.clone();
                default_ns(&mut r.spec.service_ref.0.namespace, &ns);
            }
            Resource::RuleS2S(r) => {
                let ns = r.id.namespace.clone();
                default_ns(&mut r.spec.service_local_ref.0.namespace, &ns);
                default_ns(&mut r.spec.service_ref.0.namespace, &ns);
            }
            Resource::IEAgAgRule(r) => {
                let ns = r.id.namespace.clone();
                default_ns(&mut r.spec.address_group_local.0.namespace, &ns);
                default_ns(&mut r.spec.address_group.0.namespace, &ns);
            }
            Resource::NetworkBinding(r) => {
                let ns = r.id.namespace.clone();
                default_ns(&mut r.spec.network_ref.0.namespace, &ns);
                default_ns(&mut r.spec.address_group_ref.0.namespace, &ns);
            }
            Resource::AddressGroup(_)
            | Resource::AddressGroupPortMapping(_)
            | Resource::Network(_) => {}
        }
    }
}

macro_rules! impl_into_resource {
    ($($ty:ident),* $(,)?) => {
        $(
            impl From<$ty> for Resource {
                fn from(resource: $ty) -> Self {
                    Resource::$ty(resource)
                }
            }
        )*
    };
}

impl_into_resource!(
    Service,
    AddressGroup,
    AddressGroupBinding,
    AddressGroupBindingPolicy,
    AddressGroupPortMapping,
    ServiceAlias,
    RuleS2S,
    IEAgAgRule,
    Network,
    NetworkBinding,
);

/// One step of a batch.
#[derive(Clone, Debug, PartialEq)]
pub enum Mutation {
    Upsert(Resource),
    Delete(ResourceRef),
}

impl Mutation {
    pub fn kind(&self) -> ResourceKind {
        match self {
            Mutation::Upsert(resource) => resource.kind(),
            Mutation::Delete(resource) => resource.kind,
        }
    }

    pub fn id(&self) -> &ResourceIdentifier {
        match self {
            Mutation::Upsert(resource) => resource.id(),
            Mutation::Delete(resource) => &resource.id,
        }
    }
}

/// An ordered list of mutations applied as one transaction.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Batch {
    items: Vec<Mutation>,
}

impl Batch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert(mut self, resource: impl Into<Resource>) -> Self {
        self.items.push(Mutation::Upsert(resource.into()));
        self
    }

    pub fn delete(mut self, kind: ResourceKind, id: ResourceIdentifier) -> Self {
        self.items.push(Mutation::Delete(ResourceRef::new(kind, id)));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn items(&self) -> &[Mutation] {
        &self.items
    }

    pub(crate) fn into_items(self) -> Vec<Mutation> {
        self.items
    }
}
