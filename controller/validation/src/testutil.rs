//! Shared fixtures for validator tests.

use netguard_controller_core::ports::Protocol;
use netguard_controller_core::resources::{
    AddressGroup, AddressGroupBinding, AddressGroupBindingPolicy, AddressGroupBindingPolicySpec,
    AddressGroupBindingSpec, IngressPort, Network, NetworkBinding, NetworkBindingSpec, RuleS2S,
    RuleS2SSpec, Service, ServiceAlias, ServiceAliasSpec, ServiceSpec, Traffic,
};
use netguard_controller_core::{
    AddressGroupRef, NetworkRef, ResourceIdentifier, ServiceAliasRef, ServiceRef,
};
use netguard_controller_derivation::{DerivationEngine, Touched};
use netguard_controller_store::mem::MemRegistry;
use netguard_controller_store::{ReadCollection, Registry, Scope, SyncOp, WriteCollection, Writer};

pub(crate) fn id(ns: &str, name: &str) -> ResourceIdentifier {
    ResourceIdentifier::new(ns, name)
}

pub(crate) fn service(ns: &str, name: &str, ports: &[(Protocol, &str)]) -> Service {
    Service::new(
        id(ns, name),
        ServiceSpec {
            ingress_ports: ports
                .iter()
                .map(|(protocol, spec)| IngressPort::new(*protocol, *spec))
                .collect(),
            ..ServiceSpec::default()
        },
    )
}

pub(crate) fn group(ns: &str, name: &str) -> AddressGroup {
    AddressGroup::new(id(ns, name))
}

pub(crate) fn binding(ns: &str, name: &str, svc: &str, group: &str) -> AddressGroupBinding {
    binding_to(ns, name, svc, ns, group)
}

pub(crate) fn binding_to(
    ns: &str,
    name: &str,
    svc: &str,
    group_ns: &str,
    group: &str,
) -> AddressGroupBinding {
    AddressGroupBinding::new(
        id(ns, name),
        AddressGroupBindingSpec {
            service_ref: ServiceRef::new(ns, svc),
            address_group_ref: AddressGroupRef::new(group_ns, group),
        },
    )
}

pub(crate) fn policy(
    ns: &str,
    name: &str,
    svc_ns: &str,
    svc: &str,
    group: &str,
) -> AddressGroupBindingPolicy {
    AddressGroupBindingPolicy::new(
        id(ns, name),
        AddressGroupBindingPolicySpec {
            service_ref: ServiceRef::new(svc_ns, svc),
            address_group_ref: AddressGroupRef::new(ns, group),
        },
    )
}

pub(crate) fn alias(ns: &str, name: &str, svc: &str) -> ServiceAlias {
    ServiceAlias::new(
        id(ns, name),
        ServiceAliasSpec {
            service_ref: ServiceRef::new(ns, svc),
        },
    )
}

pub(crate) fn rule(
    ns: &str,
    name: &str,
    traffic: Traffic,
    local: &str,
    target: &str,
) -> RuleS2S {
    RuleS2S::new(
        id(ns, name),
        RuleS2SSpec {
            traffic,
            service_local_ref: ServiceAliasRef::new(ns, local),
            service_ref: ServiceAliasRef::new(ns, target),
            trace: false,
        },
    )
}

pub(crate) fn network(ns: &str, name: &str, cidr: &str) -> Network {
    Network::new(id(ns, name), cidr)
}

pub(crate) fn network_binding(
    ns: &str,
    name: &str,
    net: &str,
    group: &str,
) -> NetworkBinding {
    NetworkBinding::new(
        id(ns, name),
        NetworkBindingSpec {
            network_ref: NetworkRef::new(ns, net),
            address_group_ref: AddressGroupRef::new(ns, group),
        },
    )
}

#[derive(Default)]
pub(crate) struct Stage {
    services: Vec<Service>,
    groups: Vec<AddressGroup>,
    bindings: Vec<AddressGroupBinding>,
    policies: Vec<AddressGroupBindingPolicy>,
    aliases: Vec<ServiceAlias>,
    rules: Vec<RuleS2S>,
    networks: Vec<Network>,
    network_bindings: Vec<NetworkBinding>,
}

impl Stage {
    pub(crate) fn service(&mut self, service: Service) {
        self.services.push(service);
    }

    pub(crate) fn group(&mut self, group: AddressGroup) {
        self.groups.push(group);
    }

    pub(crate) fn binding(&mut self, binding: AddressGroupBinding) {
        self.bindings.push(binding);
    }

    pub(crate) fn policy(&mut self, policy: AddressGroupBindingPolicy) {
        self.policies.push(policy);
    }

    pub(crate) fn alias(&mut self, alias: ServiceAlias) {
        self.aliases.push(alias);
    }

    pub(crate) fn rule(&mut self, rule: RuleS2S) {
        self.rules.push(rule);
    }

    pub(crate) fn network(&mut self, network: Network) {
        self.networks.push(network);
    }

    pub(crate) fn network_binding(&mut self, binding: NetworkBinding) {
        self.network_bindings.push(binding);
    }
}

/// Commits the staged fixtures and returns the registry.
pub(crate) async fn seed(build: impl FnOnce(&mut Stage)) -> MemRegistry {
    let registry = MemRegistry::new();
    let mut stage = Stage::default();
    build(&mut stage);

    let mut writer = registry.writer().await.unwrap();
    writer.sync(SyncOp::Upsert, stage.services).await.unwrap();
    writer.sync(SyncOp::Upsert, stage.groups).await.unwrap();
    writer.sync(SyncOp::Upsert, stage.bindings).await.unwrap();
    writer.sync(SyncOp::Upsert, stage.policies).await.unwrap();
    writer.sync(SyncOp::Upsert, stage.aliases).await.unwrap();
    writer.sync(SyncOp::Upsert, stage.rules).await.unwrap();
    writer.sync(SyncOp::Upsert, stage.networks).await.unwrap();
    writer
        .sync(SyncOp::Upsert, stage.network_bindings)
        .await
        .unwrap();
    writer.commit().await.unwrap();
    registry
}

/// Runs the derivation engine over everything committed so far.
pub(crate) async fn derive_all(registry: &MemRegistry) {
    let mut writer = registry.writer().await.unwrap();

    let mut touched = Touched::default();
    let services: Vec<Service> = writer.list(&Scope::All).await.unwrap();
    touched.services.extend(services.into_iter().map(|s| s.id));
    let groups: Vec<AddressGroup> = writer.list(&Scope::All).await.unwrap();
    touched.address_groups.extend(groups.into_iter().map(|g| g.id));
    let aliases: Vec<ServiceAlias> = writer.list(&Scope::All).await.unwrap();
    touched.aliases.extend(aliases.into_iter().map(|a| a.id));
    let rules: Vec<RuleS2S> = writer.list(&Scope::All).await.unwrap();
    touched.rules.extend(rules.into_iter().map(|r| r.id));
    let networks: Vec<Network> = writer.list(&Scope::All).await.unwrap();
    touched.networks.extend(networks.into_iter().map(|n| n.id));

    DerivationEngine::new()
        .refresh(&mut writer, &touched)
        .await
        .unwrap();
    writer.commit().await.unwrap();
}
