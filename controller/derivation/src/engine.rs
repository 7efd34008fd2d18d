//! Rebuilds derived state for the identifiers a batch touched.
//!
//! Order matters: network projections feed address groups, aggregated
//! address groups feed both port mappings and rule generation. Every step
//! compares before writing, so a second run over the same committed state
//! stages nothing.

use crate::port_mapping;
use ahash::AHashMap as HashMap;
use netguard_controller_core::ports::Protocol;
use netguard_controller_core::resources::{
    AddressGroup, AddressGroupBinding, AddressGroupPortMapping, IEAgAgRule, IEAgAgRuleSpec,
    Network, NetworkBinding, NetworkItem, PortSpec, RuleAction, RuleS2S, Service, ServiceAlias,
    Traffic,
};
use netguard_controller_core::{
    ports, AddressGroupRef, Error, Object, ResourceIdentifier, ServiceRef,
};
use netguard_controller_store::{ReadCollection, Scope, StoreError, SyncOp, Writer};
use std::collections::{BTreeMap, BTreeSet};

/// Identifiers a batch touched, by kind. The engine confines every rebuild
/// to resources reachable from this set.
#[derive(Clone, Debug, Default)]
pub struct Touched {
    pub services: BTreeSet<ResourceIdentifier>,
    pub address_groups: BTreeSet<ResourceIdentifier>,
    pub aliases: BTreeSet<ResourceIdentifier>,
    pub rules: BTreeSet<ResourceIdentifier>,
    pub networks: BTreeSet<ResourceIdentifier>,
}

impl Touched {
    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
            && self.address_groups.is_empty()
            && self.aliases.is_empty()
            && self.rules.is_empty()
            && self.networks.is_empty()
    }
}

/// Generated rule priority; user-authored rules order themselves around it.
const GENERATED_RULE_PRIORITY: i32 = 100;

#[derive(Clone, Copy, Debug, Default)]
pub struct DerivationEngine;

impl DerivationEngine {
    pub fn new() -> Self {
        Self
    }

    /// Recomputes all derived state reachable from `touched`, staging the
    /// changes into `store`.
    pub async fn refresh<W: Writer>(&self, store: &mut W, touched: &Touched) -> Result<(), Error> {
        if touched.is_empty() {
            return Ok(());
        }

        let bindings: Vec<AddressGroupBinding> = store.list(&Scope::All).await?;
        let network_bindings: Vec<NetworkBinding> = store.list(&Scope::All).await?;

        self.refresh_networks(store, touched, &network_bindings)
            .await?;
        self.refresh_aggregations(store, touched, &bindings).await?;
        self.refresh_port_mappings(store, touched, &bindings).await?;
        self.refresh_rules(store, touched).await?;

        Ok(())
    }

    /// Maintains `Network::is_bound` and the `Networks` projection on
    /// touched address groups.
    async fn refresh_networks<W: Writer>(
        &self,
        store: &mut W,
        touched: &Touched,
        network_bindings: &[NetworkBinding],
    ) -> Result<(), Error> {
        for network_id in &touched.networks {
            let Some(mut network) = get_opt::<Network, W>(store, network_id).await? else {
                continue;
            };
            let bound = network_bindings
                .iter()
                .any(|nb| nb.spec.network_ref.id() == network_id);
            if network.is_bound != bound {
                network.is_bound = bound;
                store.sync(SyncOp::Upsert, vec![network]).await?;
            }
        }

        // A network change also reshapes the projection of the group it is
        // bound to, whether or not the batch named that group.
        let mut project: BTreeSet<ResourceIdentifier> = touched.address_groups.clone();
        for nb in network_bindings {
            if touched.networks.contains(nb.spec.network_ref.id()) {
                project.insert(nb.spec.address_group_ref.id().clone());
            }
        }

        for ag_id in &project {
            let Some(mut group) = get_opt::<AddressGroup, W>(store, ag_id).await? else {
                continue;
            };

            let mut items = Vec::new();
            for nb in network_bindings {
                if nb.spec.address_group_ref.id() != ag_id {
                    continue;
                }
                let Some(network) =
                    get_opt::<Network, W>(store, nb.spec.network_ref.id()).await?
                else {
                    continue;
                };
                items.push(NetworkItem {
                    name: network.id.name.clone(),
                    cidr: network.spec.cidr.clone(),
                    kind: Network::KIND.to_string(),
                });
            }
            items.sort_by(|a, b| a.name.cmp(&b.name));

            if group.networks != items {
                group.networks = items;
                store.sync(SyncOp::Upsert, vec![group]).await?;
            }
        }

        Ok(())
    }

    /// Step 1: spec groups plus bound groups, per touched service.
    async fn refresh_aggregations<W: Writer>(
        &self,
        store: &mut W,
        touched: &Touched,
        bindings: &[AddressGroupBinding],
    ) -> Result<(), Error> {
        for service_id in &touched.services {
            let Some(mut service) = get_opt::<Service, W>(store, service_id).await? else {
                continue;
            };

            let mut aggregated: BTreeMap<String, AddressGroupRef> = BTreeMap::new();
            for group in &service.spec.address_groups {
                aggregated.insert(group.key(), group.clone());
            }
            for binding in bindings {
                if binding.effective_service_ref().id() == service_id {
                    let group = &binding.spec.address_group_ref;
                    aggregated.insert(group.key(), group.clone());
                }
            }

            let aggregated: Vec<AddressGroupRef> = aggregated.into_values().collect();
            if service.aggregated_address_groups != aggregated {
                tracing::debug!(
                    service = %service.id,
                    groups = aggregated.len(),
                    "Recomputed aggregated address groups",
                );
                service.aggregated_address_groups = aggregated;
                store.sync(SyncOp::Upsert, vec![service]).await?;
            }
        }

        Ok(())
    }

    /// Step 2: rebuild the mapping of every touched address group from the
    /// services currently attached to it, via spec or via binding.
    async fn refresh_port_mappings<W: Writer>(
        &self,
        store: &mut W,
        touched: &Touched,
        bindings: &[AddressGroupBinding],
    ) -> Result<(), Error> {
        let services: Vec<Service> = store.list(&Scope::All).await?;

        // A touched service reshapes the mapping of every group it projects
        // onto, not just the groups the batch named.
        let mut rebuild: BTreeSet<ResourceIdentifier> = touched.address_groups.clone();
        for binding in bindings {
            if touched
                .services
                .contains(binding.effective_service_ref().id())
            {
                rebuild.insert(binding.spec.address_group_ref.id().clone());
            }
        }
        for service in &services {
            if touched.services.contains(&service.id) {
                for group in &service.spec.address_groups {
                    rebuild.insert(group.id().clone());
                }
            }
        }
        if rebuild.is_empty() {
            return Ok(());
        }

        for ag_id in &rebuild {
            let mut attached: BTreeSet<ResourceIdentifier> = BTreeSet::new();
            for binding in bindings {
                if binding.spec.address_group_ref.id() == ag_id {
                    attached.insert(binding.effective_service_ref().id().clone());
                }
            }
            for service in &services {
                if service
                    .spec
                    .address_groups
                    .iter()
                    .any(|group| group.id() == ag_id)
                {
                    attached.insert(service.id.clone());
                }
            }

            let existing = get_opt::<AddressGroupPortMapping, W>(store, ag_id).await?;

            let mut next = existing
                .clone()
                .unwrap_or_else(|| AddressGroupPortMapping::new(ag_id.clone()));
            next.access_ports.clear();
            for service_id in &attached {
                let Some(service) = get_opt::<Service, W>(store, service_id).await? else {
                    continue;
                };
                port_mapping::update_with(
                    &mut next,
                    &ServiceRef::from(service_id.clone()),
                    &service,
                );
            }

            if next.is_empty() {
                if existing.is_some() {
                    store
                        .sync(SyncOp::Delete, vec![next])
                        .await?;
                }
            } else if existing.as_ref() != Some(&next) {
                store.sync(SyncOp::Upsert, vec![next]).await?;
            }
        }

        Ok(())
    }

    /// Step 3: regenerate `IEAgAgRule`s for every touched `RuleS2S`.
    async fn refresh_rules<W: Writer>(&self, store: &mut W, touched: &Touched) -> Result<(), Error> {
        let rules: Vec<RuleS2S> = store.list(&Scope::All).await?;
        let aliases: Vec<ServiceAlias> = store.list(&Scope::All).await?;

        let alias_by_id: HashMap<ResourceIdentifier, &ServiceAlias> =
            aliases.iter().map(|alias| (alias.id.clone(), alias)).collect();

        // A rule is revisited when the batch named it, or when it reads a
        // touched alias or a touched service's aggregation.
        let mut revisit: BTreeSet<ResourceIdentifier> = touched.rules.clone();
        for rule in &rules {
            let local = rule.local_alias_ref();
            let target = rule.target_alias_ref();
            if touched.aliases.contains(local.id()) || touched.aliases.contains(target.id()) {
                revisit.insert(rule.id.clone());
                continue;
            }
            for alias_ref in [&local, &target] {
                if let Some(alias) = alias_by_id.get(alias_ref.id()) {
                    if touched
                        .services
                        .contains(alias.effective_service_ref().id())
                    {
                        revisit.insert(rule.id.clone());
                        break;
                    }
                }
            }
        }

        if revisit.is_empty() {
            return Ok(());
        }

        let rule_by_id: HashMap<ResourceIdentifier, &RuleS2S> =
            rules.iter().map(|rule| (rule.id.clone(), rule)).collect();
        let generated: Vec<IEAgAgRule> = store.list(&Scope::All).await?;

        for rule_id in &revisit {
            let expected = match rule_by_id.get(rule_id) {
                Some(rule) => self.expand_rule(store, rule, &alias_by_id).await?,
                // The rule was deleted; everything derived from it goes.
                None => Vec::new(),
            };

            let rule_key = rule_id.key();
            let expected_ids: BTreeSet<ResourceIdentifier> =
                expected.iter().map(|r| r.id.clone()).collect();

            for mut next in expected {
                match generated.iter().find(|existing| existing.id == next.id) {
                    Some(existing) => {
                        let mut probe = existing.clone();
                        probe.spec = next.spec.clone();
                        probe
                            .meta
                            .labels
                            .insert(IEAgAgRule::DERIVED_FROM_LABEL.to_string(), rule_key.clone());
                        if probe != *existing {
                            store.sync(SyncOp::Upsert, vec![probe]).await?;
                        }
                    }
                    None => {
                        next.meta
                            .labels
                            .insert(IEAgAgRule::DERIVED_FROM_LABEL.to_string(), rule_key.clone());
                        store.sync(SyncOp::Upsert, vec![next]).await?;
                    }
                }
            }

            let stale: Vec<IEAgAgRule> = generated
                .iter()
                .filter(|existing| {
                    existing.derived_from() == Some(rule_key.as_str())
                        && !expected_ids.contains(&existing.id)
                })
                .cloned()
                .collect();
            if !stale.is_empty() {
                tracing::debug!(rule = %rule_id, stale = stale.len(), "Dropping stale generated rules");
                store.sync(SyncOp::Delete, stale).await?;
            }
        }

        Ok(())
    }

    /// Cartesian product of the two services' aggregated groups and the
    /// target's protocols. Tuples without ports produce no rule.
    async fn expand_rule<W: Writer>(
        &self,
        store: &mut W,
        rule: &RuleS2S,
        alias_by_id: &HashMap<ResourceIdentifier, &ServiceAlias>,
    ) -> Result<Vec<IEAgAgRule>, Error> {
        let local_service = match self
            .resolve_alias(store, rule.local_alias_ref().id(), alias_by_id)
            .await?
        {
            Some(service) => service,
            None => return Ok(Vec::new()),
        };
        let target_service = match self
            .resolve_alias(store, rule.target_alias_ref().id(), alias_by_id)
            .await?
        {
            Some(service) => service,
            None => return Ok(Vec::new()),
        };

        let target_ports = port_mapping::project_service(&target_service);

        let mut out = Vec::new();
        for local_group in &local_service.aggregated_address_groups {
            for target_group in &target_service.aggregated_address_groups {
                for protocol in Protocol::ALL {
                    let Some(ranges) = target_ports.get(&protocol) else {
                        continue;
                    };
                    if ranges.is_empty() {
                        continue;
                    }

                    let name =
                        rule_name(rule.spec.traffic, protocol, local_group, target_group);
                    let id = ResourceIdentifier::new(local_group.namespace(), name);
                    out.push(IEAgAgRule::new(
                        id,
                        IEAgAgRuleSpec {
                            transport: protocol,
                            traffic: rule.spec.traffic,
                            address_group_local: local_group.clone(),
                            address_group: target_group.clone(),
                            ports: vec![PortSpec::destination(ports::format_ranges(ranges))],
                            action: RuleAction::Accept,
                            logs: rule.spec.trace,
                            priority: GENERATED_RULE_PRIORITY,
                        },
                    ));
                }
            }
        }

        Ok(out)
    }

    async fn resolve_alias<W: Writer>(
        &self,
        store: &mut W,
        alias_id: &ResourceIdentifier,
        alias_by_id: &HashMap<ResourceIdentifier, &ServiceAlias>,
    ) -> Result<Option<Service>, Error> {
        let Some(alias) = alias_by_id.get(alias_id) else {
            tracing::debug!(alias = %alias_id, "Rule references a missing alias; skipping expansion");
            return Ok(None);
        };
        get_opt::<Service, W>(store, alias.effective_service_ref().id()).await
    }
}

/// Stable identity of a generated rule.
///
/// The readable prefix names the tuple; the FNV-1a suffix keeps the identity
/// injective even when group names contain the separator.
pub fn rule_name(
    traffic: Traffic,
    transport: Protocol,
    local: &AddressGroupRef,
    target: &AddressGroupRef,
) -> String {
    let keyed = format!(
        "{}|{}|{}|{}",
        traffic,
        transport,
        local.key(),
        target.key()
    );
    format!(
        "{}-{}-{}-{}-{:016x}",
        traffic,
        transport.to_string().to_lowercase(),
        local.name(),
        target.name(),
        fnv1a(keyed.as_bytes()),
    )
}

fn fnv1a(data: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in data {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

async fn get_opt<T, R>(store: &R, id: &ResourceIdentifier) -> Result<Option<T>, Error>
where
    T: Object,
    R: ReadCollection<T> + ?Sized,
{
    match store.get(id).await {
        Ok(found) => Ok(Some(found)),
        Err(StoreError::NotFound { .. }) => Ok(None),
        Err(err) => Err(err.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use netguard_controller_core::resources::{
        AddressGroupBindingSpec, IngressPort, RuleS2SSpec, ServiceAliasSpec, ServiceSpec,
    };
    use netguard_controller_core::ServiceAliasRef;
    use netguard_controller_store::mem::MemRegistry;
    use netguard_controller_store::{Registry, WriteCollection};

    fn id(ns: &str, name: &str) -> ResourceIdentifier {
        ResourceIdentifier::new(ns, name)
    }

    fn service(ns: &str, name: &str, ports: &[(Protocol, &str)]) -> Service {
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

    fn binding(ns: &str, name: &str, svc: &str, group: &str) -> AddressGroupBinding {
        AddressGroupBinding::new(
            id(ns, name),
            AddressGroupBindingSpec {
                service_ref: ServiceRef::new(ns, svc),
                address_group_ref: AddressGroupRef::new(ns, group),
            },
        )
    }

    fn alias(ns: &str, name: &str, svc: &str) -> ServiceAlias {
        ServiceAlias::new(
            id(ns, name),
            ServiceAliasSpec {
                service_ref: ServiceRef::new(ns, svc),
            },
        )
    }

    fn rule(ns: &str, name: &str, traffic: Traffic, local: &str, target: &str) -> RuleS2S {
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

    async fn stage_binding_scenario(store: &mut impl Writer) -> Touched {
        store
            .sync(
                SyncOp::Upsert,
                vec![service("ns1", "s", &[(Protocol::Tcp, "80")])],
            )
            .await
            .unwrap();
        store
            .sync(SyncOp::Upsert, vec![AddressGroup::new(id("ns1", "g"))])
            .await
            .unwrap();
        store
            .sync(SyncOp::Upsert, vec![binding("ns1", "b", "s", "g")])
            .await
            .unwrap();

        let mut touched = Touched::default();
        touched.services.insert(id("ns1", "s"));
        touched.address_groups.insert(id("ns1", "g"));
        touched
    }

    #[tokio::test]
    async fn binding_projects_ports_onto_the_group() {
        let registry = MemRegistry::new();
        let mut store = registry.writer().await.unwrap();
        let touched = stage_binding_scenario(&mut store).await;

        DerivationEngine::new()
            .refresh(&mut store, &touched)
            .await
            .unwrap();

        let svc: Service = store.get(&id("ns1", "s")).await.unwrap();
        assert_eq!(
            svc.aggregated_address_groups,
            vec![AddressGroupRef::new("ns1", "g")]
        );

        let mapping: AddressGroupPortMapping = store.get(&id("ns1", "g")).await.unwrap();
        let ports = mapping
            .ports_for(&ServiceRef::new("ns1", "s"))
            .expect("service must be projected");
        assert_eq!(
            ports[&Protocol::Tcp],
            vec![netguard_controller_core::ports::PortRange::single(80)]
        );
    }

    #[tokio::test]
    async fn refresh_is_idempotent() {
        let registry = MemRegistry::new();
        let mut store = registry.writer().await.unwrap();
        let touched = stage_binding_scenario(&mut store).await;

        let engine = DerivationEngine::new();
        engine.refresh(&mut store, &touched).await.unwrap();
        store.commit().await.unwrap();

        let mut store = registry.writer().await.unwrap();
        engine.refresh(&mut store, &touched).await.unwrap();

        // Nothing was re-staged: versions are exactly the committed ones.
        let before = registry.reader().await.unwrap();
        let committed: Service = before.get(&id("ns1", "s")).await.unwrap();
        let staged: Service = store.get(&id("ns1", "s")).await.unwrap();
        assert_eq!(committed.meta.resource_version, staged.meta.resource_version);

        let committed: AddressGroupPortMapping = before.get(&id("ns1", "g")).await.unwrap();
        let staged: AddressGroupPortMapping = store.get(&id("ns1", "g")).await.unwrap();
        assert_eq!(committed.meta.resource_version, staged.meta.resource_version);
    }

    #[tokio::test]
    async fn rule_expansion_emits_one_rule_per_populated_tuple() {
        let registry = MemRegistry::new();
        let mut store = registry.writer().await.unwrap();

        store
            .sync(
                SyncOp::Upsert,
                vec![
                    service("ns1", "s1", &[(Protocol::Tcp, "80")]),
                    service("ns1", "s2", &[(Protocol::Tcp, "443")]),
                ],
            )
            .await
            .unwrap();
        store
            .sync(SyncOp::Upsert, vec![AddressGroup::new(id("ns1", "g"))])
            .await
            .unwrap();
        store
            .sync(
                SyncOp::Upsert,
                vec![binding("ns1", "b1", "s1", "g"), binding("ns1", "b2", "s2", "g")],
            )
            .await
            .unwrap();
        store
            .sync(
                SyncOp::Upsert,
                vec![alias("ns1", "a1", "s1"), alias("ns1", "a2", "s2")],
            )
            .await
            .unwrap();
        store
            .sync(
                SyncOp::Upsert,
                vec![rule("ns1", "r", Traffic::Ingress, "a1", "a2")],
            )
            .await
            .unwrap();

        let mut touched = Touched::default();
        touched.services.insert(id("ns1", "s1"));
        touched.services.insert(id("ns1", "s2"));
        touched.address_groups.insert(id("ns1", "g"));
        touched.rules.insert(id("ns1", "r"));

        let engine = DerivationEngine::new();
        engine.refresh(&mut store, &touched).await.unwrap();

        let generated: Vec<IEAgAgRule> = store.list(&Scope::All).await.unwrap();
        assert_eq!(generated.len(), 1);
        let generated = &generated[0];
        assert_eq!(generated.spec.transport, Protocol::Tcp);
        assert_eq!(generated.spec.traffic, Traffic::Ingress);
        assert_eq!(
            generated.spec.address_group_local,
            AddressGroupRef::new("ns1", "g")
        );
        assert_eq!(generated.spec.address_group, AddressGroupRef::new("ns1", "g"));
        assert_eq!(generated.spec.ports, vec![PortSpec::destination("443")]);
        assert_eq!(generated.derived_from(), Some("ns1/r"));

        // Deleting the rule removes everything derived from it.
        store
            .sync(
                SyncOp::Delete,
                vec![rule("ns1", "r", Traffic::Ingress, "a1", "a2")],
            )
            .await
            .unwrap();
        let mut touched = Touched::default();
        touched.rules.insert(id("ns1", "r"));
        engine.refresh(&mut store, &touched).await.unwrap();

        let generated: Vec<IEAgAgRule> = store.list(&Scope::All).await.unwrap();
        assert!(generated.is_empty());
    }

    #[tokio::test]
    async fn unbinding_the_last_service_drops_the_mapping() {
        let registry = MemRegistry::new();
        let mut store = registry.writer().await.unwrap();
        let touched = stage_binding_scenario(&mut store).await;

        let engine = DerivationEngine::new();
        engine.refresh(&mut store, &touched).await.unwrap();

        store
            .sync(SyncOp::Delete, vec![binding("ns1", "b", "s", "g")])
            .await
            .unwrap();
        engine.refresh(&mut store, &touched).await.unwrap();

        let err = ReadCollection::<AddressGroupPortMapping>::get(&store, &id("ns1", "g"))
            .await
            .unwrap_err();
        assert!(err.is_not_found());

        let svc: Service = store.get(&id("ns1", "s")).await.unwrap();
        assert!(svc.aggregated_address_groups.is_empty());
    }

    #[tokio::test]
    async fn network_binding_projects_cidr_and_marks_bound() {
        let registry = MemRegistry::new();
        let mut store = registry.writer().await.unwrap();

        store
            .sync(
                SyncOp::Upsert,
                vec![Network::new(id("ns1", "n"), "10.0.0.0/24")],
            )
            .await
            .unwrap();
        store
            .sync(SyncOp::Upsert, vec![AddressGroup::new(id("ns1", "g"))])
            .await
            .unwrap();
        store
            .sync(
                SyncOp::Upsert,
                vec![NetworkBinding::new(
                    id("ns1", "nb"),
                    netguard_controller_core::resources::NetworkBindingSpec {
                        network_ref: netguard_controller_core::NetworkRef::new("ns1", "n"),
                        address_group_ref: AddressGroupRef::new("ns1", "g"),
                    },
                )],
            )
            .await
            .unwrap();

        let mut touched = Touched::default();
        touched.networks.insert(id("ns1", "n"));
        touched.address_groups.insert(id("ns1", "g"));

        DerivationEngine::new()
            .refresh(&mut store, &touched)
            .await
            .unwrap();

        let network: Network = store.get(&id("ns1", "n")).await.unwrap();
        assert!(network.is_bound);

        let group: AddressGroup = store.get(&id("ns1", "g")).await.unwrap();
        assert_eq!(group.networks.len(), 1);
        assert_eq!(group.networks[0].name, "n");
        assert_eq!(group.networks[0].cidr, "10.0.0.0/24");
    }

    #[test]
    fn rule_names_are_stable_and_distinct() {
        let g1 = AddressGroupRef::new("ns1", "g1");
        let g2 = AddressGroupRef::new("ns1", "g2");

        let a = rule_name(Traffic::Ingress, Protocol::Tcp, &g1, &g2);
        let b = rule_name(Traffic::Ingress, Protocol::Tcp, &g1, &g2);
        assert_eq!(a, b);
        assert!(a.starts_with("ingress-tcp-g1-g2-"));

        let reversed = rule_name(Traffic::Ingress, Protocol::Tcp, &g2, &g1);
        assert_ne!(a, reversed);
        let egress = rule_name(Traffic::Egress, Protocol::Tcp, &g1, &g2);
        assert_ne!(a, egress);
    }
}
