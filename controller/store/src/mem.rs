//! In-memory registry with snapshot isolation.
//!
//! Readers clone the committed tables; writers stage mutations on a private
//! clone and publish them atomically on commit. Commit performs optimistic
//! concurrency per resource: a staged change whose base version no longer
//! matches the committed version fails the whole transaction.

use crate::{ReadCollection, Registry, Scope, StoreError, SyncOp, WriteCollection, Writer};
use async_trait::async_trait;
use chrono::Utc;
use netguard_controller_core::resources::{
    AddressGroup, AddressGroupBinding, AddressGroupBindingPolicy, AddressGroupPortMapping,
    IEAgAgRule, Network, NetworkBinding, RuleS2S, Service, ServiceAlias,
};
use netguard_controller_core::{Object, ResourceIdentifier};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;

type Table<T> = BTreeMap<ResourceIdentifier, T>;

fn list_table<T: Object>(table: &Table<T>, scope: &Scope) -> Vec<T> {
    table
        .values()
        .filter(|obj| scope.matches(obj.id()))
        .cloned()
        .collect()
}

fn get_table<T: Object>(table: &Table<T>, id: &ResourceIdentifier) -> Result<T, StoreError> {
    table
        .get(id)
        .cloned()
        .ok_or_else(|| StoreError::not_found::<T>(id))
}

fn upsert_table<T: Object>(table: &mut Table<T>, mut item: T) {
    match table.get(item.id()) {
        Some(prior) => {
            let changed = {
                let mut probe = prior.clone();
                *probe.meta_mut() = item.meta().clone();
                probe != item
            };
            let prior_meta = prior.meta().clone();
            let meta = item.meta_mut();
            meta.resource_version = prior_meta.resource_version + 1;
            meta.created_at = prior_meta.created_at;
            meta.generation = if changed {
                prior_meta.generation + 1
            } else {
                prior_meta.generation
            };
        }
        None => {
            let meta = item.meta_mut();
            meta.resource_version = 1;
            meta.generation = 1;
            if meta.created_at.is_none() {
                meta.created_at = Some(Utc::now());
            }
        }
    }
    table.insert(item.id().clone(), item);
}

fn version_of<T: Object>(entry: Option<&T>) -> Option<u64> {
    entry.map(|obj| obj.meta().resource_version)
}

/// Keys whose staged state differs from the transaction's base snapshot.
fn delta_keys<T: Object>(base: &Table<T>, pending: &Table<T>) -> Vec<ResourceIdentifier> {
    let mut keys = Vec::new();
    for (id, staged) in pending {
        if base.get(id) != Some(staged) {
            keys.push(id.clone());
        }
    }
    for id in base.keys() {
        if !pending.contains_key(id) {
            keys.push(id.clone());
        }
    }
    keys
}

fn verify_table<T: Object>(
    committed: &Table<T>,
    base: &Table<T>,
    pending: &Table<T>,
) -> Result<(), StoreError> {
    for id in delta_keys(base, pending) {
        if version_of(committed.get(&id)) != version_of(base.get(&id)) {
            return Err(StoreError::VersionConflict {
                kind: T::KIND,
                key: id.key(),
            });
        }
    }
    Ok(())
}

fn apply_table<T: Object>(committed: &mut Table<T>, base: &Table<T>, pending: &Table<T>) {
    for id in delta_keys(base, pending) {
        match pending.get(&id) {
            Some(staged) => {
                committed.insert(id, staged.clone());
            }
            None => {
                committed.remove(&id);
            }
        }
    }
}

macro_rules! tables {
    ($( $field:ident => $ty:ty ),* $(,)?) => {
        #[derive(Clone, Debug, Default)]
        struct Tables {
            $( $field: Table<$ty>, )*
        }

        $(
            #[async_trait]
            impl ReadCollection<$ty> for MemReader {
                async fn list(&self, scope: &Scope) -> Result<Vec<$ty>, StoreError> {
                    Ok(list_table(&self.tables.$field, scope))
                }

                async fn get(&self, id: &ResourceIdentifier) -> Result<$ty, StoreError> {
                    get_table(&self.tables.$field, id)
                }
            }

            #[async_trait]
            impl ReadCollection<$ty> for MemWriter {
                async fn list(&self, scope: &Scope) -> Result<Vec<$ty>, StoreError> {
                    Ok(list_table(&self.pending.$field, scope))
                }

                async fn get(&self, id: &ResourceIdentifier) -> Result<$ty, StoreError> {
                    get_table(&self.pending.$field, id)
                }
            }

            #[async_trait]
            impl WriteCollection<$ty> for MemWriter {
                async fn sync(&mut self, op: SyncOp, items: Vec<$ty>) -> Result<(), StoreError> {
                    for item in items {
                        match op {
                            SyncOp::Upsert => upsert_table(&mut self.pending.$field, item),
                            SyncOp::Delete => {
                                self.pending.$field.remove(item.id());
                            }
                        }
                    }
                    Ok(())
                }
            }
        )*

        impl MemWriter {
            fn publish(&mut self) -> Result<(), StoreError> {
                let mut shared = self.shared.write();
                $( verify_table(&shared.$field, &self.base.$field, &self.pending.$field)?; )*
                $( apply_table(&mut shared.$field, &self.base.$field, &self.pending.$field); )*
                Ok(())
            }
        }
    };
}

tables! {
    services => Service,
    address_groups => AddressGroup,
    bindings => AddressGroupBinding,
    binding_policies => AddressGroupBindingPolicy,
    port_mappings => AddressGroupPortMapping,
    service_aliases => ServiceAlias,
    rules_s2s => RuleS2S,
    agag_rules => IEAgAgRule,
    networks => Network,
    network_bindings => NetworkBinding,
}

/// Shared in-memory store.
#[derive(Clone, Default)]
pub struct MemRegistry {
    shared: Arc<RwLock<Tables>>,
}

impl MemRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Snapshot of the committed state at the time the reader was opened.
pub struct MemReader {
    tables: Tables,
}

/// A staged transaction over the registry.
pub struct MemWriter {
    shared: Arc<RwLock<Tables>>,
    base: Tables,
    pending: Tables,
    finished: bool,
}

#[async_trait]
impl Registry for MemRegistry {
    type Reader = MemReader;
    type Writer = MemWriter;

    async fn reader(&self) -> Result<MemReader, StoreError> {
        Ok(MemReader {
            tables: self.shared.read().clone(),
        })
    }

    async fn writer(&self) -> Result<MemWriter, StoreError> {
        let tables = self.shared.read().clone();
        Ok(MemWriter {
            shared: self.shared.clone(),
            base: tables.clone(),
            pending: tables,
            finished: false,
        })
    }
}

#[async_trait]
impl Writer for MemWriter {
    async fn commit(&mut self) -> Result<(), StoreError> {
        if self.finished {
            return Err(StoreError::Internal(anyhow::anyhow!(
                "transaction already finished"
            )));
        }
        self.publish()?;
        self.finished = true;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), StoreError> {
        self.pending = self.base.clone();
        self.finished = true;
        Ok(())
    }
}

// `Reader` is blanket-implemented for `MemReader` and `MemWriter` from the
// per-kind collection impls generated above.
