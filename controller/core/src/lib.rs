#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

mod error;
mod identifier;
mod meta;
pub mod ports;
pub mod resources;

pub use self::{
    error::{ConflictKind, Error},
    identifier::{
        AddressGroupRef, NetworkRef, ResourceIdentifier, ServiceAliasRef, ServiceRef,
    },
    meta::{Condition, ConditionStatus, Meta, Object, READY_CONDITION, REASON_RECONCILED},
};
pub use ipnet::IpNet;
