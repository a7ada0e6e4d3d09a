
use log::debug;
use shared::error::*;
use std::collections::HashMap;
use std::net::SocketAddr;

use crate::candidate::CandidateAddress;
use crate::network::AddressFamily;
use crate::socket::{AsyncResolver, PacketSocketFactory};

struct Lookup {
    resolver: Box<dyn AsyncResolver>,
    done: bool,
}

/// AddressResolver runs at most one lookup per address. Finished lookups
/// stay around so their results can be queried until the resolver is
/// dropped.
#[derive(Default)]
pub struct AddressResolver {
    lookups: HashMap<CandidateAddress, Lookup>,
}

impl AddressResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// resolve starts looking up `address`. A second call for the same
    /// address is a no-op.
    pub fn resolve(
        &mut self,
        address: &CandidateAddress,
        factory: &dyn PacketSocketFactory,
    ) -> Result<()> {
        if self.lookups.contains_key(address) {
            return Ok(());
        }

        let mut resolver = factory.create_async_resolver()?;
        debug!("resolving {address}");
        resolver.start(address);
        self.lookups.insert(
            address.clone(),
            Lookup {
                resolver,
                done: false,
            },
        );
        Ok(())
    }

    pub fn is_resolving(&self, address: &CandidateAddress) -> bool {
        self.lookups.get(address).is_some_and(|lookup| !lookup.done)
    }

    pub fn len(&self) -> usize {
        self.lookups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lookups.is_empty()
    }

    /// on_resolve_result marks the lookup for `address` finished and returns
    /// the address it was started with and its error code (0 on success).
    /// Unknown addresses yield None.
    pub fn on_resolve_result(
        &mut self,
        address: &CandidateAddress,
    ) -> Option<(CandidateAddress, i32)> {
        let lookup = self.lookups.get_mut(address)?;
        lookup.done = true;
        Some((address.clone(), lookup.resolver.error()))
    }

    /// get_resolved_address is None while the lookup is pending, when it
    /// failed, or when it produced no address of `family`.
    pub fn get_resolved_address(
        &self,
        address: &CandidateAddress,
        family: AddressFamily,
    ) -> Option<SocketAddr> {
        let lookup = self.lookups.get(address)?;
        if !lookup.done || lookup.resolver.error() != 0 {
            return None;
        }
        lookup.resolver.resolved_address(family)
    }
}

impl Drop for AddressResolver {
    fn drop(&mut self) {
        for (_, mut lookup) in self.lookups.drain() {
            lookup.resolver.destroy();
        }
    }
}
