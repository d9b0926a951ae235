//! Address Allocator
//!
//! Pure domain logic for picking a virtual IP out of an IPv4 network.
//! The scan is deterministic so repeated reconciliations land on the same
//! address instead of flapping between candidates.

use std::collections::HashSet;
use std::net::Ipv4Addr;

/// Errors from CIDR parsing and address allocation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AllocationError {
    #[error("invalid IPv4 CIDR '{0}'")]
    InvalidCidr(String),
    #[error("no IP addresses left in {0}")]
    Exhausted(String),
}

/// An IPv4 network in CIDR form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv4Network {
    network: u32,
    prefix_len: u8,
}

impl Ipv4Network {
    /// Parse `a.b.c.d/len`. Host bits of the address are masked off.
    pub fn parse(cidr: &str) -> Result<Self, AllocationError> {
        let invalid = || AllocationError::InvalidCidr(cidr.to_string());

        let (addr, len) = cidr.trim().split_once('/').ok_or_else(invalid)?;
        let addr: Ipv4Addr = addr.parse().map_err(|_| invalid())?;
        let prefix_len: u8 = len.parse().map_err(|_| invalid())?;
        if prefix_len > 32 {
            return Err(invalid());
        }

        let network = u32::from(addr) & Self::mask_for(prefix_len);
        Ok(Self {
            network,
            prefix_len,
        })
    }

    fn mask_for(prefix_len: u8) -> u32 {
        if prefix_len == 0 {
            0
        } else {
            u32::MAX << (32 - u32::from(prefix_len))
        }
    }

    pub fn network(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.network)
    }

    pub fn broadcast(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.network | !Self::mask_for(self.prefix_len))
    }

    pub fn prefix_len(&self) -> u8 {
        self.prefix_len
    }

    /// First and last usable host (network + 1 through broadcast - 1).
    ///
    /// `None` when the network has no usable hosts (/31 and /32).
    pub fn usable_range(&self) -> Option<(u32, u32)> {
        let first = self.network.checked_add(1)?;
        let last = u32::from(self.broadcast()).checked_sub(1)?;
        if first > last {
            return None;
        }
        Some((first, last))
    }
}

impl std::fmt::Display for Ipv4Network {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.network(), self.prefix_len)
    }
}

/// Virtual IP allocation service.
pub struct AddressAllocator;

impl AddressAllocator {
    /// Return the lowest usable host address of `cidr` that is not in
    /// `allocated`.
    ///
    /// # Example
    /// ```
    /// use std::collections::HashSet;
    /// use std::net::Ipv4Addr;
    /// use vcloud_lb::domain::services::AddressAllocator;
    ///
    /// let allocated: HashSet<Ipv4Addr> = [Ipv4Addr::new(10, 0, 0, 1)].into_iter().collect();
    /// let ip = AddressAllocator::next_free_address(&allocated, "10.0.0.0/29").unwrap();
    /// assert_eq!(ip, Ipv4Addr::new(10, 0, 0, 2));
    /// ```
    pub fn next_free_address(
        allocated: &HashSet<Ipv4Addr>,
        cidr: &str,
    ) -> Result<Ipv4Addr, AllocationError> {
        let network = Ipv4Network::parse(cidr)?;
        let exhausted = || AllocationError::Exhausted(network.to_string());

        let (first, last) = network.usable_range().ok_or_else(exhausted)?;

        (first..=last)
            .map(Ipv4Addr::from)
            .find(|ip| !allocated.contains(ip))
            .ok_or_else(exhausted)
    }
}
