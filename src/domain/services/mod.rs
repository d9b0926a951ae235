mod address_allocator;
pub mod annotations;
pub mod membership;
pub mod naming;

pub use address_allocator::{AddressAllocator, AllocationError, Ipv4Network};
pub use annotations::ServiceIntent;
