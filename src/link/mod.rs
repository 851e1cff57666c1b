//! Link layer
//!
//! - Ethernet: frame header and hardware addresses
//! - Device: TAP device access and the link-domain threads

pub mod device;
pub mod ethernet;

pub use device::{spawn_link, DomainCrossing, LinkDevice};
pub use ethernet::{build_frame, ethertype, EthernetHeader, MacAddress};
