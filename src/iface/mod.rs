//! Network interface abstraction layer
//!
//! This module provides abstractions for network interfaces and packet processing:
//! - Ethernet/ARP/IPv4 reception and protocol dispatch
//! - Outbound encapsulation and address resolution
//! - The stack thread that services the link and the UDP producers

pub mod interface;
pub mod ipv4;
pub mod stack;

// Re-export commonly used items
pub use interface::{InterfaceStats, NetworkInterface};
pub use stack::run_stack;
