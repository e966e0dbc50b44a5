//! # Utility Module for Network Operations
//!
//! ## Purpose
//!
//! This file serves as the entry point for the `util` module. It organizes and
//! publicly exports various networking utilities required by the `xdp-socket` library
//! and potentially useful for applications using it.
//!
//! ## How it works
//!
//! It declares the sub-modules (`netlink`, `router`, `xdp_prog`) using `pub mod`
//! statements. It then uses `pub use` to re-export the most important
//! functions and structs from these sub-modules, creating a consolidated and easy-to-use
//! public API for the `util` module.
//!
//! ## Main components
//!
//! - Module declarations: Brings the utility sub-modules into the crate's scope.
//! - Public re-exports (`pub use`): Exposes functionalities like route lookups,
//!   clsact/TC-filter setup, and eBPF/XDP program attachment to the rest of the crate.

pub mod mac_by_ifindex;
pub mod netlink;
pub mod packet;
pub mod router;
pub mod xdp_prog;

pub use mac_by_ifindex::mac_by_ifindex;
pub use netlink::{
    attach_egress_filter, find_default_gateway, get_ipv4_address, get_ipv4_routes, get_links,
    get_neighbors, install_clsact, netlink, remove_clsact, Link,
};
pub use packet::write_udp_header_for;
pub use router::{Ipv4Route, Neighbor, NextHop, Router};
pub use xdp_prog::{
    attach_xdp_fd, bpf_map_update, detach_xdp, load_bpf_program, xdp_attach_program, xdp_features,
    OwnedTcProg, OwnedXdpProg,
};

#[cfg(test)]
mod tests;

