//! Test-only harness shared by the workspace's live-kernel integration tests.
//!
//! Nothing in this crate is part of the framework's data or control path; it
//! exists so `xdp-socket`'s `harness = false` integration binaries under
//! `tests/` can stand up a veth pair, re-exec themselves with the
//! capabilities AF_XDP/netlink need, and run a plain UDP ping/pong exchange
//! as the oracle for an XDP-based one.

pub mod suite {
    pub mod command;
    pub mod runner;
    pub mod vethpair;
}

pub mod tool {
    pub mod udp_pingpong;
}
