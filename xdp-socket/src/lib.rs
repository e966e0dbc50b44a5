//! A user-space kernel-bypass packet-processing framework built on AF_XDP.
//!
//! The framework binds one or more network interfaces to user-space ring
//! buffers, gives every worker thread its own shared packet-buffer pool
//! (UMEM), dispatches every received packet to a host-supplied classifier,
//! and either drops it, forwards it back out a chosen interface — possibly
//! a different one than it arrived on, zero-copy where the bind modes allow
//! it — or hands it to a kernel eBPF program installed at the XDP ingress
//! and/or TC egress hooks.
//!
//! See [`control::init`] for the entry point into the control plane, and
//! [`worker::PacketProcessor`] for the classifier callback's contract.

pub mod config;
pub mod control;
pub mod error;
pub mod frame;
pub mod mmap;
pub mod ring;
pub mod socket;
pub mod stats;
pub mod umem;
pub mod util;
pub mod worker;

pub use config::{parse_args, BindMode, Config, IfaceConfig, WorkingMode};
pub use control::{init, BpfHandle, Framework};
pub use error::FrameworkError;
pub use frame::FrameCodec;
pub use socket::Socket;
pub use stats::{get_socket_stats, SocketStats};
pub use worker::PacketProcessor;
