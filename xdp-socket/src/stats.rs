//! # Per-Socket Statistics
//!
//! ## Purpose
//!
//! Snapshots the driver-reported `XDP_STATISTICS` counters for one socket
//! alongside the framework's own run-loop counters (empty-poll/kick counts),
//! for `get_socket_stats` in the control-plane API.
//!
//! ## Main components
//!
//! - `SocketStats`: the merged snapshot returned to the caller.
//! - `get_socket_stats()`: reads `XDP_STATISTICS` via `getsockopt` and merges
//!   in the framework counters tracked on `Socket`.

use crate::error::FrameworkError;
use crate::socket::Socket;
use std::mem::size_of;

/// A snapshot of one socket's driver and framework counters.
#[derive(Debug, Clone, Copy, Default)]
pub struct SocketStats {
    pub rx_npkts: u64,
    pub tx_npkts: u64,
    pub rx_dropped: u64,
    pub rx_invalid_descs: u64,
    pub tx_invalid_descs: u64,
    pub rx_ring_full: u64,
    pub rx_fill_ring_empty_descs: u64,
    pub tx_ring_empty_descs: u64,
    pub rx_empty_polls: u64,
    pub tx_trigger_sendtos: u64,
    pub tx_wakeup_sendtos: u64,
    pub opt_polls: u64,
}

/// Reads the `XDP_STATISTICS` socket option for `socket` and merges it with
/// the framework counters it has been tracking since init. Non-fatal: a
/// failed read is surfaced to the caller as `FrameworkError::StatsRead`.
pub fn get_socket_stats(socket: &Socket) -> Result<SocketStats, FrameworkError> {
    let mut stats: libc::xdp_statistics = unsafe { std::mem::zeroed() };
    let mut optlen = size_of::<libc::xdp_statistics>() as libc::socklen_t;
    let ret = unsafe {
        libc::getsockopt(
            socket.raw_fd(),
            libc::SOL_XDP,
            libc::XDP_STATISTICS,
            &mut stats as *mut _ as *mut libc::c_void,
            &mut optlen,
        )
    };
    if ret < 0 {
        return Err(FrameworkError::StatsRead(format!(
            "XDP_STATISTICS getsockopt failed: {}",
            std::io::Error::last_os_error()
        )));
    }

    Ok(SocketStats {
        rx_npkts: socket.rx_npkts,
        tx_npkts: socket.tx_npkts,
        rx_dropped: stats.rx_dropped,
        rx_invalid_descs: stats.rx_invalid_descs,
        tx_invalid_descs: stats.tx_invalid_descs,
        rx_ring_full: stats.rx_ring_full,
        rx_fill_ring_empty_descs: stats.rx_fill_ring_empty_descs,
        tx_ring_empty_descs: stats.tx_ring_empty_descs,
        rx_empty_polls: socket.rx_empty_polls,
        tx_trigger_sendtos: socket.tx_trigger_sendtos,
        tx_wakeup_sendtos: socket.tx_wakeup_sendtos,
        opt_polls: socket.opt_polls,
    })
}
