//! # AF_XDP Socket
//!
//! ## Purpose
//!
//! A `Socket` binds one (interface, queue) pair to a shared UMEM region and
//! owns the four rings (rx, tx, fill, completion) the kernel uses to hand
//! packets back and forth. Every socket in a worker that shares the same bind
//! mode (zero-copy or copy) shares one `UmemRegion`; the first such socket
//! registers the region with the kernel, every later one binds with
//! `XDP_SHARED_UMEM` against the registrar's fd.
//!
//! ## How it works
//!
//! Socket creation opens an `AF_XDP` raw socket, sets the four ring sizes via
//! `setsockopt`, registers or shares the UMEM, memory-maps the rings, and
//! binds to the (ifindex, queue) pair. The fill ring is then primed with every
//! frame address this socket owns in the region (`owner = ` this interface's
//! index) and submitted, so the driver has a full pool of empty frames before
//! the worker's run-loop starts.
//!
//! ## Main components
//!
//! - `Socket`: owns the fd, the shared UMEM region, and the four rings.
//! - `kick_tx`/`kick_rx`: zero-length `sendto`/`recvfrom` nudges for the
//!   driver when a ring's `NEED_WAKEUP` flag is set.

use crate::frame::FRAMES_PER_SOCKET;
use crate::ring::{Ring, RingType, XdpDesc};
use crate::umem::UmemRegion;
use std::io;
use std::mem::size_of;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::sync::Arc;

/// Ring descriptor count for all four rings of a socket. Must be a power of
/// two and comfortably larger than `2 * MAX_BATCH_SIZE` (511) so that the
/// recycle-drop reservation in the run-loop's phase (e) can never fail; it
/// also must be at least `FRAMES_PER_SOCKET` so the initial fill-ring priming
/// in `Socket::new` fits in one reservation.
pub const RING_DESCS: u32 = FRAMES_PER_SOCKET;

/// An AF_XDP socket bound to one interface and backed by a shared UMEM region.
pub struct Socket {
    fd: OwnedFd,
    region: Arc<UmemRegion>,
    if_index: u32,
    /// This socket's interface index, also its owner id in the frame codec
    /// and the base of its frame slot range within `region`.
    owner: u32,
    zero_copy: bool,
    pub(crate) rx: Ring<XdpDesc>,
    pub(crate) tx: Ring<XdpDesc>,
    pub(crate) fill: Ring<u64>,
    pub(crate) completion: Ring<u64>,
    /// Frames submitted to `tx` but not yet observed on `completion`.
    pub outstanding_tx: u32,
    pub rx_npkts: u64,
    pub tx_npkts: u64,
    pub rx_empty_polls: u64,
    pub tx_trigger_sendtos: u64,
    pub tx_wakeup_sendtos: u64,
    pub opt_polls: u64,
}

/// Per-socket bind configuration resolved by the control plane in §4.2 step 1.
#[derive(Debug, Clone, Copy)]
pub struct SocketConfig {
    pub if_index: u32,
    pub queue_id: u32,
    /// This socket's position in the configured interface list; also its
    /// owner id and the base of its slot range in `region`.
    pub owner: u32,
    pub zero_copy: bool,
    pub busy_poll: bool,
    pub need_wakeup: bool,
    pub batch_size: u32,
}

impl Socket {
    /// Creates and binds a socket against `region`, primes its fill ring with
    /// every frame this socket owns, and submits them.
    pub fn new(config: SocketConfig, region: Arc<UmemRegion>) -> io::Result<Self> {
        let raw_fd = unsafe { libc::socket(libc::AF_XDP, libc::SOCK_RAW | libc::SOCK_CLOEXEC, 0) };
        if raw_fd < 0 {
            return Err(io::Error::last_os_error());
        }
        let fd = unsafe { OwnedFd::from_raw_fd(raw_fd) };

        RingType::Fill.set_size(raw_fd, RING_DESCS as usize)?;
        RingType::Completion.set_size(raw_fd, RING_DESCS as usize)?;
        RingType::Tx.set_size(raw_fd, RING_DESCS as usize)?;
        RingType::Rx.set_size(raw_fd, RING_DESCS as usize)?;

        let shared_umem_fd = region.register_or_share(raw_fd)?;

        if config.busy_poll && config.zero_copy {
            set_busy_poll(raw_fd, config.batch_size)?;
        }

        let offsets = ring_offsets(raw_fd)?;
        let frame_size = region.frame_size();
        let tx = RingType::Tx.mmap::<XdpDesc>(raw_fd, &offsets, RING_DESCS as usize, frame_size)?;
        let rx = RingType::Rx.mmap::<XdpDesc>(raw_fd, &offsets, RING_DESCS as usize, frame_size)?;
        let fill = RingType::Fill.mmap::<u64>(raw_fd, &offsets, RING_DESCS as usize, frame_size)?;
        let completion =
            RingType::Completion.mmap::<u64>(raw_fd, &offsets, RING_DESCS as usize, frame_size)?;

        let mut flags = 0u16;
        if config.need_wakeup {
            flags |= libc::XDP_USE_NEED_WAKEUP as u16;
        }
        let shared_fd = if let Some(registrar) = shared_umem_fd {
            flags |= libc::XDP_SHARED_UMEM as u16;
            registrar
        } else {
            flags |= if config.zero_copy { libc::XDP_ZEROCOPY } else { libc::XDP_COPY } as u16;
            0
        };

        let sxdp = libc::sockaddr_xdp {
            sxdp_family: libc::AF_XDP as libc::sa_family_t,
            sxdp_flags: flags,
            sxdp_ifindex: config.if_index,
            sxdp_queue_id: config.queue_id,
            sxdp_shared_umem_fd: shared_fd as u32,
        };
        if unsafe {
            libc::bind(
                raw_fd,
                &sxdp as *const _ as *const libc::sockaddr,
                size_of::<libc::sockaddr_xdp>() as libc::socklen_t,
            ) < 0
        } {
            return Err(io::Error::other(format!(
                "failed to bind AF_XDP socket: {}",
                io::Error::last_os_error()
            )));
        }

        let mut socket = Self {
            fd,
            region,
            if_index: config.if_index,
            owner: config.owner,
            zero_copy: config.zero_copy,
            rx,
            tx,
            fill,
            completion,
            outstanding_tx: 0,
            rx_npkts: 0,
            tx_npkts: 0,
            rx_empty_polls: 0,
            tx_trigger_sendtos: 0,
            tx_wakeup_sendtos: 0,
            opt_polls: 0,
        };
        socket.prime_fill_ring();
        Ok(socket)
    }

    /// Reserves and submits this socket's entire frame allotment on the fill
    /// ring, per §4.2 step 5.
    fn prime_fill_ring(&mut self) {
        let codec = self.region.codec();
        let addrs: Vec<u64> = (0..FRAMES_PER_SOCKET)
            .map(|k| codec.frame_base(self.owner, k))
            .collect();
        let base = self
            .fill
            .reserve(FRAMES_PER_SOCKET)
            .expect("fill ring must hold a socket's full frame allotment");
        self.fill.write_addrs(base, &addrs);
        self.fill.update_producer(base + FRAMES_PER_SOCKET);
    }

    pub fn raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }

    pub fn owner(&self) -> u32 {
        self.owner
    }

    pub fn if_index(&self) -> u32 {
        self.if_index
    }

    pub fn is_zero_copy(&self) -> bool {
        self.zero_copy
    }

    pub fn region(&self) -> &Arc<UmemRegion> {
        &self.region
    }

    pub fn umem_base(&self) -> *mut u8 {
        self.region.base_ptr()
    }

    /// Zero-length `sendto(MSG_DONTWAIT)` to nudge the driver to consume the
    /// tx ring. Benign errnos (`EBUSY`/`ENOBUFS`/`EAGAIN`) are ignored;
    /// `ENETDOWN` is logged; anything else propagates.
    pub fn kick_tx(&self) -> io::Result<()> {
        kick(self.raw_fd(), true)
    }

    /// Zero-length `recvfrom(MSG_DONTWAIT)` to nudge the driver to refill rx.
    pub fn kick_rx(&self) -> io::Result<()> {
        kick(self.raw_fd(), false)
    }
}

fn kick(raw_fd: RawFd, send: bool) -> io::Result<()> {
    let ret = unsafe {
        if send {
            libc::sendto(raw_fd, std::ptr::null(), 0, libc::MSG_DONTWAIT, std::ptr::null(), 0)
        } else {
            libc::recvfrom(
                raw_fd,
                std::ptr::null_mut(),
                0,
                libc::MSG_DONTWAIT,
                std::ptr::null_mut(),
                std::ptr::null_mut(),
            )
        }
    };
    if ret < 0 {
        match io::Error::last_os_error().raw_os_error() {
            None | Some(libc::EBUSY | libc::ENOBUFS | libc::EAGAIN) => {}
            Some(libc::ENETDOWN) => {
                log::warn!("network interface is down, cannot wake up socket");
            }
            Some(e) => return Err(io::Error::from_raw_os_error(e)),
        }
    }
    Ok(())
}

// Not yet exposed by the `libc` crate version this workspace pins; values are
// the stable uapi numbers from `include/uapi/asm-generic/socket.h`.
const SO_BUSY_POLL: libc::c_int = 46;
const SO_PREFER_BUSY_POLL: libc::c_int = 69;
const SO_BUSY_POLL_BUDGET: libc::c_int = 70;

fn set_busy_poll(raw_fd: RawFd, batch_size: u32) -> io::Result<()> {
    unsafe {
        for (opt, value) in [
            (SO_PREFER_BUSY_POLL, 1i32),
            (SO_BUSY_POLL, 20i32),
            (SO_BUSY_POLL_BUDGET, batch_size as i32),
        ] {
            if libc::setsockopt(
                raw_fd,
                libc::SOL_SOCKET,
                opt,
                &value as *const _ as *const libc::c_void,
                size_of::<libc::c_int>() as libc::socklen_t,
            ) < 0
            {
                return Err(io::Error::last_os_error());
            }
        }
    }
    Ok(())
}

pub fn ring_offsets(raw_fd: libc::c_int) -> io::Result<libc::xdp_mmap_offsets> {
    let mut offsets: libc::xdp_mmap_offsets = unsafe { std::mem::zeroed() };
    let mut optlen = size_of::<libc::xdp_mmap_offsets>() as libc::socklen_t;
    unsafe {
        if libc::getsockopt(
            raw_fd,
            libc::SOL_XDP,
            libc::XDP_MMAP_OFFSETS,
            &mut offsets as *mut _ as *mut libc::c_void,
            &mut optlen,
        ) < 0
        {
            return Err(io::Error::last_os_error());
        }
    }
    Ok(offsets)
}
