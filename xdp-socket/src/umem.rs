//! # UMEM Region
//!
//! ## Purpose
//!
//! A UMEM region is the shared packet-buffer pool backing every socket of one
//! bind mode (zero-copy or copy) within a single worker. It is a single
//! anonymous mapping, sized to hold `frames_per_socket` frames for every
//! configured interface, and partitioned so interface `i` owns the frame range
//! `[i * frames_per_socket, (i+1) * frames_per_socket)`.
//!
//! ## How it works
//!
//! The first socket created against a region performs the `XDP_UMEM_REG`
//! setsockopt, registering the mapping's address and length with the kernel.
//! Every later socket against the same region binds with `XDP_SHARED_UMEM`
//! and the registering socket's fd instead of registering again — each still
//! gets its own fill/completion ring pair, only the packet memory is shared.
//!
//! ## Main components
//!
//! - `UmemRegion`: owns the mapping and the frame-address codec derived from it.

use crate::frame::{FrameCodec, FRAMES_PER_SOCKET};
use crate::mmap::OwnedMmap;
use std::cell::Cell;
use std::io;
use std::mem::size_of;
use std::os::fd::RawFd;

pub struct UmemRegion {
    mmap: OwnedMmap,
    codec: FrameCodec,
    num_interfaces: u32,
    /// fd of the socket that performed `XDP_UMEM_REG` against this mapping.
    /// Set exactly once, during init, before the worker thread that owns this
    /// region starts running; read-only afterward.
    registrar_fd: Cell<Option<RawFd>>,
}

// Safety: `registrar_fd` is written only during single-threaded init, before
// the `Arc<UmemRegion>` is handed to the worker thread that will read it; the
// mapping itself is touched by exactly one worker thread after init.
unsafe impl Send for UmemRegion {}
unsafe impl Sync for UmemRegion {}

impl UmemRegion {
    /// Allocates a region sized for `num_interfaces` sockets of `frame_size` each.
    pub fn new(frame_size: u32, num_interfaces: u32, huge_page: Option<bool>) -> io::Result<Self> {
        let region_size = FRAMES_PER_SOCKET as usize * num_interfaces as usize * frame_size as usize;
        let mmap = OwnedMmap::mmap(region_size, huge_page)
            .map_err(|e| io::Error::other(format!("failed to allocate UMEM region: {e}")))?;
        Ok(Self {
            mmap,
            codec: FrameCodec::new(frame_size),
            num_interfaces,
            registrar_fd: Cell::new(None),
        })
    }

    pub fn codec(&self) -> FrameCodec {
        self.codec
    }

    pub fn frame_size(&self) -> u32 {
        self.codec.frame_size()
    }

    pub fn num_interfaces(&self) -> u32 {
        self.num_interfaces
    }

    /// Base address of the UMEM mapping, for byte-slice access into frames.
    pub fn base_ptr(&self) -> *mut u8 {
        self.mmap.as_void_ptr() as *mut u8
    }

    pub fn len(&self) -> usize {
        self.mmap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mmap.is_empty()
    }

    /// True if two regions are the same underlying mapping (used to decide
    /// whether a forward between two sockets needs a byte copy).
    pub fn same_region(&self, other: &UmemRegion) -> bool {
        self.mmap.as_void_ptr() == other.mmap.as_void_ptr()
    }

    /// Registers this region against `fd` if no socket has registered it yet,
    /// returning `None` (caller should bind as the registrar). If another
    /// socket already registered it, returns that socket's fd so the caller
    /// binds with `XDP_SHARED_UMEM` instead.
    pub fn register_or_share(&self, fd: RawFd) -> io::Result<Option<RawFd>> {
        if let Some(registrar) = self.registrar_fd.get() {
            return Ok(Some(registrar));
        }

        let reg = unsafe {
            libc::xdp_umem_reg {
                addr: self.mmap.as_void_ptr() as u64,
                len: self.mmap.len() as u64,
                chunk_size: self.codec.frame_size(),
                ..std::mem::zeroed()
            }
        };
        unsafe {
            if libc::setsockopt(
                fd,
                libc::SOL_XDP,
                libc::XDP_UMEM_REG,
                &reg as *const _ as *const libc::c_void,
                size_of::<libc::xdp_umem_reg>() as libc::socklen_t,
            ) < 0
            {
                return Err(io::Error::other(format!(
                    "failed to register UMEM: {}",
                    io::Error::last_os_error()
                )));
            }
        }
        self.registrar_fd.set(Some(fd));
        Ok(None)
    }
}
