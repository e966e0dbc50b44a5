//! # Worker Run-Loop
//!
//! ## Purpose
//!
//! A `Worker` owns one `Socket` per configured interface (plus their UMEM
//! regions, already shared in via `Arc` at construction) and drives the
//! receive/classify/transmit/complete pipeline on a single pinned OS thread.
//! There is no shared mutable state between workers: every ring, every
//! counter, and every UMEM region a worker touches belongs to it alone.
//!
//! ## How it works
//!
//! `run` loops until the shared stop flag is observed. Each iteration visits
//! every owned interface in order and runs the six phases from the run-loop
//! design: drain completions and recycle their frames to the right owner's
//! fill ring, peek a batch of received packets, classify each one, release
//! the batch, recycle drops back to the ingress fill ring, and forward
//! anything the classifier routed elsewhere. With exactly one interface, the
//! owner-decode in completion handling is skipped — a single-socket worker's
//! own frames never leave its own ownership, so the result is always `i`.
//!
//! Scratch buckets (`to_fill`, `to_tx`) are held as worker fields and cleared
//! per iteration rather than allocated fresh each pass, trading a modest
//! fixed memory footprint for zero per-packet heap churn.
//!
//! ## Main components
//!
//! - `Worker`: owns sockets, scratch buffers, and the pinned thread's state.
//! - `PacketProcessor`: the classifier callback type.

use crate::frame::FrameCodec;
use crate::socket::Socket;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Bound on how late a worker may notice the stop flag while blocked in `poll()`.
pub const POLL_TIMEOUT_MS: i32 = 1000;

/// The host-supplied classifier: `(packet, ingress_ifindex) -> -1 | [0, num_interfaces)`.
/// Called concurrently from every worker thread; must not retain the slice past return.
pub type PacketProcessor = Arc<dyn Fn(&[u8], u32) -> i32 + Send + Sync>;

pub struct Worker {
    sockets: Vec<Socket>,
    batch_size: u32,
    poll: bool,
    busy_poll: bool,
    codec: FrameCodec,
    classifier: PacketProcessor,
    worker_idx: usize,
    cpu_id: usize,
    to_fill: Vec<Vec<u64>>,
    to_tx: Vec<Vec<(u64, u32)>>,
    to_drop: Vec<u64>,
}

impl Worker {
    pub fn new(
        sockets: Vec<Socket>,
        batch_size: u32,
        poll: bool,
        busy_poll: bool,
        codec: FrameCodec,
        classifier: PacketProcessor,
        worker_idx: usize,
        cpu_id: usize,
    ) -> Self {
        let n = sockets.len();
        Worker {
            sockets,
            batch_size,
            poll,
            busy_poll,
            codec,
            classifier,
            worker_idx,
            cpu_id,
            to_fill: vec![Vec::with_capacity(batch_size as usize); n],
            to_tx: vec![Vec::with_capacity(batch_size as usize); n],
            to_drop: Vec::with_capacity(batch_size as usize),
        }
    }

    pub fn worker_idx(&self) -> usize {
        self.worker_idx
    }

    pub fn cpu_id(&self) -> usize {
        self.cpu_id
    }

    /// Overrides the CPU id this worker reports, once `start_workers` has
    /// resolved it against the process's affinity mask. Built with a
    /// placeholder at `init` time, before the mask is known.
    pub(crate) fn set_cpu_id(&mut self, cpu_id: usize) {
        self.cpu_id = cpu_id;
    }

    pub fn sockets(&self) -> &[Socket] {
        &self.sockets
    }

    /// Runs the pipeline until `stop` is set. Intended to be the body of the
    /// worker's dedicated, CPU-pinned OS thread.
    pub fn run(&mut self, stop: &AtomicBool) {
        let num_interfaces = self.sockets.len();
        loop {
            if stop.load(Ordering::Relaxed) {
                break;
            }
            if self.poll && !self.poll_gate() {
                continue;
            }
            for i in 0..num_interfaces {
                self.run_interface(i, num_interfaces);
            }
        }
    }

    /// `poll()`s every owned socket's fd for read-readiness, bounded by
    /// `POLL_TIMEOUT_MS`. Returns `false` if nothing became ready (the caller
    /// should re-check the stop flag and retry). Every owned socket sat in
    /// this same `poll()` call, so each one's `opt_polls` counter advances
    /// together.
    fn poll_gate(&mut self) -> bool {
        let mut fds: Vec<libc::pollfd> = self
            .sockets
            .iter()
            .map(|s| libc::pollfd { fd: s.raw_fd(), events: libc::POLLIN, revents: 0 })
            .collect();
        for socket in &mut self.sockets {
            socket.opt_polls += 1;
        }
        let ret = unsafe { libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, POLL_TIMEOUT_MS) };
        ret > 0
    }

    fn run_interface(&mut self, i: usize, num_interfaces: usize) {
        self.complete_tx(i, num_interfaces);

        let (base, count) = self.sockets[i].rx.peek(self.batch_size);
        if count == 0 {
            let socket = &self.sockets[i];
            if socket.is_zero_copy() && (self.busy_poll || socket.fill.needs_wakeup()) {
                if let Err(e) = socket.kick_rx() {
                    log::error!("rx kick failed on interface {}: {e}", socket.if_index());
                }
            }
            self.sockets[i].rx_empty_polls += 1;
            return;
        }

        self.to_drop.clear();
        for bucket in &mut self.to_tx {
            bucket.clear();
        }

        let mask = self.sockets[i].rx.mod_mask;
        let umem_base = self.sockets[i].umem_base();
        for k in 0..count {
            let slot = (base + k) & mask;
            let desc = self.sockets[i].rx.desc_at(slot);
            let pkt = unsafe {
                std::slice::from_raw_parts(umem_base.add(desc.addr as usize), desc.len as usize)
            };
            match (self.classifier)(pkt, self.sockets[i].if_index()) {
                -1 => self.to_drop.push(desc.addr),
                r if r >= 0 && (r as usize) < num_interfaces => {
                    self.to_tx[r as usize].push((desc.addr, desc.len))
                }
                r => panic!(
                    "classifier returned {r}, expected -1 or an interface index in [0, {num_interfaces})"
                ),
            }
        }

        // Phase d: release rx.
        self.sockets[i].rx.update_consumer(base + count);
        self.sockets[i].rx_npkts += count as u64;

        // Phase e: recycle drops back to the ingress fill ring.
        if !self.to_drop.is_empty() {
            let n = self.to_drop.len() as u32;
            let fbase = self.sockets[i]
                .fill
                .reserve(n)
                .expect("fill ring reservation invariant violated recycling drops");
            self.sockets[i].fill.write_addrs(fbase, &self.to_drop);
            self.sockets[i].fill.update_producer(fbase + n);
        }

        // Phase f: forward.
        for j in 0..num_interfaces {
            if !self.to_tx[j].is_empty() {
                self.forward(i, j);
            }
        }
    }

    /// Phase a: drains the completion ring, buckets completed frames by
    /// owner, and recycles each bucket into the owning socket's fill ring.
    fn complete_tx(&mut self, i: usize, num_interfaces: usize) {
        if self.sockets[i].outstanding_tx == 0 {
            return;
        }

        let needs_kick = {
            let socket = &self.sockets[i];
            !socket.is_zero_copy() || (!self.poll && !self.busy_poll && socket.tx.needs_wakeup())
        };
        if needs_kick {
            if let Err(e) = self.sockets[i].kick_tx() {
                log::error!("tx kick failed on interface {}: {e}", self.sockets[i].if_index());
            }
            self.sockets[i].tx_trigger_sendtos += 1;
        }

        let max = self.sockets[i].outstanding_tx.min(self.batch_size);
        let (base, count) = self.sockets[i].completion.peek(max);
        if count == 0 {
            return;
        }

        for bucket in &mut self.to_fill {
            bucket.clear();
        }
        let mask = self.sockets[i].completion.mod_mask;
        for k in 0..count {
            let addr = self.sockets[i].completion.desc_at((base + k) & mask);
            let owner = if num_interfaces == 1 { i as u32 } else { self.codec.decode_owner(addr) };
            self.to_fill[owner as usize].push(addr);
        }
        self.sockets[i].completion.update_consumer(base + count);
        self.sockets[i].outstanding_tx -= count;

        for o in 0..num_interfaces {
            if self.to_fill[o].is_empty() {
                continue;
            }
            let n = self.to_fill[o].len() as u32;
            let fbase = self.sockets[o]
                .fill
                .reserve(n)
                .expect("fill ring reservation invariant violated recycling completions");
            self.sockets[o].fill.write_addrs(fbase, &self.to_fill[o]);
            self.sockets[o].fill.update_producer(fbase + n);
        }
    }

    /// Phase f body for one non-empty destination bucket: reserves tx slots
    /// on socket `j` (retrying completions and, if warranted, a wakeup kick,
    /// until space appears), copying bytes across UMEM regions only when `i`
    /// and `j` are not backed by the same region.
    fn forward(&mut self, i: usize, j: usize) {
        let items = std::mem::take(&mut self.to_tx[j]);
        let n = items.len() as u32;
        let num_interfaces = self.sockets.len();
        let base = loop {
            if let Some(b) = self.sockets[j].tx.reserve(n) {
                break b;
            }
            self.complete_tx(j, num_interfaces);
            if self.busy_poll || self.sockets[j].tx.needs_wakeup() {
                if let Err(e) = self.sockets[j].kick_tx() {
                    log::error!("tx wakeup kick failed on interface {}: {e}", self.sockets[j].if_index());
                }
                self.sockets[j].tx_wakeup_sendtos += 1;
            }
        };

        let same_region = self.sockets[i].region().same_region(self.sockets[j].region());
        let src_base = self.sockets[i].umem_base();
        let dst_base = self.sockets[j].umem_base();
        let mask = self.sockets[j].tx.mod_mask;
        for (k, (addr, len)) in items.iter().copied().enumerate() {
            if !same_region {
                unsafe {
                    std::ptr::copy_nonoverlapping(
                        src_base.add(addr as usize),
                        dst_base.add(addr as usize),
                        len as usize,
                    );
                }
            }
            let slot = (base + k as u32) & mask;
            self.sockets[j].tx.set(slot, addr, len);
        }
        self.sockets[j].tx.update_producer(base + n);
        self.sockets[j].outstanding_tx += n;
        self.sockets[j].tx_npkts += n as u64;
    }
}
