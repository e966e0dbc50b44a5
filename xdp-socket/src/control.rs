//! # Control Plane
//!
//! ## Purpose
//!
//! Everything the data path never touches: resolving interface names to
//! kernel ifindexes, allocating UMEM regions and sockets for every worker,
//! loading and attaching the companion eBPF objects, pinning worker threads
//! to CPUs, and reversing all of it on shutdown.
//!
//! ## How it works
//!
//! `init` builds every `Worker` (and, transitively, every `UmemRegion` and
//! `Socket`) up front on the calling thread, then — for XDP/COMBINED modes —
//! loads one eBPF object and attaches its XDP program to every configured
//! interface, installing a `clsact` qdisc and a direct-action egress filter
//! per interface when a TC program name was supplied. `start_workers` reads
//! the process's CPU affinity mask and spawns one pinned thread per worker;
//! `stop_workers` joins them back, handing each `Worker` back to the control
//! thread. Every resource created along the way owns its own teardown
//! (`Drop` on `Socket`, `UmemRegion`, `XdpAttachment`, `TcAttachment`, the
//! loaded eBPF object), so a partial failure during `init` unwinds for free:
//! returning an error drops everything built so far, in reverse order,
//! without any explicit rollback code.
//!
//! ## Main components
//!
//! - `Framework`: owns every worker, attachment, and the loaded eBPF object.
//! - `BpfHandle`: opaque handle to the loaded object, for a host that wants
//!   to populate further maps of its own.
//! - `init`/`start_workers`/`stop_workers`/`cleanup`: the four control-plane
//!   operations; `get_socket_stats` reads a live or stopped worker's socket.

use crate::config::{BindMode, Config, WorkingMode};
use crate::error::FrameworkError;
use crate::frame::FrameCodec;
use crate::socket::{Socket, SocketConfig};
use crate::stats::{get_socket_stats as read_socket_stats, SocketStats};
use crate::umem::UmemRegion;
use crate::util;
use crate::worker::{PacketProcessor, Worker};

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

/// Opaque handle to the loaded eBPF object, returned by `init` for XDP and
/// COMBINED modes. Lets a host that embeds this framework populate further
/// maps of its own without reaching into the control plane's internals.
pub struct BpfHandle {
    prog: Arc<util::OwnedTcProg>,
}

impl BpfHandle {
    /// Looks up the fd of a map named `name` inside the loaded object.
    pub fn find_map_fd(&self, name: &str) -> io::Result<libc::c_int> {
        self.prog.find_map_fd(name)
    }
}

/// RAII guard for one interface's XDP attachment; detaches on drop.
struct XdpAttachment {
    if_index: u32,
    flags: u32,
}

impl Drop for XdpAttachment {
    fn drop(&mut self) {
        util::detach_xdp(self.if_index, self.flags);
    }
}

/// RAII guard for one interface's `clsact` qdisc; removes it on drop.
struct TcAttachment {
    if_index: u32,
}

impl Drop for TcAttachment {
    fn drop(&mut self) {
        if let Err(e) = util::remove_clsact(self.if_index) {
            log::warn!("failed to remove clsact qdisc from interface {}: {e}", self.if_index);
        }
    }
}

/// A worker thread that has been started. `sockets_ptr`/`n_sockets` let
/// `get_socket_stats` read a running worker's counters from the control
/// thread: the pointer targets the heap buffer behind the `Worker`'s
/// `Vec<Socket>`, whose address is unchanged by moving the `Worker` itself
/// into the spawned thread's closure. Reads race the worker thread's writes
/// to plain `u64` counters; per the framework's design this is an accepted,
/// reader-aggregated race rather than something requiring atomics or locks.
struct RunningWorker {
    stop: Arc<AtomicBool>,
    join: JoinHandle<Worker>,
    sockets_ptr: *const Socket,
    n_sockets: usize,
}

// Safety: `sockets_ptr` is read-only from this side and only ever
// dereferenced while `join`'s thread (the sole writer) is known to be alive.
unsafe impl Send for RunningWorker {}

/// Owns every resource `init` created: workers (and transitively their UMEM
/// regions and sockets), any XDP/TC attachments, and the loaded eBPF object.
/// `cleanup` (and `Drop`) reverse all of it; both are idempotent.
pub struct Framework {
    config: Config,
    ifindexes: Vec<u32>,
    workers: Option<Vec<Worker>>,
    running: Vec<RunningWorker>,
    xdp_attachments: Vec<XdpAttachment>,
    tc_attachments: Vec<TcAttachment>,
    bpf_obj: Option<Arc<util::OwnedTcProg>>,
}

/// Resolves a socket's zero-copy/copy bind flag from the global SKB-mode
/// flag and a per-interface hint, per §4.2 step 1: SKB-mode always forces
/// copy; otherwise an explicit hint wins, and unspecified defaults to
/// zero-copy.
fn resolve_zero_copy(skb_mode: bool, hint: BindMode) -> bool {
    if skb_mode {
        return false;
    }
    match hint {
        BindMode::Copy => false,
        BindMode::ZeroCopy | BindMode::Auto => true,
    }
}

/// Reads the process's current CPU affinity mask as a list of CPU ids.
fn current_affinity_cpus() -> io::Result<Vec<usize>> {
    unsafe {
        let mut set: libc::cpu_set_t = std::mem::zeroed();
        if libc::sched_getaffinity(0, std::mem::size_of::<libc::cpu_set_t>(), &mut set) != 0 {
            return Err(io::Error::last_os_error());
        }
        let mut cpus = Vec::new();
        for cpu in 0..libc::CPU_SETSIZE as usize {
            if libc::CPU_ISSET(cpu, &set) {
                cpus.push(cpu);
            }
        }
        Ok(cpus)
    }
}

/// Pins the calling thread to `cpu_id`. Failure is logged, not fatal: a
/// mispinned worker still makes forward progress, just without the intended
/// cache/NUMA locality to its NIC queue's interrupt.
fn pin_current_thread(cpu_id: usize) {
    unsafe {
        let mut set: libc::cpu_set_t = std::mem::zeroed();
        libc::CPU_ZERO(&mut set);
        libc::CPU_SET(cpu_id, &mut set);
        if libc::sched_setaffinity(0, std::mem::size_of::<libc::cpu_set_t>(), &set) != 0 {
            log::warn!("failed to pin worker thread to cpu {cpu_id}: {}", io::Error::last_os_error());
        }
    }
}

/// Performs every step of §4.4 init: resolves interfaces, builds every
/// worker's UMEM region(s) and sockets, and — for XDP/COMBINED modes —
/// loads and attaches the eBPF object. Returns the ready-to-start
/// `Framework` and, unless mode is AF_XDP-only, a handle to the loaded
/// object.
pub fn init(
    config: Config,
    classifier: PacketProcessor,
) -> Result<(Framework, Option<BpfHandle>), FrameworkError> {
    config.validate()?;

    let links = util::get_links()
        .map_err(|e| FrameworkError::Configuration(format!("failed to list network interfaces: {e}")))?;
    let mut ifindexes = Vec::with_capacity(config.interfaces.len());
    for iface in &config.interfaces {
        let if_index = links
            .iter()
            .find(|l| l.name == iface.name)
            .map(|l| l.if_index)
            .ok_or_else(|| FrameworkError::Configuration(format!("unknown interface '{}'", iface.name)))?;
        ifindexes.push(if_index);
    }

    let huge_page = if config.unaligned { Some(true) } else { None };
    let num_interfaces = ifindexes.len() as u32;

    let mut workers = Vec::with_capacity(config.workers as usize);
    for worker_idx in 0..config.workers as usize {
        let mut zc_region: Option<Arc<UmemRegion>> = None;
        let mut copy_region: Option<Arc<UmemRegion>> = None;
        let mut sockets = Vec::with_capacity(ifindexes.len());

        for (owner, (&if_index, iface)) in ifindexes.iter().zip(&config.interfaces).enumerate() {
            let zero_copy = resolve_zero_copy(config.xdp_skb, iface.bind_mode);

            let region: Arc<UmemRegion> = if zero_copy {
                if zc_region.is_none() {
                    let region = UmemRegion::new(config.frame_size, num_interfaces, huge_page)
                        .map_err(|e| {
                            FrameworkError::KernelSetup(format!("failed to allocate zero-copy UMEM region: {e}"))
                        })?;
                    zc_region = Some(Arc::new(region));
                }
                Arc::clone(zc_region.as_ref().unwrap())
            } else {
                if copy_region.is_none() {
                    let region = UmemRegion::new(config.frame_size, num_interfaces, huge_page)
                        .map_err(|e| {
                            FrameworkError::KernelSetup(format!("failed to allocate copy-mode UMEM region: {e}"))
                        })?;
                    copy_region = Some(Arc::new(region));
                }
                Arc::clone(copy_region.as_ref().unwrap())
            };

            let socket_config = SocketConfig {
                if_index,
                queue_id: worker_idx as u32,
                owner: owner as u32,
                zero_copy,
                busy_poll: config.busy_poll,
                need_wakeup: true,
                batch_size: config.batch_size,
            };
            let socket = Socket::new(socket_config, region).map_err(|e| {
                FrameworkError::KernelSetup(format!(
                    "failed to create AF_XDP socket for interface {if_index} on worker {worker_idx}: {e}"
                ))
            })?;
            sockets.push(socket);
        }

        let codec = FrameCodec::new(config.frame_size);
        workers.push(Worker::new(
            sockets,
            config.batch_size,
            config.poll,
            config.busy_poll,
            codec,
            Arc::clone(&classifier),
            worker_idx,
            0,
        ));
    }

    let (bpf_obj, xdp_attachments, tc_attachments) = if config.mode != WorkingMode::AfXdp {
        let argv0 = std::env::args().next().unwrap_or_else(|| "xdp-socket".to_string());
        let object_path = config.ebpf_filename(&argv0);
        let prog = Arc::new(util::load_bpf_program(&object_path, &config.xdp_prog_name).map_err(|e| {
            FrameworkError::KernelSetup(format!("failed to load eBPF object '{object_path}': {e}"))
        })?);

        let xdp_flags = if config.xdp_skb {
            libbpf_sys::XDP_FLAGS_SKB_MODE
        } else {
            libbpf_sys::XDP_FLAGS_DRV_MODE
        };
        let mut xdp_attachments = Vec::with_capacity(ifindexes.len());
        for &if_index in &ifindexes {
            util::attach_xdp_fd(if_index, prog.fd(), xdp_flags).map_err(|e| {
                FrameworkError::KernelSetup(format!(
                    "failed to attach XDP program to interface {if_index}: {e}"
                ))
            })?;
            xdp_attachments.push(XdpAttachment { if_index, flags: xdp_flags });
        }

        let mut tc_attachments = Vec::new();
        if let Some(tc_prog_name) = &config.tc_prog_name {
            let tc_fd = prog.find_prog_fd(tc_prog_name).map_err(|e| {
                FrameworkError::KernelSetup(format!("failed to find TC program '{tc_prog_name}': {e}"))
            })?;
            for &if_index in &ifindexes {
                util::install_clsact(if_index).map_err(|e| {
                    FrameworkError::KernelSetup(format!(
                        "failed to install clsact qdisc on interface {if_index}: {e}"
                    ))
                })?;
                tc_attachments.push(TcAttachment { if_index });
                util::attach_egress_filter(if_index, tc_fd, tc_prog_name).map_err(|e| {
                    FrameworkError::KernelSetup(format!(
                        "failed to attach TC egress filter on interface {if_index}: {e}"
                    ))
                })?;
            }
        }

        (Some(prog), xdp_attachments, tc_attachments)
    } else {
        (None, Vec::new(), Vec::new())
    };

    if config.mode == WorkingMode::Combined {
        if let Some(prog) = &bpf_obj {
            let map_fd = prog
                .find_map_fd("xsks")
                .map_err(|e| FrameworkError::KernelSetup(format!("failed to find 'xsks' map: {e}")))?;
            for (idx, worker) in workers.iter().enumerate() {
                let fd = worker.sockets()[0].raw_fd();
                util::bpf_map_update(map_fd, idx as u32, fd).map_err(|e| {
                    FrameworkError::KernelSetup(format!("failed to populate xsks map entry {idx}: {e}"))
                })?;
            }
        }
    }

    let bpf_handle = bpf_obj.clone().map(|prog| BpfHandle { prog });
    let framework = Framework {
        config,
        ifindexes,
        workers: Some(workers),
        running: Vec::new(),
        xdp_attachments,
        tc_attachments,
        bpf_obj,
    };
    Ok((framework, bpf_handle))
}

impl Framework {
    /// The resolved ifindex for each configured interface, in configuration order.
    pub fn ifindexes(&self) -> &[u32] {
        &self.ifindexes
    }

    /// Reads the process's CPU affinity mask, asserts it covers the
    /// configured worker count, and spawns one pinned thread per worker
    /// (worker _k_ on the _k_-th CPU in the mask, ascending).
    pub fn start_workers(&mut self) -> Result<(), FrameworkError> {
        let mut workers = self
            .workers
            .take()
            .ok_or_else(|| FrameworkError::Invariant("workers are already started".into()))?;

        let cpus = current_affinity_cpus()?;
        if workers.len() > cpus.len() {
            self.workers = Some(workers);
            return Err(FrameworkError::Configuration(format!(
                "{} workers configured but only {} CPUs available in the process affinity mask",
                workers.len(),
                cpus.len()
            )));
        }

        for (k, mut worker) in workers.drain(..).enumerate() {
            worker.set_cpu_id(cpus[k]);
            let sockets_ptr = worker.sockets().as_ptr();
            let n_sockets = worker.sockets().len();
            let stop = Arc::new(AtomicBool::new(false));
            let stop_thread = Arc::clone(&stop);
            let cpu_id = cpus[k];
            let join = std::thread::Builder::new()
                .name(format!("xdp-worker-{k}"))
                .spawn(move || {
                    pin_current_thread(cpu_id);
                    worker.run(&stop_thread);
                    worker
                })
                .map_err(|e| FrameworkError::KernelSetup(format!("failed to spawn worker thread {k}: {e}")))?;
            self.running.push(RunningWorker { stop, join, sockets_ptr, n_sockets });
        }
        Ok(())
    }

    /// Sets the shared stop flag on every worker and joins its thread,
    /// handing each `Worker` back to the control thread. A no-op if workers
    /// are not currently running.
    pub fn stop_workers(&mut self) -> Result<(), FrameworkError> {
        if self.running.is_empty() {
            return Ok(());
        }
        let mut collected = Vec::with_capacity(self.running.len());
        for rw in self.running.drain(..) {
            rw.stop.store(true, Ordering::Relaxed);
            match rw.join.join() {
                Ok(worker) => collected.push(worker),
                Err(_) => return Err(FrameworkError::Invariant("a worker thread panicked".into())),
            }
        }
        self.workers = Some(collected);
        Ok(())
    }

    /// Snapshots one socket's counters, whether its worker is currently
    /// running or has been stopped.
    pub fn get_socket_stats(&self, worker_idx: usize, iface_idx: usize) -> Result<SocketStats, FrameworkError> {
        if let Some(rw) = self.running.get(worker_idx) {
            if iface_idx >= rw.n_sockets {
                return Err(FrameworkError::Invariant(format!(
                    "interface index {iface_idx} out of range for worker {worker_idx}"
                )));
            }
            // Safety: see `RunningWorker`'s doc comment.
            let socket = unsafe { &*rw.sockets_ptr.add(iface_idx) };
            return read_socket_stats(socket);
        }
        let workers = self
            .workers
            .as_ref()
            .ok_or_else(|| FrameworkError::Invariant("framework has no workers".into()))?;
        let worker = workers
            .get(worker_idx)
            .ok_or_else(|| FrameworkError::Invariant(format!("no such worker {worker_idx}")))?;
        let socket = worker
            .sockets()
            .get(iface_idx)
            .ok_or_else(|| FrameworkError::Invariant(format!("no such interface {iface_idx}")))?;
        read_socket_stats(socket)
    }

    /// Idempotent: stops workers, then drops every attachment and the loaded
    /// eBPF object in reverse order of acquisition. Safe to call from a
    /// fatal-error path, and safe to call more than once.
    pub fn cleanup(&mut self) -> Result<(), FrameworkError> {
        self.stop_workers()?;
        self.workers = None;
        self.tc_attachments.clear();
        self.xdp_attachments.clear();
        self.bpf_obj = None;
        Ok(())
    }
}

impl Drop for Framework {
    fn drop(&mut self) {
        if let Err(e) = self.cleanup() {
            log::error!("error during framework cleanup: {e}");
        }
    }
}
