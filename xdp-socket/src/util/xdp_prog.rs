//! # XDP Feature Querying
//!
//! ## Purpose
//!
//! This file provides a utility function to query the XDP features supported by a
//! given network interface driver. This allows an application to know if capabilities
//! like zero-copy are available.
//!
//! ## How it works
//!
//! It acts as a thin wrapper around the `libbpf_sys::bpf_xdp_query` function. It takes
//! a network interface index, calls the underlying libbpf function to query the driver's
//! XDP capabilities, and returns the result as a bitmask of feature flags.
//!
//! ## Main components
//!
//! - `xdp_features()`: The sole function that calls into `libbpf-sys` to perform the
//!   XDP feature query.

use std::io;
use std::mem::size_of;

/// Queries the XDP feature flags supported by a network interface driver.
///
/// This function is a safe wrapper around the `libbpf_sys::bpf_xdp_query` C function.
/// It determines which XDP features (e.g., zero-copy) are supported by the driver
/// for the specified interface.
///
/// # Arguments
/// * `if_index` - The index of the network interface to query.
///
/// # Returns
/// A `Result` containing a bitmask of `XDP_FEATURE_` flags on success, or an
/// `io::Error` on failure.
pub fn xdp_features(if_index: u32) -> io::Result<u32> {
    Ok(unsafe {
        let mut opts: libbpf_sys::bpf_xdp_query_opts = std::mem::zeroed();
        opts.sz = size_of::<libbpf_sys::bpf_xdp_query_opts>() as u64;
        if libbpf_sys::bpf_xdp_query(
            if_index as libc::c_int,
            libbpf_sys::XDP_FLAGS_DRV_MODE as libc::c_int,
            &mut opts,
        ) < 0
        {
            return Err(io::Error::other(format!(
                "Failed to query XDP features: {}",
                io::Error::last_os_error()
            )));
        }
        opts.feature_flags as u32
    })
}

/// Loads `object_path` and attaches the program named `name` to `if_index`.
/// `skb_mode` selects `XDP_FLAGS_SKB_MODE` (generic) over `XDP_FLAGS_DRV_MODE`
/// (native); forced on whenever `-S/--xdp-skb` is set or the driver query in
/// `xdp_features` shows no native/zero-copy support.
pub fn xdp_attach_program(
    if_index: u32,
    object_path: &str,
    name: &str,
    skb_mode: bool,
) -> io::Result<OwnedXdpProg> {
    let flags = if skb_mode { libbpf_sys::XDP_FLAGS_SKB_MODE } else { libbpf_sys::XDP_FLAGS_DRV_MODE };

    let mut owned_prog = OwnedXdpProg { if_index, flags, attached: false, bpf_obj: std::ptr::null_mut() };

    unsafe {
        let path_cstr = std::ffi::CString::new(object_path)?;
        let mut opts: libbpf_sys::bpf_object_open_opts = std::mem::zeroed();
        opts.sz = size_of::<libbpf_sys::bpf_object_open_opts>() as u64;
        owned_prog.bpf_obj = libbpf_sys::bpf_object__open_file(path_cstr.as_ptr(), &opts);
        if owned_prog.bpf_obj.is_null() {
            return Err(io::Error::other(format!("failed to open eBPF object '{object_path}'")));
        }

        if 0 != libbpf_sys::bpf_object__load(owned_prog.bpf_obj) {
            return Err(io::Error::other(format!(
                "failed to load eBPF object '{object_path}': {}",
                io::Error::last_os_error()
            )));
        }

        let prog_name_cstr = std::ffi::CString::new(name)?;
        let bpf_prog =
            libbpf_sys::bpf_object__find_program_by_name(owned_prog.bpf_obj, prog_name_cstr.as_ptr());
        if bpf_prog.is_null() {
            return Err(io::Error::other(format!("failed to find eBPF program '{name}'")));
        }
        let prog_fd = libbpf_sys::bpf_program__fd(bpf_prog);

        if 0 != libbpf_sys::bpf_xdp_attach(if_index as libc::c_int, prog_fd, flags as u32, std::ptr::null()) {
            return Err(io::Error::other(format!(
                "failed to attach XDP program '{name}' to interface {if_index}: {}",
                io::Error::last_os_error()
            )));
        }
        owned_prog.attached = true;
    };

    Ok(owned_prog)
}

/// Owns a loaded eBPF object and, if attached, the XDP attachment on
/// `if_index`. Detaches and unloads on drop.
pub struct OwnedXdpProg {
    pub if_index: u32,
    flags: u32,
    attached: bool,
    bpf_obj: *mut libbpf_sys::bpf_object,
}

impl Drop for OwnedXdpProg {
    fn drop(&mut self) {
        if self.attached {
            unsafe {
                libbpf_sys::bpf_xdp_detach(self.if_index as libc::c_int, self.flags, std::ptr::null());
            }
        }
        if !self.bpf_obj.is_null() {
            unsafe { libbpf_sys::bpf_object__close(self.bpf_obj) };
        }
    }
}

/// Loads `object_path` and resolves the fd of the program named `name`,
/// without attaching it anywhere. Used for the TC egress filter, whose
/// attachment goes through netlink (`util::attach_egress_filter`) rather than
/// libbpf's own attach helpers.
pub fn load_bpf_program(object_path: &str, name: &str) -> io::Result<OwnedTcProg> {
    unsafe {
        let path_cstr = std::ffi::CString::new(object_path)?;
        let mut opts: libbpf_sys::bpf_object_open_opts = std::mem::zeroed();
        opts.sz = size_of::<libbpf_sys::bpf_object_open_opts>() as u64;
        let bpf_obj = libbpf_sys::bpf_object__open_file(path_cstr.as_ptr(), &opts);
        if bpf_obj.is_null() {
            return Err(io::Error::other(format!("failed to open eBPF object '{object_path}'")));
        }
        if 0 != libbpf_sys::bpf_object__load(bpf_obj) {
            libbpf_sys::bpf_object__close(bpf_obj);
            return Err(io::Error::other(format!("failed to load eBPF object '{object_path}'")));
        }
        let prog_name_cstr = std::ffi::CString::new(name)?;
        let bpf_prog = libbpf_sys::bpf_object__find_program_by_name(bpf_obj, prog_name_cstr.as_ptr());
        if bpf_prog.is_null() {
            libbpf_sys::bpf_object__close(bpf_obj);
            return Err(io::Error::other(format!("failed to find eBPF program '{name}'")));
        }
        let fd = libbpf_sys::bpf_program__fd(bpf_prog);
        Ok(OwnedTcProg { bpf_obj, fd })
    }
}

/// A loaded (but not libbpf-attached) eBPF object, kept alive for the
/// lifetime of a netlink-installed TC filter referencing its fd.
pub struct OwnedTcProg {
    bpf_obj: *mut libbpf_sys::bpf_object,
    fd: libc::c_int,
}

impl OwnedTcProg {
    pub fn fd(&self) -> libc::c_int {
        self.fd
    }

    /// Looks up the fd of a second program named `name` inside this same
    /// loaded object, so one `bpf_object__open_file` can serve both the XDP
    /// and the TC egress program when a single `.o` defines both.
    pub fn find_prog_fd(&self, name: &str) -> io::Result<libc::c_int> {
        unsafe {
            let name_cstr = std::ffi::CString::new(name)?;
            let prog = libbpf_sys::bpf_object__find_program_by_name(self.bpf_obj, name_cstr.as_ptr());
            if prog.is_null() {
                return Err(io::Error::other(format!("eBPF program '{name}' not found")));
            }
            let fd = libbpf_sys::bpf_program__fd(prog);
            if fd < 0 {
                return Err(io::Error::other(format!("program '{name}' has no fd")));
            }
            Ok(fd)
        }
    }

    /// Looks up the fd of a map named `name` inside this loaded object, for
    /// populating the `xsks` redirect map from the control plane in COMBINED
    /// mode (§4.4 step 5).
    pub fn find_map_fd(&self, name: &str) -> io::Result<libc::c_int> {
        unsafe {
            let name_cstr = std::ffi::CString::new(name)?;
            let map = libbpf_sys::bpf_object__find_map_by_name(self.bpf_obj, name_cstr.as_ptr());
            if map.is_null() {
                return Err(io::Error::other(format!("eBPF map '{name}' not found")));
            }
            let fd = libbpf_sys::bpf_map__fd(map);
            if fd < 0 {
                return Err(io::Error::other(format!("map '{name}' has no fd")));
            }
            Ok(fd)
        }
    }
}

/// Attaches the already-loaded program `prog_fd` to `if_index`'s XDP hook.
/// Unlike `xdp_attach_program`, the caller supplies a single loaded object's
/// fd so the same eBPF object can be attached to every configured interface
/// without reloading it once per interface.
pub fn attach_xdp_fd(if_index: u32, prog_fd: libc::c_int, flags: u32) -> io::Result<()> {
    if unsafe { libbpf_sys::bpf_xdp_attach(if_index as libc::c_int, prog_fd, flags, std::ptr::null()) } != 0 {
        return Err(io::Error::other(format!(
            "failed to attach XDP program to interface {if_index}: {}",
            io::Error::last_os_error()
        )));
    }
    Ok(())
}

/// Detaches whatever XDP program is attached to `if_index` with the given flags.
pub fn detach_xdp(if_index: u32, flags: u32) {
    unsafe {
        libbpf_sys::bpf_xdp_detach(if_index as libc::c_int, flags, std::ptr::null());
    }
}

/// Writes `value` into map `map_fd` at `key`, used to populate the `xsks`
/// redirect map with per-worker AF_XDP socket fds in COMBINED mode.
pub fn bpf_map_update(map_fd: libc::c_int, key: u32, value: libc::c_int) -> io::Result<()> {
    if unsafe {
        libbpf_sys::bpf_map_update_elem(
            map_fd,
            &key as *const _ as *const libc::c_void,
            &value as *const _ as *const libc::c_void,
            0,
        )
    } < 0
    {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

impl Drop for OwnedTcProg {
    fn drop(&mut self) {
        if !self.bpf_obj.is_null() {
            unsafe { libbpf_sys::bpf_object__close(self.bpf_obj) };
        }
    }
}
