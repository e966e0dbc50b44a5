//! # Capability Bootstrap
//!
//! ## Purpose
//!
//! AF_XDP socket creation and the netlink qdisc/filter calls in
//! `xdp-socket::util` need `CAP_NET_ADMIN`/`CAP_NET_RAW`/`CAP_BPF`. Test
//! binaries run as an unprivileged user; this module re-execs the current
//! binary under `sudo` with those capabilities set via `setcap`, once, so
//! the test itself never needs to run as root outright.
//!
//! ## How it works
//!
//! `setup` installs logging and, if the process lacks any of the requested
//! capabilities, shells out to `sudo setcap` on its own executable and then
//! `exec`s itself again — replacing the current process rather than
//! spawning a child, so there is exactly one re-exec and no orphaned
//! parent. A `RESTARTED` environment variable guards against looping if
//! `setcap` didn't actually grant what was asked.

use std::env;
use std::io::{Error, Result};
use std::process::Stdio;

/// Runs `command` via `sudo sh -c`, capturing stdout/stderr for the log.
pub fn execute_sudo_command(command: &str) -> Result<()> {
    use std::process::Command;
    let output = Command::new("sudo")
        .arg("sh")
        .arg("-c")
        .arg(command)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()?;

    if !output.status.success() {
        return Err(Error::other(format!(
            "command failed with status {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr)
        )));
    }
    log::info!("sudo# {command}");
    Ok(())
}

/// Re-execs the current binary with `my_caps` granted via `setcap`, unless
/// they're already permitted or a prior re-exec already ran this session.
pub fn restart_with_caps(my_caps: &[caps::Capability]) -> Result<()> {
    let perm_caps = caps::read(None, caps::CapSet::Permitted).map_err(|e| Error::other(e.to_string()))?;
    log::info!("permitted caps: {perm_caps:?}");

    if env::var("RESTARTED").as_deref() == Ok("1") {
        log::info!("already restarted with capabilities");
        return Ok(());
    }

    if my_caps.iter().any(|c| !perm_caps.contains(c)) {
        // Safety: single-threaded at this point in test setup, before any
        // spawned workers exist.
        unsafe {
            env::set_var("RESTARTED", "1");
        }
        let caps_string =
            my_caps.iter().map(|c| c.to_string()).collect::<Vec<String>>().join(",");
        let current_prog = env::current_exe()?;
        let current_prog_path = current_prog
            .to_str()
            .ok_or_else(|| Error::other("failed to get current executable path"))?;
        execute_sudo_command(&format!("setcap {caps_string}+eip {current_prog_path}"))?;
        let args: Vec<String> = env::args().collect();
        log::debug!("re-executing: {args:?}");
        Err(Error::other(exec::execvp(&current_prog, &args).to_string()))
    } else {
        Ok(())
    }
}

/// Installs the test logger and, if `my_caps` is non-empty, re-execs with
/// those capabilities granted.
pub fn setup(my_caps: &[caps::Capability]) -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("debug")).init();
    if my_caps.is_empty() {
        Ok(())
    } else {
        restart_with_caps(my_caps)
    }
}
