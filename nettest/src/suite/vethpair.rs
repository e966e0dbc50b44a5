//! # Veth Pair Lifecycle
//!
//! ## Purpose
//!
//! The two-interface end-to-end scenarios in the framework's testable
//! properties (pure drop, reflect, cross-forward, mixed copy/zero-copy)
//! need two interfaces connected to each other without any real hardware.
//! A Linux veth pair gives exactly that: packets sent out one end arrive on
//! the other.
//!
//! ## How it works
//!
//! Every operation shells out to `ip` via `execute_sudo_command`, matching
//! how the rest of this crate avoids a netlink dependency of its own —
//! `xdp-socket::util` already owns the netlink wire format for the
//! framework itself; this harness only needs to stand the pair up and tear
//! it down, not parse its own replies.

use crate::suite::command::execute_sudo_command;
use std::io::{Error, ErrorKind, Result};

pub fn setup_pair(dev_prefix: &str, ip_prefix: &str) -> Result<()> {
    log::info!("creating new veth pair {dev_prefix}0 + {dev_prefix}1");
    execute_sudo_command(&format!("ip link add {dev_prefix}0 type veth peer {dev_prefix}1"))?;
    up_pair(dev_prefix, ip_prefix)?;
    Ok(())
}

pub fn teardown_pair(prefix: &str) -> Result<()> {
    log::info!("tearing down veth pair {prefix}0");
    execute_sudo_command(&format!("ip link del {prefix}0"))?;
    Ok(())
}

pub fn check_pair(prefix: &str) -> Result<()> {
    log::info!("checking for veth pair {prefix}0 + {prefix}1");
    let output = std::process::Command::new("ip").arg("link").arg("show").arg(format!("{prefix}0")).output()?;
    if output.status.success() {
        Ok(())
    } else {
        Err(Error::new(ErrorKind::NotFound, format!("pair {prefix}0 does not exist")))
    }
}

pub fn up_if_dev(dev: &str) -> Result<()> {
    log::info!("setting interface {dev} up");
    execute_sudo_command(&format!("ip link set {dev} up"))?;
    Ok(())
}

pub fn set_ipv4_addr(dev: &str, addr: &str) -> Result<()> {
    log::info!("setting IPv4 address {addr} on {dev}");
    execute_sudo_command(&format!("ip addr add {addr}/24 dev {dev}"))?;
    Ok(())
}

/// AF_XDP needs the driver to actually deliver frames it wouldn't otherwise
/// accept for this host (the other veth peer's MAC); promiscuous mode is
/// what makes a veth pair behave enough like a real link for that.
pub fn set_promisc_mode(dev: &str, enable: bool) -> Result<()> {
    let mode = if enable { "on" } else { "off" };
    log::info!("setting promisc mode {mode} on {dev}");
    execute_sudo_command(&format!("ip link set {dev} promisc {mode}"))?;
    Ok(())
}

pub fn up_pair(dev_prefix: &str, ip_prefix: &str) -> Result<()> {
    let dev = format!("{dev_prefix}0");
    set_ipv4_addr(&dev, &format!("{ip_prefix}100"))?;
    set_promisc_mode(&dev, true)?;
    up_if_dev(&dev)?;
    let dev = format!("{dev_prefix}1");
    set_ipv4_addr(&dev, &format!("{ip_prefix}101"))?;
    set_promisc_mode(&dev, true)?;
    up_if_dev(&dev)?;
    Ok(())
}
