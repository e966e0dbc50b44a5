//! # Paired-Host Test Driver
//!
//! ## Purpose
//!
//! Every two-interface scenario needs the same boilerplate: make sure a
//! veth pair exists, resolve each side's ifindex so the caller can hand it
//! straight to [`crate::control::init`][xdp_socket::control::init], run the
//! scenario, then tear the pair down. [`run_test_with_pair`] is that
//! boilerplate; the scenario itself is just an async closure over a
//! [`HostPair`].

use crate::suite::vethpair;
use std::fmt::Display;
use std::future::Future;
use std::io::{Error, ErrorKind, Result};
use std::net::Ipv4Addr;
use std::str::FromStr;
use xdp_socket::util::get_ipv4_address;

pub const DEV_PREFIX: &str = "xdpVeth";
pub const IP_PREFIX: &str = "192.168.77.";

/// One side of a veth pair, with its address already resolved to an
/// ifindex so scenarios never have to call into netlink themselves.
#[derive(Clone, Debug, Default)]
pub struct Host {
    pub if_dev: String,
    pub ip_str: String,
    pub ip_addr: Ipv4Addr,
    pub if_index: u32,
}

impl Display for Host {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Host {{ ip: {}, if_dev: {}, if_index: {} }}", self.ip_str, self.if_dev, self.if_index)
    }
}

impl Host {
    pub fn new(if_dev: String, ip_str: String) -> Self {
        let ip_addr = Ipv4Addr::from_str(&ip_str).expect("invalid IPv4 address");
        let if_index = get_ipv4_address(None)
            .expect("failed to enumerate interface addresses")
            .into_iter()
            .find(|(addr, _)| *addr == ip_addr)
            .unwrap_or_else(|| panic!("source IP {ip_addr} not found on any interface"))
            .1;
        Host { if_dev, ip_str, ip_addr, if_index }
    }
}

pub struct HostPair {
    pub host0: Host,
    pub host1: Host,
}

impl HostPair {
    pub fn new(host0: Host, host1: Host) -> Self {
        HostPair { host0, host1 }
    }

    pub fn from_prefixes(dev_prefix: &str, ip_prefix: &str) -> Self {
        let host0 = Host::new(format!("{dev_prefix}0"), format!("{ip_prefix}100"));
        let host1 = Host::new(format!("{dev_prefix}1"), format!("{ip_prefix}101"));
        HostPair::new(host0, host1)
    }
}

/// Ensures the default veth pair exists, runs `test` against it, then tears
/// the pair back down. Leaves the pair in place if `test` errors, so a
/// failed run can be inspected with `ip link show` afterward.
pub async fn run_test_with_pair<F, Fut>(test: F) -> Result<()>
where
    F: FnOnce(HostPair) -> Fut,
    Fut: Future<Output = Result<()>>,
{
    if let Err(e) = vethpair::check_pair(DEV_PREFIX) {
        if e.kind() == ErrorKind::NotFound {
            vethpair::setup_pair(DEV_PREFIX, IP_PREFIX)?;
        } else {
            return Err(e);
        }
    }
    let host_pair = HostPair::from_prefixes(DEV_PREFIX, IP_PREFIX);
    test(host_pair).await?;
    vethpair::teardown_pair(DEV_PREFIX)?;
    Ok(())
}
