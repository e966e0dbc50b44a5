//! # UDP Packet Header Construction
//!
//! ## Purpose
//!
//! Test and example tooling occasionally needs to hand-assemble a full
//! Ethernet/IPv4/UDP packet to push through a raw UMEM frame — the core
//! run-loop never builds packets itself, only classifies and forwards ones
//! the kernel already delivered.
//!
//! ## How it works
//!
//! Layers the three headers with `etherparse::PacketBuilder` into a fixed
//! 42-byte array via a small `io::Write` adapter, avoiding a heap allocation
//! for a value this small and this hot in a ping/pong test loop.
//!
//! ## Main components
//!
//! - `write_udp_header_for()`: builds the 42-byte L2/L3/L4 header.

use etherparse::PacketBuilder;
use std::io;
use std::net::Ipv4Addr;

/// Size of an Ethernet II + IPv4 (no options) + UDP header.
pub const UDP_HEADER_LEN: usize = 42;

/// Constructs Ethernet, IPv4, and UDP headers for a packet whose payload is `data`.
pub fn write_udp_header_for(
    data: &[u8],
    src_addr: Ipv4Addr,
    src_mac: [u8; 6],
    src_port: u16,
    dst_addr: Ipv4Addr,
    dst_mac: [u8; 6],
    dst_port: u16,
) -> io::Result<[u8; UDP_HEADER_LEN]> {
    let mut hdr = [0u8; UDP_HEADER_LEN];
    let builder = PacketBuilder::ethernet2(src_mac, dst_mac)
        .ipv4(src_addr.octets(), dst_addr.octets(), 64)
        .udp(src_port, dst_port);
    builder
        .write(&mut HdrWrite(&mut hdr, 0), data)
        .map_err(|e| io::Error::other(format!("failed to build packet header: {e}")))?;
    Ok(hdr)
}

/// Adapts a fixed-size array to `io::Write` so `PacketBuilder` can write into
/// it without an intermediate `Vec`.
struct HdrWrite<'a>(&'a mut [u8; UDP_HEADER_LEN], usize);

impl io::Write for HdrWrite<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.1 < UDP_HEADER_LEN {
            let len = buf.len().min(self.0.len() - self.1);
            self.0[self.1..self.1 + len].copy_from_slice(&buf[..len]);
        }
        self.1 += buf.len();
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_parses_back_as_udp() {
        let src_addr = Ipv4Addr::new(192, 168, 1, 1);
        let dst_addr = Ipv4Addr::new(192, 168, 1, 2);
        let src_mac = [0x00, 0x11, 0x22, 0x33, 0x44, 0x55];
        let dst_mac = [0x66, 0x77, 0x88, 0x99, 0xaa, 0xbb];
        let data = b"PING";
        let hdr =
            write_udp_header_for(data, src_addr, src_mac, 9000, dst_addr, dst_mac, 9001).unwrap();

        let mut buf = [0u8; UDP_HEADER_LEN + 4];
        buf[..UDP_HEADER_LEN].copy_from_slice(&hdr);
        buf[UDP_HEADER_LEN..].copy_from_slice(data);

        let packet = etherparse::SlicedPacket::from_ethernet(&buf).unwrap();
        assert!(matches!(packet.transport, Some(etherparse::TransportSlice::Udp(_))));
    }
}
